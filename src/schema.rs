use sqlx::SqlitePool;
use tracing::{error, info};

use crate::{AppError, AppResult};

pub const MENU_TABLE: &str = "menu";

const CREATE_MENU_TABLE: &str = "CREATE TABLE IF NOT EXISTS menu (\
    id INTEGER PRIMARY KEY NOT NULL, \
    name TEXT, \
    price REAL, \
    description TEXT, \
    image TEXT, \
    category TEXT\
)";

const CREATE_CATEGORY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS menu_category_idx ON menu(category)";

/// Creates the menu table when absent. Never drops or alters existing rows,
/// so it runs unconditionally on every start.
///
/// Any failure is reported as a `STARTUP/SCHEMA` error.
pub async fn ensure_schema(pool: &SqlitePool) -> AppResult<()> {
    let result = async {
        let mut tx = pool.begin().await?;
        sqlx::query(CREATE_MENU_TABLE).execute(&mut *tx).await?;
        sqlx::query(CREATE_CATEGORY_INDEX).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok::<_, sqlx::Error>(())
    }
    .await;

    match result {
        Ok(()) => {
            info!(target: "littlelemon", event = "schema_ready", table = MENU_TABLE);
            Ok(())
        }
        Err(err) => {
            let err = AppError::startup(err).with_context("table", MENU_TABLE);
            error!(target: "littlelemon", event = "schema_failed", error = %err);
            Err(err)
        }
    }
}

/// Lists the column names of the menu table, in declaration order.
pub async fn menu_columns(pool: &SqlitePool) -> AppResult<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('menu')")
        .fetch_all(pool)
        .await?;
    Ok(names)
}
