use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::db::run_in_tx;
use crate::dish::{Dish, NewDish};
use crate::filter::{build_predicate, MenuFilter, Predicate};
use crate::schema::{self, MENU_TABLE};
use crate::{AppError, AppResult};

/// The operations the cache needs from persistent dish storage. This is the
/// only path to the table, and so the only synchronization boundary.
pub trait MenuRepository: Send + Sync {
    fn ensure_schema(&self) -> BoxFuture<'_, AppResult<()>>;
    fn insert_many<'a>(&'a self, rows: &'a [NewDish]) -> BoxFuture<'a, AppResult<u64>>;
    fn query_all(&self) -> BoxFuture<'_, AppResult<Vec<Dish>>>;
    fn query_filtered<'a>(&'a self, filter: &'a MenuFilter)
        -> BoxFuture<'a, AppResult<Vec<Dish>>>;
    fn delete_all(&self) -> BoxFuture<'_, AppResult<u64>>;
}

const SELECT_MENU: &str = "SELECT id, name, price, description, image, category FROM menu";

/// The persisted dish table. Cloning shares the underlying pool.
#[derive(Clone)]
pub struct MenuStore {
    pool: SqlitePool,
}

impl MenuStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Appends every row inside one transaction; either all rows are stored
    /// or none are.
    pub async fn insert_many(&self, rows: &[NewDish]) -> AppResult<u64> {
        let rows = rows.to_vec();
        let count = rows.len();
        let inserted = run_in_tx(&self.pool, move |tx| {
            async move {
                let mut inserted = 0u64;
                for (index, dish) in rows.iter().enumerate() {
                    sqlx::query(
                        "INSERT INTO menu (name, price, description, image, category) \
                         VALUES (?, ?, ?, ?, ?)",
                    )
                    .bind(&dish.name)
                    .bind(dish.price)
                    .bind(&dish.description)
                    .bind(&dish.image)
                    .bind(&dish.category)
                    .execute(&mut **tx)
                    .await
                    .map_err(|err| {
                        AppError::from(err)
                            .with_context("operation", "insert_many")
                            .with_context("table", MENU_TABLE)
                            .with_context("row", index.to_string())
                    })?;
                    inserted += 1;
                }
                Ok::<_, AppError>(inserted)
            }
            .boxed()
        })
        .await?;

        info!(
            target: "littlelemon",
            event = "menu_rows_inserted",
            requested = count,
            inserted
        );
        Ok(inserted)
    }

    pub async fn query_all(&self) -> AppResult<Vec<Dish>> {
        self.query_predicate(&Predicate::All).await
    }

    pub async fn query_filtered(&self, filter: &MenuFilter) -> AppResult<Vec<Dish>> {
        let predicate = build_predicate(&filter.categories, &filter.search);
        self.query_predicate(&predicate).await
    }

    pub async fn query_predicate(&self, predicate: &Predicate) -> AppResult<Vec<Dish>> {
        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_MENU);
        predicate.push_where(&mut qb);
        qb.push(" ORDER BY id");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(|err| {
            AppError::from(err)
                .with_context("operation", "query")
                .with_context("table", MENU_TABLE)
        })?;

        let dishes = rows
            .iter()
            .map(Dish::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        debug!(
            target: "littlelemon",
            event = "menu_query",
            predicate = ?predicate,
            rows = dishes.len()
        );
        Ok(dishes)
    }

    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menu")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Clears the table. Maintenance only; steady-state flow never deletes.
    pub async fn delete_all(&self) -> AppResult<u64> {
        let res = sqlx::query("DELETE FROM menu")
            .execute(&self.pool)
            .await
            .map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "delete_all")
                    .with_context("table", MENU_TABLE)
            })?;
        info!(
            target: "littlelemon",
            event = "menu_rows_deleted",
            rows = res.rows_affected()
        );
        Ok(res.rows_affected())
    }
}

impl MenuRepository for MenuStore {
    fn ensure_schema(&self) -> BoxFuture<'_, AppResult<()>> {
        schema::ensure_schema(&self.pool).boxed()
    }

    fn insert_many<'a>(&'a self, rows: &'a [NewDish]) -> BoxFuture<'a, AppResult<u64>> {
        MenuStore::insert_many(self, rows).boxed()
    }

    fn query_all(&self) -> BoxFuture<'_, AppResult<Vec<Dish>>> {
        MenuStore::query_all(self).boxed()
    }

    fn query_filtered<'a>(
        &'a self,
        filter: &'a MenuFilter,
    ) -> BoxFuture<'a, AppResult<Vec<Dish>>> {
        MenuStore::query_filtered(self, filter).boxed()
    }

    fn delete_all(&self) -> BoxFuture<'_, AppResult<u64>> {
        MenuStore::delete_all(self).boxed()
    }
}

/// Process-local stand-in for [`MenuStore`] with the same filter semantics.
/// Failure switches let callers exercise the error paths.
#[derive(Default)]
pub struct MemoryMenuStore {
    rows: Mutex<Vec<Dish>>,
    next_id: AtomicU64,
    filtered_queries: AtomicU64,
    filtered_log: Mutex<Vec<MenuFilter>>,
    fail_schema: AtomicBool,
    fail_inserts: AtomicBool,
    fail_queries: AtomicBool,
}

impl MemoryMenuStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: &[NewDish]) -> Self {
        let store = Self::default();
        store.append(rows);
        store
    }

    fn append(&self, rows: &[NewDish]) -> u64 {
        let mut guard = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        for dish in rows {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
            guard.push(Dish {
                id,
                name: dish.name.clone(),
                price: dish.price,
                description: dish.description.clone(),
                image: dish.image.clone(),
                category: dish.category.clone(),
            });
        }
        rows.len() as u64
    }

    pub fn set_fail_schema(&self, fail: bool) {
        self.fail_schema.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Number of `query_filtered` calls served (including failed ones).
    pub fn filtered_queries(&self) -> u64 {
        self.filtered_queries.load(Ordering::SeqCst)
    }

    /// Filters passed to `query_filtered`, in call order.
    pub fn filtered_log(&self) -> Vec<MenuFilter> {
        self.filtered_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn injected(code: &str, operation: &str) -> AppError {
        AppError::new(code, "injected failure").with_context("operation", operation.to_string())
    }
}

impl MenuRepository for MemoryMenuStore {
    fn ensure_schema(&self) -> BoxFuture<'_, AppResult<()>> {
        let result = if self.fail_schema.load(Ordering::SeqCst) {
            Err(AppError::startup(Self::injected("SQLX/IO", "ensure_schema")))
        } else {
            Ok(())
        };
        futures::future::ready(result).boxed()
    }

    fn insert_many<'a>(&'a self, rows: &'a [NewDish]) -> BoxFuture<'a, AppResult<u64>> {
        let result = if self.fail_inserts.load(Ordering::SeqCst) {
            Err(Self::injected("SQLX/IO", "insert_many"))
        } else {
            Ok(self.append(rows))
        };
        futures::future::ready(result).boxed()
    }

    fn query_all(&self) -> BoxFuture<'_, AppResult<Vec<Dish>>> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner()).clone();
        futures::future::ready(Ok(rows)).boxed()
    }

    fn query_filtered<'a>(
        &'a self,
        filter: &'a MenuFilter,
    ) -> BoxFuture<'a, AppResult<Vec<Dish>>> {
        self.filtered_queries.fetch_add(1, Ordering::SeqCst);
        self.filtered_log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(filter.clone());
        let result = if self.fail_queries.load(Ordering::SeqCst) {
            Err(Self::injected("SQLX/IO", "query"))
        } else {
            let predicate = filter.predicate();
            Ok(self
                .rows
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .filter(|dish| predicate.matches(dish))
                .cloned()
                .collect())
        };
        futures::future::ready(result).boxed()
    }

    fn delete_all(&self) -> BoxFuture<'_, AppResult<u64>> {
        let mut guard = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let removed = guard.len() as u64;
        guard.clear();
        futures::future::ready(Ok(removed)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_pool;
    use crate::schema::ensure_schema;

    async fn store() -> MenuStore {
        let pool = open_memory_pool().await.unwrap();
        ensure_schema(&pool).await.unwrap();
        MenuStore::new(pool)
    }

    fn new_dish(name: &str, category: &str) -> NewDish {
        NewDish {
            name: name.into(),
            price: 9.5,
            description: String::new(),
            image: String::new(),
            category: category.into(),
        }
    }

    #[tokio::test]
    async fn assigns_ids_in_insertion_order() {
        let store = store().await;
        store
            .insert_many(&[new_dish("Pasta", "mains"), new_dish("Lemon Dessert", "desserts")])
            .await
            .unwrap();
        let rows = store.query_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].id < rows[1].id);
        assert_eq!(rows[0].name, "Pasta");
    }

    #[tokio::test]
    async fn empty_insert_is_a_no_op() {
        let store = store().await;
        assert_eq!(store.insert_many(&[]).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_all_empties_the_table() {
        let store = store().await;
        store.insert_many(&[new_dish("Pasta", "mains")]).await.unwrap();
        assert_eq!(store.delete_all().await.unwrap(), 1);
        assert!(store.query_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_store_mirrors_sql_filtering() {
        let rows = [new_dish("Greek Salad", "starters"), new_dish("Pasta", "mains")];
        let sql = store().await;
        sql.insert_many(&rows).await.unwrap();
        let memory = MemoryMenuStore::with_rows(&rows);

        let filter = MenuFilter::new(["starters", "mains"], "SAL");
        let from_sql = MenuStore::query_filtered(&sql, &filter).await.unwrap();
        let from_memory = MenuRepository::query_filtered(&memory, &filter).await.unwrap();
        assert_eq!(from_sql, from_memory);
        assert_eq!(from_memory.len(), 1);
        assert_eq!(memory.filtered_queries(), 1);
    }

    #[tokio::test]
    async fn missing_table_surfaces_store_error() {
        let pool = open_memory_pool().await.unwrap();
        let store = MenuStore::new(pool);
        let err = store.query_all().await.unwrap_err();
        assert!(err.is_store(), "unexpected code {}", err.code());
        assert_eq!(err.context().get("operation"), Some(&"query".to_string()));
    }
}
