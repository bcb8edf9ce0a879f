use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    config::AppConfig,
    db,
    menu_store::MenuStore,
    orchestrator::MenuCache,
    profile::ProfileStore,
    remote::{HttpMenuSource, MenuSource},
    AppError, AppResult,
};

/// One app session: the process-wide pool, the menu cache built on it and
/// the profile store. Opened at start, closed at the end of the session.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pool: SqlitePool,
    pub store: MenuStore,
    pub menu: MenuCache,
    pub profile: ProfileStore,
    pub db_path: Arc<PathBuf>,
}

impl AppState {
    /// Opens storage and wires the HTTP menu source from `config`. Does not
    /// start the cache; call [`MenuCache::start`] on `menu`.
    pub async fn open(config: AppConfig) -> AppResult<Self> {
        let source = HttpMenuSource::new(config.menu_url.clone())
            .with_timeout(config.fetch_timeout());
        Self::open_with_source(config, Arc::new(source)).await
    }

    pub async fn open_with_source(
        config: AppConfig,
        source: Arc<dyn MenuSource>,
    ) -> AppResult<Self> {
        let db_path = config.db_path();
        let pool = db::open_sqlite_pool(&db_path)
            .await
            .map_err(AppError::startup)?;
        let store = MenuStore::new(pool.clone());
        let menu = MenuCache::new(Arc::new(store.clone()), source, config.debounce());
        let profile = ProfileStore::open(&config.profile_path())?;
        Ok(Self {
            config: Arc::new(config),
            pool,
            store,
            menu,
            profile,
            db_path: Arc::new(db_path),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
