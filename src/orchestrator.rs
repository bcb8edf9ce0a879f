use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::categories::category_universe_for;
use crate::dish::Dish;
use crate::filter::MenuFilter;
use crate::menu_store::MenuRepository;
use crate::metrics::{MenuCacheMetrics, MenuCacheSnapshot};
use crate::remote::MenuSource;
use crate::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePhase {
    Uninitialized,
    SchemaReady,
    Populated,
    Ready,
    Failed,
}

/// Everything the menu screen renders.
#[derive(Debug, Clone, Serialize)]
pub struct MenuView {
    pub phase: CachePhase,
    pub categories: Vec<String>,
    pub filter: MenuFilter,
    pub dishes: Vec<Dish>,
    /// Generation of the filter that produced `dishes`.
    pub generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AppError>,
}

impl Default for MenuView {
    fn default() -> Self {
        Self {
            phase: CachePhase::Uninitialized,
            categories: Vec::new(),
            filter: MenuFilter::default(),
            dishes: Vec::new(),
            generation: 0,
            error: None,
        }
    }
}

struct Selection {
    filter: MenuFilter,
    generation: u64,
}

struct Inner {
    repo: Arc<dyn MenuRepository>,
    source: Arc<dyn MenuSource>,
    debounce: Duration,
    selection: Mutex<Selection>,
    /// Mirrors `selection.generation` for lock-free staleness checks.
    current: AtomicU64,
    view: watch::Sender<MenuView>,
    metrics: MenuCacheMetrics,
    /// Runtime debounced queries run on. Set at construction inside a
    /// runtime, otherwise by `start`.
    runtime: OnceCell<Handle>,
}

enum QueryOutcome {
    Stale(u64),
    Applied(usize),
    Failed(AppError),
}

/// Owns the menu session: initialises storage, populates it once from the
/// remote source when empty, and republishes filtered rows as the
/// selection changes. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct MenuCache {
    inner: Arc<Inner>,
}

impl MenuCache {
    pub fn new(
        repo: Arc<dyn MenuRepository>,
        source: Arc<dyn MenuSource>,
        debounce: Duration,
    ) -> Self {
        let (view, _) = watch::channel(MenuView::default());
        let runtime = OnceCell::new();
        if let Ok(handle) = Handle::try_current() {
            let _ = runtime.set(handle);
        }
        Self {
            inner: Arc::new(Inner {
                repo,
                source,
                debounce,
                selection: Mutex::new(Selection {
                    filter: MenuFilter::default(),
                    generation: 0,
                }),
                current: AtomicU64::new(0),
                view,
                metrics: MenuCacheMetrics::new(),
                runtime,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<MenuView> {
        self.inner.view.subscribe()
    }

    pub fn view(&self) -> MenuView {
        self.inner.view.borrow().clone()
    }

    pub fn phase(&self) -> CachePhase {
        self.inner.view.borrow().phase
    }

    pub fn categories(&self) -> Vec<String> {
        self.inner.view.borrow().categories.clone()
    }

    pub fn dishes(&self) -> Vec<Dish> {
        self.inner.view.borrow().dishes.clone()
    }

    pub fn filter(&self) -> MenuFilter {
        self.inner.lock_selection().filter.clone()
    }

    pub fn metrics(&self) -> MenuCacheSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Runs schema setup, population and the first publish.
    ///
    /// A schema failure moves the cache to `Failed` and returns a
    /// `STARTUP/*` error. Population failures leave it in `SchemaReady`
    /// with the error published; the next start retries because the table
    /// is still empty.
    pub async fn start(&self) -> AppResult<()> {
        let inner = &self.inner;
        inner.runtime.get_or_init(Handle::current);
        if let Err(err) = inner.repo.ensure_schema().await {
            let err = if err.is_startup() {
                err
            } else {
                AppError::startup(err)
            };
            error!(target: "littlelemon", event = "menu_cache_failed", error = %err);
            inner.view.send_modify(|view| {
                view.phase = CachePhase::Failed;
                view.error = Some(err.clone());
            });
            return Err(err);
        }
        inner.set_phase(CachePhase::SchemaReady);

        let rows = inner.populate().await?;
        inner.publish_populated(&rows);
        inner.publish_current().await;
        Ok(())
    }

    /// Maintenance: clears the table and repopulates from the remote source.
    pub async fn reload(&self) -> AppResult<()> {
        let inner = &self.inner;
        if self.phase() == CachePhase::Failed {
            return Err(AppError::new(
                "MENU/NOT_STARTED",
                "Menu storage failed to initialise",
            ));
        }
        let removed = inner.repo.delete_all().await.map_err(|err| {
            inner.publish_error(err.clone());
            err
        })?;
        info!(target: "littlelemon", event = "menu_cache_reload", removed);
        inner.view.send_modify(|view| {
            view.phase = CachePhase::SchemaReady;
            view.dishes.clear();
            view.categories.clear();
        });

        let rows = inner.populate().await?;
        inner.publish_populated(&rows);
        inner.publish_current().await;
        Ok(())
    }

    /// Toggles one category; returns whether it is now selected.
    pub fn toggle_category(&self, category: &str) -> bool {
        let mut selected = false;
        self.change_filter(|filter| selected = filter.toggle(category));
        selected
    }

    pub fn set_categories<I, S>(&self, categories: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let categories: BTreeSet<String> = categories.into_iter().map(Into::into).collect();
        self.change_filter(|filter| filter.categories = categories);
    }

    pub fn set_search_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.change_filter(|filter| filter.search = text);
    }

    pub fn clear_filters(&self) {
        self.change_filter(|filter| *filter = MenuFilter::default());
    }

    /// Queries the current selection immediately, skipping the quiet period.
    pub async fn refresh_now(&self) {
        let (generation, filter) = self.inner.bump(|_| {});
        self.inner.run_query(generation, filter).await;
    }

    fn change_filter<F>(&self, mutate: F)
    where
        F: FnOnce(&mut MenuFilter),
    {
        let (generation, filter) = self.inner.bump(mutate);
        self.inner.view.send_if_modified(|view| {
            if self.inner.current.load(Ordering::SeqCst) != generation {
                return false;
            }
            view.filter = filter.clone();
            true
        });
        debug!(
            target: "littlelemon",
            event = "menu_filter_changed",
            generation,
            categories = filter.categories.len(),
            search_len = filter.search.len()
        );

        // Nothing is queried before `start`, which captures the runtime; the
        // recorded selection is picked up by its first publish.
        let Some(runtime) = self.inner.runtime.get() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            if inner.current.load(Ordering::SeqCst) != generation {
                return;
            }
            let phase = inner.view.borrow().phase;
            if !matches!(phase, CachePhase::Populated | CachePhase::Ready) {
                return;
            }
            inner.run_query(generation, filter).await;
        });
    }
}

impl Inner {
    fn lock_selection(&self) -> std::sync::MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies `mutate` and advances the generation under one lock, so a
    /// generation always identifies exactly one filter.
    fn bump<F>(&self, mutate: F) -> (u64, MenuFilter)
    where
        F: FnOnce(&mut MenuFilter),
    {
        let mut selection = self.lock_selection();
        mutate(&mut selection.filter);
        selection.generation += 1;
        self.current.store(selection.generation, Ordering::SeqCst);
        (selection.generation, selection.filter.clone())
    }

    fn snapshot(&self) -> (u64, MenuFilter) {
        let selection = self.lock_selection();
        (selection.generation, selection.filter.clone())
    }

    fn set_phase(&self, phase: CachePhase) {
        self.view.send_modify(|view| view.phase = phase);
        debug!(target: "littlelemon", event = "menu_cache_phase", phase = ?phase);
    }

    fn publish_error(&self, err: AppError) {
        self.view.send_modify(|view| view.error = Some(err));
    }

    /// Returns the stored rows, fetching and inserting the remote menu first
    /// when the table is empty.
    async fn populate(&self) -> AppResult<Vec<Dish>> {
        let existing = self.repo.query_all().await.map_err(|err| {
            warn!(target: "littlelemon", event = "menu_cache_read_failed", error = %err);
            self.publish_error(err.clone());
            err
        })?;
        if !existing.is_empty() {
            info!(
                target: "littlelemon",
                event = "menu_cache_hit",
                rows = existing.len()
            );
            return Ok(existing);
        }

        self.metrics.record_remote_fetch();
        info!(target: "littlelemon", event = "menu_cache_miss");
        let fetched = match self.source.fetch_menu().await {
            Ok(rows) => rows,
            Err(err) => {
                let err = AppError::from(err);
                warn!(target: "littlelemon", event = "menu_fetch_failed", error = %err);
                self.publish_error(err.clone());
                return Err(err);
            }
        };

        self.repo.insert_many(&fetched).await.map_err(|err| {
            warn!(target: "littlelemon", event = "menu_insert_failed", error = %err);
            self.publish_error(err.clone());
            err
        })?;

        self.repo.query_all().await.map_err(|err| {
            self.publish_error(err.clone());
            err
        })
    }

    fn publish_populated(&self, rows: &[Dish]) {
        let categories = category_universe_for(rows);
        self.view.send_modify(|view| {
            view.phase = CachePhase::Populated;
            view.categories = categories;
            view.error = None;
        });
    }

    async fn publish_current(&self) {
        let (generation, filter) = self.snapshot();
        self.run_query(generation, filter).await;
    }

    /// Runs one filtered read and publishes it unless a newer selection has
    /// been made in the meantime. Failures keep the previous rows on screen.
    async fn run_query(&self, generation: u64, filter: MenuFilter) {
        self.metrics.record_query_issued();
        let result = self.repo.query_filtered(&filter).await;

        // The generation check and the write share the watch lock, so an
        // older result can never land after a newer one.
        let mut outcome = QueryOutcome::Stale(generation);
        self.view.send_if_modified(|view| {
            let current = self.current.load(Ordering::SeqCst);
            if current != generation {
                outcome = QueryOutcome::Stale(current);
                return false;
            }
            match result {
                Ok(dishes) => {
                    outcome = QueryOutcome::Applied(dishes.len());
                    view.phase = CachePhase::Ready;
                    view.filter = filter;
                    view.dishes = dishes;
                    view.generation = generation;
                    view.error = None;
                }
                Err(err) => {
                    outcome = QueryOutcome::Failed(err.clone());
                    view.error = Some(err);
                }
            }
            true
        });

        match outcome {
            QueryOutcome::Stale(current) => {
                self.metrics.record_query_stale();
                debug!(
                    target: "littlelemon",
                    event = "menu_query_stale",
                    generation,
                    current
                );
            }
            QueryOutcome::Applied(rows) => {
                self.metrics.record_query_applied();
                debug!(
                    target: "littlelemon",
                    event = "menu_query_applied",
                    generation,
                    rows
                );
            }
            QueryOutcome::Failed(err) => {
                self.metrics.record_query_failure();
                warn!(
                    target: "littlelemon",
                    event = "menu_query_failed",
                    generation,
                    error = %err
                );
            }
        }
    }
}
