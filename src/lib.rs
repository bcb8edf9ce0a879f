pub mod categories;
pub mod config;
pub mod db;
pub mod dish;
pub mod error;
pub mod filter;
pub mod logging;
pub mod menu_store;
pub mod metrics;
pub mod orchestrator;
pub mod profile;
pub mod remote;
pub mod schema;
pub mod state;

pub use error::{AppError, AppResult};
pub use logging::init_logging;

pub use dish::{Dish, NewDish};
pub use filter::{build_predicate, MenuFilter, Predicate};
pub use menu_store::{MemoryMenuStore, MenuRepository, MenuStore};
pub use orchestrator::{CachePhase, MenuCache, MenuView};
pub use remote::{FetchError, HttpMenuSource, MenuSource};
