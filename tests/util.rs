#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::FutureExt;
use littlelemon_lib::menu_store::MenuStore;
use littlelemon_lib::remote::{FetchError, MenuSource};
use littlelemon_lib::NewDish;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

pub async fn temp_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect sqlite::memory:")
}

pub async fn temp_store() -> MenuStore {
    let pool = temp_pool().await;
    littlelemon_lib::schema::ensure_schema(&pool)
        .await
        .expect("create menu table");
    MenuStore::new(pool)
}

pub fn dish(name: &str, price: f64, category: &str) -> NewDish {
    NewDish {
        name: name.to_string(),
        price,
        description: format!("{name} from the kitchen"),
        image: format!("{}.jpg", name.to_lowercase().replace(' ', "")),
        category: category.to_string(),
    }
}

pub fn sample_menu() -> Vec<NewDish> {
    vec![
        dish("Greek Salad", 12.5, "starters"),
        dish("Bruschetta", 7.99, "starters"),
        dish("Grilled Fish", 20.0, "mains"),
        dish("Pasta", 18.99, "mains"),
        dish("Lemon Dessert", 6.99, "desserts"),
    ]
}

/// Canned menu source that counts how often it was asked.
pub struct FakeSource {
    rows: Mutex<Vec<NewDish>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(rows: Vec<NewDish>) -> Self {
        Self {
            rows: Mutex::new(rows),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        let source = Self::new(Vec::new());
        source.set_failing(true);
        source
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_rows(&self, rows: Vec<NewDish>) {
        *self.rows.lock().unwrap() = rows;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MenuSource for FakeSource {
    fn fetch_menu(&self) -> BoxFuture<'_, Result<Vec<NewDish>, FetchError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail.load(Ordering::SeqCst) {
            Err(FetchError::Status {
                status: 503,
                url: "https://menu.test/capstone.json".to_string(),
            })
        } else {
            Ok(self.rows.lock().unwrap().clone())
        };
        futures::future::ready(result).boxed()
    }
}
