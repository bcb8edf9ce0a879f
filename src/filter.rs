use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

use crate::dish::Dish;

const LIKE_ESCAPE: char = '\\';

/// The user's current filter selection: selected categories plus search text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuFilter {
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub search: String,
}

impl MenuFilter {
    pub fn new<I, S>(categories: I, search: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
            search: search.into(),
        }
    }

    /// Flips membership of `category`; returns whether it is now selected.
    pub fn toggle(&mut self, category: &str) -> bool {
        if self.categories.remove(category) {
            false
        } else {
            self.categories.insert(category.to_string());
            true
        }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.search.is_empty()
    }

    pub fn predicate(&self) -> Predicate {
        build_predicate(&self.categories, &self.search)
    }
}

/// A read restriction over the menu table. Each variant is one branch of
/// the (category set, search text) combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    All,
    InCategories(Vec<String>),
    NameContains(String),
    InCategoriesAndNameContains {
        categories: Vec<String>,
        text: String,
    },
}

pub fn build_predicate(categories: &BTreeSet<String>, search_text: &str) -> Predicate {
    let categories: Vec<String> = categories.iter().cloned().collect();
    match (categories.is_empty(), search_text.is_empty()) {
        (true, true) => Predicate::All,
        (false, true) => Predicate::InCategories(categories),
        (true, false) => Predicate::NameContains(search_text.to_string()),
        (false, false) => Predicate::InCategoriesAndNameContains {
            categories,
            text: search_text.to_string(),
        },
    }
}

impl Predicate {
    /// Appends the `WHERE` clause (if any) to `qb`. Values are always bound,
    /// never spliced into the SQL text.
    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Predicate::All => {}
            Predicate::InCategories(categories) => {
                qb.push(" WHERE ");
                push_category_in(qb, categories);
            }
            Predicate::NameContains(text) => {
                qb.push(" WHERE ");
                push_name_like(qb, text);
            }
            Predicate::InCategoriesAndNameContains { categories, text } => {
                qb.push(" WHERE ");
                push_category_in(qb, categories);
                qb.push(" AND ");
                push_name_like(qb, text);
            }
        }
    }

    /// In-memory evaluation with the same semantics as the SQL form:
    /// exact category membership, ASCII case-insensitive substring on name.
    pub fn matches(&self, dish: &Dish) -> bool {
        match self {
            Predicate::All => true,
            Predicate::InCategories(categories) => categories.contains(&dish.category),
            Predicate::NameContains(text) => name_contains(&dish.name, text),
            Predicate::InCategoriesAndNameContains { categories, text } => {
                categories.contains(&dish.category) && name_contains(&dish.name, text)
            }
        }
    }
}

fn push_category_in(qb: &mut QueryBuilder<'_, Sqlite>, categories: &[String]) {
    qb.push("category IN (");
    let mut separated = qb.separated(", ");
    for category in categories {
        separated.push_bind(category.clone());
    }
    separated.push_unseparated(")");
}

fn push_name_like(qb: &mut QueryBuilder<'_, Sqlite>, text: &str) {
    qb.push("name LIKE ");
    qb.push_bind(format!("%{}%", escape_like(text)));
    qb.push(" ESCAPE '\\'");
}

/// Escapes `%`, `_` and the escape character itself so the text matches
/// literally inside a `LIKE` pattern.
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch == '%' || ch == '_' || ch == LIKE_ESCAPE {
            out.push(LIKE_ESCAPE);
        }
        out.push(ch);
    }
    out
}

fn name_contains(name: &str, text: &str) -> bool {
    name.to_ascii_lowercase()
        .contains(&text.to_ascii_lowercase())
}
