#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeSet;

use littlelemon_lib::{build_predicate, MemoryMenuStore, MenuFilter, MenuRepository, NewDish};
use proptest::prelude::*;

#[path = "util.rs"]
mod util;

const CATEGORIES: [&str; 4] = ["starters", "mains", "desserts", "Drinks"];

fn dish_strategy() -> impl Strategy<Value = NewDish> {
    ("[a-cA-C%_ ]{0,6}", 0usize..CATEGORIES.len(), 0u32..5000).prop_map(
        |(name, category, cents)| NewDish {
            name,
            price: f64::from(cents) / 100.0,
            description: String::new(),
            image: String::new(),
            category: CATEGORIES[category].to_string(),
        },
    )
}

fn filter_strategy() -> impl Strategy<Value = MenuFilter> {
    (
        proptest::collection::btree_set(0usize..CATEGORIES.len(), 0..3),
        "[a-cA-C%_]{0,2}",
    )
        .prop_map(|(picked, search)| {
            MenuFilter::new(
                picked.into_iter().map(|i| CATEGORIES[i]).collect::<Vec<_>>(),
                search,
            )
        })
}

fn expected(rows: &[NewDish], filter: &MenuFilter) -> Vec<String> {
    let needle = filter.search.to_ascii_lowercase();
    rows.iter()
        .filter(|d| filter.categories.is_empty() || filter.categories.contains(&d.category))
        .filter(|d| d.name.to_ascii_lowercase().contains(&needle))
        .map(|d| d.name.clone())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn sql_filter_matches_reference_semantics(
        rows in proptest::collection::vec(dish_strategy(), 0..12),
        filter in filter_strategy(),
    ) {
        let runtime = tokio::runtime::Runtime::new().expect("create tokio runtime");
        let got = runtime.block_on(async {
            let store = util::temp_store().await;
            store.insert_many(&rows).await.expect("insert rows");
            store.query_filtered(&filter).await.expect("query rows")
        });

        let names: Vec<String> = got.iter().map(|d| d.name.clone()).collect();
        prop_assert_eq!(names, expected(&rows, &filter));
        for dish in &got {
            prop_assert!(
                filter.categories.is_empty() || filter.categories.contains(&dish.category)
            );
        }
    }

    #[test]
    fn memory_store_agrees_with_sql_store(
        rows in proptest::collection::vec(dish_strategy(), 0..12),
        filter in filter_strategy(),
    ) {
        let runtime = tokio::runtime::Runtime::new().expect("create tokio runtime");
        let (sql, memory) = runtime.block_on(async {
            let store = util::temp_store().await;
            store.insert_many(&rows).await.expect("insert rows");
            let sql = store.query_filtered(&filter).await.expect("sql query");
            let memory = MemoryMenuStore::with_rows(&rows);
            let memory = MenuRepository::query_filtered(&memory, &filter)
                .await
                .expect("memory query");
            (sql, memory)
        });
        prop_assert_eq!(sql, memory);
    }

    #[test]
    fn empty_selection_and_text_is_unrestricted(
        categories in proptest::collection::btree_set("[a-z]{1,4}", 0..3),
        text in "[a-z]{0,3}",
    ) {
        let predicate = build_predicate(&categories, &text);
        let unrestricted = categories.is_empty() && text.is_empty();
        prop_assert_eq!(predicate == build_predicate(&BTreeSet::new(), ""), unrestricted);
    }
}
