use std::collections::HashSet;

use crate::dish::Dish;

/// Categories always offered to the user, whether or not any row carries them.
pub const SENTINEL_CATEGORIES: [&str; 2] = ["Drinks", "Specials"];

/// Distinct categories in first-seen order, followed by the sentinels not
/// already present.
pub fn category_universe<'a, I>(categories: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut universe = Vec::new();
    for category in categories {
        if !category.is_empty() && seen.insert(category.to_string()) {
            universe.push(category.to_string());
        }
    }
    for sentinel in SENTINEL_CATEGORIES {
        if seen.insert(sentinel.to_string()) {
            universe.push(sentinel.to_string());
        }
    }
    universe
}

pub fn category_universe_for(dishes: &[Dish]) -> Vec<String> {
    category_universe(dishes.iter().map(|dish| dish.category.as_str()))
}

/// Display label: first character uppercased, rest untouched.
pub fn display_label(category: &str) -> String {
    let mut chars = category.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_and_appends_sentinels() {
        let universe = category_universe(["Mains", "Mains", "Desserts"]);
        assert_eq!(universe, vec!["Mains", "Desserts", "Drinks", "Specials"]);
    }

    #[test]
    fn sentinel_in_data_keeps_first_seen_position() {
        let universe = category_universe(["Specials", "Mains"]);
        assert_eq!(universe, vec!["Specials", "Mains", "Drinks"]);
    }

    #[test]
    fn empty_data_still_offers_sentinels() {
        let universe = category_universe(std::iter::empty());
        assert_eq!(universe, vec!["Drinks", "Specials"]);
    }

    #[test]
    fn labels_capitalise_first_letter() {
        assert_eq!(display_label("starters"), "Starters");
        assert_eq!(display_label(""), "");
    }
}
