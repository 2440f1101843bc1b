//! Event classification.
//!
//! Tags win over keywords, and within each table order is the contract:
//! reordering a rule changes classification outcomes and is a behavior
//! change, not a refactor.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::event::Category;

/// Ordered keyword rules evaluated against the lowercased combined
/// title + description text. First match wins.
static KEYWORD_RULES: Lazy<Vec<(Regex, Category)>> = Lazy::new(|| {
    [
        (
            r"comedy|stand-?up|improv|open mic",
            Category::Comedy,
        ),
        (
            r"concert|live music|\bgig\b|\bband\b|orchestra|symphony|album release",
            Category::Concert,
        ),
        (
            r"night ?club|\bdj\b|dance party|\bparty\b|\brave\b|afterparty",
            Category::Nightlife,
        ),
        (r"\bfest\b|festival", Category::Festival),
    ]
    .into_iter()
    .map(|(pattern, category)| (Regex::new(pattern).expect("valid regex"), category))
    .collect()
});

/// Assign exactly one category.
///
/// A tag exactly equal to a category name decides immediately, checked
/// in `Category::ALL` priority order. Otherwise the keyword rules run
/// over the combined text; no match means `other`.
pub fn classify(tags: &BTreeSet<String>, title: &str, description: &str) -> Category {
    for category in Category::ALL {
        if tags.contains(category.as_str()) {
            return category;
        }
    }

    let combined = format!("{} {}", title, description).to_lowercase();
    for (pattern, category) in KEYWORD_RULES.iter() {
        if pattern.is_match(&combined) {
            return *category;
        }
    }

    Category::Other
}
