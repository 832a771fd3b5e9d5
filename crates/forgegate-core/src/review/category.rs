//! Static synonym table from free-form category strings onto [`Category`].
//!
//! Lookup is case-insensitive and treats `_` and `-` as spaces. An exact
//! match wins; otherwise the first table entry found as a whole-word phrase
//! inside the input is used. Anything else maps to [`Category::General`].

use crate::domain::Category;

/// Every recognized spelling, canonical names included.
pub static CATEGORY_SYNONYMS: &[(&str, Category)] = &[
    // Security
    ("security", Category::Security),
    ("sql injection", Category::Security),
    ("injection", Category::Security),
    ("xss", Category::Security),
    ("cross site scripting", Category::Security),
    ("csrf", Category::Security),
    ("authentication", Category::Security),
    ("authorization", Category::Security),
    ("auth", Category::Security),
    ("secret", Category::Security),
    ("secrets", Category::Security),
    ("cryptography", Category::Security),
    ("crypto", Category::Security),
    ("vulnerability", Category::Security),
    ("input validation", Category::Security),
    // Performance
    ("performance", Category::Performance),
    ("perf", Category::Performance),
    ("efficiency", Category::Performance),
    ("latency", Category::Performance),
    ("memory", Category::Performance),
    ("scalability", Category::Performance),
    ("caching", Category::Performance),
    ("n+1", Category::Performance),
    // Correctness
    ("correctness", Category::Correctness),
    ("bug", Category::Correctness),
    ("logic", Category::Correctness),
    ("logic error", Category::Correctness),
    ("functionality", Category::Correctness),
    ("functional", Category::Correctness),
    ("accuracy", Category::Correctness),
    // Reliability
    ("reliability", Category::Reliability),
    ("error handling", Category::Reliability),
    ("robustness", Category::Reliability),
    ("resilience", Category::Reliability),
    ("concurrency", Category::Reliability),
    ("race condition", Category::Reliability),
    ("availability", Category::Reliability),
    // Maintainability
    ("maintainability", Category::Maintainability),
    ("code quality", Category::Maintainability),
    ("quality", Category::Maintainability),
    ("readability", Category::Maintainability),
    ("complexity", Category::Maintainability),
    ("duplication", Category::Maintainability),
    ("refactoring", Category::Maintainability),
    ("technical debt", Category::Maintainability),
    ("tech debt", Category::Maintainability),
    // Testing
    ("testing", Category::Testing),
    ("test", Category::Testing),
    ("tests", Category::Testing),
    ("test coverage", Category::Testing),
    ("coverage", Category::Testing),
    ("qa", Category::Testing),
    // Documentation
    ("documentation", Category::Documentation),
    ("docs", Category::Documentation),
    ("doc", Category::Documentation),
    ("comments", Category::Documentation),
    // Architecture
    ("architecture", Category::Architecture),
    ("design", Category::Architecture),
    ("api design", Category::Architecture),
    ("structure", Category::Architecture),
    ("modularity", Category::Architecture),
    ("coupling", Category::Architecture),
    // Style
    ("style", Category::Style),
    ("formatting", Category::Style),
    ("naming", Category::Style),
    ("lint", Category::Style),
    ("convention", Category::Style),
    ("conventions", Category::Style),
    // Fallback spelled out
    ("general", Category::General),
    ("other", Category::General),
];

/// Map a free-form category onto the canonical set. `None` means the input
/// was not recognized and the caller should fall back to `General`.
pub fn canonical_category(raw: &str) -> Option<Category> {
    let normalized = normalize_key(raw);
    if normalized.is_empty() {
        return None;
    }

    if let Some((_, category)) = CATEGORY_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == normalized)
    {
        return Some(*category);
    }

    let padded = format!(" {normalized} ");
    CATEGORY_SYNONYMS
        .iter()
        .find(|(synonym, _)| padded.contains(&format!(" {synonym} ")))
        .map(|(_, category)| *category)
}

fn normalize_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace(['_', '-', '/'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_exact_synonyms_case_insensitive() {
        assert_eq!(canonical_category("SQL Injection"), Some(Category::Security));
        assert_eq!(canonical_category("perf"), Some(Category::Performance));
        assert_eq!(canonical_category("Error_Handling"), Some(Category::Reliability));
        assert_eq!(canonical_category("api-design"), Some(Category::Architecture));
    }

    #[test]
    fn test_phrase_containment() {
        assert_eq!(
            canonical_category("possible sql injection risk"),
            Some(Category::Security)
        );
        assert_eq!(
            canonical_category("missing unit tests"),
            Some(Category::Testing)
        );
    }

    #[test]
    fn test_unknown_returns_none() {
        assert_eq!(canonical_category("vibes"), None);
        assert_eq!(canonical_category("   "), None);
        // "test" must match as a whole word only
        assert_eq!(canonical_category("latest"), None);
    }

    #[test]
    fn test_every_canonical_name_maps_to_itself() {
        let all = [
            Category::Security,
            Category::Performance,
            Category::Correctness,
            Category::Reliability,
            Category::Maintainability,
            Category::Testing,
            Category::Documentation,
            Category::Architecture,
            Category::Style,
            Category::General,
        ];
        for category in all {
            assert_eq!(canonical_category(category.as_str()), Some(category));
        }
    }

    #[test]
    fn test_table_has_no_duplicate_keys() {
        let mut seen = HashSet::new();
        for (synonym, _) in CATEGORY_SYNONYMS {
            assert!(seen.insert(*synonym), "duplicate synonym {synonym}");
            assert_eq!(*synonym, normalize_key(synonym), "key {synonym} not normalized");
        }
    }
}
