use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::{Category, SortError};

/// One registered detector class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub class_id: u32,
    pub class_name: String,
    pub category: Category,
}

/// A conforming class name is a short lowercase identifier, not free text.
///
/// Allowed: "bag", "banana_peel", "bottle2"
/// Disallowed: whitespace, punctuation, uppercase.
pub fn validate_class_name(name: &str) -> Result<(), SortError> {
    // Compile once for hot paths.
    static CLASS_NAME_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = CLASS_NAME_RE.get_or_init(|| regex::Regex::new(r"^[a-z0-9_]{1,64}$").unwrap());

    if !re.is_match(name) {
        return Err(SortError::InvalidClassName(name.to_string()));
    }
    Ok(())
}

/// Immutable mapping from detector class ids to names and categories.
///
/// Built once at process start from configuration and passed explicitly into
/// classification. Every id the detector can emit must be present: a lookup
/// miss is a configuration error, never silently defaulted, because a wrong
/// category misroutes an item's disposal stream.
#[derive(Clone, Debug)]
pub struct ClassCatalog {
    entries: Vec<CatalogEntry>,
    by_id: HashMap<u32, usize>,
}

impl ClassCatalog {
    pub fn new(mut entries: Vec<CatalogEntry>) -> Result<Self, SortError> {
        if entries.is_empty() {
            return Err(SortError::EmptyCatalog);
        }
        entries.sort_by_key(|entry| entry.class_id);

        let mut by_id = HashMap::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            validate_class_name(&entry.class_name)?;
            if by_id.insert(entry.class_id, idx).is_some() {
                return Err(SortError::DuplicateClass(entry.class_id));
            }
        }

        Ok(Self { entries, by_id })
    }

    /// Resolve a detector class id. Total over registered ids; absent ids
    /// fail with [`SortError::UnknownClass`].
    pub fn lookup(&self, class_id: u32) -> Result<&CatalogEntry, SortError> {
        self.by_id
            .get(&class_id)
            .map(|idx| &self.entries[*idx])
            .ok_or(SortError::UnknownClass(class_id))
    }

    pub fn contains(&self, class_id: u32) -> bool {
        self.by_id.contains_key(&class_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending class-id order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Class names in one category, in ascending class-id order.
    pub fn names_for(&self, category: Category) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.category == category)
            .map(|entry| entry.class_name.as_str())
            .collect()
    }

    /// All registered class ids, ascending.
    pub fn class_ids(&self) -> Vec<u32> {
        self.entries.iter().map(|entry| entry.class_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SortdConfig;

    fn sample() -> ClassCatalog {
        ClassCatalog::new(SortdConfig::default_classes()).unwrap()
    }

    #[test]
    fn lookup_is_total_and_deterministic_over_registered_ids() {
        let catalog = sample();
        for entry in catalog.entries() {
            let first = catalog.lookup(entry.class_id).unwrap();
            let second = catalog.lookup(entry.class_id).unwrap();
            assert_eq!(first, second);
            assert_eq!(first.class_name, entry.class_name);
            assert_eq!(first.category, entry.category);
        }
    }

    #[test]
    fn lookup_of_absent_id_is_a_configuration_error() {
        let catalog = sample();
        let err = catalog.lookup(99).unwrap_err();
        assert_eq!(err, SortError::UnknownClass(99));
        assert!(err.is_configuration());
    }

    #[test]
    fn rejects_empty_catalog() {
        assert_eq!(
            ClassCatalog::new(Vec::new()).unwrap_err(),
            SortError::EmptyCatalog
        );
    }

    #[test]
    fn rejects_duplicate_class_ids() {
        let entries = vec![
            CatalogEntry {
                class_id: 0,
                class_name: "bag".to_string(),
                category: Category::Inorganic,
            },
            CatalogEntry {
                class_id: 0,
                class_name: "bottle".to_string(),
                category: Category::Inorganic,
            },
        ];
        assert_eq!(
            ClassCatalog::new(entries).unwrap_err(),
            SortError::DuplicateClass(0)
        );
    }

    #[test]
    fn rejects_malformed_class_names() {
        let too_long = "x".repeat(65);
        for bad in ["Banana Peel", "", "UPPER", "peel!", too_long.as_str()] {
            assert!(validate_class_name(bad).is_err(), "accepted {:?}", bad);
        }
        for good in ["bag", "banana_peel", "leaves", "class_42"] {
            assert!(validate_class_name(good).is_ok(), "rejected {:?}", good);
        }
    }

    #[test]
    fn groups_names_by_category() {
        let catalog = sample();
        assert_eq!(catalog.names_for(Category::Inorganic), vec![
            "bag", "bottle", "can"
        ]);
        assert_eq!(catalog.names_for(Category::Organic), vec![
            "banana_peel",
            "eggshell",
            "leaves"
        ]);
    }
}
