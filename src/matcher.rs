//! Supplier Matcher
//!
//! Picks the active supplier configuration for an input file by matching
//! its file name against each supplier's detection glob patterns. Suppliers
//! are tried in configuration order; the first match wins.

use crate::formats::{CompiledSupplier, ConfigSnapshot};
use glob::MatchOptions;
use std::path::Path;
use std::sync::Arc;

/// Matching is case-insensitive: suppliers name files however they like.
const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

pub struct SupplierMatcher<'a> {
    snapshot: &'a ConfigSnapshot,
}

impl<'a> SupplierMatcher<'a> {
    pub fn new(snapshot: &'a ConfigSnapshot) -> Self {
        SupplierMatcher { snapshot }
    }

    /// Find the supplier whose detection patterns match the file name.
    pub fn find(&self, path: &Path) -> Option<&'a Arc<CompiledSupplier>> {
        let file_name = path.file_name()?.to_str()?;
        self.snapshot.suppliers.iter().find(|supplier| {
            supplier
                .file_name_patterns
                .iter()
                .any(|pattern| pattern.matches_with(file_name, OPTIONS))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::compile_supplier;
    use crate::formats::lookup::LookupSet;
    use crate::formats::model::SupplierDoc;

    fn snapshot(patterns: &[(&str, &[&str])]) -> ConfigSnapshot {
        let suppliers = patterns
            .iter()
            .map(|(name, pats)| {
                let doc: SupplierDoc = serde_json::from_str(&format!(
                    r#"{{
                        "Name": "{name}", "Currency": "USD",
                        "FileStructure": {{ "Detection": {{ "FileNamePatterns": {} }} }}
                    }}"#,
                    serde_json::to_string(pats).unwrap()
                ))
                .unwrap();
                Arc::new(compile_supplier(&doc, &LookupSet::new()).unwrap())
            })
            .collect();
        ConfigSnapshot {
            version: "test".to_string(),
            lookups: LookupSet::new(),
            suppliers,
        }
    }

    #[test]
    fn first_matching_supplier_wins() {
        let snapshot = snapshot(&[
            ("Chk", &["chk*.xls*"]),
            ("Catch", &["*.xlsx"]),
        ]);
        let matcher = SupplierMatcher::new(&snapshot);
        assert_eq!(
            matcher.find(Path::new("/in/chk_2025-01.xlsx")).unwrap().name,
            "Chk"
        );
        assert_eq!(
            matcher.find(Path::new("/in/other.xlsx")).unwrap().name,
            "Catch"
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        let snapshot = snapshot(&[("Chk", &["chk*.xls*"])]);
        let matcher = SupplierMatcher::new(&snapshot);
        assert!(matcher.find(Path::new("/in/CHK_JAN.XLSX")).is_some());
    }

    #[test]
    fn no_pattern_no_match() {
        let snapshot = snapshot(&[("Chk", &["chk*.xls*"])]);
        let matcher = SupplierMatcher::new(&snapshot);
        assert!(matcher.find(Path::new("/in/supplier.csv")).is_none());
    }
}
