//! Lookup Tables
//!
//! Named case-insensitive translation tables shared by `Find lookup:<name>`
//! and `Map`. Input keys are matched case-insensitively; the canonical value
//! is the stored form. Tables are immutable once compiled into a
//! configuration snapshot and safe to share across threads.

use std::collections::HashMap;

/// One entry of a lookup table: `input` (matched case-insensitively)
/// maps to `canonical` (the stored form).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupEntry {
    pub input: String,
    pub canonical: String,
}

/// A single named lookup table.
///
/// Entries keep their declaration order; ties between equally long matches
/// are broken by it.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    name: String,
    entries: Vec<LookupEntry>,
    by_input: HashMap<String, usize>,
}

/// One occurrence of a table entry inside a searched text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupHit {
    /// Byte offset of the occurrence
    pub start: usize,
    /// Byte length of the occurrence
    pub len: usize,
    /// The matched substring as it appears in the text
    pub text: String,
    /// The canonical value of the matched entry
    pub canonical: String,
}

impl LookupHit {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

impl LookupTable {
    pub fn new(name: impl Into<String>) -> Self {
        LookupTable {
            name: name.into(),
            entries: Vec::new(),
            by_input: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add an entry. A duplicate input (case-insensitive) replaces the
    /// earlier canonical value, matching the "later file wins" merge rule.
    pub fn insert(&mut self, input: impl Into<String>, canonical: impl Into<String>) {
        let input = input.into();
        let canonical = canonical.into();
        let key = input.to_lowercase();
        match self.by_input.get(&key).copied() {
            Some(idx) => self.entries[idx].canonical = canonical,
            None => {
                self.by_input.insert(key, self.entries.len());
                self.entries.push(LookupEntry { input, canonical });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Translate a whole value (trimmed, case-insensitive). This is the
    /// `Map` operation's primitive.
    pub fn get(&self, input: &str) -> Option<&str> {
        self.by_input
            .get(&input.trim().to_lowercase())
            .map(|&idx| self.entries[idx].canonical.as_str())
    }

    /// Find every occurrence of any entry inside `text`, case-insensitively.
    ///
    /// Hits are ordered by start offset; at equal offsets the longer entry
    /// comes first, so the head of the slice at any position is the
    /// longest match there. Overlapping hits are all reported; selection
    /// (first / last / all) is the caller's concern.
    pub fn occurrences(&self, text: &str) -> Vec<LookupHit> {
        let lower = text.to_lowercase();
        let mut hits = Vec::new();
        for entry in &self.entries {
            if entry.input.is_empty() {
                continue;
            }
            let needle = entry.input.to_lowercase();
            let mut from = 0;
            while let Some(pos) = lower[from..].find(&needle) {
                let start = from + pos;
                // needle length in the lowercased text equals the span in the
                // original only when lowercasing preserves byte length; guard
                // against the rare expansion cases.
                let len = needle.len();
                if start + len <= text.len() && text.is_char_boundary(start + len) {
                    hits.push(LookupHit {
                        start,
                        len,
                        text: text[start..start + len].to_string(),
                        canonical: entry.canonical.clone(),
                    });
                }
                from = start + needle.len().max(1);
            }
        }
        hits.sort_by(|a, b| a.start.cmp(&b.start).then(b.len.cmp(&a.len)));
        hits
    }

    pub fn entries(&self) -> &[LookupEntry] {
        &self.entries
    }
}

/// The set of lookup tables visible to one supplier: the shared tables from
/// the main document, overlaid with any per-supplier overrides.
#[derive(Debug, Clone, Default)]
pub struct LookupSet {
    tables: HashMap<String, LookupTable>,
}

impl LookupSet {
    pub fn new() -> Self {
        LookupSet {
            tables: HashMap::new(),
        }
    }

    /// Insert a table, replacing any existing table of the same name
    /// (case-insensitive).
    pub fn insert(&mut self, table: LookupTable) {
        self.tables.insert(table.name().to_lowercase(), table);
    }

    pub fn get(&self, name: &str) -> Option<&LookupTable> {
        self.tables.get(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_lowercase())
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.values().map(LookupTable::name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Overlay `other` on top of this set: tables in `other` replace tables
    /// of the same name here.
    pub fn merged_with(&self, other: &LookupSet) -> LookupSet {
        let mut merged = self.clone();
        for table in other.tables.values() {
            merged.insert(table.clone());
        }
        merged
    }
}
