//! Property Bag
//!
//! The per-row mutable state of the parsing engine: a string map with
//! case-insensitive keys that preserves insertion order of first
//! assignment. `.Clean` siblings, indexed-array entries (`Key[i]`,
//! `Key.Length`) and the special `Text` cell value are ordinary keys.
//!
//! A bag is newly allocated for every row; bags never share state across
//! rows, so files can be parsed in parallel without coordination.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
struct BagEntry {
    key: String,
    value: String,
}

/// One structured trace record, produced only when tracing is enabled.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub action: String,
    pub input: String,
    pub output: String,
    pub matched: Option<String>,
    pub success: bool,
}

/// Case-insensitive, insertion-ordered string map.
#[derive(Debug, Default)]
pub struct PropertyBag {
    entries: Vec<BagEntry>,
    index: HashMap<String, usize>,
    /// Keys written by an `Assign = true` action (lowercased). Used by the
    /// write-once and stop-on-first-match policies.
    assigned: HashSet<String>,
    trace: Option<Vec<TraceEntry>>,
}

impl PropertyBag {
    pub fn new() -> Self {
        PropertyBag::default()
    }

    /// A bag that records a trace entry per executed action.
    pub fn with_trace() -> Self {
        PropertyBag {
            trace: Some(Vec::new()),
            ..PropertyBag::default()
        }
    }

    /// Set `key` to `value`. The casing of the first write is kept for
    /// iteration; later writes only replace the value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let lower = key.to_lowercase();
        match self.index.get(&lower).copied() {
            Some(idx) => self.entries[idx].value = value,
            None => {
                self.index.insert(lower, self.entries.len());
                self.entries.push(BagEntry {
                    key: key.to_string(),
                    value,
                });
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.index
            .get(&key.to_lowercase())
            .map(|&idx| self.entries[idx].value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(&key.to_lowercase())
    }

    /// Remove a key. Order of the surviving entries is unchanged.
    pub fn unset(&mut self, key: &str) {
        let lower = key.to_lowercase();
        if let Some(idx) = self.index.remove(&lower) {
            self.entries.remove(idx);
            self.assigned.remove(&lower);
            for slot in self.index.values_mut() {
                if *slot > idx {
                    *slot -= 1;
                }
            }
        }
    }

    /// Mark a key as written by an assignment.
    pub fn mark_assigned(&mut self, key: &str) {
        self.assigned.insert(key.to_lowercase());
    }

    pub fn is_assigned(&self, key: &str) -> bool {
        self.assigned.contains(&key.to_lowercase())
    }

    /// Entries in insertion order of first assignment.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|e| (e.key.as_str(), e.value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any key carries the given prefix (case-insensitive).
    pub fn has_key_with_prefix(&self, prefix: &str) -> bool {
        let prefix = prefix.to_lowercase();
        self.index.keys().any(|k| k.starts_with(&prefix))
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace.is_some()
    }

    pub fn push_trace(&mut self, entry: TraceEntry) {
        if let Some(trace) = &mut self.trace {
            trace.push(entry);
        }
    }

    pub fn trace(&self) -> &[TraceEntry] {
        self.trace.as_deref().unwrap_or(&[])
    }
}
