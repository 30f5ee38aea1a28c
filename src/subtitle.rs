//! Subtitle Processor
//!
//! Detects "header-like" rows inside the data body (brand groupings,
//! category separators), extracts a keyed value from them, and propagates
//! that value to the following data rows as inherited metadata.
//!
//! Detection rules run in declaration order; the first match wins. A rule
//! matches by column count, by pattern over the concatenated non-blank
//! cells, or both (`hybrid`).

use crate::engine::bag::PropertyBag;
use crate::formats::lookup::LookupSet;
use crate::formats::model::SubtitleHandlingDoc;
use crate::grid::RowData;
use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    /// Exactly `expected_column_count` non-blank cells
    ColumnCount,
    /// Concatenated non-blank cells match one of the patterns
    Pattern,
    /// Both of the above
    Hybrid,
}

impl DetectionMethod {
    fn parse(method: &str) -> Option<DetectionMethod> {
        match method.trim().to_lowercase().as_str() {
            "columncount" => Some(DetectionMethod::ColumnCount),
            "pattern" => Some(DetectionMethod::Pattern),
            "hybrid" => Some(DetectionMethod::Hybrid),
            _ => None,
        }
    }
}

/// A value transform applied to the captured cell. `removePrefix` deletes
/// the first occurrence of the pattern.
#[derive(Debug, Clone)]
pub struct SubtitleTransform {
    regex: Regex,
}

impl SubtitleTransform {
    fn apply(&self, value: &str) -> String {
        self.regex.replacen(value, 1, "").trim().to_string()
    }
}

/// Maps a subtitle key to a property-bag target, optionally through a
/// lookup table.
#[derive(Debug, Clone)]
pub struct SubtitleAssignment {
    pub source_key: String,
    pub target_property: String,
    pub lookup_table: Option<String>,
    pub overwrite: bool,
}

#[derive(Debug, Clone)]
pub struct SubtitleRule {
    pub name: String,
    /// Key the captured value is stored under; defaults to the rule name
    pub key: String,
    pub method: DetectionMethod,
    pub expected_column_count: Option<usize>,
    patterns: Vec<Regex>,
    transforms: Vec<SubtitleTransform>,
    pub apply_to_subsequent_rows: bool,
    /// `Action = "skip"`: matched rows are removed from the data stream
    pub skip_row: bool,
    pub assignments: Vec<SubtitleAssignment>,
}

impl SubtitleRule {
    fn matches(&self, row: &RowData) -> bool {
        let count_ok = || {
            self.expected_column_count
                .map(|expected| row.non_blank_count() == expected)
                .unwrap_or(false)
        };
        let pattern_ok = || {
            let joined = row.non_blank_values().collect::<Vec<_>>().join(" ");
            self.patterns.iter().any(|p| p.is_match(&joined))
        };
        match self.method {
            DetectionMethod::ColumnCount => count_ok(),
            DetectionMethod::Pattern => pattern_ok(),
            DetectionMethod::Hybrid => count_ok() && pattern_ok(),
        }
    }

    fn capture(&self, row: &RowData) -> Option<String> {
        let mut value = row.first_non_blank()?.to_string();
        for transform in &self.transforms {
            value = transform.apply(&value);
        }
        Some(value)
    }
}

/// The compiled subtitle configuration of one supplier.
#[derive(Debug, Clone)]
pub struct SubtitleHandling {
    pub rules: Vec<SubtitleRule>,
    /// Drop non-matching rows that also fail the structural requirement
    fallback_skip: bool,
    /// Structural requirement: minimum non-blank cells for a data row
    expected_columns: usize,
}

impl SubtitleHandling {
    /// Compile the raw document. Pattern errors and unknown lookup tables
    /// are load-time failures.
    pub fn build(
        doc: &SubtitleHandlingDoc,
        expected_columns: usize,
        lookups: &LookupSet,
    ) -> Result<SubtitleHandling, String> {
        let mut rules = Vec::with_capacity(doc.rules.len());
        for rule in &doc.rules {
            let method = DetectionMethod::parse(&rule.method)
                .ok_or_else(|| format!("subtitle rule '{}': unknown method '{}'", rule.name, rule.method))?;

            if matches!(method, DetectionMethod::ColumnCount | DetectionMethod::Hybrid)
                && rule.expected_column_count.is_none()
            {
                return Err(format!(
                    "subtitle rule '{}': method {:?} requires ExpectedColumnCount",
                    rule.name, rule.method
                ));
            }
            if matches!(method, DetectionMethod::Pattern | DetectionMethod::Hybrid)
                && rule.validation_patterns.is_empty()
            {
                return Err(format!(
                    "subtitle rule '{}': method {:?} requires ValidationPatterns",
                    rule.name, rule.method
                ));
            }

            let patterns = rule
                .validation_patterns
                .iter()
                .map(|p| Regex::new(p).map_err(|e| format!("subtitle rule '{}': {e}", rule.name)))
                .collect::<Result<Vec<_>, _>>()?;

            let transforms = rule
                .transforms
                .iter()
                .map(|t| {
                    if !t.r#type.eq_ignore_ascii_case("removePrefix") {
                        return Err(format!(
                            "subtitle rule '{}': unknown transform '{}'",
                            rule.name, t.r#type
                        ));
                    }
                    RegexBuilder::new(&t.pattern)
                        .case_insensitive(t.ignore_case)
                        .build()
                        .map(|regex| SubtitleTransform { regex })
                        .map_err(|e| format!("subtitle rule '{}': {e}", rule.name))
                })
                .collect::<Result<Vec<_>, _>>()?;

            for assignment in &rule.assignments {
                if let Some(table) = &assignment.lookup_table {
                    if !lookups.contains(table) {
                        return Err(format!(
                            "subtitle rule '{}': unknown lookup table '{table}'",
                            rule.name
                        ));
                    }
                }
            }

            rules.push(SubtitleRule {
                name: rule.name.clone(),
                key: rule.key.clone().unwrap_or_else(|| rule.name.clone()),
                method,
                expected_column_count: rule.expected_column_count,
                patterns,
                transforms,
                apply_to_subsequent_rows: rule.apply_to_subsequent_rows,
                skip_row: rule
                    .action
                    .as_deref()
                    .map(|a| a.eq_ignore_ascii_case("skip"))
                    .unwrap_or(false),
                assignments: rule
                    .assignments
                    .iter()
                    .map(|a| SubtitleAssignment {
                        source_key: a.source_key.clone(),
                        target_property: a.target_property.clone(),
                        lookup_table: a.lookup_table.clone(),
                        overwrite: a.overwrite,
                    })
                    .collect(),
            });
        }

        Ok(SubtitleHandling {
            rules,
            fallback_skip: doc
                .fallback_action
                .as_deref()
                .map(|a| a.eq_ignore_ascii_case("skip"))
                .unwrap_or(false),
            expected_columns,
        })
    }

    /// Run detection and propagation over the data rows. Returns the
    /// surviving rows, tagged and carrying inherited subtitle data.
    pub fn apply(&self, rows: Vec<RowData>) -> Vec<RowData> {
        let mut out = Vec::with_capacity(rows.len());
        // Accumulated subtitle values, replaced per-key when the next
        // matching subtitle row arrives.
        let mut inherited: Vec<(String, String)> = Vec::new();

        for mut row in rows {
            if !row.has_data() {
                continue;
            }

            match self.rules.iter().find(|rule| rule.matches(&row)) {
                Some(rule) => {
                    row.is_subtitle_row = true;
                    row.subtitle_rule = Some(rule.name.clone());
                    if let Some(value) = rule.capture(&row) {
                        row.subtitle_data = vec![(rule.key.clone(), value.clone())];
                        if rule.apply_to_subsequent_rows {
                            match inherited.iter().position(|(k, _)| k.eq_ignore_ascii_case(&rule.key)) {
                                Some(idx) => inherited[idx].1 = value,
                                None => inherited.push((rule.key.clone(), value)),
                            }
                        }
                    }
                    if !rule.skip_row {
                        out.push(row);
                    }
                }
                None => {
                    if self.fallback_skip
                        && self.expected_columns > 0
                        && row.non_blank_count() < self.expected_columns
                    {
                        continue;
                    }
                    for (key, value) in &inherited {
                        if row.subtitle_value(key).is_none() {
                            row.subtitle_data.push((key.clone(), value.clone()));
                        }
                    }
                    out.push(row);
                }
            }
        }
        out
    }

    /// Apply the configured assignments to a row's bag, after the column
    /// rules ran. `Overwrite = false` only fills keys the pipeline left
    /// unset.
    pub fn apply_assignments(&self, row: &RowData, bag: &mut PropertyBag, lookups: &LookupSet) {
        for rule in &self.rules {
            for assignment in &rule.assignments {
                let Some(raw) = row.subtitle_value(&assignment.source_key) else {
                    continue;
                };
                let value = match &assignment.lookup_table {
                    Some(table) => match lookups.get(table).and_then(|t| t.get(raw)) {
                        Some(canonical) => canonical.to_string(),
                        None => continue,
                    },
                    None => raw.to_string(),
                };
                if assignment.overwrite || !bag.contains_key(&assignment.target_property) {
                    bag.set(&assignment.target_property, value);
                    bag.mark_assigned(&assignment.target_property);
                }
            }
        }
    }
}
