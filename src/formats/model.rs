//! Supplier Configuration Documents
//!
//! Serde model for the JSON documents the configuration store loads: the
//! main document (`Version` + `Lookups` + optional embedded `Suppliers`) and
//! standalone per-supplier documents. Field names accept both PascalCase and
//! camelCase. These are raw documents; compilation into executable rules
//! happens in [`crate::formats::compile`].

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;

/// An ordered string-to-string parameter map.
///
/// JSON object entries are kept in declaration order because `Switch`
/// evaluates its `When:<k>` arms in that order. Scalar JSON values other
/// than strings (numbers, booleans) are accepted and stringified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(pub Vec<(String, String)>);

impl Params {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for Params {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ParamsVisitor;

        impl<'de> Visitor<'de> for ParamsVisitor {
            type Value = Params;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of string parameters")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Params, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut out = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, serde_json::Value>()? {
                    let text = match value {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Bool(b) => b.to_string(),
                        serde_json::Value::Number(n) => n.to_string(),
                        serde_json::Value::Null => String::new(),
                        other => {
                            return Err(serde::de::Error::custom(format!(
                                "parameter '{key}' must be a scalar, got {other}"
                            )))
                        }
                    };
                    out.push((key, text));
                }
                Ok(Params(out))
            }
        }

        deserializer.deserialize_map(ParamsVisitor)
    }
}

/// The main supplier-formats document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GlobalDoc {
    #[serde(alias = "version")]
    pub version: String,

    /// Shared lookup tables: table name -> (input -> canonical), all
    /// case-insensitive on read.
    #[serde(default, alias = "lookups")]
    pub lookups: HashMap<String, Params>,

    /// Suppliers embedded in the main document. Standalone per-supplier
    /// files replace embedded entries of the same name.
    #[serde(default, alias = "suppliers")]
    pub suppliers: Vec<SupplierDoc>,
}

/// One supplier's configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SupplierDoc {
    #[serde(alias = "name")]
    pub name: String,

    #[serde(alias = "currency")]
    pub currency: String,

    #[serde(default, alias = "description")]
    pub description: Option<String>,

    #[serde(default, alias = "fileStructure")]
    pub file_structure: FileStructureDoc,

    #[serde(default, alias = "parserConfig")]
    pub parser_config: ParserConfigDoc,

    #[serde(default, alias = "subtitleHandling")]
    pub subtitle_handling: Option<SubtitleHandlingDoc>,

    /// Per-supplier lookup overrides, overlaid on the shared tables.
    #[serde(default, alias = "lookups")]
    pub lookups: HashMap<String, Params>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileStructureDoc {
    /// First data row, 1-based (spreadsheet convention).
    #[serde(
        default = "default_data_start_row",
        alias = "dataStartRowIndex",
        alias = "DataStartRow",
        alias = "dataStartRow"
    )]
    pub data_start_row_index: usize,

    /// Header row, 1-based. Zero means no header row.
    #[serde(default, alias = "headerRowIndex", alias = "HeaderRow", alias = "headerRow")]
    pub header_row_index: usize,

    #[serde(default, alias = "expectedColumnCount")]
    pub expected_column_count: usize,

    #[serde(default, alias = "detection")]
    pub detection: DetectionDoc,
}

fn default_data_start_row() -> usize {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DetectionDoc {
    #[serde(default, alias = "fileNamePatterns")]
    pub file_name_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParserConfigDoc {
    #[serde(default, alias = "settings")]
    pub settings: SettingsDoc,

    #[serde(default, alias = "columnRules")]
    pub column_rules: Vec<ColumnRuleDoc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SettingsDoc {
    #[serde(default, alias = "stopOnFirstMatchPerColumn")]
    pub stop_on_first_match_per_column: bool,

    #[serde(default = "default_true", alias = "preferFirstAssignment")]
    pub prefer_first_assignment: bool,

    #[serde(default = "default_culture", alias = "defaultCulture")]
    pub default_culture: String,

    /// When set, every action execution appends a structured entry to the
    /// row's property-bag trace.
    #[serde(default, alias = "trace")]
    pub trace: bool,
}

fn default_true() -> bool {
    true
}

fn default_culture() -> String {
    "en-US".to_string()
}

impl Default for SettingsDoc {
    fn default() -> Self {
        SettingsDoc {
            stop_on_first_match_per_column: false,
            prefer_first_assignment: true,
            default_culture: default_culture(),
            trace: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ColumnRuleDoc {
    /// Column letter ("A", "B", ... "AA") or 1-based index as a number.
    #[serde(alias = "column")]
    pub column: String,

    #[serde(default, alias = "actions")]
    pub actions: Vec<ActionDoc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionDoc {
    #[serde(alias = "op")]
    pub op: String,

    /// Input reference: `Text`, `<Key>`, `<Key>.Clean`, `<Arr>[i]`,
    /// `<Arr>.Length`. Defaults to the current cell text.
    #[serde(default = "default_input", alias = "input")]
    pub input: String,

    #[serde(default, alias = "output")]
    pub output: String,

    /// Marks the write as an assignment to a persisted output (`Product.*`
    /// / `Offer.*`), which is what the per-column and per-row policies key
    /// on. Defaults to true.
    #[serde(default = "default_true", alias = "assign")]
    pub assign: bool,

    #[serde(default, alias = "condition")]
    pub condition: Option<String>,

    #[serde(default, alias = "parameters")]
    pub parameters: Params,
}

fn default_input() -> String {
    "Text".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubtitleHandlingDoc {
    #[serde(default, alias = "rules")]
    pub rules: Vec<SubtitleRuleDoc>,

    /// What to do with rows no detection rule matched: `"parse"` (default)
    /// keeps them; `"skip"` drops those that also have fewer non-blank
    /// cells than the expected column count.
    #[serde(default, alias = "fallbackAction")]
    pub fallback_action: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubtitleRuleDoc {
    #[serde(alias = "name")]
    pub name: String,

    /// Key under which the captured value is stored in the row's subtitle
    /// data. Defaults to the rule name.
    #[serde(default, alias = "key")]
    pub key: Option<String>,

    /// `columnCount`, `pattern` or `hybrid`.
    #[serde(alias = "method")]
    pub method: String,

    #[serde(default, alias = "expectedColumnCount")]
    pub expected_column_count: Option<usize>,

    #[serde(default, alias = "validationPatterns")]
    pub validation_patterns: Vec<String>,

    #[serde(default, alias = "transforms")]
    pub transforms: Vec<TransformDoc>,

    #[serde(default, alias = "applyToSubsequentRows")]
    pub apply_to_subsequent_rows: bool,

    /// `"parse"` (default) keeps matched rows tagged; `"skip"` removes them
    /// from the data stream.
    #[serde(default, alias = "action")]
    pub action: Option<String>,

    #[serde(default, alias = "assignments")]
    pub assignments: Vec<AssignmentDoc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransformDoc {
    /// Transform kind; `removePrefix` is the only supported kind.
    #[serde(alias = "type", alias = "Kind", alias = "kind")]
    pub r#type: String,

    #[serde(alias = "pattern")]
    pub pattern: String,

    #[serde(default, alias = "ignoreCase")]
    pub ignore_case: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssignmentDoc {
    #[serde(alias = "sourceKey")]
    pub source_key: String,

    #[serde(alias = "targetProperty")]
    pub target_property: String,

    /// Optional lookup table the value is translated through on the way in.
    #[serde(default, alias = "lookupTable")]
    pub lookup_table: Option<String>,

    /// Whether a value already set by the row pipeline is replaced.
    #[serde(default, alias = "overwrite")]
    pub overwrite: bool,
}
