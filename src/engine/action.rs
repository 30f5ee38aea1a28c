//! Actions
//!
//! The tagged variant over the nine ops (`Assign`, `Find`, `Map`, `Split`,
//! `Switch`, `Convert`, `Concat`, `CaseFormat`, `Clear`) plus the factory
//! that builds them from raw [`ActionDoc`]s. The factory validates
//! parameters and compiles patterns at load time, so a construction error
//! surfaces as a configuration validation failure, never at row time.

use crate::engine::bag::PropertyBag;
use crate::engine::condition::Condition;
use crate::engine::text::{self, CaseMode};
use crate::formats::lookup::{LookupHit, LookupSet};
use crate::formats::model::ActionDoc;
use regex::{Captures, Regex, RegexBuilder};

/// Which occurrence(s) a `Find` selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Select {
    #[default]
    First,
    Last,
    All,
}

/// A compiled regex plus its named capture groups, used for the
/// named-group priority rule.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub regex: Regex,
    named_groups: Vec<String>,
}

impl CompiledPattern {
    fn compile(pattern: &str, ignore_case: bool) -> Result<CompiledPattern, String> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(ignore_case)
            .build()
            .map_err(|e| format!("invalid pattern '{pattern}': {e}"))?;
        let named_groups = regex
            .capture_names()
            .flatten()
            .map(str::to_string)
            .collect();
        Ok(CompiledPattern { regex, named_groups })
    }

    /// Pick the captured value: a single named group wins outright;
    /// otherwise `value` > `num` > `size` > `content` by priority;
    /// otherwise the whole match.
    fn captured<'t>(&self, caps: &Captures<'t>) -> &'t str {
        if self.named_groups.len() == 1 {
            if let Some(m) = caps.name(&self.named_groups[0]) {
                return m.as_str();
            }
        } else {
            for name in ["value", "num", "size", "content"] {
                if self.named_groups.iter().any(|g| g == name) {
                    if let Some(m) = caps.name(name) {
                        return m.as_str();
                    }
                }
            }
        }
        caps.get(0).map(|m| m.as_str()).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub enum FindPattern {
    /// `lookup:<table>`: longest case-insensitive table entry
    Lookup(String),
    Regex(CompiledPattern),
}

/// The op itself, with everything compiled at load time.
#[derive(Debug, Clone)]
pub enum ActionOp {
    Assign,
    Find {
        pattern: FindPattern,
        select: Select,
        remove: bool,
    },
    Map {
        table: String,
    },
    Split {
        delimiter: String,
    },
    Switch {
        arms: Vec<(String, String)>,
        default: Option<String>,
        ignore_case: bool,
    },
    Convert {
        from_unit: String,
        to_unit: String,
        factor: f64,
    },
    Concat {
        keys: Vec<String>,
        separator: String,
    },
    CaseFormat {
        mode: CaseMode,
        culture: Option<String>,
    },
    Clear,
}

/// A fully compiled action ready for row evaluation.
#[derive(Debug, Clone)]
pub struct CompiledAction {
    /// The op name as written in the document, for logs and traces
    pub op_name: String,
    pub input: String,
    pub output: String,
    pub assign: bool,
    pub condition: Option<Condition>,
    pub op: ActionOp,
}

/// The value an op produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpValue {
    Scalar(String),
    Array(Vec<String>),
    /// `Clear` produces no value; it unsets instead
    Cleared,
}

/// A successful op execution.
#[derive(Debug, Clone)]
pub struct OpSuccess {
    pub value: OpValue,
    /// The matched text, for traces
    pub matched: Option<String>,
    /// The input minus the matched span(s) when `remove` was set
    pub clean: Option<String>,
}

impl CompiledAction {
    /// Build and validate one action. Errors are plain messages; the
    /// configuration store wraps them with supplier/column/index context.
    pub fn build(doc: &ActionDoc, lookups: &LookupSet) -> Result<CompiledAction, String> {
        let params = &doc.parameters;
        if doc.output.trim().is_empty() {
            return Err("action requires an Output key".to_string());
        }

        let op = match doc.op.trim().to_lowercase().as_str() {
            "assign" => ActionOp::Assign,
            "find" => {
                let raw = params
                    .get("Pattern")
                    .ok_or_else(|| "Find requires a Pattern parameter".to_string())?;
                let (select, ignore_case, remove) = parse_options(params.get("Options"))?;
                let lookup_table = (raw.len() > 7
                    && raw.is_char_boundary(7)
                    && raw[..7].eq_ignore_ascii_case("lookup:"))
                .then(|| &raw[7..]);
                let pattern = match lookup_table {
                    Some(table) => {
                        let table = table.trim();
                        if !lookups.contains(table) {
                            return Err(format!("Find references unknown lookup table '{table}'"));
                        }
                        FindPattern::Lookup(table.to_string())
                    }
                    None => FindPattern::Regex(CompiledPattern::compile(raw, ignore_case)?),
                };
                ActionOp::Find { pattern, select, remove }
            }
            "map" => {
                let table = params
                    .get("Table")
                    .ok_or_else(|| "Map requires a Table parameter".to_string())?;
                if !lookups.contains(table) {
                    return Err(format!("Map references unknown lookup table '{table}'"));
                }
                ActionOp::Map { table: table.to_string() }
            }
            "split" => {
                let delimiter = params
                    .get("Delimiter")
                    .ok_or_else(|| "Split requires a Delimiter parameter".to_string())?;
                if delimiter.is_empty() {
                    return Err("Split delimiter must not be empty".to_string());
                }
                ActionOp::Split { delimiter: delimiter.to_string() }
            }
            "switch" => {
                let mut arms = Vec::new();
                for (key, value) in params.iter() {
                    if let Some(arm) = key.strip_prefix("When:") {
                        arms.push((arm.to_string(), value.to_string()));
                    }
                }
                let default = params.get("Default").map(str::to_string);
                if arms.is_empty() && default.is_none() {
                    return Err("Switch requires at least one When:<k> arm or a Default".to_string());
                }
                let ignore_case = params
                    .get("IgnoreCase")
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false);
                ActionOp::Switch { arms, default, ignore_case }
            }
            "convert" => {
                let factor = params
                    .get("Factor")
                    .ok_or_else(|| "Convert requires a Factor parameter".to_string())?;
                let factor: f64 = factor
                    .parse()
                    .map_err(|_| format!("Convert factor '{factor}' is not numeric"))?;
                ActionOp::Convert {
                    from_unit: params.get("FromUnit").unwrap_or_default().to_string(),
                    to_unit: params.get("ToUnit").unwrap_or_default().to_string(),
                    factor,
                }
            }
            "concat" => {
                let keys: Vec<String> = params
                    .get("Keys")
                    .ok_or_else(|| "Concat requires a Keys parameter".to_string())?
                    .split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect();
                if keys.is_empty() {
                    return Err("Concat Keys must list at least one key".to_string());
                }
                ActionOp::Concat {
                    keys,
                    separator: params.get("Separator").unwrap_or_default().to_string(),
                }
            }
            "caseformat" => {
                let mode = params
                    .get("Mode")
                    .ok_or_else(|| "CaseFormat requires a Mode parameter".to_string())?;
                let mode = CaseMode::parse(mode)
                    .ok_or_else(|| format!("CaseFormat mode '{mode}' is not title/upper/lower"))?;
                ActionOp::CaseFormat {
                    mode,
                    culture: params.get("Culture").map(str::to_string),
                }
            }
            "clear" => ActionOp::Clear,
            other => return Err(format!("unknown op '{other}'")),
        };

        let condition = match &doc.condition {
            Some(expr) if !expr.trim().is_empty() => {
                Some(Condition::parse(expr).map_err(|e| e.to_string())?)
            }
            _ => None,
        };

        Ok(CompiledAction {
            op_name: doc.op.clone(),
            input: doc.input.clone(),
            output: doc.output.clone(),
            assign: doc.assign,
            condition,
            op,
        })
    }

    /// Whether the op reads the `Input` reference at all.
    pub fn needs_input(&self) -> bool {
        !matches!(self.op, ActionOp::Clear | ActionOp::Concat { .. })
    }

    /// Run the op. `Ok(None)` is the unsuccessful-but-quiet case (no match,
    /// value not in table, non-numeric input); `Err` is a genuine runtime
    /// error that the engine logs and skips.
    pub fn execute(
        &self,
        input: &str,
        bag: &PropertyBag,
        lookups: &LookupSet,
    ) -> Result<Option<OpSuccess>, String> {
        match &self.op {
            ActionOp::Assign => Ok(Some(OpSuccess {
                value: OpValue::Scalar(input.to_string()),
                matched: None,
                clean: None,
            })),

            ActionOp::Find { pattern, select, remove } => match pattern {
                FindPattern::Lookup(table) => {
                    let table = lookups
                        .get(table)
                        .ok_or_else(|| format!("lookup table '{table}' is gone"))?;
                    Ok(find_lookup(table.occurrences(input), input, *select, *remove))
                }
                FindPattern::Regex(compiled) => {
                    Ok(find_regex(compiled, input, *select, *remove))
                }
            },

            ActionOp::Map { table } => {
                let table = lookups
                    .get(table)
                    .ok_or_else(|| format!("lookup table '{table}' is gone"))?;
                Ok(table.get(input).map(|canonical| OpSuccess {
                    value: OpValue::Scalar(canonical.to_string()),
                    matched: Some(input.trim().to_string()),
                    clean: None,
                }))
            }

            ActionOp::Split { delimiter } => {
                let parts: Vec<String> = input
                    .split(delimiter.as_str())
                    .map(|p| p.trim().to_string())
                    .collect();
                Ok(Some(OpSuccess {
                    value: OpValue::Array(parts),
                    matched: None,
                    clean: None,
                }))
            }

            ActionOp::Switch { arms, default, ignore_case } => {
                let needle = input.trim();
                for (arm, value) in arms {
                    let hit = if *ignore_case {
                        needle.eq_ignore_ascii_case(arm)
                    } else {
                        needle == arm
                    };
                    if hit {
                        return Ok(Some(OpSuccess {
                            value: OpValue::Scalar(value.clone()),
                            matched: Some(arm.clone()),
                            clean: None,
                        }));
                    }
                }
                Ok(default.as_ref().map(|value| OpSuccess {
                    value: OpValue::Scalar(value.clone()),
                    matched: None,
                    clean: None,
                }))
            }

            ActionOp::Convert { factor, .. } => {
                Ok(text::parse_number(input).map(|v| OpSuccess {
                    value: OpValue::Scalar(text::format_number(v * factor)),
                    matched: None,
                    clean: None,
                }))
            }

            ActionOp::Concat { keys, separator } => {
                let values: Vec<&str> = keys
                    .iter()
                    .filter_map(|k| bag.get(k))
                    .collect();
                if values.is_empty() {
                    return Ok(None);
                }
                Ok(Some(OpSuccess {
                    value: OpValue::Scalar(values.join(separator)),
                    matched: None,
                    clean: None,
                }))
            }

            ActionOp::CaseFormat { mode, .. } => Ok(Some(OpSuccess {
                value: OpValue::Scalar(mode.apply(input)),
                matched: None,
                clean: None,
            })),

            ActionOp::Clear => Ok(Some(OpSuccess {
                value: OpValue::Cleared,
                matched: None,
                clean: None,
            })),
        }
    }
}

/// Parse the `Options` parameter: `first|last|all`, `ignorecase`, `remove`,
/// comma-separated in any order.
fn parse_options(options: Option<&str>) -> Result<(Select, bool, bool), String> {
    let mut select = Select::First;
    let mut ignore_case = false;
    let mut remove = false;
    if let Some(options) = options {
        for token in options.split(',') {
            match token.trim().to_lowercase().as_str() {
                "" => {}
                "first" => select = Select::First,
                "last" => select = Select::Last,
                "all" => select = Select::All,
                "ignorecase" => ignore_case = true,
                "remove" => remove = true,
                other => return Err(format!("unknown Find option '{other}'")),
            }
        }
    }
    Ok((select, ignore_case, remove))
}

fn find_lookup(
    hits: Vec<LookupHit>,
    input: &str,
    select: Select,
    remove: bool,
) -> Option<OpSuccess> {
    if hits.is_empty() {
        return None;
    }
    match select {
        Select::First => {
            // hits are ordered (start asc, longest first at equal starts)
            let hit = &hits[0];
            Some(scalar_hit(input, hit, remove))
        }
        Select::Last => {
            // longest right-most match
            let hit = hits
                .iter()
                .max_by(|a, b| a.start.cmp(&b.start).then(a.len.cmp(&b.len)))?;
            Some(scalar_hit(input, hit, remove))
        }
        Select::All => {
            // greedy leftmost-longest, non-overlapping
            let mut chosen: Vec<&LookupHit> = Vec::new();
            let mut cursor = 0;
            for hit in &hits {
                if hit.start >= cursor {
                    chosen.push(hit);
                    cursor = hit.end();
                }
            }
            let items: Vec<String> = chosen.iter().map(|h| h.text.clone()).collect();
            let clean = remove.then(|| {
                let spans: Vec<(usize, usize)> =
                    chosen.iter().map(|h| (h.start, h.end())).collect();
                text::remove_spans(input, &spans)
            });
            Some(OpSuccess {
                matched: Some(items.join(",")),
                value: OpValue::Array(items),
                clean,
            })
        }
    }
}

fn scalar_hit(input: &str, hit: &LookupHit, remove: bool) -> OpSuccess {
    OpSuccess {
        value: OpValue::Scalar(hit.text.clone()),
        matched: Some(hit.text.clone()),
        clean: remove.then(|| text::remove_spans(input, &[(hit.start, hit.end())])),
    }
}

fn find_regex(
    compiled: &CompiledPattern,
    input: &str,
    select: Select,
    remove: bool,
) -> Option<OpSuccess> {
    match select {
        Select::First | Select::Last => {
            let caps = match select {
                Select::First => compiled.regex.captures(input)?,
                _ => compiled.regex.captures_iter(input).last()?,
            };
            let whole = caps.get(0)?;
            let value = compiled.captured(&caps).to_string();
            Some(OpSuccess {
                matched: Some(whole.as_str().to_string()),
                clean: remove
                    .then(|| text::remove_spans(input, &[(whole.start(), whole.end())])),
                value: OpValue::Scalar(value),
            })
        }
        Select::All => {
            let mut items = Vec::new();
            let mut spans = Vec::new();
            for caps in compiled.regex.captures_iter(input) {
                if let Some(whole) = caps.get(0) {
                    items.push(compiled.captured(&caps).to_string());
                    spans.push((whole.start(), whole.end()));
                }
            }
            if items.is_empty() {
                return None;
            }
            Some(OpSuccess {
                matched: Some(items.join(",")),
                value: OpValue::Array(items),
                clean: remove.then(|| text::remove_spans(input, &spans)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::lookup::LookupTable;
    use crate::formats::model::Params;

    fn lookups() -> LookupSet {
        let mut set = LookupSet::new();
        let mut brand = LookupTable::new("Brand");
        brand.insert("D&G", "Dolce & Gabbana");
        brand.insert("CK", "Calvin Klein");
        set.insert(brand);
        let mut gender = LookupTable::new("Gender");
        gender.insert("Wom", "Women");
        gender.insert("Men", "Men");
        set.insert(gender);
        set
    }

    fn doc(op: &str, params: &[(&str, &str)]) -> ActionDoc {
        ActionDoc {
            op: op.to_string(),
            input: "Text".to_string(),
            output: "Out".to_string(),
            assign: true,
            condition: None,
            parameters: Params(
                params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        }
    }

    fn build(op: &str, params: &[(&str, &str)]) -> CompiledAction {
        CompiledAction::build(&doc(op, params), &lookups()).unwrap()
    }

    fn run(action: &CompiledAction, input: &str) -> Option<OpSuccess> {
        action.execute(input, &PropertyBag::new(), &lookups()).unwrap()
    }

    #[test]
    fn find_lookup_first_with_remove() {
        let action = build("Find", &[("Pattern", "lookup:Brand"), ("Options", "first,ignorecase,remove")]);
        let got = run(&action, "D&G Devotion Intense").unwrap();
        assert_eq!(got.value, OpValue::Scalar("D&G".into()));
        assert_eq!(got.clean.as_deref(), Some("Devotion Intense"));
    }

    #[test]
    fn find_lookup_no_match_is_quiet() {
        let action = build("Find", &[("Pattern", "lookup:Brand")]);
        assert!(run(&action, "no brands here").is_none());
    }

    #[test]
    fn find_regex_named_group() {
        let action = build(
            "Find",
            &[("Pattern", r"(?i)(?<size>\d+(?:\.\d+)?\s*(?:ml|oz))"), ("Options", "first,remove")],
        );
        let got = run(&action, "Intense (100ml) extra").unwrap();
        assert_eq!(got.value, OpValue::Scalar("100ml".into()));
        assert_eq!(got.clean.as_deref(), Some("Intense extra"));
    }

    #[test]
    fn find_regex_group_priority() {
        // two named groups, neither alone: `num` outranks `size`
        let action = build("Find", &[("Pattern", r"(?<size>x(?<num>\d+))")]);
        let got = run(&action, "x42").unwrap();
        assert_eq!(got.value, OpValue::Scalar("42".into()));
    }

    #[test]
    fn find_all_writes_array() {
        let action = build("Find", &[("Pattern", r"\d+"), ("Options", "all")]);
        let got = run(&action, "a 1 b 22 c 333").unwrap();
        assert_eq!(
            got.value,
            OpValue::Array(vec!["1".into(), "22".into(), "333".into()])
        );
    }

    #[test]
    fn find_last_regex() {
        let action = build("Find", &[("Pattern", r"\d+"), ("Options", "last")]);
        let got = run(&action, "1 then 2 then 3").unwrap();
        assert_eq!(got.value, OpValue::Scalar("3".into()));
    }

    #[test]
    fn map_translates_case_insensitively() {
        let action = build("Map", &[("Table", "Gender")]);
        let got = run(&action, " wom ").unwrap();
        assert_eq!(got.value, OpValue::Scalar("Women".into()));
        assert!(run(&action, "unknown").is_none());
    }

    #[test]
    fn split_trims_parts() {
        let action = build("Split", &[("Delimiter", ":")]);
        let got = run(&action, "CHANEL: W :REF-001").unwrap();
        assert_eq!(
            got.value,
            OpValue::Array(vec!["CHANEL".into(), "W".into(), "REF-001".into()])
        );
    }

    #[test]
    fn switch_in_declaration_order_with_default() {
        let action = build(
            "Switch",
            &[("When:W", "Women"), ("When:M", "Men"), ("Default", "Unisex")],
        );
        assert_eq!(run(&action, "W").unwrap().value, OpValue::Scalar("Women".into()));
        assert_eq!(run(&action, "X").unwrap().value, OpValue::Scalar("Unisex".into()));
    }

    #[test]
    fn switch_ignore_case() {
        let action = build(
            "Switch",
            &[("When:W", "Women"), ("IgnoreCase", "true")],
        );
        assert_eq!(run(&action, "w").unwrap().value, OpValue::Scalar("Women".into()));
    }

    #[test]
    fn convert_multiplies() {
        let action = build(
            "Convert",
            &[("FromUnit", "oz"), ("ToUnit", "ml"), ("Factor", "29.5735")],
        );
        let got = run(&action, "2").unwrap();
        assert_eq!(got.value, OpValue::Scalar("59.147".into()));
        assert!(run(&action, "two").is_none());
    }

    #[test]
    fn concat_joins_bag_keys() {
        let action = build("Concat", &[("Keys", "A,B"), ("Separator", "-")]);
        let mut bag = PropertyBag::new();
        bag.set("A", "left");
        bag.set("B", "right");
        let got = action.execute("", &bag, &lookups()).unwrap().unwrap();
        assert_eq!(got.value, OpValue::Scalar("left-right".into()));
    }

    #[test]
    fn caseformat_modes() {
        let action = build("CaseFormat", &[("Mode", "title")]);
        assert_eq!(
            run(&action, "eau de parfum").unwrap().value,
            OpValue::Scalar("Eau De Parfum".into())
        );
    }

    #[test]
    fn build_rejects_bad_configs() {
        let set = lookups();
        assert!(CompiledAction::build(&doc("Find", &[]), &set).is_err());
        assert!(CompiledAction::build(&doc("Find", &[("Pattern", "lookup:Nope")]), &set).is_err());
        assert!(CompiledAction::build(&doc("Find", &[("Pattern", "(unclosed")]), &set).is_err());
        assert!(CompiledAction::build(&doc("Map", &[("Table", "Nope")]), &set).is_err());
        assert!(CompiledAction::build(&doc("Split", &[]), &set).is_err());
        assert!(CompiledAction::build(&doc("Switch", &[]), &set).is_err());
        assert!(CompiledAction::build(&doc("Convert", &[("Factor", "abc")]), &set).is_err());
        assert!(CompiledAction::build(&doc("Nonsense", &[]), &set).is_err());

        let mut bad = doc("Assign", &[]);
        bad.condition = Some("A = 1".to_string());
        assert!(CompiledAction::build(&bad, &set).is_err());
    }

    #[test]
    fn options_parsing_rejects_unknown() {
        assert!(parse_options(Some("first,remove")).is_ok());
        assert!(parse_options(Some("sometimes")).is_err());
    }
}
