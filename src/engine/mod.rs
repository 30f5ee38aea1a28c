//! Parsing Engine
//!
//! Executes the compiled per-column action chains against one data row at a
//! time. All state lives in the row's freshly allocated [`PropertyBag`]:
//! the engine is pure CPU, never suspends, and shares nothing across rows,
//! so files can be parsed on parallel tasks without coordination.
//!
//! ## Evaluation order
//!
//! Columns run in the order the rules declare them; within a column,
//! actions run in declaration order. For each column the current cell text
//! is published under the bag key `Text` before the chain starts.
//!
//! ## Policies
//!
//! - `StopOnFirstMatchPerColumn`: a column chain ends after the first
//!   action that assigns to a persisted output (`Product.*` / `Offer.*`).
//! - `PreferFirstAssignment`: a persisted output is write-once within a
//!   row; later writes become no-ops.

pub mod action;
pub mod bag;
pub mod condition;
pub mod text;

use crate::error::Warning;
use crate::formats::{CompiledColumnRule, CompiledSupplier};
use crate::grid::RowData;
use action::{CompiledAction, OpValue};
use bag::{PropertyBag, TraceEntry};
use tracing::{trace, warn};

/// Bag-key prefixes that mark a value as persisted output.
const PERSISTED_PREFIXES: [&str; 2] = ["product.", "offer."];

pub fn is_persisted_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    PERSISTED_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Result of running the full rule set over one row.
#[derive(Debug)]
pub struct ParsedRow {
    pub row_index: usize,
    pub bag: PropertyBag,
    pub warnings: Vec<Warning>,
}

/// Drives one supplier's compiled rules over data rows.
pub struct RowParser<'a> {
    supplier: &'a CompiledSupplier,
}

impl<'a> RowParser<'a> {
    pub fn new(supplier: &'a CompiledSupplier) -> Self {
        RowParser { supplier }
    }

    /// Run every column rule over the row and apply the subtitle
    /// assignments afterwards, so `Overwrite = false` can see what the
    /// pipeline produced.
    pub fn parse_row(&self, row: &RowData) -> ParsedRow {
        let settings = &self.supplier.settings;
        let mut bag = if settings.trace {
            PropertyBag::with_trace()
        } else {
            PropertyBag::new()
        };
        let mut warnings = Vec::new();

        for rule in &self.supplier.rules {
            let cell_text = row.cell_value(rule.column_index).unwrap_or("");
            bag.set("Text", cell_text);
            self.run_column(rule, row.index, &mut bag, &mut warnings);
        }

        if let Some(subtitles) = &self.supplier.subtitles {
            subtitles.apply_assignments(row, &mut bag, &self.supplier.lookups);
        }

        ParsedRow {
            row_index: row.index,
            bag,
            warnings,
        }
    }

    fn run_column(
        &self,
        rule: &CompiledColumnRule,
        row_index: usize,
        bag: &mut PropertyBag,
        warnings: &mut Vec<Warning>,
    ) {
        for action in &rule.actions {
            match self.run_action(action, bag) {
                Ok(ActionStatus::AssignedPersisted)
                    if self.supplier.settings.stop_on_first_match_per_column =>
                {
                    break;
                }
                Ok(_) => {}
                Err(cause) => {
                    warn!(
                        row = row_index,
                        column = %rule.column,
                        op = %action.op_name,
                        error = %cause,
                        "action failed"
                    );
                    warnings.push(Warning::ActionFailed {
                        row: row_index,
                        column: rule.column.clone(),
                        op: action.op_name.clone(),
                        cause,
                    });
                }
            }
        }
    }

    fn run_action(
        &self,
        action: &CompiledAction,
        bag: &mut PropertyBag,
    ) -> Result<ActionStatus, String> {
        if let Some(condition) = &action.condition {
            if !condition.eval(bag) {
                self.push_trace(bag, action, None, false);
                return Ok(ActionStatus::Skipped);
            }
        }

        let input: String = if action.needs_input() {
            match bag.get(&action.input) {
                Some(value) => value.to_string(),
                None => {
                    // An unresolved input is the quiet failure of the
                    // waterfall: an earlier action simply did not match.
                    self.push_trace(bag, action, None, false);
                    return Ok(ActionStatus::Skipped);
                }
            }
        } else {
            String::new()
        };

        let success = match action.execute(&input, bag, &self.supplier.lookups)? {
            Some(success) => success,
            None => {
                self.push_trace(bag, action, None, false);
                return Ok(ActionStatus::Skipped);
            }
        };

        let output = &action.output;
        if matches!(success.value, OpValue::Cleared) {
            bag.unset(output);
            bag.unset(&format!("{output}.Clean"));
            self.push_trace(bag, action, None, true);
            return Ok(ActionStatus::Ran);
        }

        // Write-once policy for persisted outputs.
        let persisted = is_persisted_key(output);
        if self.supplier.settings.prefer_first_assignment && persisted && bag.is_assigned(output) {
            self.push_trace(bag, action, success.matched.clone(), false);
            return Ok(ActionStatus::Skipped);
        }

        match &success.value {
            OpValue::Scalar(value) => {
                bag.set(output, value.clone());
            }
            OpValue::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    bag.set(&format!("{output}[{i}]"), item.clone());
                }
                bag.set(&format!("{output}.Length"), items.len().to_string());
            }
            OpValue::Cleared => unreachable!(),
        }
        bag.set(
            &format!("{output}.Clean"),
            success.clean.clone().unwrap_or(input),
        );

        if action.assign && persisted {
            bag.mark_assigned(output);
        }
        self.push_trace(bag, action, success.matched, true);

        if action.assign && persisted {
            Ok(ActionStatus::AssignedPersisted)
        } else {
            Ok(ActionStatus::Ran)
        }
    }

    fn push_trace(
        &self,
        bag: &mut PropertyBag,
        action: &CompiledAction,
        matched: Option<String>,
        success: bool,
    ) {
        if !bag.trace_enabled() {
            return;
        }
        trace!(
            op = %action.op_name,
            input = %action.input,
            output = %action.output,
            success,
            "action"
        );
        bag.push_trace(TraceEntry {
            action: action.op_name.clone(),
            input: action.input.clone(),
            output: action.output.clone(),
            matched,
            success,
        });
    }
}

enum ActionStatus {
    /// Op ran and wrote a non-persisted value (or cleared one)
    Ran,
    /// Op ran and assigned a persisted output
    AssignedPersisted,
    /// Condition false, input unresolved, no match, or write suppressed
    Skipped,
}
