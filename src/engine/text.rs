//! Text Utilities
//!
//! Small string helpers shared by the action implementations: whitespace
//! collapsing, removal of matched spans (the `remove` option), case
//! formatting and culture-tolerant number normalization.

/// Collapse runs of whitespace to single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }
    out
}

/// Remove the given byte spans from `text`, then tidy up what the removal
/// left behind: bracket pairs that became empty (`()`, `[]`, `{}`) are
/// deleted and whitespace is collapsed.
///
/// Spans must be non-overlapping but may arrive in any order.
pub fn remove_spans(text: &str, spans: &[(usize, usize)]) -> String {
    let mut sorted: Vec<(usize, usize)> = spans.to_vec();
    sorted.sort_by_key(|s| s.0);

    let mut remainder = String::with_capacity(text.len());
    let mut cursor = 0;
    for &(start, end) in &sorted {
        if start >= cursor && end <= text.len() {
            remainder.push_str(&text[cursor..start]);
            cursor = end;
        }
    }
    remainder.push_str(&text[cursor..]);

    collapse_whitespace(&strip_empty_brackets(&remainder))
}

/// Delete bracket pairs whose content is empty or whitespace-only.
/// Repeats until stable so nested leftovers like `([ ])` disappear too.
fn strip_empty_brackets(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = strip_empty_brackets_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_empty_brackets_once(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut keep = vec![true; chars.len()];
    let mut stack: Vec<(usize, char)> = Vec::new();

    for (i, &c) in chars.iter().enumerate() {
        match c {
            '(' | '[' | '{' => stack.push((i, c)),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if let Some(&(start, o)) = stack.last() {
                    if o == open {
                        stack.pop();
                        if chars[start + 1..i].iter().all(|c| c.is_whitespace()) {
                            for flag in keep.iter_mut().take(i + 1).skip(start) {
                                *flag = false;
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    chars
        .iter()
        .zip(keep.iter())
        .filter(|(_, &k)| k)
        .map(|(&c, _)| c)
        .collect()
}

/// Case-format modes for the `CaseFormat` op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseMode {
    Title,
    Upper,
    Lower,
}

impl CaseMode {
    pub fn parse(mode: &str) -> Option<CaseMode> {
        match mode.trim().to_lowercase().as_str() {
            "title" => Some(CaseMode::Title),
            "upper" => Some(CaseMode::Upper),
            "lower" => Some(CaseMode::Lower),
            _ => None,
        }
    }

    pub fn apply(self, text: &str) -> String {
        match self {
            CaseMode::Upper => text.to_uppercase(),
            CaseMode::Lower => text.to_lowercase(),
            CaseMode::Title => title_case(text),
        }
    }
}

/// Uppercase the first letter of each whitespace-separated word, lowercase
/// the rest. Word separators are preserved as-is.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Normalize a culture-ambiguous numeric string to invariant form: spaces
/// stripped; a comma with no dot becomes the decimal separator; commas next
/// to a dot are thousands separators and are dropped.
pub fn normalize_number(text: &str) -> String {
    let trimmed: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if trimmed.contains(',') {
        if trimmed.contains('.') {
            trimmed.replace(',', "")
        } else {
            trimmed.replace(',', ".")
        }
    } else {
        trimmed
    }
}

/// Parse a numeric string after [`normalize_number`].
pub fn parse_number(text: &str) -> Option<f64> {
    let normalized = normalize_number(text);
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok()
}

/// Format a number the way cell values are stringified: integers without a
/// fraction, everything else with its shortest round-trip representation.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
