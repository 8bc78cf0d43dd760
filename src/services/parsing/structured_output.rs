//! Resilient Structured-Output Parser
//!
//! Model completions are supposed to be a single JSON value, but arrive
//! wrapped in prose, fenced as markdown, or with escaped newlines. The
//! parser normalizes, strips fences, tries a strict parse, then retries on
//! the outermost JSON span. The shape helpers never fail: a malformed
//! answer is logged and resolves to an empty value.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// Characters of the raw response included in log lines.
const PREVIEW_CHARS: usize = 160;

/// Why a completion could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub message: String,
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed model output: {}", self.message)
    }
}

impl std::error::Error for ParseFailure {}

/// Replace escaped newline sequences (a literal backslash followed by `n`)
/// with spaces.
pub fn normalize_response(raw: &str) -> String {
    raw.replace("\\n", " ")
}

/// Remove markdown code-fence markers wherever they occur.
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// The outermost `{...}` or `[...]` span, whichever opens first.
fn json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a completion into `T`, tolerating prose and fences around the JSON.
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, ParseFailure> {
    let cleaned = strip_code_fences(&normalize_response(raw));
    if cleaned.is_empty() {
        return Err(ParseFailure {
            message: "empty response".to_string(),
        });
    }

    let strict_err = match serde_json::from_str::<T>(&cleaned) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let spans = [
        json_span(&cleaned),
        cleaned
            .find('{')
            .zip(cleaned.rfind('}'))
            .filter(|(s, e)| e > s)
            .map(|(s, e)| &cleaned[s..=e]),
    ];
    for span in spans.into_iter().flatten() {
        if span.len() == cleaned.len() {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<T>(span) {
            return Ok(value);
        }
    }

    Err(ParseFailure {
        message: strict_err.to_string(),
    })
}

fn preview(raw: &str) -> String {
    let mut preview: String = raw.chars().take(PREVIEW_CHARS).collect();
    if raw.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}

fn log_failure(context: &str, failure: &ParseFailure, raw: &str) {
    warn!(
        context = context,
        error = %failure,
        preview = %preview(raw),
        "Discarding malformed model output"
    );
}

/// Parse into `T`, or log and return `T::default()`.
pub fn parse_or_default<T: DeserializeOwned + Default>(raw: &str, context: &str) -> T {
    parse_structured(raw).unwrap_or_else(|failure| {
        log_failure(context, &failure, raw);
        T::default()
    })
}

fn parse_value(raw: &str, context: &str) -> Option<Value> {
    match parse_structured::<Value>(raw) {
        Ok(value) => Some(value),
        Err(failure) => {
            log_failure(context, &failure, raw);
            None
        }
    }
}

/// The array stored under `key`, a bare array, or the only array-valued
/// field of an object.
fn array_under(value: Value, key: &str) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => {
            if let Some(Value::Array(items)) = map.remove(key) {
                return Some(items);
            }
            let mut arrays = map.into_iter().filter_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            });
            match (arrays.next(), arrays.next()) {
                (Some(items), None) => Some(items),
                _ => None,
            }
        }
        _ => None,
    }
}

fn strings_of(items: Vec<Value>) -> Vec<String> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// An array of strings, e.g. `{"codes": ["a", "b"]}`. Non-string items are
/// skipped.
pub fn string_list(raw: &str, key: &str) -> Vec<String> {
    let Some(value) = parse_value(raw, key) else {
        return Vec::new();
    };
    match array_under(value, key) {
        Some(items) => strings_of(items),
        None => {
            warn!(context = key, preview = %preview(raw), "Expected a string array");
            Vec::new()
        }
    }
}

/// A mapping of name → strings, e.g. `{"Theme": ["code", ...]}`. A string
/// value counts as a one-element list; a single wrapping object is unwrapped.
pub fn string_map(raw: &str, context: &str) -> BTreeMap<String, Vec<String>> {
    let Some(value) = parse_value(raw, context) else {
        return BTreeMap::new();
    };
    let mut map = match value {
        Value::Object(map) => map,
        _ => {
            warn!(context = context, preview = %preview(raw), "Expected a JSON object");
            return BTreeMap::new();
        }
    };

    let wrapped = match map.values().next() {
        Some(Value::Object(inner)) if map.len() == 1 => Some(inner.clone()),
        _ => None,
    };
    if let Some(inner) = wrapped {
        map = inner;
    }

    map.into_iter()
        .filter_map(|(name, members)| {
            let name = name.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let members = match members {
                Value::Array(items) => strings_of(items),
                Value::String(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
                _ => return None,
            };
            Some((name, members))
        })
        .collect()
}

/// An array of records under `key`; records that fail to deserialize are
/// skipped individually.
pub fn record_list<T: DeserializeOwned>(raw: &str, key: &str) -> Vec<T> {
    let Some(value) = parse_value(raw, key) else {
        return Vec::new();
    };
    let Some(items) = array_under(value, key) else {
        warn!(context = key, preview = %preview(raw), "Expected a record array");
        return Vec::new();
    };
    let total = items.len();
    let records: Vec<T> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if records.len() < total {
        warn!(
            context = key,
            skipped = total - records.len(),
            "Skipped malformed records"
        );
    }
    records
}

fn is_fence_line(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

fn strip_inline_fence(line: &str) -> &str {
    line.trim_end().trim_end_matches('`').trim_end()
}

/// Diagram mode: the diagram starts at the first line opening with
/// `keyword` and runs to the next fence line. Without such a line the
/// fence-stripped answer is returned whole for the diagram reader to judge.
pub fn extract_diagram(raw: &str, keyword: &str) -> String {
    let header = keyword.trim_end();
    let lines: Vec<&str> = raw.lines().collect();
    let start = lines.iter().position(|line| {
        let line = line.trim_start();
        line == header || line.starts_with(keyword)
    });

    let body: Vec<&str> = match start {
        Some(start) => lines[start..]
            .iter()
            .take_while(|line| !is_fence_line(line))
            .map(|line| strip_inline_fence(line))
            .collect(),
        None => {
            warn!(keyword = header, preview = %preview(raw), "No diagram header in model output");
            lines
                .iter()
                .filter(|line| !is_fence_line(line))
                .map(|line| strip_inline_fence(line))
                .collect()
        }
    };
    body.join("\n").trim().to_string()
}
