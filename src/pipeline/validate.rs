//! Response validator: raw model text → schema-shaped record data.
//!
//! Vision models wrap JSON in code fences, prepend chatter, omit keys and
//! invent new ones. The validator fails only when there is no JSON object to
//! read at all ([`InvoiceError::NoJsonFound`]) or the object does not parse
//! ([`InvoiceError::MalformedJson`]). Every other mismatch degrades to `null`
//! or `[]`, and the result always carries exactly the schema's keys.

use crate::error::InvoiceError;
use crate::pipeline::compile::ExpectedKeys;
use crate::record::{ArrayData, ArrayRow, FieldValue, ScalarData};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static RE_OPENING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```(?:json)?\n?").unwrap());
static RE_CLOSING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n?```$").unwrap());

/// Validated extraction result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractedData {
    pub scalar_data: ScalarData,
    pub array_data: ArrayData,
}

/// Parse and normalise a model reply against the expected keys.
pub fn validate_response(raw: &str, keys: &ExpectedKeys) -> Result<ExtractedData, InvoiceError> {
    let cleaned = strip_fences(raw);
    let candidate = json_candidate(&cleaned).ok_or(InvoiceError::NoJsonFound)?;

    let parsed: Value =
        serde_json::from_str(candidate).map_err(|e| InvoiceError::MalformedJson {
            detail: e.to_string(),
        })?;
    let empty = Map::new();
    let object = parsed.as_object().unwrap_or(&empty);

    let scalar_data = keys
        .scalars
        .iter()
        .map(|id| (id.clone(), read_value(object, id)))
        .collect();

    let array_data = keys
        .arrays
        .iter()
        .map(|array| {
            let rows = match object.get(&array.id) {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| project_row(item, &array.sub_fields))
                    .collect(),
                _ => Vec::new(),
            };
            (array.id.clone(), rows)
        })
        .collect();

    Ok(ExtractedData {
        scalar_data,
        array_data,
    })
}

/// Trim, then drop a leading ```` ``` ```` / ```` ```json ```` fence and a trailing ```` ``` ````.
fn strip_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let without_open = RE_OPENING_FENCE.replace(trimmed, "");
    RE_CLOSING_FENCE.replace(&without_open, "").into_owned()
}

/// From the first `{` to the last `}` after it, or to the end of the text
/// when no `}` follows. `None` when the text has no `{`.
fn json_candidate(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let rest = &text[start..];
    match rest.rfind('}') {
        Some(end) => Some(&rest[..=end]),
        None => Some(rest),
    }
}

fn read_value(object: &Map<String, Value>, key: &str) -> FieldValue {
    object.get(key).cloned().map(FieldValue::from).unwrap_or_default()
}

/// Keep only declared sub-fields; a non-object element yields an all-null row.
fn project_row(item: &Value, sub_fields: &[String]) -> ArrayRow {
    let empty = Map::new();
    let object = item.as_object().unwrap_or(&empty);
    sub_fields
        .iter()
        .map(|id| (id.clone(), read_value(object, id)))
        .collect()
}
