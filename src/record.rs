//! Invoice records and the persisted application state.

use crate::config::ApiConfig;
use crate::schema::{default_field_configs, FieldConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// An extracted value: `string | number | null` in the snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Number(serde_json::Number),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Numeric view for spreadsheet cells. Text is not parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }
}

/// Model values are passed through without coercion. Booleans and nested
/// arrays/objects have no slot in the record model, so they are kept as
/// their JSON text rather than dropped.
impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Number(n) => FieldValue::Number(n),
            Value::String(s) => FieldValue::Text(s),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n.into())
    }
}

/// Cell text: `Null` renders as the empty string.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// Scalar field id → value.
pub type ScalarData = BTreeMap<String, FieldValue>;
/// One array element: sub-field id → value.
pub type ArrayRow = BTreeMap<String, FieldValue>;
/// Array field id → ordered rows.
pub type ArrayData = BTreeMap<String, Vec<ArrayRow>>;

/// Lifecycle state of a record: `processing → completed | error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Processing,
    Completed,
    Error,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordStatus::Processing => "processing",
            RecordStatus::Completed => "completed",
            RecordStatus::Error => "error",
        })
    }
}

/// One processed (or in-flight) invoice file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    pub id: String,
    pub file_name: String,
    /// SHA-256 of the file bytes; the dedup key.
    pub file_hash: String,
    /// Start of the most recent processing attempt.
    pub processed_at: DateTime<Utc>,
    #[serde(default)]
    pub scalar_data: ScalarData,
    #[serde(default)]
    pub array_data: ArrayData,
    /// Unvalidated model text, kept for diagnostics.
    #[serde(default)]
    pub raw_response: String,
    #[serde(default)]
    pub page_count: usize,
    pub status: RecordStatus,
    /// Present iff `status == Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl InvoiceRecord {
    /// A fresh record in `processing` with no extracted data.
    pub fn processing(id: &str, file_name: &str, file_hash: &str, page_count: usize) -> Self {
        Self {
            id: id.to_string(),
            file_name: file_name.to_string(),
            file_hash: file_hash.to_string(),
            processed_at: Utc::now(),
            scalar_data: ScalarData::new(),
            array_data: ArrayData::new(),
            raw_response: String::new(),
            page_count,
            status: RecordStatus::Processing,
            error_message: None,
        }
    }
}

/// The unit of persistence: schema, records and API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub field_configs: Vec<FieldConfig>,
    pub invoices: Vec<InvoiceRecord>,
    pub api_config: ApiConfig,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            field_configs: default_field_configs(),
            invoices: Vec::new(),
            api_config: ApiConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_value_round_trips_as_plain_json() {
        let values: Vec<FieldValue> = serde_json::from_value(json!(["42", 42, 1.5, null])).unwrap();
        assert_eq!(values[0], FieldValue::Text("42".into()));
        assert_eq!(values[1], FieldValue::from(42));
        assert!(matches!(values[2], FieldValue::Number(_)));
        assert!(values[3].is_null());

        assert_eq!(serde_json::to_value(&values).unwrap(), json!(["42", 42, 1.5, null]));
    }

    #[test]
    fn non_scalar_json_is_kept_as_text() {
        assert_eq!(FieldValue::from(json!(true)), FieldValue::Text("true".into()));
        assert_eq!(
            FieldValue::from(json!({"a": 1})),
            FieldValue::Text("{\"a\":1}".into())
        );
    }

    #[test]
    fn display_renders_null_empty() {
        assert_eq!(FieldValue::Null.to_string(), "");
        assert_eq!(FieldValue::from(7).to_string(), "7");
        assert_eq!(FieldValue::from("EUR").to_string(), "EUR");
    }

    #[test]
    fn record_serialises_camel_case() {
        let record = InvoiceRecord::processing("id-1", "a.pdf", "abc", 0);
        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v["fileName"], "a.pdf");
        assert_eq!(v["fileHash"], "abc");
        assert_eq!(v["status"], "processing");
        assert!(v.get("errorMessage").is_none());
        assert!(v["processedAt"].as_str().is_some());
    }

    #[test]
    fn default_state_carries_default_schema() {
        let state = AppState::default();
        assert!(state.invoices.is_empty());
        assert!(!state.field_configs.is_empty());
    }
}
