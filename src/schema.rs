//! User-defined field schema: what the model is asked to extract.
//!
//! A schema is an ordered list of [`FieldConfig`]. Order matters: it is the
//! order fields appear in the prompt and in exports. Each field is either a
//! single value ([`ScalarField`]) or a repeated row group such as invoice
//! line items ([`ArrayField`]). The enum is closed, so the prompt compiler,
//! the validator and the exporter each match on it exhaustively.

use crate::error::InvoiceError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Declared type of an extracted value. Drives the prompt's type hint only;
/// the validator never coerces values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Number,
    /// Rendered as a string; the prompt asks for ISO 8601 (`YYYY-MM-DD`).
    Date,
}

impl DataType {
    /// JSON type hint written into the prompt's shape block.
    pub fn type_hint(self) -> &'static str {
        match self {
            DataType::Number => "number",
            DataType::String | DataType::Date => "string",
        }
    }
}

/// One entry of the field schema, tagged by `"type"` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldConfig {
    Scalar(ScalarField),
    Array(ArrayField),
}

/// A single named value, e.g. the invoice number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalarField {
    pub id: String,
    pub label: String,
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A repeated row group with its own ordered sub-field schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayField {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sub_fields: Vec<SubFieldConfig>,
}

/// A column of an [`ArrayField`] row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubFieldConfig {
    pub id: String,
    pub label: String,
    pub data_type: DataType,
}

impl FieldConfig {
    /// Machine key, used in the model reply and in record data.
    pub fn id(&self) -> &str {
        match self {
            FieldConfig::Scalar(f) => &f.id,
            FieldConfig::Array(f) => &f.id,
        }
    }

    /// Display string, used as the export column or sheet name.
    pub fn label(&self) -> &str {
        match self {
            FieldConfig::Scalar(f) => &f.label,
            FieldConfig::Array(f) => &f.label,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            FieldConfig::Scalar(f) => f.description.as_deref(),
            FieldConfig::Array(f) => f.description.as_deref(),
        }
    }

    pub fn scalar(
        id: impl Into<String>,
        label: impl Into<String>,
        data_type: DataType,
        description: Option<&str>,
    ) -> Self {
        FieldConfig::Scalar(ScalarField {
            id: id.into(),
            label: label.into(),
            data_type,
            description: description.map(str::to_string),
        })
    }

    pub fn array(
        id: impl Into<String>,
        label: impl Into<String>,
        description: Option<&str>,
        sub_fields: Vec<SubFieldConfig>,
    ) -> Self {
        FieldConfig::Array(ArrayField {
            id: id.into(),
            label: label.into(),
            description: description.map(str::to_string),
            sub_fields,
        })
    }
}

impl SubFieldConfig {
    pub fn new(id: impl Into<String>, label: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            data_type,
        }
    }
}

/// Check the schema's identity invariants.
///
/// Every id and label must be non-blank, field ids must be unique across the
/// whole schema, and sub-field ids unique within their parent.
pub fn validate_schema(fields: &[FieldConfig]) -> Result<(), InvoiceError> {
    let mut seen = HashSet::new();

    for field in fields {
        check_identity(field.id(), field.label(), "field")?;
        if !seen.insert(field.id()) {
            return Err(InvoiceError::InvalidSchema(format!(
                "duplicate field id '{}'",
                field.id()
            )));
        }

        if let FieldConfig::Array(array) = field {
            let mut sub_seen = HashSet::new();
            for sub in &array.sub_fields {
                check_identity(&sub.id, &sub.label, "sub-field")?;
                if !sub_seen.insert(sub.id.as_str()) {
                    return Err(InvoiceError::InvalidSchema(format!(
                        "duplicate sub-field id '{}' in '{}'",
                        sub.id, array.id
                    )));
                }
            }
        }
    }

    Ok(())
}

fn check_identity(id: &str, label: &str, what: &str) -> Result<(), InvoiceError> {
    if id.trim().is_empty() {
        return Err(InvoiceError::InvalidSchema(format!("{what} with empty id")));
    }
    if label.trim().is_empty() {
        return Err(InvoiceError::InvalidSchema(format!(
            "{what} '{id}' has an empty label"
        )));
    }
    Ok(())
}

/// The stock invoice schema used until the user saves their own.
pub fn default_field_configs() -> Vec<FieldConfig> {
    vec![
        FieldConfig::scalar(
            "vendor_name",
            "Vendor Name",
            DataType::String,
            Some("The name of the company or person that issued the invoice"),
        ),
        FieldConfig::scalar(
            "vendor_address",
            "Vendor Address",
            DataType::String,
            Some("Full address of the vendor"),
        ),
        FieldConfig::scalar(
            "invoice_number",
            "Invoice Number",
            DataType::String,
            Some("The unique invoice number or ID"),
        ),
        FieldConfig::scalar(
            "invoice_date",
            "Invoice Date",
            DataType::Date,
            Some("The date the invoice was issued"),
        ),
        FieldConfig::scalar(
            "due_date",
            "Due Date",
            DataType::Date,
            Some("The payment due date"),
        ),
        FieldConfig::scalar(
            "total_amount",
            "Total Amount",
            DataType::Number,
            Some("The total amount due on the invoice"),
        ),
        FieldConfig::scalar(
            "currency",
            "Currency",
            DataType::String,
            Some("The currency code (e.g., USD, EUR)"),
        ),
        FieldConfig::array(
            "line_items",
            "Line Items",
            Some("Individual line items or products/services listed on the invoice"),
            vec![
                SubFieldConfig::new("description", "Description", DataType::String),
                SubFieldConfig::new("quantity", "Quantity", DataType::Number),
                SubFieldConfig::new("unit_price", "Unit Price", DataType::Number),
                SubFieldConfig::new("amount", "Amount", DataType::Number),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schema_is_valid() {
        let fields = default_field_configs();
        assert!(validate_schema(&fields).is_ok());
        assert_eq!(fields.len(), 8);
        assert_eq!(fields[7].id(), "line_items");
    }

    #[test]
    fn json_shape_matches_snapshot_format() {
        let json = r#"[
            {"id":"total","label":"Total","type":"scalar","dataType":"number"},
            {"id":"items","label":"Items","type":"array","description":"rows",
             "subFields":[{"id":"qty","label":"Qty","dataType":"number"}]}
        ]"#;
        let fields: Vec<FieldConfig> = serde_json::from_str(json).unwrap();
        assert!(matches!(&fields[0], FieldConfig::Scalar(s) if s.data_type == DataType::Number));
        match &fields[1] {
            FieldConfig::Array(a) => {
                assert_eq!(a.sub_fields[0].id, "qty");
                assert_eq!(a.description.as_deref(), Some("rows"));
            }
            other => panic!("expected array field, got {other:?}"),
        }

        let back = serde_json::to_value(&fields[0]).unwrap();
        assert_eq!(back["type"], "scalar");
        assert_eq!(back["dataType"], "number");
        assert!(back.get("description").is_none());
    }

    #[test]
    fn rejects_duplicate_field_ids() {
        let fields = vec![
            FieldConfig::scalar("a", "A", DataType::String, None),
            FieldConfig::array("a", "A rows", None, vec![]),
        ];
        let err = validate_schema(&fields).unwrap_err();
        assert!(err.to_string().contains("duplicate field id 'a'"));
    }

    #[test]
    fn rejects_duplicate_sub_field_ids() {
        let fields = vec![FieldConfig::array(
            "rows",
            "Rows",
            None,
            vec![
                SubFieldConfig::new("x", "X", DataType::String),
                SubFieldConfig::new("x", "X again", DataType::Number),
            ],
        )];
        assert!(validate_schema(&fields).is_err());
    }

    #[test]
    fn same_sub_field_id_in_different_parents_is_fine() {
        let sub = || vec![SubFieldConfig::new("amount", "Amount", DataType::Number)];
        let fields = vec![
            FieldConfig::array("taxes", "Taxes", None, sub()),
            FieldConfig::array("line_items", "Line Items", None, sub()),
        ];
        assert!(validate_schema(&fields).is_ok());
    }

    #[test]
    fn rejects_blank_id_and_label() {
        let blank_id = vec![FieldConfig::scalar("  ", "Label", DataType::String, None)];
        assert!(validate_schema(&blank_id).is_err());

        let blank_label = vec![FieldConfig::scalar("id", "", DataType::String, None)];
        assert!(validate_schema(&blank_label).is_err());
    }

    #[test]
    fn date_hints_as_string() {
        assert_eq!(DataType::Date.type_hint(), "string");
        assert_eq!(DataType::Number.type_hint(), "number");
    }
}
