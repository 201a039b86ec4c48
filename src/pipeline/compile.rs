//! Schema compiler: field schema → prompt shape block + expected-key index.
//!
//! The shape block is a pseudo-JSON sketch with type hints in value position
//! and the field description as a trailing `//` comment:
//!
//! ```text
//! {
//!   "invoice_number": string, // The unique invoice identifier
//!   "total_amount": number,
//!   "line_items": [ // Individual line items
//!     {
//!       "description": string,
//!       "amount": number,
//!     }
//!   ],
//! }
//! ```
//!
//! Scalar lines come first in schema order, then one block per array field in
//! schema order. The output is a pure function of the schema, so golden tests
//! pin it byte for byte.

use crate::prompts::extraction_prompt;
use crate::schema::{ArrayField, FieldConfig, ScalarField};

/// Keys the validator reads from the model's reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpectedKeys {
    /// Scalar field ids, in schema order.
    pub scalars: Vec<String>,
    /// Array field ids with their sub-field ids, in schema order.
    pub arrays: Vec<ArrayKeys>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayKeys {
    pub id: String,
    pub sub_fields: Vec<String>,
}

/// Everything derived from one schema for one extraction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSchema {
    /// The `{ … }` shape block alone.
    pub shape: String,
    /// Full user prompt: instructions, shape block and rules.
    pub prompt: String,
    pub keys: ExpectedKeys,
}

/// Compile a schema. Cannot fail; an empty schema yields the shape `{\n}`.
pub fn compile_schema(fields: &[FieldConfig]) -> CompiledSchema {
    let shape = render_shape(fields);
    CompiledSchema {
        prompt: extraction_prompt(&shape),
        keys: expected_keys(fields),
        shape,
    }
}

/// Render the shape block only.
pub fn render_shape(fields: &[FieldConfig]) -> String {
    let mut lines = vec!["{".to_string()];

    for field in fields {
        if let FieldConfig::Scalar(scalar) = field {
            lines.push(scalar_line(scalar));
        }
    }
    for field in fields {
        if let FieldConfig::Array(array) = field {
            push_array_block(&mut lines, array);
        }
    }

    lines.push("}".to_string());
    lines.join("\n")
}

fn scalar_line(field: &ScalarField) -> String {
    format!(
        "  \"{}\": {},{}",
        field.id,
        field.data_type.type_hint(),
        comment(field.description.as_deref())
    )
}

fn push_array_block(lines: &mut Vec<String>, field: &ArrayField) {
    lines.push(format!(
        "  \"{}\": [{}",
        field.id,
        comment(field.description.as_deref())
    ));
    lines.push("    {".to_string());
    for sub in &field.sub_fields {
        lines.push(format!("      \"{}\": {},", sub.id, sub.data_type.type_hint()));
    }
    lines.push("    }".to_string());
    lines.push("  ],".to_string());
}

fn comment(description: Option<&str>) -> String {
    match description {
        Some(d) if !d.is_empty() => format!(" // {d}"),
        _ => String::new(),
    }
}

fn expected_keys(fields: &[FieldConfig]) -> ExpectedKeys {
    let mut keys = ExpectedKeys::default();
    for field in fields {
        match field {
            FieldConfig::Scalar(scalar) => keys.scalars.push(scalar.id.clone()),
            FieldConfig::Array(array) => keys.arrays.push(ArrayKeys {
                id: array.id.clone(),
                sub_fields: array.sub_fields.iter().map(|s| s.id.clone()).collect(),
            }),
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{default_field_configs, DataType, SubFieldConfig};

    #[test]
    fn empty_schema_is_empty_block() {
        let compiled = compile_schema(&[]);
        assert_eq!(compiled.shape, "{\n}");
        assert!(compiled.keys.scalars.is_empty());
        assert!(compiled.keys.arrays.is_empty());
        assert!(compiled.prompt.contains("{\n}"));
    }

    #[test]
    fn golden_shape_with_mixed_fields() {
        let fields = vec![
            FieldConfig::scalar("invoice_number", "Invoice #", DataType::String, Some("Invoice id")),
            FieldConfig::array(
                "line_items",
                "Line Items",
                Some("Rows"),
                vec![
                    SubFieldConfig::new("qty", "Qty", DataType::Number),
                    SubFieldConfig::new("desc", "Description", DataType::String),
                ],
            ),
            FieldConfig::scalar("issued", "Issued", DataType::Date, None),
            FieldConfig::scalar("total", "Total", DataType::Number, None),
        ];

        let expected = "\
{
  \"invoice_number\": string, // Invoice id
  \"issued\": string,
  \"total\": number,
  \"line_items\": [ // Rows
    {
      \"qty\": number,
      \"desc\": string,
    }
  ],
}";
        assert_eq!(render_shape(&fields), expected);
    }

    #[test]
    fn keys_follow_schema_order() {
        let fields = vec![
            FieldConfig::scalar("b", "B", DataType::String, None),
            FieldConfig::array(
                "rows",
                "Rows",
                None,
                vec![
                    SubFieldConfig::new("y", "Y", DataType::String),
                    SubFieldConfig::new("x", "X", DataType::Number),
                ],
            ),
            FieldConfig::scalar("a", "A", DataType::Number, None),
        ];
        let keys = compile_schema(&fields).keys;
        assert_eq!(keys.scalars, vec!["b", "a"]);
        assert_eq!(
            keys.arrays,
            vec![ArrayKeys {
                id: "rows".into(),
                sub_fields: vec!["y".into(), "x".into()],
            }]
        );
    }

    #[test]
    fn compilation_is_deterministic() {
        let fields = default_field_configs();
        assert_eq!(compile_schema(&fields), compile_schema(&fields));
    }

    #[test]
    fn default_schema_prompt_mentions_every_field() {
        let compiled = compile_schema(&default_field_configs());
        for id in ["vendor_name", "invoice_date", "total_amount", "line_items", "unit_price"] {
            assert!(compiled.prompt.contains(&format!("\"{id}\"")), "missing {id}");
        }
        assert!(compiled.prompt.starts_with("You are an invoice data extraction assistant."));
        assert!(compiled.prompt.ends_with("into a single JSON object."));
    }
}
