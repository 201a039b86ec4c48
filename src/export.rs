//! Spreadsheet export of completed records.
//!
//! [`build_tables`] flattens records into plain tables: one `Invoices` table
//! of scalar fields plus one table per array field with a row per element.
//! The writers only lay those tables out, as CSV files or as the sheets of
//! one workbook. Records in `processing` or `error` are never exported.

use crate::error::InvoiceError;
use crate::record::{FieldValue, InvoiceRecord, RecordStatus};
use crate::schema::FieldConfig;
use chrono::SecondsFormat;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Excel's sheet-name limit.
const MAX_SHEET_NAME: usize = 31;

/// One exported table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Sheet name; at most 31 characters.
    pub name: String,
    /// CSV file name without extension.
    pub file_stem: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<FieldValue>>,
}

/// Flatten completed records into the `Invoices` table followed by one table
/// per array field, in schema order.
pub fn build_tables(invoices: &[InvoiceRecord], fields: &[FieldConfig]) -> Vec<Table> {
    let completed: Vec<&InvoiceRecord> = invoices
        .iter()
        .filter(|r| r.status == RecordStatus::Completed)
        .collect();

    let scalars: Vec<_> = fields
        .iter()
        .filter_map(|f| match f {
            FieldConfig::Scalar(s) => Some(s),
            FieldConfig::Array(_) => None,
        })
        .collect();

    let mut headers: Vec<String> = ["invoice_id", "file_name", "processed_at"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    headers.extend(scalars.iter().map(|s| s.label.clone()));

    let rows = completed
        .iter()
        .map(|record| {
            let mut row = vec![
                FieldValue::from(record.id.as_str()),
                FieldValue::from(record.file_name.as_str()),
                FieldValue::Text(
                    record
                        .processed_at
                        .to_rfc3339_opts(SecondsFormat::Millis, true),
                ),
            ];
            row.extend(
                scalars
                    .iter()
                    .map(|s| record.scalar_data.get(&s.id).cloned().unwrap_or_default()),
            );
            row
        })
        .collect();

    let mut used_stems = HashSet::from(["invoices".to_string()]);
    let mut tables = vec![Table {
        name: "Invoices".to_string(),
        file_stem: "invoices".to_string(),
        headers,
        rows,
    }];

    for field in fields {
        let FieldConfig::Array(array) = field else {
            continue;
        };

        let mut headers = vec!["invoice_id".to_string(), "file_name".to_string()];
        headers.extend(array.sub_fields.iter().map(|s| s.label.clone()));

        let mut rows = Vec::new();
        for record in &completed {
            let Some(items) = record.array_data.get(&array.id) else {
                continue;
            };
            for item in items {
                let mut row = vec![
                    FieldValue::from(record.id.as_str()),
                    FieldValue::from(record.file_name.as_str()),
                ];
                row.extend(
                    array
                        .sub_fields
                        .iter()
                        .map(|s| item.get(&s.id).cloned().unwrap_or_default()),
                );
                rows.push(row);
            }
        }

        tables.push(Table {
            name: array.label.chars().take(MAX_SHEET_NAME).collect(),
            file_stem: unique_file_stem(&array.id, &mut used_stems),
            headers,
            rows,
        });
    }

    tables
}

/// Write `<file_stem>.csv` per table into `dir`. Returns the written paths.
pub fn write_csv(tables: &[Table], dir: &Path) -> Result<Vec<PathBuf>, InvoiceError> {
    std::fs::create_dir_all(dir).map_err(|e| InvoiceError::ExportFailed {
        path: dir.to_path_buf(),
        detail: e.to_string(),
    })?;

    let mut written = Vec::with_capacity(tables.len());
    for table in tables {
        let path = dir.join(format!("{}.csv", table.file_stem));
        write_csv_table(table, &path).map_err(|e| InvoiceError::ExportFailed {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        info!("Wrote {} rows to {}", table.rows.len(), path.display());
        written.push(path);
    }
    Ok(written)
}

fn write_csv_table(table: &Table, path: &Path) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write all tables as sheets of one workbook at `path`.
pub fn write_xlsx(tables: &[Table], path: &Path) -> Result<(), InvoiceError> {
    write_workbook(tables, path).map_err(|e| InvoiceError::ExportFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    info!("Wrote {} sheets to {}", tables.len(), path.display());
    Ok(())
}

fn write_workbook(tables: &[Table], path: &Path) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let mut used_names = HashSet::new();

    for table in tables {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(unique_sheet_name(&table.name, &mut used_names))?;

        for (col, header) in table.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, header, &header_format)?;
        }

        for (row_idx, row) in table.rows.iter().enumerate() {
            let row_num = (row_idx + 1) as u32;
            for (col, value) in row.iter().enumerate() {
                let col = col as u16;
                match value {
                    FieldValue::Null => {}
                    FieldValue::Number(_) => match value.as_f64() {
                        Some(n) => {
                            worksheet.write_number(row_num, col, n)?;
                        }
                        None => {
                            worksheet.write_string(row_num, col, value.to_string())?;
                        }
                    },
                    FieldValue::Text(text) => {
                        worksheet.write_string(row_num, col, text)?;
                    }
                }
            }
        }

        worksheet.set_freeze_panes(1, 0)?;
    }

    workbook.save(path)?;
    Ok(())
}

/// Replace characters Excel forbids in sheet names and make the name unique
/// within the workbook.
fn unique_sheet_name(name: &str, used: &mut HashSet<String>) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .take(MAX_SHEET_NAME)
        .collect();

    let mut candidate = cleaned.clone();
    let mut n = 2;
    while !used.insert(candidate.to_lowercase()) {
        let suffix = format!(" ({n})");
        let keep = MAX_SHEET_NAME - suffix.chars().count();
        candidate = format!("{}{suffix}", cleaned.chars().take(keep).collect::<String>());
        n += 1;
    }
    candidate
}

/// Every character outside `[A-Za-z0-9_]` becomes `_`; clashes (compared
/// case-insensitively) get a `_2`, `_3`, ... suffix.
fn unique_file_stem(id: &str, used: &mut HashSet<String>) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    let mut candidate = cleaned.clone();
    let mut n = 2;
    while !used.insert(candidate.to_lowercase()) {
        candidate = format!("{cleaned}_{n}");
        n += 1;
    }
    candidate
}
