//! Rectangular view over a form's submissions
//!
//! Every export renderer consumes this shape, so rows are always exactly as
//! wide as the header.

use super::normalize::decode_multi;
use crate::models::{Form, SubmissionRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const LINKED_PARENT_HEADER: &str = "Linked Parent";
pub const SUBMITTED_AT_HEADER: &str = "Submitted At";

/// Headers plus rows of cells
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Render as tab-separated text, header first
    pub fn to_tsv(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.headers.join("\t"));
        out.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|c| c.replace(['\t', '\n'], " ")).collect();
            out.push_str(&cells.join("\t"));
            out.push('\n');
        }
        out
    }
}

/// Pivot key/value records into a table.
///
/// `parent_labels` maps parent submission ids to display labels; parents
/// missing from it render as `#id`.
pub fn pivot_to_table(
    form: &Form,
    records: &[SubmissionRecord],
    parent_labels: &HashMap<i64, String>,
) -> Table {
    let linked = form.parent_form_id.is_some();

    let mut headers: Vec<String> = form.fields.iter().map(|f| f.name.clone()).collect();
    if linked {
        headers.push(LINKED_PARENT_HEADER.to_string());
    }
    headers.push(SUBMITTED_AT_HEADER.to_string());

    let rows = records
        .iter()
        .map(|record| {
            let mut row: Vec<String> = form
                .fields
                .iter()
                .map(|field| match record.value(&field.name) {
                    Some(value) if field.field_type.is_multi_valued() => {
                        decode_multi(value).join(", ")
                    }
                    Some(value) => value.to_string(),
                    None => String::new(),
                })
                .collect();
            if linked {
                let cell = match record.submission.parent_submission_id {
                    Some(pid) => parent_labels
                        .get(&pid)
                        .cloned()
                        .unwrap_or_else(|| format!("#{}", pid)),
                    None => String::new(),
                };
                row.push(cell);
            }
            row.push(record.submission.submitted_at.clone());
            row
        })
        .collect();

    Table { headers, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::fields::{FieldDescriptor, FieldType};
    use crate::models::{FormStatus, FormSubmission, SubmissionData};

    fn form(parent: Option<i64>) -> Form {
        Form {
            id: 2,
            name: "Employee".to_string(),
            fields: vec![
                FieldDescriptor::new("Name", FieldType::ShortText),
                FieldDescriptor::with_options("Skills", FieldType::CheckboxGroup, ["rust", "sql"]),
            ],
            status: FormStatus::Active,
            version: 1,
            original_form_id: None,
            parent_form_id: parent,
            share_token: "t".to_string(),
            created_by: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn record(id: i64, parent: Option<i64>, pairs: &[(&str, &str)]) -> SubmissionRecord {
        SubmissionRecord {
            submission: FormSubmission {
                id,
                form_id: 2,
                submitted_by: None,
                parent_submission_id: parent,
                submitted_at: format!("2024-01-0{}T00:00:00.000000Z", id),
            },
            data: pairs
                .iter()
                .map(|(k, v)| SubmissionData {
                    submission_id: id,
                    field_name: k.to_string(),
                    field_value: v.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_rows_match_header_width() {
        let records = vec![
            record(1, Some(7), &[("Name", "Ada"), ("Skills", r#"["rust","sql"]"#)]),
            record(2, None, &[]),
            record(3, Some(8), &[("Stray", "ignored")]),
        ];
        let mut labels = HashMap::new();
        labels.insert(7, "Acme (Company)".to_string());

        let table = pivot_to_table(&form(Some(1)), &records, &labels);
        assert_eq!(
            table.headers,
            vec!["Name", "Skills", LINKED_PARENT_HEADER, SUBMITTED_AT_HEADER]
        );
        for row in &table.rows {
            assert_eq!(row.len(), table.headers.len());
        }
        assert_eq!(table.rows[0][1], "rust, sql");
        assert_eq!(table.rows[0][2], "Acme (Company)");
        assert_eq!(table.rows[1][0], "");
        assert_eq!(table.rows[2][2], "#8");
    }

    #[test]
    fn test_no_parent_column_without_parent_form() {
        let table = pivot_to_table(&form(None), &[record(1, None, &[("Name", "Ada")])], &HashMap::new());
        assert_eq!(table.headers, vec!["Name", "Skills", SUBMITTED_AT_HEADER]);
        assert_eq!(table.rows[0].len(), 3);
        assert!(table.to_tsv().starts_with("Name\tSkills\tSubmitted At\n"));
    }
}
