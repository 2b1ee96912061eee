//! Display labels for submissions

use crate::models::{Form, SubmissionRecord};

/// Field names worth showing in a picker, most preferred first
const LABEL_FIELDS: &[&str] = &[
    "name",
    "full name",
    "full_name",
    "title",
    "school name",
    "school_name",
    "teacher name",
    "teacher_name",
    "student name",
    "student_name",
    "username",
];

/// A short human-readable label for a submission.
///
/// Never fails: a record without any display-worthy answer falls back to
/// its id.
pub fn representative_label(record: &SubmissionRecord, form: &Form) -> String {
    for candidate in LABEL_FIELDS {
        let hit = record.data.iter().find(|d| {
            d.field_name.trim().eq_ignore_ascii_case(candidate) && !d.field_value.trim().is_empty()
        });
        if let Some(entry) = hit {
            return format!("{} ({})", entry.field_value.trim(), form.name);
        }
    }
    format!("Submission for {} (#{})", form.name, record.submission.id)
}
