//! Boundary validation of raw submission input
//!
//! Raw values arrive as scalars or lists keyed by field name. Each schema
//! field is checked against its type once, here, and reduced to the string
//! that gets stored. Multi-valued answers are stored as a JSON array.

use crate::error::{Error, Result};
use crate::forms::fields::{FieldDescriptor, FieldType};
use crate::models::Form;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// One raw answer as supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Single(String),
    Multi(Vec<String>),
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Single(value.to_string())
    }
}

impl From<Vec<&str>> for RawValue {
    fn from(values: Vec<&str>) -> Self {
        RawValue::Multi(values.into_iter().map(str::to_string).collect())
    }
}

/// Raw answers keyed by field name
pub type RawInput = HashMap<String, RawValue>;

/// Metadata of an uploaded file; the bytes live in an external blob store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUpload {
    pub file_name: String,
    pub size: u64,
}

impl FileUpload {
    /// The descriptive string stored in place of file content
    pub fn describe(&self) -> String {
        format!("Uploaded: {} ({} bytes)", self.file_name, self.size)
    }
}

/// Uploaded files keyed by field name
pub type FileInput = HashMap<String, FileUpload>;

/// Normalized answers in schema order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedData {
    entries: Vec<(String, String)>,
}

impl NormalizedData {
    pub fn get(&self, field_name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == field_name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, name: &str, value: String) {
        self.entries.push((name.to_string(), value));
    }
}

impl FromIterator<(String, String)> for NormalizedData {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Encode a list answer in its canonical stored form
pub fn encode_multi(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a stored multi-valued answer; plain scalars decode to one item
pub fn decode_multi(stored: &str) -> Vec<String> {
    serde_json::from_str::<Vec<String>>(stored).unwrap_or_else(|_| vec![stored.to_string()])
}

/// Validate raw input against the form's schema and normalize it.
///
/// Fields absent from the input (or given only blanks) are omitted.
/// Keys that are not schema fields are dropped.
pub fn validate_and_normalize(form: &Form, raw: &RawInput, files: &FileInput) -> Result<NormalizedData> {
    let mut out = NormalizedData::default();

    for field in &form.fields {
        if field.field_type == FieldType::File {
            if let Some(upload) = files.get(&field.name) {
                out.push(&field.name, upload.describe());
            }
            continue;
        }

        let Some(value) = raw.get(&field.name) else {
            continue;
        };

        let normalized = match value {
            RawValue::Multi(values) => {
                let values: Vec<String> = values
                    .iter()
                    .filter(|v| !v.trim().is_empty())
                    .cloned()
                    .collect();
                if values.is_empty() {
                    continue;
                }
                if field.field_type.is_multi_valued() {
                    let selected: Vec<String> =
                        values.iter().map(|v| v.trim().to_string()).collect();
                    for v in &selected {
                        check_option(field, v)?;
                    }
                    encode_multi(&selected)
                } else if values.len() == 1 {
                    normalize_scalar(field, &values[0])?
                } else {
                    return Err(Error::Validation(format!(
                        "Field '{}' accepts a single value, got {}",
                        field.name,
                        values.len()
                    )));
                }
            }
            RawValue::Single(value) => {
                if value.trim().is_empty() {
                    continue;
                }
                normalize_scalar(field, value)?
            }
        };

        out.push(&field.name, normalized);
    }

    Ok(out)
}

fn invalid(field: &FieldDescriptor, value: &str, expected: &str) -> Error {
    Error::Validation(format!(
        "Field '{}' expects {}, got '{}'",
        field.name, expected, value
    ))
}

fn check_option(field: &FieldDescriptor, value: &str) -> Result<()> {
    if field.options.iter().any(|o| o == value) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "'{}' is not an option of field '{}'",
            value, field.name
        )))
    }
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+?[0-9(][0-9 ().\-]{3,24}$").expect("valid phone regex"))
}

fn color_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("valid color regex"))
}

fn normalize_scalar(field: &FieldDescriptor, value: &str) -> Result<String> {
    let trimmed = value.trim();
    let normalized = match field.field_type {
        FieldType::ShortText | FieldType::LongText | FieldType::Password => value.to_string(),
        FieldType::Integer => {
            trimmed
                .parse::<i64>()
                .map_err(|_| invalid(field, value, "an integer"))?;
            trimmed.to_string()
        }
        FieldType::Float | FieldType::Range => {
            let n = trimmed
                .parse::<f64>()
                .map_err(|_| invalid(field, value, "a number"))?;
            if !n.is_finite() {
                return Err(invalid(field, value, "a finite number"));
            }
            trimmed.to_string()
        }
        FieldType::Date => {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map_err(|_| invalid(field, value, "a date (YYYY-MM-DD)"))?;
            trimmed.to_string()
        }
        FieldType::DateTime => {
            let ok = DateTime::parse_from_rfc3339(trimmed).is_ok()
                || ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
                    .iter()
                    .any(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).is_ok());
            if !ok {
                return Err(invalid(field, value, "a date and time"));
            }
            trimmed.to_string()
        }
        FieldType::Time => {
            let ok = ["%H:%M:%S", "%H:%M"]
                .iter()
                .any(|fmt| NaiveTime::parse_from_str(trimmed, fmt).is_ok());
            if !ok {
                return Err(invalid(field, value, "a time (HH:MM)"));
            }
            trimmed.to_string()
        }
        FieldType::Boolean => match trimmed.to_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => "true".to_string(),
            "false" | "off" | "no" | "0" => "false".to_string(),
            _ => return Err(invalid(field, value, "a yes/no value")),
        },
        FieldType::Email => {
            if !email_re().is_match(trimmed) {
                return Err(invalid(field, value, "an email address"));
            }
            trimmed.to_string()
        }
        FieldType::Phone => {
            if !phone_re().is_match(trimmed) {
                return Err(invalid(field, value, "a phone number"));
            }
            trimmed.to_string()
        }
        FieldType::Url => {
            url::Url::parse(trimmed).map_err(|_| invalid(field, value, "a URL"))?;
            trimmed.to_string()
        }
        FieldType::Color => {
            if !color_re().is_match(trimmed) {
                return Err(invalid(field, value, "a color (#rrggbb)"));
            }
            trimmed.to_lowercase()
        }
        FieldType::SingleChoice => {
            check_option(field, trimmed)?;
            trimmed.to_string()
        }
        FieldType::MultiChoice | FieldType::CheckboxGroup => {
            check_option(field, trimmed)?;
            encode_multi(&[trimmed.to_string()])
        }
        FieldType::File => {
            return Err(Error::Validation(format!(
                "Field '{}' takes an uploaded file",
                field.name
            )))
        }
    };
    Ok(normalized)
}
