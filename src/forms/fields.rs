//! Field descriptors: the typed entries of a form schema
//!
//! The type vocabulary is shared with external schema generators, so
//! parsing accepts the legacy spellings they tend to emit (`VARCHAR(255)`,
//! `RADIO`, `CHECKBOX` with options, ...) and stores one canonical name.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// The fixed set of supported field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    ShortText,
    LongText,
    Integer,
    Float,
    Date,
    DateTime,
    Time,
    Boolean,
    Email,
    Phone,
    Url,
    Color,
    Range,
    Password,
    SingleChoice,
    MultiChoice,
    CheckboxGroup,
    File,
}

impl FieldType {
    pub const ALL: [FieldType; 18] = [
        FieldType::ShortText,
        FieldType::LongText,
        FieldType::Integer,
        FieldType::Float,
        FieldType::Date,
        FieldType::DateTime,
        FieldType::Time,
        FieldType::Boolean,
        FieldType::Email,
        FieldType::Phone,
        FieldType::Url,
        FieldType::Color,
        FieldType::Range,
        FieldType::Password,
        FieldType::SingleChoice,
        FieldType::MultiChoice,
        FieldType::CheckboxGroup,
        FieldType::File,
    ];

    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShortText => "TEXT",
            Self::LongText => "TEXTAREA",
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::Date => "DATE",
            Self::DateTime => "DATETIME",
            Self::Time => "TIME",
            Self::Boolean => "BOOLEAN",
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
            Self::Url => "URL",
            Self::Color => "COLOR",
            Self::Range => "RANGE",
            Self::Password => "PASSWORD",
            Self::SingleChoice => "SELECT",
            Self::MultiChoice => "MULTISELECT",
            Self::CheckboxGroup => "CHECKBOX_GROUP",
            Self::File => "FILE",
        }
    }

    /// Choice types must carry options
    pub fn is_choice(&self) -> bool {
        matches!(
            self,
            Self::SingleChoice | Self::MultiChoice | Self::CheckboxGroup
        )
    }

    /// Answers hold a list of selected options
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Self::MultiChoice | Self::CheckboxGroup)
    }

    /// Resolve a type name, using the presence of options to disambiguate
    /// the overloaded `CHECKBOX` spelling.
    pub fn parse_with_options(name: &str, has_options: bool) -> Result<Self> {
        let upper = name.trim().to_uppercase();
        if upper == "CHECKBOX" {
            return Ok(if has_options {
                Self::CheckboxGroup
            } else {
                Self::Boolean
            });
        }
        upper.parse()
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        let ty = match upper.as_str() {
            "TEXT" | "SHORT_TEXT" | "VARCHAR" | "VARCHAR(255)" | "STRING" => Self::ShortText,
            "TEXTAREA" | "LONG_TEXT" => Self::LongText,
            "INTEGER" | "INT" => Self::Integer,
            "FLOAT" | "DECIMAL" | "NUMBER" => Self::Float,
            "DATE" => Self::Date,
            "DATETIME" | "DATETIME-LOCAL" => Self::DateTime,
            "TIME" => Self::Time,
            "BOOLEAN" | "BOOL" | "CHECKBOX" => Self::Boolean,
            "EMAIL" => Self::Email,
            "PHONE" | "TEL" => Self::Phone,
            "URL" => Self::Url,
            "COLOR" => Self::Color,
            "RANGE" => Self::Range,
            "PASSWORD" => Self::Password,
            "SELECT" | "RADIO" | "SINGLE_CHOICE" => Self::SingleChoice,
            "MULTISELECT" | "MULTI_CHOICE" => Self::MultiChoice,
            "CHECKBOX_GROUP" => Self::CheckboxGroup,
            "FILE" => Self::File,
            _ => return Err(Error::Validation(format!("Unknown field type: {}", s))),
        };
        Ok(ty)
    }
}

impl Serialize for FieldType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Wire shape of a descriptor before its type name is resolved
#[derive(Debug, Clone, Deserialize)]
struct RawFieldDescriptor {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    options: Option<Vec<String>>,
}

/// One named, typed entry in a form schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFieldDescriptor")]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl TryFrom<RawFieldDescriptor> for FieldDescriptor {
    type Error = Error;

    fn try_from(raw: RawFieldDescriptor) -> Result<Self> {
        let options = raw.options.unwrap_or_default();
        let field_type = FieldType::parse_with_options(&raw.field_type, !options.is_empty())
            .map_err(|_| {
                Error::Validation(format!(
                    "Field '{}' has unknown type '{}'",
                    raw.name, raw.field_type
                ))
            })?;
        Ok(Self {
            name: raw.name,
            field_type,
            options,
        })
    }
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            options: Vec::new(),
        }
    }

    pub fn with_options<I, S>(name: impl Into<String>, field_type: FieldType, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            field_type,
            options: options.into_iter().map(Into::into).collect(),
        }
    }
}

/// Parse a JSON array of descriptors; malformed input is a validation failure
pub fn parse_field_descriptors(json: &str) -> Result<Vec<FieldDescriptor>> {
    serde_json::from_str(json)
        .map_err(|e| Error::Validation(format!("Invalid field list: {}", e)))
}

/// Check a schema: non-empty, unique non-blank names, options on choice types
pub fn validate_fields(fields: &[FieldDescriptor]) -> Result<()> {
    if fields.is_empty() {
        return Err(Error::Validation(
            "A form needs at least one field".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(fields.len());
    for field in fields {
        let name = field.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Field names cannot be blank".to_string()));
        }
        if name != field.name {
            return Err(Error::Validation(format!(
                "Field name '{}' has leading or trailing whitespace",
                field.name
            )));
        }
        if !seen.insert(name) {
            return Err(Error::Validation(format!("Duplicate field name: {}", name)));
        }
        if field.field_type.is_choice() {
            if field.options.is_empty() {
                return Err(Error::Validation(format!(
                    "Field '{}' of type {} requires options",
                    name, field.field_type
                )));
            }
            if field.options.iter().any(|o| o.trim().is_empty()) {
                return Err(Error::Validation(format!(
                    "Field '{}' has a blank option",
                    name
                )));
            }
        }
    }

    Ok(())
}
