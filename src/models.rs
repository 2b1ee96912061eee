//! Entity types persisted by the engine
//!
//! - Users and their global role
//! - Forms (versioned field schemas)
//! - Submissions and their key/value data
//! - Root-scoped child relationships
//! - Explicit per-form permission grants

use crate::error::{Error, Result};
use crate::forms::fields::FieldDescriptor;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Fixed-width UTC timestamp so stored strings sort chronologically
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Global user role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Editor => write!(f, "editor"),
            Role::Viewer => write!(f, "viewer"),
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            "viewer" => Ok(Role::Viewer),
            _ => Err(Error::Validation(format!("Unknown role: {}", s))),
        }
    }
}

/// Form lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum FormStatus {
    Draft,
    Active,
    Archived,
}

impl std::fmt::Display for FormStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormStatus::Draft => write!(f, "draft"),
            FormStatus::Active => write!(f, "active"),
            FormStatus::Archived => write!(f, "archived"),
        }
    }
}

impl FromStr for FormStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(FormStatus::Draft),
            "active" => Ok(FormStatus::Active),
            "archived" => Ok(FormStatus::Archived),
            _ => Err(Error::Validation(format!("Unknown form status: {}", s))),
        }
    }
}

/// Level stored in an explicit grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PermissionLevel {
    Viewer,
    Editor,
    Admin,
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionLevel::Viewer => write!(f, "viewer"),
            PermissionLevel::Editor => write!(f, "editor"),
            PermissionLevel::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for PermissionLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "viewer" => Ok(PermissionLevel::Viewer),
            "editor" => Ok(PermissionLevel::Editor),
            "admin" => Ok(PermissionLevel::Admin),
            _ => Err(Error::Validation(format!("Unknown permission level: {}", s))),
        }
    }
}

/// Effective access a user holds on a form
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    None,
    Viewer,
    Editor,
    Admin,
}

impl Permission {
    pub const ANY: &'static [Permission] =
        &[Permission::Viewer, Permission::Editor, Permission::Admin];
    pub const EDIT: &'static [Permission] = &[Permission::Editor, Permission::Admin];
    pub const ADMIN: &'static [Permission] = &[Permission::Admin];
}

impl From<PermissionLevel> for Permission {
    fn from(level: PermissionLevel) -> Self {
        match level {
            PermissionLevel::Viewer => Permission::Viewer,
            PermissionLevel::Editor => Permission::Editor,
            PermissionLevel::Admin => Permission::Admin,
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::None => write!(f, "none"),
            Permission::Viewer => write!(f, "viewer"),
            Permission::Editor => write!(f, "editor"),
            Permission::Admin => write!(f, "admin"),
        }
    }
}

/// A user known to the engine
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub created_at: String,
}

/// A form row as stored; `fields_json` is decoded by `Form::try_from`
#[derive(Debug, Clone, FromRow)]
pub struct FormRow {
    pub id: i64,
    pub name: String,
    pub fields_json: String,
    pub status: FormStatus,
    pub version: i64,
    pub original_form_id: Option<i64>,
    pub parent_form_id: Option<i64>,
    pub share_token: String,
    pub created_by: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// A versioned form schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub id: i64,
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub status: FormStatus,
    pub version: i64,
    pub original_form_id: Option<i64>,
    pub parent_form_id: Option<i64>,
    pub share_token: String,
    pub created_by: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl Form {
    /// Id of the version-1 ancestor of this chain
    pub fn chain_root_id(&self) -> i64 {
        self.original_form_id.unwrap_or(self.id)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl TryFrom<FormRow> for Form {
    type Error = Error;

    fn try_from(row: FormRow) -> Result<Self> {
        let fields = serde_json::from_str(&row.fields_json)?;
        Ok(Self {
            id: row.id,
            name: row.name,
            fields,
            status: row.status,
            version: row.version,
            original_form_id: row.original_form_id,
            parent_form_id: row.parent_form_id,
            share_token: row.share_token,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// One filled instance of a form
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct FormSubmission {
    pub id: i64,
    pub form_id: i64,
    pub submitted_by: Option<i64>,
    pub parent_submission_id: Option<i64>,
    pub submitted_at: String,
}

impl FormSubmission {
    pub fn is_root(&self) -> bool {
        self.parent_submission_id.is_none()
    }
}

/// One stored answer
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SubmissionData {
    pub submission_id: i64,
    pub field_name: String,
    pub field_value: String,
}

/// A submission together with its data entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub submission: FormSubmission,
    pub data: Vec<SubmissionData>,
}

impl SubmissionRecord {
    pub fn value(&self, field_name: &str) -> Option<&str> {
        self.data
            .iter()
            .find(|d| d.field_name == field_name)
            .map(|d| d.field_value.as_str())
    }
}

/// A typed edge between two children of one root submission
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ChildRelationship {
    pub id: i64,
    pub root_submission_id: i64,
    pub source_submission_id: i64,
    pub target_submission_id: i64,
    pub relationship_type: String,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_round_trip_through_strings() {
        for role in [Role::Admin, Role::Editor, Role::Viewer] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert_eq!("ACTIVE".parse::<FormStatus>().unwrap(), FormStatus::Active);
        assert!("deleted".parse::<FormStatus>().is_err());
    }

    #[test]
    fn test_permission_ordering() {
        assert!(Permission::Admin > Permission::Editor);
        assert!(Permission::Viewer > Permission::None);
        assert_eq!(
            Permission::from(PermissionLevel::Editor),
            Permission::Editor
        );
    }

    #[test]
    fn test_timestamps_are_fixed_width() {
        let a = now_timestamp();
        let b = now_timestamp();
        assert_eq!(a.len(), b.len());
        assert!(a.ends_with('Z'));
    }
}
