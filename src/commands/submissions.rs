//! Submission commands implementation

use crate::db::FormDb;
use crate::error::{Error, Result};
use crate::models::{SubmissionRecord, User};
use crate::submissions::{ChildRollup, FileInput, FileUpload, RawInput, RawValue, Table};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Collect `name=value` arguments; a repeated name becomes a list
pub fn parse_values(args: &[String]) -> Result<RawInput> {
    let mut raw = RawInput::new();
    for arg in args {
        let (name, value) = arg
            .split_once('=')
            .ok_or_else(|| Error::Validation(format!("Expected name=value, got '{}'", arg)))?;
        let name = name.trim().to_string();
        let value = value.to_string();
        match raw.remove(&name) {
            None => {
                raw.insert(name, RawValue::Single(value));
            }
            Some(RawValue::Single(first)) => {
                raw.insert(name, RawValue::Multi(vec![first, value]));
            }
            Some(RawValue::Multi(mut values)) => {
                values.push(value);
                raw.insert(name, RawValue::Multi(values));
            }
        }
    }
    Ok(raw)
}

/// Collect `name=path` arguments into upload metadata
pub fn parse_files(args: &[String]) -> Result<FileInput> {
    let mut files = FileInput::new();
    for arg in args {
        let (name, path) = arg
            .split_once('=')
            .ok_or_else(|| Error::Validation(format!("Expected name=path, got '{}'", arg)))?;
        let path = Path::new(path);
        let size = std::fs::metadata(path)?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        files.insert(name.trim().to_string(), FileUpload { file_name, size });
    }
    Ok(files)
}

/// Where a CLI submission goes
#[derive(Debug, Clone)]
pub enum SubmitTarget {
    Form(i64),
    ShareToken(String),
}

#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub target: SubmitTarget,
    pub values: Vec<String>,
    pub files: Vec<String>,
    pub parent: Option<i64>,
}

/// A stored submission with its display label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionView {
    pub label: String,
    #[serde(flatten)]
    pub record: SubmissionRecord,
}

/// Submit values to a form, by id (needs an actor) or by share token
pub async fn cmd_submit(db: &FormDb, actor: Option<&User>, options: SubmitOptions) -> Result<SubmissionView> {
    let raw = parse_values(&options.values)?;
    let files = parse_files(&options.files)?;

    let record = match options.target {
        SubmitTarget::Form(form_id) => {
            let actor = actor.ok_or_else(|| {
                Error::Config("Submitting by form id needs --as <username>".to_string())
            })?;
            db.submit_internal(form_id, &raw, &files, actor, options.parent)
                .await?
        }
        SubmitTarget::ShareToken(token) => {
            db.submit_public(&token, &raw, &files, actor, options.parent)
                .await?
        }
    };
    view(db, record).await
}

/// Label records for display
pub async fn cmd_views(db: &FormDb, records: Vec<SubmissionRecord>) -> Result<Vec<SubmissionView>> {
    let mut views = Vec::with_capacity(records.len());
    for record in records {
        views.push(view(db, record).await?);
    }
    Ok(views)
}

async fn view(db: &FormDb, record: SubmissionRecord) -> Result<SubmissionView> {
    let label = db.submission_label(&record).await?;
    Ok(SubmissionView { label, record })
}

/// Print one submission to console
pub fn print_submission(view: &SubmissionView) {
    let s = &view.record.submission;
    println!("\n🗂  {}\n", view.label);
    println!("ID: {}", s.id);
    println!("Form: {}", s.form_id);
    if let Some(parent) = s.parent_submission_id {
        println!("Parent submission: {}", parent);
    }
    println!("Submitted: {}", s.submitted_at);
    println!();
    for entry in &view.record.data {
        println!("  {}: {}", entry.field_name, entry.field_value);
    }
}

/// Print submissions list to console
pub fn print_submissions(views: &[SubmissionView]) {
    if views.is_empty() {
        println!("No submissions.");
        return;
    }
    for view in views {
        println!(
            "• {} (id {}, {})",
            view.label, view.record.submission.id, view.record.submission.submitted_at
        );
    }
}

/// Print an export table as tab-separated values
pub fn print_table(table: &Table) {
    print!("{}", table.to_tsv());
}

/// Print child roll-up counts
pub fn print_rollup(rollup: &[ChildRollup]) {
    if rollup.is_empty() {
        println!("No active child forms.");
        return;
    }
    for entry in rollup {
        println!(
            "• {} (form {}): {} submissions",
            entry.form_name, entry.form_id, entry.submission_count
        );
    }
}
