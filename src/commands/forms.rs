//! Form commands implementation

use crate::config::Config;
use crate::db::FormDb;
use crate::error::Result;
use crate::forms::fields::{parse_field_descriptors, FieldDescriptor};
use crate::forms::{FormRevision, NewForm};
use crate::models::{Form, Permission, User};
use crate::suggest::create_suggester;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Read a field list given inline as JSON or as a path to a JSON file
pub fn read_fields(arg: &str) -> Result<Vec<FieldDescriptor>> {
    let trimmed = arg.trim_start();
    let json = if trimmed.starts_with('[') {
        arg.to_string()
    } else {
        std::fs::read_to_string(Path::new(arg))?
    };
    parse_field_descriptors(&json)
}

#[derive(Debug, Clone)]
pub struct CreateFormOptions {
    pub name: String,
    pub fields: String,
    pub parent: Option<i64>,
    pub active: bool,
}

/// Create a new form
pub async fn cmd_create_form(db: &FormDb, actor: &User, options: CreateFormOptions) -> Result<Form> {
    let fields = read_fields(&options.fields)?;
    let mut new_form = NewForm::new(options.name, fields);
    if options.active {
        new_form = new_form.active();
    }
    if let Some(parent) = options.parent {
        new_form = new_form.with_parent(parent);
    }
    db.create_form(new_form, actor).await
}

#[derive(Debug, Clone)]
pub struct ReviseFormOptions {
    pub form_id: i64,
    pub name: Option<String>,
    pub fields: Option<String>,
    pub parent: Option<i64>,
    pub detach: bool,
}

/// Publish a new version of a form; unspecified parts carry over
pub async fn cmd_revise_form(db: &FormDb, actor: &User, options: ReviseFormOptions) -> Result<Form> {
    let current = db.form_for(actor, options.form_id, Permission::EDIT).await?;
    let fields = match &options.fields {
        Some(arg) => read_fields(arg)?,
        None => current.fields.clone(),
    };
    let parent_form_id = if options.detach {
        None
    } else {
        options.parent.or(current.parent_form_id)
    };

    let revision = FormRevision {
        name: options.name.unwrap_or(current.name),
        fields,
        parent_form_id,
    };
    db.revise_form(options.form_id, revision, actor).await
}

/// A form plus what the caller may do with it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormDetail {
    pub form: Form,
    pub permission: Permission,
    pub child_forms: Vec<Form>,
}

/// Show one form
pub async fn cmd_show_form(db: &FormDb, actor: &User, form_id: i64) -> Result<FormDetail> {
    let form = db.form_for(actor, form_id, Permission::ANY).await?;
    let permission = db.effective_permission(actor, &form).await?;
    let child_forms = db.child_forms(form.id).await?;
    Ok(FormDetail {
        form,
        permission,
        child_forms,
    })
}

/// Ask the configured assistant for a field list
pub async fn cmd_suggest_fields(config: &Config, description: &str) -> Result<Vec<FieldDescriptor>> {
    let suggester = create_suggester(&config.suggest)?;
    info!("Suggesting fields with model '{}'", suggester.model_name());
    suggester.suggest(description).await
}

/// Print field descriptors as an indented list
pub fn print_fields(fields: &[FieldDescriptor]) {
    for field in fields {
        if field.options.is_empty() {
            println!("  - {} ({})", field.name, field.field_type);
        } else {
            println!(
                "  - {} ({}: {})",
                field.name,
                field.field_type,
                field.options.join(", ")
            );
        }
    }
}

fn form_line(form: &Form) -> String {
    format!(
        "• {} [{}] (id {}, v{})",
        form.name, form.status, form.id, form.version
    )
}

/// Print one form to console
pub fn print_form(detail: &FormDetail) {
    let form = &detail.form;
    println!("\n📝 {}\n", form.name);
    println!("ID: {}", form.id);
    println!("Status: {}", form.status);
    println!("Version: {}", form.version);
    if let Some(original) = form.original_form_id {
        println!("First version: {}", original);
    }
    if let Some(parent) = form.parent_form_id {
        println!("Parent form: {}", parent);
    }
    println!("Share token: {}", form.share_token);
    println!("Your access: {}", detail.permission);
    println!("Updated: {}", form.updated_at);
    println!("\nFields:");
    print_fields(&form.fields);

    if !detail.child_forms.is_empty() {
        println!("\nChild forms:");
        for child in &detail.child_forms {
            println!("  {}", form_line(child));
        }
    }
}

/// Print forms list to console
pub fn print_forms(forms: &[Form]) {
    println!("\n📋 Forms\n");

    if forms.is_empty() {
        println!("No forms found. Use 'formgraph form create' to add one.");
        return;
    }

    for form in forms {
        println!("{}", form_line(form));
        if let Some(parent) = form.parent_form_id {
            println!("  Parent form: {}", parent);
        }
        println!("  Fields: {}", form.fields.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{setup_test_db, user};
    use crate::forms::fields::FieldType;
    use crate::models::{FormStatus, Role};
    use tempfile::TempDir;

    #[test]
    fn test_read_fields_inline_and_from_file() {
        let inline = read_fields(r#"[{"name": "Email", "type": "EMAIL"}]"#).unwrap();
        assert_eq!(inline[0].field_type, FieldType::Email);

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fields.json");
        std::fs::write(&path, r#"[{"name": "Bio", "type": "TEXTAREA"}]"#).unwrap();
        let from_file = read_fields(path.to_str().unwrap()).unwrap();
        assert_eq!(from_file[0].field_type, FieldType::LongText);
    }

    #[tokio::test]
    async fn test_revise_carries_unspecified_parts() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let parent = cmd_create_form(
            &db,
            &owner,
            CreateFormOptions {
                name: "Company".to_string(),
                fields: r#"[{"name": "Name", "type": "TEXT"}]"#.to_string(),
                parent: None,
                active: true,
            },
        )
        .await
        .unwrap();
        let child = cmd_create_form(
            &db,
            &owner,
            CreateFormOptions {
                name: "Employee".to_string(),
                fields: r#"[{"name": "Name", "type": "TEXT"}]"#.to_string(),
                parent: Some(parent.id),
                active: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(child.status, FormStatus::Draft);

        let revised = cmd_revise_form(
            &db,
            &owner,
            ReviseFormOptions {
                form_id: child.id,
                name: Some("Staff".to_string()),
                fields: None,
                parent: None,
                detach: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(revised.name, "Staff");
        assert_eq!(revised.fields, child.fields);
        assert_eq!(revised.parent_form_id, Some(parent.id));

        let detail = cmd_show_form(&db, &owner, parent.id).await.unwrap();
        assert_eq!(detail.permission, Permission::Admin);
        assert_eq!(detail.child_forms.len(), 1);
        assert_eq!(detail.child_forms[0].id, revised.id);
    }
}
