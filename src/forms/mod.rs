//! Schema store
//!
//! Forms are immutable once published in the sense that editing never
//! rewrites a row: a revision archives the current version and inserts the
//! next one inside a single transaction. The chain is identified by
//! `original_form_id`, which always names the version-1 row.

pub mod fields;

use crate::db::FormDb;
use crate::error::{Error, Result};
use crate::models::{now_timestamp, Form, FormRow, FormStatus, Permission, Role, User};
use fields::{validate_fields, FieldDescriptor};
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

/// Input for `create_form`
#[derive(Debug, Clone)]
pub struct NewForm {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub parent_form_id: Option<i64>,
    pub status: FormStatus,
}

impl NewForm {
    /// A draft form with no parent
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
            parent_form_id: None,
            status: FormStatus::Draft,
        }
    }

    pub fn active(mut self) -> Self {
        self.status = FormStatus::Active;
        self
    }

    pub fn with_parent(mut self, parent_form_id: i64) -> Self {
        self.parent_form_id = Some(parent_form_id);
        self
    }
}

/// Input for `revise_form`
#[derive(Debug, Clone)]
pub struct FormRevision {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub parent_form_id: Option<i64>,
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("Form name cannot be blank".to_string()));
    }
    Ok(name)
}

fn into_forms(rows: Vec<FormRow>) -> Result<Vec<Form>> {
    rows.into_iter().map(Form::try_from).collect()
}

impl FormDb {
    // ===== Retrieval =====

    /// Get form by ID
    pub async fn get_form(&self, id: i64) -> Result<Form> {
        let row = sqlx::query_as::<_, FormRow>("SELECT * FROM forms WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(Error::FormNotFound(id))?;
        Form::try_from(row)
    }

    /// Get the form a share link points at; only active forms resolve
    pub async fn get_active_form_by_token(&self, share_token: &str) -> Result<Form> {
        let row = sqlx::query_as::<_, FormRow>(
            "SELECT * FROM forms WHERE share_token = ? AND status = 'active'",
        )
        .bind(share_token)
        .fetch_optional(self.pool())
        .await?
        .ok_or(Error::ShareTokenNotFound)?;
        Form::try_from(row)
    }

    /// Non-archived forms visible to a user, most recently updated first
    pub async fn list_forms_for(&self, user: &User) -> Result<Vec<Form>> {
        let rows = if user.role == Role::Admin {
            sqlx::query_as::<_, FormRow>(
                "SELECT * FROM forms WHERE status != 'archived' ORDER BY updated_at DESC, id DESC",
            )
            .fetch_all(self.pool())
            .await?
        } else {
            sqlx::query_as::<_, FormRow>(
                r#"
                SELECT * FROM forms
                WHERE status != 'archived'
                  AND (created_by = ?
                       OR id IN (SELECT form_id FROM form_permissions WHERE user_id = ?))
                ORDER BY updated_at DESC, id DESC
                "#,
            )
            .bind(user.id)
            .bind(user.id)
            .fetch_all(self.pool())
            .await?
        };
        into_forms(rows)
    }

    /// Every version in the chain containing `form_id`, oldest first
    pub async fn list_form_versions(&self, form_id: i64, actor: &User) -> Result<Vec<Form>> {
        let form = self.form_for(actor, form_id, Permission::ANY).await?;
        let root = form.chain_root_id();
        let rows = sqlx::query_as::<_, FormRow>(
            "SELECT * FROM forms WHERE id = ? OR original_form_id = ? ORDER BY version",
        )
        .bind(root)
        .bind(root)
        .fetch_all(self.pool())
        .await?;
        into_forms(rows)
    }

    /// Non-archived forms declaring `form_id` as their parent
    pub async fn child_forms(&self, form_id: i64) -> Result<Vec<Form>> {
        let rows = sqlx::query_as::<_, FormRow>(
            "SELECT * FROM forms WHERE parent_form_id = ? AND status != 'archived' ORDER BY name, id",
        )
        .bind(form_id)
        .fetch_all(self.pool())
        .await?;
        into_forms(rows)
    }

    // ===== Mutations =====

    /// Create version 1 of a new form
    pub async fn create_form(&self, new_form: NewForm, creator: &User) -> Result<Form> {
        let name = validate_name(&new_form.name)?;
        validate_fields(&new_form.fields)?;
        if new_form.status == FormStatus::Archived {
            return Err(Error::Validation(
                "A form cannot be created archived".to_string(),
            ));
        }
        if let Some(parent_id) = new_form.parent_form_id {
            self.live_parent(parent_id).await?;
        }

        let now = now_timestamp();
        let share_token = Uuid::new_v4().to_string();
        let fields_json = serde_json::to_string(&new_form.fields)?;

        let id = sqlx::query(
            r#"
            INSERT INTO forms (name, fields_json, status, version, original_form_id, parent_form_id,
                               share_token, created_by, created_at, updated_at)
            VALUES (?, ?, ?, 1, NULL, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(&fields_json)
        .bind(new_form.status)
        .bind(new_form.parent_form_id)
        .bind(&share_token)
        .bind(creator.id)
        .bind(&now)
        .bind(&now)
        .execute(self.pool())
        .await?
        .last_insert_rowid();

        info!(
            "Created form '{}' ({}) with {} fields by '{}'",
            name,
            id,
            new_form.fields.len(),
            creator.username
        );
        self.get_form(id).await
    }

    /// Archive the current version and insert its successor atomically
    pub async fn revise_form(&self, form_id: i64, revision: FormRevision, editor: &User) -> Result<Form> {
        let old = self.form_for(editor, form_id, Permission::EDIT).await?;
        if old.status == FormStatus::Archived {
            return Err(Error::Validation(format!(
                "Form {} is archived; revise the latest version instead",
                form_id
            )));
        }
        let name = validate_name(&revision.name)?;
        validate_fields(&revision.fields)?;
        if let Some(parent_id) = revision.parent_form_id {
            self.check_parent_candidate(&old, parent_id).await?;
        }

        let now = now_timestamp();
        let share_token = Uuid::new_v4().to_string();
        let fields_json = serde_json::to_string(&revision.fields)?;
        let original_form_id = old.chain_root_id();

        let mut tx = self.pool().begin().await?;

        let archived = sqlx::query(
            "UPDATE forms SET status = 'archived', updated_at = ? WHERE id = ? AND status != 'archived'",
        )
        .bind(&now)
        .bind(form_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if archived != 1 {
            return Err(Error::Conflict(format!(
                "Form {} was revised or archived concurrently",
                form_id
            )));
        }

        let new_id = sqlx::query(
            r#"
            INSERT INTO forms (name, fields_json, status, version, original_form_id, parent_form_id,
                               share_token, created_by, created_at, updated_at)
            VALUES (?, ?, 'active', ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(&fields_json)
        .bind(old.version + 1)
        .bind(original_form_id)
        .bind(revision.parent_form_id)
        .bind(&share_token)
        .bind(old.created_by)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        // Grants and child forms follow the live version
        sqlx::query(
            r#"
            INSERT INTO form_permissions (form_id, user_id, level)
            SELECT ?, user_id, level FROM form_permissions WHERE form_id = ?
            "#,
        )
        .bind(new_id)
        .bind(form_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE forms SET parent_form_id = ?, updated_at = ? WHERE parent_form_id = ?")
            .bind(new_id)
            .bind(&now)
            .bind(form_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            "Revised form {} -> {} (version {}) by '{}'",
            form_id,
            new_id,
            old.version + 1,
            editor.username
        );
        self.get_form(new_id).await
    }

    /// Soft-delete every version in the chain; returns the rows touched
    pub async fn archive_form_family(&self, form_id: i64, actor: &User) -> Result<u64> {
        let form = self.form_for(actor, form_id, Permission::ADMIN).await?;
        let root = form.chain_root_id();

        // updated_at only moves for rows that actually change state
        let touched = sqlx::query(
            r#"
            UPDATE forms
            SET updated_at = CASE WHEN status = 'archived' THEN updated_at ELSE ? END,
                status = 'archived'
            WHERE id = ? OR original_form_id = ?
            "#,
        )
        .bind(now_timestamp())
        .bind(root)
        .bind(root)
        .execute(self.pool())
        .await?
        .rows_affected();

        info!(
            "Archived form family {} ({} rows) by '{}'",
            root, touched, actor.username
        );
        Ok(touched)
    }

    /// Attach a form under a parent form, or detach it with `None`
    pub async fn set_parent(
        &self,
        form_id: i64,
        new_parent_form_id: Option<i64>,
        actor: &User,
    ) -> Result<Form> {
        let form = self.form_for(actor, form_id, Permission::EDIT).await?;
        if let Some(parent_id) = new_parent_form_id {
            self.check_parent_candidate(&form, parent_id).await?;
        }

        sqlx::query("UPDATE forms SET parent_form_id = ?, updated_at = ? WHERE id = ?")
            .bind(new_parent_form_id)
            .bind(now_timestamp())
            .bind(form_id)
            .execute(self.pool())
            .await?;

        match new_parent_form_id {
            Some(parent_id) => info!("Form {} is now a child of form {}", form_id, parent_id),
            None => info!("Form {} no longer has a parent", form_id),
        }
        self.get_form(form_id).await
    }

    /// A parent form must exist and must not be a superseded version
    async fn live_parent(&self, parent_id: i64) -> Result<Form> {
        let parent = self.get_form(parent_id).await?;
        if parent.status == FormStatus::Archived {
            return Err(Error::Validation(format!(
                "Form {} is archived and cannot take new child forms",
                parent_id
            )));
        }
        Ok(parent)
    }

    /// Reject unknown or archived parents, parents from the form's own
    /// version chain, and parents whose ancestry already reaches that chain.
    ///
    /// Versions of one chain count as the same form throughout. An archived
    /// parent the form already points at is tolerated so revisions can keep it.
    async fn check_parent_candidate(&self, form: &Form, parent_id: i64) -> Result<()> {
        let own_chain = form.chain_root_id();
        let parent = if form.parent_form_id == Some(parent_id) {
            self.get_form(parent_id).await?
        } else {
            self.live_parent(parent_id).await?
        };
        if parent.chain_root_id() == own_chain {
            return Err(Error::Validation(format!(
                "Form {} cannot be the parent of a version of itself",
                parent_id
            )));
        }

        let mut visited = HashSet::from([parent.id]);
        let mut current = parent.parent_form_id;
        while let Some(id) = current {
            if !visited.insert(id) {
                debug!("Pre-existing parent cycle through form {}", id);
                break;
            }
            let Some((original_form_id, parent_form_id)) =
                sqlx::query_as::<_, (Option<i64>, Option<i64>)>(
                    "SELECT original_form_id, parent_form_id FROM forms WHERE id = ?",
                )
                .bind(id)
                .fetch_optional(self.pool())
                .await?
            else {
                break;
            };
            if original_form_id.unwrap_or(id) == own_chain {
                return Err(Error::Validation(format!(
                    "Form {} is an ancestor of form {}; this would create a cycle",
                    form.id, parent_id
                )));
            }
            current = parent_form_id;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::fields::FieldType;
    use super::*;
    use crate::db::test_support::{setup_test_db, user};
    use crate::models::PermissionLevel;

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("Name", FieldType::ShortText),
            FieldDescriptor::new("Email", FieldType::Email),
        ]
    }

    fn revision(name: &str, parent: Option<i64>) -> FormRevision {
        FormRevision {
            name: name.to_string(),
            fields: fields(),
            parent_form_id: parent,
        }
    }

    #[tokio::test]
    async fn test_create_form() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;

        let form = db
            .create_form(NewForm::new("Company", fields()).active(), &owner)
            .await
            .unwrap();
        assert_eq!(form.version, 1);
        assert_eq!(form.status, FormStatus::Active);
        assert_eq!(form.original_form_id, None);
        assert_eq!(form.created_by, Some(owner.id));
        assert_eq!(form.fields, fields());

        let draft = db
            .create_form(NewForm::new("Company", fields()), &owner)
            .await
            .unwrap();
        assert_eq!(draft.status, FormStatus::Draft);
        assert_ne!(draft.share_token, form.share_token);
    }

    #[tokio::test]
    async fn test_create_form_validation() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;

        let empty = db.create_form(NewForm::new("Empty", vec![]), &owner).await;
        assert!(matches!(empty, Err(Error::Validation(_))));

        let choice = vec![FieldDescriptor::new("Size", FieldType::SingleChoice)];
        let missing = db.create_form(NewForm::new("Shirt", choice), &owner).await;
        assert!(matches!(missing, Err(Error::Validation(_))));

        let orphan = db
            .create_form(NewForm::new("Child", fields()).with_parent(999), &owner)
            .await;
        assert!(matches!(orphan, Err(Error::FormNotFound(999))));
    }

    #[tokio::test]
    async fn test_share_token_only_resolves_active_forms() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let draft = db
            .create_form(NewForm::new("Draft", fields()), &owner)
            .await
            .unwrap();
        let active = db
            .create_form(NewForm::new("Live", fields()).active(), &owner)
            .await
            .unwrap();

        assert!(matches!(
            db.get_active_form_by_token(&draft.share_token).await,
            Err(Error::ShareTokenNotFound)
        ));
        let found = db.get_active_form_by_token(&active.share_token).await.unwrap();
        assert_eq!(found.id, active.id);
    }

    #[tokio::test]
    async fn test_revise_form_chain() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let v1 = db
            .create_form(NewForm::new("Employee", fields()).active(), &owner)
            .await
            .unwrap();

        let v2 = db.revise_form(v1.id, revision("Employee", None), &owner).await.unwrap();
        assert_eq!(v2.version, 2);
        assert_eq!(v2.status, FormStatus::Active);
        assert_eq!(v2.original_form_id, Some(v1.id));
        assert_eq!(db.get_form(v1.id).await.unwrap().status, FormStatus::Archived);

        let v3 = db.revise_form(v2.id, revision("Staff", None), &owner).await.unwrap();
        assert_eq!(v3.version, 3);
        assert_eq!(v3.name, "Staff");
        assert_eq!(v3.original_form_id, Some(v1.id));

        let versions = db.list_form_versions(v3.id, &owner).await.unwrap();
        let live: Vec<_> = versions
            .iter()
            .filter(|f| f.status != FormStatus::Archived)
            .collect();
        assert_eq!(versions.len(), 3);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, v3.id);
    }

    #[tokio::test]
    async fn test_revise_rejects_archived_and_unknown() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let v1 = db
            .create_form(NewForm::new("Employee", fields()).active(), &owner)
            .await
            .unwrap();
        db.revise_form(v1.id, revision("Employee", None), &owner).await.unwrap();

        assert!(matches!(
            db.revise_form(v1.id, revision("Employee", None), &owner).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.revise_form(404, revision("Ghost", None), &owner).await,
            Err(Error::FormNotFound(404))
        ));
    }

    #[tokio::test]
    async fn test_revise_requires_editor_and_carries_grants() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Viewer).await;
        let helper = user(&db, "helper", Role::Viewer).await;
        let v1 = db
            .create_form(NewForm::new("Employee", fields()).active(), &owner)
            .await
            .unwrap();

        assert!(matches!(
            db.revise_form(v1.id, revision("Employee", None), &helper).await,
            Err(Error::PermissionDenied { .. })
        ));

        db.set_permission(v1.id, helper.id, Some(PermissionLevel::Editor), &owner)
            .await
            .unwrap();
        let v2 = db.revise_form(v1.id, revision("Employee", None), &helper).await.unwrap();
        assert_eq!(v2.created_by, Some(owner.id));
        assert_eq!(
            db.effective_permission(&helper, &v2).await.unwrap(),
            Permission::Editor
        );
    }

    #[tokio::test]
    async fn test_revise_repoints_child_forms() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let company = db
            .create_form(NewForm::new("Company", fields()).active(), &owner)
            .await
            .unwrap();
        let employee = db
            .create_form(NewForm::new("Employee", fields()).active().with_parent(company.id), &owner)
            .await
            .unwrap();

        let company_v2 = db
            .revise_form(company.id, revision("Company", None), &owner)
            .await
            .unwrap();
        let employee = db.get_form(employee.id).await.unwrap();
        assert_eq!(employee.parent_form_id, Some(company_v2.id));
    }

    #[tokio::test]
    async fn test_archive_form_family_is_idempotent() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let v1 = db
            .create_form(NewForm::new("Employee", fields()).active(), &owner)
            .await
            .unwrap();
        let v2 = db.revise_form(v1.id, revision("Employee", None), &owner).await.unwrap();

        let first = db.archive_form_family(v2.id, &owner).await.unwrap();
        assert_eq!(first, 2);
        let after_first = db.get_form(v2.id).await.unwrap();
        assert_eq!(after_first.status, FormStatus::Archived);

        let second = db.archive_form_family(v1.id, &owner).await.unwrap();
        assert_eq!(second, 2);
        let after_second = db.get_form(v2.id).await.unwrap();
        assert_eq!(after_second, after_first);

        assert!(db.list_forms_for(&owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_archive_requires_admin() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Viewer).await;
        let helper = user(&db, "helper", Role::Viewer).await;
        let form = db
            .create_form(NewForm::new("Employee", fields()).active(), &owner)
            .await
            .unwrap();
        db.set_permission(form.id, helper.id, Some(PermissionLevel::Editor), &owner)
            .await
            .unwrap();

        assert!(matches!(
            db.archive_form_family(form.id, &helper).await,
            Err(Error::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_set_parent_rejects_cycles() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let a = db.create_form(NewForm::new("A", fields()), &owner).await.unwrap();
        let b = db
            .create_form(NewForm::new("B", fields()).with_parent(a.id), &owner)
            .await
            .unwrap();
        let c = db
            .create_form(NewForm::new("C", fields()).with_parent(b.id), &owner)
            .await
            .unwrap();

        assert!(matches!(
            db.set_parent(a.id, Some(a.id), &owner).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.set_parent(a.id, Some(c.id), &owner).await,
            Err(Error::Validation(_))
        ));

        let detached = db.set_parent(c.id, None, &owner).await.unwrap();
        assert_eq!(detached.parent_form_id, None);
        let moved = db.set_parent(a.id, Some(c.id), &owner).await.unwrap();
        assert_eq!(moved.parent_form_id, Some(c.id));
    }

    #[tokio::test]
    async fn test_set_parent_rejects_own_versions() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let v1 = db.create_form(NewForm::new("A", fields()).active(), &owner).await.unwrap();
        let v2 = db.revise_form(v1.id, revision("A", None), &owner).await.unwrap();

        assert!(matches!(
            db.revise_form(v2.id, revision("A", Some(v1.id)), &owner).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.set_parent(v2.id, Some(v1.id), &owner).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(db.get_form(v2.id).await.unwrap().parent_form_id, None);
        assert_eq!(db.get_form(v2.id).await.unwrap().status, FormStatus::Active);
    }

    #[tokio::test]
    async fn test_cycle_check_follows_version_chains() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let a1 = db.create_form(NewForm::new("A", fields()).active(), &owner).await.unwrap();
        let b = db
            .create_form(NewForm::new("B", fields()).active().with_parent(a1.id), &owner)
            .await
            .unwrap();
        let a2 = db.revise_form(a1.id, revision("A", None), &owner).await.unwrap();

        // B still names the superseded version of A
        sqlx::query("UPDATE forms SET parent_form_id = ? WHERE id = ?")
            .bind(a1.id)
            .bind(b.id)
            .execute(db.pool())
            .await
            .unwrap();

        assert!(matches!(
            db.set_parent(a2.id, Some(b.id), &owner).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_archived_forms_cannot_become_parents() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let company = db
            .create_form(NewForm::new("Company", fields()).active(), &owner)
            .await
            .unwrap();
        let company_v2 = db
            .revise_form(company.id, revision("Company", None), &owner)
            .await
            .unwrap();
        let team = db.create_form(NewForm::new("Team", fields()), &owner).await.unwrap();

        assert!(matches!(
            db.create_form(NewForm::new("Employee", fields()).with_parent(company.id), &owner)
                .await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.set_parent(team.id, Some(company.id), &owner).await,
            Err(Error::Validation(_))
        ));
        let attached = db.set_parent(team.id, Some(company_v2.id), &owner).await.unwrap();
        assert_eq!(attached.parent_form_id, Some(company_v2.id));
    }

    #[tokio::test]
    async fn test_list_forms_for_respects_access() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let viewer = user(&db, "viewer", Role::Viewer).await;
        let admin = user(&db, "admin", Role::Admin).await;
        let shared = db.create_form(NewForm::new("Shared", fields()), &owner).await.unwrap();
        db.create_form(NewForm::new("Private", fields()), &owner).await.unwrap();

        db.set_permission(shared.id, viewer.id, Some(PermissionLevel::Viewer), &owner)
            .await
            .unwrap();

        assert_eq!(db.list_forms_for(&owner).await.unwrap().len(), 2);
        assert_eq!(db.list_forms_for(&admin).await.unwrap().len(), 2);
        let visible = db.list_forms_for(&viewer).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "Shared");
    }
}
