//! Submission store
//!
//! Answers are stored as key/value rows, one per answered field, written in
//! the same transaction as the submission row so readers never see a
//! partially stored submission.

pub mod label;
pub mod normalize;
pub mod table;

pub use label::representative_label;
pub use normalize::{
    decode_multi, encode_multi, validate_and_normalize, FileInput, FileUpload, NormalizedData, RawInput,
    RawValue,
};
pub use table::{pivot_to_table, Table};

use crate::db::FormDb;
use crate::error::{Error, Result};
use crate::models::{
    now_timestamp, Form, FormStatus, FormSubmission, Permission, SubmissionData, SubmissionRecord, User,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Submission count of one child form under a parent form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildRollup {
    pub form_id: i64,
    pub form_name: String,
    pub submission_count: usize,
}

impl FormDb {
    // ===== Writes =====

    /// Store a normalized submission and its data rows atomically
    pub async fn create_submission(
        &self,
        form: &Form,
        data: &NormalizedData,
        submitted_by: Option<&User>,
        parent_submission_id: Option<i64>,
    ) -> Result<SubmissionRecord> {
        if form.status == FormStatus::Archived {
            return Err(Error::Validation(format!(
                "Form {} is archived and no longer accepts submissions",
                form.id
            )));
        }
        for (name, _) in data.iter() {
            if form.field(name).is_none() {
                return Err(Error::Validation(format!(
                    "Field '{}' is not part of form '{}'",
                    name, form.name
                )));
            }
        }
        if let Some(parent_id) = parent_submission_id {
            self.check_parent_submission(form, parent_id).await?;
        }

        let submitted_at = now_timestamp();
        let submitted_by_id = submitted_by.map(|u| u.id);

        let mut tx = self.pool().begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO submissions (form_id, submitted_by, parent_submission_id, submitted_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(form.id)
        .bind(submitted_by_id)
        .bind(parent_submission_id)
        .bind(&submitted_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for (position, (name, value)) in data.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO submission_data (submission_id, field_name, field_value, position)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(name)
            .bind(value)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::from_insert(e, || format!("Field '{}' given twice", name)))?;
        }

        tx.commit().await?;

        info!(
            "Stored submission {} for form {} ({} values)",
            id,
            form.id,
            data.len()
        );

        Ok(SubmissionRecord {
            submission: FormSubmission {
                id,
                form_id: form.id,
                submitted_by: submitted_by_id,
                parent_submission_id,
                submitted_at,
            },
            data: data
                .iter()
                .map(|(name, value)| SubmissionData {
                    submission_id: id,
                    field_name: name.to_string(),
                    field_value: value.to_string(),
                })
                .collect(),
        })
    }

    /// Submit as an authenticated user with at least viewer access
    pub async fn submit_internal(
        &self,
        form_id: i64,
        raw: &RawInput,
        files: &FileInput,
        actor: &User,
        parent_submission_id: Option<i64>,
    ) -> Result<SubmissionRecord> {
        let form = self.form_for(actor, form_id, Permission::ANY).await?;
        let data = validate_and_normalize(&form, raw, files)?;
        self.create_submission(&form, &data, Some(actor), parent_submission_id)
            .await
    }

    /// Submit through a share link; only active forms accept these
    pub async fn submit_public(
        &self,
        share_token: &str,
        raw: &RawInput,
        files: &FileInput,
        submitted_by: Option<&User>,
        parent_submission_id: Option<i64>,
    ) -> Result<SubmissionRecord> {
        let form = self.get_active_form_by_token(share_token).await?;
        let data = validate_and_normalize(&form, raw, files)?;
        self.create_submission(&form, &data, submitted_by, parent_submission_id)
            .await
    }

    /// A parent must be an instance of the declared parent form (any version
    /// of its chain)
    async fn check_parent_submission(&self, form: &Form, parent_id: i64) -> Result<()> {
        let Some(parent_form_id) = form.parent_form_id else {
            return Err(Error::Validation(format!(
                "Form '{}' has no parent form; submissions cannot be nested",
                form.name
            )));
        };
        let parent = self.load_submission(parent_id).await?;
        let parent_form = self.get_form(parent_form_id).await?;
        let parent_of = self.get_form(parent.form_id).await?;

        if parent_of.chain_root_id() != parent_form.chain_root_id() {
            return Err(Error::Validation(format!(
                "Submission {} belongs to '{}', not to parent form '{}'",
                parent_id, parent_of.name, parent_form.name
            )));
        }
        Ok(())
    }

    // ===== Reads =====

    pub(crate) async fn load_submission(&self, id: i64) -> Result<FormSubmission> {
        sqlx::query_as::<_, FormSubmission>("SELECT * FROM submissions WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(Error::SubmissionNotFound(id))
    }

    async fn submission_data(&self, submission_id: i64) -> Result<Vec<SubmissionData>> {
        let data = sqlx::query_as::<_, SubmissionData>(
            r#"
            SELECT submission_id, field_name, field_value
            FROM submission_data
            WHERE submission_id = ?
            ORDER BY position
            "#,
        )
        .bind(submission_id)
        .fetch_all(self.pool())
        .await?;
        Ok(data)
    }

    pub(crate) async fn with_data(&self, submissions: Vec<FormSubmission>) -> Result<Vec<SubmissionRecord>> {
        let mut records = Vec::with_capacity(submissions.len());
        for submission in submissions {
            let data = self.submission_data(submission.id).await?;
            records.push(SubmissionRecord { submission, data });
        }
        Ok(records)
    }

    pub(crate) async fn load_record(&self, id: i64) -> Result<SubmissionRecord> {
        let submission = self.load_submission(id).await?;
        let data = self.submission_data(id).await?;
        Ok(SubmissionRecord { submission, data })
    }

    /// A submission with its data; visible to its submitter and to anyone
    /// with access to its form
    pub async fn get_submission(&self, id: i64, actor: &User) -> Result<SubmissionRecord> {
        let record = self.load_record(id).await?;
        if record.submission.submitted_by != Some(actor.id) {
            self.guard_resource(
                actor,
                record.submission.form_id,
                Permission::ANY,
                Error::SubmissionNotFound(id),
            )
            .await?;
        }
        Ok(record)
    }

    /// Submissions of one form version, oldest first
    pub async fn list_submissions(&self, form_id: i64, actor: &User) -> Result<Vec<SubmissionRecord>> {
        self.form_for(actor, form_id, Permission::ANY).await?;
        self.records_of_form(form_id).await
    }

    async fn records_of_form(&self, form_id: i64) -> Result<Vec<SubmissionRecord>> {
        let submissions = sqlx::query_as::<_, FormSubmission>(
            "SELECT * FROM submissions WHERE form_id = ? ORDER BY submitted_at, id",
        )
        .bind(form_id)
        .fetch_all(self.pool())
        .await?;
        debug!("Loaded {} submissions of form {}", submissions.len(), form_id);
        self.with_data(submissions).await
    }

    /// Everything a user has submitted, newest first
    pub async fn submissions_by_user(&self, user: &User) -> Result<Vec<SubmissionRecord>> {
        let submissions = sqlx::query_as::<_, FormSubmission>(
            "SELECT * FROM submissions WHERE submitted_by = ? ORDER BY submitted_at DESC, id DESC",
        )
        .bind(user.id)
        .fetch_all(self.pool())
        .await?;
        self.with_data(submissions).await
    }

    /// Label a submission for display
    pub async fn submission_label(&self, record: &SubmissionRecord) -> Result<String> {
        let form = self.get_form(record.submission.form_id).await?;
        Ok(representative_label(record, &form))
    }

    /// Labels for many records, loading each form once
    pub(crate) async fn labels_for(&self, records: &[SubmissionRecord]) -> Result<HashMap<i64, String>> {
        let mut forms: HashMap<i64, Form> = HashMap::new();
        let mut labels = HashMap::with_capacity(records.len());
        for record in records {
            let form_id = record.submission.form_id;
            if !forms.contains_key(&form_id) {
                forms.insert(form_id, self.get_form(form_id).await?);
            }
            if let Some(form) = forms.get(&form_id) {
                labels.insert(record.submission.id, representative_label(record, form));
            }
        }
        Ok(labels)
    }

    /// Submissions that may be chosen as parent for a new submission of
    /// `form_id`, as `(id, label)` pairs
    pub async fn parent_candidates(&self, form_id: i64, actor: &User) -> Result<Vec<(i64, String)>> {
        let form = self.form_for(actor, form_id, Permission::ANY).await?;
        let Some(parent_form_id) = form.parent_form_id else {
            return Ok(Vec::new());
        };
        let parent_form = self.get_form(parent_form_id).await?;
        let root = parent_form.chain_root_id();

        let submissions = sqlx::query_as::<_, FormSubmission>(
            r#"
            SELECT * FROM submissions
            WHERE form_id IN (SELECT id FROM forms WHERE id = ? OR original_form_id = ?)
            ORDER BY submitted_at, id
            "#,
        )
        .bind(root)
        .bind(root)
        .fetch_all(self.pool())
        .await?;

        let records = self.with_data(submissions).await?;
        let labels = self.labels_for(&records).await?;
        Ok(records
            .iter()
            .map(|r| {
                let id = r.submission.id;
                (id, labels.get(&id).cloned().unwrap_or_else(|| format!("#{}", id)))
            })
            .collect())
    }

    // ===== Export =====

    /// The export table for a form; requires editor access
    pub async fn export_table(&self, form_id: i64, actor: &User) -> Result<Table> {
        let form = self.form_for(actor, form_id, Permission::EDIT).await?;
        let records = self.records_of_form(form_id).await?;

        let mut parents = Vec::new();
        for record in &records {
            if let Some(pid) = record.submission.parent_submission_id {
                if !parents.iter().any(|p: &SubmissionRecord| p.submission.id == pid) {
                    parents.push(self.load_record(pid).await?);
                }
            }
        }
        let parent_labels = self.labels_for(&parents).await?;

        info!(
            "Exported {} submissions of form {} for '{}'",
            records.len(),
            form_id,
            actor.username
        );
        Ok(pivot_to_table(&form, &records, &parent_labels))
    }

    /// Per active child form, how many of its submissions hang under this
    /// form's submissions
    pub async fn child_rollup(&self, form_id: i64, actor: &User) -> Result<Vec<ChildRollup>> {
        let form = self.form_for(actor, form_id, Permission::EDIT).await?;
        let root = form.chain_root_id();

        let mut rollup = Vec::new();
        for child in self.child_forms(form_id).await? {
            if child.status != FormStatus::Active {
                continue;
            }
            let count: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*)
                FROM submissions c
                JOIN submissions p ON p.id = c.parent_submission_id
                WHERE c.form_id = ?
                  AND p.form_id IN (SELECT id FROM forms WHERE id = ? OR original_form_id = ?)
                "#,
            )
            .bind(child.id)
            .bind(root)
            .bind(root)
            .fetch_one(self.pool())
            .await?;

            rollup.push(ChildRollup {
                form_id: child.id,
                form_name: child.name,
                submission_count: count as usize,
            });
        }
        Ok(rollup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{setup_test_db, user};
    use crate::forms::fields::{FieldDescriptor, FieldType};
    use crate::forms::{FormRevision, NewForm};
    use crate::models::{PermissionLevel, Role};

    fn raw(pairs: Vec<(&str, RawValue)>) -> RawInput {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    async fn company_and_employee(db: &FormDb, owner: &User) -> (Form, Form) {
        let company = db
            .create_form(
                NewForm::new("Company", vec![FieldDescriptor::new("Name", FieldType::ShortText)]).active(),
                owner,
            )
            .await
            .unwrap();
        let employee = db
            .create_form(
                NewForm::new(
                    "Employee",
                    vec![
                        FieldDescriptor::new("Full Name", FieldType::ShortText),
                        FieldDescriptor::new("Email", FieldType::Email),
                    ],
                )
                .active()
                .with_parent(company.id),
                owner,
            )
            .await
            .unwrap();
        (company, employee)
    }

    #[tokio::test]
    async fn test_email_submission_stores_one_row() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let form = db
            .create_form(
                NewForm::new("Signup", vec![FieldDescriptor::new("Email", FieldType::Email)]).active(),
                &owner,
            )
            .await
            .unwrap();

        let record = db
            .submit_internal(
                form.id,
                &raw(vec![("Email", "a@b.com".into())]),
                &FileInput::new(),
                &owner,
                None,
            )
            .await
            .unwrap();

        let stored = db.get_submission(record.submission.id, &owner).await.unwrap();
        assert_eq!(
            stored.data,
            vec![SubmissionData {
                submission_id: record.submission.id,
                field_name: "Email".to_string(),
                field_value: "a@b.com".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_multi_choice_round_trips_through_storage() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let form = db
            .create_form(
                NewForm::new(
                    "Post",
                    vec![FieldDescriptor::with_options("Tags", FieldType::MultiChoice, ["x", "y"])],
                )
                .active(),
                &owner,
            )
            .await
            .unwrap();

        let record = db
            .submit_public(
                &form.share_token,
                &raw(vec![("Tags", vec!["x", "y"].into())]),
                &FileInput::new(),
                None,
                None,
            )
            .await
            .unwrap();
        let stored = db.load_record(record.submission.id).await.unwrap();
        assert_eq!(
            decode_multi(stored.value("Tags").unwrap()),
            vec!["x".to_string(), "y".to_string()]
        );
        assert_eq!(stored.submission.submitted_by, None);
    }

    #[tokio::test]
    async fn test_public_submission_needs_active_form() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let draft = db
            .create_form(
                NewForm::new("Draft", vec![FieldDescriptor::new("Name", FieldType::ShortText)]),
                &owner,
            )
            .await
            .unwrap();

        let result = db
            .submit_public(&draft.share_token, &RawInput::new(), &FileInput::new(), None, None)
            .await;
        assert!(matches!(result, Err(Error::ShareTokenNotFound)));
    }

    #[tokio::test]
    async fn test_internal_submission_requires_access() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let stranger = user(&db, "stranger", Role::Viewer).await;
        let (company, _) = company_and_employee(&db, &owner).await;

        let denied = db
            .submit_internal(company.id, &RawInput::new(), &FileInput::new(), &stranger, None)
            .await;
        assert!(matches!(denied, Err(Error::PermissionDenied { .. })));

        db.set_permission(company.id, stranger.id, Some(PermissionLevel::Viewer), &owner)
            .await
            .unwrap();
        let record = db
            .submit_internal(
                company.id,
                &raw(vec![("Name", "Acme".into())]),
                &FileInput::new(),
                &stranger,
                None,
            )
            .await
            .unwrap();
        assert_eq!(record.submission.submitted_by, Some(stranger.id));
        assert_eq!(db.submissions_by_user(&stranger).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hidden_submission_reads_as_missing() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let stranger = user(&db, "stranger", Role::Viewer).await;
        let (company, _) = company_and_employee(&db, &owner).await;
        let record = db
            .submit_internal(
                company.id,
                &raw(vec![("Name", "Acme".into())]),
                &FileInput::new(),
                &owner,
                None,
            )
            .await
            .unwrap();
        let id = record.submission.id;

        let hidden = db.get_submission(id, &stranger).await.unwrap_err();
        assert!(matches!(hidden, Error::SubmissionNotFound(n) if n == id));
        assert_eq!(hidden.to_string(), Error::SubmissionNotFound(id).to_string());

        let missing = db.get_submission(999, &stranger).await.unwrap_err();
        assert_eq!(missing.to_string(), Error::SubmissionNotFound(999).to_string());
    }

    #[tokio::test]
    async fn test_parent_must_belong_to_parent_form() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let (company, employee) = company_and_employee(&db, &owner).await;

        let acme = db
            .submit_internal(company.id, &raw(vec![("Name", "Acme".into())]), &FileInput::new(), &owner, None)
            .await
            .unwrap();
        let ada = db
            .submit_internal(
                employee.id,
                &raw(vec![("Full Name", "Ada".into())]),
                &FileInput::new(),
                &owner,
                Some(acme.submission.id),
            )
            .await
            .unwrap();
        assert_eq!(ada.submission.parent_submission_id, Some(acme.submission.id));

        // An employee cannot sit under another employee
        let nested = db
            .submit_internal(
                employee.id,
                &raw(vec![("Full Name", "Bob".into())]),
                &FileInput::new(),
                &owner,
                Some(ada.submission.id),
            )
            .await;
        assert!(matches!(nested, Err(Error::Validation(_))));

        // Companies have no parent form at all
        let orphan = db
            .submit_internal(company.id, &RawInput::new(), &FileInput::new(), &owner, Some(acme.submission.id))
            .await;
        assert!(matches!(orphan, Err(Error::Validation(_))));

        let missing = db
            .submit_internal(employee.id, &RawInput::new(), &FileInput::new(), &owner, Some(999))
            .await;
        assert!(matches!(missing, Err(Error::SubmissionNotFound(999))));
    }

    #[tokio::test]
    async fn test_parent_from_earlier_version_is_accepted() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let (company, employee) = company_and_employee(&db, &owner).await;
        let acme = db
            .submit_internal(company.id, &raw(vec![("Name", "Acme".into())]), &FileInput::new(), &owner, None)
            .await
            .unwrap();

        let revision = FormRevision {
            name: "Company".to_string(),
            fields: company.fields.clone(),
            parent_form_id: None,
        };
        db.revise_form(company.id, revision, &owner).await.unwrap();

        let child = db
            .submit_internal(employee.id, &RawInput::new(), &FileInput::new(), &owner, Some(acme.submission.id))
            .await;
        assert!(child.is_ok());
    }

    #[tokio::test]
    async fn test_export_table_and_rollup() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let viewer = user(&db, "viewer", Role::Viewer).await;
        let (company, employee) = company_and_employee(&db, &owner).await;

        let acme = db
            .submit_internal(company.id, &raw(vec![("Name", "Acme".into())]), &FileInput::new(), &owner, None)
            .await
            .unwrap();
        for name in ["Ada", "Bob"] {
            db.submit_internal(
                employee.id,
                &raw(vec![("Full Name", name.into())]),
                &FileInput::new(),
                &owner,
                Some(acme.submission.id),
            )
            .await
            .unwrap();
        }

        let table = db.export_table(employee.id, &owner).await.unwrap();
        assert_eq!(
            table.headers,
            vec!["Full Name", "Email", "Linked Parent", "Submitted At"]
        );
        assert_eq!(table.rows.len(), 2);
        for row in &table.rows {
            assert_eq!(row.len(), table.headers.len());
            assert_eq!(row[2], "Acme (Company)");
        }
        assert_eq!(table.rows[0][0], "Ada");

        let rollup = db.child_rollup(company.id, &owner).await.unwrap();
        assert_eq!(
            rollup,
            vec![ChildRollup {
                form_id: employee.id,
                form_name: "Employee".to_string(),
                submission_count: 2,
            }]
        );

        db.set_permission(employee.id, viewer.id, Some(PermissionLevel::Viewer), &owner)
            .await
            .unwrap();
        assert_eq!(db.list_submissions(employee.id, &viewer).await.unwrap().len(), 2);
        assert!(matches!(
            db.export_table(employee.id, &viewer).await,
            Err(Error::PermissionDenied { .. })
        ));

        let candidates = db.parent_candidates(employee.id, &owner).await.unwrap();
        assert_eq!(candidates, vec![(acme.submission.id, "Acme (Company)".to_string())]);
    }

    #[tokio::test]
    async fn test_archived_form_rejects_submissions() {
        let (db, _tmp) = setup_test_db().await;
        let owner = user(&db, "owner", Role::Editor).await;
        let (company, _) = company_and_employee(&db, &owner).await;
        db.archive_form_family(company.id, &owner).await.unwrap();

        let result = db
            .submit_internal(company.id, &RawInput::new(), &FileInput::new(), &owner, None)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
