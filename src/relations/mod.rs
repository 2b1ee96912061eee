//! Relationship graph
//!
//! Edges connect two direct children of the same root submission. The
//! scope is always the root: the same pair of child forms can recur under
//! many unrelated roots, so uniqueness is `(root, source, target, type)`
//! and is enforced by the table's unique constraint.

use crate::db::FormDb;
use crate::error::{Error, Result};
use crate::models::{now_timestamp, ChildRelationship, FormSubmission, Permission, User};
use serde::{Deserialize, Serialize};
use tracing::info;

/// An edge with both endpoints labelled for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipView {
    #[serde(flatten)]
    pub relationship: ChildRelationship,
    pub source_label: String,
    pub target_label: String,
}

fn ensure_root(submission: FormSubmission) -> Result<FormSubmission> {
    if !submission.is_root() {
        return Err(Error::Validation(format!(
            "Submission {} has a parent and cannot anchor relationships",
            submission.id
        )));
    }
    Ok(submission)
}

impl FormDb {
    /// Load a root submission, failing if it has a parent
    async fn root_submission(&self, root_submission_id: i64) -> Result<FormSubmission> {
        ensure_root(self.load_submission(root_submission_id).await?)
    }

    /// Load a root submission the actor may work with. Access is checked
    /// before the submission's shape, and a denial reads as not found.
    async fn guarded_root(
        &self,
        root_submission_id: i64,
        actor: &User,
        allowed: &[Permission],
    ) -> Result<FormSubmission> {
        let root = self.load_submission(root_submission_id).await?;
        self.guard_resource(
            actor,
            root.form_id,
            allowed,
            Error::SubmissionNotFound(root_submission_id),
        )
        .await?;
        ensure_root(root)
    }

    async fn child_of(&self, root_submission_id: i64, submission_id: i64) -> Result<FormSubmission> {
        let child = self.load_submission(submission_id).await?;
        if child.parent_submission_id != Some(root_submission_id) {
            return Err(Error::Validation(format!(
                "Submission {} is not a child of submission {}",
                submission_id, root_submission_id
            )));
        }
        Ok(child)
    }

    /// Create a typed edge between two children of a root submission
    pub async fn link(
        &self,
        root_submission_id: i64,
        source_submission_id: i64,
        target_submission_id: i64,
        relationship_type: &str,
        actor: &User,
    ) -> Result<ChildRelationship> {
        let relationship_type = relationship_type.trim();
        if relationship_type.is_empty() {
            return Err(Error::Validation("Relationship type cannot be blank".to_string()));
        }
        if source_submission_id == target_submission_id {
            return Err(Error::Validation(
                "A submission cannot be related to itself".to_string(),
            ));
        }

        let root = self
            .guarded_root(root_submission_id, actor, Permission::EDIT)
            .await?;
        self.child_of(root.id, source_submission_id).await?;
        self.child_of(root.id, target_submission_id).await?;

        let created_at = now_timestamp();
        let id = sqlx::query(
            r#"
            INSERT INTO child_relationships
                (root_submission_id, source_submission_id, target_submission_id, relationship_type, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(root.id)
        .bind(source_submission_id)
        .bind(target_submission_id)
        .bind(relationship_type)
        .bind(&created_at)
        .execute(self.pool())
        .await
        .map_err(|e| {
            Error::from_insert(e, || {
                format!(
                    "Submissions {} and {} are already linked as '{}' under {}",
                    source_submission_id, target_submission_id, relationship_type, root.id
                )
            })
        })?
        .last_insert_rowid();

        info!(
            "Linked {} -[{}]-> {} under root {} by '{}'",
            source_submission_id, relationship_type, target_submission_id, root.id, actor.username
        );

        Ok(ChildRelationship {
            id,
            root_submission_id: root.id,
            source_submission_id,
            target_submission_id,
            relationship_type: relationship_type.to_string(),
            created_at,
        })
    }

    /// Get relationship by ID
    pub async fn get_relationship(&self, id: i64) -> Result<ChildRelationship> {
        sqlx::query_as::<_, ChildRelationship>("SELECT * FROM child_relationships WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(Error::RelationshipNotFound(id))
    }

    /// Delete an edge
    pub async fn unlink(&self, relationship_id: i64, actor: &User) -> Result<()> {
        let relationship = self.get_relationship(relationship_id).await?;
        let root = self.load_submission(relationship.root_submission_id).await?;
        self.guard_resource(
            actor,
            root.form_id,
            Permission::EDIT,
            Error::RelationshipNotFound(relationship_id),
        )
        .await?;

        let deleted = sqlx::query("DELETE FROM child_relationships WHERE id = ?")
            .bind(relationship_id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(Error::RelationshipNotFound(relationship_id));
        }

        info!(
            "Unlinked relationship {} under root {} by '{}'",
            relationship_id, root.id, actor.username
        );
        Ok(())
    }

    /// Every edge scoped to a root, endpoints labelled
    pub async fn edges_for_root(&self, root_submission_id: i64, actor: &User) -> Result<Vec<RelationshipView>> {
        let root = self
            .guarded_root(root_submission_id, actor, Permission::ANY)
            .await?;

        let edges = sqlx::query_as::<_, ChildRelationship>(
            "SELECT * FROM child_relationships WHERE root_submission_id = ? ORDER BY created_at, id",
        )
        .bind(root.id)
        .fetch_all(self.pool())
        .await?;

        let mut views = Vec::with_capacity(edges.len());
        for relationship in edges {
            let source = self.load_record(relationship.source_submission_id).await?;
            let target = self.load_record(relationship.target_submission_id).await?;
            views.push(RelationshipView {
                source_label: self.submission_label(&source).await?,
                target_label: self.submission_label(&target).await?,
                relationship,
            });
        }
        Ok(views)
    }

    /// Direct children of a root that belong to `child_form_id` (any version
    /// of its chain), oldest first
    pub async fn children_of_type(&self, root_submission_id: i64, child_form_id: i64) -> Result<Vec<FormSubmission>> {
        let root = self.root_submission(root_submission_id).await?;
        let child_form = self.get_form(child_form_id).await?;
        let chain = child_form.chain_root_id();

        let children = sqlx::query_as::<_, FormSubmission>(
            r#"
            SELECT * FROM submissions
            WHERE parent_submission_id = ?
              AND form_id IN (SELECT id FROM forms WHERE id = ? OR original_form_id = ?)
            ORDER BY submitted_at, id
            "#,
        )
        .bind(root.id)
        .bind(chain)
        .bind(chain)
        .fetch_all(self.pool())
        .await?;
        Ok(children)
    }

    /// `(id, label)` pairs for a relationship picker
    pub async fn child_choices(
        &self,
        root_submission_id: i64,
        child_form_id: i64,
        actor: &User,
    ) -> Result<Vec<(i64, String)>> {
        let root = self
            .guarded_root(root_submission_id, actor, Permission::ANY)
            .await?;

        let children = self.children_of_type(root.id, child_form_id).await?;
        let records = self.with_data(children).await?;
        let labels = self.labels_for(&records).await?;
        Ok(records
            .iter()
            .map(|r| {
                let id = r.submission.id;
                (id, labels.get(&id).cloned().unwrap_or_else(|| format!("#{}", id)))
            })
            .collect())
    }
}
