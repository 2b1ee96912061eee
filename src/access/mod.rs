//! Access control
//!
//! Effective permission on a form is resolved in order: global admin role,
//! form ownership, explicit grant, otherwise none. Every gated operation
//! calls `require_permission` before touching data.

use crate::db::FormDb;
use crate::error::{Error, Result};
use crate::models::{now_timestamp, Form, Permission, PermissionLevel, Role, User};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Resolve effective permission from already-loaded facts
pub fn resolve_permission(user: &User, form: &Form, grant: Option<PermissionLevel>) -> Permission {
    if user.role == Role::Admin {
        return Permission::Admin;
    }
    if form.created_by == Some(user.id) {
        return Permission::Admin;
    }
    grant.map(Permission::from).unwrap_or(Permission::None)
}

/// A grant joined with the user it names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantInfo {
    pub user_id: i64,
    pub username: String,
    pub level: PermissionLevel,
}

impl FormDb {
    // ===== User Operations =====

    /// Register a user
    pub async fn create_user(&self, username: &str, role: Role) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::Validation("Username cannot be blank".to_string()));
        }

        let created_at = now_timestamp();
        let id = sqlx::query("INSERT INTO users (username, role, created_at) VALUES (?, ?, ?)")
            .bind(username)
            .bind(role)
            .bind(&created_at)
            .execute(self.pool())
            .await
            .map_err(|e| Error::from_insert(e, || format!("User '{}' already exists", username)))?
            .last_insert_rowid();

        info!("Created user '{}' ({}) with role {}", username, id, role);
        Ok(User {
            id,
            username: username.to_string(),
            role,
            created_at,
        })
    }

    /// Get user by ID
    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    /// Get user by username, failing when unknown
    pub async fn get_user_by_username(&self, username: &str) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| Error::UserNotFound(username.to_string()))
    }

    /// List all users
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY username")
            .fetch_all(self.pool())
            .await?;
        Ok(users)
    }

    // ===== Permission Checks =====

    async fn grant_for(&self, form_id: i64, user_id: i64) -> Result<Option<PermissionLevel>> {
        let level = sqlx::query_scalar::<_, PermissionLevel>(
            "SELECT level FROM form_permissions WHERE form_id = ? AND user_id = ?",
        )
        .bind(form_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(level)
    }

    /// Effective permission of `user` on `form`
    pub async fn effective_permission(&self, user: &User, form: &Form) -> Result<Permission> {
        // Role and ownership short-circuit the grant lookup
        let provisional = resolve_permission(user, form, None);
        if provisional == Permission::Admin {
            return Ok(provisional);
        }
        let grant = self.grant_for(form.id, user.id).await?;
        Ok(resolve_permission(user, form, grant))
    }

    /// Fail with `PermissionDenied` unless the effective permission is allowed
    pub async fn require_permission(
        &self,
        user: &User,
        form: &Form,
        allowed: &[Permission],
    ) -> Result<Permission> {
        let permission = self.effective_permission(user, form).await?;
        if allowed.contains(&permission) {
            Ok(permission)
        } else {
            debug!(
                "User '{}' holds {} on form {}; denied",
                user.username, permission, form.id
            );
            Err(Error::PermissionDenied { form_id: form.id })
        }
    }

    /// Load a form and check the caller's permission on it in one step
    pub async fn form_for(&self, user: &User, form_id: i64, allowed: &[Permission]) -> Result<Form> {
        let form = self.get_form(form_id).await?;
        self.require_permission(user, &form, allowed).await?;
        Ok(form)
    }

    /// Check access to a resource owned by `form_id`. A denial surfaces as
    /// `not_found`, the same error a missing resource produces.
    pub(crate) async fn guard_resource(
        &self,
        user: &User,
        form_id: i64,
        allowed: &[Permission],
        not_found: Error,
    ) -> Result<Form> {
        match self.form_for(user, form_id, allowed).await {
            Err(Error::PermissionDenied { .. }) => Err(not_found),
            other => other,
        }
    }

    // ===== Grant Management =====

    /// Grant, change, or (with `None`) revoke a user's level on a form
    pub async fn set_permission(
        &self,
        form_id: i64,
        target_user_id: i64,
        level: Option<PermissionLevel>,
        actor: &User,
    ) -> Result<()> {
        self.form_for(actor, form_id, Permission::ADMIN).await?;
        let target = self
            .get_user(target_user_id)
            .await?
            .ok_or_else(|| Error::UserNotFound(target_user_id.to_string()))?;

        match level {
            Some(level) => {
                sqlx::query(
                    r#"
                    INSERT INTO form_permissions (form_id, user_id, level)
                    VALUES (?, ?, ?)
                    ON CONFLICT(form_id, user_id) DO UPDATE SET level = excluded.level
                    "#,
                )
                .bind(form_id)
                .bind(target.id)
                .bind(level)
                .execute(self.pool())
                .await?;
                info!(
                    "Granted {} on form {} to '{}'",
                    level, form_id, target.username
                );
            }
            None => {
                sqlx::query("DELETE FROM form_permissions WHERE form_id = ? AND user_id = ?")
                    .bind(form_id)
                    .bind(target.id)
                    .execute(self.pool())
                    .await?;
                info!("Revoked access on form {} for '{}'", form_id, target.username);
            }
        }

        Ok(())
    }

    /// List explicit grants on a form
    pub async fn list_permissions(&self, form_id: i64, actor: &User) -> Result<Vec<GrantInfo>> {
        self.form_for(actor, form_id, Permission::ADMIN).await?;
        let rows: Vec<(i64, String, PermissionLevel)> = sqlx::query_as(
            r#"
            SELECT p.user_id, u.username, p.level
            FROM form_permissions p
            JOIN users u ON u.id = p.user_id
            WHERE p.form_id = ?
            ORDER BY u.username
            "#,
        )
        .bind(form_id)
        .fetch_all(self.pool())
        .await?;

        let grants = rows
            .into_iter()
            .map(|(user_id, username, level)| GrantInfo {
                user_id,
                username,
                level,
            })
            .collect();
        Ok(grants)
    }
}
