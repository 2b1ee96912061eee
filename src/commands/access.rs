//! Permission commands implementation

use crate::access::GrantInfo;
use crate::db::FormDb;
use crate::error::Result;
use crate::models::{Permission, PermissionLevel, User};
use serde::{Deserialize, Serialize};

/// Grant `level` to `username` on a form; `None` revokes
pub async fn cmd_set_permission(
    db: &FormDb,
    actor: &User,
    form_id: i64,
    username: &str,
    level: Option<PermissionLevel>,
) -> Result<()> {
    let target = db.get_user_by_username(username).await?;
    db.set_permission(form_id, target.id, level, actor).await
}

/// Result of a permission check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionCheck {
    pub form_id: i64,
    pub username: String,
    pub permission: Permission,
}

/// Effective permission of `username` on a form.
///
/// Only the form's admins may inspect other users; everyone may inspect
/// themselves.
pub async fn cmd_check_permission(
    db: &FormDb,
    actor: &User,
    form_id: i64,
    username: Option<&str>,
) -> Result<PermissionCheck> {
    let subject = match username {
        Some(name) if name != actor.username => {
            db.form_for(actor, form_id, Permission::ADMIN).await?;
            db.get_user_by_username(name).await?
        }
        _ => actor.clone(),
    };
    let form = db.get_form(form_id).await?;
    let permission = db.effective_permission(&subject, &form).await?;
    Ok(PermissionCheck {
        form_id,
        username: subject.username,
        permission,
    })
}

/// Print grants list to console
pub fn print_grants(form_id: i64, grants: &[GrantInfo]) {
    println!("\n🔐 Grants on form {}\n", form_id);

    if grants.is_empty() {
        println!("No explicit grants. Owners and global admins always have access.");
        return;
    }

    for grant in grants {
        println!("• {} [{}]", grant.username, grant.level);
    }
}
