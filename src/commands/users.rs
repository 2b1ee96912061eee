//! User commands implementation

use crate::db::FormDb;
use crate::error::{Error, Result};
use crate::models::{Role, User};
use tracing::debug;

/// Resolve the acting user named by `--as`
pub async fn resolve_actor(db: &FormDb, username: Option<&str>) -> Result<User> {
    let username = username.ok_or_else(|| {
        Error::Config("No acting user; pass --as <username> or set FORMGRAPH_USER".to_string())
    })?;
    db.get_user_by_username(username).await
}

/// Register a user; only global admins may do this
pub async fn cmd_add_user(db: &FormDb, actor: &User, username: &str, role: Role) -> Result<User> {
    if actor.role != Role::Admin {
        debug!("User '{}' is not an admin; cannot add users", actor.username);
        return Err(Error::AdminRequired("add users".to_string()));
    }
    db.create_user(username, role).await
}

/// Print users list to console
pub fn print_users(users: &[User]) {
    println!("\n👤 Users\n");

    if users.is_empty() {
        println!("No users registered. Use 'formgraph init --admin <name>' to create one.");
        return;
    }

    for user in users {
        println!("• {} [{}] (id {})", user.username, user.role, user.id);
    }
}
