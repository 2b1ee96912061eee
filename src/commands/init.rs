//! Init command implementation

use crate::config::Config;
use crate::db::FormDb;
use crate::error::{Error, Result};
use crate::models::Role;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
    /// Bootstrap admin account created alongside the schema
    pub admin: Option<String>,
}

/// What `init` produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitReport {
    pub config_path: String,
    pub db_path: String,
    pub admin: Option<String>,
}

/// Initialize formgraph configuration and database
pub async fn cmd_init(options: InitOptions) -> Result<InitReport> {
    let InitOptions {
        base_dir,
        config_path,
        force,
        admin,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.paths.db_file = base_dir.join("formgraph.db");
    config.paths.base_dir = base_dir;
    config.paths.config_file = config_path;
    config.save()?;

    let db = FormDb::connect(&config).await?;
    if !db.is_initialized().await? {
        db.init_schema().await?;
    }

    if let Some(username) = &admin {
        match db.get_user_by_username(username).await {
            Ok(existing) if existing.role == Role::Admin => {
                info!("Admin '{}' already exists", username);
            }
            Ok(_) => {
                return Err(Error::Conflict(format!(
                    "User '{}' exists but is not an admin",
                    username
                )))
            }
            Err(Error::UserNotFound(_)) => {
                db.create_user(username, Role::Admin).await?;
            }
            Err(e) => return Err(e),
        }
    }

    info!("Initialized formgraph at {:?}", config.paths.base_dir);
    Ok(InitReport {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        admin,
    })
}

/// Print init result to console
pub fn print_init(report: &InitReport) {
    println!("✓ formgraph initialized successfully");
    println!("  Config: {}", report.config_path);
    println!("  Database: {}", report.db_path);
    println!("\nNext steps:");
    match &report.admin {
        Some(admin) => println!("  1. Add users: formgraph --as {} user add <name> --role editor", admin),
        None => println!("  1. Re-run with --admin <name> to create a bootstrap admin"),
    }
    println!("  2. Create a form: formgraph --as <user> form create <name> --fields fields.json");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(tmp: &TempDir, force: bool, admin: Option<&str>) -> InitOptions {
        InitOptions {
            base_dir: tmp.path().to_path_buf(),
            config_path: tmp.path().join("config.toml"),
            force,
            admin: admin.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_init_creates_config_db_and_admin() {
        let tmp = TempDir::new().unwrap();
        let report = cmd_init(options(&tmp, false, Some("root"))).await.unwrap();
        assert_eq!(report.admin.as_deref(), Some("root"));

        let config = Config::load(&tmp.path().join("config.toml")).unwrap();
        assert!(config.is_initialized());

        let db = FormDb::connect(&config).await.unwrap();
        let admin = db.get_user_by_username("root").await.unwrap();
        assert_eq!(admin.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite_without_force() {
        let tmp = TempDir::new().unwrap();
        cmd_init(options(&tmp, false, Some("root"))).await.unwrap();

        assert!(matches!(
            cmd_init(options(&tmp, false, None)).await,
            Err(Error::Config(_))
        ));
        // Forcing keeps existing data and the admin account
        let again = cmd_init(options(&tmp, true, Some("root"))).await.unwrap();
        assert_eq!(again.admin.as_deref(), Some("root"));
    }
}
