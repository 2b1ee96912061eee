//! Status command implementation

use crate::config::Config;
use crate::db::{FormDb, GlobalStats};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub suggest_enabled: bool,
    pub suggest_url: String,
    pub suggest_model: String,
    pub db_stats: GlobalStats,
}

/// Get system status
pub async fn cmd_status(config: &Config, db: &FormDb) -> Result<StatusInfo> {
    info!("Getting status");

    let db_stats = db.global_stats().await?;

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        suggest_enabled: config.suggest.enabled,
        suggest_url: config.suggest.url.clone(),
        suggest_model: config.suggest.model.clone(),
        db_stats,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 formgraph Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);

    println!("\nSchema suggestion:");
    if status.suggest_enabled {
        println!("  ✓ Enabled ({} at {})", status.suggest_model, status.suggest_url);
    } else {
        println!("  ✗ Disabled");
    }

    let stats = &status.db_stats;
    println!("\nDatabase Stats:");
    println!("  Users: {}", stats.user_count);
    println!(
        "  Forms: {} active, {} draft, {} archived",
        stats.active_forms, stats.draft_forms, stats.archived_forms
    );
    println!("  Submissions: {}", stats.submission_count);
    println!("  Relationships: {}", stats.relationship_count);
}
