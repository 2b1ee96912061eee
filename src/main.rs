//! formgraph CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use formgraph::{
    commands::{
        cmd_add_user, cmd_check_permission, cmd_create_form, cmd_init, cmd_revise_form, cmd_set_permission,
        cmd_show_form, cmd_status, cmd_submit, cmd_suggest_fields, cmd_views, print_choices, print_edges,
        print_fields, print_form, print_forms, print_grants, print_init, print_rollup, print_status,
        print_submission, print_submissions, print_table, print_users, resolve_actor, CreateFormOptions,
        InitOptions, ReviseFormOptions, SubmitOptions, SubmitTarget,
    },
    config::Config,
    db::FormDb,
    error::Result,
    models::{PermissionLevel, Role, User},
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "formgraph")]
#[command(version, about = "Runtime-defined forms with linked submissions", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Act as this user
    #[arg(long = "as", global = true, env = "FORMGRAPH_USER")]
    as_user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize formgraph configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,

        /// Create this admin account
        #[arg(long)]
        admin: Option<String>,
    },

    /// Show system status
    Status,

    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Manage forms
    Form {
        #[command(subcommand)]
        action: FormAction,
    },

    /// Submit values to a form
    Submit {
        /// Form ID (requires --as)
        #[arg(long, conflicts_with = "token", required_unless_present = "token")]
        form: Option<i64>,

        /// Share token of an active form
        #[arg(long)]
        token: Option<String>,

        /// Field value as name=value; repeat a name for multi-valued fields
        #[arg(short = 'V', long = "value")]
        values: Vec<String>,

        /// Uploaded file as name=path
        #[arg(long = "file")]
        files: Vec<String>,

        /// Parent submission ID
        #[arg(long)]
        parent: Option<i64>,
    },

    /// Inspect submissions
    Submissions {
        #[command(subcommand)]
        action: SubmissionAction,
    },

    /// Export a form's submissions as a table
    Export {
        /// Form ID
        form_id: i64,
    },

    /// Count child-form submissions under a form
    Rollup {
        /// Form ID
        form_id: i64,
    },

    /// Manage relationships between sibling submissions
    Rel {
        #[command(subcommand)]
        action: RelAction,
    },

    /// Manage per-form permissions
    Perm {
        #[command(subcommand)]
        action: PermAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Register a user (admins only)
    Add {
        username: String,

        /// Global role: admin, editor or viewer
        #[arg(long, default_value = "viewer")]
        role: Role,
    },

    /// List users
    List,
}

#[derive(Subcommand)]
enum FormAction {
    /// Create a form
    Create {
        name: String,

        /// Field list as inline JSON or a path to a JSON file
        #[arg(long)]
        fields: String,

        /// Parent form ID
        #[arg(long)]
        parent: Option<i64>,

        /// Publish immediately instead of creating a draft
        #[arg(long)]
        active: bool,
    },

    /// Publish a new version of a form
    Revise {
        form_id: i64,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New field list as inline JSON or a path to a JSON file
        #[arg(long)]
        fields: Option<String>,

        /// New parent form ID
        #[arg(long, conflicts_with = "detach")]
        parent: Option<i64>,

        /// Drop the parent form
        #[arg(long)]
        detach: bool,
    },

    /// Archive every version of a form
    Archive { form_id: i64 },

    /// Show a form
    Show { form_id: i64 },

    /// List forms you can see
    List,

    /// List every version of a form
    Versions { form_id: i64 },

    /// Attach a form under a parent form, or detach it
    SetParent {
        form_id: i64,

        /// Parent form ID; omit to detach
        parent: Option<i64>,
    },

    /// Suggest a field list from a description
    Suggest { description: String },
}

#[derive(Subcommand)]
enum SubmissionAction {
    /// List a form's submissions
    List { form_id: i64 },

    /// Show one submission
    Show { submission_id: i64 },

    /// List your own submissions
    Mine,

    /// Submissions eligible as parent for a form
    Parents { form_id: i64 },
}

#[derive(Subcommand)]
enum RelAction {
    /// Link two children of a root submission
    Link {
        root: i64,
        source: i64,
        target: i64,
        /// Relationship type, e.g. mentor
        relationship_type: String,
    },

    /// Delete a relationship
    Unlink { relationship_id: i64 },

    /// List relationships under a root submission
    List { root: i64 },

    /// Children of a root that belong to a form
    Children { root: i64, form_id: i64 },
}

#[derive(Subcommand)]
enum PermAction {
    /// Grant a level on a form (or revoke with --revoke)
    Set {
        form_id: i64,
        username: String,

        /// viewer, editor or admin
        #[arg(required_unless_present = "revoke")]
        level: Option<PermissionLevel>,

        #[arg(long, conflicts_with = "level")]
        revoke: bool,
    },

    /// List explicit grants on a form
    List { form_id: i64 },

    /// Show effective permission on a form
    Check {
        form_id: i64,

        /// User to check (defaults to yourself)
        username: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if let Commands::Init { force, admin } = cli.command {
        let (base_dir, config_path) = resolve_init_paths(cli.config);
        let report = cmd_init(InitOptions {
            base_dir,
            config_path,
            force,
            admin,
        })
        .await?;
        return emit(cli.json, &report, print_init);
    }

    // Handle completions command (doesn't need config/db)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "formgraph", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    let db = FormDb::connect(&config).await?;
    if !db.is_initialized().await? {
        return Err(formgraph::Error::NotInitialized);
    }

    let json = cli.json;
    let as_user = cli.as_user.as_deref();

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Status => {
            let status = cmd_status(&config, &db).await?;
            emit(json, &status, print_status)?;
        }

        Commands::User { action } => match action {
            UserAction::Add { username, role } => {
                let actor = resolve_actor(&db, as_user).await?;
                let user = cmd_add_user(&db, &actor, &username, role).await?;
                emit(json, &user, |u: &User| {
                    println!("✓ Added user '{}' [{}] (id {})", u.username, u.role, u.id)
                })?;
            }
            UserAction::List => {
                let users = db.list_users().await?;
                emit(json, &users, |u: &Vec<User>| print_users(u))?;
            }
        },

        Commands::Form { action } => handle_form(&config, &db, as_user, json, action).await?,

        Commands::Submit {
            form,
            token,
            values,
            files,
            parent,
        } => {
            let actor = match as_user {
                Some(name) => Some(db.get_user_by_username(name).await?),
                None => None,
            };
            let target = match (form, token) {
                (Some(id), _) => SubmitTarget::Form(id),
                (None, Some(token)) => SubmitTarget::ShareToken(token),
                (None, None) => unreachable!("clap requires --form or --token"),
            };
            let view = cmd_submit(
                &db,
                actor.as_ref(),
                SubmitOptions {
                    target,
                    values,
                    files,
                    parent,
                },
            )
            .await?;
            emit(json, &view, print_submission)?;
        }

        Commands::Submissions { action } => {
            let actor = resolve_actor(&db, as_user).await?;
            match action {
                SubmissionAction::List { form_id } => {
                    let records = db.list_submissions(form_id, &actor).await?;
                    let views = cmd_views(&db, records).await?;
                    emit(json, &views, |v: &Vec<_>| print_submissions(v))?;
                }
                SubmissionAction::Show { submission_id } => {
                    let record = db.get_submission(submission_id, &actor).await?;
                    let mut views = cmd_views(&db, vec![record]).await?;
                    if let Some(view) = views.pop() {
                        emit(json, &view, print_submission)?;
                    }
                }
                SubmissionAction::Mine => {
                    let records = db.submissions_by_user(&actor).await?;
                    let views = cmd_views(&db, records).await?;
                    emit(json, &views, |v: &Vec<_>| print_submissions(v))?;
                }
                SubmissionAction::Parents { form_id } => {
                    let choices = db.parent_candidates(form_id, &actor).await?;
                    emit(json, &choices, |c: &Vec<_>| print_choices(c))?;
                }
            }
        }

        Commands::Export { form_id } => {
            let actor = resolve_actor(&db, as_user).await?;
            let table = db.export_table(form_id, &actor).await?;
            emit(json, &table, print_table)?;
        }

        Commands::Rollup { form_id } => {
            let actor = resolve_actor(&db, as_user).await?;
            let rollup = db.child_rollup(form_id, &actor).await?;
            emit(json, &rollup, |r: &Vec<_>| print_rollup(r))?;
        }

        Commands::Rel { action } => {
            let actor = resolve_actor(&db, as_user).await?;
            match action {
                RelAction::Link {
                    root,
                    source,
                    target,
                    relationship_type,
                } => {
                    let edge = db
                        .link(root, source, target, &relationship_type, &actor)
                        .await?;
                    emit(json, &edge, |e| {
                        println!(
                            "✓ Linked {} -[{}]-> {} (relationship {})",
                            e.source_submission_id, e.relationship_type, e.target_submission_id, e.id
                        )
                    })?;
                }
                RelAction::Unlink { relationship_id } => {
                    db.unlink(relationship_id, &actor).await?;
                    if !json {
                        println!("✓ Removed relationship {}", relationship_id);
                    }
                }
                RelAction::List { root } => {
                    let edges = db.edges_for_root(root, &actor).await?;
                    emit(json, &edges, |e: &Vec<_>| print_edges(root, e))?;
                }
                RelAction::Children { root, form_id } => {
                    let choices = db.child_choices(root, form_id, &actor).await?;
                    emit(json, &choices, |c: &Vec<_>| print_choices(c))?;
                }
            }
        }

        Commands::Perm { action } => {
            let actor = resolve_actor(&db, as_user).await?;
            match action {
                PermAction::Set {
                    form_id,
                    username,
                    level,
                    revoke,
                } => {
                    let level = if revoke { None } else { level };
                    cmd_set_permission(&db, &actor, form_id, &username, level).await?;
                    if !json {
                        match level {
                            Some(level) => println!("✓ '{}' is now {} on form {}", username, level, form_id),
                            None => println!("✓ Revoked '{}' on form {}", username, form_id),
                        }
                    }
                }
                PermAction::List { form_id } => {
                    let grants = db.list_permissions(form_id, &actor).await?;
                    emit(json, &grants, |g: &Vec<_>| print_grants(form_id, g))?;
                }
                PermAction::Check { form_id, username } => {
                    let check = cmd_check_permission(&db, &actor, form_id, username.as_deref()).await?;
                    emit(json, &check, |c| {
                        println!("{} has {} on form {}", c.username, c.permission, c.form_id)
                    })?;
                }
            }
        }
    }

    Ok(())
}

async fn handle_form(
    config: &Config,
    db: &FormDb,
    as_user: Option<&str>,
    json: bool,
    action: FormAction,
) -> Result<()> {
    // Suggestions never touch the database and need no actor
    if let FormAction::Suggest { description } = action {
        let fields = cmd_suggest_fields(config, &description).await?;
        return emit(json, &fields, |f: &Vec<_>| {
            println!("\n💡 Suggested fields\n");
            print_fields(f);
        });
    }

    let actor = resolve_actor(db, as_user).await?;
    match action {
        FormAction::Suggest { .. } => unreachable!(),

        FormAction::Create {
            name,
            fields,
            parent,
            active,
        } => {
            let form = cmd_create_form(
                db,
                &actor,
                CreateFormOptions {
                    name,
                    fields,
                    parent,
                    active,
                },
            )
            .await?;
            let detail = cmd_show_form(db, &actor, form.id).await?;
            emit(json, &detail, print_form)?;
        }
        FormAction::Revise {
            form_id,
            name,
            fields,
            parent,
            detach,
        } => {
            let form = cmd_revise_form(
                db,
                &actor,
                ReviseFormOptions {
                    form_id,
                    name,
                    fields,
                    parent,
                    detach,
                },
            )
            .await?;
            let detail = cmd_show_form(db, &actor, form.id).await?;
            emit(json, &detail, print_form)?;
        }
        FormAction::Archive { form_id } => {
            let touched = db.archive_form_family(form_id, &actor).await?;
            emit(json, &touched, |n| println!("✓ Archived {} form versions", n))?;
        }
        FormAction::Show { form_id } => {
            let detail = cmd_show_form(db, &actor, form_id).await?;
            emit(json, &detail, print_form)?;
        }
        FormAction::List => {
            let forms = db.list_forms_for(&actor).await?;
            emit(json, &forms, |f: &Vec<_>| print_forms(f))?;
        }
        FormAction::Versions { form_id } => {
            let forms = db.list_form_versions(form_id, &actor).await?;
            emit(json, &forms, |f: &Vec<_>| print_forms(f))?;
        }
        FormAction::SetParent { form_id, parent } => {
            let form = db.set_parent(form_id, parent, &actor).await?;
            let detail = cmd_show_form(db, &actor, form.id).await?;
            emit(json, &detail, print_form)?;
        }
    }
    Ok(())
}

/// Print `value` as pretty JSON or through its console printer
fn emit<T: Serialize>(json: bool, value: &T, print: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print(value);
    }
    Ok(())
}

/// Base directory and config path for `init`: a `.toml` argument names the
/// file itself, anything else names the directory
fn resolve_init_paths(config: Option<PathBuf>) -> (PathBuf, PathBuf) {
    match config {
        Some(path) if path.extension().is_some_and(|e| e == "toml") => {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path)
        }
        Some(dir) => {
            let config_path = dir.join("config.toml");
            (dir, config_path)
        }
        None => {
            let base = Config::default_base_dir();
            let config_path = base.join("config.toml");
            (base, config_path)
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'formgraph init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}
