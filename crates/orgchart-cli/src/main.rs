mod app;
mod config;
mod plan_cmds;
mod serve_cmd;
mod user_cmds;

#[cfg(test)]
mod test_util;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use orgchart_core::permission::Permission;
use orgchart_core::store::{MemoryStore, PgStore};
use orgchart_db::pool;
use sqlx::PgPool;

use app::App;
use config::OrgchartConfig;

#[derive(Parser)]
#[command(name = "orgchart", about = "Collaborative org-chart plan editor backend")]
struct Cli {
    /// Database URL (overrides ORGCHART_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Email to act as for operator commands (overrides auth.operator_email)
    #[arg(long = "as", global = true, value_name = "EMAIL")]
    as_user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write an orgchart config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/orgchart")]
        db_url: String,
        /// Email recorded as owner when the permission table is created
        #[arg(long)]
        owner: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the orgchart database (requires config file or env vars)
    DbInit,
    /// Serve the HTTP API
    Serve {
        /// Address to bind (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
        /// Keep everything in memory instead of PostgreSQL
        #[arg(long)]
        memory: bool,
    },
    /// Plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Shared user management
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Issue a time-limited view-only share link
    Share,
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// List all plans
    List,
    /// Show a plan's metadata and node tree
    Show {
        /// Plan ID to show
        plan_id: String,
    },
    /// Export a plan as CSV
    Export {
        /// Plan ID to export
        plan_id: String,
        /// Output file or directory (defaults to stdout)
        #[arg(long)]
        output: Option<String>,
    },
    /// Delete a plan
    Delete {
        /// Plan ID to delete
        plan_id: String,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// List users with access
    List,
    /// Grant a user access
    Add {
        email: String,
        /// owner, edit or view
        #[arg(long, default_value = "view")]
        permission: Permission,
    },
    /// Change a user's permission
    Update {
        email: String,
        /// owner, edit or view
        #[arg(long)]
        permission: Permission,
    },
    /// Revoke a user's access
    Remove { email: String },
}

/// Execute the `orgchart init` command: write config file.
fn cmd_init(db_url: &str, owner: Option<String>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
            ..config::DatabaseSection::default()
        },
        auth: config::AuthSection {
            operator_email: owner.clone(),
            bootstrap_owner: owner,
        },
        ..config::ConfigFile::default()
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    if let Some(owner) = &cfg.auth.bootstrap_owner {
        println!("  auth.bootstrap_owner = {owner}");
    }
    println!();
    println!("Next: run `orgchart db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `orgchart db-init` command: create database and run migrations.
async fn cmd_db_init(resolved: &OrgchartConfig) -> anyhow::Result<()> {
    println!("Initializing orgchart database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let summary = pool::store_summary(&db_pool).await?;
    println!(
        "Database {} ready: {} plans, {} admin sheets, {} cells, {} properties, {} grants.",
        resolved.db_config.redacted(),
        summary.visible_sheets,
        summary.hidden_sheets,
        summary.cells,
        summary.properties,
        summary.grants,
    );

    db_pool.close().await;

    println!("orgchart db-init complete.");
    Ok(())
}

async fn cmd_serve(
    resolved: OrgchartConfig,
    bind: Option<String>,
    port: Option<u16>,
    memory: bool,
) -> anyhow::Result<()> {
    let resolved = resolved.with_listen(bind, port);

    let (app, db_pool) = if memory {
        tracing::warn!("serving from memory; nothing will be persisted");
        (App::start(Arc::new(MemoryStore::new()), &resolved.settings), None)
    } else {
        let db_pool = pool::create_pool(&resolved.db_config).await?;
        pool::run_migrations(&db_pool).await?;
        let store = Arc::new(PgStore::new(db_pool.clone()));
        (App::start(store, &resolved.settings), Some(db_pool))
    };

    let state = serve_cmd::AppState::new(app.service.clone(), &resolved.server.identity_header)?;
    let result = serve_cmd::run_serve(state, &resolved.server.bind, resolved.server.port).await;

    app.shutdown().await;
    if let Some(p) = db_pool {
        p.close().await;
    }
    result
}

/// Connect to Postgres and start the service over it.
async fn connect(resolved: &OrgchartConfig) -> anyhow::Result<(App, PgPool)> {
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    let app = App::start(Arc::new(PgStore::new(db_pool.clone())), &resolved.settings);
    Ok((app, db_pool))
}

async fn disconnect(app: App, db_pool: PgPool) {
    app.shutdown().await;
    db_pool.close().await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let resolve = || OrgchartConfig::resolve(cli.database_url.as_deref(), cli.as_user.as_deref());

    match cli.command {
        Commands::Init {
            db_url,
            owner,
            force,
        } => {
            cmd_init(&db_url, owner, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(&resolve()?).await?;
        }
        Commands::Serve { bind, port, memory } => {
            cmd_serve(resolve()?, bind, port, memory).await?;
        }
        Commands::Plan { command } => {
            let resolved = resolve()?;
            let (app, db_pool) = connect(&resolved).await?;
            let result = plan_cmds::run_plan_command(command, &app.service, &resolved.operator).await;
            disconnect(app, db_pool).await;
            result?;
        }
        Commands::User { command } => {
            let resolved = resolve()?;
            let (app, db_pool) = connect(&resolved).await?;
            let result = user_cmds::run_user_command(command, &app.service, &resolved.operator).await;
            disconnect(app, db_pool).await;
            result?;
        }
        Commands::Share => {
            let resolved = resolve()?;
            let (app, db_pool) = connect(&resolved).await?;
            let result = user_cmds::run_share(&app.service, &resolved.operator).await;
            disconnect(app, db_pool).await;
            result?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn init_parses_without_global_flags() {
        let cli = Cli::try_parse_from(["orgchart", "init", "--owner", "boss@example.com"]).unwrap();
        assert!(cli.as_user.is_none());
        match cli.command {
            Commands::Init { db_url, owner, force } => {
                assert_eq!(db_url, "postgresql://localhost:5432/orgchart");
                assert_eq!(owner.as_deref(), Some("boss@example.com"));
                assert!(!force);
            }
            _ => panic!("expected init"),
        }
    }

    #[test]
    fn global_flags_apply_to_subcommands() {
        let cli = Cli::try_parse_from([
            "orgchart",
            "user",
            "add",
            "a@b.com",
            "--permission",
            "edit",
            "--as",
            "boss@example.com",
        ])
        .unwrap();
        assert_eq!(cli.as_user.as_deref(), Some("boss@example.com"));
        match cli.command {
            Commands::User {
                command: UserCommands::Add { email, permission },
            } => {
                assert_eq!(email, "a@b.com");
                assert_eq!(permission, Permission::Edit);
            }
            _ => panic!("expected user add"),
        }
    }

    #[test]
    fn unknown_permission_is_rejected() {
        assert!(Cli::try_parse_from(["orgchart", "user", "update", "a@b.com", "--permission", "admin"]).is_err());
    }
}
