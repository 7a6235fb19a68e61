use sqlx::Row;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axioma_gate::authz::{catalog, AccessEngine, ModuleId, PrincipalId, RedirectPaths, Role};
use axioma_gate::events::{self, log_activity_with_context};
use axioma_gate::models::profile::{Profile, ProfileUpsertRequest};
use axioma_gate::notify::ChannelNotifier;
use axioma_gate::profiles::SqliteProfileStore;
use axioma_gate::session::FixedSessionStore;
use clap::{Parser, Subcommand};
use chrono::Utc;
use dotenvy::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about = "axioma-gate administration tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty reversible migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Roll back the last applied migration
    MigrateRollback,
    /// Create or replace a profile
    ProfileUpsert {
        user_id: Uuid,
        role: Role,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        approved: bool,
        /// Entitled module, may be repeated
        #[arg(long = "module")]
        modules: Vec<ModuleId>,
    },
    /// Approve a profile (or revoke with --revoke)
    ProfileApprove {
        user_id: Uuid,
        #[arg(long)]
        revoke: bool,
    },
    /// Grant a module to a profile (or withdraw with --revoke)
    ProfileGrant {
        user_id: Uuid,
        module: ModuleId,
        #[arg(long)]
        revoke: bool,
    },
    /// Evaluate a protected path for a user against the database
    Check { user_id: Uuid, path: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Try to load env from CWD; when running in Docker the binary CWD may differ,
    // so fall back to the crate-local `.env` using CARGO_MANIFEST_DIR.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let (up, down) = make_migration_files(&name)?;
            println!("Created migration: {}", up.display());
            println!("Created migration: {}", down.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::MigrateRollback => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            let target = previous_version(&pool).await?;
            migrator
                .undo(&pool, target)
                .await
                .context("no migrations were rolled back")?;
            println!("Rolled back last migration");
        }
        Commands::ProfileUpsert { user_id, role, full_name, approved, modules } => {
            let pool = axioma_gate::db::init().await?;
            let store = SqliteProfileStore::new(pool.clone());
            let req = ProfileUpsertRequest {
                full_name,
                role,
                approved,
                active_modules: modules.into_iter().map(|m| (m, true)).collect::<BTreeMap<_, _>>(),
            };

            let prior = store.prior(user_id).await?;
            let profile = store.upsert(user_id, &req).await?;
            let action = if prior.existed { "updated" } else { "created" };
            audit(&pool, action, &profile, prior.snapshot.as_ref()).await?;
            print_profile(&profile);
        }
        Commands::ProfileApprove { user_id, revoke } => {
            let pool = axioma_gate::db::init().await?;
            let store = SqliteProfileStore::new(pool.clone());

            let prior = store.prior(user_id).await?;
            let profile = store
                .set_approved(user_id, !revoke)
                .await?
                .with_context(|| format!("no profile for {}", user_id))?;
            audit(&pool, "approval_changed", &profile, prior.snapshot.as_ref()).await?;
            print_profile(&profile);
        }
        Commands::ProfileGrant { user_id, module, revoke } => {
            let pool = axioma_gate::db::init().await?;
            let store = SqliteProfileStore::new(pool.clone());

            let prior = store.prior(user_id).await?;
            let profile = store
                .set_module(user_id, module, !revoke)
                .await?
                .with_context(|| format!("no profile for {}", user_id))?;
            audit(&pool, "module_changed", &profile, prior.snapshot.as_ref()).await?;
            print_profile(&profile);
        }
        Commands::Check { user_id, path } => {
            let pool = axioma_gate::db::init().await?;
            let route = catalog::find(&path).with_context(|| format!("{} is not a protected resource", path))?;

            let (notifier, mut notifications) = ChannelNotifier::new();
            let engine = AccessEngine::new(
                Arc::new(FixedSessionStore(Some(PrincipalId::new(user_id)))),
                Arc::new(SqliteProfileStore::new(pool)),
                Arc::new(notifier),
            );

            let decision = engine
                .evaluate(&route.policy(), &path)
                .await
                .context("evaluation abandoned")?;

            println!("{:<10} {:?}", "verdict", decision.verdict);
            if let Some(target) = &decision.redirect {
                println!("{:<10} {}", "redirect", RedirectPaths::from_env().location(target));
            }
            if let Ok(notification) = notifications.try_recv() {
                println!("{:<10} {}", "notice", notification.message);
            }
        }
    }

    Ok(())
}

/// Records an operator change in the activity log and event store.
async fn audit(pool: &SqlitePool, action: &str, profile: &Profile, old: Option<&Profile>) -> anyhow::Result<()> {
    let (bus, mut rx) = events::init_event_bus();
    log_activity_with_context(&bus, action, None, profile, old, None);
    let event = rx.recv().await.context("activity event was not published")?;
    events::record_event(pool, &event).await?;
    Ok(())
}

fn print_profile(profile: &Profile) {
    let modules: Vec<&str> = profile
        .active_modules
        .iter()
        .filter(|(_, entitled)| **entitled)
        .map(|(module, _)| module.as_str())
        .collect();

    println!("{:<10} {}", "user_id", profile.user_id);
    println!("{:<10} {}", "role", profile.role);
    println!("{:<10} {}", "approved", profile.approved);
    println!("{:<10} {}", "modules", modules.join(", "));
}

fn make_migration_files(name: &str) -> anyhow::Result<(PathBuf, PathBuf)> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let sanitized = sanitize_name(name);
    let up = Path::new("migrations").join(format!("{}_{}.up.sql", timestamp, sanitized));
    let down = Path::new("migrations").join(format!("{}_{}.down.sql", timestamp, sanitized));

    if up.exists() || down.exists() {
        anyhow::bail!("migration already exists: {}", up.display());
    }

    fs::write(&up, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", up.display()))?;
    fs::write(&down, "-- Revert the migration here\n")
        .with_context(|| format!("failed to create migration at {}", down.display()))?;

    Ok((up, down))
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let options = database_url
        .parse::<SqliteConnectOptions>()
        .context("invalid DATABASE_URL")?
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to connect to database")
}

async fn applied_versions(pool: &SqlitePool) -> anyhow::Result<Vec<i64>> {
    let table: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;
    if table.is_none() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1 ORDER BY version")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect())
}

/// Version to undo down to: the one applied before the latest, or 0.
async fn previous_version(pool: &SqlitePool) -> anyhow::Result<i64> {
    let versions = applied_versions(pool).await?;
    if versions.is_empty() {
        anyhow::bail!("no migrations applied");
    }
    Ok(versions.iter().rev().nth(1).copied().unwrap_or(0))
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let applied: HashSet<i64> = applied_versions(pool).await?.into_iter().collect();

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter().filter(|m| m.migration_type.is_up_migration()) {
        let version = migration.version;
        let status = if applied.contains(&version) { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, version, name);
    }

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Prefer ./migrations when running from the repo root, otherwise the
    // crate-local folder.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
