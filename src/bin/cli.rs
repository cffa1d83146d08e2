use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::{Row, SqlitePool};

use menu_admin::authz::Principal;
use menu_admin::menu::{self, MenuTree, SqliteMenuRepository};
use menu_admin::models::user::DbUser;

#[derive(Parser, Debug)]
#[command(author, version, about = "menu-admin maintenance tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Print the navigation tree; every menu unless --email is given
    MenuTree {
        /// Resolve for this user's roles and permissions
        #[arg(long)]
        email: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let path = make_migration_file(&name)?;
            println!("Created migration: {}", path.display());
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
        Commands::MenuTree { email } => {
            let pool = get_pool().await?;
            print_menu_tree(pool, email.as_deref()).await?;
        }
    }

    Ok(())
}

fn make_migration_file(name: &str) -> anyhow::Result<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let filename = format!("{}_{}.sql", timestamp, sanitize_name(name));
    let path = Path::new("migrations").join(filename);

    if path.exists() {
        anyhow::bail!("migration already exists: {}", path.display());
    }

    fs::write(&path, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", path.display()))?;

    Ok(path)
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    menu_admin::db::connect(&database_url, 5).await
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    // no bookkeeping table means nothing has been applied yet
    let table: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;

    let applied_versions: HashSet<i64> = if table.is_some() {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} Name", "Status", "Version");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

async fn print_menu_tree(pool: SqlitePool, email: Option<&str>) -> anyhow::Result<()> {
    let repo = SqliteMenuRepository::new(pool.clone());

    let resolved = match email {
        Some(email) => {
            let user = sqlx::query_as::<_, DbUser>(&format!(
                "SELECT {} FROM users WHERE email = ?",
                DbUser::COLUMNS
            ))
            .bind(email.trim().to_lowercase())
            .fetch_optional(&pool)
            .await?
            .with_context(|| format!("no user with email {email}"))?;

            let principal = Principal::load(&pool, user.id).await?;
            menu::resolve_for(&repo, &principal.role_ids, &principal.permissions).await?
        }
        None => menu::resolve_everything(&repo).await?,
    };

    if resolved.is_empty() {
        println!("(no visible menus)");
    }
    for root in &resolved.roots {
        print_node(root, 0);
    }
    for warning in &resolved.warnings {
        eprintln!("warning: {warning}");
    }

    Ok(())
}

fn print_node(tree: &MenuTree, depth: usize) {
    let node = &tree.menu;
    let status = if node.is_active { "" } else { " [inactive]" };
    println!(
        "{:indent$}{} (#{}, order {}){}",
        "",
        node.label,
        node.id,
        node.order_by,
        status,
        indent = depth * 2
    );
    for child in &tree.children {
        print_node(child, depth + 1);
    }
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
    // fall back to the crate-local folder when run from another directory
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", display))
}
