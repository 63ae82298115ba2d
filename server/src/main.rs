use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use platform_authn::{UserRole, issue_token};
use platform_db::{DatabaseSettings, DbPool, connect};
use platform_obs::{ObsConfig, init_tracing};
use server::{
    build_enrollment,
    config::AppConfig,
    graphql,
    http::{self, AppState, ServeConfig},
    seed,
};
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "school-server", version, about = "Language school operations backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP + GraphQL server.
    Serve(ServeCommand),
    /// Run database migrations.
    #[command(subcommand)]
    Migrate(MigrateCommand),
    /// Insert demo batches, leads and invoices.
    Seed,
    /// Staff token utilities.
    #[command(subcommand)]
    Token(TokenCommand),
    /// Print the GraphQL schema snapshot.
    #[command(name = "schema:print")]
    SchemaPrint {
        #[arg(long, value_name = "FILE", help = "Destination file path")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum MigrateCommand {
    /// Apply pending migrations.
    Up,
    /// Rollback the most recent migration.
    Down,
    /// Roll back everything and re-apply.
    Reset,
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Mint a bearer token for local development.
    Issue {
        #[arg(long)]
        user: Uuid,
        #[arg(long, default_value = "STAFF")]
        role: String,
    },
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, help = "Allow starting even when migrations are pending")]
    allow_dirty: bool,
}

impl From<&ServeCommand> for ServeConfig {
    fn from(value: &ServeCommand) -> Self {
        ServeConfig::new(value.host, value.port)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(ObsConfig::default())?;
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(cmd) => run_server(cmd).await,
        Command::Migrate(action) => match action {
            MigrateCommand::Up => migrate_up().await,
            MigrateCommand::Down => migrate_down().await,
            MigrateCommand::Reset => migrate_reset().await,
        },
        Command::Seed => run_seed().await,
        Command::Token(TokenCommand::Issue { user, role }) => issue(user, &role),
        Command::SchemaPrint { output } => schema_print(output),
    }
}

async fn setup_pool() -> Result<DbPool> {
    let settings = DatabaseSettings::from_env();
    connect(&settings).await.map_err(Into::into)
}

async fn run_server(cmd: ServeCommand) -> Result<()> {
    let config = AppConfig::load()?;
    let pool = setup_pool().await?;
    ensure_migrations(&pool, cmd.allow_dirty).await?;
    let enrollment = build_enrollment(Arc::new(pool), &config);
    let state = AppState::new(enrollment, &config);
    http::serve((&cmd).into(), state).await
}

async fn ensure_migrations(pool: &DbPool, allow_dirty: bool) -> Result<()> {
    let pending = Migrator::get_pending_migrations(pool).await?;
    if !pending.is_empty() && !allow_dirty {
        anyhow::bail!(
            "pending migrations detected; run `school-server migrate up` or pass --allow-dirty"
        );
    }
    Ok(())
}

async fn migrate_up() -> Result<()> {
    let pool = setup_pool().await?;
    Migrator::up(&pool, None).await?;
    info!("database migrations applied");
    Ok(())
}

async fn migrate_down() -> Result<()> {
    let pool = setup_pool().await?;
    Migrator::down(&pool, Some(1)).await?;
    info!("most recent migration rolled back");
    Ok(())
}

async fn migrate_reset() -> Result<()> {
    let pool = setup_pool().await?;
    Migrator::reset(&pool).await?;
    Migrator::up(&pool, None).await?;
    info!("database reset and migrations re-applied");
    Ok(())
}

async fn run_seed() -> Result<()> {
    let config = AppConfig::load()?;
    let pool = setup_pool().await?;
    Migrator::up(&pool, None).await?;
    let enrollment = build_enrollment(Arc::new(pool), &config);
    let seeded = seed::seed_demo(&enrollment).await?;
    info!(
        batches = seeded.batches,
        leads = seeded.leads,
        invoices = seeded.invoices,
        "seed complete"
    );
    Ok(())
}

fn issue(user: Uuid, role: &str) -> Result<()> {
    let config = AppConfig::load()?;
    let role = UserRole::parse(role)?;
    let token = issue_token(user, &[role], &config.auth)?;
    println!("{token}");
    Ok(())
}

fn schema_print(path: Option<PathBuf>) -> Result<()> {
    let sdl = graphql::sdl();
    match path {
        Some(target) => {
            std::fs::write(&target, sdl)?;
            info!(path = %target.display(), "schema written");
        }
        None => println!("{sdl}"),
    }
    Ok(())
}
