use anyhow::Context;
use clap::Parser;
use rustf_migrations::{Migrations, MigrationsCommand, MigrationsConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rustf-db")]
#[command(about = "Database migrations for RustF applications")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(flatten)]
    command: MigrationsCommand,

    /// Project directory holding config.toml (defaults to current directory)
    #[arg(short = 'P', long, global = true)]
    project: Option<PathBuf>,

    /// Configuration file to read instead of the project's config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    if let Err(e) = run(cli).await {
        log::error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => MigrationsConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => {
            let project_path = match cli.project {
                Some(path) => path,
                None => std::env::current_dir().context("Failed to read current directory")?,
            };
            MigrationsConfig::load_with_base_dir(&project_path).with_context(|| {
                format!("Failed to load configuration from {}", project_path.display())
            })?
        }
    };

    log::debug!(
        "Migrations in {} (database: {})",
        config.script_location.display(),
        if config.database_url.is_some() {
            "configured"
        } else {
            "default"
        }
    );

    let migrations = Migrations::new(config);
    cli.command.execute(&migrations).await?;
    Ok(())
}
