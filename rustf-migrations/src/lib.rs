//! RustF migrations - database schema migrations for RustF applications
//!
//! Reads migration settings from the application's `config.toml`, turns
//! them into engine configuration and exposes the usual migration
//! commands:
//! - `init`, `revision`, `autogenerate`, `merge`, `edit`
//! - `upgrade`, `downgrade`, `stamp`
//! - `show`, `history`, `heads`, `branches`, `current`
//!
//! ```no_run
//! use rustf_migrations::{Migrations, MigrationsConfig};
//!
//! # async fn run() -> rustf_migrations::Result<()> {
//! let migrations = Migrations::new(MigrationsConfig::load()?);
//! migrations.upgrade("head", false, None).await?;
//! # Ok(())
//! # }
//! ```

// Enforce error handling best practices
#![cfg_attr(
    not(test),
    warn(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
    )
)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used,))]

pub mod capabilities;
pub mod config;
pub mod engine;
pub mod error;
pub mod migrations;
pub mod options;

// Clap command group, embeddable in an application's CLI
#[cfg(feature = "cli")]
pub mod cli;

pub use capabilities::{EngineCapabilities, EngineVersion};
pub use config::MigrationsConfig;
pub use engine::{
    EngineConfig, MetadataProvider, MetadataTarget, MigrationEngine, MigrationStep, OutputSink,
    SchemaDiff, Script, ScriptEngine,
};
pub use error::{Error, Result};
pub use migrations::Migrations;
pub use options::{HistoryOptions, MergeOptions, RevisionOptions};

#[cfg(feature = "cli")]
pub use cli::MigrationsCommand;
