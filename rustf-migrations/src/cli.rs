//! Clap command group for migration commands
//!
//! [`MigrationsCommand`] can be mounted in an application's own command
//! tree, e.g. `Db(MigrationsCommand)`, or used through the `rustf-db`
//! binary.

use crate::engine::MigrationEngine;
use crate::error::Result;
use crate::migrations::Migrations;
use crate::options::{
    HistoryOptions, MergeOptions, RevisionOptions, DEFAULT_DOWNGRADE_TARGET, DEFAULT_EDIT_TARGET,
    DEFAULT_HEAD, DEFAULT_SHOW_TARGET, DEFAULT_UPGRADE_TARGET,
};
use clap::{Args, Subcommand};

#[derive(Debug, Args)]
pub struct MigrationsCommand {
    #[command(subcommand)]
    pub action: MigrationsAction,
}

/// Arguments shared by `revision` and `autogenerate`
#[derive(Debug, Clone, Args)]
pub struct RevisionArgs {
    /// Message describing the revision
    #[arg(short, long)]
    pub message: Option<String>,

    /// Don't touch the database, write SQL instead
    #[arg(long)]
    pub sql: bool,

    /// Base revision of the new one
    #[arg(long, default_value = DEFAULT_HEAD)]
    pub head: String,

    /// Allow a non-head revision as the base, creating a new branch
    #[arg(long)]
    pub splice: bool,

    /// Branch label to apply to the new revision
    #[arg(long)]
    pub branch_label: Option<String>,

    /// Directory to place the new revision file in
    #[arg(long)]
    pub version_path: Option<String>,

    /// Use this id instead of a generated one
    #[arg(long)]
    pub rev_id: Option<String>,
}

impl RevisionArgs {
    fn into_options(self, autogenerate: bool) -> RevisionOptions {
        RevisionOptions {
            message: self.message,
            autogenerate,
            sql: self.sql,
            head: self.head,
            splice: self.splice,
            branch_label: self.branch_label,
            version_path: self.version_path,
            rev_id: self.rev_id,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum MigrationsAction {
    /// Create a new migration environment
    Init {
        /// Use the multi-database template
        #[arg(long)]
        multidb: bool,
    },

    /// Create a new revision file
    Revision {
        #[command(flatten)]
        args: RevisionArgs,

        /// Fill the revision from the difference between metadata and the database
        #[arg(long)]
        autogenerate: bool,
    },

    /// Create a new revision file from the metadata difference
    Autogenerate {
        #[command(flatten)]
        args: RevisionArgs,
    },

    /// Upgrade to a later revision
    Upgrade {
        /// Target revision
        #[arg(default_value = DEFAULT_UPGRADE_TARGET)]
        revision: String,

        /// Don't touch the database, write SQL instead
        #[arg(long)]
        sql: bool,

        /// Arbitrary tag passed to the environment script
        #[arg(long)]
        tag: Option<String>,
    },

    /// Revert to a previous revision
    Downgrade {
        /// Target revision
        #[arg(default_value = DEFAULT_DOWNGRADE_TARGET, allow_negative_numbers = true)]
        revision: String,

        /// Don't touch the database, write SQL instead
        #[arg(long)]
        sql: bool,

        /// Arbitrary tag passed to the environment script
        #[arg(long)]
        tag: Option<String>,
    },

    /// Open a revision file in an editor
    Edit {
        #[arg(default_value = DEFAULT_EDIT_TARGET)]
        revision: String,
    },

    /// Merge two or more revisions into one
    Merge {
        /// Revisions to merge
        #[arg(required = true, num_args = 1..)]
        revisions: Vec<String>,

        #[arg(short, long)]
        message: Option<String>,

        #[arg(long)]
        branch_label: Option<String>,

        #[arg(long)]
        rev_id: Option<String>,
    },

    /// Show a revision
    Show {
        #[arg(default_value = DEFAULT_SHOW_TARGET)]
        revision: String,
    },

    /// List revisions in chronological order
    History {
        /// Range to list, as [start]:[end]
        #[arg(short, long, allow_hyphen_values = true)]
        rev_range: Option<String>,

        #[arg(short, long)]
        verbose: bool,

        /// Mark the revisions the database is at
        #[arg(short, long)]
        indicate_current: bool,
    },

    /// Show the current heads of the revision scripts
    Heads {
        #[arg(short, long)]
        verbose: bool,

        /// Treat dependency links as descendants
        #[arg(long)]
        resolve_dependencies: bool,
    },

    /// Show branch points
    Branches {
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the revisions the database is at
    Current {
        #[arg(short, long)]
        verbose: bool,

        /// Print the revision ids only
        #[arg(long)]
        head_only: bool,
    },

    /// Set the recorded revision without running any migration
    Stamp {
        #[arg(default_value = DEFAULT_SHOW_TARGET)]
        revision: String,

        /// Don't touch the database, write SQL instead
        #[arg(long)]
        sql: bool,

        /// Arbitrary tag passed to the environment script
        #[arg(long)]
        tag: Option<String>,
    },
}

impl MigrationsCommand {
    pub async fn execute<E: MigrationEngine>(self, migrations: &Migrations<E>) -> Result<()> {
        match self.action {
            MigrationsAction::Init { multidb } => {
                migrations.init(multidb).await?;
            }
            MigrationsAction::Revision { args, autogenerate } => {
                migrations.revision(args.into_options(autogenerate)).await?;
            }
            MigrationsAction::Autogenerate { args } => {
                migrations.autogenerate(args.into_options(true)).await?;
            }
            MigrationsAction::Upgrade { revision, sql, tag } => {
                migrations.upgrade(&revision, sql, tag.as_deref()).await?;
            }
            MigrationsAction::Downgrade { revision, sql, tag } => {
                migrations.downgrade(&revision, sql, tag.as_deref()).await?;
            }
            MigrationsAction::Edit { revision } => {
                migrations.edit(&revision).await?;
            }
            MigrationsAction::Merge {
                revisions,
                message,
                branch_label,
                rev_id,
            } => {
                let options = MergeOptions {
                    revisions,
                    message,
                    branch_label,
                    rev_id,
                };
                migrations.merge(options).await?;
            }
            MigrationsAction::Show { revision } => {
                migrations.show(&revision).await?;
            }
            MigrationsAction::History {
                rev_range,
                verbose,
                indicate_current,
            } => {
                let options = HistoryOptions {
                    rev_range,
                    verbose,
                    indicate_current,
                };
                migrations.history(options).await?;
            }
            MigrationsAction::Heads {
                verbose,
                resolve_dependencies,
            } => {
                migrations.heads(verbose, resolve_dependencies).await?;
            }
            MigrationsAction::Branches { verbose } => {
                migrations.branches(verbose).await?;
            }
            MigrationsAction::Current { verbose, head_only } => {
                migrations.current(verbose, head_only).await?;
            }
            MigrationsAction::Stamp { revision, sql, tag } => {
                migrations.stamp(&revision, sql, tag.as_deref()).await?;
            }
        }
        Ok(())
    }
}
