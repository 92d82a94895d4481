//! The engine bundled with the crate
//!
//! Revisions are plain SQL files with a comment header naming the
//! revision and its parents, followed by `-- upgrade` and `-- downgrade`
//! sections:
//!
//! ```sql
//! -- add users table
//! --
//! -- Revision ID: 1975ea83b712
//! -- Revises:
//! -- Create Date: 2025-01-04 12:30:45.000000
//!
//! -- upgrade
//! CREATE TABLE users (id INTEGER PRIMARY KEY, name VARCHAR(255) NOT NULL);
//!
//! -- downgrade
//! DROP TABLE users;
//! ```
//!
//! Sections can be restricted to one database of a multi-database
//! environment with `-- upgrade <name>`. Applied revisions are recorded
//! in a version table in each database.

mod map;
mod revision;
mod runner;
mod templates;

pub use revision::EMPTY_MESSAGE;
pub use runner::{DEFAULT_DATABASE_URL, DEFAULT_VERSION_TABLE};

use self::map::RevisionMap;
use self::revision::{
    format_file_name, generate_revision_id, strip_comments, validate_revision_id, RevisionScript,
};
use self::runner::{PlannedStep, Session, Target, VersionTable};
use self::templates::{TemplateBundle, ENV_SCRIPT, SCRIPT_TEMPLATE, VERSIONS_DIR};
use crate::capabilities::EngineVersion;
use crate::engine::{Direction, EngineConfig, MigrationEngine, MigrationStep, Script};
use crate::error::{Error, Result};
use crate::options::{MergeOptions, RevisionOptions};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use walkdir::WalkDir;

/// Identifies the schema metadata autogenerate compares against
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataTarget {
    pub package: Option<String>,
    pub class: Option<String>,
}

/// SQL produced by comparing metadata with a live database
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    pub upgrade: String,
    pub downgrade: String,
}

/// Source of autogenerated revision content
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn diff(&self, target: &MetadataTarget, database_url: &str) -> Result<SchemaDiff>;
}

/// Plain-SQL migration engine
#[derive(Clone, Default)]
pub struct ScriptEngine {
    metadata: Option<Arc<dyn MetadataProvider>>,
}

impl fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("metadata", &self.metadata.is_some())
            .finish()
    }
}

impl ScriptEngine {
    pub const VERSION: EngineVersion = EngineVersion::new(1, 0, 0);

    pub fn new() -> Self {
        Self::default()
    }

    /// Register the provider used by `revision --autogenerate`
    pub fn with_metadata_provider(mut self, provider: impl MetadataProvider + 'static) -> Self {
        self.metadata = Some(Arc::new(provider));
        self
    }

    async fn database_heads(&self, config: &EngineConfig) -> Result<Vec<String>> {
        let table = VersionTable::from_config(config)?;
        let mut heads = Vec::new();
        for target in runner::targets(config)? {
            let mut session = Session::open(&target, table.clone()).await?;
            session.ensure_version_table().await?;
            for head in session.heads().await? {
                if !heads.contains(&head) {
                    heads.push(head);
                }
            }
            session.close().await?;
        }
        Ok(heads)
    }

    async fn autogenerate_sections(
        &self,
        config: &EngineConfig,
        env: &Environment,
    ) -> Result<(String, String)> {
        let provider = self.metadata.as_ref().ok_or_else(|| {
            Error::command(
                "Autogenerate requires a metadata provider registered on the engine",
            )
        })?;
        let target = MetadataTarget {
            package: config.get_main_option("metadata_package")?,
            class: config.get_main_option("metadata_class")?,
        };

        let mut script_heads = env.map.heads();
        script_heads.sort();

        let table = VersionTable::from_config(config)?;
        let mut upgrades = Vec::new();
        let mut downgrades = Vec::new();
        for database in runner::targets(config)? {
            let mut session = Session::open(&database, table.clone()).await?;
            session.ensure_version_table().await?;
            let mut heads = session.heads().await?;
            session.close().await?;
            heads.sort();

            if heads != script_heads {
                return Err(Error::command("Target database is not up to date."));
            }

            debug!("Comparing metadata {:?} against {:?}", target, database.name);
            let diff = provider.diff(&target, &database.url).await?;
            match &database.name {
                Some(name) => {
                    upgrades.push(format!("-- upgrade {}\n{}", name, diff.upgrade.trim()));
                    downgrades.push(format!("-- downgrade {}\n{}", name, diff.downgrade.trim()));
                }
                None => {
                    upgrades.push(diff.upgrade.trim().to_string());
                    downgrades.push(diff.downgrade.trim().to_string());
                }
            }
        }

        Ok((upgrades.join("\n\n"), downgrades.join("\n\n")))
    }

    fn plan(
        env: &Environment,
        direction: Direction,
        current: &[String],
        revisions: &[String],
        database: Option<&str>,
    ) -> Vec<PlannedStep> {
        let mut state = current.to_vec();
        let mut planned = Vec::with_capacity(revisions.len());

        for id in revisions {
            let Some(script) = env.map.get(id) else {
                continue;
            };
            let after = match direction {
                Direction::Upgrade => env.map.after_upgrade(&state, id),
                Direction::Downgrade => env.map.after_downgrade(&state, id),
            };
            planned.push(PlannedStep {
                step: MigrationStep {
                    revision: id.clone(),
                    down_revisions: script.script.down_revisions.clone(),
                    direction,
                    database: database.map(str::to_string),
                },
                sql: script.sql(direction, database),
                before: state,
                after: after.clone(),
            });
            state = after;
        }

        planned
    }

    /// Shared body of `upgrade` and `downgrade`
    async fn migrate(
        &self,
        config: &EngineConfig,
        direction: Direction,
        revision: &str,
        sql: bool,
        tag: Option<&str>,
    ) -> Result<Vec<MigrationStep>> {
        let env = Environment::load(config)?;
        let table = VersionTable::from_config(config)?;
        let per_migration = bool_option(config, "transaction_per_migration")?;
        let mut steps = Vec::new();

        if sql {
            let (from, to) = match revision.split_once(':') {
                Some((from, to)) => (Some(from), to),
                None if direction == Direction::Downgrade => {
                    return Err(Error::command(
                        "downgrade with --sql requires <fromrev>:<torev>",
                    ))
                }
                None => (None, revision),
            };
            let current = match from {
                Some(from) => env.map.resolve(from, &[])?,
                None => Vec::new(),
            };

            for target in runner::targets(config)? {
                let destination = env.map.resolve(to, &current)?;
                let revisions = match direction {
                    Direction::Upgrade => env.map.upgrade_steps(&current, &destination),
                    Direction::Downgrade => env.map.downgrade_steps(&current, &destination),
                };
                let planned = Self::plan(&env, direction, &current, &revisions, target.name.as_deref());
                let env_sql = env.env_sql(tag, direction, target.name.as_deref())?;

                if let Some(name) = &target.name {
                    config.print(&format!("-- database: {}", name));
                    config.print("");
                }
                runner::emit(config.output(), &table, &env_sql, &planned, per_migration);
                steps.extend(planned.into_iter().map(|p| p.step));
            }

            return Ok(steps);
        }

        if revision.contains(':') {
            return Err(Error::command(format!(
                "Range revision '{}' is only allowed with --sql",
                revision
            )));
        }

        for target in runner::targets(config)? {
            let mut session = Session::open(&target, table.clone()).await?;
            session.ensure_version_table().await?;
            session
                .run_env(&env.env_sql(tag, direction, target.name.as_deref())?)
                .await?;

            let current = session.heads().await?;
            let destination = env.map.resolve(revision, &current)?;
            let revisions = match direction {
                Direction::Upgrade => env.map.upgrade_steps(&current, &destination),
                Direction::Downgrade => env.map.downgrade_steps(&current, &destination),
            };
            if revisions.is_empty() {
                info!("Database {} is already at {}", target.label(), revision);
            }

            let planned = Self::plan(&env, direction, &current, &revisions, target.name.as_deref());
            session.apply(&planned, per_migration).await?;
            session.close().await?;
            steps.extend(planned.into_iter().map(|p| p.step));
        }

        Ok(steps)
    }

    fn write_script(&self, config: &EngineConfig, env: &Environment, new: NewScript<'_>) -> Result<Script> {
        let revision = match new.rev_id {
            Some(id) => id.to_string(),
            None => generate_revision_id(),
        };
        validate_revision_id(&revision)?;
        if env.map.get(&revision).is_some() {
            return Err(Error::command(format!(
                "Revision {} is already present",
                revision
            )));
        }

        if let Some(label) = new.branch_label {
            if let Some(owner) = env
                .map
                .iter()
                .find(|s| s.script.branch_labels.iter().any(|l| l == label))
            {
                return Err(Error::command(format!(
                    "Branch name '{}' is already used by revision {}",
                    label,
                    owner.revision()
                )));
            }
        }

        let now = Utc::now();
        let truncate = config
            .main_option_or("truncate_slug_length", "40")?
            .trim()
            .parse::<usize>()
            .map_err(|_| Error::config("truncate_slug_length must be a positive integer"))?;
        let file_name = format_file_name(
            &config.main_option_or("file_template", "%(rev)s")?,
            &revision,
            new.message,
            truncate,
            now,
        )?;

        let path = new.directory.join(file_name);
        if path.exists() {
            return Err(Error::command(format!(
                "Revision file {} already exists",
                path.display()
            )));
        }

        let template_path = env.script_location.join(SCRIPT_TEMPLATE);
        let template = fs::read_to_string(&template_path).map_err(|_| {
            Error::command(format!(
                "No revision script template at {}",
                template_path.display()
            ))
        })?;

        let vars = ScriptVars {
            message: new
                .message
                .map(|m| m.replace(['\r', '\n'], " ").trim().to_string())
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| EMPTY_MESSAGE.to_string()),
            up_revision: revision.clone(),
            down_revision: new.parents.join(", "),
            create_date: now.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            branch_labels: new.branch_label.unwrap_or_default().to_string(),
            depends_on: String::new(),
            upgrades: new.upgrades,
            downgrades: new.downgrades,
            databases: runner::database_names(config)?,
        };

        let content = templates::render(&template, &vars)?;
        let parsed = RevisionScript::parse(&content, &path)?;
        if parsed.revision() != revision {
            return Err(Error::command(format!(
                "Template {} does not produce a header for revision {}",
                template_path.display(),
                revision
            )));
        }

        config.print(&format!("Generating {} ... done", path.display()));
        fs::write(&path, content)?;

        Ok(parsed.script)
    }
}

struct NewScript<'a> {
    rev_id: Option<&'a str>,
    parents: Vec<String>,
    message: Option<&'a str>,
    branch_label: Option<&'a str>,
    directory: PathBuf,
    upgrades: String,
    downgrades: String,
}

#[derive(Serialize)]
struct ScriptVars {
    message: String,
    up_revision: String,
    down_revision: String,
    create_date: String,
    branch_labels: String,
    depends_on: String,
    upgrades: String,
    downgrades: String,
    databases: Vec<String>,
}

#[derive(Serialize)]
struct EnvVars<'a> {
    tag: &'a str,
    direction: &'a str,
    database: &'a str,
}

/// A loaded migration environment
struct Environment {
    script_location: PathBuf,
    version_locations: Vec<PathBuf>,
    map: RevisionMap,
}

impl Environment {
    fn load(config: &EngineConfig) -> Result<Self> {
        let script_location = PathBuf::from(
            config
                .get_main_option("script_location")?
                .ok_or_else(|| Error::config("No 'script_location' option configured"))?,
        );
        if !script_location.is_dir() {
            return Err(Error::command(format!(
                "Path doesn't exist: {}. Please use the 'init' command to create a new scripts folder.",
                script_location.display()
            )));
        }

        let version_locations: Vec<PathBuf> = match config.get_main_option("version_locations")? {
            Some(list) if !list.trim().is_empty() => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect(),
            _ => vec![script_location.join(VERSIONS_DIR)],
        };
        let recursive = bool_option(config, "recursive_version_locations")?;

        let mut scripts = Vec::new();
        for location in &version_locations {
            if !location.is_dir() {
                continue;
            }
            let depth = if recursive { usize::MAX } else { 1 };
            for entry in WalkDir::new(location)
                .min_depth(1)
                .max_depth(depth)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| Error::command(e.to_string()))?;
                let path = entry.path();
                if !entry.file_type().is_file()
                    || path.extension().and_then(|e| e.to_str()) != Some("sql")
                {
                    continue;
                }
                match RevisionScript::from_file(path) {
                    Ok(script) => scripts.push(script),
                    Err(e) => warn!("Skipping {}: {}", path.display(), e),
                }
            }
        }

        debug!(
            "Loaded {} revision scripts from {}",
            scripts.len(),
            script_location.display()
        );

        Ok(Self {
            script_location,
            version_locations,
            map: RevisionMap::new(scripts)?,
        })
    }

    /// The rendered environment script, empty when it holds only comments
    fn env_sql(&self, tag: Option<&str>, direction: Direction, database: Option<&str>) -> Result<String> {
        let path = self.script_location.join(ENV_SCRIPT);
        if !path.is_file() {
            return Ok(String::new());
        }
        let template = fs::read_to_string(&path)?;
        let rendered = templates::render(
            &template,
            &EnvVars {
                tag: tag.unwrap_or(""),
                direction: direction.as_str(),
                database: database.unwrap_or(""),
            },
        )?;
        Ok(strip_comments(rendered.lines()))
    }

    /// Directory a new revision goes to
    fn version_directory(&self, version_path: Option<&str>, heads: &[String]) -> Result<PathBuf> {
        if let Some(requested) = version_path {
            let requested = PathBuf::from(requested);
            if !requested.is_dir() {
                return Err(Error::command(format!(
                    "Path doesn't exist: {}",
                    requested.display()
                )));
            }
            let wanted = canonical(&requested);
            if !self
                .version_locations
                .iter()
                .any(|location| canonical(location) == wanted)
            {
                return Err(Error::command(format!(
                    "Path {} is not represented in the 'version_locations' option",
                    requested.display()
                )));
            }
            return Ok(requested);
        }

        if let Some(directory) = heads
            .first()
            .and_then(|head| self.map.get(head))
            .and_then(|script| script.script.path.parent())
        {
            return Ok(directory.to_path_buf());
        }

        if self.version_locations.len() > 1 {
            return Err(Error::command(
                "Multiple version locations present, please specify --version-path",
            ));
        }

        let directory = self
            .version_locations
            .first()
            .cloned()
            .unwrap_or_else(|| self.script_location.join(VERSIONS_DIR));
        if !directory.is_dir() {
            return Err(Error::command(format!(
                "Path doesn't exist: {}",
                directory.display()
            )));
        }
        Ok(directory)
    }

    fn scripts(&self, ids: &[String]) -> Vec<Script> {
        ids.iter()
            .filter_map(|id| self.map.get(id))
            .map(|s| s.script.clone())
            .collect()
    }
}

impl Target {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("default")
    }
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn bool_option(config: &EngineConfig, key: &str) -> Result<bool> {
    match config.get_main_option(key)? {
        None => Ok(false),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "" | "false" | "0" | "no" | "off" => Ok(false),
            "true" | "1" | "yes" | "on" => Ok(true),
            other => Err(Error::config(format!(
                "Option '{}' must be a boolean, got '{}'",
                key, other
            ))),
        },
    }
}

#[async_trait]
impl MigrationEngine for ScriptEngine {
    fn version(&self) -> EngineVersion {
        Self::VERSION
    }

    async fn init(&self, config: &EngineConfig, directory: &Path, template: &str) -> Result<PathBuf> {
        if directory.exists() {
            return Err(Error::command(format!(
                "Directory {} already exists",
                directory.display()
            )));
        }

        let bundle = TemplateBundle::load(config, template)?;
        bundle.install(config, directory)?;
        info!("Created migration environment {} from template '{}'", directory.display(), template);
        Ok(directory.to_path_buf())
    }

    async fn revision(&self, config: &EngineConfig, options: &RevisionOptions) -> Result<Script> {
        if options.sql && options.autogenerate {
            return Err(Error::command(
                "Using --sql with --autogenerate does not make any sense",
            ));
        }

        let env = Environment::load(config)?;
        let parents = env.map.resolve(&options.head, &[])?;
        if parents.len() > 1 {
            return Err(Error::command(format!(
                "Revision head '{}' resolves to more than one revision; \
                 merge them first or name a single head",
                options.head
            )));
        }
        for parent in &parents {
            if !env.map.children_of(parent).is_empty() && !options.splice {
                return Err(Error::command(format!(
                    "Revision {} is not a head revision; please specify --splice to create \
                     a new branch from this revision",
                    parent
                )));
            }
        }

        let directory = env.version_directory(options.version_path.as_deref(), &parents)?;
        let (upgrades, downgrades) = if options.autogenerate {
            self.autogenerate_sections(config, &env).await?
        } else {
            (String::new(), String::new())
        };

        self.write_script(
            config,
            &env,
            NewScript {
                rev_id: options.rev_id.as_deref(),
                parents,
                message: options.message.as_deref(),
                branch_label: options.branch_label.as_deref(),
                directory,
                upgrades,
                downgrades,
            },
        )
    }

    async fn upgrade(
        &self,
        config: &EngineConfig,
        revision: &str,
        sql: bool,
        tag: Option<&str>,
    ) -> Result<Vec<MigrationStep>> {
        self.migrate(config, Direction::Upgrade, revision, sql, tag).await
    }

    async fn downgrade(
        &self,
        config: &EngineConfig,
        revision: &str,
        sql: bool,
        tag: Option<&str>,
    ) -> Result<Vec<MigrationStep>> {
        self.migrate(config, Direction::Downgrade, revision, sql, tag).await
    }

    async fn edit(&self, config: &EngineConfig, revision: &str) -> Result<()> {
        let env = Environment::load(config)?;
        let ids = if revision.trim() == "current" {
            self.database_heads(config).await?
        } else {
            env.map.resolve(revision, &[])?
        };
        if ids.is_empty() {
            return Err(Error::command("No revision files indicated by symbol 'current'"));
        }

        let editor = match config.get_main_option("editor")?.filter(|e| !e.trim().is_empty()) {
            Some(editor) => editor,
            None => std::env::var("VISUAL")
                .or_else(|_| std::env::var("EDITOR"))
                .unwrap_or_else(|_| "vi".to_string()),
        };
        let mut parts = editor.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::config("The configured editor is empty"))?;
        let args: Vec<&str> = parts.collect();

        for script in env.scripts(&ids) {
            debug!("Opening {} with {}", script.path.display(), editor);
            let status = Command::new(program)
                .args(&args)
                .arg(&script.path)
                .status()
                .map_err(|e| Error::command(format!("Failed to run editor '{}': {}", editor, e)))?;
            if !status.success() {
                return Err(Error::command(format!(
                    "Editor '{}' exited with {}",
                    editor, status
                )));
            }
        }
        Ok(())
    }

    async fn merge(&self, config: &EngineConfig, options: &MergeOptions) -> Result<Script> {
        let env = Environment::load(config)?;
        let mut parents: Vec<String> = Vec::new();
        for symbol in &options.revisions {
            for id in env.map.resolve(symbol, &[])? {
                if !parents.contains(&id) {
                    parents.push(id);
                }
            }
        }
        if parents.len() < 2 {
            return Err(Error::command(format!(
                "Merge requires at least two revisions, got: {}",
                if parents.is_empty() {
                    "none".to_string()
                } else {
                    parents.join(", ")
                }
            )));
        }

        let directory = env.version_directory(None, &parents)?;
        self.write_script(
            config,
            &env,
            NewScript {
                rev_id: options.rev_id.as_deref(),
                parents,
                message: options.message.as_deref(),
                branch_label: options.branch_label.as_deref(),
                directory,
                upgrades: String::new(),
                downgrades: String::new(),
            },
        )
    }

    async fn show(&self, config: &EngineConfig, revision: &str) -> Result<Vec<Script>> {
        let env = Environment::load(config)?;
        let ids = if revision.trim() == "current" {
            self.database_heads(config).await?
        } else {
            env.map.resolve(revision, &[])?
        };

        for id in &ids {
            config.print(&env.map.describe(id, true, &[]));
        }
        Ok(env.scripts(&ids))
    }

    async fn history(
        &self,
        config: &EngineConfig,
        rev_range: Option<&str>,
        verbose: bool,
        indicate_current: Option<bool>,
    ) -> Result<Vec<Script>> {
        let env = Environment::load(config)?;
        let needs_database = indicate_current == Some(true)
            || rev_range.map_or(false, |range| range.contains("current"));
        let current = if needs_database {
            self.database_heads(config).await?
        } else {
            Vec::new()
        };

        let (lower, upper) = match rev_range {
            None => (Vec::new(), env.map.heads()),
            Some(range) => {
                let (start, end) = range.split_once(':').ok_or_else(|| {
                    Error::command(
                        "History range requires [start]:[end], [start]:, or :[end]",
                    )
                })?;
                let lower = env.map.resolve(start, &current)?;
                let upper = if end.trim().is_empty() {
                    env.map.heads()
                } else {
                    env.map.resolve(end, &current)?
                };
                (lower, upper)
            }
        };

        let marked: &[String] = if indicate_current == Some(true) { &current } else { &[] };
        let ids = env.map.range(&lower, &upper);
        for id in &ids {
            config.print(&env.map.describe(id, verbose, marked));
        }
        Ok(env.scripts(&ids))
    }

    async fn heads(
        &self,
        config: &EngineConfig,
        verbose: bool,
        resolve_dependencies: bool,
    ) -> Result<Vec<Script>> {
        let env = Environment::load(config)?;
        let ids = if resolve_dependencies {
            env.map.heads_with_dependencies()
        } else {
            env.map.heads()
        };

        for id in &ids {
            if verbose {
                config.print(&env.map.describe(id, true, &[]));
            } else {
                config.print(&env.map.describe_short(id, &[]));
            }
        }
        Ok(env.scripts(&ids))
    }

    async fn branches(&self, config: &EngineConfig, verbose: bool) -> Result<Vec<Script>> {
        let env = Environment::load(config)?;
        let ids = env.map.branch_points();

        for id in &ids {
            if verbose {
                config.print(&env.map.describe(id, true, &[]));
            } else {
                config.print(&env.map.describe_short(id, &[]));
            }
            for child in env.map.children_of(id) {
                let summary = env
                    .map
                    .get(child)
                    .map(|s| s.script.doc().to_string())
                    .unwrap_or_default();
                config.print(&format!(
                    "{:>width$} -> {}, {}",
                    "",
                    env.map.describe_short(child, &[]),
                    summary,
                    width = id.len()
                ));
            }
        }
        Ok(env.scripts(&ids))
    }

    async fn current(
        &self,
        config: &EngineConfig,
        verbose: bool,
        head_only: bool,
    ) -> Result<Vec<Script>> {
        let env = Environment::load(config)?;
        let table = VersionTable::from_config(config)?;
        let mut scripts = Vec::new();

        for target in runner::targets(config)? {
            let mut session = Session::open(&target, table.clone()).await?;
            session.ensure_version_table().await?;
            let heads = session.heads().await?;
            session.close().await?;

            if verbose {
                config.print(&format!("Current revision(s) for {}:", target.label()));
            }
            for head in &heads {
                let script = env.map.get(head).ok_or_else(|| {
                    Error::command(format!("Can't locate revision identified by '{}'", head))
                })?;
                if head_only {
                    config.print(head);
                } else if verbose {
                    config.print(&env.map.describe(head, true, &[]));
                } else {
                    config.print(&env.map.describe_short(head, &[]));
                }
                if !scripts.contains(&script.script) {
                    scripts.push(script.script.clone());
                }
            }
        }

        Ok(scripts)
    }

    async fn stamp(
        &self,
        config: &EngineConfig,
        revision: &str,
        sql: bool,
        tag: Option<&str>,
    ) -> Result<()> {
        let env = Environment::load(config)?;
        let table = VersionTable::from_config(config)?;

        if sql {
            let (from, to) = match revision.split_once(':') {
                Some((from, to)) => (env.map.resolve(from, &[])?, to),
                None => (Vec::new(), revision),
            };
            let destination = env.map.resolve(to, &from)?;
            for target in runner::targets(config)? {
                if let Some(name) = &target.name {
                    config.print(&format!("-- database: {}", name));
                    config.print("");
                }
                let env_sql = env.env_sql(tag, Direction::Upgrade, target.name.as_deref())?;
                if !env_sql.is_empty() {
                    config.print(&env_sql);
                    config.print("");
                }
                config.print(&table.create_sql());
                config.print("");
                config.print(&table.clear_sql());
                for id in &destination {
                    config.print(&table.insert_sql(id));
                }
                config.print("");
            }
            return Ok(());
        }

        for target in runner::targets(config)? {
            let mut session = Session::open(&target, table.clone()).await?;
            session.ensure_version_table().await?;
            let current = session.heads().await?;
            let destination = env.map.resolve(revision, &current)?;
            info!(
                "Stamping {} with {}",
                target.label(),
                if destination.is_empty() {
                    "<base>".to_string()
                } else {
                    destination.join(", ")
                }
            );
            session.stamp(&destination).await?;
            session.close().await?;
        }
        Ok(())
    }
}
