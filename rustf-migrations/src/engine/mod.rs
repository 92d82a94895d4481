//! Boundary with the migration engine
//!
//! The facade only talks to engines through [`MigrationEngine`], handing
//! each command a freshly translated [`EngineConfig`]. [`ScriptEngine`] is
//! the engine bundled with this crate.

pub mod script;

use crate::capabilities::EngineVersion;
use crate::error::{Error, Result};
use crate::options::{MergeOptions, RevisionOptions};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub use script::{MetadataProvider, MetadataTarget, SchemaDiff, ScriptEngine};

/// Where an engine writes listings and offline SQL
#[derive(Clone, Default)]
pub enum OutputSink {
    #[default]
    Stdout,
    Buffer(Arc<Mutex<String>>),
}

impl OutputSink {
    /// In-memory sink, useful when embedding or testing
    pub fn buffer() -> Self {
        Self::Buffer(Arc::new(Mutex::new(String::new())))
    }

    pub fn write_line(&self, line: &str) {
        match self {
            OutputSink::Stdout => println!("{}", line),
            OutputSink::Buffer(buffer) => {
                let mut buffer = buffer.lock().unwrap_or_else(|e| e.into_inner());
                buffer.push_str(line);
                buffer.push('\n');
            }
        }
    }

    /// Everything written so far, for buffer sinks
    pub fn contents(&self) -> Option<String> {
        match self {
            OutputSink::Stdout => None,
            OutputSink::Buffer(buffer) => {
                Some(buffer.lock().unwrap_or_else(|e| e.into_inner()).clone())
            }
        }
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSink::Stdout => f.write_str("Stdout"),
            OutputSink::Buffer(_) => f.write_str("Buffer"),
        }
    }
}

/// Engine-native configuration
///
/// Options set with [`EngineConfig::set_main_option`] take precedence over
/// the settings file at [`EngineConfig::config_file_name`], which is read
/// on demand. Settings file tables are flattened to `section.key`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    config_file_name: PathBuf,
    main_options: IndexMap<String, String>,
    template_directory: Option<PathBuf>,
    output: OutputSink,
}

impl EngineConfig {
    pub fn new(config_file_name: impl Into<PathBuf>) -> Self {
        Self {
            config_file_name: config_file_name.into(),
            main_options: IndexMap::new(),
            template_directory: None,
            output: OutputSink::default(),
        }
    }

    pub fn config_file_name(&self) -> &Path {
        &self.config_file_name
    }

    pub fn set_main_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.main_options.insert(key.into(), value.into());
    }

    /// Options set programmatically, without the settings file
    pub fn main_options(&self) -> &IndexMap<String, String> {
        &self.main_options
    }

    /// Look an option up, falling back to the settings file
    pub fn get_main_option(&self, key: &str) -> Result<Option<String>> {
        if let Some(value) = self.main_options.get(key) {
            return Ok(Some(value.clone()));
        }

        Ok(self.file_options()?.shift_remove(key))
    }

    /// Look an option up and fall back to `default` when it is unset or empty
    pub fn main_option_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_main_option(key)?
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string()))
    }

    /// Override where template bundles are looked up
    pub fn set_template_directory(&mut self, directory: impl Into<PathBuf>) {
        self.template_directory = Some(directory.into());
    }

    pub fn template_directory(&self) -> Option<&Path> {
        self.template_directory.as_deref()
    }

    pub fn set_output(&mut self, output: OutputSink) {
        self.output = output;
    }

    pub fn output(&self) -> &OutputSink {
        &self.output
    }

    /// Write one line of user-facing output
    pub fn print(&self, text: &str) {
        self.output.write_line(text);
    }

    fn file_options(&self) -> Result<IndexMap<String, String>> {
        let mut options = IndexMap::new();
        if !self.config_file_name.is_file() {
            return Ok(options);
        }

        let content = fs::read_to_string(&self.config_file_name)?;
        let table: toml::Table = toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse settings file '{}': {}",
                self.config_file_name.display(),
                e
            ))
        })?;

        flatten_table("", &table, &mut options);
        Ok(options)
    }
}

fn flatten_table(prefix: &str, table: &toml::Table, out: &mut IndexMap<String, String>) {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match value {
            toml::Value::Table(inner) => flatten_table(&full_key, inner, out),
            other => {
                out.insert(full_key, option_string(other));
            }
        }
    }
}

/// Render a TOML value the way engine options store it: strings verbatim,
/// arrays comma separated, everything else in TOML notation
pub fn option_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Array(items) => items
            .iter()
            .map(option_string)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Handle to one revision artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub revision: String,
    pub down_revisions: Vec<String>,
    pub branch_labels: Vec<String>,
    pub depends_on: Vec<String>,
    pub message: Option<String>,
    pub create_date: Option<String>,
    pub path: PathBuf,
}

impl Script {
    /// The recorded description
    pub fn doc(&self) -> &str {
        self.message.as_deref().unwrap_or("")
    }

    pub fn is_base(&self) -> bool {
        self.down_revisions.is_empty()
    }

    pub fn is_merge_point(&self) -> bool {
        self.down_revisions.len() > 1
    }
}

/// Direction of a migration step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upgrade,
    Downgrade,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upgrade => "upgrade",
            Direction::Downgrade => "downgrade",
        }
    }
}

/// One revision applied, reverted or emitted as SQL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    pub revision: String,
    pub down_revisions: Vec<String>,
    pub direction: Direction,
    /// Named database for multi-database environments
    pub database: Option<String>,
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lower = self.down_revisions.join(", ");
        match self.direction {
            Direction::Upgrade => write!(f, "Running upgrade {} -> {}", lower, self.revision),
            Direction::Downgrade => {
                write!(f, "Running downgrade {} -> {}", self.revision, lower)
            }
        }
    }
}

/// The command set a migration engine offers
#[async_trait]
pub trait MigrationEngine: Send + Sync {
    /// Version of the installed engine, used for capability gating
    fn version(&self) -> EngineVersion;

    /// Create a new migration environment from a template bundle
    async fn init(&self, config: &EngineConfig, directory: &Path, template: &str)
        -> Result<PathBuf>;

    async fn revision(&self, config: &EngineConfig, options: &RevisionOptions) -> Result<Script>;

    async fn upgrade(
        &self,
        config: &EngineConfig,
        revision: &str,
        sql: bool,
        tag: Option<&str>,
    ) -> Result<Vec<MigrationStep>>;

    async fn downgrade(
        &self,
        config: &EngineConfig,
        revision: &str,
        sql: bool,
        tag: Option<&str>,
    ) -> Result<Vec<MigrationStep>>;

    async fn edit(&self, config: &EngineConfig, revision: &str) -> Result<()>;

    async fn merge(&self, config: &EngineConfig, options: &MergeOptions) -> Result<Script>;

    async fn show(&self, config: &EngineConfig, revision: &str) -> Result<Vec<Script>>;

    /// `indicate_current` is `None` when the caller omitted the flag
    async fn history(
        &self,
        config: &EngineConfig,
        rev_range: Option<&str>,
        verbose: bool,
        indicate_current: Option<bool>,
    ) -> Result<Vec<Script>>;

    async fn heads(
        &self,
        config: &EngineConfig,
        verbose: bool,
        resolve_dependencies: bool,
    ) -> Result<Vec<Script>>;

    async fn branches(&self, config: &EngineConfig, verbose: bool) -> Result<Vec<Script>>;

    async fn current(
        &self,
        config: &EngineConfig,
        verbose: bool,
        head_only: bool,
    ) -> Result<Vec<Script>>;

    async fn stamp(
        &self,
        config: &EngineConfig,
        revision: &str,
        sql: bool,
        tag: Option<&str>,
    ) -> Result<()>;
}
