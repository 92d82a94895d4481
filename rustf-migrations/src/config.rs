use crate::engine::{option_string, EngineConfig, OutputSink};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Application environment, selects `config.{env}.toml`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Get environment from string
    pub fn from_str(env: &str) -> Self {
        match env.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "dev",
            Environment::Production => "prod",
        }
    }

    /// Detect the current environment from `RUSTF_ENV`
    pub fn detect() -> Self {
        Self::detect_from(|key| env::var(key).ok())
    }

    pub fn detect_from<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup("RUSTF_ENV")
            .map(|env| Self::from_str(&env))
            .unwrap_or_default()
    }
}

/// Settings of the migrations shim
///
/// Read from the `[migrations]` table of the application's `config.toml`.
/// Keys that are not fields below are kept in `extra` and handed to the
/// engine untouched.
///
/// ```toml
/// [migrations]
/// script_location = "migrations"
/// async_database = false
/// version_table = "schema_version"   # engine option, lands in `extra`
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub async_database: bool,

    #[serde(default = "default_script_location")]
    pub script_location: PathBuf,

    #[serde(default = "default_config_file_name")]
    pub config_file_name: String,

    #[serde(default = "default_template")]
    pub default_template: String,

    #[serde(default = "default_async_template")]
    pub async_template: String,

    #[serde(default = "default_multidb_template")]
    pub multidb_template: String,

    #[serde(default = "default_template_directory")]
    pub template_directory: PathBuf,

    #[serde(default = "default_file_template")]
    pub file_template: String,

    #[serde(default = "default_truncate_slug_length")]
    pub truncate_slug_length: u32,

    #[serde(default)]
    pub metadata_package: Option<String>,

    #[serde(default)]
    pub metadata_class: Option<String>,

    /// Unrecognized keys, forwarded to the engine as options
    #[serde(flatten)]
    pub extra: IndexMap<String, toml::Value>,

    #[serde(skip)]
    pub output: OutputSink,
}

fn default_script_location() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_config_file_name() -> String {
    "migrations.toml".to_string()
}

fn default_template() -> String {
    "default".to_string()
}

fn default_async_template() -> String {
    "default_async".to_string()
}

fn default_multidb_template() -> String {
    "multidb".to_string()
}

fn default_template_directory() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/templates"))
}

fn default_file_template() -> String {
    "%(rev)s".to_string()
}

fn default_truncate_slug_length() -> u32 {
    40
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            async_database: false,
            script_location: default_script_location(),
            config_file_name: default_config_file_name(),
            default_template: default_template(),
            async_template: default_async_template(),
            multidb_template: default_multidb_template(),
            template_directory: default_template_directory(),
            file_template: default_file_template(),
            truncate_slug_length: default_truncate_slug_length(),
            metadata_package: None,
            metadata_class: None,
            extra: IndexMap::new(),
            output: OutputSink::default(),
        }
    }
}

impl MigrationsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `config.toml` in the current directory
    pub fn load() -> Result<Self> {
        Self::load_with_base_dir(".")
    }

    /// Load from `config.toml` in `base_dir`, merged with the file of the
    /// current environment (`config.dev.toml`, `config.prod.toml`)
    pub fn load_with_base_dir<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let environment = Environment::detect();

        let base_config_path = base_dir.join("config.toml");
        let mut merged = if base_config_path.exists() {
            load_toml_value(&base_config_path)?
        } else {
            toml::Value::Table(toml::Table::new())
        };

        let env_config_path = base_dir.join(format!("config.{}.toml", environment.as_str()));
        if env_config_path.exists() {
            log::debug!(
                "Loading environment-specific config from: {}",
                env_config_path.display()
            );
            let env_value = load_toml_value(&env_config_path)?;
            merged = serde_toml_merge::merge(merged, env_value).map_err(|e| {
                Error::config(format!("Failed to merge configuration files: {}", e))
            })?;
        }

        let mut config = Self::from_value(merged)?;
        config.apply_env_overrides()?;
        config.resolve_script_location(base_dir);
        Ok(config)
    }

    /// Load from a single configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::from_value(load_toml_value(path)?)?;
        config.apply_env_overrides()?;
        config.resolve_script_location(path.parent().unwrap_or_else(|| Path::new(".")));

        log::debug!("Successfully loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Build from a parsed application configuration
    ///
    /// Without a `database_url` of its own, the `[database] url` of the
    /// application is used.
    pub fn from_value(value: toml::Value) -> Result<Self> {
        let toml::Value::Table(mut table) = value else {
            return Err(Error::config("Configuration root must be a table"));
        };

        let framework_url = table
            .get("database")
            .and_then(|database| database.get("url"))
            .and_then(|url| url.as_str())
            .map(str::to_string);

        let mut config: Self = match table.remove("migrations") {
            Some(section) => section
                .try_into::<Self>()
                .map_err(|e| Error::config(format!("Invalid [migrations] section: {}", e)))?,
            None => Self::default(),
        };

        if config.database_url.is_none() {
            config.database_url = framework_url;
        }
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(|key| env::var(key).ok())
    }

    /// Apply `DATABASE_URL`, `RUSTF_DATABASE_URL` and the
    /// `RUSTF_MIGRATIONS_*` variables, read through `lookup`
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(url) = lookup("RUSTF_DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(dir) = lookup("RUSTF_MIGRATIONS_DIR") {
            self.script_location = PathBuf::from(dir);
        }
        if let Some(flag) = lookup("RUSTF_MIGRATIONS_ASYNC") {
            self.async_database = flag
                .parse()
                .map_err(|_| Error::config("Invalid RUSTF_MIGRATIONS_ASYNC value"))?;
        }
        if let Some(name) = lookup("RUSTF_MIGRATIONS_CONFIG_FILE") {
            self.config_file_name = name;
        }
        Ok(())
    }

    fn resolve_script_location(&mut self, base_dir: &Path) {
        if self.script_location.is_relative() && base_dir != Path::new(".") {
            self.script_location = base_dir.join(&self.script_location);
        }
    }

    /// Engine-native configuration equivalent to this one
    pub fn to_engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::new(self.script_location.join(&self.config_file_name));

        config.set_main_option("script_location", self.script_location.display().to_string());
        if let Some(url) = &self.database_url {
            config.set_main_option("database_url", url);
        }
        config.set_main_option("file_template", &self.file_template);
        config.set_main_option("truncate_slug_length", self.truncate_slug_length.to_string());
        if let Some(package) = &self.metadata_package {
            config.set_main_option("metadata_package", package);
        }
        if let Some(class) = &self.metadata_class {
            config.set_main_option("metadata_class", class);
        }
        for (key, value) in &self.extra {
            config.set_main_option(key, option_string(value));
        }

        config.set_template_directory(&self.template_directory);
        config.set_output(self.output.clone());
        config
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_script_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.script_location = location.into();
        self
    }

    pub fn with_async_database(mut self, async_database: bool) -> Self {
        self.async_database = async_database;
        self
    }

    pub fn with_template_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.template_directory = directory.into();
        self
    }

    pub fn with_file_template(mut self, template: impl Into<String>) -> Self {
        self.file_template = template.into();
        self
    }

    pub fn with_metadata(mut self, package: impl Into<String>, class: impl Into<String>) -> Self {
        self.metadata_package = Some(package.into());
        self.metadata_class = Some(class.into());
        self
    }

    /// Add an engine option that has no field of its own
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_output(mut self, output: OutputSink) -> Self {
        self.output = output;
        self
    }
}

fn load_toml_value(path: &Path) -> Result<toml::Value> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::config(format!(
            "Failed to read config file '{}': {}. Make sure the file exists and is readable.",
            path.display(),
            e
        ))
    })?;

    toml::from_str(&content).map_err(|e| {
        Error::config(format!(
            "Failed to parse config file '{}': {}. Check TOML syntax.",
            path.display(),
            e
        ))
    })
}
