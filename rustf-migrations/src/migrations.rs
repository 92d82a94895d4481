//! Command facade over a migration engine
//!
//! Every operation translates the [`MigrationsConfig`] into a fresh
//! [`EngineConfig`](crate::engine::EngineConfig), fills in argument
//! defaults and makes exactly one engine call.

use crate::capabilities::{EngineCapabilities, EDIT_MIN_VERSION};
use crate::config::MigrationsConfig;
use crate::engine::{MigrationEngine, MigrationStep, Script, ScriptEngine};
use crate::error::{Error, Result};
use crate::options::{
    HistoryOptions, MergeOptions, RevisionOptions, DEFAULT_DOWNGRADE_TARGET,
    OFFLINE_DOWNGRADE_RANGE,
};
use log::debug;
use std::path::PathBuf;

/// Migration commands bound to one configuration
#[derive(Debug)]
pub struct Migrations<E = ScriptEngine> {
    configuration: MigrationsConfig,
    engine: E,
    capabilities: EngineCapabilities,
}

impl Migrations<ScriptEngine> {
    /// Facade over the bundled [`ScriptEngine`]
    pub fn new(configuration: MigrationsConfig) -> Self {
        Self::with_engine(configuration, ScriptEngine::default())
    }
}

impl Default for Migrations<ScriptEngine> {
    fn default() -> Self {
        Self::new(MigrationsConfig::default())
    }
}

impl<E: MigrationEngine> Migrations<E> {
    pub fn with_engine(configuration: MigrationsConfig, engine: E) -> Self {
        let capabilities = EngineCapabilities::for_version(engine.version());
        debug!(
            "Migration engine {} (edit: {}, history --indicate-current: {})",
            capabilities.version(),
            capabilities.supports_edit(),
            capabilities.supports_indicate_current()
        );

        Self {
            configuration,
            engine,
            capabilities,
        }
    }

    /// Replace the capabilities resolved from the engine version
    pub fn with_capabilities(mut self, capabilities: EngineCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn configuration(&self) -> &MigrationsConfig {
        &self.configuration
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn capabilities(&self) -> EngineCapabilities {
        self.capabilities
    }

    /// Template bundle `init` uses
    pub fn init_template(&self, multidb: bool) -> &str {
        if multidb {
            &self.configuration.multidb_template
        } else if self.configuration.async_database {
            &self.configuration.async_template
        } else {
            &self.configuration.default_template
        }
    }

    /// Create the migration environment at `script_location`
    pub async fn init(&self, multidb: bool) -> Result<PathBuf> {
        let config = self.configuration.to_engine_config();
        let template = self.init_template(multidb);
        debug!("Initializing migrations with template '{}'", template);

        self.engine
            .init(&config, &self.configuration.script_location, template)
            .await
    }

    pub async fn revision(&self, options: RevisionOptions) -> Result<Script> {
        let config = self.configuration.to_engine_config();
        self.engine.revision(&config, &options).await
    }

    /// `revision` with autogenerate always on
    pub async fn autogenerate(&self, options: RevisionOptions) -> Result<Script> {
        self.revision(options.autogenerate(true)).await
    }

    pub async fn upgrade(
        &self,
        revision: &str,
        sql: bool,
        tag: Option<&str>,
    ) -> Result<Vec<MigrationStep>> {
        let config = self.configuration.to_engine_config();
        self.engine.upgrade(&config, revision, sql, tag).await
    }

    /// Revert to `revision`
    ///
    /// In SQL mode the default `-1` target becomes the `head:-1` range,
    /// since offline runs have no database to anchor a relative target.
    pub async fn downgrade(
        &self,
        revision: &str,
        sql: bool,
        tag: Option<&str>,
    ) -> Result<Vec<MigrationStep>> {
        let config = self.configuration.to_engine_config();
        let revision = if sql && revision == DEFAULT_DOWNGRADE_TARGET {
            OFFLINE_DOWNGRADE_RANGE
        } else {
            revision
        };

        self.engine.downgrade(&config, revision, sql, tag).await
    }

    pub async fn edit(&self, revision: &str) -> Result<()> {
        if !self.capabilities.supports_edit() {
            return Err(Error::compatibility(
                "edit",
                EDIT_MIN_VERSION,
                self.capabilities.version(),
            ));
        }

        let config = self.configuration.to_engine_config();
        self.engine.edit(&config, revision).await
    }

    pub async fn merge(&self, options: MergeOptions) -> Result<Script> {
        let config = self.configuration.to_engine_config();
        self.engine.merge(&config, &options).await
    }

    pub async fn show(&self, revision: &str) -> Result<Vec<Script>> {
        let config = self.configuration.to_engine_config();
        self.engine.show(&config, revision).await
    }

    /// `indicate_current` only reaches engines that understand it
    pub async fn history(&self, options: HistoryOptions) -> Result<Vec<Script>> {
        let config = self.configuration.to_engine_config();
        let indicate_current = self
            .capabilities
            .supports_indicate_current()
            .then_some(options.indicate_current);

        self.engine
            .history(
                &config,
                options.rev_range.as_deref(),
                options.verbose,
                indicate_current,
            )
            .await
    }

    pub async fn heads(&self, verbose: bool, resolve_dependencies: bool) -> Result<Vec<Script>> {
        let config = self.configuration.to_engine_config();
        self.engine
            .heads(&config, verbose, resolve_dependencies)
            .await
    }

    pub async fn branches(&self, verbose: bool) -> Result<Vec<Script>> {
        let config = self.configuration.to_engine_config();
        self.engine.branches(&config, verbose).await
    }

    pub async fn current(&self, verbose: bool, head_only: bool) -> Result<Vec<Script>> {
        let config = self.configuration.to_engine_config();
        self.engine.current(&config, verbose, head_only).await
    }

    pub async fn stamp(&self, revision: &str, sql: bool, tag: Option<&str>) -> Result<()> {
        let config = self.configuration.to_engine_config();
        self.engine.stamp(&config, revision, sql, tag).await
    }
}
