//! Environment template bundles and handlebars rendering

use crate::engine::EngineConfig;
use crate::error::{Error, Result};
use handlebars::Handlebars;
use log::debug;
use rust_embed::RustEmbed;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(RustEmbed)]
#[folder = "templates/"]
struct BuiltinTemplates;

/// File rendered into the settings file instead of being copied
const SETTINGS_TEMPLATE: &str = "settings.toml.tmpl";

/// Directory holding revision scripts inside an environment
pub const VERSIONS_DIR: &str = "versions";

/// Revision script template inside an environment
pub const SCRIPT_TEMPLATE: &str = "script.sql.hbs";

/// Environment script inside an environment
pub const ENV_SCRIPT: &str = "env.sql";

/// Files of one template bundle, paths relative to the bundle root
#[derive(Debug)]
pub(crate) struct TemplateBundle {
    pub name: String,
    pub files: Vec<(PathBuf, Vec<u8>)>,
}

impl TemplateBundle {
    /// Load `name` from the template directory override, else from the
    /// bundles compiled into the crate
    pub fn load(config: &EngineConfig, name: &str) -> Result<Self> {
        if let Some(root) = config.template_directory() {
            let dir = root.join(name);
            if dir.is_dir() {
                debug!("Using template bundle from {}", dir.display());
                return Self::from_dir(name, &dir);
            }
        }

        let prefix = format!("{}/", name);
        let mut files = Vec::new();
        for path in BuiltinTemplates::iter() {
            let Some(relative) = path.strip_prefix(&prefix) else {
                continue;
            };
            if let Some(file) = BuiltinTemplates::get(&path) {
                files.push((PathBuf::from(relative), file.data.into_owned()));
            }
        }

        if files.is_empty() {
            return Err(Error::command(format!("No such template '{}'", name)));
        }

        Ok(Self {
            name: name.to_string(),
            files,
        })
    }

    fn from_dir(name: &str, dir: &Path) -> Result<Self> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::command(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(dir)
                .map_err(|e| Error::command(e.to_string()))?
                .to_path_buf();
            files.push((relative, fs::read(entry.path())?));
        }

        Ok(Self {
            name: name.to_string(),
            files,
        })
    }

    /// Write the bundle into `directory`
    ///
    /// The settings template is rendered to the config file name; every
    /// other file is copied as is.
    pub fn install(&self, config: &EngineConfig, directory: &Path) -> Result<()> {
        let out = config.output();
        create_dir(config, directory)?;
        create_dir(config, &directory.join(VERSIONS_DIR))?;

        let vars = SettingsVars {
            script_location: toml_string(&directory.display().to_string()),
            version_location: toml_string(&directory.join(VERSIONS_DIR).display().to_string()),
            template: self.name.clone(),
        };

        for (relative, data) in &self.files {
            if relative.as_os_str() == SETTINGS_TEMPLATE {
                let source = String::from_utf8_lossy(data);
                let rendered = render(&source, &vars)?;
                let target = config.config_file_name();
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                out.write_line(&format!("Generating {} ... done", target.display()));
                fs::write(target, rendered)?;
                continue;
            }

            let target = directory.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            out.write_line(&format!("Generating {} ... done", target.display()));
            fs::write(&target, data)?;
        }

        out.write_line(&format!(
            "Please edit configuration/connection settings in {} before proceeding.",
            config.config_file_name().display()
        ));
        Ok(())
    }
}

#[derive(Serialize)]
struct SettingsVars {
    script_location: String,
    version_location: String,
    template: String,
}

/// `value` as a quoted TOML string
fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

fn create_dir(config: &EngineConfig, path: &Path) -> Result<()> {
    config
        .output()
        .write_line(&format!("Creating directory {} ... done", path.display()));
    fs::create_dir_all(path)?;
    Ok(())
}

/// Render a handlebars template without HTML escaping
pub(crate) fn render<T: Serialize>(template: &str, data: &T) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    Ok(handlebars.render_template(template, data)?)
}
