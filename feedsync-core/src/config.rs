//! User configuration: which feeds go into which calendars.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat};
use serde::Deserialize;

use crate::constants::{APP_NAME, DEFAULT_COLLECTION_ROOT};
use crate::error::{FeedSyncError, FeedSyncResult};
use crate::filter::FilterRule;
use crate::store::CalendarSelector;
use crate::sync::Project;

fn default_collection_root() -> String {
    DEFAULT_COLLECTION_ROOT.to_string()
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSyncConfig {
    /// Radicale user owning the calendars.
    pub user: String,

    #[serde(default = "default_collection_root")]
    pub collection_root: String,

    /// Log file; logs go to stderr when unset.
    #[serde(default)]
    pub logfile: Option<String>,

    /// Level used when neither `RUST_LOG` nor `--log-level` is given.
    #[serde(default)]
    pub loglevel: Option<String>,

    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
}

/// One `[projects.<name>]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub url: String,
    pub cal_id: String,
    pub strategy: String,

    #[serde(default)]
    pub filter: Vec<FilterRule>,

    /// Rebuild UIDs from start time and summary (for feeds with unstable UIDs).
    #[serde(default)]
    pub fix_uid: bool,
}

impl ProjectConfig {
    pub fn project(&self, name: &str) -> FeedSyncResult<Project> {
        Ok(Project::new(name, &self.strategy, self.filter.clone())?.with_fix_uid(self.fix_uid))
    }

    pub fn calendar(&self) -> FeedSyncResult<CalendarSelector> {
        self.cal_id.parse()
    }
}

impl FeedSyncConfig {
    /// Places searched for a config file when none is given, in order.
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join(APP_NAME).join("config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(format!(".{APP_NAME}.toml")));
        }
        paths.push(PathBuf::from("config.toml"));
        paths
    }

    /// The file to load: `explicit` if given, else the first default path that exists.
    pub fn locate(explicit: Option<&Path>) -> FeedSyncResult<PathBuf> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(FeedSyncError::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            return Ok(path.to_path_buf());
        }

        let candidates = Self::default_paths();
        candidates
            .iter()
            .find(|p| p.exists())
            .cloned()
            .ok_or_else(|| {
                let searched: Vec<String> =
                    candidates.iter().map(|p| p.display().to_string()).collect();
                FeedSyncError::Config(format!(
                    "no config file found (searched {})",
                    searched.join(", ")
                ))
            })
    }

    pub fn load(explicit: Option<&Path>) -> FeedSyncResult<Self> {
        let path = Self::locate(explicit)?;
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> FeedSyncResult<Self> {
        Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .build()
            .map_err(|e| FeedSyncError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| FeedSyncError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> FeedSyncResult<Self> {
        Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .map_err(|e| FeedSyncError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| FeedSyncError::Config(e.to_string()))
    }

    /// `<collection_root>/<user>`, with `~` expanded.
    pub fn user_dir(&self) -> PathBuf {
        let root = shellexpand::tilde(&self.collection_root).into_owned();
        PathBuf::from(root).join(&self.user)
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.logfile
            .as_deref()
            .map(|path| PathBuf::from(shellexpand::tilde(path).into_owned()))
    }

    /// `loglevel` as a tracing filter directive (`WARNING` becomes `warn`).
    pub fn log_level(&self) -> Option<String> {
        let level = self.loglevel.as_deref()?.trim().to_ascii_lowercase();
        let level = match level.as_str() {
            "warning" => "warn".to_string(),
            "critical" | "fatal" => "error".to_string(),
            _ => level,
        };
        Some(level)
    }

    pub fn project(&self, name: &str) -> FeedSyncResult<(&ProjectConfig, Project)> {
        let config = self.projects.get(name).ok_or_else(|| {
            let available: Vec<&str> = self.projects.keys().map(String::as_str).collect();
            FeedSyncError::Config(format!(
                "project '{name}' not found. Available: {}",
                available.join(", ")
            ))
        })?;
        Ok((config, config.project(name)?))
    }
}
