//! Small JSON preference blob.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub budget_alert_threshold: u8,
    pub default_task_priority: u8,
    pub auto_archive_completed: bool,
    pub notifications_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            budget_alert_threshold: 90,
            default_task_priority: 3,
            auto_archive_completed: false,
            notifications_enabled: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode preferences: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("unknown preference: {0}")]
    UnknownKey(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl Preferences {
    /// Set one field from its textual form. Keys accept `snake_case` or
    /// `kebab-case`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), PreferencesError> {
        let normalized = key.trim().replace('-', "_");
        let invalid = || PreferencesError::InvalidValue {
            key: normalized.clone(),
            value: value.to_string(),
        };
        match normalized.as_str() {
            "budget_alert_threshold" => {
                let threshold = value.trim().parse::<u8>().map_err(|_| invalid())?;
                if threshold > 100 {
                    return Err(invalid());
                }
                self.budget_alert_threshold = threshold;
            }
            "default_task_priority" => {
                let priority = value.trim().parse::<u8>().map_err(|_| invalid())?;
                if !(1..=5).contains(&priority) {
                    return Err(invalid());
                }
                self.default_task_priority = priority;
            }
            "auto_archive_completed" => {
                self.auto_archive_completed = parse_bool(value).ok_or_else(invalid)?;
            }
            "notifications_enabled" => {
                self.notifications_enabled = parse_bool(value).ok_or_else(invalid)?;
            }
            _ => return Err(PreferencesError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Clone, Debug)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored values over defaults. A missing or unreadable blob yields the
    /// defaults.
    pub fn load(&self) -> Preferences {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Preferences::default();
            }
            Err(error) => {
                warn!(path = %self.path.display(), "failed to read preferences: {}", error);
                return Preferences::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(preferences) => preferences,
            Err(error) => {
                warn!(path = %self.path.display(), "ignoring corrupt preferences: {}", error);
                Preferences::default()
            }
        }
    }

    pub fn save(&self, preferences: &Preferences) -> Result<(), PreferencesError> {
        let encoded = serde_json::to_string_pretty(preferences)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| PreferencesError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.path, encoded).map_err(|source| PreferencesError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Load, set one key, save, and return the result.
    pub fn update(&self, key: &str, value: &str) -> Result<Preferences, PreferencesError> {
        let mut preferences = self.load();
        preferences.set(key, value)?;
        self.save(&preferences)?;
        Ok(preferences)
    }
}
