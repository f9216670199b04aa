//! Settings file loading.
//!
//! Settings are read from `GQLCOMPOSE_SETTINGS_PATH` when set, otherwise from
//! `<config dir>/gqlcompose/settings.yaml`. A missing file yields defaults.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use dirs_next::{config_dir, home_dir};
use gqlcompose_types::{EnvironmentIndicator, SchemaConfiguration, ServerDefinition};
use serde::{Deserialize, Serialize};

use crate::access::{AccessPolicy, DEFAULT_ACCESS_CAPABILITY, DEFAULT_TOKEN_HEADER};

pub const SETTINGS_PATH_ENV: &str = "GQLCOMPOSE_SETTINGS_PATH";
pub const ACCESS_TOKEN_ENV: &str = "GQLCOMPOSE_ACCESS_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub access: AccessSettings,
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default)]
    pub servers: Vec<ServerDefinition>,
    #[serde(default)]
    pub environment_indicator: Option<EnvironmentIndicator>,
    #[serde(default)]
    pub schema: SchemaConfiguration,
    /// Extension ids to install; unset installs every built-in extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            access: AccessSettings::default(),
            default_language: default_language(),
            servers: Vec::new(),
            environment_indicator: None,
            schema: SchemaConfiguration::default(),
            extensions: None,
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessSettings {
    /// Shared secret accepted in the token header; empty disables the header path.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_header")]
    pub header: String,
    #[serde(default = "default_capability")]
    pub capability: String,
}

impl std::fmt::Debug for AccessSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessSettings")
            .field("token_set", &!self.token.is_empty())
            .field("header", &self.header)
            .field("capability", &self.capability)
            .finish()
    }
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            header: default_header(),
            capability: default_capability(),
        }
    }
}

fn default_header() -> String {
    DEFAULT_TOKEN_HEADER.to_string()
}

fn default_capability() -> String {
    DEFAULT_ACCESS_CAPABILITY.to_string()
}

impl AccessSettings {
    pub fn policy(&self) -> AccessPolicy {
        AccessPolicy::new(&self.capability)
            .with_header(&self.header)
            .with_secret(&self.token)
    }
}

/// Default settings path, honoring the environment override.
pub fn default_settings_path() -> PathBuf {
    if let Ok(path) = env::var(SETTINGS_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gqlcompose")
        .join("settings.yaml")
}

pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from_path(&default_settings_path())
}

/// Loads settings from `path` (YAML or JSON by extension) and applies environment overrides.
pub fn load_settings_from_path(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = read_settings_file(path)?;
    if let Ok(token) = env::var(ACCESS_TOKEN_ENV) {
        settings.access.token = token;
    }
    Ok(settings)
}

/// Reads the settings file as written, without environment overrides.
pub fn read_settings_file(path: &Path) -> anyhow::Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(path).with_context(|| format!("failed to read settings file {}", path.display()))?;
    if is_json(path) {
        serde_json::from_str(&content).with_context(|| format!("invalid settings JSON in {}", path.display()))
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("invalid settings YAML in {}", path.display()))
    }
}

/// Writes settings to `path` in the format its extension names, creating parent directories.
pub fn save_settings(path: &Path, settings: &Settings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let content = if is_json(path) {
        serde_json::to_string_pretty(settings)?
    } else {
        serde_yaml::to_string(settings)?
    };
    fs::write(path, content).with_context(|| format!("failed to write settings file {}", path.display()))
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|extension| extension.to_str()) == Some("json")
}

fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    if trimmed == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = trimmed.strip_prefix("~/") {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(trimmed)
}
