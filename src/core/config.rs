//! Layered configuration
//!
//! Values come from the user config file (`config.yaml` in the platform
//! config directory), then the project file `.eb/config.yaml`, then
//! environment variables. Later layers override earlier ones field by field.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::core::identity::{RoleId, TenantId, UserId};
use crate::core::project::Project;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yml::Error,
    },
}

/// One config layer; absent fields leave lower layers in place
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of public row links
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,

    /// Roles whose holders bypass row visibility in their tenant
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub super_roles: Vec<RoleId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_tenant: Option<TenantId>,

    /// User to act as when none is given on the command line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserId>,
}

impl Config {
    /// Load every layer, skipping (with a warning) files that fail to parse
    pub fn load() -> Self {
        let mut config = Config::default();
        let mut paths = Vec::new();
        if let Some(global) = Self::global_path() {
            paths.push(global);
        }
        if let Ok(project) = Project::discover() {
            paths.push(project.config_path());
        }
        for path in paths {
            match Self::from_file(&path) {
                Ok(Some(layer)) => config.merge(layer),
                Ok(None) => {}
                Err(e) => warn!("{}", e),
            }
        }
        config.merge_env();
        config
    }

    /// Path of the user-level config file
    pub fn global_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "eb").map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Parse one layer; a missing file is `Ok(None)`
    pub fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(Some(Config::default()));
        }
        serde_yml::from_str(&text)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Overlay `other` on top of `self`
    pub fn merge(&mut self, other: Config) {
        if other.server_url.is_some() {
            self.server_url = other.server_url;
        }
        if !other.super_roles.is_empty() {
            self.super_roles = other.super_roles;
        }
        if other.default_tenant.is_some() {
            self.default_tenant = other.default_tenant;
        }
        if other.user.is_some() {
            self.user = other.user;
        }
    }

    fn merge_env(&mut self) {
        if let Ok(url) = std::env::var("EB_SERVER_URL") {
            if !url.trim().is_empty() {
                self.server_url = Some(url);
            }
        }
    }

    pub fn server_url(&self) -> &str {
        self.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }

    pub fn is_super_role(&self, role: &RoleId) -> bool {
        self.super_roles.contains(role)
    }
}
