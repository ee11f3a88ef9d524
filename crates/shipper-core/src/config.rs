//! `config.toml` parser.
//!
//! ```toml
//! [aws]
//! region = "eu-west-1"
//! access_key_id = "AKIA..."
//! secret_access_key = "..."
//!
//! [ecs]
//! task = "api"
//! service = "api-svc"
//! cluster = "prod"
//! containers = ["web=registry.local/web:v2"]
//! deregister = true
//!
//! [deploy]
//! timeout_secs = 300
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::types::{ContainerImage, InvalidContainerImage};

/// Looked up when no `--config` path is given. Optional.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to parse fixture {}: {source}", path.display())]
    Fixture {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Container(#[from] InvalidContainerImage),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    pub aws: AwsConfig,
    pub ecs: EcsConfig,
    pub deploy: DeployConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    /// Override for the ECS endpoint (local emulators, VPC endpoints).
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcsConfig {
    /// Task definition family.
    pub task: Option<String>,
    pub service: Option<String>,
    pub cluster: Option<String>,
    /// `name=image` pairs.
    pub containers: Vec<String>,
    /// Retire the superseded revision. Defaults to true.
    pub deregister: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Abort the workflow after this many seconds.
    pub timeout_secs: Option<u64>,
}

impl ShipperConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the explicit path (which must exist) or the optional default.
    ///
    /// Returns the config and the path it was read from, if any.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        if !path.exists() {
            if required {
                return Err(ConfigError::NotFound(path));
            }
            warn!(path = %path.display(), "config file not found, skipping");
            return Ok((Self::default(), None));
        }

        let config = Self::from_file(&path)?;
        info!(path = %path.display(), "using config file");
        Ok((config, Some(path)))
    }

    /// Fill unset `[aws]` values from the standard `AWS_*` variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let aws = &mut self.aws;
        for (slot, var) in [
            (&mut aws.region, "AWS_REGION"),
            (&mut aws.access_key_id, "AWS_ACCESS_KEY_ID"),
            (&mut aws.secret_access_key, "AWS_SECRET_ACCESS_KEY"),
            (&mut aws.session_token, "AWS_SESSION_TOKEN"),
        ] {
            if slot.is_none() {
                *slot = lookup(var).filter(|v| !v.is_empty());
            }
        }
        if aws.region.is_none() {
            aws.region = lookup("AWS_DEFAULT_REGION").filter(|v| !v.is_empty());
        }
    }

    /// Parsed `[ecs].containers`.
    pub fn containers(&self) -> Result<Vec<ContainerImage>, ConfigError> {
        self.ecs
            .containers
            .iter()
            .map(|pair| pair.parse().map_err(ConfigError::from))
            .collect()
    }

    pub fn deregister(&self) -> bool {
        self.ecs.deregister.unwrap_or(true)
    }
}
