//! Configuration for the stepchain bootstrap.
//!
//! Read from TOML. Lookup order: an explicit path, then `$STEPCHAIN_CONFIG`,
//! then `~/.stepchain/config.toml`. A missing default file means defaults.
//!
//! ```toml
//! [server]
//! base_url = "http://${POOL_HOST}:8010/"
//!
//! [loader]
//! timeout_seconds = 30
//! batches = [
//!     ["//cdnjs.cloudflare.com/ajax/libs/jquery/1.11.1/jquery.min.js"],
//!     ["/ui/js/models.js"],
//! ]
//!
//! [models]
//! devices_path = "/api/device/list/?details=1"
//! pxe_configs_path = "/api/bmm/pxe_config/list/"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use stepchain_types::ResourceId;
use thiserror::Error;
use url::Url;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "STEPCHAIN_CONFIG";

const DEFAULT_BASE_URL: &str = "http://localhost:8010/";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Script batches of the admin page, in load order.
///
/// The first batch holds prerequisites of the second; the third is the
/// page's own code.
const DEFAULT_BATCHES: &[&[&str]] = &[
    &[
        "//cdnjs.cloudflare.com/ajax/libs/jquery/1.11.1/jquery.min.js",
        "//cdnjs.cloudflare.com/ajax/libs/underscore.js/1.6.0/underscore-min.js",
    ],
    &[
        "//cdnjs.cloudflare.com/ajax/libs/datatables/1.10.0/jquery.dataTables.min.js",
        "//cdnjs.cloudflare.com/ajax/libs/jqueryui/1.10.4/jquery-ui.min.js",
        "//cdnjs.cloudflare.com/ajax/libs/backbone.js/1.1.2/backbone-min.js",
    ],
    &[
        "/ui/js/models.js",
        "/ui/js/views-tables.js",
        "/ui/js/views-toolbar.js",
        "/ui/js/views-controls.js",
        "/ui/js/views-header.js",
        "/ui/js/views-logfiles.js",
        "/ui/js/controllers.js",
    ],
];

const DEFAULT_DEVICES_PATH: &str = "/api/device/list/?details=1";

const DEFAULT_PXE_CONFIGS_PATH: &str = "/api/bmm/pxe_config/list/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid server.base_url '{value}': {source}")]
    BaseUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
}

impl ConfigError {
    /// Config file the error refers to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path.as_path()),
            ConfigError::BaseUrl { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct BootConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Origin the page's resources and API are served from.
    /// `${VAR}` references are expanded from the environment.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Per-request timeout for resource and model fetches. Default: 30.
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,
    /// Script batches, loaded in order; scripts inside a batch load together.
    #[serde(default = "default_batches")]
    pub batches: Vec<Vec<ResourceId>>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_secs(),
            batches: default_batches(),
        }
    }
}

impl LoaderConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ModelsConfig {
    #[serde(default = "default_devices_path")]
    pub devices_path: String,
    #[serde(default = "default_pxe_configs_path")]
    pub pxe_configs_path: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            devices_path: default_devices_path(),
            pxe_configs_path: default_pxe_configs_path(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_batches() -> Vec<Vec<ResourceId>> {
    DEFAULT_BATCHES
        .iter()
        .map(|batch| {
            batch
                .iter()
                .filter_map(|id| ResourceId::new(*id).ok())
                .collect()
        })
        .collect()
}

fn default_devices_path() -> String {
    DEFAULT_DEVICES_PATH.to_string()
}

fn default_pxe_configs_path() -> String {
    DEFAULT_PXE_CONFIGS_PATH.to_string()
}

/// Expand `${VAR}` references from the environment. Unset variables expand
/// to the empty string; an unclosed `${` is kept literally.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Default config file location: `~/.stepchain/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".stepchain").join("config.toml"))
}

impl BootConfig {
    /// Load from `$STEPCHAIN_CONFIG` or the default location.
    ///
    /// Returns `Ok(None)` when no file is configured and the default file
    /// does not exist.
    pub fn load() -> Result<Option<(Self, PathBuf)>, ConfigError> {
        if let Some(explicit) = env::var_os(CONFIG_ENV_VAR) {
            let path = PathBuf::from(explicit);
            return Self::from_path(&path).map(|config| Some((config, path)));
        }

        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::from_path(&path).map(|config| Some((config, path)))
    }

    /// Load from an explicit file, which must exist.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {}: {source}", path.display());
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        Self::parse(&content).map_err(|source| {
            tracing::warn!("Failed to parse config at {}: {source}", path.display());
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// `server.base_url` with environment references expanded.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let value = expand_env_vars(&self.server.base_url);
        Url::parse(&value).map_err(|source| ConfigError::BaseUrl { value, source })
    }
}
