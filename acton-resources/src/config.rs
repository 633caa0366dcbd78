//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: ACTON_, sections split by `__`,
//!    e.g. `ACTON_RESOURCES__MAX_PER_PAGE=50` or `ACTON_SERVICE__LOG_LEVEL=debug`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/acton-resources/{service_name}/config.toml
//! 4. System directory: /etc/acton-resources/{service_name}/config.toml
//! 5. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::resources::{ListLimits, DEFAULT_PER_PAGE, MAX_PER_PAGE};

/// Prefix of environment overrides
const ENV_PREFIX: &str = "ACTON_";

/// Separates a section from its key; single underscores stay inside key names
const ENV_SEPARATOR: &str = "__";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Resource layer configuration
    #[serde(default)]
    pub resources: ResourcesConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl ServiceConfig {
    /// Request timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Listing and request-body limits for resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// Page size when a listing does not ask for one
    #[serde(default = "default_per_page")]
    pub default_per_page: u32,

    /// Largest page size a listing may ask for
    #[serde(default = "default_max_per_page")]
    pub max_per_page: u32,

    /// Request body size limit in MB
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
}

impl ResourcesConfig {
    /// Listing limits handed to every request
    pub fn list_limits(&self) -> ListLimits {
        ListLimits {
            default_per_page: self.default_per_page.clamp(1, self.max_per_page.max(1)),
            max_per_page: self.max_per_page.max(1),
        }
    }

    /// Body limit in bytes
    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            default_per_page: default_per_page(),
            max_per_page: default_max_per_page(),
            body_limit_mb: default_body_limit_mb(),
        }
    }
}

// Default value functions
fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

fn default_max_per_page() -> u32 {
    MAX_PER_PAGE
}

fn default_body_limit_mb() -> usize {
    10 // 10 MB
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Searches for config files in this order (first found is used):
    /// 1. Current working directory: ./config.toml
    /// 2. XDG config directory: ~/.config/acton-resources/{service_name}/config.toml
    /// 3. System directory: /etc/acton-resources/{service_name}/config.toml
    ///
    /// Environment variables (ACTON_ prefix, `__` between section and key)
    /// override all file-based configs.
    pub fn load() -> Result<Self> {
        // Try to infer service name from binary name or use default
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "acton-resources".to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so higher priority files override
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Self::env_overrides(ENV_PREFIX));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// This bypasses XDG directories and loads directly from the given path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::layered_from(path.as_ref(), Self::env_overrides(ENV_PREFIX))
    }

    fn layered_from(path: &Path, env: Env) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(env)
            .extract()?;

        Ok(config)
    }

    fn env_overrides(prefix: &str) -> Env {
        Env::prefixed(prefix).split(ENV_SEPARATOR)
    }

    /// Find all possible config file paths for a service, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix("acton-resources");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Some(path) = xdg_dirs.find_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc/acton-resources")
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }

    /// Listing limits for resources served under this configuration
    pub fn list_limits(&self) -> ListLimits {
        self.resources.list_limits()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "acton-resources".to_string(),
                port: default_port(),
                log_level: default_log_level(),
                timeout_secs: default_timeout(),
                environment: default_environment(),
            },
            resources: ResourcesConfig::default(),
        }
    }
}
