use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const ENV_PREFIX: &str = "AWX_EXPORTER_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Failed to read token file '{path}': {source}")]
    TokenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub awx: AwxConfig,
    pub prometheus: PrometheusConfig,
    pub blackbox: BlackboxConfig,
    pub alertmanager: AlertmanagerConfig,
}

/// Connection to the AWX inventory service.
#[derive(Clone, Deserialize, Serialize)]
pub struct AwxConfig {
    pub host: String,
    pub user_name: String,
    pub token: String,
    pub timeout_secs: u64,
    pub inventory_sources: Vec<String>,
}

impl Default for AwxConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            user_name: String::new(),
            token: String::new(),
            timeout_secs: 10,
            inventory_sources: Vec::new(),
        }
    }
}

impl AwxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl std::fmt::Debug for AwxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwxConfig")
            .field("host", &self.host)
            .field("user_name", &self.user_name)
            .field("token", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("inventory_sources", &self.inventory_sources)
            .finish()
    }
}

/// Keys of the variables holding scrape configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrometheusConfig {
    pub config_name: String,
    /// Lets a host's own block replace the block of its group.
    pub host_override: bool,
    pub host_name_var: String,
    pub ip_var: String,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            config_name: "prometheus_config".into(),
            host_override: false,
            host_name_var: "ansible_host".into(),
            ip_var: "ip".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlackboxConfig {
    pub config_name: String,
    /// Groups never used as the `group` label of a probe target.
    pub ignored_groups: Vec<String>,
    pub host_name_var: String,
    pub ip_var: String,
}

impl Default for BlackboxConfig {
    fn default() -> Self {
        Self {
            config_name: "blackbox_config".into(),
            ignored_groups: Vec::new(),
            host_name_var: "ansible_host".into(),
            ip_var: "ip".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertmanagerConfig {
    pub config_name: String,
    pub source_file: PathBuf,
    pub send_resolved_default: bool,
    pub require_tls_default: bool,
    /// Receivers and routes whose name starts with this prefix belong to the exporter.
    pub managed_prefix: String,
    pub notifier_type: String,
}

impl Default for AlertmanagerConfig {
    fn default() -> Self {
        Self {
            config_name: "alertmanager_config".into(),
            source_file: PathBuf::from("alertmanager.yml"),
            send_resolved_default: false,
            require_tls_default: false,
            managed_prefix: "dynamic-".into(),
            notifier_type: "email".into(),
        }
    }
}

impl Config {
    /// Loads the configuration from `path` and the environment.
    ///
    /// Defaults are overridden by the file (JSON when the extension is
    /// `.json`, TOML otherwise), which is in turn overridden by
    /// `AWX_EXPORTER_` variables using `__` between table and key.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(Config::default()));
        let figment = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => figment.merge(Json::file(path)),
            _ => figment.merge(Toml::file(path)),
        };
        let mut config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        // Support Docker-style secrets
        if let Ok(token_file) = std::env::var(format!("{}AWX_TOKEN_FILE", ENV_PREFIX)) {
            let token_file = PathBuf::from(token_file);
            config.awx.token = std::fs::read_to_string(&token_file)
                .map_err(|source| ConfigError::TokenFile {
                    path: token_file,
                    source,
                })?
                .trim()
                .to_string();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.awx.host.trim().is_empty() {
            return Err(ConfigError::Invalid("awx.host must be set".into()));
        }
        if self.awx.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "awx.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.alertmanager.managed_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "alertmanager.managed_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }
}
