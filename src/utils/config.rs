// src/utils/config.rs
//! Forwarder configuration
//!
//! Values are layered, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. Optional file named by `NSM_CONFIG_FILE` (any format `config` understands)
//! 3. `NSM_`-prefixed environment variables, `__` between sections
//!    (e.g. `NSM_DELEGATE__TIMEOUT_SECS=10`)
//! 4. The unprefixed `CALLOUT` and `POD_IP` variables that existing delegate
//!    deployments already set

use crate::utils::errors::{ForwarderError, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Delegate program used when neither config nor `CALLOUT` name one
pub const DEFAULT_DELEGATE_PROGRAM: &str = "/bin/forwarder.sh";

const ENV_PREFIX: &str = "NSM";
const ENV_CONFIG_FILE: &str = "NSM_CONFIG_FILE";
const ENV_CALLOUT: &str = "CALLOUT";
const ENV_POD_IP: &str = "POD_IP";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ForwarderConfig {
    /// Name of this endpoint
    pub name: String,

    /// Network service registered with the registry
    pub network_service: String,

    /// URL of the local network service manager
    pub connect_to: String,

    /// Maximum lifetime of issued tokens, in seconds
    pub max_token_lifetime_secs: u64,

    pub delegate: DelegateConfig,

    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Delegate program settings
#[derive(Debug, Clone, Deserialize)]
pub struct DelegateConfig {
    /// Path of the callout program
    pub program: PathBuf,

    /// Upper bound for a single invocation
    pub timeout_secs: u64,

    /// Time between SIGTERM and SIGKILL when a call is abandoned
    pub kill_grace_ms: u64,
}

impl DelegateConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_DELEGATE_PROGRAM),
            timeout_secs: 30,
            kill_grace_ms: 500,
        }
    }
}

/// This node's addressing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeConfig {
    /// Advertised pod address, written verbatim into `dst_ip`
    pub pod_ip: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human readable format
    pub json: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus listener address; metrics export is off when unset
    pub listen_addr: Option<String>,
}

impl ForwarderConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Load configuration from an explicit set of environment variables
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let defaults = DelegateConfig::default();

        let mut builder = Config::builder()
            .set_default("name", "forwarder")?
            .set_default("network_service", "xconnectns")?
            .set_default("connect_to", "unix:///connect.to.socket")?
            .set_default("max_token_lifetime_secs", 24 * 60 * 60)?
            .set_default("delegate.program", DEFAULT_DELEGATE_PROGRAM)?
            .set_default("delegate.timeout_secs", defaults.timeout_secs)?
            .set_default("delegate.kill_grace_ms", defaults.kill_grace_ms)?
            .set_default("node.pod_ip", "")?
            .set_default("logging.json", false)?;

        if let Some(path) = non_empty(&vars, ENV_CONFIG_FILE) {
            builder = builder.add_source(File::with_name(&path).required(true));
        }

        let environment: HashMap<String, String> = vars
            .iter()
            .filter(|(key, _)| key.as_str() != ENV_CONFIG_FILE)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        builder = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(environment)),
            )
            .set_override_option("delegate.program", non_empty(&vars, ENV_CALLOUT))?
            .set_override_option("node.pod_ip", non_empty(&vars, ENV_POD_IP))?;

        let config: ForwarderConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.delegate.program.as_os_str().is_empty() {
            return Err(ForwarderError::ConfigError(
                "delegate.program must not be empty".into(),
            ));
        }
        if self.delegate.timeout_secs == 0 {
            return Err(ForwarderError::ConfigError(
                "delegate.timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn non_empty(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key).filter(|value| !value.is_empty()).cloned()
}
