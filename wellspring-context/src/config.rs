//! Context configuration layered from opinionated defaults, the `wellspring.json` file, and
//! `WELLSPRING_`-prefixed environment variables.

use config::{Config, ConfigError, Environment as ConfigEnvironment, File};
use serde::Deserialize;
use std::collections::HashMap;

const CONFIG_ENV_PREFIX: &str = "WELLSPRING";

/// Name of the default config file.
pub const CONFIG_FILE: &str = "wellspring.json";

/// Configuration for an [ApplicationContext](crate::context::ApplicationContext).
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct ContextConfig {
    /// Identifier used in logs and lifecycle events.
    pub context_id: String,
    /// Should a default tracing logger be installed when the context is built.
    pub install_tracing_logger: bool,
    /// Inline properties exposed through the context environment with the highest precedence.
    pub properties: HashMap<String, String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            context_id: "wellspring".to_string(),
            install_tracing_logger: true,
            properties: HashMap::new(),
        }
    }
}

impl From<OptionalContextConfig> for ContextConfig {
    fn from(value: OptionalContextConfig) -> Self {
        let default = Self::default();
        Self {
            context_id: value.context_id.unwrap_or(default.context_id),
            install_tracing_logger: value
                .install_tracing_logger
                .unwrap_or(default.install_tracing_logger),
            properties: value.properties.unwrap_or(default.properties),
        }
    }
}

impl ContextConfig {
    pub fn init_from_environment() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(ConfigEnvironment::with_prefix(CONFIG_ENV_PREFIX))
            .build()
            .and_then(|config| config.try_deserialize::<OptionalContextConfig>())
            .map(|config| config.into())
    }
}

/// Installs a default tracing logger reading its filter from `RUST_LOG`.
pub fn install_tracing_logger() {
    use tracing_subscriber::util::SubscriberInitExt;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish()
        .try_init();
}

#[derive(Deserialize)]
struct OptionalContextConfig {
    context_id: Option<String>,
    install_tracing_logger: Option<bool>,
    properties: Option<HashMap<String, String>>,
}
