//! Web configuration, read from the `web` key of the shared `wellspring.json` file with
//! opinionated defaults for missing values.

use config::{Config, ConfigError, File};
use fxhash::FxHashMap;
use serde::Deserialize;
use wellspring_context::config::CONFIG_FILE;

/// Configuration of a single dispatch unit.
#[non_exhaustive]
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DispatcherConfig {
    /// Identifier of the child context; defaults to the dispatcher name with a `-servlet`
    /// suffix.
    pub namespace: Option<String>,
    /// Explicit context id override for the child context.
    pub context_id: Option<String>,
}

/// Web layer configuration. Typically one dispatcher is enough; multiple dispatchers each get
/// their own child context.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct WebConfig {
    /// Map from dispatcher name to its config.
    pub dispatchers: FxHashMap<String, DispatcherConfig>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            dispatchers: [("default".to_string(), Default::default())]
                .into_iter()
                .collect(),
        }
    }
}

impl From<OptionalWebConfig> for WebConfig {
    fn from(value: OptionalWebConfig) -> Self {
        let default = Self::default();
        Self {
            dispatchers: value.dispatchers.unwrap_or(default.dispatchers),
        }
    }
}

impl WebConfig {
    pub fn init_from_config() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .build()
            .and_then(|config| config.try_deserialize::<OptionalWebConfigWrapper>())
            .map(|config| config.web.map(|config| config.into()).unwrap_or_default())
    }
}

#[derive(Deserialize)]
struct OptionalWebConfig {
    dispatchers: Option<FxHashMap<String, DispatcherConfig>>,
}

#[derive(Deserialize)]
struct OptionalWebConfigWrapper {
    web: Option<OptionalWebConfig>,
}

#[cfg(test)]
mod tests {
    use crate::config::WebConfig;

    #[test]
    fn should_default_to_single_dispatcher() {
        let config = WebConfig::default();

        let dispatcher = config.dispatchers.get("default").unwrap();
        assert!(dispatcher.namespace.is_none());
        assert!(dispatcher.context_id.is_none());
    }
}
