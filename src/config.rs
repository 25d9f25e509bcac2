//! Query configuration.
//!
//! [`QueryConfig`] is read from the `[query]` table of `config/config.toml`
//! and from `LIFEQUERY__QUERY__*` environment variables using
//! `QueryConfig::load()`.

use crate::expr::typed::NullOrdering;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "config/config.toml";
const ENV_PREFIX: &str = "LIFEQUERY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct QueryConfig {
    /// Null ordering for order specs that do not choose one
    #[serde(default = "default_null_ordering")]
    pub default_null_ordering: NullOrdering,
    /// Log every statement at debug level
    #[serde(default = "default_log_statements")]
    pub log_statements: bool,
}

fn default_null_ordering() -> NullOrdering {
    NullOrdering::Last
}

fn default_log_statements() -> bool {
    true
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_null_ordering: default_null_ordering(),
            log_statements: default_log_statements(),
        }
    }
}

impl QueryConfig {
    /// Load the query configuration from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // Unreadable or malformed file: retry with env only
                if std::path::Path::new(CONFIG_FILE).exists() {
                    log::warn!("failed to load {CONFIG_FILE}, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        Self::from_settings(&settings)
    }

    /// Extract the `query` section; a missing section yields the defaults.
    pub fn from_settings(settings: &Config) -> Result<Self, ConfigError> {
        match settings.get::<QueryConfig>("query") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Query configuration could not be loaded from file or environment: {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn settings(toml: &str) -> Config {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
    }

    #[test]
    fn test_defaults_when_section_missing() {
        let cfg = QueryConfig::from_settings(&settings("")).unwrap();
        assert_eq!(cfg, QueryConfig::default());
        assert_eq!(cfg.default_null_ordering, NullOrdering::Last);
        assert!(cfg.log_statements);
    }

    #[test]
    fn test_reads_query_section() {
        let cfg = QueryConfig::from_settings(&settings(
            "[query]\ndefault_null_ordering = \"first\"\nlog_statements = false\n",
        ))
        .unwrap();
        assert_eq!(cfg.default_null_ordering, NullOrdering::First);
        assert!(!cfg.log_statements);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let cfg = QueryConfig::from_settings(&settings("[query]\nlog_statements = false\n")).unwrap();
        assert_eq!(cfg.default_null_ordering, NullOrdering::Last);
    }

    #[test]
    fn test_invalid_value_is_an_error() {
        let result = QueryConfig::from_settings(&settings(
            "[query]\ndefault_null_ordering = \"sideways\"\n",
        ));
        assert!(result.is_err());
    }
}
