//! Editor configuration.
//!
//! Loaded from `FLOWDECK_*` environment variables via the `config` crate.
//! Nested fields use `__`, e.g. `FLOWDECK_GATEWAY__BASE_URL`.

use flowdeck_gateway::GatewayConfig;
use flowdeck_workflow::TriggerType;
use serde::Deserialize;

/// Editor configuration composed from library configs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EditorConfig {
    /// Persistence service connection.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Locale for manifest labels.
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Debug run defaults.
    #[serde(default)]
    pub debug: DebugConfig,
}

/// Defaults applied to debug and execute requests.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DebugConfig {
    /// Trigger sent when the caller does not pick one.
    #[serde(default = "default_trigger")]
    pub default_trigger: TriggerType,
}

fn default_locale() -> String {
    "en_US".to_string()
}

fn default_trigger() -> TriggerType {
    TriggerType::PersonMessage
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            default_trigger: default_trigger(),
        }
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            locale: default_locale(),
            debug: DebugConfig::default(),
        }
    }
}

impl EditorConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("FLOWDECK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editor_config_has_correct_defaults() {
        let config = EditorConfig::default();
        assert_eq!(config.locale, "en_US");
        assert_eq!(config.debug.default_trigger, TriggerType::PersonMessage);
        assert_eq!(config.gateway, GatewayConfig::default());
    }

    #[test]
    fn nested_overrides_deserialize() {
        let config: EditorConfig = config::Config::builder()
            .set_override("gateway.base_url", "https://bot.example.com")
            .expect("override")
            .set_override("locale", "zh_Hans")
            .expect("override")
            .set_override("debug.default_trigger", "group_message")
            .expect("override")
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize");

        assert_eq!(config.gateway.base_url, "https://bot.example.com");
        assert_eq!(config.gateway.timeout_secs, 30);
        assert_eq!(config.locale, "zh_Hans");
        assert_eq!(config.debug.default_trigger, TriggerType::GroupMessage);
    }
}
