//! Engine runtime settings
//!
//! Defaults overridable via an optional `config.toml` and environment
//! variables prefixed with `DEX_` (nested fields separated by `__`), e.g.
//! `DEX_ENGINE__WORKERS=4`.

use serde::Deserialize;

/// Settings for a standalone engine worker process.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineSettings {
    pub redis_url: String,
    pub engine: EngineSection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineSection {
    /// Work queue key.
    pub queue_key: String,
    /// Pub/sub channel for engine responses.
    pub response_channel: String,
    /// Shard worker count; pairs hash onto shards.
    pub workers: usize,
}

impl EngineSettings {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .set_default("redis_url", "redis://127.0.0.1:6379/")?
            .set_default("engine.queue_key", crate::queue::ENGINE_QUEUE_KEY)?
            .set_default(
                "engine.response_channel",
                crate::publisher::RESPONSE_CHANNEL,
            )?
            .set_default("engine.workers", 4)?
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("DEX")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load() {
        let settings = EngineSettings::load().unwrap();
        assert_eq!(settings.engine.queue_key, "matching.engine");
        assert!(settings.engine.workers >= 1);
    }
}
