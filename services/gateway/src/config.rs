//! Gateway runtime settings
//!
//! Defaults overridable via an optional `config.toml` and environment
//! variables prefixed with `DEX_` (nested fields separated by `__`),
//! e.g. `DEX_SERVER__LISTEN_ADDR=0.0.0.0:8080`.

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub redis_url: String,
    pub server: ServerSection,
    pub engine: EngineSection,
    pub settlement: SettlementSection,
    pub orders: OrderSection,
    /// Markets registered at startup.
    #[serde(default)]
    pub markets: Vec<MarketEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    pub listen_addr: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineSection {
    pub queue_key: String,
    pub response_channel: String,
    /// Run engine workers inside the gateway process.
    pub embedded: bool,
    pub workers: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SettlementSection {
    /// Empty endpoint selects the mock settlement client.
    pub endpoint: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrderSection {
    /// How long the taker has to return a trade signature.
    pub signature_timeout_secs: u64,
    /// Seed balance/allowance for auto-provisioned accounts, in the
    /// smallest token unit.
    pub default_balance: String,
    /// Per-connection outbound queue depth before a subscriber is
    /// considered slow and dropped.
    pub outbound_buffer: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketEntry {
    pub base_symbol: String,
    pub base_address: String,
    #[serde(default = "default_decimals")]
    pub base_decimals: u8,
    pub quote_symbol: String,
    pub quote_address: String,
    #[serde(default = "default_decimals")]
    pub quote_decimals: u8,
}

fn default_decimals() -> u8 {
    18
}

impl Settings {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .set_default("redis_url", "redis://127.0.0.1:6379/")?
            .set_default("server.listen_addr", "0.0.0.0:8080")?
            .set_default("engine.queue_key", "matching.engine")?
            .set_default("engine.response_channel", "engine.responses")?
            .set_default("engine.embedded", true)?
            .set_default("engine.workers", 4)?
            .set_default("settlement.endpoint", "")?
            .set_default("orders.signature_timeout_secs", 30)?
            .set_default("orders.default_balance", "1000000000000000000000000")?
            .set_default("orders.outbound_buffer", 256)?
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
        let settings = Settings::load().unwrap();
        assert_eq!(settings.engine.queue_key, "matching.engine");
        assert!(settings.orders.signature_timeout_secs > 0);
        assert!(settings.markets.is_empty());
    }
}
