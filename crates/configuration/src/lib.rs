use crate::error::ConfigError;
pub use crate::settings::Config;
use rust_decimal::Decimal;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{
    BrokerSettings, EngineSettings, MarketDataSettings, OpeningRangeParams, PaperSettings,
    RiskSettings, SimFeedSettings, StoreBackend, StoreSettings, Strategies, VwapMomentumParams,
};

/// Loads the application configuration from the `config.toml` file.
///
/// This function is the primary entry point for this crate. It reads the configuration file,
/// deserializes it into our strongly-typed `Config` struct, and returns it.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from("config.toml")
}

/// Loads the configuration from an explicit path. Used by the CLI's
/// `--config` flag and by tests.
pub fn load_config_from(path: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path))
        // Optionally, one could add environment variables here as well.
        // .add_source(config::Environment::with_prefix("OPENBELL"));
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    validate(&config)?;

    Ok(config)
}

/// Rejects configurations that would make the engine misbehave quietly.
fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.engine.owner_id.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "engine.owner_id must not be empty".to_string(),
        ));
    }
    if config.engine.paper_sweep_interval_secs == 0 || config.engine.live_sync_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine sweep intervals must be positive".to_string(),
        ));
    }
    if config.market_data.sim.tick_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "market_data.sim.tick_interval_ms must be positive".to_string(),
        ));
    }
    if config.market_data.sim.max_step_pct <= Decimal::ZERO {
        return Err(ConfigError::ValidationError(
            "market_data.sim.max_step_pct must be positive".to_string(),
        ));
    }
    if config.risk.capital_base <= Decimal::ZERO {
        return Err(ConfigError::ValidationError(
            "risk.capital_base must be positive".to_string(),
        ));
    }
    if config.paper.starting_balance <= Decimal::ZERO {
        return Err(ConfigError::ValidationError(
            "paper.starting_balance must be positive".to_string(),
        ));
    }
    if config.store.backend == StoreBackend::Postgres
        && config.store.database_url.is_none()
        && std::env::var("DATABASE_URL").is_err()
    {
        return Err(ConfigError::ValidationError(
            "store.database_url (or DATABASE_URL) is required for the postgres backend"
                .to_string(),
        ));
    }
    Ok(())
}
