// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// Process-wide server configuration (§10.3), loaded once at startup from a TOML file.
// Per-tenant values (credentials, cache TTL overrides, cycle interval) live in the store's
// `Config` documents and are merged in at cycle time, not here.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use helion_core::driver::DriverEndpoints;
use helion_types::cache::CacheTtlDefaults;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub endpoints: EndpointSettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointSettings {
    pub inverter_base_url: String,
    pub price_base_url: String,
    pub weather_base_url: String,
    pub weather_api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_cycle_deadline_ms")]
    pub cycle_deadline_ms: u64,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default)]
    pub cache_ttls: CacheTtlSettings,
}

/// Mirrors [`CacheTtlDefaults`] field-for-field so the TOML shape stays flat; converted
/// once at startup (§9 "Global mutable cache TTL constants" — a typed structure built at
/// startup, never a process-wide mutable singleton).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CacheTtlSettings {
    #[serde(default = "default_inverter_telemetry_ms")]
    pub inverter_telemetry_ms: u64,
    #[serde(default = "default_weather_ms")]
    pub weather_ms: u64,
    #[serde(default = "default_price_current_ms")]
    pub price_current_ms: u64,
    #[serde(default = "default_price_historical_ms")]
    pub price_historical_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8200
}

fn default_cycle_deadline_ms() -> u64 {
    50_000
}

fn default_tick_interval_secs() -> u64 {
    60
}

fn default_inverter_telemetry_ms() -> u64 {
    CacheTtlDefaults::default().inverter_telemetry_ms
}

fn default_weather_ms() -> u64 {
    CacheTtlDefaults::default().weather_ms
}

fn default_price_current_ms() -> u64 {
    CacheTtlDefaults::default().price_current_ms
}

fn default_price_historical_ms() -> u64 {
    CacheTtlDefaults::default().price_historical_ms
}

fn default_db_path() -> String {
    "./data/helion.db".to_owned()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cycle_deadline_ms: default_cycle_deadline_ms(),
            tick_interval_secs: default_tick_interval_secs(),
            cache_ttls: CacheTtlSettings::default(),
        }
    }
}

impl Default for CacheTtlSettings {
    fn default() -> Self {
        Self {
            inverter_telemetry_ms: default_inverter_telemetry_ms(),
            weather_ms: default_weather_ms(),
            price_current_ms: default_price_current_ms(),
            price_historical_ms: default_price_historical_ms(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

impl ServerConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("failed to read config file: {path}"))?;
        let config: Self = toml::from_str(&content).with_context(|| "failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.endpoints.inverter_base_url.is_empty() {
            bail!("endpoints.inverter_base_url must be set");
        }
        if self.endpoints.price_base_url.is_empty() {
            bail!("endpoints.price_base_url must be set");
        }
        if self.endpoints.weather_base_url.is_empty() {
            bail!("endpoints.weather_base_url must be set");
        }
        Ok(())
    }

    pub fn driver_endpoints(&self) -> DriverEndpoints {
        DriverEndpoints {
            inverter_base_url: self.endpoints.inverter_base_url.clone(),
            price_base_url: self.endpoints.price_base_url.clone(),
            weather_base_url: self.endpoints.weather_base_url.clone(),
            weather_api_key: self.endpoints.weather_api_key.clone(),
        }
    }

    pub fn cache_ttl_defaults(&self) -> CacheTtlDefaults {
        CacheTtlDefaults {
            inverter_telemetry_ms: self.engine.cache_ttls.inverter_telemetry_ms,
            weather_ms: self.engine.cache_ttls.weather_ms,
            price_current_ms: self.engine.cache_ttls.price_current_ms,
            price_historical_ms: self.engine.cache_ttls.price_historical_ms,
        }
    }
}
