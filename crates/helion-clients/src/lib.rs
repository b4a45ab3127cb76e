// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// The external client pool (§4.3): inverter, price, and weather clients, each wrapped
// with the same retry + circuit-breaker harness. A `ClientPool` bundles one of each plus
// their independent per-provider breakers so a tenant's cycle only needs to hold one
// handle.

pub mod circuit_breaker;
pub mod error;
pub mod inverter;
pub mod price;
pub mod retry;
pub mod signing;
pub mod weather;

use std::time::Duration;

pub use circuit_breaker::CircuitBreaker;
pub use error::{ClientError, ClientResult};
pub use inverter::{CallOrigin, InverterClient, RealTimeReading};
pub use price::PriceClient;
pub use weather::WeatherClient;

/// The three external clients plus their independent circuit breakers, one set per
/// deployment (providers are shared across tenants; breaker state is per-provider, not
/// per-tenant, per §4.3).
pub struct ClientPool {
    pub inverter: InverterClient,
    pub price: PriceClient,
    pub weather: WeatherClient,
    pub inverter_breaker: CircuitBreaker,
    pub price_breaker: CircuitBreaker,
    pub weather_breaker: CircuitBreaker,
}

impl ClientPool {
    pub fn new(
        inverter_base_url: impl Into<String>,
        inverter_token: impl Into<String>,
        price_base_url: impl Into<String>,
        price_token: impl Into<String>,
        weather_base_url: impl Into<String>,
        weather_token: impl Into<String>,
    ) -> ClientResult<Self> {
        let cooldown = Duration::from_secs(60);
        Ok(Self {
            inverter: InverterClient::new(inverter_base_url, inverter_token)?,
            price: PriceClient::new(price_base_url, price_token)?,
            weather: WeatherClient::new(weather_base_url, weather_token)?,
            inverter_breaker: CircuitBreaker::new("inverter", 5, cooldown),
            price_breaker: CircuitBreaker::new("price", 5, cooldown),
            weather_breaker: CircuitBreaker::new("weather", 5, cooldown),
        })
    }
}
