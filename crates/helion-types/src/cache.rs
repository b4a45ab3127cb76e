//! Copyright (c) 2026 Helion Contributors
//!
//! Licensed under the MIT license. See LICENSE for details.

use serde::{Deserialize, Serialize};

/// A cached document as stored by the persistence layer (§3 "CacheDoc types", §4.2).
/// `expires_at` is a store-side reclamation hint only; the cache layer never trusts it
/// for correctness and always re-derives freshness from `timestamp_ms + ttl_ms` (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheDoc<T> {
    pub data: T,
    pub timestamp_ms: i64,
    pub ttl_ms: u64,
    pub expires_at: i64,
}

impl<T> CacheDoc<T> {
    pub fn new(data: T, timestamp_ms: i64, ttl_ms: u64) -> Self {
        Self {
            data,
            timestamp_ms,
            ttl_ms,
            expires_at: timestamp_ms / 1000 + (ttl_ms / 1000) as i64,
        }
    }

    /// Is this document still fresh at `now_ms`? (§4.4 "Read-through with TTL", property 8)
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms - self.timestamp_ms < self.ttl_ms as i64
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.timestamp_ms
    }
}

/// Process-wide default cache TTLs (§4.4), built once at startup from configuration and
/// never mutated afterward — per-tenant overrides are merged in by field, not by
/// replacing this structure (§9 "Global mutable cache TTL constants").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheTtlDefaults {
    pub inverter_telemetry_ms: u64,
    pub weather_ms: u64,
    pub price_current_ms: u64,
    pub price_historical_ms: u64,
}

impl Default for CacheTtlDefaults {
    fn default() -> Self {
        Self {
            inverter_telemetry_ms: 5 * 60_000,
            weather_ms: 45 * 60_000,
            price_current_ms: 60_000,
            price_historical_ms: 24 * 60 * 60_000,
        }
    }
}

impl CacheTtlDefaults {
    pub fn inverter_telemetry_ms(&self, override_ms: Option<u64>) -> u64 {
        override_ms.unwrap_or(self.inverter_telemetry_ms)
    }

    pub fn weather_ms(&self, override_ms: Option<u64>) -> u64 {
        override_ms.unwrap_or(self.weather_ms)
    }

    pub fn price_current_ms(&self, override_ms: Option<u64>) -> u64 {
        override_ms.unwrap_or(self.price_current_ms)
    }
}
