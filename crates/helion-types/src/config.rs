//! Copyright (c) 2026 Helion Contributors
//!
//! Licensed under the MIT license. See LICENSE for details.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::tenant::TenantId;

/// Inverter vendor/model discriminator. Only selects which opaque client implementation
/// handles `RealTime`/`GetScheduler`/`ApplyScheduler`/`SetFlag`/`SetExportLimit` — the
/// manufacturer wire protocol itself stays out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InverterModel {
    Solax,
    SolaxUltra,
}

impl Default for InverterModel {
    fn default() -> Self {
        Self::Solax
    }
}

/// Geographic location used to key the weather cache.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

/// A user-configured blackout window, evaluated in the tenant's timezone. `end < start`
/// is a valid wrap-across-midnight window (see [`crate::rule::TimeWindowCondition`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlackoutWindow {
    pub start_hh: u8,
    pub start_mm: u8,
    pub end_hh: u8,
    pub end_mm: u8,
}

impl BlackoutWindow {
    /// Mirrors [`crate::rule::TimeWindowCondition::contains`]'s midnight-wrap logic over
    /// an HH:MM pair instead of a `NaiveTime`.
    pub fn contains(&self, now_local: chrono::NaiveTime) -> bool {
        use chrono::NaiveTime;
        let start = NaiveTime::from_hms_opt(self.start_hh as u32, self.start_mm as u32, 0).unwrap_or(NaiveTime::MIN);
        let end = NaiveTime::from_hms_opt(self.end_hh as u32, self.end_mm as u32, 0).unwrap_or(NaiveTime::MIN);
        if end < start {
            now_local >= start || now_local < end
        } else {
            now_local >= start && now_local < end
        }
    }
}

/// Per-tenant overrides of the global cache TTL defaults (§4.4). `None` fields fall back
/// to [`crate::cache::CacheTtlDefaults`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheTtlOverrides {
    pub inverter_telemetry_ms: Option<u64>,
    pub weather_ms: Option<u64>,
    pub price_current_ms: Option<u64>,
}

/// Curtailment settings (§4.7). `threshold` and `restore_value_w` are in the canonical,
/// feed-in-positive sign convention described in §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurtailmentConfig {
    pub enabled: bool,
    pub threshold_cents_per_kwh: f32,
    pub restore_value_w: u32,
}

impl Default for CurtailmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_cents_per_kwh: 0.0,
            restore_value_w: 10_000,
        }
    }
}

/// Per-tenant configuration document (§3 "Config"). Single document, mutated by the user
/// via the external HTTP surface (§6); the engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub uid: TenantId,
    pub automation_enabled: bool,
    pub device_serial: String,
    pub inverter_model: InverterModel,
    pub inverter_api_key: String,
    pub price_api_key: String,
    pub price_site_id: String,
    pub location: Location,
    #[serde(with = "tz_serde")]
    pub timezone: Tz,
    pub cycle_interval_ms: Option<u64>,
    pub cache_ttls: CacheTtlOverrides,
    pub blackout_windows: Vec<BlackoutWindow>,
    pub curtailment: CurtailmentConfig,
}

impl Config {
    /// Resolved per-tenant cycle interval, defaulting to the 60s driver heartbeat (§4.1).
    pub fn cycle_interval_ms(&self) -> u64 {
        self.cycle_interval_ms.unwrap_or(60_000)
    }
}

mod tz_serde {
    use chrono_tz::Tz;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(tz.name())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Tz, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse::<Tz>()
            .map_err(|e| serde::de::Error::custom(format!("invalid timezone {name}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_interval_defaults_to_sixty_seconds() {
        let cfg = Config {
            uid: TenantId::new("t1"),
            automation_enabled: true,
            device_serial: "SN1".into(),
            inverter_model: InverterModel::Solax,
            inverter_api_key: "key".into(),
            price_api_key: "key".into(),
            price_site_id: "site".into(),
            location: Location { lat: 0.0, lon: 0.0 },
            timezone: chrono_tz::UTC,
            cycle_interval_ms: None,
            cache_ttls: CacheTtlOverrides::default(),
            blackout_windows: vec![],
            curtailment: CurtailmentConfig::default(),
        };
        assert_eq!(cfg.cycle_interval_ms(), 60_000);
    }

    #[test]
    fn blackout_window_wraps_midnight() {
        let window = BlackoutWindow { start_hh: 22, start_mm: 0, end_hh: 6, end_mm: 0 };
        assert!(window.contains(chrono::NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(window.contains(chrono::NaiveTime::from_hms_opt(2, 0, 0).unwrap()));
        assert!(!window.contains(chrono::NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = Config {
            uid: TenantId::new("t1"),
            automation_enabled: true,
            device_serial: "SN1".into(),
            inverter_model: InverterModel::SolaxUltra,
            inverter_api_key: "key".into(),
            price_api_key: "key".into(),
            price_site_id: "site".into(),
            location: Location { lat: 49.2, lon: 16.6 },
            timezone: chrono_tz::Europe::Prague,
            cycle_interval_ms: Some(30_000),
            cache_ttls: CacheTtlOverrides::default(),
            blackout_windows: vec![BlackoutWindow {
                start_hh: 22,
                start_mm: 0,
                end_hh: 6,
                end_mm: 0,
            }],
            curtailment: CurtailmentConfig::default(),
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.timezone, chrono_tz::Europe::Prague);
        assert_eq!(back.cycle_interval_ms(), 30_000);
    }
}
