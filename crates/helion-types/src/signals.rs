//! Copyright (c) 2026 Helion Contributors
//!
//! Licensed under the MIT license. See LICENSE for details.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rule::{ForecastHorizon, PriceChannel};

/// One price interval as delivered by the price client, already canonicalised: `feedIn`
/// prices have had their sign flipped so the value is positive-if-earning (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub channel: PriceChannel,
    pub per_kwh: f32,
    pub is_forecast: bool,
}

impl PriceInterval {
    pub fn covers(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// One hour of weather forecast (§4.3 "Weather client").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherHour {
    pub hour: DateTime<Utc>,
    pub solar_radiation_w_m2: f32,
    pub cloud_cover_pct: f32,
    pub uv_index: f32,
    pub temperature_c: f32,
}

/// An hourly weather sequence, as fetched for a tenant's location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub hours: Vec<WeatherHour>,
}

impl WeatherSnapshot {
    /// The hour matching the current wall-clock hour in the tenant's timezone — NOT
    /// index 0, which would be midnight (§4.3).
    pub fn hour_at(&self, instant: DateTime<Utc>) -> Option<&WeatherHour> {
        self.hours
            .iter()
            .find(|h| h.hour.date_naive() == instant.date_naive() && h.hour.hour_matches(instant))
    }

    /// Aggregate (mean) solar radiation / cloud cover / uv index over the next `hours`
    /// hours starting at `instant`, used by the `solarRadiation`/`cloudCover`/`uvIndex`
    /// conditions (§3 "Conditions").
    pub fn aggregate_next_hours(&self, instant: DateTime<Utc>, hours: u32) -> Option<WeatherHour> {
        if hours == 0 {
            return None;
        }
        let window_end = instant + chrono::Duration::hours(i64::from(hours));
        let matching: Vec<&WeatherHour> = self
            .hours
            .iter()
            .filter(|h| h.hour >= instant && h.hour < window_end)
            .collect();
        if matching.is_empty() {
            return None;
        }
        let n = matching.len() as f32;
        Some(WeatherHour {
            hour: instant,
            solar_radiation_w_m2: matching.iter().map(|h| h.solar_radiation_w_m2).sum::<f32>() / n,
            cloud_cover_pct: matching.iter().map(|h| h.cloud_cover_pct).sum::<f32>() / n,
            uv_index: matching.iter().map(|h| h.uv_index).sum::<f32>() / n,
            temperature_c: matching.iter().map(|h| h.temperature_c).sum::<f32>() / n,
        })
    }
}

trait HourMatch {
    fn hour_matches(&self, instant: DateTime<Utc>) -> bool;
}

impl HourMatch for DateTime<Utc> {
    fn hour_matches(&self, instant: DateTime<Utc>) -> bool {
        use chrono::Timelike;
        self.hour() == instant.hour()
    }
}

/// Live inverter telemetry (§4.3 "Inverter client" `RealTime`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InverterTelemetry {
    pub soc_pct: f32,
    pub battery_temp_c: f32,
    pub ambient_temp_c: f32,
    pub inverter_temp_c: f32,
    pub pv_power_w: f32,
    pub load_power_w: f32,
    pub grid_import_w: f32,
    pub feed_in_w: f32,
    pub export_limit_w: u32,
}

/// The full signal snapshot the evaluator consumes (§4.5). Built once per cycle from
/// whatever the enabled rules actually require.
#[derive(Debug, Clone)]
pub struct Signals {
    pub now_utc: DateTime<Utc>,
    pub now_local: NaiveDateTime,
    pub telemetry: InverterTelemetry,
    pub current_feed_in: Option<f32>,
    pub current_buy: Option<f32>,
    pub forecast: Vec<PriceInterval>,
    pub weather: Option<WeatherSnapshot>,
}

impl Signals {
    /// Select the forecast interval covering `now + horizon` (§4.5). `None` is `no_data`.
    pub fn forecast_at(&self, channel: PriceChannel, horizon: ForecastHorizon) -> Option<f32> {
        let target = self.now_utc + chrono::Duration::minutes(horizon.minutes());
        self.forecast
            .iter()
            .find(|interval| interval.channel == channel && interval.covers(target))
            .map(|interval| interval.per_kwh)
    }
}
