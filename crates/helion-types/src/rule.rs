//! Copyright (c) 2026 Helion Contributors
//!
//! Licensed under the MIT license. See LICENSE for details.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tenant::TenantId;

/// Inverter work mode requested by a rule's action (§3 "Rule").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum WorkMode {
    SelfUse,
    ForceDischarge,
    ForceCharge,
    Backup,
}

/// Numeric comparison operator used by every threshold condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = ">")]
    Gt,
}

impl Operator {
    /// Evaluate `actual <op> target`. NaN on either side is never "met" (callers should
    /// have already turned NaN into `no_data` before reaching here; see §4.5).
    pub fn eval(self, actual: f32, target: f32) -> bool {
        if actual.is_nan() || target.is_nan() {
            return false;
        }
        match self {
            Operator::Lt => actual < target,
            Operator::Le => actual <= target,
            Operator::Eq => (actual - target).abs() < f32::EPSILON,
            Operator::Ge => actual >= target,
            Operator::Gt => actual > target,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Eq => "=",
            Operator::Ge => ">=",
            Operator::Gt => ">",
        }
    }
}

/// A threshold predicate over a single numeric signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericCondition {
    pub operator: Operator,
    pub value: f32,
}

/// Which price channel a [`ForecastPriceCondition`] looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PriceChannel {
    FeedIn,
    Buy,
}

/// Allowed forecast lookahead horizons (§3 "Conditions" / `forecastPrice`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForecastHorizon {
    #[serde(rename = "15")]
    FifteenMinutes = 15,
    #[serde(rename = "30")]
    ThirtyMinutes = 30,
    #[serde(rename = "60")]
    SixtyMinutes = 60,
}

impl ForecastHorizon {
    pub fn minutes(self) -> i64 {
        self as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPriceCondition {
    pub channel: PriceChannel,
    pub horizon: ForecastHorizon,
    pub operator: Operator,
    pub value: f32,
}

/// A daily time-of-day window, in the tenant's configured timezone. `end < start` wraps
/// across midnight (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindowCondition {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindowCondition {
    pub fn contains(&self, now_local: NaiveTime) -> bool {
        if self.end < self.start {
            now_local >= self.start || now_local < self.end
        } else {
            now_local >= self.start && now_local < self.end
        }
    }
}

/// The set of optional predicates a rule may combine. Each field is independently
/// present-or-absent; an absent condition neither contributes to `allMet` nor appears in
/// the evaluator's per-condition output (§4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conditions {
    pub feed_in_price: Option<NumericCondition>,
    pub buy_price: Option<NumericCondition>,
    pub forecast_price: Option<ForecastPriceCondition>,
    pub soc: Option<NumericCondition>,
    pub battery_temp: Option<NumericCondition>,
    pub ambient_temp: Option<NumericCondition>,
    pub inverter_temp: Option<NumericCondition>,
    pub solar_radiation: Option<NumericCondition>,
    pub cloud_cover: Option<NumericCondition>,
    pub uv_index: Option<NumericCondition>,
    pub time: Option<TimeWindowCondition>,
}

impl Conditions {
    /// Whether any enabled condition needs price data (current or forecast).
    pub fn needs_prices(&self) -> bool {
        self.feed_in_price.is_some() || self.buy_price.is_some() || self.forecast_price.is_some()
    }

    /// Whether any enabled condition needs weather data.
    pub fn needs_weather(&self) -> bool {
        self.solar_radiation.is_some() || self.cloud_cover.is_some() || self.uv_index.is_some()
    }
}

/// What the inverter should be commanded to do while this rule is active (§3 "Rule").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleAction {
    pub work_mode: WorkMode,
    pub duration_minutes: u32,
    pub discharge_power_w: u32,
    pub target_min_soc: f32,
    pub max_soc: f32,
}

/// A user-authored automation rule (§3 "Rule"). The engine only reads rules and clears
/// `last_triggered`/`clear_segments_on_next_cycle`; all other mutation happens through the
/// CRUD surface (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub uid: TenantId,
    pub rule_id: String,
    pub name: String,
    pub priority: u32,
    pub enabled: bool,
    pub cooldown_minutes: u32,
    pub conditions: Conditions,
    pub action: RuleAction,
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clear_segments_on_next_cycle: bool,
}

impl Rule {
    pub fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.last_triggered {
            None => true,
            Some(last) => (now - last).num_milliseconds() >= i64::from(self.cooldown_minutes) * 60_000,
        }
    }

    /// Maximum weather lookahead this rule's weather conditions require, rounded up to
    /// whole hours, clamped to `[1, 12]` (§3 "Conditions", §4.4 "Weather over-fetch").
    pub fn weather_horizon_hours(&self) -> u32 {
        if !self.conditions.needs_weather() {
            return 0;
        }
        let hours = self.action.duration_minutes.div_ceil(60);
        hours.clamp(1, 12)
    }
}
