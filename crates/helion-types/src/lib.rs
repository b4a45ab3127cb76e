// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.

//! Shared domain types for the Helion automation engine: tenants, config, rules,
//! signals, the 8-slot scheduler, automation/curtailment/quick-control state, audit
//! records, and cache documents. No behaviour lives here — see `helion-core`.

pub mod audit;
pub mod cache;
pub mod config;
pub mod evaluation;
pub mod metrics;
pub mod rule;
pub mod scheduler;
pub mod signals;
pub mod state;
pub mod tenant;

pub use audit::{ActionTaken, AuditEntry, AuditSeverity};
pub use cache::{CacheDoc, CacheTtlDefaults};
pub use config::{
    BlackoutWindow, CacheTtlOverrides, Config, CurtailmentConfig, InverterModel, Location,
};
pub use evaluation::{ConditionResult, EvalReason, RuleEvaluation, TriState};
pub use metrics::ApiCallCounter;
pub use rule::{
    Conditions, ForecastHorizon, ForecastPriceCondition, NumericCondition, Operator,
    PriceChannel, Rule, RuleAction, TimeWindowCondition, WorkMode,
};
pub use scheduler::{Segment, Slot, SLOT_COUNT};
pub use signals::{InverterTelemetry, PriceInterval, Signals, WeatherHour, WeatherSnapshot};
pub use state::{AutomationState, CurtailmentState, QuickControlOverride};
pub use tenant::TenantId;
