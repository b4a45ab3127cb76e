// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// Pure, side-effect-free rule evaluation (§4.5). No I/O, no clock reads beyond what's
// already in the `Signals` snapshot — this module is exhaustively unit-testable without
// mocks.

use helion_types::evaluation::{ConditionResult, EvalReason, RuleEvaluation, TriState};
use helion_types::rule::{Conditions, NumericCondition, Operator, Rule};
use helion_types::signals::Signals;

/// Evaluate one rule's conditions against a signal snapshot. An absent (disabled)
/// condition neither contributes to `allMet` nor appears in the per-condition output
/// (§4.5). Any enabled condition returning `no_data` forces the rule's overall result to
/// `Indeterminate`, distinct from `NotMet`.
pub fn evaluate(rule: &Rule, signals: &Signals) -> RuleEvaluation {
    let mut results = Vec::new();
    let mut any_no_data = false;
    let mut all_met = true;

    let Conditions {
        feed_in_price,
        buy_price,
        forecast_price,
        soc,
        battery_temp,
        ambient_temp,
        inverter_temp,
        solar_radiation,
        cloud_cover,
        uv_index,
        time,
    } = &rule.conditions;

    if let Some(cond) = feed_in_price {
        eval_numeric("feedInPrice", *cond, signals.current_feed_in, &mut results, &mut any_no_data, &mut all_met);
    }
    if let Some(cond) = buy_price {
        eval_numeric("buyPrice", *cond, signals.current_buy, &mut results, &mut any_no_data, &mut all_met);
    }
    if let Some(cond) = forecast_price {
        let actual = signals.forecast_at(cond.channel, cond.horizon);
        eval_numeric(
            "forecastPrice",
            NumericCondition { operator: cond.operator, value: cond.value },
            actual,
            &mut results,
            &mut any_no_data,
            &mut all_met,
        );
    }
    if let Some(cond) = soc {
        eval_numeric("soc", *cond, Some(signals.telemetry.soc_pct), &mut results, &mut any_no_data, &mut all_met);
    }
    if let Some(cond) = battery_temp {
        eval_numeric("batteryTemp", *cond, Some(signals.telemetry.battery_temp_c), &mut results, &mut any_no_data, &mut all_met);
    }
    if let Some(cond) = ambient_temp {
        eval_numeric("ambientTemp", *cond, Some(signals.telemetry.ambient_temp_c), &mut results, &mut any_no_data, &mut all_met);
    }
    if let Some(cond) = inverter_temp {
        eval_numeric("inverterTemp", *cond, Some(signals.telemetry.inverter_temp_c), &mut results, &mut any_no_data, &mut all_met);
    }
    if let Some(cond) = solar_radiation {
        let actual = weather_aggregate(rule, signals).map(|w| w.solar_radiation_w_m2);
        eval_numeric("solarRadiation", *cond, actual, &mut results, &mut any_no_data, &mut all_met);
    }
    if let Some(cond) = cloud_cover {
        let actual = weather_aggregate(rule, signals).map(|w| w.cloud_cover_pct);
        eval_numeric("cloudCover", *cond, actual, &mut results, &mut any_no_data, &mut all_met);
    }
    if let Some(cond) = uv_index {
        let actual = weather_aggregate(rule, signals).map(|w| w.uv_index);
        eval_numeric("uvIndex", *cond, actual, &mut results, &mut any_no_data, &mut all_met);
    }
    if let Some(window) = time {
        let met = window.contains(signals.now_local.time());
        results.push(ConditionResult {
            name: "time".into(),
            met,
            actual: None,
            target: None,
            reason: if met { EvalReason::Ok } else { EvalReason::TimeOutOfWindow },
        });
        all_met &= met;
    }

    let all_met = if any_no_data {
        TriState::Indeterminate
    } else if all_met {
        TriState::Met
    } else {
        TriState::NotMet
    };

    RuleEvaluation {
        rule_id: rule.rule_id.clone(),
        rule_name: rule.name.clone(),
        priority: rule.priority,
        all_met,
        conditions: results,
        skipped_invalid_config: None,
    }
}

fn weather_aggregate(rule: &Rule, signals: &Signals) -> Option<helion_types::signals::WeatherHour> {
    let snapshot = signals.weather.as_ref()?;
    snapshot.aggregate_next_hours(signals.now_utc, rule.weather_horizon_hours())
}

fn eval_numeric(
    name: &str,
    cond: NumericCondition,
    actual: Option<f32>,
    results: &mut Vec<ConditionResult>,
    any_no_data: &mut bool,
    all_met: &mut bool,
) {
    let (met, reason) = match actual {
        None => (false, EvalReason::NoData),
        Some(v) if v.is_nan() => (false, EvalReason::NoData),
        Some(v) => {
            let met = cond.operator.eval(v, cond.value);
            (met, if met { EvalReason::Ok } else { EvalReason::ThresholdNotMet })
        }
    };
    if reason == EvalReason::NoData {
        *any_no_data = true;
    }
    *all_met &= met;
    results.push(ConditionResult {
        name: name.to_string(),
        met,
        actual,
        target: Some(cond.value),
        reason,
    });
}
