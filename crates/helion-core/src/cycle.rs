// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// The per-tenant automation cycle (C6, §4.6): preflight, blackout, quick-control
// short-circuit, flag processing, data acquisition, rule evaluation in priority order,
// and the continue/preempt/clear/start transition decision. Curtailment (C7) runs
// separately, after this, from the same driver tick.

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use tracing::info;

use helion_clients::{CallOrigin, ClientPool};
use helion_store::Store;
use helion_types::audit::{ActionTaken, AuditEntry, AuditSeverity};
use helion_types::cache::CacheTtlDefaults;
use helion_types::config::Config;
use helion_types::evaluation::RuleEvaluation;
use helion_types::rule::{PriceChannel, Rule};
use helion_types::scheduler::{Segment, Slot};
use helion_types::signals::Signals;
use helion_types::state::AutomationState;
use helion_types::tenant::TenantId;

use crate::apply::{apply_and_verify, clear_active, SlotExpectation};
use crate::cache::CacheLayer;
use crate::error::CoreResult;
use crate::evaluator;
use crate::quickcontrol;

/// §4.6 step 9.2: past this many consecutive clear-active failures, an additional
/// `critical`-severity alert audit line is emitted alongside the regular `clear_failed` one.
const CLEAR_FAILURE_ALERT_THRESHOLD: u32 = 5;

/// Price lookahead, in 30-minute intervals, fetched whenever any enabled rule needs price
/// data — covers the widest `forecastPrice` horizon (60 minutes) with headroom.
const PRICE_LOOKAHEAD_INTERVALS: u32 = 6;

pub struct CycleOutcome {
    pub state: AutomationState,
    pub audit: Option<AuditEntry>,
}

/// Run one tick for one tenant. Never panics on a single tenant's bad data; errors from
/// the external clients/store propagate so the driver can log and move on to the next
/// tenant without halting (§7 "the engine never halts the driver").
#[allow(clippy::too_many_arguments)]
pub async fn run(
    store: &Store,
    cache: &CacheLayer,
    clients: &ClientPool,
    cache_ttl_defaults: &CacheTtlDefaults,
    tenant: &TenantId,
    config: &Config,
    now: DateTime<Utc>,
) -> CoreResult<CycleOutcome> {
    let cycle_id = uuid::Uuid::new_v4().to_string();
    let mut state = store.get_state(tenant)?;

    // Step 1: preflight.
    if !config.automation_enabled {
        state.enabled = false;
        if !state.segments_cleared {
            let cleared = clear_active(clients, &config.device_serial, CallOrigin::System).await?;
            if cleared {
                state.segments_cleared = true;
                state.active_rule = None;
                state.active_rule_name = None;
                state.active_segment = None;
                state.active_segment_enabled = false;
                state.clear_failure_attempts = 0;
            }
        }
        state.last_check = Some(now);
        let final_state = store.merge_state(tenant, |s| *s = state.clone())?;
        return Ok(CycleOutcome { state: final_state, audit: None });
    }
    state.enabled = true;

    // Step 2: blackout check.
    let now_tenant = now.with_timezone(&config.timezone);
    let now_local_time = now_tenant.time();
    let in_blackout = config.blackout_windows.iter().any(|w| w.contains(now_local_time));
    if in_blackout {
        if state.active_rule.is_some() {
            let prev_id = state.active_rule.clone();
            let cleared = clear_active(clients, &config.device_serial, CallOrigin::System).await?;
            if !cleared {
                state.clear_failure_attempts += 1;
                state.last_check = Some(now);
                let final_state = store.merge_state(tenant, |s| *s = state.clone())?;
                let audit = clear_failed_audit(tenant, &cycle_id, now, &final_state, prev_id);
                store.append_audit(&audit)?;
                return Ok(CycleOutcome { state: final_state, audit: Some(audit) });
            }
            clear_active_fields(&mut state);
            if let Some(rule_id) = prev_id {
                clear_last_triggered(store, tenant, &rule_id)?;
            }
        }
        state.in_blackout = true;
        state.last_check = Some(now);
        let final_state = store.merge_state(tenant, |s| *s = state.clone())?;
        return Ok(CycleOutcome { state: final_state, audit: None });
    }
    state.in_blackout = false;

    // Step 3: quick-control short-circuit / auto-cleanup.
    if let Some(qc) = store.get_quick_control(tenant)? {
        if qc.active && !qc.is_expired(now) {
            state.last_check = Some(now);
            let final_state = store.merge_state(tenant, |s| s.last_check = Some(now))?;
            return Ok(CycleOutcome { state: final_state, audit: None });
        }
        if qc.active && qc.is_expired(now) {
            quickcontrol::auto_cleanup_if_expired(store, clients, tenant, &config.device_serial, now).await?;
        }
    }

    // Step 4: flag processing — clear segments for any rule flagged since the last cycle.
    let mut rules = store.list_rules(tenant)?;
    for rule in rules.iter().filter(|r| r.clear_segments_on_next_cycle).cloned().collect::<Vec<_>>() {
        if state.active_rule.as_deref() == Some(rule.rule_id.as_str()) {
            let cleared = clear_active(clients, &config.device_serial, CallOrigin::System).await?;
            if cleared {
                clear_active_fields(&mut state);
                clear_last_triggered(store, tenant, &rule.rule_id)?;
            } else {
                state.clear_failure_attempts += 1;
            }
        }
        let mut updated = rule.clone();
        updated.clear_segments_on_next_cycle = false;
        store.put_rule(&updated)?;
    }
    rules = store.list_rules(tenant)?;
    let enabled_rules: Vec<&Rule> = rules.iter().filter(|r| r.enabled).collect();

    // Step 5: data acquisition.
    let telemetry = cache.telemetry(tenant, config, cache_ttl_defaults, clients).await?.data;

    let needs_prices = enabled_rules.iter().any(|r| r.conditions.needs_prices());
    let (current_feed_in, current_buy, forecast) = if needs_prices {
        let fetched = cache.prices(config, cache_ttl_defaults, clients, PRICE_LOOKAHEAD_INTERVALS).await?.data;
        let feed_in = fetched.iter().find(|i| i.channel == PriceChannel::FeedIn && i.covers(now)).map(|i| i.per_kwh);
        let buy = fetched.iter().find(|i| i.channel == PriceChannel::Buy && i.covers(now)).map(|i| i.per_kwh);
        (feed_in, buy, fetched)
    } else {
        (None, None, Vec::new())
    };

    let needs_weather = enabled_rules.iter().any(|r| r.conditions.needs_weather());
    let weather = if needs_weather {
        let max_horizon = enabled_rules.iter().map(|r| r.weather_horizon_hours()).max().unwrap_or(1);
        Some(cache.weather(tenant, config, cache_ttl_defaults, clients, max_horizon).await?.data)
    } else {
        None
    };

    let signals = Signals {
        now_utc: now,
        now_local: now_tenant.naive_local(),
        telemetry,
        current_feed_in,
        current_buy,
        forecast,
        weather,
    };

    // Step 6: evaluate rules in priority order, ties broken by rule id ascending.
    let mut ordered: Vec<&Rule> = enabled_rules;
    ordered.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.rule_id.cmp(&b.rule_id)));
    let rule_evals: Vec<(&Rule, RuleEvaluation)> = ordered
        .iter()
        .map(|rule| {
            let eval = match validate_rule(rule) {
                Some(reason) => RuleEvaluation {
                    rule_id: rule.rule_id.clone(),
                    rule_name: rule.name.clone(),
                    priority: rule.priority,
                    all_met: helion_types::evaluation::TriState::NotMet,
                    conditions: Vec::new(),
                    skipped_invalid_config: Some(reason),
                },
                None => evaluator::evaluate(rule, &signals),
            };
            (*rule, eval)
        })
        .collect();

    // Step 7: transition decision.
    let active_before = state.active_rule.clone();
    let action_taken;
    let mut triggered = false;
    let mut audit_rule_id = None;
    let mut audit_rule_name = None;
    let mut audit_reason = None;
    let mut audit_severity = None;

    if let Some(active_id) = active_before.clone() {
        let active_rule_obj = rules.iter().find(|r| r.rule_id == active_id).cloned();
        let active_met = rule_evals.iter().find(|(r, _)| r.rule_id == active_id).map(|(_, e)| e.all_met.is_met()).unwrap_or(false);
        let segment_active = state.active_segment.as_ref().map(|seg| segment_still_active(seg, now_local_time)).unwrap_or(false);
        let winner = active_rule_obj
            .as_ref()
            .and_then(|active| rule_evals.iter().find(|(r, e)| r.priority < active.priority && e.all_met.is_met() && r.cooldown_elapsed(now)));

        if active_met && segment_active && winner.is_none() {
            action_taken = ActionTaken::Continued;
            audit_rule_id = Some(active_id.clone());
            audit_rule_name = state.active_rule_name.clone();
        } else if let Some((winner_rule, _)) = winner {
            let cleared = clear_active(clients, &config.device_serial, CallOrigin::System).await?;
            if !cleared {
                state.clear_failure_attempts += 1;
                action_taken = ActionTaken::ClearFailed;
                audit_rule_id = Some(active_id.clone());
                audit_reason = Some("clear_failed".to_string());
                audit_severity = alert_severity(state.clear_failure_attempts);
            } else {
                let (segment, expect) = build_segment(winner_rule, now_tenant);
                let verified = apply_and_verify(clients, &config.device_serial, segment, expect, CallOrigin::User).await?;
                if verified {
                    let mut new_state = state.clone();
                    new_state.active_rule = Some(winner_rule.rule_id.clone());
                    new_state.active_rule_name = Some(winner_rule.name.clone());
                    new_state.active_segment = Some(segment);
                    new_state.active_segment_enabled = true;
                    new_state.clear_failure_attempts = 0;
                    store.commit_preemption(&new_state, &[(winner_rule.rule_id.clone(), Some(now)), (active_id.clone(), None)])?;
                    state = new_state;
                    action_taken = ActionTaken::Preempted;
                    triggered = true;
                    audit_rule_id = Some(winner_rule.rule_id.clone());
                    audit_rule_name = Some(winner_rule.name.clone());
                } else {
                    clear_active_fields(&mut state);
                    clear_last_triggered(store, tenant, &active_id)?;
                    action_taken = ActionTaken::ApplyFailed;
                    audit_rule_id = Some(winner_rule.rule_id.clone());
                    audit_reason = Some("verification_mismatch".to_string());
                }
            }
        } else {
            let cleared = clear_active(clients, &config.device_serial, CallOrigin::System).await?;
            if cleared {
                clear_active_fields(&mut state);
                clear_last_triggered(store, tenant, &active_id)?;
                action_taken = ActionTaken::Cleared;
                audit_rule_id = Some(active_id);
            } else {
                state.clear_failure_attempts += 1;
                action_taken = ActionTaken::ClearFailed;
                audit_rule_id = Some(active_id);
                audit_reason = Some("clear_failed".to_string());
                audit_severity = alert_severity(state.clear_failure_attempts);
            }
        }
    } else {
        let winner = rule_evals.iter().find(|(r, e)| e.all_met.is_met() && r.cooldown_elapsed(now));
        if let Some((winner_rule, _)) = winner {
            let (segment, expect) = build_segment(winner_rule, now_tenant);
            let verified = apply_and_verify(clients, &config.device_serial, segment, expect, CallOrigin::User).await?;
            if verified {
                state.active_rule = Some(winner_rule.rule_id.clone());
                state.active_rule_name = Some(winner_rule.name.clone());
                state.active_segment = Some(segment);
                state.active_segment_enabled = true;
                let mut triggered_rule = (*winner_rule).clone();
                triggered_rule.last_triggered = Some(now);
                store.put_rule(&triggered_rule)?;
                action_taken = ActionTaken::Started;
                triggered = true;
                audit_rule_id = Some(winner_rule.rule_id.clone());
                audit_rule_name = Some(winner_rule.name.clone());
            } else {
                action_taken = ActionTaken::ApplyFailed;
                audit_rule_id = Some(winner_rule.rule_id.clone());
                audit_reason = Some("verification_mismatch".to_string());
            }
        } else {
            action_taken = ActionTaken::Idle;
        }
    }

    // Step 10: persist + append audit.
    state.last_check = Some(now);
    let rules_evaluated = rule_evals.len() as u32;
    let final_state = store.merge_state(tenant, |s| *s = state.clone())?;

    let audit = AuditEntry {
        uid: tenant.clone(),
        cycle_id,
        started_at: now,
        completed_at: now,
        triggered,
        rule_id: audit_rule_id,
        rule_name: audit_rule_name,
        rule_evaluations: rule_evals.into_iter().map(|(_, e)| e).collect(),
        action_taken,
        active_rule_before: active_before,
        active_rule_after: final_state.active_rule.clone(),
        rules_evaluated,
        cycle_duration_ms: 0,
        manual_end: None,
        reason: audit_reason,
        severity: audit_severity,
    };
    store.append_audit(&audit)?;
    info!(tenant = tenant.as_str(), action = ?audit.action_taken, "cycle completed");

    Ok(CycleOutcome { state: final_state, audit: Some(audit) })
}

fn clear_active_fields(state: &mut AutomationState) {
    state.active_rule = None;
    state.active_rule_name = None;
    state.active_segment = None;
    state.active_segment_enabled = false;
    state.clear_failure_attempts = 0;
}

fn clear_last_triggered(store: &Store, tenant: &TenantId, rule_id: &str) -> CoreResult<()> {
    if let Some(mut rule) = store.get_rule(tenant, rule_id)? {
        rule.last_triggered = None;
        store.put_rule(&rule)?;
    }
    Ok(())
}

fn alert_severity(clear_failure_attempts: u32) -> Option<AuditSeverity> {
    (clear_failure_attempts >= CLEAR_FAILURE_ALERT_THRESHOLD).then_some(AuditSeverity::Critical)
}

fn clear_failed_audit(
    tenant: &TenantId,
    cycle_id: &str,
    now: DateTime<Utc>,
    state: &AutomationState,
    rule_id: Option<String>,
) -> AuditEntry {
    AuditEntry {
        uid: tenant.clone(),
        cycle_id: cycle_id.to_string(),
        started_at: now,
        completed_at: now,
        triggered: false,
        rule_id,
        rule_name: None,
        rule_evaluations: Vec::new(),
        action_taken: ActionTaken::ClearFailed,
        active_rule_before: state.active_rule.clone(),
        active_rule_after: state.active_rule.clone(),
        rules_evaluated: 0,
        cycle_duration_ms: 0,
        manual_end: None,
        reason: Some("clear_failed".to_string()),
        severity: alert_severity(state.clear_failure_attempts),
    }
}

/// Does `now_local` still fall inside the window slot 0 of `segment` carries? Mirrors
/// [`helion_types::config::BlackoutWindow::contains`]'s midnight-wrap handling.
fn segment_still_active(segment: &Segment, now_local: NaiveTime) -> bool {
    let slot0 = segment.slot0();
    if !slot0.enable {
        return false;
    }
    let start = NaiveTime::from_hms_opt(slot0.start_hh as u32, slot0.start_mm as u32, 0).unwrap_or(NaiveTime::MIN);
    let end = NaiveTime::from_hms_opt(slot0.end_hh as u32, slot0.end_mm as u32, 0).unwrap_or(NaiveTime::MIN);
    if end < start {
        now_local >= start || now_local < end
    } else {
        now_local >= start && now_local < end
    }
}

/// §4.6 step 8.1: compose the one-slot segment a rule's action describes, starting now.
fn build_segment<Tz: chrono::TimeZone>(rule: &Rule, now_tenant: DateTime<Tz>) -> (Segment, SlotExpectation) {
    let start_local = now_tenant.time();
    let end_tenant = now_tenant.clone() + chrono::Duration::minutes(rule.action.duration_minutes as i64);
    let end_local = end_tenant.time();
    let slot0 = Slot {
        enable: true,
        work_mode: rule.action.work_mode,
        start_hh: start_local.hour() as u8,
        start_mm: start_local.minute() as u8,
        end_hh: end_local.hour() as u8,
        end_mm: end_local.minute() as u8,
        min_soc_on_grid: rule.action.target_min_soc as u8,
        fd_soc: rule.action.target_min_soc as u8,
        fd_pwr: rule.action.discharge_power_w,
        max_soc: rule.action.max_soc as u8,
    };
    (Segment::for_active_slot(slot0), SlotExpectation::from_slot(slot0))
}

/// §7 `ConfigInvalid`: a rule whose action fields are out of range is skipped entirely
/// rather than evaluated, with the reason recorded in its audit breakdown.
fn validate_rule(rule: &Rule) -> Option<String> {
    let action = &rule.action;
    if action.duration_minutes == 0 {
        return Some("action.durationMinutes must be greater than zero".to_string());
    }
    if !(0.0..=100.0).contains(&action.target_min_soc) || !(0.0..=100.0).contains(&action.max_soc) {
        return Some("action soc fields must fall within 0..=100".to_string());
    }
    if action.target_min_soc > action.max_soc {
        return Some("action.targetMinSoC must not exceed action.maxSoC".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use helion_types::config::{CacheTtlOverrides, CurtailmentConfig, InverterModel, Location};
    use helion_types::rule::{Conditions, NumericCondition, Operator, RuleAction, WorkMode};
    use mockito::Server;

    use super::*;

    fn pool(server: &Server) -> ClientPool {
        ClientPool::new(server.url(), "tok", server.url(), "tok", server.url(), "tok").unwrap()
    }

    fn base_config(tenant: &str) -> Config {
        Config {
            uid: TenantId::new(tenant),
            automation_enabled: true,
            device_serial: "SN1".into(),
            inverter_model: InverterModel::Solax,
            inverter_api_key: "k".into(),
            price_api_key: "k".into(),
            price_site_id: "site".into(),
            location: Location { lat: 49.2, lon: 16.6 },
            timezone: chrono_tz::UTC,
            cycle_interval_ms: None,
            cache_ttls: CacheTtlOverrides::default(),
            blackout_windows: vec![],
            curtailment: CurtailmentConfig::default(),
        }
    }

    fn export_high_rule(tenant: &str) -> Rule {
        Rule {
            uid: TenantId::new(tenant),
            rule_id: "export-high".into(),
            name: "ExportHigh".into(),
            priority: 2,
            enabled: true,
            cooldown_minutes: 15,
            conditions: Conditions {
                feed_in_price: Some(NumericCondition { operator: Operator::Ge, value: 30.0 }),
                soc: Some(NumericCondition { operator: Operator::Ge, value: 80.0 }),
                ..Conditions::default()
            },
            action: RuleAction {
                work_mode: WorkMode::ForceDischarge,
                duration_minutes: 30,
                discharge_power_w: 5000,
                target_min_soc: 20.0,
                max_soc: 100.0,
            },
            last_triggered: None,
            clear_segments_on_next_cycle: false,
        }
    }

    async fn telemetry_mock(server: &mut Server, soc: f32) -> mockito::Mock {
        server
            .mock("GET", mockito::Matcher::Regex(r"^/api/v1/inverter/realtime".into()))
            .with_status(200)
            .with_body(format!(
                r#"{{"errno":0,"result":{{"socPct":{soc},"batteryTempC":20,"ambientTempC":20,"inverterTempC":30,"pvPowerW":0,"loadPowerW":0,"gridImportW":0,"feedInW":0,"exportLimitW":10000}}}}"#
            ))
            .create_async()
            .await
    }

    async fn price_mock(server: &mut Server, feed_in_per_kwh: f32) -> mockito::Mock {
        let now = Utc::now();
        let start = now - chrono::Duration::minutes(5);
        let end = now + chrono::Duration::minutes(25);
        server
            .mock("GET", mockito::Matcher::Regex(r"^/api/v1/prices/current-and-forecast".into()))
            .with_status(200)
            .with_body(format!(
                r#"{{"errno":0,"result":[{{"startTime":"{}","endTime":"{}","channelType":"feedIn","perKwh":{},"type":"CurrentInterval"}}]}}"#,
                start.to_rfc3339(),
                end.to_rfc3339(),
                -feed_in_per_kwh
            ))
            .create_async()
            .await
    }

    #[tokio::test]
    async fn idle_cycle_starts_a_rule_when_conditions_are_met() {
        let mut server = Server::new_async().await;
        telemetry_mock(&mut server, 85.0).await;
        price_mock(&mut server, 45.0).await;
        server.mock("POST", "/api/v1/scheduler/apply").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;
        server.mock("POST", "/api/v1/scheduler/flag").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;
        server
            .mock("GET", mockito::Matcher::Regex(r"^/api/v1/scheduler/get".into()))
            .with_status(200)
            .with_body(get_scheduler_body_matching(WorkMode::ForceDischarge))
            .create_async()
            .await;

        let clients = pool(&server);
        let store = Store::open_in_memory().unwrap();
        let cache = CacheLayer::new(Arc::new(Store::open_in_memory().unwrap()));
        let tenant = TenantId::new("t1");
        let config = base_config("t1");
        store.put_config(&config).unwrap();
        store.put_rule(&export_high_rule("t1")).unwrap();

        let outcome = run(&store, &cache, &clients, &CacheTtlDefaults::default(), &tenant, &config, Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.state.active_rule.as_deref(), Some("export-high"));
        assert!(outcome.audit.unwrap().triggered);
    }

    #[tokio::test]
    async fn continuation_issues_no_apply_calls() {
        let mut server = Server::new_async().await;
        telemetry_mock(&mut server, 83.0).await;
        price_mock(&mut server, 44.0).await;
        let apply_mock = server.mock("POST", "/api/v1/scheduler/apply").with_status(500).with_body("should not be called").create_async().await;

        let clients = pool(&server);
        let store = Store::open_in_memory().unwrap();
        let cache = CacheLayer::new(Arc::new(Store::open_in_memory().unwrap()));
        let tenant = TenantId::new("t1");
        let config = base_config("t1");
        store.put_config(&config).unwrap();
        let rule = export_high_rule("t1");
        store.put_rule(&rule).unwrap();

        let now = Utc::now();
        let start = now - chrono::Duration::minutes(5);
        let end = now + chrono::Duration::minutes(25);
        let mut active_state = AutomationState::idle(tenant.clone());
        active_state.enabled = true;
        active_state.active_rule = Some("export-high".into());
        active_state.active_rule_name = Some("ExportHigh".into());
        active_state.active_segment = Some(Segment::for_active_slot(Slot {
            enable: true,
            work_mode: WorkMode::ForceDischarge,
            start_hh: start.time().hour() as u8,
            start_mm: start.time().minute() as u8,
            end_hh: end.time().hour() as u8,
            end_mm: end.time().minute() as u8,
            min_soc_on_grid: 20,
            fd_soc: 20,
            fd_pwr: 5000,
            max_soc: 100,
        }));
        active_state.active_segment_enabled = true;
        store.merge_state(&tenant, |s| *s = active_state).unwrap();

        let outcome = run(&store, &cache, &clients, &CacheTtlDefaults::default(), &tenant, &config, now).await.unwrap();

        assert_eq!(outcome.state.active_rule.as_deref(), Some("export-high"));
        assert_eq!(outcome.audit.unwrap().action_taken, ActionTaken::Continued);
        assert_eq!(apply_mock.matched_calls(), 0);
    }

    #[tokio::test]
    async fn automation_disabled_clears_segments_exactly_once() {
        let mut server = Server::new_async().await;
        let apply_mock = server.mock("POST", "/api/v1/scheduler/apply").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;

        let clients = pool(&server);
        let store = Store::open_in_memory().unwrap();
        let cache = CacheLayer::new(Arc::new(Store::open_in_memory().unwrap()));
        let tenant = TenantId::new("t1");
        let mut config = base_config("t1");
        config.automation_enabled = false;
        store.put_config(&config).unwrap();

        let outcome1 = run(&store, &cache, &clients, &CacheTtlDefaults::default(), &tenant, &config, Utc::now()).await.unwrap();
        assert!(outcome1.state.segments_cleared);

        let outcome2 = run(&store, &cache, &clients, &CacheTtlDefaults::default(), &tenant, &config, Utc::now()).await.unwrap();
        assert!(outcome2.state.segments_cleared);
        apply_mock.assert_async().await;
    }

    #[tokio::test]
    async fn blackout_clears_active_rule_and_suppresses_evaluation() {
        let mut server = Server::new_async().await;
        let apply_mock = server.mock("POST", "/api/v1/scheduler/apply").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;

        let clients = pool(&server);
        let store = Store::open_in_memory().unwrap();
        let cache = CacheLayer::new(Arc::new(Store::open_in_memory().unwrap()));
        let tenant = TenantId::new("t1");
        let mut config = base_config("t1");
        config.blackout_windows = vec![helion_types::config::BlackoutWindow { start_hh: 0, start_mm: 0, end_hh: 23, end_mm: 59 }];
        store.put_config(&config).unwrap();
        store.put_rule(&export_high_rule("t1")).unwrap();

        let mut active_state = AutomationState::idle(tenant.clone());
        active_state.active_rule = Some("export-high".into());
        active_state.active_rule_name = Some("ExportHigh".into());
        store.merge_state(&tenant, |s| *s = active_state).unwrap();

        let outcome = run(&store, &cache, &clients, &CacheTtlDefaults::default(), &tenant, &config, Utc::now()).await.unwrap();

        assert!(outcome.state.in_blackout);
        assert!(outcome.state.active_rule.is_none());
        apply_mock.assert_async().await;
    }

    fn get_scheduler_body_matching(mode: WorkMode) -> String {
        let now = Utc::now();
        let end = now + chrono::Duration::minutes(30);
        let active = format!(
            r#"{{"enable":true,"workMode":"{:?}","startHh":{},"startMm":{},"endHh":{},"endMm":{},"minSocOnGrid":20,"fdSoc":20,"fdPwr":5000,"maxSoc":100}}"#,
            mode,
            now.time().hour(),
            now.time().minute(),
            end.time().hour(),
            end.time().minute()
        );
        let blank = r#"{"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100}"#;
        format!("{{\"errno\":0,\"result\":[{},{}]}}", active, [blank; 7].join(","))
    }
}
