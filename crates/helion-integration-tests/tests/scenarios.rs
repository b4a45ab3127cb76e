// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// End-to-end scenarios against a real (tempfile-backed) SQLite store and an in-process
// mock inverter/price/weather server, exercising the automation cycle (C6) and
// curtailment (C7) the way a deployed tenant would actually hit them over a few ticks.
// Unlike the unit tests colocated with each module, these don't reach into internals —
// every assertion is made against what `cycle::run`/`curtailment::tick` hand back.

use std::sync::Arc;

use chrono::{Timelike, Utc};
use mockito::Server;

use helion_clients::ClientPool;
use helion_core::cache::CacheLayer;
use helion_core::curtailment;
use helion_core::cycle;
use helion_store::Store;
use helion_types::audit::ActionTaken;
use helion_types::cache::CacheTtlDefaults;
use helion_types::config::{CacheTtlOverrides, Config, CurtailmentConfig, InverterModel, Location};
use helion_types::rule::{Conditions, NumericCondition, Operator, Rule, RuleAction, WorkMode};
use helion_types::state::CurtailmentState;
use helion_types::tenant::TenantId;

fn pool(server: &Server) -> ClientPool {
    ClientPool::new(server.url(), "tok", server.url(), "tok", server.url(), "tok").unwrap()
}

/// A real SQLite file in a temp dir, not `:memory:` — the closest match to what a
/// deployed instance actually persists to between ticks.
fn tempfile_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("helion.db");
    let store = Store::open(path.to_str().unwrap()).unwrap();
    (dir, store)
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

fn export_high_rule(tenant: &str, rule_id: &str, priority: u32, min_soc: f32) -> Rule {
    Rule {
        uid: TenantId::new(tenant),
        rule_id: rule_id.into(),
        name: format!("ExportHigh-{rule_id}"),
        priority,
        enabled: true,
        cooldown_minutes: 15,
        conditions: Conditions {
            feed_in_price: Some(NumericCondition { operator: Operator::Ge, value: 30.0 }),
            soc: Some(NumericCondition { operator: Operator::Ge, value: min_soc }),
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

fn scheduler_get_body(mode: WorkMode, match_window: bool) -> String {
    let now = Utc::now();
    let end = now + chrono::Duration::minutes(30);
    let (start_hh, start_mm, end_hh, end_mm) = if match_window {
        (now.time().hour(), now.time().minute(), end.time().hour(), end.time().minute())
    } else {
        // A window that will never match what the engine asked for.
        (23, 59, 23, 59)
    };
    let active = format!(
        r#"{{"enable":true,"workMode":"{mode:?}","startHh":{start_hh},"startMm":{start_mm},"endHh":{end_hh},"endMm":{end_mm},"minSocOnGrid":20,"fdSoc":20,"fdPwr":5000,"maxSoc":100}}"#,
    );
    let blank = r#"{"enable":false,"workMode":"SelfUse","startHh":0,"startMm":0,"endHh":0,"endMm":0,"minSocOnGrid":0,"fdSoc":0,"fdPwr":0,"maxSoc":100}"#;
    format!("{{\"errno\":0,\"result\":[{},{}]}}", active, [blank; 7].join(","))
}

/// S1: a rule whose conditions are met from an idle state starts and is verified.
#[tokio::test]
async fn s1_high_feed_in_export_starts_from_idle() {
    let mut server = Server::new_async().await;
    telemetry_mock(&mut server, 85.0).await;
    price_mock(&mut server, 45.0).await;
    server.mock("POST", "/api/v1/scheduler/apply").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;
    server.mock("POST", "/api/v1/scheduler/flag").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;
    server
        .mock("GET", mockito::Matcher::Regex(r"^/api/v1/scheduler/get".into()))
        .with_status(200)
        .with_body(scheduler_get_body(WorkMode::ForceDischarge, true))
        .create_async()
        .await;

    let clients = pool(&server);
    let (_dir, store) = tempfile_store();
    let cache = CacheLayer::new(Arc::new(Store::open_in_memory().unwrap()));
    let tenant = TenantId::new("t1");
    let config = base_config("t1");
    store.put_config(&config).unwrap();
    store.put_rule(&export_high_rule("t1", "export-high", 2, 80.0)).unwrap();

    let outcome = cycle::run(&store, &cache, &clients, &CacheTtlDefaults::default(), &tenant, &config, Utc::now())
        .await
        .unwrap();

    assert_eq!(outcome.state.active_rule.as_deref(), Some("export-high"));
    let audit = outcome.audit.unwrap();
    assert_eq!(audit.action_taken, ActionTaken::Started);
    assert!(audit.triggered);

    let history = store.list_audit(&tenant, 10).unwrap();
    assert_eq!(history.len(), 1);
}

/// S2: the same rule still holding on the next tick continues silently — no apply call.
#[tokio::test]
async fn s2_continuation_is_silent() {
    let mut server = Server::new_async().await;
    telemetry_mock(&mut server, 83.0).await;
    price_mock(&mut server, 44.0).await;
    let apply_mock = server.mock("POST", "/api/v1/scheduler/apply").with_status(500).with_body("must not be called").create_async().await;

    let clients = pool(&server);
    let (_dir, store) = tempfile_store();
    let cache = CacheLayer::new(Arc::new(Store::open_in_memory().unwrap()));
    let tenant = TenantId::new("t1");
    let config = base_config("t1");
    store.put_config(&config).unwrap();
    store.put_rule(&export_high_rule("t1", "export-high", 2, 80.0)).unwrap();

    let now = Utc::now();
    let start = now - chrono::Duration::minutes(5);
    let end = now + chrono::Duration::minutes(25);
    let mut active_state = helion_types::state::AutomationState::idle(tenant.clone());
    active_state.enabled = true;
    active_state.active_rule = Some("export-high".into());
    active_state.active_rule_name = Some("ExportHigh-export-high".into());
    active_state.active_segment = Some(helion_types::scheduler::Segment::for_active_slot(helion_types::scheduler::Slot {
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

    let outcome = cycle::run(&store, &cache, &clients, &CacheTtlDefaults::default(), &tenant, &config, now).await.unwrap();

    assert_eq!(outcome.audit.unwrap().action_taken, ActionTaken::Continued);
    assert_eq!(apply_mock.matched_calls(), 0);
}

/// S3: the active rule's conditions are no longer met and nothing else qualifies — the
/// engine clears the segment rather than leaving a stale schedule behind.
#[tokio::test]
async fn s3_cancel_when_conditions_are_lost() {
    let mut server = Server::new_async().await;
    telemetry_mock(&mut server, 10.0).await; // soc well below the rule's 80.0 floor
    price_mock(&mut server, 45.0).await;
    let clear_mock = server.mock("POST", "/api/v1/scheduler/apply").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;
    server.mock("POST", "/api/v1/scheduler/flag").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;

    let clients = pool(&server);
    let (_dir, store) = tempfile_store();
    let cache = CacheLayer::new(Arc::new(Store::open_in_memory().unwrap()));
    let tenant = TenantId::new("t1");
    let config = base_config("t1");
    store.put_config(&config).unwrap();
    store.put_rule(&export_high_rule("t1", "export-high", 2, 80.0)).unwrap();

    let mut active_state = helion_types::state::AutomationState::idle(tenant.clone());
    active_state.enabled = true;
    active_state.active_rule = Some("export-high".into());
    active_state.active_rule_name = Some("ExportHigh-export-high".into());
    store.merge_state(&tenant, |s| *s = active_state).unwrap();

    let outcome = cycle::run(&store, &cache, &clients, &CacheTtlDefaults::default(), &tenant, &config, Utc::now())
        .await
        .unwrap();

    assert!(outcome.state.active_rule.is_none());
    assert_eq!(outcome.audit.unwrap().action_taken, ActionTaken::Cleared);
    clear_mock.assert_async().await;
}

/// S4: a higher-priority rule qualifying while a lower-priority one is active preempts it.
#[tokio::test]
async fn s4_higher_priority_rule_preempts_the_active_one() {
    let mut server = Server::new_async().await;
    telemetry_mock(&mut server, 85.0).await;
    price_mock(&mut server, 45.0).await;
    server.mock("POST", "/api/v1/scheduler/apply").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;
    server.mock("POST", "/api/v1/scheduler/flag").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;
    server
        .mock("GET", mockito::Matcher::Regex(r"^/api/v1/scheduler/get".into()))
        .with_status(200)
        .with_body(scheduler_get_body(WorkMode::ForceDischarge, true))
        .create_async()
        .await;

    let clients = pool(&server);
    let (_dir, store) = tempfile_store();
    let cache = CacheLayer::new(Arc::new(Store::open_in_memory().unwrap()));
    let tenant = TenantId::new("t1");
    let config = base_config("t1");
    store.put_config(&config).unwrap();
    store.put_rule(&export_high_rule("t1", "low-priority", 5, 80.0)).unwrap();
    store.put_rule(&export_high_rule("t1", "high-priority", 1, 80.0)).unwrap();

    let mut active_state = helion_types::state::AutomationState::idle(tenant.clone());
    active_state.enabled = true;
    active_state.active_rule = Some("low-priority".into());
    active_state.active_rule_name = Some("ExportHigh-low-priority".into());
    store.merge_state(&tenant, |s| *s = active_state).unwrap();

    let outcome = cycle::run(&store, &cache, &clients, &CacheTtlDefaults::default(), &tenant, &config, Utc::now())
        .await
        .unwrap();

    assert_eq!(outcome.state.active_rule.as_deref(), Some("high-priority"));
    let audit = outcome.audit.unwrap();
    assert_eq!(audit.action_taken, ActionTaken::Preempted);
    assert_eq!(audit.active_rule_before.as_deref(), Some("low-priority"));
    assert_eq!(audit.active_rule_after.as_deref(), Some("high-priority"));
}

/// S5: the apply succeeds but the verification read never reports the expected window —
/// the engine must not advance `activeRule` on an unconfirmed write.
#[tokio::test]
async fn s5_verification_mismatch_leaves_no_active_rule() {
    let mut server = Server::new_async().await;
    telemetry_mock(&mut server, 85.0).await;
    price_mock(&mut server, 45.0).await;
    server.mock("POST", "/api/v1/scheduler/apply").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;
    server.mock("POST", "/api/v1/scheduler/flag").with_status(200).with_body(r#"{"errno":0,"result":null}"#).create_async().await;
    server
        .mock("GET", mockito::Matcher::Regex(r"^/api/v1/scheduler/get".into()))
        .with_status(200)
        .with_body(scheduler_get_body(WorkMode::ForceDischarge, false))
        .create_async()
        .await;

    let clients = pool(&server);
    let (_dir, store) = tempfile_store();
    let cache = CacheLayer::new(Arc::new(Store::open_in_memory().unwrap()));
    let tenant = TenantId::new("t1");
    let config = base_config("t1");
    store.put_config(&config).unwrap();
    store.put_rule(&export_high_rule("t1", "export-high", 2, 80.0)).unwrap();

    let outcome = cycle::run(&store, &cache, &clients, &CacheTtlDefaults::default(), &tenant, &config, Utc::now())
        .await
        .unwrap();

    assert!(outcome.state.active_rule.is_none());
    let audit = outcome.audit.unwrap();
    assert_eq!(audit.action_taken, ActionTaken::ApplyFailed);
    assert_eq!(audit.reason.as_deref(), Some("verification_mismatch"));
}

/// S6: curtailment must not issue a second export-limit call while it stays on the same
/// side of the threshold across consecutive ticks (property 7, "damped oscillation").
#[tokio::test]
async fn s6_curtailment_oscillation_is_damped() {
    let mut server = Server::new_async().await;
    let set_limit_mock = server
        .mock("POST", mockito::Matcher::Regex(r"^/api/v1/inverter/export-limit".into()))
        .with_status(200)
        .with_body(r#"{"errno":0,"result":null}"#)
        .expect(1)
        .create_async()
        .await;

    let clients = pool(&server);
    let config = CurtailmentConfig { enabled: true, threshold_cents_per_kwh: 0.0, restore_value_w: 10_000 };

    let (state1, outcome1) = curtailment::tick(CurtailmentState::default(), &config, Some(-3.0), &clients, "SN1").await.unwrap();
    assert!(state1.active);
    assert_eq!(outcome1, curtailment::CurtailmentOutcome::Activated);

    // Price stays below the threshold on the next several ticks: no further calls.
    let (state2, outcome2) = curtailment::tick(state1, &config, Some(-4.0), &clients, "SN1").await.unwrap();
    assert!(state2.active);
    assert_eq!(outcome2, curtailment::CurtailmentOutcome::NoChange);

    let (state3, outcome3) = curtailment::tick(state2, &config, Some(-1.0), &clients, "SN1").await.unwrap();
    assert!(state3.active);
    assert_eq!(outcome3, curtailment::CurtailmentOutcome::NoChange);

    set_limit_mock.assert_async().await;
}
