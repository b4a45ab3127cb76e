// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// The HTTP surface (§6): config & rule CRUD, engine control, and observability. Every
// handler is a thin wrapper over the `helion-core`/`helion-store` APIs the driver itself
// uses — no business logic lives here beyond request parsing and the synchronous
// clear-active required on rule disable/delete.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use helion_clients::CallOrigin;
use helion_core::apply::clear_active;
use helion_core::{cycle, quickcontrol};
use helion_types::audit::{ActionTaken, AuditEntry};
use helion_types::config::Config;
use helion_types::rule::{Rule, WorkMode};
use helion_types::tenant::TenantId;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::tenant_header::TenantHeader;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/config", get(get_config).post(post_config))
        .route("/api/rules", get(list_rules).post(post_rule))
        .route("/api/rules/{id}", patch(patch_rule).delete(delete_rule))
        .route("/api/automation/enable", post(automation_enable))
        .route("/api/automation/cycle", post(automation_cycle))
        .route("/api/automation/status", get(automation_status))
        .route("/api/quickcontrol/start", post(quickcontrol_start))
        .route("/api/quickcontrol/stop", post(quickcontrol_stop))
        .route("/api/quickcontrol/status", get(quickcontrol_status))
        .route("/api/automation/history", get(automation_history))
        .route("/api/metrics/api-calls", get(metrics_api_calls))
        .with_state(state)
}

async fn get_config(State(state): State<AppState>, TenantHeader(tenant): TenantHeader) -> ApiResult<Json<Config>> {
    Ok(Json(state.config_or_not_found(&tenant)?))
}

async fn post_config(
    State(state): State<AppState>,
    TenantHeader(tenant): TenantHeader,
    Json(mut body): Json<Config>,
) -> ApiResult<Json<Config>> {
    body.uid = tenant;
    state.store.put_config(&body)?;
    Ok(Json(body))
}

async fn list_rules(State(state): State<AppState>, TenantHeader(tenant): TenantHeader) -> ApiResult<Json<Vec<Rule>>> {
    Ok(Json(state.store.list_rules(&tenant)?))
}

async fn post_rule(
    State(state): State<AppState>,
    TenantHeader(tenant): TenantHeader,
    Json(mut body): Json<Rule>,
) -> ApiResult<Json<Rule>> {
    body.uid = tenant;
    if body.rule_id.is_empty() {
        body.rule_id = Uuid::new_v4().to_string();
    }
    state.store.put_rule(&body)?;
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
struct RulePatch {
    name: Option<String>,
    priority: Option<u32>,
    enabled: Option<bool>,
    cooldown_minutes: Option<u32>,
}

async fn patch_rule(
    State(state): State<AppState>,
    TenantHeader(tenant): TenantHeader,
    Path(rule_id): Path<String>,
    Json(patch): Json<RulePatch>,
) -> ApiResult<Json<Rule>> {
    let mut rule = state
        .store
        .get_rule(&tenant, &rule_id)?
        .ok_or_else(|| ApiError::NotFound { kind: "rule", id: rule_id.clone() })?;

    if let Some(name) = patch.name {
        rule.name = name;
    }
    if let Some(priority) = patch.priority {
        rule.priority = priority;
    }
    if let Some(cooldown) = patch.cooldown_minutes {
        rule.cooldown_minutes = cooldown;
    }
    let disabling = matches!(patch.enabled, Some(false)) && rule.enabled;
    if let Some(enabled) = patch.enabled {
        rule.enabled = enabled;
    }
    state.store.put_rule(&rule)?;

    if disabling {
        clear_if_currently_active(&state, &tenant, &rule_id).await?;
    }
    Ok(Json(rule))
}

async fn delete_rule(
    State(state): State<AppState>,
    TenantHeader(tenant): TenantHeader,
    Path(rule_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.store.delete_rule(&tenant, &rule_id)?;
    clear_if_currently_active(&state, &tenant, &rule_id).await?;
    Ok(Json(serde_json::json!({ "errno": 0 })))
}

/// §6: "On disable or delete of a rule that is currently `activeRule`, the collaborator
/// MUST invoke the engine's clear-active path synchronously... not defer it to the next
/// tick." Mirrors the cycle engine's own clear-active bookkeeping (§4.6 step 1/5) so the
/// audit trail and `AutomationState` invariants look identical either way.
async fn clear_if_currently_active(state: &AppState, tenant: &TenantId, rule_id: &str) -> ApiResult<()> {
    let current = state.store.get_state(tenant)?;
    if current.active_rule.as_deref() != Some(rule_id) {
        return Ok(());
    }
    let config = state.config_or_not_found(tenant)?;
    let clients = state.client_pool_for(&config)?;
    let now = Utc::now();

    let cleared = clear_active(&clients, &config.device_serial, CallOrigin::System).await?;
    if !cleared {
        return Err(ApiError::BadRequest("clear-active failed, rule left active".into()));
    }

    let before = current.active_rule.clone();
    state.store.merge_state(tenant, |s| {
        s.active_rule = None;
        s.active_rule_name = None;
        s.active_segment = None;
        s.active_segment_enabled = false;
        s.segments_cleared = true;
    })?;
    state.store.append_audit(&AuditEntry {
        uid: tenant.clone(),
        cycle_id: Uuid::new_v4().to_string(),
        started_at: now,
        completed_at: now,
        triggered: false,
        rule_id: Some(rule_id.to_owned()),
        rule_name: None,
        rule_evaluations: vec![],
        action_taken: ActionTaken::Cleared,
        active_rule_before: before,
        active_rule_after: None,
        rules_evaluated: 0,
        cycle_duration_ms: 0,
        manual_end: Some(true),
        reason: Some("rule_disabled_or_deleted".into()),
        severity: None,
    })?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct EnableBody {
    enabled: bool,
}

async fn automation_enable(
    State(state): State<AppState>,
    TenantHeader(tenant): TenantHeader,
    Json(body): Json<EnableBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut config = state.config_or_not_found(&tenant)?;
    config.automation_enabled = body.enabled;
    state.store.put_config(&config)?;

    if !body.enabled {
        state.store.merge_state(&tenant, |s| s.segments_cleared = false)?;
    }
    Ok(Json(serde_json::json!({ "errno": 0, "enabled": body.enabled })))
}

async fn automation_cycle(
    State(state): State<AppState>,
    TenantHeader(tenant): TenantHeader,
) -> ApiResult<Json<serde_json::Value>> {
    let config = state.config_or_not_found(&tenant)?;
    let clients = state.client_pool_for(&config)?;
    let now = Utc::now();

    // `cycle::run` already persists the resulting state and its own audit entry — this
    // handler only needs to report what happened (§6 "runs a single cycle synchronously").
    let outcome =
        cycle::run(&state.store, &state.cache, &clients, &state.cache_ttl_defaults, &tenant, &config, now).await?;

    Ok(Json(serde_json::json!({ "errno": 0, "actionTaken": outcome.audit.map(|a| a.action_taken) })))
}

#[derive(Debug, Serialize)]
struct AutomationStatus {
    enabled: bool,
    active_rule: Option<String>,
    active_rule_name: Option<String>,
    last_check: Option<chrono::DateTime<Utc>>,
    in_blackout: bool,
    curtailment: helion_types::state::CurtailmentState,
}

async fn automation_status(State(state): State<AppState>, TenantHeader(tenant): TenantHeader) -> ApiResult<Json<AutomationStatus>> {
    let automation_state = state.store.get_state(&tenant)?;
    Ok(Json(AutomationStatus {
        enabled: automation_state.enabled,
        active_rule: automation_state.active_rule,
        active_rule_name: automation_state.active_rule_name,
        last_check: automation_state.last_check,
        in_blackout: automation_state.in_blackout,
        curtailment: automation_state.curtailment,
    }))
}

#[derive(Debug, Deserialize)]
struct QuickControlStartBody {
    work_mode: WorkMode,
    power: u32,
    minutes: u32,
}

async fn quickcontrol_start(
    State(state): State<AppState>,
    TenantHeader(tenant): TenantHeader,
    Json(body): Json<QuickControlStartBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let config = state.config_or_not_found(&tenant)?;
    let clients = state.client_pool_for(&config)?;
    let over = quickcontrol::start(
        &state.store,
        &clients,
        &tenant,
        &config.device_serial,
        config.timezone,
        body.work_mode,
        body.power,
        body.minutes,
        Utc::now(),
    )
    .await?;
    Ok(Json(serde_json::json!({ "errno": 0, "expiresAt": over.expires_at })))
}

async fn quickcontrol_stop(State(state): State<AppState>, TenantHeader(tenant): TenantHeader) -> ApiResult<Json<serde_json::Value>> {
    let config = state.config_or_not_found(&tenant)?;
    let clients = state.client_pool_for(&config)?;
    quickcontrol::stop(&state.store, &clients, &tenant, &config.device_serial).await?;
    Ok(Json(serde_json::json!({ "errno": 0 })))
}

async fn quickcontrol_status(
    State(state): State<AppState>,
    TenantHeader(tenant): TenantHeader,
) -> ApiResult<Json<Option<helion_types::state::QuickControlOverride>>> {
    let config = state.config_or_not_found(&tenant)?;
    let clients = state.client_pool_for(&config)?;
    quickcontrol::auto_cleanup_if_expired(&state.store, &clients, &tenant, &config.device_serial, Utc::now()).await?;
    Ok(Json(state.store.get_quick_control(&tenant)?))
}

#[derive(Debug, Deserialize)]
struct DaysQuery {
    days: Option<i64>,
}

async fn automation_history(
    State(state): State<AppState>,
    TenantHeader(tenant): TenantHeader,
    Query(query): Query<DaysQuery>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    let days = query.days.unwrap_or(7).max(1);
    let cutoff = Utc::now() - chrono::Duration::days(days);
    let entries = state
        .store
        .list_audit(&tenant, 10_000)?
        .into_iter()
        .filter(|e| e.completed_at >= cutoff)
        .collect();
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
struct MetricsQuery {
    days: Option<i64>,
    #[serde(default)]
    #[allow(dead_code)]
    scope: Option<String>,
}

async fn metrics_api_calls(
    State(state): State<AppState>,
    TenantHeader(tenant): TenantHeader,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<Vec<helion_types::metrics::ApiCallCounter>>> {
    let days = query.days.unwrap_or(7).max(1);
    let cutoff = (Utc::now() - chrono::Duration::days(days)).date_naive();

    // Fetched unsorted per-tenant, filtered and sorted in-process (§6 "avoid requiring a
    // compound index").
    let mut counters = state.store.api_call_counters(&tenant)?;
    counters.retain(|c| c.date.parse::<chrono::NaiveDate>().is_ok_and(|d| d >= cutoff));
    counters.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.provider.cmp(&b.provider)));
    Ok(Json(counters))
}
