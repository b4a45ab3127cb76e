// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// Quick-control override (C9, §4.9): a bounded-duration manual command that preempts the
// automation cycle entirely while active. Auto-cleanup at expiry is safe to invoke from
// either the cycle engine or a standalone status poll — whichever observes `now > expiresAt`
// first performs the one clear-active the property requires (§8 property 6).

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

use helion_clients::{CallOrigin, ClientPool};
use helion_store::Store;
use helion_types::audit::{ActionTaken, AuditEntry};
use helion_types::rule::WorkMode;
use helion_types::scheduler::{Segment, Slot};
use helion_types::state::QuickControlOverride;
use helion_types::tenant::TenantId;

use crate::apply::{apply_and_verify, clear_active, SlotExpectation};
use crate::error::{CoreError, CoreResult};

/// Start a manual override: compose a one-slot segment spanning `[now, now+minutes)` in the
/// tenant's local time, apply it, and persist the override only once the write verifies
/// (the same apply/verify barrier the cycle engine uses for a rule start).
#[allow(clippy::too_many_arguments)]
pub async fn start(
    store: &Store,
    clients: &ClientPool,
    tenant: &TenantId,
    device_serial: &str,
    timezone: Tz,
    work_mode: WorkMode,
    power_w: u32,
    minutes: u32,
    now: DateTime<Utc>,
) -> CoreResult<QuickControlOverride> {
    let expires_at = now + chrono::Duration::minutes(minutes as i64);
    let start_local = now.with_timezone(&timezone).time();
    let end_local = expires_at.with_timezone(&timezone).time();

    let slot0 = Slot {
        enable: true,
        work_mode,
        start_hh: start_local.hour() as u8,
        start_mm: start_local.minute() as u8,
        end_hh: end_local.hour() as u8,
        end_mm: end_local.minute() as u8,
        min_soc_on_grid: 0,
        fd_soc: 0,
        fd_pwr: power_w,
        max_soc: 100,
    };
    let segment = Segment::for_active_slot(slot0);
    let expect = SlotExpectation::from_slot(slot0);

    let verified = apply_and_verify(clients, device_serial, segment, expect, CallOrigin::User).await?;
    if !verified {
        return Err(CoreError::VerificationFailed { rule_id: "quickcontrol".into() });
    }

    let override_doc = QuickControlOverride {
        uid: tenant.clone(),
        active: true,
        work_mode,
        power_w,
        started_at: now,
        expires_at,
        source: "api".into(),
    };
    store.put_quick_control(&override_doc)?;
    Ok(override_doc)
}

/// Stop a running override on direct user request.
pub async fn stop(store: &Store, clients: &ClientPool, tenant: &TenantId, device_serial: &str) -> CoreResult<()> {
    let Some(mut override_doc) = store.get_quick_control(tenant)? else { return Ok(()) };
    if !override_doc.active {
        return Ok(());
    }
    if !clear_active(clients, device_serial, CallOrigin::User).await? {
        return Err(CoreError::ClearFailed { attempts: 3 });
    }
    override_doc.active = false;
    store.put_quick_control(&override_doc)?;
    Ok(())
}

/// If the tenant has an active, expired override, run the counter-exempt auto-cleanup
/// (clear-active, mark inactive, audit `quick_control_expired`) and return `true`. A clear
/// failure leaves the override active for the next observer to retry, exactly like a failed
/// cycle-engine clear-active preserves `activeRule`.
pub async fn auto_cleanup_if_expired(
    store: &Store,
    clients: &ClientPool,
    tenant: &TenantId,
    device_serial: &str,
    now: DateTime<Utc>,
) -> CoreResult<bool> {
    let Some(mut override_doc) = store.get_quick_control(tenant)? else { return Ok(false) };
    if !override_doc.active || !override_doc.is_expired(now) {
        return Ok(false);
    }

    if !clear_active(clients, device_serial, CallOrigin::System).await? {
        warn!(tenant = tenant.as_str(), "quick-control auto-cleanup clear-active failed, will retry");
        return Ok(false);
    }

    override_doc.active = false;
    store.put_quick_control(&override_doc)?;

    let entry = AuditEntry {
        uid: tenant.clone(),
        cycle_id: uuid::Uuid::new_v4().to_string(),
        started_at: now,
        completed_at: now,
        triggered: false,
        rule_id: None,
        rule_name: None,
        rule_evaluations: vec![],
        action_taken: ActionTaken::QuickControlExpired,
        active_rule_before: None,
        active_rule_after: None,
        rules_evaluated: 0,
        cycle_duration_ms: 0,
        manual_end: None,
        reason: Some("quick_control_expired".into()),
        severity: None,
    };
    store.append_audit(&entry)?;

    Ok(true)
}
