// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// Independent per-tenant state machine (§4.7), run in the same per-tenant pass as the
// automation cycle but never touching the inverter except on an INACTIVE<->ACTIVE
// transition (property 7: two consecutive cycles on the same side of the threshold
// issue zero calls).

use helion_clients::{CallOrigin, ClientPool};
use helion_types::audit::ActionTaken;
use helion_types::config::CurtailmentConfig;
use helion_types::state::CurtailmentState;

use crate::error::CoreResult;

/// What the curtailment pass decided this cycle, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurtailmentOutcome {
    NoChange,
    Activated,
    Deactivated,
}

impl CurtailmentOutcome {
    pub fn action_taken(self) -> Option<ActionTaken> {
        match self {
            CurtailmentOutcome::NoChange => None,
            CurtailmentOutcome::Activated => Some(ActionTaken::CurtailmentActivated),
            CurtailmentOutcome::Deactivated => Some(ActionTaken::CurtailmentDeactivated),
        }
    }
}

/// Run one curtailment tick. `current_feed_in` is the already-canonicalised (§4.3)
/// positive-if-earning feed-in price; `None` (no price data this cycle) is treated as
/// "no change" rather than guessed at.
pub async fn tick(
    state: CurtailmentState,
    config: &CurtailmentConfig,
    current_feed_in: Option<f32>,
    clients: &ClientPool,
    device_serial: &str,
) -> CoreResult<(CurtailmentState, CurtailmentOutcome)> {
    let Some(price) = current_feed_in else {
        return Ok((state, CurtailmentOutcome::NoChange));
    };

    if !state.active && config.enabled && price < config.threshold_cents_per_kwh {
        clients
            .inverter
            .set_export_limit(&clients.inverter_breaker, device_serial, 0, CallOrigin::User)
            .await?;
        return Ok((
            CurtailmentState { active: true, last_change: Some(chrono::Utc::now()) },
            CurtailmentOutcome::Activated,
        ));
    }

    if state.active && (price >= config.threshold_cents_per_kwh || !config.enabled) {
        clients
            .inverter
            .set_export_limit(&clients.inverter_breaker, device_serial, config.restore_value_w, CallOrigin::User)
            .await?;
        return Ok((
            CurtailmentState { active: false, last_change: Some(chrono::Utc::now()) },
            CurtailmentOutcome::Deactivated,
        ));
    }

    Ok((state, CurtailmentOutcome::NoChange))
}
