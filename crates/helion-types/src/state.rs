//! Copyright (c) 2026 Helion Contributors
//!
//! Licensed under the MIT license. See LICENSE for details.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rule::WorkMode;
use crate::scheduler::Segment;
use crate::tenant::TenantId;

/// Curtailment sub-state embedded in [`AutomationState`] (§3, §4.7).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CurtailmentState {
    pub active: bool,
    pub last_change: Option<DateTime<Utc>>,
}

/// The single live per-tenant automation state document (§3 "AutomationState"). Updated
/// only by the engine; read by the HTTP status surface (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationState {
    pub uid: TenantId,
    pub enabled: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub active_rule: Option<String>,
    pub active_rule_name: Option<String>,
    pub active_segment: Option<Segment>,
    pub active_segment_enabled: bool,
    pub in_blackout: bool,
    pub segments_cleared: bool,
    pub curtailment: CurtailmentState,
    pub clear_failure_attempts: u32,
}

impl AutomationState {
    pub fn idle(uid: TenantId) -> Self {
        Self {
            uid,
            enabled: false,
            last_check: None,
            active_rule: None,
            active_rule_name: None,
            active_segment: None,
            active_segment_enabled: false,
            in_blackout: false,
            segments_cleared: true,
            curtailment: CurtailmentState::default(),
            clear_failure_attempts: 0,
        }
    }

    /// Invariant 2: `active_rule != null => active_rule_name != null`.
    pub fn invariant_holds(&self) -> bool {
        self.active_rule.is_some() == self.active_rule_name.is_some()
    }
}

/// A bounded-duration manual override that preempts the cycle engine entirely while
/// active (§4.9 "Quick-Control Override").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickControlOverride {
    pub uid: TenantId,
    pub active: bool,
    pub work_mode: WorkMode,
    pub power_w: u32,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub source: String,
}

impl QuickControlOverride {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
