//! Copyright (c) 2026 Helion Contributors
//!
//! Licensed under the MIT license. See LICENSE for details.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evaluation::RuleEvaluation;
use crate::tenant::TenantId;

/// The transition a cycle decided to take (§4.6, §4.7, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    /// No rule triggered and no active rule existed.
    Idle,
    /// A new rule was started (apply protocol succeeded and verified).
    Started,
    /// The active rule's conditions remained met; no inverter call was issued.
    Continued,
    /// A higher-priority rule preempted the previously active one.
    Preempted,
    /// The active rule was cleared (conditions lost, blackout, or automation disabled).
    Cleared,
    /// The apply protocol failed (flag/scheduler mismatch or verification failure).
    ApplyFailed,
    /// The clear-active protocol failed after its retry budget.
    ClearFailed,
    CurtailmentActivated,
    CurtailmentDeactivated,
    QuickControlExpired,
}

/// Severity for the rare `alert` audit lines (§4.6 step 9.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

/// One append-only record per cycle per tenant (§3 "AuditEntry").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub uid: TenantId,
    pub cycle_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub triggered: bool,
    pub rule_id: Option<String>,
    pub rule_name: Option<String>,
    pub rule_evaluations: Vec<RuleEvaluation>,
    pub action_taken: ActionTaken,
    pub active_rule_before: Option<String>,
    pub active_rule_after: Option<String>,
    pub rules_evaluated: u32,
    pub cycle_duration_ms: i64,
    pub manual_end: Option<bool>,
    pub reason: Option<String>,
    pub severity: Option<AuditSeverity>,
}

impl AuditEntry {
    pub fn cycle_duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }
}
