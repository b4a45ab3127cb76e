//! Copyright (c) 2026 Helion Contributors
//!
//! Licensed under the MIT license. See LICENSE for details.
//!
//! Output shape of the pure rule evaluator (§4.5). Kept in `helion-types` because
//! [`crate::audit::AuditEntry`] embeds it verbatim.

use serde::{Deserialize, Serialize};

/// Why a single condition did or didn't hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalReason {
    Ok,
    NoData,
    ThresholdNotMet,
    TimeOutOfWindow,
}

/// Per-condition evaluation breakdown (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionResult {
    pub name: String,
    pub met: bool,
    pub actual: Option<f32>,
    pub target: Option<f32>,
    pub reason: EvalReason,
}

/// A rule's overall outcome is three-valued: exception-based control flow for missing
/// data is explicitly rejected by the design (§9); `NoData` suppresses any state
/// transition rather than being silently coerced to `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    Met,
    NotMet,
    /// At least one enabled condition returned `no_data`.
    Indeterminate,
}

impl TriState {
    pub fn is_met(self) -> bool {
        matches!(self, TriState::Met)
    }

    pub fn is_indeterminate(self) -> bool {
        matches!(self, TriState::Indeterminate)
    }
}

/// Result of evaluating one rule's conditions against one signal snapshot (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub rule_id: String,
    pub rule_name: String,
    pub priority: u32,
    pub all_met: TriState,
    pub conditions: Vec<ConditionResult>,
    pub skipped_invalid_config: Option<String>,
}
