//! Copyright (c) 2026 Helion Contributors
//!
//! Licensed under the MIT license. See LICENSE for details.
//!
//! The inverter's scheduler is an ordered list of 8 time-window slots plus a global enable
//! flag (§6 "Slot format"). The manufacturer wire protocol behind this is explicitly out of
//! scope; this module only models the shape the engine composes and verifies.

use serde::{Deserialize, Serialize};

use crate::rule::WorkMode;

pub const SLOT_COUNT: usize = 8;

/// A single scheduler time-window slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub enable: bool,
    pub work_mode: WorkMode,
    pub start_hh: u8,
    pub start_mm: u8,
    pub end_hh: u8,
    pub end_mm: u8,
    pub min_soc_on_grid: u8,
    pub fd_soc: u8,
    pub fd_pwr: u32,
    pub max_soc: u8,
}

impl Slot {
    /// A fully disabled slot. `work_mode` is a don't-care but `SelfUse` is the
    /// conventional value a "cleared" payload carries (§4.6.9 step 1).
    pub const fn disabled() -> Self {
        Self {
            enable: false,
            work_mode: WorkMode::SelfUse,
            start_hh: 0,
            start_mm: 0,
            end_hh: 0,
            end_mm: 0,
            min_soc_on_grid: 0,
            fd_soc: 0,
            fd_pwr: 0,
            max_soc: 100,
        }
    }

    /// Does this slot's start/end/enable match the given expectation? Used by the
    /// verification read (§4.6.8.5).
    pub fn matches_window(&self, start_hh: u8, start_mm: u8, end_hh: u8, end_mm: u8) -> bool {
        self.enable
            && self.start_hh == start_hh
            && self.start_mm == start_mm
            && self.end_hh == end_hh
            && self.end_mm == end_mm
    }
}

/// The 8-slot schedule the engine sends to `ApplyScheduler`. A "cleared" segment has all
/// slots `Slot::disabled()`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment(pub [Slot; SLOT_COUNT]);

impl Segment {
    pub fn cleared() -> Self {
        Self([Slot::disabled(); SLOT_COUNT])
    }

    /// Build a segment with everything disabled except slot 0, which carries the given
    /// rule's action window (§4.6 step 8.1).
    pub fn for_active_slot(slot0: Slot) -> Self {
        let mut slots = [Slot::disabled(); SLOT_COUNT];
        slots[0] = slot0;
        Self(slots)
    }

    pub fn slot0(&self) -> Slot {
        self.0[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleared_segment_has_all_slots_disabled() {
        let seg = Segment::cleared();
        assert!(seg.0.iter().all(|s| !s.enable));
    }

    #[test]
    fn for_active_slot_only_enables_slot_zero() {
        let mut slot0 = Slot::disabled();
        slot0.enable = true;
        slot0.start_hh = 10;
        let seg = Segment::for_active_slot(slot0);
        assert!(seg.0[0].enable);
        assert!(seg.0[1..].iter().all(|s| !s.enable));
    }

    #[test]
    fn matches_window_requires_enable_and_exact_times() {
        let mut slot = Slot::disabled();
        slot.enable = true;
        slot.start_hh = 10;
        slot.start_mm = 0;
        slot.end_hh = 10;
        slot.end_mm = 30;
        assert!(slot.matches_window(10, 0, 10, 30));
        assert!(!slot.matches_window(10, 1, 10, 30));
        let mut disabled = slot;
        disabled.enable = false;
        assert!(!disabled.matches_window(10, 0, 10, 30));
    }
}
