// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// The automation engine: per-tenant cycle evaluation (C5/C6), the curtailment state
// machine (C7), quick-control overrides (C9), and the clock-driven dispatcher (C1) that
// ties them together over the cache (C4) and store.

pub mod apply;
pub mod cache;
pub mod curtailment;
pub mod cycle;
pub mod driver;
pub mod error;
pub mod evaluator;
pub mod quickcontrol;
pub mod world;

pub use error::{CoreError, CoreResult};
