// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.

//! Small ambient utilities shared by every Helion binary: logging setup and a cheap
//! monotonic-ish id helper used where a crate-local counter is cheaper than a UUID.

pub mod telemetry;

pub use telemetry::init_tracing;
