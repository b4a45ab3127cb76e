// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.

//! Logging initialisation shared by every binary. One global `tracing` subscriber, driven
//! by `RUST_LOG` (default `info`), human-readable for local runs.

use tracing_subscriber::FmtSubscriber;

/// Install the process-wide tracing subscriber. Call once, near the top of `main`.
///
/// # Panics
/// Panics if a global subscriber has already been installed — that indicates a bug in
/// startup ordering, not a recoverable runtime condition.
pub fn init_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default tracing subscriber failed");
}
