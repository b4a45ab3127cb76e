//! Copyright (c) 2026 Helion Contributors
//!
//! Licensed under the MIT license. See LICENSE for details.

use serde::{Deserialize, Serialize};

/// One tenant's external-API call count for a single provider on a single UTC calendar
/// day (§6 "GET /api/metrics/api-calls", §8 property 1 "Counter fidelity"). Only real
/// fetches count; cache hits never increment this (§4.4, §4.6 "Counter discipline").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCallCounter {
    pub date: String,
    pub provider: String,
    pub count: u32,
}
