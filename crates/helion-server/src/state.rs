// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.

use std::sync::Arc;

use helion_clients::ClientPool;
use helion_core::cache::CacheLayer;
use helion_core::driver::{build_client_pool, DriverEndpoints};
use helion_store::Store;
use helion_types::cache::CacheTtlDefaults;
use helion_types::config::Config;

use crate::error::{ApiError, ApiResult};

/// Shared handler state. Every request that needs to talk to the inverter/price/weather
/// providers builds a fresh [`ClientPool`] from the tenant's own stored [`Config`] plus
/// the deployment-wide [`DriverEndpoints`] (§4.3) — the same construction the driver uses
/// for its own tick, just invoked synchronously for a single tenant (§6).
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub cache: Arc<CacheLayer>,
    pub endpoints: DriverEndpoints,
    pub cache_ttl_defaults: CacheTtlDefaults,
}

impl AppState {
    pub fn new(store: Arc<Store>, endpoints: DriverEndpoints, cache_ttl_defaults: CacheTtlDefaults) -> Self {
        Self { cache: Arc::new(CacheLayer::new(store.clone())), store, endpoints, cache_ttl_defaults }
    }

    pub fn config_or_not_found(&self, tenant: &helion_types::tenant::TenantId) -> ApiResult<Config> {
        self.store
            .get_config(tenant)?
            .ok_or_else(|| ApiError::NotFound { kind: "config", id: tenant.as_str().to_owned() })
    }

    pub fn client_pool_for(&self, config: &Config) -> ApiResult<ClientPool> {
        build_client_pool(&self.endpoints, config)
            .map_err(|e| ApiError::BadRequest(format!("could not build client pool: {e}")))
    }
}
