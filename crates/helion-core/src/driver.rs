// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// The clock-driven dispatcher (C1, §4.1): one heartbeat per minute, per-tenant dispatch
// gated by `TenantRegistry::due`, each tenant's automation cycle (C6) and curtailment
// pass (C7) run concurrently with the others and bounded by a per-cycle deadline so one
// tenant's slow provider can never stall the rest of the tick.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use helion_clients::{ClientError, ClientPool};
use helion_store::Store;
use helion_types::config::Config;
use helion_types::rule::PriceChannel;
use helion_types::tenant::TenantId;

use crate::cache::CacheLayer;
use crate::curtailment::{self, CurtailmentOutcome};
use crate::cycle;
use crate::error::CoreResult;
use crate::world::{DriverWorld, TenantRegistry};

/// Widest price lookahead the curtailment pass needs — only the current interval
/// matters, but fetching a little ahead keeps this call a cache hit on the common path
/// where C6 already pulled prices for a rule this same tick.
const PRICE_LOOKAHEAD_INTERVALS: u32 = 6;

/// Deployment-wide client endpoints. Only the API keys and device serial vary per
/// tenant (carried on [`Config`]); base URLs and the weather subscription key are
/// process configuration (§10.3), not tenant configuration.
#[derive(Debug, Clone)]
pub struct DriverEndpoints {
    pub inverter_base_url: String,
    pub price_base_url: String,
    pub weather_base_url: String,
    pub weather_api_key: String,
}

/// Combine deployment-wide endpoints with a tenant's own credentials into a fresh
/// per-tenant client pool (§4.3). Exposed so the HTTP surface can build one for
/// synchronous, out-of-band operations (manual cycle trigger, quick-control, the
/// synchronous clear-active on rule disable/delete required by §6) without duplicating
/// this wiring.
pub fn build_client_pool(endpoints: &DriverEndpoints, config: &Config) -> Result<ClientPool, ClientError> {
    ClientPool::new(
        endpoints.inverter_base_url.clone(),
        config.inverter_api_key.clone(),
        endpoints.price_base_url.clone(),
        config.price_api_key.clone(),
        endpoints.weather_base_url.clone(),
        endpoints.weather_api_key.clone(),
    )
}

/// Owns the tenant registry, the per-tenant client pools built from it, and drives one
/// tick at a time. `refresh_tenants` and `tick` are separate so a caller can run them on
/// different cadences (§4.1: registry refresh slower than the per-minute heartbeat).
pub struct Driver {
    store: Arc<Store>,
    cache: Arc<CacheLayer>,
    endpoints: DriverEndpoints,
    world: DriverWorld,
    registry: TenantRegistry,
    client_pools: HashMap<TenantId, Arc<ClientPool>>,
}

impl Driver {
    pub fn new(store: Arc<Store>, endpoints: DriverEndpoints, world: DriverWorld) -> Self {
        Self {
            cache: Arc::new(CacheLayer::new(store.clone())),
            store,
            endpoints,
            world,
            registry: TenantRegistry::new(),
            client_pools: HashMap::new(),
        }
    }

    /// Reconcile the in-memory registry against `list_tenants_with_automation_enabled`.
    /// A tenant whose config fails to build a client pool (malformed URL, etc.) is
    /// dropped from dispatch with a warning rather than failing the whole refresh.
    pub fn refresh_tenants(&mut self) -> CoreResult<()> {
        let tenants = self.store.list_tenants_with_automation_enabled()?;
        let mut seen = HashSet::with_capacity(tenants.len());

        for tenant in &tenants {
            let Some(config) = self.store.get_config(tenant)? else { continue };
            match build_client_pool(&self.endpoints, &config) {
                Ok(pool) => {
                    self.client_pools.insert(tenant.clone(), Arc::new(pool));
                    self.registry.upsert(tenant.clone(), config);
                }
                Err(err) => {
                    warn!(tenant = tenant.as_str(), error = %err, "could not build client pool, tenant skipped this refresh");
                }
            }
            seen.insert(tenant.clone());
        }

        let stale: Vec<TenantId> = self.registry.tenants().filter(|t| !seen.contains(*t)).cloned().collect();
        for tenant in stale {
            self.registry.remove(&tenant);
            self.client_pools.remove(&tenant);
        }
        Ok(())
    }

    /// One heartbeat. Every due tenant's cycle runs as its own task so a slow provider
    /// on one tenant never delays another's dispatch; a timeout or error is logged and
    /// swallowed so the driver always completes the tick.
    pub async fn tick(&mut self, now: DateTime<Utc>) {
        let now_ms = now.timestamp_millis();
        let due: Vec<TenantId> = self.registry.tenants().filter(|t| self.registry.due(t, now_ms)).cloned().collect();
        if due.is_empty() {
            return;
        }

        let deadline = Duration::from_millis(self.world.cycle_deadline_ms as u64);
        let mut tasks = tokio::task::JoinSet::new();
        for tenant in &due {
            let (Some(config), Some(clients)) = (self.registry.config(tenant).cloned(), self.client_pools.get(tenant).cloned()) else {
                continue;
            };
            let store = self.store.clone();
            let cache = self.cache.clone();
            let world = self.world.clone();
            let tenant = tenant.clone();
            tasks.spawn(async move {
                let outcome = tokio::time::timeout(deadline, run_tenant(&store, &cache, &clients, &world, &tenant, &config, now)).await;
                (tenant, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((tenant, Ok(Ok(())))) => {
                    info!(tenant = tenant.as_str(), "tick completed");
                }
                Ok((tenant, Ok(Err(err)))) => {
                    error!(tenant = tenant.as_str(), error = %err, "cycle failed, will retry next tick");
                }
                Ok((tenant, Err(_))) => {
                    error!(tenant = tenant.as_str(), deadline_ms = self.world.cycle_deadline_ms, "cycle exceeded its deadline, abandoning this tick");
                }
                Err(join_err) => {
                    error!(error = %join_err, "tenant task panicked");
                }
            }
        }

        for tenant in &due {
            self.registry.mark_dispatched(tenant, now_ms);
        }
    }
}

/// C6 then C7 for one tenant. Curtailment reads `currentFeedInPrice` through the same
/// cache C6 just populated, so when a rule already needed prices this cycle the second
/// fetch is a cache hit and costs no extra provider call.
pub async fn run_tenant(
    store: &Store,
    cache: &CacheLayer,
    clients: &ClientPool,
    world: &DriverWorld,
    tenant: &TenantId,
    config: &Config,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    let outcome = cycle::run(store, cache, clients, &world.cache_ttl_defaults, tenant, config, now).await?;

    // Skip the price fetch entirely when curtailment is off and was never tripped —
    // the transition check below can only ever yield `NoChange` in that case anyway.
    let current_feed_in = if config.curtailment.enabled || outcome.state.curtailment.active {
        let fetched = cache.prices(config, &world.cache_ttl_defaults, clients, PRICE_LOOKAHEAD_INTERVALS).await?;
        fetched.data.iter().find(|i| i.channel == PriceChannel::FeedIn && i.covers(now)).map(|i| i.per_kwh)
    } else {
        None
    };

    let (next_curtailment, result) =
        curtailment::tick(outcome.state.curtailment, &config.curtailment, current_feed_in, clients, &config.device_serial).await?;

    if result != CurtailmentOutcome::NoChange {
        store.merge_state(tenant, |s| s.curtailment = next_curtailment)?;
        info!(tenant = tenant.as_str(), outcome = ?result, "curtailment transitioned");
    }

    Ok(())
}
