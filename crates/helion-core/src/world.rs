// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// The driver owns a typed, immutable-once-built "world" view of process-wide policy
// (cache TTL defaults, the circuit-breaker/retry presets already baked into
// `helion-clients`) plus a lightweight in-memory tenant registry it refreshes on a
// slower cadence than the per-tick heartbeat. There is deliberately no process-wide
// mutable singleton here: the registry is a plain ECS `World` used only for its typed
// component storage and queries, one entity per tenant, never a `Schedule` or `App`.

use std::collections::HashMap;

use bevy_ecs::component::Component;
use bevy_ecs::entity::Entity;
use bevy_ecs::world::World;

use helion_types::cache::CacheTtlDefaults;
use helion_types::config::Config;
use helion_types::tenant::TenantId;

#[derive(Component, Clone)]
struct TenantConfig(Config);

#[derive(Component, Clone, Copy)]
struct LastDispatchedAt(Option<i64>);

/// Immutable process-wide policy, built once at startup from configuration (§10.3) and
/// injected by reference into every cycle.
#[derive(Debug, Clone)]
pub struct DriverWorld {
    pub cache_ttl_defaults: CacheTtlDefaults,
    pub cycle_deadline_ms: i64,
}

impl Default for DriverWorld {
    fn default() -> Self {
        Self { cache_ttl_defaults: CacheTtlDefaults::default(), cycle_deadline_ms: 50_000 }
    }
}

/// Cheap in-memory tenant registry: tenant id plus its resolved config, refreshed from
/// the persistence store on a slower cadence than the per-minute heartbeat so the
/// per-tick "should this tenant run now" decision never requires a store round-trip.
pub struct TenantRegistry {
    world: World,
    by_tenant: HashMap<TenantId, Entity>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self { world: World::new(), by_tenant: HashMap::new() }
    }

    /// Insert or update a tenant's cached config, clearing its dispatch clock only on
    /// first registration.
    pub fn upsert(&mut self, tenant: TenantId, config: Config) {
        if let Some(&entity) = self.by_tenant.get(&tenant) {
            self.world.entity_mut(entity).get_mut::<TenantConfig>().expect("registry invariant").0 = config;
        } else {
            let entity = self.world.spawn((TenantConfig(config), LastDispatchedAt(None))).id();
            self.by_tenant.insert(tenant, entity);
        }
    }

    pub fn remove(&mut self, tenant: &TenantId) {
        if let Some(entity) = self.by_tenant.remove(tenant) {
            self.world.despawn(entity);
        }
    }

    pub fn config(&self, tenant: &TenantId) -> Option<&Config> {
        let entity = *self.by_tenant.get(tenant)?;
        self.world.get::<TenantConfig>(entity).map(|c| &c.0)
    }

    pub fn tenants(&self) -> impl Iterator<Item = &TenantId> {
        self.by_tenant.keys()
    }

    /// Whether `cycle_interval_ms` has elapsed since this tenant's last dispatch, per the
    /// driver's per-tenant dispatch gate (§4.1). Always `true` for a tenant never
    /// dispatched before.
    pub fn due(&self, tenant: &TenantId, now_ms: i64) -> bool {
        let Some(&entity) = self.by_tenant.get(tenant) else { return false };
        let Some(config) = self.world.get::<TenantConfig>(entity) else { return false };
        let Some(last) = self.world.get::<LastDispatchedAt>(entity).and_then(|l| l.0) else { return true };
        now_ms - last >= config.0.cycle_interval_ms() as i64
    }

    pub fn mark_dispatched(&mut self, tenant: &TenantId, now_ms: i64) {
        if let Some(&entity) = self.by_tenant.get(tenant)
            && let Some(mut mark) = self.world.entity_mut(entity).get_mut::<LastDispatchedAt>()
        {
            mark.0 = Some(now_ms);
        }
    }
}

impl Default for TenantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use helion_types::config::{CacheTtlOverrides, CurtailmentConfig, InverterModel, Location};

    use super::*;

    fn sample_config(interval_ms: u64) -> Config {
        Config {
            uid: TenantId::new("t1"),
            automation_enabled: true,
            device_serial: "SN1".into(),
            inverter_model: InverterModel::Solax,
            inverter_api_key: "k".into(),
            price_api_key: "k".into(),
            price_site_id: "site".into(),
            location: Location { lat: 0.0, lon: 0.0 },
            timezone: chrono_tz::UTC,
            cycle_interval_ms: Some(interval_ms),
            cache_ttls: CacheTtlOverrides::default(),
            blackout_windows: vec![],
            curtailment: CurtailmentConfig::default(),
        }
    }

    #[test]
    fn a_tenant_never_dispatched_is_always_due() {
        let mut registry = TenantRegistry::new();
        let tenant = TenantId::new("t1");
        registry.upsert(tenant.clone(), sample_config(60_000));
        assert!(registry.due(&tenant, 0));
    }

    #[test]
    fn dispatch_gate_respects_the_resolved_interval() {
        let mut registry = TenantRegistry::new();
        let tenant = TenantId::new("t1");
        registry.upsert(tenant.clone(), sample_config(60_000));
        registry.mark_dispatched(&tenant, 1_000);
        assert!(!registry.due(&tenant, 30_000));
        assert!(registry.due(&tenant, 61_000));
    }

    #[test]
    fn removed_tenant_is_never_due() {
        let mut registry = TenantRegistry::new();
        let tenant = TenantId::new("t1");
        registry.upsert(tenant.clone(), sample_config(60_000));
        registry.remove(&tenant);
        assert!(!registry.due(&tenant, 1_000_000));
    }
}
