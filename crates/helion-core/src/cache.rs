// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// Read-through TTL cache in front of the three external clients (§4.4). Freshness is
// always re-derived from `timestamp_ms + ttl_ms` at read time; the store's `expires_at`
// hint is a reclamation aid only, never trusted for correctness.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use helion_clients::ClientPool;
use helion_store::Store;
use helion_types::cache::{CacheDoc, CacheTtlDefaults};
use helion_types::config::Config;
use helion_types::signals::{InverterTelemetry, PriceInterval, WeatherSnapshot};
use helion_types::tenant::TenantId;

use crate::error::CoreResult;

/// One fetch result plus whether it was served from cache (§4.4 "Read-through with
/// TTL").
#[derive(Debug, Clone, Copy)]
pub struct Fetched<T> {
    pub data: T,
    pub cache_hit: bool,
    pub age_ms: i64,
}

/// Coalesces concurrent cache misses for the same (tenant, signal) pair so only one
/// fetch is in flight at a time; later waiters re-check the cache after acquiring the
/// per-key lock and typically observe the first waiter's freshly written document
/// (§4.4 "In-flight dedup").
pub struct CacheLayer {
    store: Arc<Store>,
    inflight: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CacheLayer {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store, inflight: SyncMutex::new(HashMap::new()) }
    }

    fn key_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        self.inflight.lock().entry(key.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    pub async fn telemetry(
        &self,
        tenant: &TenantId,
        config: &Config,
        defaults: &CacheTtlDefaults,
        clients: &ClientPool,
    ) -> CoreResult<Fetched<InverterTelemetry>> {
        let scope = "inverter_telemetry";
        let key = tenant.as_str();
        let ttl_ms = defaults.inverter_telemetry_ms(config.cache_ttls.inverter_telemetry_ms);
        let now_ms = Utc::now().timestamp_millis();

        if let Some(doc) = self.read_fresh::<InverterTelemetry>(scope, key, now_ms)? {
            return Ok(Fetched { data: doc.data, cache_hit: true, age_ms: doc.age_ms(now_ms) });
        }

        let lock = self.key_lock(&format!("{scope}:{key}"));
        let _guard = lock.lock().await;
        if let Some(doc) = self.read_fresh::<InverterTelemetry>(scope, key, now_ms)? {
            return Ok(Fetched { data: doc.data, cache_hit: true, age_ms: doc.age_ms(now_ms) });
        }

        let reading = clients.inverter.real_time(&clients.inverter_breaker, &config.device_serial).await?;
        let telemetry: InverterTelemetry = reading.into();
        self.write(scope, key, CacheDoc::new(telemetry, now_ms, ttl_ms));
        self.record_call(tenant, "inverter");
        Ok(Fetched { data: telemetry, cache_hit: false, age_ms: 0 })
    }

    pub async fn weather(
        &self,
        tenant: &TenantId,
        config: &Config,
        defaults: &CacheTtlDefaults,
        clients: &ClientPool,
        max_horizon_hours: u32,
    ) -> CoreResult<Fetched<WeatherSnapshot>> {
        let scope = "weather";
        let key = tenant.as_str();
        let ttl_ms = defaults.weather_ms(config.cache_ttls.weather_ms);
        let now_ms = Utc::now().timestamp_millis();

        if let Some(doc) = self.read_fresh::<WeatherSnapshot>(scope, key, now_ms)? {
            return Ok(Fetched { data: doc.data, cache_hit: true, age_ms: doc.age_ms(now_ms) });
        }

        let lock = self.key_lock(&format!("{scope}:{key}"));
        let _guard = lock.lock().await;
        if let Some(doc) = self.read_fresh::<WeatherSnapshot>(scope, key, now_ms)? {
            return Ok(Fetched { data: doc.data, cache_hit: true, age_ms: doc.age_ms(now_ms) });
        }

        // Over-fetch enough hours to cover the widest horizon any enabled rule needs,
        // capped at a week, so cache hits stay stable across rules of different
        // durations (§4.4 "Weather over-fetch").
        let place = format!("{},{}", config.location.lat, config.location.lon);
        let hours_ahead = max_horizon_hours.clamp(1, 24 * 7);
        let snapshot = clients.weather.hourly_forecast(&clients.weather_breaker, &place, hours_ahead).await?;
        self.write(scope, key, CacheDoc::new(snapshot.clone(), now_ms, ttl_ms));
        self.record_call(tenant, "weather");
        Ok(Fetched { data: snapshot, cache_hit: false, age_ms: 0 })
    }

    /// Price intervals for the tenant's site, gap-filled against the shared per-site
    /// cache (§4.4 "Price gap fill"). Intervals are merged and deduplicated on
    /// `(startTime, channelType)`, not refetched wholesale unless coverage is severely
    /// lopsided between the two channels.
    pub async fn prices(
        &self,
        config: &Config,
        defaults: &CacheTtlDefaults,
        clients: &ClientPool,
        lookahead_intervals: u32,
    ) -> CoreResult<Fetched<Vec<PriceInterval>>> {
        let scope = "prices";
        let key = &config.price_site_id;
        let ttl_ms = defaults.price_current_ms(config.cache_ttls.price_current_ms);
        let now_ms = Utc::now().timestamp_millis();

        if let Some(doc) = self.read_fresh::<Vec<PriceInterval>>(scope, key, now_ms)? {
            return Ok(Fetched { data: doc.data, cache_hit: true, age_ms: doc.age_ms(now_ms) });
        }

        let lock = self.key_lock(&format!("{scope}:{key}"));
        let _guard = lock.lock().await;
        if let Some(doc) = self.read_fresh::<Vec<PriceInterval>>(scope, key, now_ms)? {
            return Ok(Fetched { data: doc.data, cache_hit: true, age_ms: doc.age_ms(now_ms) });
        }

        let stale = self.store.cache_get::<Vec<PriceInterval>>(scope, key).ok().flatten();
        let fresh = clients.price.current_and_forecast(&clients.price_breaker, key, lookahead_intervals).await?;
        let merged = merge_intervals(stale.map(|d| d.data).unwrap_or_default(), fresh);
        self.write(scope, key, CacheDoc::new(merged.clone(), now_ms, ttl_ms));
        self.record_call(&config.uid, "price");
        Ok(Fetched { data: merged, cache_hit: false, age_ms: 0 })
    }

    /// Best-effort: a metrics-write failure must never fail the fetch that already
    /// succeeded (same tolerance as `write`'s cache-put failure, §4.4).
    fn record_call(&self, tenant: &TenantId, provider: &str) {
        if let Err(err) = self.store.record_api_call(tenant, provider, Utc::now().date_naive()) {
            warn!(tenant = tenant.as_str(), provider, error = %err, "api call counter write failed");
        }
    }

    fn read_fresh<T>(&self, scope: &str, key: &str, now_ms: i64) -> CoreResult<Option<CacheDoc<T>>>
    where
        T: serde::de::DeserializeOwned,
    {
        let doc = self.store.cache_get::<T>(scope, key)?;
        Ok(doc.filter(|d| d.is_fresh(now_ms)))
    }

    fn write<T>(&self, scope: &str, key: &str, doc: CacheDoc<T>)
    where
        T: serde::Serialize,
    {
        if let Err(err) = self.store.cache_put(scope, key, &doc) {
            warn!(scope, key, error = %err, "cache write failed, continuing with freshly fetched value");
        }
    }
}

/// Dedup on `(startTime, channelType)`, last-writer-wins, sorted by `startTime` (§4.4).
fn merge_intervals(stale: Vec<PriceInterval>, fresh: Vec<PriceInterval>) -> Vec<PriceInterval> {
    let mut by_key: HashMap<(i64, bool), PriceInterval> = HashMap::new();
    for interval in stale.into_iter().chain(fresh) {
        let is_feed_in = matches!(interval.channel, helion_types::rule::PriceChannel::FeedIn);
        by_key.insert((interval.start.timestamp_millis(), is_feed_in), interval);
    }
    let mut merged: Vec<PriceInterval> = by_key.into_values().collect();
    merged.sort_by_key(|i| i.start);
    merged
}
