// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use helion_types::scheduler::{Segment, Slot};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{ClientError, ClientResult};
use crate::retry::{retry, RetryPolicy};
use crate::signing::compute_signature;

/// Whether a call is driven by a newly-triggered rule (counts against the tenant's
/// per-day API quota) or by the system settling into a steady state — automation
/// shutoff, flag-based clear, preempt clear, quick-control auto-cleanup, verification
/// reads (§4.6 "Counter discipline"). The engine decides this per call site; the client
/// only carries the flag through so callers can account for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOrigin {
    System,
    User,
}

impl CallOrigin {
    pub fn is_metered(self) -> bool {
        matches!(self, CallOrigin::User)
    }
}

/// Live telemetry returned by `RealTime` (§4.3). A dedicated wire-shape type (rather than
/// deserializing straight into [`helion_types::signals::InverterTelemetry`]) keeps the
/// camelCase wire contract separate from the domain type's field names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealTimeReading {
    pub soc_pct: f32,
    pub battery_temp_c: f32,
    pub ambient_temp_c: f32,
    pub inverter_temp_c: f32,
    pub pv_power_w: f32,
    pub load_power_w: f32,
    pub grid_import_w: f32,
    pub feed_in_w: f32,
    pub export_limit_w: u32,
}

impl From<RealTimeReading> for helion_types::signals::InverterTelemetry {
    fn from(r: RealTimeReading) -> Self {
        Self {
            soc_pct: r.soc_pct,
            battery_temp_c: r.battery_temp_c,
            ambient_temp_c: r.ambient_temp_c,
            inverter_temp_c: r.inverter_temp_c,
            pv_power_w: r.pv_power_w,
            load_power_w: r.load_power_w,
            grid_import_w: r.grid_import_w,
            feed_in_w: r.feed_in_w,
            export_limit_w: r.export_limit_w,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SlotWire {
    enable: bool,
    work_mode: helion_types::rule::WorkMode,
    start_hh: u8,
    start_mm: u8,
    end_hh: u8,
    end_mm: u8,
    min_soc_on_grid: u8,
    fd_soc: u8,
    fd_pwr: u32,
    max_soc: u8,
}

impl From<Slot> for SlotWire {
    fn from(slot: Slot) -> Self {
        Self {
            enable: slot.enable,
            work_mode: slot.work_mode,
            start_hh: slot.start_hh,
            start_mm: slot.start_mm,
            end_hh: slot.end_hh,
            end_mm: slot.end_mm,
            min_soc_on_grid: slot.min_soc_on_grid,
            fd_soc: slot.fd_soc,
            fd_pwr: slot.fd_pwr,
            max_soc: slot.max_soc,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    errno: i32,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the inverter vendor's device-control API (§4.3 "Inverter client").
#[derive(Clone)]
pub struct InverterClient {
    base_url: String,
    token: String,
    http: Client,
}

impl InverterClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> ClientResult<Self> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            base_url: base_url.into(),
            token: token.into(),
            http,
        })
    }

    /// 30s timeout client used only for `ApplyScheduler`, which the vendor API is known
    /// to answer slowly under load (§4.3).
    fn apply_timeout_http(&self) -> ClientResult<Client> {
        Ok(Client::builder().timeout(Duration::from_secs(30)).build()?)
    }

    fn signed_request(&self, path: &str) -> (String, i64, String) {
        let timestamp_millis = Utc::now().timestamp_millis();
        let signature = compute_signature(path, &self.token, timestamp_millis);
        (format!("{}{path}", self.base_url), timestamp_millis, signature)
    }

    async fn send_signed<T, B>(
        &self,
        http: &Client,
        path: &str,
        device_sn: &str,
        body: Option<&B>,
    ) -> ClientResult<T>
    where
        T: for<'de> Deserialize<'de>,
        B: Serialize,
    {
        let (url, timestamp_millis, signature) = self.signed_request(path);
        let mut request = match body {
            Some(b) => http.post(&url).json(b),
            None => http.get(&url),
        };
        request = request
            .query(&[("deviceSN", device_sn)])
            .header("X-Timestamp", timestamp_millis.to_string())
            .header("X-Signature", signature)
            .bearer_auth(&self.token);

        let response = request.send().await?;
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(ClientError::RateLimited),
            status if status.is_success() => {
                let envelope: Envelope<T> = response.json().await?;
                if envelope.errno != 0 {
                    return Err(ClientError::ApiError {
                        status: status.as_u16(),
                        body: envelope.error.unwrap_or_else(|| format!("errno={}", envelope.errno)),
                    });
                }
                envelope
                    .result
                    .ok_or_else(|| ClientError::InvalidResponse("missing result payload".into()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ClientError::ApiError { status: status.as_u16(), body })
            }
        }
    }

    /// Same envelope handling as [`Self::send_signed`], but for ack-only endpoints whose
    /// vendor-side `result` is typically `null` on success — `Option<()>` would otherwise
    /// reject that as a missing payload, since serde always maps JSON `null` to `None`
    /// regardless of the wrapped type.
    async fn send_signed_ack<B>(&self, http: &Client, path: &str, device_sn: &str, body: Option<&B>) -> ClientResult<()>
    where
        B: Serialize,
    {
        let (url, timestamp_millis, signature) = self.signed_request(path);
        let mut request = match body {
            Some(b) => http.post(&url).json(b),
            None => http.get(&url),
        };
        request = request
            .query(&[("deviceSN", device_sn)])
            .header("X-Timestamp", timestamp_millis.to_string())
            .header("X-Signature", signature)
            .bearer_auth(&self.token);

        let response = request.send().await?;
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(ClientError::RateLimited),
            status if status.is_success() => {
                let envelope: Envelope<serde_json::Value> = response.json().await?;
                if envelope.errno != 0 {
                    return Err(ClientError::ApiError {
                        status: status.as_u16(),
                        body: envelope.error.unwrap_or_else(|| format!("errno={}", envelope.errno)),
                    });
                }
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ClientError::ApiError { status: status.as_u16(), body })
            }
        }
    }

    pub async fn real_time(&self, breaker: &CircuitBreaker, device_sn: &str) -> ClientResult<RealTimeReading> {
        if !breaker.allow_request() {
            return Err(ClientError::CircuitOpen { provider: breaker.provider() });
        }
        let result = retry(RetryPolicy::default_preset(), "inverter.real_time", || {
            self.send_signed::<RealTimeReading, ()>(&self.http, "/api/v1/inverter/realtime", device_sn, None)
        })
        .await;
        record_outcome(breaker, &result);
        result
    }

    pub async fn get_scheduler(&self, breaker: &CircuitBreaker, device_sn: &str) -> ClientResult<Segment> {
        if !breaker.allow_request() {
            return Err(ClientError::CircuitOpen { provider: breaker.provider() });
        }
        let result = retry(RetryPolicy::verify_preset(), "inverter.get_scheduler", || async {
            let slots: [SlotWireOwned; 8] = self
                .send_signed::<[SlotWireOwned; 8], ()>(&self.http, "/api/v1/scheduler/get", device_sn, None)
                .await?;
            Ok(Segment(slots.map(Slot::from)))
        })
        .await;
        record_outcome(breaker, &result);
        result
    }

    /// Apply-protocol write (§4.6.8.2): critical retry preset, 30s timeout, system- or
    /// user-originated depending on the caller's situation.
    pub async fn apply_scheduler(
        &self,
        breaker: &CircuitBreaker,
        device_sn: &str,
        segment: Segment,
        _origin: CallOrigin,
    ) -> ClientResult<()> {
        if !breaker.allow_request() {
            return Err(ClientError::CircuitOpen { provider: breaker.provider() });
        }
        let http = self.apply_timeout_http()?;
        let slots: [SlotWire; 8] = segment.0.map(SlotWire::from);
        let result = retry(RetryPolicy::critical_preset(), "inverter.apply_scheduler", || {
            self.send_signed_ack(&http, "/api/v1/scheduler/apply", device_sn, Some(&slots))
        })
        .await;
        record_outcome(breaker, &result);
        result
    }

    /// Clear-active write (§4.6.9.1): same endpoint as [`Self::apply_scheduler`], but with
    /// the weaker "clear" retry preset (3 attempts, fixed 1.2s backoff) rather than the
    /// apply protocol's "critical" preset — a failed clear must give up quickly so the
    /// cycle can record `clearFailureAttempts` and move on, not camp on the call for up to
    /// 30s per attempt.
    pub async fn clear_scheduler(&self, breaker: &CircuitBreaker, device_sn: &str, origin: CallOrigin) -> ClientResult<()> {
        if !breaker.allow_request() {
            return Err(ClientError::CircuitOpen { provider: breaker.provider() });
        }
        let slots: [SlotWire; 8] = Segment::cleared().0.map(SlotWire::from);
        let _ = origin;
        let result = retry(RetryPolicy::clear_preset(), "inverter.clear_scheduler", || {
            self.send_signed_ack(&self.http, "/api/v1/scheduler/apply", device_sn, Some(&slots))
        })
        .await;
        record_outcome(breaker, &result);
        result
    }

    pub async fn set_flag(
        &self,
        breaker: &CircuitBreaker,
        device_sn: &str,
        enabled: bool,
        _origin: CallOrigin,
    ) -> ClientResult<()> {
        if !breaker.allow_request() {
            return Err(ClientError::CircuitOpen { provider: breaker.provider() });
        }
        #[derive(Serialize)]
        struct Body {
            enabled: bool,
        }
        let result = retry(RetryPolicy::default_preset(), "inverter.set_flag", || {
            self.send_signed_ack(&self.http, "/api/v1/scheduler/flag", device_sn, Some(&Body { enabled }))
        })
        .await;
        record_outcome(breaker, &result);
        result
    }

    pub async fn set_export_limit(
        &self,
        breaker: &CircuitBreaker,
        device_sn: &str,
        watts: u32,
        _origin: CallOrigin,
    ) -> ClientResult<()> {
        if !breaker.allow_request() {
            return Err(ClientError::CircuitOpen { provider: breaker.provider() });
        }
        #[derive(Serialize)]
        struct Body {
            watts: u32,
        }
        let result = retry(RetryPolicy::default_preset(), "inverter.set_export_limit", || {
            self.send_signed_ack(&self.http, "/api/v1/inverter/export-limit", device_sn, Some(&Body { watts }))
        })
        .await;
        record_outcome(breaker, &result);
        result
    }
}

/// Owned, `Deserialize`-able mirror of [`Slot`] for wire decoding (`Slot` itself already
/// derives `Deserialize`, but the array-of-struct shape needs a named type to map through
/// `.map(Slot::from)` cleanly).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotWireOwned {
    enable: bool,
    work_mode: helion_types::rule::WorkMode,
    start_hh: u8,
    start_mm: u8,
    end_hh: u8,
    end_mm: u8,
    min_soc_on_grid: u8,
    fd_soc: u8,
    fd_pwr: u32,
    max_soc: u8,
}

impl From<SlotWireOwned> for Slot {
    fn from(w: SlotWireOwned) -> Self {
        Slot {
            enable: w.enable,
            work_mode: w.work_mode,
            start_hh: w.start_hh,
            start_mm: w.start_mm,
            end_hh: w.end_hh,
            end_mm: w.end_mm,
            min_soc_on_grid: w.min_soc_on_grid,
            fd_soc: w.fd_soc,
            fd_pwr: w.fd_pwr,
            max_soc: w.max_soc,
        }
    }
}

fn record_outcome<T>(breaker: &CircuitBreaker, result: &ClientResult<T>) {
    match result {
        Ok(_) => breaker.record_success(),
        Err(err) if err.is_rate_limited() => {
            debug!(provider = breaker.provider(), "rate limited, not counted as a breaker failure");
        }
        Err(err) => {
            warn!(provider = breaker.provider(), error = %err, "inverter call failed");
            breaker.record_failure();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockito::Server;
    use serde_json::json;

    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("inverter", 3, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn real_time_parses_successful_envelope() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/api/v1/inverter/realtime".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "errno": 0,
                    "result": {
                        "socPct": 54.0,
                        "batteryTempC": 21.0,
                        "ambientTempC": 18.0,
                        "inverterTempC": 30.0,
                        "pvPowerW": 2200.0,
                        "loadPowerW": 800.0,
                        "gridImportW": 0.0,
                        "feedInW": 1400.0,
                        "exportLimitW": 6000
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = InverterClient::new(server.url(), "tok_abc123").unwrap();
        let reading = client.real_time(&breaker(), "SN123").await.unwrap();
        assert_eq!(reading.soc_pct, 54.0);
        assert_eq!(reading.export_limit_w, 6000);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limited_status_maps_to_rate_limited_error_without_tripping_breaker() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/api/v1/inverter/realtime".into()))
            .with_status(429)
            .expect_at_least(1)
            .create_async()
            .await;

        let client = InverterClient::new(server.url(), "tok").unwrap();
        let cb = breaker();
        let result = client.real_time(&cb, "SN123").await;
        assert!(matches!(result, Err(ClientError::RetriesExhausted { .. })));
        assert!(cb.allow_request(), "rate limiting alone must not open the breaker");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_error_envelope_is_surfaced_and_trips_breaker_after_threshold() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/api/v1/inverter/realtime".into()))
            .with_status(200)
            .with_body(json!({"errno": 40001, "error": "illegal signature"}).to_string())
            .expect_at_least(1)
            .create_async()
            .await;

        let client = InverterClient::new(server.url(), "tok").unwrap();
        let cb = CircuitBreaker::new("inverter", 1, Duration::from_secs(30));
        let result = client.real_time(&cb, "SN123").await;
        assert!(result.is_err());
        assert!(!cb.allow_request());
    }
}
