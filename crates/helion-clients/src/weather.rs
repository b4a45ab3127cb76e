// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::warn;

use helion_types::signals::{WeatherHour, WeatherSnapshot};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{ClientError, ClientResult};
use crate::retry::{retry, RetryPolicy};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireHour {
    hour: DateTime<Utc>,
    solar_radiation: f32,
    cloud_cover: f32,
    uv_index: f32,
    temperature: f32,
}

impl From<WireHour> for WeatherHour {
    fn from(w: WireHour) -> Self {
        Self {
            hour: w.hour,
            solar_radiation_w_m2: w.solar_radiation,
            cloud_cover_pct: w.cloud_cover,
            uv_index: w.uv_index,
            temperature_c: w.temperature,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    errno: i32,
    #[serde(default)]
    result: Option<Vec<WireHour>>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the hourly weather forecast feed (§4.3 "Weather client").
#[derive(Clone)]
pub struct WeatherClient {
    base_url: String,
    token: String,
    http: Client,
}

impl WeatherClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> ClientResult<Self> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { base_url: base_url.into(), token: token.into(), http })
    }

    /// Fetch an hourly sequence for `place` covering at least `hours_ahead` hours
    /// (capped by the caller at ~7 days per §4.4's over-fetch policy). The hour matching
    /// the current wall-clock hour is selected later by [`WeatherSnapshot::hour_at`], not
    /// assumed to be index 0.
    pub async fn hourly_forecast(
        &self,
        breaker: &CircuitBreaker,
        place: &str,
        hours_ahead: u32,
    ) -> ClientResult<WeatherSnapshot> {
        if !breaker.allow_request() {
            return Err(ClientError::CircuitOpen { provider: breaker.provider() });
        }
        let result = retry(RetryPolicy::default_preset(), "weather.hourly_forecast", || async {
            let url = format!("{}/api/v1/weather/hourly", self.base_url);
            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .query(&[("place", place), ("hoursAhead", &hours_ahead.to_string())])
                .send()
                .await?;
            match response.status() {
                StatusCode::TOO_MANY_REQUESTS => Err(ClientError::RateLimited),
                status if status.is_success() => {
                    let envelope: Envelope = response.json().await?;
                    if envelope.errno != 0 {
                        return Err(ClientError::ApiError {
                            status: status.as_u16(),
                            body: envelope.error.unwrap_or_else(|| format!("errno={}", envelope.errno)),
                        });
                    }
                    let hours = envelope
                        .result
                        .ok_or_else(|| ClientError::InvalidResponse("missing result payload".into()))?;
                    Ok(WeatherSnapshot { hours: hours.into_iter().map(WeatherHour::from).collect() })
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    Err(ClientError::ApiError { status: status.as_u16(), body })
                }
            }
        })
        .await;

        match &result {
            Ok(_) => breaker.record_success(),
            Err(err) if err.is_rate_limited() => {}
            Err(err) => {
                warn!(error = %err, "weather fetch failed");
                breaker.record_failure();
            }
        }
        result
    }
}
