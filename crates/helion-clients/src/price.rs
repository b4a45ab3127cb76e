// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::warn;

use helion_types::rule::PriceChannel;
use helion_types::signals::PriceInterval;

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{ClientError, ClientResult};
use crate::retry::{retry, RetryPolicy};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInterval {
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    channel_type: WireChannel,
    per_kwh: f32,
    #[serde(rename = "type")]
    kind: WireKind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum WireChannel {
    General,
    FeedIn,
}

#[derive(Debug, Deserialize)]
enum WireKind {
    CurrentInterval,
    ForecastInterval,
}

impl From<WireInterval> for PriceInterval {
    /// Canonicalises the provider's feed-in sign convention: the provider sends feed-in
    /// prices as negative numbers (negative-cost = credit); the engine needs a
    /// positive-if-earning quantity so a rule like `feedInPrice >= 9` reads naturally
    /// (§4.3).
    fn from(w: WireInterval) -> Self {
        let (channel, per_kwh) = match w.channel_type {
            WireChannel::General => (PriceChannel::Buy, w.per_kwh),
            WireChannel::FeedIn => (PriceChannel::FeedIn, -w.per_kwh),
        };
        Self {
            start: w.start_time,
            end: w.end_time,
            channel,
            per_kwh,
            is_forecast: matches!(w.kind, WireKind::ForecastInterval),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    errno: i32,
    #[serde(default)]
    result: Option<Vec<WireInterval>>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the electricity market price feed (§4.3 "Price client").
#[derive(Clone)]
pub struct PriceClient {
    base_url: String,
    token: String,
    http: Client,
}

impl PriceClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> ClientResult<Self> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { base_url: base_url.into(), token: token.into(), http })
    }

    /// `CurrentAndForecast(siteId, lookaheadIntervals)` (§4.3). Returns current +
    /// forecast intervals with feed-in prices already canonicalised to
    /// positive-if-earning.
    pub async fn current_and_forecast(
        &self,
        breaker: &CircuitBreaker,
        site_id: &str,
        lookahead_intervals: u32,
    ) -> ClientResult<Vec<PriceInterval>> {
        if !breaker.allow_request() {
            return Err(ClientError::CircuitOpen { provider: breaker.provider() });
        }
        let result = retry(RetryPolicy::default_preset(), "price.current_and_forecast", || async {
            let url = format!("{}/api/v1/prices/current-and-forecast", self.base_url);
            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .query(&[("siteId", site_id), ("lookaheadIntervals", &lookahead_intervals.to_string())])
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
                    let intervals = envelope
                        .result
                        .ok_or_else(|| ClientError::InvalidResponse("missing result payload".into()))?;
                    Ok(intervals.into_iter().map(PriceInterval::from).collect())
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
                warn!(error = %err, "price fetch failed");
                breaker.record_failure();
            }
        }
        result
    }
}
