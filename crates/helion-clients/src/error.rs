// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.

use thiserror::Error;

/// Errors an external client call can fail with (§7 "Error Handling Design").
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned rate-limited status")]
    RateLimited,

    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),

    #[error("provider returned error status {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("circuit breaker open for {provider}, retry after cooldown")]
    CircuitOpen { provider: &'static str },

    #[error("exhausted {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<ClientError> },
}

impl ClientError {
    /// Rate-limited responses never count against a tenant's quota and are never a
    /// "real" failure from the retry harness's point of view (§4.3, §7).
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClientError::RateLimited)
    }

    /// Transient I/O (timeouts, 5xx) is worth retrying; 4xx application errors and
    /// shape mismatches are not (§7 "Transient I/O").
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(e) => e.is_timeout() || e.is_connect() || e.status().is_none_or(|s| s.is_server_error()),
            ClientError::RateLimited => true,
            ClientError::ApiError { status, .. } => *status >= 500,
            ClientError::InvalidResponse(_) => false,
            ClientError::CircuitOpen { .. } => false,
            ClientError::RetriesExhausted { .. } => false,
        }
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
