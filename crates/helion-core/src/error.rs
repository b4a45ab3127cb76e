// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] helion_store::StoreError),

    #[error(transparent)]
    Client(#[from] helion_clients::ClientError),

    #[error("cycle deadline exceeded after {elapsed_ms}ms")]
    DeadlineExceeded { elapsed_ms: i64 },

    #[error("apply protocol verification mismatch for rule {rule_id}")]
    VerificationFailed { rule_id: String },

    #[error("clear-active protocol failed after {attempts} attempts")]
    ClearFailed { attempts: u32 },
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
