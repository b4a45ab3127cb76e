// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.

pub mod error;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::Store;
