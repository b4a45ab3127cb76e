// Copyright (c) 2026 Helion Contributors
//
// Licensed under the MIT license. See LICENSE for details.
//
// Authentication/session and user-profile init are outside the core (§6). This extractor
// stands in for whatever session middleware the external collaborator terminates —
// it just reads the tenant id the collaborator has already authenticated, carried here
// as a header, and turns a missing header into a clean 400 rather than a panic.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

use helion_types::tenant::TenantId;

pub struct TenantHeader(pub TenantId);

impl<S> FromRequestParts<S> for TenantHeader
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("x-tenant-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or((StatusCode::BAD_REQUEST, "missing X-Tenant-Id header"))?;
        Ok(TenantHeader(TenantId::new(header)))
    }
}
