//! Caller identification. Authentication happens upstream of this service; the
//! gateway forwards the authenticated tenant in `x-tenant-id`.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};

use crate::models::TenantId;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Extractor yielding the calling tenant's id
pub struct Tenant(pub TenantId);

impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<TenantId>().ok())
            .filter(|id| *id > 0)
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(Tenant(tenant_id))
    }
}
