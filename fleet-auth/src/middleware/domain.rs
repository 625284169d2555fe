//! Domain-scoped authorization for routes carrying a `:domain_id` segment.
//!
//! Must run after [`super::auth_middleware`] and be installed with `route_layer`
//! so path parameters are available.

use service_core::{
    axum::{
        extract::{FromRequestParts, RawPathParams, Request, State},
        http::request::Parts,
        middleware::Next,
        response::Response,
    },
    error::AppError,
};

use crate::{
    services::{DomainContext, Identity},
    AppState,
};

pub const DOMAIN_ID_PARAM: &str = "domain_id";

fn domain_id_param(params: Option<&RawPathParams>) -> Option<String> {
    params?
        .iter()
        .find(|(name, _)| *name == DOMAIN_ID_PARAM)
        .map(|(_, value)| value.to_string())
}

fn identity(req: &Request) -> Result<Identity, AppError> {
    req.extensions()
        .get::<Identity>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))
}

/// Member of the addressed domain (or of at least one domain), or global admin.
pub async fn domain_access_middleware(
    State(state): State<AppState>,
    params: Option<RawPathParams>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let caller = identity(&req)?;
    let raw = domain_id_param(params.as_ref());
    let ctx = state.domain_access.resolve(&caller.user, raw.as_deref()).await?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// `domain_admin` of the addressed domain, or global admin.
pub async fn domain_admin_middleware(
    State(state): State<AppState>,
    params: Option<RawPathParams>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let caller = identity(&req)?;
    let raw = domain_id_param(params.as_ref());
    let ctx = state
        .domain_access
        .require_domain_admin(&caller.user, raw.as_deref())
        .await?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Attach the caller's scope without requiring any membership.
pub async fn domain_scope_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let caller = identity(&req)?;
    let ctx = state.domain_access.resolve_scope(&caller.user).await?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

#[service_core::axum::async_trait]
impl<S> FromRequestParts<S> for DomainContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<DomainContext>().cloned().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Domain context missing: route is not behind a domain middleware"
            ))
        })
    }
}
