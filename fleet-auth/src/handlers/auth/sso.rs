use axum_extra::extract::cookie::CookieJar;
use service_core::{
    axum::{
        extract::{Query, State},
        http::{header, HeaderMap},
        response::{IntoResponse, Response},
    },
    error::AppError,
};
use std::sync::Arc;

use crate::{
    dtos::{
        auth::{SsoCallbackQuery, SsoLoginQuery},
        ErrorResponse,
    },
    services::FederationController,
    AppState,
};

fn controller(state: &AppState) -> Result<&Arc<FederationController>, AppError> {
    state
        .federation
        .as_ref()
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Keycloak authentication is not enabled")))
}

/// Start a federated login
///
/// The redirect-back target is `redirect_uri` when given, else the caller's `Origin`.
#[utoipa::path(
    get,
    path = "/auth/sso/login",
    params(SsoLoginQuery),
    responses(
        (status = 307, description = "Redirect to the identity provider; sets sso_state and sso_redirect_uri cookies"),
        (status = 404, description = "Federation disabled", body = ErrorResponse)
    ),
    tag = "Federation"
)]
pub async fn sso_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<SsoLoginQuery>,
) -> Result<Response, AppError> {
    let controller = controller(&state)?;
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let target = query.redirect_uri.or(origin);

    Ok(controller.start(jar, target.as_deref()).into_response())
}

/// Provider callback of the authorization-code flow
#[utoipa::path(
    get,
    path = "/auth/sso/callback",
    params(SsoCallbackQuery),
    responses(
        (status = 307, description = "Redirect to the success page (token cookie set) or to the failure page with an error"),
        (status = 404, description = "Federation disabled", body = ErrorResponse)
    ),
    tag = "Federation"
)]
pub async fn sso_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<SsoCallbackQuery>,
) -> Result<Response, AppError> {
    let controller = controller(&state)?.clone();
    Ok(controller.callback(jar, query).await.into_response())
}

/// End the federated session
#[utoipa::path(
    get,
    path = "/auth/sso/logout",
    responses(
        (status = 307, description = "Token cookie cleared; redirect to the provider logout page"),
        (status = 404, description = "Federation disabled", body = ErrorResponse)
    ),
    tag = "Federation"
)]
pub async fn sso_logout(State(state): State<AppState>, jar: CookieJar) -> Result<Response, AppError> {
    let controller = controller(&state)?;
    Ok(controller.logout(jar).into_response())
}
