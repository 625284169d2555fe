use axum_extra::extract::cookie::{Cookie, CookieJar};
use service_core::{
    axum::{
        extract::State,
        http::{header, HeaderMap, StatusCode},
        response::IntoResponse,
        Json,
    },
    error::AppError,
};

use crate::{
    dtos::{
        auth::{LoginRequest, LoginResponse},
        ErrorResponse, MessageResponse,
    },
    services::{federation::TOKEN_COOKIE, ServiceError},
    utils::ValidatedJson,
    AppState,
};

/// Login with username and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse),
        (status = 401, description = "Invalid credentials or Keycloak authentication required", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (session, user) = state.auth_service.login(&req.username, &req.password).await?;
    Ok((
        StatusCode::OK,
        Json(LoginResponse {
            token: session.token,
            user: user.sanitized(),
        }),
    ))
}

/// Logout and delete the session
///
/// Unknown tokens are accepted so logout is idempotent.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 400, description = "Authorization header missing", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("session_token" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ServiceError::MissingToken)?;

    state.sessions.revoke(token).await?;
    tracing::info!("Session logged out");

    Ok((
        jar.remove(Cookie::build(TOKEN_COOKIE).path("/")),
        Json(MessageResponse::new("Logged out successfully")),
    ))
}
