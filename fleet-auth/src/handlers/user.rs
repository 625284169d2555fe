use axum_extra::extract::cookie::{Cookie, CookieJar};
use service_core::{
    axum::{extract::State, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::{auth::UpdateMeRequest, ErrorResponse, MessageResponse},
    middleware::{AuthUser, DomainContext},
    models::UserResponse,
    services::federation::TOKEN_COOKIE,
    utils::ValidatedJson,
    AppState,
};

/// Get current user profile
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "User",
    security(("session_token" = []), ("bearer_auth" = []))
)]
pub async fn get_me(AuthUser(identity): AuthUser) -> Json<UserResponse> {
    Json(identity.user.sanitized())
}

/// Update current user profile
///
/// Only the supplied fields change. Passwords can only be set on local accounts.
#[utoipa::path(
    put,
    path = "/auth/me",
    request_body = UpdateMeRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 409, description = "Username already taken", body = ErrorResponse)
    ),
    tag = "User",
    security(("session_token" = []), ("bearer_auth" = []))
)]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ValidatedJson(req): ValidatedJson<UpdateMeRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.auth_service.update_profile(&identity.user, req).await?;
    Ok(Json(user.sanitized()))
}

/// Delete current user account
///
/// Sessions and domain memberships are removed with the account.
#[utoipa::path(
    delete,
    path = "/auth/me",
    responses(
        (status = 200, description = "Account deleted", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "User",
    security(("session_token" = []), ("bearer_auth" = []))
)]
pub async fn delete_me(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.delete_account(&identity.user).await?;
    Ok((
        jar.remove(Cookie::build(TOKEN_COOKIE).path("/")),
        Json(MessageResponse::new("Account deleted")),
    ))
}

/// Domain access of the current user
///
/// Rejected with 403 when the caller belongs to no domain and is not a global admin.
#[utoipa::path(
    get,
    path = "/auth/me/domains",
    responses(
        (status = 200, description = "Resolved domain access", body = DomainContext),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "User has no domain access", body = ErrorResponse)
    ),
    tag = "User",
    security(("session_token" = []), ("bearer_auth" = []))
)]
pub async fn my_domains(ctx: DomainContext) -> Json<DomainContext> {
    Json(ctx)
}
