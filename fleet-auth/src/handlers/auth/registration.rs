use service_core::{
    axum::{extract::State, http::StatusCode, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::{
        auth::{RegisterRequest, RegisterResponse},
        ErrorResponse,
    },
    middleware::AuthUser,
    utils::ValidatedJson,
    AppState,
};

/// Register a local account
///
/// Open while no account exists (the first account becomes `global_admin`);
/// afterwards restricted to administrators.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = RegisterResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Not authenticated, or local registration disabled", body = ErrorResponse),
        (status = 403, description = "Caller is not an administrator", body = ErrorResponse),
        (status = 404, description = "A requested domain does not exist", body = ErrorResponse),
        (status = 409, description = "Username already exists", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("session_token" = []), ("bearer_auth" = []))
)]
pub async fn register(
    State(state): State<AppState>,
    caller: Option<AuthUser>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let caller = caller.map(|AuthUser(identity)| identity.user);
    let user = state.auth_service.register(caller.as_ref(), req).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: user.sanitized(),
        }),
    ))
}
