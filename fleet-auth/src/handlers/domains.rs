use service_core::{
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};

use crate::{
    dtos::{
        domain::{CreateDomainRequest, UpdateSettingsRequest, UpsertMemberRequest},
        ErrorResponse, MessageResponse,
    },
    middleware::{AuthUser, DomainContext},
    models::{Domain, DomainUser, NewDomain, UserId},
    services::StoreError,
    utils::ValidatedJson,
    AppState,
};

/// List domains visible to the caller
///
/// Global admins see every domain; other callers see only their memberships,
/// which may be none.
#[utoipa::path(
    get,
    path = "/domains",
    responses(
        (status = 200, description = "Visible domains", body = [Domain]),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Domains",
    security(("session_token" = []), ("bearer_auth" = []))
)]
pub async fn list_domains(
    State(state): State<AppState>,
    ctx: DomainContext,
) -> Result<Json<Vec<Domain>>, AppError> {
    let domains = state.store.list_domains(&ctx.scope()).await?;
    Ok(Json(domains))
}

/// Create a domain
#[utoipa::path(
    post,
    path = "/domains",
    request_body = CreateDomainRequest,
    responses(
        (status = 201, description = "Domain created", body = Domain),
        (status = 403, description = "Global admin privileges required", body = ErrorResponse),
        (status = 409, description = "Domain name already exists", body = ErrorResponse)
    ),
    tag = "Domains",
    security(("session_token" = []), ("bearer_auth" = []))
)]
pub async fn create_domain(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateDomainRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.domain_access.require_global_admin(&identity.user)?;

    let domain = state
        .store
        .create_domain(NewDomain {
            name: req.name,
            active: req.active,
            settings: req.settings,
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => AppError::Conflict(anyhow::anyhow!("Domain already exists")),
            other => other.into(),
        })?;

    tracing::info!(domain_id = domain.id, name = %domain.name, created_by = identity.user.id, "Domain created");
    Ok((StatusCode::CREATED, Json(domain)))
}

/// Get a domain
#[utoipa::path(
    get,
    path = "/domains/{domain_id}",
    params(("domain_id" = i64, Path, description = "Domain ID")),
    responses(
        (status = 200, description = "Domain", body = Domain),
        (status = 400, description = "Invalid domain ID", body = ErrorResponse),
        (status = 403, description = "Access denied to this domain", body = ErrorResponse),
        (status = 404, description = "Domain not found", body = ErrorResponse)
    ),
    tag = "Domains",
    security(("session_token" = []), ("bearer_auth" = []))
)]
pub async fn get_domain(
    State(state): State<AppState>,
    ctx: DomainContext,
) -> Result<Json<Domain>, AppError> {
    let domain_id = ctx.require_domain_id()?;
    let domain = state
        .store
        .find_domain(domain_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Domain not found")))?;
    Ok(Json(domain))
}

/// Replace domain settings
#[utoipa::path(
    put,
    path = "/domains/{domain_id}/settings",
    params(("domain_id" = i64, Path, description = "Domain ID")),
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Updated domain", body = Domain),
        (status = 403, description = "Domain admin privileges required", body = ErrorResponse),
        (status = 404, description = "Domain not found", body = ErrorResponse)
    ),
    tag = "Domains",
    security(("session_token" = []), ("bearer_auth" = []))
)]
pub async fn update_settings(
    State(state): State<AppState>,
    ctx: DomainContext,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<Domain>, AppError> {
    let domain_id = ctx.require_domain_id()?;
    let domain = state
        .store
        .update_domain_settings(domain_id, req.settings)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Domain not found")))?;
    Ok(Json(domain))
}

/// Add a member or change a member's role
#[utoipa::path(
    put,
    path = "/domains/{domain_id}/members",
    params(("domain_id" = i64, Path, description = "Domain ID")),
    request_body = UpsertMemberRequest,
    responses(
        (status = 200, description = "Membership", body = DomainUser),
        (status = 403, description = "Domain admin privileges required", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "Domains",
    security(("session_token" = []), ("bearer_auth" = []))
)]
pub async fn upsert_member(
    State(state): State<AppState>,
    ctx: DomainContext,
    Json(req): Json<UpsertMemberRequest>,
) -> Result<Json<DomainUser>, AppError> {
    let domain_id = ctx.require_domain_id()?;
    let membership = state
        .store
        .upsert_domain_user(req.user_id, domain_id, req.role)
        .await
        .map_err(|e| match e {
            StoreError::MissingReference(_) => AppError::NotFound(anyhow::anyhow!("User not found")),
            other => other.into(),
        })?;
    tracing::info!(domain_id, user_id = req.user_id, role = req.role.as_str(), "Domain membership set");
    Ok(Json(membership))
}

/// Remove a member
#[utoipa::path(
    delete,
    path = "/domains/{domain_id}/members/{user_id}",
    params(
        ("domain_id" = i64, Path, description = "Domain ID"),
        ("user_id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Membership removed", body = MessageResponse),
        (status = 400, description = "Invalid ID", body = ErrorResponse),
        (status = 403, description = "Domain admin privileges required", body = ErrorResponse),
        (status = 404, description = "Membership not found", body = ErrorResponse)
    ),
    tag = "Domains",
    security(("session_token" = []), ("bearer_auth" = []))
)]
pub async fn remove_member(
    State(state): State<AppState>,
    ctx: DomainContext,
    Path((_domain_id, user_id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, AppError> {
    let domain_id = ctx.require_domain_id()?;
    let user_id: UserId = user_id
        .parse()
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid user ID")))?;

    if !state.store.delete_domain_user(user_id, domain_id).await? {
        return Err(AppError::NotFound(anyhow::anyhow!("Membership not found")));
    }
    tracing::info!(domain_id, user_id, "Domain membership removed");
    Ok(Json(MessageResponse::new("Membership removed")))
}
