use axum_extra::extract::cookie::CookieJar;
use service_core::{
    axum::{
        extract::{FromRequestParts, Request, State},
        http::{header, request::Parts},
        middleware::Next,
        response::Response,
    },
    error::AppError,
};

use crate::{
    services::{federation::TOKEN_COOKIE, Identity, RequestCredentials, ServiceError},
    AppState,
};

/// Credential material copied out of a request. The request body is not
/// `Sync`, so nothing borrowed from the request may be held across an await.
struct RequestCredentialsOwned {
    attached: Option<Identity>,
    authorization: Option<String>,
    token_cookie: Option<String>,
    path: String,
}

impl RequestCredentialsOwned {
    fn from_request(req: &Request) -> Self {
        Self {
            attached: req.extensions().get::<Identity>().cloned(),
            authorization: req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            token_cookie: CookieJar::from_headers(req.headers())
                .get(TOKEN_COOKIE)
                .map(|c| c.value().to_string()),
            path: req.uri().path().to_string(),
        }
    }

    fn borrowed(&self) -> RequestCredentials<'_> {
        RequestCredentials {
            attached: self.attached.as_ref(),
            authorization: self.authorization.as_deref(),
            token_cookie: self.token_cookie.as_deref(),
            path: &self.path,
        }
    }
}

async fn authenticate(state: &AppState, creds: RequestCredentialsOwned) -> Result<Identity, ServiceError> {
    state.authenticator.authenticate(&creds.borrowed()).await
}

/// Middleware to require authentication
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let creds = RequestCredentialsOwned::from_request(&req);
    let identity = authenticate(&state, creds).await?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Attach the caller when credentials resolve; let anonymous requests through.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let creds = RequestCredentialsOwned::from_request(&req);
    match authenticate(&state, creds).await {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
        }
        Err(ServiceError::Unauthenticated | ServiceError::SessionExpired) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(next.run(req).await)
}

/// Extractor for the caller resolved by [`auth_middleware`].
pub struct AuthUser(pub Identity);

#[service_core::axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))
    }
}
