pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    request_id::request_id_middleware,
    security_headers::security_headers_middleware,
};
use service_core::PrometheusHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AuthConfig;
use crate::services::{
    AuthService, AuthStore, Authenticator, DomainAccessResolver, FederationController,
    IdentityProvider, IdentitySynchronizer, KeyResolver, SessionService, TokenValidator,
};
use std::sync::Arc;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::auth::registration::register,
        handlers::auth::session::login,
        handlers::auth::session::logout,
        handlers::auth::sso::sso_login,
        handlers::auth::sso::sso_callback,
        handlers::auth::sso::sso_logout,
        handlers::user::get_me,
        handlers::user::update_me,
        handlers::user::delete_me,
        handlers::user::my_domains,
        handlers::domains::list_domains,
        handlers::domains::create_domain,
        handlers::domains::get_domain,
        handlers::domains::update_settings,
        handlers::domains::upsert_member,
        handlers::domains::remove_member,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::GroupMembership,
            dtos::auth::RegisterRequest,
            dtos::auth::RegisterResponse,
            dtos::auth::LoginRequest,
            dtos::auth::LoginResponse,
            dtos::auth::UpdateMeRequest,
            dtos::domain::CreateDomainRequest,
            dtos::domain::UpdateSettingsRequest,
            dtos::domain::UpsertMemberRequest,
            models::UserResponse,
            models::GlobalRole,
            models::AuthMethod,
            models::Domain,
            models::DomainRole,
            models::DomainUser,
            services::DomainContext,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Local accounts and sessions"),
        (name = "Federation", description = "Keycloak single sign-on"),
        (name = "User", description = "Current user profile"),
        (name = "Domains", description = "Domain management and membership"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            // Local session tokens travel raw in the Authorization header.
            components.add_security_scheme(
                "session_token",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("Authorization"))),
            );
        }
    }
}

/// Identity-provider collaborators, present only when federation is enabled.
pub struct FederationDeps {
    pub provider: Arc<dyn IdentityProvider>,
    pub keys: Arc<dyn KeyResolver>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub store: Arc<dyn AuthStore>,
    pub sessions: SessionService,
    pub auth_service: AuthService,
    pub authenticator: Authenticator,
    pub domain_access: DomainAccessResolver,
    pub federation: Option<Arc<FederationController>>,
    pub metrics: PrometheusHandle,
    pub login_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn AuthStore>,
        federation: Option<FederationDeps>,
        metrics: PrometheusHandle,
    ) -> Self {
        let sessions = SessionService::new(store.clone(), config.session.ttl_hours);
        let identity = IdentitySynchronizer::new(store.clone());

        let federation = federation.filter(|_| config.federation.enabled).map(|deps| {
            let validator = Arc::new(TokenValidator::new(
                deps.keys,
                config.federation.issuer(),
                config.federation.leeway_seconds,
            ));
            Arc::new(FederationController::new(
                deps.provider,
                validator,
                identity.clone(),
                config.federation.clone(),
                config.security.allowed_origins.clone(),
            ))
        });

        let auth_service = AuthService::new(
            store.clone(),
            sessions.clone(),
            config.session.bcrypt_cost,
            config.federation.federation_only(),
        );
        let authenticator = Authenticator::new(
            sessions.clone(),
            identity,
            federation.as_ref().map(|f| f.validator().clone()),
            config.federation.bootstrap_admin_fallback && config.federation.federation_only(),
        );

        let login_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        );
        let ip_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        );

        Self {
            domain_access: DomainAccessResolver::new(store.clone()),
            config,
            store,
            sessions,
            auth_service,
            authenticator,
            federation,
            metrics,
            login_rate_limiter,
            ip_rate_limiter,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // Login route with rate limiting
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    // Registration is open until the first account exists, so the caller is optional
    let register_route = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::optional_auth_middleware,
        ));

    let authenticated = Router::new()
        .route(
            "/auth/me",
            get(handlers::user::get_me)
                .put(handlers::user::update_me)
                .delete(handlers::user::delete_me),
        )
        .route("/domains", post(handlers::domains::create_domain))
        .route_layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    // Scoped listing never rejects a caller without memberships
    let scoped = Router::new()
        .route("/domains", get(handlers::domains::list_domains))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::domain_scope_middleware,
        ))
        .route_layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    let domain_member = Router::new()
        .route("/auth/me/domains", get(handlers::user::my_domains))
        .route("/domains/:domain_id", get(handlers::domains::get_domain))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::domain_access_middleware,
        ))
        .route_layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    let domain_admin = Router::new()
        .route(
            "/domains/:domain_id/settings",
            put(handlers::domains::update_settings),
        )
        .route(
            "/domains/:domain_id/members",
            put(handlers::domains::upsert_member),
        )
        .route(
            "/domains/:domain_id/members/:user_id",
            delete(handlers::domains::remove_member),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::domain_admin_middleware,
        ))
        .route_layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    let mut app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    if state.config.swagger.enabled {
        app = app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        // Keep the document available for programmatic clients
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { service_core::axum::Json(ApiDoc::openapi()) }),
        );
    }

    let ip_limiter = state.ip_rate_limiter.clone();

    app.route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/sso/login", get(handlers::auth::sso_login))
        .route("/auth/sso/callback", get(handlers::auth::sso_callback))
        .route("/auth/sso/logout", get(handlers::auth::sso_logout))
        .merge(login_route)
        .merge(register_route)
        .merge(authenticated)
        .merge(scoped)
        .merge(domain_member)
        .merge(domain_admin)
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config))
}

fn cors_layer(config: &AuthConfig) -> CorsLayer {
    use service_core::axum::http::{header, HeaderValue, Method};

    let origins = config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
