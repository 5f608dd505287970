pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod query;
pub mod validation;

use axum::{
    extract::FromRef,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use auth::{
    authenticate, get_user_handler, list_users_handler, login_handler, signup_handler, AuthService,
    LoginRequest, Role, SignupRequest, TokenService, UserPage, UserResponse,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        auth::handlers::signup_handler,
        auth::handlers::login_handler,
        auth::handlers::list_users_handler,
        auth::handlers::get_user_handler,
    ),
    components(
        schemas(SignupRequest, LoginRequest, UserResponse, UserPage, Role)
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Signup and login"),
        (name = "users", description = "Account lookup, guarded by role and ownership")
    ),
    info(
        title = "Account API",
        version = "1.0.0",
        description = "User accounts with password login and token-based access control"
    )
)]
pub struct ApiDoc;

/// Registers the bearer token scheme referenced by protected paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub tokens: Arc<TokenService>,
}

impl AppState {
    pub fn new(auth: Arc<AuthService>) -> Self {
        let tokens = auth.tokens().clone();
        Self { auth, tokens }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for Arc<TokenService> {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

/// Creates and configures the application router
/// Signup and login are public; account routes pass through token authentication first
pub fn create_router(state: AppState) -> Router {
    // Configure CORS to allow all origins, methods, and headers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/user/signup", post(signup_handler))
        .route("/user/login", post(login_handler));

    let protected = Router::new()
        .route("/users", get(list_users_handler))
        .route("/user/:user_id", get(get_user_handler))
        .route_layer(middleware::from_fn_with_state(
            state.tokens.clone(),
            authenticate,
        ));

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public)
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
