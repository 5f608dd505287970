// HTTP handlers for account endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::auth::{
    error::AuthError,
    middleware::RequestClaims,
    models::{LoginRequest, Role, SignupRequest, UserPage, UserResponse},
    policy::{require_role, require_self_or_role},
    service::AuthService,
};
use crate::query::PaginationParams;

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AuthError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AuthError::ValidationError(rejection.body_text()))
}

/// Register a new user
/// POST /user/signup
#[utoipa::path(
    post,
    path = "/user/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid input data"),
        (status = 409, description = "Email or phone already registered"),
        (status = 500, description = "Internal server error")
    ),
    tag = "auth"
)]
pub async fn signup_handler(
    State(service): State<Arc<AuthService>>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AuthError> {
    let request = json_body(payload)?;
    let user = service.signup(request).await?;
    Ok(Json(user))
}

/// Log a user in and return fresh tokens
/// POST /user/login
#[utoipa::path(
    post,
    path = "/user/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in, tokens regenerated", body = UserResponse),
        (status = 400, description = "Invalid input data"),
        (status = 401, description = "Invalid email or password"),
        (status = 409, description = "A concurrent login won the token update"),
        (status = 500, description = "Internal server error")
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(service): State<Arc<AuthService>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AuthError> {
    let request = json_body(payload)?;
    let user = service.login(request).await?;
    Ok(Json(user))
}

/// List users, admin only
/// GET /users
#[utoipa::path(
    get,
    path = "/users",
    params(PaginationParams),
    responses(
        (status = 200, description = "One page of users", body = UserPage),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller is not an admin"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn list_users_handler(
    State(service): State<Arc<AuthService>>,
    claims: RequestClaims,
    Query(params): Query<PaginationParams>,
) -> Result<Json<UserPage>, AuthError> {
    require_role(&claims, Role::Admin)?;
    let page = service.list_users(params.resolve()).await?;
    Ok(Json(page))
}

/// Get one user, the user themself or an admin
/// GET /user/:user_id
#[utoipa::path(
    get,
    path = "/user/{user_id}",
    params(
        ("user_id" = String, Path, description = "Subject id of the user")
    ),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller may not read this user"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "users"
)]
pub async fn get_user_handler(
    State(service): State<Arc<AuthService>>,
    claims: RequestClaims,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, AuthError> {
    require_self_or_role(&claims, &user_id, Role::Admin)?;
    let user = service.get_user(&user_id).await?;
    Ok(Json(user))
}
