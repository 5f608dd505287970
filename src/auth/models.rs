// Account data models and DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::error::AuthError;

/// Closed set of account roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "USER" => Ok(Role::User),
            other => Err(AuthError::ValidationError(format!(
                "user_type must be ADMIN or USER, got '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Persisted account record
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    #[sqlx(try_from = "String")]
    pub user_type: Role,
    pub token: Option<String>,
    pub encrypted_token: Option<String>,
    pub token_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User response model (excludes password_hash and token_version)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub user_type: Role,
    pub token: Option<String>,
    pub encrypted_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone: user.phone,
            user_type: user.user_type,
            token: user.token,
            encrypted_token: user.encrypted_token,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Registration request DTO
///
/// `user_type` stays a string here so an unknown role is reported as a
/// validation error instead of a JSON rejection.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(length(min = 2, max = 100, message = "first_name must be 2 to 100 characters"))]
    pub first_name: String,
    #[validate(length(min = 2, max = 100, message = "last_name must be 2 to 100 characters"))]
    pub last_name: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[validate(custom = "crate::validation::validate_phone")]
    pub phone: String,
    #[schema(example = "USER")]
    pub user_type: String,
}

/// Login request DTO
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

/// One page of accounts plus the overall count
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserPage {
    pub total_count: u64,
    pub users: Vec<UserResponse>,
}
