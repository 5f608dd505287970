// Authentication and authorization error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;
use tracing::{debug, error, warn};

use crate::auth::models::Role;
use crate::auth::repository::StoreError;
use crate::error::ErrorResponse;

/// Authentication and authorization error types
#[derive(Debug)]
pub enum AuthError {
    // Request errors
    ValidationError(String),
    /// Per-field failures from the `validator` derive, returned as `details`
    FieldErrors(validator::ValidationErrors),
    DuplicateCredential(String),
    NotFound(String),

    // Authentication errors
    InvalidCredentials,
    MissingToken,
    InvalidToken,
    MalformedToken,
    InvalidSignature,
    ExpiredToken,
    DecryptionError,

    // Authorization errors
    /// Caller lacks the role (or ownership) required for the operation
    InsufficientPermissions {
        required: Role,
        actual: Role,
    },

    /// Another login rewrote the identity's tokens first
    ConcurrentLogin,

    // Server-side failures
    PasswordHashError,
    KeyGenerationError(String),
    EncryptionError(String),
    SigningError(String),
    StorageError(StoreError),
    ConfigError(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AuthError::FieldErrors(errors) => write!(f, "Validation error: {}", errors),
            AuthError::DuplicateCredential(field) => write!(f, "{} already exists", field),
            AuthError::NotFound(what) => write!(f, "{} not found", what),
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
            AuthError::InvalidToken => write!(f, "Invalid token"),
            AuthError::MalformedToken => write!(f, "Malformed token"),
            AuthError::InvalidSignature => write!(f, "Invalid token signature"),
            AuthError::ExpiredToken => write!(f, "Token has expired"),
            AuthError::DecryptionError => write!(f, "Token could not be decrypted"),
            AuthError::InsufficientPermissions { required, actual } => write!(
                f,
                "Insufficient permissions: required role '{}', but user has role '{}'",
                required, actual
            ),
            AuthError::ConcurrentLogin => write!(f, "Concurrent login for the same user"),
            AuthError::PasswordHashError => write!(f, "Password hashing error"),
            AuthError::KeyGenerationError(msg) => write!(f, "Key generation error: {}", msg),
            AuthError::EncryptionError(msg) => write!(f, "Encryption error: {}", msg),
            AuthError::SigningError(msg) => write!(f, "Signing error: {}", msg),
            AuthError::StorageError(err) => write!(f, "Storage error: {}", err),
            AuthError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(field) => AuthError::DuplicateCredential(field),
            other => AuthError::StorageError(other),
        }
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AuthError::FieldErrors(errors)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::ValidationError(msg) => debug!("Validation error: {}", msg),
            AuthError::FieldErrors(errors) => debug!("Validation error: {:?}", errors),
            AuthError::NotFound(what) => debug!("{} not found", what),
            AuthError::DuplicateCredential(field) => {
                warn!("Signup rejected, {} already registered", field)
            }
            AuthError::InvalidCredentials => warn!("Login failed: invalid credentials"),
            AuthError::MissingToken => warn!("Missing token in request"),
            AuthError::InvalidToken
            | AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::ExpiredToken
            | AuthError::DecryptionError => warn!("Rejected token: {}", self),
            AuthError::InsufficientPermissions { required, actual } => warn!(
                "Authorization failed: required role '{}', user has role '{}'",
                required, actual
            ),
            AuthError::ConcurrentLogin => warn!("Login lost a token update race"),
            AuthError::PasswordHashError
            | AuthError::KeyGenerationError(_)
            | AuthError::EncryptionError(_)
            | AuthError::SigningError(_)
            | AuthError::StorageError(_)
            | AuthError::ConfigError(_) => error!("Auth failure: {}", self),
        }

        let mut body = ErrorResponse::new(self.error_code(), self.error_message());
        if let AuthError::FieldErrors(errors) = &self {
            body = body.with_details(
                serde_json::to_value(errors).unwrap_or_else(|_| serde_json::json!({})),
            );
        }
        body.into_response_with(self.status_code())
    }
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::ValidationError(_) | AuthError::FieldErrors(_) => StatusCode::BAD_REQUEST,
            AuthError::DuplicateCredential(_) => StatusCode::CONFLICT,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::MalformedToken
            | AuthError::InvalidSignature
            | AuthError::ExpiredToken
            | AuthError::DecryptionError => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            AuthError::ConcurrentLogin => StatusCode::CONFLICT,
            AuthError::PasswordHashError
            | AuthError::KeyGenerationError(_)
            | AuthError::EncryptionError(_)
            | AuthError::SigningError(_)
            | AuthError::StorageError(_)
            | AuthError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code placed in the error body
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::ValidationError(_) | AuthError::FieldErrors(_) => "VALIDATION_ERROR",
            AuthError::DuplicateCredential(_) => "DUPLICATE_CREDENTIAL",
            AuthError::NotFound(_) => "NOT_FOUND",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::MalformedToken => "MALFORMED_TOKEN",
            AuthError::InvalidSignature => "INVALID_SIGNATURE",
            AuthError::ExpiredToken => "EXPIRED_TOKEN",
            AuthError::DecryptionError => "DECRYPTION_ERROR",
            AuthError::InsufficientPermissions { .. } => "FORBIDDEN",
            AuthError::ConcurrentLogin => "CONCURRENT_LOGIN",
            AuthError::PasswordHashError
            | AuthError::KeyGenerationError(_)
            | AuthError::EncryptionError(_)
            | AuthError::SigningError(_)
            | AuthError::ConfigError(_) => "INTERNAL_ERROR",
            AuthError::StorageError(_) => "STORAGE_ERROR",
        }
    }

    /// Get a descriptive error message for this error
    /// This message is safe to send to clients (no sensitive data)
    pub fn error_message(&self) -> String {
        match self {
            AuthError::ValidationError(msg) => msg.clone(),
            AuthError::FieldErrors(_) => "Request validation failed".to_string(),
            AuthError::DuplicateCredential(field) => format!("{} already exists", field),
            AuthError::NotFound(what) => format!("{} not found", what),
            AuthError::InvalidCredentials => "Invalid email or password".to_string(),
            AuthError::MissingToken => "Missing authentication token".to_string(),
            AuthError::InvalidToken => "Invalid token".to_string(),
            AuthError::MalformedToken => "Malformed token".to_string(),
            AuthError::InvalidSignature => "Invalid token signature".to_string(),
            AuthError::ExpiredToken => "Token has expired".to_string(),
            AuthError::DecryptionError => "Token could not be decrypted".to_string(),
            AuthError::InsufficientPermissions { required, .. } => {
                format!("Unauthorized: required role '{}'", required)
            }
            AuthError::ConcurrentLogin => {
                "Another login for this user completed first, retry the login".to_string()
            }
            AuthError::PasswordHashError
            | AuthError::KeyGenerationError(_)
            | AuthError::EncryptionError(_)
            | AuthError::SigningError(_)
            | AuthError::StorageError(_)
            | AuthError::ConfigError(_) => "Internal server error".to_string(),
        }
    }
}
