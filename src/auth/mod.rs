// Authentication module
// Password hashing, dual session tokens, request authentication and access policy

pub mod error;
pub mod handlers;
pub mod memory;
pub mod middleware;
pub mod models;
pub mod password;
pub mod policy;
pub mod repository;
pub mod service;
pub mod token;

// Re-export commonly used types
pub use error::AuthError;
pub use handlers::{get_user_handler, list_users_handler, login_handler, signup_handler};
pub use memory::MemoryUserStore;
pub use middleware::{authenticate, RequestClaims};
pub use models::{LoginRequest, Role, SignupRequest, User, UserPage, UserResponse};
pub use policy::{require_role, require_self_or_role};
pub use repository::{PgUserStore, StoreError, UserFilter, UserStore, UserUpdate};
pub use service::AuthService;
pub use token::{TokenKeys, TokenService};
