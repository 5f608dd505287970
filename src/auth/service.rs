// Account service - business logic layer

use chrono::Utc;
use once_cell::sync::Lazy;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, error, info};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{
    error::AuthError,
    models::{LoginRequest, Role, SignupRequest, User, UserPage, UserResponse},
    password::PasswordService,
    repository::{StoreError, UserFilter, UserStore, UserUpdate},
    token::TokenService,
};
use crate::query::Pagination;

/// Stand-in hash verified when the email is unknown, so both login failures cost one Argon2 run
static DUMMY_HASH: Lazy<Option<String>> =
    Lazy::new(|| PasswordService::hash_password("account-api-unknown-user").ok());

/// Account service coordinating credential checks, token issuance and storage
pub struct AuthService {
    store: Arc<dyn UserStore>,
    tokens: Arc<TokenService>,
    store_timeout: Duration,
}

impl AuthService {
    /// Create a new AuthService
    pub fn new(store: Arc<dyn UserStore>, tokens: Arc<TokenService>, store_timeout: Duration) -> Self {
        Self {
            store,
            tokens,
            store_timeout,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    /// Run one store call under the configured timeout
    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result.map_err(AuthError::from),
            Err(_) => {
                error!(
                    "Store operation '{}' timed out after {:?}",
                    operation, self.store_timeout
                );
                Err(AuthError::StorageError(StoreError::Timeout))
            }
        }
    }

    /// Register a new account
    pub async fn signup(&self, request: SignupRequest) -> Result<UserResponse, AuthError> {
        request.validate()?;
        let user_type: Role = request.user_type.parse()?;
        let email = request.email.trim().to_string();
        let phone = request.phone.trim().to_string();

        debug!("Signup attempt for {}", email);

        let email_count = self
            .bounded("count email", self.store.count_documents(&UserFilter::Email(email.clone())))
            .await?;
        if email_count > 0 {
            return Err(AuthError::DuplicateCredential("email".to_string()));
        }

        let phone_count = self
            .bounded("count phone", self.store.count_documents(&UserFilter::Phone(phone.clone())))
            .await?;
        if phone_count > 0 {
            return Err(AuthError::DuplicateCredential("phone".to_string()));
        }

        let password_hash = hash_off_runtime(request.password).await?;

        let now = Utc::now();
        let mut user = User {
            user_id: Uuid::new_v4().simple().to_string(),
            first_name: request.first_name,
            last_name: request.last_name,
            email,
            phone,
            password_hash,
            user_type,
            token: None,
            encrypted_token: None,
            token_version: 0,
            created_at: now,
            updated_at: now,
        };

        let (token, encrypted_token) = self.tokens.issue_token_pair(&user)?;
        user.token = Some(token);
        user.encrypted_token = Some(encrypted_token);

        // The insert re-checks uniqueness, covering signups racing past the counts
        self.bounded("insert user", self.store.insert_one(&user)).await?;

        info!("Registered user {} ({})", user.user_id, user.user_type);
        Ok(user.into())
    }

    /// Authenticate by email and password and rotate both session tokens
    pub async fn login(&self, request: LoginRequest) -> Result<UserResponse, AuthError> {
        request.validate()?;

        let found = self
            .bounded(
                "find user by email",
                self.store.find_one(&UserFilter::Email(request.email.trim().to_string())),
            )
            .await?;

        let mut user = match found {
            Some(user) => user,
            None => {
                verify_unknown_off_runtime(request.password).await?;
                return Err(AuthError::InvalidCredentials);
            }
        };

        let (valid, msg) = verify_off_runtime(user.password_hash.clone(), request.password).await?;
        if !valid {
            debug!("Login rejected for {}: {}", user.user_id, msg.trim());
            return Err(AuthError::InvalidCredentials);
        }

        let (token, encrypted_token) = self.tokens.issue_token_pair(&user)?;
        let update = UserUpdate::SetTokens {
            token,
            encrypted_token,
            updated_at: Utc::now(),
        };
        let filter = UserFilter::UserIdAtVersion {
            user_id: user.user_id.clone(),
            token_version: user.token_version,
        };

        let modified = self
            .bounded("update tokens", self.store.update_one(&filter, &update))
            .await?;
        if modified != 1 {
            return Err(AuthError::ConcurrentLogin);
        }

        update.apply(&mut user);
        info!("User {} logged in", user.user_id);
        Ok(user.into())
    }

    /// One page of accounts plus the total count
    pub async fn list_users(&self, page: Pagination) -> Result<UserPage, AuthError> {
        let (total_count, users) = self
            .bounded("list users", self.store.find_page(page.offset, page.limit))
            .await?;

        debug!(
            "Listed {} of {} users (offset {})",
            users.len(),
            total_count,
            page.offset
        );

        Ok(UserPage {
            total_count,
            users: users.into_iter().map(UserResponse::from).collect(),
        })
    }

    /// A single account by subject id
    pub async fn get_user(&self, user_id: &str) -> Result<UserResponse, AuthError> {
        self.bounded(
            "find user by id",
            self.store.find_one(&UserFilter::UserId(user_id.to_string())),
        )
        .await?
        .map(UserResponse::from)
        .ok_or_else(|| AuthError::NotFound(format!("User {}", user_id)))
    }
}

// Argon2 is CPU-bound; keep it off the async worker threads
async fn hash_off_runtime(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || PasswordService::hash_password(&password))
        .await
        .map_err(|e| {
            error!("Password hashing task failed: {}", e);
            AuthError::PasswordHashError
        })?
}

async fn verify_off_runtime(hash: String, candidate: String) -> Result<(bool, String), AuthError> {
    tokio::task::spawn_blocking(move || PasswordService::verify_password(&hash, &candidate))
        .await
        .map_err(|e| {
            error!("Password verification task failed: {}", e);
            AuthError::PasswordHashError
        })
}

async fn verify_unknown_off_runtime(candidate: String) -> Result<(), AuthError> {
    tokio::task::spawn_blocking(move || {
        if let Some(hash) = DUMMY_HASH.as_deref() {
            PasswordService::verify_password(hash, &candidate);
        }
    })
    .await
    .map_err(|e| {
        error!("Password verification task failed: {}", e);
        AuthError::PasswordHashError
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{memory::MemoryUserStore, token::TokenKeys};
    use async_trait::async_trait;

    fn test_service() -> (AuthService, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        let tokens = Arc::new(TokenService::new(TokenKeys::generate().unwrap(), 3600));
        let service = AuthService::new(store.clone(), tokens, Duration::from_secs(5));
        (service, store)
    }

    fn signup_request(email: &str, phone: &str, role: &str) -> SignupRequest {
        SignupRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            password: "secret1".to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            user_type: role.to_string(),
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_signup_stores_hash_and_tokens() {
        let (service, store) = test_service();
        let created = service
            .signup(signup_request("ada@example.com", "555-0100", "USER"))
            .await
            .unwrap();

        assert_eq!(created.user_id.len(), 32);
        assert_eq!(created.user_type, Role::User);

        let stored = store
            .find_one(&UserFilter::UserId(created.user_id.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(stored.password_hash, "secret1");
        assert!(PasswordService::verify_password(&stored.password_hash, "secret1").0);

        let signed = stored.token.unwrap();
        let claims = service.tokens().verify_signed_token(&signed).unwrap();
        assert_eq!(claims.uid, created.user_id);

        let encrypted = stored.encrypted_token.unwrap();
        let enc_claims = service.tokens().verify_encrypted_token(&encrypted).unwrap();
        assert_eq!(enc_claims.sub, created.user_id);
    }

    #[tokio::test]
    async fn test_signup_rejects_duplicate_email_and_phone() {
        let (service, store) = test_service();
        service
            .signup(signup_request("ada@example.com", "555-0100", "USER"))
            .await
            .unwrap();

        let dup_email = service
            .signup(signup_request("ADA@example.com", "555-0199", "USER"))
            .await;
        assert!(matches!(dup_email, Err(AuthError::DuplicateCredential(ref f)) if f == "email"));

        let dup_phone = service
            .signup(signup_request("bob@example.com", "555-0100", "USER"))
            .await;
        assert!(matches!(dup_phone, Err(AuthError::DuplicateCredential(ref f)) if f == "phone"));

        assert_eq!(store.count_documents(&UserFilter::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_signup_rejects_unknown_role() {
        let (service, _) = test_service();
        let result = service
            .signup(signup_request("ada@example.com", "555-0100", "SUPERUSER"))
            .await;
        assert!(matches!(result, Err(AuthError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_login_rotates_tokens() {
        let (service, store) = test_service();
        let created = service
            .signup(signup_request("ada@example.com", "555-0100", "ADMIN"))
            .await
            .unwrap();

        let logged_in = service
            .login(login_request("ada@example.com", "secret1"))
            .await
            .unwrap();

        assert_eq!(logged_in.user_id, created.user_id);
        assert_ne!(logged_in.token, created.token);
        assert_ne!(logged_in.encrypted_token, created.encrypted_token);

        let stored = store
            .find_one(&UserFilter::UserId(created.user_id.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.token, logged_in.token);
        assert_eq!(stored.encrypted_token, logged_in.encrypted_token);
        assert_eq!(stored.token_version, 1);
    }

    #[tokio::test]
    async fn test_login_with_bad_credentials() {
        let (service, _) = test_service();
        service
            .signup(signup_request("ada@example.com", "555-0100", "USER"))
            .await
            .unwrap();

        let wrong_password = service.login(login_request("ada@example.com", "secret2")).await;
        assert!(matches!(wrong_password, Err(AuthError::InvalidCredentials)));

        let unknown_email = service.login(login_request("bob@example.com", "secret1")).await;
        assert!(matches!(unknown_email, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_get_user_not_found() {
        let (service, _) = test_service();
        assert!(matches!(
            service.get_user("missing").await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_users_paginates() {
        let (service, _) = test_service();
        for i in 0..3 {
            service
                .signup(signup_request(
                    &format!("user{}@example.com", i),
                    &format!("555-010{}", i),
                    "USER",
                ))
                .await
                .unwrap();
        }

        let page = service
            .list_users(Pagination { offset: 1, limit: 1 })
            .await
            .unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.users.len(), 1);
    }

    #[test]
    fn test_unknown_user_hash_never_matches() {
        let hash = DUMMY_HASH.as_deref().unwrap();
        assert!(!PasswordService::verify_password(hash, "secret1").0);
        assert!(!PasswordService::verify_password(hash, "").0);
    }

    /// Memory store that holds every update until `parties` updates are waiting
    struct RacingStore {
        inner: MemoryUserStore,
        barrier: tokio::sync::Barrier,
    }

    #[async_trait]
    impl UserStore for RacingStore {
        async fn find_one(&self, filter: &UserFilter) -> Result<Option<User>, StoreError> {
            self.inner.find_one(filter).await
        }
        async fn count_documents(&self, filter: &UserFilter) -> Result<u64, StoreError> {
            self.inner.count_documents(filter).await
        }
        async fn insert_one(&self, user: &User) -> Result<(), StoreError> {
            self.inner.insert_one(user).await
        }
        async fn update_one(&self, filter: &UserFilter, update: &UserUpdate) -> Result<u64, StoreError> {
            self.barrier.wait().await;
            self.inner.update_one(filter, update).await
        }
        async fn find_page(&self, offset: u64, limit: u64) -> Result<(u64, Vec<User>), StoreError> {
            self.inner.find_page(offset, limit).await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_logins_have_one_winner() {
        const LOGINS: usize = 8;

        let store = Arc::new(RacingStore {
            inner: MemoryUserStore::new(),
            barrier: tokio::sync::Barrier::new(LOGINS),
        });
        let tokens = Arc::new(TokenService::new(TokenKeys::generate().unwrap(), 3600));
        let service = Arc::new(AuthService::new(
            store.clone(),
            tokens,
            Duration::from_secs(30),
        ));

        let created = service
            .signup(signup_request("ada@example.com", "555-0100", "USER"))
            .await
            .unwrap();

        let handles: Vec<_> = (0..LOGINS)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service.login(login_request("ada@example.com", "secret1")).await
                })
            })
            .collect();

        let mut winners = Vec::new();
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(user) => winners.push(user),
                Err(AuthError::ConcurrentLogin) => conflicts += 1,
                Err(other) => panic!("unexpected login error: {}", other),
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(conflicts, LOGINS - 1);

        let stored = store
            .find_one(&UserFilter::UserId(created.user_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.token_version, 1);
        assert_eq!(stored.token, winners[0].token);
    }

    /// Store whose calls never complete
    struct StalledStore;

    #[async_trait]
    impl UserStore for StalledStore {
        async fn find_one(&self, _: &UserFilter) -> Result<Option<User>, StoreError> {
            std::future::pending().await
        }
        async fn count_documents(&self, _: &UserFilter) -> Result<u64, StoreError> {
            std::future::pending().await
        }
        async fn insert_one(&self, _: &User) -> Result<(), StoreError> {
            std::future::pending().await
        }
        async fn update_one(&self, _: &UserFilter, _: &UserUpdate) -> Result<u64, StoreError> {
            std::future::pending().await
        }
        async fn find_page(&self, _: u64, _: u64) -> Result<(u64, Vec<User>), StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_store_calls_time_out() {
        let tokens = Arc::new(TokenService::new(TokenKeys::generate().unwrap(), 3600));
        let service = AuthService::new(Arc::new(StalledStore), tokens, Duration::from_millis(20));

        let result = service.get_user("u1").await;
        assert!(matches!(
            result,
            Err(AuthError::StorageError(StoreError::Timeout))
        ));
    }
}
