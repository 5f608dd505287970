// User store contract and its PostgreSQL implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::auth::models::User;

/// Storage failures surfaced by a `UserStore`
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} already exists")]
    Duplicate(String),

    #[error("store operation timed out")]
    Timeout,

    #[error("update_one requires a filter on a unique key")]
    UnkeyedUpdate,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Selects the identities a store operation applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserFilter {
    All,
    Email(String),
    Phone(String),
    UserId(String),
    /// Matches only while the identity's tokens are still at `token_version`
    UserIdAtVersion { user_id: String, token_version: i64 },
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        match self {
            UserFilter::All => true,
            UserFilter::Email(email) => user.email.eq_ignore_ascii_case(email),
            UserFilter::Phone(phone) => user.phone == *phone,
            UserFilter::UserId(user_id) => user.user_id == *user_id,
            UserFilter::UserIdAtVersion {
                user_id,
                token_version,
            } => user.user_id == *user_id && user.token_version == *token_version,
        }
    }

    /// True when the filter can match at most one identity
    pub fn is_keyed(&self) -> bool {
        !matches!(self, UserFilter::All)
    }

    fn push_where(&self, query: &mut QueryBuilder<'_, Postgres>) {
        match self {
            UserFilter::All => {}
            UserFilter::Email(email) => {
                query.push(" WHERE LOWER(email) = LOWER(");
                query.push_bind(email.clone());
                query.push(")");
            }
            UserFilter::Phone(phone) => {
                query.push(" WHERE phone = ");
                query.push_bind(phone.clone());
            }
            UserFilter::UserId(user_id) => {
                query.push(" WHERE user_id = ");
                query.push_bind(user_id.clone());
            }
            UserFilter::UserIdAtVersion {
                user_id,
                token_version,
            } => {
                query.push(" WHERE user_id = ");
                query.push_bind(user_id.clone());
                query.push(" AND token_version = ");
                query.push_bind(*token_version);
            }
        }
    }
}

/// Mutation applied by `update_one`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserUpdate {
    /// Overwrite both session tokens and bump `token_version`
    SetTokens {
        token: String,
        encrypted_token: String,
        updated_at: DateTime<Utc>,
    },
}

impl UserUpdate {
    pub fn apply(&self, user: &mut User) {
        match self {
            UserUpdate::SetTokens {
                token,
                encrypted_token,
                updated_at,
            } => {
                user.token = Some(token.clone());
                user.encrypted_token = Some(encrypted_token.clone());
                user.token_version += 1;
                user.updated_at = *updated_at;
            }
        }
    }
}

/// Document-style access to persisted identities
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_one(&self, filter: &UserFilter) -> Result<Option<User>, StoreError>;

    async fn count_documents(&self, filter: &UserFilter) -> Result<u64, StoreError>;

    /// Insert a new identity; fails with `Duplicate` when email, phone or id is taken
    async fn insert_one(&self, user: &User) -> Result<(), StoreError>;

    /// Apply `update` to the identity matching a keyed `filter`, returning the modified count
    async fn update_one(&self, filter: &UserFilter, update: &UserUpdate) -> Result<u64, StoreError>;

    /// Identities ordered by creation time, plus the total count
    async fn find_page(&self, offset: u64, limit: u64) -> Result<(u64, Vec<User>), StoreError>;
}

const USER_COLUMNS: &str = "user_id, first_name, last_name, email, phone, password_hash, \
    user_type, token, encrypted_token, token_version, created_at, updated_at";

/// PostgreSQL-backed user store
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new PgUserStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Postgres takes signed LIMIT/OFFSET values
fn to_sql_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Map a unique-constraint violation onto the field that collided
fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let field = match db_err.constraint() {
                Some(c) if c.contains("email") => "email",
                Some(c) if c.contains("phone") => "phone",
                _ => "user",
            };
            return StoreError::Duplicate(field.to_string());
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_one(&self, filter: &UserFilter) -> Result<Option<User>, StoreError> {
        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM users", USER_COLUMNS));
        filter.push_where(&mut query);
        query.push(" LIMIT 1");

        let user = query
            .build_query_as::<User>()
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn count_documents(&self, filter: &UserFilter) -> Result<u64, StoreError> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        filter.push_where(&mut query);

        let count = query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn insert_one(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, first_name, last_name, email, phone, password_hash,
                               user_type, token, encrypted_token, token_version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&user.user_id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(user.user_type.as_str())
        .bind(&user.token)
        .bind(&user.encrypted_token)
        .bind(user.token_version)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(())
    }

    async fn update_one(&self, filter: &UserFilter, update: &UserUpdate) -> Result<u64, StoreError> {
        if !filter.is_keyed() {
            return Err(StoreError::UnkeyedUpdate);
        }

        let mut query = QueryBuilder::<Postgres>::new("UPDATE users SET ");
        match update {
            UserUpdate::SetTokens {
                token,
                encrypted_token,
                updated_at,
            } => {
                query.push("token = ");
                query.push_bind(token.clone());
                query.push(", encrypted_token = ");
                query.push_bind(encrypted_token.clone());
                query.push(", updated_at = ");
                query.push_bind(*updated_at);
                query.push(", token_version = token_version + 1");
            }
        }

        // Keyed filters hit a unique column, so at most one row changes
        filter.push_where(&mut query);

        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn find_page(&self, offset: u64, limit: u64) -> Result<(u64, Vec<User>), StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY created_at, user_id LIMIT $1 OFFSET $2",
            USER_COLUMNS
        ))
        .bind(to_sql_bigint(limit))
        .bind(to_sql_bigint(offset))
        .fetch_all(&self.pool)
        .await?;

        Ok((total as u64, users))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Role;

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            user_id: "abc".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "Ada@Example.com".to_string(),
            phone: "555-0100".to_string(),
            password_hash: "hash".to_string(),
            user_type: Role::User,
            token: None,
            encrypted_token: None,
            token_version: 3,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_filter_matching() {
        let user = sample_user();

        assert!(UserFilter::All.matches(&user));
        assert!(UserFilter::Email("ada@example.com".into()).matches(&user));
        assert!(!UserFilter::Email("bob@example.com".into()).matches(&user));
        assert!(UserFilter::Phone("555-0100".into()).matches(&user));
        assert!(UserFilter::UserId("abc".into()).matches(&user));
        assert!(UserFilter::UserIdAtVersion {
            user_id: "abc".into(),
            token_version: 3
        }
        .matches(&user));
        assert!(!UserFilter::UserIdAtVersion {
            user_id: "abc".into(),
            token_version: 2
        }
        .matches(&user));
    }

    #[test]
    fn test_set_tokens_bumps_version() {
        let mut user = sample_user();
        let later = user.updated_at + chrono::Duration::seconds(5);

        UserUpdate::SetTokens {
            token: "signed".into(),
            encrypted_token: "enc.x".into(),
            updated_at: later,
        }
        .apply(&mut user);

        assert_eq!(user.token.as_deref(), Some("signed"));
        assert_eq!(user.encrypted_token.as_deref(), Some("enc.x"));
        assert_eq!(user.token_version, 4);
        assert_eq!(user.updated_at, later);
    }

    #[test]
    fn test_only_all_is_unkeyed() {
        assert!(!UserFilter::All.is_keyed());
        assert!(UserFilter::Email("ada@example.com".into()).is_keyed());
        assert!(UserFilter::UserIdAtVersion {
            user_id: "abc".into(),
            token_version: 0
        }
        .is_keyed());
    }

    #[test]
    fn test_offsets_never_bind_negative() {
        assert_eq!(to_sql_bigint(0), 0);
        assert_eq!(to_sql_bigint(25), 25);
        assert_eq!(to_sql_bigint(i64::MAX as u64), i64::MAX);
        assert_eq!(to_sql_bigint(u64::MAX), i64::MAX);
    }

    #[test]
    fn test_where_clause_rendering() {
        let mut query = QueryBuilder::<Postgres>::new("SELECT 1 FROM users");
        UserFilter::UserIdAtVersion {
            user_id: "abc".into(),
            token_version: 1,
        }
        .push_where(&mut query);

        assert_eq!(
            query.sql(),
            "SELECT 1 FROM users WHERE user_id = $1 AND token_version = $2"
        );
    }
}
