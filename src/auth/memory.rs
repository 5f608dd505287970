// In-memory user store for tests and database-free runs

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::auth::{
    models::User,
    repository::{StoreError, UserFilter, UserStore, UserUpdate},
};

/// User store held in process memory
///
/// Uniqueness checks and updates run under the write lock, so concurrent
/// inserts and compare-and-swap updates behave like the database's.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_one(&self, filter: &UserFilter) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| filter.matches(u)).cloned())
    }

    async fn count_documents(&self, filter: &UserFilter) -> Result<u64, StoreError> {
        let users = self.users.read().await;
        Ok(users.iter().filter(|u| filter.matches(u)).count() as u64)
    }

    async fn insert_one(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;

        if users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(StoreError::Duplicate("email".to_string()));
        }
        if users.iter().any(|u| u.phone == user.phone) {
            return Err(StoreError::Duplicate("phone".to_string()));
        }
        if users.iter().any(|u| u.user_id == user.user_id) {
            return Err(StoreError::Duplicate("user".to_string()));
        }

        users.push(user.clone());
        Ok(())
    }

    async fn update_one(&self, filter: &UserFilter, update: &UserUpdate) -> Result<u64, StoreError> {
        if !filter.is_keyed() {
            return Err(StoreError::UnkeyedUpdate);
        }

        let mut users = self.users.write().await;

        match users.iter_mut().find(|u| filter.matches(u)) {
            Some(user) => {
                update.apply(user);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn find_page(&self, offset: u64, limit: u64) -> Result<(u64, Vec<User>), StoreError> {
        let users = self.users.read().await;

        let mut ordered: Vec<&User> = users.iter().collect();
        ordered.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });

        let page = ordered
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok((users.len() as u64, page))
    }
}
