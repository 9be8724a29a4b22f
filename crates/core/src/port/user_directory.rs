// User Directory Port (record-creation API used by import/export)

use crate::domain::{NewUser, UserFilter, UserRecord};
use crate::error::Result;
use async_trait::async_trait;

/// Existing user-management API. Used by the tasks, never reimplemented by them.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Whether a user with this email already exists
    async fn email_exists(&self, email: &str) -> Result<bool>;

    /// Subset of `names` that do not name an existing role
    async fn missing_roles(&self, names: &[String]) -> Result<Vec<String>>;

    /// Persist a validated candidate
    async fn create(&self, user: &NewUser) -> Result<UserRecord>;

    /// Replace the user's roles with `roles`
    async fn assign_roles(&self, user: &UserRecord, roles: &[String]) -> Result<UserRecord>;

    /// Users matching the listing criteria (unpaginated)
    async fn list_with_filters(&self, filter: &UserFilter) -> Result<Vec<UserRecord>>;

    /// Total number of users, regardless of filters
    async fn count(&self) -> Result<i64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    /// In-memory user directory
    pub struct InMemoryUserDirectory {
        roles: BTreeSet<String>,
        users: Mutex<Vec<UserRecord>>,
        fail_on_email: Mutex<Option<String>>,
    }

    impl InMemoryUserDirectory {
        pub fn new(roles: &[&str]) -> Self {
            Self {
                roles: roles.iter().map(|r| r.to_string()).collect(),
                users: Mutex::new(Vec::new()),
                fail_on_email: Mutex::new(None),
            }
        }

        /// Make `create` fail for this email (simulates a storage failure on one row)
        pub fn fail_on(&self, email: impl Into<String>) {
            *self.fail_on_email.lock().unwrap() = Some(email.into());
        }

        pub fn users(&self) -> Vec<UserRecord> {
            self.users.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UserDirectory for InMemoryUserDirectory {
        async fn email_exists(&self, email: &str) -> Result<bool> {
            Ok(self.users.lock().unwrap().iter().any(|u| u.email == email))
        }

        async fn missing_roles(&self, names: &[String]) -> Result<Vec<String>> {
            Ok(names
                .iter()
                .filter(|n| !self.roles.contains(n.as_str()))
                .cloned()
                .collect())
        }

        async fn create(&self, user: &NewUser) -> Result<UserRecord> {
            if self.fail_on_email.lock().unwrap().as_deref() == Some(user.email.as_str()) {
                return Err(AppError::Database(format!(
                    "Simulated failure creating {}",
                    user.email
                )));
            }
            let mut users = self.users.lock().unwrap();
            let record = UserRecord {
                id: users.len() as i64 + 1,
                name: user.name.clone(),
                email: user.email.clone(),
                phone: user.phone.clone(),
                is_active: user.is_active,
                roles: Vec::new(),
                created_at: 0,
            };
            users.push(record.clone());
            Ok(record)
        }

        async fn assign_roles(&self, user: &UserRecord, roles: &[String]) -> Result<UserRecord> {
            let mut users = self.users.lock().unwrap();
            let stored = users
                .iter_mut()
                .find(|u| u.id == user.id)
                .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.id)))?;
            stored.roles = roles.to_vec();
            Ok(stored.clone())
        }

        async fn list_with_filters(&self, filter: &UserFilter) -> Result<Vec<UserRecord>> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .filter(|u| filter.is_active.map_or(true, |a| u.is_active == a))
                .filter(|u| {
                    filter
                        .role_name
                        .as_ref()
                        .map_or(true, |r| u.roles.contains(r))
                })
                .filter(|u| {
                    filter.search.as_ref().map_or(true, |s| {
                        u.name.contains(s.as_str())
                            || u.email.contains(s.as_str())
                            || u.phone.as_deref().is_some_and(|p| p.contains(s.as_str()))
                    })
                })
                .cloned()
                .collect())
        }

        async fn count(&self) -> Result<i64> {
            Ok(self.users.lock().unwrap().len() as i64)
        }
    }
}
