// SQLite UserDirectory Implementation (users, roles, user_roles)

use crate::job_repository::map_sqlx_error;
use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use datajob_core::domain::{NewUser, SortDirection, UserFilter, UserRecord};
use datajob_core::error::{AppError, Result};
use datajob_core::port::{TimeProvider, UserDirectory};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct SqliteUserDirectory {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    phone: Option<String>,
    is_active: bool,
    created_at: i64,
}

impl UserRow {
    fn into_record(self, roles: Vec<String>) -> UserRecord {
        UserRecord {
            id: self.id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            is_active: self.is_active,
            roles,
            created_at: self.created_at,
        }
    }
}

/// Argon2id hash in PHC string format
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

impl SqliteUserDirectory {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// Role names per user id, ordered by role name
    async fn roles_by_user(&self, user_ids: &[i64]) -> Result<HashMap<i64, Vec<String>>> {
        let mut by_user: HashMap<i64, Vec<String>> = HashMap::new();
        if user_ids.is_empty() {
            return Ok(by_user);
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT ur.user_id, r.name FROM user_roles ur JOIN roles r ON r.id = ur.role_id WHERE ur.user_id IN (",
        );
        let mut ids = query.separated(", ");
        for id in user_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(") ORDER BY r.name");

        let rows: Vec<(i64, String)> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        for (user_id, role) in rows {
            by_user.entry(user_id).or_default().push(role);
        }
        Ok(by_user)
    }

    async fn load(&self, id: i64) -> Result<UserRecord> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, phone, is_active, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

        let roles = self.roles_by_user(&[id]).await?.remove(&id).unwrap_or_default();
        Ok(row.into_record(roles))
    }

    /// Register a role name (used by seeding and tests)
    pub async fn ensure_role(&self, name: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO roles (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(self.time_provider.now_millis())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn email_exists(&self, email: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(count > 0)
    }

    async fn missing_roles(&self, names: &[String]) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        for name in names {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles WHERE name = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            if count == 0 {
                missing.push(name.clone());
            }
        }
        Ok(missing)
    }

    async fn create(&self, user: &NewUser) -> Result<UserRecord> {
        // Hashing is CPU bound, keep it off the async workers
        let password = user.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))??;

        let now = self.time_provider.now_millis();
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (name, email, phone, password, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id, name, email, phone, is_active, created_at
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&password_hash)
        .bind(user.is_active)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(user_id = row.id, email = %row.email, "User created");
        Ok(row.into_record(Vec::new()))
    }

    async fn assign_roles(&self, user: &UserRecord, roles: &[String]) -> Result<UserRecord> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
            .bind(user.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        for role in roles {
            let inserted = sqlx::query(
                "INSERT OR IGNORE INTO user_roles (user_id, role_id) SELECT ?, id FROM roles WHERE name = ?",
            )
            .bind(user.id)
            .bind(role)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            if inserted.rows_affected() == 0 {
                let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles WHERE name = ?")
                    .bind(role)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;
                if exists == 0 {
                    return Err(AppError::Validation(format!("Role {} does not exist", role)));
                }
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        self.load(user.id).await
    }

    async fn list_with_filters(&self, filter: &UserFilter) -> Result<Vec<UserRecord>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT u.id, u.name, u.email, u.phone, u.is_active, u.created_at FROM users u WHERE 1 = 1",
        );

        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            query
                .push(" AND (u.name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR u.email LIKE ")
                .push_bind(pattern.clone())
                .push(" OR u.phone LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(active) = filter.is_active {
            query.push(" AND u.is_active = ").push_bind(active);
        }
        if let Some(role) = filter.role_name.as_deref() {
            query
                .push(
                    " AND EXISTS (SELECT 1 FROM user_roles ur JOIN roles r ON r.id = ur.role_id \
                     WHERE ur.user_id = u.id AND r.name = ",
                )
                .push_bind(role.to_string())
                .push(")");
        }

        let direction = match filter.order_direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        query.push(format!(
            " ORDER BY u.{} {}, u.id {}",
            filter.order_by.column(),
            direction,
            direction
        ));

        let rows: Vec<UserRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut roles = self.roles_by_user(&ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let user_roles = roles.remove(&row.id).unwrap_or_default();
                row.into_record(user_roles)
            })
            .collect())
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use argon2::password_hash::{PasswordHash, PasswordVerifier};
    use datajob_core::domain::UserOrderBy;
    use datajob_core::port::time_provider::SystemTimeProvider;

    async fn directory() -> SqliteUserDirectory {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteUserDirectory::new(pool, Arc::new(SystemTimeProvider))
    }

    fn candidate(name: &str, active: bool) -> NewUser {
        NewUser {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: Some("555-0100".to_string()),
            password: "password1".to_string(),
            is_active: active,
            roles: vec![],
        }
    }

    #[tokio::test]
    async fn test_create_hashes_password_and_rejects_duplicate_email() {
        let users = directory().await;
        let ann = users.create(&candidate("Ann", true)).await.unwrap();
        assert!(users.email_exists("ann@example.com").await.unwrap());

        let stored: String = sqlx::query_scalar("SELECT password FROM users WHERE id = ?")
            .bind(ann.id)
            .fetch_one(&users.pool)
            .await
            .unwrap();
        let parsed = PasswordHash::new(&stored).unwrap();
        assert!(Argon2::default()
            .verify_password(b"password1", &parsed)
            .is_ok());

        let err = users.create(&candidate("Ann", true)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_missing_roles_and_assignment() {
        let users = directory().await;
        let names = vec!["Admin".to_string(), "Ghost".to_string()];
        assert_eq!(users.missing_roles(&names).await.unwrap(), vec!["Ghost"]);

        let ann = users.create(&candidate("Ann", true)).await.unwrap();
        let ann = users
            .assign_roles(&ann, &["User".to_string(), "Admin".to_string()])
            .await
            .unwrap();
        assert_eq!(ann.roles, vec!["Admin", "User"]);

        let err = users
            .assign_roles(&ann, &["Ghost".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        // Rolled back: previous roles kept
        assert_eq!(users.load(ann.id).await.unwrap().roles, vec!["Admin", "User"]);
    }

    #[tokio::test]
    async fn test_list_with_filters() {
        let users = directory().await;
        let ann = users.create(&candidate("Ann", true)).await.unwrap();
        users.assign_roles(&ann, &["Admin".to_string()]).await.unwrap();
        users.create(&candidate("Bob", false)).await.unwrap();
        users.create(&candidate("Cara", true)).await.unwrap();

        let active = users
            .list_with_filters(&UserFilter {
                is_active: Some(true),
                order_by: UserOrderBy::Name,
                order_direction: SortDirection::Asc,
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<&str> = active.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Ann", "Cara"]);

        let admins = users
            .list_with_filters(&UserFilter {
                role_name: Some("Admin".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].roles, vec!["Admin"]);

        let search = users
            .list_with_filters(&UserFilter {
                search: Some("bob@".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(search.len(), 1);
        assert_eq!(users.count().await.unwrap(), 3);
    }
}
