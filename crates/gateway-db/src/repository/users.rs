//! User operations

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{NewUser, User};
use crate::repository::Database;
use crate::utils::normalize_email;

impl Database {
    // ==================== User Operations ====================

    /// Insert a new user together with its ordered roles
    pub async fn insert_user(&self, user: NewUser) -> Result<User, DbError> {
        let now = Utc::now();
        let email = normalize_email(&user.email);

        if email.is_empty() {
            return Err(DbError::Invalid("email cannot be empty".to_string()));
        }

        // Check if user already exists
        let existing = self.get_user_by_email(&email).await?;
        if existing.is_some() {
            return Err(DbError::Duplicate(format!("User '{}' already exists", email)));
        }

        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&email)
        .bind(&user.password_hash)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let mut roles: Vec<String> = Vec::with_capacity(user.roles.len());
        for role in user.roles {
            if roles.contains(&role) {
                continue;
            }
            sqlx::query("INSERT INTO user_roles (user_id, role, position) VALUES (?, ?, ?)")
                .bind(id.to_string())
                .bind(&role)
                .bind(roles.len() as i64)
                .execute(&mut *tx)
                .await?;
            roles.push(role);
        }

        tx.commit().await?;

        Ok(User {
            id,
            email,
            password_hash: user.password_hash,
            roles,
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a user by email
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let result = sqlx::query(
            r#"
            SELECT id, email, password_hash, created_at, updated_at
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => {
                let mut user = User::try_from(&row)?;
                user.roles = self.get_user_roles(user.id).await?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    /// Get the ordered roles of a user
    pub async fn get_user_roles(&self, user_id: Uuid) -> Result<Vec<String>, DbError> {
        let rows = sqlx::query(
            r#"
            SELECT role
            FROM user_roles
            WHERE user_id = ?
            ORDER BY position
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("role").map_err(DbError::from))
            .collect()
    }

    /// Check if any users exist
    pub async fn has_users(&self) -> Result<bool, DbError> {
        let result = sqlx::query("SELECT COUNT(*) as count FROM users")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = result.get("count");
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_db(dir: &tempfile::TempDir) -> Database {
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("users.db").display());
        Database::new(&url).await.unwrap()
    }

    fn new_user(email: &str, roles: &[&str]) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch_preserves_role_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir).await;

        assert!(!db.has_users().await.unwrap());

        let created = db
            .insert_user(new_user("a@x.com", &["STUDENT", "ADMIN"]))
            .await
            .unwrap();
        assert!(db.has_users().await.unwrap());

        let fetched = db.get_user_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.roles, vec!["STUDENT", "ADMIN"]);
    }

    #[tokio::test]
    async fn test_email_lookup_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir).await;

        db.insert_user(new_user("Admin@X.com", &["ADMIN"])).await.unwrap();

        let fetched = db.get_user_by_email("admin@x.COM").await.unwrap();
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().email, "admin@x.com");
    }

    #[tokio::test]
    async fn test_duplicate_user_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir).await;

        db.insert_user(new_user("a@x.com", &["STUDENT"])).await.unwrap();
        let result = db.insert_user(new_user("a@x.com", &["ADMIN"])).await;
        assert!(matches!(result, Err(DbError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_duplicate_roles_collapsed() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir).await;

        let user = db
            .insert_user(new_user("a@x.com", &["STUDENT", "STUDENT", "ADMIN"]))
            .await
            .unwrap();
        assert_eq!(user.roles, vec!["STUDENT", "ADMIN"]);
    }

    #[tokio::test]
    async fn test_unknown_user_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir).await;

        assert!(db.get_user_by_email("nobody@x.com").await.unwrap().is_none());
    }
}
