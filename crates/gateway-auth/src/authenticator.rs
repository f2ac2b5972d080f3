//! Credential authentication

use async_trait::async_trait;
use gateway_db::Database;
use tracing::debug;

use crate::error::AuthError;
use crate::identity::Identity;
use crate::password::{hash_password, verify_password};

/// Exchanges a username and password for an identity
///
/// Implementations must fail with [`AuthError::InvalidCredentials`] for
/// both unknown users and wrong passwords.
#[async_trait]
pub trait CredentialAuthenticator: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Identity, AuthError>;
}

/// Authenticator backed by the gateway user store
///
/// Usernames are email addresses.
#[derive(Clone)]
pub struct DatabaseAuthenticator {
    db: Database,
    /// Hash verified when the user does not exist, so that lookups of
    /// unknown users cost the same as wrong passwords
    dummy_hash: String,
}

impl DatabaseAuthenticator {
    pub fn new(db: Database) -> Result<Self, AuthError> {
        let dummy_hash = hash_password("gateway-unknown-user")?;
        Ok(Self { db, dummy_hash })
    }
}

#[async_trait]
impl CredentialAuthenticator for DatabaseAuthenticator {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        debug!("Login attempt for user: {}", username);

        let user = self.db.get_user_by_email(username).await?;

        let hash_to_verify = match &user {
            Some(u) => u.password_hash.as_str(),
            None => self.dummy_hash.as_str(),
        };

        let password_valid = verify_password(password, hash_to_verify)?;

        match (user, password_valid) {
            (Some(u), true) => Ok(Identity::from(&u)),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_db::NewUser;

    async fn authenticator(dir: &tempfile::TempDir) -> DatabaseAuthenticator {
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("auth.db").display());
        let db = Database::new(&url).await.unwrap();
        db.insert_user(NewUser {
            email: "a@x.com".to_string(),
            password_hash: hash_password("s3cret").unwrap(),
            roles: vec!["STUDENT".to_string()],
        })
        .await
        .unwrap();
        DatabaseAuthenticator::new(db).unwrap()
    }

    #[tokio::test]
    async fn test_valid_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authenticator(&dir).await;

        let identity = auth.authenticate("a@x.com", "s3cret").await.unwrap();
        assert_eq!(identity.email, "a@x.com");
        assert_eq!(identity.roles, vec!["STUDENT"]);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_the_same() {
        let dir = tempfile::tempdir().unwrap();
        let auth = authenticator(&dir).await;

        let wrong = auth.authenticate("a@x.com", "nope").await;
        let unknown = auth.authenticate("b@x.com", "s3cret").await;

        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
    }
}
