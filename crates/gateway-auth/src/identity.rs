//! Authenticated principals

use gateway_db::User;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated identity
///
/// The first entry of `roles` is the primary role, the only one carried
/// in issued tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub id: Uuid,
    pub roles: Vec<String>,
}

impl Identity {
    pub fn new(email: impl Into<String>, id: Uuid, roles: Vec<String>) -> Self {
        Self {
            email: email.into(),
            id,
            roles,
        }
    }

    /// Primary role, if any
    pub fn primary_role(&self) -> Option<&str> {
        self.roles.first().map(String::as_str)
    }
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            id: user.id,
            roles: user.roles.clone(),
        }
    }
}

/// Identity bound to a request by the authorization stage
#[derive(Debug, Clone)]
pub struct Principal(pub Identity);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_role() {
        let identity = Identity::new(
            "a@x.com",
            Uuid::nil(),
            vec!["STUDENT".to_string(), "ADMIN".to_string()],
        );
        assert_eq!(identity.primary_role(), Some("STUDENT"));

        let empty = Identity::new("b@x.com", Uuid::nil(), vec![]);
        assert_eq!(empty.primary_role(), None);
    }
}
