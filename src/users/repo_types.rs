use std::collections::HashMap;

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,      // Argon2 PHC string, never serialized
    pub token_version: i32,         // embedded in tokens; bump to revoke them
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Validated input for a new user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Validated changes to an existing user; `None` leaves the column as is.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

/// Exact-match list filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub username: Option<String>,
    pub email: Option<String>,
}

impl UserFilter {
    /// Picks the known keys out of the query parameters and drops the rest.
    pub fn from_params(mut params: HashMap<String, String>) -> Self {
        Self {
            username: params.remove("username"),
            email: params.remove("email"),
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        self.username.as_deref().map_or(true, |u| user.username == u)
            && self.email.as_deref().map_or(true, |e| user.email == e)
    }
}
