use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account, stored in the `users` collection.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub user_id: String,
    pub name: String,
    /// Lowercased on signup; lookups use the same normalization.
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Who is performing a request. Derived once from the verified bearer token
/// and passed explicitly into every task and project operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ActorIdentity {
    pub user_id: String,
    pub email: String,
    pub name: String,
}

impl ActorIdentity {
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            name: name.into(),
        }
    }
}

impl From<&User> for ActorIdentity {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}
