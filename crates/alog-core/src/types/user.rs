use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// User identifier. Shared with the identity provider's `sub` claim.
pub type UserId = i64;

/// A local user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Public handle used in article URLs.
    pub handle: String,
    pub profile_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Affiliation. Empty until an administrator approves the account.
    pub part_of: String,
    /// Cohort number. `0` until approved.
    pub generation: u16,
    pub connections: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Fields required to create a user at signup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub id: UserId,
    pub name: String,
    pub handle: String,
    pub profile_image: String,
    pub email: Option<String>,
}

impl NewUser {
    /// Builds the stored record with unapproved profile defaults.
    #[must_use]
    pub fn into_user(self, now: OffsetDateTime) -> User {
        User {
            id: self.id,
            name: self.name,
            handle: self.handle,
            profile_image: self.profile_image,
            email: self.email,
            part_of: String::new(),
            generation: 0,
            connections: Vec::new(),
            joined_at: now,
            updated_at: now,
        }
    }
}
