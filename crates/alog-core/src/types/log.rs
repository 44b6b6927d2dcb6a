use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::user::UserId;

/// Log (article) identifier.
pub type LogId = i64;

/// Author summary hydrated alongside a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: UserId,
    pub name: String,
    pub handle: String,
}

/// A published article.
///
/// `pre_rendered` and `description` are derived from `content` and may lag
/// behind it until the render pool catches up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub id: LogId,
    pub title: String,
    pub content: String,
    pub pre_rendered: String,
    pub description: String,
    pub topics: Vec<String>,
    pub generations: Vec<u16>,
    /// Author ids in authorship order. The first entry is the owner.
    pub logged_by: Vec<UserId>,
    /// Authors in `logged_by` order, when the backend hydrated them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Log {
    /// Returns `true` if `user` is one of the log's authors.
    #[must_use]
    pub fn is_authored_by(&self, user: UserId) -> bool {
        self.logged_by.contains(&user)
    }

    /// The owning author, if hydrated.
    #[must_use]
    pub fn first_author(&self) -> Option<&Author> {
        self.authors.first()
    }
}

/// Input for creating a log. Topic and author associations are written in
/// the same transaction as the log row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLog {
    pub title: String,
    pub content: String,
    pub description: String,
    pub topics: Vec<String>,
    pub generations: Vec<u16>,
    pub logged_by: Vec<UserId>,
    pub created_at: OffsetDateTime,
}

/// Partial update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub description: Option<String>,
    pub topics: Option<Vec<String>>,
    pub generations: Option<Vec<u16>>,
    pub logged_by: Option<Vec<UserId>>,
}

impl LogPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.description.is_none()
            && self.topics.is_none()
            && self.generations.is_none()
            && self.logged_by.is_none()
    }
}

/// A comment on a log. Deleted together with its log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub log_id: LogId,
    pub author_id: UserId,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A topic tag and the number of logs carrying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub count: i64,
}
