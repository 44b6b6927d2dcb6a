//! Domain entities.

mod credential;
mod log;
mod page;
mod user;

pub use credential::{OAuthState, RefreshToken, Session};
pub use log::{Author, Comment, Log, LogId, LogPatch, NewLog, Topic};
pub use page::Page;
pub use user::{NewUser, User, UserId};
