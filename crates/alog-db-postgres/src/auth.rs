//! OAuth state, session and refresh token storage.
//!
//! `take` is a single `DELETE ... RETURNING`, so of two concurrent callers
//! only one receives the row.

use alog_core::{
    OAuthState, OAuthStateStorage, RefreshToken, RefreshTokenStorage, Session, SessionStorage,
    StorageError, StorageResult, UserId,
};
use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use tracing::instrument;

use crate::error::is_unique_violation;
use crate::store::{PostgresStore, db_err};

type OAuthStateRow = (String, String, String, bool, OffsetDateTime, OffsetDateTime);

fn oauth_state_from_row(row: OAuthStateRow) -> OAuthState {
    OAuthState {
        state: row.0,
        code_verifier: row.1,
        redirect_uri: row.2,
        is_signup: row.3,
        expires_at: row.4,
        created_at: row.5,
    }
}

type SessionRow = (String, i64, OffsetDateTime, OffsetDateTime);

fn session_from_row(row: SessionRow) -> Session {
    Session {
        session_token: row.0,
        user_id: row.1,
        expires_at: row.2,
        created_at: row.3,
    }
}

type RefreshTokenRow = (String, i64, OffsetDateTime, OffsetDateTime);

fn refresh_token_from_row(row: RefreshTokenRow) -> RefreshToken {
    RefreshToken {
        token: row.0,
        user_id: row.1,
        issued_at: row.2,
        expires_at: row.3,
    }
}

#[async_trait]
impl OAuthStateStorage for PostgresStore {
    #[instrument(name = "pg.oauth_state.create", skip_all)]
    async fn create(&self, state: &OAuthState) -> StorageResult<()> {
        query(
            "INSERT INTO oauth_states \
                 (state, code_verifier, redirect_uri, is_signup, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&state.state)
        .bind(&state.code_verifier)
        .bind(&state.redirect_uri)
        .bind(state.is_signup)
        .bind(state.expires_at)
        .bind(state.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::conflict("oauth_state", "<redacted>")
            } else {
                db_err(e)
            }
        })?;
        Ok(())
    }

    #[instrument(name = "pg.oauth_state.take", skip_all)]
    async fn take(&self, state: &str) -> StorageResult<Option<OAuthState>> {
        let row: Option<OAuthStateRow> = query_as(
            "DELETE FROM oauth_states WHERE state = $1 \
             RETURNING state, code_verifier, redirect_uri, is_signup, expires_at, created_at",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(oauth_state_from_row))
    }

    #[instrument(name = "pg.oauth_state.delete_expired", skip(self))]
    async fn delete_expired(&self, now: OffsetDateTime) -> StorageResult<u64> {
        let result = query("DELETE FROM oauth_states WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionStorage for PostgresStore {
    #[instrument(name = "pg.session.create", skip_all, fields(user_id = session.user_id))]
    async fn create(&self, session: &Session) -> StorageResult<()> {
        query(
            "INSERT INTO sessions (session_token, user_id, expires_at, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&session.session_token)
        .bind(session.user_id)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::conflict("session", "<redacted>")
            } else {
                db_err(e)
            }
        })?;
        Ok(())
    }

    #[instrument(name = "pg.session.find_by_token", skip_all)]
    async fn find_by_token(&self, token: &str) -> StorageResult<Option<Session>> {
        let row: Option<SessionRow> = query_as(
            "SELECT session_token, user_id, expires_at, created_at \
             FROM sessions WHERE session_token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(session_from_row))
    }

    #[instrument(name = "pg.session.delete", skip_all)]
    async fn delete(&self, token: &str) -> StorageResult<bool> {
        let result = query("DELETE FROM sessions WHERE session_token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(name = "pg.session.delete_by_user", skip(self))]
    async fn delete_by_user(&self, user_id: UserId) -> StorageResult<u64> {
        let result = query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    #[instrument(name = "pg.session.delete_expired", skip(self))]
    async fn delete_expired(&self, now: OffsetDateTime) -> StorageResult<u64> {
        let result = query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RefreshTokenStorage for PostgresStore {
    #[instrument(name = "pg.refresh_token.create", skip_all, fields(user_id = token.user_id))]
    async fn create(&self, token: &RefreshToken) -> StorageResult<()> {
        query(
            "INSERT INTO refresh_tokens (token, user_id, issued_at, expires_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::conflict("refresh_token", "<redacted>")
            } else {
                db_err(e)
            }
        })?;
        Ok(())
    }

    #[instrument(name = "pg.refresh_token.take", skip_all)]
    async fn take(&self, token: &str) -> StorageResult<Option<RefreshToken>> {
        let row: Option<RefreshTokenRow> = query_as(
            "DELETE FROM refresh_tokens WHERE token = $1 \
             RETURNING token, user_id, issued_at, expires_at",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(refresh_token_from_row))
    }

    #[instrument(name = "pg.refresh_token.delete_by_user", skip(self))]
    async fn delete_by_user(&self, user_id: UserId) -> StorageResult<u64> {
        let result = query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    #[instrument(name = "pg.refresh_token.delete_expired", skip(self))]
    async fn delete_expired(&self, now: OffsetDateTime) -> StorageResult<u64> {
        let result = query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}
