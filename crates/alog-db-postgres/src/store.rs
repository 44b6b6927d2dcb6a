use alog_core::{StorageError, UserId};
use sqlx_postgres::PgPool;

use crate::config::PostgresConfig;
use crate::error::{PostgresError, Result};
use crate::{migrations, pool};

/// PostgreSQL persistence gateway. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pub(crate) pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the pool and, if configured, applies migrations.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = pool::create_pool(config).await?;
        if config.run_migrations {
            migrations::run(&pool).await?;
        }
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Maps a driver error to the gateway error type.
pub(crate) fn db_err(err: sqlx_core::error::Error) -> StorageError {
    PostgresError::from(err).into()
}

/// `%needle%` for ILIKE with the pattern metacharacters escaped.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub(crate) fn to_pg_generation(generation: u16) -> alog_core::StorageResult<i16> {
    i16::try_from(generation)
        .map_err(|_| StorageError::invalid_input(format!("generation {generation} out of range")))
}

pub(crate) fn from_pg_generation(generation: i16) -> u16 {
    u16::try_from(generation).unwrap_or_default()
}

/// Returns the first id in `ids` with no user row.
pub(crate) fn first_missing(ids: &[UserId], existing: &[UserId]) -> Option<UserId> {
    ids.iter().copied().find(|id| !existing.contains(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn test_generation_conversion() {
        assert_eq!(to_pg_generation(12).unwrap(), 12);
        assert!(to_pg_generation(u16::MAX).is_err());
        assert_eq!(from_pg_generation(-1), 0);
        assert_eq!(from_pg_generation(7), 7);
    }

    #[test]
    fn test_first_missing() {
        assert_eq!(first_missing(&[1, 2, 3], &[1, 3]), Some(2));
        assert_eq!(first_missing(&[1], &[1]), None);
    }
}
