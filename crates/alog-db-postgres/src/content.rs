//! User and log storage.

use alog_core::{
    Author, Log, LogId, LogPatch, LogStorage, NewLog, NewUser, Page, StorageError, StorageResult,
    User, UserId, UserStorage,
};
use async_trait::async_trait;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::{PgConnection, Postgres};
use time::OffsetDateTime;
use tracing::instrument;

use crate::store::{
    PostgresStore, db_err, first_missing, from_pg_generation, like_pattern, to_pg_generation,
};

// =============================================================================
// Row types
// =============================================================================

type UserRow = (
    i64,
    String,
    String,
    String,
    Option<String>,
    String,
    i16,
    Vec<String>,
    OffsetDateTime,
    OffsetDateTime,
);

const USER_COLUMNS: &str = "id, name, handle, profile_image, email, part_of, generation, \
                            connections, joined_at, updated_at";

fn user_from_row(row: UserRow) -> User {
    User {
        id: row.0,
        name: row.1,
        handle: row.2,
        profile_image: row.3,
        email: row.4,
        part_of: row.5,
        generation: from_pg_generation(row.6),
        connections: row.7,
        joined_at: row.8,
        updated_at: row.9,
    }
}

type LogRow = (
    i64,
    String,
    String,
    String,
    String,
    Vec<i16>,
    OffsetDateTime,
    OffsetDateTime,
    Vec<String>,
    Vec<i64>,
    Vec<String>,
    Vec<String>,
);

/// Log columns plus topic and author arrays, authors in position order.
const LOG_SELECT: &str = r#"
    SELECT l.id, l.title, l.content, l.pre_rendered, l.description, l.generations,
           l.created_at, l.updated_at,
           COALESCE((SELECT array_agg(lt.topic ORDER BY lt.topic)
                     FROM log_topics lt WHERE lt.log_id = l.id), '{}') AS topics,
           COALESCE((SELECT array_agg(la.user_id ORDER BY la.position)
                     FROM log_authors la WHERE la.log_id = l.id), '{}') AS logged_by,
           COALESCE((SELECT array_agg(u.name ORDER BY la.position)
                     FROM log_authors la JOIN users u ON u.id = la.user_id
                     WHERE la.log_id = l.id), '{}') AS author_names,
           COALESCE((SELECT array_agg(u.handle ORDER BY la.position)
                     FROM log_authors la JOIN users u ON u.id = la.user_id
                     WHERE la.log_id = l.id), '{}') AS author_handles
    FROM logs l
"#;

fn log_from_row(row: LogRow) -> Log {
    let authors = row
        .9
        .iter()
        .zip(row.10)
        .zip(row.11)
        .map(|((id, name), handle)| Author {
            id: *id,
            name,
            handle,
        })
        .collect();

    Log {
        id: row.0,
        title: row.1,
        content: row.2,
        pre_rendered: row.3,
        description: row.4,
        generations: row.5.into_iter().map(from_pg_generation).collect(),
        created_at: row.6,
        updated_at: row.7,
        topics: row.8,
        logged_by: row.9,
        authors,
    }
}

fn pg_generations(generations: &[u16]) -> StorageResult<Vec<i16>> {
    generations.iter().copied().map(to_pg_generation).collect()
}

// =============================================================================
// Association helpers (run inside a transaction)
// =============================================================================

async fn ensure_users_exist(conn: &mut PgConnection, ids: &[UserId]) -> StorageResult<()> {
    if ids.is_empty() {
        return Err(StorageError::invalid_input(
            "log must have at least one author",
        ));
    }
    let existing: Vec<i64> = query_scalar("SELECT id FROM users WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;

    match first_missing(ids, &existing) {
        Some(missing) => Err(StorageError::not_found("user", missing)),
        None => Ok(()),
    }
}

async fn replace_topics(conn: &mut PgConnection, log_id: LogId, topics: &[String]) -> StorageResult<()> {
    query("DELETE FROM log_topics WHERE log_id = $1")
        .bind(log_id)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

    if topics.is_empty() {
        return Ok(());
    }

    query("INSERT INTO topics (name) SELECT DISTINCT unnest($1::text[]) ON CONFLICT DO NOTHING")
        .bind(topics)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

    query(
        "INSERT INTO log_topics (log_id, topic) \
         SELECT DISTINCT $1::bigint, t FROM unnest($2::text[]) AS t",
    )
    .bind(log_id)
    .bind(topics)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(())
}

async fn replace_authors(conn: &mut PgConnection, log_id: LogId, authors: &[UserId]) -> StorageResult<()> {
    query("DELETE FROM log_authors WHERE log_id = $1")
        .bind(log_id)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;

    query(
        "INSERT INTO log_authors (log_id, user_id, position) \
         SELECT $1, a.user_id, MIN(a.ord) - 1 \
         FROM unnest($2::bigint[]) WITH ORDINALITY AS a(user_id, ord) \
         GROUP BY a.user_id",
    )
    .bind(log_id)
    .bind(authors)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;

    Ok(())
}

async fn find_log(conn: &mut PgConnection, id: LogId) -> StorageResult<Option<Log>> {
    let sql = format!("{LOG_SELECT} WHERE l.id = $1");
    let row: Option<LogRow> = query_as::<Postgres, LogRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(row.map(log_from_row))
}

// =============================================================================
// UserStorage
// =============================================================================

#[async_trait]
impl UserStorage for PostgresStore {
    #[instrument(name = "pg.user.find_by_id", skip(self))]
    async fn find_by_id(&self, id: UserId) -> StorageResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row: Option<UserRow> = query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(user_from_row))
    }

    #[instrument(name = "pg.user.create", skip_all, fields(user_id = user.id))]
    async fn create(&self, user: NewUser) -> StorageResult<User> {
        let sql = format!(
            "INSERT INTO users (id, name, handle, profile_image, email) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {USER_COLUMNS}"
        );
        let row: Option<UserRow> = query_as(&sql)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.handle)
            .bind(&user.profile_image)
            .bind(&user.email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(user_from_row)
            .ok_or_else(|| StorageError::conflict("user", user.id))
    }

    #[instrument(name = "pg.user.list", skip(self))]
    async fn list(&self, limit: u32, offset: u32) -> StorageResult<Page<User>> {
        let total: i64 = query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             ORDER BY joined_at DESC, id DESC LIMIT $1 OFFSET $2"
        );
        let rows: Vec<UserRow> = query_as(&sql)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(Page::new(
            rows.into_iter().map(user_from_row).collect(),
            total.max(0) as u64,
            limit,
            offset,
        ))
    }

    #[instrument(name = "pg.user.search", skip(self))]
    async fn search(&self, q: &str, limit: u32, offset: u32) -> StorageResult<Page<User>> {
        let pattern = like_pattern(q);
        let total: i64 =
            query_scalar("SELECT COUNT(*) FROM users WHERE name ILIKE $1 OR part_of ILIKE $1")
                .bind(&pattern)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE name ILIKE $1 OR part_of ILIKE $1 \
             ORDER BY joined_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        let rows: Vec<UserRow> = query_as(&sql)
            .bind(&pattern)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(Page::new(
            rows.into_iter().map(user_from_row).collect(),
            total.max(0) as u64,
            limit,
            offset,
        ))
    }
}

// =============================================================================
// LogStorage
// =============================================================================

#[async_trait]
impl LogStorage for PostgresStore {
    #[instrument(name = "pg.log.find_by_id", skip(self))]
    async fn find_by_id(&self, id: LogId) -> StorageResult<Option<Log>> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        find_log(&mut conn, id).await
    }

    #[instrument(name = "pg.log.list", skip(self))]
    async fn list(&self, limit: u32, offset: u32) -> StorageResult<Page<Log>> {
        let total: i64 = query_scalar("SELECT COUNT(*) FROM logs")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let sql = format!("{LOG_SELECT} ORDER BY l.created_at DESC, l.id DESC LIMIT $1 OFFSET $2");
        let rows: Vec<LogRow> = query_as(&sql)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(Page::new(
            rows.into_iter().map(log_from_row).collect(),
            total.max(0) as u64,
            limit,
            offset,
        ))
    }

    #[instrument(name = "pg.log.search", skip(self))]
    async fn search(&self, q: &str, limit: u32, offset: u32) -> StorageResult<Page<Log>> {
        let pattern = like_pattern(q);
        let total: i64 =
            query_scalar("SELECT COUNT(*) FROM logs WHERE title ILIKE $1 OR content ILIKE $1")
                .bind(&pattern)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

        let sql = format!(
            "{LOG_SELECT} WHERE l.title ILIKE $1 OR l.content ILIKE $1 \
             ORDER BY l.created_at DESC, l.id DESC LIMIT $2 OFFSET $3"
        );
        let rows: Vec<LogRow> = query_as(&sql)
            .bind(&pattern)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(Page::new(
            rows.into_iter().map(log_from_row).collect(),
            total.max(0) as u64,
            limit,
            offset,
        ))
    }

    #[instrument(name = "pg.log.create", skip_all)]
    async fn create(&self, log: NewLog) -> StorageResult<Log> {
        let generations = pg_generations(&log.generations)?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        ensure_users_exist(&mut tx, &log.logged_by).await?;

        let id: i64 = query_scalar(
            "INSERT INTO logs (title, content, description, generations, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) RETURNING id",
        )
        .bind(&log.title)
        .bind(&log.content)
        .bind(&log.description)
        .bind(&generations)
        .bind(log.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        replace_topics(&mut tx, id, &log.topics).await?;
        replace_authors(&mut tx, id, &log.logged_by).await?;

        let created = find_log(&mut tx, id)
            .await?
            .ok_or_else(|| StorageError::backend("inserted log vanished"))?;
        tx.commit().await.map_err(db_err)?;

        tracing::debug!(log_id = id, "log created");
        Ok(created)
    }

    #[instrument(name = "pg.log.update", skip(self, patch))]
    async fn update(&self, id: LogId, patch: LogPatch) -> StorageResult<Log> {
        let generations = patch
            .generations
            .as_deref()
            .map(pg_generations)
            .transpose()?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let updated = query(
            "UPDATE logs SET \
                 title = COALESCE($2, title), \
                 content = COALESCE($3, content), \
                 description = COALESCE($4, description), \
                 generations = COALESCE($5, generations), \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&patch.title)
        .bind(&patch.content)
        .bind(&patch.description)
        .bind(&generations)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if updated.rows_affected() == 0 {
            return Err(StorageError::not_found("log", id));
        }

        if let Some(topics) = &patch.topics {
            replace_topics(&mut tx, id, topics).await?;
        }
        if let Some(authors) = &patch.logged_by {
            ensure_users_exist(&mut tx, authors).await?;
            replace_authors(&mut tx, id, authors).await?;
        }

        let log = find_log(&mut tx, id)
            .await?
            .ok_or_else(|| StorageError::not_found("log", id))?;
        tx.commit().await.map_err(db_err)?;
        Ok(log)
    }

    #[instrument(name = "pg.log.set_rendered", skip(self, html))]
    async fn set_rendered(&self, id: LogId, html: &str) -> StorageResult<()> {
        query("UPDATE logs SET pre_rendered = $2 WHERE id = $1")
            .bind(id)
            .bind(html)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    #[instrument(name = "pg.log.delete", skip(self))]
    async fn delete(&self, id: LogId) -> StorageResult<()> {
        let result = query("DELETE FROM logs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("log", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_log_from_row_hydrates_authors_in_order() {
        let at = datetime!(2026-03-01 09:00 UTC);
        let log = log_from_row((
            1,
            "Help Me".into(),
            "body".into(),
            String::new(),
            "body".into(),
            vec![12, 13],
            at,
            at,
            vec!["rust".into()],
            vec![7, 3],
            vec!["Kim".into(), "Lee".into()],
            vec!["kim".into(), "lee".into()],
        ));

        assert_eq!(log.logged_by, vec![7, 3]);
        assert_eq!(log.generations, vec![12, 13]);
        assert_eq!(log.first_author().unwrap().handle, "kim");
        assert_eq!(log.authors[1].id, 3);
    }

    #[test]
    fn test_pg_generations_rejects_out_of_range() {
        assert_eq!(pg_generations(&[1, 2]).unwrap(), vec![1, 2]);
        assert!(pg_generations(&[40_000]).is_err());
    }
}
