use alog_core::{
    Author, Log, LogId, LogPatch, LogStorage, NewLog, NewUser, Page, StorageError, StorageResult,
    User, UserId, UserStorage,
};
use async_trait::async_trait;
use time::OffsetDateTime;

use crate::store::MemoryStore;

fn paginate<T>(mut items: Vec<T>, limit: u32, offset: u32) -> Page<T> {
    let total = items.len() as u64;
    let start = (offset as usize).min(items.len());
    let end = start.saturating_add(limit as usize).min(items.len());
    let page: Vec<T> = items.drain(start..end).collect();
    Page::new(page, total, limit, offset)
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

impl MemoryStore {
    fn hydrate(&self, mut log: Log) -> Log {
        log.authors = log
            .logged_by
            .iter()
            .filter_map(|id| {
                self.users.get(id).map(|u| Author {
                    id: u.id,
                    name: u.name.clone(),
                    handle: u.handle.clone(),
                })
            })
            .collect();
        log
    }

    fn sorted_logs(&self, filter: impl Fn(&Log) -> bool) -> Vec<Log> {
        let mut logs: Vec<Log> = self
            .logs
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        logs
    }

    fn adjust_topics(&self, topics: &[String], delta: i64) {
        for topic in topics {
            *self.topics.entry(topic.clone()).or_insert(0) += delta;
        }
    }
}

#[async_trait]
impl UserStorage for MemoryStore {
    async fn find_by_id(&self, id: UserId) -> StorageResult<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn create(&self, user: NewUser) -> StorageResult<User> {
        use dashmap::mapref::entry::Entry;

        match self.users.entry(user.id) {
            Entry::Occupied(_) => Err(StorageError::conflict("user", user.id)),
            Entry::Vacant(slot) => {
                let user = user.into_user(OffsetDateTime::now_utc());
                slot.insert(user.clone());
                Ok(user)
            }
        }
    }

    async fn list(&self, limit: u32, offset: u32) -> StorageResult<Page<User>> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by(|a, b| b.joined_at.cmp(&a.joined_at).then(b.id.cmp(&a.id)));
        Ok(paginate(users, limit, offset))
    }

    async fn search(&self, query: &str, limit: u32, offset: u32) -> StorageResult<Page<User>> {
        let needle = query.to_lowercase();
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|u| contains_ci(&u.name, &needle) || contains_ci(&u.part_of, &needle))
            .map(|u| u.value().clone())
            .collect();
        users.sort_by(|a, b| b.joined_at.cmp(&a.joined_at).then(b.id.cmp(&a.id)));
        Ok(paginate(users, limit, offset))
    }
}

#[async_trait]
impl LogStorage for MemoryStore {
    async fn find_by_id(&self, id: LogId) -> StorageResult<Option<Log>> {
        let log = self.logs.get(&id).map(|l| l.clone());
        Ok(log.map(|l| self.hydrate(l)))
    }

    async fn list(&self, limit: u32, offset: u32) -> StorageResult<Page<Log>> {
        let page = paginate(self.sorted_logs(|_| true), limit, offset);
        Ok(page.map(|l| self.hydrate(l)))
    }

    async fn search(&self, query: &str, limit: u32, offset: u32) -> StorageResult<Page<Log>> {
        let needle = query.to_lowercase();
        let logs = self
            .sorted_logs(|l| contains_ci(&l.title, &needle) || contains_ci(&l.content, &needle));
        Ok(paginate(logs, limit, offset).map(|l| self.hydrate(l)))
    }

    async fn create(&self, new: NewLog) -> StorageResult<Log> {
        if new.logged_by.is_empty() {
            return Err(StorageError::invalid_input("log must have at least one author"));
        }
        if let Some(missing) = new.logged_by.iter().find(|id| !self.users.contains_key(*id)) {
            return Err(StorageError::not_found("user", missing));
        }

        let log = Log {
            id: self.next_log_id(),
            title: new.title,
            content: new.content,
            pre_rendered: String::new(),
            description: new.description,
            topics: new.topics,
            generations: new.generations,
            logged_by: new.logged_by,
            authors: Vec::new(),
            created_at: new.created_at,
            updated_at: new.created_at,
        };
        self.adjust_topics(&log.topics, 1);
        self.logs.insert(log.id, log.clone());
        tracing::debug!(log_id = log.id, "log created");
        Ok(self.hydrate(log))
    }

    async fn update(&self, id: LogId, patch: LogPatch) -> StorageResult<Log> {
        if let Some(missing) = patch
            .logged_by
            .iter()
            .flatten()
            .find(|id| !self.users.contains_key(*id))
        {
            return Err(StorageError::not_found("user", missing));
        }

        let updated = {
            let mut entry = self
                .logs
                .get_mut(&id)
                .ok_or_else(|| StorageError::not_found("log", id))?;
            let log = entry.value_mut();
            if let Some(title) = patch.title {
                log.title = title;
            }
            if let Some(content) = patch.content {
                log.content = content;
            }
            if let Some(description) = patch.description {
                log.description = description;
            }
            if let Some(generations) = patch.generations {
                log.generations = generations;
            }
            if let Some(logged_by) = patch.logged_by {
                log.logged_by = logged_by;
            }
            let previous_topics = patch
                .topics
                .map(|topics| std::mem::replace(&mut log.topics, topics));
            log.updated_at = OffsetDateTime::now_utc();
            (log.clone(), previous_topics)
        };

        let (log, previous_topics) = updated;
        if let Some(previous) = previous_topics {
            self.adjust_topics(&previous, -1);
            self.adjust_topics(&log.topics, 1);
        }
        Ok(self.hydrate(log))
    }

    async fn set_rendered(&self, id: LogId, html: &str) -> StorageResult<()> {
        if let Some(mut log) = self.logs.get_mut(&id) {
            log.pre_rendered = html.to_string();
        }
        Ok(())
    }

    async fn delete(&self, id: LogId) -> StorageResult<()> {
        let (_, log) = self
            .logs
            .remove(&id)
            .ok_or_else(|| StorageError::not_found("log", id))?;
        self.comments.remove(&id);
        self.adjust_topics(&log.topics, -1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alog_core::Comment;

    fn new_user(id: UserId, name: &str) -> NewUser {
        NewUser {
            id,
            name: name.into(),
            handle: name.to_lowercase(),
            profile_image: String::new(),
            email: None,
        }
    }

    fn new_log(title: &str, author: UserId, at: OffsetDateTime) -> NewLog {
        NewLog {
            title: title.into(),
            content: format!("content of {title}"),
            description: String::new(),
            topics: vec!["rust".into()],
            generations: vec![1],
            logged_by: vec![author],
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_user_create_conflict() {
        let store = MemoryStore::new();
        UserStorage::create(&store, new_user(1, "Kim")).await.unwrap();
        let err = UserStorage::create(&store, new_user(1, "Kim")).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_list_orders_newest_first_and_hydrates_authors() {
        let store = MemoryStore::new();
        UserStorage::create(&store, new_user(1, "Kim")).await.unwrap();
        let t0 = OffsetDateTime::UNIX_EPOCH;
        for (i, title) in ["a", "b", "c"].iter().enumerate() {
            let at = t0 + time::Duration::minutes(i as i64);
            LogStorage::create(&store, new_log(title, 1, at)).await.unwrap();
        }

        let page = LogStorage::list(&store, 2, 0).await.unwrap();
        assert_eq!(page.total, 3);
        let titles: Vec<_> = page.items.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, ["c", "b"]);
        assert_eq!(page.items[0].authors[0].handle, "kim");
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_author() {
        let store = MemoryStore::new();
        let err = LogStorage::create(&store, new_log("x", 9, OffsetDateTime::now_utc()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.topic_count("rust"), 0);
    }

    #[tokio::test]
    async fn test_update_swaps_topics() {
        let store = MemoryStore::new();
        UserStorage::create(&store, new_user(1, "Kim")).await.unwrap();
        let log = LogStorage::create(&store, new_log("x", 1, OffsetDateTime::now_utc()))
            .await
            .unwrap();

        let patch = LogPatch {
            topics: Some(vec!["go".into()]),
            ..Default::default()
        };
        let updated = LogStorage::update(&store, log.id, patch).await.unwrap();
        assert_eq!(updated.topics, vec!["go".to_string()]);
        assert_eq!(store.topic_count("rust"), 0);
        assert_eq!(store.topic_count("go"), 1);
    }

    #[tokio::test]
    async fn test_delete_cascades_comments() {
        let store = MemoryStore::new();
        UserStorage::create(&store, new_user(1, "Kim")).await.unwrap();
        let log = LogStorage::create(&store, new_log("x", 1, OffsetDateTime::now_utc()))
            .await
            .unwrap();
        store.insert_comment(Comment {
            id: 1,
            log_id: log.id,
            author_id: 1,
            content: "nice".into(),
            created_at: OffsetDateTime::now_utc(),
        });
        assert_eq!(store.comment_count(log.id), 1);

        LogStorage::delete(&store, log.id).await.unwrap();
        assert_eq!(store.comment_count(log.id), 0);
        assert!(LogStorage::find_by_id(&store, log.id).await.unwrap().is_none());
        assert!(LogStorage::delete(&store, log.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let store = MemoryStore::new();
        UserStorage::create(&store, new_user(1, "Kim")).await.unwrap();
        LogStorage::create(&store, new_log("Async Rust", 1, OffsetDateTime::now_utc()))
            .await
            .unwrap();
        LogStorage::create(&store, new_log("Gardening", 1, OffsetDateTime::now_utc()))
            .await
            .unwrap();

        let page = LogStorage::search(&store, "RUST", 10, 0).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].title, "Async Rust");
    }
}
