//! In-memory collaborators for demos and tests.

use super::{CollaboratorError, EnrichedUser, Enricher, Notifier, ProfileCache, User, UserStore};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

/// A user store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: DashMap<String, User>,
}

impl InMemoryUserStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user.
    pub fn insert(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    /// Adds a user, builder style.
    #[must_use]
    pub fn with_user(self, user: User) -> Self {
        self.insert(user);
        self
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_user(&self, id: &str) -> Result<Option<User>, CollaboratorError> {
        Ok(self.users.get(id).map(|entry| entry.value().clone()))
    }
}

/// An enricher that only stamps the record.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticEnricher;

#[async_trait]
impl Enricher for StaticEnricher {
    async fn enrich(&self, user: User) -> Result<EnrichedUser, CollaboratorError> {
        Ok(EnrichedUser::from_user(user))
    }
}

/// A profile cache backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryProfileCache {
    entries: DashMap<String, EnrichedUser>,
}

impl InMemoryProfileCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<EnrichedUser> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ProfileCache for InMemoryProfileCache {
    async fn set(&self, key: &str, value: &EnrichedUser) -> Result<(), CollaboratorError> {
        self.entries.insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// A message recorded by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    /// Recipient.
    pub email: String,
    /// Message body.
    pub message: String,
}

/// A notifier that records what it would have sent.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    /// Creates an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every notification sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, email: &str, message: &str) -> Result<(), CollaboratorError> {
        self.sent.lock().push(SentNotification {
            email: email.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_user_store() {
        let store = InMemoryUserStore::new().with_user(User::new("u-1", "a@test.com", "A"));

        assert_eq!(store.find_user("u-1").await.unwrap().map(|u| u.email), Some("a@test.com".to_string()));
        assert_eq!(store.find_user("missing").await, Ok(None));
    }

    #[tokio::test]
    async fn test_in_memory_cache_overwrites() {
        let cache = InMemoryProfileCache::new();
        let first = EnrichedUser::from_user(User::new("u-1", "old@test.com", "A"));
        let second = EnrichedUser::from_user(User::new("u-1", "new@test.com", "A"));

        cache.set("user:u-1", &first).await.unwrap();
        cache.set("user:u-1", &second).await.unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("user:u-1").unwrap().user.email, "new@test.com");
    }

    #[tokio::test]
    async fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.notify("a@test.com", "hello").await.unwrap();

        assert_eq!(
            notifier.sent(),
            vec![SentNotification {
                email: "a@test.com".to_string(),
                message: "hello".to_string(),
            }]
        );
    }
}
