//! Profile sync: a four-stage pipeline built on the orchestrator.
//!
//! `lookup → enrich → cache-write → notify`. Given a user id it loads the
//! user, enriches the record through an external service, caches the result
//! under `user:{id}` and tells the user their profile was updated.
//!
//! Collaborators are traits so that tests can substitute mocks and the
//! in-memory implementations in [`memory`].

pub mod memory;
mod stages;

#[cfg(test)]
mod profile_sync_tests;

pub use stages::{CacheWriteStage, EnrichStage, LookupStage, NotifyStage};

use crate::errors::{PipelineValidationError, StageError};
use crate::pipeline::{Pipeline, PipelineBuilder, PipelineConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Prefix of every cache key written by the cache-write stage.
pub const CACHE_KEY_PREFIX: &str = "user:";

/// Message sent by the notify stage.
pub const NOTIFICATION_MESSAGE: &str = "Profile updated";

/// Name of the pipeline built by [`profile_sync_pipeline`].
pub const PIPELINE_NAME: &str = "profile-sync";

/// Returns the cache key for a user id.
#[must_use]
pub fn cache_key(user_id: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{user_id}")
}

/// A user record as stored in the user store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id.
    pub id: String,
    /// Contact address for notifications.
    pub email: String,
    /// Display name.
    pub name: String,
}

impl User {
    /// Creates a user.
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
        }
    }
}

/// A user after enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedUser {
    /// The record as looked up.
    #[serde(flatten)]
    pub user: User,
    /// Set by the enricher.
    pub enriched: bool,
    /// When enrichment happened.
    pub enriched_at: DateTime<Utc>,
}

impl EnrichedUser {
    /// Marks `user` as enriched now.
    #[must_use]
    pub fn from_user(user: User) -> Self {
        Self {
            user,
            enriched: true,
            enriched_at: Utc::now(),
        }
    }
}

/// Output of the cache-write stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedProfile {
    /// The cached value.
    pub user: EnrichedUser,
    /// Key it was cached under.
    pub cache_key: String,
}

/// Terminal state of a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Every stage succeeded.
    Complete,
}

/// The success value of the profile sync pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Id of the enriched user.
    pub user_id: String,
    /// Always [`SyncStatus::Complete`].
    pub status: SyncStatus,
    /// The enriched record was cached.
    pub cached: bool,
    /// The notification was sent.
    pub notified: bool,
}

/// Errors reported by collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The service failed or is unreachable.
    #[error("{0}")]
    Unavailable(String),
    /// The service did not answer in time.
    #[error("{0}")]
    TimedOut(String),
}

impl From<CollaboratorError> for StageError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Unavailable(message) => Self::upstream(message),
            CollaboratorError::TimedOut(message) => Self::timeout(message),
        }
    }
}

/// Looks users up by id.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Returns `Ok(None)` if no user has that id.
    async fn find_user(&self, id: &str) -> Result<Option<User>, CollaboratorError>;
}

/// Adds information to a user record.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Enriches `user`.
    async fn enrich(&self, user: User) -> Result<EnrichedUser, CollaboratorError>;
}

/// Stores enriched profiles.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProfileCache: Send + Sync {
    /// Writes `value` under `key`, replacing any previous entry.
    async fn set(&self, key: &str, value: &EnrichedUser) -> Result<(), CollaboratorError>;
}

/// Sends messages to users.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends `message` to `email`.
    async fn notify(&self, email: &str, message: &str) -> Result<(), CollaboratorError>;
}

/// Builds the `lookup → enrich → cache-write → notify` pipeline.
///
/// # Errors
///
/// Never fails in practice: the stage names are fixed and distinct.
pub fn profile_sync_pipeline(
    store: Arc<dyn UserStore>,
    enricher: Arc<dyn Enricher>,
    cache: Arc<dyn ProfileCache>,
    notifier: Arc<dyn Notifier>,
) -> Result<Pipeline<String, SyncReport>, PipelineValidationError> {
    profile_sync_pipeline_with_config(
        PipelineConfig::new(PIPELINE_NAME),
        store,
        enricher,
        cache,
        notifier,
    )
}

/// Like [`profile_sync_pipeline`], with an explicit configuration.
///
/// # Errors
///
/// Never fails in practice: the stage names are fixed and distinct.
pub fn profile_sync_pipeline_with_config(
    config: PipelineConfig,
    store: Arc<dyn UserStore>,
    enricher: Arc<dyn Enricher>,
    cache: Arc<dyn ProfileCache>,
    notifier: Arc<dyn Notifier>,
) -> Result<Pipeline<String, SyncReport>, PipelineValidationError> {
    Ok(PipelineBuilder::from_config(config)
        .stage(LookupStage::new(store))?
        .stage(EnrichStage::new(enricher))?
        .stage(CacheWriteStage::new(cache))?
        .stage(NotifyStage::new(notifier))?
        .build())
}
