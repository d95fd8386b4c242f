//! The four profile sync stages.

use super::{
    cache_key, CachedProfile, EnrichedUser, Enricher, Notifier, ProfileCache, SyncReport,
    SyncStatus, User, UserStore, NOTIFICATION_MESSAGE,
};
use crate::core::StageKind;
use crate::errors::StageError;
use crate::stages::Stage;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Resolves a user id to a [`User`].
///
/// Fails with `NotFound` when the store has no such user and with the store's
/// own error otherwise.
pub struct LookupStage {
    store: Arc<dyn UserStore>,
}

impl LookupStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }
}

impl fmt::Debug for LookupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for LookupStage {
    type Input = String;
    type Output = User;

    fn name(&self) -> &str {
        "lookup"
    }

    fn kind(&self) -> StageKind {
        StageKind::Lookup
    }

    async fn invoke(&self, user_id: String) -> Result<User, StageError> {
        match self.store.find_user(&user_id).await? {
            Some(user) => Ok(user),
            None => {
                debug!(user_id = %user_id, "User lookup returned nothing");
                Err(StageError::not_found("User not found"))
            }
        }
    }
}

/// Enriches the looked-up user.
pub struct EnrichStage {
    enricher: Arc<dyn Enricher>,
}

impl EnrichStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(enricher: Arc<dyn Enricher>) -> Self {
        Self { enricher }
    }
}

impl fmt::Debug for EnrichStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrichStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for EnrichStage {
    type Input = User;
    type Output = EnrichedUser;

    fn name(&self) -> &str {
        "enrich"
    }

    fn kind(&self) -> StageKind {
        StageKind::Enrich
    }

    async fn invoke(&self, user: User) -> Result<EnrichedUser, StageError> {
        Ok(self.enricher.enrich(user).await?)
    }
}

/// Caches the enriched user under `user:{id}`.
pub struct CacheWriteStage {
    cache: Arc<dyn ProfileCache>,
}

impl CacheWriteStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(cache: Arc<dyn ProfileCache>) -> Self {
        Self { cache }
    }
}

impl fmt::Debug for CacheWriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheWriteStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for CacheWriteStage {
    type Input = EnrichedUser;
    type Output = CachedProfile;

    fn name(&self) -> &str {
        "cache-write"
    }

    fn kind(&self) -> StageKind {
        StageKind::Persist
    }

    async fn invoke(&self, user: EnrichedUser) -> Result<CachedProfile, StageError> {
        let key = cache_key(&user.user.id);
        self.cache.set(&key, &user).await?;
        Ok(CachedProfile {
            user,
            cache_key: key,
        })
    }
}

/// Notifies the user and produces the final report.
pub struct NotifyStage {
    notifier: Arc<dyn Notifier>,
}

impl NotifyStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

impl fmt::Debug for NotifyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for NotifyStage {
    type Input = CachedProfile;
    type Output = SyncReport;

    fn name(&self) -> &str {
        "notify"
    }

    fn kind(&self) -> StageKind {
        StageKind::Notify
    }

    async fn invoke(&self, profile: CachedProfile) -> Result<SyncReport, StageError> {
        self.notifier
            .notify(&profile.user.user.email, NOTIFICATION_MESSAGE)
            .await?;
        Ok(SyncReport {
            user_id: profile.user.user.id,
            status: SyncStatus::Complete,
            cached: true,
            notified: true,
        })
    }
}
