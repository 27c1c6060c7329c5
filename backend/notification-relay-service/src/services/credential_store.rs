//! One-time credential storage.
//!
//! The upstream application writes `<prefix><token> -> {"userId": ...}` with a
//! short expiry. This side only ever reads a key once and then deletes it.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis_utils::SharedConnectionManager;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::StoreError;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Point read. A missing (or already expired) key is `Ok(None)`.
    async fn lookup(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Credential store backed by the shared Redis connection manager.
#[derive(Clone)]
pub struct RedisCredentialStore {
    manager: SharedConnectionManager,
}

impl RedisCredentialStore {
    pub fn new(manager: SharedConnectionManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn lookup(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.lock().await.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.lock().await.clone();
        let removed: i64 = conn.del(key).await?;
        debug!(removed, "one-time credential deleted");
        Ok(())
    }
}

/// Delete `key` in the background without waiting for the outcome.
///
/// A failed delete is only logged: the key carries its own short expiry.
pub fn delete_best_effort(store: Arc<dyn CredentialStore>, key: String) {
    tokio::spawn(async move {
        if let Err(e) = store.delete(&key).await {
            warn!(error = %e, "failed to delete one-time credential; relying on expiry");
        }
    });
}
