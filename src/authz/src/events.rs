//! Cache invalidation events
//!
//! Grant mutations elsewhere in a deployment (another node, an admin tool)
//! push invalidation events over a channel; a background task applies them
//! to the local cache.

use crate::engine::AuthorizationEngine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A request to drop a principal's cached permissions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub principal_id: String,
    /// What changed, e.g. "role_revoked", "grant_added"
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl InvalidationEvent {
    pub fn new(principal_id: &str, reason: &str) -> Self {
        Self {
            principal_id: principal_id.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Spawn a task draining invalidation events into the engine's cache.
/// The task ends when the sender side closes.
pub fn spawn_invalidation_listener(
    engine: Arc<AuthorizationEngine>,
    mut receiver: mpsc::Receiver<InvalidationEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            debug!(
                principal_id = %event.principal_id,
                reason = %event.reason,
                "applying invalidation event"
            );
            engine.invalidate_permissions(&event.principal_id).await;
        }
        info!("invalidation listener stopped");
    })
}
