//! Principal grant directory
//!
//! Abstraction over wherever a principal's raw grants live. Production
//! deployments typically point this at a remote identity service; tests and
//! single-node setups use the in-memory implementation.

use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Raw grants for a principal, before hierarchy resolution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrincipalGrants {
    /// Permissions granted to the principal directly
    pub direct_permissions: Vec<String>,
    /// Role names to expand through the hierarchy
    pub role_names: Vec<String>,
    /// Standalone wildcard grants (e.g. `Reporting.*`)
    pub wildcard_grants: Vec<String>,
}

/// Source of truth for a principal's grants
#[async_trait]
pub trait PermissionDirectory: Send + Sync {
    /// Fetch the raw grants for a principal. Implementations should return
    /// an empty [`PrincipalGrants`] for unknown principals rather than error.
    async fn fetch_grants(&self, principal_id: &str) -> Result<PrincipalGrants>;
}

/// In-memory directory for tests and embedded use
#[derive(Default)]
pub struct InMemoryDirectory {
    grants: DashMap<String, PrincipalGrants>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_grants(&self, principal_id: &str, grants: PrincipalGrants) {
        self.grants.insert(principal_id.to_string(), grants);
    }

    pub fn remove_grants(&self, principal_id: &str) {
        self.grants.remove(principal_id);
    }
}

#[async_trait]
impl PermissionDirectory for InMemoryDirectory {
    async fn fetch_grants(&self, principal_id: &str) -> Result<PrincipalGrants> {
        Ok(self
            .grants
            .get(principal_id)
            .map(|g| g.clone())
            .unwrap_or_default())
    }
}
