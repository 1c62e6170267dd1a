//! Role hierarchy resolution
//!
//! Walks child-to-parent chains collecting granted permissions. The walk is
//! iterative with a visited set and a hard depth bound, so a cycle introduced
//! through re-parenting terminates with the permissions gathered so far
//! instead of looping.

use crate::catalog::{Catalog, MAX_HIERARCHY_LEVEL};
use crate::types::{GroupId, RoleId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Maximum ancestors visited per role during resolution
pub const MAX_HIERARCHY_DEPTH: usize = MAX_HIERARCHY_LEVEL as usize;

/// Result of resolving one or more roles into effective permissions
#[derive(Debug, Clone, Default)]
pub struct ResolvedPermissions {
    /// Union of permission names from the roles and their inherited ancestors
    pub permissions: HashSet<String>,
    /// Set when a walk revisited a role or hit the depth bound
    pub cycle_detected: bool,
}

/// Resolves roles into their effective permission sets
pub struct HierarchyResolver {
    catalog: Arc<Catalog>,
}

impl HierarchyResolver {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Effective permissions for a single role, ascending through parents
    /// while `inherit_permissions` holds. Group-scoped grants at every level
    /// count only when the group is in `member_of`.
    pub async fn resolve_role(
        &self,
        role_id: RoleId,
        member_of: &HashSet<GroupId>,
    ) -> ResolvedPermissions {
        let mut resolved = ResolvedPermissions::default();
        let mut visited: HashSet<RoleId> = HashSet::new();
        let mut current = Some(role_id);
        let mut depth = 0usize;

        while let Some(id) = current {
            if !visited.insert(id) {
                warn!(role_id = %id, "role hierarchy cycle detected, stopping walk");
                resolved.cycle_detected = true;
                break;
            }
            if depth > MAX_HIERARCHY_DEPTH {
                warn!(role_id = %id, depth, "role hierarchy depth bound reached, stopping walk");
                resolved.cycle_detected = true;
                break;
            }

            let Some(role) = self.catalog.get_role(id).await else {
                break;
            };

            for permission in self.catalog.role_grants(id, member_of).await {
                resolved.permissions.insert(permission);
            }

            current = if role.inherit_permissions {
                role.parent_role
            } else {
                None
            };
            depth += 1;
        }

        resolved
    }

    /// Union of effective permissions across roles named by a claim set.
    /// Unknown role names contribute nothing.
    pub async fn effective_permissions_for_roles(
        &self,
        role_names: &[String],
        member_of: &HashSet<GroupId>,
    ) -> ResolvedPermissions {
        let mut combined = ResolvedPermissions::default();
        for name in role_names {
            let Some(role) = self.catalog.get_role_by_name(name).await else {
                continue;
            };
            let resolved = self.resolve_role(role.id, member_of).await;
            combined.permissions.extend(resolved.permissions);
            combined.cycle_detected |= resolved.cycle_detected;
        }
        combined
    }
}
