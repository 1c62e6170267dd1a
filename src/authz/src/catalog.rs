//! Permission catalog: the ground truth for permissions, roles, grants,
//! and groups
//!
//! Invariants enforced here:
//! - Role hierarchy level never exceeds [`MAX_HIERARCHY_LEVEL`]
//! - A role cannot be its own parent (direct self-reference); longer cycles
//!   are not structurally prevented and are defended against at resolution
//!   time by [`crate::hierarchy`]
//! - Role-permission grants are unique over (role, permission, group)
//! - Permissions referenced by grants cannot be deleted
//! - Groups are soft-deleted, memberships stay for audit history

use crate::error::{AuthzError, Result};
use crate::types::{GroupId, Permission, RoleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Maximum role hierarchy depth
pub const MAX_HIERARCHY_LEVEL: u8 = 10;

/// A permission definition. Immutable once referenced by grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionDef {
    pub id: Uuid,
    /// Dotted name: `Service.Resource.Action`
    pub name: String,
    /// Owning service (first segment of the name)
    pub service: String,
    /// Free-form category (e.g. "data-access", "administration")
    pub category: String,
    pub created_at: DateTime<Utc>,
}

/// A role in the hierarchy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    /// Parent role, if this role inherits from one
    pub parent_role: Option<RoleId>,
    /// Depth in the hierarchy (0 for root roles), bounded by
    /// [`MAX_HIERARCHY_LEVEL`]
    pub hierarchy_level: u8,
    /// Materialized ancestor path, e.g. `/Viewer/Editor`
    pub hierarchy_path: String,
    /// Whether this role's effective set includes its parent's
    pub inherit_permissions: bool,
    pub priority: i32,
    pub is_system_role: bool,
    pub created_at: DateTime<Utc>,
}

/// A grant linking a role to a permission, optionally scoped to a group.
/// Unique over (role, permission, group).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePermission {
    pub id: Uuid,
    pub role_id: RoleId,
    pub permission: String,
    pub group_id: Option<GroupId>,
    pub granted_at: DateTime<Utc>,
}

/// Role a user holds within a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Member,
    Admin,
    Owner,
}

/// A user group (team, department, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Group kind, e.g. "team" or "department"
    pub kind: String,
    pub created_at: DateTime<Utc>,
    /// Soft-delete marker; deleted groups keep their memberships
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Group membership with the member's role within the group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroup {
    pub user_id: String,
    pub group_id: GroupId,
    pub role: GroupRole,
    pub joined_at: DateTime<Utc>,
}

/// A backend service a group is entitled to use
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupService {
    pub group_id: GroupId,
    pub service: String,
    pub granted_at: DateTime<Utc>,
}

/// Input for creating a role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub parent_role: Option<RoleId>,
    pub inherit_permissions: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub is_system_role: bool,
}

#[derive(Default)]
struct CatalogState {
    permissions: HashMap<Uuid, PermissionDef>,
    permissions_by_name: HashMap<String, Uuid>,
    roles: HashMap<RoleId, Role>,
    roles_by_name: HashMap<String, RoleId>,
    grants: HashMap<Uuid, RolePermission>,
    /// Uniqueness index over (role, permission, group)
    grant_index: HashSet<(RoleId, String, Option<GroupId>)>,
    groups: HashMap<GroupId, Group>,
    user_groups: Vec<UserGroup>,
    group_services: Vec<GroupService>,
}

/// In-memory permission catalog
pub struct Catalog {
    state: RwLock<CatalogState>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CatalogState::default()),
        }
    }

    // --- permissions ---

    pub async fn create_permission(&self, name: &str, category: &str) -> Result<PermissionDef> {
        let permission = Permission::new(name)?;
        if permission.is_wildcard() {
            return Err(AuthzError::ValidationFailed(format!(
                "catalog permissions must be literal, got '{}'",
                name
            )));
        }

        let mut state = self.state.write().await;
        if state.permissions_by_name.contains_key(name) {
            return Err(AuthzError::Storage(format!(
                "permission '{}' already exists",
                name
            )));
        }

        let def = PermissionDef {
            id: Uuid::new_v4(),
            name: name.to_string(),
            service: permission.service().to_string(),
            category: category.to_string(),
            created_at: Utc::now(),
        };
        state.permissions_by_name.insert(name.to_string(), def.id);
        state.permissions.insert(def.id, def.clone());
        Ok(def)
    }

    pub async fn get_permission(&self, name: &str) -> Option<PermissionDef> {
        let state = self.state.read().await;
        state
            .permissions_by_name
            .get(name)
            .and_then(|id| state.permissions.get(id))
            .cloned()
    }

    pub async fn list_permissions(&self) -> Vec<PermissionDef> {
        let state = self.state.read().await;
        let mut all: Vec<_> = state.permissions.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Delete a permission. Fails if any grant references it.
    pub async fn delete_permission(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let id = *state
            .permissions_by_name
            .get(name)
            .ok_or_else(|| AuthzError::Storage(format!("permission '{}' not found", name)))?;

        if state.grants.values().any(|g| g.permission == name) {
            return Err(AuthzError::Storage(format!(
                "permission '{}' is referenced by grants and cannot be deleted",
                name
            )));
        }

        state.permissions.remove(&id);
        state.permissions_by_name.remove(name);
        Ok(())
    }

    // --- roles ---

    pub async fn create_role(&self, new_role: NewRole) -> Result<Role> {
        let mut state = self.state.write().await;

        if new_role.name.trim().is_empty() {
            return Err(AuthzError::ValidationFailed(
                "role name cannot be empty".to_string(),
            ));
        }
        if state.roles_by_name.contains_key(&new_role.name) {
            return Err(AuthzError::Storage(format!(
                "role '{}' already exists",
                new_role.name
            )));
        }

        let (level, path) = match new_role.parent_role {
            Some(parent_id) => {
                let parent = state.roles.get(&parent_id).ok_or_else(|| {
                    AuthzError::ValidationFailed(format!("parent role {} not found", parent_id))
                })?;
                let level = parent.hierarchy_level + 1;
                if level > MAX_HIERARCHY_LEVEL {
                    return Err(AuthzError::ValidationFailed(format!(
                        "hierarchy level {} exceeds maximum {}",
                        level, MAX_HIERARCHY_LEVEL
                    )));
                }
                (level, format!("{}/{}", parent.hierarchy_path, new_role.name))
            }
            None => (0, format!("/{}", new_role.name)),
        };

        let role = Role {
            id: Uuid::new_v4(),
            name: new_role.name.clone(),
            parent_role: new_role.parent_role,
            hierarchy_level: level,
            hierarchy_path: path,
            inherit_permissions: new_role.inherit_permissions,
            priority: new_role.priority,
            is_system_role: new_role.is_system_role,
            created_at: Utc::now(),
        };
        state.roles_by_name.insert(role.name.clone(), role.id);
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    pub async fn get_role(&self, id: RoleId) -> Option<Role> {
        self.state.read().await.roles.get(&id).cloned()
    }

    pub async fn get_role_by_name(&self, name: &str) -> Option<Role> {
        let state = self.state.read().await;
        state
            .roles_by_name
            .get(name)
            .and_then(|id| state.roles.get(id))
            .cloned()
    }

    pub async fn list_roles(&self) -> Vec<Role> {
        let state = self.state.read().await;
        let mut all: Vec<_> = state.roles.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Re-parent a role. Rejects direct self-reference and levels beyond the
    /// bound. Longer cycles are intentionally not detected here; the
    /// hierarchy resolver guards against them at read time.
    pub async fn set_role_parent(&self, id: RoleId, parent: Option<RoleId>) -> Result<Role> {
        let mut state = self.state.write().await;

        if parent == Some(id) {
            return Err(AuthzError::ValidationFailed(
                "a role cannot be its own parent".to_string(),
            ));
        }

        let (level, path_prefix) = match parent {
            Some(parent_id) => {
                let p = state.roles.get(&parent_id).ok_or_else(|| {
                    AuthzError::ValidationFailed(format!("parent role {} not found", parent_id))
                })?;
                let level = p.hierarchy_level + 1;
                if level > MAX_HIERARCHY_LEVEL {
                    return Err(AuthzError::ValidationFailed(format!(
                        "hierarchy level {} exceeds maximum {}",
                        level, MAX_HIERARCHY_LEVEL
                    )));
                }
                (level, p.hierarchy_path.clone())
            }
            None => (0, String::new()),
        };

        let role = state
            .roles
            .get_mut(&id)
            .ok_or_else(|| AuthzError::Storage(format!("role {} not found", id)))?;
        role.parent_role = parent;
        role.hierarchy_level = level;
        role.hierarchy_path = format!("{}/{}", path_prefix, role.name);
        Ok(role.clone())
    }

    /// Delete a role. System roles and roles with children are protected.
    pub async fn delete_role(&self, id: RoleId) -> Result<()> {
        let mut state = self.state.write().await;
        let role = state
            .roles
            .get(&id)
            .ok_or_else(|| AuthzError::Storage(format!("role {} not found", id)))?
            .clone();

        if role.is_system_role {
            return Err(AuthzError::Storage(format!(
                "system role '{}' cannot be deleted",
                role.name
            )));
        }
        if state.roles.values().any(|r| r.parent_role == Some(id)) {
            return Err(AuthzError::Storage(format!(
                "role '{}' has child roles and cannot be deleted",
                role.name
            )));
        }

        state.roles.remove(&id);
        state.roles_by_name.remove(&role.name);
        state.grants.retain(|_, g| g.role_id != id);
        state
            .grant_index
            .retain(|(role_id, _, _)| *role_id != id);
        Ok(())
    }

    // --- grants ---

    /// Grant a permission to a role, optionally scoped to a group.
    /// Wildcard permission names are allowed in grants.
    pub async fn grant_permission(
        &self,
        role_id: RoleId,
        permission: &str,
        group_id: Option<GroupId>,
    ) -> Result<RolePermission> {
        Permission::new(permission)?;

        let mut state = self.state.write().await;
        if !state.roles.contains_key(&role_id) {
            return Err(AuthzError::Storage(format!("role {} not found", role_id)));
        }

        let key = (role_id, permission.to_string(), group_id);
        if state.grant_index.contains(&key) {
            return Err(AuthzError::Storage(format!(
                "grant ({}, {}, {:?}) already exists",
                role_id, permission, group_id
            )));
        }

        let grant = RolePermission {
            id: Uuid::new_v4(),
            role_id,
            permission: permission.to_string(),
            group_id,
            granted_at: Utc::now(),
        };
        state.grant_index.insert(key);
        state.grants.insert(grant.id, grant.clone());
        Ok(grant)
    }

    pub async fn revoke_permission(
        &self,
        role_id: RoleId,
        permission: &str,
        group_id: Option<GroupId>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let key = (role_id, permission.to_string(), group_id);
        if !state.grant_index.remove(&key) {
            return Err(AuthzError::Storage(format!(
                "grant ({}, {}, {:?}) not found",
                role_id, permission, group_id
            )));
        }
        state.grants.retain(|_, g| {
            !(g.role_id == role_id && g.permission == permission && g.group_id == group_id)
        });
        Ok(())
    }

    /// Permission names granted to a role (own grants only, no inheritance).
    /// Group-scoped grants apply only when the group is in `member_of`;
    /// unscoped grants always apply.
    pub async fn role_grants(&self, role_id: RoleId, member_of: &HashSet<GroupId>) -> Vec<String> {
        let state = self.state.read().await;
        state
            .grants
            .values()
            .filter(|g| g.role_id == role_id)
            .filter(|g| g.group_id.map_or(true, |gid| member_of.contains(&gid)))
            .map(|g| g.permission.clone())
            .collect()
    }

    // --- groups ---

    pub async fn create_group(&self, name: &str, kind: &str) -> Result<Group> {
        let mut state = self.state.write().await;
        if name.trim().is_empty() {
            return Err(AuthzError::ValidationFailed(
                "group name cannot be empty".to_string(),
            ));
        }

        let group = Group {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind: kind.to_string(),
            created_at: Utc::now(),
            deleted_at: None,
        };
        state.groups.insert(group.id, group.clone());
        Ok(group)
    }

    pub async fn get_group(&self, id: GroupId) -> Option<Group> {
        self.state.read().await.groups.get(&id).cloned()
    }

    /// Soft-delete a group. Memberships and grants remain for audit history.
    pub async fn soft_delete_group(&self, id: GroupId) -> Result<()> {
        let mut state = self.state.write().await;
        let group = state
            .groups
            .get_mut(&id)
            .ok_or_else(|| AuthzError::Storage(format!("group {} not found", id)))?;
        if group.deleted_at.is_some() {
            return Err(AuthzError::Storage(format!(
                "group '{}' is already deleted",
                group.name
            )));
        }
        group.deleted_at = Some(Utc::now());
        Ok(())
    }

    pub async fn add_user_to_group(
        &self,
        user_id: &str,
        group_id: GroupId,
        role: GroupRole,
    ) -> Result<UserGroup> {
        let mut state = self.state.write().await;
        let group = state
            .groups
            .get(&group_id)
            .ok_or_else(|| AuthzError::Storage(format!("group {} not found", group_id)))?;
        if group.deleted_at.is_some() {
            return Err(AuthzError::Storage(format!(
                "group '{}' is deleted",
                group.name
            )));
        }
        if state
            .user_groups
            .iter()
            .any(|m| m.user_id == user_id && m.group_id == group_id)
        {
            return Err(AuthzError::Storage(format!(
                "user '{}' is already a member of group {}",
                user_id, group_id
            )));
        }

        let membership = UserGroup {
            user_id: user_id.to_string(),
            group_id,
            role,
            joined_at: Utc::now(),
        };
        state.user_groups.push(membership.clone());
        Ok(membership)
    }

    /// Groups a user is currently a member of, excluding soft-deleted
    /// groups. Grants scoped to a deleted group stop applying even though
    /// the membership row survives for audit history.
    pub async fn active_group_ids(&self, user_id: &str) -> HashSet<GroupId> {
        let state = self.state.read().await;
        state
            .user_groups
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter(|m| {
                state
                    .groups
                    .get(&m.group_id)
                    .map_or(false, |g| g.deleted_at.is_none())
            })
            .map(|m| m.group_id)
            .collect()
    }

    pub async fn user_groups(&self, user_id: &str) -> Vec<UserGroup> {
        let state = self.state.read().await;
        state
            .user_groups
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn grant_group_service(&self, group_id: GroupId, service: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.groups.contains_key(&group_id) {
            return Err(AuthzError::Storage(format!("group {} not found", group_id)));
        }
        if state
            .group_services
            .iter()
            .any(|e| e.group_id == group_id && e.service == service)
        {
            return Err(AuthzError::Storage(format!(
                "group {} already entitled to service '{}'",
                group_id, service
            )));
        }
        state.group_services.push(GroupService {
            group_id,
            service: service.to_string(),
            granted_at: Utc::now(),
        });
        Ok(())
    }

    pub async fn group_services(&self, group_id: GroupId) -> Vec<String> {
        let state = self.state.read().await;
        state
            .group_services
            .iter()
            .filter(|e| e.group_id == group_id)
            .map(|e| e.service.clone())
            .collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
