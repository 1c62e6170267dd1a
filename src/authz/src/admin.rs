//! Administrative mutations over the catalog and route table
//!
//! Every mutation writes an audit event and invalidates whatever cached
//! permissions it may have changed. Audit failure on a mutation does not
//! roll the mutation back; the receipt reports it so callers can alert.

use crate::audit::{AuditEvent, AuditQuery, AuditRecord, AuditRecorder};
use crate::cache::PermissionCache;
use crate::catalog::{Catalog, NewRole, Role, RolePermission};
use crate::error::Result;
use crate::policy::{PolicyStore, PolicyViolation, SecurityPolicy, ViolationLog};
use crate::routes::{RouteMapper, RoutePermission};
use crate::types::{GroupId, RoleId, Severity};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// What a mutation did, beyond its primary result
#[derive(Debug, Clone, Serialize)]
pub struct MutationReceipt {
    /// Whether the audit event for this mutation was written
    pub audit_recorded: bool,
    /// Error text when the audit write failed
    pub audit_error: Option<String>,
}

/// Administrative surface for roles, grants, routes, policies, and
/// violations
pub struct AdminApi {
    catalog: Arc<Catalog>,
    routes: Arc<RouteMapper>,
    cache: Arc<PermissionCache>,
    audit: Arc<AuditRecorder>,
    policies: Arc<dyn PolicyStore>,
    violations: Arc<ViolationLog>,
}

impl AdminApi {
    pub fn new(
        catalog: Arc<Catalog>,
        routes: Arc<RouteMapper>,
        cache: Arc<PermissionCache>,
        audit: Arc<AuditRecorder>,
        policies: Arc<dyn PolicyStore>,
        violations: Arc<ViolationLog>,
    ) -> Self {
        Self {
            catalog,
            routes,
            cache,
            audit,
            policies,
            violations,
        }
    }

    async fn record(&self, record: AuditRecord) -> MutationReceipt {
        match self.audit.record(record).await {
            Ok(_) => MutationReceipt {
                audit_recorded: true,
                audit_error: None,
            },
            Err(e) => {
                error!(error = %e, "audit write failed for admin mutation");
                MutationReceipt {
                    audit_recorded: false,
                    audit_error: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn create_role(&self, actor: &str, new_role: NewRole) -> Result<(Role, MutationReceipt)> {
        let role = self.catalog.create_role(new_role).await?;
        info!(actor, role = %role.name, "role created");
        let receipt = self
            .record(
                AuditRecord::new("role_mutation", "role", &role.id.to_string(), "created")
                    .user(actor)
                    .new_values(json!({
                        "name": &role.name,
                        "parent_role": role.parent_role,
                        "hierarchy_level": role.hierarchy_level,
                    })),
            )
            .await;
        Ok((role, receipt))
    }

    /// Re-parent a role. Invalidates the whole cache since the affected
    /// principal set is unknown.
    pub async fn set_role_parent(
        &self,
        actor: &str,
        role_id: RoleId,
        parent: Option<RoleId>,
    ) -> Result<(Role, MutationReceipt)> {
        let before = self.catalog.get_role(role_id).await;
        let role = self.catalog.set_role_parent(role_id, parent).await?;
        self.cache.clear();
        let receipt = self
            .record(
                AuditRecord::new("role_mutation", "role", &role.id.to_string(), "reparented")
                    .user(actor)
                    .old_values(json!({
                        "parent_role": before.as_ref().and_then(|r| r.parent_role)
                    }))
                    .new_values(json!({ "parent_role": role.parent_role }))
                    .severity(Severity::Medium),
            )
            .await;
        Ok((role, receipt))
    }

    pub async fn delete_role(&self, actor: &str, role_id: RoleId) -> Result<MutationReceipt> {
        let before = self.catalog.get_role(role_id).await;
        self.catalog.delete_role(role_id).await?;
        self.cache.clear();
        let receipt = self
            .record(
                AuditRecord::new("role_mutation", "role", &role_id.to_string(), "deleted")
                    .user(actor)
                    .old_values(json!({ "name": before.map(|r| r.name) }))
                    .severity(Severity::Medium),
            )
            .await;
        Ok(receipt)
    }

    pub async fn grant_permission(
        &self,
        actor: &str,
        role_id: RoleId,
        permission: &str,
        group_id: Option<GroupId>,
    ) -> Result<(RolePermission, MutationReceipt)> {
        let grant = self
            .catalog
            .grant_permission(role_id, permission, group_id)
            .await?;
        self.cache.clear();
        let receipt = self
            .record(
                AuditRecord::new("grant_mutation", "role", &role_id.to_string(), "granted")
                    .user(actor)
                    .new_values(json!({ "permission": permission, "group_id": group_id })),
            )
            .await;
        Ok((grant, receipt))
    }

    pub async fn revoke_permission(
        &self,
        actor: &str,
        role_id: RoleId,
        permission: &str,
        group_id: Option<GroupId>,
    ) -> Result<MutationReceipt> {
        self.catalog
            .revoke_permission(role_id, permission, group_id)
            .await?;
        self.cache.clear();
        let receipt = self
            .record(
                AuditRecord::new("grant_mutation", "role", &role_id.to_string(), "revoked")
                    .user(actor)
                    .old_values(json!({ "permission": permission, "group_id": group_id }))
                    .severity(Severity::Medium),
            )
            .await;
        Ok(receipt)
    }

    /// Insert or replace a route's permission requirements. Visible to
    /// in-flight traffic immediately.
    pub async fn update_route(
        &self,
        actor: &str,
        spec: RoutePermission,
    ) -> Result<MutationReceipt> {
        let template = spec.template.clone();
        let new_values = json!({
            "allow_anonymous": spec.allow_anonymous,
            "allowed_roles": &spec.allowed_roles,
            "method_permissions": &spec.method_permissions,
        });
        self.routes.update_route_permission(spec)?;
        let receipt = self
            .record(
                AuditRecord::new("route_mutation", "route", &template, "updated")
                    .user(actor)
                    .new_values(new_values),
            )
            .await;
        Ok(receipt)
    }

    pub async fn remove_route(&self, actor: &str, template: &str) -> Result<MutationReceipt> {
        self.routes.remove_route(template)?;
        let receipt = self
            .record(
                AuditRecord::new("route_mutation", "route", template, "removed")
                    .user(actor)
                    .severity(Severity::Medium),
            )
            .await;
        Ok(receipt)
    }

    pub async fn upsert_policy(&self, actor: &str, policy: SecurityPolicy) -> Result<MutationReceipt> {
        let policy_id = policy.id;
        let new_values = serde_json::to_value(&policy).unwrap_or_default();
        self.policies.upsert(policy).await?;
        let receipt = self
            .record(
                AuditRecord::new("policy_mutation", "policy", &policy_id.to_string(), "upserted")
                    .user(actor)
                    .new_values(new_values)
                    .severity(Severity::Medium),
            )
            .await;
        Ok(receipt)
    }

    pub async fn remove_policy(&self, actor: &str, policy_id: Uuid) -> Result<MutationReceipt> {
        self.policies.remove(policy_id).await?;
        let receipt = self
            .record(
                AuditRecord::new("policy_mutation", "policy", &policy_id.to_string(), "removed")
                    .user(actor)
                    .severity(Severity::Medium),
            )
            .await;
        Ok(receipt)
    }

    pub async fn list_policies(&self) -> Result<Vec<SecurityPolicy>> {
        self.policies.list().await
    }

    pub async fn acknowledge_violation(
        &self,
        actor: &str,
        violation_id: Uuid,
    ) -> Result<(PolicyViolation, MutationReceipt)> {
        let violation = self.violations.acknowledge(violation_id, actor)?;
        let receipt = self
            .record(
                AuditRecord::new("violation_transition", "violation", &violation_id.to_string(), "acknowledged")
                    .user(actor)
                    .severity(Severity::Medium),
            )
            .await;
        Ok((violation, receipt))
    }

    pub async fn resolve_violation(
        &self,
        actor: &str,
        violation_id: Uuid,
        note: &str,
    ) -> Result<(PolicyViolation, MutationReceipt)> {
        let violation = self.violations.resolve(violation_id, actor, note)?;
        let receipt = self
            .record(
                AuditRecord::new("violation_transition", "violation", &violation_id.to_string(), "resolved")
                    .user(actor)
                    .new_values(json!({ "note": note }))
                    .severity(Severity::Medium),
            )
            .await;
        Ok((violation, receipt))
    }

    pub fn violations_for_user(&self, user_id: &str) -> Vec<PolicyViolation> {
        self.violations.for_user(user_id)
    }

    pub async fn audit_events(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        self.audit.query(query).await
    }

    /// Drop one principal's cached permissions.
    pub async fn invalidate_principal(&self, actor: &str, principal_id: &str) -> MutationReceipt {
        self.cache.invalidate(principal_id);
        self.record(
            AuditRecord::new("cache_invalidation", "principal", principal_id, "invalidated")
                .user(actor),
        )
        .await
    }
}
