//! Security policy evaluation and violation tracking
//!
//! Policies are evaluated per category in priority order (highest first).
//! Only active, enforced policies are consulted. The first policy with a
//! breached condition decides the outcome; lower-priority policies are not
//! consulted. Every breach opens a violation record.

use crate::error::{AuthzError, Result};
use crate::types::Severity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a breached policy does to the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyOutcome {
    /// Deny the request outright
    Deny,
    /// Allow after step-up verification
    RequireStepUp,
}

/// A single checkable condition. The condition set is closed; there is no
/// embedded expression language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyCondition {
    /// Breached when the subject's trust score is below the threshold
    MinimumTrustScore { threshold: f64 },
    /// Breached when the device is not explicitly marked trusted
    RequireTrustedDevice,
    /// Breached when the request's network origin is on the list
    NetworkDenied { origins: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityPolicy {
    pub id: Uuid,
    pub name: String,
    /// Category this policy applies to, matched against the decision context
    pub category: String,
    /// A single breached condition triggers the policy
    pub conditions: Vec<PolicyCondition>,
    pub severity: Severity,
    pub outcome: PolicyOutcome,
    /// Higher priority policies are consulted first
    pub priority: i32,
    /// Only active, enforced policies are evaluated against requests
    pub is_enforced: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Facts about the request the conditions are checked against
#[derive(Debug, Clone, Default)]
pub struct PolicyContext {
    pub trust_score: Option<f64>,
    pub device_trusted: bool,
    pub network_origin: Option<String>,
}

impl PolicyCondition {
    /// Whether this condition is breached in the given context. A missing
    /// trust score counts as breaching a minimum-score condition.
    pub fn is_breached(&self, ctx: &PolicyContext) -> bool {
        match self {
            PolicyCondition::MinimumTrustScore { threshold } => match ctx.trust_score {
                Some(score) => score < *threshold,
                None => true,
            },
            PolicyCondition::RequireTrustedDevice => !ctx.device_trusted,
            PolicyCondition::NetworkDenied { origins } => match &ctx.network_origin {
                Some(origin) => origins.iter().any(|o| o == origin),
                None => false,
            },
        }
    }
}

/// Violation lifecycle: Open -> Acknowledged -> Resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationStatus {
    Open,
    Acknowledged,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub id: Uuid,
    pub policy_id: Uuid,
    pub policy_name: String,
    pub user_id: String,
    pub severity: Severity,
    pub status: ViolationStatus,
    pub detail: String,
    /// Who acknowledged the violation, once acknowledged
    pub acknowledged_by: Option<String>,
    /// Who resolved the violation, once resolved
    pub resolved_by: Option<String>,
    /// Free-text resolution note recorded at resolve time
    pub resolution_note: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storage for security policies
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn upsert(&self, policy: SecurityPolicy) -> Result<()>;
    async fn remove(&self, id: Uuid) -> Result<()>;
    /// Active, enforced policies for a category, sorted by priority
    /// descending
    async fn for_category(&self, category: &str) -> Result<Vec<SecurityPolicy>>;
    async fn list(&self) -> Result<Vec<SecurityPolicy>>;
}

/// In-memory policy store
#[derive(Default)]
pub struct InMemoryPolicyStore {
    policies: RwLock<Vec<SecurityPolicy>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn upsert(&self, policy: SecurityPolicy) -> Result<()> {
        let mut policies = self.policies.write().await;
        if let Some(existing) = policies.iter_mut().find(|p| p.id == policy.id) {
            *existing = policy;
        } else {
            if policies.iter().any(|p| p.name == policy.name) {
                return Err(AuthzError::Storage(format!(
                    "policy '{}' already exists",
                    policy.name
                )));
            }
            policies.push(policy);
        }
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        let mut policies = self.policies.write().await;
        let before = policies.len();
        policies.retain(|p| p.id != id);
        if policies.len() == before {
            return Err(AuthzError::Storage(format!("policy {} not found", id)));
        }
        Ok(())
    }

    async fn for_category(&self, category: &str) -> Result<Vec<SecurityPolicy>> {
        let policies = self.policies.read().await;
        let mut matched: Vec<_> = policies
            .iter()
            .filter(|p| p.is_active && p.is_enforced && p.category == category)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(matched)
    }

    async fn list(&self) -> Result<Vec<SecurityPolicy>> {
        Ok(self.policies.read().await.clone())
    }
}

/// Append-only violation log. Records are never deleted; status moves
/// forward through the lifecycle only.
#[derive(Default)]
pub struct ViolationLog {
    violations: DashMap<Uuid, PolicyViolation>,
}

impl ViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, policy: &SecurityPolicy, user_id: &str, detail: String) -> PolicyViolation {
        let now = Utc::now();
        let violation = PolicyViolation {
            id: Uuid::new_v4(),
            policy_id: policy.id,
            policy_name: policy.name.clone(),
            user_id: user_id.to_string(),
            severity: policy.severity,
            status: ViolationStatus::Open,
            detail,
            acknowledged_by: None,
            resolved_by: None,
            resolution_note: None,
            detected_at: now,
            updated_at: now,
        };
        info!(
            violation_id = %violation.id,
            policy = %policy.name,
            user_id,
            severity = ?policy.severity,
            "policy violation recorded"
        );
        self.violations.insert(violation.id, violation.clone());
        violation
    }

    pub fn acknowledge(&self, id: Uuid, actor: &str) -> Result<PolicyViolation> {
        self.transition(id, ViolationStatus::Acknowledged, &[ViolationStatus::Open], |v| {
            v.acknowledged_by = Some(actor.to_string());
        })
    }

    pub fn resolve(&self, id: Uuid, actor: &str, note: &str) -> Result<PolicyViolation> {
        self.transition(
            id,
            ViolationStatus::Resolved,
            &[ViolationStatus::Open, ViolationStatus::Acknowledged],
            |v| {
                v.resolved_by = Some(actor.to_string());
                v.resolution_note = Some(note.to_string());
            },
        )
    }

    fn transition(
        &self,
        id: Uuid,
        to: ViolationStatus,
        allowed_from: &[ViolationStatus],
        apply: impl FnOnce(&mut PolicyViolation),
    ) -> Result<PolicyViolation> {
        let mut entry = self
            .violations
            .get_mut(&id)
            .ok_or_else(|| AuthzError::Storage(format!("violation {} not found", id)))?;
        if !allowed_from.contains(&entry.status) {
            return Err(AuthzError::ValidationFailed(format!(
                "violation {} cannot move from {:?} to {:?}",
                id, entry.status, to
            )));
        }
        entry.status = to;
        entry.updated_at = Utc::now();
        apply(&mut entry);
        Ok(entry.clone())
    }

    pub fn get(&self, id: Uuid) -> Option<PolicyViolation> {
        self.violations.get(&id).map(|v| v.clone())
    }

    pub fn for_user(&self, user_id: &str) -> Vec<PolicyViolation> {
        let mut found: Vec<_> = self
            .violations
            .iter()
            .filter(|v| v.user_id == user_id)
            .map(|v| v.clone())
            .collect();
        found.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        found
    }

    pub fn open_count(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| v.status == ViolationStatus::Open)
            .count()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Outcome of evaluating the policies for one request
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub outcome: PolicyOutcome,
    pub policy_name: String,
    pub violation: PolicyViolation,
}

/// Evaluates category policies against a request context
pub struct PolicyEvaluator {
    store: Arc<dyn PolicyStore>,
    violations: Arc<ViolationLog>,
}

impl PolicyEvaluator {
    pub fn new(store: Arc<dyn PolicyStore>, violations: Arc<ViolationLog>) -> Self {
        Self { store, violations }
    }

    /// Evaluate a category's policies. Returns the decision of the
    /// highest-priority breached policy, opening a violation for it. A
    /// policy is breached when any of its conditions is breached.
    pub async fn evaluate(
        &self,
        category: &str,
        user_id: &str,
        ctx: &PolicyContext,
    ) -> Result<Option<PolicyDecision>> {
        let policies = self.store.for_category(category).await?;

        for policy in policies {
            if policy.conditions.is_empty() {
                continue;
            }
            let breached = policy.conditions.iter().any(|c| c.is_breached(ctx));
            if !breached {
                debug!(policy = %policy.name, user_id, "policy conditions hold, continuing");
                continue;
            }

            let detail = format!(
                "policy '{}' breached (trust_score={:?}, device_trusted={})",
                policy.name, ctx.trust_score, ctx.device_trusted
            );
            let violation = self.violations.record(&policy, user_id, detail);
            warn!(
                policy = %policy.name,
                user_id,
                outcome = ?policy.outcome,
                "enforced policy breached"
            );
            return Ok(Some(PolicyDecision {
                outcome: policy.outcome,
                policy_name: policy.name.clone(),
                violation,
            }));
        }

        Ok(None)
    }

    pub fn violations(&self) -> &ViolationLog {
        &self.violations
    }
}
