//! Authorization engine: the decision facade
//!
//! Wires the route mapper, permission cache, hierarchy resolver, policy
//! evaluator, trust tracker, and audit recorder into one request pipeline.
//! Failure to reach the grant directory is a deny, never an allow. Failure
//! to write the audit trail on the read path is logged and does not change
//! the decision.

pub mod metrics;

use crate::audit::{AuditRecord, AuditRecorder};
use crate::cache::{CacheConfig, PermissionCache};
use crate::catalog::Catalog;
use crate::directory::PermissionDirectory;
use crate::error::{AuthzError, Result};
use crate::hierarchy::HierarchyResolver;
use crate::matcher;
use crate::policy::{PolicyContext, PolicyEvaluator, PolicyOutcome, PolicyStore, ViolationLog};
use crate::routes::RouteMapper;
use crate::types::{AccessDecision, ClaimSet, DecisionReason, Severity, Verdict};
use metrics::MetricsCollector;
use sentinel_trust::{DeviceTrustManager, TrustSubject, TrustTracker};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    /// Budget for fetching grants from the directory before failing closed
    pub fetch_timeout: Duration,
    /// Role name that bypasses permission checks entirely
    pub superadmin_role: String,
    /// Whether individual access decisions are written to the audit trail
    pub audit_decisions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            fetch_timeout: Duration::from_secs(2),
            superadmin_role: "SuperAdmin".to_string(),
            audit_decisions: true,
        }
    }
}

/// An incoming request to authorize
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub path: String,
    /// HTTP method, matched case-insensitively
    pub method: String,
    /// Authenticated claims, or `None` for an anonymous caller
    pub claims: Option<ClaimSet>,
    pub device_id: Option<String>,
    pub network_origin: Option<String>,
    pub correlation_id: Option<String>,
}

impl RouteRequest {
    pub fn new(path: &str, method: &str) -> Self {
        Self {
            path: path.to_string(),
            method: method.to_string(),
            claims: None,
            device_id: None,
            network_origin: None,
            correlation_id: None,
        }
    }

    pub fn with_claims(mut self, claims: ClaimSet) -> Self {
        self.claims = Some(claims);
        self
    }

    pub fn with_device(mut self, device_id: &str) -> Self {
        self.device_id = Some(device_id.to_string());
        self
    }

    pub fn with_network(mut self, origin: &str) -> Self {
        self.network_origin = Some(origin.to_string());
        self
    }

    pub fn with_correlation(mut self, correlation_id: &str) -> Self {
        self.correlation_id = Some(correlation_id.to_string());
        self
    }
}

/// The decision facade
pub struct AuthorizationEngine {
    config: EngineConfig,
    directory: Arc<dyn PermissionDirectory>,
    catalog: Arc<Catalog>,
    resolver: HierarchyResolver,
    routes: Arc<RouteMapper>,
    cache: Arc<PermissionCache>,
    policies: PolicyEvaluator,
    violations: Arc<ViolationLog>,
    trust: Arc<TrustTracker>,
    devices: Arc<DeviceTrustManager>,
    audit: Arc<AuditRecorder>,
    metrics: Arc<MetricsCollector>,
}

impl AuthorizationEngine {
    pub fn new(
        config: EngineConfig,
        directory: Arc<dyn PermissionDirectory>,
        policy_store: Arc<dyn PolicyStore>,
    ) -> Self {
        let catalog = Arc::new(Catalog::new());
        let violations = Arc::new(ViolationLog::new());
        Self {
            cache: Arc::new(PermissionCache::new(config.cache.clone())),
            resolver: HierarchyResolver::new(catalog.clone()),
            routes: Arc::new(RouteMapper::new()),
            policies: PolicyEvaluator::new(policy_store, violations.clone()),
            violations,
            trust: Arc::new(TrustTracker::new()),
            devices: Arc::new(DeviceTrustManager::new()),
            audit: Arc::new(AuditRecorder::new()),
            metrics: Arc::new(MetricsCollector::new()),
            catalog,
            directory,
            config,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn routes(&self) -> &Arc<RouteMapper> {
        &self.routes
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    pub fn violations(&self) -> &Arc<ViolationLog> {
        &self.violations
    }

    pub fn trust(&self) -> &Arc<TrustTracker> {
        &self.trust
    }

    pub fn devices(&self) -> &Arc<DeviceTrustManager> {
        &self.devices
    }

    pub fn audit(&self) -> &Arc<AuditRecorder> {
        &self.audit
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Authorize a request against the route table. The full pipeline:
    /// route lookup, authentication, role gate, permission check, policy
    /// evaluation. Any upstream failure resolves to deny.
    #[instrument(skip(self, request), fields(path = %request.path, method = %request.method))]
    pub async fn authorize_route(&self, request: &RouteRequest) -> AccessDecision {
        let started = Instant::now();
        let decision = self.decide(request).await;
        self.finalize(request, &decision, started.elapsed()).await;
        decision
    }

    async fn decide(&self, request: &RouteRequest) -> AccessDecision {
        let principal_id = request
            .claims
            .as_ref()
            .map(|c| c.principal_id.clone())
            .unwrap_or_else(|| "anonymous".to_string());
        let correlation = request.correlation_id.clone();

        // Unmapped routes are denied without consulting anything else.
        let Some(route) = self.routes.lookup(&request.path) else {
            debug!(path = %request.path, "no route configuration, denying");
            return AccessDecision::deny(&principal_id, DecisionReason::NoRouteConfiguration)
                .with_correlation(correlation);
        };

        if route.allow_anonymous {
            return AccessDecision::allow(&principal_id, DecisionReason::AnonymousRoute)
                .with_correlation(correlation);
        }

        let Some(claims) = request.claims.as_ref() else {
            return AccessDecision::deny(&principal_id, DecisionReason::AuthenticationRequired)
                .with_correlation(correlation);
        };
        if let Err(e) = claims.validate() {
            warn!(principal_id = %claims.principal_id, error = %e, "claim validation failed");
            return AccessDecision::deny(&principal_id, DecisionReason::AuthenticationRequired)
                .with_correlation(correlation);
        }

        // Superadmin bypasses every gate except authentication, including
        // the route's allowed-role list.
        if claims.roles.iter().any(|r| r == &self.config.superadmin_role) {
            return AccessDecision::allow(&principal_id, DecisionReason::SuperAdmin)
                .with_correlation(correlation);
        }

        if !route.allowed_roles.is_empty()
            && !claims.roles.iter().any(|r| route.allowed_roles.contains(r))
        {
            return AccessDecision::deny(&principal_id, DecisionReason::RoleNotAllowed)
                .with_correlation(correlation);
        }

        let method = request.method.to_ascii_uppercase();
        let Some(required) = route.method_permissions.get(&method) else {
            return AccessDecision::deny(
                &principal_id,
                DecisionReason::MethodNotConfigured { method },
            )
            .with_correlation(correlation);
        };

        if !required.is_empty() {
            let effective = match self.effective_permissions(claims).await {
                Ok(set) => set,
                Err(e) => {
                    warn!(principal_id = %claims.principal_id, error = %e, "grant fetch failed, denying");
                    self.metrics.record_upstream_failure().await;
                    return AccessDecision::deny(
                        &principal_id,
                        DecisionReason::UpstreamFailure {
                            detail: e.to_string(),
                        },
                    )
                    .with_correlation(correlation);
                }
            };

            if matcher::holds_superadmin_wildcard(&effective) {
                return AccessDecision::allow(&principal_id, DecisionReason::SuperAdmin)
                    .with_correlation(correlation);
            }

            for permission in required {
                if !matcher::set_satisfies(&effective, permission) {
                    return AccessDecision::deny(
                        &principal_id,
                        DecisionReason::PermissionMismatch {
                            required: permission.clone(),
                        },
                    )
                    .with_required(required.clone())
                    .with_correlation(correlation);
                }
            }
        }

        // Security policies run last so violations carry the request that
        // would otherwise have been allowed.
        if let Some(decision) = self.evaluate_policies(request, claims, required).await {
            return decision.with_correlation(correlation);
        }

        let reason = match required.first() {
            Some(p) => DecisionReason::PermissionGranted {
                permission: p.clone(),
            },
            None => DecisionReason::AuthenticationOnly,
        };
        AccessDecision::allow(&principal_id, reason)
            .with_required(required.clone())
            .with_correlation(correlation)
    }

    /// Evaluate category policies for a request that passed the permission
    /// checks. Returns a decision only when an enforced policy is breached.
    async fn evaluate_policies(
        &self,
        request: &RouteRequest,
        claims: &ClaimSet,
        required: &[String],
    ) -> Option<AccessDecision> {
        let category = Self::policy_category(&request.path, required);

        let subject = TrustSubject {
            user_id: claims.principal_id.clone(),
            device_id: request.device_id.clone().unwrap_or_default(),
            network_origin: request.network_origin.clone().unwrap_or_default(),
        };
        let trust_score = Some(self.trust.score(&subject));
        let device_trusted = request
            .device_id
            .as_deref()
            .map(|d| self.devices.is_trusted(&claims.principal_id, d))
            .unwrap_or(false);

        let ctx = PolicyContext {
            trust_score,
            device_trusted,
            network_origin: request.network_origin.clone(),
        };

        let result = self
            .policies
            .evaluate(&category, &claims.principal_id, &ctx)
            .await;
        let breach = match result {
            Ok(b) => b,
            Err(e) => {
                // Policy store failure on the read path is a deny, same as a
                // directory failure.
                error!(error = %e, "policy evaluation failed, denying");
                return Some(AccessDecision::deny(
                    &claims.principal_id,
                    DecisionReason::UpstreamFailure {
                        detail: e.to_string(),
                    },
                ));
            }
        }?;

        self.metrics.record_policy_breach().await;
        let decision = match breach.outcome {
            PolicyOutcome::Deny => AccessDecision::deny(
                &claims.principal_id,
                DecisionReason::PolicyViolation {
                    policy: breach.policy_name,
                    violation_id: breach.violation.id,
                },
            ),
            PolicyOutcome::RequireStepUp => AccessDecision::step_up(
                &claims.principal_id,
                DecisionReason::StepUpPolicy {
                    policy: breach.policy_name,
                    violation_id: breach.violation.id,
                },
            ),
        };
        Some(decision.with_required(required.to_vec()))
    }

    /// Category a request's policies are selected by: the service segment of
    /// the first required permission, falling back to the first path segment.
    fn policy_category(path: &str, required: &[String]) -> String {
        if let Some(first) = required.first() {
            if let Some(service) = first.split('.').next() {
                if !service.is_empty() && service != "*" {
                    return service.to_string();
                }
            }
        }
        path.trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// Effective permissions for a principal: cache, or directory fetch plus
    /// hierarchy resolution on a miss. The fetch is bounded by the configured
    /// timeout.
    pub async fn effective_permissions(&self, claims: &ClaimSet) -> Result<Arc<HashSet<String>>> {
        if let Some(cached) = self.cache.get(&claims.principal_id) {
            return Ok(cached);
        }

        let grants = tokio::time::timeout(
            self.config.fetch_timeout,
            self.directory.fetch_grants(&claims.principal_id),
        )
        .await
        .map_err(|_| {
            AuthzError::UpstreamUnavailable(format!(
                "grant fetch for '{}' timed out after {:?}",
                claims.principal_id, self.config.fetch_timeout
            ))
        })??;

        let mut permissions: HashSet<String> = grants.direct_permissions.into_iter().collect();
        permissions.extend(grants.wildcard_grants);
        permissions.extend(claims.direct_permissions.iter().cloned());

        let mut member_of = self.catalog.active_group_ids(&claims.principal_id).await;
        if let Some(group_id) = claims.group_id {
            member_of.insert(group_id);
        }

        let mut role_names = grants.role_names;
        role_names.extend(claims.roles.iter().cloned());
        let resolved = self
            .resolver
            .effective_permissions_for_roles(&role_names, &member_of)
            .await;
        if resolved.cycle_detected {
            warn!(principal_id = %claims.principal_id, "cycle detected during role resolution");
        }
        permissions.extend(resolved.permissions);

        self.cache.insert(&claims.principal_id, permissions.clone());
        Ok(Arc::new(permissions))
    }

    /// Whether the principal holds a permission satisfying `required`.
    /// Directory failures resolve to `false`.
    pub async fn has_permission(&self, claims: &ClaimSet, required: &str) -> Result<bool> {
        if claims.roles.iter().any(|r| r == &self.config.superadmin_role) {
            return Ok(true);
        }
        match self.effective_permissions(claims).await {
            Ok(effective) => Ok(matcher::set_satisfies(&effective, required)),
            Err(e) => {
                warn!(principal_id = %claims.principal_id, error = %e, "permission check failed closed");
                self.metrics.record_upstream_failure().await;
                Ok(false)
            }
        }
    }

    /// Whether the principal holds any of the listed permissions.
    pub async fn has_any_permission(&self, claims: &ClaimSet, required: &[String]) -> Result<bool> {
        for permission in required {
            if self.has_permission(claims, permission).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The principal's full effective permission set. Unlike the check
    /// methods this propagates upstream failures, since an empty set would
    /// be indistinguishable from a principal with no grants.
    pub async fn get_effective_permissions(&self, claims: &ClaimSet) -> Result<Vec<String>> {
        let effective = self.effective_permissions(claims).await?;
        let mut list: Vec<String> = effective.iter().cloned().collect();
        list.sort();
        Ok(list)
    }

    /// Drop a principal's cached permissions. The next check re-fetches.
    pub async fn invalidate_permissions(&self, principal_id: &str) -> bool {
        let removed = self.cache.invalidate(principal_id);
        if removed {
            info!(principal_id, "permissions invalidated");
        }
        let audit = self
            .audit
            .record(
                AuditRecord::new("cache_invalidation", "principal", principal_id, "invalidated")
                    .user(principal_id),
            )
            .await;
        if let Err(e) = audit {
            error!(principal_id, error = %e, "audit write failed for invalidation");
        }
        removed
    }

    /// Record the decision in metrics and, when configured, the audit trail.
    async fn finalize(&self, request: &RouteRequest, decision: &AccessDecision, elapsed: Duration) {
        self.metrics.record_verdict(decision.verdict).await;
        self.metrics.record_latency(elapsed).await;

        if !self.config.audit_decisions {
            return;
        }

        let (event_type, severity) = match &decision.reason {
            DecisionReason::AuthenticationRequired => ("authentication_failure", Severity::Medium),
            DecisionReason::PolicyViolation { .. } | DecisionReason::StepUpPolicy { .. } => {
                ("policy_breach", Severity::High)
            }
            DecisionReason::UpstreamFailure { .. } => ("upstream_failure", Severity::High),
            _ => ("access_decision", Severity::Low),
        };

        let action = crate::types::action_for_method(&request.method);
        let record = AuditRecord::new(event_type, "route", &request.path, action)
            .user(&decision.principal_id)
            .severity(severity)
            .new_values(json!({
                "method": &request.method,
                "verdict": decision.verdict.as_str(),
                "reason": &decision.reason,
                "required_permissions": &decision.required_permissions,
            }))
            .correlation(decision.correlation_id.clone());
        let record = if decision.verdict == Verdict::Allow {
            record
        } else {
            record.security_event()
        };

        // Audit failure on the read path never changes the decision.
        if let Err(e) = self.audit.record(record).await {
            error!(
                principal_id = %decision.principal_id,
                error = %e,
                "audit write failed for access decision"
            );
        }
    }
}
