//! Core types shared across the authorization engine

use crate::error::{AuthzError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role identifier
pub type RoleId = Uuid;

/// Group identifier
pub type GroupId = Uuid;

/// Principal identifier (user or service identity)
pub type PrincipalId = String;

/// Severity scale shared by audit events and policy violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A permission name composed of dotted segments: `Service.Resource.Action`
/// (e.g. `Identity.Users.Read`). Segments may be `*` wildcards in held
/// permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(String);

impl Permission {
    /// Parse and validate a permission name: non-empty dotted segments,
    /// wildcards only as whole segments.
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(AuthzError::ValidationFailed(
                "permission name cannot be empty".to_string(),
            ));
        }

        for segment in name.split('.') {
            if segment.is_empty() {
                return Err(AuthzError::ValidationFailed(format!(
                    "permission '{}' has an empty segment",
                    name
                )));
            }
            if segment.contains('*') && segment != "*" {
                return Err(AuthzError::ValidationFailed(format!(
                    "wildcard must be a whole segment in '{}'",
                    name
                )));
            }
        }

        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// The `Service` segment
    pub fn service(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.contains('*')
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Verified claim set handed to the engine by the token-verification layer.
/// Signature and expiry checking have already happened upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSet {
    /// Principal identifier
    pub principal_id: PrincipalId,

    /// Role names assigned to the principal
    #[serde(default)]
    pub roles: Vec<String>,

    /// Permissions granted directly, outside any role
    #[serde(default)]
    pub direct_permissions: Vec<String>,

    /// Primary group, if any
    #[serde(default)]
    pub group_id: Option<GroupId>,
}

impl ClaimSet {
    pub fn new(principal_id: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            roles: Vec::new(),
            direct_permissions: Vec::new(),
            group_id: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_direct_permission(mut self, permission: impl Into<String>) -> Self {
        self.direct_permissions.push(permission.into());
        self
    }

    pub fn with_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// Reject unusable claim sets before any decision logic runs
    pub fn validate(&self) -> Result<()> {
        if self.principal_id.trim().is_empty() {
            return Err(AuthzError::ValidationFailed(
                "principal id cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Final outcome of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Access granted
    Allow,

    /// Access denied
    Deny,

    /// Base permission check passed but an enforced policy requires
    /// additional verification before access is granted
    StepUpRequired,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Allow => "allow",
            Verdict::Deny => "deny",
            Verdict::StepUpRequired => "step_up_required",
        }
    }
}

/// Why the engine reached its verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionReason {
    /// Required permission satisfied by the principal's effective set
    PermissionGranted { permission: String },

    /// Route allows anonymous access
    AnonymousRoute,

    /// Method requires authentication only and the caller is authenticated
    AuthenticationOnly,

    /// Principal holds the superadmin role; all checks bypassed
    SuperAdmin,

    /// No route configuration matched the request path
    NoRouteConfiguration,

    /// Route template matched but the HTTP method is not configured
    MethodNotConfigured { method: String },

    /// Route requires authentication and no claim set was supplied
    AuthenticationRequired,

    /// Principal's roles are not in the route's allowed-role list
    RoleNotAllowed,

    /// Effective permission set does not satisfy a required permission
    PermissionMismatch { required: String },

    /// An enforced security policy denied the request
    PolicyViolation {
        policy: String,
        violation_id: Uuid,
    },

    /// An enforced security policy requires step-up verification
    StepUpPolicy { policy: String, violation_id: Uuid },

    /// Remote permission fetch failed or timed out; denied fail-closed
    UpstreamFailure { detail: String },
}

/// Authorization decision with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDecision {
    /// Unique decision id
    pub id: Uuid,

    /// Principal the decision applies to ("anonymous" for anonymous routes)
    pub principal_id: String,

    /// Final verdict
    pub verdict: Verdict,

    /// Why the verdict was reached
    pub reason: DecisionReason,

    /// Permissions the matched route required
    #[serde(default)]
    pub required_permissions: Vec<String>,

    /// Caller-supplied id correlating the decision with upstream logs
    #[serde(default)]
    pub correlation_id: Option<String>,

    /// When the decision was made
    pub decided_at: DateTime<Utc>,
}

impl AccessDecision {
    pub fn allow(principal_id: impl Into<String>, reason: DecisionReason) -> Self {
        Self::build(principal_id, Verdict::Allow, reason)
    }

    pub fn deny(principal_id: impl Into<String>, reason: DecisionReason) -> Self {
        Self::build(principal_id, Verdict::Deny, reason)
    }

    pub fn step_up(principal_id: impl Into<String>, reason: DecisionReason) -> Self {
        Self::build(principal_id, Verdict::StepUpRequired, reason)
    }

    fn build(principal_id: impl Into<String>, verdict: Verdict, reason: DecisionReason) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal_id: principal_id.into(),
            verdict,
            reason,
            required_permissions: Vec::new(),
            correlation_id: None,
            decided_at: Utc::now(),
        }
    }

    pub fn with_required(mut self, required: Vec<String>) -> Self {
        self.required_permissions = required;
        self
    }

    pub fn with_correlation(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allow
    }
}

/// Map an HTTP method to the audit action verb
pub fn action_for_method(method: &str) -> &'static str {
    match method.to_ascii_uppercase().as_str() {
        "GET" | "HEAD" => "Read",
        "POST" => "Create",
        "PUT" | "PATCH" => "Update",
        "DELETE" => "Delete",
        _ => "Invoke",
    }
}
