//! # Sentinel AuthZ
//!
//! Authorization and trust evaluation engine: hierarchical roles, wildcard
//! permissions, route-to-permission mapping, security policies, and an
//! append-only audit trail behind a single decision facade.
//!
//! ## Example
//!
//! ```
//! use sentinel_authz::{
//!     AuthorizationEngine, ClaimSet, EngineConfig, InMemoryDirectory,
//!     InMemoryPolicyStore, PrincipalGrants, RoutePermission, RouteRequest,
//! };
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let directory = Arc::new(InMemoryDirectory::new());
//! directory.set_grants(
//!     "alice",
//!     PrincipalGrants {
//!         direct_permissions: vec!["Content.Articles.Read".to_string()],
//!         role_names: vec![],
//!         wildcard_grants: vec![],
//!     },
//! );
//!
//! let engine = AuthorizationEngine::new(
//!     EngineConfig::default(),
//!     directory,
//!     Arc::new(InMemoryPolicyStore::new()),
//! );
//! engine
//!     .routes()
//!     .update_route_permission(RoutePermission {
//!         template: "/api/articles/{id}".to_string(),
//!         allow_anonymous: false,
//!         require_authentication: true,
//!         allowed_roles: vec![],
//!         method_permissions: HashMap::from([(
//!             "GET".to_string(),
//!             vec!["Content.Articles.Read".to_string()],
//!         )]),
//!     })
//!     .unwrap();
//!
//! let request = RouteRequest::new("/api/articles/42", "GET")
//!     .with_claims(ClaimSet::new("alice"));
//! let decision = engine.authorize_route(&request).await;
//! assert!(decision.is_allowed());
//! # }
//! ```

pub mod admin;
pub mod audit;
pub mod cache;
pub mod catalog;
pub mod directory;
pub mod engine;
pub mod error;
pub mod events;
pub mod hierarchy;
pub mod matcher;
pub mod policy;
pub mod routes;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use admin::{AdminApi, MutationReceipt};
pub use audit::{AuditEvent, AuditQuery, AuditRecord, AuditRecorder, AuditStats};
pub use cache::{CacheConfig, CacheStats, PermissionCache};
pub use catalog::{Catalog, Group, GroupRole, NewRole, PermissionDef, Role, RolePermission};
pub use directory::{InMemoryDirectory, PermissionDirectory, PrincipalGrants};
pub use engine::metrics::{DecisionMetrics, MetricsCollector};
pub use engine::{AuthorizationEngine, EngineConfig, RouteRequest};
pub use error::{AuthzError, Result};
pub use events::{spawn_invalidation_listener, InvalidationEvent};
pub use hierarchy::{HierarchyResolver, ResolvedPermissions};
pub use policy::{
    InMemoryPolicyStore, PolicyCondition, PolicyContext, PolicyEvaluator, PolicyOutcome,
    PolicyStore, PolicyViolation, SecurityPolicy, ViolationLog, ViolationStatus,
};
pub use routes::{RouteMapper, RoutePermission};
pub use types::{AccessDecision, ClaimSet, DecisionReason, Permission, Severity, Verdict};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresAuditSink, PostgresPolicyStore};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
