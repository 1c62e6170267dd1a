//! End-to-end decision pipeline scenarios

use async_trait::async_trait;
use sentinel_authz::{
    AuthorizationEngine, CacheConfig, ClaimSet, DecisionReason, EngineConfig, InMemoryDirectory,
    InMemoryPolicyStore, PermissionDirectory, PolicyCondition, PolicyOutcome, PrincipalGrants,
    RoutePermission, RouteRequest, SecurityPolicy, Severity, Verdict, ViolationStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn route(template: &str, method: &str, permissions: &[&str]) -> RoutePermission {
    RoutePermission {
        template: template.to_string(),
        allow_anonymous: false,
        require_authentication: true,
        allowed_roles: Vec::new(),
        method_permissions: HashMap::from([(
            method.to_string(),
            permissions.iter().map(|s| s.to_string()).collect(),
        )]),
    }
}

fn engine_with(directory: Arc<dyn PermissionDirectory>) -> AuthorizationEngine {
    AuthorizationEngine::new(
        EngineConfig::default(),
        directory,
        Arc::new(InMemoryPolicyStore::new()),
    )
}

#[tokio::test]
async fn test_permission_grant_allows() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.set_grants(
        "alice",
        PrincipalGrants {
            direct_permissions: vec!["Content.Articles.Read".to_string()],
            role_names: vec![],
            wildcard_grants: vec![],
        },
    );
    let engine = engine_with(directory);
    engine
        .routes()
        .update_route_permission(route("/api/articles/{id}", "GET", &["Content.Articles.Read"]))
        .unwrap();

    let decision = engine
        .authorize_route(&RouteRequest::new("/api/articles/42", "GET").with_claims(ClaimSet::new("alice")))
        .await;
    assert_eq!(decision.verdict, Verdict::Allow);
    assert!(matches!(
        decision.reason,
        DecisionReason::PermissionGranted { .. }
    ));
}

#[tokio::test]
async fn test_missing_permission_denies() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.set_grants(
        "bob",
        PrincipalGrants {
            direct_permissions: vec!["Content.Articles.Read".to_string()],
            role_names: vec![],
            wildcard_grants: vec![],
        },
    );
    let engine = engine_with(directory);
    engine
        .routes()
        .update_route_permission(route("/api/articles/{id}", "DELETE", &["Content.Articles.Delete"]))
        .unwrap();

    let decision = engine
        .authorize_route(&RouteRequest::new("/api/articles/42", "DELETE").with_claims(ClaimSet::new("bob")))
        .await;
    assert_eq!(decision.verdict, Verdict::Deny);
    assert!(matches!(
        decision.reason,
        DecisionReason::PermissionMismatch { .. }
    ));
}

/// Directory that counts fetches, to prove unmapped routes never hit it.
struct CountingDirectory {
    calls: AtomicUsize,
}

#[async_trait]
impl PermissionDirectory for CountingDirectory {
    async fn fetch_grants(&self, _principal_id: &str) -> sentinel_authz::Result<PrincipalGrants> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PrincipalGrants::default())
    }
}

#[tokio::test]
async fn test_unmapped_route_denies_without_fetch() {
    let directory = Arc::new(CountingDirectory {
        calls: AtomicUsize::new(0),
    });
    let engine = engine_with(directory.clone());

    let decision = engine
        .authorize_route(&RouteRequest::new("/api/unmapped", "GET").with_claims(ClaimSet::new("alice")))
        .await;
    assert_eq!(decision.verdict, Verdict::Deny);
    assert!(matches!(decision.reason, DecisionReason::NoRouteConfiguration));
    assert_eq!(directory.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_superadmin_bypasses_permission_checks() {
    let directory = Arc::new(InMemoryDirectory::new());
    let engine = engine_with(directory);
    engine
        .routes()
        .update_route_permission(route("/api/admin/secrets", "GET", &["Vault.Secrets.Read"]))
        .unwrap();

    let claims = ClaimSet::new("root").with_role("SuperAdmin");
    let decision = engine
        .authorize_route(&RouteRequest::new("/api/admin/secrets", "GET").with_claims(claims))
        .await;
    assert_eq!(decision.verdict, Verdict::Allow);
    assert!(matches!(decision.reason, DecisionReason::SuperAdmin));
}

#[tokio::test]
async fn test_superadmin_overrides_route_role_list() {
    let directory = Arc::new(InMemoryDirectory::new());
    let engine = engine_with(directory);
    engine
        .routes()
        .update_route_permission(RoutePermission {
            template: "/api/articles".to_string(),
            allow_anonymous: false,
            require_authentication: true,
            allowed_roles: vec!["Editor".to_string()],
            method_permissions: HashMap::from([(
                "GET".to_string(),
                vec!["Content.Articles.Read".to_string()],
            )]),
        })
        .unwrap();

    // An allowed-role list that does not name SuperAdmin still yields to it
    let claims = ClaimSet::new("root").with_role("SuperAdmin");
    let decision = engine
        .authorize_route(&RouteRequest::new("/api/articles", "GET").with_claims(claims))
        .await;
    assert_eq!(decision.verdict, Verdict::Allow);
    assert!(matches!(decision.reason, DecisionReason::SuperAdmin));

    // Other roles outside the list are still denied
    let claims = ClaimSet::new("mallory").with_role("Viewer");
    let decision = engine
        .authorize_route(&RouteRequest::new("/api/articles", "GET").with_claims(claims))
        .await;
    assert_eq!(decision.verdict, Verdict::Deny);
    assert!(matches!(decision.reason, DecisionReason::RoleNotAllowed));
}

#[tokio::test]
async fn test_superadmin_wildcard_grant_allows_everything() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.set_grants(
        "ops",
        PrincipalGrants {
            direct_permissions: vec![],
            role_names: vec![],
            wildcard_grants: vec!["*.*.*".to_string()],
        },
    );
    let engine = engine_with(directory);
    engine
        .routes()
        .update_route_permission(route("/api/anything", "POST", &["Billing.Invoices.Create"]))
        .unwrap();

    let decision = engine
        .authorize_route(&RouteRequest::new("/api/anything", "POST").with_claims(ClaimSet::new("ops")))
        .await;
    assert_eq!(decision.verdict, Verdict::Allow);
}

#[tokio::test]
async fn test_anonymous_route_allows_without_claims() {
    let engine = engine_with(Arc::new(InMemoryDirectory::new()));
    engine
        .routes()
        .update_route_permission(RoutePermission {
            template: "/health".to_string(),
            allow_anonymous: true,
            require_authentication: false,
            allowed_roles: Vec::new(),
            method_permissions: HashMap::new(),
        })
        .unwrap();

    let decision = engine.authorize_route(&RouteRequest::new("/health", "GET")).await;
    assert_eq!(decision.verdict, Verdict::Allow);
    assert!(matches!(decision.reason, DecisionReason::AnonymousRoute));
}

#[tokio::test]
async fn test_protected_route_requires_claims() {
    let engine = engine_with(Arc::new(InMemoryDirectory::new()));
    engine
        .routes()
        .update_route_permission(route("/api/articles", "GET", &["Content.Articles.Read"]))
        .unwrap();

    let decision = engine.authorize_route(&RouteRequest::new("/api/articles", "GET")).await;
    assert_eq!(decision.verdict, Verdict::Deny);
    assert!(matches!(decision.reason, DecisionReason::AuthenticationRequired));
}

#[tokio::test]
async fn test_unconfigured_method_denies() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.set_grants(
        "alice",
        PrincipalGrants {
            direct_permissions: vec!["Content.Articles.Read".to_string()],
            role_names: vec![],
            wildcard_grants: vec![],
        },
    );
    let engine = engine_with(directory);
    engine
        .routes()
        .update_route_permission(route("/api/articles", "GET", &["Content.Articles.Read"]))
        .unwrap();

    let decision = engine
        .authorize_route(&RouteRequest::new("/api/articles", "DELETE").with_claims(ClaimSet::new("alice")))
        .await;
    assert_eq!(decision.verdict, Verdict::Deny);
    assert!(matches!(
        decision.reason,
        DecisionReason::MethodNotConfigured { .. }
    ));
}

/// Directory that never responds in time
struct StalledDirectory;

#[async_trait]
impl PermissionDirectory for StalledDirectory {
    async fn fetch_grants(&self, _principal_id: &str) -> sentinel_authz::Result<PrincipalGrants> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(PrincipalGrants::default())
    }
}

#[tokio::test]
async fn test_fetch_timeout_fails_closed() {
    let config = EngineConfig {
        fetch_timeout: Duration::from_millis(20),
        ..Default::default()
    };
    let engine = AuthorizationEngine::new(
        config,
        Arc::new(StalledDirectory),
        Arc::new(InMemoryPolicyStore::new()),
    );
    engine
        .routes()
        .update_route_permission(route("/api/articles", "GET", &["Content.Articles.Read"]))
        .unwrap();

    let decision = engine
        .authorize_route(&RouteRequest::new("/api/articles", "GET").with_claims(ClaimSet::new("alice")))
        .await;
    assert_eq!(decision.verdict, Verdict::Deny);
    assert!(matches!(decision.reason, DecisionReason::UpstreamFailure { .. }));

    // has_permission resolves to false rather than erroring
    let granted = engine
        .has_permission(&ClaimSet::new("alice"), "Content.Articles.Read")
        .await
        .unwrap();
    assert!(!granted);

    // get_effective_permissions propagates the failure instead
    assert!(engine
        .get_effective_permissions(&ClaimSet::new("alice"))
        .await
        .is_err());
}

fn policy(name: &str, priority: i32, outcome: PolicyOutcome, threshold: f64) -> SecurityPolicy {
    SecurityPolicy {
        id: Uuid::new_v4(),
        name: name.to_string(),
        category: "Content".to_string(),
        conditions: vec![PolicyCondition::MinimumTrustScore { threshold }],
        severity: Severity::High,
        outcome,
        priority,
        is_enforced: true,
        is_active: true,
        created_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn test_policy_breach_denies_and_records_violation() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.set_grants(
        "lowtrust",
        PrincipalGrants {
            direct_permissions: vec!["Content.Articles.Read".to_string()],
            role_names: vec![],
            wildcard_grants: vec![],
        },
    );
    let store = Arc::new(InMemoryPolicyStore::new());
    // Neutral trust is 50; require 80 so the breach fires
    sentinel_authz::PolicyStore::upsert(&*store, policy("high-bar", 10, PolicyOutcome::Deny, 80.0))
        .await
        .unwrap();
    let engine = AuthorizationEngine::new(EngineConfig::default(), directory, store);
    engine
        .routes()
        .update_route_permission(route("/api/articles", "GET", &["Content.Articles.Read"]))
        .unwrap();

    let decision = engine
        .authorize_route(&RouteRequest::new("/api/articles", "GET").with_claims(ClaimSet::new("lowtrust")))
        .await;
    assert_eq!(decision.verdict, Verdict::Deny);

    let DecisionReason::PolicyViolation { violation_id, .. } = decision.reason else {
        panic!("expected policy violation, got {:?}", decision.reason);
    };
    let violation = engine.violations().get(violation_id).unwrap();
    assert_eq!(violation.status, ViolationStatus::Open);
    assert_eq!(violation.user_id, "lowtrust");
}

#[tokio::test]
async fn test_step_up_policy_returns_step_up_verdict() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.set_grants(
        "carol",
        PrincipalGrants {
            direct_permissions: vec!["Content.Articles.Read".to_string()],
            role_names: vec![],
            wildcard_grants: vec![],
        },
    );
    let store = Arc::new(InMemoryPolicyStore::new());
    sentinel_authz::PolicyStore::upsert(
        &*store,
        policy("step-up-bar", 10, PolicyOutcome::RequireStepUp, 80.0),
    )
    .await
    .unwrap();
    let engine = AuthorizationEngine::new(EngineConfig::default(), directory, store);
    engine
        .routes()
        .update_route_permission(route("/api/articles", "GET", &["Content.Articles.Read"]))
        .unwrap();

    let decision = engine
        .authorize_route(&RouteRequest::new("/api/articles", "GET").with_claims(ClaimSet::new("carol")))
        .await;
    assert_eq!(decision.verdict, Verdict::StepUpRequired);
    assert!(matches!(decision.reason, DecisionReason::StepUpPolicy { .. }));
}

#[tokio::test]
async fn test_invalidation_forces_refetch() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.set_grants(
        "dave",
        PrincipalGrants {
            direct_permissions: vec!["Content.Articles.Read".to_string()],
            role_names: vec![],
            wildcard_grants: vec![],
        },
    );
    let engine = engine_with(directory.clone());
    engine
        .routes()
        .update_route_permission(route("/api/articles", "GET", &["Content.Articles.Read"]))
        .unwrap();

    let claims = ClaimSet::new("dave");
    let decision = engine
        .authorize_route(&RouteRequest::new("/api/articles", "GET").with_claims(claims.clone()))
        .await;
    assert_eq!(decision.verdict, Verdict::Allow);

    // Revoke upstream; the cached set still allows until invalidation
    directory.set_grants("dave", PrincipalGrants::default());
    let decision = engine
        .authorize_route(&RouteRequest::new("/api/articles", "GET").with_claims(claims.clone()))
        .await;
    assert_eq!(decision.verdict, Verdict::Allow);

    engine.invalidate_permissions("dave").await;
    let decision = engine
        .authorize_route(&RouteRequest::new("/api/articles", "GET").with_claims(claims))
        .await;
    assert_eq!(decision.verdict, Verdict::Deny);
}

#[tokio::test]
async fn test_role_hierarchy_flows_through_engine() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.set_grants(
        "erin",
        PrincipalGrants {
            direct_permissions: vec![],
            role_names: vec!["Editor".to_string()],
            wildcard_grants: vec![],
        },
    );
    let engine = engine_with(directory);

    let viewer = engine
        .catalog()
        .create_role(sentinel_authz::NewRole {
            name: "Viewer".to_string(),
            parent_role: None,
            inherit_permissions: true,
            priority: 0,
            is_system_role: false,
        })
        .await
        .unwrap();
    let editor = engine
        .catalog()
        .create_role(sentinel_authz::NewRole {
            name: "Editor".to_string(),
            parent_role: Some(viewer.id),
            inherit_permissions: true,
            priority: 0,
            is_system_role: false,
        })
        .await
        .unwrap();
    engine
        .catalog()
        .grant_permission(viewer.id, "Content.Articles.Read", None)
        .await
        .unwrap();
    engine
        .catalog()
        .grant_permission(editor.id, "Content.Articles.Update", None)
        .await
        .unwrap();

    engine
        .routes()
        .update_route_permission(route("/api/articles/{id}", "GET", &["Content.Articles.Read"]))
        .unwrap();

    // The read permission comes from the inherited Viewer role
    let decision = engine
        .authorize_route(&RouteRequest::new("/api/articles/9", "GET").with_claims(ClaimSet::new("erin")))
        .await;
    assert_eq!(decision.verdict, Verdict::Allow);
}

#[tokio::test]
async fn test_group_scoped_grant_requires_group_claim() {
    let directory = Arc::new(InMemoryDirectory::new());
    for principal in ["henry", "iris"] {
        directory.set_grants(
            principal,
            PrincipalGrants {
                direct_permissions: vec![],
                role_names: vec!["Editor".to_string()],
                wildcard_grants: vec![],
            },
        );
    }
    let engine = engine_with(directory);

    let editor = engine
        .catalog()
        .create_role(sentinel_authz::NewRole {
            name: "Editor".to_string(),
            parent_role: None,
            inherit_permissions: false,
            priority: 0,
            is_system_role: false,
        })
        .await
        .unwrap();
    let group = engine.catalog().create_group("writers", "team").await.unwrap();
    engine
        .catalog()
        .grant_permission(editor.id, "Content.Articles.Update", Some(group.id))
        .await
        .unwrap();

    engine
        .routes()
        .update_route_permission(route("/api/articles/{id}", "PUT", &["Content.Articles.Update"]))
        .unwrap();

    // Same role, no group claim: the scoped grant does not apply
    let decision = engine
        .authorize_route(&RouteRequest::new("/api/articles/7", "PUT").with_claims(ClaimSet::new("henry")))
        .await;
    assert_eq!(decision.verdict, Verdict::Deny);

    let claims = ClaimSet::new("iris").with_group(group.id);
    let decision = engine
        .authorize_route(&RouteRequest::new("/api/articles/7", "PUT").with_claims(claims))
        .await;
    assert_eq!(decision.verdict, Verdict::Allow);
}

#[tokio::test]
async fn test_allow_event_carries_method_action() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.set_grants(
        "alice",
        PrincipalGrants {
            direct_permissions: vec!["Content.Articles.Update".to_string()],
            role_names: vec![],
            wildcard_grants: vec![],
        },
    );
    let engine = engine_with(directory);
    engine
        .routes()
        .update_route_permission(route("/api/articles/{id}", "PUT", &["Content.Articles.Update"]))
        .unwrap();

    let decision = engine
        .authorize_route(&RouteRequest::new("/api/articles/3", "PUT").with_claims(ClaimSet::new("alice")))
        .await;
    assert_eq!(decision.verdict, Verdict::Allow);

    let events = engine
        .audit()
        .query(&sentinel_authz::AuditQuery {
            event_type: Some("access_decision".to_string()),
            ..Default::default()
        })
        .await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, "Update");
    assert_eq!(events[0].entity_id, "/api/articles/3");
    assert_eq!(events[0].new_values.as_ref().unwrap()["verdict"], "allow");
    assert!(!events[0].is_security_event);
}

#[tokio::test]
async fn test_decisions_are_audited() {
    let engine = engine_with(Arc::new(InMemoryDirectory::new()));
    engine
        .routes()
        .update_route_permission(route("/api/articles", "GET", &["Content.Articles.Read"]))
        .unwrap();

    // Denied anonymous request becomes an authentication_failure event
    engine.authorize_route(&RouteRequest::new("/api/articles", "GET")).await;

    let events = engine
        .audit()
        .query(&sentinel_authz::AuditQuery {
            event_type: Some("authentication_failure".to_string()),
            ..Default::default()
        })
        .await;
    assert_eq!(events.len(), 1);
    assert!(events[0].is_security_event);
}

#[tokio::test]
async fn test_invalidation_listener_drains_events() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.set_grants(
        "grace",
        PrincipalGrants {
            direct_permissions: vec!["Svc.Res.Read".to_string()],
            role_names: vec![],
            wildcard_grants: vec![],
        },
    );
    let engine = Arc::new(engine_with(directory));

    // Warm the cache
    engine
        .has_permission(&ClaimSet::new("grace"), "Svc.Res.Read")
        .await
        .unwrap();
    assert!(engine.cache().get("grace").is_some());

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let listener = sentinel_authz::spawn_invalidation_listener(engine.clone(), rx);
    tx.send(sentinel_authz::InvalidationEvent::new("grace", "role_revoked"))
        .await
        .unwrap();
    drop(tx);
    listener.await.unwrap();

    assert!(engine.cache().get("grace").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checks_with_invalidation() {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.set_grants(
        "frank",
        PrincipalGrants {
            direct_permissions: vec!["Svc.Res.Read".to_string()],
            role_names: vec![],
            wildcard_grants: vec![],
        },
    );
    let engine = Arc::new(AuthorizationEngine::new(
        EngineConfig {
            cache: CacheConfig::default(),
            ..Default::default()
        },
        directory,
        Arc::new(InMemoryPolicyStore::new()),
    ));

    let mut tasks = Vec::new();
    for i in 0..32 {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            let claims = ClaimSet::new("frank");
            if i % 8 == 0 {
                engine.invalidate_permissions("frank").await;
            }
            engine.has_permission(&claims, "Svc.Res.Read").await.unwrap()
        }));
    }

    // Every check sees either the cached or freshly fetched set; both grant
    for task in tasks {
        assert!(task.await.unwrap());
    }
}
