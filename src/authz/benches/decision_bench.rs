//! Hot-path benchmarks for the decision pipeline

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sentinel_authz::{
    AuthorizationEngine, ClaimSet, EngineConfig, InMemoryDirectory, InMemoryPolicyStore,
    PrincipalGrants, RoutePermission, RouteRequest,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn build_engine() -> AuthorizationEngine {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.set_grants(
        "bench-user",
        PrincipalGrants {
            direct_permissions: vec!["Content.Articles.Read".to_string()],
            role_names: vec![],
            wildcard_grants: vec![],
        },
    );
    let engine = AuthorizationEngine::new(
        EngineConfig::default(),
        directory,
        Arc::new(InMemoryPolicyStore::new()),
    );
    engine
        .routes()
        .update_route_permission(RoutePermission {
            template: "/api/articles/{id}".to_string(),
            allow_anonymous: false,
            require_authentication: true,
            allowed_roles: vec![],
            method_permissions: HashMap::from([(
                "GET".to_string(),
                vec!["Content.Articles.Read".to_string()],
            )]),
        })
        .unwrap();
    for i in 0..200 {
        engine
            .routes()
            .update_route_permission(RoutePermission {
                template: format!("/api/filler{}/{{id}}", i),
                allow_anonymous: false,
                require_authentication: true,
                allowed_roles: vec![],
                method_permissions: HashMap::new(),
            })
            .unwrap();
    }
    engine
}

fn bench_authorize_cached(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = build_engine();

    // Warm the cache so the bench measures the cached path
    rt.block_on(async {
        let request =
            RouteRequest::new("/api/articles/1", "GET").with_claims(ClaimSet::new("bench-user"));
        engine.authorize_route(&request).await;
    });

    c.bench_function("authorize_route_cached", |b| {
        b.iter(|| {
            rt.block_on(async {
                let request = RouteRequest::new("/api/articles/1", "GET")
                    .with_claims(ClaimSet::new("bench-user"));
                black_box(engine.authorize_route(&request).await)
            })
        })
    });
}

fn bench_route_lookup(c: &mut Criterion) {
    let engine = build_engine();

    c.bench_function("route_lookup_template", |b| {
        b.iter(|| black_box(engine.routes().lookup("/api/articles/42")))
    });
}

fn bench_has_permission(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = build_engine();
    let claims = ClaimSet::new("bench-user");

    c.bench_function("has_permission_cached", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(
                    engine
                        .has_permission(&claims, "Content.Articles.Read")
                        .await
                        .unwrap(),
                )
            })
        })
    });
}

criterion_group!(
    benches,
    bench_authorize_cached,
    bench_route_lookup,
    bench_has_permission
);
criterion_main!(benches);
