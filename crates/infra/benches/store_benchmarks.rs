use std::sync::Arc;

use chrono::Utc;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use ainventory_auth::{PermissionName, SignUp};
use ainventory_core::DepartmentId;
use ainventory_infra::{
    AppConfig, AuthService, DepartmentStore, InMemoryStore, PermissionEvaluator, seed_defaults,
};
use ainventory_org::NewDepartment;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap()
}

fn department(i: usize, parent_id: Option<DepartmentId>) -> NewDepartment {
    NewDepartment {
        name: format!("Department {i}"),
        code: Some(format!("DEPT_{i}")),
        description: String::new(),
        parent_id,
        manager_id: None,
        location: String::new(),
        is_active: true,
    }
}

/// A single chain `depth` levels deep; returns (root, leaf).
async fn chain(store: &InMemoryStore, depth: usize) -> (DepartmentId, DepartmentId) {
    let root = store.create_department(department(0, None), None).await.unwrap();
    let mut leaf = root.id;
    for i in 1..depth {
        leaf = store
            .create_department(department(i, Some(leaf)), None)
            .await
            .unwrap()
            .id;
    }
    (root.id, leaf)
}

fn bench_permission_checks(c: &mut Criterion) {
    let rt = runtime();
    let store = Arc::new(InMemoryStore::new());
    let (evaluator, user_id) = rt.block_on(async {
        seed_defaults(store.as_ref()).await.unwrap();
        let auth = AuthService::new(store.clone(), &AppConfig::in_memory("bench"));
        let user = auth
            .sign_up(SignUp {
                first_name: "Bench".into(),
                last_name: "User".into(),
                email: "bench@example.com".into(),
                password: "bench password".into(),
                gender: "Other".into(),
            })
            .await
            .unwrap();
        (PermissionEvaluator::new(store.clone()), user.id)
    });

    let mut group = c.benchmark_group("permission_checks");
    let granted = PermissionName::new("products.view");
    let missing = PermissionName::new("roles.manage");

    group.bench_function("role_grant", |b| {
        b.iter(|| rt.block_on(evaluator.decide(user_id, black_box(&granted), Utc::now())));
    });
    group.bench_function("missing_permission", |b| {
        b.iter(|| rt.block_on(evaluator.decide(user_id, black_box(&missing), Utc::now())));
    });
    group.finish();
}

fn bench_department_closure(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("department_closure");

    for depth in [4usize, 16, 64] {
        let store = InMemoryStore::new();
        let (root, leaf) = rt.block_on(chain(&store, depth));

        group.bench_function(format!("is_ancestor_of_depth_{depth}"), |b| {
            b.iter(|| rt.block_on(store.is_ancestor_of(black_box(root), black_box(leaf))));
        });
        group.bench_function(format!("descendants_depth_{depth}"), |b| {
            b.iter(|| rt.block_on(store.descendants(black_box(root))));
        });
    }

    group.bench_function("insert_leaf_under_depth_64", |b| {
        let store = InMemoryStore::new();
        let (_, leaf) = rt.block_on(chain(&store, 64));
        let mut next = 1_000usize;
        b.iter(|| {
            next += 1;
            rt.block_on(store.create_department(department(next, Some(leaf)), None))
        });
    });
    group.finish();
}

criterion_group!(benches, bench_permission_checks, bench_department_closure);
criterion_main!(benches);
