//! Module lifecycle tests
//!
//! Registration, start ordering, failure containment, stop and unregister.

use std::sync::Arc;
use std::time::Duration;

use modhost::module::manager::ModuleManager;
use modhost::{
    ActivatorCatalog, KernelConfig, ModuleError, ModuleId, ModuleKind, ModuleState, SharedBase,
};

use super::test_utils::*;

/// A exports com.a; B imports com.a and exports com.b; app imports com.b
fn chain_units() -> (
    Arc<dyn modhost::ModuleArchive>,
    Arc<dyn modhost::ModuleArchive>,
    Arc<dyn modhost::ModuleArchive>,
) {
    let a = UnitBuilder::plugin("a", "1.0.0")
        .priority(500)
        .activator("a")
        .attr("export-namespaces", "com.a")
        .types("a/classes", &["com.a.Core"])
        .shared();
    let b = UnitBuilder::plugin("b", "1.0.0")
        .priority(100)
        .activator("b")
        .attr("export-namespaces", "com.b")
        .attr("import-namespaces", "com.a")
        .types("b/classes", &["com.b.Service"])
        .shared();
    let app = UnitBuilder::business("app", "1.0.0")
        .activator("app")
        .attr("import-namespaces", "com.b")
        .types("app/classes", &["com.app.Main"])
        .shared();
    (a, b, app)
}

#[tokio::test]
async fn test_start_all_starts_providers_first() {
    let fixture = ModuleTestFixture::new(&["a", "b", "app"]);
    let (a, b, app) = chain_units();

    let report = fixture.kernel.deploy(&[app, b, a]).await;
    assert!(report.is_success(), "{:?}", report);
    assert_eq!(calls(&fixture.log), vec!["start:a", "start:b", "start:app"]);

    let manager = fixture.kernel.manager();
    for id in [
        ModuleId::plugin("a", "1.0.0"),
        ModuleId::plugin("b", "1.0.0"),
        ModuleId::business("app", "1.0.0"),
    ] {
        assert_eq!(manager.state(&id), Some(ModuleState::Activated));
    }
}

#[tokio::test]
async fn test_consumer_cannot_start_before_provider() {
    let fixture = ModuleTestFixture::new(&["a", "b", "app"]);
    let (a, b, _) = chain_units();
    let kernel = &fixture.kernel;
    let a_id = kernel.install(a.as_ref()).unwrap();
    let b_id = kernel.install(b.as_ref()).unwrap();

    let err = kernel.manager().start(&b_id).await.unwrap_err();
    match err {
        ModuleError::DependencyNotActive {
            dependency, state, ..
        } => {
            assert_eq!(dependency, a_id);
            assert_eq!(state, ModuleState::Resolved);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(kernel.manager().state(&b_id), Some(ModuleState::Resolved));

    kernel.manager().start(&a_id).await.unwrap();
    kernel.manager().start(&b_id).await.unwrap();
    assert_eq!(calls(&fixture.log), vec!["start:a", "start:b"]);
}

#[tokio::test]
async fn test_duplicate_registration_is_rejected() {
    let fixture = ModuleTestFixture::new(&[]);
    let unit = UnitBuilder::plugin("dup", "1.0.0").build();
    let kernel = &fixture.kernel;

    kernel.install(&unit).unwrap();
    let err = kernel.install(&unit).unwrap_err();
    assert!(matches!(err, ModuleError::AlreadyRegistered(_)));
    assert_eq!(kernel.manager().list_modules().len(), 1);

    // same name, other version is a different module
    kernel
        .install(&UnitBuilder::plugin("dup", "2.0.0").build())
        .unwrap();
    assert_eq!(kernel.manager().list_modules().len(), 2);
}

#[tokio::test]
async fn test_failing_activator_breaks_module_and_withdraws_services() {
    let log = call_log();
    let catalog = ActivatorCatalog::new()
        .with("bad", TestActivator::with_behavior("bad", &log, StartBehavior::Fail))
        .with("good", TestActivator::new("good", &log));
    let fixture = ModuleTestFixture::with_catalog(catalog, log, KernelConfig::default());

    let report = fixture
        .kernel
        .deploy(&[
            UnitBuilder::plugin("bad", "1.0").activator("bad").shared(),
            UnitBuilder::plugin("good", "1.0").activator("good").shared(),
        ])
        .await;

    assert_eq!(report.start.started, vec![ModuleId::plugin("good", "1.0")]);
    assert_eq!(report.start.failed.len(), 1);
    assert!(matches!(
        report.start.failed[0].1,
        ModuleError::StartFailed { .. }
    ));

    let manager = fixture.kernel.manager();
    let bad = ModuleId::plugin("bad", "1.0");
    assert_eq!(manager.state(&bad), Some(ModuleState::Broken));
    assert!(manager.last_error(&bad).unwrap().contains("refused to start"));
    assert!(fixture.kernel.services().lookup::<String>(Some("bad")).is_none());
    assert!(fixture.kernel.services().lookup::<String>(Some("good")).is_some());

    // broken plugins are no longer peers
    assert!(manager.ordered_peers().iter().all(|d| d.id() != &bad));
}

#[tokio::test]
async fn test_panicking_activator_is_contained() {
    let log = call_log();
    let catalog = ActivatorCatalog::new()
        .with("boom", TestActivator::with_behavior("boom", &log, StartBehavior::Panic));
    let fixture = ModuleTestFixture::with_catalog(catalog, log, KernelConfig::default());
    let id = fixture
        .kernel
        .install(&UnitBuilder::plugin("boom", "1.0").activator("boom").build())
        .unwrap();

    let err = fixture.kernel.manager().start(&id).await.unwrap_err();
    assert!(matches!(err, ModuleError::StartFailed { .. }));
    assert_eq!(fixture.kernel.manager().state(&id), Some(ModuleState::Broken));
}

#[tokio::test]
async fn test_start_timeout_breaks_module() {
    let log = call_log();
    let catalog = ActivatorCatalog::new()
        .with("slow", TestActivator::with_behavior("slow", &log, StartBehavior::Hang));
    let mut config = KernelConfig::default();
    config.lifecycle.start_timeout_ms = Some(50);
    let fixture = ModuleTestFixture::with_catalog(catalog, log, config);
    let id = fixture
        .kernel
        .install(&UnitBuilder::plugin("slow", "1.0").activator("slow").build())
        .unwrap();

    let err = fixture.kernel.manager().start(&id).await.unwrap_err();
    assert!(err.to_string().contains("did not start within"));
    assert_eq!(fixture.kernel.manager().state(&id), Some(ModuleState::Broken));
}

#[tokio::test]
async fn test_stop_keeps_services_by_default() {
    let fixture = ModuleTestFixture::new(&["svc"]);
    let id = fixture
        .kernel
        .install(&UnitBuilder::plugin("svc", "1.0").activator("svc").build())
        .unwrap();
    let manager = fixture.kernel.manager();

    manager.start(&id).await.unwrap();
    manager.stop(&id).await.unwrap();

    assert_eq!(manager.state(&id), Some(ModuleState::Stopped));
    assert_eq!(calls(&fixture.log), vec!["start:svc", "stop:svc"]);
    assert!(fixture.kernel.services().lookup::<String>(Some("svc")).is_some());

    let err = manager.stop(&id).await.unwrap_err();
    assert!(matches!(err, ModuleError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_stop_can_withdraw_services() {
    let log = call_log();
    let catalog = ActivatorCatalog::new().with("svc", TestActivator::new("svc", &log));
    let mut config = KernelConfig::default();
    config.lifecycle.withdraw_services_on_stop = true;
    let fixture = ModuleTestFixture::with_catalog(catalog, log, config);
    let id = fixture
        .kernel
        .install(&UnitBuilder::plugin("svc", "1.0").activator("svc").build())
        .unwrap();

    fixture.kernel.manager().start(&id).await.unwrap();
    fixture.kernel.manager().stop(&id).await.unwrap();
    assert!(fixture.kernel.services().lookup::<String>(Some("svc")).is_none());
}

#[tokio::test]
async fn test_shutdown_stops_consumers_first() {
    let fixture = ModuleTestFixture::new(&["a", "b", "app"]);
    let (a, b, app) = chain_units();
    fixture.kernel.deploy(&[a, b, app]).await;

    let report = fixture.kernel.shutdown().await;
    assert!(report.failed.is_empty());
    assert_eq!(
        calls(&fixture.log)[3..].to_vec(),
        vec!["stop:app", "stop:b", "stop:a"]
    );
}

fn names(ids: &[ModuleId]) -> Vec<&str> {
    ids.iter().map(|id| id.name.as_str()).collect()
}

/// x and y import from each other
fn ring_units() -> Vec<Arc<dyn modhost::ModuleArchive>> {
    vec![
        UnitBuilder::plugin("y", "1.0")
            .activator("y")
            .attr("export-namespaces", "com.y")
            .attr("import-namespaces", "com.x")
            .shared(),
        UnitBuilder::plugin("x", "1.0")
            .activator("x")
            .attr("export-namespaces", "com.x")
            .attr("import-namespaces", "com.y")
            .shared(),
    ]
}

#[tokio::test]
async fn test_import_cycle_starts_in_peer_order() {
    let fixture = ModuleTestFixture::new(&["x", "y"]);
    let report = fixture.kernel.deploy(&ring_units()).await;

    assert!(report.is_success(), "{report:?}");
    assert_eq!(names(&report.start.started), vec!["x", "y"]);
    assert_eq!(calls(&fixture.log), vec!["start:x", "start:y"]);

    let shutdown = fixture.kernel.shutdown().await;
    assert_eq!(names(&shutdown.stopped), vec!["y", "x"]);
}

#[tokio::test]
async fn test_cycle_member_starts_while_partner_is_resolved() {
    let fixture = ModuleTestFixture::new(&["x", "y"]);
    let manager = fixture.kernel.manager();
    let ids: Vec<ModuleId> = ring_units()
        .iter()
        .map(|unit| fixture.kernel.install(unit.as_ref()).unwrap())
        .collect();
    let (y, x) = (&ids[0], &ids[1]);

    manager.start(y).await.unwrap();
    assert_eq!(manager.state(x), Some(ModuleState::Resolved));
    manager.start(x).await.unwrap();
    assert_eq!(manager.state(x), Some(ModuleState::Activated));
}

#[tokio::test]
async fn test_consumer_outside_cycle_still_waits_for_activation() {
    let fixture = ModuleTestFixture::new(&["x", "y"]);
    let manager = fixture.kernel.manager();
    for unit in ring_units() {
        fixture.kernel.install(unit.as_ref()).unwrap();
    }
    let app = fixture
        .kernel
        .install(
            &UnitBuilder::business("app", "1.0")
                .attr("import-namespaces", "com.x")
                .build(),
        )
        .unwrap();

    let err = manager.start(&app).await.unwrap_err();
    assert!(matches!(err, ModuleError::DependencyNotActive { .. }));
    assert_eq!(manager.state(&app), Some(ModuleState::Resolved));
}

#[tokio::test]
async fn test_reregister_after_terminal_state_archives_old_module() {
    let fixture = ModuleTestFixture::new(&["svc"]);
    let unit = UnitBuilder::plugin("svc", "1.0").activator("svc").build();
    let manager = fixture.kernel.manager();

    let id = fixture.kernel.install(&unit).unwrap();
    manager.start(&id).await.unwrap();
    manager.stop(&id).await.unwrap();

    fixture.kernel.install(&unit).unwrap();
    assert_eq!(manager.state(&id), Some(ModuleState::Resolved));

    let reports = manager.reports();
    assert_eq!(reports.len(), 2);
    assert!(reports[0].archived);
    assert_eq!(reports[0].state, ModuleState::Stopped);
    assert!(reports[0].instance_id.is_some());
    assert!(!reports[1].archived);
}

#[tokio::test]
async fn test_unregister_requires_inactive_module() {
    let fixture = ModuleTestFixture::new(&["svc"]);
    let id = fixture
        .kernel
        .install(&UnitBuilder::plugin("svc", "1.0").activator("svc").build())
        .unwrap();
    let manager = fixture.kernel.manager();

    manager.start(&id).await.unwrap();
    assert!(manager.unregister(&id).await.is_err());

    manager.stop(&id).await.unwrap();
    let report = manager.unregister(&id).await.unwrap();
    assert!(report.archived);
    assert_eq!(manager.state(&id), None);
    assert!(matches!(
        manager.start(&id).await,
        Err(ModuleError::ModuleNotFound(_))
    ));
}

#[tokio::test]
async fn test_report_failure_breaks_active_module() {
    let fixture = ModuleTestFixture::new(&["svc"]);
    let id = fixture
        .kernel
        .install(&UnitBuilder::plugin("svc", "1.0").activator("svc").build())
        .unwrap();
    let manager = fixture.kernel.manager();
    manager.start(&id).await.unwrap();

    manager.report_failure(&id, "lost its backing store").await.unwrap();
    assert_eq!(manager.state(&id), Some(ModuleState::Broken));
    assert!(fixture.kernel.services().lookup::<String>(Some("svc")).is_none());
}

#[tokio::test]
async fn test_modules_transition_in_parallel() {
    let log = call_log();
    let catalog = ActivatorCatalog::new()
        .with("slow", TestActivator::with_behavior("slow", &log, StartBehavior::Hang))
        .with("fast", TestActivator::new("fast", &log));
    let fixture = ModuleTestFixture::with_catalog(catalog, log, KernelConfig::default());
    let slow = fixture
        .kernel
        .install(&UnitBuilder::plugin("slow", "1.0").activator("slow").build())
        .unwrap();
    let fast = fixture
        .kernel
        .install(&UnitBuilder::plugin("fast", "1.0").activator("fast").build())
        .unwrap();

    let manager = Arc::clone(fixture.kernel.manager());
    let slow_start = tokio::spawn(async move { manager.start(&slow).await });

    tokio::time::timeout(Duration::from_secs(2), fixture.kernel.manager().start(&fast))
        .await
        .expect("fast module blocked behind slow one")
        .unwrap();
    slow_start.abort();
}

#[test]
fn test_manager_without_kernel() {
    let manager = ModuleManager::new(
        Arc::new(modhost::ServiceRegistry::new()),
        SharedBase::default(),
    );
    assert!(manager.list_modules().is_empty());
    assert!(manager
        .ordered_peers()
        .iter()
        .all(|d| d.kind() == ModuleKind::Plugin));
}
