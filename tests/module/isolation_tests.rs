//! Isolation context tests
//!
//! Export/import/deny resolution through the manager, group order and
//! deferred failure of required symbols.

use modhost::module::isolation::GroupOwner;
use modhost::{ModuleError, ModuleId, ModuleState, Symbol};

use super::test_utils::*;

fn util_plugin() -> UnitBuilder {
    UnitBuilder::plugin("acme-util", "1.0.0")
        .attr("export-namespaces", "com.acme.util")
        .attr("export-resources", "META-INF/acme/*.xml")
        .types("acme-util/classes", &["com.acme.util.Strings", "com.acme.util.Secret"])
        .attr("x-ignored", "whatever")
}

#[tokio::test]
async fn test_import_sees_exporting_peer_before_shared_base() {
    let fixture = ModuleTestFixture::new(&[]);
    let kernel = &fixture.kernel;
    let a = kernel.install(&util_plugin().build()).unwrap();
    let b = kernel
        .install(
            &UnitBuilder::business("b", "1.0.0")
                .attr("import-namespaces", "com.acme.util")
                .types("b/classes", &["com.b.Main"])
                .build(),
        )
        .unwrap();

    let ctx = kernel.manager().isolation_context(&b).unwrap();
    let owners: Vec<_> = ctx.groups().iter().map(|g| g.owner().clone()).collect();
    assert_eq!(
        owners,
        vec![
            GroupOwner::SelfModule(b.clone()),
            GroupOwner::Peer(a.clone()),
            GroupOwner::SharedBase,
        ]
    );
    assert_eq!(
        ctx.code_path_order(),
        vec!["b/classes", "acme-util/classes", "runtime/base"]
    );

    let group = ctx
        .require(&Symbol::type_name("com.acme.util.Strings"))
        .unwrap();
    assert_eq!(group.peer(), Some(&a));
}

#[tokio::test]
async fn test_deny_omits_exporting_peer() {
    let fixture = ModuleTestFixture::new(&[]);
    let kernel = &fixture.kernel;
    kernel.install(&util_plugin().build()).unwrap();
    let c = kernel
        .install(
            &UnitBuilder::business("c", "1.0.0")
                .attr("import-namespaces", "com.acme.util")
                .attr("deny-import-namespaces", "com.acme.util")
                .build(),
        )
        .unwrap();

    let ctx = kernel.manager().isolation_context(&c).unwrap();
    assert_eq!(ctx.peers().count(), 0);
    let err = ctx
        .require(&Symbol::type_name("com.acme.util.Strings"))
        .unwrap_err();
    assert!(matches!(err, ModuleError::UnresolvedRequiredSymbol { .. }));
}

#[tokio::test]
async fn test_deny_of_single_type_beats_broad_import() {
    let fixture = ModuleTestFixture::new(&[]);
    let kernel = &fixture.kernel;
    kernel.install(&util_plugin().build()).unwrap();
    let app = kernel
        .install(
            &UnitBuilder::business("app", "1.0.0")
                .attr("import-namespaces", "com.acme.*")
                .attr("deny-import-types", "com.acme.util.Secret runtime.collections.List")
                .build(),
        )
        .unwrap();

    let ctx = kernel.manager().isolation_context(&app).unwrap();
    assert!(ctx.is_visible(&Symbol::type_name("com.acme.util.Strings")));
    assert!(!ctx.is_visible(&Symbol::type_name("com.acme.util.Secret")));
    assert!(ctx.is_visible(&Symbol::type_name("runtime.text.Str")));
    assert!(!ctx.is_visible(&Symbol::type_name("runtime.collections.List")));
}

#[tokio::test]
async fn test_resource_grant_pairs_export_and_import_globs() {
    let fixture = ModuleTestFixture::new(&[]);
    let kernel = &fixture.kernel;
    kernel
        .install(
            &util_plugin()
                .resources("acme-util/res", &["META-INF/acme/a.xml", "META-INF/acme/b.txt"])
                .build(),
        )
        .unwrap();
    let app = kernel
        .install(
            &UnitBuilder::business("app", "1.0.0")
                .attr("import-resources", "META-INF/**")
                .build(),
        )
        .unwrap();

    let ctx = kernel.manager().isolation_context(&app).unwrap();
    match ctx.groups()[1].visibility() {
        modhost::module::isolation::Visibility::Granted(grant) => {
            let pairs: Vec<(&str, &str)> = grant
                .resources()
                .iter()
                .map(|r| (r.export().as_str(), r.import().as_str()))
                .collect();
            assert_eq!(pairs, vec![("META-INF/acme/*.xml", "META-INF/**")]);
        }
        other => panic!("unexpected visibility {other:?}"),
    }
    assert!(ctx.is_visible(&Symbol::resource("META-INF/acme/a.xml")));
    assert!(!ctx.is_visible(&Symbol::resource("META-INF/acme/b.txt")));
}

#[tokio::test]
async fn test_crossing_resource_globs_resolve_through_peer() {
    let fixture = ModuleTestFixture::new(&[]);
    let kernel = &fixture.kernel;
    let plugin = kernel
        .install(
            &UnitBuilder::plugin("conf", "1.0.0")
                .attr("export-resources", "acme/*")
                .resources("conf/res", &["acme/conf.xml"])
                .build(),
        )
        .unwrap();
    let app = kernel
        .install(
            &UnitBuilder::business("app", "1.0.0")
                .attr("import-resources", "*/conf.xml")
                .build(),
        )
        .unwrap();

    let ctx = kernel.manager().isolation_context(&app).unwrap();
    let group = ctx.require(&Symbol::resource("acme/conf.xml")).unwrap();
    assert_eq!(group.peer(), Some(&plugin));
}

#[tokio::test]
async fn test_refresh_picks_up_later_plugin() {
    let fixture = ModuleTestFixture::new(&[]);
    let kernel = &fixture.kernel;
    let app = kernel
        .install(
            &UnitBuilder::business("app", "1.0.0")
                .attr("import-namespaces", "com.acme.util")
                .build(),
        )
        .unwrap();
    let before = kernel.manager().isolation_context(&app).unwrap();
    assert_eq!(before.peers().count(), 0);

    let util = kernel.install(&util_plugin().build()).unwrap();
    let after = kernel.manager().refresh(&app).await.unwrap();
    assert_eq!(after.peers().collect::<Vec<_>>(), vec![&util]);
    // the old snapshot is untouched
    assert_eq!(before.peers().count(), 0);
}

#[tokio::test]
async fn test_peer_groups_follow_priority_order() {
    let fixture = ModuleTestFixture::new(&[]);
    let kernel = &fixture.kernel;
    for (name, priority) in [("late", 900), ("early", 10), ("middle", 500)] {
        kernel
            .install(
                &UnitBuilder::plugin(name, "1.0.0")
                    .priority(priority)
                    .attr("export-namespaces", "com.shared")
                    .types(&format!("{name}/classes"), &["com.shared.Thing"])
                    .build(),
            )
            .unwrap();
    }
    let app = kernel
        .install(
            &UnitBuilder::business("app", "1.0.0")
                .attr("import-namespaces", "com.shared")
                .build(),
        )
        .unwrap();

    let ctx = kernel.manager().isolation_context(&app).unwrap();
    let peers: Vec<&str> = ctx.peers().map(|id| id.name.as_str()).collect();
    assert_eq!(peers, vec!["early", "middle", "late"]);

    // first group wins
    let group = ctx.resolve(&Symbol::type_name("com.shared.Thing")).unwrap();
    assert_eq!(group.peer(), Some(&ModuleId::plugin("early", "1.0.0")));

    let ordered: Vec<String> = kernel
        .manager()
        .ordered_peers()
        .iter()
        .map(|d| d.name().to_string())
        .collect();
    assert_eq!(ordered, vec!["early", "middle", "late"]);
    assert_eq!(kernel.manager().state(&app), Some(ModuleState::Resolved));
}

#[tokio::test]
async fn test_malformed_unit_never_registers() {
    let fixture = ModuleTestFixture::new(&[]);
    let report = fixture
        .kernel
        .deploy(&[
            UnitBuilder::plugin("ok", "1.0.0").shared(),
            UnitBuilder::plugin("bad", "not-a-version").shared(),
            std::sync::Arc::new(modhost::MemoryArchive::new("no-marker.unit"))
                as std::sync::Arc<dyn modhost::ModuleArchive>,
        ])
        .await;

    assert_eq!(report.registered, vec![ModuleId::plugin("ok", "1.0.0")]);
    assert_eq!(report.rejected.len(), 2);
    assert!(report
        .rejected
        .iter()
        .all(|(_, e)| matches!(e, ModuleError::MalformedDescriptor(_))));
}
