mod common;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use configraph::config::ImportConfig;
use configraph::logic::{
    bucket_dir_name, file_name_for, ClosureCollector, ExportEncoder, ImportDecoder,
};
use configraph::model::{
    ClosureSet, ConfigObject, ExportScope, Id, ImportOptions, NewProject, ObjectType, RefValue,
    SerializedObject,
};
use configraph::store::{
    LoggingReconciler, MemoryStore, ObjectStore, ProjectStore, ReplicationControl,
    ReplicationRole,
};
use serde_json::json;

use common::{build_fixture, Fixture};

fn full_scope(fx: &Fixture) -> ExportScope {
    ExportScope {
        systems: vec![fx.cards.clone(), fx.ledger.clone()],
        servers: vec![fx.gateway.clone()],
        call_chains: vec![fx.happy_path.clone(), fx.retry_loop.clone()],
        environments: vec![fx.staging.clone()],
        ..Default::default()
    }
}

fn quick_retry() -> ImportConfig {
    ImportConfig {
        project_retry_attempts: 3,
        project_retry_delay_ms: 1,
    }
}

async fn collect_ids(store: &MemoryStore, seeds: &[Id]) -> HashSet<Id> {
    let mut closure = ClosureSet::new();
    for seed in seeds {
        let object = store.get(seed).await.unwrap().unwrap();
        ClosureCollector::collect(store, &object, &mut closure)
            .await
            .unwrap();
    }
    closure.objects().map(|o| o.id.clone()).collect()
}

#[tokio::test]
async fn closure_terminates_on_mutual_cycles() {
    let store = MemoryStore::new();
    let fx = build_fixture(&store).await;

    let ids = collect_ids(&store, &[fx.happy_path.clone()]).await;

    // Both chains despite the mutual embedding, both situations despite the
    // mutual triggers, both systems through the template load directives.
    for expected in [
        &fx.happy_path,
        &fx.retry_loop,
        &fx.approved,
        &fx.settled,
        &fx.cards,
        &fx.ledger,
        &fx.cards_template,
        &fx.ledger_template,
        &fx.rule,
        &fx.authorize,
        &fx.cards_transport,
    ] {
        assert!(ids.contains(expected), "closure missing {}", expected);
    }
    // The out-of-scope system is only reachable through contextual server
    // bindings, which never drive closure membership.
    assert!(!ids.contains(&fx.offline));
    assert!(!ids.contains(&fx.gateway));
}

#[tokio::test]
async fn closure_is_independent_of_seed_order() {
    let store = MemoryStore::new();
    let fx = build_fixture(&store).await;

    let forward = collect_ids(&store, &[fx.cards.clone(), fx.happy_path.clone()]).await;
    let reverse = collect_ids(&store, &[fx.happy_path.clone(), fx.cards.clone()]).await;

    assert_eq!(forward, reverse);
}

#[tokio::test]
async fn textual_id_fallback_resolves_raw_template_ids() {
    let store = MemoryStore::new();
    let fx = build_fixture(&store).await;

    // A system whose only link to the rest of the graph is a load directive
    // carrying a raw id instead of a display name.
    let systems_root = fx.project.root_folders[&ObjectType::System].clone();
    let isolated = ConfigObject::new(ObjectType::System, fx.project.id.clone(), "isolated")
        .with_parent(systems_root);
    let raw_link = ConfigObject::new(ObjectType::Template, fx.project.id.clone(), "raw-link")
        .with_parent(isolated.id.clone())
        .with_attribute("body", json!(format!("#load(\"{}\")", fx.ledger_template)));
    let isolated = isolated.with_reference(
        "templates",
        RefValue::Many(vec![raw_link.id.clone()]),
    );
    store.insert(isolated.clone()).await.unwrap();
    store.insert(raw_link).await.unwrap();

    // No template is *named* like that id, so only the id fallback resolves.
    let ids = collect_ids(&store, &[isolated.id.clone()]).await;
    assert!(ids.contains(&fx.ledger_template));
    assert!(ids.contains(&fx.ledger), "owner of the loaded template must travel too");
}

#[tokio::test]
async fn folder_seeded_scope_exports_member_systems() {
    let store = MemoryStore::new();
    let fx = build_fixture(&store).await;
    let dir = tempfile::tempdir().unwrap();

    let scope = ExportScope {
        folders: vec![fx.core_folder.clone()],
        ..Default::default()
    };
    let report = ExportEncoder::encode(&store, &fx.project.id, &scope, dir.path())
        .await
        .unwrap();
    assert!(report.is_complete());

    // Both systems live under the folder, one through the nested Inner;
    // the folder and its sub-folder are written as depth-tagged stubs.
    assert_eq!(report.objects_written, 2);
    assert_eq!(report.folders_written, 2);
    let cards_file = dir
        .path()
        .join("objects")
        .join(bucket_dir_name(ObjectType::System))
        .join(file_name_for(&fx.cards));
    assert!(cards_file.exists());
}

#[tokio::test]
async fn export_prunes_out_of_scope_bindings() {
    let store = MemoryStore::new();
    let fx = build_fixture(&store).await;
    let dir = tempfile::tempdir().unwrap();

    let report = ExportEncoder::encode(&store, &fx.project.id, &full_scope(&fx), dir.path())
        .await
        .unwrap();
    assert!(report.is_complete());

    let server_file = dir
        .path()
        .join("objects")
        .join(bucket_dir_name(ObjectType::Server))
        .join(file_name_for(&fx.gateway));
    let raw = std::fs::read(&server_file).unwrap();
    let tree: SerializedObject = serde_json::from_slice(&raw).unwrap();

    assert_eq!(
        tree.object.references.get("outbound"),
        Some(&RefValue::Many(vec![fx.cards.clone()])),
        "outbound binding to the out-of-scope system must be dropped"
    );
    assert_eq!(
        tree.object.references.get("inbound"),
        Some(&RefValue::Many(vec![fx.cards_transport.clone()])),
        "inbound binding whose transport owner is out of scope must be dropped"
    );

    // The pruned binding must not have pulled the stale system in.
    let offline_file = dir
        .path()
        .join("objects")
        .join(bucket_dir_name(ObjectType::System))
        .join(file_name_for(&fx.offline));
    assert!(!offline_file.exists());
}

#[tokio::test]
async fn unresolvable_seeds_are_reported_not_fatal() {
    let store = MemoryStore::new();
    let fx = build_fixture(&store).await;
    let dir = tempfile::tempdir().unwrap();

    let mut scope = full_scope(&fx);
    scope.systems.push("no-such-system".to_string());

    let report = ExportEncoder::encode(&store, &fx.project.id, &scope, dir.path())
        .await
        .unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.skipped_seeds.len(), 1);
    assert_eq!(report.skipped_seeds[0].id, "no-such-system");
    // Everything resolvable was still written.
    assert_eq!(report.objects_written, 6);
    assert_eq!(report.folders_written, 2);
}

#[tokio::test]
async fn same_project_round_trip_preserves_identities() {
    let store = Arc::new(MemoryStore::new());
    let fx = build_fixture(&store).await;
    let dir = tempfile::tempdir().unwrap();

    ExportEncoder::encode(store.as_ref(), &fx.project.id, &full_scope(&fx), dir.path())
        .await
        .unwrap();

    // Drop the cards sub-tree, then replay the export into the same project.
    assert!(store.delete(&fx.cards).await.unwrap());
    assert!(store.get(&fx.approved).await.unwrap().is_none());

    let reconciler = Arc::new(LoggingReconciler::new());
    let outcome = ImportDecoder::import(
        store.clone(),
        reconciler,
        dir.path(),
        &ImportOptions {
            destination_project: fx.project.uuid.clone(),
            regenerate_ids: false,
        },
        &quick_retry(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.project_id, fx.project.id);

    // Identities are unchanged and the reference structure is intact.
    let cards = store.get(&fx.cards).await.unwrap().unwrap();
    assert_eq!(
        cards.references.get("templates"),
        Some(&RefValue::Many(vec![fx.cards_template.clone()]))
    );
    let approved = store.get(&fx.approved).await.unwrap().unwrap();
    assert_eq!(
        approved.references.get("on_success"),
        Some(&RefValue::One(fx.settled.clone()))
    );
    assert_eq!(
        approved.references.get("parse_rules"),
        Some(&RefValue::Many(vec![fx.rule.clone()]))
    );
    // The recreated system hangs off its original folder.
    assert_eq!(cards.parent, Some(fx.inner_folder.clone()));
}

#[tokio::test]
async fn cross_project_import_is_isomorphic_with_no_source_ids() {
    let store = Arc::new(MemoryStore::new());
    let fx = build_fixture(&store).await;
    let dir = tempfile::tempdir().unwrap();

    ExportEncoder::encode(store.as_ref(), &fx.project.id, &full_scope(&fx), dir.path())
        .await
        .unwrap();

    let project_b = store
        .create_project(NewProject {
            name: "destination".to_string(),
            uuid: Some("bbbbbbbb-0000-0000-0000-000000000002".to_string()),
        })
        .await
        .unwrap();

    let reconciler = Arc::new(LoggingReconciler::new());
    let outcome = ImportDecoder::import(
        store.clone(),
        reconciler.clone(),
        dir.path(),
        &ImportOptions {
            destination_project: project_b.uuid.clone(),
            regenerate_ids: false,
        },
        &quick_retry(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.project_id, project_b.id);
    assert_eq!(outcome.objects_imported, 16);
    assert_eq!(outcome.folders_imported, 2);
    assert_eq!(outcome.imported_roots.len(), 6);

    // No reference anywhere in the destination may point at a source id.
    let source_ids = collect_ids(&store, &[fx.cards.clone(), fx.happy_path.clone()]).await;
    for object_type in [
        ObjectType::System,
        ObjectType::Server,
        ObjectType::CallChain,
        ObjectType::Environment,
        ObjectType::Operation,
        ObjectType::Situation,
        ObjectType::Step,
        ObjectType::Template,
        ObjectType::ParsingRule,
    ] {
        for object in store.list_by_type(&project_b.id, object_type).await.unwrap() {
            for value in object.references.values() {
                for id in value.ids() {
                    assert!(
                        !source_ids.contains(id),
                        "{} '{}' still references source id {}",
                        object.object_type,
                        object.name,
                        id
                    );
                }
            }
        }
    }

    // Isomorphism spot checks through the induced mapping.
    let approved_b = store
        .find_by_name(&project_b.id, ObjectType::Situation, "approved")
        .await
        .unwrap()
        .unwrap();
    let settled_b = store
        .find_by_name(&project_b.id, ObjectType::Situation, "settled")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        approved_b.references.get("on_success"),
        Some(&RefValue::One(settled_b.id.clone()))
    );
    assert_eq!(
        settled_b.references.get("on_success"),
        Some(&RefValue::One(approved_b.id.clone()))
    );

    let rule_b = store
        .find_by_name(&project_b.id, ObjectType::ParsingRule, "amount-rule")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        approved_b.references.get("parse_rules"),
        Some(&RefValue::Many(vec![rule_b.id.clone()]))
    );

    // Folder hierarchy re-materialized with the same shape.
    let cards_b = store
        .find_by_name(&project_b.id, ObjectType::System, "cards-core")
        .await
        .unwrap()
        .unwrap();
    let inner_b = store.get(cards_b.parent.as_ref().unwrap()).await.unwrap().unwrap();
    assert_eq!(inner_b.name, "Inner");
    let core_b = store.get(inner_b.parent.as_ref().unwrap()).await.unwrap().unwrap();
    assert_eq!(core_b.name, "Core");
    assert_eq!(
        core_b.parent,
        Some(project_b.root_folders[&ObjectType::System].clone())
    );

    // Reconciliation notice arrives after the commit, asynchronously.
    let mut notices = reconciler.notices();
    for _ in 0..100 {
        if !notices.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        notices = reconciler.notices();
    }
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].0, project_b.id);
    assert_eq!(notices[0].1.len(), 6);
}

#[tokio::test]
async fn dangling_reference_aborts_and_rolls_back() {
    let store = Arc::new(MemoryStore::new());
    let fx = build_fixture(&store).await;
    let dir = tempfile::tempdir().unwrap();

    ExportEncoder::encode(store.as_ref(), &fx.project.id, &full_scope(&fx), dir.path())
        .await
        .unwrap();

    // Remove the server bucket: the environment still references the
    // gateway, which now resolves nowhere in the destination.
    std::fs::remove_dir_all(
        dir.path()
            .join("objects")
            .join(bucket_dir_name(ObjectType::Server)),
    )
    .unwrap();

    let project_b = store
        .create_project(NewProject {
            name: "destination".to_string(),
            uuid: Some("bbbbbbbb-0000-0000-0000-000000000003".to_string()),
        })
        .await
        .unwrap();

    let reconciler = Arc::new(LoggingReconciler::new());
    let err = ImportDecoder::import(
        store.clone(),
        reconciler.clone(),
        dir.path(),
        &ImportOptions {
            destination_project: project_b.uuid.clone(),
            regenerate_ids: false,
        },
        &quick_retry(),
    )
    .await
    .unwrap_err();

    let message = format!("{err:#}");
    assert!(message.contains("servers"), "unexpected error: {message}");

    // Earlier buckets were already replayed when the failure hit; the
    // controlling transaction must have taken all of it back.
    assert!(store
        .list_by_type(&project_b.id, ObjectType::System)
        .await
        .unwrap()
        .is_empty());
    // Only the provisioning-time root folders survive the rollback.
    assert_eq!(
        store
            .list_by_type(&project_b.id, ObjectType::Folder)
            .await
            .unwrap()
            .len(),
        4
    );
    // The bulk-load role never outlives the failed import.
    assert_eq!(
        store.replication_role().await.unwrap(),
        ReplicationRole::Primary
    );
    assert!(reconciler.notices().is_empty());
}

#[tokio::test]
async fn bounded_retry_exhaustion_is_a_reported_failure() {
    let store = Arc::new(MemoryStore::new());
    let fx = build_fixture(&store).await;
    let dir = tempfile::tempdir().unwrap();

    ExportEncoder::encode(store.as_ref(), &fx.project.id, &full_scope(&fx), dir.path())
        .await
        .unwrap();

    let reconciler = Arc::new(LoggingReconciler::new());
    let err = ImportDecoder::import(
        store.clone(),
        reconciler,
        dir.path(),
        &ImportOptions {
            destination_project: "never-provisioned".to_string(),
            regenerate_ids: false,
        },
        &quick_retry(),
    )
    .await
    .unwrap_err();

    let message = format!("{err:#}");
    assert!(
        message.contains("did not become visible after 3 attempts"),
        "unexpected error: {message}"
    );
}

#[tokio::test]
async fn repeated_export_is_idempotent_on_disk() {
    let store = MemoryStore::new();
    let fx = build_fixture(&store).await;
    let dir = tempfile::tempdir().unwrap();

    let first = ExportEncoder::encode(&store, &fx.project.id, &full_scope(&fx), dir.path())
        .await
        .unwrap();
    let second = ExportEncoder::encode(&store, &fx.project.id, &full_scope(&fx), dir.path())
        .await
        .unwrap();

    assert_eq!(first.objects_written, second.objects_written);

    fn count_files(dir: &Path) -> usize {
        let mut count = 0;
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                count += count_files(&path);
            } else {
                count += 1;
            }
        }
        count
    }
    // manifest + 2 folder stubs + 6 object files, not doubled.
    assert_eq!(count_files(dir.path()), 9);
}
