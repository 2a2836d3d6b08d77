use configraph::model::{ConfigObject, Id, NewProject, ObjectType, Project, RefValue};
use configraph::store::{MemoryStore, ObjectStore, ProjectStore};
use serde_json::json;

/// Handles into the fixture graph, keyed by role rather than id so tests
/// read naturally.
pub struct Fixture {
    pub project: Project,
    pub core_folder: Id,
    pub inner_folder: Id,
    pub cards: Id,
    pub ledger: Id,
    pub offline: Id,
    pub cards_template: Id,
    pub ledger_template: Id,
    pub cards_transport: Id,
    pub offline_transport: Id,
    pub authorize: Id,
    pub rule: Id,
    pub approved: Id,
    pub settled: Id,
    pub happy_path: Id,
    pub retry_loop: Id,
    pub gateway: Id,
    pub staging: Id,
}

/// Build a project with a cyclic reference graph:
///
/// - `cards` and `ledger` systems whose templates load each other,
///   nested two folders deep;
/// - situations `approved`/`settled` triggering each other;
/// - call chains `happy-path`/`retry-loop` embedding each other;
/// - a `gateway` server bound to `cards` (in scope) and `offline`
///   (kept out of the usual export scope);
/// - a `staging` environment over systems and server.
pub async fn build_fixture(store: &MemoryStore) -> Fixture {
    let project = store
        .create_project(NewProject {
            name: "fixture".to_string(),
            uuid: Some("aaaaaaaa-0000-0000-0000-000000000001".to_string()),
        })
        .await
        .unwrap();

    let systems_root = project.root_folders[&ObjectType::System].clone();
    let servers_root = project.root_folders[&ObjectType::Server].clone();
    let chains_root = project.root_folders[&ObjectType::CallChain].clone();
    let environments_root = project.root_folders[&ObjectType::Environment].clone();

    let core_folder = ConfigObject::new(ObjectType::Folder, project.id.clone(), "Core")
        .with_parent(systems_root.clone());
    let inner_folder = ConfigObject::new(ObjectType::Folder, project.id.clone(), "Inner")
        .with_parent(core_folder.id.clone());
    store.insert(core_folder.clone()).await.unwrap();
    store.insert(inner_folder.clone()).await.unwrap();

    let cards = ConfigObject::new(ObjectType::System, project.id.clone(), "cards-core")
        .with_parent(inner_folder.id.clone());
    let ledger = ConfigObject::new(ObjectType::System, project.id.clone(), "ledger")
        .with_parent(core_folder.id.clone());
    let offline = ConfigObject::new(ObjectType::System, project.id.clone(), "offline-archive")
        .with_parent(systems_root.clone());

    let cards_template =
        ConfigObject::new(ObjectType::Template, project.id.clone(), "card-auth-request")
            .with_parent(cards.id.clone())
            .with_attribute("body", json!("auth {{pan}}\n#load(\"ledger-posting\")"));
    let ledger_template =
        ConfigObject::new(ObjectType::Template, project.id.clone(), "ledger-posting")
            .with_parent(ledger.id.clone())
            .with_attribute("body", json!("post {{amount}}\n#load(\"card-auth-request\")"));

    let cards = cards.with_reference(
        "templates",
        RefValue::Many(vec![cards_template.id.clone()]),
    );
    let ledger = ledger.with_reference(
        "templates",
        RefValue::Many(vec![ledger_template.id.clone()]),
    );

    let cards_transport =
        ConfigObject::new(ObjectType::Transport, project.id.clone(), "cards-http")
            .with_parent(cards.id.clone());
    let offline_transport =
        ConfigObject::new(ObjectType::Transport, project.id.clone(), "offline-ftp")
            .with_parent(offline.id.clone());

    let authorize = ConfigObject::new(ObjectType::Operation, project.id.clone(), "authorize")
        .with_parent(cards.id.clone())
        .with_reference("template", RefValue::One(cards_template.id.clone()));

    let rule = ConfigObject::new(ObjectType::ParsingRule, project.id.clone(), "amount-rule")
        .with_parent(cards.id.clone());

    let approved = ConfigObject::new(ObjectType::Situation, project.id.clone(), "approved")
        .with_parent(authorize.id.clone())
        .with_reference("receiver", RefValue::One(ledger.id.clone()))
        .with_reference("parse_rules", RefValue::Many(vec![rule.id.clone()]));
    let settled = ConfigObject::new(ObjectType::Situation, project.id.clone(), "settled")
        .with_parent(authorize.id.clone())
        .with_reference("receiver", RefValue::One(ledger.id.clone()))
        .with_reference("on_success", RefValue::One(approved.id.clone()));
    let approved = approved.with_reference("on_success", RefValue::One(settled.id.clone()));

    let happy_path = ConfigObject::new(ObjectType::CallChain, project.id.clone(), "happy-path")
        .with_parent(chains_root.clone());
    let retry_loop = ConfigObject::new(ObjectType::CallChain, project.id.clone(), "retry-loop")
        .with_parent(chains_root.clone());

    let step_authorize = ConfigObject::new(ObjectType::Step, project.id.clone(), "authorize")
        .with_parent(happy_path.id.clone())
        .with_reference("situation", RefValue::One(approved.id.clone()));
    let step_retry = ConfigObject::new(ObjectType::Step, project.id.clone(), "retry")
        .with_parent(happy_path.id.clone())
        .with_reference("chain", RefValue::One(retry_loop.id.clone()));
    let step_back = ConfigObject::new(ObjectType::Step, project.id.clone(), "back-to-happy")
        .with_parent(retry_loop.id.clone())
        .with_reference("chain", RefValue::One(happy_path.id.clone()));

    let gateway = ConfigObject::new(ObjectType::Server, project.id.clone(), "gateway-1")
        .with_parent(servers_root.clone())
        .with_reference(
            "outbound",
            RefValue::Many(vec![cards.id.clone(), offline.id.clone()]),
        )
        .with_reference(
            "inbound",
            RefValue::Many(vec![
                cards_transport.id.clone(),
                offline_transport.id.clone(),
            ]),
        );

    let staging = ConfigObject::new(ObjectType::Environment, project.id.clone(), "staging")
        .with_parent(environments_root.clone())
        .with_reference(
            "systems",
            RefValue::Many(vec![cards.id.clone(), ledger.id.clone()]),
        )
        .with_reference("servers", RefValue::Many(vec![gateway.id.clone()]));

    for object in [
        cards.clone(),
        ledger.clone(),
        offline.clone(),
        cards_template.clone(),
        ledger_template.clone(),
        cards_transport.clone(),
        offline_transport.clone(),
        authorize.clone(),
        rule.clone(),
        approved.clone(),
        settled.clone(),
        happy_path.clone(),
        retry_loop.clone(),
        step_authorize,
        step_retry,
        step_back,
        gateway.clone(),
        staging.clone(),
    ] {
        store.insert(object).await.unwrap();
    }

    Fixture {
        project,
        core_folder: core_folder.id,
        inner_folder: inner_folder.id,
        cards: cards.id,
        ledger: ledger.id,
        offline: offline.id,
        cards_template: cards_template.id,
        ledger_template: ledger_template.id,
        cards_transport: cards_transport.id,
        offline_transport: offline_transport.id,
        authorize: authorize.id,
        rule: rule.id,
        approved: approved.id,
        settled: settled.id,
        happy_path: happy_path.id,
        retry_loop: retry_loop.id,
        gateway: gateway.id,
        staging: staging.id,
    }
}
