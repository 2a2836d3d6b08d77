use crate::model::{ConfigObject, NewProject, ObjectType, Project, RefValue};
use crate::store::traits::Store;
use anyhow::{anyhow, Result};
use serde_json::json;

/// Provision a small demo project: two systems that exchange messages, a
/// call chain exercising them, a server bound to one of them and an
/// environment tying everything together. Used by the dev server and as a
/// quick smoke fixture.
pub async fn seed_demo_project<S: Store>(store: &S) -> Result<Project> {
    let project = store
        .create_project(NewProject {
            name: "payments-demo".to_string(),
            uuid: Some("6f2fb05e-2f62-4d41-9439-d6f1b2f1a001".to_string()),
        })
        .await?;

    let systems_root = root_of(&project, ObjectType::System)?;
    let servers_root = root_of(&project, ObjectType::Server)?;
    let chains_root = root_of(&project, ObjectType::CallChain)?;
    let environments_root = root_of(&project, ObjectType::Environment)?;

    // Folder layer under the systems root.
    let core_folder = ConfigObject::new(ObjectType::Folder, project.id.clone(), "Core")
        .with_parent(systems_root.clone());
    store.insert(core_folder.clone()).await?;

    // Two systems referencing each other's templates through load
    // directives, the cycle the closure collector has to survive.
    let cards = ConfigObject::new(ObjectType::System, project.id.clone(), "cards-core")
        .with_parent(core_folder.id.clone());
    let ledger = ConfigObject::new(ObjectType::System, project.id.clone(), "ledger")
        .with_parent(core_folder.id.clone());

    let cards_template =
        ConfigObject::new(ObjectType::Template, project.id.clone(), "card-auth-request")
            .with_parent(cards.id.clone())
            .with_attribute(
                "body",
                json!("auth {{pan}}\n#load(\"ledger-posting\")"),
            );
    let ledger_template =
        ConfigObject::new(ObjectType::Template, project.id.clone(), "ledger-posting")
            .with_parent(ledger.id.clone())
            .with_attribute(
                "body",
                json!("post {{amount}}\n#load(\"card-auth-request\")"),
            );

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
            .with_parent(cards.id.clone())
            .with_attribute("endpoint", json!("http://cards.internal/api"));

    let authorize = ConfigObject::new(ObjectType::Operation, project.id.clone(), "authorize")
        .with_parent(cards.id.clone())
        .with_reference("template", RefValue::One(cards_template.id.clone()));

    let rule = ConfigObject::new(ObjectType::ParsingRule, project.id.clone(), "amount-rule")
        .with_parent(cards.id.clone())
        .with_attribute("expression", json!("$.amount"));

    // Mutually triggering situations.
    let approved = ConfigObject::new(ObjectType::Situation, project.id.clone(), "approved")
        .with_parent(authorize.id.clone())
        .with_reference("receiver", RefValue::One(ledger.id.clone()))
        .with_reference("parse_rules", RefValue::Many(vec![rule.id.clone()]));
    let settled = ConfigObject::new(ObjectType::Situation, project.id.clone(), "settled")
        .with_parent(authorize.id.clone())
        .with_reference("receiver", RefValue::One(ledger.id.clone()))
        .with_reference("on_success", RefValue::One(approved.id.clone()));
    let approved = approved.with_reference("on_success", RefValue::One(settled.id.clone()));

    store.insert(cards.clone()).await?;
    store.insert(ledger.clone()).await?;
    store.insert(cards_template).await?;
    store.insert(ledger_template).await?;
    store.insert(cards_transport.clone()).await?;
    store.insert(authorize.clone()).await?;
    store.insert(rule).await?;
    store.insert(approved.clone()).await?;
    store.insert(settled).await?;

    // Two call chains embedding each other.
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

    store.insert(happy_path.clone()).await?;
    store.insert(retry_loop).await?;
    store.insert(step_authorize).await?;
    store.insert(step_retry).await?;
    store.insert(step_back).await?;

    let gateway = ConfigObject::new(ObjectType::Server, project.id.clone(), "gateway-1")
        .with_parent(servers_root.clone())
        .with_reference("outbound", RefValue::Many(vec![cards.id.clone()]))
        .with_reference("inbound", RefValue::Many(vec![cards_transport.id.clone()]));
    store.insert(gateway.clone()).await?;

    let staging = ConfigObject::new(ObjectType::Environment, project.id.clone(), "staging")
        .with_parent(environments_root.clone())
        .with_reference(
            "systems",
            RefValue::Many(vec![cards.id.clone(), ledger.id.clone()]),
        )
        .with_reference("servers", RefValue::Many(vec![gateway.id.clone()]));
    store.insert(staging).await?;

    log::info!("seeded demo project '{}' ({})", project.name, project.id);
    Ok(project)
}

fn root_of(project: &Project, kind: ObjectType) -> Result<crate::model::Id> {
    project
        .root_folders
        .get(&kind)
        .cloned()
        .ok_or_else(|| anyhow!("project has no {} root folder", kind))
}
