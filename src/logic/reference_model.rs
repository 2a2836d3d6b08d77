use crate::model::{ConfigObject, Id, ObjectType};
use crate::store::traits::Store;
use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

/// Whether a reference pulls its target into a closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// The target must travel with the owner; the closure collector
    /// recurses into it.
    Strong,
    /// Followed only by downstream passes (export pruning, copy/move
    /// fix-ups, import rewrite); never drives closure membership.
    Contextual,
}

/// Static descriptor of one reference field.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceSpec {
    pub field: &'static str,
    pub target: ObjectType,
    pub kind: RefKind,
}

const fn strong(field: &'static str, target: ObjectType) -> ReferenceSpec {
    ReferenceSpec {
        field,
        target,
        kind: RefKind::Strong,
    }
}

const fn contextual(field: &'static str, target: ObjectType) -> ReferenceSpec {
    ReferenceSpec {
        field,
        target,
        kind: RefKind::Contextual,
    }
}

const SYSTEM_REFS: &[ReferenceSpec] = &[strong("templates", ObjectType::Template)];
const OPERATION_REFS: &[ReferenceSpec] = &[strong("template", ObjectType::Template)];
const SITUATION_REFS: &[ReferenceSpec] = &[
    strong("receiver", ObjectType::System),
    strong("on_success", ObjectType::Situation),
    strong("on_fail", ObjectType::Situation),
    contextual("parse_rules", ObjectType::ParsingRule),
];
const STEP_REFS: &[ReferenceSpec] = &[
    strong("chain", ObjectType::CallChain),
    strong("situation", ObjectType::Situation),
];
const ENVIRONMENT_REFS: &[ReferenceSpec] = &[
    strong("systems", ObjectType::System),
    strong("servers", ObjectType::Server),
];
const SERVER_REFS: &[ReferenceSpec] = &[
    contextual("outbound", ObjectType::System),
    contextual("inbound", ObjectType::Transport),
];

/// Closed enumeration of reference fields per entity type. This replaces the
/// reflective attribute scanning of older backends: the reference graph is
/// statically known and every rewrite pass iterates exactly this table.
pub fn reference_specs(object_type: ObjectType) -> &'static [ReferenceSpec] {
    match object_type {
        ObjectType::System => SYSTEM_REFS,
        ObjectType::Operation => OPERATION_REFS,
        ObjectType::Situation => SITUATION_REFS,
        ObjectType::Step => STEP_REFS,
        ObjectType::Environment => ENVIRONMENT_REFS,
        ObjectType::Server => SERVER_REFS,
        ObjectType::ProjectSettings
        | ObjectType::IntegrationConfig
        | ObjectType::Template
        | ObjectType::Transport
        | ObjectType::ParsingRule
        | ObjectType::CallChain
        | ObjectType::Folder => &[],
    }
}

/// Attribute key that may embed textual load directives.
pub const BODY_ATTRIBUTE: &str = "body";

/// A reference extracted from free text rather than a declared field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextualRef {
    pub target: ObjectType,
    /// Name or raw id; resolution precedence is name+project first, id as
    /// fallback.
    pub identifier: String,
}

fn load_directive_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"#load(_system)?\(\s*"([^"]+)"\s*\)"#).expect("load directive pattern")
    })
}

/// Extract embedded load directives from a template body.
///
/// `#load("x")` references another template, `#load_system("x")` a system;
/// `x` may be a display name or a raw id.
pub fn textual_references(text: &str) -> Vec<TextualRef> {
    load_directive_pattern()
        .captures_iter(text)
        .map(|caps| TextualRef {
            target: if caps.get(1).is_some() {
                ObjectType::System
            } else {
                ObjectType::Template
            },
            identifier: caps[2].to_string(),
        })
        .collect()
}

/// Resolve a textual reference: name+project lookup first, raw id second.
/// Returns `None` when neither resolves; callers log and skip, never fail.
pub async fn resolve_textual<S: Store>(
    store: &S,
    project_id: &Id,
    textual: &TextualRef,
) -> Result<Option<ConfigObject>> {
    if let Some(found) = store
        .find_by_name(project_id, textual.target, &textual.identifier)
        .await?
    {
        return Ok(Some(found));
    }
    match store.get(&textual.identifier).await? {
        Some(found) if found.object_type == textual.target => Ok(Some(found)),
        _ => Ok(None),
    }
}

/// Strong reference target ids of one object, in declared field order.
pub fn strong_reference_ids(object: &ConfigObject) -> Vec<Id> {
    let mut out = Vec::new();
    for spec in reference_specs(object.object_type) {
        if spec.kind != RefKind::Strong {
            continue;
        }
        if let Some(value) = object.references.get(spec.field) {
            out.extend(value.ids().into_iter().cloned());
        }
    }
    out
}

/// All declared reference field names of one object's type, strong and
/// contextual; the import rewrite pass iterates exactly these.
pub fn reference_fields(object_type: ObjectType) -> impl Iterator<Item = &'static str> {
    reference_specs(object_type).iter().map(|spec| spec.field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RefValue;

    #[test]
    fn extracts_template_and_system_directives() {
        let body = r#"
            header
            #load("Auth Header")
            #load_system( "cards-core" )
            #load("7f9c-aa01")
        "#;
        let refs = textual_references(body);
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].target, ObjectType::Template);
        assert_eq!(refs[0].identifier, "Auth Header");
        assert_eq!(refs[1].target, ObjectType::System);
        assert_eq!(refs[1].identifier, "cards-core");
        assert_eq!(refs[2].identifier, "7f9c-aa01");
    }

    #[test]
    fn plain_text_has_no_references() {
        assert!(textual_references("no directives here, load(\"x\")").is_empty());
    }

    #[test]
    fn every_type_yields_a_static_table() {
        assert!(reference_specs(ObjectType::Server)
            .iter()
            .all(|s| s.kind == RefKind::Contextual));
        assert_eq!(reference_specs(ObjectType::Situation).len(), 4);
        assert!(reference_specs(ObjectType::Folder).is_empty());
    }

    #[test]
    fn situation_strong_refs_exclude_parse_rules() {
        let situation = ConfigObject::new(ObjectType::Situation, "p1".into(), "sit")
            .with_reference("receiver", RefValue::One("sys-1".into()))
            .with_reference("parse_rules", RefValue::Many(vec!["rule-1".into()]));
        let ids = strong_reference_ids(&situation);
        assert_eq!(ids, vec!["sys-1".to_string()]);
    }
}
