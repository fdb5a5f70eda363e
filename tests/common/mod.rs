//! Shared fixtures for the querytree integration tests.
#![allow(dead_code)]

use querytree::format::query_string;
use querytree::ids::IdGenerator;
use querytree::schema::{OperatorConfig, Schema};
use querytree::tree::{Condition, NodeSpec, Path, Tree};

/// A schema covering plain fields, a select field, a `!group` field and two
/// functions.
pub const SCHEMA: &str = r#"
settings:
  showErrorMessage: false
  canLeaveEmptyGroup: false
types:
  number: { operators: [equal, between, is_null], defaultOperator: equal }
  text: { operators: [equal, like, is_null], defaultOperator: equal }
  select: { operators: [select_equals] }
fields:
  num: { type: number, fieldSettings: { min: 0, max: 100 } }
  str: { type: text }
  color:
    type: select
    fieldSettings:
      listValues: [{ value: red }, { value: green }]
  results:
    type: "!group"
    mode: some
    operators: [some, all]
    maxNumberOfRules: 2
    subfields:
      score: { type: number }
operators:
  equal: { label: "==" }
  like: { label: Like }
  select_equals: { label: "==" }
  is_null: { label: IS NULL, cardinality: 0 }
  between: { label: BETWEEN, cardinality: 2, isRange: true }
  some: { label: SOME, cardinality: 0 }
  all: { label: ALL, cardinality: 0 }
funcs:
  LOWER:
    returnType: text
    args: [{ key: str, label: String, type: text }]
  UPPER:
    returnType: text
    args: [{ key: str, label: String, type: text }]
"#;

pub fn schema() -> Schema {
    Schema::from_yaml_str(SCHEMA).unwrap()
}

/// The shared schema with its settings edited by `f`.
pub fn schema_with(f: impl FnOnce(&mut Schema)) -> Schema {
    let mut schema = schema();
    f(&mut schema);
    schema
}

/// The shared schema where `results` is a stand-alone `COUNT` condition
/// that starts with an empty where.
pub fn count_schema() -> Schema {
    schema_with(|s| {
        let results = s.fields.get_mut("results").unwrap();
        results.initial_empty_where = true;
        results.operators = Some(vec!["count".into()]);
        s.operators.insert(
            "count".into(),
            OperatorConfig {
                label: Some("COUNT".into()),
                ..OperatorConfig::default()
            },
        );
    })
}

pub fn ids() -> IdGenerator {
    IdGenerator::from_seed(42)
}

pub fn tree(json: &str) -> Tree {
    let spec: NodeSpec = serde_json::from_str(json).unwrap();
    Tree::from_spec(spec, &mut ids()).unwrap()
}

pub fn path(ids: &[&str]) -> Path {
    ids.iter().collect()
}

/// A complete `num == value` rule in the nested JSON form.
pub fn num_rule(id: &str, value: i64) -> String {
    format!(
        r#"{{"type": "rule", "id": "{id}", "properties": {{"field": "num", "fieldSrc": "field", "operator": "equal", "value": [{value}], "valueSrc": ["value"], "valueType": ["number"]}}}}"#
    )
}

pub fn group(id: &str, conjunction: &str, children: &[String]) -> String {
    format!(
        r#"{{"type": "group", "id": "{id}", "properties": {{"conjunction": "{conjunction}"}}, "children1": [{}]}}"#,
        children.join(", ")
    )
}

pub fn query(tree: &Tree, schema: &Schema) -> String {
    query_string(tree, schema).unwrap_or_default()
}

pub fn condition<'t>(tree: &'t Tree, at: &Path) -> &'t Condition {
    tree.resolve(at)
        .and_then(|n| n.properties.condition())
        .unwrap()
}

/// Every node reachable from the root, checked against its cached path.
pub fn assert_consistent(tree: &Tree) {
    let mut seen = std::collections::HashSet::new();
    for id in tree.subtree_ids(tree.root_id()) {
        assert!(seen.insert(id.clone()), "duplicate id {id}");
        let node = tree.node(&id).unwrap();
        assert_eq!(tree.resolve(&node.path).map(|n| &n.id), Some(&id));
    }
    assert_eq!(seen.len(), tree.len(), "unreachable nodes left in the arena");
}
