//! Human-readable rendering of a tree snapshot.
//!
//! The query string is a debugging view, not a serializer: operators print
//! with their schema label, `AND`/`OR` become `&&`/`||`, and incomplete rules
//! are skipped.
//!
//! ```rust
//! use querytree::format::query_string;
//! use querytree::ids::IdGenerator;
//! use querytree::schema::Schema;
//! use querytree::tree::{NodeSpec, Tree};
//!
//! let schema = Schema::from_yaml_str(r#"
//! types: { number: { operators: [equal] } }
//! fields: { num: { type: number } }
//! operators: { equal: { label: "==" } }
//! "#).unwrap();
//! let spec: NodeSpec = serde_json::from_str(r#"{"type": "group", "children1": [
//!   {"type": "rule", "properties": {"field": "num", "operator": "equal", "value": [1], "valueSrc": ["value"]}},
//!   {"type": "rule", "properties": {"field": "num", "operator": "equal", "value": [2], "valueSrc": ["value"]}}
//! ]}"#).unwrap();
//! let tree = Tree::from_spec(spec, &mut IdGenerator::from_seed(1)).unwrap();
//! assert_eq!(query_string(&tree, &schema).as_deref(), Some("(num == 1 && num == 2)"));
//! ```

use crate::schema::Schema;
use crate::tree::{Condition, Node, Properties, Tree};
use crate::value::{Value, ValueSrc};

/// Renders the whole tree, or `None` when nothing in it is complete.
pub fn query_string(tree: &Tree, schema: &Schema) -> Option<String> {
    render(tree, schema, tree.root())
}

fn render(tree: &Tree, schema: &Schema, node: &Node) -> Option<String> {
    match &node.properties {
        Properties::Rule(p) => {
            let rule = condition(schema, &p.condition)?;
            Some(negate(rule, p.not))
        }
        Properties::Group(p) => {
            let inner = children(tree, schema, node, p.conjunction.as_deref())?;
            Some(negate(inner, p.not))
        }
        Properties::RuleGroup(p) => {
            let field = p.condition.field.as_ref()?;
            let mut out = field.to_string();
            if let Some(inner) = joined(tree, schema, node, p.conjunction.as_deref()) {
                out.push_str(&format!(" HAVING ({inner})"));
            }
            if let Some(op) = &p.condition.operator {
                out.push(' ');
                out.push_str(&operand(schema, op, &p.condition)?);
            }
            Some(negate(out, p.not))
        }
        Properties::CaseGroup(p) => {
            let result = p.value.as_ref().map(Value::quoted).unwrap_or_else(|| "null".to_string());
            if node.children.is_none() {
                return Some(format!("ELSE {result}"));
            }
            let inner = children(tree, schema, node, p.conjunction.as_deref())?;
            Some(format!("WHEN {} THEN {result}", negate(inner, p.not)))
        }
        Properties::SwitchGroup(_) => {
            let cases: Vec<String> = tree
                .children(node)
                .into_iter()
                .filter_map(|c| render(tree, schema, c))
                .collect();
            if cases.is_empty() {
                return None;
            }
            Some(format!("CASE {} END", cases.join(" ")))
        }
    }
}

/// Children joined by the conjunction, parenthesised when more than one.
fn children(tree: &Tree, schema: &Schema, node: &Node, conjunction: Option<&str>) -> Option<String> {
    let parts = parts(tree, schema, node);
    match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => Some(format!("({})", parts.join(&separator(conjunction)))),
    }
}

fn joined(tree: &Tree, schema: &Schema, node: &Node, conjunction: Option<&str>) -> Option<String> {
    let parts = parts(tree, schema, node);
    (!parts.is_empty()).then(|| parts.join(&separator(conjunction)))
}

fn parts(tree: &Tree, schema: &Schema, node: &Node) -> Vec<String> {
    tree.children(node)
        .into_iter()
        .filter_map(|c| render(tree, schema, c))
        .collect()
}

fn separator(conjunction: Option<&str>) -> String {
    match conjunction.map(str::to_ascii_uppercase).as_deref() {
        Some("OR") => " || ".to_string(),
        Some("AND") | None => " && ".to_string(),
        Some(other) => format!(" {other} "),
    }
}

fn negate(inner: String, not: bool) -> String {
    match (not, inner.starts_with('(')) {
        (false, _) => inner,
        (true, true) => format!("!{inner}"),
        (true, false) => format!("!({inner})"),
    }
}

fn condition(schema: &Schema, cond: &Condition) -> Option<String> {
    let field = cond.field.as_ref()?;
    let op = cond.operator.as_deref()?;
    Some(format!("{field} {}", operand(schema, op, cond)?))
}

/// `label` followed by the values; `None` while a slot is still empty.
fn operand(schema: &Schema, op: &str, cond: &Condition) -> Option<String> {
    let config = schema.operator(op);
    let label = config.and_then(|c| c.label.as_deref()).unwrap_or(op);
    let cardinality = config.map(|c| c.cardinality).unwrap_or(1);
    if cardinality == 0 {
        return Some(label.to_string());
    }
    let mut values = Vec::with_capacity(cardinality);
    for i in 0..cardinality {
        let value = cond.value.get(i).cloned().flatten()?;
        let src = cond.value_src.get(i).copied().flatten();
        values.push(match src {
            Some(ValueSrc::Field) | Some(ValueSrc::Func) | Some(ValueSrc::Const) => value.to_string(),
            Some(ValueSrc::Value) | None => value.quoted(),
        });
    }
    Some(format!("{label} {}", values.join(" AND ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IdGenerator;
    use crate::tree::NodeSpec;

    fn schema() -> Schema {
        Schema::from_yaml_str(
            r#"
types:
  number: { operators: [equal, between, is_null] }
  "!group": { operators: [some] }
fields:
  num: { type: number }
  results:
    type: "!group"
    subfields: { score: { type: number } }
operators:
  equal: { label: "==" }
  between: { label: BETWEEN, cardinality: 2 }
  is_null: { label: IS NULL, cardinality: 0 }
  some: { label: SOME, cardinality: 0 }
"#,
        )
        .unwrap()
    }

    fn render_json(json: &str) -> Option<String> {
        let spec: NodeSpec = serde_json::from_str(json).unwrap();
        let tree = Tree::from_spec(spec, &mut IdGenerator::from_seed(9)).unwrap();
        query_string(&tree, &schema())
    }

    #[test]
    fn nested_groups_and_negation() {
        let out = render_json(
            r#"{"type": "group", "properties": {"conjunction": "OR"}, "children1": [
                {"type": "rule", "properties": {"field": "num", "operator": "equal", "value": [1], "valueSrc": ["value"]}},
                {"type": "group", "properties": {"not": true}, "children1": [
                    {"type": "rule", "properties": {"field": "num", "operator": "between", "value": [2, 3], "valueSrc": ["value", "value"]}},
                    {"type": "rule", "properties": {"field": "num", "operator": "is_null"}}
                ]}
            ]}"#,
        );
        assert_eq!(
            out.as_deref(),
            Some("(num == 1 || !(num BETWEEN 2 AND 3 && num IS NULL))")
        );
    }

    #[test]
    fn incomplete_rules_are_skipped() {
        let out = render_json(
            r#"{"type": "group", "children1": [
                {"type": "rule", "properties": {"field": "num", "operator": "equal", "value": [null]}},
                {"type": "rule", "properties": {"field": "num", "operator": "equal", "value": [4], "valueSrc": ["value"]}}
            ]}"#,
        );
        assert_eq!(out.as_deref(), Some("num == 4"));
        assert_eq!(render_json(r#"{"type": "group", "children1": []}"#), None);
    }

    #[test]
    fn rule_group_and_cases() {
        let out = render_json(
            r#"{"type": "switch_group", "children1": [
                {"type": "case_group", "properties": {"value": "big"}, "children1": [
                    {"type": "rule_group", "properties": {"field": "results", "operator": "some"}, "children1": [
                        {"type": "rule", "properties": {"field": "results.score", "operator": "equal", "value": [9], "valueSrc": ["value"]}}
                    ]}
                ]},
                {"type": "case_group", "properties": {"value": "small"}}
            ]}"#,
        );
        assert_eq!(
            out.as_deref(),
            Some(r#"CASE WHEN results HAVING (results.score == 9) SOME THEN "big" ELSE "small" END"#)
        );
    }
}
