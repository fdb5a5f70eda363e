//! The nested external form of a tree (`type`, `id`, `properties`, `children1`).
//!
//! Used to rehydrate trees (SET_TREE), to pass explicit children to add
//! commands, and to export a snapshot for serializers and the CLI.

use im::Vector;
use serde::{Deserialize, Serialize};

use crate::diagnostics::QueryError;
use crate::err_msg;
use crate::ids::{IdGenerator, NodeId};
use crate::tree::{
    fix_paths, CaseGroupProperties, GroupProperties, Node, NodeType, Path, Properties,
    RuleGroupProperties, RuleProperties, Tree,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeSpec {
    Rule {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<NodeId>,
        #[serde(default)]
        properties: RuleProperties,
    },
    RuleGroup {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<NodeId>,
        #[serde(default)]
        properties: RuleGroupProperties,
        #[serde(default, rename = "children1", skip_serializing_if = "Option::is_none")]
        children: Option<Vec<NodeSpec>>,
    },
    Group {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<NodeId>,
        #[serde(default)]
        properties: GroupProperties,
        #[serde(default, rename = "children1", skip_serializing_if = "Option::is_none")]
        children: Option<Vec<NodeSpec>>,
    },
    CaseGroup {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<NodeId>,
        #[serde(default)]
        properties: CaseGroupProperties,
        #[serde(default, rename = "children1", skip_serializing_if = "Option::is_none")]
        children: Option<Vec<NodeSpec>>,
    },
    SwitchGroup {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<NodeId>,
        #[serde(default)]
        properties: GroupProperties,
        #[serde(default, rename = "children1", skip_serializing_if = "Option::is_none")]
        children: Option<Vec<NodeSpec>>,
    },
}

impl NodeSpec {
    /// Builds a spec whose variant follows the properties' node type.
    pub fn from_parts(
        id: Option<NodeId>,
        properties: Properties,
        children: Option<Vec<NodeSpec>>,
    ) -> Self {
        match properties {
            Properties::Rule(properties) => NodeSpec::Rule { id, properties },
            Properties::RuleGroup(properties) => NodeSpec::RuleGroup {
                id,
                properties,
                children,
            },
            Properties::Group(properties) => NodeSpec::Group {
                id,
                properties,
                children,
            },
            Properties::CaseGroup(properties) => NodeSpec::CaseGroup {
                id,
                properties,
                children,
            },
            Properties::SwitchGroup(properties) => NodeSpec::SwitchGroup {
                id,
                properties,
                children,
            },
        }
    }

    pub fn into_parts(self) -> (Option<NodeId>, Properties, Option<Vec<NodeSpec>>) {
        match self {
            NodeSpec::Rule { id, properties } => (id, Properties::Rule(properties), None),
            NodeSpec::RuleGroup {
                id,
                properties,
                children,
            } => (id, Properties::RuleGroup(properties), children),
            NodeSpec::Group {
                id,
                properties,
                children,
            } => (id, Properties::Group(properties), children),
            NodeSpec::CaseGroup {
                id,
                properties,
                children,
            } => (id, Properties::CaseGroup(properties), children),
            NodeSpec::SwitchGroup {
                id,
                properties,
                children,
            } => (id, Properties::SwitchGroup(properties), children),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            NodeSpec::Rule { .. } => NodeType::Rule,
            NodeSpec::RuleGroup { .. } => NodeType::RuleGroup,
            NodeSpec::Group { .. } => NodeType::Group,
            NodeSpec::CaseGroup { .. } => NodeType::CaseGroup,
            NodeSpec::SwitchGroup { .. } => NodeType::SwitchGroup,
        }
    }

    pub fn id(&self) -> Option<&NodeId> {
        match self {
            NodeSpec::Rule { id, .. }
            | NodeSpec::RuleGroup { id, .. }
            | NodeSpec::Group { id, .. }
            | NodeSpec::CaseGroup { id, .. }
            | NodeSpec::SwitchGroup { id, .. } => id.as_ref(),
        }
    }

    pub fn children(&self) -> Option<&[NodeSpec]> {
        match self {
            NodeSpec::Rule { .. } => None,
            NodeSpec::RuleGroup { children, .. }
            | NodeSpec::Group { children, .. }
            | NodeSpec::CaseGroup { children, .. }
            | NodeSpec::SwitchGroup { children, .. } => children.as_deref(),
        }
    }
}

/// Inserts `spec` and its descendants into the arena without attaching it to
/// a parent. Missing or already-taken child ids are replaced by fresh ones.
pub(crate) fn materialize(tree: &mut Tree, spec: NodeSpec, id: NodeId, ids: &mut IdGenerator) {
    let (_, properties, children) = spec.into_parts();
    let node_type = properties.node_type();

    let mut child_ids = Vector::new();
    for child in children.iter().flatten() {
        let child_id = match child.id() {
            Some(cid) if !tree.contains(cid) && cid != &id => cid.clone(),
            Some(cid) => {
                tracing::warn!(id = %cid, "duplicate node id, assigning a fresh one");
                ids.fresh_for(tree)
            }
            None => ids.fresh_for(tree),
        };
        // Reserve the id before descending so siblings cannot take it.
        tree.put(Node {
            id: child_id.clone(),
            path: Path::root(),
            properties: Properties::Rule(RuleProperties::default()),
            children: None,
        });
        child_ids.push_back(child_id);
    }

    let kids = match (node_type, children.is_some()) {
        (NodeType::Rule, _) => None,
        (NodeType::CaseGroup, false) => None,
        _ => Some(child_ids.clone()),
    };
    tree.put(Node {
        id,
        path: Path::root(),
        properties,
        children: kids,
    });

    if node_type == NodeType::Rule {
        return;
    }
    for (child, child_id) in children.into_iter().flatten().zip(child_ids) {
        materialize(tree, child, child_id, ids);
    }
}

impl Tree {
    /// Builds an arena tree from its nested form. The root must be a `group`
    /// or the reserved `switch_group`.
    pub fn from_spec(spec: NodeSpec, ids: &mut IdGenerator) -> Result<Tree, QueryError> {
        let node_type = spec.node_type();
        if !matches!(node_type, NodeType::Group | NodeType::SwitchGroup) {
            return Err(err_msg!(
                InvalidTree,
                "root must be a group or switch_group, got {}",
                node_type
            ));
        }
        let root_id = spec.id().cloned().unwrap_or_else(|| ids.next_id());
        let mut tree = Tree::new(root_id.clone(), Properties::defaults(node_type, &Default::default()));
        materialize(&mut tree, spec, root_id, ids);
        Ok(fix_paths(&tree))
    }

    /// Exports the subtree rooted at `id` in nested form.
    pub fn spec_of(&self, id: &NodeId) -> Option<NodeSpec> {
        let node = self.node(id)?;
        let children = node.children.as_ref().map(|kids| {
            kids.iter()
                .filter_map(|kid| self.spec_of(kid))
                .collect::<Vec<_>>()
        });
        Some(NodeSpec::from_parts(
            Some(node.id.clone()),
            node.properties.clone(),
            children,
        ))
    }

    pub fn to_spec(&self) -> NodeSpec {
        NodeSpec::from_parts(
            Some(self.root_id().clone()),
            self.root().properties.clone(),
            Some(
                self.root()
                    .child_ids()
                    .filter_map(|kid| self.spec_of(kid))
                    .collect(),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED: &str = r#"{
        "type": "group", "id": "root",
        "children1": [
            {"type": "rule", "id": "r1", "properties": {"field": "num", "operator": "equal", "value": [1], "valueSrc": ["value"]}},
            {"type": "group", "id": "g1", "properties": {"conjunction": "OR"}, "children1": [
                {"type": "rule", "id": "r2"},
                {"type": "rule", "id": "r1"}
            ]}
        ]
    }"#;

    #[test]
    fn rehydrates_and_replaces_duplicate_ids() {
        let spec: NodeSpec = serde_json::from_str(NESTED).unwrap();
        let mut ids = IdGenerator::from_seed(1);
        let tree = Tree::from_spec(spec, &mut ids).unwrap();
        assert_eq!(tree.len(), 5);

        let group = tree.node(&"g1".into()).unwrap();
        let kids: Vec<_> = group.child_ids().cloned().collect();
        assert_eq!(kids[0], NodeId::from("r2"));
        assert_ne!(kids[1], NodeId::from("r1"));
        assert_eq!(group.properties.conjunction(), Some("OR"));
    }

    #[test]
    fn export_preserves_order_and_properties() {
        let spec: NodeSpec = serde_json::from_str(NESTED).unwrap();
        let tree = Tree::from_spec(spec, &mut IdGenerator::from_seed(1)).unwrap();
        let exported = tree.to_spec();
        let children = exported.children().unwrap();
        assert_eq!(children[0].id(), Some(&NodeId::from("r1")));
        assert_eq!(children[1].node_type(), NodeType::Group);
        let NodeSpec::Rule { properties, .. } = &children[0] else {
            panic!("expected a rule");
        };
        assert_eq!(properties.condition.operator.as_deref(), Some("equal"));
    }

    #[test]
    fn rule_root_is_rejected() {
        let spec = NodeSpec::Rule {
            id: None,
            properties: RuleProperties::default(),
        };
        assert!(Tree::from_spec(spec, &mut IdGenerator::from_seed(1)).is_err());
    }
}
