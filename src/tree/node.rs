//! Node variants and their per-type property bags.

use std::fmt;

use im::{OrdMap, Vector};
use serde::{Deserialize, Serialize};

use crate::ids::NodeId;
use crate::schema::{GroupMode, Schema};
use crate::tree::Path;
use crate::value::{FieldRef, FieldSrc, Value, ValueSrc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Rule,
    RuleGroup,
    Group,
    CaseGroup,
    /// Reserved root type of ternary trees; never created by a command.
    SwitchGroup,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Rule => "rule",
            NodeType::RuleGroup => "rule_group",
            NodeType::Group => "group",
            NodeType::CaseGroup => "case_group",
            NodeType::SwitchGroup => "switch_group",
        }
    }

    pub fn is_group_like(&self) -> bool {
        !matches!(self, NodeType::Rule)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GroupProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conjunction: Option<String>,
    pub not: bool,
    pub is_locked: bool,
}

/// The field/operator/value triple shared by rules and rule-groups.
///
/// `value`, `value_src` and `value_type` are parallel arrays sized to the
/// operator's cardinality once a value has been touched; `value_error` has
/// one extra trailing slot for a whole-range error when cardinality >= 2.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Condition {
    pub field: Option<FieldRef>,
    pub field_src: Option<FieldSrc>,
    /// Type remembered across a field-source switch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_error: Option<String>,
    pub operator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_options: Option<OrdMap<String, Value>>,
    pub value: Vector<Option<Value>>,
    pub value_src: Vector<Option<ValueSrc>>,
    pub value_type: Vector<Option<String>>,
    #[serde(skip_serializing_if = "Vector::is_empty")]
    pub value_error: Vector<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub async_list_values: Option<Vec<Value>>,
}

impl Condition {
    /// Properties of a freshly added rule.
    pub fn empty_rule() -> Self {
        Self {
            field_src: Some(FieldSrc::Field),
            ..Self::default()
        }
    }

    pub fn has_any_value(&self) -> bool {
        self.value.iter().any(Option::is_some)
    }

    /// Nothing worth keeping: no field, no remembered type, no value.
    pub fn is_empty(&self) -> bool {
        self.field.is_none() && self.field_type.is_none() && !self.has_any_value()
    }

    /// Makes sure every parallel array has at least `len` slots.
    pub fn ensure_slots(&mut self, len: usize) {
        while self.value.len() < len {
            self.value.push_back(None);
        }
        while self.value_src.len() < len {
            self.value_src.push_back(None);
        }
        while self.value_type.len() < len {
            self.value_type.push_back(None);
        }
        while self.value_error.len() < len {
            self.value_error.push_back(None);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuleProperties {
    #[serde(flatten)]
    pub condition: Condition,
    pub not: bool,
    pub is_locked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuleGroupProperties {
    #[serde(flatten)]
    pub condition: Condition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conjunction: Option<String>,
    pub not: bool,
    pub is_locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<GroupMode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaseGroupProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conjunction: Option<String>,
    pub not: bool,
    pub is_locked: bool,
    /// Result of the branch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Per-type property bag.
#[derive(Debug, Clone, PartialEq)]
pub enum Properties {
    Rule(RuleProperties),
    RuleGroup(RuleGroupProperties),
    Group(GroupProperties),
    CaseGroup(CaseGroupProperties),
    SwitchGroup(GroupProperties),
}

impl Properties {
    pub fn node_type(&self) -> NodeType {
        match self {
            Properties::Rule(_) => NodeType::Rule,
            Properties::RuleGroup(_) => NodeType::RuleGroup,
            Properties::Group(_) => NodeType::Group,
            Properties::CaseGroup(_) => NodeType::CaseGroup,
            Properties::SwitchGroup(_) => NodeType::SwitchGroup,
        }
    }

    /// Defaults for a node of `node_type`.
    pub fn defaults(node_type: NodeType, schema: &Schema) -> Self {
        let conjunction = Some(schema.settings.default_conjunction.clone());
        match node_type {
            NodeType::Rule => Properties::Rule(RuleProperties {
                condition: Condition::empty_rule(),
                ..RuleProperties::default()
            }),
            NodeType::RuleGroup => Properties::RuleGroup(RuleGroupProperties {
                conjunction,
                ..RuleGroupProperties::default()
            }),
            NodeType::Group => Properties::Group(GroupProperties {
                conjunction,
                ..GroupProperties::default()
            }),
            NodeType::CaseGroup => Properties::CaseGroup(CaseGroupProperties {
                conjunction,
                ..CaseGroupProperties::default()
            }),
            NodeType::SwitchGroup => Properties::SwitchGroup(GroupProperties::default()),
        }
    }

    /// Fills an unset conjunction on group-like properties.
    pub fn with_default_conjunction(mut self, schema: &Schema) -> Self {
        let conjunction = match &mut self {
            Properties::RuleGroup(p) => &mut p.conjunction,
            Properties::Group(p) => &mut p.conjunction,
            Properties::CaseGroup(p) => &mut p.conjunction,
            Properties::Rule(_) | Properties::SwitchGroup(_) => return self,
        };
        if conjunction.is_none() {
            *conjunction = Some(schema.settings.default_conjunction.clone());
        }
        self
    }

    pub fn condition(&self) -> Option<&Condition> {
        match self {
            Properties::Rule(p) => Some(&p.condition),
            Properties::RuleGroup(p) => Some(&p.condition),
            _ => None,
        }
    }

    pub fn condition_mut(&mut self) -> Option<&mut Condition> {
        match self {
            Properties::Rule(p) => Some(&mut p.condition),
            Properties::RuleGroup(p) => Some(&mut p.condition),
            _ => None,
        }
    }

    pub fn field(&self) -> Option<&FieldRef> {
        self.condition().and_then(|c| c.field.as_ref())
    }

    pub fn conjunction(&self) -> Option<&str> {
        match self {
            Properties::RuleGroup(p) => p.conjunction.as_deref(),
            Properties::Group(p) | Properties::SwitchGroup(p) => p.conjunction.as_deref(),
            Properties::CaseGroup(p) => p.conjunction.as_deref(),
            Properties::Rule(_) => None,
        }
    }

    /// Returns false when the variant has no conjunction.
    pub fn set_conjunction(&mut self, conjunction: String) -> bool {
        match self {
            Properties::RuleGroup(p) => p.conjunction = Some(conjunction),
            Properties::Group(p) | Properties::SwitchGroup(p) => p.conjunction = Some(conjunction),
            Properties::CaseGroup(p) => p.conjunction = Some(conjunction),
            Properties::Rule(_) => return false,
        }
        true
    }

    pub fn not(&self) -> bool {
        match self {
            Properties::Rule(p) => p.not,
            Properties::RuleGroup(p) => p.not,
            Properties::Group(p) | Properties::SwitchGroup(p) => p.not,
            Properties::CaseGroup(p) => p.not,
        }
    }

    pub fn set_not(&mut self, not: bool) {
        match self {
            Properties::Rule(p) => p.not = not,
            Properties::RuleGroup(p) => p.not = not,
            Properties::Group(p) | Properties::SwitchGroup(p) => p.not = not,
            Properties::CaseGroup(p) => p.not = not,
        }
    }

    pub fn is_locked(&self) -> bool {
        match self {
            Properties::Rule(p) => p.is_locked,
            Properties::RuleGroup(p) => p.is_locked,
            Properties::Group(p) | Properties::SwitchGroup(p) => p.is_locked,
            Properties::CaseGroup(p) => p.is_locked,
        }
    }

    pub fn set_locked(&mut self, lock: bool) {
        match self {
            Properties::Rule(p) => p.is_locked = lock,
            Properties::RuleGroup(p) => p.is_locked = lock,
            Properties::Group(p) | Properties::SwitchGroup(p) => p.is_locked = lock,
            Properties::CaseGroup(p) => p.is_locked = lock,
        }
    }
}

/// One node of the arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    /// Cached position; recomputed by [`crate::tree::fix_paths`].
    pub path: Path,
    pub properties: Properties,
    /// Ordered child ids. `None` for rules and for the default case branch.
    pub children: Option<Vector<NodeId>>,
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        self.properties.node_type()
    }

    pub fn child_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.children.iter().flat_map(|c| c.iter())
    }

    pub fn has_children(&self) -> bool {
        self.children.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// A rule-group may stay childless when a stand-alone count condition
    /// (non-zero cardinality) is set and its field allows an empty where.
    pub fn may_stay_empty(&self, schema: &Schema) -> bool {
        let Properties::RuleGroup(props) = &self.properties else {
            return false;
        };
        let cond = &props.condition;
        let (Some(field), Some(_)) = (&cond.field, &cond.operator) else {
            return false;
        };
        let counts = schema
            .cardinality(cond.operator.as_deref())
            .is_some_and(|c| c != 0);
        counts && schema.field_info(field).is_some_and(|f| f.initial_empty_where)
    }
}
