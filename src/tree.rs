//! The persistent query tree.
//!
//! A [`Tree`] is an arena of nodes addressed by id, backed by
//! `im::HashMap`; each group-like node keeps an ordered vector of child ids.
//! Cloning a tree is O(1), and an edit replaces only the nodes it touches,
//! so older snapshots stay valid and share every untouched node.
//!
//! ## Design Notes
//!
//! Structural edits go through `Tree::put`, `Tree::insert_child` and
//! `Tree::detach`, then finish with [`fix_paths`], which rewrites cached
//! paths and drops nodes no longer reachable from the root.

pub mod node;
pub mod path;
pub mod spec;
pub mod walk;

pub use node::{
    CaseGroupProperties, Condition, GroupProperties, Node, NodeType, Properties,
    RuleGroupProperties, RuleProperties,
};
pub use path::Path;
pub use spec::NodeSpec;
pub use walk::{
    ancestor_rule_groups, fix_paths, group_height, prune_empty_groups, remove_nested_locks,
    total_rules_count, RuleGroupAncestor,
};

use im::{HashMap, Vector};

use crate::ids::NodeId;

#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    root: NodeId,
    nodes: HashMap<NodeId, Node>,
}

impl Tree {
    /// An empty tree whose root is a group with no children.
    pub fn new(root_id: NodeId, properties: Properties) -> Self {
        let root = Node {
            id: root_id.clone(),
            path: Path::root(),
            properties,
            children: Some(Vector::new()),
        };
        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), root);
        Self {
            root: root_id,
            nodes,
        }
    }

    pub fn root_id(&self) -> &NodeId {
        &self.root
    }

    pub fn root(&self) -> &Node {
        // The root is inserted at construction and never detached.
        &self.nodes[&self.root]
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the root has no children.
    pub fn is_empty(&self) -> bool {
        !self.root().has_children()
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// True when both snapshots share the same storage, i.e. an edit was a no-op.
    pub fn ptr_eq(&self, other: &Tree) -> bool {
        self.root == other.root && self.nodes.ptr_eq(&other.nodes)
    }

    /// Resolves a path by descending child collections from the root.
    ///
    /// Any missing hop yields `None`; callers treat that as a stale reference.
    pub fn resolve(&self, path: &Path) -> Option<&Node> {
        let mut current = self.root();
        for id in path.iter() {
            let children = current.children.as_ref()?;
            if !children.contains(id) {
                return None;
            }
            current = self.nodes.get(id)?;
        }
        Some(current)
    }

    /// The node whose children hold `id`.
    pub fn parent_of(&self, id: &NodeId) -> Option<&Node> {
        let node = self.node(id)?;
        let parent_path = node.path.parent()?;
        self.resolve(&parent_path)
    }

    pub fn children(&self, node: &Node) -> Vec<&Node> {
        node.child_ids().filter_map(|id| self.nodes.get(id)).collect()
    }

    /// Ids of `id` and all its descendants, pre-order.
    pub fn subtree_ids(&self, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else { continue };
            let mut kids: Vec<NodeId> = node.child_ids().cloned().collect();
            kids.reverse();
            stack.extend(kids);
            out.push(current);
        }
        out
    }

    /// Inserts or replaces a node.
    pub(crate) fn put(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub(crate) fn remove_node(&mut self, id: &NodeId) {
        self.nodes.remove(id);
    }

    /// Applies `f` to a copy of the node and stores it back.
    pub(crate) fn update<F>(&mut self, id: &NodeId, f: F) -> bool
    where
        F: FnOnce(&mut Node),
    {
        let Some(mut node) = self.nodes.get(id).cloned() else {
            return false;
        };
        f(&mut node);
        self.put(node);
        true
    }

    /// Detaches a node from its parent's children; the subtree is collected
    /// by the next [`fix_paths`].
    pub(crate) fn detach(&mut self, id: &NodeId) -> bool {
        let Some(parent_id) = self.parent_of(id).map(|p| p.id.clone()) else {
            return false;
        };
        self.update(&parent_id, |parent| {
            if let Some(children) = parent.children.as_mut() {
                children.retain(|c| c != id);
            }
        })
    }

    pub(crate) fn set_children(&mut self, id: &NodeId, children: Vector<NodeId>) -> bool {
        self.update(id, |node| node.children = Some(children))
    }
}
