//! Whole-tree passes: path fixing, rule counting, empty-group pruning and
//! lock bookkeeping.

use std::collections::HashSet;

use im::Vector;

use crate::ids::NodeId;
use crate::schema::Schema;
use crate::tree::{NodeType, Path, Tree};
use crate::value::FieldRef;

/// Recomputes every cached path top-down and drops nodes that are no longer
/// reachable from the root.
///
/// Idempotent. When nothing changes the returned tree shares storage with the
/// input, so [`Tree::ptr_eq`] still holds.
pub fn fix_paths(tree: &Tree) -> Tree {
    let mut reachable = HashSet::with_capacity(tree.len());
    let mut stale = Vec::new();
    let mut stack = vec![(tree.root_id().clone(), Path::root())];

    while let Some((id, path)) = stack.pop() {
        let Some(node) = tree.node(&id) else { continue };
        if !reachable.insert(id.clone()) {
            continue;
        }
        for child in node.child_ids() {
            stack.push((child.clone(), path.child(child.clone())));
        }
        if node.path != path {
            stale.push((id, path));
        }
    }

    let orphans: Vec<NodeId> = tree
        .ids()
        .filter(|id| !reachable.contains(*id))
        .cloned()
        .collect();

    if stale.is_empty() && orphans.is_empty() {
        return tree.clone();
    }

    let mut fixed = tree.clone();
    for (id, path) in stale {
        fixed.update(&id, |node| node.path = path);
    }
    for id in &orphans {
        fixed.remove_node(id);
    }
    fixed
}

/// A rule-group enclosing some position, nearest first.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleGroupAncestor {
    pub path: Path,
    pub field: Option<FieldRef>,
}

/// Rule-groups on `path`, including the node at `path` itself, nearest first.
pub fn ancestor_rule_groups(tree: &Tree, path: &Path) -> Vec<RuleGroupAncestor> {
    (0..=path.len())
        .rev()
        .filter_map(|len| {
            let prefix = path.prefix(len);
            let node = tree.resolve(&prefix)?;
            (node.node_type() == NodeType::RuleGroup).then(|| RuleGroupAncestor {
                field: node.properties.field().cloned(),
                path: prefix,
            })
        })
        .collect()
}

/// Counts rules below `id`. A nested rule-group counts as one rule and is
/// not descended into.
pub fn total_rules_count(tree: &Tree, id: &NodeId) -> usize {
    let Some(node) = tree.node(id) else { return 0 };
    node.child_ids()
        .filter_map(|kid| tree.node(kid))
        .map(|kid| match kid.node_type() {
            NodeType::Rule | NodeType::RuleGroup => 1,
            _ => total_rules_count(tree, &kid.id),
        })
        .sum()
}

/// Levels of grouping in the subtree at `id`: 0 for a rule, 1 for a group
/// holding only rules, and so on.
pub fn group_height(tree: &Tree, id: &NodeId) -> usize {
    let Some(node) = tree.node(id) else { return 0 };
    if !node.node_type().is_group_like() {
        return 0;
    }
    1 + node
        .child_ids()
        .map(|kid| group_height(tree, kid))
        .max()
        .unwrap_or(0)
}

/// Removes, bottom-up, every non-root group left without children unless it
/// is a default case branch or a rule-group allowed to stay empty.
pub fn prune_empty_groups(tree: &Tree, schema: &Schema) -> Tree {
    let mut pruned = tree.clone();
    let root = tree.root_id().clone();
    prune_below(&mut pruned, &root, schema);
    fix_paths(&pruned)
}

/// Returns whether the node at `id` survives.
fn prune_below(tree: &mut Tree, id: &NodeId, schema: &Schema) -> bool {
    let Some(node) = tree.node(id).cloned() else {
        return false;
    };
    let Some(children) = node.children.as_ref() else {
        // rules and the default case branch
        return true;
    };

    let kept: Vector<NodeId> = children
        .iter()
        .filter(|kid| prune_below(tree, kid, schema))
        .cloned()
        .collect();
    if kept.len() != children.len() {
        tracing::debug!(id = %id, dropped = children.len() - kept.len(), "pruned empty groups");
        tree.set_children(id, kept.clone());
    }

    let is_root = id == tree.root_id();
    is_root || !kept.is_empty() || node.may_stay_empty(schema)
}

/// Clears `is_locked` on every node below a locked ancestor; only the
/// outermost lock of a branch is kept.
pub fn remove_nested_locks(tree: &Tree) -> Tree {
    let mut out = tree.clone();
    let mut stack = vec![(tree.root_id().clone(), false)];
    while let Some((id, under_lock)) = stack.pop() {
        let Some(node) = tree.node(&id) else { continue };
        let locked = node.properties.is_locked();
        if under_lock && locked {
            out.update(&id, |n| n.properties.set_locked(false));
        }
        for kid in node.child_ids() {
            stack.push((kid.clone(), under_lock || locked));
        }
    }
    out
}
