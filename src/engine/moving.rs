//! Drag-and-drop reparenting.
//!
//! Nodes live in an arena and groups hold child ids, so a move only rewrites
//! two child vectors (one when source and target share a parent) and then
//! fixes paths. Subtrees are never copied, which keeps every overlap case
//! (source inside target, target inside source) lossless.

use im::Vector;
use serde::{Deserialize, Serialize};

use crate::ids::NodeId;
use crate::schema::Schema;
use crate::tree::{ancestor_rule_groups, fix_paths, group_height, Path, Tree};

/// Position of the moved node relative to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Before,
    After,
    /// Last child of the target.
    Append,
    /// First child of the target.
    Prepend,
}

impl Placement {
    fn is_sibling(&self) -> bool {
        matches!(self, Placement::Before | Placement::After)
    }
}

/// How the source parent and the destination parent relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    SameParent,
    /// The destination parent is a strict ancestor of the source parent.
    SourceInsideTarget,
    /// The source parent is a strict ancestor of the destination parent.
    TargetInsideSource,
    Unrelated,
}

impl Topology {
    pub fn classify(source_parent: &Path, target_parent: &Path) -> Self {
        if source_parent == target_parent {
            Topology::SameParent
        } else if target_parent.is_strict_prefix_of(source_parent) {
            Topology::SourceInsideTarget
        } else if source_parent.is_strict_prefix_of(target_parent) {
            Topology::TargetInsideSource
        } else {
            Topology::Unrelated
        }
    }
}

/// Moves the node at `from` relative to the node at `to`.
///
/// Returns the input unchanged when a path is stale, when the root or a node
/// relative to itself or its own subtree is moved, when regrouping is
/// disabled and the parent would change, when the move would exceed the
/// nesting limit, or when a sibling anchor is no longer in place.
pub fn move_item(tree: &Tree, schema: &Schema, from: &Path, to: &Path, placement: Placement) -> Tree {
    match plan(tree, schema, from, to, placement) {
        Some(next) => next,
        None => tree.clone(),
    }
}

fn plan(tree: &Tree, schema: &Schema, from: &Path, to: &Path, placement: Placement) -> Option<Tree> {
    let source = tree.resolve(from)?;
    let target = tree.resolve(to)?;
    let Some(source_parent_path) = from.parent() else {
        tracing::debug!("move: the root cannot be moved");
        return None;
    };
    let target_parent_path = if placement.is_sibling() {
        to.parent()?
    } else {
        to.clone()
    };
    if from == to || from.is_prefix_of(&target_parent_path) {
        tracing::debug!(%from, %to, "move: target inside the moved subtree");
        return None;
    }

    let source_parent = tree.resolve(&source_parent_path)?;
    let target_parent = tree.resolve(&target_parent_path)?;
    let Some(target_children) = target_parent.children.as_ref() else {
        tracing::debug!(%to, "move: target cannot hold children");
        return None;
    };

    let topology = Topology::classify(&source_parent_path, &target_parent_path);
    if topology != Topology::SameParent {
        if !schema.settings.can_regroup {
            tracing::debug!(%from, %to, "move: regrouping disabled");
            return None;
        }
        if exceeds_nesting(tree, schema, &source.id, &target_parent_path) {
            tracing::debug!(%from, %to, "move: nesting limit reached");
            return None;
        }
    }

    let moved = source.id.clone();
    let without = |children: &Vector<NodeId>| -> Vector<NodeId> {
        children.iter().filter(|id| **id != moved).cloned().collect()
    };
    let source_children = without(source_parent.children.as_ref()?);
    let base = if topology == Topology::SameParent {
        source_children.clone()
    } else {
        target_children.clone()
    };

    let placed = match placement {
        Placement::Append => {
            let mut out = base;
            out.push_back(moved.clone());
            out
        }
        Placement::Prepend => {
            let mut out = base;
            out.push_front(moved.clone());
            out
        }
        Placement::Before | Placement::After => {
            let Some(at) = base.index_of(&target.id) else {
                tracing::debug!(anchor = %target.id, "move: anchor is gone");
                return None;
            };
            let at = if placement == Placement::After { at + 1 } else { at };
            let mut out = base;
            out.insert(at, moved.clone());
            out
        }
    };

    let mut next = tree.clone();
    if topology != Topology::SameParent {
        next.set_children(&source_parent.id, source_children);
    }
    next.set_children(&target_parent.id, placed);
    Some(fix_paths(&next))
}

/// Whether the deepest group of the moved subtree would pass the nesting
/// limit once placed under `target_parent`.
fn exceeds_nesting(tree: &Tree, schema: &Schema, moved: &NodeId, target_parent: &Path) -> bool {
    let height = group_height(tree, moved);
    if height == 0 {
        return false;
    }
    let (current, max) = match ancestor_rule_groups(tree, target_parent).into_iter().next() {
        Some(rg) => (
            target_parent.len() + height - 1 - rg.path.len(),
            rg.field
                .as_ref()
                .and_then(|f| schema.field_info(f))
                .and_then(|f| f.max_nesting),
        ),
        None => (target_parent.len() + height, schema.settings.max_nesting),
    };
    matches!(max, Some(m) if m > 0 && current > 0 && current >= m)
}
