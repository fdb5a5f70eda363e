//! Structural edits: adding and removing nodes, flags and conjunctions.

use crate::diagnostics::QueryError;
use crate::engine::rule::validate_tree;
use crate::engine::GroupMeta;
use crate::ids::{IdGenerator, NodeId};
use crate::schema::Schema;
use crate::tree::spec::materialize;
use crate::tree::{
    ancestor_rule_groups, fix_paths, prune_empty_groups, remove_nested_locks, total_rules_count,
    NodeSpec, NodeType, Path, Properties, Tree,
};
use crate::value::FieldRef;

// ============================================================================
// ADDING NODES
// ============================================================================

/// Adds a node of the type given by `properties` under `parent`.
///
/// The add is skipped, returning the input, when the parent is stale, the id
/// is already taken, or the nearest enclosing limit is reached:
/// `maxNumberOfCases` for case groups, `maxNesting` for groups and
/// `maxNumberOfRules` for rules and rule-groups. Limits inside a rule-group
/// come from its field and are measured from that rule-group.
///
/// A trailing default case (a case group without children) stays last.
pub fn add_item(
    tree: &Tree,
    schema: &Schema,
    ids: &mut IdGenerator,
    parent: &Path,
    id: NodeId,
    properties: Properties,
    children: Option<Vec<NodeSpec>>,
) -> Result<Tree, QueryError> {
    let node_type = properties.node_type();
    if node_type == NodeType::SwitchGroup {
        return Err(QueryError::ReservedNodeType { node_type });
    }
    Ok(insert_item(tree, schema, ids, parent, id, properties, children))
}

fn insert_item(
    tree: &Tree,
    schema: &Schema,
    ids: &mut IdGenerator,
    parent: &Path,
    id: NodeId,
    properties: Properties,
    children: Option<Vec<NodeSpec>>,
) -> Tree {
    let Some(target) = tree.resolve(parent) else {
        tracing::debug!(path = %parent, "add: stale parent path");
        return tree.clone();
    };
    if target.node_type() == NodeType::Rule {
        tracing::debug!(path = %parent, "add: parent is a rule");
        return tree.clone();
    }
    if tree.contains(&id) {
        tracing::warn!(%id, "add: id already in use");
        return tree.clone();
    }

    let node_type = properties.node_type();
    let (current, max) = limit_for(tree, schema, parent, node_type);
    let can_add = match (current, max) {
        (c, Some(m)) if c > 0 && m > 0 => c < m,
        _ => true,
    };
    if !can_add {
        tracing::debug!(path = %parent, %node_type, current, ?max, "add: limit reached");
        return tree.clone();
    }

    let target_id = target.id.clone();
    let mut siblings = target.children.clone().unwrap_or_default();
    let last_is_default_case = siblings
        .last()
        .and_then(|last| tree.node(last))
        .is_some_and(|last| last.node_type() == NodeType::CaseGroup && last.children.is_none());

    let mut next = tree.clone();
    let spec = NodeSpec::from_parts(Some(id.clone()), properties, children);
    materialize(&mut next, spec, id.clone(), ids);

    if last_is_default_case {
        let at = siblings.len() - 1;
        siblings.insert(at, id);
    } else {
        siblings.push_back(id);
    }
    next.set_children(&target_id, siblings);
    fix_paths(&next)
}

/// `(current, max)` for the limit governing an add of `node_type` under `parent`.
fn limit_for(tree: &Tree, schema: &Schema, parent: &Path, node_type: NodeType) -> (usize, Option<usize>) {
    let settings = &schema.settings;
    let nearest_rule_group = ancestor_rule_groups(tree, parent).into_iter().next();
    let field_info = |field: Option<&FieldRef>| field.and_then(|f| schema.field_info(f));

    match node_type {
        NodeType::CaseGroup => {
            let current = tree.resolve(parent).map_or(0, |n| n.child_ids().count());
            (current, settings.max_number_of_cases)
        }
        NodeType::Group => match nearest_rule_group {
            Some(rg) => (
                parent.len() - rg.path.len(),
                field_info(rg.field.as_ref()).and_then(|f| f.max_nesting),
            ),
            None => (parent.len() + 1, settings.max_nesting),
        },
        _ => match nearest_rule_group {
            Some(rg) => {
                let current = tree
                    .resolve(&rg.path)
                    .map_or(0, |n| total_rules_count(tree, &n.id));
                (current, field_info(rg.field.as_ref()).and_then(|f| f.max_number_of_rules))
            }
            None => {
                let scope = if tree.root().node_type() == NodeType::SwitchGroup {
                    tree.resolve(&parent.prefix(1)).map(|n| n.id.clone())
                } else {
                    Some(tree.root_id().clone())
                };
                let current = scope.map_or(0, |id| total_rules_count(tree, &id));
                (current, settings.max_number_of_rules)
            }
        },
    }
}

/// Adds a group or case group and seeds one empty rule inside it.
///
/// No rule is seeded when explicit children are given, when the schema
/// asks for empty groups, or for a default case.
#[allow(clippy::too_many_arguments)]
pub fn add_new_group(
    tree: &Tree,
    schema: &Schema,
    ids: &mut IdGenerator,
    parent: &Path,
    id: Option<NodeId>,
    properties: Properties,
    children: Option<Vec<NodeSpec>>,
    meta: GroupMeta,
) -> Result<Tree, QueryError> {
    if tree.resolve(parent).is_none() {
        tracing::debug!(path = %parent, "add group: stale parent path");
        return Ok(tree.clone());
    }
    let id = id.unwrap_or_else(|| ids.fresh_for(tree));
    let properties = properties.with_default_conjunction(schema);
    let has_children = children.is_some();

    let mut next = add_item(tree, schema, ids, parent, id.clone(), properties, children)?;
    if next.ptr_eq(tree) {
        return Ok(next);
    }

    if !has_children && !meta.is_default_case {
        next.set_children(&id, Default::default());
        if !schema.settings.should_create_empty_group {
            let rule_id = ids.fresh_for(&next);
            next = insert_item(
                &next,
                schema,
                ids,
                &parent.child(id),
                rule_id,
                Properties::defaults(NodeType::Rule, schema),
                None,
            );
        }
    }
    Ok(fix_paths(&next))
}

// ============================================================================
// REMOVING NODES
// ============================================================================

/// Detaches the node at `path` with its subtree. The root cannot be removed.
pub fn remove_item(tree: &Tree, path: &Path) -> Tree {
    let Some(node) = tree.resolve(path) else {
        tracing::debug!(%path, "remove: stale path");
        return tree.clone();
    };
    if path.is_root() {
        tracing::debug!("remove: refusing to remove the root");
        return tree.clone();
    }
    let mut next = tree.clone();
    next.detach(&node.id);
    fix_paths(&next)
}

/// Removes a group, then prunes ancestors left empty.
pub fn remove_group(tree: &Tree, schema: &Schema, ids: &mut IdGenerator, path: &Path) -> Tree {
    if tree.resolve(path).is_none() || path.is_root() {
        tracing::debug!(%path, "remove group: stale path");
        return tree.clone();
    }
    let mut next = remove_item(tree, path);

    let can_leave_empty = schema.settings.can_leave_empty_group;
    let parent_is_empty = path
        .parent()
        .and_then(|p| next.resolve(&p))
        .is_some_and(|p| !p.has_children());
    if parent_is_empty && !can_leave_empty {
        next = prune_empty_groups(&next, schema);
        next = seed_if_empty(&next, schema, ids);
    }
    fix_paths(&next)
}

/// Removes a rule, then prunes ancestors left empty.
///
/// A rule-group parent left empty is removed with it unless it may stay
/// empty (a count condition whose field allows an empty where).
pub fn remove_rule(tree: &Tree, schema: &Schema, ids: &mut IdGenerator, path: &Path) -> Tree {
    if tree.resolve(path).is_none() || path.is_root() {
        tracing::debug!(%path, "remove rule: stale path");
        return tree.clone();
    }
    let mut next = remove_item(tree, path);
    let can_leave_empty_group = schema.settings.can_leave_empty_group;

    let Some(parent) = path.parent().and_then(|p| next.resolve(&p).cloned()) else {
        return next;
    };
    let parent_is_rule_group = parent.node_type() == NodeType::RuleGroup;
    let can_leave_empty = if parent_is_rule_group {
        parent.may_stay_empty(schema)
    } else {
        can_leave_empty_group
    };

    if !parent.has_children() && !can_leave_empty {
        if parent_is_rule_group && !parent.path.is_root() {
            next.detach(&parent.id);
            next = fix_paths(&next);
        }
        if !can_leave_empty_group {
            next = prune_empty_groups(&next, schema);
            next = seed_if_empty(&next, schema, ids);
        }
    }
    fix_paths(&next)
}

/// Adds one empty rule at the root when the whole tree is empty.
fn seed_if_empty(tree: &Tree, schema: &Schema, ids: &mut IdGenerator) -> Tree {
    if !tree.is_empty() {
        return tree.clone();
    }
    let id = ids.fresh_for(tree);
    insert_item(
        tree,
        schema,
        ids,
        &Path::root(),
        id,
        Properties::defaults(NodeType::Rule, schema),
        None,
    )
}

/// Prunes empty groups when the schema forbids them.
pub fn check_empty_groups(tree: &Tree, schema: &Schema) -> Tree {
    if schema.settings.can_leave_empty_group {
        return tree.clone();
    }
    prune_empty_groups(tree, schema)
}

// ============================================================================
// FLAGS
// ============================================================================

pub fn set_not(tree: &Tree, path: &Path, not: bool) -> Tree {
    let Some(id) = tree.resolve(path).map(|n| n.id.clone()) else {
        tracing::debug!(%path, "set not: stale path");
        return tree.clone();
    };
    let mut next = tree.clone();
    next.update(&id, |n| n.properties.set_not(not));
    next
}

/// Sets the lock flag and clears locks made redundant by an outer lock.
pub fn set_lock(tree: &Tree, path: &Path, lock: bool) -> Tree {
    let Some(id) = tree.resolve(path).map(|n| n.id.clone()) else {
        tracing::debug!(%path, "set lock: stale path");
        return tree.clone();
    };
    let mut next = tree.clone();
    next.update(&id, |n| n.properties.set_locked(lock));
    remove_nested_locks(&next)
}

pub fn set_conjunction(tree: &Tree, path: &Path, conjunction: &str) -> Tree {
    let Some(node) = tree.resolve(path) else {
        tracing::debug!(%path, "set conjunction: stale path");
        return tree.clone();
    };
    if !node.node_type().is_group_like() {
        return tree.clone();
    }
    let id = node.id.clone();
    let mut next = tree.clone();
    next.update(&id, |n| {
        n.properties.set_conjunction(conjunction.to_string());
    });
    next
}

// ============================================================================
// LOADING
// ============================================================================

/// Builds a tree from its nested form and brings it in line with the schema.
///
/// Duplicate ids get fresh ones, nested locks below a locked node are
/// cleared and conditions are checked by [`validate_tree`]. When empty
/// groups are forbidden, empty groups are pruned and an empty tree gets one
/// empty rule.
pub fn normalize_tree(spec: NodeSpec, schema: &Schema, ids: &mut IdGenerator) -> Result<Tree, QueryError> {
    let tree = remove_nested_locks(&Tree::from_spec(spec, ids)?);
    let tree = validate_tree(&tree, schema);
    if schema.settings.can_leave_empty_group {
        return Ok(tree);
    }
    let pruned = prune_empty_groups(&tree, schema);
    Ok(seed_if_empty(&pruned, schema, ids))
}
