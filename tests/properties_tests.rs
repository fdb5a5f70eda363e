//! Property-based invariants over random command sequences.
//!
//! Verifies:
//! 1. Every node id appears exactly once and every cached path resolves.
//! 2. Recomputing paths is idempotent.
//! 3. After a removal, no group is left empty and the root is never empty.
//! 4. Any command addressed at a missing path returns the same snapshot.

mod common;

use std::sync::Arc;

use common::*;
use proptest::prelude::*;
use querytree::dispatch::{Command, Store};
use querytree::engine::Placement;
use querytree::tree::{fix_paths, NodeSpec, NodeType, Path, RuleProperties, Tree};
use querytree::value::Value;

#[derive(Debug, Clone)]
enum Step {
    AddRule(usize),
    AddGroup(usize),
    Remove(usize),
    Move(usize, usize, Placement),
    SetValue(usize, u8),
    SetNot(usize),
}

fn arb_placement() -> impl Strategy<Value = Placement> {
    prop_oneof![
        Just(Placement::Before),
        Just(Placement::After),
        Just(Placement::Append),
        Just(Placement::Prepend),
    ]
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        any::<usize>().prop_map(Step::AddRule),
        any::<usize>().prop_map(Step::AddGroup),
        any::<usize>().prop_map(Step::Remove),
        (any::<usize>(), any::<usize>(), arb_placement()).prop_map(|(a, b, p)| Step::Move(a, b, p)),
        (any::<usize>(), 0u8..=100).prop_map(|(a, v)| Step::SetValue(a, v)),
        any::<usize>().prop_map(Step::SetNot),
    ]
}

fn initial() -> Tree {
    let inner = group("g", "AND", &[num_rule("r2", 2), num_rule("r3", 3)]);
    tree(&group("root", "OR", &[num_rule("r1", 1), inner]))
}

/// Pre-order nodes matching `keep`, by path.
fn pick(tree: &Tree, index: usize, keep: impl Fn(NodeType, &Path) -> bool) -> Option<Path> {
    let paths: Vec<Path> = tree
        .subtree_ids(tree.root_id())
        .iter()
        .filter_map(|id| tree.node(id))
        .filter(|n| keep(n.node_type(), &n.path))
        .map(|n| n.path.clone())
        .collect();
    (!paths.is_empty()).then(|| paths[index % paths.len()].clone())
}

fn command_for(tree: &Tree, step: &Step) -> Option<Command> {
    let any_node = |_: NodeType, p: &Path| !p.is_root();
    Some(match step {
        Step::AddRule(i) => Command::AddRule {
            path: pick(tree, *i, |t, _| t == NodeType::Group)?,
            rule: NodeSpec::Rule {
                id: None,
                properties: RuleProperties::default(),
            },
        },
        Step::AddGroup(i) => Command::AddGroup {
            path: pick(tree, *i, |t, _| t == NodeType::Group)?,
            id: None,
            properties: None,
            children: None,
            meta: Default::default(),
        },
        Step::Remove(i) => {
            let path = pick(tree, *i, any_node)?;
            match tree.resolve(&path)?.node_type() {
                NodeType::Rule => Command::RemoveRule { path },
                _ => Command::RemoveGroup { path },
            }
        }
        Step::Move(a, b, placement) => Command::MoveItem {
            from_path: pick(tree, *a, any_node)?,
            to_path: pick(tree, *b, |_, _| true)?,
            placement: *placement,
        },
        Step::SetValue(i, v) => Command::SetValue {
            path: pick(tree, *i, |t, _| t == NodeType::Rule)?,
            delta: 0,
            value: Some(Value::Number(f64::from(*v))),
            value_type: None,
            async_list_values: None,
            meta: Default::default(),
        },
        Step::SetNot(i) => Command::SetNot {
            path: pick(tree, *i, |_, _| true)?,
            not: true,
        },
    })
}

fn assert_no_empty_groups(tree: &Tree) {
    assert!(tree.root().has_children(), "root left empty");
    for node in tree.nodes() {
        if node.path.is_root() || node.children.is_none() {
            continue;
        }
        assert!(node.has_children(), "group {} left empty", node.id);
    }
}

fn bad_path_commands() -> Vec<Command> {
    let gone = path(&["missing"]);
    vec![
        Command::RemoveRule { path: gone.clone() },
        Command::RemoveGroup { path: gone.clone() },
        Command::SetNot { path: gone.clone(), not: true },
        Command::SetLock { path: gone.clone(), lock: true },
        Command::SetConjunction { path: gone.clone(), conjunction: "OR".into() },
        Command::SetField {
            path: gone.clone(),
            field: Some("num".into()),
            async_list_values: None,
            meta: Default::default(),
        },
        Command::SetOperator { path: gone.clone(), operator: Some("equal".into()) },
        Command::SetValue {
            path: gone.clone(),
            delta: 0,
            value: Some(Value::Number(1.0)),
            value_type: None,
            async_list_values: None,
            meta: Default::default(),
        },
        Command::SetValueSrc { path: gone.clone(), delta: 0, src: None },
        Command::AddGroup {
            path: gone.clone(),
            id: None,
            properties: None,
            children: None,
            meta: Default::default(),
        },
        Command::MoveItem {
            from_path: gone.clone(),
            to_path: Path::root(),
            placement: Placement::Append,
        },
    ]
}

proptest! {
    #[test]
    fn random_edits_keep_tree_consistent(steps in prop::collection::vec(arb_step(), 1..24)) {
        let mut store = Store::new(Arc::new(schema()), initial(), ids());
        for step in &steps {
            let Some(command) = command_for(store.tree(), step) else { continue };
            let is_remove = matches!(command, Command::RemoveRule { .. } | Command::RemoveGroup { .. });
            let is_move = matches!(command, Command::MoveItem { .. });
            store.dispatch(command).unwrap();
            if is_move {
                store.dispatch(Command::SetDragEnd).unwrap();
            }

            let tree = store.tree();
            assert_consistent(tree);
            let fixed = fix_paths(tree);
            prop_assert_eq!(&fixed, tree);
            prop_assert_eq!(&fix_paths(&fixed), &fixed);
            if is_remove {
                assert_no_empty_groups(tree);
            }
        }
    }

    #[test]
    fn missing_paths_are_no_ops(index in 0usize..11) {
        let mut store = Store::new(Arc::new(schema()), initial(), ids());
        let before = store.tree().clone();
        let command = bad_path_commands().swap_remove(index);
        store.dispatch(command).unwrap();
        prop_assert!(store.tree().ptr_eq(&before));
    }
}
