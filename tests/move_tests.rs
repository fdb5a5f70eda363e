//! Drag-and-drop moves over whole trees.

mod common;

use common::*;
use querytree::engine::{move_item, Placement};

#[cfg(test)]
mod scenario_tests {
    use super::*;

    #[test]
    fn test_reorder_within_group() {
        let schema = schema();
        let t = tree(&group("root", "AND", &[num_rule("r1", 1), num_rule("r2", 2)]));
        assert_eq!(query(&t, &schema), "(num == 1 && num == 2)");

        let next = move_item(&t, &schema, &path(&["r1"]), &path(&["r2"]), Placement::After);
        assert_eq!(query(&next, &schema), "(num == 2 && num == 1)");
        assert_consistent(&next);
    }

    #[test]
    fn test_inner_group_moves_before_first_rule() {
        let schema = schema();
        let inner = group("g", "AND", &[num_rule("r2", 2), num_rule("r3", 3)]);
        let t = tree(&group("root", "OR", &[num_rule("r1", 1), inner]));
        assert_eq!(query(&t, &schema), "(num == 1 || (num == 2 && num == 3))");

        let next = move_item(&t, &schema, &path(&["g"]), &path(&["r1"]), Placement::Before);
        assert_eq!(query(&next, &schema), "((num == 2 && num == 3) || num == 1)");
        assert_consistent(&next);
    }

    #[test]
    fn test_regroup_disabled_is_reference_equal() {
        let schema = schema_with(|s| s.settings.can_regroup = false);
        let inner = group("g", "AND", &[num_rule("r2", 2)]);
        let t = tree(&group("root", "AND", &[num_rule("r1", 1), inner]));

        let next = move_item(&t, &schema, &path(&["r1"]), &path(&["g"]), Placement::Append);
        assert!(next.ptr_eq(&t));

        // reordering under the same parent is still allowed
        let reordered = move_item(&t, &schema, &path(&["r1"]), &path(&["g"]), Placement::After);
        assert!(!reordered.ptr_eq(&t));
    }
}

#[cfg(test)]
mod overlap_tests {
    use super::*;

    fn nested() -> String {
        let deep = group("h", "AND", &[num_rule("r3", 3), num_rule("r4", 4)]);
        let mid = group("g", "AND", &[num_rule("r2", 2), deep]);
        group("root", "AND", &[num_rule("r1", 1), mid])
    }

    #[test]
    fn test_source_inside_target_keeps_subtree() {
        let schema = schema();
        let t = tree(&nested());
        // h lives under g; move it up to the root
        let next = move_item(&t, &schema, &path(&["g", "h"]), &path(&[]), Placement::Append);
        assert_eq!(next.len(), t.len());
        assert_eq!(next.node(&"h".into()).unwrap().path, path(&["h"]));
        assert_eq!(next.node(&"r4".into()).unwrap().path, path(&["h", "r4"]));
        assert_consistent(&next);
    }

    #[test]
    fn test_target_inside_source_parent() {
        let schema = schema();
        let t = tree(&nested());
        // r1 sits under the root, the target h is deeper in a sibling branch
        let next = move_item(&t, &schema, &path(&["r1"]), &path(&["g", "h", "r3"]), Placement::Before);
        let h = next.node(&"h".into()).unwrap();
        let kids: Vec<&str> = h.child_ids().map(|id| id.as_str()).collect();
        assert_eq!(kids, vec!["r1", "r3", "r4"]);
        assert_eq!(next.len(), t.len());
        assert_consistent(&next);
    }

    #[test]
    fn test_move_into_own_subtree_is_rejected() {
        let schema = schema();
        let t = tree(&nested());
        for (to, placement) in [
            (path(&["g", "h"]), Placement::Append),
            (path(&["g", "h", "r3"]), Placement::After),
            (path(&["g"]), Placement::Prepend),
        ] {
            let next = move_item(&t, &schema, &path(&["g"]), &to, placement);
            assert!(next.ptr_eq(&t), "move of g to {to} should be rejected");
        }
    }

    #[test]
    fn test_stale_paths_and_root_are_no_ops() {
        let schema = schema();
        let t = tree(&nested());
        let gone = move_item(&t, &schema, &path(&["nope"]), &path(&["r1"]), Placement::After);
        assert!(gone.ptr_eq(&t));
        let root = move_item(&t, &schema, &path(&[]), &path(&["g"]), Placement::Append);
        assert!(root.ptr_eq(&t));
        let into_rule = move_item(&t, &schema, &path(&["r1"]), &path(&["g", "r2"]), Placement::Append);
        assert!(into_rule.ptr_eq(&t));
    }

    #[test]
    fn test_nesting_limit_blocks_deep_moves() {
        let schema = schema_with(|s| s.settings.max_nesting = Some(2));
        let a = group("a", "AND", &[num_rule("r2", 2)]);
        let b = group("b", "AND", &[num_rule("r3", 3)]);
        let t = tree(&group("root", "AND", &[num_rule("r1", 1), a, b]));

        let blocked = move_item(&t, &schema, &path(&["a"]), &path(&["b"]), Placement::Append);
        assert!(blocked.ptr_eq(&t));

        let rule = move_item(&t, &schema, &path(&["r1"]), &path(&["b"]), Placement::Append);
        assert!(!rule.ptr_eq(&t), "rules are not limited by nesting");
        assert_eq!(rule.node(&"r1".into()).unwrap().path, path(&["b", "r1"]));
    }
}
