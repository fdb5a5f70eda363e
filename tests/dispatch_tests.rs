//! The command façade: schema resolution, audit records and drag state.

mod common;

use std::sync::Arc;

use common::*;
use querytree::dispatch::{Action, Command, Store};
use querytree::value::FieldRef;
use querytree::QueryError;

fn store() -> Store {
    let t = tree(&group("root", "AND", &[num_rule("r1", 1), num_rule("r2", 2)]));
    Store::new(Arc::new(schema()), t, ids())
}

fn command(json: &str) -> Command {
    serde_json::from_str(json).unwrap()
}

#[cfg(test)]
mod audit_tests {
    use super::*;

    #[test]
    fn test_record_omits_async_payload() {
        let mut store = store();
        let state = store
            .dispatch(command(
                r#"{"type": "SET_VALUE", "path": ["r1"], "delta": 0, "value": 7, "asyncListValues": [1, 2]}"#,
            ))
            .unwrap();
        let record = state.last_action.clone().unwrap();
        assert_eq!(record.command["type"], "SET_VALUE");
        assert!(record.command.get("asyncListValues").is_none());
        assert_eq!(record.affected_field, Some(FieldRef::from("num")));
    }

    #[test]
    fn test_affected_field_is_read_before_the_edit() {
        let mut store = store();
        let state = store
            .dispatch(command(r#"{"type": "SET_FIELD", "path": ["r1"], "field": "str"}"#))
            .unwrap();
        assert_eq!(
            state.last_action.as_ref().unwrap().affected_field,
            Some(FieldRef::from("num"))
        );
    }

    #[test]
    fn test_bookkeeping_commands_leave_no_record() {
        let mut store = store();
        for json in [
            r#"{"type": "SET_DRAG_START", "dragStart": {"id": "r1"}, "dragging": {"id": "r1", "x": 1, "y": 2, "w": 3, "h": 4}, "mousePos": {"x": 5, "y": 6}}"#,
            r#"{"type": "SET_DRAG_PROGRESS", "mousePos": {"x": 7, "y": 8}, "dragging": {"id": "r1", "x": 1, "y": 2, "w": 3, "h": 4}}"#,
            r#"{"type": "SET_DRAG_END"}"#,
        ] {
            let state = store.dispatch(command(json)).unwrap();
            assert!(state.last_action.is_none(), "{json}");
        }
        assert_eq!(store.state().drag, Default::default());
    }
}

#[cfg(test)]
mod store_tests {
    use super::*;

    #[test]
    fn test_move_and_last_tree() {
        let mut store = store();
        let before = store.tree().clone();
        store
            .dispatch(command(
                r#"{"type": "MOVE_ITEM", "fromPath": ["r1"], "toPath": ["r2"], "placement": "after"}"#,
            ))
            .unwrap();
        assert_eq!(query(store.tree(), store.schema()), "(num == 2 && num == 1)");
        assert!(store.last_tree().unwrap().ptr_eq(&before));
    }

    #[test]
    fn test_schema_override_wins() {
        let mut store = store();
        let strict = Arc::new(schema_with(|s| s.settings.max_number_of_rules = Some(2)));
        let add = command(r#"{"type": "ADD_RULE", "path": [], "rule": {"type": "rule", "id": "r3"}}"#);

        store.dispatch(Action::with_schema(add.clone(), strict.clone())).unwrap();
        assert!(!store.tree().contains(&"r3".into()));

        store.set_current_schema(Some(strict));
        store.dispatch(add.clone()).unwrap();
        assert!(!store.tree().contains(&"r3".into()));

        store.set_current_schema(None);
        store.dispatch(add).unwrap();
        assert!(store.tree().contains(&"r3".into()));
    }

    #[test]
    fn test_set_tree_normalises() {
        let mut store = store();
        store
            .dispatch(command(
                r#"{"type": "SET_TREE", "tree": {"type": "group", "id": "new", "children1": [
                    {"type": "group", "id": "empty", "children1": []}
                ]}}"#,
            ))
            .unwrap();
        let t = store.tree();
        assert_eq!(t.root_id().as_str(), "new");
        assert!(!t.contains(&"empty".into()));
        assert_eq!(t.root().child_ids().count(), 1);
        assert!(store.state().last_action.is_none());
    }

    #[test]
    fn test_add_group_and_remove() {
        let mut store = store();
        store
            .dispatch(command(r#"{"type": "ADD_GROUP", "path": [], "id": "g"}"#))
            .unwrap();
        assert_eq!(store.tree().node(&"g".into()).unwrap().child_ids().count(), 1);
        store
            .dispatch(command(r#"{"type": "REMOVE_GROUP", "path": ["g"]}"#))
            .unwrap();
        assert!(!store.tree().contains(&"g".into()));
        assert_consistent(store.tree());
    }

    #[test]
    fn test_func_chain_mismatch_is_fatal() {
        let mut store = store();
        store
            .dispatch(command(r#"{"type": "SET_FIELD", "path": ["r1"], "field": "str"}"#))
            .unwrap();
        store
            .dispatch(command(
                r#"{"type": "SET_FUNC_VALUE", "path": ["r1"], "delta": -1, "parentFuncs": [], "value": "LOWER"}"#,
            ))
            .unwrap();
        let err = store
            .dispatch(command(
                r#"{"type": "SET_FUNC_VALUE", "path": ["r1"], "delta": -1, "parentFuncs": [["UPPER", "str"]], "argKey": "str", "value": "x"}"#,
            ))
            .unwrap_err();
        assert!(matches!(err, QueryError::FuncChainMismatch { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_add_case_group_via_command() {
        let t = tree(r#"{"type": "switch_group", "id": "root", "children1": []}"#);
        let mut store = Store::new(Arc::new(schema()), t, ids());
        store
            .dispatch(command(
                r#"{"type": "ADD_CASE_GROUP", "path": [], "id": "else", "properties": {"value": "x"}, "meta": {"isDefaultCase": true}}"#,
            ))
            .unwrap();
        store
            .dispatch(command(r#"{"type": "ADD_CASE_GROUP", "path": [], "id": "c1"}"#))
            .unwrap();
        let order: Vec<&str> = store.tree().root().child_ids().map(|id| id.as_str()).collect();
        assert_eq!(order, vec!["c1", "else"]);
    }
}

#[cfg(test)]
mod set_tree_tests {
    use super::*;
    use querytree::value::Value;

    const LOADED: &str = r#"{"type": "SET_TREE", "tree": {"type": "group", "id": "root", "children1": [
        {"type": "rule", "id": "big", "properties": {"field": "num", "operator": "equal", "value": [500], "valueSrc": ["value"]}},
        {"type": "rule", "id": "word", "properties": {"field": "num", "operator": "equal", "value": ["abc"], "valueSrc": ["value"]}},
        {"type": "rule", "id": "nope", "properties": {"field": "nope", "operator": "bogus", "value": [1], "valueSrc": ["value"]}},
        {"type": "rule", "id": "odd", "properties": {"field": "num", "operator": "like", "value": [1], "valueSrc": ["value"]}},
        {"type": "rule", "id": "ok", "properties": {"field": "str", "operator": "equal", "value": ["aaa"], "valueSrc": ["value"]}}
    ]}}"#;

    fn load(show_errors: bool) -> Store {
        let schema = schema_with(|s| s.settings.show_error_message = show_errors);
        let mut store = Store::new(Arc::new(schema), tree(&group("root", "AND", &[num_rule("r1", 1)])), ids());
        store.dispatch(command(LOADED)).unwrap();
        store
    }

    #[test]
    fn test_unknown_field_is_dropped() {
        let store = load(false);
        assert!(!store.tree().contains(&"nope".into()));
        assert!(store.tree().contains(&"ok".into()));
        assert_consistent(store.tree());
    }

    #[test]
    fn test_operator_not_offered_is_reset() {
        let store = load(false);
        let c = condition(store.tree(), &path(&["odd"]));
        assert_eq!(c.field, Some(FieldRef::from("num")));
        assert_eq!(c.operator, None);
        assert!(c.value.is_empty());
    }

    #[test]
    fn test_values_are_fixed_when_errors_hidden() {
        let store = load(false);
        let t = store.tree();
        assert_eq!(condition(t, &path(&["big"])).value[0], Some(Value::Number(100.0)));
        assert_eq!(condition(t, &path(&["word"])).value[0], None);
        assert_eq!(condition(t, &path(&["ok"])).value[0], Some(Value::from("aaa")));
        assert!(condition(t, &path(&["big"])).value_error.is_empty());
    }

    #[test]
    fn test_values_keep_errors_when_shown() {
        let store = load(true);
        let c = condition(store.tree(), &path(&["big"]));
        assert_eq!(c.value[0], Some(Value::Number(500.0)));
        assert_eq!(
            c.value_error[0].as_deref(),
            Some("Value 500 should be less than or equal to 100")
        );
        let ok = condition(store.tree(), &path(&["ok"]));
        assert!(ok.value_error.iter().all(Option::is_none));
    }

    #[test]
    fn test_range_order_is_checked_on_load() {
        let schema = schema_with(|s| s.settings.show_error_message = true);
        let mut store = Store::new(Arc::new(schema), tree(&group("root", "AND", &[num_rule("r1", 1)])), ids());
        store
            .dispatch(command(
                r#"{"type": "SET_TREE", "tree": {"type": "group", "id": "root", "children1": [
                    {"type": "rule", "id": "r", "properties": {"field": "num", "operator": "between", "value": [9, 3], "valueSrc": ["value", "value"]}}
                ]}}"#,
            ))
            .unwrap();
        let c = condition(store.tree(), &path(&["r"]));
        assert_eq!(c.value_error.get(2).cloned().flatten().as_deref(), Some("Invalid range"));
    }
}
