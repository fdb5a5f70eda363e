//! The command façade over the engine.
//!
//! A [`Command`] is the serialisable form of one edit. [`reduce`] is the pure
//! step from one [`QueryState`] to the next; [`Store`] wraps it with schema
//! resolution, the id generator and the previous tree for undo collaborators.
//!
//! ## Schema resolution
//!
//! An [`Action`] may carry its own schema. Otherwise the store's current
//! schema is used, and failing that the schema it was created with.
//!
//! ## Audit records
//!
//! Every command except `SET_TREE` and the drag bookkeeping commands leaves
//! an [`AuditRecord`] on the resulting state: the command without its async
//! list payload, plus the field its path pointed at before the edit.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::diagnostics::QueryError;
use crate::engine::{
    self, check_empty_groups, move_item, normalize_tree, EditMeta, FuncEdit, FuncSlot, GroupMeta,
    Placement,
};
use crate::ids::{IdGenerator, NodeId};
use crate::schema::Schema;
use crate::tree::{
    CaseGroupProperties, GroupProperties, NodeSpec, NodeType, Path, Properties, Tree,
};
use crate::value::{FieldRef, FieldSrc, Value, ValueSrc};

/// `value_type` marker of a `SET_FUNC_VALUE` that sets an argument's source.
pub const ARG_VALUE_SRC_MARKER: &str = "!valueSrc";

// ============================================================================
// COMMANDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    SetTree {
        tree: NodeSpec,
    },
    AddGroup {
        path: Path,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<NodeId>,
        #[serde(default)]
        properties: Option<GroupProperties>,
        #[serde(default, rename = "children1", skip_serializing_if = "Option::is_none")]
        children: Option<Vec<NodeSpec>>,
        #[serde(default)]
        meta: GroupMeta,
    },
    AddCaseGroup {
        path: Path,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<NodeId>,
        #[serde(default)]
        properties: Option<CaseGroupProperties>,
        #[serde(default, rename = "children1", skip_serializing_if = "Option::is_none")]
        children: Option<Vec<NodeSpec>>,
        #[serde(default)]
        meta: GroupMeta,
    },
    RemoveGroup {
        path: Path,
    },
    RemoveRule {
        path: Path,
    },
    /// `rule` is a `rule` or `rule_group` spec; a missing id gets a fresh one.
    AddRule {
        path: Path,
        rule: NodeSpec,
    },
    SetConjunction {
        path: Path,
        conjunction: String,
    },
    SetNot {
        path: Path,
        not: bool,
    },
    SetLock {
        path: Path,
        lock: bool,
    },
    SetField {
        path: Path,
        field: Option<FieldRef>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        async_list_values: Option<Vec<Value>>,
        #[serde(default)]
        meta: EditMeta,
    },
    SetFieldSrc {
        path: Path,
        src: FieldSrc,
    },
    SetOperator {
        path: Path,
        operator: Option<String>,
    },
    SetOperatorOption {
        path: Path,
        name: String,
        value: Option<Value>,
    },
    SetValue {
        path: Path,
        delta: usize,
        value: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        async_list_values: Option<Vec<Value>>,
        #[serde(default)]
        meta: EditMeta,
    },
    SetValueSrc {
        path: Path,
        delta: usize,
        src: Option<ValueSrc>,
    },
    /// `delta == -1` addresses the left-hand side. Without `arg_key` the
    /// function itself is replaced by the one named in `value`.
    SetFuncValue {
        path: Path,
        delta: isize,
        #[serde(default)]
        parent_funcs: Vec<(String, String)>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arg_key: Option<String>,
        value: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        async_list_values: Option<Vec<Value>>,
        #[serde(default)]
        meta: EditMeta,
    },
    MoveItem {
        from_path: Path,
        to_path: Path,
        placement: Placement,
    },
    SetDragStart {
        drag_start: DragStart,
        dragging: Dragging,
        mouse_pos: MousePos,
    },
    SetDragProgress {
        mouse_pos: MousePos,
        dragging: Dragging,
    },
    SetDragEnd,
}

impl Command {
    /// The wire name, e.g. `SET_FIELD`.
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetTree { .. } => "SET_TREE",
            Command::AddGroup { .. } => "ADD_GROUP",
            Command::AddCaseGroup { .. } => "ADD_CASE_GROUP",
            Command::RemoveGroup { .. } => "REMOVE_GROUP",
            Command::RemoveRule { .. } => "REMOVE_RULE",
            Command::AddRule { .. } => "ADD_RULE",
            Command::SetConjunction { .. } => "SET_CONJUNCTION",
            Command::SetNot { .. } => "SET_NOT",
            Command::SetLock { .. } => "SET_LOCK",
            Command::SetField { .. } => "SET_FIELD",
            Command::SetFieldSrc { .. } => "SET_FIELD_SRC",
            Command::SetOperator { .. } => "SET_OPERATOR",
            Command::SetOperatorOption { .. } => "SET_OPERATOR_OPTION",
            Command::SetValue { .. } => "SET_VALUE",
            Command::SetValueSrc { .. } => "SET_VALUE_SRC",
            Command::SetFuncValue { .. } => "SET_FUNC_VALUE",
            Command::MoveItem { .. } => "MOVE_ITEM",
            Command::SetDragStart { .. } => "SET_DRAG_START",
            Command::SetDragProgress { .. } => "SET_DRAG_PROGRESS",
            Command::SetDragEnd => "SET_DRAG_END",
        }
    }

    /// The path the command addresses; the source path for a move.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Command::AddGroup { path, .. }
            | Command::AddCaseGroup { path, .. }
            | Command::RemoveGroup { path }
            | Command::RemoveRule { path }
            | Command::AddRule { path, .. }
            | Command::SetConjunction { path, .. }
            | Command::SetNot { path, .. }
            | Command::SetLock { path, .. }
            | Command::SetField { path, .. }
            | Command::SetFieldSrc { path, .. }
            | Command::SetOperator { path, .. }
            | Command::SetOperatorOption { path, .. }
            | Command::SetValue { path, .. }
            | Command::SetValueSrc { path, .. }
            | Command::SetFuncValue { path, .. } => Some(path),
            Command::MoveItem { from_path, .. } => Some(from_path),
            Command::SetTree { .. }
            | Command::SetDragStart { .. }
            | Command::SetDragProgress { .. }
            | Command::SetDragEnd => None,
        }
    }

    /// Bookkeeping commands leave no audit record.
    pub fn is_audited(&self) -> bool {
        !matches!(
            self,
            Command::SetTree { .. }
                | Command::SetDragStart { .. }
                | Command::SetDragProgress { .. }
                | Command::SetDragEnd
        )
    }
}

/// A command plus an optional schema override.
#[derive(Debug, Clone)]
pub struct Action {
    pub command: Command,
    pub schema: Option<Arc<Schema>>,
}

impl Action {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            schema: None,
        }
    }

    pub fn with_schema(command: Command, schema: Arc<Schema>) -> Self {
        Self {
            command,
            schema: Some(schema),
        }
    }
}

impl From<Command> for Action {
    fn from(command: Command) -> Self {
        Action::new(command)
    }
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DragStart {
    pub id: Option<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Dragging {
    pub id: Option<NodeId>,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MousePos {
    pub x: f64,
    pub y: f64,
}

/// Pointer and geometry bookkeeping while a node is dragged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DragState {
    pub drag_start: DragStart,
    pub dragging: Dragging,
    pub mouse_pos: MousePos,
}

/// Summary of an applied command for change telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub command: serde_json::Value,
    pub affected_field: Option<FieldRef>,
}

impl AuditRecord {
    fn of(command: &Command, before: &Tree) -> Self {
        let mut value = match serde_json::to_value(command) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(command = command.name(), %err, "audit: command is not serializable");
                serde_json::Value::Null
            }
        };
        if let Some(map) = value.as_object_mut() {
            map.remove("asyncListValues");
        }
        let stored = command
            .path()
            .and_then(|p| before.resolve(p))
            .and_then(|n| n.properties.field().cloned());
        let affected_field = stored.or_else(|| match command {
            Command::SetField { field, .. } => field.clone(),
            _ => None,
        });
        Self {
            command: value,
            affected_field,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    pub tree: Tree,
    pub drag: DragState,
    pub last_action: Option<AuditRecord>,
}

impl QueryState {
    pub fn new(tree: Tree) -> Self {
        Self {
            tree,
            drag: DragState::default(),
            last_action: None,
        }
    }
}

// ============================================================================
// REDUCER
// ============================================================================

/// Applies one command to `state` under `schema`.
pub fn reduce(
    state: &QueryState,
    command: &Command,
    schema: &Schema,
    ids: &mut IdGenerator,
) -> Result<QueryState, QueryError> {
    let tree = &state.tree;
    let mut drag = state.drag.clone();

    let next = match command {
        Command::SetTree { tree: spec } => normalize_tree(spec.clone(), schema, ids)?,
        Command::AddGroup {
            path,
            id,
            properties,
            children,
            meta,
        } => engine::add_new_group(
            tree,
            schema,
            ids,
            path,
            id.clone(),
            Properties::Group(properties.clone().unwrap_or_default()),
            children.clone(),
            *meta,
        )?,
        Command::AddCaseGroup {
            path,
            id,
            properties,
            children,
            meta,
        } => engine::add_new_group(
            tree,
            schema,
            ids,
            path,
            id.clone(),
            Properties::CaseGroup(properties.clone().unwrap_or_default()),
            children.clone(),
            *meta,
        )?,
        Command::RemoveGroup { path } => engine::remove_group(tree, schema, ids, path),
        Command::RemoveRule { path } => engine::remove_rule(tree, schema, ids, path),
        Command::AddRule { path, rule } => add_rule(tree, schema, ids, path, rule.clone())?,
        Command::SetConjunction { path, conjunction } => {
            engine::set_conjunction(tree, path, conjunction)
        }
        Command::SetNot { path, not } => engine::set_not(tree, path, *not),
        Command::SetLock { path, lock } => engine::set_lock(tree, path, *lock),
        Command::SetField {
            path,
            field,
            async_list_values,
            meta,
        } => engine::set_field(
            tree,
            schema,
            ids,
            path,
            field.clone(),
            async_list_values.clone(),
            *meta,
        ),
        Command::SetFieldSrc { path, src } => engine::set_field_src(tree, schema, path, *src),
        Command::SetOperator { path, operator } => {
            engine::set_operator(tree, schema, ids, path, operator.as_deref())
        }
        Command::SetOperatorOption { path, name, value } => {
            engine::set_operator_option(tree, path, name, value.clone())
        }
        Command::SetValue {
            path,
            delta,
            value,
            value_type,
            async_list_values,
            meta,
        } => engine::set_value(
            tree,
            schema,
            path,
            *delta,
            value.clone(),
            value_type.as_deref(),
            async_list_values.clone(),
            *meta,
        ),
        Command::SetValueSrc { path, delta, src } => {
            engine::set_value_src(tree, schema, path, *delta, *src)
        }
        Command::SetFuncValue {
            path,
            delta,
            parent_funcs,
            arg_key,
            value,
            value_type,
            async_list_values,
            meta,
        } => match FuncSlot::from_delta(*delta) {
            Some(slot) => {
                let edit = func_edit(
                    arg_key.as_deref(),
                    value.clone(),
                    value_type.as_deref(),
                    async_list_values.clone(),
                );
                engine::set_func_value(tree, schema, ids, path, slot, parent_funcs, edit, *meta)?
            }
            None => {
                tracing::debug!(delta, "set func value: invalid slot");
                tree.clone()
            }
        },
        Command::MoveItem {
            from_path,
            to_path,
            placement,
        } => move_item(tree, schema, from_path, to_path, *placement),
        Command::SetDragStart {
            drag_start,
            dragging,
            mouse_pos,
        } => {
            drag = DragState {
                drag_start: drag_start.clone(),
                dragging: dragging.clone(),
                mouse_pos: *mouse_pos,
            };
            tree.clone()
        }
        Command::SetDragProgress { mouse_pos, dragging } => {
            drag.mouse_pos = *mouse_pos;
            drag.dragging = dragging.clone();
            tree.clone()
        }
        Command::SetDragEnd => {
            drag = DragState::default();
            check_empty_groups(tree, schema)
        }
    };

    let last_action = command
        .is_audited()
        .then(|| AuditRecord::of(command, tree));

    Ok(QueryState {
        tree: next,
        drag,
        last_action,
    })
}

fn add_rule(
    tree: &Tree,
    schema: &Schema,
    ids: &mut IdGenerator,
    parent: &Path,
    rule: NodeSpec,
) -> Result<Tree, QueryError> {
    let (id, mut properties, children) = rule.into_parts();
    if !matches!(properties.node_type(), NodeType::Rule | NodeType::RuleGroup) {
        tracing::warn!(node_type = %properties.node_type(), "add rule: not a rule type");
        return Ok(tree.clone());
    }
    if let Some(condition) = properties.condition_mut() {
        condition.field_src.get_or_insert(FieldSrc::Field);
    }
    let id = id.unwrap_or_else(|| ids.fresh_for(tree));
    engine::add_item(
        tree,
        schema,
        ids,
        parent,
        id,
        properties.with_default_conjunction(schema),
        children,
    )
}

fn func_edit(
    arg_key: Option<&str>,
    value: Option<Value>,
    value_type: Option<&str>,
    async_list_values: Option<Vec<Value>>,
) -> FuncEdit {
    let Some(arg) = arg_key else {
        return FuncEdit::Replace(value.as_ref().and_then(Value::as_str).map(str::to_string));
    };
    if value_type == Some(ARG_VALUE_SRC_MARKER) {
        let src = value
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|s| serde_json::from_value(serde_json::Value::from(s)).ok());
        return FuncEdit::ArgValueSrc {
            arg: arg.to_string(),
            src,
        };
    }
    FuncEdit::ArgValue {
        arg: arg.to_string(),
        value,
        async_list_values,
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Owns the current state, the schemas and the id generator.
#[derive(Debug, Clone)]
pub struct Store {
    initial_schema: Arc<Schema>,
    current_schema: Option<Arc<Schema>>,
    ids: IdGenerator,
    state: QueryState,
    last_tree: Option<Tree>,
}

impl Store {
    pub fn new(schema: Arc<Schema>, tree: Tree, ids: IdGenerator) -> Self {
        Self {
            initial_schema: schema,
            current_schema: None,
            ids,
            state: QueryState::new(tree),
            last_tree: None,
        }
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn tree(&self) -> &Tree {
        &self.state.tree
    }

    /// The tree before the last change, if any.
    pub fn last_tree(&self) -> Option<&Tree> {
        self.last_tree.as_ref()
    }

    /// Replaces the externally cached schema; `None` falls back to the
    /// initial one.
    pub fn set_current_schema(&mut self, schema: Option<Arc<Schema>>) {
        self.current_schema = schema;
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.current_schema.as_ref().unwrap_or(&self.initial_schema)
    }

    pub fn dispatch(&mut self, action: impl Into<Action>) -> Result<&QueryState, QueryError> {
        let action = action.into();
        let schema = action.schema.unwrap_or_else(|| Arc::clone(self.schema()));
        tracing::debug!(command = action.command.name(), "dispatch");
        let next = reduce(&self.state, &action.command, &schema, &mut self.ids)?;
        if !next.tree.ptr_eq(&self.state.tree) {
            self.last_tree = Some(self.state.tree.clone());
        }
        self.state = next;
        Ok(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_wire_names() {
        let json = r#"{"type": "SET_VALUE", "path": ["r"], "delta": 0, "value": 5,
                       "asyncListValues": [1, 2], "meta": {"isEndValue": true}}"#;
        let command: Command = serde_json::from_str(json).unwrap();
        assert_eq!(command.name(), "SET_VALUE");
        let Command::SetValue { delta, meta, .. } = &command else {
            panic!("wrong variant: {command:?}");
        };
        assert_eq!(*delta, 0);
        assert!(meta.is_end_value);

        let move_json = r#"{"type": "MOVE_ITEM", "fromPath": ["a"], "toPath": ["b"], "placement": "after"}"#;
        let command: Command = serde_json::from_str(move_json).unwrap();
        assert_eq!(command.path().map(ToString::to_string), Some("/a".to_string()));
    }

    #[test]
    fn audit_record_holds_serialized_command() {
        let tree = Tree::new("root".into(), Properties::defaults(NodeType::Group, &Schema::default()));
        let command = Command::SetOperator {
            path: ["r"].into_iter().collect(),
            operator: Some("equal".into()),
        };
        let record = AuditRecord::of(&command, &tree);
        assert_eq!(record.command["type"], "SET_OPERATOR");
        assert_eq!(record.command["operator"], "equal");
        assert_eq!(record.affected_field, None);
    }

    #[test]
    fn bookkeeping_is_not_audited() {
        assert!(!Command::SetDragEnd.is_audited());
        assert!(Command::RemoveRule { path: Path::root() }.is_audited());
    }

    #[test]
    fn arg_source_marker_selects_source_edit() {
        let edit = func_edit(Some("str"), Some("field".into()), Some(ARG_VALUE_SRC_MARKER), None);
        assert_eq!(
            edit,
            FuncEdit::ArgValueSrc {
                arg: "str".into(),
                src: Some(ValueSrc::Field),
            }
        );
        assert_eq!(
            func_edit(None, Some("LOWER".into()), None, None),
            FuncEdit::Replace(Some("LOWER".into()))
        );
    }
}
