//! Field, operator and value edits of rules and rule-groups.

use im::Vector;

use crate::engine::coerce::{coerce_value, ChangeKind, ValidateOptions};
use crate::engine::structure::{add_item, remove_item};
use crate::engine::validation::{calculate_value_type, first_error, validate_range, validate_value};
use crate::engine::EditMeta;
use crate::ids::{IdGenerator, NodeId};
use crate::schema::{is_select_type, FieldInfo, GroupMode, OpStrategy, Schema};
use crate::tree::{
    fix_paths, Condition, Node, NodeType, Path, Properties, RuleGroupProperties, RuleProperties,
    Tree,
};
use crate::value::{FieldRef, FieldSrc, Value, ValueSrc};

/// Resolves `path` to a rule or rule-group, logging stale references.
fn condition_node<'t>(tree: &'t Tree, path: &Path, op: &str) -> Option<&'t Node> {
    let Some(node) = tree.resolve(path) else {
        tracing::debug!(%path, "{op}: stale path");
        return None;
    };
    if node.properties.condition().is_none() {
        tracing::debug!(%path, node_type = %node.node_type(), "{op}: not a rule");
        return None;
    }
    Some(node)
}

/// Replaces the condition of the node `id`.
fn store_condition(tree: &Tree, id: &NodeId, condition: Condition) -> Tree {
    let mut next = tree.clone();
    next.update(id, |node| {
        if let Some(slot) = node.properties.condition_mut() {
            *slot = condition;
        }
    });
    next
}

fn seed_rule(tree: &Tree, schema: &Schema, ids: &mut IdGenerator, parent: &Path) -> Tree {
    let id = ids.fresh_for(tree);
    // a rule is never the reserved type
    add_item(tree, schema, ids, parent, id, Properties::defaults(NodeType::Rule, schema), None)
        .unwrap_or_else(|_| tree.clone())
}

// ============================================================================
// LEFT-HAND SIDE
// ============================================================================

/// Switches the source of the left-hand side (`field`, `func` or `value`).
///
/// With `keepInputOnChangeFieldSrc`, a non-empty rule of a non-select type
/// keeps its values; the field and operator are cleared and the field type
/// is remembered so the next field pick of that type can reuse them.
/// Otherwise the rule is reset.
pub fn set_field_src(tree: &Tree, schema: &Schema, path: &Path, src: FieldSrc) -> Tree {
    let Some(node) = condition_node(tree, path, "set field src") else {
        return tree.clone();
    };
    let Some(current) = node.properties.condition() else {
        return tree.clone();
    };

    let field_type = current
        .field
        .as_ref()
        .and_then(|f| schema.field_info(f))
        .map(|info| info.field_type)
        .or_else(|| current.field_type.clone())
        .filter(|t| t != "!group" && t != "!struct");
    let reusable = !field_type.as_deref().is_some_and(is_select_type);
    let keep_input = schema.settings.keep_input_on_change_field_src && !current.is_empty() && reusable;

    let id = node.id.clone();
    let mut next = tree.clone();
    next.update(&id, |node| {
        if keep_input {
            if let Some(cond) = node.properties.condition_mut() {
                cond.field = None;
                cond.field_error = None;
                cond.operator = None;
                cond.operator_options = None;
                cond.field_type = field_type;
                cond.field_src = Some(src);
            }
            return;
        }
        let fresh = Condition {
            field_src: Some(src),
            ..Condition::default()
        };
        match &mut node.properties {
            Properties::Rule(props) => {
                *props = RuleProperties {
                    condition: fresh,
                    ..RuleProperties::default()
                }
            }
            other => {
                if let Some(cond) = other.condition_mut() {
                    *cond = fresh;
                }
            }
        }
    });
    next
}

/// Operator for a new field: a single offered operator always wins, then a
/// kept operator of the same function, then the configured strategies.
fn pick_operator(
    schema: &Schema,
    current: &Condition,
    new_field: &FieldRef,
    available: &[String],
    default_operator: Option<&str>,
    changes_node_type: bool,
) -> Option<String> {
    if available.len() == 1 {
        return available.first().cloned();
    }
    let last_op = current
        .operator
        .clone()
        .filter(|op| available.contains(op));
    let same_func = current.field_src == Some(FieldSrc::Func)
        && matches!(
            (current.field.as_ref().and_then(FieldRef::as_func), new_field.as_func()),
            (Some(a), Some(b)) if a.func == b.func
        );
    if same_func && last_op.is_some() {
        return last_op;
    }
    if available.is_empty() {
        return None;
    }
    schema
        .settings
        .set_op_on_change_field
        .iter()
        .find_map(|strategy| match strategy {
            OpStrategy::Keep if !changes_node_type => last_op.clone(),
            OpStrategy::Keep => None,
            OpStrategy::Default => default_operator.map(str::to_string),
            OpStrategy::First => available.first().cloned(),
        })
}

/// Sets the left-hand side of a rule.
///
/// `None` removes the rule. A `!group` field promotes the node to a
/// rule-group (seeding one rule unless the field starts with an empty
/// where); any other field demotes a rule-group back to a rule.
#[allow(clippy::too_many_arguments)]
pub fn set_field(
    tree: &Tree,
    schema: &Schema,
    ids: &mut IdGenerator,
    path: &Path,
    field: Option<FieldRef>,
    async_list_values: Option<Vec<Value>>,
    meta: EditMeta,
) -> Tree {
    let Some(node) = condition_node(tree, path, "set field") else {
        return tree.clone();
    };
    let Some(field) = field else {
        return remove_item(tree, path);
    };
    let Some(info) = schema.field_info(&field) else {
        tracing::warn!(%field, "no config for LHS");
        return tree.clone();
    };
    let Some(current) = node.properties.condition().cloned() else {
        return tree.clone();
    };

    let was_rule_group = node.node_type() == NodeType::RuleGroup;
    let is_rule_group = info.is_group();
    let new_operator = pick_operator(
        schema,
        &current,
        &field,
        &info.operators,
        info.default_operator.as_deref(),
        was_rule_group != is_rule_group,
    );
    if !is_rule_group && info.operators.is_empty() {
        tracing::warn!(field_type = %info.field_type, "type is not supported");
        return tree.clone();
    }

    let show_errors = schema.settings.show_error_message;
    let opts = ValidateOptions::new(!show_errors, meta);
    let id = node.id.clone();
    let (not, is_locked) = (node.properties.not(), node.properties.is_locked());

    if is_rule_group {
        let coerced = coerce_value(schema, &current, Some(&field), new_operator.as_deref(), ChangeKind::Field, opts);
        let mut condition = Condition {
            field: Some(field.clone()),
            field_src: Some(FieldSrc::Field),
            ..Condition::default()
        };
        // an unseeded rule-group must keep its count condition to stay empty
        let empty_where =
            info.initial_empty_where && new_operator.is_some() && coerced.cardinality == 1;
        if info.mode == Some(GroupMode::Array) || empty_where {
            condition.operator = new_operator;
            condition.value = coerced.value;
            condition.value_src = coerced.value_src;
            condition.value_type = coerced.value_type;
        }
        let properties = Properties::RuleGroup(RuleGroupProperties {
            condition,
            conjunction: Some(schema.settings.default_conjunction.clone()),
            mode: info.mode,
            not,
            is_locked,
        });

        let mut next = tree.clone();
        next.update(&id, |node| {
            node.properties = properties;
            node.children = Some(Vector::new());
        });
        next = fix_paths(&next);
        if !empty_where {
            next = seed_rule(&next, schema, ids, path);
        }
        return next;
    }

    let base = if was_rule_group {
        Condition::default()
    } else {
        current
    };
    let coerced = coerce_value(schema, &base, Some(&field), new_operator.as_deref(), ChangeKind::Field, opts);
    let field_src = match (&field, base.field_src) {
        (FieldRef::Func(_), _) => FieldSrc::Func,
        (FieldRef::Name(_), Some(FieldSrc::Value)) => FieldSrc::Value,
        (FieldRef::Name(_), _) => FieldSrc::Field,
    };
    let operator_options = if coerced.can_reuse_value {
        base.operator_options.clone()
    } else {
        schema.default_operator_options(new_operator.as_deref())
    };
    let async_list_values = match async_list_values {
        Some(values) => Some(values),
        None if coerced.can_reuse_value => base.async_list_values.clone(),
        None => None,
    };

    let condition = Condition {
        field: coerced.fixed_field.clone().or(Some(field)),
        field_src: Some(field_src),
        field_type: None,
        field_error: if show_errors { coerced.field_error.clone() } else { base.field_error.clone() },
        operator: new_operator,
        operator_options,
        value: coerced.value,
        value_src: coerced.value_src,
        value_type: coerced.value_type,
        value_error: if show_errors { coerced.value_error } else { base.value_error.clone() },
        async_list_values,
    };

    let mut next = tree.clone();
    next.update(&id, |node| {
        node.properties = Properties::Rule(RuleProperties {
            condition,
            not: if was_rule_group { false } else { not },
            is_locked,
        });
        node.children = None;
    });
    fix_paths(&next)
}

// ============================================================================
// OPERATOR
// ============================================================================

/// Sets the operator and resizes the value arrays to its cardinality.
///
/// A rule-group switched to a cardinality-0 operator gets one rule when it
/// has no children.
pub fn set_operator(
    tree: &Tree,
    schema: &Schema,
    ids: &mut IdGenerator,
    path: &Path,
    operator: Option<&str>,
) -> Tree {
    let Some(node) = condition_node(tree, path, "set operator") else {
        return tree.clone();
    };
    let Some(current) = node.properties.condition().cloned() else {
        return tree.clone();
    };
    let is_rule_group = current
        .field
        .as_ref()
        .and_then(|f| schema.field_info(f))
        .is_some_and(|info| info.is_group());
    let has_children = node.has_children();

    let opts = ValidateOptions::new(true, EditMeta::default());
    let coerced = coerce_value(schema, &current, current.field.as_ref(), operator, ChangeKind::Operator, opts);

    let mut condition = current.clone();
    if schema.settings.show_error_message {
        condition.value_error = coerced.value_error;
    }
    if !coerced.can_reuse_value {
        condition.operator_options = schema.default_operator_options(operator);
        condition.async_list_values = None;
    }
    condition.operator = operator.map(str::to_string);
    condition.value = coerced.value;
    condition.value_src = coerced.value_src;
    condition.value_type = coerced.value_type;

    let mut next = store_condition(tree, &node.id, condition);
    let cardinality = schema.cardinality(operator);
    if is_rule_group && cardinality == Some(0) && !has_children {
        next = seed_rule(&next, schema, ids, path);
    }
    next
}

/// Writes one operator option; `None` removes it.
pub fn set_operator_option(tree: &Tree, path: &Path, name: &str, value: Option<Value>) -> Tree {
    let Some(node) = condition_node(tree, path, "set operator option") else {
        return tree.clone();
    };
    let Some(mut condition) = node.properties.condition().cloned() else {
        return tree.clone();
    };
    let mut options = condition.operator_options.take().unwrap_or_default();
    match value {
        Some(value) => {
            options.insert(name.to_string(), value);
        }
        None => {
            options.remove(name);
        }
    }
    condition.operator_options = Some(options);
    store_condition(tree, &node.id, condition)
}

// ============================================================================
// RIGHT-HAND SIDE
// ============================================================================

/// Slots of the current operator; one when no operator is chosen yet.
fn slot_count(schema: &Schema, condition: &Condition) -> usize {
    match condition.operator.as_deref() {
        Some(op) => schema.cardinality(Some(op)).unwrap_or(1),
        None => 1,
    }
}

/// Sets the value at slot `delta`.
///
/// When inline errors are hidden the value is fixed where possible and an
/// invalid value is not stored. When they are shown the value is stored as
/// given and the slot error (plus a trailing range error for cardinality
/// >= 2) is recorded. `None` clears the slot's value and type but keeps its
/// error.
#[allow(clippy::too_many_arguments)]
pub fn set_value(
    tree: &Tree,
    schema: &Schema,
    path: &Path,
    delta: usize,
    value: Option<Value>,
    value_type: Option<&str>,
    async_list_values: Option<Vec<Value>>,
    meta: EditMeta,
) -> Tree {
    let Some(node) = condition_node(tree, path, "set value") else {
        return tree.clone();
    };
    let Some(mut condition) = node.properties.condition().cloned() else {
        return tree.clone();
    };
    let slots = slot_count(schema, &condition);
    if delta >= slots {
        tracing::debug!(%path, delta, slots, "set value: slot out of range");
        return tree.clone();
    }

    let show_errors = schema.settings.show_error_message;
    let value_src = condition.value_src.get(delta).copied().flatten();
    let value = match (value, value_src) {
        (Some(Value::List(parts)), Some(ValueSrc::Field)) => {
            let parts: Vec<String> = parts.iter().map(Value::to_string).collect();
            Some(Value::String(parts.join(&schema.settings.field_separator)))
        }
        (value, _) => value,
    };
    let field = condition.field.clone();
    let operator = condition.operator.clone();

    let mut validation_error = None;
    let mut will_fix = false;
    let mut calculated_type = None;
    let value = value.map(|v| {
        calculated_type = value_type
            .map(str::to_string)
            .or_else(|| calculate_value_type(schema, &v, value_src, field.as_ref(), operator.as_deref()));
        let (fixed, issues) = validate_value(
            schema,
            field.as_ref(),
            operator.as_deref(),
            &v,
            calculated_type.as_deref(),
            value_src,
            async_list_values.as_deref(),
            ValidateOptions::new(!show_errors, meta),
        );
        validation_error = first_error(&issues);
        will_fix = fixed != v;
        fixed
    });

    condition.ensure_slots(slots);
    let values: Vec<Option<Value>> = (0..slots)
        .map(|i| if i == delta { value.clone() } else { condition.value.get(i).cloned().flatten() })
        .collect();
    let srcs: Vec<Option<ValueSrc>> = condition.value_src.iter().take(slots).copied().collect();
    let range_error = validate_range(schema, operator.as_deref(), &values, &srcs);

    let is_valid = validation_error.is_none() && range_error.is_none();
    if show_errors || is_valid || will_fix {
        condition.async_list_values = None;
        match value.clone() {
            None => {
                condition.value.set(delta, None);
                condition.value_type.set(delta, None);
            }
            Some(v) => {
                if async_list_values.is_some() {
                    condition.async_list_values = async_list_values;
                }
                condition.value.set(delta, Some(v));
                condition.value_type.set(delta, calculated_type);
            }
        }
    }
    if show_errors {
        if value.is_some() {
            condition.value_error.set(delta, validation_error);
        }
        if slots >= 2 {
            while condition.value_error.len() <= slots {
                condition.value_error.push_back(None);
            }
            condition.value_error.set(slots, range_error);
        }
    }
    store_condition(tree, &node.id, condition)
}

/// Sets the source of slot `delta`, clearing its value. A source the field
/// does not offer is refused.
///
/// For a chosen source, the slot takes the default value the coercion
/// computes for it, unless the existing values could be reused.
pub fn set_value_src(
    tree: &Tree,
    schema: &Schema,
    path: &Path,
    delta: usize,
    src: Option<ValueSrc>,
) -> Tree {
    let Some(node) = condition_node(tree, path, "set value src") else {
        return tree.clone();
    };
    let Some(mut condition) = node.properties.condition().cloned() else {
        return tree.clone();
    };
    let slots = slot_count(schema, &condition);
    if delta >= slots {
        tracing::debug!(%path, delta, slots, "set value src: slot out of range");
        return tree.clone();
    }
    if let Some(src) = src {
        let info = condition.field.as_ref().and_then(|f| schema.field_info(f));
        if info.is_some_and(|info| !info.allows_value_src(src)) {
            tracing::warn!(%path, ?src, "value source not allowed for field");
            return tree.clone();
        }
    }

    condition.ensure_slots(slots);
    condition.value.set(delta, None);
    condition.value_type.set(delta, None);
    condition.async_list_values = None;
    if schema.settings.show_error_message {
        condition.value_error.set(delta, None);
        let is_range = condition
            .operator
            .as_deref()
            .and_then(|op| schema.operator(op))
            .is_some_and(|o| o.is_range);
        if is_range && condition.value_error.len() > slots {
            condition.value_error.set(slots, None);
        }
    }
    condition.value_src.set(delta, src);

    if let Some(src) = src {
        let opts = ValidateOptions::new(true, EditMeta::default());
        let coerced = coerce_value(
            schema,
            &condition,
            condition.field.as_ref(),
            condition.operator.as_deref(),
            ChangeKind::ValueSrc,
            opts,
        );
        if !coerced.can_reuse_value && coerced.value_src.get(delta).copied().flatten() == Some(src) {
            condition.value.set(delta, coerced.value.get(delta).cloned().flatten());
            condition.value_type.set(delta, coerced.value_type.get(delta).cloned().flatten());
        }
    }
    store_condition(tree, &node.id, condition)
}

// ============================================================================
// LOADING
// ============================================================================

/// Checks every rule and rule-group of a loaded tree against the schema.
///
/// A condition on an unknown field is removed. An operator the field does
/// not offer is cleared together with its values. Values are validated like
/// a widget edit: fixed or dropped while inline errors are hidden, kept with
/// their slot error otherwise.
pub fn validate_tree(tree: &Tree, schema: &Schema) -> Tree {
    let mut next = tree.clone();
    let mut unknown = Vec::new();
    for id in tree.subtree_ids(tree.root_id()) {
        let Some(current) = tree.node(&id).and_then(|n| n.properties.condition()) else {
            continue;
        };
        let Some(field) = &current.field else {
            continue;
        };
        let Some(info) = schema.field_info(field) else {
            tracing::warn!(%field, %id, "load: no config for LHS");
            unknown.push(id);
            continue;
        };
        let checked = validate_condition(schema, &info, current);
        if checked != *current {
            next = store_condition(&next, &id, checked);
        }
    }
    for id in unknown {
        // already gone with an unknown ancestor
        if let Some(path) = next.node(&id).map(|n| n.path.clone()) {
            next = remove_item(&next, &path);
        }
    }
    next
}

fn validate_condition(schema: &Schema, info: &FieldInfo, current: &Condition) -> Condition {
    let mut condition = current.clone();
    let Some(operator) = condition.operator.clone() else {
        return condition;
    };
    if !info.operators.contains(&operator) {
        tracing::warn!(%operator, field_type = %info.field_type, "load: operator not offered");
        return Condition {
            operator: None,
            operator_options: None,
            value: Vector::new(),
            value_src: Vector::new(),
            value_type: Vector::new(),
            value_error: Vector::new(),
            async_list_values: None,
            ..condition
        };
    }

    let show_errors = schema.settings.show_error_message;
    let opts = ValidateOptions::new(!show_errors, EditMeta::default());
    let field = condition.field.clone();
    let slots = slot_count(schema, &condition).min(condition.value.len());
    for i in 0..slots {
        let Some(value) = condition.value.get(i).cloned().flatten() else {
            continue;
        };
        let src = condition.value_src.get(i).copied().flatten();
        let value_type = condition
            .value_type
            .get(i)
            .cloned()
            .flatten()
            .or_else(|| calculate_value_type(schema, &value, src, field.as_ref(), Some(operator.as_str())));
        let (fixed, issues) = validate_value(
            schema,
            field.as_ref(),
            Some(operator.as_str()),
            &value,
            value_type.as_deref(),
            src,
            condition.async_list_values.as_deref(),
            opts,
        );
        let error = first_error(&issues);
        if show_errors {
            set_slot_error(&mut condition.value_error, i, error);
        } else if error.is_some() {
            condition.value.set(i, None);
            if i < condition.value_type.len() {
                condition.value_type.set(i, None);
            }
        } else {
            condition.value.set(i, Some(fixed));
        }
    }

    if show_errors && slots >= 2 {
        let values: Vec<Option<Value>> = condition.value.iter().take(slots).cloned().collect();
        let srcs: Vec<Option<ValueSrc>> = condition.value_src.iter().take(slots).copied().collect();
        let range_error = validate_range(schema, Some(operator.as_str()), &values, &srcs);
        set_slot_error(&mut condition.value_error, slots, range_error);
    }
    condition
}

/// Writes a slot error, growing the array only for an actual error.
fn set_slot_error(errors: &mut Vector<Option<String>>, slot: usize, error: Option<String>) {
    if slot < errors.len() {
        errors.set(slot, error);
    } else if error.is_some() {
        while errors.len() < slot {
            errors.push_back(None);
        }
        errors.push_back(error);
    }
}
