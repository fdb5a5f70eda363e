//! Value coercion across field, operator and value-source changes.
//!
//! [`coerce_value`] is the single place that decides whether the values of a
//! rule survive a change. Every engine operation that changes a field, an
//! operator or a value source routes through it.

use im::Vector;

use crate::engine::validation::{calculate_value_type, first_error, validate_func, validate_range, validate_value};
use crate::engine::EditMeta;
use crate::schema::{is_select_type, FieldInfo, Schema};
use crate::tree::Condition;
use crate::value::{FieldRef, Value, ValueSrc};

/// The dimension a coercion is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Field,
    Operator,
    ValueSrc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Repair invalid input instead of keeping it alongside an error.
    pub can_fix: bool,
    pub is_end_value: bool,
    pub can_drop_args: bool,
}

impl ValidateOptions {
    pub fn new(can_fix: bool, meta: EditMeta) -> Self {
        Self {
            can_fix,
            is_end_value: meta.is_end_value,
            can_drop_args: meta.can_drop_args,
        }
    }
}

/// Outcome of a coercion: the value arrays sized to `cardinality`.
///
/// `value_error` has one extra trailing slot for a range error when
/// `cardinality >= 2`.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub can_reuse_value: bool,
    pub value: Vector<Option<Value>>,
    pub value_src: Vector<Option<ValueSrc>>,
    pub value_type: Vector<Option<String>>,
    pub value_error: Vector<Option<String>>,
    pub field_error: Option<String>,
    /// The field to store; a function field that cannot be fixed reverts to
    /// the current field when fixing is allowed.
    pub fixed_field: Option<FieldRef>,
    pub cardinality: usize,
}

fn comparable_type(info: Option<&FieldInfo>) -> Option<String> {
    info.and_then(|i| i.comparable_type().map(str::to_string))
}

/// Computes the value arrays of `current` after moving to `new_field` and
/// `new_operator`.
pub fn coerce_value(
    schema: &Schema,
    current: &Condition,
    new_field: Option<&FieldRef>,
    new_operator: Option<&str>,
    change: ChangeKind,
    opts: ValidateOptions,
) -> Coerced {
    let cardinality = match new_operator {
        Some(op) => schema.cardinality(Some(op)).unwrap_or(1),
        None => 1,
    };
    let current_info = current.field.as_ref().and_then(|f| schema.field_info(f));
    let new_info = new_field.and_then(|f| schema.field_info(f));
    let current_type = comparable_type(current_info.as_ref()).or_else(|| current.field_type.clone());
    let new_type = comparable_type(new_info.as_ref());

    // Function on the left-hand side: fix its arguments, or fall back.
    let mut fixed_field = new_field.cloned();
    let mut field_error = None;
    if let Some(FieldRef::Func(func)) = new_field {
        let (fixed, issues) = validate_func(schema, func, None, opts);
        match first_error(&issues) {
            Some(err) => {
                field_error = Some(err);
                if opts.can_fix && current.field.is_some() {
                    fixed_field = current.field.clone();
                }
            }
            None => fixed_field = Some(FieldRef::Func(fixed)),
        }
    }

    // a remembered type stands in for the operator cleared by a source switch
    let was_complete = current.has_any_value()
        && (current.operator.is_some() || current.field_type.is_some())
        && new_operator.is_some()
        && (current.field.is_some() || current.field_type.is_some());
    let can_reuse_value = was_complete
        && match change {
            ChangeKind::Field => {
                let same_type = current_type.is_some() && current_type == new_type;
                let same_list = match (&current_info, &new_info) {
                    (Some(a), Some(b)) => a.settings.list_values == b.settings.list_values,
                    _ => current_info.is_none(),
                };
                same_type && (!new_type.as_deref().is_some_and(is_select_type) || same_list)
            }
            ChangeKind::Operator => {
                schema.value_type_for(current_type.as_deref(), current.operator.as_deref())
                    == schema.value_type_for(new_type.as_deref(), new_operator)
            }
            ChangeKind::ValueSrc => {
                (0..cardinality).all(|i| current.value.get(i).is_some_and(Option::is_some))
            }
        };

    let default_src = new_info
        .as_ref()
        .map(FieldInfo::default_value_src)
        .unwrap_or(ValueSrc::Value);
    let field_for_values = fixed_field.as_ref();

    let mut value = Vector::new();
    let mut value_src = Vector::new();
    let mut value_type = Vector::new();
    let mut value_error = Vector::new();

    for i in 0..cardinality {
        let current_src = current.value_src.get(i).copied().flatten();
        if can_reuse_value {
            let slot = current.value.get(i).cloned().flatten();
            let Some(v) = slot else {
                value.push_back(None);
                value_src.push_back(current_src);
                value_type.push_back(None);
                value_error.push_back(None);
                continue;
            };
            let ty = current
                .value_type
                .get(i)
                .cloned()
                .flatten()
                .or_else(|| calculate_value_type(schema, &v, current_src, field_for_values, new_operator));
            let (fixed, issues) = validate_value(
                schema,
                field_for_values,
                new_operator,
                &v,
                ty.as_deref(),
                current_src,
                current.async_list_values.as_deref(),
                opts,
            );
            match first_error(&issues) {
                Some(_) if opts.can_fix => {
                    value.push_back(None);
                    value_type.push_back(None);
                    value_error.push_back(None);
                }
                err => {
                    value.push_back(Some(fixed));
                    value_type.push_back(ty);
                    value_error.push_back(err);
                }
            }
            value_src.push_back(current_src);
        } else {
            let src = match change {
                ChangeKind::ValueSrc => current_src.unwrap_or(default_src),
                _ => default_src,
            };
            let v = if cardinality == 1 && src == ValueSrc::Value {
                new_info.as_ref().and_then(|i| i.default_value.clone())
            } else {
                None
            };
            let ty = v
                .as_ref()
                .and_then(|v| calculate_value_type(schema, v, Some(src), field_for_values, new_operator));
            value.push_back(v);
            value_src.push_back(Some(src));
            value_type.push_back(ty);
            value_error.push_back(None);
        }
    }

    if cardinality >= 2 {
        let values: Vec<Option<Value>> = value.iter().cloned().collect();
        let srcs: Vec<Option<ValueSrc>> = value_src.iter().copied().collect();
        value_error.push_back(validate_range(schema, new_operator, &values, &srcs));
    }

    Coerced {
        can_reuse_value,
        value,
        value_src,
        value_type,
        value_error,
        field_error,
        fixed_field,
        cardinality,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::from_yaml_str(
            r#"
types:
  number: { operators: [equal, between, is_empty] }
  text: { operators: [equal, like] }
  select: { operators: [select_equals] }
fields:
  num: { type: number, defaultValue: 7 }
  num2: { type: number }
  str: { type: text }
  color: { type: select, fieldSettings: { listValues: [{ value: red }] } }
  shade: { type: select, fieldSettings: { listValues: [{ value: dark }] } }
operators:
  equal: {}
  like: {}
  select_equals: {}
  between: { cardinality: 2, isRange: true }
  is_empty: { cardinality: 0 }
"#,
        )
        .unwrap()
    }

    fn rule(field: &str, op: &str, values: &[Value]) -> Condition {
        let mut cond = Condition::empty_rule();
        cond.field = Some(field.into());
        cond.operator = Some(op.into());
        cond.value = values.iter().cloned().map(Some).collect();
        cond.value_src = values.iter().map(|_| Some(ValueSrc::Value)).collect();
        cond
    }

    #[test]
    fn same_type_field_change_reuses_value() {
        let schema = schema();
        let cond = rule("num", "equal", &[Value::Number(3.0)]);
        let out = coerce_value(&schema, &cond, Some(&"num2".into()), Some("equal"), ChangeKind::Field, ValidateOptions::default());
        assert!(out.can_reuse_value);
        assert_eq!(out.value, Vector::from(vec![Some(Value::Number(3.0))]));
    }

    #[test]
    fn type_change_takes_defaults() {
        let schema = schema();
        let cond = rule("str", "equal", &["abc".into()]);
        let out = coerce_value(&schema, &cond, Some(&"num".into()), Some("equal"), ChangeKind::Field, ValidateOptions::default());
        assert!(!out.can_reuse_value);
        assert_eq!(out.value, Vector::from(vec![Some(Value::Number(7.0))]));
        assert_eq!(out.value_type, Vector::from(vec![Some("number".to_string())]));
    }

    #[test]
    fn select_lists_must_match() {
        let schema = schema();
        let cond = rule("color", "select_equals", &["red".into()]);
        let out = coerce_value(
            &schema,
            &cond,
            Some(&"shade".into()),
            Some("select_equals"),
            ChangeKind::Field,
            ValidateOptions::default(),
        );
        assert!(!out.can_reuse_value);
    }

    #[test]
    fn arrays_follow_operator_cardinality() {
        let schema = schema();
        let cond = rule("num", "equal", &[Value::Number(3.0)]);
        let range = coerce_value(&schema, &cond, Some(&"num".into()), Some("between"), ChangeKind::Operator, ValidateOptions::default());
        assert!(range.can_reuse_value);
        assert_eq!(range.value.len(), 2);
        assert_eq!(range.value_src.len(), 2);
        assert_eq!(range.value_error.len(), 3);
        assert_eq!(range.value[0], Some(Value::Number(3.0)));

        let empty = coerce_value(&schema, &cond, Some(&"num".into()), Some("is_empty"), ChangeKind::Operator, ValidateOptions::default());
        assert_eq!(empty.cardinality, 0);
        assert!(empty.value.is_empty() && empty.value_type.is_empty());
    }
}
