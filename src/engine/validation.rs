//! Value validation.
//!
//! Validators never fail; they return the (possibly fixed) value together
//! with a list of [`ValueIssue`]s. An issue marked `fixed` was repaired in the
//! returned value, and one marked `ignore` must not block an edit. Callers
//! store the first remaining issue as the slot error.

use regex::Regex;

use crate::engine::coerce::ValidateOptions;
use crate::schema::{is_select_type, FieldSettings, Schema};
use crate::value::{ArgValue, FieldRef, FuncValue, Value, ValueSrc};

#[derive(Debug, Clone, PartialEq)]
pub struct ValueIssue {
    pub message: String,
    pub fixed: bool,
    pub ignore: bool,
}

impl ValueIssue {
    fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fixed: false,
            ignore: false,
        }
    }

    fn repaired(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fixed: true,
            ignore: false,
        }
    }

    /// Blocks an edit: neither fixed nor ignorable.
    pub fn is_blocking(&self) -> bool {
        !self.fixed && !self.ignore
    }
}

/// First issue that was neither fixed nor ignored.
pub fn first_error(issues: &[ValueIssue]) -> Option<String> {
    issues
        .iter()
        .find(|i| i.is_blocking())
        .map(|i| i.message.clone())
}

/// Effective type of a value given its source: the widget type for literals,
/// the referenced field's type for `field`, the return type for `func`.
pub fn calculate_value_type(
    schema: &Schema,
    value: &Value,
    src: Option<ValueSrc>,
    field: Option<&FieldRef>,
    operator: Option<&str>,
) -> Option<String> {
    match src {
        Some(ValueSrc::Field) => value
            .as_str()
            .and_then(|key| schema.field_config(key))
            .map(|f| f.field_type.clone()),
        Some(ValueSrc::Func) => value
            .as_func()
            .and_then(|f| schema.func(&f.func))
            .map(|f| f.return_type.clone()),
        _ => {
            let field_type = field
                .and_then(|f| schema.field_info(f))
                .map(|info| info.field_type);
            schema.value_type_for(field_type.as_deref(), operator)
        }
    }
}

/// Validates one right-hand-side value of a rule.
#[allow(clippy::too_many_arguments)]
pub fn validate_value(
    schema: &Schema,
    field: Option<&FieldRef>,
    operator: Option<&str>,
    value: &Value,
    value_type: Option<&str>,
    value_src: Option<ValueSrc>,
    async_list_values: Option<&[Value]>,
    opts: ValidateOptions,
) -> (Value, Vec<ValueIssue>) {
    let info = field.and_then(|f| schema.field_info(f));
    let expected = info.as_ref().and_then(|i| i.comparable_type().map(str::to_string));

    match value_src.unwrap_or(ValueSrc::Value) {
        ValueSrc::Const => (value.clone(), Vec::new()),
        ValueSrc::Field => (value.clone(), validate_field_ref(schema, value, expected.as_deref())),
        ValueSrc::Func => match value {
            Value::Func(func) => {
                let (fixed, issues) = validate_func(schema, func, expected.as_deref(), opts);
                (Value::Func(fixed), issues)
            }
            other => (
                other.clone(),
                vec![ValueIssue::error(format!("Expected a function, got {}", other.type_name()))],
            ),
        },
        ValueSrc::Value => {
            let widget = value_type
                .map(str::to_string)
                .or_else(|| schema.value_type_for(expected.as_deref(), operator));
            let Some(widget) = widget else {
                return (value.clone(), Vec::new());
            };
            let settings = info.map(|i| i.settings).unwrap_or_default();
            validate_literal(value, &widget, &settings, async_list_values, opts.can_fix)
        }
    }
}

fn validate_field_ref(schema: &Schema, value: &Value, expected: Option<&str>) -> Vec<ValueIssue> {
    let Some(key) = value.as_str() else {
        return vec![ValueIssue::error(format!(
            "Expected a field name, got {}",
            value.type_name()
        ))];
    };
    match schema.field_config(key) {
        None => vec![ValueIssue::error(format!("No such field {key}"))],
        Some(config) => match expected {
            Some(t) if t != config.field_type => vec![ValueIssue::error(format!(
                "Field {key} has type {}, expected {t}",
                config.field_type
            ))],
            _ => Vec::new(),
        },
    }
}

/// Type, bounds, length, pattern and list checks of a literal.
pub fn validate_literal(
    value: &Value,
    widget: &str,
    settings: &FieldSettings,
    async_list_values: Option<&[Value]>,
    can_fix: bool,
) -> (Value, Vec<ValueIssue>) {
    match widget {
        "number" => validate_number(value, settings, can_fix),
        "text" | "textarea" => validate_text(value, settings, can_fix),
        "boolean" => match value {
            Value::Bool(_) => (value.clone(), Vec::new()),
            other => (
                other.clone(),
                vec![ValueIssue::error(format!("Expected a boolean, got {}", other.type_name()))],
            ),
        },
        w if is_select_type(w) => {
            let list = list_values(settings, async_list_values);
            if w.contains("multi") {
                validate_multiselect(value, list.as_deref(), can_fix)
            } else {
                validate_select(value, list.as_deref(), can_fix)
            }
        }
        _ => (value.clone(), Vec::new()),
    }
}

fn validate_number(value: &Value, settings: &FieldSettings, can_fix: bool) -> (Value, Vec<ValueIssue>) {
    let mut issues = Vec::new();
    let n = match value {
        Value::Number(n) => *n,
        Value::String(s) if can_fix => match s.trim().parse::<f64>() {
            Ok(n) => {
                issues.push(ValueIssue::repaired(format!("Converted {s:?} to a number")));
                n
            }
            Err(_) => {
                issues.push(ValueIssue::error(format!("Value {s:?} is not a number")));
                return (value.clone(), issues);
            }
        },
        other => {
            issues.push(ValueIssue::error(format!(
                "Expected a number, got {}",
                other.type_name()
            )));
            return (value.clone(), issues);
        }
    };

    let mut fixed = n;
    if let Some(min) = settings.min.filter(|min| n < *min) {
        let shown = Value::Number(min);
        let message = format!("Value {} should be greater than or equal to {shown}", Value::Number(n));
        if can_fix {
            fixed = min;
            issues.push(ValueIssue::repaired(message));
        } else {
            issues.push(ValueIssue::error(message));
        }
    }
    if let Some(max) = settings.max.filter(|max| n > *max) {
        let shown = Value::Number(max);
        let message = format!("Value {} should be less than or equal to {shown}", Value::Number(n));
        if can_fix {
            fixed = max;
            issues.push(ValueIssue::repaired(message));
        } else {
            issues.push(ValueIssue::error(message));
        }
    }
    (Value::Number(fixed), issues)
}

fn validate_text(value: &Value, settings: &FieldSettings, can_fix: bool) -> (Value, Vec<ValueIssue>) {
    let mut issues = Vec::new();
    let mut text = match value {
        Value::String(s) => s.clone(),
        Value::Number(_) | Value::Bool(_) if can_fix => {
            issues.push(ValueIssue::repaired("Converted value to text"));
            value.to_string()
        }
        other => {
            issues.push(ValueIssue::error(format!("Expected text, got {}", other.type_name())));
            return (value.clone(), issues);
        }
    };

    if let Some(max) = settings.max_length {
        if text.chars().count() > max {
            let message = format!("Value is longer than {max} characters");
            if can_fix {
                text = text.chars().take(max).collect();
                issues.push(ValueIssue::repaired(message));
            } else {
                issues.push(ValueIssue::error(message));
            }
        }
    }

    if let Some(pattern) = settings.pattern.as_deref() {
        match Regex::new(pattern) {
            Ok(re) if !re.is_match(&text) => {
                issues.push(ValueIssue::error(format!(
                    "Value {text:?} does not match pattern {pattern}"
                )));
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(%pattern, %err, "ignoring invalid field pattern"),
        }
    }
    (Value::String(text), issues)
}

fn list_values(settings: &FieldSettings, async_list_values: Option<&[Value]>) -> Option<Vec<Value>> {
    if let Some(values) = async_list_values {
        return Some(values.to_vec());
    }
    settings
        .list_values
        .as_ref()
        .map(|items| items.iter().map(|item| item.value.clone()).collect())
}

/// Finds the list entry equal to `value`, or equal in its display form
/// (`"1"` matches `1`).
fn find_in_list(value: &Value, list: &[Value]) -> Option<Value> {
    list.iter()
        .find(|item| *item == value)
        .or_else(|| list.iter().find(|item| item.to_string() == value.to_string()))
        .cloned()
}

fn validate_select(value: &Value, list: Option<&[Value]>, _can_fix: bool) -> (Value, Vec<ValueIssue>) {
    let Some(list) = list else {
        return (value.clone(), Vec::new());
    };
    match find_in_list(value, list) {
        Some(exact) => (exact, Vec::new()),
        None => (
            value.clone(),
            vec![ValueIssue::error(format!("Value {value} is not in the list of values"))],
        ),
    }
}

fn validate_multiselect(value: &Value, list: Option<&[Value]>, can_fix: bool) -> (Value, Vec<ValueIssue>) {
    let Value::List(items) = value else {
        return (
            value.clone(),
            vec![ValueIssue::error(format!("Expected a list, got {}", value.type_name()))],
        );
    };
    let Some(list) = list else {
        return (value.clone(), Vec::new());
    };

    let mut kept = Vec::with_capacity(items.len());
    let mut missing = Vec::new();
    for item in items {
        match find_in_list(item, list) {
            Some(exact) => kept.push(exact),
            None => {
                missing.push(item.to_string());
                if !can_fix {
                    kept.push(item.clone());
                }
            }
        }
    }
    if missing.is_empty() {
        return (Value::List(kept), Vec::new());
    }
    let message = format!("Values {} are not in the list of values", missing.join(", "));
    let issue = if can_fix {
        ValueIssue::repaired(message)
    } else {
        ValueIssue::error(message)
    };
    (Value::List(kept), vec![issue])
}

/// Validates a function application and its arguments, recursively.
///
/// Missing required arguments are filled from the argument's default value
/// when one exists; otherwise they are reported, flagged `ignore` unless the
/// edit is final and arguments may not be dropped.
pub fn validate_func(
    schema: &Schema,
    func: &FuncValue,
    expected_type: Option<&str>,
    opts: ValidateOptions,
) -> (FuncValue, Vec<ValueIssue>) {
    let Some(config) = schema.func(&func.func) else {
        return (
            func.clone(),
            vec![ValueIssue::error(format!("Unknown function {}", func.func))],
        );
    };
    let func_label = config.label.clone().unwrap_or_else(|| func.func.clone());
    let mut issues = Vec::new();
    if let Some(expected) = expected_type {
        if config.return_type != expected {
            issues.push(ValueIssue::error(format!(
                "Function {func_label} returns {}, expected {expected}",
                config.return_type
            )));
        }
    }

    let mut fixed = func.clone();
    for key in func.args.keys() {
        if config.arg(key).is_none() && opts.can_fix {
            fixed.args.remove(key);
            issues.push(ValueIssue::repaired(format!("Dropped unknown argument {key}")));
        }
    }

    for arg in &config.args {
        let arg_label = arg.label.clone().unwrap_or_else(|| arg.key.clone());
        let current = fixed.args.get(&arg.key).cloned().unwrap_or_default();

        let Some(value) = current.value.clone() else {
            if let Some(default) = &arg.default_value {
                fixed.args.insert(
                    arg.key.clone(),
                    ArgValue {
                        value: Some(default.clone()),
                        value_src: Some(ValueSrc::Value),
                        async_list_values: None,
                    },
                );
            } else if !arg.is_optional {
                issues.push(ValueIssue {
                    message: format!("Value of arg {arg_label} for func {func_label} is required"),
                    fixed: false,
                    ignore: !opts.is_end_value || opts.can_drop_args,
                });
            }
            continue;
        };

        let (arg_value, arg_issues) = match current.value_src.unwrap_or(ValueSrc::Value) {
            ValueSrc::Const => (value.clone(), Vec::new()),
            ValueSrc::Field => {
                let issues = validate_field_ref(schema, &value, Some(&arg.arg_type));
                (value.clone(), issues)
            }
            ValueSrc::Func => match &value {
                Value::Func(inner) => {
                    let (inner, issues) = validate_func(schema, inner, Some(&arg.arg_type), opts);
                    (Value::Func(inner), issues)
                }
                other => (
                    other.clone(),
                    vec![ValueIssue::error(format!(
                        "Expected a function for arg {arg_label}, got {}",
                        other.type_name()
                    ))],
                ),
            },
            ValueSrc::Value => validate_literal(
                &value,
                &arg.arg_type,
                &arg.field_settings,
                current.async_list_values.as_deref(),
                opts.can_fix,
            ),
        };

        let blocked = arg_issues.iter().any(ValueIssue::is_blocking);
        if blocked && opts.can_fix && opts.can_drop_args {
            match &arg.default_value {
                Some(default) => {
                    fixed.args.insert(
                        arg.key.clone(),
                        ArgValue {
                            value: Some(default.clone()),
                            value_src: Some(ValueSrc::Value),
                            async_list_values: None,
                        },
                    );
                }
                None => {
                    fixed.args.remove(&arg.key);
                }
            }
            issues.push(ValueIssue::repaired(format!(
                "Dropped invalid value of arg {arg_label} for func {func_label}"
            )));
            continue;
        }

        if let Some(entry) = fixed.args.get_mut(&arg.key) {
            entry.value = Some(arg_value);
        }
        issues.extend(arg_issues);
    }
    (fixed, issues)
}

/// Checks that the values of a range operator are in ascending order.
///
/// Only complete tuples of literal numbers or strings are compared.
pub fn validate_range(
    schema: &Schema,
    operator: Option<&str>,
    values: &[Option<Value>],
    srcs: &[Option<ValueSrc>],
) -> Option<String> {
    let config = operator.and_then(|op| schema.operator(op))?;
    if !config.is_range || values.len() < 2 {
        return None;
    }
    if srcs.iter().any(|s| !matches!(s, None | Some(ValueSrc::Value))) {
        return None;
    }
    let ascending = values.windows(2).all(|pair| match (&pair[0], &pair[1]) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a <= b,
        (Some(Value::String(a)), Some(Value::String(b))) => a <= b,
        _ => true,
    });
    (!ascending).then(|| "Invalid range".to_string())
}
