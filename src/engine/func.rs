//! Nested function values on either side of a rule.
//!
//! A function value is addressed by the rule path, a slot (the left-hand
//! side or one value slot) and a chain of `(func key, arg key)` hops leading
//! from the stored value to the innermost function being edited. Every hop
//! is checked against the stored function key; a mismatch means the caller
//! holds a stale chain and is reported as [`QueryError::FuncChainMismatch`].

use crate::diagnostics::{QueryError, Side};
use crate::engine::coerce::ValidateOptions;
use crate::engine::rule::{set_field, set_value};
use crate::engine::validation::validate_func;
use crate::engine::EditMeta;
use crate::ids::IdGenerator;
use crate::schema::Schema;
use crate::tree::{Path, Tree};
use crate::value::{ArgValue, FieldRef, FuncValue, Value, ValueSrc};

/// Which side of the rule holds the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncSlot {
    Field,
    Value(usize),
}

impl FuncSlot {
    /// `-1` addresses the left-hand side.
    pub fn from_delta(delta: isize) -> Option<Self> {
        match delta {
            -1 => Some(FuncSlot::Field),
            d => usize::try_from(d).ok().map(FuncSlot::Value),
        }
    }

    fn side(&self) -> Side {
        match self {
            FuncSlot::Field => Side::Lhs,
            FuncSlot::Value(_) => Side::Rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FuncEdit {
    /// Replaces the function; `None` clears it.
    Replace(Option<String>),
    ArgValue {
        arg: String,
        value: Option<Value>,
        async_list_values: Option<Vec<Value>>,
    },
    ArgValueSrc {
        arg: String,
        src: Option<ValueSrc>,
    },
}

/// Switches to function `key`, keeping arguments of the same key and
/// filling defaults for the rest. Arguments that no longer validate are
/// dropped.
pub fn set_func(schema: &Schema, current: Option<&FuncValue>, key: &str) -> Option<FuncValue> {
    let config = schema.func(key)?;
    let mut func = FuncValue::new(key);
    for arg in &config.args {
        let kept = current
            .and_then(|c| c.args.get(&arg.key))
            .filter(|a| a.value.is_some())
            .cloned();
        if let Some(kept) = kept {
            func.args.insert(arg.key.clone(), kept);
        } else if let Some(default) = &arg.default_value {
            func = func.with_arg(arg.key.clone(), default.clone(), ValueSrc::Value);
        }
    }
    let opts = ValidateOptions {
        can_fix: true,
        is_end_value: false,
        can_drop_args: true,
    };
    Some(validate_func(schema, &func, None, opts).0)
}

pub fn set_arg_value(
    mut func: FuncValue,
    arg: &str,
    value: Option<Value>,
    async_list_values: Option<Vec<Value>>,
) -> FuncValue {
    let mut entry = func.args.get(arg).cloned().unwrap_or_default();
    if entry.value_src.is_none() {
        entry.value_src = Some(match &value {
            Some(Value::Func(_)) => ValueSrc::Func,
            _ => ValueSrc::Value,
        });
    }
    entry.value = value;
    if async_list_values.is_some() {
        entry.async_list_values = async_list_values;
    }
    func.args.insert(arg.to_string(), entry);
    func
}

/// Sets an argument's source and clears its value.
pub fn set_arg_value_src(mut func: FuncValue, arg: &str, src: Option<ValueSrc>) -> FuncValue {
    func.args.insert(
        arg.to_string(),
        ArgValue {
            value: None,
            value_src: src,
            async_list_values: None,
        },
    );
    func
}

fn chain_label(hops: &[(String, String)]) -> String {
    if hops.is_empty() {
        return "root".to_string();
    }
    hops.iter()
        .map(|(f, a)| format!("{f}({a})"))
        .collect::<Vec<_>>()
        .join("/")
}

/// Edits a (possibly nested) function value and routes the rebuilt value
/// back through [`set_field`] or [`set_value`].
#[allow(clippy::too_many_arguments)]
pub fn set_func_value(
    tree: &Tree,
    schema: &Schema,
    ids: &mut IdGenerator,
    path: &Path,
    slot: FuncSlot,
    parent_funcs: &[(String, String)],
    edit: FuncEdit,
    mut meta: EditMeta,
) -> Result<Tree, QueryError> {
    let Some(condition) = tree.resolve(path).and_then(|n| n.properties.condition()) else {
        tracing::debug!(%path, "set func value: stale path");
        return Ok(tree.clone());
    };
    let side = slot.side();
    let stored: Option<FuncValue> = match slot {
        FuncSlot::Field => condition.field.as_ref().and_then(FieldRef::as_func).cloned(),
        FuncSlot::Value(delta) => condition
            .value
            .get(delta)
            .and_then(|v| v.as_ref())
            .and_then(Value::as_func)
            .cloned(),
    };

    // Inwards: collect every parent on the way to the edited function.
    let mut parents: Vec<(String, FuncValue)> = Vec::new();
    let mut target = stored;
    for (depth, (func_key, arg_key)) in parent_funcs.iter().enumerate() {
        let found = target.as_ref().map(|f| f.func.clone());
        let Some(current) = target.filter(|f| &f.func == func_key) else {
            return Err(QueryError::FuncChainMismatch {
                side,
                chain: chain_label(&parent_funcs[..=depth]),
                expected: func_key.clone(),
                found,
            });
        };
        target = current.arg_value(arg_key).and_then(Value::as_func).cloned();
        parents.push((arg_key.clone(), current));
    }

    let edited = match edit {
        FuncEdit::Replace(None) => {
            meta.can_drop_args = true;
            None
        }
        FuncEdit::Replace(Some(key)) => {
            let Some(func) = set_func(schema, target.as_ref(), &key) else {
                tracing::warn!(func = %key, "no config for function");
                return Ok(tree.clone());
            };
            meta.can_drop_args = true;
            Some(func)
        }
        FuncEdit::ArgValue { arg, value, async_list_values } => {
            let func = editable(schema, target, side, parent_funcs)?;
            let Some(func) = func.filter(|f| has_arg(schema, f, &arg)) else {
                return Ok(tree.clone());
            };
            Some(set_arg_value(func, &arg, value, async_list_values))
        }
        FuncEdit::ArgValueSrc { arg, src } => {
            let func = editable(schema, target, side, parent_funcs)?;
            let Some(func) = func.filter(|f| has_arg(schema, f, &arg)) else {
                return Ok(tree.clone());
            };
            Some(set_arg_value_src(func, &arg, src))
        }
    };

    // Outwards: rebuild each parent around the edited value.
    let mut rebuilt = edited;
    while let Some((arg_key, parent)) = parents.pop() {
        let src_value = rebuilt.map(Value::Func);
        rebuilt = Some(set_arg_value(parent, &arg_key, src_value, None));
    }

    Ok(match slot {
        FuncSlot::Field => set_field(tree, schema, ids, path, rebuilt.map(FieldRef::Func), None, meta),
        FuncSlot::Value(delta) => set_value(tree, schema, path, delta, rebuilt.map(Value::Func), None, None, meta),
    })
}

/// The function an argument edit applies to; editing an argument where no
/// function is stored is a stale chain.
fn editable(
    schema: &Schema,
    target: Option<FuncValue>,
    side: Side,
    parent_funcs: &[(String, String)],
) -> Result<Option<FuncValue>, QueryError> {
    let Some(func) = target else {
        return Err(QueryError::FuncChainMismatch {
            side,
            chain: chain_label(parent_funcs),
            expected: parent_funcs
                .last()
                .map(|(f, _)| f.clone())
                .unwrap_or_else(|| "a function".to_string()),
            found: None,
        });
    };
    if schema.func(&func.func).is_none() {
        tracing::warn!(func = %func.func, "no config for function");
        return Ok(None);
    }
    Ok(Some(func))
}

fn has_arg(schema: &Schema, func: &FuncValue, arg: &str) -> bool {
    let known = schema.func(&func.func).is_some_and(|c| c.arg(arg).is_some());
    if !known {
        tracing::warn!(func = %func.func, %arg, "no config for function argument");
    }
    known
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeSpec;

    const SCHEMA: &str = r#"
types:
  text: { operators: [equal, like], defaultOperator: equal }
fields:
  str: { type: text }
  name: { type: text }
operators:
  equal: {}
  like: {}
funcs:
  LOWER:
    returnType: text
    args: [{ key: str, type: text }]
  UPPER:
    returnType: text
    args: [{ key: str, type: text }]
"#;

    fn setup(field: &str) -> (Schema, Tree, Path) {
        let schema = Schema::from_yaml_str(SCHEMA).unwrap();
        let json = format!(
            r#"{{"type": "group", "id": "root", "children1": [
                {{"type": "rule", "id": "r", "properties": {{"field": {field}, "fieldSrc": "func", "operator": "equal", "value": ["aaa"], "valueSrc": ["value"], "valueType": ["text"]}}}}
            ]}}"#
        );
        let spec: NodeSpec = serde_json::from_str(&json).unwrap();
        let tree = Tree::from_spec(spec, &mut IdGenerator::from_seed(1)).unwrap();
        (schema, tree, ["r"].into_iter().collect())
    }

    #[test]
    fn nested_arg_edit_rebuilds_chain() {
        let (schema, tree, path) = setup(
            r#"{"func": "UPPER", "args": {"str": {"valueSrc": "func", "value": {"func": "LOWER", "args": {}}}}}"#,
        );
        let chain = vec![("UPPER".to_string(), "str".to_string())];
        let next = set_func_value(
            &tree,
            &schema,
            &mut IdGenerator::from_seed(2),
            &path,
            FuncSlot::Field,
            &chain,
            FuncEdit::ArgValue {
                arg: "str".into(),
                value: Some("name".into()),
                async_list_values: None,
            },
            EditMeta::default(),
        )
        .unwrap();
        let field = next.resolve(&path).unwrap().properties.field().unwrap().clone();
        let upper = field.as_func().unwrap();
        let lower = upper.arg_value("str").and_then(Value::as_func).unwrap();
        assert_eq!(lower.arg_value("str"), Some(&Value::from("name")));
    }

    #[test]
    fn mismatched_chain_is_fatal() {
        let (schema, tree, path) = setup(r#"{"func": "LOWER", "args": {}}"#);
        let chain = vec![("UPPER".to_string(), "str".to_string())];
        let err = set_func_value(
            &tree,
            &schema,
            &mut IdGenerator::from_seed(2),
            &path,
            FuncSlot::Field,
            &chain,
            FuncEdit::Replace(Some("LOWER".into())),
            EditMeta::default(),
        )
        .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "in LHS for path UPPER(str) expected func key UPPER but got LOWER"
        );
    }

    #[test]
    fn delta_maps_to_slots() {
        assert_eq!(FuncSlot::from_delta(-1), Some(FuncSlot::Field));
        assert_eq!(FuncSlot::from_delta(1), Some(FuncSlot::Value(1)));
        assert_eq!(FuncSlot::from_delta(-2), None);
    }
}
