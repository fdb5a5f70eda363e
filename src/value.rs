//! Literal values, function applications and field references.

use std::fmt;

use im::OrdMap;
use serde::{Deserialize, Serialize};

/// A value stored in a rule slot or a function argument.
///
/// Deserialises from plain JSON: booleans, numbers, strings, arrays, and
/// objects of the shape `{"func": "...", "args": {...}}`.
///
/// # Examples
///
/// ```rust
/// use querytree::value::Value;
/// let n = Value::Number(3.0);
/// assert_eq!(n.type_name(), "Number");
/// assert_eq!(n.to_string(), "3");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Func(FuncValue),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Func(_) => "Func",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&FuncValue> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }

    /// Display form used in query strings: strings are quoted.
    pub fn quoted(&self) -> String {
        match self {
            Value::String(s) => format!("{s:?}"),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::quoted).collect();
                format!("[{}]", inner.join(", "))
            }
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::String(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Func(func) => write!(f, "{func}"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Where a right-hand-side value (or a function argument) comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSrc {
    Value,
    Field,
    Func,
    Const,
}

/// Where a rule's left-hand side comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSrc {
    Field,
    Func,
    Value,
}

/// One argument of a function application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArgValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_src: Option<ValueSrc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub async_list_values: Option<Vec<Value>>,
}

/// A (possibly nested) function application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncValue {
    pub func: String,
    #[serde(default)]
    pub args: OrdMap<String, ArgValue>,
}

impl FuncValue {
    pub fn new(func: impl Into<String>) -> Self {
        Self {
            func: func.into(),
            args: OrdMap::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: Value, src: ValueSrc) -> Self {
        self.args.insert(
            key.into(),
            ArgValue {
                value: Some(value),
                value_src: Some(src),
                async_list_values: None,
            },
        );
        self
    }

    pub fn arg_value(&self, key: &str) -> Option<&Value> {
        self.args.get(key).and_then(|a| a.value.as_ref())
    }
}

impl fmt::Display for FuncValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.func)?;
        let mut first = true;
        for arg in self.args.values() {
            let Some(value) = &arg.value else { continue };
            if !first {
                write!(f, ", ")?;
            }
            match arg.value_src {
                Some(ValueSrc::Field) | Some(ValueSrc::Func) => write!(f, "{value}")?,
                _ => write!(f, "{}", value.quoted())?,
            }
            first = false;
        }
        write!(f, ")")
    }
}

/// The left-hand side of a rule: a plain field key or a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldRef {
    Name(String),
    Func(FuncValue),
}

impl FieldRef {
    pub fn name(key: impl Into<String>) -> Self {
        FieldRef::Name(key.into())
    }

    /// Joins key segments with the schema's field separator.
    pub fn from_segments<S: AsRef<str>>(segments: &[S], separator: &str) -> Self {
        let parts: Vec<&str> = segments.iter().map(AsRef::as_ref).collect();
        FieldRef::Name(parts.join(separator))
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            FieldRef::Name(n) => Some(n),
            FieldRef::Func(_) => None,
        }
    }

    pub fn as_func(&self) -> Option<&FuncValue> {
        match self {
            FieldRef::Func(f) => Some(f),
            FieldRef::Name(_) => None,
        }
    }
}

impl From<&str> for FieldRef {
    fn from(value: &str) -> Self {
        FieldRef::Name(value.to_string())
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Name(n) => write!(f, "{n}"),
            FieldRef::Func(func) => write!(f, "{func}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_values_parse_from_plain_json() {
        let v: Value = serde_json::from_str("[1, \"a\", true]").unwrap();
        assert_eq!(
            v,
            Value::List(vec![Value::Number(1.0), "a".into(), Value::Bool(true)])
        );

        let f: Value = serde_json::from_str(
            r#"{"func": "LOWER", "args": {"str": {"value": "str", "valueSrc": "field"}}}"#,
        )
        .unwrap();
        let func = f.as_func().unwrap();
        assert_eq!(func.func, "LOWER");
        assert_eq!(func.args["str"].value_src, Some(ValueSrc::Field));
    }

    #[test]
    fn function_display() {
        let f = FuncValue::new("LOWER").with_arg("str", "str".into(), ValueSrc::Field);
        assert_eq!(f.to_string(), "LOWER(str)");
        let g = FuncValue::new("LOWER2")
            .with_arg("a", "str".into(), ValueSrc::Field)
            .with_arg("def", Value::Number(11.0), ValueSrc::Value);
        assert_eq!(g.to_string(), "LOWER2(str, 11)");
    }

    #[test]
    fn segments_join_with_separator() {
        assert_eq!(
            FieldRef::from_segments(&["user", "name"], "."),
            FieldRef::name("user.name")
        );
    }
}
