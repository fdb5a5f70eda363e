//! The declarative schema: settings, types, fields, operators and functions.
//!
//! The schema is read-only input to the engine. It deserialises from the
//! camelCase JSON/YAML layout used by query-builder configs:
//!
//! ```rust
//! use querytree::schema::Schema;
//! let schema = Schema::from_yaml_str(r#"
//! types:
//!   number: { operators: [equal, between], defaultOperator: equal }
//! fields:
//!   num: { type: number }
//! operators:
//!   equal: { label: "==" }
//!   between: { label: BETWEEN, cardinality: 2, isRange: true }
//! "#).unwrap();
//! let info = schema.field_info(&"num".into()).unwrap();
//! assert_eq!(info.operators, vec!["equal", "between"]);
//! assert_eq!(schema.cardinality(Some("between")), Some(2));
//! ```

use std::collections::BTreeMap;
use std::path::Path as FsPath;

use serde::{Deserialize, Serialize};

use crate::diagnostics::QueryError;
use crate::err_msg;
use crate::value::{FieldRef, Value, ValueSrc};

/// Widget types whose values are drawn from an enumerated list.
pub const SELECT_TYPES: &[&str] = &["select", "multiselect", "treeselect", "treemultiselect"];

pub fn is_select_type(value_type: &str) -> bool {
    SELECT_TYPES.contains(&value_type)
}

/// Operator strategies tried, in order, when the field of a rule changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpStrategy {
    Keep,
    Default,
    First,
}

/// How a `!group` field aggregates over its nested rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupMode {
    Some,
    Array,
    Struct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub should_create_empty_group: bool,
    pub can_leave_empty_group: bool,
    pub max_number_of_cases: Option<usize>,
    pub max_number_of_rules: Option<usize>,
    pub max_nesting: Option<usize>,
    pub keep_input_on_change_field_src: bool,
    pub field_separator: String,
    pub set_op_on_change_field: Vec<OpStrategy>,
    pub show_error_message: bool,
    pub can_regroup: bool,
    pub default_conjunction: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            should_create_empty_group: false,
            can_leave_empty_group: false,
            max_number_of_cases: None,
            max_number_of_rules: None,
            max_nesting: None,
            keep_input_on_change_field_src: true,
            field_separator: ".".to_string(),
            set_op_on_change_field: vec![OpStrategy::Keep, OpStrategy::Default],
            show_error_message: false,
            can_regroup: true,
            default_conjunction: "AND".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldSettings {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub list_values: Option<Vec<ListItem>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TypeConfig {
    pub operators: Vec<String>,
    pub default_operator: Option<String>,
    pub value_sources: Option<Vec<ValueSrc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldConfig {
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub field_type: String,
    pub operators: Option<Vec<String>>,
    pub default_operator: Option<String>,
    pub default_value: Option<Value>,
    pub value_sources: Option<Vec<ValueSrc>>,
    pub field_settings: FieldSettings,
    pub subfields: BTreeMap<String, FieldConfig>,
    pub mode: Option<GroupMode>,
    pub initial_empty_where: bool,
    pub max_nesting: Option<usize>,
    pub max_number_of_rules: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OperatorOptions {
    pub defaults: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OperatorConfig {
    pub label: Option<String>,
    pub cardinality: usize,
    /// Values must be in ascending order (e.g. `between`).
    pub is_range: bool,
    /// Widget type override, e.g. `multiselect` for `select_any_in`.
    pub value_type: Option<String>,
    pub options: Option<OperatorOptions>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            label: None,
            cardinality: 1,
            is_range: false,
            value_type: None,
            options: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FuncArgConfig {
    pub key: String,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub arg_type: String,
    pub default_value: Option<Value>,
    pub is_optional: bool,
    pub value_sources: Option<Vec<ValueSrc>>,
    pub field_settings: FieldSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FuncConfig {
    pub label: Option<String>,
    pub return_type: String,
    pub args: Vec<FuncArgConfig>,
}

impl FuncConfig {
    pub fn arg(&self, key: &str) -> Option<&FuncArgConfig> {
        self.args.iter().find(|a| a.key == key)
    }
}

/// Resolved view of a left-hand side, whether a plain field or a function.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub field_type: String,
    pub operators: Vec<String>,
    pub default_operator: Option<String>,
    pub default_value: Option<Value>,
    pub value_sources: Vec<ValueSrc>,
    pub settings: FieldSettings,
    pub mode: Option<GroupMode>,
    pub initial_empty_where: bool,
    pub max_nesting: Option<usize>,
    pub max_number_of_rules: Option<usize>,
    pub is_func: bool,
}

impl FieldInfo {
    pub fn is_group(&self) -> bool {
        self.field_type == "!group"
    }

    /// Field type usable for operator lookup; `None` for `!group`/`!struct`.
    pub fn comparable_type(&self) -> Option<&str> {
        match self.field_type.as_str() {
            "!group" | "!struct" => None,
            t => Some(t),
        }
    }

    pub fn default_value_src(&self) -> ValueSrc {
        if self.value_sources.is_empty() || self.value_sources.contains(&ValueSrc::Value) {
            ValueSrc::Value
        } else {
            self.value_sources[0]
        }
    }

    pub fn allows_value_src(&self, src: ValueSrc) -> bool {
        self.value_sources.is_empty() || self.value_sources.contains(&src)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Schema {
    pub settings: Settings,
    pub types: BTreeMap<String, TypeConfig>,
    pub fields: BTreeMap<String, FieldConfig>,
    pub operators: BTreeMap<String, OperatorConfig>,
    pub funcs: BTreeMap<String, FuncConfig>,
}

impl Schema {
    pub fn from_json_str(source: &str) -> Result<Self, QueryError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, QueryError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Loads a schema file; `.yaml`/`.yml` are read as YAML, anything else as JSON.
    pub fn from_path(path: &FsPath) -> Result<Self, QueryError> {
        let source = std::fs::read_to_string(path)?;
        let schema = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&source)?,
            _ => Self::from_json_str(&source)?,
        };
        schema.check()?;
        Ok(schema)
    }

    /// Reports operators referenced by types or fields that are not defined.
    pub fn check(&self) -> Result<(), QueryError> {
        for (name, ty) in &self.types {
            for op in &ty.operators {
                if !self.operators.contains_key(op) {
                    return Err(err_msg!(Schema, "type {} refers to unknown operator {}", name, op));
                }
            }
        }
        let mut stack: Vec<(String, &FieldConfig)> =
            self.fields.iter().map(|(k, v)| (k.clone(), v)).collect();
        while let Some((key, field)) = stack.pop() {
            for op in field.operators.iter().flatten() {
                if !self.operators.contains_key(op) {
                    return Err(err_msg!(Schema, "field {} refers to unknown operator {}", key, op));
                }
            }
            for (sub, config) in &field.subfields {
                stack.push((format!("{key}{}{sub}", self.settings.field_separator), config));
            }
        }
        Ok(())
    }

    pub fn field_config(&self, key: &str) -> Option<&FieldConfig> {
        let mut segments = key.split(self.settings.field_separator.as_str());
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            current = current.subfields.get(segment)?;
        }
        Some(current)
    }

    pub fn operator(&self, key: &str) -> Option<&OperatorConfig> {
        self.operators.get(key)
    }

    pub fn func(&self, key: &str) -> Option<&FuncConfig> {
        self.funcs.get(key)
    }

    pub fn operators_for_type(&self, field_type: &str) -> Vec<String> {
        self.types
            .get(field_type)
            .map(|t| t.operators.clone())
            .unwrap_or_default()
    }

    /// Cardinality of an operator; `None` when the operator is unset or unknown.
    pub fn cardinality(&self, operator: Option<&str>) -> Option<usize> {
        operator.and_then(|op| self.operator(op)).map(|o| o.cardinality)
    }

    /// Default operator options, or `None` when the operator declares none.
    pub fn default_operator_options(&self, operator: Option<&str>) -> Option<im::OrdMap<String, Value>> {
        let options = operator.and_then(|op| self.operator(op))?.options.as_ref()?;
        Some(
            options
                .defaults
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    pub fn field_info(&self, field: &FieldRef) -> Option<FieldInfo> {
        match field {
            FieldRef::Name(key) => {
                let config = self.field_config(key)?;
                let type_config = self.types.get(&config.field_type);
                let operators = config
                    .operators
                    .clone()
                    .unwrap_or_else(|| self.operators_for_type(&config.field_type));
                let type_default = type_config
                    .and_then(|t| t.default_operator.clone())
                    .filter(|op| operators.contains(op));
                Some(FieldInfo {
                    field_type: config.field_type.clone(),
                    default_operator: config.default_operator.clone().or(type_default),
                    operators,
                    default_value: config.default_value.clone(),
                    value_sources: config
                        .value_sources
                        .clone()
                        .or_else(|| type_config.and_then(|t| t.value_sources.clone()))
                        .unwrap_or_default(),
                    settings: config.field_settings.clone(),
                    mode: config.mode,
                    initial_empty_where: config.initial_empty_where,
                    max_nesting: config.max_nesting,
                    max_number_of_rules: config.max_number_of_rules,
                    is_func: false,
                })
            }
            FieldRef::Func(func) => {
                let config = self.func(&func.func)?;
                let type_config = self.types.get(&config.return_type);
                Some(FieldInfo {
                    field_type: config.return_type.clone(),
                    operators: self.operators_for_type(&config.return_type),
                    default_operator: type_config.and_then(|t| t.default_operator.clone()),
                    default_value: None,
                    value_sources: type_config
                        .and_then(|t| t.value_sources.clone())
                        .unwrap_or_default(),
                    settings: FieldSettings::default(),
                    mode: None,
                    initial_empty_where: false,
                    max_nesting: None,
                    max_number_of_rules: None,
                    is_func: true,
                })
            }
        }
    }

    /// Widget value type for a field/operator pair: the operator override, else the field type.
    pub fn value_type_for(&self, field_type: Option<&str>, operator: Option<&str>) -> Option<String> {
        operator
            .and_then(|op| self.operator(op))
            .and_then(|o| o.value_type.clone())
            .or_else(|| field_type.map(str::to_string))
    }
}
