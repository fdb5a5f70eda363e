//! The mutation engine: pure functions from one tree snapshot to the next.
//!
//! ## Conventions
//!
//! Every operation first resolves its path against the input tree. A path
//! that resolves to nothing is a stale reference and the input snapshot is
//! returned unchanged (pointer-equal, see [`crate::tree::Tree::ptr_eq`]).
//! Soft policies such as nesting or rule limits behave the same way.
//!
//! Only programmer errors surface as `Err`: creating the reserved
//! `switch_group` type, or a function chain that does not match the stored
//! value. Everything else is either a logged no-op or a value issue stored in
//! the tree.
//!
//! ## Modules
//!
//! - [`structure`]: add/remove, negation, locks, conjunctions, empty groups
//! - [`rule`]: field, operator and value edits
//! - [`func`]: nested function values on either side of a rule
//! - [`coerce`]: the one place that decides whether a value survives a change
//! - [`validation`]: single-value, function and range checks
//! - [`moving`]: drag-and-drop reparenting

pub mod coerce;
pub mod func;
pub mod moving;
pub mod rule;
pub mod structure;
pub mod validation;

use serde::{Deserialize, Serialize};

pub use coerce::{coerce_value, ChangeKind, Coerced, ValidateOptions};
pub use func::{set_func_value, FuncEdit, FuncSlot};
pub use moving::{move_item, Placement, Topology};
pub use rule::{
    set_field, set_field_src, set_operator, set_operator_option, set_value, set_value_src,
    validate_tree,
};
pub use structure::{
    add_item, add_new_group, check_empty_groups, normalize_tree, remove_group, remove_item,
    remove_rule, set_conjunction, set_lock, set_not,
};
pub use validation::{validate_range, validate_value, ValueIssue};

/// Flags carried by value edits coming from a widget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditMeta {
    /// The user finished editing; missing required arguments are reported.
    pub is_end_value: bool,
    /// Invalid function arguments may be dropped instead of reported.
    pub can_drop_args: bool,
}

/// Flags carried by group additions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GroupMeta {
    /// The new case group is the trailing default branch and gets no children.
    pub is_default_case: bool,
}
