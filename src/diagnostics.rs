//! Unified, `miette`-based error type for the querytree engine.
//!
//! # Error classes
//!
//! Only programmer errors and loading failures become a [`QueryError`]:
//!
//! - **Fatal internal-consistency errors**: creating the reserved
//!   `switch_group` type through a command, or a nested function chain whose
//!   expected function key does not match the stored one.
//! - **Loading errors**: malformed trees, schemas, JSON/YAML, I/O.
//!
//! Stale paths and unknown schema entries are *not* errors; the engine logs
//! them through `tracing` and returns the input snapshot unchanged. Invalid
//! user values are never errors either; they are recorded in the tree as
//! slot-indexed messages (see [`crate::engine::validation`]).
//!
//! # Construction
//!
//! Use `err_msg!` for message-only variants:
//!
//! ```rust
//! use querytree::err_msg;
//! let err = err_msg!(InvalidTree, "root must be a group, got {}", "rule");
//! assert!(matches!(err, querytree::QueryError::InvalidTree { .. }));
//! ```

use miette::Diagnostic;
use thiserror::Error;

use crate::tree::NodeType;

/// Which side of a rule a function chain was addressed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Lhs,
    Rhs,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Lhs => write!(f, "LHS"),
            Side::Rhs => write!(f, "RHS"),
        }
    }
}

/// Unified error type for all querytree failure modes.
#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    #[error("can't add {node_type} programmatically")]
    #[diagnostic(
        code(querytree::reserved_type),
        help("`switch_group` may only appear as the root of a loaded tree")
    )]
    ReservedNodeType { node_type: NodeType },

    #[error("in {side} for path {chain} expected func key {expected} but got {}", .found.as_deref().unwrap_or("nothing"))]
    #[diagnostic(
        code(querytree::func_chain),
        help("the command refers to a function chain from a stale snapshot")
    )]
    FuncChainMismatch {
        side: Side,
        chain: String,
        expected: String,
        found: Option<String>,
    },

    #[error("invalid tree: {message}")]
    #[diagnostic(code(querytree::tree))]
    InvalidTree { message: String },

    #[error("schema error: {message}")]
    #[diagnostic(code(querytree::schema))]
    Schema { message: String },

    #[error("malformed JSON")]
    #[diagnostic(code(querytree::json))]
    Json(#[from] serde_json::Error),

    #[error("malformed YAML")]
    #[diagnostic(code(querytree::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("i/o failure")]
    #[diagnostic(code(querytree::io))]
    Io(#[from] std::io::Error),
}

impl QueryError {
    /// True for errors that indicate a bug in the caller rather than bad input.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            QueryError::ReservedNodeType { .. } | QueryError::FuncChainMismatch { .. }
        )
    }
}

/// Constructs a message-only `QueryError` variant (`InvalidTree` or `Schema`).
#[macro_export]
macro_rules! err_msg {
    ($variant:ident, $msg:expr) => {
        $crate::QueryError::$variant {
            message: format!("{}", $msg),
        }
    };
    ($variant:ident, $fmt:expr, $($arg:expr),+ $(,)?) => {
        $crate::QueryError::$variant {
            message: format!($fmt, $($arg),+),
        }
    };
}
