//! RacketLite - strictly typed S-expression evaluator
//!
//! This crate parses parenthesized prefix-notation programs (a small, strict subset of
//! Racket's teaching languages) into an [`ast::Expr`] tree and evaluates that tree to a
//! typed [`ast::Value`]. It supports arithmetic over an exact/inexact numeric tower,
//! boolean logic, string operations, conversion built-ins and user-defined, recursive
//! functions.
//!
//! ```scheme
//! (+ 1 2 3)                                   ; 6
//! (<= 1 2 3)                                  ; true
//! (cos 0)                                     ; #i1.0
//! (boolean->string #t)                        ; "true"
//! (define (fact n) (if (<= n 1) 1 (* n (fact (sub1 n)))))
//! (fact 5)                                    ; 120
//! ```
//!
//! ## Two Entry Points
//!
//! - [`scheme::parse`] turns text into an expression tree. A text that no grammar form
//!   accepts yields `None`; this is an expected outcome, not an error.
//! - [`evaluator::evaluate`] evaluates a tree against an [`evaluator::Environment`]
//!   (the per-session registry of user-defined functions).
//!
//! [`interpreter::Interpreter`] bundles both for callers that just want
//! "text in, value out".
//!
//! ## Strict Typing
//!
//! - Operator arity and statically knowable operand kinds are checked while parsing,
//!   so `(not 1 2)` and `(boolean->string 5)` never produce a tree.
//! - No coercion between numbers, booleans and strings at runtime; a mismatch is a
//!   [`Error::TypeConversion`].
//! - Numbers carry `is_exact`/`is_rational` flags. Exact inputs stay exact through
//!   exactness-preserving arithmetic; real-only functions such as `cos` always produce
//!   inexact results, rendered with an `#i` prefix.
//!
//! ## Modules
//!
//! - `ast`: operands, runtime values and expression nodes
//! - `splitter`: top-level sub-expression splitting and parenthesis balance
//! - `builtinops`: ordered catalog of built-in operator forms
//! - `scheme`: grammar dispatch from text to expression trees
//! - `evaluator`: tree-walking evaluation and the user-defined function registry
//! - `interpreter`: session facade used by read loops and file loaders

use crate::ast::OperandKind;

/// Maximum parenthesis nesting accepted by the splitter and grammar
pub const MAX_PARSE_DEPTH: usize = 64;

/// Default maximum evaluation depth. Each nested expression and each user-defined call
/// counts one level; runaway recursion reports [`Error::DepthExceeded`] instead of
/// exhausting the host stack. Sized to fit a 2 MB thread stack in unoptimized builds.
pub const MAX_EVAL_DEPTH: usize = 256;

/// Error types for the interpreter
///
/// A grammar mismatch is deliberately absent: parsing reports "no match" as `None`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// An operand's tag does not match what an operation requires
    #[error("TypeConversionError: expected {expected}, found {found}")]
    TypeConversion {
        found: OperandKind,
        expected: OperandKind,
    },
    /// A call names a function absent from the registry at evaluation time
    #[error("UnknownFunctionError: {0} is not defined")]
    UnknownFunction(String),
    /// An operation was invoked without an operand it requires
    #[error("NullOperandError: {0}")]
    NullOperand(String),
    /// A user-defined call whose arity could only be checked at evaluation time
    #[error("ArityError: {name} expected {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
    /// Domain errors such as division by zero or an index out of range
    #[error("EvaluationError: {0}")]
    Eval(String),
    /// Evaluation nested deeper than the environment allows
    #[error("EvaluationError: maximum evaluation depth exceeded (max: {limit})")]
    DepthExceeded { limit: usize },
    /// Text handed to the [`interpreter::Interpreter`] matched no grammar form
    #[error("ParseError: no expression matches '{0}'")]
    NoExpression(String),
    /// Program text could not be split into top-level forms
    #[error("ParseError: {0}")]
    Split(#[from] splitter::SplitError),
}

impl Error {
    /// Create a TypeConversion error
    pub fn type_conversion(found: OperandKind, expected: OperandKind) -> Self {
        Error::TypeConversion { found, expected }
    }

    /// Create an Arity error for a named function
    pub fn arity_error(name: impl Into<String>, expected: usize, got: usize) -> Self {
        Error::Arity {
            name: name.into(),
            expected,
            got,
        }
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod interpreter;
pub mod scheme;
pub mod splitter;

pub use ast::{Expr, Number, Operand, Value};
pub use evaluator::{Environment, evaluate};
pub use interpreter::Interpreter;
pub use scheme::{ParseConfig, parse};
