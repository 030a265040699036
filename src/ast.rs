//! This module defines the operand and value types of the interpreter together with the
//! expression tree produced by the parser.
//!
//! - [`Number`] carries a floating value plus the `is_exact`/`is_rational` flag pair that
//!   makes up the whole numeric tower.
//! - [`Operand`] is the tagged currency of evaluation. Every builtin receives and
//!   returns operands; the free functions [`as_number`], [`as_boolean`], [`as_string`]
//!   and [`as_natural`] are the only way to look inside one, and each fails with a
//!   typed [`Error::TypeConversion`] instead of guessing.
//! - [`Value`] is what a top-level evaluation hands back to the caller.
//! - [`Expr`] is the immutable, strictly acyclic syntax tree.

use crate::Error;
use crate::builtinops::BuiltinOp;
use std::fmt;
use std::sync::Arc;

/// Prefix rendered in front of inexact numbers
pub const INEXACT_PREFIX: &str = "#i";

/// Prefix accepted on literals to force exactness
pub(crate) const EXACT_PREFIX: &str = "#e";

/// Allowed non-alphanumeric characters in identifiers
pub(crate) const SYMBOL_SPECIAL_CHARS: &str = "+-*/<>=!?_$%&^~:";

/// Check if a string is a valid identifier
/// Valid: non-empty, no leading digit, no "-digit"/"+digit" prefix, alphanumeric + SYMBOL_SPECIAL_CHARS
pub(crate) fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        None => false,
        Some(first_char) => {
            if first_char.is_ascii_digit() {
                return false;
            }

            if (first_char == '-' || first_char == '+')
                && let Some(second_char) = chars.next()
                && second_char.is_ascii_digit()
            {
                return false;
            }

            name.chars()
                .all(|c| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
        }
    }
}

/// A number of the numeric tower: a float plus exactness metadata.
///
/// There is no separate rational representation. `is_exact` and `is_rational` are
/// advisory flags that drive rendering and some builtins' output policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Number {
    pub value: f64,
    pub is_exact: bool,
    pub is_rational: bool,
}

impl Number {
    /// Build a number from its parts. Exact numbers have no signed zero, so an exact
    /// `-0.0` is stored as `0.0`.
    pub fn new(value: f64, is_exact: bool, is_rational: bool) -> Self {
        let value = if is_exact && value == 0.0 { 0.0 } else { value };
        Number {
            value,
            is_exact,
            is_rational,
        }
    }

    /// An exact number; rational whenever the value is finite
    pub fn exact(value: f64) -> Self {
        Number::new(value, true, value.is_finite())
    }

    /// An inexact number; rational whenever the value is finite
    pub fn inexact(value: f64) -> Self {
        Number::new(value, false, value.is_finite())
    }

    /// Result of an exactness-preserving operation over `inputs`
    pub(crate) fn propagate(value: f64, inputs: &[Number]) -> Self {
        let is_exact = inputs.iter().all(|n| n.is_exact);
        let is_rational = value.is_finite() && inputs.iter().all(|n| n.is_rational);
        Number::new(value, is_exact, is_rational)
    }

    /// Result of a real-only operation: never exact, rationality kept from the input
    pub(crate) fn real_only(value: f64, input: Number) -> Self {
        Number::new(value, false, input.is_rational && value.is_finite())
    }

    pub fn is_integer(&self) -> bool {
        self.value.is_finite() && self.value.fract() == 0.0
    }

    /// Source form that parses back to the same number and flags
    fn fmt_source(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact && self.value.is_finite() && !self.is_integer() {
            write!(f, "{EXACT_PREFIX}{}", self.value)
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.value;
        if n.is_nan() {
            write!(f, "+nan.0")
        } else if n.is_infinite() {
            write!(f, "{}inf.0", if n > 0.0 { "+" } else { "-" })
        } else if self.is_exact {
            write!(f, "{n}")
        } else if n.fract() == 0.0 {
            write!(f, "{INEXACT_PREFIX}{n:.1}")
        } else {
            write!(f, "{INEXACT_PREFIX}{n}")
        }
    }
}

/// A non-negative integer used in counting and indexing positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Natural {
    pub value: u64,
    pub inexact: bool,
}

impl Natural {
    pub fn new(value: u64, inexact: bool) -> Self {
        Natural { value, inexact }
    }

    pub fn exact(value: u64) -> Self {
        Natural::new(value, false)
    }

    pub fn to_number(self) -> Number {
        Number::new(self.value as f64, !self.inexact, true)
    }
}

impl fmt::Display for Natural {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inexact {
            write!(f, "{INEXACT_PREFIX}{}.0", self.value)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

/// Discriminant of an operand, also used as the static kind of an expression.
///
/// `Dynamic` never tags a runtime operand. It is the static kind of expressions whose
/// result kind is only known once they run (parameter references, user-defined calls,
/// `if`), and as a requirement it means "any concrete kind".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    Number,
    Boolean,
    String,
    Natural,
    Unknown,
    Dynamic,
}

impl OperandKind {
    /// Whether an expression of kind `self` may fill a slot that requires `required`
    pub(crate) fn satisfies(self, required: OperandKind) -> bool {
        match (self, required) {
            (OperandKind::Unknown, _) => false,
            (OperandKind::Dynamic, _) | (_, OperandKind::Dynamic) => true,
            (OperandKind::Number, OperandKind::Natural)
            | (OperandKind::Natural, OperandKind::Number) => true,
            (found, required) => found == required,
        }
    }
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperandKind::Number => "number",
            OperandKind::Boolean => "boolean",
            OperandKind::String => "string",
            OperandKind::Natural => "natural",
            OperandKind::Unknown => "unknown",
            OperandKind::Dynamic => "any value",
        };
        write!(f, "{name}")
    }
}

/// Tagged operand used during evaluation and coercion
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Number(Number),
    Bool(bool),
    String(String),
    Natural(Natural),
    /// Opaque token that is not a literal (identifiers before they are resolved)
    Unknown(String),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::Number(_) => OperandKind::Number,
            Operand::Bool(_) => OperandKind::Boolean,
            Operand::String(_) => OperandKind::String,
            Operand::Natural(_) => OperandKind::Natural,
            Operand::Unknown(_) => OperandKind::Unknown,
        }
    }

    /// Source form of a literal operand (`#t` rather than `true`)
    fn fmt_source(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Number(n) => n.fmt_source(f),
            Operand::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            other => write!(f, "{other}"),
        }
    }
}

/// Write a string literal with escapes so that it reads back unchanged
fn fmt_string_literal(s: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Number(n) => write!(f, "{n}"),
            Operand::Bool(b) => write!(f, "{b}"),
            Operand::String(s) => fmt_string_literal(s, f),
            Operand::Natural(n) => write!(f, "{n}"),
            Operand::Unknown(token) => write!(f, "{token}"),
        }
    }
}

impl From<Number> for Operand {
    fn from(n: Number) -> Self {
        Operand::Number(n)
    }
}

impl From<Natural> for Operand {
    fn from(n: Natural) -> Self {
        Operand::Natural(n)
    }
}

impl From<bool> for Operand {
    fn from(b: bool) -> Self {
        Operand::Bool(b)
    }
}

impl From<String> for Operand {
    fn from(s: String) -> Self {
        Operand::String(s)
    }
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self {
        Operand::String(s.to_owned())
    }
}

/// Resolve an operand to a number. Naturals widen to numbers.
pub fn as_number(operand: &Operand) -> Result<Number, Error> {
    match operand {
        Operand::Number(n) => Ok(*n),
        Operand::Natural(n) => Ok(n.to_number()),
        other => Err(Error::type_conversion(other.kind(), OperandKind::Number)),
    }
}

pub fn as_boolean(operand: &Operand) -> Result<bool, Error> {
    match operand {
        Operand::Bool(b) => Ok(*b),
        other => Err(Error::type_conversion(other.kind(), OperandKind::Boolean)),
    }
}

pub fn as_string(operand: &Operand) -> Result<&str, Error> {
    match operand {
        Operand::String(s) => Ok(s.as_str()),
        other => Err(Error::type_conversion(other.kind(), OperandKind::String)),
    }
}

/// Resolve an operand to a natural. Numbers qualify only when they hold a
/// non-negative integer value; the natural inherits their inexactness.
pub fn as_natural(operand: &Operand) -> Result<Natural, Error> {
    match operand {
        Operand::Natural(n) => Ok(*n),
        // `u64::MAX as f64` rounds up to 2^64, which does not fit
        Operand::Number(n) if n.is_integer() && n.value >= 0.0 && n.value < u64::MAX as f64 => {
            Ok(Natural::new(n.value as u64, !n.is_exact))
        }
        other => Err(Error::type_conversion(other.kind(), OperandKind::Natural)),
    }
}

/// Runtime value handed back by a top-level evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(Number),
    Bool(bool),
    String(String),
    /// Result of a definition form
    Unspecified,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::String(s) => fmt_string_literal(s, f),
            Value::Unspecified => write!(f, "#<void>"),
        }
    }
}

impl TryFrom<Operand> for Value {
    type Error = Error;

    fn try_from(operand: Operand) -> Result<Value, Error> {
        match operand {
            Operand::Number(n) => Ok(Value::Number(n)),
            Operand::Natural(n) => Ok(Value::Number(n.to_number())),
            Operand::Bool(b) => Ok(Value::Bool(b)),
            Operand::String(s) => Ok(Value::String(s)),
            Operand::Unknown(_) => Err(Error::type_conversion(
                OperandKind::Unknown,
                OperandKind::Dynamic,
            )),
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Immutable expression node.
///
/// Builtin nodes were arity- and kind-checked by the grammar before construction, so
/// their evaluation rules index their children without re-checking.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A literal number, boolean or string
    Literal(Operand),
    /// Reference to a formal parameter of the enclosing definition
    Parameter(String),
    /// Application of a catalog operator form
    Builtin {
        op: &'static BuiltinOp,
        args: Vec<Expr>,
    },
    /// Call of a user-defined function; a bare identifier is a call with no arguments
    Call { name: String, args: Vec<Expr> },
    /// Definition form. `params` is `None` for a constant, `(define name expr)`, and
    /// the formal list for a function, `(define (name param...) body)`.
    Define {
        name: String,
        params: Option<Vec<String>>,
        body: Arc<Expr>,
    },
}

impl Expr {
    /// Operator name used for matching and diagnostics
    pub fn operator(&self) -> &str {
        match self {
            Expr::Literal(_) => "literal",
            Expr::Parameter(name) => name,
            Expr::Builtin { op, .. } => op.id,
            Expr::Call { name, .. } => name,
            Expr::Define { .. } => "define",
        }
    }

    /// Ordered argument nodes
    pub fn children(&self) -> &[Expr] {
        match self {
            Expr::Builtin { args, .. } | Expr::Call { args, .. } => args,
            Expr::Define { body, .. } => std::slice::from_ref(body.as_ref()),
            Expr::Literal(_) | Expr::Parameter(_) => &[],
        }
    }

    /// Kind this expression is known to produce before it runs
    pub fn static_kind(&self) -> OperandKind {
        match self {
            Expr::Literal(operand) => operand.kind(),
            Expr::Builtin { op, .. } => op.signature.result,
            Expr::Parameter(_) | Expr::Call { .. } => OperandKind::Dynamic,
            Expr::Define { .. } => OperandKind::Unknown,
        }
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expr::Literal(a), Expr::Literal(b)) => a == b,
            (Expr::Parameter(a), Expr::Parameter(b)) => a == b,
            (Expr::Builtin { op: op1, args: a1 }, Expr::Builtin { op: op2, args: a2 }) => {
                op1 == op2 && a1 == a2
            }
            (Expr::Call { name: n1, args: a1 }, Expr::Call { name: n2, args: a2 }) => {
                n1 == n2 && a1 == a2
            }
            (
                Expr::Define {
                    name: n1,
                    params: p1,
                    body: b1,
                },
                Expr::Define {
                    name: n2,
                    params: p2,
                    body: b2,
                },
            ) => n1 == n2 && p1 == p2 && b1 == b2,
            _ => false,
        }
    }
}

fn fmt_application(head: &str, args: &[Expr], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "({head}")?;
    for arg in args {
        write!(f, " {arg}")?;
    }
    write!(f, ")")
}

/// Source rendering; parsing the output yields an equivalent tree
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(operand) => operand.fmt_source(f),
            Expr::Parameter(name) => write!(f, "{name}"),
            Expr::Builtin { op, args } => fmt_application(op.id, args, f),
            Expr::Call { name, args } => fmt_application(name, args, f),
            Expr::Define { name, params, body } => match params {
                None => write!(f, "(define {name} {body})"),
                Some(params) => {
                    write!(f, "(define ({name}")?;
                    for param in params {
                        write!(f, " {param}")?;
                    }
                    write!(f, ") {body})")
                }
            },
        }
    }
}

/// Helper for building exact numeric operands in code and tests
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn num(value: f64) -> Operand {
    Operand::Number(Number::exact(value))
}

/// Helper for building inexact numeric operands in code and tests
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn inexact(value: f64) -> Operand {
    Operand::Number(Number::inexact(value))
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    #[test]
    fn test_number_rendering() {
        let test_cases = vec![
            (Number::exact(3.0), "3"),
            (Number::exact(-2.0), "-2"),
            (Number::exact(0.5), "0.5"),
            (Number::exact(-0.0), "0"),
            (Number::propagate(-0.0, &[Number::exact(0.0)]), "0"),
            (Number::inexact(-0.0), "#i-0.0"),
            (Number::inexact(1.0), "#i1.0"),
            (Number::inexact(-4.0), "#i-4.0"),
            (Number::inexact(0.25), "#i0.25"),
            (Number::inexact(f64::INFINITY), "+inf.0"),
            (Number::inexact(f64::NEG_INFINITY), "-inf.0"),
            (Number::inexact(f64::NAN), "+nan.0"),
        ];

        for (i, (number, expected)) in test_cases.iter().enumerate() {
            assert_eq!(format!("{number}"), *expected, "rendering case #{}", i + 1);
        }
    }

    #[test]
    fn test_value_rendering() {
        assert_eq!(format!("{}", Value::Bool(true)), "true");
        assert_eq!(format!("{}", Value::Bool(false)), "false");
        assert_eq!(format!("{}", Value::from("hi")), "\"hi\"");
        assert_eq!(format!("{}", Value::from("a\"b\n")), "\"a\\\"b\\n\"");
        assert_eq!(format!("{}", Value::Number(Number::exact(42.0))), "42");
        assert_eq!(format!("{}", Value::Unspecified), "#<void>");
    }

    #[test]
    fn test_natural_rendering() {
        assert_eq!(format!("{}", Natural::exact(7)), "7");
        assert_eq!(format!("{}", Natural::new(7, true)), "#i7.0");
    }

    #[test]
    fn test_exactness_flags() {
        let exact = Number::exact(2.0);
        let approx = Number::inexact(2.0);

        let sum = Number::propagate(4.0, &[exact, exact]);
        assert!(sum.is_exact && sum.is_rational);

        let mixed = Number::propagate(4.0, &[exact, approx]);
        assert!(!mixed.is_exact);

        let not_rational = Number::new(2.0, true, false);
        assert!(!Number::propagate(4.0, &[exact, not_rational]).is_rational);
        assert!(!Number::propagate(f64::INFINITY, &[exact, exact]).is_rational);

        let cosine = Number::real_only(1.0, exact);
        assert!(!cosine.is_exact);
        assert!(cosine.is_rational);
    }

    #[test]
    fn test_coercions() {
        assert_eq!(as_number(&num(1.5)).unwrap(), Number::exact(1.5));
        assert_eq!(
            as_number(&Operand::Natural(Natural::exact(3))).unwrap(),
            Number::exact(3.0)
        );
        assert!(as_boolean(&Operand::Bool(true)).unwrap());
        assert_eq!(as_string(&Operand::from("x")).unwrap(), "x");

        assert_eq!(as_natural(&num(4.0)).unwrap(), Natural::exact(4));
        assert_eq!(as_natural(&inexact(4.0)).unwrap(), Natural::new(4, true));
        assert_eq!(
            as_natural(&num(2f64.powi(63))).unwrap(),
            Natural::exact(1 << 63)
        );

        let failures = vec![
            (
                as_number(&Operand::Bool(true)).unwrap_err(),
                OperandKind::Boolean,
                OperandKind::Number,
            ),
            (
                as_boolean(&num(1.0)).unwrap_err(),
                OperandKind::Number,
                OperandKind::Boolean,
            ),
            (
                as_string(&Operand::Unknown("x".into())).unwrap_err(),
                OperandKind::Unknown,
                OperandKind::String,
            ),
            (
                as_number(&Operand::Unknown("x".into())).unwrap_err(),
                OperandKind::Unknown,
                OperandKind::Number,
            ),
            (
                as_natural(&num(-1.0)).unwrap_err(),
                OperandKind::Number,
                OperandKind::Natural,
            ),
            (
                as_natural(&num(2f64.powi(64))).unwrap_err(),
                OperandKind::Number,
                OperandKind::Natural,
            ),
            (
                as_natural(&num(1.5)).unwrap_err(),
                OperandKind::Number,
                OperandKind::Natural,
            ),
        ];

        for (i, (err, found, expected)) in failures.into_iter().enumerate() {
            assert_eq!(
                err,
                Error::TypeConversion { found, expected },
                "coercion failure #{}",
                i + 1
            );
        }
    }

    #[test]
    fn test_kind_satisfaction() {
        use OperandKind as K;
        assert!(K::Number.satisfies(K::Number));
        assert!(K::Natural.satisfies(K::Number));
        assert!(K::Number.satisfies(K::Natural));
        assert!(K::Dynamic.satisfies(K::Boolean));
        assert!(K::String.satisfies(K::Dynamic));
        assert!(!K::Boolean.satisfies(K::Number));
        assert!(!K::String.satisfies(K::Boolean));
        assert!(!K::Unknown.satisfies(K::Dynamic));
        assert!(!K::Unknown.satisfies(K::Number));
    }

    #[test]
    fn test_operand_to_value() {
        assert_eq!(
            Value::try_from(Operand::Natural(Natural::exact(3))).unwrap(),
            Value::Number(Number::exact(3.0))
        );
        assert_eq!(
            Value::try_from(Operand::from("s")).unwrap(),
            Value::String("s".into())
        );
        assert!(Value::try_from(Operand::Unknown("foo".into())).is_err());
    }

    #[test]
    fn test_symbol_validation() {
        for name in ["fact", "boolean->string", "string=?", "+", "-", "add1", "x_1"] {
            assert!(is_valid_symbol(name), "{name} should be a valid symbol");
        }
        for name in ["", "1abc", "-5", "+5", "a(b", "a\"b", "#t", "a.b"] {
            assert!(!is_valid_symbol(name), "{name} should be rejected");
        }
    }
}
