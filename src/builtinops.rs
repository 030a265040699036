//! Built-in operator catalog.
//!
//! Every operator form the grammar recognizes is one [`BuiltinOp`] entry: a keyword, an
//! [`Arity`], a [`Signature`] of statically required operand kinds, and the evaluation
//! rule. A keyword may own several entries (`-` is subtraction for two or more operands
//! and negation for one); the grammar tries them in catalog order and takes the first
//! one whose arity and signature accept the parsed children.
//!
//! ```scheme
//! (- 10 3 2)           ; subtraction rule
//! (- 5)                ; negation rule
//! (boolean->string #t) ; "true"
//! (substring "hello" 1 3)
//! ```
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: operands are evaluated left to right before the rule runs. This
//!   includes `and` and `or`, which never short-circuit.
//! - **Special Forms**: the rule controls evaluation of its children (`if`).
//!
//! ## Numeric Exactness
//!
//! Exactness-preserving operations return an exact result only when every input is
//! exact. Real-only functions (`sin`, `cos`, `exp`, ...) always return inexact numbers.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with typed parameters (`Number`, `Natural`, `bool`,
//!    `&str`, `Operand`, optionally followed by a rest iterator)
//! 2. **Add to BUILTIN_OPS** with keyword, arity and signature; order matters when a
//!    keyword has several rules
//! 3. **Add tests** covering exactness and error conditions

use crate::Error;
use crate::ast::{Expr, Natural, Number, Operand, OperandKind};
use crate::evaluator::intooperation::{
    BoolIter, IntoOperation, IntoVariadicOperation, NumIter, OperationFn, StringIter,
};
use crate::evaluator::{Bindings, Environment, eval_if};
use crate::scheme::parse_number_literal;
use OperandKind::{
    Boolean, Dynamic, Natural as NaturalKind, Number as NumberKind, String as StringKind,
};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// Number of operands an operator form accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Any => true,
        }
    }
}

/// Statically required operand kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Params {
    /// Every operand must have this kind
    Uniform(OperandKind),
    /// Positional kinds; operands past the end reuse the last kind
    Fixed(&'static [OperandKind]),
}

/// Operand kinds an operator form requires and the kind it produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub params: Params,
    pub result: OperandKind,
}

impl Signature {
    const fn uniform(param: OperandKind, result: OperandKind) -> Self {
        Signature {
            params: Params::Uniform(param),
            result,
        }
    }

    const fn fixed(params: &'static [OperandKind], result: OperandKind) -> Self {
        Signature {
            params: Params::Fixed(params),
            result,
        }
    }

    /// Kind required at operand position `index`
    pub fn param(&self, index: usize) -> OperandKind {
        match self.params {
            Params::Uniform(kind) => kind,
            Params::Fixed(kinds) => kinds
                .get(index)
                .or(kinds.last())
                .copied()
                .unwrap_or(OperandKind::Dynamic),
        }
    }

    /// Check the static kinds of parsed children against this signature
    pub fn accepts(&self, kinds: impl IntoIterator<Item = OperandKind>) -> bool {
        kinds
            .into_iter()
            .enumerate()
            .all(|(i, kind)| kind.satisfies(self.param(i)))
    }
}

/// Signature of a special-form evaluation rule: unevaluated children, the function
/// registry, the call-local bindings and the current evaluation depth
pub(crate) type SpecialFormFn =
    fn(&[Expr], &Environment, &Bindings, usize) -> Result<Operand, Error>;

/// Represents the implementation of a built-in operator form
#[derive(Clone)]
pub enum OpKind {
    /// Function over evaluated operands, through the canonical erased signature
    Function(Arc<OperationFn>),
    /// Special form that controls evaluation of its own children
    SpecialForm(SpecialFormFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operator form
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// Keyword that introduces this form
    pub id: &'static str,
    /// Evaluation rule
    pub op_kind: OpKind,
    /// Accepted operand count
    pub arity: Arity,
    /// Statically required operand kinds and the result kind
    pub signature: Signature,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // A keyword can own several rules; arity and signature tell them apart
        self.id == other.id && self.arity == other.arity && self.signature == other.signature
    }
}

impl BuiltinOp {
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    /// Whether this rule accepts children with the given static kinds
    pub(crate) fn accepts(&self, kinds: &[OperandKind]) -> bool {
        self.arity.accepts(kinds.len()) && self.signature.accepts(kinds.iter().copied())
    }
}

//
// Builtin Function Implementations
//

fn division_by_zero(op: &str) -> Error {
    Error::Eval(format!("{op}: division by zero"))
}

fn builtin_add(args: NumIter<'_>) -> Number {
    let inputs: Vec<Number> = args.collect();
    let sum = inputs.iter().fold(0.0, |acc, n| acc + n.value);
    Number::propagate(sum, &inputs)
}

fn builtin_mul(args: NumIter<'_>) -> Number {
    let inputs: Vec<Number> = args.collect();
    let product = inputs.iter().fold(1.0, |acc, n| acc * n.value);
    Number::propagate(product, &inputs)
}

fn builtin_sub(first: Number, rest: NumIter<'_>) -> Number {
    let mut inputs = vec![first];
    inputs.extend(rest);
    let difference = inputs[1..].iter().fold(first.value, |acc, n| acc - n.value);
    Number::propagate(difference, &inputs)
}

fn builtin_negate(n: Number) -> Number {
    Number::propagate(-n.value, &[n])
}

fn builtin_div(first: Number, rest: NumIter<'_>) -> Result<Number, Error> {
    let mut inputs = vec![first];
    let mut quotient = first.value;
    for divisor in rest {
        if divisor.is_exact && divisor.value == 0.0 {
            return Err(division_by_zero("/"));
        }
        quotient /= divisor.value;
        inputs.push(divisor);
    }
    Ok(Number::propagate(quotient, &inputs))
}

fn builtin_reciprocal(n: Number) -> Result<Number, Error> {
    if n.is_exact && n.value == 0.0 {
        return Err(division_by_zero("/"));
    }
    Ok(Number::propagate(1.0 / n.value, &[n]))
}

fn builtin_add1(n: Number) -> Number {
    Number::propagate(n.value + 1.0, &[n])
}

fn builtin_sub1(n: Number) -> Number {
    Number::propagate(n.value - 1.0, &[n])
}

// Generates unary operations that keep the input's exactness
macro_rules! exactness_preserving {
    ($name:ident, $method:ident) => {
        fn $name(n: Number) -> Number {
            Number::propagate(n.value.$method(), &[n])
        }
    };
}

exactness_preserving!(builtin_abs, abs);
exactness_preserving!(builtin_floor, floor);
exactness_preserving!(builtin_ceiling, ceil);
exactness_preserving!(builtin_round, round_ties_even);
exactness_preserving!(builtin_truncate, trunc);

// Generates unary operations defined only over the reals; results are never exact
macro_rules! real_only {
    ($name:ident, $method:ident) => {
        fn $name(n: Number) -> Number {
            Number::real_only(n.value.$method(), n)
        }
    };
}

real_only!(builtin_sin, sin);
real_only!(builtin_cos, cos);
real_only!(builtin_tan, tan);
real_only!(builtin_asin, asin);
real_only!(builtin_acos, acos);
real_only!(builtin_atan, atan);
real_only!(builtin_exp, exp);

fn builtin_atan2(y: Number, x: Number) -> Number {
    let angle = y.value.atan2(x.value);
    Number::new(
        angle,
        false,
        y.is_rational && x.is_rational && angle.is_finite(),
    )
}

fn builtin_log(n: Number) -> Result<Number, Error> {
    if n.value <= 0.0 {
        return Err(Error::Eval(format!("log: undefined for {n}")));
    }
    Ok(Number::real_only(n.value.ln(), n))
}

fn builtin_sqrt(n: Number) -> Result<Number, Error> {
    if n.value < 0.0 {
        return Err(Error::Eval(format!("sqrt: undefined for negative number {n}")));
    }
    let root = n.value.sqrt();
    // Exact only when the root is recovered without rounding
    let is_exact = n.is_exact && root * root == n.value;
    Ok(Number::new(root, is_exact, n.is_rational && root.is_finite()))
}

fn builtin_expt(base: Number, exponent: Number) -> Result<Number, Error> {
    let is_exact = base.is_exact && exponent.is_exact && exponent.is_integer();
    if is_exact && base.value == 0.0 && exponent.value < 0.0 {
        return Err(division_by_zero("expt"));
    }
    let power = if exponent.is_integer() && exponent.value.abs() <= f64::from(i32::MAX) {
        base.value.powi(exponent.value as i32)
    } else {
        base.value.powf(exponent.value)
    };
    Ok(Number::new(
        power,
        is_exact,
        power.is_finite() && base.is_rational && exponent.is_rational,
    ))
}

fn builtin_max(first: Number, rest: NumIter<'_>) -> Number {
    let mut inputs = vec![first];
    inputs.extend(rest);
    let largest = inputs.iter().fold(first.value, |acc, n| acc.max(n.value));
    Number::propagate(largest, &inputs)
}

fn builtin_min(first: Number, rest: NumIter<'_>) -> Number {
    let mut inputs = vec![first];
    inputs.extend(rest);
    let smallest = inputs.iter().fold(first.value, |acc, n| acc.min(n.value));
    Number::propagate(smallest, &inputs)
}

// Generates integer division operations; both operands must hold integer values
macro_rules! integer_division {
    ($name:ident, $op_str:expr, |$a:ident, $b:ident| $body:expr) => {
        fn $name(x: Number, y: Number) -> Result<Number, Error> {
            if !x.is_integer() || !y.is_integer() {
                return Err(Error::Eval(
                    concat!($op_str, ": expects integer operands").to_owned(),
                ));
            }
            if y.value == 0.0 {
                return Err(division_by_zero($op_str));
            }
            let ($a, $b) = (x.value, y.value);
            Ok(Number::propagate($body, &[x, y]))
        }
    };
}

integer_division!(builtin_quotient, "quotient", |a, b| (a / b).trunc());
integer_division!(builtin_remainder, "remainder", |a, b| a % b);
integer_division!(builtin_modulo, "modulo", |a, b| ((a % b) + b) % b);

fn builtin_exact_to_inexact(n: Number) -> Number {
    Number::new(n.value, false, n.is_rational)
}

fn builtin_inexact_to_exact(n: Number) -> Result<Number, Error> {
    if !n.value.is_finite() {
        return Err(Error::Eval(format!("inexact->exact: no exact representation for {n}")));
    }
    Ok(Number::exact(n.value))
}

// Generates chained numeric comparisons. Every operand has already been evaluated;
// the fold deliberately visits every consecutive pair.
macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(first: Number, rest: NumIter<'_>) -> Result<bool, Error> {
            let mut iter = rest.peekable();

            if iter.peek().is_none() {
                return Err(Error::NullOperand(
                    concat!("'", $op_str, "' requires a second operand").to_owned(),
                ));
            }

            let mut holds = true;
            let mut prev = first.value;
            for current in iter {
                holds &= prev $op current.value;
                prev = current.value;
            }

            Ok(holds)
        }
    };
}

numeric_comparison!(builtin_eq, ==, "=");
numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_gt, >, ">");
numeric_comparison!(builtin_le, <=, "<=");
numeric_comparison!(builtin_ge, >=, ">=");

// Same chaining for string orderings
macro_rules! string_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(first: &str, rest: StringIter<'_>) -> Result<bool, Error> {
            let mut iter = rest.peekable();

            if iter.peek().is_none() {
                return Err(Error::NullOperand(
                    concat!("'", $op_str, "' requires a second operand").to_owned(),
                ));
            }

            let mut holds = true;
            let mut prev = first;
            for current in iter {
                holds &= prev $op current;
                prev = current;
            }

            Ok(holds)
        }
    };
}

string_comparison!(builtin_string_eq, ==, "string=?");
string_comparison!(builtin_string_lt, <, "string<?");
string_comparison!(builtin_string_gt, >, "string>?");

fn builtin_and(args: BoolIter<'_>) -> bool {
    args.fold(true, |acc, b| acc && b)
}

fn builtin_or(args: BoolIter<'_>) -> bool {
    args.fold(false, |acc, b| acc || b)
}

fn builtin_not(b: bool) -> bool {
    !b
}

fn builtin_boolean_eq(a: bool, b: bool) -> bool {
    a == b
}

fn builtin_is_number(operand: Operand) -> bool {
    matches!(operand, Operand::Number(_) | Operand::Natural(_))
}

fn builtin_is_boolean(operand: Operand) -> bool {
    matches!(operand, Operand::Bool(_))
}

fn builtin_is_string(operand: Operand) -> bool {
    matches!(operand, Operand::String(_))
}

fn builtin_is_integer(operand: Operand) -> bool {
    match operand {
        Operand::Number(n) => n.is_integer(),
        Operand::Natural(_) => true,
        _ => false,
    }
}

fn builtin_is_exact(n: Number) -> bool {
    n.is_exact
}

fn builtin_is_inexact(n: Number) -> bool {
    !n.is_exact
}

fn builtin_is_zero(n: Number) -> bool {
    n.value == 0.0
}

fn builtin_is_positive(n: Number) -> bool {
    n.value > 0.0
}

fn builtin_is_negative(n: Number) -> bool {
    n.value < 0.0
}

fn builtin_is_even(n: Number) -> Result<bool, Error> {
    if !n.is_integer() {
        return Err(Error::Eval(format!("even?: expects an integer, given {n}")));
    }
    Ok(n.value % 2.0 == 0.0)
}

fn builtin_is_odd(n: Number) -> Result<bool, Error> {
    builtin_is_even(n)
        .map(|even| !even)
        .map_err(|_| Error::Eval(format!("odd?: expects an integer, given {n}")))
}

fn builtin_string_append(args: StringIter<'_>) -> String {
    let mut result = String::new();
    for s in args {
        result.push_str(s);
    }
    result
}

fn builtin_string_length(s: &str) -> Natural {
    Natural::exact(s.chars().count() as u64)
}

fn char_range(op: &str, s: &str, start: u64, end: u64) -> Result<String, Error> {
    let len = s.chars().count() as u64;
    if start > end || end > len {
        return Err(Error::Eval(format!(
            "{op}: index range [{start}, {end}) out of range for string of length {len}"
        )));
    }
    Ok(s.chars()
        .skip(start as usize)
        .take((end - start) as usize)
        .collect())
}

fn builtin_substring(s: &str, start: Natural, end: Natural) -> Result<String, Error> {
    char_range("substring", s, start.value, end.value)
}

fn builtin_substring_from(s: &str, start: Natural) -> Result<String, Error> {
    char_range("substring", s, start.value, s.chars().count() as u64)
}

fn builtin_string_ith(s: &str, index: Natural) -> Result<String, Error> {
    let len = s.chars().count();
    usize::try_from(index.value)
        .ok()
        .and_then(|i| s.chars().nth(i))
        .map(String::from)
        .ok_or_else(|| {
            Error::Eval(format!(
                "string-ith: index {} out of range for string of length {len}",
                index.value
            ))
        })
}

fn builtin_string_upcase(s: &str) -> String {
    s.to_uppercase()
}

fn builtin_string_downcase(s: &str) -> String {
    s.to_lowercase()
}

fn builtin_string_contains(s: &str, needle: &str) -> bool {
    s.contains(needle)
}

fn builtin_boolean_to_string(b: bool) -> String {
    if b { "true" } else { "false" }.to_owned()
}

fn builtin_number_to_string(n: Number) -> String {
    n.to_string()
}

/// Yields `#f` when the text is not a number literal
fn builtin_string_to_number(s: &str) -> Operand {
    match parse_number_literal(s) {
        Some(n) => Operand::Number(n),
        None => Operand::Bool(false),
    }
}

const NUMERIC_ANY: Signature = Signature::uniform(NumberKind, NumberKind);
const NUMERIC_TEST: Signature = Signature::uniform(NumberKind, Boolean);
const BOOLEAN_ANY: Signature = Signature::uniform(Boolean, Boolean);
const STRING_TEST: Signature = Signature::uniform(StringKind, Boolean);
const TYPE_TEST: Signature = Signature::uniform(Dynamic, Boolean);

/// Global catalog of all built-in operator forms, in priority order.
///
/// Builtin implementations are wired through the typed adapter layer once,
/// at initialization time, via a `LazyLock`.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn builtin_fixed<Args, F>(f: F) -> OpKind
    where
        F: IntoOperation<Args>,
    {
        OpKind::Function(<F as IntoOperation<Args>>::into_operation(f))
    }

    fn builtin_variadic<Args, F>(f: F) -> OpKind
    where
        F: IntoVariadicOperation<Args>,
    {
        OpKind::Function(<F as IntoVariadicOperation<Args>>::into_variadic_operation(f))
    }

    fn op(id: &'static str, op_kind: OpKind, arity: Arity, signature: Signature) -> BuiltinOp {
        BuiltinOp {
            id,
            op_kind,
            arity,
            signature,
        }
    }

    let unary_numeric = |id: &'static str, f: fn(Number) -> Number| {
        op(id, builtin_fixed::<(Number,), _>(f), Arity::Exact(1), NUMERIC_ANY)
    };
    let numeric_test = |id: &'static str, f: fn(Number) -> bool| {
        op(id, builtin_fixed::<(Number,), _>(f), Arity::Exact(1), NUMERIC_TEST)
    };
    let type_test = |id: &'static str, f: fn(Operand) -> bool| {
        op(id, builtin_fixed::<(Operand,), _>(f), Arity::Exact(1), TYPE_TEST)
    };
    let comparison = |id: &'static str, f: fn(Number, NumIter<'_>) -> Result<bool, Error>| {
        op(
            id,
            builtin_variadic::<(Number, NumIter<'static>), _>(f),
            Arity::AtLeast(2),
            NUMERIC_TEST,
        )
    };
    let string_order = |id: &'static str, f: fn(&str, StringIter<'_>) -> Result<bool, Error>| {
        op(
            id,
            builtin_variadic::<(&'static str, StringIter<'static>), _>(f),
            Arity::AtLeast(2),
            STRING_TEST,
        )
    };

    vec![
        // Arithmetic
        op(
            "+",
            builtin_variadic::<(NumIter<'static>,), _>(builtin_add),
            Arity::AtLeast(2),
            NUMERIC_ANY,
        ),
        op(
            "-",
            builtin_variadic::<(Number, NumIter<'static>), _>(builtin_sub),
            Arity::AtLeast(2),
            NUMERIC_ANY,
        ),
        unary_numeric("-", builtin_negate),
        op(
            "*",
            builtin_variadic::<(NumIter<'static>,), _>(builtin_mul),
            Arity::AtLeast(2),
            NUMERIC_ANY,
        ),
        op(
            "/",
            builtin_variadic::<(Number, NumIter<'static>), _>(builtin_div),
            Arity::AtLeast(2),
            NUMERIC_ANY,
        ),
        op(
            "/",
            builtin_fixed::<(Number,), _>(builtin_reciprocal),
            Arity::Exact(1),
            NUMERIC_ANY,
        ),
        unary_numeric("add1", builtin_add1),
        unary_numeric("sub1", builtin_sub1),
        unary_numeric("abs", builtin_abs),
        unary_numeric("floor", builtin_floor),
        unary_numeric("ceiling", builtin_ceiling),
        unary_numeric("round", builtin_round),
        unary_numeric("truncate", builtin_truncate),
        op(
            "max",
            builtin_variadic::<(Number, NumIter<'static>), _>(builtin_max),
            Arity::AtLeast(1),
            NUMERIC_ANY,
        ),
        op(
            "min",
            builtin_variadic::<(Number, NumIter<'static>), _>(builtin_min),
            Arity::AtLeast(1),
            NUMERIC_ANY,
        ),
        op(
            "quotient",
            builtin_fixed::<(Number, Number), _>(builtin_quotient),
            Arity::Exact(2),
            NUMERIC_ANY,
        ),
        op(
            "remainder",
            builtin_fixed::<(Number, Number), _>(builtin_remainder),
            Arity::Exact(2),
            NUMERIC_ANY,
        ),
        op(
            "modulo",
            builtin_fixed::<(Number, Number), _>(builtin_modulo),
            Arity::Exact(2),
            NUMERIC_ANY,
        ),
        op(
            "expt",
            builtin_fixed::<(Number, Number), _>(builtin_expt),
            Arity::Exact(2),
            NUMERIC_ANY,
        ),
        op(
            "sqrt",
            builtin_fixed::<(Number,), _>(builtin_sqrt),
            Arity::Exact(1),
            NUMERIC_ANY,
        ),
        // Transcendental and trigonometric (always inexact)
        unary_numeric("exp", builtin_exp),
        op(
            "log",
            builtin_fixed::<(Number,), _>(builtin_log),
            Arity::Exact(1),
            NUMERIC_ANY,
        ),
        unary_numeric("sin", builtin_sin),
        unary_numeric("cos", builtin_cos),
        unary_numeric("tan", builtin_tan),
        unary_numeric("asin", builtin_asin),
        unary_numeric("acos", builtin_acos),
        unary_numeric("atan", builtin_atan),
        op(
            "atan",
            builtin_fixed::<(Number, Number), _>(builtin_atan2),
            Arity::Exact(2),
            NUMERIC_ANY,
        ),
        // Exactness conversion
        unary_numeric("exact->inexact", builtin_exact_to_inexact),
        op(
            "inexact->exact",
            builtin_fixed::<(Number,), _>(builtin_inexact_to_exact),
            Arity::Exact(1),
            NUMERIC_ANY,
        ),
        // Comparison
        comparison("=", builtin_eq),
        comparison("<", builtin_lt),
        comparison(">", builtin_gt),
        comparison("<=", builtin_le),
        comparison(">=", builtin_ge),
        // Boolean logic (eager, no short-circuit)
        op(
            "and",
            builtin_variadic::<(BoolIter<'static>,), _>(builtin_and),
            Arity::AtLeast(2),
            BOOLEAN_ANY,
        ),
        op(
            "or",
            builtin_variadic::<(BoolIter<'static>,), _>(builtin_or),
            Arity::AtLeast(2),
            BOOLEAN_ANY,
        ),
        op(
            "not",
            builtin_fixed::<(bool,), _>(builtin_not),
            Arity::Exact(1),
            BOOLEAN_ANY,
        ),
        op(
            "boolean=?",
            builtin_fixed::<(bool, bool), _>(builtin_boolean_eq),
            Arity::Exact(2),
            BOOLEAN_ANY,
        ),
        // Predicates
        type_test("number?", builtin_is_number),
        type_test("boolean?", builtin_is_boolean),
        type_test("string?", builtin_is_string),
        type_test("integer?", builtin_is_integer),
        numeric_test("exact?", builtin_is_exact),
        numeric_test("inexact?", builtin_is_inexact),
        numeric_test("zero?", builtin_is_zero),
        numeric_test("positive?", builtin_is_positive),
        numeric_test("negative?", builtin_is_negative),
        op(
            "even?",
            builtin_fixed::<(Number,), _>(builtin_is_even),
            Arity::Exact(1),
            NUMERIC_TEST,
        ),
        op(
            "odd?",
            builtin_fixed::<(Number,), _>(builtin_is_odd),
            Arity::Exact(1),
            NUMERIC_TEST,
        ),
        // Strings
        op(
            "string-append",
            builtin_variadic::<(StringIter<'static>,), _>(builtin_string_append),
            Arity::Any,
            Signature::uniform(StringKind, StringKind),
        ),
        op(
            "string-length",
            builtin_fixed::<(&'static str,), _>(builtin_string_length),
            Arity::Exact(1),
            Signature::uniform(StringKind, NaturalKind),
        ),
        op(
            "substring",
            builtin_fixed::<(&'static str, Natural, Natural), _>(builtin_substring),
            Arity::Exact(3),
            Signature::fixed(&[StringKind, NaturalKind, NaturalKind], StringKind),
        ),
        op(
            "substring",
            builtin_fixed::<(&'static str, Natural), _>(builtin_substring_from),
            Arity::Exact(2),
            Signature::fixed(&[StringKind, NaturalKind], StringKind),
        ),
        op(
            "string-ith",
            builtin_fixed::<(&'static str, Natural), _>(builtin_string_ith),
            Arity::Exact(2),
            Signature::fixed(&[StringKind, NaturalKind], StringKind),
        ),
        op(
            "string-upcase",
            builtin_fixed::<(&'static str,), _>(builtin_string_upcase),
            Arity::Exact(1),
            Signature::uniform(StringKind, StringKind),
        ),
        op(
            "string-downcase",
            builtin_fixed::<(&'static str,), _>(builtin_string_downcase),
            Arity::Exact(1),
            Signature::uniform(StringKind, StringKind),
        ),
        string_order("string=?", builtin_string_eq),
        string_order("string<?", builtin_string_lt),
        string_order("string>?", builtin_string_gt),
        op(
            "string-contains?",
            builtin_fixed::<(&'static str, &'static str), _>(builtin_string_contains),
            Arity::Exact(2),
            STRING_TEST,
        ),
        // Conversion
        op(
            "boolean->string",
            builtin_fixed::<(bool,), _>(builtin_boolean_to_string),
            Arity::Exact(1),
            Signature::uniform(Boolean, StringKind),
        ),
        op(
            "number->string",
            builtin_fixed::<(Number,), _>(builtin_number_to_string),
            Arity::Exact(1),
            Signature::uniform(NumberKind, StringKind),
        ),
        op(
            "string->number",
            builtin_fixed::<(&'static str,), _>(builtin_string_to_number),
            Arity::Exact(1),
            Signature::uniform(StringKind, Dynamic),
        ),
        // Control flow
        op(
            "if",
            OpKind::SpecialForm(eval_if),
            Arity::Exact(3),
            Signature::fixed(&[Boolean, Dynamic, Dynamic], Dynamic),
        ),
    ]
});

/// Lazy static map from keyword to its rules, in catalog order
static BUILTIN_RULES: LazyLock<HashMap<&'static str, Vec<&'static BuiltinOp>>> =
    LazyLock::new(|| {
        let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
        let mut rules: HashMap<&'static str, Vec<&'static BuiltinOp>> = HashMap::new();
        for op in ops {
            rules.entry(op.id).or_default().push(op);
        }
        rules
    });

/// Get all builtin operator forms in catalog order
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Rules registered under a keyword, in priority order (empty if none)
pub fn find_rules(id: &str) -> &'static [&'static BuiltinOp] {
    BUILTIN_RULES.get(id).map_or(&[], Vec::as_slice)
}

/// Whether the keyword names a builtin operator form
pub fn is_builtin(id: &str) -> bool {
    BUILTIN_RULES.contains_key(id)
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{inexact, num};

    /// Micro-helper for success cases
    fn success<T: Into<Operand>>(value: T) -> Option<Operand> {
        Some(value.into())
    }

    /// Invoke the first function rule of `name` accepting `args.len()` operands
    fn call_builtin(name: &str, args: &[Operand]) -> Result<Operand, Error> {
        let op = find_rules(name)
            .iter()
            .find(|op| op.arity.accepts(args.len()))
            .expect("builtin not found");
        match &op.op_kind {
            OpKind::Function(func) => func(args.to_vec()),
            OpKind::SpecialForm(_) => {
                panic!("expected function builtin in tests, got special form: {name}")
            }
        }
    }

    #[test]
    fn test_builtin_ops_registry() {
        let minus = find_rules("-");
        assert_eq!(minus.len(), 2);
        assert_eq!(minus[0].arity, Arity::AtLeast(2));
        assert_eq!(minus[1].arity, Arity::Exact(1));
        assert_ne!(minus[0], minus[1]);

        let not_op = find_rules("not")[0];
        assert_eq!(not_op.arity, Arity::Exact(1));
        assert!(!not_op.is_special_form());

        let if_op = find_rules("if")[0];
        assert!(if_op.is_special_form());
        assert_eq!(if_op.signature.result, OperandKind::Dynamic);

        let length = find_rules("string-length")[0];
        assert_eq!(length.signature.result, OperandKind::Natural);

        assert!(is_builtin("boolean->string"));
        assert!(!is_builtin("define"));
        assert!(find_rules("unknown").is_empty());
        assert!(get_builtin_ops().len() > 50);
    }

    #[test]
    fn test_index_error_messages() {
        let max_index = Operand::Natural(Natural::exact(u64::MAX));
        assert_eq!(
            call_builtin("string-ith", &[Operand::from("abc"), max_index]).unwrap_err(),
            Error::Eval(format!(
                "string-ith: index {} out of range for string of length 3",
                u64::MAX
            ))
        );
        assert_eq!(
            call_builtin("string-ith", &[Operand::from("abc"), num(3.0)]).unwrap_err(),
            Error::Eval("string-ith: index 3 out of range for string of length 3".into())
        );
    }

    #[test]
    fn test_signature_acceptance() {
        let b2s = find_rules("boolean->string")[0];
        assert!(b2s.accepts(&[OperandKind::Boolean]));
        assert!(b2s.accepts(&[OperandKind::Dynamic]));
        assert!(!b2s.accepts(&[OperandKind::Number]));
        assert!(!b2s.accepts(&[]));
        assert!(!b2s.accepts(&[OperandKind::Boolean, OperandKind::Boolean]));

        let substring = find_rules("substring")[0];
        assert!(substring.accepts(&[
            OperandKind::String,
            OperandKind::Number,
            OperandKind::Natural
        ]));
        assert!(!substring.accepts(&[
            OperandKind::String,
            OperandKind::String,
            OperandKind::Number
        ]));

        let le = find_rules("<=")[0];
        assert!(!le.accepts(&[OperandKind::Number]));
        assert!(le.accepts(&[OperandKind::Number; 5]));
    }

    /// Macro to create test cases, invoking builtins via the registry
    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Operand, Error>, Option<Operand>);

        let t = Operand::Bool(true);
        let f = Operand::Bool(false);
        let s = |text: &str| Operand::from(text);

        let test_cases: Vec<TestCase> = vec![
            // Arithmetic
            test!("+", &[num(1.0), num(2.0), num(3.0)], success(num(6.0))),
            test!("+", &[num(1.0), inexact(2.0)], success(inexact(3.0))),
            test!("+", &[num(1.0), s("x")], None),
            test!("-", &[num(10.0), num(3.0), num(2.0)], success(num(5.0))),
            test!("-", &[num(5.0)], success(num(-5.0))),
            test!("*", &[num(2.0), num(3.0), num(4.0)], success(num(24.0))),
            test!("*", &[num(2.0), inexact(0.5)], success(inexact(1.0))),
            test!("/", &[num(1.0), num(2.0)], success(num(0.5))),
            test!("/", &[num(1.0), num(0.0)], None),
            test!("/", &[inexact(1.0), num(0.0)], None),
            test!("/", &[num(1.0), inexact(0.0)], success(inexact(f64::INFINITY))),
            test!("/", &[num(4.0)], success(num(0.25))),
            test!("/", &[num(0.0)], None),
            test!("add1", &[num(1.0)], success(num(2.0))),
            test!("sub1", &[num(1.0)], success(num(0.0))),
            test!("sub1", &[inexact(1.5)], success(inexact(0.5))),
            test!("abs", &[num(-3.0)], success(num(3.0))),
            test!("floor", &[inexact(2.7)], success(inexact(2.0))),
            test!("ceiling", &[num(2.2)], success(num(3.0))),
            test!("round", &[num(2.5)], success(num(2.0))),
            test!("round", &[num(3.5)], success(num(4.0))),
            test!("truncate", &[num(-2.7)], success(num(-2.0))),
            test!("max", &[num(1.0), num(3.0), num(2.0)], success(num(3.0))),
            test!("max", &[num(1.0), inexact(0.5)], success(inexact(1.0))),
            test!("min", &[num(4.0)], success(num(4.0))),
            test!("quotient", &[num(17.0), num(5.0)], success(num(3.0))),
            test!("quotient", &[num(-17.0), num(5.0)], success(num(-3.0))),
            test!("remainder", &[num(-17.0), num(5.0)], success(num(-2.0))),
            test!("modulo", &[num(-17.0), num(5.0)], success(num(3.0))),
            test!("modulo", &[num(17.0), num(0.0)], None),
            test!("quotient", &[num(1.5), num(1.0)], None),
            test!("expt", &[num(2.0), num(10.0)], success(num(1024.0))),
            test!("expt", &[num(2.0), num(-1.0)], success(num(0.5))),
            test!("expt", &[num(4.0), num(0.5)], success(inexact(2.0))),
            test!("expt", &[num(0.0), num(-1.0)], None),
            test!("sqrt", &[num(16.0)], success(num(4.0))),
            test!("sqrt", &[num(2.0)], success(inexact(2.0_f64.sqrt()))),
            test!("sqrt", &[num(-4.0)], None),
            test!("log", &[num(1.0)], success(inexact(0.0))),
            test!("log", &[num(0.0)], None),
            test!("exp", &[num(0.0)], success(inexact(1.0))),
            test!("cos", &[num(0.0)], success(inexact(1.0))),
            test!("sin", &[num(0.0)], success(inexact(0.0))),
            test!("atan", &[num(0.0), num(1.0)], success(inexact(0.0))),
            test!("exact->inexact", &[num(3.0)], success(inexact(3.0))),
            test!("inexact->exact", &[inexact(3.0)], success(num(3.0))),
            test!("inexact->exact", &[inexact(f64::NAN)], None),
            // Comparison (consecutive pairs, all operands type checked)
            test!("<=", &[num(1.0), num(2.0), num(3.0)], success(true)),
            test!("<=", &[num(3.0), num(2.0), num(1.0)], success(false)),
            test!("<=", &[num(1.0), num(3.0), num(2.0)], success(false)),
            test!("<=", &[num(1.0), num(1.0)], success(true)),
            test!("<=", &[num(3.0), num(1.0), s("late")], None),
            test!("<", &[num(1.0), num(1.0)], success(false)),
            test!(">", &[num(3.0), num(2.0), num(1.0)], success(true)),
            test!(">=", &[num(3.0), num(3.0)], success(true)),
            test!("=", &[num(2.0), inexact(2.0)], success(true)),
            test!("=", &[num(2.0)], None),
            // Boolean
            test!("and", &[t.clone(), t.clone()], success(true)),
            test!("and", &[f.clone(), t.clone()], success(false)),
            test!("and", &[f.clone(), num(1.0)], None),
            test!("or", &[f.clone(), t.clone()], success(true)),
            test!("or", &[t.clone(), s("x")], None),
            test!("not", &[t.clone()], success(false)),
            test!("not", &[num(0.0)], None),
            test!("boolean=?", &[f.clone(), f.clone()], success(true)),
            // Predicates
            test!("number?", &[num(1.0)], success(true)),
            test!("number?", &[s("1")], success(false)),
            test!("boolean?", &[f.clone()], success(true)),
            test!("string?", &[s("")], success(true)),
            test!("integer?", &[inexact(2.0)], success(true)),
            test!("integer?", &[num(2.5)], success(false)),
            test!("integer?", &[t.clone()], success(false)),
            test!("exact?", &[num(1.0)], success(true)),
            test!("inexact?", &[inexact(1.0)], success(true)),
            test!("zero?", &[num(0.0)], success(true)),
            test!("positive?", &[num(-1.0)], success(false)),
            test!("negative?", &[num(-1.0)], success(true)),
            test!("even?", &[num(4.0)], success(true)),
            test!("odd?", &[num(4.0)], success(false)),
            test!("odd?", &[num(4.5)], None),
            // Strings
            test!("string-append", &[], success("")),
            test!("string-append", &[s("a"), s("b"), s("c")], success("abc")),
            test!("string-append", &[s("a"), num(1.0)], None),
            test!(
                "string-length",
                &[s("héllo")],
                success(Natural::exact(5))
            ),
            test!("substring", &[s("hello"), num(1.0), num(3.0)], success("el")),
            test!("substring", &[s("hello"), num(2.0)], success("llo")),
            test!("substring", &[s("hello"), num(3.0), num(9.0)], None),
            test!("substring", &[s("hello"), num(-1.0), num(2.0)], None),
            test!("string-ith", &[s("hello"), num(4.0)], success("o")),
            test!("string-ith", &[s("hello"), num(5.0)], None),
            test!("string-ith", &[s(""), num(0.0)], None),
            test!("string-upcase", &[s("abc")], success("ABC")),
            test!("string-downcase", &[s("ABC")], success("abc")),
            test!("string=?", &[s("a"), s("a"), s("a")], success(true)),
            test!("string<?", &[s("a"), s("b")], success(true)),
            test!("string>?", &[s("a"), s("b")], success(false)),
            test!("string-contains?", &[s("hello"), s("ell")], success(true)),
            // Conversion
            test!("boolean->string", &[t.clone()], success("true")),
            test!("boolean->string", &[f.clone()], success("false")),
            test!("boolean->string", &[num(1.0)], None),
            test!("number->string", &[num(42.0)], success("42")),
            test!("number->string", &[inexact(1.0)], success("#i1.0")),
            test!("string->number", &[s("42")], success(num(42.0))),
            test!("string->number", &[s("1.5")], success(inexact(1.5))),
            test!("string->number", &[s("abc")], success(false)),
        ];

        for (i, (name, actual, expected)) in test_cases.into_iter().enumerate() {
            match (actual, expected) {
                (Ok(actual), Some(expected)) => assert_eq!(
                    actual,
                    expected,
                    "case #{} ({name}): value mismatch",
                    i + 1
                ),
                (Err(_), None) => {}
                (Ok(actual), None) => {
                    panic!("case #{} ({name}): expected error, got {actual:?}", i + 1)
                }
                (Err(err), Some(expected)) => panic!(
                    "case #{} ({name}): expected {expected:?}, got error {err:?}",
                    i + 1
                ),
            }
        }
    }

    #[test]
    fn test_real_only_results_are_inexact() {
        for name in ["sin", "cos", "tan", "asin", "acos", "atan", "exp"] {
            let result = call_builtin(name, &[num(0.5)]).unwrap();
            let Operand::Number(n) = result else {
                panic!("{name} returned a non-number");
            };
            assert!(!n.is_exact, "{name} must produce an inexact result");
            assert!(n.is_rational, "{name} keeps rationality of a finite result");
        }
    }

    #[test]
    fn test_comparison_type_checks_every_operand() {
        // Falsity is settled by the first pair, but the string still fails the call
        let err = call_builtin("<=", &[num(3.0), num(1.0), Operand::from("x")]).unwrap_err();
        assert_eq!(
            err,
            Error::type_conversion(OperandKind::String, OperandKind::Number)
        );
    }
}
