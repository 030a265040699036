use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit0, digit1, one_of},
    combinator::{all_consuming, map, opt, recognize, value},
    error::ErrorKind,
    sequence::preceded,
};
use std::borrow::Cow;
use std::sync::Arc;

use crate::MAX_PARSE_DEPTH;
use crate::ast::{
    EXACT_PREFIX, Expr, INEXACT_PREFIX, Number, Operand, OperandKind, is_valid_symbol,
};
use crate::builtinops::{find_rules, is_builtin};
use crate::evaluator::Environment;
use crate::splitter::{split_top_level, strip_comments};

/// Keyword of the definition form
pub(crate) const DEFINE_KEYWORD: &str = "define";

/// Options for turning text into an expression tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Strip `;` line comments before parsing
    pub handle_comments: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: true,
        }
    }
}

fn parse_error<T>(input: &str, kind: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Error(nom::error::Error::new(input, kind)))
}

/// Parse `+inf.0`, `-inf.0` and `+nan.0` (always inexact)
fn parse_special_number(input: &str) -> IResult<&str, Number> {
    map(
        alt((
            value(f64::INFINITY, tag("+inf.0")),
            value(f64::NEG_INFINITY, tag("-inf.0")),
            value(f64::NAN, alt((tag("+nan.0"), tag("-nan.0")))),
        )),
        Number::inexact,
    )
    .parse(input)
}

/// Parse a hexadecimal integer (#x or #X prefix)
fn parse_hexadecimal(input: &str) -> IResult<&str, Number> {
    let (rest, hex_digits) = preceded(
        alt((tag("#x"), tag("#X"))),
        take_while1(|c: char| c.is_ascii_hexdigit()),
    )
    .parse(input)?;

    match u64::from_str_radix(hex_digits, 16) {
        Ok(n) => Ok((rest, Number::exact(n as f64))),
        Err(_) => parse_error(input, ErrorKind::HexDigit),
    }
}

/// Parse a fraction `n/d` (exact)
fn parse_fraction(input: &str) -> IResult<&str, Number> {
    let (rest, (numerator, _, denominator)) =
        (recognize((opt(one_of("+-")), digit1)), char('/'), digit1).parse(input)?;

    match (numerator.parse::<f64>(), denominator.parse::<f64>()) {
        (Ok(n), Ok(d)) if d != 0.0 => Ok((rest, Number::exact(n / d))),
        _ => parse_error(input, ErrorKind::Verify),
    }
}

/// Parse a decimal number. A decimal point or an exponent makes it inexact.
fn parse_decimal(input: &str) -> IResult<&str, Number> {
    let (rest, number_str) = recognize((
        opt(one_of("+-")),
        alt((
            recognize((digit1, opt((char('.'), digit0)))),
            recognize((char('.'), digit1)),
        )),
        opt((one_of("eE"), opt(one_of("+-")), digit1)),
    ))
    .parse(input)?;

    match number_str.parse::<f64>() {
        Ok(n) => {
            let is_exact = !number_str.contains(['.', 'e', 'E']);
            Ok((rest, Number::new(n, is_exact, n.is_finite())))
        }
        Err(_) => parse_error(input, ErrorKind::Float),
    }
}

/// Parse a number with an optional `#i`/`#e` exactness prefix
fn parse_number(input: &str) -> IResult<&str, Number> {
    let (input, prefix) = opt(alt((tag(INEXACT_PREFIX), tag(EXACT_PREFIX)))).parse(input)?;
    let (rest, number) = alt((
        parse_special_number,
        parse_hexadecimal,
        parse_fraction,
        parse_decimal,
    ))
    .parse(input)?;

    match prefix {
        Some(p) if p == INEXACT_PREFIX => Ok((rest, Number::inexact(number.value))),
        // Infinities and NaN have no exact form
        Some(_) if !number.value.is_finite() => parse_error(input, ErrorKind::Verify),
        Some(_) => Ok((rest, Number::exact(number.value))),
        None => Ok((rest, number)),
    }
}

/// Parse the whole text as a number literal, as `string->number` does
pub(crate) fn parse_number_literal(text: &str) -> Option<Number> {
    all_consuming(parse_number)
        .parse(text)
        .ok()
        .map(|(_, number)| number)
}

/// Parse a boolean (#t, #f, #true or #false)
fn parse_bool(input: &str) -> IResult<&str, bool> {
    alt((
        value(true, tag("#true")),
        value(false, tag("#false")),
        value(true, tag("#t")),
        value(false, tag("#f")),
    ))
    .parse(input)
}

/// Parse a string literal
fn parse_string(input: &str) -> IResult<&str, String> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), chars)),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('r') => chars.push('\r'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    // Unknown or incomplete escape sequence
                    Some(_) | None => return parse_error(remaining, ErrorKind::Char),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            None => return parse_error(remaining, ErrorKind::Char),
        }
    }
}

/// Classify an atom: a literal operand, or an unresolved token
fn classify_atom(text: &str) -> Operand {
    let literal = all_consuming(alt((
        map(parse_number, Operand::Number),
        map(parse_bool, Operand::Bool),
        map(parse_string, Operand::String),
    )))
    .parse(text);

    match literal {
        Ok((_, operand)) => operand,
        Err(_) => Operand::Unknown(text.to_owned()),
    }
}

/// Names visible while parsing one top-level form
pub(crate) struct Scope<'a> {
    env: &'a Environment,
    /// Formal parameters of the enclosing definition
    params: &'a [String],
    /// Name and arity of the function being defined, so recursive calls are checked
    defining: Option<(&'a str, usize)>,
}

impl<'a> Scope<'a> {
    fn top_level(env: &'a Environment) -> Self {
        Scope {
            env,
            params: &[],
            defining: None,
        }
    }

    fn is_parameter(&self, name: &str) -> bool {
        self.params.iter().any(|param| param == name)
    }

    fn known_arity(&self, name: &str) -> Option<usize> {
        match self.defining {
            Some((defining, arity)) if defining == name => Some(arity),
            _ => self.env.arity_of(name),
        }
    }
}

/// Whether a name may be used for a user-defined function or parameter
fn is_user_identifier(name: &str) -> bool {
    is_valid_symbol(name) && name != DEFINE_KEYWORD && !is_builtin(name)
}

/// Parse text into an expression tree.
///
/// Returns `None` when no grammar form accepts the text: malformed syntax, wrong
/// operand counts, statically mismatched operand kinds and calls to known functions
/// with the wrong number of arguments all end up here.
///
/// # Example
/// ```
/// use racketlite::{Environment, parse};
///
/// let env = Environment::new();
/// assert!(parse("(boolean->string #t)", &env).is_some());
/// assert!(parse("(boolean->string 5)", &env).is_none());
/// assert!(parse("(<= 1)", &env).is_none());
/// ```
pub fn parse(text: &str, env: &Environment) -> Option<Expr> {
    parse_with_config(text, env, ParseConfig::default())
}

pub fn parse_with_config(text: &str, env: &Environment, config: ParseConfig) -> Option<Expr> {
    let text = if config.handle_comments {
        strip_comments(text)
    } else {
        Cow::Borrowed(text)
    };
    parse_form(&text, &Scope::top_level(env), 0)
}

fn parse_form(text: &str, scope: &Scope<'_>, depth: usize) -> Option<Expr> {
    if depth >= MAX_PARSE_DEPTH {
        tracing::trace!(depth, "expression nested too deeply");
        return None;
    }

    let text = text.trim();
    if !text.starts_with('(') {
        return parse_atom(text, scope);
    }

    let elements = list_elements(text)?;
    let (keyword, args) = elements.split_first()?;

    if *keyword == DEFINE_KEYWORD {
        return if depth == 0 {
            parse_define(args, scope.env)
        } else {
            tracing::trace!("define below top level");
            None
        };
    }

    try_parse(keyword, args, scope, depth)
}

/// Elements between the outer parentheses of a text that is exactly one list
fn list_elements(text: &str) -> Option<Vec<&str>> {
    match split_top_level(text).ok()?.as_slice() {
        [single] if single.len() == text.len() => {}
        _ => return None,
    }
    let inner = text.strip_prefix('(')?.strip_suffix(')')?;
    split_top_level(inner).ok()
}

fn parse_atom(text: &str, scope: &Scope<'_>) -> Option<Expr> {
    match classify_atom(text) {
        Operand::Unknown(token) => resolve_identifier(token, scope),
        literal => Some(Expr::Literal(literal)),
    }
}

fn resolve_identifier(name: String, scope: &Scope<'_>) -> Option<Expr> {
    if scope.is_parameter(&name) {
        return Some(Expr::Parameter(name));
    }
    if !is_user_identifier(&name) {
        tracing::trace!(token = %name, "not a literal or identifier");
        return None;
    }
    // A bare identifier refers to a constant: a call with no arguments
    resolve_call(name, Vec::new(), scope)
}

/// Build a user-defined call. Arity is checked now if the callee is known, otherwise
/// when the call is evaluated.
fn resolve_call(name: String, args: Vec<Expr>, scope: &Scope<'_>) -> Option<Expr> {
    if let Some(arity) = scope.known_arity(&name)
        && arity != args.len()
    {
        tracing::trace!(name = %name, expected = arity, got = args.len(), "call arity mismatch");
        return None;
    }
    Some(Expr::Call { name, args })
}

/// Match an operator form: parse the argument texts, then try each catalog rule
/// registered under `keyword` in priority order.
pub(crate) fn try_parse(
    keyword: &str,
    args: &[&str],
    scope: &Scope<'_>,
    depth: usize,
) -> Option<Expr> {
    let children = args
        .iter()
        .map(|arg| parse_form(arg, scope, depth + 1))
        .collect::<Option<Vec<Expr>>>()?;

    let rules = find_rules(keyword);
    if rules.is_empty() {
        if scope.is_parameter(keyword) || !is_user_identifier(keyword) {
            tracing::trace!(keyword, "not a callable name");
            return None;
        }
        return resolve_call(keyword.to_owned(), children, scope);
    }

    let kinds: Vec<OperandKind> = children.iter().map(Expr::static_kind).collect();
    for op in rules.iter().copied() {
        if op.accepts(&kinds) {
            return Some(Expr::Builtin { op, args: children });
        }
        tracing::trace!(keyword, arity = ?op.arity, ?kinds, "rule rejected operands");
    }
    None
}

/// `(define name expr)` or `(define (name param...) body)`
fn parse_define(args: &[&str], env: &Environment) -> Option<Expr> {
    let [header, body] = args else {
        return None;
    };

    if !header.starts_with('(') {
        if !is_user_identifier(header) {
            return None;
        }
        let body = parse_form(body, &Scope::top_level(env), 1)?;
        return Some(Expr::Define {
            name: (*header).to_owned(),
            params: None,
            body: Arc::new(body),
        });
    }

    let names = list_elements(header)?;
    let (name, params) = names.split_first()?;
    if !is_user_identifier(name) {
        return None;
    }

    let mut formals: Vec<String> = Vec::with_capacity(params.len());
    for param in params {
        if !is_user_identifier(param) || formals.iter().any(|f| f == param) {
            tracing::trace!(function = %name, param = %param, "invalid formal parameter");
            return None;
        }
        formals.push((*param).to_owned());
    }

    let scope = Scope {
        env,
        params: &formals,
        defining: Some((*name, formals.len())),
    };
    let body = parse_form(body, &scope, 1)?;

    Some(Expr::Define {
        name: (*name).to_owned(),
        params: Some(formals),
        body: Arc::new(body),
    })
}
