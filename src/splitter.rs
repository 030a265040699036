//! Top-level splitting of S-expression text.
//!
//! The grammar never builds a generic list tree. It looks at one form at a time: the
//! text between a form's outer parentheses is split here into its top-level elements
//! (atoms, string literals and nested lists), and each element is handed back to the
//! grammar as a slice of the original text.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::recognize,
    error::ErrorKind,
    multi::many0,
    sequence::terminated,
};
use std::borrow::Cow;

use crate::MAX_PARSE_DEPTH;

/// Reasons a text cannot be split into top-level elements
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    /// Opening minus closing parentheses, outside string literals, is not zero
    #[error("unbalanced parentheses (balance {balance})")]
    Unbalanced { balance: isize },
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("expression too deeply nested (max depth: {MAX_PARSE_DEPTH})")]
    TooDeeplyNested,
    #[error("malformed expression at offset {offset}")]
    Malformed { offset: usize },
}

/// What a character-level pass over the text found outside string literals
struct Scan {
    balance: isize,
    unterminated_string: bool,
}

/// Walk the text once, tracking string literals (with escapes) and parenthesis balance
fn scan(text: &str) -> Scan {
    let mut balance = 0isize;
    let mut in_string = false;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match (in_string, c) {
            (true, '\\') => {
                chars.next();
            }
            (_, '"') => in_string = !in_string,
            (false, '(') => balance += 1,
            (false, ')') => balance -= 1,
            _ => {}
        }
    }

    Scan {
        balance,
        unterminated_string: in_string,
    }
}

/// Open minus close parentheses, ignoring parentheses inside string literals
pub fn paren_balance(text: &str) -> isize {
    scan(text).balance
}

/// Whether a (possibly multi-line) input is complete enough to parse
pub fn is_balanced(text: &str) -> bool {
    let scan = scan(text);
    scan.balance == 0 && !scan.unterminated_string
}

/// Remove `;` line comments that are not inside string literals
pub fn strip_comments(text: &str) -> Cow<'_, str> {
    if !text.contains(';') {
        return Cow::Borrowed(text);
    }

    let mut stripped = String::with_capacity(text.len());
    let mut in_string = false;
    let mut in_comment = false;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if in_comment {
            if c == '\n' {
                in_comment = false;
                stripped.push(c);
            }
            continue;
        }
        match c {
            ';' if !in_string => in_comment = true,
            '\\' if in_string => {
                stripped.push(c);
                if let Some(escaped) = chars.next() {
                    stripped.push(escaped);
                }
            }
            '"' => {
                in_string = !in_string;
                stripped.push(c);
            }
            _ => stripped.push(c),
        }
    }

    Cow::Owned(stripped)
}

/// Span of a string literal, escapes included. Escape validity is checked by the
/// literal parser, not here.
fn string_span(input: &str) -> IResult<&str, &str> {
    let (body, _) = char('"').parse(input)?;
    let mut chars = body.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                let end = 1 + i + 1;
                return Ok((&input[end..], &input[..end]));
            }
            '\\' => {
                chars.next();
            }
            _ => {}
        }
    }

    Err(nom::Err::Error(nom::error::Error::new(
        input,
        ErrorKind::Char,
    )))
}

/// Span of an atom: everything up to whitespace, a parenthesis or a string quote
fn atom_span(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && c != '(' && c != ')' && c != '"').parse(input)
}

/// Span of a parenthesized list, including its parentheses
fn list_span(input: &str, depth: usize) -> IResult<&str, &str> {
    recognize((
        char('('),
        multispace0,
        many0(terminated(|input| element_span(input, depth + 1), multispace0)),
        char(')'),
    ))
    .parse(input)
}

fn element_span(input: &str, depth: usize) -> IResult<&str, &str> {
    if depth >= MAX_PARSE_DEPTH {
        // Failure rather than Error so that `many0` does not swallow it
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }
    alt((|input| list_span(input, depth), string_span, atom_span)).parse(input)
}

/// Split text into its top-level elements, in order
///
/// ```
/// use racketlite::splitter::split_top_level;
///
/// let parts = split_top_level(r#"1 (+ 2 3) "a b""#).unwrap();
/// assert_eq!(parts, ["1", "(+ 2 3)", r#""a b""#]);
/// ```
pub fn split_top_level(text: &str) -> Result<Vec<&str>, SplitError> {
    let scan = scan(text);
    if scan.unterminated_string {
        return Err(SplitError::UnterminatedString);
    }
    if scan.balance != 0 {
        return Err(SplitError::Unbalanced {
            balance: scan.balance,
        });
    }

    let mut spans = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        match element_span(rest, 0) {
            Ok((remaining, span)) => {
                spans.push(span);
                rest = remaining.trim_start();
            }
            Err(nom::Err::Failure(e)) if e.code == ErrorKind::TooLarge => {
                return Err(SplitError::TooDeeplyNested);
            }
            Err(_) => {
                return Err(SplitError::Malformed {
                    offset: text.len() - rest.len(),
                });
            }
        }
    }

    Ok(spans)
}
