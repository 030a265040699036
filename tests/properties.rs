//! Property-based tests for parsing and evaluation.
//!
//! These check the typing and exactness rules over generated inputs rather than
//! hand-picked cases, and that rendered trees parse back unchanged.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

use proptest::prelude::*;
use racketlite::{Environment, Interpreter, Number, Value, parse};

fn run(text: &str) -> Value {
    Interpreter::new().run(text).unwrap()
}

fn number(value: Value) -> Number {
    match value {
        Value::Number(n) => n,
        other => panic!("expected a number, got {other}"),
    }
}

/// Arithmetic expressions over small exact integers, rendered as source text
fn arithmetic_strategy() -> impl Strategy<Value = String> {
    let leaf = (-50i64..50).prop_map(|n| n.to_string());
    leaf.prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..4)
                .prop_map(|args| format!("(+ {})", args.join(" "))),
            prop::collection::vec(inner.clone(), 2..4)
                .prop_map(|args| format!("(* {})", args.join(" "))),
            inner.clone().prop_map(|arg| format!("(- {arg})")),
            inner.clone().prop_map(|arg| format!("(add1 {arg})")),
            (inner.clone(), inner).prop_map(|(a, b)| format!("(max {a} {b})")),
        ]
    })
}

proptest! {
    #[test]
    fn boolean_to_string_spells_the_boolean(b in any::<bool>()) {
        let literal = if b { "#t" } else { "#f" };
        let result = run(&format!("(boolean->string {literal})"));
        prop_assert_eq!(result, Value::from(b.to_string()));
    }

    #[test]
    fn cos_of_exact_input_is_inexact(n in -1000i64..1000) {
        let result = number(run(&format!("(cos {n})")));
        prop_assert!(!result.is_exact);
        prop_assert_eq!(result.value, (n as f64).cos());
    }

    #[test]
    fn cos_of_inexact_input_is_inexact(x in -1000.0f64..1000.0) {
        let result = number(run(&format!("(cos {x:?})")));
        prop_assert!(!result.is_exact);
    }

    #[test]
    fn less_or_equal_is_pairwise(values in prop::collection::vec(-20i64..20, 2..7)) {
        let text = format!(
            "(<= {})",
            values.iter().map(i64::to_string).collect::<Vec<_>>().join(" ")
        );
        let expected = values.windows(2).all(|pair| pair[0] <= pair[1]);
        prop_assert_eq!(run(&text), Value::Bool(expected));
    }

    #[test]
    fn sub1_keeps_exactness(n in -10_000i64..10_000) {
        let exact = number(run(&format!("(sub1 {n})")));
        prop_assert_eq!(exact, Number::exact((n - 1) as f64));

        let inexact = number(run(&format!("(sub1 #i{n})")));
        prop_assert_eq!(inexact, Number::inexact((n - 1) as f64));
    }

    #[test]
    fn exact_arithmetic_stays_exact(text in arithmetic_strategy()) {
        let result = number(run(&text));
        prop_assert!(result.is_exact, "{} produced {}", text, result);
    }

    #[test]
    fn rendered_trees_parse_back(text in arithmetic_strategy()) {
        let env = Environment::new();
        let expr = parse(&text, &env).unwrap();
        let rendered = expr.to_string();
        prop_assert_eq!(parse(&rendered, &env), Some(expr));
    }
}
