//! Session facade: text in, values out.
//!
//! An [`Interpreter`] owns one [`Environment`], so definitions made by one call are
//! visible to the next. Read loops feed it one expression at a time through
//! [`Interpreter::run`]; file loaders hand a whole source to
//! [`Interpreter::run_program`].

use crate::Error;
use crate::ast::{Expr, Value};
use crate::evaluator::{Environment, evaluate};
use crate::scheme::{ParseConfig, parse_with_config};
use crate::splitter::{split_top_level, strip_comments};
use std::borrow::Cow;

#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    env: Environment,
    config: ParseConfig,
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter::default()
    }

    pub fn with_environment(env: Environment) -> Self {
        Interpreter {
            env,
            config: ParseConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ParseConfig) -> Self {
        self.config = config;
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Parse without evaluating, against the session's current definitions
    pub fn tree(&self, text: &str) -> Option<Expr> {
        parse_with_config(text, &self.env, self.config)
    }

    /// Parse and evaluate a single expression
    ///
    /// ```
    /// use racketlite::{Interpreter, Value};
    ///
    /// let mut interpreter = Interpreter::new();
    /// assert_eq!(interpreter.run("(boolean->string #t)").unwrap(), Value::from("true"));
    /// assert!(interpreter.run("(boolean->string)").is_err());
    /// ```
    pub fn run(&mut self, text: &str) -> Result<Value, Error> {
        let expr = self
            .tree(text)
            .ok_or_else(|| Error::NoExpression(text.trim().to_owned()))?;
        evaluate(&expr, &mut self.env)
    }

    /// Evaluate every top-level form of a source text in order.
    ///
    /// Stops at the first error. Definitions made by forms before the failing one stay
    /// registered.
    pub fn run_program(&mut self, source: &str) -> Result<Vec<Value>, Error> {
        let source = if self.config.handle_comments {
            strip_comments(source)
        } else {
            Cow::Borrowed(source)
        };
        let forms = split_top_level(&source)?;
        tracing::debug!(forms = forms.len(), "running program");

        let mut values = Vec::with_capacity(forms.len());
        for form in forms {
            values.push(self.run(form)?);
        }
        Ok(values)
    }
}
