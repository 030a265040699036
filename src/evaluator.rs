use crate::Error;
use crate::MAX_EVAL_DEPTH;
use crate::ast::{Expr, Operand, Value, as_boolean};
use crate::builtinops::OpKind;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) mod intooperation;

/// Call-local bindings from formal parameter names to evaluated arguments
pub(crate) type Bindings = HashMap<String, Operand>;

/// A user-defined function: a name, ordered formal parameters and a body.
/// Constants are functions without parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct UserFunction {
    pub name: String,
    pub params: Vec<String>,
    pub body: Arc<Expr>,
}

impl UserFunction {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Per-session registry of user-defined functions.
///
/// The registry is read-only while an expression evaluates; only a top-level
/// definition writes to it. Independent sessions use independent environments.
#[derive(Debug, Clone)]
pub struct Environment {
    functions: HashMap<String, Arc<UserFunction>>,
    max_depth: usize,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            functions: HashMap::new(),
            max_depth: MAX_EVAL_DEPTH,
        }
    }

    /// Replace the evaluation nesting limit
    ///
    /// # Example
    /// ```
    /// use racketlite::{Environment, Interpreter};
    ///
    /// let env = Environment::new().with_max_depth(64);
    /// let mut interpreter = Interpreter::with_environment(env);
    /// interpreter.run("(define (spin n) (spin n))").unwrap();
    /// assert!(interpreter.run("(spin 1)").is_err());
    /// ```
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Register a function, replacing any previous definition under the same name
    pub fn define(&mut self, name: String, params: Vec<String>, body: Arc<Expr>) {
        tracing::debug!(name = %name, arity = params.len(), "defining function");
        let function = UserFunction {
            name: name.clone(),
            params,
            body,
        };
        self.functions.insert(name, Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<&UserFunction> {
        self.functions.get(name).map(Arc::as_ref)
    }

    /// Formal parameter count of a registered function
    pub fn arity_of(&self, name: &str) -> Option<usize> {
        self.get(name).map(UserFunction::arity)
    }

    /// All registered functions, sorted by name
    pub fn functions(&self) -> Vec<&UserFunction> {
        let mut functions: Vec<&UserFunction> =
            self.functions.values().map(Arc::as_ref).collect();
        functions.sort_by(|a, b| a.name.cmp(&b.name));
        functions
    }
}

/// Evaluate a parsed expression (public API)
///
/// A definition registers its function and yields [`Value::Unspecified`]. The
/// expression of a constant definition is evaluated once, at definition time, so a
/// failing constant leaves the registry untouched. Function bodies, including those
/// of zero-parameter functions, only run when called.
pub fn evaluate(expr: &Expr, env: &mut Environment) -> Result<Value, Error> {
    match expr {
        Expr::Define {
            name,
            params: None,
            body,
        } => {
            let operand = eval_with_depth_tracking(body, env, &Bindings::new(), 0)?;
            env.define(name.clone(), Vec::new(), Arc::new(Expr::Literal(operand)));
            Ok(Value::Unspecified)
        }
        Expr::Define {
            name,
            params: Some(params),
            body,
        } => {
            env.define(name.clone(), params.clone(), Arc::clone(body));
            Ok(Value::Unspecified)
        }
        _ => {
            let operand = eval_with_depth_tracking(expr, env, &Bindings::new(), 0)?;
            Value::try_from(operand)
        }
    }
}

/// Evaluate an expression with depth tracking to prevent stack overflow
pub(crate) fn eval_with_depth_tracking(
    expr: &Expr,
    env: &Environment,
    bindings: &Bindings,
    depth: usize,
) -> Result<Operand, Error> {
    if depth >= env.max_depth {
        return Err(Error::DepthExceeded {
            limit: env.max_depth,
        });
    }
    match expr {
        Expr::Literal(operand) => Ok(operand.clone()),

        // Only reachable for hand-built trees; the grammar resolves parameters in scope
        Expr::Parameter(name) => bindings
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownFunction(name.clone())),

        // Arity and static kinds were validated when the node was built
        Expr::Builtin { op, args } => match &op.op_kind {
            OpKind::Function(f) => {
                let evaluated = eval_args(args, env, bindings, depth)?;
                f(evaluated)
            }
            OpKind::SpecialForm(special_form) => special_form(args, env, bindings, depth),
        },

        Expr::Call { name, args } => call_user_function(name, args, env, bindings, depth),

        Expr::Define { name, .. } => Err(Error::Eval(format!(
            "define: {name} can only be defined at top level"
        ))),
    }
}

/// Evaluate argument expressions left to right, each exactly once
fn eval_args(
    args: &[Expr],
    env: &Environment,
    bindings: &Bindings,
    depth: usize,
) -> Result<Vec<Operand>, Error> {
    // A plain loop keeps the stack cost of each nesting level small
    let mut evaluated = Vec::with_capacity(args.len());
    for arg in args {
        evaluated.push(eval_with_depth_tracking(arg, env, bindings, depth + 1)?);
    }
    Ok(evaluated)
}

fn call_user_function(
    name: &str,
    args: &[Expr],
    env: &Environment,
    bindings: &Bindings,
    depth: usize,
) -> Result<Operand, Error> {
    tracing::trace!(name, argc = args.len(), depth, "calling user function");
    let function = env
        .get(name)
        .ok_or_else(|| Error::UnknownFunction(name.to_owned()))?;

    // Forward references defer their arity check to this point
    if function.arity() != args.len() {
        return Err(Error::arity_error(name, function.arity(), args.len()));
    }

    let evaluated = eval_args(args, env, bindings, depth)?;
    let locals: Bindings = function.params.iter().cloned().zip(evaluated).collect();

    eval_with_depth_tracking(&function.body, env, &locals, depth + 1)
        .map_err(|err| add_context(err, name))
}

/// Helper function to add the innermost function name to evaluation errors
fn add_context(error: Error, name: &str) -> Error {
    match error {
        Error::Eval(msg) if !msg.contains("\n  In function:") => {
            Error::Eval(format!("{msg}\n  In function: {name}"))
        }
        // Type, arity and lookup errors carry their own context
        other => other,
    }
}

/// Evaluate if special form: the condition must be a boolean and only the selected
/// branch is evaluated
pub(crate) fn eval_if(
    args: &[Expr],
    env: &Environment,
    bindings: &Bindings,
    depth: usize,
) -> Result<Operand, Error> {
    match args {
        [condition_expr, then_expr, else_expr] => {
            let condition = eval_with_depth_tracking(condition_expr, env, bindings, depth + 1)?;
            if as_boolean(&condition)? {
                eval_with_depth_tracking(then_expr, env, bindings, depth + 1)
            } else {
                eval_with_depth_tracking(else_expr, env, bindings, depth + 1)
            }
        }
        _ => Err(Error::arity_error("if", 3, args.len())),
    }
}
