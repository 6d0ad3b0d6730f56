//! The evaluator: a trampolined loop over (expression, environment) pairs.
//!
//! Special forms return a [`Step`]. `Step::Continue` hands the next
//! expression back to the loop in [`eval`] instead of recursing, which is how
//! `if`, `do`, `let*`, `quasiquote` and closure calls run in constant native
//! stack. Every other nested evaluation goes through [`eval`] again and is
//! counted against [`MAX_EVAL_DEPTH`].

use std::cell::Cell;

use tracing::{debug, error, trace, warn};

use crate::ast::{Closure, Value, sym};
use crate::builtinops::{Arity, OpKind, find_builtin_op, get_builtin_ops};
use crate::reader::parse_str;
use crate::{Error, MAX_EVAL_DEPTH};

mod environment;
pub mod macros;
pub mod quasiquote;

pub use environment::Environment;
use environment::parse_params;
use macros::macroexpand;
use quasiquote::quasiquote;

/// Forms evaluated into every root environment
const PRELUDE: &[&str] = &[
    r#"(def! load-file (fn* (f) (eval (read-string (str "(do " (slurp f) "\nnil)")))))"#,
    "(defmacro! cond (fn* (& xs) (if (> (count xs) 0) (list 'if (first xs) (nth xs 1) (cons 'cond (rest (rest xs)))))))",
];

const CONTEXT_MARKER: &str = "\n  Context: ";

/// Remaining native stack below which evaluation moves to a new segment
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each stack segment allocated for deep evaluation
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Outcome of one evaluation step
pub(crate) enum Step {
    /// Evaluation finished with this value
    Done(Value),
    /// Evaluation continues with this expression in this environment
    Continue(Value, Environment),
}

thread_local! {
    static EVAL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Counts one level of nested evaluation on this thread while alive
struct DepthGuard;

impl DepthGuard {
    fn enter() -> Result<Self, Error> {
        EVAL_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= MAX_EVAL_DEPTH {
                warn!(max = MAX_EVAL_DEPTH, "evaluation depth limit exceeded");
                return Err(Error::EvalError(format!(
                    "Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
                )));
            }
            depth.set(current + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        EVAL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Evaluate an expression (public API)
///
/// Nested evaluation grows the native stack on demand, so any thread can
/// recurse up to [`MAX_EVAL_DEPTH`] levels.
pub fn eval(expr: &Value, env: &Environment) -> Result<Value, Error> {
    let _guard = DepthGuard::enter()?;
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || eval_loop(expr, env))
}

fn eval_loop(expr: &Value, env: &Environment) -> Result<Value, Error> {
    let mut expr = expr.clone();
    let mut env = env.clone();
    loop {
        match eval_step(&expr, &env)? {
            Step::Done(value) => return Ok(value),
            Step::Continue(next_expr, next_env) => {
                expr = next_expr;
                env = next_env;
            }
        }
    }
}

/// Parse one form from `source` and evaluate it
pub fn eval_str(source: &str, env: &Environment) -> Result<Value, Error> {
    eval(&parse_str(source)?, env)
}

/// Apply a function to already-evaluated arguments
pub fn apply(func: &Value, args: Vec<Value>) -> Result<Value, Error> {
    match func {
        Value::Function(closure) if !closure.is_macro => {
            let call_env = Environment::bind(&closure.env, &closure.params, args)?;
            eval(&closure.body, &call_env)
        }
        Value::BuiltinFunction { func, .. } => func(args),
        other => Err(Error::NotCallable(other.to_string())),
    }
}

fn eval_step(expr: &Value, env: &Environment) -> Result<Step, Error> {
    match expr {
        Value::Symbol(name) => env.get(name).map(Step::Done),
        Value::Vector(items) => Ok(Step::Done(Value::vector(eval_args(items, env)?))),
        Value::Map(items) => Ok(Step::Done(Value::map(eval_args(items, env)?))),
        Value::List(items) => eval_list(expr, items, env).map_err(|err| add_context(err, expr)),
        Value::Nil
        | Value::Bool(_)
        | Value::Number(_)
        | Value::String(_)
        | Value::Atom(_)
        | Value::Function(_)
        | Value::BuiltinFunction { .. } => Ok(Step::Done(expr.clone())),
    }
}

/// Attach the innermost failing list expression to evaluation and type errors
fn add_context(error: Error, expr: &Value) -> Error {
    match error {
        Error::EvalError(msg) if !msg.contains(CONTEXT_MARKER) => {
            Error::EvalError(format!("{msg}{CONTEXT_MARKER}while evaluating: {expr}"))
        }
        Error::TypeError(msg) if !msg.contains(CONTEXT_MARKER) => {
            Error::TypeError(format!("{msg}{CONTEXT_MARKER}while evaluating: {expr}"))
        }
        other => other,
    }
}

fn eval_args(args: &[Value], env: &Environment) -> Result<Vec<Value>, Error> {
    args.iter().map(|arg| eval(arg, env)).collect()
}

fn eval_list(expr: &Value, items: &[Value], env: &Environment) -> Result<Step, Error> {
    let Some((head, operands)) = items.split_first() else {
        return Ok(Step::Done(expr.clone()));
    };

    if let Some(expanded) = macros::expand_once(expr, env)? {
        return Ok(Step::Continue(expanded, env.clone()));
    }

    if let Value::Symbol(name) = head
        && let Some(op) = find_builtin_op(name)
        && let OpKind::SpecialForm(special_form) = op.op_kind
    {
        op.validate_arity(operands.len())
            .map_err(|_| Error::arity_error_with_expr(op.arity, operands.len(), name.as_str()))?;
        return special_form(operands, env);
    }

    let func = eval(head, env)?;
    let args = eval_args(operands, env)?;

    match &func {
        Value::Function(closure) if !closure.is_macro => {
            let call_env =
                Environment::bind(&closure.env, &closure.params, args).map_err(|err| match err {
                    Error::ArityError {
                        expected,
                        got,
                        expression: None,
                    } => Error::arity_error_with_expr(expected, got, head.to_string()),
                    other => other,
                })?;
            trace!(function = %head, "tail call");
            Ok(Step::Continue(closure.body.clone(), call_env))
        }
        Value::BuiltinFunction { func, .. } => func(args).map(Step::Done),
        other => Err(Error::NotCallable(other.to_string())),
    }
}

/// Wrap a body of zero or several forms in `do`
fn body_form(body: &[Value]) -> Value {
    match body {
        [single] => single.clone(),
        _ => Value::list(std::iter::once(sym("do")).chain(body.iter().cloned()).collect()),
    }
}

/// Binding and parameter forms may be written as a list or a vector
fn binding_forms<'a>(value: &'a Value, form: &str) -> Result<&'a [Value], Error> {
    match value {
        Value::List(items) | Value::Vector(items) => Ok(items.as_slice()),
        other => Err(Error::TypeError(format!(
            "{form} expects a list or vector of bindings, got {}",
            other.type_name()
        ))),
    }
}

/// Evaluate def! special form
pub(crate) fn eval_def(args: &[Value], env: &Environment) -> Result<Step, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = eval(expr, env)?;
            debug!(%name, "defined");
            env.set(name.as_str(), value.clone());
            Ok(Step::Done(value))
        }
        [other, _] => Err(Error::TypeError(format!(
            "def! requires a symbol, got {}",
            other.type_name()
        ))),
        _ => Err(Error::arity_error(Arity::Exact(2), args.len())),
    }
}

/// Evaluate defmacro! special form
pub(crate) fn eval_defmacro(args: &[Value], env: &Environment) -> Result<Step, Error> {
    match args {
        [Value::Symbol(name), expr] => match eval(expr, env)? {
            Value::Function(closure) => {
                let macro_value = Value::function(closure.to_macro());
                debug!(%name, "defined macro");
                env.set(name.as_str(), macro_value.clone());
                Ok(Step::Done(macro_value))
            }
            other => Err(Error::TypeError(format!(
                "defmacro! requires a function, got {}",
                other.type_name()
            ))),
        },
        [other, _] => Err(Error::TypeError(format!(
            "defmacro! requires a symbol, got {}",
            other.type_name()
        ))),
        _ => Err(Error::arity_error(Arity::Exact(2), args.len())),
    }
}

/// Evaluate let* special form
pub(crate) fn eval_let(args: &[Value], env: &Environment) -> Result<Step, Error> {
    let [bindings, body @ ..] = args else {
        return Err(Error::arity_error(Arity::AtLeast(1), args.len()));
    };

    let pairs = binding_forms(bindings, "let*")?;
    if pairs.len() % 2 != 0 {
        return Err(Error::EvalError(
            "let* bindings require an even number of forms".to_owned(),
        ));
    }

    let let_env = Environment::with_parent(env);
    for pair in pairs.chunks_exact(2) {
        match pair {
            [Value::Symbol(name), expr] => {
                let value = eval(expr, &let_env)?;
                let_env.set(name.as_str(), value);
            }
            [other, _] => {
                return Err(Error::TypeError(format!(
                    "let* binding names must be symbols, got {}",
                    other.type_name()
                )));
            }
            _ => unreachable!("chunks_exact yields pairs"),
        }
    }

    Ok(Step::Continue(body_form(body), let_env))
}

/// Evaluate do special form
pub(crate) fn eval_do(args: &[Value], env: &Environment) -> Result<Step, Error> {
    match args {
        [] => Ok(Step::Done(Value::Nil)),
        [init @ .., last] => {
            for form in init {
                eval(form, env)?;
            }
            Ok(Step::Continue(last.clone(), env.clone()))
        }
    }
}

/// Evaluate if special form
pub(crate) fn eval_if(args: &[Value], env: &Environment) -> Result<Step, Error> {
    let (condition_expr, then_expr, else_expr) = match args {
        [condition, then_branch] => (condition, then_branch, None),
        [condition, then_branch, else_branch] => (condition, then_branch, Some(else_branch)),
        _ => return Err(Error::arity_error(Arity::Range(2, 3), args.len())),
    };

    if eval(condition_expr, env)?.is_truthy() {
        Ok(Step::Continue(then_expr.clone(), env.clone()))
    } else {
        match else_expr {
            Some(expr) => Ok(Step::Continue(expr.clone(), env.clone())),
            None => Ok(Step::Done(Value::Nil)),
        }
    }
}

/// Evaluate fn* special form
pub(crate) fn eval_fn(args: &[Value], env: &Environment) -> Result<Step, Error> {
    match args {
        [params, body @ ..] => {
            let params = parse_params(binding_forms(params, "fn*")?)?;
            Ok(Step::Done(Value::function(Closure {
                params,
                body: body_form(body),
                env: env.clone(),
                is_macro: false,
            })))
        }
        [] => Err(Error::arity_error(Arity::AtLeast(1), args.len())),
    }
}

/// Evaluate quote special form
pub(crate) fn eval_quote(args: &[Value], _env: &Environment) -> Result<Step, Error> {
    match args {
        [expr] => Ok(Step::Done(expr.clone())),
        _ => Err(Error::arity_error(Arity::Exact(1), args.len())),
    }
}

/// Evaluate quasiquote special form
pub(crate) fn eval_quasiquote(args: &[Value], env: &Environment) -> Result<Step, Error> {
    match args {
        [template] => Ok(Step::Continue(quasiquote(template), env.clone())),
        _ => Err(Error::arity_error(Arity::Exact(1), args.len())),
    }
}

/// Evaluate quasiquoteexpand special form
pub(crate) fn eval_quasiquoteexpand(args: &[Value], _env: &Environment) -> Result<Step, Error> {
    match args {
        [template] => Ok(Step::Done(quasiquote(template))),
        _ => Err(Error::arity_error(Arity::Exact(1), args.len())),
    }
}

/// Evaluate macroexpand special form
pub(crate) fn eval_macroexpand(args: &[Value], env: &Environment) -> Result<Step, Error> {
    match args {
        [form] => Ok(Step::Done(macroexpand(form, env)?)),
        _ => Err(Error::arity_error(Arity::Exact(1), args.len())),
    }
}

/// Create a root environment with the builtin functions and the prelude
pub fn create_global_env() -> Environment {
    let env = Environment::new();

    for builtin_op in get_builtin_ops() {
        if let OpKind::Function(func) = builtin_op.op_kind {
            env.register_builtin_with_arity(builtin_op.id, builtin_op.arity, func);
        }
    }

    // Held weakly: the root owns this builtin, so a strong handle would leak the root
    let root = env.downgrade();
    env.register_builtin_with_arity("eval", Arity::Exact(1), move |args| {
        let root = root.upgrade().ok_or_else(|| {
            Error::EvalError("eval: root environment no longer exists".to_owned())
        })?;
        match args {
            [form] => eval(form, &root),
            _ => Err(Error::arity_error(Arity::Exact(1), args.len())),
        }
    });

    for source in PRELUDE {
        if let Err(err) = eval_str(source, &env) {
            error!(%err, source = %source, "failed to evaluate prelude form");
        }
    }

    env
}
