//! Lexically chained scope frames.
//!
//! An [`Environment`] is a cheap, cloneable handle to a frame. Closures keep
//! the handle of the frame they were created in, so every copy of a handle
//! sees later `def!`s made through any other copy.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::Error;
use crate::ast::{VARIADIC_MARKER, Value};
use crate::builtinops::Arity;

struct Frame {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Environment>,
}

/// Environment for variable bindings
#[derive(Clone)]
pub struct Environment(Rc<Frame>);

/// Non-owning handle, used where a value stored in an environment needs to
/// refer back to it without forming an `Rc` cycle.
#[derive(Clone)]
pub(crate) struct WeakEnvironment(Weak<Frame>);

impl WeakEnvironment {
    pub(crate) fn upgrade(&self) -> Option<Environment> {
        self.0.upgrade().map(Environment)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Values may refer back to this frame, so only names are shown
        let mut names: Vec<String> = self.0.bindings.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("names", &names)
            .field("has_parent", &self.0.parent.is_some())
            .finish()
    }
}

/// Handles are equal when they point at the same frame
impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Environment {
    /// Create an empty root frame
    pub fn new() -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        }))
    }

    /// Create an empty frame whose lookups fall back to `parent`
    pub fn with_parent(parent: &Environment) -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
        }))
    }

    /// Create a call frame binding `params` to `args` positionally.
    ///
    /// A `&` parameter binds every remaining argument, as a list, to the name
    /// that follows it. Without `&` the counts must match exactly; with it
    /// at least the fixed parameters must be supplied.
    pub fn bind(parent: &Environment, params: &[String], mut args: Vec<Value>) -> Result<Self, Error> {
        let env = Environment::with_parent(parent);

        match params.iter().position(|p| p == VARIADIC_MARKER) {
            Some(marker) => {
                let fixed = &params[..marker];
                let Some(rest_name) = params.get(marker + 1) else {
                    return Err(Error::EvalError(format!(
                        "'{VARIADIC_MARKER}' must be followed by a parameter name"
                    )));
                };
                if args.len() < fixed.len() {
                    return Err(Error::arity_error(Arity::AtLeast(fixed.len()), args.len()));
                }

                let rest = args.split_off(fixed.len());
                for (name, value) in fixed.iter().zip(args) {
                    env.set(name, value);
                }
                env.set(rest_name, Value::list(rest));
            }
            None => {
                if args.len() != params.len() {
                    return Err(Error::arity_error(Arity::Exact(params.len()), args.len()));
                }
                for (name, value) in params.iter().zip(args) {
                    env.set(name, value);
                }
            }
        }

        Ok(env)
    }

    /// Bind `name` in this frame, replacing any existing binding here.
    /// Parent frames are never touched.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Resolve `name` through the parent chain
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut frame = &self.0;
        loop {
            if let Some(value) = frame.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            match &frame.parent {
                Some(parent) => frame = &parent.0,
                None => return None,
            }
        }
    }

    /// Like [`Environment::lookup`], failing with `SymbolNotFound`
    pub fn get(&self, name: &str) -> Result<Value, Error> {
        self.lookup(name)
            .ok_or_else(|| Error::SymbolNotFound(name.to_owned()))
    }

    pub(crate) fn downgrade(&self) -> WeakEnvironment {
        WeakEnvironment(Rc::downgrade(&self.0))
    }

    /// Register a native function in this frame.
    ///
    /// # Example
    /// ```
    /// use malxp::evaluator::{create_global_env, eval_str};
    /// use malxp::ast::Value;
    /// use malxp::Error;
    ///
    /// fn answer(_args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::Number(42))
    /// }
    ///
    /// let env = create_global_env();
    /// env.register_builtin_function("answer", answer);
    /// assert_eq!(eval_str("(answer)", &env).unwrap(), Value::Number(42));
    /// ```
    pub fn register_builtin_function(&self, name: &str, func: fn(&[Value]) -> Result<Value, Error>) {
        self.register_builtin_with_arity(name, Arity::Any, func);
    }

    /// Register a native function whose argument count is checked against
    /// `arity` before every call.
    pub fn register_builtin_with_arity<F>(&self, name: &str, arity: Arity, func: F)
    where
        F: Fn(&[Value]) -> Result<Value, Error> + 'static,
    {
        self.set(
            name,
            Value::BuiltinFunction {
                id: name.to_owned(),
                func: Rc::new(move |args: Vec<Value>| {
                    arity.validate(args.len())?;
                    func(&args)
                }),
            },
        );
    }

    /// Get all bindings in this environment and its parents.
    /// Returns (name, value) pairs sorted by name; inner bindings win.
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        if let Some(parent) = &self.0.parent {
            bindings.extend(parent.get_all_bindings());
        }
        for (name, value) in self.0.bindings.borrow().iter() {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

/// Validate a `fn*` parameter form and return the parameter names.
///
/// Every element must be a symbol and `&`, if present, must be followed by
/// exactly one name.
pub(crate) fn parse_params(forms: &[Value]) -> Result<Vec<String>, Error> {
    let params = forms
        .iter()
        .map(|form| match form {
            Value::Symbol(name) => Ok(name.clone()),
            other => Err(Error::TypeError(format!(
                "fn* parameters must be symbols, got {}",
                other.type_name()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(marker) = params.iter().position(|p| p == VARIADIC_MARKER)
        && marker + 2 != params.len()
    {
        return Err(Error::EvalError(format!(
            "'{VARIADIC_MARKER}' must be followed by exactly one parameter name"
        )));
    }

    Ok(params)
}
