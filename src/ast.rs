//! This module defines the core value model for the interpreter. The main enum,
//! [`Value`], is a closed set of variants covering every datum a program can
//! read, build or return: nil, booleans, integers, symbols, strings, the three
//! sequence kinds (list, vector, map), atoms, user closures and native
//! functions. Sequences share their storage through `Rc`, so cloning a
//! `Value` never copies a tree.
//!
//! Ergonomic helpers such as [`val`], [`sym`] and [`nil`] are provided for
//! building values in code and tests, together with `From` conversions from
//! common Rust types. Equality is structural for data and identity-only for
//! atoms and functions.

use std::cell::RefCell;
use std::rc::Rc;

use crate::Error;
use crate::evaluator::Environment;

/// Type alias for number values in interpreter
pub type NumberType = i64;

/// Canonical erased native function type used by the evaluator.
///
/// Builtins receive ownership of their evaluated argument vector.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error>;

/// Parameter marker that collects the remaining arguments into a list
pub const VARIADIC_MARKER: &str = "&";

/// A user-defined function: parameter names, a body form and the environment
/// captured where the `fn*` form was evaluated.
#[derive(Debug)]
pub struct Closure {
    pub params: Vec<String>,
    pub body: Value,
    pub env: Environment,
    /// Fixed when the closure is built; `defmacro!` builds a flagged copy.
    pub is_macro: bool,
}

impl Closure {
    /// Copy of this closure with the macro flag set
    pub(crate) fn to_macro(&self) -> Closure {
        Closure {
            params: self.params.clone(),
            body: self.body.clone(),
            env: self.env.clone(),
            is_macro: true,
        }
    }
}

/// Core value type in interpreter
///
/// To build values, use the ergonomic helper functions:
/// - `val(42)` for numbers, strings and booleans, `sym("name")` for symbols, `nil()` for nil
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    /// Numbers (integers only)
    Number(NumberType),
    /// Symbols (identifiers)
    Symbol(String),
    /// String literals, stored unescaped
    String(String),
    List(Rc<Vec<Value>>),
    Vector(Rc<Vec<Value>>),
    /// Alternating keys and values, in source order
    Map(Rc<Vec<Value>>),
    /// Mutable single-value cell; compared by identity
    Atom(Rc<RefCell<Value>>),
    /// User-defined function or macro
    Function(Rc<Closure>),
    /// Native function. `id` is the name it was registered under.
    BuiltinFunction { id: String, func: Rc<OperationFn> },
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn write_items(
            f: &mut std::fmt::Formatter<'_>,
            name: &str,
            items: &[Value],
        ) -> std::fmt::Result {
            write!(f, "{name}(")?;
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{v:?}")?;
            }
            write!(f, ")")
        }

        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::List(items) => write_items(f, "List", items),
            Value::Vector(items) => write_items(f, "Vector", items),
            Value::Map(items) => write_items(f, "Map", items),
            Value::Atom(cell) => write!(f, "Atom({:?})", cell.borrow()),
            Value::Function(closure) => write!(
                f,
                "{}(params={:?}, body={:?})",
                if closure.is_macro { "Macro" } else { "Function" },
                closure.params,
                closure.body
            ),
            Value::BuiltinFunction { id, .. } => write!(f, "BuiltinFunction({id})"),
        }
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

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(|x| x.into()).collect())
    }
}

/// Helper for creating symbols - works great in mixed lists!
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper for creating Values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

pub fn nil() -> Value {
    Value::Nil
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }

    pub fn vector(items: Vec<Value>) -> Value {
        Value::Vector(Rc::new(items))
    }

    pub fn map(items: Vec<Value>) -> Value {
        Value::Map(Rc::new(items))
    }

    pub fn atom(value: Value) -> Value {
        Value::Atom(Rc::new(RefCell::new(value)))
    }

    pub fn function(closure: Closure) -> Value {
        Value::Function(Rc::new(closure))
    }

    /// Nil and `false` are falsy; everything else, empty sequences included, is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_macro(&self) -> bool {
        matches!(self, Value::Function(closure) if closure.is_macro)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Symbol(_) => "symbol",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::Map(_) => "map",
            Value::Atom(_) => "atom",
            Value::Function(closure) if closure.is_macro => "macro",
            Value::Function(_) => "function",
            Value::BuiltinFunction { .. } => "builtin-function",
        }
    }

    /// Borrow the elements of a List or Vector; Nil is the empty sequence.
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Vector(items) => Some(items.as_slice()),
            Value::Nil => Some(&[][..]),
            _ => None,
        }
    }

    fn expect_seq(&self, operation: &str) -> Result<&[Value], Error> {
        self.as_seq().ok_or_else(|| {
            Error::TypeError(format!(
                "{operation} expects a list or vector, got {}",
                self.type_name()
            ))
        })
    }

    pub fn as_number(&self) -> Result<NumberType, Error> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(Error::TypeError(format!(
                "expected number, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_string(&self) -> Result<&str, Error> {
        match self {
            Value::String(s) => Ok(s.as_str()),
            other => Err(Error::TypeError(format!(
                "expected string, got {}",
                other.type_name()
            ))),
        }
    }

    /// First element, or Nil for an empty sequence or Nil
    pub fn first(&self) -> Result<Value, Error> {
        Ok(self
            .expect_seq("first")?
            .first()
            .cloned()
            .unwrap_or(Value::Nil))
    }

    /// Everything after the first element, always as a List
    pub fn rest(&self) -> Result<Value, Error> {
        let items = self.expect_seq("rest")?;
        Ok(Value::list(items.iter().skip(1).cloned().collect()))
    }

    pub fn nth(&self, index: NumberType) -> Result<Value, Error> {
        let items = self.expect_seq("nth")?;
        usize::try_from(index)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .ok_or(Error::IndexOutOfRange {
                index,
                len: items.len(),
            })
    }

    pub fn count(&self) -> Result<usize, Error> {
        Ok(self.expect_seq("count")?.len())
    }

    pub fn is_empty_seq(&self) -> Result<bool, Error> {
        Ok(self.expect_seq("empty?")?.is_empty())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            // Lists and vectors are both sequential and compare element-wise
            (
                Value::List(a) | Value::Vector(a),
                Value::List(b) | Value::Vector(b),
            ) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Atom(a), Value::Atom(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::BuiltinFunction { func: f1, .. }, Value::BuiltinFunction { func: f2, .. }) => {
                Rc::ptr_eq(f1, f2)
            }
            _ => false, // Different variants are never equal
        }
    }
}
