//! Built-in operations registry.
//!
//! This module provides a single registry of the interpreter's built-in
//! operations: the special forms the evaluator dispatches on by name, and the
//! primitive functions seeded into every root environment.
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: Evaluate all arguments before application (e.g., `+`, `cons`, `str`)
//! - **Special Forms**: Receive their operands unevaluated and decide what
//!   to evaluate (e.g., `if`, `let*`, `fn*`)
//!
//! Special forms are matched on the literal head symbol of a list and cannot
//! be rebound. Functions are ordinary bindings and can be shadowed or passed
//! around like any other value.
//!
//! ## Error Handling
//!
//! - **Arity Checking**: every entry declares an [`Arity`] validated before the call
//! - **Overflow Detection**: integer arithmetic reports overflow instead of wrapping
//! - **Type Errors**: operations reject operands of the wrong type
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** following the signature `fn(args: &[Value]) -> Result<Value, Error>`
//! 2. **Add to BUILTIN_OPS** with its identifier and arity
//! 3. **Add tests** covering edge cases and error conditions

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{NumberType, Value};
use crate::evaluator::{
    Environment, Step, apply, eval_def, eval_defmacro, eval_do, eval_fn, eval_if, eval_let,
    eval_macroexpand, eval_quasiquote, eval_quasiquoteexpand, eval_quote,
};
use crate::printer::render_joined;
use crate::reader::parse_str;
use crate::{ParseErrorKind, ParseError};

/// Expected number of arguments for an operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Between min and max arguments (inclusive)
    Range(usize, usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    /// Check if the given number of arguments is valid
    pub fn validate(&self, arg_count: usize) -> Result<(), Error> {
        let valid = match *self {
            Arity::Exact(n) => arg_count == n,
            Arity::AtLeast(n) => arg_count >= n,
            Arity::Range(min, max) => (min..=max).contains(&arg_count),
            Arity::Any => true,
        };
        if valid {
            Ok(())
        } else {
            Err(Error::arity_error(*self, arg_count))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Signature shared by all primitive functions
pub(crate) type BuiltinFn = fn(&[Value]) -> Result<Value, Error>;

/// Signature shared by all special forms: unevaluated operands in, next step out
pub(crate) type SpecialFormFn = fn(&[Value], &Environment) -> Result<Step, Error>;

/// Represents the implementation of a built-in expression (function or special form)
#[derive(Clone, Copy)]
pub(crate) enum OpKind {
    /// Regular function that takes evaluated arguments and returns a value
    Function(BuiltinFn),
    /// Special form that receives the environment and its unevaluated operands
    SpecialForm(SpecialFormFn),
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub(crate) struct BuiltinOp {
    /// The identifier this operation is bound to
    pub id: &'static str,
    /// The implementation of this operation (function or special form)
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl BuiltinOp {
    /// Check if the given number of arguments is valid for this operation
    pub(crate) fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity.validate(arg_count)
    }
}

//
// Argument helpers
//

fn one(args: &[Value]) -> Result<&Value, Error> {
    match args {
        [value] => Ok(value),
        _ => Err(Error::arity_error(Arity::Exact(1), args.len())),
    }
}

fn two(args: &[Value]) -> Result<(&Value, &Value), Error> {
    match args {
        [first, second] => Ok((first, second)),
        _ => Err(Error::arity_error(Arity::Exact(2), args.len())),
    }
}

fn numbers(args: &[Value]) -> Result<Vec<NumberType>, Error> {
    args.iter().map(Value::as_number).collect()
}

fn overflow(op: &str) -> Error {
    Error::EvalError(format!("Integer overflow in {op}"))
}

fn count_value(len: usize) -> Result<Value, Error> {
    NumberType::try_from(len)
        .map(Value::Number)
        .map_err(|_| overflow("count"))
}

fn seq_items<'a>(value: &'a Value, op: &str) -> Result<&'a [Value], Error> {
    value.as_seq().ok_or_else(|| {
        Error::TypeError(format!(
            "{op} expects a list or vector, got {}",
            value.type_name()
        ))
    })
}

//
// Builtin Function Implementations
//

fn builtin_add(args: &[Value]) -> Result<Value, Error> {
    numbers(args)?
        .into_iter()
        .try_fold(0, |acc: NumberType, n| acc.checked_add(n))
        .map(Value::Number)
        .ok_or_else(|| overflow("+"))
}

fn builtin_sub(args: &[Value]) -> Result<Value, Error> {
    let nums = numbers(args)?;
    let result = match nums.as_slice() {
        [] => return Err(Error::arity_error(Arity::AtLeast(1), 0)),
        [n] => n.checked_neg(),
        [first, rest @ ..] => rest
            .iter()
            .try_fold(*first, |acc, &n| acc.checked_sub(n)),
    };
    result.map(Value::Number).ok_or_else(|| overflow("-"))
}

fn builtin_mul(args: &[Value]) -> Result<Value, Error> {
    numbers(args)?
        .into_iter()
        .try_fold(1, |acc: NumberType, n| acc.checked_mul(n))
        .map(Value::Number)
        .ok_or_else(|| overflow("*"))
}

fn builtin_div(args: &[Value]) -> Result<Value, Error> {
    let nums = numbers(args)?;
    let (first, rest) = match nums.as_slice() {
        [] => return Err(Error::arity_error(Arity::AtLeast(1), 0)),
        // Unary division is the reciprocal
        [n] => (1, std::slice::from_ref(n)),
        [first, rest @ ..] => (*first, rest),
    };

    let mut acc: NumberType = first;
    for &divisor in rest {
        if divisor == 0 {
            return Err(Error::EvalError("Division by zero".to_owned()));
        }
        acc = acc.checked_div(divisor).ok_or_else(|| overflow("/"))?;
    }
    Ok(Value::Number(acc))
}

// Macro to generate chained numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            let nums = numbers(args)?;
            // Chain comparisons: all adjacent pairs must satisfy the comparison
            Ok(Value::Bool(nums.windows(2).all(|pair| pair[0] $op pair[1])))
        }
    };
}

numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_ge, >=);

fn builtin_equal(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(args.windows(2).all(|pair| pair[0] == pair[1])))
}

fn builtin_list(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::list(args.to_vec()))
}

fn builtin_vector(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::vector(args.to_vec()))
}

// Macro to generate single-argument type predicates
macro_rules! type_predicate {
    ($name:ident, $pattern:pat) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            Ok(Value::Bool(matches!(one(args)?, $pattern)))
        }
    };
}

type_predicate!(builtin_is_list, Value::List(_));
type_predicate!(builtin_is_vector, Value::Vector(_));
type_predicate!(builtin_is_sequential, Value::List(_) | Value::Vector(_));
type_predicate!(builtin_is_nil, Value::Nil);
type_predicate!(builtin_is_true, Value::Bool(true));
type_predicate!(builtin_is_false, Value::Bool(false));
type_predicate!(builtin_is_symbol, Value::Symbol(_));
type_predicate!(builtin_is_string, Value::String(_));
type_predicate!(builtin_is_number, Value::Number(_));
type_predicate!(builtin_is_atom, Value::Atom(_));

fn builtin_is_fn(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(match one(args)? {
        Value::Function(closure) => !closure.is_macro,
        Value::BuiltinFunction { .. } => true,
        _ => false,
    }))
}

fn builtin_is_macro(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(one(args)?.is_macro()))
}

fn builtin_not(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(!one(args)?.is_truthy()))
}

fn builtin_symbol(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Symbol(one(args)?.as_string()?.to_owned()))
}

fn builtin_is_empty(args: &[Value]) -> Result<Value, Error> {
    one(args)?.is_empty_seq().map(Value::Bool)
}

fn builtin_count(args: &[Value]) -> Result<Value, Error> {
    count_value(one(args)?.count()?)
}

fn builtin_cons(args: &[Value]) -> Result<Value, Error> {
    let (head, tail) = two(args)?;
    let tail = seq_items(tail, "cons")?;
    let mut items = Vec::with_capacity(tail.len() + 1);
    items.push(head.clone());
    items.extend_from_slice(tail);
    Ok(Value::list(items))
}

fn builtin_concat(args: &[Value]) -> Result<Value, Error> {
    let mut items = Vec::new();
    for seq in args {
        items.extend_from_slice(seq_items(seq, "concat")?);
    }
    Ok(Value::list(items))
}

fn builtin_vec(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::vector(seq_items(one(args)?, "vec")?.to_vec()))
}

fn builtin_first(args: &[Value]) -> Result<Value, Error> {
    one(args)?.first()
}

fn builtin_rest(args: &[Value]) -> Result<Value, Error> {
    one(args)?.rest()
}

fn builtin_nth(args: &[Value]) -> Result<Value, Error> {
    let (seq, index) = two(args)?;
    seq.nth(index.as_number()?)
}

fn builtin_str(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::String(render_joined(args, false, "")))
}

fn builtin_pr_str(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::String(render_joined(args, true, " ")))
}

fn builtin_prn(args: &[Value]) -> Result<Value, Error> {
    println!("{}", render_joined(args, true, " "));
    Ok(Value::Nil)
}

fn builtin_println(args: &[Value]) -> Result<Value, Error> {
    println!("{}", render_joined(args, false, " "));
    Ok(Value::Nil)
}

fn builtin_slurp(args: &[Value]) -> Result<Value, Error> {
    let path = one(args)?.as_string()?;
    std::fs::read_to_string(path)
        .map(Value::String)
        .map_err(|e| Error::IoError(format!("{path}: {e}")))
}

/// Input holding only whitespace and comments reads as nil
fn builtin_read_string(args: &[Value]) -> Result<Value, Error> {
    match parse_str(one(args)?.as_string()?) {
        Err(Error::ParseError(ParseError {
            kind: ParseErrorKind::NoForm,
            ..
        })) => Ok(Value::Nil),
        result => result,
    }
}

fn builtin_atom(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::atom(one(args)?.clone()))
}

fn expect_atom<'a>(value: &'a Value, op: &str) -> Result<&'a std::cell::RefCell<Value>, Error> {
    match value {
        Value::Atom(cell) => Ok(&**cell),
        other => Err(Error::TypeError(format!(
            "{op} expects an atom, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_deref(args: &[Value]) -> Result<Value, Error> {
    let cell = expect_atom(one(args)?, "deref")?;
    Ok(cell.borrow().clone())
}

fn builtin_reset(args: &[Value]) -> Result<Value, Error> {
    let (atom, value) = two(args)?;
    *expect_atom(atom, "reset!")?.borrow_mut() = value.clone();
    Ok(value.clone())
}

fn builtin_swap(args: &[Value]) -> Result<Value, Error> {
    let [atom, func, extra @ ..] = args else {
        return Err(Error::arity_error(Arity::AtLeast(2), args.len()));
    };
    let cell = expect_atom(atom, "swap!")?;

    // The cell is not borrowed while `func` runs, so it may read the atom
    let current = cell.borrow().clone();
    let mut call_args = Vec::with_capacity(extra.len() + 1);
    call_args.push(current);
    call_args.extend_from_slice(extra);

    let result = apply(func, call_args)?;
    *cell.borrow_mut() = result.clone();
    Ok(result)
}

/// Global registry of all built-in operations.
///
/// Initialized once via a `LazyLock`; special forms are looked up here by
/// the evaluator and functions are copied into each root environment.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn function(id: &'static str, func: BuiltinFn, arity: Arity) -> BuiltinOp {
        BuiltinOp {
            id,
            op_kind: OpKind::Function(func),
            arity,
        }
    }

    fn special_form(id: &'static str, form: SpecialFormFn, arity: Arity) -> BuiltinOp {
        BuiltinOp {
            id,
            op_kind: OpKind::SpecialForm(form),
            arity,
        }
    }

    use Arity::{AtLeast, Any, Exact, Range};

    vec![
        // Special forms
        special_form("def!", eval_def, Exact(2)),
        special_form("defmacro!", eval_defmacro, Exact(2)),
        special_form("let*", eval_let, AtLeast(1)),
        special_form("do", eval_do, Any),
        special_form("if", eval_if, Range(2, 3)),
        special_form("fn*", eval_fn, AtLeast(1)),
        special_form("quote", eval_quote, Exact(1)),
        special_form("quasiquote", eval_quasiquote, Exact(1)),
        special_form("quasiquoteexpand", eval_quasiquoteexpand, Exact(1)),
        special_form("macroexpand", eval_macroexpand, Exact(1)),
        // Arithmetic operations
        function("+", builtin_add, Any),
        function("-", builtin_sub, AtLeast(1)),
        function("*", builtin_mul, Any),
        function("/", builtin_div, AtLeast(1)),
        // Comparison operations
        function("=", builtin_equal, AtLeast(1)),
        function("<", builtin_lt, AtLeast(1)),
        function("<=", builtin_le, AtLeast(1)),
        function(">", builtin_gt, AtLeast(1)),
        function(">=", builtin_ge, AtLeast(1)),
        // Sequence operations
        function("list", builtin_list, Any),
        function("list?", builtin_is_list, Exact(1)),
        function("vector", builtin_vector, Any),
        function("vector?", builtin_is_vector, Exact(1)),
        function("sequential?", builtin_is_sequential, Exact(1)),
        function("empty?", builtin_is_empty, Exact(1)),
        function("count", builtin_count, Exact(1)),
        function("cons", builtin_cons, Exact(2)),
        function("concat", builtin_concat, Any),
        function("vec", builtin_vec, Exact(1)),
        function("first", builtin_first, Exact(1)),
        function("rest", builtin_rest, Exact(1)),
        function("nth", builtin_nth, Exact(2)),
        // Predicates
        function("nil?", builtin_is_nil, Exact(1)),
        function("true?", builtin_is_true, Exact(1)),
        function("false?", builtin_is_false, Exact(1)),
        function("symbol?", builtin_is_symbol, Exact(1)),
        function("string?", builtin_is_string, Exact(1)),
        function("number?", builtin_is_number, Exact(1)),
        function("fn?", builtin_is_fn, Exact(1)),
        function("macro?", builtin_is_macro, Exact(1)),
        function("not", builtin_not, Exact(1)),
        function("symbol", builtin_symbol, Exact(1)),
        // Strings and I/O
        function("str", builtin_str, Any),
        function("pr-str", builtin_pr_str, Any),
        function("prn", builtin_prn, Any),
        function("println", builtin_println, Any),
        function("slurp", builtin_slurp, Exact(1)),
        function("read-string", builtin_read_string, Exact(1)),
        // Atoms
        function("atom", builtin_atom, Exact(1)),
        function("atom?", builtin_is_atom, Exact(1)),
        function("deref", builtin_deref, Exact(1)),
        function("reset!", builtin_reset, Exact(2)),
        function("swap!", builtin_swap, AtLeast(2)),
    ]
});

/// Lazy static map from id to BuiltinOp (private - use find_builtin_op)
static BUILTIN_BY_ID: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.id, op)).collect()
});

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its identifier
pub(crate) fn find_builtin_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_ID.get(id).copied()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> Option<Value> {
        Some(val(value))
    }

    /// Invoke a builtin function through the registry, validating arity the
    /// same way a root environment binding does
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        let op = find_builtin_op(name).unwrap();
        op.validate_arity(args.len())?;
        match op.op_kind {
            OpKind::Function(func) => func(args),
            OpKind::SpecialForm(_) => {
                panic!("expected function builtin in tests, got special form: {name}")
            }
        }
    }

    #[test]
    fn test_builtin_ops_registry() {
        let add_op = find_builtin_op("+").unwrap();
        assert_eq!(add_op.arity, Arity::Any);
        assert!(matches!(add_op.op_kind, OpKind::Function(_)));
        assert_eq!(call_builtin("+", &[val(1), val(2)]).unwrap(), val(3));

        let if_op = find_builtin_op("if").unwrap();
        assert!(matches!(if_op.op_kind, OpKind::SpecialForm(_)));
        assert_eq!(if_op.arity, Arity::Range(2, 3));

        for form in [
            "def!", "defmacro!", "let*", "do", "if", "fn*", "quote", "quasiquote",
            "quasiquoteexpand", "macroexpand",
        ] {
            assert!(
                matches!(find_builtin_op(form).unwrap().op_kind, OpKind::SpecialForm(_)),
                "{form} should be a special form"
            );
        }

        // Every id is unique
        assert_eq!(BUILTIN_BY_ID.len(), get_builtin_ops().len());
        assert!(find_builtin_op("unknown").is_none());
        // eval is bound per root environment, not registered statically
        assert!(find_builtin_op("eval").is_none());
    }

    /// Macro to create test cases, invoking builtins via the registry.
    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Option<Value>);

        let int_list = val([1, 2, 3]);
        let int_vector = Value::vector(vec![val(1), val(2), val(3)]);
        let empty = Value::list(vec![]);
        let many_ones: Vec<Value> = (0..100).map(|_| val(1)).collect();
        let all_fives: Vec<Value> = (0..10).map(|_| val(5)).collect();
        let mut mostly_fives = all_fives.clone();
        mostly_fives.push(val(6));

        let test_cases: Vec<TestCase> = vec![
            // =================================================================
            // ARITHMETIC
            // =================================================================
            test!("+", &[], success(0)),
            test!("+", &[val(42)], success(42)),
            test!("+", &[val(1), val(2), val(3)], success(6)),
            test!("+", &many_ones, success(100)),
            test!("+", &[val(i64::MAX), val(1)], None),
            test!("+", &[val(1), val("2")], None),
            test!("-", &[val(10), val(3), val(2)], success(5)),
            test!("-", &[val(5)], success(-5)),
            test!("-", &[val(i64::MIN)], None),
            test!("-", &[val(i64::MIN), val(1)], None),
            test!("-", &[], None),
            test!("*", &[], success(1)),
            test!("*", &[val(2), val(3), val(4)], success(24)),
            test!("*", &[val(4_611_686_018_427_387_904_i64), val(2)], None),
            test!("/", &[val(20), val(2), val(5)], success(2)),
            test!("/", &[val(7), val(-2)], success(-3)),
            test!("/", &[val(1)], success(1)),
            test!("/", &[val(2)], success(0)),
            test!("/", &[val(1), val(0)], None),
            test!("/", &[val(0)], None),
            test!("/", &[val(i64::MIN), val(-1)], None),
            // =================================================================
            // COMPARISON
            // =================================================================
            test!("=", &[val(1)], success(true)),
            test!("=", &all_fives, success(true)),
            test!("=", &mostly_fives, success(false)),
            test!("=", &[int_list.clone(), int_vector.clone()], success(true)),
            test!("=", &[val("a"), sym("a")], success(false)),
            test!("=", &[nil(), empty.clone()], success(false)),
            test!("=", &[], None),
            test!("<", &[val(1), val(2), val(3)], success(true)),
            test!("<", &[val(1), val(1)], success(false)),
            test!("<=", &[val(1), val(1), val(2)], success(true)),
            test!(">", &[val(3), val(2), val(1)], success(true)),
            test!(">", &[val(3), val(4)], success(false)),
            test!(">=", &[val(3), val(3)], success(true)),
            test!("<", &[val(7)], success(true)),
            test!("<", &[val(1), val("2")], None),
            // =================================================================
            // SEQUENCES
            // =================================================================
            test!("list", &[], Some(empty.clone())),
            test!("list", &[val(1), val("a")], success(vec![val(1), val("a")])),
            test!("list?", &[int_list.clone()], success(true)),
            test!("list?", &[int_vector.clone()], success(false)),
            test!("vector", &[val(1), val(2), val(3)], Some(int_vector.clone())),
            test!("vector?", &[int_vector.clone()], success(true)),
            test!("vector?", &[int_list.clone()], success(false)),
            test!("sequential?", &[int_list.clone()], success(true)),
            test!("sequential?", &[int_vector.clone()], success(true)),
            test!("sequential?", &[val("abc")], success(false)),
            test!("empty?", &[empty.clone()], success(true)),
            test!("empty?", &[int_vector.clone()], success(false)),
            test!("empty?", &[nil()], success(true)),
            test!("empty?", &[val(1)], None),
            test!("count", &[int_list.clone()], success(3)),
            test!("count", &[nil()], success(0)),
            test!("count", &[val("abc")], None),
            test!("cons", &[val(0), int_vector.clone()], success([0, 1, 2, 3])),
            test!("cons", &[val(0), nil()], success([0])),
            test!("cons", &[val(0), val(1)], None),
            test!("concat", &[], Some(empty.clone())),
            test!("concat", &[int_list.clone(), nil(), int_vector.clone()], success([1, 2, 3, 1, 2, 3])),
            test!("concat", &[int_list.clone(), val(4)], None),
            test!("vec", &[int_list.clone()], Some(int_vector.clone())),
            test!("vec", &[nil()], Some(Value::vector(vec![]))),
            test!("first", &[int_vector.clone()], success(1)),
            test!("first", &[empty.clone()], success(nil())),
            test!("first", &[nil()], success(nil())),
            test!("rest", &[int_vector.clone()], success([2, 3])),
            test!("rest", &[nil()], Some(empty.clone())),
            test!("nth", &[int_list.clone(), val(0)], success(1)),
            test!("nth", &[int_list.clone(), val(3)], None),
            test!("nth", &[int_list.clone(), val(-1)], None),
            test!("nth", &[int_list.clone(), val("0")], None),
            // =================================================================
            // PREDICATES
            // =================================================================
            test!("nil?", &[nil()], success(true)),
            test!("nil?", &[val(false)], success(false)),
            test!("true?", &[val(true)], success(true)),
            test!("true?", &[val(1)], success(false)),
            test!("false?", &[val(false)], success(true)),
            test!("false?", &[nil()], success(false)),
            test!("symbol?", &[sym("a")], success(true)),
            test!("symbol?", &[val("a")], success(false)),
            test!("string?", &[val("a")], success(true)),
            test!("number?", &[val(1)], success(true)),
            test!("number?", &[val("1")], success(false)),
            test!("fn?", &[val(1)], success(false)),
            test!("macro?", &[val(1)], success(false)),
            test!("not", &[nil()], success(true)),
            test!("not", &[val(false)], success(true)),
            test!("not", &[val(0)], success(false)),
            test!("not", &[val("")], success(false)),
            test!("symbol", &[val("abc")], success(sym("abc"))),
            test!("symbol", &[val(1)], None),
            test!("not", &[], None),
            // =================================================================
            // STRINGS
            // =================================================================
            test!("str", &[], success("")),
            test!("str", &[val("a"), val(1), nil(), val("b\nc")], success("a1nilb\nc")),
            test!("str", &[int_list.clone()], success("(1 2 3)")),
            test!("pr-str", &[val("a\"b"), val(1)], success("\"a\\\"b\" 1")),
            test!("pr-str", &[], success("")),
            test!("read-string", &[val("(1 2 3)")], Some(int_list.clone())),
            test!("read-string", &[val("  ")], success(nil())),
            test!("read-string", &[val("(1 2")], None),
            test!("read-string", &[val(1)], None),
            test!("slurp", &[val("/nonexistent/malxp/path")], None),
            // =================================================================
            // ATOMS
            // =================================================================
            test!("atom?", &[Value::atom(val(1))], success(true)),
            test!("atom?", &[val(1)], success(false)),
            test!("deref", &[Value::atom(val("x"))], success("x")),
            test!("deref", &[val(1)], None),
            test!("reset!", &[Value::atom(val(1)), val(2)], success(2)),
            test!("reset!", &[val(1), val(2)], None),
            test!("swap!", &[Value::atom(val(1))], None),
        ];

        for (test_expr, result, expected) in test_cases {
            match (result, expected) {
                (Ok(actual), Some(expected_val)) => {
                    assert_eq!(actual, expected_val, "Failed for test case: {test_expr}");
                }
                (Err(_), None) => {} // Expected error
                (actual, expected) => panic!(
                    "Unexpected result for test case: {test_expr}\nGot: {actual:?}, Expected: {expected:?}"
                ),
            }
        }
    }

    #[test]
    fn test_atom_mutation_is_shared() {
        let atom = Value::atom(val(1));
        let alias = atom.clone();
        call_builtin("reset!", &[atom.clone(), val(10)]).unwrap();
        assert_eq!(call_builtin("deref", &[alias.clone()]).unwrap(), val(10));

        let add = Value::BuiltinFunction {
            id: "+".to_owned(),
            func: std::rc::Rc::new(|args: Vec<Value>| builtin_add(&args)),
        };
        assert_eq!(
            call_builtin("swap!", &[atom.clone(), add, val(5), val(1)]).unwrap(),
            val(16)
        );
        assert_eq!(call_builtin("deref", &[alias]).unwrap(), val(16));
        assert_eq!(crate::printer::render(&atom, true), "(atom 16)");
    }

    #[test]
    fn test_arity_validation() {
        use Arity::*;

        Exact(2).validate(2).unwrap();
        Exact(2).validate(1).unwrap_err();
        Exact(2).validate(3).unwrap_err();

        AtLeast(1).validate(1).unwrap();
        AtLeast(1).validate(2).unwrap();
        AtLeast(1).validate(0).unwrap_err();

        Range(2, 3).validate(2).unwrap();
        Range(2, 3).validate(3).unwrap();
        Range(2, 3).validate(1).unwrap_err();
        Range(2, 3).validate(4).unwrap_err();

        Any.validate(0).unwrap();
        Any.validate(100).unwrap();

        match Exact(2).validate(1).unwrap_err() {
            Error::ArityError { expected, got, .. } => {
                assert_eq!(expected, Exact(2));
                assert_eq!(got, 1);
            }
            _ => panic!("Expected ArityError"),
        }

        let rendered: Vec<String> = [Exact(2), AtLeast(1), Range(2, 3), Any]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(rendered, vec!["2", "at least 1", "2 to 3", "any number of"]);
    }
}
