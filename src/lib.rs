//! malxp - a minimal make-a-lisp interpreter
//!
//! This crate implements a small Lisp in the "make-a-lisp" family: a reader,
//! an evaluator with lexical closures and true tail calls, mutable atoms, and
//! unhygienic macros with quasiquote.
//!
//! ```lisp
//! (def! sum (fn* (n acc) (if (= n 0) acc (sum (- n 1) (+ acc n)))))
//! (sum 100000 0)                      ; tail calls run in constant stack
//! (defmacro! unless (fn* (p a b) `(if ~p ~b ~a)))
//! (unless false 7 8)                  ; => 7
//! (def! counter (atom 0))
//! (swap! counter + 1)                 ; => 1
//! ```
//!
//! ## Evaluation model
//!
//! The evaluator is a trampolined loop over an (expression, environment)
//! pair. Forms in tail position (`if` branches, the last form of `do`, `let*`
//! bodies, the result of `quasiquote` and closure bodies) replace the loop
//! state instead of recursing, so tail-recursive programs never grow the
//! native stack. Everything else - operands, binding values, predicates -
//! recurses and is bounded by [`MAX_EVAL_DEPTH`]. The native stack grows on
//! demand while recursing, so the bound holds on threads of any stack size.
//!
//! ## Modules
//!
//! - `ast`: the [`ast::Value`] model and its sequence helpers
//! - `reader`: text to `Value` using `nom`
//! - `printer`: `Value` to text, readable and display modes
//! - `evaluator`: environments, quasiquote, macros and the evaluation loop
//! - `builtinops`: the primitive function library seeded into the root environment

use std::fmt;

use crate::builtinops::Arity;

/// Maximum reader nesting depth for lists, vectors, maps and reader macros
pub const MAX_PARSE_DEPTH: usize = 256;

/// Maximum number of nested (non-tail) evaluations before evaluation fails.
/// Tail calls do not count against this limit.
pub const MAX_EVAL_DEPTH: usize = 4096;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (stray closers, bad escapes, odd map literals)
    InvalidSyntax,
    /// Input ended before the form was complete (unbalanced delimiters or strings)
    Incomplete,
    /// Form nesting exceeded [`MAX_PARSE_DEPTH`]
    TooDeeplyNested,
    /// Extra input found after a complete form
    TrailingContent,
    /// Input held only whitespace and comments
    NoForm,
    /// Valid syntax that is intentionally not supported (metadata `^`)
    Unsupported,
    /// Implementation-imposed limit exceeded (integer literal out of range)
    ImplementationLimit,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from input at a given byte offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let prefix = input.get(..error_offset).unwrap_or(input);
        let skipped = prefix.chars().count().saturating_sub(20);

        let context_str: String = input.chars().skip(skipped).take(MAX_CONTEXT).collect();

        let mut display_context = String::new();
        if skipped > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if skipped + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        let found = input
            .get(error_offset..)
            .and_then(|rest| rest.chars().next())
            .map(|c| c.to_string());

        Self::new(kind, message, Some(display_context), found)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

/// Error types for the interpreter
///
/// Every failure aborts the current top-level evaluation; the REPL is the
/// only place that recovers from one.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("ParseError: {0}")]
    ParseError(ParseError),
    #[error("'{0}' not found")]
    SymbolNotFound(String),
    #[error("NotCallable: cannot apply {0}")]
    NotCallable(String),
    #[error("EvaluationError: {0}")]
    EvalError(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("{}", format_arity_error(.expected, .got, .expression))]
    ArityError {
        expected: Arity,
        got: usize,
        expression: Option<String>,
    },
    #[error("IndexOutOfRange: index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("IoError: {0}")]
    IoError(String),
    /// Reserved for a future `throw`/`try*` extension; never produced today.
    #[error("UserRaised: {0}")]
    UserRaised(String),
}

fn format_arity_error(expected: &Arity, got: &usize, expression: &Option<String>) -> String {
    match expression {
        Some(expr) => {
            format!("ArityError: {expr}: expected {expected} arguments, got {got}")
        }
        None => format!("ArityError: function expected {expected} arguments but got {got}"),
    }
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: Arity, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError naming the offending form
    pub fn arity_error_with_expr(expected: Arity, got: usize, expression: impl Into<String>) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression.into()),
        }
    }
}

impl From<ParseError> for Error {
    fn from(error: ParseError) -> Self {
        Error::ParseError(error)
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod printer;
pub mod reader;
