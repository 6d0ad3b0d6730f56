//! Macro detection and expansion

use std::rc::Rc;

use tracing::debug;

use super::{Environment, eval};
use crate::Error;
use crate::ast::{Closure, Value};

/// The macro closure named by the head of `ast` together with the
/// unevaluated operands, if `ast` is a macro call
fn macro_call<'a>(ast: &'a Value, env: &Environment) -> Option<(String, Rc<Closure>, &'a [Value])> {
    let Value::List(items) = ast else {
        return None;
    };
    let (Value::Symbol(name), operands) = items.split_first()? else {
        return None;
    };

    match env.lookup(name)? {
        Value::Function(closure) if closure.is_macro => Some((name.clone(), closure, operands)),
        _ => None,
    }
}

/// True when `ast` is a non-empty list whose head symbol currently resolves
/// to a macro
pub fn is_macro_call(ast: &Value, env: &Environment) -> bool {
    macro_call(ast, env).is_some()
}

/// Expand `ast` one step if it is a macro call
pub(crate) fn expand_once(ast: &Value, env: &Environment) -> Result<Option<Value>, Error> {
    let Some((name, closure, operands)) = macro_call(ast, env) else {
        return Ok(None);
    };

    let macro_env = Environment::bind(&closure.env, &closure.params, operands.to_vec())?;
    let expansion = eval(&closure.body, &macro_env)?;
    debug!(%name, %expansion, "expanded macro call");
    Ok(Some(expansion))
}

/// Expand `ast` until its head is no longer a macro
pub fn macroexpand(ast: &Value, env: &Environment) -> Result<Value, Error> {
    let mut current = ast.clone();
    while let Some(expanded) = expand_once(&current, env)? {
        current = expanded;
    }
    Ok(current)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::evaluator::{create_global_env, eval_str};
    use crate::reader::parse_str;

    fn expand(source: &str, env: &Environment) -> String {
        format!("{}", macroexpand(&parse_str(source).unwrap(), env).unwrap())
    }

    #[test]
    fn test_macro_detection() {
        let env = create_global_env();
        eval_str("(defmacro! unless (fn* (p a b) `(if ~p ~b ~a)))", &env).unwrap();
        eval_str("(def! plain (fn* (x) x))", &env).unwrap();

        let cases = vec![
            ("(unless false 1 2)", true),
            ("(plain 1)", false),
            ("(undefined 1)", false),
            ("unless", false),
            ("()", false),
            ("(1 2)", false),
            ("[unless 1 2 3]", false),
        ];

        for (source, expected) in cases {
            let ast = parse_str(source).unwrap();
            assert_eq!(is_macro_call(&ast, &env), expected, "{source}");
        }
    }

    #[test]
    fn test_macroexpand_repeats_until_not_a_macro() {
        let env = create_global_env();
        eval_str("(defmacro! unless (fn* (p a b) `(if ~p ~b ~a)))", &env).unwrap();
        eval_str("(defmacro! unless2 (fn* (p a b) `(unless ~p ~a ~b)))", &env).unwrap();

        assert_eq!(expand("(unless x 7 8)", &env), "(if x 8 7)");
        assert_eq!(expand("(unless2 x 7 8)", &env), "(if x 8 7)");
        // Non-macro forms come back unchanged
        assert_eq!(expand("(+ 1 2)", &env), "(+ 1 2)");
        assert_eq!(expand("42", &env), "42");
    }

    #[test]
    fn test_macro_arguments_are_unevaluated() {
        let env = create_global_env();
        eval_str("(defmacro! first-form (fn* (& forms) `(quote ~(first forms))))", &env).unwrap();
        assert_eq!(
            eval_str("(first-form (undefined symbol) ignored)", &env).unwrap(),
            parse_str("(undefined symbol)").unwrap()
        );
    }
}
