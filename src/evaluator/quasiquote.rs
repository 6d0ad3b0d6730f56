//! Quasiquote expansion: rewrites a quasiquoted template into ordinary
//! `cons`/`concat`/`quote` calls that build the same structure at run time.

use crate::ast::{Value, sym};

/// If `value` is the two-element form `(head x)`, return `x`
fn form_argument<'a>(value: &'a Value, head: &str) -> Option<&'a Value> {
    match value {
        Value::List(items) => match items.as_slice() {
            [Value::Symbol(name), argument] if name == head => Some(argument),
            _ => None,
        },
        _ => None,
    }
}

/// Expand the template of a `quasiquote` form.
///
/// - `(unquote x)` becomes `x`
/// - a list becomes a right fold of `(cons elt acc)` over its elements,
///   except that `(splice-unquote x)` elements become `(concat x acc)`
/// - a symbol becomes `(quote symbol)`
/// - everything else, vectors and maps included, is returned unchanged
pub fn quasiquote(ast: &Value) -> Value {
    match ast {
        Value::List(items) => {
            if let Some(unquoted) = form_argument(ast, "unquote") {
                return unquoted.clone();
            }

            items.iter().rev().fold(Value::list(vec![]), |acc, element| {
                match form_argument(element, "splice-unquote") {
                    Some(spliced) => Value::list(vec![sym("concat"), spliced.clone(), acc]),
                    None => Value::list(vec![sym("cons"), quasiquote(element), acc]),
                }
            })
        }
        Value::Symbol(_) => Value::list(vec![sym("quote"), ast.clone()]),
        _ => ast.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::parse_str;

    #[test]
    fn test_quasiquote_data_driven() {
        // (template, expected expansion)
        let test_cases = vec![
            ("1", "1"),
            ("\"s\"", "\"s\""),
            ("nil", "nil"),
            ("x", "(quote x)"),
            ("()", "()"),
            ("(unquote x)", "x"),
            ("(1 2)", "(cons 1 (cons 2 ()))"),
            ("(a (unquote b))", "(cons (quote a) (cons b ()))"),
            ("(1 (splice-unquote xs) 4)", "(cons 1 (concat xs (cons 4 ())))"),
            (
                "((unquote a) (b (splice-unquote c)))",
                "(cons a (cons (cons (quote b) (concat c ())) ()))",
            ),
            ("[1 (unquote x)]", "[1 (unquote x)]"),
            ("{\"k\" x}", "{\"k\" x}"),
            // Malformed unquote forms are ordinary lists
            ("(unquote)", "(cons (quote unquote) ())"),
        ];

        for (i, (template, expected)) in test_cases.iter().enumerate() {
            let ast = parse_str(template)
                .unwrap_or_else(|e| panic!("case #{}: parse failed: {e}", i + 1));
            assert_eq!(
                format!("{}", quasiquote(&ast)),
                *expected,
                "case #{} ({template})",
                i + 1
            );
        }
    }
}
