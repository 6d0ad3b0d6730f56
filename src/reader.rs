use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till, take_while1},
    character::complete::char,
    combinator::{recognize, value},
    error::ErrorKind,
    multi::many0,
    sequence::pair,
};

use crate::ast::{NumberType, Value, sym};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Characters that end a bare token
const TOKEN_DELIMITERS: &str = "[]{}()'\"`,;";

fn fail<T>(input: &str, kind: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Failure(nom::error::Error::new(input, kind)))
}

/// Convert nom parsing errors to structured parse errors
fn convert_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> Error {
    let (position, code) = match &error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            (input.len().saturating_sub(e.input.len()), Some(e.code))
        }
        nom::Err::Incomplete(_) => (input.len(), None),
    };

    let (kind, message) = match code {
        Some(ErrorKind::Eof) | None => (
            ParseErrorKind::Incomplete,
            "unbalanced: unexpected end of input".to_owned(),
        ),
        Some(ErrorKind::Char) => (
            ParseErrorKind::Incomplete,
            "unbalanced string: missing closing '\"'".to_owned(),
        ),
        Some(ErrorKind::Escaped) => (
            ParseErrorKind::InvalidSyntax,
            format!("Unknown escape sequence in string at position {position}"),
        ),
        Some(ErrorKind::Tag) => (
            ParseErrorKind::InvalidSyntax,
            format!("Unexpected closing delimiter at position {position}"),
        ),
        Some(ErrorKind::Count) => (
            ParseErrorKind::InvalidSyntax,
            "Map literal requires an even number of forms".to_owned(),
        ),
        Some(ErrorKind::TooLarge) => (
            ParseErrorKind::TooDeeplyNested,
            format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
        ),
        Some(ErrorKind::Digit) => (
            ParseErrorKind::ImplementationLimit,
            format!("Integer literal out of range at position {position}"),
        ),
        Some(ErrorKind::Not) => (
            ParseErrorKind::Unsupported,
            "Metadata reader macro '^' is not supported".to_owned(),
        ),
        Some(_) => (
            ParseErrorKind::InvalidSyntax,
            format!("Invalid syntax at position {position}"),
        ),
    };

    ParseError::with_context(kind, message, input, position).into()
}

/// Skip whitespace, commas and `;` comments (which run to the end of the line)
fn skip_separators(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            take_while1(|c: char| c.is_whitespace() || c == ','),
            recognize(pair(char(';'), take_till(|c: char| c == '\n'))),
        ))),
    )
    .parse(input)
}

fn is_token_char(c: char) -> bool {
    !c.is_whitespace() && !TOKEN_DELIMITERS.contains(c)
}

fn is_integer_token(token: &str) -> bool {
    let digits = token.strip_prefix('-').unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a bare token: integer, `true`, `false`, `nil` or symbol
fn parse_atom(input: &str) -> IResult<&str, Value> {
    let (remaining, token) = take_while1(is_token_char).parse(input)?;

    let atom = match token {
        "nil" => Value::Nil,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ if is_integer_token(token) => match token.parse::<NumberType>() {
            Ok(n) => Value::Number(n),
            Err(_) => return fail(input, ErrorKind::Digit),
        },
        _ => Value::Symbol(token.to_owned()),
    };

    Ok((remaining, atom))
}

/// Parse a string literal
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), Value::String(text))),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => text.push('\n'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some(_) => return fail(remaining, ErrorKind::Escaped),
                    // Backslash at end of input
                    None => return fail(input, ErrorKind::Char),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                text.push(ch);
                remaining = char_iter.as_str();
            }
            None => return fail(input, ErrorKind::Char),
        }
    }
}

/// Parse the elements of a delimited sequence up to its closing character
fn parse_seq(input: &str, open: char, close: char, depth: usize) -> IResult<&str, Vec<Value>> {
    let (mut input, _) = char(open).parse(input)?;
    let mut items = Vec::new();

    loop {
        let (rest, _) = skip_separators(input)?;
        match rest.chars().next() {
            None => return fail(rest, ErrorKind::Eof),
            Some(c) if c == close => {
                let (rest, _) = char(close).parse(rest)?;
                return Ok((rest, items));
            }
            Some(_) => {
                let (rest, item) = parse_form(rest, depth + 1)?;
                items.push(item);
                input = rest;
            }
        }
    }
}

/// Parse `'x`, `` `x ``, `~x`, `~@x` and `@x` into their long forms
fn parse_reader_macro<'a>(input: &'a str, name: &str, depth: usize) -> IResult<&'a str, Value> {
    let (rest, form) = parse_form(input, depth + 1)?;
    Ok((rest, Value::list(vec![sym(name), form])))
}

fn parse_form(input: &str, depth: usize) -> IResult<&str, Value> {
    if depth >= MAX_PARSE_DEPTH {
        return fail(input, ErrorKind::TooLarge);
    }

    let (input, _) = skip_separators(input)?;
    let mut chars = input.chars();
    let Some(first) = chars.next() else {
        return fail(input, ErrorKind::Eof);
    };
    let after_first = chars.as_str();

    match first {
        '(' => {
            let (rest, items) = parse_seq(input, '(', ')', depth)?;
            Ok((rest, Value::list(items)))
        }
        '[' => {
            let (rest, items) = parse_seq(input, '[', ']', depth)?;
            Ok((rest, Value::vector(items)))
        }
        '{' => {
            let (rest, items) = parse_seq(input, '{', '}', depth)?;
            if items.len() % 2 != 0 {
                return fail(input, ErrorKind::Count);
            }
            Ok((rest, Value::map(items)))
        }
        ')' | ']' | '}' => fail(input, ErrorKind::Tag),
        '\'' => parse_reader_macro(after_first, "quote", depth),
        '`' => parse_reader_macro(after_first, "quasiquote", depth),
        '~' => match input.strip_prefix("~@") {
            Some(rest) => parse_reader_macro(rest, "splice-unquote", depth),
            None => parse_reader_macro(after_first, "unquote", depth),
        },
        '@' => parse_reader_macro(after_first, "deref", depth),
        '^' => fail(input, ErrorKind::Not),
        '"' => parse_string(input),
        _ => parse_atom(input),
    }
}

/// Parse the first form of `input`, returning it with the unread remainder
fn parse_leading_form(input: &str) -> Result<(&str, Value), Error> {
    let (rest, _) = skip_separators(input).map_err(|e| convert_error(input, e))?;
    if rest.is_empty() {
        return Err(ParseError::from_message(ParseErrorKind::NoForm, "No form to read").into());
    }

    parse_form(rest, 0).map_err(|e| convert_error(input, e))
}

/// Parse the first form from input and ignore whatever follows it.
///
/// This is how an interactive line is read: `1 2` reads as `1`.
pub fn read_first(input: &str) -> Result<Value, Error> {
    parse_leading_form(input).map(|(_, form)| form)
}

/// Parse exactly one form from input.
///
/// Input holding only whitespace and comments fails with
/// [`ParseErrorKind::NoForm`], which a REPL can treat as "nothing to do".
pub fn parse_str(input: &str) -> Result<Value, Error> {
    let (rest, form) = parse_leading_form(input)?;
    let (rest, _) = skip_separators(rest).map_err(|e| convert_error(input, e))?;

    if !rest.is_empty() {
        return Err(ParseError::with_context(
            ParseErrorKind::TrailingContent,
            format!("Unexpected remaining input: '{}'", rest.trim_end()),
            input,
            input.len() - rest.len(),
        )
        .into());
    }

    Ok(form)
}
