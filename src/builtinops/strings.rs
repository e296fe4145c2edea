//! Strings, symbols and textual coercions.
//!
//! Indices and lengths count characters, not bytes. `string-replace` and
//! `string-split` take regular-expression patterns.

use std::borrow::Cow;
use std::cmp::Ordering;

use regex::Regex;

use super::{Args, BuiltinOp};
use crate::Error;
use crate::ast::{Datum, format_number};
use crate::evaluator::Arity;
use crate::scheme::parse_number;

fn builtin_is_string(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Boolean(matches!(args.get(0)?, Datum::Text(_))))
}

fn builtin_string_to_number(args: Args) -> Result<Datum, Error> {
    Ok(parse_number(args.text(0)?.trim()).map_or(Datum::Boolean(false), Datum::Number))
}

fn builtin_number_to_string(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Text(format_number(args.number(0)?)))
}

fn builtin_write_to_string(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Text(args.get(0)?.write()))
}

fn builtin_display_to_string(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Text(args.get(0)?.display()))
}

fn builtin_symbol_append(args: Args) -> Result<Datum, Error> {
    let name = (0..args.len())
        .map(|i| args.symbol(i))
        .collect::<Result<String, _>>()?;
    Ok(Datum::Symbol(name))
}

fn builtin_string_length(args: Args) -> Result<Datum, Error> {
    Ok(Datum::from(args.text(0)?.chars().count()))
}

fn builtin_is_string_empty(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Boolean(args.text(0)?.is_empty()))
}

fn builtin_string_reverse(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Text(args.text(0)?.chars().rev().collect()))
}

fn builtin_string_append(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Text(args.texts()?.concat()))
}

/// `(string-ref string index)` as a one-character string
fn builtin_string_ref(args: Args) -> Result<Datum, Error> {
    let text = args.text(0)?;
    let index = args.index(1)?;
    text.chars()
        .nth(index)
        .map(|c| Datum::Text(c.to_string()))
        .ok_or_else(|| args.error(format_args!("index {index} is out of bounds")))
}

/// `(substring string start [length])`, clamped to the end of the string
fn builtin_substring(args: Args) -> Result<Datum, Error> {
    let text = args.text(0)?;
    let start = args.index(1)?;
    let length = if args.len() == 3 {
        args.index(2)?
    } else {
        usize::MAX
    };
    Ok(Datum::Text(text.chars().skip(start).take(length).collect()))
}

fn builtin_string_upcase(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Text(args.text(0)?.to_uppercase()))
}

fn builtin_string_downcase(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Text(args.text(0)?.to_lowercase()))
}

fn builtin_string_trim(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Text(args.text(0)?.trim().to_owned()))
}

fn compile_pattern(args: &Args, index: usize) -> Result<Regex, Error> {
    let pattern = args.text(index)?;
    Regex::new(pattern).map_err(|e| {
        args.arg_error(index, &format!("a valid regular expression ({e})"))
    })
}

/// `(string-replace string pattern replacement)`; `$1` in the replacement names a group
fn builtin_string_replace(args: Args) -> Result<Datum, Error> {
    let text = args.text(0)?;
    let pattern = compile_pattern(&args, 1)?;
    let replacement = args.text(2)?;
    Ok(Datum::Text(pattern.replace_all(text, replacement).into_owned()))
}

/// Character index of a byte offset into `text`
fn char_index(text: &str, byte_offset: usize) -> usize {
    text[..byte_offset].chars().count()
}

fn builtin_string_contains(args: Args) -> Result<Datum, Error> {
    let text = args.text(0)?;
    let needle = args.text(1)?;
    Ok(text
        .find(needle)
        .map_or(Datum::Boolean(false), |at| Datum::from(char_index(text, at))))
}

fn builtin_string_contains_right(args: Args) -> Result<Datum, Error> {
    let text = args.text(0)?;
    let needle = args.text(1)?;
    Ok(text
        .rfind(needle)
        .map_or(Datum::Boolean(false), |at| Datum::from(char_index(text, at))))
}

/// `(string-join strings [separator])`
fn builtin_string_join(args: Args) -> Result<Datum, Error> {
    let items = args.list(0)?;
    let separator = if args.len() == 2 { args.text(1)? } else { "" };
    let texts = items
        .iter()
        .map(|item| match item {
            Datum::Text(s) => Ok(s.as_str()),
            _ => Err(args.arg_error(0, "a list of strings")),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Datum::Text(texts.join(separator)))
}

/// `(string-split string [pattern])`; without a pattern, or with an empty one, the
/// string splits into characters. Trailing empty fields are dropped.
fn builtin_string_split(args: Args) -> Result<Datum, Error> {
    let text = args.text(0)?;
    let separator = if args.len() == 2 { args.text(1)? } else { "" };
    let mut fields: Vec<String> = if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        compile_pattern(&args, 1)?
            .split(text)
            .map(str::to_owned)
            .collect()
    };
    while fields.last().is_some_and(String::is_empty) {
        fields.pop();
    }
    Ok(Datum::list(fields.into_iter().map(Datum::Text).collect::<Vec<_>>()))
}

/// Chain a comparison across every adjacent pair of string arguments
fn compare_texts(args: &Args, fold_case: bool, holds: fn(Ordering) -> bool) -> Result<Datum, Error> {
    let keys = args
        .texts()?
        .into_iter()
        .map(|text| {
            if fold_case {
                Cow::Owned(text.to_lowercase())
            } else {
                Cow::Borrowed(text)
            }
        })
        .collect::<Vec<_>>();
    Ok(Datum::Boolean(
        keys.windows(2).all(|pair| holds(pair[0].cmp(&pair[1]))),
    ))
}

macro_rules! string_comparison {
    ($name:ident, $fold_case:expr, $holds:path) => {
        fn $name(args: Args) -> Result<Datum, Error> {
            compare_texts(&args, $fold_case, $holds)
        }
    };
}

string_comparison!(builtin_string_eq, false, Ordering::is_eq);
string_comparison!(builtin_string_lt, false, Ordering::is_lt);
string_comparison!(builtin_string_gt, false, Ordering::is_gt);
string_comparison!(builtin_string_le, false, Ordering::is_le);
string_comparison!(builtin_string_ge, false, Ordering::is_ge);
string_comparison!(builtin_string_ci_eq, true, Ordering::is_eq);
string_comparison!(builtin_string_ci_lt, true, Ordering::is_lt);
string_comparison!(builtin_string_ci_gt, true, Ordering::is_gt);
string_comparison!(builtin_string_ci_le, true, Ordering::is_le);
string_comparison!(builtin_string_ci_ge, true, Ordering::is_ge);

pub(super) static OPS: &[BuiltinOp] = &[
    // Coercion
    BuiltinOp::pure("string?", Arity::Exact(1), builtin_is_string),
    BuiltinOp::pure("string->number", Arity::Exact(1), builtin_string_to_number),
    BuiltinOp::pure("number->string", Arity::Exact(1), builtin_number_to_string),
    BuiltinOp::pure("write-to-string", Arity::Exact(1), builtin_write_to_string),
    BuiltinOp::pure("display-to-string", Arity::Exact(1), builtin_display_to_string),
    BuiltinOp::pure("symbol-append", Arity::AtLeast(1), builtin_symbol_append),
    // Strings
    BuiltinOp::pure("string-length", Arity::Exact(1), builtin_string_length),
    BuiltinOp::pure("string-empty?", Arity::Exact(1), builtin_is_string_empty),
    BuiltinOp::pure("string-reverse", Arity::Exact(1), builtin_string_reverse),
    BuiltinOp::pure("string-append", Arity::AtLeast(0), builtin_string_append),
    BuiltinOp::pure("string-ref", Arity::Exact(2), builtin_string_ref),
    BuiltinOp::pure("substring", Arity::Range(2, 3), builtin_substring),
    BuiltinOp::pure("string-upcase", Arity::Exact(1), builtin_string_upcase),
    BuiltinOp::pure("string-downcase", Arity::Exact(1), builtin_string_downcase),
    BuiltinOp::pure("string-replace", Arity::Exact(3), builtin_string_replace),
    BuiltinOp::pure("string-trim", Arity::Exact(1), builtin_string_trim),
    BuiltinOp::pure("string-contains", Arity::Exact(2), builtin_string_contains),
    BuiltinOp::pure(
        "string-contains-right",
        Arity::Exact(2),
        builtin_string_contains_right,
    ),
    BuiltinOp::pure("string-join", Arity::Range(1, 2), builtin_string_join),
    BuiltinOp::pure("string-split", Arity::Range(1, 2), builtin_string_split),
    // Comparison
    BuiltinOp::pure("string=?", Arity::AtLeast(2), builtin_string_eq),
    BuiltinOp::pure("string<?", Arity::AtLeast(2), builtin_string_lt),
    BuiltinOp::pure("string>?", Arity::AtLeast(2), builtin_string_gt),
    BuiltinOp::pure("string<=?", Arity::AtLeast(2), builtin_string_le),
    BuiltinOp::pure("string>=?", Arity::AtLeast(2), builtin_string_ge),
    BuiltinOp::pure("string-ci=?", Arity::AtLeast(2), builtin_string_ci_eq),
    BuiltinOp::pure("string-ci<?", Arity::AtLeast(2), builtin_string_ci_lt),
    BuiltinOp::pure("string-ci>?", Arity::AtLeast(2), builtin_string_ci_gt),
    BuiltinOp::pure("string-ci<=?", Arity::AtLeast(2), builtin_string_ci_le),
    BuiltinOp::pure("string-ci>=?", Arity::AtLeast(2), builtin_string_ci_ge),
];
