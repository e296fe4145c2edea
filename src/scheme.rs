//! S-expression reader.
//!
//! [`read`] turns the start of a text buffer into a [`Datum`] and reports how many bytes
//! it consumed, so a caller can read several top-level data from one buffer in turn.
//! Failures are split into two kinds: [`ReadErrorKind::Incomplete`] when the buffer ends
//! before a datum closes (the REPL then asks for another line) and
//! [`ReadErrorKind::Malformed`] when no amount of extra input could help.

use nom::{
    IResult, Needed, Parser,
    branch::alt,
    bytes::complete::{tag, take_till, take_till1},
    character::complete::{char, multispace1},
    combinator::{recognize, value},
    error::ErrorKind,
};

use crate::ast::{Datum, NumberType};
use crate::evaluator::ensure_sufficient_stack;
use crate::{Error, MAX_PARSE_DEPTH, ReadError, ReadErrorKind};

type ReadResult<'a, T = Datum> = IResult<&'a str, T>;

/// Characters that end a bare token
fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';')
}

fn incomplete<'a, T>() -> ReadResult<'a, T> {
    Err(nom::Err::Incomplete(Needed::Unknown))
}

fn failure<T>(input: &str, kind: ErrorKind) -> ReadResult<'_, T> {
    Err(nom::Err::Failure(nom::error::Error::new(input, kind)))
}

/// Convert nom errors to reader errors with a context snippet
fn read_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> Error {
    match error {
        nom::Err::Incomplete(_) => Error::ReadError(ReadError::new(
            ReadErrorKind::Incomplete,
            "input ended before the datum was complete",
        )),
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            let message = match e.code {
                ErrorKind::Char => {
                    format!("found a ')' at position {position} prior to an associated '('")
                }
                ErrorKind::Verify => format!(
                    "misplaced '.' in the list at position {position}: \
                     it must appear once, right before the final element"
                ),
                ErrorKind::TooLarge => {
                    format!("expression too deeply nested (max depth: {MAX_PARSE_DEPTH})")
                }
                _ => format!("invalid syntax at position {position}"),
            };
            Error::ReadError(ReadError::with_context(
                ReadErrorKind::Malformed,
                message,
                input,
                position,
            ))
        }
    }
}

/// Parse a line comment, up to but not including the newline
fn parse_comment(input: &str) -> ReadResult<'_, &str> {
    recognize((char(';'), take_till(|c| c == '\n'))).parse(input)
}

/// Skip whitespace and comments. The flag is set when the input ends inside a comment.
fn skip_atmosphere(mut input: &str) -> (&str, bool) {
    let mut ended_in_comment = false;
    loop {
        let whitespace: ReadResult<'_, &str> = multispace1.parse(input);
        if let Ok((rest, _)) = whitespace {
            input = rest;
            ended_in_comment = false;
        } else if let Ok((rest, _)) = parse_comment(input) {
            input = rest;
            ended_in_comment = true;
        } else {
            return (input, ended_in_comment && input.is_empty());
        }
    }
}

/// Numeric literal: anything Rust parses as an `f64` that contains a digit,
/// plus the infinity and NaN spellings the printer produces
pub(crate) fn parse_number(token: &str) -> Option<NumberType> {
    match token {
        "+inf.0" => Some(NumberType::INFINITY),
        "-inf.0" => Some(NumberType::NEG_INFINITY),
        "+nan.0" | "-nan.0" => Some(NumberType::NAN),
        _ if token.bytes().any(|b| b.is_ascii_digit()) => token.parse().ok(),
        _ => None,
    }
}

/// Parse a bare token: boolean, number, or symbol, in that order
fn parse_atom(input: &str) -> ReadResult<'_> {
    let (rest, token) = take_till1(is_delimiter).parse(input)?;
    let datum = match token {
        "#t" | "#true" => Datum::Boolean(true),
        "#f" | "#false" => Datum::Boolean(false),
        _ => parse_number(token).map_or_else(|| Datum::symbol(token), Datum::Number),
    };
    Ok((rest, datum))
}

/// Parse a string literal
fn parse_string(input: &str) -> ReadResult<'_> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), Datum::Text(text))),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('0') => text.push('\0'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    // Unknown escapes are kept as written
                    Some(other) => {
                        text.push('\\');
                        text.push(other);
                    }
                    None => return incomplete(),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                text.push(ch);
                remaining = char_iter.as_str();
            }
            None => return incomplete(),
        }
    }
}

/// Parse a quote shorthand: 'x, `x, ,x and ,@x
fn parse_abbreviation(input: &str, depth: usize) -> ReadResult<'_> {
    let (input, keyword) = alt((
        value("quote", char('\'')),
        value("quasiquote", char('`')),
        value("unquote-splicing", tag(",@")),
        value("unquote", char(',')),
    ))
    .parse(input)?;
    let (input, datum) = parse_datum(input, depth + 1)?;
    Ok((input, Datum::list([Datum::symbol(keyword), datum])))
}

enum ListItem {
    Datum(Datum),
    Dot,
}

/// Build the list once all items are known. A dot is only valid once,
/// after at least one element and right before the final one.
fn assemble_list(items: Vec<ListItem>) -> Option<Datum> {
    let dots: Vec<usize> = items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| matches!(item, ListItem::Dot).then_some(i))
        .collect();
    let count = items.len();
    let mut data = items.into_iter().filter_map(|item| match item {
        ListItem::Datum(datum) => Some(datum),
        ListItem::Dot => None,
    });

    match dots.as_slice() {
        [] => Some(Datum::list(data.collect::<Vec<_>>())),
        [dot] if *dot >= 1 && dot + 2 == count => {
            let head: Vec<Datum> = data.by_ref().take(*dot).collect();
            let tail = data.next()?;
            Some(Datum::list_with_tail(head, tail))
        }
        _ => None,
    }
}

/// Parse a list, including dotted lists
fn parse_list(input: &str, depth: usize) -> ReadResult<'_> {
    let start = input;
    let (mut input, _) = char('(').parse(input)?;
    let mut items = Vec::new();

    loop {
        let (rest, _) = skip_atmosphere(input);
        if rest.is_empty() {
            return incomplete();
        }
        if let Some(after) = rest.strip_prefix(')') {
            input = after;
            break;
        }
        let token: ReadResult<'_, &str> = take_till1(is_delimiter).parse(rest);
        if let Ok((after, ".")) = token {
            items.push(ListItem::Dot);
            input = after;
            continue;
        }
        let (after, datum) = parse_datum(rest, depth + 1)?;
        items.push(ListItem::Datum(datum));
        input = after;
    }

    match assemble_list(items) {
        Some(list) => Ok((input, list)),
        None => failure(start, ErrorKind::Verify),
    }
}

/// Parse one datum after optional whitespace and comments
fn parse_datum(input: &str, depth: usize) -> ReadResult<'_> {
    if depth >= MAX_PARSE_DEPTH {
        return failure(input, ErrorKind::TooLarge);
    }
    let (input, _) = skip_atmosphere(input);
    ensure_sufficient_stack(|| match input.chars().next() {
        None => incomplete(),
        Some('(') => parse_list(input, depth),
        Some(')') => failure(input, ErrorKind::Char),
        Some('"') => parse_string(input),
        Some('\'' | '`' | ',') => parse_abbreviation(input, depth),
        Some(_) => parse_atom(input),
    })
}

/// Read one datum from the start of `input`.
///
/// Returns the datum and the number of bytes consumed. Input holding only a comment
/// that runs to the end yields [`Datum::Void`]; input holding nothing but whitespace
/// is incomplete.
pub fn read(input: &str) -> Result<(Datum, usize), Error> {
    let (rest, ended_in_comment) = skip_atmosphere(input);
    if rest.is_empty() {
        if ended_in_comment {
            return Ok((Datum::Void, input.len()));
        }
        return Err(Error::incomplete("nothing to read yet"));
    }

    match parse_datum(rest, 0) {
        Ok((remaining, datum)) => Ok((datum, input.len() - remaining.len())),
        Err(e) => Err(read_error(input, e)),
    }
}

/// Read every top-level datum in `input`
pub fn read_all(input: &str) -> Result<Vec<Datum>, Error> {
    let mut data = Vec::new();
    let mut rest = input;
    loop {
        let (next, _) = skip_atmosphere(rest);
        if next.is_empty() {
            return Ok(data);
        }
        let (datum, consumed) = read(next)?;
        data.push(datum);
        rest = &next[consumed..];
    }
}

/// Read a whole program. Several forms are wrapped in `(begin ...)`,
/// a single form is returned as is, and blank input yields Void.
pub fn read_program(input: &str) -> Result<Datum, Error> {
    let mut forms = read_all(input)?;
    if forms.len() == 1
        && let Some(form) = forms.pop()
    {
        return Ok(form);
    }
    if forms.is_empty() {
        return Ok(Datum::Void);
    }
    Ok(Datum::cons(Datum::symbol("begin"), Datum::list(forms)))
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};
    use proptest::prelude::*;

    /// Test result variants for data-driven reader tests
    #[derive(Debug)]
    enum ReadTestResult {
        Success(Datum),             // Reading should succeed with this datum
        Incomplete,                 // Reading should ask for more input
        SpecificError(&'static str), // Reading should fail as malformed with this text
    }
    use ReadTestResult::*;

    fn success<T: Into<Datum>>(value: T) -> ReadTestResult {
        Success(value.into())
    }

    fn quoted(keyword: &str, datum: Datum) -> Datum {
        val(vec![sym(keyword), datum])
    }

    fn run_read_tests(test_cases: Vec<(&str, ReadTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Read test #{} ({input:?})", i + 1);
            match (read(input), expected) {
                (Ok((actual, _)), Success(expected_val)) => {
                    assert_eq!(actual, *expected_val, "{test_id}: value mismatch");

                    // Round trip: write -> read -> write should be identical
                    let written = actual.write();
                    let (reread, _) = read(&written).unwrap_or_else(|e| {
                        panic!("{test_id}: round-trip read failed for '{written}': {e:?}")
                    });
                    assert_eq!(written, reread.write(), "{test_id}: round-trip mismatch");
                }
                (Err(err), Incomplete) => {
                    assert!(err.is_incomplete(), "{test_id}: expected Incomplete, got {err:?}");
                }
                (Err(err), SpecificError(text)) => {
                    assert!(!err.is_incomplete(), "{test_id}: expected Malformed, got {err:?}");
                    let message = format!("{err}");
                    assert!(
                        message.contains(text),
                        "{test_id}: error '{message}' should contain '{text}'"
                    );
                }
                (Ok((actual, _)), other) => {
                    panic!("{test_id}: expected {other:?}, got {actual:?}");
                }
                (Err(err), Success(_)) => {
                    panic!("{test_id}: expected success, got error {err:?}");
                }
            }
        }
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_reader_comprehensive() {
        let test_cases = vec![
            // ===== NUMBERS =====
            ("42", success(42)),
            ("-5", success(-5)),
            ("3.25", success(3.25)),
            (".5", success(0.5)),
            ("+7", success(7)),
            ("1e3", success(1000)),
            ("-2.5e-3", success(-0.0025)),
            ("+inf.0", success(f64::INFINITY)),
            ("-inf.0", success(f64::NEG_INFINITY)),
            // ===== BOOLEANS =====
            ("#t", success(true)),
            ("#f", success(false)),
            ("#true", success(true)),
            ("#false", success(false)),
            // ===== STRINGS =====
            ("\"hello\"", success("hello")),
            ("\"\"", success("")),
            ("\"a\\nb\\tc\"", success("a\nb\tc")),
            ("\"say \\\"hi\\\"\"", success("say \"hi\"")),
            ("\"back\\\\slash\"", success("back\\slash")),
            ("\"semi ; colon (paren)\"", success("semi ; colon (paren)")),
            ("\"\\q\"", success("\\q")),
            // ===== SYMBOLS =====
            ("foo", success(sym("foo"))),
            ("+", success(sym("+"))),
            ("-", success(sym("-"))),
            ("...", success(sym("..."))),
            ("set-car!", success(sym("set-car!"))),
            ("1+", success(sym("1+"))),
            ("a.b", success(sym("a.b"))),
            ("inf", success(sym("inf"))),
            ("nan", success(sym("nan"))),
            ("#tx", success(sym("#tx"))),
            ("x'y", success(sym("x'y"))),
            // ===== LISTS =====
            ("()", success(nil())),
            ("( )", success(nil())),
            ("(1 2 3)", success([1, 2, 3])),
            ("(a (b c) d)", success(val(vec![sym("a"), val(vec![sym("b"), sym("c")]), sym("d")]))),
            ("(1 . 2)", success(Datum::cons(val(1), val(2)))),
            (
                "(1 2 . 3)",
                success(Datum::list_with_tail(vec![val(1), val(2)], val(3))),
            ),
            ("(1 . (2 3))", success([1, 2, 3])),
            ("(1 ; comment\n 2)", success([1, 2])),
            ("(\"a\"\"b\")", success(["a", "b"])),
            ("(a(b)c)", success(val(vec![sym("a"), val(vec![sym("b")]), sym("c")]))),
            // ===== QUOTE SHORTHANDS =====
            ("'x", success(quoted("quote", sym("x")))),
            ("'(1 2)", success(quoted("quote", val([1, 2])))),
            ("`x", success(quoted("quasiquote", sym("x")))),
            (",x", success(quoted("unquote", sym("x")))),
            (",@x", success(quoted("unquote-splicing", sym("x")))),
            (
                "`(a ,b ,@c)",
                success(quoted(
                    "quasiquote",
                    val(vec![
                        sym("a"),
                        quoted("unquote", sym("b")),
                        quoted("unquote-splicing", sym("c")),
                    ]),
                )),
            ),
            ("''a", success(quoted("quote", quoted("quote", sym("a"))))),
            // ===== COMMENTS AND WHITESPACE =====
            ("   42   ", success(42)),
            ("; leading comment\n42", success(42)),
            ("; just a comment", Success(Datum::Void)),
            // ===== INCOMPLETE INPUT =====
            ("", Incomplete),
            ("   \n\t", Incomplete),
            ("; comment then newline\n", Incomplete),
            ("(1 2", Incomplete),
            ("(1 (2 3)", Incomplete),
            ("\"abc", Incomplete),
            ("\"abc\\", Incomplete),
            ("'", Incomplete),
            ("(1 . ", Incomplete),
            ("(define (f x) ; open\n", Incomplete),
            // ===== MALFORMED INPUT =====
            (")", SpecificError("prior to an associated '('")),
            ("  ) 1", SpecificError("prior to an associated '('")),
            ("(. 1)", SpecificError("misplaced '.'")),
            ("(1 .)", SpecificError("misplaced '.'")),
            ("(1 . 2 3)", SpecificError("misplaced '.'")),
            ("(1 . . 2)", SpecificError("misplaced '.'")),
            ("(.)", SpecificError("misplaced '.'")),
            ("'(1 . 2 3)", SpecificError("misplaced '.'")),
        ];

        run_read_tests(test_cases);
    }

    #[test]
    fn test_consumed_offsets() {
        let test_cases = vec![
            ("1 2", 1),
            ("(a) b", 3),
            ("  x y", 3),
            ("\"é\" x", 4),
            ("'(1 2) rest", 6),
            ("; c\n foo bar", 8),
        ];
        for (input, expected) in test_cases {
            let (_, consumed) = read(input).unwrap();
            assert_eq!(consumed, expected, "offset for {input:?}");
        }
    }

    #[test]
    fn test_sequential_reading() {
        let data = read_all("1 (2 3) \"four\" ; note\n five").unwrap();
        assert_eq!(data, vec![val(1), val([2, 3]), val("four"), sym("five")]);

        assert_eq!(read_all("  ; nothing\n").unwrap(), vec![]);
        assert!(read_all("(ok) (broken").unwrap_err().is_incomplete());

        // A prefix is incomplete until the rest arrives
        let mut buffer = String::from("(define (f x)");
        assert!(read(&buffer).unwrap_err().is_incomplete());
        buffer.push_str("\n  (* x x))");
        let (datum, consumed) = read(&buffer).unwrap();
        assert_eq!(consumed, buffer.len());
        assert_eq!(datum.write(), "(define (f x) (* x x))");
    }

    #[test]
    fn test_read_program() {
        assert_eq!(read_program("42").unwrap(), val(42));
        assert_eq!(read_program("  ").unwrap(), Datum::Void);
        assert_eq!(read_program("1 2").unwrap().write(), "(begin 1 2)");
    }

    #[test]
    fn test_nan_literal() {
        let (datum, _) = read("+nan.0").unwrap();
        assert!(matches!(datum, Datum::Number(n) if n.is_nan()));
        assert_eq!(datum.write(), "+nan.0");
    }

    #[test]
    fn test_reader_depth_limits() {
        let nested_ok = format!("{}{}", "(".repeat(100), ")".repeat(100));
        assert!(read(&nested_ok).is_ok());

        let too_deep = format!(
            "{}{}",
            "(".repeat(MAX_PARSE_DEPTH + 5),
            ")".repeat(MAX_PARSE_DEPTH + 5)
        );
        let err = read(&too_deep).unwrap_err();
        assert!(!err.is_incomplete());
        assert!(format!("{err}").contains("too deeply nested"));
    }

    fn atom_strategy() -> impl Strategy<Value = Datum> {
        prop_oneof![
            any::<f64>()
                .prop_filter("NaN never equals itself", |n| !n.is_nan())
                .prop_map(Datum::Number),
            any::<bool>().prop_map(Datum::Boolean),
            "[ -~\n\t\u{e9}\u{3bb}]{0,24}".prop_map(Datum::Text),
            "[a-z!$%&*/:<=>?^_~][a-z0-9!$%&*/:<=>?^_~+.-]{0,10}".prop_map(Datum::Symbol),
        ]
    }

    proptest! {
        #[test]
        fn prop_atoms_round_trip(atom in atom_strategy()) {
            let written = atom.write();
            let (reread, consumed) = read(&written).unwrap();
            prop_assert_eq!(consumed, written.len());
            prop_assert!(reread.is_equal(&atom), "{} read back as {:?}", written, reread);
        }
    }
}
