//! Arithmetic, comparison, rounding and transcendental functions over `f64`.

use super::{Args, BuiltinOp};
use crate::Error;
use crate::ast::{Datum, NumberType};
use crate::evaluator::Arity;

fn builtin_add(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Number(args.numbers()?.into_iter().sum()))
}

fn builtin_mul(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Number(args.numbers()?.into_iter().product()))
}

/// Unary `-` negates; otherwise subtract the rest from the first
fn builtin_sub(args: Args) -> Result<Datum, Error> {
    let numbers = args.numbers()?;
    let result = match numbers.as_slice() {
        [single] => -single,
        [first, rest @ ..] => rest.iter().fold(*first, |acc, n| acc - n),
        [] => return Err(args.error("expects at least 1 argument")),
    };
    Ok(Datum::Number(result))
}

/// Unary `/` takes the reciprocal; otherwise divide the first by the rest
fn builtin_div(args: Args) -> Result<Datum, Error> {
    let numbers = args.numbers()?;
    let result = match numbers.as_slice() {
        [single] => 1.0 / single,
        [first, rest @ ..] => rest.iter().fold(*first, |acc, n| acc / n),
        [] => return Err(args.error("expects at least 1 argument")),
    };
    Ok(Datum::Number(result))
}

// Chained comparisons: every adjacent pair must satisfy the operator
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(args: Args) -> Result<Datum, Error> {
            let numbers = args.numbers()?;
            Ok(Datum::Boolean(numbers.windows(2).all(|w| w[0] $op w[1])))
        }
    };
}

numeric_comparison!(builtin_eq, ==);
numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

// One-argument functions that map a number to a number
macro_rules! unary_math {
    ($name:ident, $func:expr) => {
        fn $name(args: Args) -> Result<Datum, Error> {
            let f: fn(NumberType) -> NumberType = $func;
            Ok(Datum::Number(f(args.number(0)?)))
        }
    };
}

unary_math!(builtin_exp, NumberType::exp);
unary_math!(builtin_log, NumberType::ln);
unary_math!(builtin_sqrt, NumberType::sqrt);
unary_math!(builtin_abs, NumberType::abs);
unary_math!(builtin_floor, NumberType::floor);
unary_math!(builtin_ceiling, NumberType::ceil);
unary_math!(builtin_truncate, NumberType::trunc);
// Halves round up, toward positive infinity
unary_math!(builtin_round, |n| (n + 0.5).floor());
unary_math!(builtin_sin, NumberType::sin);
unary_math!(builtin_cos, NumberType::cos);
unary_math!(builtin_tan, NumberType::tan);
unary_math!(builtin_asin, NumberType::asin);
unary_math!(builtin_acos, NumberType::acos);
unary_math!(builtin_sinh, NumberType::sinh);
unary_math!(builtin_cosh, NumberType::cosh);
unary_math!(builtin_tanh, NumberType::tanh);
unary_math!(builtin_asinh, NumberType::asinh);
unary_math!(builtin_acosh, NumberType::acosh);
unary_math!(builtin_atanh, NumberType::atanh);

/// `(atan y)` or `(atan y x)`
fn builtin_atan(args: Args) -> Result<Datum, Error> {
    let y = args.number(0)?;
    let result = if args.len() == 2 {
        y.atan2(args.number(1)?)
    } else {
        y.atan()
    };
    Ok(Datum::Number(result))
}

fn builtin_expt(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Number(args.number(0)?.powf(args.number(1)?)))
}

fn builtin_max(args: Args) -> Result<Datum, Error> {
    let numbers = args.numbers()?;
    Ok(Datum::Number(
        numbers.into_iter().fold(NumberType::NEG_INFINITY, NumberType::max),
    ))
}

fn builtin_min(args: Args) -> Result<Datum, Error> {
    let numbers = args.numbers()?;
    Ok(Datum::Number(
        numbers.into_iter().fold(NumberType::INFINITY, NumberType::min),
    ))
}

/// Truncating division operands, rejecting a zero divisor
fn division_operands(args: &Args) -> Result<(NumberType, NumberType), Error> {
    let (dividend, divisor) = (args.number(0)?, args.number(1)?);
    if divisor == 0.0 {
        return Err(args.error("can't divide by zero"));
    }
    Ok((dividend, divisor))
}

fn builtin_quotient(args: Args) -> Result<Datum, Error> {
    let (dividend, divisor) = division_operands(&args)?;
    Ok(Datum::Number((dividend / divisor).trunc()))
}

/// Sign follows the dividend
fn builtin_remainder(args: Args) -> Result<Datum, Error> {
    let (dividend, divisor) = division_operands(&args)?;
    Ok(Datum::Number(dividend % divisor))
}

// Predicates over a single number argument
macro_rules! number_predicate {
    ($name:ident, $test:expr) => {
        fn $name(args: Args) -> Result<Datum, Error> {
            let test: fn(NumberType) -> bool = $test;
            Ok(Datum::Boolean(test(args.number(0)?)))
        }
    };
}

number_predicate!(builtin_is_finite, NumberType::is_finite);
number_predicate!(builtin_is_infinite, NumberType::is_infinite);
number_predicate!(builtin_is_nan, NumberType::is_nan);
number_predicate!(builtin_is_positive, |n| n > 0.0);
number_predicate!(builtin_is_negative, |n| n < 0.0);
number_predicate!(builtin_is_zero, |n| n == 0.0);

fn builtin_is_number(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Boolean(matches!(args.get(0)?, Datum::Number(_))))
}

fn builtin_is_integer(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Boolean(matches!(
        args.get(0)?,
        Datum::Number(n) if n.is_finite() && n.fract() == 0.0
    )))
}

fn builtin_is_odd(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Boolean(args.integer(0)? % 2 != 0))
}

fn builtin_is_even(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Boolean(args.integer(0)? % 2 == 0))
}

pub(super) static OPS: &[BuiltinOp] = &[
    // Arithmetic
    BuiltinOp::pure("+", Arity::AtLeast(1), builtin_add),
    BuiltinOp::pure("-", Arity::AtLeast(1), builtin_sub),
    BuiltinOp::pure("*", Arity::AtLeast(1), builtin_mul),
    BuiltinOp::pure("/", Arity::AtLeast(1), builtin_div),
    BuiltinOp::pure("expt", Arity::Exact(2), builtin_expt),
    BuiltinOp::pure("exp", Arity::Exact(1), builtin_exp),
    BuiltinOp::pure("log", Arity::Exact(1), builtin_log),
    BuiltinOp::pure("sqrt", Arity::Exact(1), builtin_sqrt),
    BuiltinOp::pure("abs", Arity::Exact(1), builtin_abs),
    BuiltinOp::pure("max", Arity::AtLeast(1), builtin_max),
    BuiltinOp::pure("min", Arity::AtLeast(1), builtin_min),
    BuiltinOp::pure("quotient", Arity::Exact(2), builtin_quotient),
    BuiltinOp::pure("remainder", Arity::Exact(2), builtin_remainder),
    // Comparison
    BuiltinOp::pure("=", Arity::AtLeast(2), builtin_eq),
    BuiltinOp::pure("<", Arity::AtLeast(2), builtin_lt),
    BuiltinOp::pure(">", Arity::AtLeast(2), builtin_gt),
    BuiltinOp::pure("<=", Arity::AtLeast(2), builtin_le),
    BuiltinOp::pure(">=", Arity::AtLeast(2), builtin_ge),
    // Rounding
    BuiltinOp::pure("round", Arity::Exact(1), builtin_round),
    BuiltinOp::pure("floor", Arity::Exact(1), builtin_floor),
    BuiltinOp::pure("ceiling", Arity::Exact(1), builtin_ceiling),
    BuiltinOp::pure("truncate", Arity::Exact(1), builtin_truncate),
    // Predicates
    BuiltinOp::pure("number?", Arity::Exact(1), builtin_is_number),
    BuiltinOp::pure("integer?", Arity::Exact(1), builtin_is_integer),
    BuiltinOp::pure("finite?", Arity::Exact(1), builtin_is_finite),
    BuiltinOp::pure("infinite?", Arity::Exact(1), builtin_is_infinite),
    BuiltinOp::pure("nan?", Arity::Exact(1), builtin_is_nan),
    BuiltinOp::pure("odd?", Arity::Exact(1), builtin_is_odd),
    BuiltinOp::pure("even?", Arity::Exact(1), builtin_is_even),
    BuiltinOp::pure("positive?", Arity::Exact(1), builtin_is_positive),
    BuiltinOp::pure("negative?", Arity::Exact(1), builtin_is_negative),
    BuiltinOp::pure("zero?", Arity::Exact(1), builtin_is_zero),
    // Trigonometry
    BuiltinOp::pure("sin", Arity::Exact(1), builtin_sin),
    BuiltinOp::pure("cos", Arity::Exact(1), builtin_cos),
    BuiltinOp::pure("tan", Arity::Exact(1), builtin_tan),
    BuiltinOp::pure("asin", Arity::Exact(1), builtin_asin),
    BuiltinOp::pure("acos", Arity::Exact(1), builtin_acos),
    BuiltinOp::pure("atan", Arity::Range(1, 2), builtin_atan),
    BuiltinOp::pure("sinh", Arity::Exact(1), builtin_sinh),
    BuiltinOp::pure("cosh", Arity::Exact(1), builtin_cosh),
    BuiltinOp::pure("tanh", Arity::Exact(1), builtin_tanh),
    BuiltinOp::pure("asinh", Arity::Exact(1), builtin_asinh),
    BuiltinOp::pure("acosh", Arity::Exact(1), builtin_acosh),
    BuiltinOp::pure("atanh", Arity::Exact(1), builtin_atanh),
];
