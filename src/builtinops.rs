//! Built-in procedure registry.
//!
//! Every primitive is described once by a [`BuiltinOp`]: its name, its arity, and its
//! implementation. [`register_builtins`] binds the whole table into an environment
//! through [`Environment::register_builtin_function`], the same boundary embedders use
//! for their own host functions.
//!
//! ```scheme
//! (+ 1 2 3)                      ; numeric: variadic arithmetic and chained comparison
//! (map (lambda (x) (* x x)) '(1 2 3))
//! (string-split "a,b,,c" ",")    ; strings: regex-based splitting and replacement
//! (display "hi") (newline)       ; system: output goes to the interpreter's sink
//! ```
//!
//! ## Error Handling
//!
//! Arity is checked before an operation runs. Operations validate their own operand
//! types through [`Args`], and every failure is a `TypeError` naming the primitive and
//! profiling the offending values, e.g.
//! `'car 1st arg 5 of type "number" isn't a pair`.
//!
//! ## Adding New Operations
//!
//! 1. Implement the function as `fn(Args) -> Result<Datum, Error>`, or take the
//!    interpreter as well if it calls procedures, evaluates, or writes output
//! 2. Add it to the `OPS` table of the matching submodule with its arity
//! 3. Add tests covering edge cases and error conditions

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{Datum, NumberType, PairRef};
use crate::evaluator::{Arity, Environment, Interpreter, Procedure};

mod lists;
mod numeric;
mod strings;
mod system;

/// Implementation of a built-in operation
#[derive(Clone, Copy)]
pub enum OpKind {
    /// Depends only on its arguments
    Pure(fn(Args) -> Result<Datum, Error>),
    /// Calls back into the interpreter: applies procedures, evaluates, or writes output
    Contextual(fn(&mut Interpreter, &Environment, Args) -> Result<Datum, Error>),
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Pure(_) => write!(f, "Pure(<fn>)"),
            OpKind::Contextual(_) => write!(f, "Contextual(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone, Copy)]
pub struct BuiltinOp {
    /// The identifier the operation is bound to
    pub scheme_id: &'static str,
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl BuiltinOp {
    pub(crate) const fn pure(
        scheme_id: &'static str,
        arity: Arity,
        func: fn(Args) -> Result<Datum, Error>,
    ) -> Self {
        BuiltinOp {
            scheme_id,
            op_kind: OpKind::Pure(func),
            arity,
        }
    }

    pub(crate) const fn contextual(
        scheme_id: &'static str,
        arity: Arity,
        func: fn(&mut Interpreter, &Environment, Args) -> Result<Datum, Error>,
    ) -> Self {
        BuiltinOp {
            scheme_id,
            op_kind: OpKind::Contextual(func),
            arity,
        }
    }

    /// Check the argument count, then run the operation
    pub fn call(
        &self,
        interp: &mut Interpreter,
        env: &Environment,
        values: Vec<Datum>,
    ) -> Result<Datum, Error> {
        let args = Args::new(self.scheme_id, values);
        if !self.arity.accepts(args.len()) {
            return Err(args.error(format_args!(
                "expects {} argument(s), got {}",
                self.arity,
                args.len()
            )));
        }
        match self.op_kind {
            OpKind::Pure(func) => func(args),
            OpKind::Contextual(func) => func(interp, env, args),
        }
    }
}

/// Evaluated arguments of a primitive call, with validating accessors
#[derive(Debug)]
pub struct Args {
    name: &'static str,
    values: Vec<Datum>,
}

fn ordinal(index: usize) -> String {
    let n = index + 1;
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

impl Args {
    pub(crate) fn new(name: &'static str, values: Vec<Datum>) -> Self {
        Args { name, values }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Datum] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Datum> {
        self.values
    }

    /// Profile of every argument, for error messages
    fn profile(&self) -> String {
        if self.values.is_empty() {
            return "no arguments".to_owned();
        }
        self.values
            .iter()
            .map(Datum::profile)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// A failure of the call as a whole, with all arguments profiled
    pub fn error(&self, problem: impl fmt::Display) -> Error {
        Error::TypeError(format!("'{} {problem}: {}", self.name, self.profile()))
    }

    /// A failure caused by one argument
    pub fn arg_error(&self, index: usize, expected: &str) -> Error {
        match self.values.get(index) {
            Some(value) => Error::TypeError(format!(
                "'{} {} arg {} isn't {expected}",
                self.name,
                ordinal(index),
                value.profile()
            )),
            None => self.error(format_args!("is missing its {} arg", ordinal(index))),
        }
    }

    pub fn get(&self, index: usize) -> Result<&Datum, Error> {
        self.values
            .get(index)
            .ok_or_else(|| self.error(format_args!("is missing its {} arg", ordinal(index))))
    }

    pub fn number(&self, index: usize) -> Result<NumberType, Error> {
        match self.get(index)? {
            Datum::Number(n) => Ok(*n),
            _ => Err(self.arg_error(index, "a number")),
        }
    }

    pub fn integer(&self, index: usize) -> Result<i64, Error> {
        match self.get(index)? {
            Datum::Number(n) if n.is_finite() && n.fract() == 0.0 => Ok(*n as i64),
            _ => Err(self.arg_error(index, "an integer")),
        }
    }

    /// A non-negative integer
    pub fn index(&self, index: usize) -> Result<usize, Error> {
        match self.get(index)? {
            Datum::Number(n) if n.is_finite() && n.fract() == 0.0 && *n >= 0.0 => Ok(*n as usize),
            _ => Err(self.arg_error(index, "a non-negative integer")),
        }
    }

    pub fn text(&self, index: usize) -> Result<&str, Error> {
        match self.get(index)? {
            Datum::Text(s) => Ok(s),
            _ => Err(self.arg_error(index, "a string")),
        }
    }

    pub fn symbol(&self, index: usize) -> Result<&str, Error> {
        match self.get(index)? {
            Datum::Symbol(s) => Ok(s),
            _ => Err(self.arg_error(index, "a symbol")),
        }
    }

    pub fn pair(&self, index: usize) -> Result<&PairRef, Error> {
        match self.get(index)? {
            Datum::Pair(pair) => Ok(pair),
            _ => Err(self.arg_error(index, "a pair")),
        }
    }

    pub fn procedure(&self, index: usize) -> Result<Rc<Procedure>, Error> {
        match self.get(index)? {
            Datum::Procedure(procedure) => Ok(Rc::clone(procedure)),
            _ => Err(self.arg_error(index, "a procedure")),
        }
    }

    /// Elements of a proper list
    pub fn list(&self, index: usize) -> Result<Vec<Datum>, Error> {
        self.get(index)?
            .to_vec()
            .ok_or_else(|| self.arg_error(index, "a list"))
    }

    pub fn numbers(&self) -> Result<Vec<NumberType>, Error> {
        (0..self.len()).map(|i| self.number(i)).collect()
    }

    pub fn texts(&self) -> Result<Vec<&str>, Error> {
        (0..self.len()).map(|i| self.text(i)).collect()
    }
}

/// Every built-in operation, in registration order
static BUILTIN_OPS: LazyLock<Vec<&'static BuiltinOp>> = LazyLock::new(|| {
    [numeric::OPS, lists::OPS, strings::OPS, system::OPS]
        .into_iter()
        .flatten()
        .collect()
});

/// Lazy static map from scheme_id to BuiltinOp
static BUILTIN_SCHEME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| BUILTIN_OPS.iter().map(|op| (op.scheme_id, *op)).collect());

pub fn builtin_ops() -> &'static [&'static BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its identifier
pub fn find_builtin_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_SCHEME.get(id).copied()
}

/// Bind every built-in operation in `env`
pub fn register_builtins(env: &Environment) {
    for op in builtin_ops() {
        let op: &'static BuiltinOp = op;
        env.register_builtin_function(op.scheme_id, move |interp, env, values| {
            op.call(interp, env, values)
        });
    }
}

/// Apply a procedure from inside a primitive
pub(crate) fn apply(
    interp: &mut Interpreter,
    env: &Environment,
    procedure: &Procedure,
    args: Vec<Datum>,
) -> Result<Datum, Error> {
    procedure.invoke(interp, env, args)
}
