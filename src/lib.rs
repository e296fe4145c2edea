//! TreeLisp - a small tree-walking Lisp
//!
//! This crate provides a reader that turns source text into [`ast::Datum`] trees and an
//! evaluator that runs those trees against lexically scoped environments. The language
//! has closures, mutable (and possibly cyclic) pairs, and a non-hygienic macro system on
//! top of which `quasiquote`, `and`, `or`, `cond`, `let` and `delay` are written in
//! the language itself.
//!
//! ```scheme
//! (define (square x) (* x x))          ; procedure definition sugar
//! (map square '(1 2 3))                ; => (1 4 9)
//! (define-macro (unless form)          ; macros receive the unevaluated call form
//!   (list 'if (cadr form) #f (caddr form)))
//! `(1 ,(+ 1 1) ,@(list 3 4))           ; => (1 2 3 4)
//! ```
//!
//! ## Embedding
//!
//! ```
//! use treelisp::evaluator::Interpreter;
//!
//! let mut interp = Interpreter::new();
//! let result = interp.eval_str("(let ((x 20)) (+ x 22))").unwrap();
//! assert_eq!(result.to_string(), "42");
//! ```
//!
//! ## Modules
//!
//! - `ast`: the `Datum` value model, equality and serialization
//! - `scheme`: S-expression reader with incomplete-input detection
//! - `evaluator`: interpreter context, environments, procedures and special forms
//! - `builtinops`: the primitive procedure library

use std::fmt;

use crate::evaluator::Arity;

/// Maximum list nesting accepted by the reader
pub const MAX_PARSE_DEPTH: usize = 1024;

/// Default bound on nested `eval` activations.
/// Every activation runs on a stack that grows on demand, so exceeding this
/// limit is reported as an error instead of overflowing the native stack.
pub const MAX_EVAL_DEPTH: usize = 10_000;

/// Categorizes the ways reading can fail.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ReadErrorKind {
    /// Input ended before a datum was complete (unclosed list or string, or nothing read yet).
    /// A caller holding more input should append it and read again.
    Incomplete,
    /// Input can never form a datum (unmatched ')', misplaced '.', nesting too deep)
    Malformed,
}

/// A structured error describing a reader failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ReadError {
    pub kind: ReadErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 60 chars)
    pub context: Option<String>,
}

impl ReadError {
    pub fn new(kind: ReadErrorKind, message: impl Into<String>) -> Self {
        ReadError {
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// Create a ReadError with context extracted from input at a given byte offset
    pub fn with_context(
        kind: ReadErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 60;

        let error_offset = error_offset.min(input.len());
        let mut context_start = error_offset.saturating_sub(20);
        while !input.is_char_boundary(context_start) {
            context_start -= 1;
        }

        let context_str: String = input[context_start..].chars().take(MAX_CONTEXT).collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.len() < input.len() {
            display_context.push_str("[...]");
        }

        // Keep the snippet on one line
        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        ReadError {
            kind,
            message: message.into(),
            context: Some(display_context),
        }
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ReadError(ReadError),
    /// Malformed special form, with the printed form
    SyntaxError(String),
    UnboundVariable(String),
    /// Bad operand types or counts passed to a primitive, with the operands profiled
    TypeError(String),
    /// Compound procedure called with the wrong number of arguments
    ArityError {
        procedure: String,
        expected: Arity,
        got: usize,
    },
    /// Attempt to call something that is neither a procedure nor a macro
    ApplicationError(String),
    EvalError(String),
    /// Raised by `exit`; drivers terminate the process with this code
    Exit(i32),
}

impl Error {
    pub(crate) fn incomplete(message: impl Into<String>) -> Self {
        Error::ReadError(ReadError::new(ReadErrorKind::Incomplete, message))
    }

    /// True when more input could complete the datum being read
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            Error::ReadError(ReadError {
                kind: ReadErrorKind::Incomplete,
                ..
            })
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ReadError(e) => {
                let label = match e.kind {
                    ReadErrorKind::Incomplete => "Incomplete input",
                    ReadErrorKind::Malformed => "ReadError",
                };
                write!(f, "{label}: {}", e.message)?;
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::SyntaxError(msg) => write!(f, "SyntaxError: {msg}"),
            Error::UnboundVariable(var) => write!(f, "Unbound variable: {var}"),
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
            Error::ArityError {
                procedure,
                expected,
                got,
            } => write!(
                f,
                "ArityError: procedure {procedure} expected {expected} argument(s), got {got}"
            ),
            Error::ApplicationError(msg) => write!(f, "ApplicationError: {msg}"),
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
            Error::Exit(code) => write!(f, "exit requested with code {code}"),
        }
    }
}

impl std::error::Error for Error {}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod scheme;
