//! The evaluator: an [`Interpreter`] context that owns the global environment,
//! the diagnostic call stack and the output sink, and evaluates [`Datum`] trees.
//!
//! Seven forms are handled natively (see [`SpecialForm`]); everything else is an
//! application of a procedure or a macro. The remaining derived forms (`and`, `or`,
//! `cond`, `let`, `delay`, `quasiquote`) are macros from the bundled prelude.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::rc::Rc;

use tracing::debug;

use crate::ast::Datum;
use crate::builtinops::register_builtins;
use crate::scheme::{read_all, read_program};
use crate::{Error, MAX_EVAL_DEPTH};

mod environment;
mod procedure;

pub use environment::Environment;
pub use procedure::{ANONYMOUS, Arity, Compound, Macro, PrimitiveFn, Procedure, ProcedureKind};

/// Macros written in the language itself, evaluated into every new interpreter
const PRELUDE: &str = include_str!("prelude.scm");

const RED_ZONE: usize = 100 * 1024;
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, first growing the stack if less than `RED_ZONE` remains
#[inline]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// Interpreter construction options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterConfig {
    /// Bound on nested `eval` activations before an `EvalError` is raised
    pub max_eval_depth: usize,
    /// Evaluate the bundled prelude macros at startup
    pub load_prelude: bool,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_eval_depth: MAX_EVAL_DEPTH,
            load_prelude: true,
        }
    }
}

/// The reserved forms the evaluator handles itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    DefineMacro,
    Define,
    Set,
    If,
    Lambda,
    Begin,
    Quote,
}

impl SpecialForm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "define-macro" => Some(SpecialForm::DefineMacro),
            "define" => Some(SpecialForm::Define),
            "set!" => Some(SpecialForm::Set),
            "if" => Some(SpecialForm::If),
            "lambda" => Some(SpecialForm::Lambda),
            "begin" => Some(SpecialForm::Begin),
            "quote" => Some(SpecialForm::Quote),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            SpecialForm::DefineMacro => "define-macro",
            SpecialForm::Define => "define",
            SpecialForm::Set => "set!",
            SpecialForm::If => "if",
            SpecialForm::Lambda => "lambda",
            SpecialForm::Begin => "begin",
            SpecialForm::Quote => "quote",
        }
    }
}

fn syntax_error(form: SpecialForm, expr: &Datum) -> Error {
    Error::SyntaxError(format!("Invalid '{} syntax: {}", form.keyword(), expr.write()))
}

/// Wrap a multi-expression body in `(begin ...)`
fn sequence(body: &[Datum]) -> Datum {
    match body {
        [single] => single.clone(),
        _ => Datum::cons(Datum::symbol("begin"), Datum::list(body.to_vec())),
    }
}

/// Parse a lambda parameter spec: a proper list, a dotted list, or a bare symbol
fn parse_parameters(params: &Datum, expr: &Datum) -> Result<(Vec<String>, bool), Error> {
    let Some((items, tail)) = params.spine() else {
        return Err(syntax_error(SpecialForm::Lambda, expr));
    };
    let variadic = !tail.is_nil();

    let mut names: Vec<String> = Vec::with_capacity(items.len() + 1);
    for param in items.iter().chain(variadic.then_some(&tail)) {
        let Datum::Symbol(name) = param else {
            return Err(Error::SyntaxError(format!(
                "Lambda parameters must be symbols: {}",
                expr.write()
            )));
        };
        if names.contains(name) {
            return Err(Error::SyntaxError(format!(
                "Duplicate parameter name {name} in {}",
                expr.write()
            )));
        }
        names.push(name.clone());
    }
    Ok((names, variadic))
}

pub struct Interpreter {
    global: Environment,
    call_stack: Vec<String>,
    depth: usize,
    config: InterpreterConfig,
    output: Box<dyn Write>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// An interpreter with the primitive library and the prelude loaded, writing to stdout
    #[expect(clippy::expect_used)] // the bundled prelude is part of the crate
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default()).expect("bundled prelude must evaluate")
    }

    pub fn with_config(config: InterpreterConfig) -> Result<Self, Error> {
        let global = Environment::new();
        register_builtins(&global);

        let mut interp = Interpreter {
            global,
            call_stack: Vec::new(),
            depth: 0,
            config,
            output: Box::new(io::stdout()),
        };
        if config.load_prelude {
            interp.load_prelude()?;
        }
        Ok(interp)
    }

    /// Redirect `display`, `write` and `newline`
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    fn load_prelude(&mut self) -> Result<(), Error> {
        let forms = read_all(PRELUDE)?;
        let global = self.global.clone();
        for form in &forms {
            self.eval(&global, form)?;
        }
        debug!(forms = forms.len(), "prelude loaded");
        Ok(())
    }

    pub fn global(&self) -> &Environment {
        &self.global
    }

    pub fn config(&self) -> InterpreterConfig {
        self.config
    }

    pub fn output(&mut self) -> &mut dyn Write {
        &mut *self.output
    }

    /// Names of the procedures active when the last error was raised, outermost first
    pub fn call_stack(&self) -> &[String] {
        &self.call_stack
    }

    pub fn reset_call_stack(&mut self) {
        self.call_stack.clear();
        self.depth = 0;
    }

    pub(crate) fn push_frame(&mut self, name: String) {
        self.call_stack.push(name);
    }

    pub(crate) fn pop_frame(&mut self) {
        self.call_stack.pop();
    }

    /// Register a host function in the global environment
    pub fn register_builtin_function<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut Interpreter, &Environment, Vec<Datum>) -> Result<Datum, Error> + 'static,
    {
        self.global.register_builtin_function(name, func);
    }

    /// Read every form in `text` and evaluate them in order in the global environment
    pub fn eval_str(&mut self, text: &str) -> Result<Datum, Error> {
        let program = read_program(text)?;
        let global = self.global.clone();
        self.eval(&global, &program)
    }

    /// Evaluate a source file in `env` and return the value of its last form
    pub fn load_file(&mut self, path: impl AsRef<Path>, env: &Environment) -> Result<Datum, Error> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading file");
        let source = fs::read_to_string(path)
            .map_err(|e| Error::EvalError(format!("can't read file {}: {e}", path.display())))?;
        let program = read_program(&source)?;
        self.eval(env, &program)
    }

    /// Evaluate `expr` in `env`
    pub fn eval(&mut self, env: &Environment, expr: &Datum) -> Result<Datum, Error> {
        if self.depth >= self.config.max_eval_depth {
            return Err(Error::EvalError(format!(
                "Evaluation depth limit exceeded (max: {})",
                self.config.max_eval_depth
            )));
        }
        self.depth += 1;
        let result = ensure_sufficient_stack(|| self.eval_inner(env, expr));
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, env: &Environment, expr: &Datum) -> Result<Datum, Error> {
        match expr {
            Datum::Symbol(name) => env.get(name),
            Datum::Pair(pair) => {
                let head = pair.car();
                if let Datum::Symbol(name) = &head
                    && let Some(form) = SpecialForm::from_name(name)
                {
                    let Some(args) = pair.cdr().to_vec() else {
                        return Err(syntax_error(form, expr));
                    };
                    return self.eval_special_form(form, env, expr, &args);
                }
                self.eval_application(env, expr, &head, &pair.cdr())
            }
            // Everything else evaluates to itself
            _ => Ok(expr.clone()),
        }
    }

    fn eval_special_form(
        &mut self,
        form: SpecialForm,
        env: &Environment,
        expr: &Datum,
        args: &[Datum],
    ) -> Result<Datum, Error> {
        match form {
            SpecialForm::DefineMacro => self.eval_define_macro(env, expr, args),
            SpecialForm::Define => self.eval_define(env, expr, args),
            SpecialForm::Set => match args {
                [Datum::Symbol(name), value_expr] => {
                    let value = self.eval(env, value_expr)?;
                    env.set(name, value)?;
                    Ok(Datum::Void)
                }
                _ => Err(syntax_error(form, expr)),
            },
            SpecialForm::If => match args {
                [test, consequent] => {
                    if self.eval(env, test)?.is_truthy() {
                        self.eval(env, consequent)
                    } else {
                        Ok(Datum::Void)
                    }
                }
                [test, consequent, alternative] => {
                    if self.eval(env, test)?.is_truthy() {
                        self.eval(env, consequent)
                    } else {
                        self.eval(env, alternative)
                    }
                }
                _ => Err(syntax_error(form, expr)),
            },
            SpecialForm::Lambda => match args {
                [params, body @ ..] if !body.is_empty() => {
                    let (names, variadic) = parse_parameters(params, expr)?;
                    let compound = Compound::new(names, variadic, sequence(body), env.clone());
                    Ok(Datum::Procedure(Rc::new(Procedure::compound(compound))))
                }
                _ => Err(syntax_error(form, expr)),
            },
            SpecialForm::Begin => {
                let mut result = Datum::Void;
                for body_expr in args {
                    result = self.eval(env, body_expr)?;
                }
                Ok(result)
            }
            SpecialForm::Quote => match args {
                // Fresh cells on every evaluation, so quoted literals can be mutated safely
                [datum] => Ok(datum.deep_copy()),
                _ => Err(syntax_error(form, expr)),
            },
        }
    }

    fn eval_define(&mut self, env: &Environment, expr: &Datum, args: &[Datum]) -> Result<Datum, Error> {
        match args {
            [Datum::Symbol(name), value_expr] => {
                let value = self.eval(env, value_expr)?;
                env.define(name, value);
                Ok(Datum::Void)
            }
            // (define (name . params) body...) => (define name (lambda params body...))
            [Datum::Pair(signature), body @ ..]
                if !body.is_empty() && signature.car().as_symbol().is_some() =>
            {
                let lambda = Datum::cons(
                    Datum::symbol("lambda"),
                    Datum::cons(signature.cdr(), Datum::list(body.to_vec())),
                );
                let rewritten = Datum::list([Datum::symbol("define"), signature.car(), lambda]);
                self.eval(env, &rewritten)
            }
            _ => Err(syntax_error(SpecialForm::Define, expr)),
        }
    }

    fn eval_define_macro(
        &mut self,
        env: &Environment,
        expr: &Datum,
        args: &[Datum],
    ) -> Result<Datum, Error> {
        let [signature, body @ ..] = args else {
            return Err(syntax_error(SpecialForm::DefineMacro, expr));
        };
        let signature = signature.to_vec().unwrap_or_default();
        match (signature.as_slice(), body.is_empty()) {
            ([Datum::Symbol(name), Datum::Symbol(param)], false) => {
                let transformer = Compound::new(vec![param.clone()], false, sequence(body), env.clone());
                env.define(name, Datum::Macro(Rc::new(Macro::new(transformer))));
                Ok(Datum::Void)
            }
            _ => Err(syntax_error(SpecialForm::DefineMacro, expr)),
        }
    }

    fn eval_application(
        &mut self,
        env: &Environment,
        expr: &Datum,
        head: &Datum,
        operands: &Datum,
    ) -> Result<Datum, Error> {
        match self.eval(env, head)? {
            Datum::Procedure(procedure) => {
                let Some(operands) = operands.to_vec() else {
                    return Err(Error::SyntaxError(format!(
                        "Improper argument list in application: {}",
                        expr.write()
                    )));
                };
                let args = operands
                    .iter()
                    .map(|operand| self.eval(env, operand))
                    .collect::<Result<Vec<_>, _>>()?;
                procedure.invoke(self, env, args)
            }
            Datum::Macro(mac) => mac.invoke(self, env, expr),
            other => Err(Error::ApplicationError(format!(
                "can't apply non-procedure & non-macro {} in {}",
                other.profile(),
                expr.write()
            ))),
        }
    }
}
