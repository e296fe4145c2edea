//! Callable values: primitives, closures and macro transformers.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::{Environment, Interpreter};
use crate::Error;
use crate::ast::Datum;

/// Display name of a callable that was never bound to a name
pub const ANONYMOUS: &str = "anonymous";

/// Host-side signature of a primitive: the calling environment plus evaluated arguments
pub type PrimitiveFn = dyn Fn(&mut Interpreter, &Environment, Vec<Datum>) -> Result<Datum, Error>;

/// Expected number of arguments for a callable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive range
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Range(min, max) => (min..=max).contains(&count),
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "between {min} and {max}"),
        }
    }
}

/// A closure: parameter names, body, and the environment it was created in
#[derive(Clone)]
pub struct Compound {
    params: Vec<String>,
    /// When set, the last parameter collects the remaining arguments as a list
    variadic: bool,
    body: Datum,
    env: Environment,
}

impl Compound {
    pub(crate) fn new(params: Vec<String>, variadic: bool, body: Datum, env: Environment) -> Self {
        Compound {
            params,
            variadic,
            body,
            env,
        }
    }

    pub fn arity(&self) -> Arity {
        if self.variadic {
            Arity::AtLeast(self.params.len().saturating_sub(1))
        } else {
            Arity::Exact(self.params.len())
        }
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn body(&self) -> &Datum {
        &self.body
    }

    /// Bind arguments in a fresh frame whose parent is the captured environment
    fn bind_arguments(&self, name: &str, args: Vec<Datum>) -> Result<Environment, Error> {
        let arity = self.arity();
        if !arity.accepts(args.len()) {
            return Err(Error::ArityError {
                procedure: name.to_owned(),
                expected: arity,
                got: args.len(),
            });
        }

        let frame = Environment::with_parent(&self.env);
        let fixed = match arity {
            Arity::Exact(n) | Arity::AtLeast(n) | Arity::Range(n, _) => n,
        };
        let mut args = args.into_iter();
        for (param, arg) in self.params[..fixed].iter().zip(args.by_ref()) {
            frame.define(param, arg);
        }
        if let Some(rest) = self.params.get(fixed)
            && self.variadic
        {
            frame.define(rest, Datum::list(args.collect::<Vec<_>>()));
        }
        Ok(frame)
    }

    fn call(&self, interp: &mut Interpreter, name: &str, args: Vec<Datum>) -> Result<Datum, Error> {
        let frame = self.bind_arguments(name, args)?;
        interp.eval(&frame, &self.body)
    }
}

pub enum ProcedureKind {
    Primitive(Rc<PrimitiveFn>),
    Compound(Compound),
}

/// A procedure value. The name is filled in the first time the procedure is bound.
pub struct Procedure {
    name: RefCell<Option<String>>,
    kind: ProcedureKind,
}

impl Procedure {
    pub fn primitive(name: &str, func: Rc<PrimitiveFn>) -> Self {
        Procedure {
            name: RefCell::new(Some(name.to_owned())),
            kind: ProcedureKind::Primitive(func),
        }
    }

    pub fn compound(compound: Compound) -> Self {
        Procedure {
            name: RefCell::new(None),
            kind: ProcedureKind::Compound(compound),
        }
    }

    pub fn kind(&self) -> &ProcedureKind {
        &self.kind
    }

    pub fn name(&self) -> String {
        self.name
            .borrow()
            .clone()
            .unwrap_or_else(|| ANONYMOUS.to_owned())
    }

    /// Name the procedure unless it already has a name
    pub(crate) fn bind_name(&self, name: &str) {
        let mut slot = self.name.borrow_mut();
        if slot.is_none() {
            *slot = Some(name.to_owned());
        }
    }

    /// Call the procedure with evaluated arguments.
    ///
    /// The name stays on the interpreter's call stack if the call fails,
    /// so the stack describes the path to the error.
    pub fn invoke(
        &self,
        interp: &mut Interpreter,
        env: &Environment,
        args: Vec<Datum>,
    ) -> Result<Datum, Error> {
        let name = self.name();
        interp.push_frame(name.clone());
        let result = match &self.kind {
            ProcedureKind::Primitive(func) => func(interp, env, args),
            ProcedureKind::Compound(compound) => compound.call(interp, &name, args),
        };
        if result.is_ok() {
            interp.pop_frame();
        }
        result
    }
}

/// A transformer over unevaluated call forms
pub struct Macro {
    name: RefCell<Option<String>>,
    transformer: Compound,
}

impl Macro {
    pub(crate) fn new(transformer: Compound) -> Self {
        Macro {
            name: RefCell::new(None),
            transformer,
        }
    }

    pub fn name(&self) -> String {
        self.name
            .borrow()
            .clone()
            .unwrap_or_else(|| ANONYMOUS.to_owned())
    }

    pub(crate) fn bind_name(&self, name: &str) {
        let mut slot = self.name.borrow_mut();
        if slot.is_none() {
            *slot = Some(name.to_owned());
        }
    }

    /// Run the transformer on the whole call form, then evaluate the expansion
    /// in the caller's environment.
    pub fn invoke(
        &self,
        interp: &mut Interpreter,
        env: &Environment,
        form: &Datum,
    ) -> Result<Datum, Error> {
        let expansion = self.expand(interp, form)?;
        interp.eval(env, &expansion)
    }

    /// Expansion only; the transformer runs in the macro's own defining scope
    pub fn expand(&self, interp: &mut Interpreter, form: &Datum) -> Result<Datum, Error> {
        let name = self.name();
        interp.push_frame(name.clone());
        let expansion = self.transformer.call(interp, &name, vec![form.clone()])?;
        interp.pop_frame();
        trace!(%name, %expansion, "expanded macro");
        Ok(expansion)
    }
}
