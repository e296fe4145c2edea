use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::Interpreter;
use super::procedure::Procedure;
use crate::Error;
use crate::ast::Datum;

struct Frame {
    bindings: HashMap<String, Datum>,
    parent: Option<Environment>,
}

/// A lexical scope. Cloning shares the scope, so closures and nested scopes
/// observe each other's mutations.
#[derive(Clone)]
pub struct Environment(Rc<RefCell<Frame>>);

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Environment(Rc::new(RefCell::new(Frame {
            bindings: HashMap::new(),
            parent: None,
        })))
    }

    pub fn with_parent(parent: &Environment) -> Self {
        Environment(Rc::new(RefCell::new(Frame {
            bindings: HashMap::new(),
            parent: Some(parent.clone()),
        })))
    }

    /// Bind `name` in this scope only, replacing any existing binding here.
    /// An anonymous procedure or macro takes `name` as its display name.
    pub fn define(&self, name: &str, value: Datum) {
        value.bind_name(name);
        self.0.borrow_mut().bindings.insert(name.to_owned(), value);
    }

    /// Look `name` up in this scope and then outward through the parents
    pub fn get(&self, name: &str) -> Result<Datum, Error> {
        let mut scope = self.clone();
        loop {
            let parent = {
                let frame = scope.0.borrow();
                if let Some(value) = frame.bindings.get(name) {
                    return Ok(value.clone());
                }
                frame.parent.clone()
            };
            match parent {
                Some(parent) => scope = parent,
                None => return Err(Error::UnboundVariable(name.to_owned())),
            }
        }
    }

    /// Rebind `name` in the nearest scope that defines it. Never creates a binding.
    pub fn set(&self, name: &str, value: Datum) -> Result<(), Error> {
        let mut scope = self.clone();
        loop {
            let parent = {
                let mut frame = scope.0.borrow_mut();
                if let Some(slot) = frame.bindings.get_mut(name) {
                    value.bind_name(name);
                    *slot = value;
                    return Ok(());
                }
                frame.parent.clone()
            };
            match parent {
                Some(parent) => scope = parent,
                None => return Err(Error::UnboundVariable(name.to_owned())),
            }
        }
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    /// Register a host function as a primitive procedure in this scope.
    ///
    /// The function receives the interpreter, the environment the call was made from,
    /// and the evaluated arguments. It is responsible for its own argument checking.
    ///
    /// # Example
    /// ```
    /// use treelisp::ast::Datum;
    /// use treelisp::evaluator::Interpreter;
    ///
    /// let mut interp = Interpreter::new();
    /// interp.global().register_builtin_function("answer", |_, _, _| Ok(Datum::Number(42.0)));
    /// assert_eq!(interp.eval_str("(answer)").unwrap().to_string(), "42");
    /// ```
    pub fn register_builtin_function<F>(&self, name: &str, func: F)
    where
        F: Fn(&mut Interpreter, &Environment, Vec<Datum>) -> Result<Datum, Error> + 'static,
    {
        let procedure = Procedure::primitive(name, Rc::new(func));
        self.define(name, Datum::Procedure(Rc::new(procedure)));
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Datum)> {
        let frame = self.0.borrow();
        let mut bindings: HashMap<String, Datum> = frame
            .parent
            .as_ref()
            .map(|parent| parent.get_all_bindings().into_iter().collect())
            .unwrap_or_default();

        // Local bindings shadow the parents'
        for (name, value) in &frame.bindings {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.0.borrow();
        f.debug_struct("Environment")
            .field("bindings", &frame.bindings.len())
            .field("has_parent", &frame.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;

    #[test]
    fn test_define_get_and_shadowing() {
        let global = Environment::new();
        global.define("x", val(1));
        let inner = Environment::with_parent(&global);
        assert_eq!(inner.get("x").unwrap(), val(1));

        inner.define("x", val(2));
        assert_eq!(inner.get("x").unwrap(), val(2));
        assert_eq!(global.get("x").unwrap(), val(1));

        assert_eq!(
            inner.get("missing").unwrap_err(),
            Error::UnboundVariable("missing".to_owned())
        );
    }

    #[test]
    fn test_set_walks_outward() {
        let global = Environment::new();
        global.define("x", val(1));
        let inner = Environment::with_parent(&global);

        inner.set("x", val(5)).unwrap();
        assert_eq!(global.get("x").unwrap(), val(5));
        assert!(!inner.0.borrow().bindings.contains_key("x"));

        assert!(matches!(
            inner.set("y", val(0)),
            Err(Error::UnboundVariable(name)) if name == "y"
        ));
        assert!(!global.is_bound("y"));
    }

    #[test]
    fn test_clones_share_the_scope() {
        let env = Environment::new();
        let alias = env.clone();
        alias.define("shared", val(true));
        assert!(env.is_bound("shared"));
        assert!(env.ptr_eq(&alias));
        assert!(!env.ptr_eq(&Environment::new()));
    }

    #[test]
    fn test_get_all_bindings_sorted_and_shadowed() {
        let global = Environment::new();
        global.define("b", val(1));
        global.define("a", val(2));
        let inner = Environment::with_parent(&global);
        inner.define("b", val(3));

        let names: Vec<(String, Datum)> = inner.get_all_bindings();
        assert_eq!(
            names,
            vec![("a".to_owned(), val(2)), ("b".to_owned(), val(3))]
        );
    }
}
