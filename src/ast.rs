//! This module defines [`Datum`], the single value type shared by the reader, the
//! evaluator and the primitive library. Lists are chains of mutable, reference-counted
//! [`PairRef`] cells, so structure can be shared, mutated in place through every alias,
//! and even made cyclic. Equality comes in two tiers ([`Datum::is_eq`] for identity of
//! pairs and callables, [`Datum::is_equal`] for structure) and every datum has a
//! human-readable ([`Datum::display`]) and a machine-readable ([`Datum::write`])
//! serialization. Both equality and printing terminate on cyclic structure.
//!
//! Ergonomic helpers [`sym`], [`val`] and [`nil`] build data in code and tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::evaluator::{Macro, Procedure, ensure_sufficient_stack};

/// Type alias for number values in interpreter
pub(crate) type NumberType = f64;

/// Core value type in interpreter
///
/// To build data in code, use the helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `nil()` for the empty list
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Datum {
    /// The empty list, distinct from `#f`
    Nil,
    Boolean(bool),
    Number(NumberType),
    Text(String),
    Symbol(String),
    /// A mutable cons cell, shared between all its aliases
    Pair(PairRef),
    Procedure(Rc<Procedure>),
    Macro(Rc<Macro>),
    /// Result of forms evaluated for effect
    Void,
}

/// Storage for one cons cell
pub struct PairCell {
    car: Datum,
    cdr: Datum,
}

impl PairCell {
    /// Move any pair children onto `pending`, leaving `()` in their place
    fn detach_pairs(&mut self, pending: &mut Vec<PairRef>) {
        for field in [&mut self.car, &mut self.cdr] {
            if let Datum::Pair(pair) = field {
                pending.push(pair.clone());
                *field = Datum::Nil;
            }
        }
    }
}

/// Chains release iteratively: cells owned only by the dying chain are unlinked one
/// at a time, shared cells just lose a reference.
impl Drop for PairCell {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.detach_pairs(&mut pending);
        while let Some(PairRef(cell)) = pending.pop() {
            if let Ok(cell) = Rc::try_unwrap(cell) {
                cell.into_inner().detach_pairs(&mut pending);
            }
        }
    }
}

/// Shared handle to a cons cell. Cloning the handle aliases the cell.
#[derive(Clone)]
pub struct PairRef(Rc<RefCell<PairCell>>);

impl PairRef {
    pub fn new(car: Datum, cdr: Datum) -> Self {
        PairRef(Rc::new(RefCell::new(PairCell { car, cdr })))
    }

    pub fn car(&self) -> Datum {
        self.0.borrow().car.clone()
    }

    pub fn cdr(&self) -> Datum {
        self.0.borrow().cdr.clone()
    }

    pub fn set_car(&self, value: Datum) {
        self.0.borrow_mut().car = value;
    }

    pub fn set_cdr(&self, value: Datum) {
        self.0.borrow_mut().cdr = value;
    }

    /// Identity comparison: true only for two handles to the same cell
    pub fn ptr_eq(&self, other: &PairRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the cell, used to track visited cells
    fn key(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

/// Classification of a pair chain, computed without looping on cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListShape {
    /// Terminated by `()`, with this many elements
    Proper(usize),
    /// Terminated by some other atom (a bare atom is a degenerate dotted list)
    Dotted,
    Circular,
}

impl Datum {
    pub fn cons(car: Datum, cdr: Datum) -> Datum {
        Datum::Pair(PairRef::new(car, cdr))
    }

    /// Build a proper list from the items, in order
    pub fn list<I>(items: I) -> Datum
    where
        I: IntoIterator<Item = Datum>,
        I::IntoIter: DoubleEndedIterator,
    {
        Self::list_with_tail(items, Datum::Nil)
    }

    /// Build a list from the items terminated by `tail` instead of `()`
    pub fn list_with_tail<I>(items: I, tail: Datum) -> Datum
    where
        I: IntoIterator<Item = Datum>,
        I::IntoIter: DoubleEndedIterator,
    {
        items
            .into_iter()
            .rev()
            .fold(tail, |acc, item| Datum::cons(item, acc))
    }

    pub fn symbol(name: impl Into<String>) -> Datum {
        Datum::Symbol(name.into())
    }

    pub fn text(value: impl Into<String>) -> Datum {
        Datum::Text(value.into())
    }

    /// Everything except `#f` counts as true
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Datum::Boolean(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Datum::Nil)
    }

    pub fn as_pair(&self) -> Option<&PairRef> {
        match self {
            Datum::Pair(pair) => Some(pair),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Datum::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// Name of the variant as exposed by `typeof`
    pub fn type_name(&self) -> &'static str {
        match self {
            Datum::Nil => "nil",
            Datum::Boolean(_) => "boolean",
            Datum::Number(_) => "number",
            Datum::Text(_) => "string",
            Datum::Symbol(_) => "symbol",
            Datum::Pair(_) => "pair",
            Datum::Procedure(_) => "procedure",
            Datum::Macro(_) => "macro",
            Datum::Void => "void",
        }
    }

    /// Diagnostic description used in error messages, e.g. `"a" of type "string"`
    pub fn profile(&self) -> String {
        format!("{} of type \"{}\"", self.write(), self.type_name())
    }

    /// Give an anonymous procedure or macro the name it is first bound to
    pub(crate) fn bind_name(&self, name: &str) {
        match self {
            Datum::Procedure(procedure) => procedure.bind_name(name),
            Datum::Macro(mac) => mac.bind_name(name),
            _ => {}
        }
    }

    /// Shallow equality: atoms by value; pairs, procedures and macros by identity
    pub fn is_eq(&self, other: &Datum) -> bool {
        match (self, other) {
            (Datum::Nil, Datum::Nil) | (Datum::Void, Datum::Void) => true,
            (Datum::Boolean(a), Datum::Boolean(b)) => a == b,
            (Datum::Number(a), Datum::Number(b)) => a == b,
            (Datum::Text(a), Datum::Text(b)) | (Datum::Symbol(a), Datum::Symbol(b)) => a == b,
            (Datum::Pair(a), Datum::Pair(b)) => a.ptr_eq(b),
            (Datum::Procedure(a), Datum::Procedure(b)) => Rc::ptr_eq(a, b),
            (Datum::Macro(a), Datum::Macro(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Deep equality: pairs are compared by contents, everything else as in [`Datum::is_eq`].
    ///
    /// A pair comparison met again while it is still in progress is assumed to hold,
    /// which makes the comparison terminate on cyclic structure.
    pub fn is_equal(&self, other: &Datum) -> bool {
        fn equal_inner(a: &Datum, b: &Datum, in_progress: &mut HashSet<(usize, usize)>) -> bool {
            let (Datum::Pair(a), Datum::Pair(b)) = (a, b) else {
                return a.is_eq(b);
            };
            let (mut a, mut b) = (a.clone(), b.clone());
            loop {
                if a.ptr_eq(&b) || !in_progress.insert((a.key(), b.key())) {
                    return true;
                }
                let cars_equal =
                    ensure_sufficient_stack(|| equal_inner(&a.car(), &b.car(), in_progress));
                if !cars_equal {
                    return false;
                }
                match (a.cdr(), b.cdr()) {
                    (Datum::Pair(next_a), Datum::Pair(next_b)) => {
                        a = next_a;
                        b = next_b;
                    }
                    (tail_a, tail_b) => return tail_a.is_eq(&tail_b),
                }
            }
        }

        equal_inner(self, other, &mut HashSet::new())
    }

    /// Classify a pair chain using Floyd's tortoise and hare
    pub fn list_shape(&self) -> ListShape {
        fn step(datum: &Datum) -> Option<Datum> {
            datum.as_pair().map(PairRef::cdr)
        }

        let mut length = 0;
        let mut slow = self.clone();
        let mut fast = self.clone();
        loop {
            for _ in 0..2 {
                match &fast {
                    Datum::Nil => return ListShape::Proper(length),
                    Datum::Pair(pair) => {
                        let next = pair.cdr();
                        fast = next;
                        length += 1;
                    }
                    _ => return ListShape::Dotted,
                }
            }
            slow = step(&slow).unwrap_or(Datum::Nil);
            if let (Datum::Pair(s), Datum::Pair(f)) = (&slow, &fast)
                && s.ptr_eq(f)
            {
                return ListShape::Circular;
            }
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self.list_shape(), ListShape::Proper(_))
    }

    /// Elements of a proper list, or `None` for anything else
    pub fn to_vec(&self) -> Option<Vec<Datum>> {
        let ListShape::Proper(length) = self.list_shape() else {
            return None;
        };
        let mut items = Vec::with_capacity(length);
        let mut current = self.clone();
        while let Datum::Pair(pair) = current {
            items.push(pair.car());
            current = pair.cdr();
        }
        Some(items)
    }

    /// Elements and terminating atom of a proper or dotted list; `None` if circular
    pub fn spine(&self) -> Option<(Vec<Datum>, Datum)> {
        if self.list_shape() == ListShape::Circular {
            return None;
        }
        let mut items = Vec::new();
        let mut current = self.clone();
        while let Datum::Pair(pair) = current {
            items.push(pair.car());
            current = pair.cdr();
        }
        Some((items, current))
    }

    /// Structural copy that allocates fresh cells for every reachable pair.
    /// Sharing and cycles inside the structure are reproduced in the copy.
    pub fn deep_copy(&self) -> Datum {
        fn copy_inner(datum: &Datum, copies: &mut HashMap<usize, PairRef>) -> Datum {
            let Datum::Pair(head) = datum else {
                return datum.clone();
            };
            if let Some(existing) = copies.get(&head.key()) {
                return Datum::Pair(existing.clone());
            }

            let new_head = PairRef::new(Datum::Nil, Datum::Nil);
            copies.insert(head.key(), new_head.clone());
            let mut source = head.clone();
            let mut target = new_head.clone();
            loop {
                let car = ensure_sufficient_stack(|| copy_inner(&source.car(), copies));
                target.set_car(car);
                match source.cdr() {
                    Datum::Pair(next) => {
                        if let Some(existing) = copies.get(&next.key()) {
                            target.set_cdr(Datum::Pair(existing.clone()));
                            break;
                        }
                        let fresh = PairRef::new(Datum::Nil, Datum::Nil);
                        copies.insert(next.key(), fresh.clone());
                        target.set_cdr(Datum::Pair(fresh.clone()));
                        source = next;
                        target = fresh;
                    }
                    tail => {
                        target.set_cdr(tail);
                        break;
                    }
                }
            }
            Datum::Pair(new_head)
        }

        copy_inner(self, &mut HashMap::new())
    }

    /// Human-readable form: text is printed raw
    pub fn display(&self) -> String {
        Printer::render(self, Style::Display)
    }

    /// Machine-readable form: text is quoted and escaped
    pub fn write(&self) -> String {
        Printer::render(self, Style::Write)
    }
}

/// Format a number the way the reader accepts it back
pub(crate) fn format_number(n: NumberType) -> String {
    if n.is_nan() {
        "+nan.0".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "+inf.0" } else { "-inf.0" }.to_owned()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Style {
    Display,
    Write,
}

/// Serializer that marks pairs currently being printed, writing `...` when one is
/// reached again instead of recursing forever.
struct Printer {
    out: String,
    style: Style,
    active: HashSet<usize>,
}

impl Printer {
    fn render(datum: &Datum, style: Style) -> String {
        let mut printer = Printer {
            out: String::new(),
            style,
            active: HashSet::new(),
        };
        printer.print(datum);
        printer.out
    }

    fn print(&mut self, datum: &Datum) {
        match datum {
            Datum::Nil => self.out.push_str("()"),
            Datum::Boolean(b) => self.out.push_str(if *b { "#t" } else { "#f" }),
            Datum::Number(n) => self.out.push_str(&format_number(*n)),
            Datum::Text(s) => match self.style {
                Style::Display => self.out.push_str(s),
                Style::Write => self.print_escaped(s),
            },
            Datum::Symbol(name) => self.out.push_str(name),
            Datum::Pair(pair) => self.print_pair(pair),
            Datum::Procedure(procedure) => {
                self.out.push_str(&format!("#<procedure {}>", procedure.name()));
            }
            Datum::Macro(mac) => self.out.push_str(&format!("#<macro {}>", mac.name())),
            Datum::Void => self.out.push_str("#<void>"),
        }
    }

    fn print_escaped(&mut self, s: &str) {
        self.out.push('"');
        for ch in s.chars() {
            match ch {
                '"' => self.out.push_str("\\\""),
                '\\' => self.out.push_str("\\\\"),
                '\n' => self.out.push_str("\\n"),
                '\t' => self.out.push_str("\\t"),
                '\r' => self.out.push_str("\\r"),
                '\0' => self.out.push_str("\\0"),
                c => self.out.push(c),
            }
        }
        self.out.push('"');
    }

    fn print_pair(&mut self, first: &PairRef) {
        if self.active.contains(&first.key()) {
            self.out.push_str("...");
            return;
        }

        let mut spine = Vec::new();
        let mut current = first.clone();
        self.out.push('(');
        loop {
            self.active.insert(current.key());
            spine.push(current.key());
            let car = current.car();
            ensure_sufficient_stack(|| self.print(&car));
            match current.cdr() {
                Datum::Nil => break,
                Datum::Pair(next) => {
                    if self.active.contains(&next.key()) {
                        self.out.push_str(" . ...");
                        break;
                    }
                    self.out.push(' ');
                    current = next;
                }
                tail => {
                    self.out.push_str(" . ");
                    self.print(&tail);
                    break;
                }
            }
        }
        self.out.push(')');

        for key in spine {
            self.active.remove(&key);
        }
    }
}

/// `{}` renders the machine-readable `write` form
impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.write())
    }
}

impl fmt::Debug for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Nil => write!(f, "Nil"),
            Datum::Boolean(b) => write!(f, "Boolean({b})"),
            Datum::Number(n) => write!(f, "Number({})", format_number(*n)),
            Datum::Text(s) => write!(f, "Text({s:?})"),
            Datum::Symbol(s) => write!(f, "Symbol({s})"),
            Datum::Pair(_) => write!(f, "Pair{}", self.write()),
            Datum::Procedure(procedure) => write!(f, "Procedure({})", procedure.name()),
            Datum::Macro(mac) => write!(f, "Macro({})", mac.name()),
            Datum::Void => write!(f, "Void"),
        }
    }
}

/// `==` is deep equality (`equal?`)
impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

// From trait implementations for Datum - enables .into() conversion
impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::Text(s.to_owned())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::Text(s)
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Boolean(b)
    }
}

macro_rules! impl_from_number {
    ($num_type:ty) => {
        impl From<$num_type> for Datum {
            fn from(n: $num_type) -> Self {
                Datum::Number(NumberType::from(n))
            }
        }
    };
}

impl_from_number!(i8);
impl_from_number!(i16);
impl_from_number!(i32);
impl_from_number!(u8);
impl_from_number!(u16);
impl_from_number!(u32);
impl_from_number!(f32);
impl_from_number!(NumberType);

impl From<usize> for Datum {
    fn from(n: usize) -> Self {
        Datum::Number(n as NumberType)
    }
}

impl<T: Into<Datum>> From<Vec<T>> for Datum {
    fn from(v: Vec<T>) -> Self {
        Datum::list(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Datum>, const N: usize> From<[T; N]> for Datum {
    fn from(arr: [T; N]) -> Self {
        Datum::list(arr.into_iter().map(Into::into))
    }
}

/// Helper function for creating symbols
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Datum {
    Datum::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating data from Rust values
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Datum>>(value: T) -> Datum {
    value.into()
}

/// Helper function for the empty list
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Datum {
    Datum::Nil
}
