//! Pairs and lists: construction, access, mutation, searching, higher-order traversal,
//! sorting and shape predicates.
//!
//! Shape predicates classify with cycle detection, so `list?` and friends terminate on
//! circular structure.

use std::rc::Rc;

use super::{Args, BuiltinOp, apply};
use crate::Error;
use crate::ast::{Datum, ListShape};
use crate::evaluator::{Arity, Environment, Interpreter, Procedure};

const ALIST: &str = "an alist (list of key-value pair lists)";

fn builtin_cons(args: Args) -> Result<Datum, Error> {
    Ok(Datum::cons(args.get(0)?.clone(), args.get(1)?.clone()))
}

fn builtin_car(args: Args) -> Result<Datum, Error> {
    Ok(args.pair(0)?.car())
}

fn builtin_cdr(args: Args) -> Result<Datum, Error> {
    Ok(args.pair(0)?.cdr())
}

/// Follow a c[ad]+r access path, applying its letters right to left
fn walk_path(args: &Args, path: &str) -> Result<Datum, Error> {
    let mut current = args.get(0)?.clone();
    for step in path.chars().rev() {
        let Some(pair) = current.as_pair().cloned() else {
            return Err(args.error(format_args!("can't take the c{step}r of {}", current.write())));
        };
        current = if step == 'a' { pair.car() } else { pair.cdr() };
    }
    Ok(current)
}

macro_rules! pair_path {
    ($name:ident, $path:literal) => {
        fn $name(args: Args) -> Result<Datum, Error> {
            walk_path(&args, $path)
        }
    };
}

pair_path!(builtin_caar, "aa");
pair_path!(builtin_cadr, "ad");
pair_path!(builtin_cdar, "da");
pair_path!(builtin_cddr, "dd");
pair_path!(builtin_caddr, "add");

fn builtin_set_car(args: Args) -> Result<Datum, Error> {
    args.pair(0)?.set_car(args.get(1)?.clone());
    Ok(Datum::Void)
}

fn builtin_set_cdr(args: Args) -> Result<Datum, Error> {
    args.pair(0)?.set_cdr(args.get(1)?.clone());
    Ok(Datum::Void)
}

fn builtin_is_pair(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Boolean(args.get(0)?.as_pair().is_some()))
}

fn builtin_is_atom(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Boolean(args.get(0)?.as_pair().is_none()))
}

fn builtin_is_null(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Boolean(args.get(0)?.is_nil()))
}

fn builtin_list(args: Args) -> Result<Datum, Error> {
    Ok(Datum::list(args.into_values()))
}

/// `(list* a b ... tail)`: the last argument becomes the tail
fn builtin_list_star(args: Args) -> Result<Datum, Error> {
    let mut values = args.into_values();
    let tail = values.pop().unwrap_or(Datum::Nil);
    Ok(Datum::list_with_tail(values, tail))
}

/// Every argument but the last must be a proper list; the last becomes the tail
fn builtin_append(args: Args) -> Result<Datum, Error> {
    let Some((last, init)) = args.values().split_last() else {
        return Ok(Datum::Nil);
    };
    let mut items = Vec::new();
    for (i, value) in init.iter().enumerate() {
        let Some(elements) = value.to_vec() else {
            return Err(args.arg_error(i, "a list"));
        };
        items.extend(elements);
    }
    Ok(Datum::list_with_tail(items, last.clone()))
}

fn builtin_length(args: Args) -> Result<Datum, Error> {
    Ok(Datum::from(args.list(0)?.len()))
}

fn builtin_reverse(args: Args) -> Result<Datum, Error> {
    Ok(Datum::list(args.list(0)?.into_iter().rev().collect::<Vec<_>>()))
}

fn non_empty_list(args: &Args) -> Result<Vec<Datum>, Error> {
    match args.get(0)?.to_vec() {
        Some(items) if !items.is_empty() => Ok(items),
        _ => Err(args.arg_error(0, "a non-empty list")),
    }
}

fn builtin_last(args: Args) -> Result<Datum, Error> {
    let mut items = non_empty_list(&args)?;
    Ok(items.pop().unwrap_or(Datum::Nil))
}

fn builtin_init(args: Args) -> Result<Datum, Error> {
    let mut items = non_empty_list(&args)?;
    items.pop();
    Ok(Datum::list(items))
}

/// `(ref list index)`
fn builtin_ref(args: Args) -> Result<Datum, Error> {
    let items = non_empty_list(&args)?;
    let index = args.index(1)?;
    items
        .get(index)
        .cloned()
        .ok_or_else(|| args.error(format_args!("index {index} is out of bounds")))
}

/// `(sublist list start [length])`, clamped to the end of the list
fn builtin_sublist(args: Args) -> Result<Datum, Error> {
    let items = args.list(0)?;
    let start = args.index(1)?;
    let length = if args.len() == 3 {
        args.index(2)?
    } else {
        usize::MAX
    };
    Ok(Datum::list(
        items.into_iter().skip(start).take(length).collect::<Vec<_>>(),
    ))
}

/// The first tail of the list whose car matches, or #f
fn find_tail(args: &Args, same: fn(&Datum, &Datum) -> bool) -> Result<Datum, Error> {
    let needle = args.get(0)?;
    let list = args.get(1)?;
    if !list.is_list() {
        return Err(args.arg_error(1, "a list"));
    }
    let mut current = list.clone();
    while let Some(pair) = current.as_pair().cloned() {
        if same(&pair.car(), needle) {
            return Ok(current);
        }
        current = pair.cdr();
    }
    Ok(Datum::Boolean(false))
}

fn builtin_memq(args: Args) -> Result<Datum, Error> {
    find_tail(&args, Datum::is_eq)
}

fn builtin_member(args: Args) -> Result<Datum, Error> {
    find_tail(&args, Datum::is_equal)
}

/// The value of the first `(key value ...)` entry whose key matches, or #f
fn find_entry(args: &Args, same: fn(&Datum, &Datum) -> bool) -> Result<Datum, Error> {
    let key = args.get(0)?;
    let entries = args.get(1)?.to_vec().ok_or_else(|| args.arg_error(1, ALIST))?;
    for entry in &entries {
        let Some((entry_key, value)) = key_value(entry) else {
            return Err(args.arg_error(1, ALIST));
        };
        if same(&entry_key, key) {
            return Ok(value);
        }
    }
    Ok(Datum::Boolean(false))
}

/// Split a `(key value ...)` entry
fn key_value(entry: &Datum) -> Option<(Datum, Datum)> {
    let pair = entry.as_pair()?;
    let rest = pair.cdr();
    let value = rest.as_pair()?.car();
    Some((pair.car(), value))
}

fn builtin_assq(args: Args) -> Result<Datum, Error> {
    find_entry(&args, Datum::is_eq)
}

fn builtin_assoc(args: Args) -> Result<Datum, Error> {
    find_entry(&args, Datum::is_equal)
}

fn builtin_is_list(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Boolean(args.get(0)?.is_list()))
}

/// A pair chain ending in something other than `()`
fn builtin_is_dotted_list(args: Args) -> Result<Datum, Error> {
    let value = args.get(0)?;
    Ok(Datum::Boolean(
        value.as_pair().is_some() && value.list_shape() == ListShape::Dotted,
    ))
}

fn builtin_is_circular_list(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Boolean(
        args.get(0)?.list_shape() == ListShape::Circular,
    ))
}

fn builtin_is_alist(args: Args) -> Result<Datum, Error> {
    let is_alist = args
        .get(0)?
        .to_vec()
        .is_some_and(|entries| entries.iter().all(|entry| key_value(entry).is_some()));
    Ok(Datum::Boolean(is_alist))
}

/// Procedure and list arguments shared by `map` and `for-each`
fn procedure_and_lists(args: &Args) -> Result<(Rc<Procedure>, Vec<Vec<Datum>>), Error> {
    let procedure = args.procedure(0)?;
    let lists = (1..args.len())
        .map(|i| args.list(i))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((procedure, lists))
}

/// Call the procedure across the lists element-wise, stopping at the shortest
fn map_across(
    interp: &mut Interpreter,
    env: &Environment,
    procedure: &Procedure,
    lists: &[Vec<Datum>],
) -> Result<Vec<Datum>, Error> {
    let shortest = lists.iter().map(Vec::len).min().unwrap_or(0);
    (0..shortest)
        .map(|i| {
            let call_args = lists.iter().map(|list| list[i].clone()).collect();
            apply(interp, env, procedure, call_args)
        })
        .collect()
}

fn builtin_map(interp: &mut Interpreter, env: &Environment, args: Args) -> Result<Datum, Error> {
    let (procedure, lists) = procedure_and_lists(&args)?;
    Ok(Datum::list(map_across(interp, env, &procedure, &lists)?))
}

fn builtin_for_each(
    interp: &mut Interpreter,
    env: &Environment,
    args: Args,
) -> Result<Datum, Error> {
    let (procedure, lists) = procedure_and_lists(&args)?;
    map_across(interp, env, &procedure, &lists)?;
    Ok(Datum::Void)
}

/// `(filter predicate list)`
fn builtin_filter(interp: &mut Interpreter, env: &Environment, args: Args) -> Result<Datum, Error> {
    let predicate = args.procedure(0)?;
    let mut kept = Vec::new();
    for item in args.list(1)? {
        if apply(interp, env, &predicate, vec![item.clone()])?.is_truthy() {
            kept.push(item);
        }
    }
    Ok(Datum::list(kept))
}

/// `(fold proc init list)` calls `(proc acc item)` left to right
fn builtin_fold(interp: &mut Interpreter, env: &Environment, args: Args) -> Result<Datum, Error> {
    let procedure = args.procedure(0)?;
    let mut acc = args.get(1)?.clone();
    for item in args.list(2)? {
        acc = apply(interp, env, &procedure, vec![acc, item])?;
    }
    Ok(acc)
}

/// `(fold-right proc init list)` calls `(proc item acc)` right to left
fn builtin_fold_right(
    interp: &mut Interpreter,
    env: &Environment,
    args: Args,
) -> Result<Datum, Error> {
    let procedure = args.procedure(0)?;
    let mut acc = args.get(1)?.clone();
    for item in args.list(2)?.into_iter().rev() {
        acc = apply(interp, env, &procedure, vec![item, acc])?;
    }
    Ok(acc)
}

/// Stable merge sort; an element only moves ahead of an earlier one when strictly less
fn merge_sort(
    interp: &mut Interpreter,
    env: &Environment,
    less: &Procedure,
    mut items: Vec<Datum>,
) -> Result<Vec<Datum>, Error> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(interp, env, less, items)?;
    let right = merge_sort(interp, env, less, right)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        let right_first = apply(interp, env, less, vec![r.clone(), l.clone()])?.is_truthy();
        merged.extend(if right_first { right.next() } else { left.next() });
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}

/// `(sort less? list)`
fn builtin_sort(interp: &mut Interpreter, env: &Environment, args: Args) -> Result<Datum, Error> {
    let less = args.procedure(0)?;
    let items = args.list(1)?;
    Ok(Datum::list(merge_sort(interp, env, &less, items)?))
}

/// `(sorted? less? list)`: no element is less than the one before it
fn builtin_is_sorted(
    interp: &mut Interpreter,
    env: &Environment,
    args: Args,
) -> Result<Datum, Error> {
    let less = args.procedure(0)?;
    let items = args.list(1)?;
    for window in items.windows(2) {
        let [earlier, later] = window else { continue };
        if apply(interp, env, &less, vec![later.clone(), earlier.clone()])?.is_truthy() {
            return Ok(Datum::Boolean(false));
        }
    }
    Ok(Datum::Boolean(true))
}

pub(super) static OPS: &[BuiltinOp] = &[
    // Pairs
    BuiltinOp::pure("cons", Arity::Exact(2), builtin_cons),
    BuiltinOp::pure("car", Arity::Exact(1), builtin_car),
    BuiltinOp::pure("cdr", Arity::Exact(1), builtin_cdr),
    BuiltinOp::pure("caar", Arity::Exact(1), builtin_caar),
    BuiltinOp::pure("cadr", Arity::Exact(1), builtin_cadr),
    BuiltinOp::pure("cdar", Arity::Exact(1), builtin_cdar),
    BuiltinOp::pure("cddr", Arity::Exact(1), builtin_cddr),
    BuiltinOp::pure("caddr", Arity::Exact(1), builtin_caddr),
    BuiltinOp::pure("set-car!", Arity::Exact(2), builtin_set_car),
    BuiltinOp::pure("set-cdr!", Arity::Exact(2), builtin_set_cdr),
    BuiltinOp::pure("pair?", Arity::Exact(1), builtin_is_pair),
    BuiltinOp::pure("atom?", Arity::Exact(1), builtin_is_atom),
    // Construction and access
    BuiltinOp::pure("list", Arity::AtLeast(0), builtin_list),
    BuiltinOp::pure("list*", Arity::AtLeast(2), builtin_list_star),
    BuiltinOp::pure("append", Arity::AtLeast(0), builtin_append),
    BuiltinOp::pure("length", Arity::Exact(1), builtin_length),
    BuiltinOp::pure("reverse", Arity::Exact(1), builtin_reverse),
    BuiltinOp::pure("last", Arity::Exact(1), builtin_last),
    BuiltinOp::pure("init", Arity::Exact(1), builtin_init),
    BuiltinOp::pure("ref", Arity::Exact(2), builtin_ref),
    BuiltinOp::pure("sublist", Arity::Range(2, 3), builtin_sublist),
    // Searching
    BuiltinOp::pure("memq", Arity::Exact(2), builtin_memq),
    BuiltinOp::pure("member", Arity::Exact(2), builtin_member),
    BuiltinOp::pure("assq", Arity::Exact(2), builtin_assq),
    BuiltinOp::pure("assoc", Arity::Exact(2), builtin_assoc),
    // Higher-order
    BuiltinOp::contextual("map", Arity::AtLeast(2), builtin_map),
    BuiltinOp::contextual("for-each", Arity::AtLeast(2), builtin_for_each),
    BuiltinOp::contextual("filter", Arity::Exact(2), builtin_filter),
    BuiltinOp::contextual("fold", Arity::Exact(3), builtin_fold),
    BuiltinOp::contextual("fold-right", Arity::Exact(3), builtin_fold_right),
    BuiltinOp::contextual("sort", Arity::Exact(2), builtin_sort),
    BuiltinOp::contextual("sorted?", Arity::Exact(2), builtin_is_sorted),
    // Shape predicates
    BuiltinOp::pure("null?", Arity::Exact(1), builtin_is_null),
    BuiltinOp::pure("list?", Arity::Exact(1), builtin_is_list),
    BuiltinOp::pure("list*?", Arity::Exact(1), builtin_is_dotted_list),
    BuiltinOp::pure("circular-list?", Arity::Exact(1), builtin_is_circular_list),
    BuiltinOp::pure("alist?", Arity::Exact(1), builtin_is_alist),
];
