//! Equality and type inspection, evaluation utilities, functional combinators, console
//! I/O and file access.

use std::fmt::Display;
use std::fs;
use std::io::{self, BufRead};
use std::path::Path;
use std::rc::Rc;

use super::{Args, BuiltinOp, apply};
use crate::Error;
use crate::ast::Datum;
use crate::evaluator::{Arity, Compound, Environment, Interpreter, Procedure};
use crate::scheme::{read, read_program};

fn io_error(args: &Args, target: impl Display, e: &io::Error) -> Error {
    Error::EvalError(format!("'{} can't access {target}: {e}", args.name()))
}

/// Chain a relation across every adjacent pair of arguments
fn chained(args: &Args, relation: fn(&Datum, &Datum) -> bool) -> Datum {
    Datum::Boolean(
        args.values()
            .windows(2)
            .all(|pair| relation(&pair[0], &pair[1])),
    )
}

fn builtin_eq(args: Args) -> Result<Datum, Error> {
    Ok(chained(&args, Datum::is_eq))
}

fn builtin_equal(args: Args) -> Result<Datum, Error> {
    Ok(chained(&args, Datum::is_equal))
}

fn builtin_typeof(args: Args) -> Result<Datum, Error> {
    Ok(Datum::symbol(args.get(0)?.type_name()))
}

macro_rules! type_predicate {
    ($name:ident, $pattern:pat) => {
        fn $name(args: Args) -> Result<Datum, Error> {
            Ok(Datum::Boolean(matches!(args.get(0)?, $pattern)))
        }
    };
}

type_predicate!(builtin_is_void, Datum::Void);
type_predicate!(builtin_is_boolean, Datum::Boolean(_));
type_predicate!(builtin_is_procedure, Datum::Procedure(_));
type_predicate!(builtin_is_symbol, Datum::Symbol(_));

fn builtin_not(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Boolean(!args.get(0)?.is_truthy()))
}

fn builtin_void(_args: Args) -> Result<Datum, Error> {
    Ok(Datum::Void)
}

fn builtin_id(args: Args) -> Result<Datum, Error> {
    Ok(args.get(0)?.clone())
}

fn builtin_copy(args: Args) -> Result<Datum, Error> {
    Ok(args.get(0)?.deep_copy())
}

/// `(error arg ...)` raises the displayed arguments joined by spaces
fn builtin_error(args: Args) -> Result<Datum, Error> {
    let message = args
        .values()
        .iter()
        .map(Datum::display)
        .collect::<Vec<_>>()
        .join(" ");
    Err(Error::EvalError(message))
}

/// Call a thunk, typically one built by `delay`
fn builtin_force(interp: &mut Interpreter, env: &Environment, args: Args) -> Result<Datum, Error> {
    let promise = args.procedure(0)?;
    apply(interp, env, &promise, Vec::new())
}

/// `(apply proc list)`
fn builtin_apply(interp: &mut Interpreter, env: &Environment, args: Args) -> Result<Datum, Error> {
    let procedure = args.procedure(0)?;
    let operands = args.list(1)?;
    apply(interp, env, &procedure, operands)
}

/// Evaluate a datum in the calling environment
fn builtin_eval(interp: &mut Interpreter, env: &Environment, args: Args) -> Result<Datum, Error> {
    interp.eval(env, args.get(0)?)
}

/// A variadic closure `(lambda args body)` over the global environment
fn closure_over_args(interp: &Interpreter, body: Datum) -> Datum {
    let compound = Compound::new(
        vec!["args".to_owned()],
        true,
        body,
        interp.global().clone(),
    );
    Datum::Procedure(Rc::new(Procedure::compound(compound)))
}

fn quoted(datum: Datum) -> Datum {
    Datum::list([Datum::symbol("quote"), datum])
}

/// `(compose f g ... h)` builds `(lambda args (f (g ... (apply h args))))`
fn builtin_compose(interp: &mut Interpreter, _env: &Environment, args: Args) -> Result<Datum, Error> {
    let procedures = (0..args.len())
        .map(|i| args.procedure(i))
        .collect::<Result<Vec<_>, _>>()?;
    let Some((innermost, outer)) = procedures.split_last() else {
        return Err(args.error("expects at least 1 procedure"));
    };
    let root = Datum::list([
        Datum::symbol("apply"),
        Datum::Procedure(Rc::clone(innermost)),
        Datum::symbol("args"),
    ]);
    let body = outer.iter().rev().fold(root, |inner, procedure| {
        Datum::list([Datum::Procedure(Rc::clone(procedure)), inner])
    });
    Ok(closure_over_args(interp, body))
}

/// `(bind f a ...)` builds `(lambda args (apply f (append (list 'a ...) args)))`
fn builtin_bind(interp: &mut Interpreter, _env: &Environment, args: Args) -> Result<Datum, Error> {
    let procedure = args.procedure(0)?;
    let bound = args.values()[1..].iter().cloned().map(quoted);
    let prefix = Datum::cons(Datum::symbol("list"), Datum::list(bound.collect::<Vec<_>>()));
    let body = Datum::list([
        Datum::symbol("apply"),
        Datum::Procedure(procedure),
        Datum::list([Datum::symbol("append"), prefix, Datum::symbol("args")]),
    ]);
    Ok(closure_over_args(interp, body))
}

fn emit(interp: &mut Interpreter, args: &Args, text: &str) -> Result<Datum, Error> {
    let output = interp.output();
    output
        .write_all(text.as_bytes())
        .and_then(|()| output.flush())
        .map_err(|e| io_error(args, "the output", &e))?;
    Ok(Datum::Void)
}

fn builtin_write(interp: &mut Interpreter, _env: &Environment, args: Args) -> Result<Datum, Error> {
    let text = args.get(0)?.write();
    emit(interp, &args, &text)
}

fn builtin_display(interp: &mut Interpreter, _env: &Environment, args: Args) -> Result<Datum, Error> {
    let text = args.get(0)?.display();
    emit(interp, &args, &text)
}

fn builtin_newline(interp: &mut Interpreter, _env: &Environment, args: Args) -> Result<Datum, Error> {
    emit(interp, &args, "\n")
}

/// Read one datum from stdin, taking more lines while the datum is incomplete
fn builtin_read(args: Args) -> Result<Datum, Error> {
    let mut buffer = String::new();
    let mut stdin = io::stdin().lock();
    loop {
        let bytes = stdin
            .read_line(&mut buffer)
            .map_err(|e| io_error(&args, "stdin", &e))?;
        if bytes == 0 {
            return Ok(Datum::Void);
        }
        match read(&buffer) {
            Ok((datum, _)) => return Ok(datum),
            Err(e) if e.is_incomplete() => {}
            Err(e) => return Err(e),
        }
    }
}

/// `(read-string text)` returns `(datum . rest)` with the rest trimmed
fn builtin_read_string(args: Args) -> Result<Datum, Error> {
    let text = args.text(0)?;
    if text.trim().is_empty() {
        return Ok(Datum::Void);
    }
    let (datum, consumed) = read(text)?;
    let rest = text.get(consumed..).unwrap_or_default().trim();
    Ok(Datum::cons(datum, Datum::text(rest)))
}

fn builtin_exit(args: Args) -> Result<Datum, Error> {
    let code = if args.is_empty() { 0 } else { args.integer(0)? };
    let code = i32::try_from(code).map_err(|_| args.arg_error(0, "a valid exit code"))?;
    Err(Error::Exit(code))
}

fn read_source(args: &Args) -> Result<String, Error> {
    let path = args.text(0)?;
    fs::read_to_string(path).map_err(|e| io_error(args, format_args!("file {path}"), &e))
}

fn builtin_file_read(args: Args) -> Result<Datum, Error> {
    read_program(&read_source(&args)?)
}

fn builtin_file_read_string(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Text(read_source(&args)?))
}

fn write_file(args: &Args, contents: &str) -> Result<Datum, Error> {
    let path = args.text(0)?;
    fs::write(path, contents).map_err(|e| io_error(args, format_args!("file {path}"), &e))?;
    Ok(Datum::Void)
}

fn builtin_file_write(args: Args) -> Result<Datum, Error> {
    write_file(&args, &args.get(1)?.write())
}

fn builtin_file_display(args: Args) -> Result<Datum, Error> {
    write_file(&args, &args.get(1)?.display())
}

/// `#t` if a file or empty directory was removed, `#f` if nothing was there
fn builtin_file_delete(args: Args) -> Result<Datum, Error> {
    let path = Path::new(args.text(0)?);
    let removed = if path.is_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    };
    match removed {
        Ok(()) => Ok(Datum::Boolean(true)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Datum::Boolean(false)),
        Err(e) => Err(io_error(&args, format_args!("file {}", path.display()), &e)),
    }
}

fn builtin_is_file(args: Args) -> Result<Datum, Error> {
    Ok(Datum::Boolean(Path::new(args.text(0)?).exists()))
}

/// Evaluate a source file in the calling environment
fn builtin_load(interp: &mut Interpreter, env: &Environment, args: Args) -> Result<Datum, Error> {
    interp.load_file(args.text(0)?, env)
}

pub(super) static OPS: &[BuiltinOp] = &[
    // Equality and types
    BuiltinOp::pure("eq?", Arity::AtLeast(1), builtin_eq),
    BuiltinOp::pure("equal?", Arity::AtLeast(1), builtin_equal),
    BuiltinOp::pure("typeof", Arity::Exact(1), builtin_typeof),
    BuiltinOp::pure("void?", Arity::Exact(1), builtin_is_void),
    BuiltinOp::pure("boolean?", Arity::Exact(1), builtin_is_boolean),
    BuiltinOp::pure("procedure?", Arity::Exact(1), builtin_is_procedure),
    BuiltinOp::pure("symbol?", Arity::Exact(1), builtin_is_symbol),
    // Utility
    BuiltinOp::pure("not", Arity::Exact(1), builtin_not),
    BuiltinOp::pure("void", Arity::AtLeast(0), builtin_void),
    BuiltinOp::pure("copy", Arity::Exact(1), builtin_copy),
    BuiltinOp::pure("error", Arity::AtLeast(1), builtin_error),
    BuiltinOp::contextual("force", Arity::Exact(1), builtin_force),
    BuiltinOp::contextual("apply", Arity::Exact(2), builtin_apply),
    BuiltinOp::contextual("eval", Arity::Exact(1), builtin_eval),
    // Functional
    BuiltinOp::contextual("compose", Arity::AtLeast(1), builtin_compose),
    BuiltinOp::contextual("bind", Arity::AtLeast(1), builtin_bind),
    BuiltinOp::pure("id", Arity::Exact(1), builtin_id),
    // Console
    BuiltinOp::contextual("write", Arity::Exact(1), builtin_write),
    BuiltinOp::contextual("display", Arity::Exact(1), builtin_display),
    BuiltinOp::contextual("newline", Arity::Exact(0), builtin_newline),
    BuiltinOp::pure("read", Arity::Exact(0), builtin_read),
    BuiltinOp::pure("read-string", Arity::Exact(1), builtin_read_string),
    // System
    BuiltinOp::pure("exit", Arity::Range(0, 1), builtin_exit),
    BuiltinOp::pure("file-read", Arity::Exact(1), builtin_file_read),
    BuiltinOp::pure("file-read-string", Arity::Exact(1), builtin_file_read_string),
    BuiltinOp::pure("file-write", Arity::Exact(2), builtin_file_write),
    BuiltinOp::pure("file-display", Arity::Exact(2), builtin_file_display),
    BuiltinOp::pure("file-delete!", Arity::Exact(1), builtin_file_delete),
    BuiltinOp::pure("file?", Arity::Exact(1), builtin_is_file),
    BuiltinOp::contextual("load", Arity::Exact(1), builtin_load),
];

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use std::cell::RefCell;
    use std::io::Write;
    use std::path::PathBuf;
    use std::rc::Rc;

    use crate::Error;
    use crate::ast::{Datum, sym, val};
    use crate::builtinops::tests::*;
    use crate::evaluator::Interpreter;

    /// Output sink whose contents stay readable after the interpreter takes it
    #[derive(Clone, Default)]
    struct Captured(Rc<RefCell<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    /// A path in the temp directory unique to this test process
    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("treelisp-{}-{name}", std::process::id()))
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_system_operations_data_driven() {
        let test_cases = vec![
            // === EQUALITY ===
            ("(eq? 'a 'a)", success(true)),
            ("(eq? \"a\" \"a\")", success(true)),
            ("(eq? '(1) '(1))", success(false)),
            ("(equal? '(1 (2)) '(1 (2)))", success(true)),
            ("(begin (define x '(1)) (eq? x x x))", success(true)),
            ("(eq? 1 1 2)", success(false)),
            ("(equal? 1)", success(true)),
            ("(eq? '() '())", success(true)),
            ("(eq? '() #f)", success(false)),
            ("(eq? car car)", success(true)),
            ("(eq?)", SpecificError("expects at least 1 argument(s), got 0")),
            // === TYPES ===
            ("(typeof 1)", success(sym("number"))),
            ("(typeof \"s\")", success(sym("string"))),
            ("(typeof 'a)", success(sym("symbol"))),
            ("(typeof '())", success(sym("nil"))),
            ("(typeof '(1))", success(sym("pair"))),
            ("(typeof #f)", success(sym("boolean"))),
            ("(typeof car)", success(sym("procedure"))),
            ("(typeof (lambda () 1))", success(sym("procedure"))),
            ("(typeof and)", success(sym("macro"))),
            ("(typeof (void))", success(sym("void"))),
            ("(void? (if #f #f))", success(true)),
            ("(void? '())", success(false)),
            ("(boolean? #f)", success(true)),
            ("(boolean? '())", success(false)),
            ("(procedure? car)", success(true)),
            ("(procedure? (lambda (x) x))", success(true)),
            ("(procedure? and)", success(false)),
            ("(symbol? 'a)", success(true)),
            ("(symbol? \"a\")", success(false)),
            // === UTILITY ===
            ("(not #f)", success(true)),
            ("(not '())", success(false)),
            ("(not 0)", success(false)),
            ("(void 1 2)", Written("#<void>")),
            ("(id 5)", success(5)),
            ("(begin (define p '(1 2)) (define q (copy p)) (list (equal? p q) (eq? p q)))", success([true, false])),
            ("(error \"bad thing:\" 42 'x \"s\")", SpecificError("EvaluationError: bad thing: 42 x s")),
            ("(force (lambda () 7))", success(7)),
            ("(begin (define n 0) (define p (delay (begin (set! n (+ n 1)) n))) (force p) (force p) n)", success(1)),
            ("(force 5)", SpecificError("'force 1st arg 5 of type \"number\" isn't a procedure")),
            ("(apply + '(1 2 3))", success(6)),
            ("(apply + '())", SpecificError("expects at least 1 argument(s)")),
            ("(apply car '(1 2))", SpecificError("expects exactly 1 argument(s), got 2")),
            ("(apply + 5)", SpecificError("isn't a list")),
            ("(eval '(+ 1 2))", success(3)),
            ("(eval 'car)", Written("#<procedure car>")),
            ("((lambda (x) (eval 'x)) 9)", success(9)),
            // === FUNCTIONAL ===
            ("((compose (lambda (x) (* x 2)) +) 1 2 3)", success(12)),
            ("((compose car cdr cdr) '(1 2 3))", success(3)),
            ("((compose list) 1 2)", success([1, 2])),
            ("(compose 1)", SpecificError("isn't a procedure")),
            ("((bind list 1 2) 3 4)", success([1, 2, 3, 4])),
            ("((bind list '(a b)) 'c)", success(val(vec![val(vec![sym("a"), sym("b")]), sym("c")]))),
            ("((bind +))", SpecificError("expects at least 1 argument(s)")),
            // === STRINGS AS INPUT ===
            ("(read-string \"(1 2) rest of it  \")", success(Datum::cons(val([1, 2]), val("rest of it")))),
            ("(read-string \"42\")", success(Datum::cons(val(42), val("")))),
            ("(read-string \"   \")", Written("#<void>")),
            ("(read-string \"(1 2\")", SpecificError("Incomplete input")),
            // === EXIT ===
            ("(exit 1.5)", SpecificError("isn't an integer")),
        ];

        run_builtin_tests(test_cases);
    }

    #[test]
    fn test_exit_codes() {
        let mut interp = Interpreter::new();
        assert_eq!(interp.eval_str("(exit)"), Err(Error::Exit(0)));
        assert_eq!(interp.eval_str("(exit 3)"), Err(Error::Exit(3)));
        assert!(matches!(
            interp.eval_str("(exit 1e12)"),
            Err(Error::TypeError(_))
        ));
    }

    #[test]
    fn test_console_output() {
        let captured = Captured::default();
        let mut interp = Interpreter::new().with_output(captured.clone());

        let result = interp
            .eval_str("(write \"a\\nb\") (newline) (display \"a\") (display '(1 \"x\")) (write 'sym)")
            .unwrap();
        assert!(result.is_eq(&Datum::Void));
        assert_eq!(captured.text(), "\"a\\nb\"\na(1 x)sym");
    }

    #[test]
    fn test_file_operations() {
        let path = scratch_path("file-ops.scm");
        let path_text = path.display().to_string();
        let mut interp = Interpreter::new().with_output(std::io::sink());
        interp.eval_str(&format!("(define path {})", val(path_text.as_str()))).unwrap();

        let results = interp
            .eval_str(
                "(list (file? path)
                       (begin (file-write path '(define loaded \"yes\")) (file? path))
                       (file-read-string path)
                       (file-read path))",
            )
            .unwrap();
        assert_eq!(results.write(), "(#f #t \"(define loaded \\\"yes\\\")\" (define loaded \"yes\"))");

        // load evaluates in the calling environment
        let loaded = interp
            .eval_str("((lambda () (load path) loaded))")
            .unwrap();
        assert_eq!(loaded, val("yes"));
        assert!(!interp.global().is_bound("loaded"));

        interp.eval_str("(file-display path \"plain text\")").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "plain text");

        let deleted = interp.eval_str("(list (file-delete! path) (file-delete! path) (file? path))").unwrap();
        assert_eq!(deleted, val([true, false, false]));

        let missing = interp.eval_str("(file-read-string path)").unwrap_err();
        assert!(missing.to_string().contains("'file-read-string can't access file"), "{missing}");
    }
}
