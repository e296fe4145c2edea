//! End-to-end behavior of the language through the public embedding API.

#![expect(clippy::unwrap_used)] // test code OK

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use pretty_assertions::assert_eq;
use treelisp::ast::Datum;
use treelisp::evaluator::{Arity, Interpreter, InterpreterConfig};
use treelisp::scheme::read;
use treelisp::{Error, ReadErrorKind};

fn interpreter() -> Interpreter {
    Interpreter::new().with_output(io::sink())
}

/// Evaluate a program in a fresh interpreter and return the written result
fn written(source: &str) -> String {
    interpreter().eval_str(source).unwrap().write()
}

/// Output sink shared with the test after the interpreter takes ownership
#[derive(Clone, Default)]
struct Captured(Rc<RefCell<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn atoms_read_back_as_written() {
    let atoms = vec![
        Datum::from(42),
        Datum::from(-0.125),
        Datum::from(1e300),
        Datum::from(f64::NEG_INFINITY),
        Datum::from("tab\there \"quoted\" back\\slash"),
        Datum::from(""),
        Datum::from(true),
        Datum::from(false),
        Datum::symbol("list->string"),
        Datum::symbol("+"),
    ];
    for atom in atoms {
        let text = atom.write();
        let (back, consumed) = read(&text).unwrap();
        assert!(back.is_equal(&atom), "{text} read back as {back:?}");
        assert_eq!(consumed, text.len());
    }
}

#[test]
fn quoted_structure_is_fresh_on_every_evaluation() {
    assert_eq!(
        written("(define (f) '(1 2)) (list (equal? (f) (f)) (eq? (f) (f)))"),
        "(#t #f)"
    );
    // Mutating one result leaves the literal intact
    assert_eq!(
        written("(define (f) '(1 2)) (set-car! (f) 99) (f)"),
        "(1 2)"
    );
}

#[test]
fn macros_expand_in_their_scope_and_run_in_the_callers() {
    let mut interp = interpreter();
    interp
        .eval_str(
            "(define-macro (my-or e)
               (define helper 'inside-the-macro)
               (list 'if (cadr e) (cadr e) (caddr e)))",
        )
        .unwrap();

    assert_eq!(interp.eval_str("(my-or #f 5)").unwrap(), Datum::from(5));

    // The caller's helper is untouched by the transformer's own helper
    let result = interp
        .eval_str("(define helper 'caller) (my-or #f helper)")
        .unwrap();
    assert_eq!(result, Datum::symbol("caller"));

    // The expansion is evaluated where the macro is used
    assert_eq!(
        interp.eval_str("(let ((local 7)) (my-or #f local))").unwrap(),
        Datum::from(7)
    );
}

#[test]
fn quasiquote_builds_lists() {
    let cases = vec![
        ("`(1 ,(+ 1 1) ,@(list 3 4))", "(1 2 3 4)"),
        ("`(a `(b ,(+ 1 2)))", "(a (quasiquote (b (unquote (+ 1 2)))))"),
        ("`(a `(b ,,(+ 1 2)))", "(a (quasiquote (b (unquote 3))))"),
        ("(let ((x 5)) `(x . ,x))", "(x . 5)"),
        ("`(,@'() . tail)", "tail"),
        ("`atom", "atom"),
        ("`()", "()"),
    ];
    for (source, expected) in cases {
        assert_eq!(written(source), expected, "{source}");
    }
}

#[test]
fn variadic_closures_collect_the_rest() {
    assert_eq!(written("((lambda (a . rest) rest) 1 2 3)"), "(2 3)");
    assert_eq!(written("((lambda (a . rest) rest) 1)"), "()");
    assert_eq!(written("((lambda args args))"), "()");

    let error = interpreter()
        .eval_str("((lambda (a . rest) rest))")
        .unwrap_err();
    assert_eq!(
        error,
        Error::ArityError {
            procedure: "anonymous".to_owned(),
            expected: Arity::AtLeast(1),
            got: 0,
        }
    );
}

#[test]
fn pair_mutation_is_visible_through_every_alias() {
    assert_eq!(
        written("(define x (list 1 2)) (define y x) (set-car! x 9) (car y)"),
        "9"
    );
    assert_eq!(
        written("(define c (list 1 2)) (set-cdr! (cdr c) c) (list (list? c) (circular-list? c) c)"),
        "(#f #t (1 2 . ...))"
    );
}

#[test]
fn closures_observe_later_mutation() {
    assert_eq!(
        written("(let ((x 1)) (define g (lambda () x)) (set! x 2) (g))"),
        "2"
    );
    assert_eq!(
        written(
            "(define (counter)
               (define n 0)
               (lambda () (set! n (+ n 1)) n))
             (define a (counter))
             (define b (counter))
             (a) (a) (b)
             (list (a) (b))"
        ),
        "(3 2)"
    );
}

#[test]
fn reader_separates_incomplete_from_malformed() {
    let incomplete = ["(1 2", "\"open", "(a (b", "'", ""];
    for text in incomplete {
        let error = read(text).unwrap_err();
        assert!(error.is_incomplete(), "{text:?} gave {error}");
    }

    let malformed = [")", "(1 . )", "(. 1)", "(1 . 2 3)"];
    for text in malformed {
        match read(text).unwrap_err() {
            Error::ReadError(e) => assert_eq!(e.kind, ReadErrorKind::Malformed, "{text:?}"),
            other => panic!("{text:?} gave {other:?}"),
        }
    }
}

#[test]
fn derived_forms() {
    let cases = vec![
        ("(and 1 2 3)", "3"),
        ("(and 1 #f 3)", "#f"),
        ("(or #f '() 3)", "()"),
        ("(or)", "#f"),
        ("(cond ((> 1 2) 'a) ((assq 'b '((b 2)))) (else 'c))", "2"),
        ("(cond (#f 1))", "#<void>"),
        ("(let loop ((i 0) (acc '())) (if (= i 3) acc (loop (+ i 1) (cons i acc))))", "(2 1 0)"),
        ("(let () 5)", "5"),
        ("(define n 0) (define p (delay (begin (set! n (+ n 1)) n))) (list (force p) (force p) n)", "(1 1 1)"),
    ];
    for (source, expected) in cases {
        assert_eq!(written(source), expected, "{source}");
    }
}

#[test]
fn errors_carry_the_call_stack() {
    let mut interp = interpreter();
    let error = interp
        .eval_str(
            "(define (inner x) (car x))
             (define (outer x) (inner x))
             (outer 5)",
        )
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        "Type error: 'car 1st arg 5 of type \"number\" isn't a pair"
    );
    assert_eq!(interp.call_stack(), ["outer", "inner", "car"]);

    interp.reset_call_stack();
    assert!(interp.call_stack().is_empty());
    assert_eq!(interp.eval_str("(outer '(1))").unwrap(), Datum::from(1));
    assert!(interp.call_stack().is_empty());
}

#[test]
fn error_kinds() {
    let mut interp = interpreter();
    assert!(matches!(interp.eval_str("(5 1)"), Err(Error::ApplicationError(_))));
    assert!(matches!(interp.eval_str("(if)"), Err(Error::SyntaxError(_))));
    assert!(matches!(interp.eval_str("(lambda (1) 1)"), Err(Error::SyntaxError(_))));
    assert!(matches!(interp.eval_str("(set! nowhere 1)"), Err(Error::UnboundVariable(_))));
    assert!(matches!(interp.eval_str("(+ 'a 1)"), Err(Error::TypeError(_))));
    assert!(matches!(interp.eval_str("(error \"boom\")"), Err(Error::EvalError(_))));
    assert!(matches!(interp.eval_str("(exit 4)"), Err(Error::Exit(4))));
}

#[test]
fn runaway_recursion_is_a_recoverable_error() {
    let mut interp = interpreter();
    interp
        .eval_str("(define (deep n) (if (= n 0) 0 (+ 1 (deep (- n 1)))))")
        .unwrap();

    let error = interp.eval_str("(deep 100000)").unwrap_err();
    assert!(
        error.to_string().contains("Evaluation depth limit exceeded"),
        "{error}"
    );

    interp.reset_call_stack();
    assert_eq!(interp.eval_str("(deep 100)").unwrap(), Datum::from(100));
}

#[test]
fn releasing_a_huge_list_is_safe() {
    let mut interp = interpreter();
    let length = interp
        .eval_str(
            "(define (dbl l n) (if (= n 0) l (dbl (append l l) (- n 1))))
             (define big (dbl '(1) 21))
             (length big)",
        )
        .unwrap();
    assert_eq!(length, Datum::from(2_097_152));

    assert_eq!(interp.eval_str("(set! big '()) big").unwrap(), Datum::Nil);
    assert_eq!(written_in(&mut interp, "(dbl '(a) 2)"), "(a a a a)");
}

#[test]
fn output_goes_to_the_configured_sink() {
    let captured = Captured::default();
    let mut interp = Interpreter::new().with_output(captured.clone());
    interp
        .eval_str("(for-each (lambda (x) (display x) (newline)) '(1 \"two\" (3)))")
        .unwrap();
    let text = String::from_utf8(captured.0.borrow().clone()).unwrap();
    assert_eq!(text, "1\ntwo\n(3)\n");
}

#[test]
fn interpreters_are_independent() {
    let mut first = interpreter();
    let mut second = interpreter();
    first.eval_str("(define shared 1)").unwrap();
    assert!(matches!(
        second.eval_str("shared"),
        Err(Error::UnboundVariable(_))
    ));
}

#[test]
fn host_functions_join_the_global_environment() {
    let mut interp = interpreter();
    interp.register_builtin_function("host-sum", |_, _, args| {
        let mut total = 0.0;
        for arg in args {
            match arg {
                Datum::Number(n) => total += n,
                other => return Err(Error::TypeError(format!("not a number: {other}"))),
            }
        }
        Ok(Datum::Number(total))
    });

    assert_eq!(written_in(&mut interp, "(host-sum 1 2 3)"), "6");
    assert_eq!(written_in(&mut interp, "(map host-sum '(1 2) '(10 20))"), "(11 22)");
    assert_eq!(written_in(&mut interp, "host-sum"), "#<procedure host-sum>");
}

fn written_in(interp: &mut Interpreter, source: &str) -> String {
    interp.eval_str(source).unwrap().write()
}

#[test]
fn bare_interpreter_has_no_derived_forms() {
    let config = InterpreterConfig {
        load_prelude: false,
        ..InterpreterConfig::default()
    };
    let mut interp = Interpreter::with_config(config).unwrap();
    assert!(matches!(interp.eval_str("(and 1 2)"), Err(Error::UnboundVariable(_))));
    assert_eq!(interp.eval_str("(car '(1 2))").unwrap(), Datum::from(1));
}
