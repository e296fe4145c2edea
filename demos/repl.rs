use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;
use std::sync::Once;
use tracing::debug;
use treelisp::Error;
use treelisp::ast::Datum;
use treelisp::evaluator::{Environment, Interpreter, ProcedureKind};
use treelisp::scheme::read;

static TRACING_INIT: Once = Once::new();

/// Install a stderr subscriber when `RUST_LOG` is set, e.g. `RUST_LOG=treelisp=trace`
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}

fn main() {
    init_tracing();

    let result = panic::catch_unwind(|| {
        run(std::env::args().skip(1).collect());
    });

    if let Err(panic_info) = result {
        eprintln!("The interpreter encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

/// `repl` starts a session, `repl FILE ARGS...` runs a script,
/// `repl -l FILE ARGS...` loads a script and then starts a session
fn run(args: Vec<String>) {
    let mut interp = Interpreter::new();

    let (into_repl, script) = match args.split_first() {
        None => (true, None),
        Some((flag, rest)) if flag == "-l" => match rest.split_first() {
            Some(script) => (true, Some(script)),
            None => {
                eprintln!("ERROR: No filename given to load into the REPL!");
                process::exit(1);
            }
        },
        Some(script) => (false, Some(script)),
    };

    let argv: Vec<Datum> = script.map_or_else(Vec::new, |(_, rest)| {
        rest.iter().cloned().map(Datum::Text).collect()
    });
    interp.global().define("*argv*", Datum::list(argv));

    if let Some((filename, _)) = script {
        let global = interp.global().clone();
        if let Err(e) = interp.load_file(filename, &global) {
            report(&mut interp, &e);
            process::exit(1);
        }
    }

    if into_repl {
        run_repl(&mut interp);
    }
}

fn run_repl(interp: &mut Interpreter) {
    println!("TreeLisp - a small tree-walking Lisp");
    println!("Enter expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Could not initialize REPL: {e}");
            process::exit(1);
        }
    };

    let mut buffer = String::new();

    loop {
        let prompt = if buffer.is_empty() { "treelisp> " } else { "      ... " };
        match rl.readline(prompt) {
            Ok(line) => {
                if buffer.is_empty() {
                    let command = line.trim();
                    if command.is_empty() {
                        continue;
                    }

                    // Handle special commands
                    match command {
                        ":help" => {
                            let _ = rl.add_history_entry(command);
                            print_help();
                            continue;
                        }
                        ":env" => {
                            let _ = rl.add_history_entry(command);
                            print_environment(interp.global());
                            continue;
                        }
                        ":quit" | ":exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        _ => {}
                    }
                }

                let _ = rl.add_history_entry(line.as_str());
                buffer.push_str(&line);
                buffer.push('\n');
                buffer = eval_buffer(interp, &buffer);
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

/// Evaluate every complete datum in `buffer` in order, printing each non-void result.
/// Returns the unread remainder when the last datum is still incomplete.
fn eval_buffer(interp: &mut Interpreter, buffer: &str) -> String {
    let mut rest = buffer;
    while !rest.trim().is_empty() {
        let datum = match read(rest) {
            Ok((datum, consumed)) => {
                rest = &rest[consumed..];
                datum
            }
            Err(e) if e.is_incomplete() => return rest.to_owned(),
            Err(e) => {
                report(interp, &e);
                return String::new();
            }
        };

        let global = interp.global().clone();
        match interp.eval(&global, &datum) {
            Ok(Datum::Void) => {}
            Ok(result) => println!("{}", result.write()),
            Err(e) => {
                report(interp, &e);
                return String::new();
            }
        }
    }
    String::new()
}

/// Print an error with the call stack that led to it, then clear the stack.
/// `exit` ends the process with its code.
fn report(interp: &mut Interpreter, error: &Error) {
    if let Error::Exit(code) = error {
        process::exit(*code);
    }

    debug!(%error, "error reached the driver");
    eprintln!("{error}");
    if let Some((outermost, rest)) = interp.call_stack().split_first() {
        eprintln!("CALL STACK: {outermost}");
        for frame in rest {
            eprintln!("            {frame}");
        }
    }
    interp.reset_call_stack();
}

fn print_help() {
    println!("TreeLisp commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show global environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Unfinished expressions continue on the next line.");
    println!();
    println!("Special forms: define, define-macro, set!, if, lambda, begin, quote");
    println!("Derived forms: and, or, cond, let, delay, quasiquote (`, ,, ,@)");
    println!();
    println!("Examples:");
    println!("  (define (square x) (* x x))");
    println!("  (map square '(1 2 3))");
    println!("  (let loop ((i 0)) (if (< i 3) (begin (display i) (loop (+ i 1)))))");
    println!("  `(1 ,(+ 1 1) ,@(list 3 4))");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate primitives from everything defined in the language
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match &value {
            Datum::Procedure(procedure)
                if matches!(procedure.kind(), ProcedureKind::Primitive(_)) =>
            {
                builtins.push(name);
            }
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-in procedures ({}):", builtins.len());
        // Print in columns for readability
        let mut col = 0;
        for name in builtins {
            print!("  {name:<20}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("Defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {}", value.write());
        }
    }
}
