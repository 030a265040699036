use racketlite::ast::{Expr, Value};
use racketlite::evaluator::Environment;
use racketlite::splitter::{is_balanced, paren_balance};
use racketlite::{Error, Interpreter};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;
use tracing_subscriber::EnvFilter;

const PROMPT: &str = "racketlite> ";
const CONTINUATION_PROMPT: &str = "      ...> ";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

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

fn run_repl() {
    println!("RacketLite strictly typed S-expression evaluator");
    println!("Enter expressions like: (+ 1 2) or (boolean->string #t)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            return;
        }
    };
    let mut interpreter = Interpreter::new();
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() {
            PROMPT
        } else {
            CONTINUATION_PROMPT
        };

        match rl.readline(prompt) {
            Ok(line) => {
                if pending.is_empty() {
                    let command = line.trim();
                    if command.is_empty() {
                        continue;
                    }
                    if command.starts_with(':') {
                        let _ = rl.add_history_entry(command);
                        if !run_command(command, &mut interpreter) {
                            println!("Goodbye!");
                            break;
                        }
                        continue;
                    }
                }

                // Accumulate lines until the parentheses balance
                pending.push_str(&line);
                pending.push('\n');
                if !is_balanced(&pending) {
                    if paren_balance(&pending) < 0 {
                        println!("; unbalanced parentheses: too many ')'");
                        pending.clear();
                    }
                    continue;
                }

                let input = std::mem::take(&mut pending);
                let _ = rl.add_history_entry(input.trim());
                print_results(interpreter.run_program(&input));
            }

            Err(ReadlineError::Interrupted) => {
                // Ctrl+C abandons a partially entered expression
                if !pending.is_empty() {
                    pending.clear();
                    continue;
                }
                println!("Goodbye!");
                break;
            }
            Err(ReadlineError::Eof) => {
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

/// Handle a `:command`. Returns false when the loop should end.
fn run_command(command: &str, interpreter: &mut Interpreter) -> bool {
    let (name, argument) = match command.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (command, ""),
    };

    match name {
        ":help" => print_help(),
        ":env" => print_environment(interpreter.environment()),
        ":tree" => match interpreter.tree(argument) {
            Some(expr) => println!("{expr:#?}"),
            None => println!("; no expression matches '{argument}'"),
        },
        ":load" => match std::fs::read_to_string(argument) {
            Ok(source) => print_results(interpreter.run_program(&source)),
            Err(err) => println!("; cannot read '{argument}': {err}"),
        },
        ":quit" | ":exit" => return false,
        _ => println!("; unknown command {name}, try :help"),
    }
    true
}

fn print_results(results: Result<Vec<Value>, Error>) {
    match results {
        Ok(values) => {
            // Definitions produce no output
            for value in values.iter().filter(|v| !matches!(v, Value::Unspecified)) {
                println!("{value}");
            }
        }
        Err(err) => {
            for line in err.to_string().lines() {
                println!("; {}", line.trim_start());
            }
        }
    }
}

fn print_help() {
    println!("RacketLite commands:");
    println!("  :help         - Show this help message");
    println!("  :env          - Show user-defined functions");
    println!("  :tree <expr>  - Show the expression tree without evaluating");
    println!("  :load <file>  - Evaluate every expression in a file");
    println!("  :quit, :exit  - Exit the interpreter");
    println!("  Ctrl+C        - Abandon a multi-line expression");
    println!("  Ctrl+D        - Exit the interpreter");
    println!();
    println!("Expressions may span several lines; input runs once parentheses balance.");
    println!();
    println!("Supported operations:");
    println!("  Numbers: 42, -5, 1.5, 1/3, #xff, #e1.5, #i2");
    println!("  Arithmetic: + - * / add1 sub1 abs quotient remainder modulo expt sqrt");
    println!("  Real-only (inexact): sin cos tan asin acos atan exp log");
    println!("  Comparison: = < > <= >=");
    println!("  Logic: and or not boolean=?");
    println!("  Strings: string-append string-length substring string=? string<?");
    println!("  Conversion: boolean->string number->string string->number");
    println!("  Definitions: (define name expr), (define (name param ...) body)");
    println!("  Conditionals: (if test then else)");
    println!();
    println!("Examples:");
    println!("  (<= 1 2 3)");
    println!("  (cos 0)");
    println!("  (define (fact n) (if (<= n 1) 1 (* n (fact (sub1 n)))))");
    println!("  (fact 10)");
    println!();
}

fn print_environment(env: &Environment) {
    let functions = env.functions();

    if functions.is_empty() {
        println!("No user-defined functions.");
        return;
    }

    println!("User-defined functions ({} total):", functions.len());
    for function in functions {
        // Constants are stored as their evaluated literal
        if matches!(*function.body, Expr::Literal(_)) && function.params.is_empty() {
            println!("  {} = {}", function.name, function.body);
        } else {
            let mut signature = function.name.clone();
            for param in &function.params {
                signature.push(' ');
                signature.push_str(param);
            }
            println!("  ({signature}) = {}", function.body);
        }
    }
}
