use std::ffi::OsString;
use std::path::PathBuf;
use std::{env, panic, process, thread};

use malxp::ast::{Value, sym};
use malxp::evaluator::{self, Environment};
use malxp::{Error, ParseError, ParseErrorKind, reader};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Initial stack for the interpreter thread; evaluation grows it further on demand
const REPL_STACK_SIZE: usize = 256 * 1024 * 1024;

const DEFAULT_HISTORY_FILE: &str = ".malxp_history";
const HISTORY_ENV_VAR: &str = "MALXP_HISTORY";
const PROMPT: &str = "user> ";

/// Session settings assembled from the command line and environment
#[derive(Debug, Clone, PartialEq)]
struct ReplConfig {
    /// Script to load instead of starting an interactive session
    script: Option<String>,
    /// Arguments after the script path, bound to `*ARGV*`
    script_args: Vec<String>,
    prompt: String,
    history_file: PathBuf,
    stack_size: usize,
}

impl ReplConfig {
    fn from_env() -> Self {
        Self::from_parts(env::args().skip(1), env::var_os(HISTORY_ENV_VAR))
    }

    fn from_parts(mut args: impl Iterator<Item = String>, history: Option<OsString>) -> Self {
        let script = args.next();
        ReplConfig {
            script,
            script_args: args.collect(),
            prompt: PROMPT.to_owned(),
            history_file: history.map_or_else(|| PathBuf::from(DEFAULT_HISTORY_FILE), PathBuf::from),
            stack_size: REPL_STACK_SIZE,
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    init_logging();
    let config = ReplConfig::from_env();

    let worker = thread::Builder::new()
        .name("malxp".to_owned())
        .stack_size(config.stack_size)
        .spawn(move || panic::catch_unwind(move || run(config)));

    let outcome = match worker {
        Ok(handle) => handle.join().and_then(std::convert::identity),
        Err(err) => {
            eprintln!("Could not start the interpreter thread: {err}");
            process::exit(1);
        }
    };

    match outcome {
        Ok(code) => process::exit(code),
        Err(panic_info) => {
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
}

/// Run a script or an interactive session, returning the process exit code
fn run(config: ReplConfig) -> i32 {
    let env = evaluator::create_global_env();
    let argv = config.script_args.iter().map(|arg| Value::from(arg.as_str())).collect();
    env.set("*ARGV*", Value::list(argv));
    env.set("*host-language*", Value::from("rust"));

    match &config.script {
        Some(script) => run_script(script, &env),
        None => run_repl(&config, &env),
    }
}

fn run_script(path: &str, env: &Environment) -> i32 {
    let form = Value::list(vec![sym("load-file"), Value::from(path)]);
    match evaluator::eval(&form, env) {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}

fn run_repl(config: &ReplConfig, env: &Environment) -> i32 {
    println!("malxp - make-a-lisp interpreter");
    println!("Enter forms like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            return 1;
        }
    };

    if let Err(err) = rl.load_history(&config.history_file) {
        debug!(%err, path = %config.history_file.display(), "no history loaded");
    }

    loop {
        match rl.readline(&config.prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(env);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                match eval_line(line, env) {
                    Ok(result) => println!("{result}"),
                    // Comment-only lines
                    Err(Error::ParseError(ParseError {
                        kind: ParseErrorKind::NoForm,
                        ..
                    })) => {}
                    Err(e) => println!("Error: {e}"),
                }
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }

    if let Err(err) = rl.save_history(&config.history_file) {
        debug!(%err, path = %config.history_file.display(), "history not saved");
    }

    0
}

/// Evaluate the first form on an interactive line
fn eval_line(line: &str, env: &Environment) -> Result<Value, Error> {
    evaluator::eval(&reader::read_first(line)?, env)
}

fn print_help() {
    println!("malxp commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Special forms:");
    println!("  def! let* do if fn* quote quasiquote quasiquoteexpand defmacro! macroexpand");
    println!();
    println!("Reader shorthands:");
    println!("  'x => (quote x)   `x => (quasiquote x)   ~x => (unquote x)");
    println!("  ~@x => (splice-unquote x)   @a => (deref a)");
    println!();
    println!("Examples:");
    println!("  (def! inc (fn* (x) (+ x 1)))");
    println!("  (let* [a 1 b (inc a)] (list a b))");
    println!("  (defmacro! unless (fn* (p a b) `(if ~p ~b ~a)))");
    println!("  (def! counter (atom 0))");
    println!("  (swap! counter inc)");
    println!("  (load-file \"script.mal\")");
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

    // Separate built-in functions from user-defined values
    let (builtins, user_defined): (Vec<_>, Vec<_>) = bindings
        .into_iter()
        .partition(|(_, value)| matches!(value, Value::BuiltinFunction { .. }));

    if !builtins.is_empty() {
        println!("Built-in functions ({}):", builtins.len());
        for row in builtins.chunks(4) {
            let names: String = row.iter().map(|(name, _)| format!("  {name:<15}")).collect();
            println!("{}", names.trim_end());
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
