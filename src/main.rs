use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use monty::builtins;
use monty::error::StderrReporter;
use monty::{Monty, Outcome, Value};

const EXIT_STATIC_ERROR: u8 = 65;
const EXIT_RUNTIME_ERROR: u8 = 70;

/// Run a Monty script, or start a REPL when no script is given.
#[derive(Parser, Debug)]
#[command(name = "monty", version, about, long_about = None)]
struct Cli {
    /// Script to run.
    script: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `monty=trace`. Overrides RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    let mut monty = Monty::with_reporter(Rc::new(StderrReporter));
    monty.register(
        "print",
        Value::Callable(builtins::print(|line| println!("{line}"))),
    );
    monty.register("clock", Value::Callable(builtins::clock()));
    monty.register_host("console", builtins::console(|line| println!("{line}")));

    match cli.script {
        Some(path) => run_file(&mut monty, &path),
        None => {
            repl(&mut monty)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).with_context(|| format!("Invalid log level '{level}'"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn run_file(monty: &mut Monty, path: &Path) -> Result<ExitCode> {
    let source =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let outcome = monty
        .run_blocking(&source)
        .context("Starting the async runtime")?;
    let code = match outcome {
        Outcome::Completed => ExitCode::SUCCESS,
        Outcome::StaticErrors(_) => ExitCode::from(EXIT_STATIC_ERROR),
        Outcome::RuntimeError(_) => ExitCode::from(EXIT_RUNTIME_ERROR),
    };
    Ok(code)
}

fn repl(monty: &mut Monty) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush().context("Flushing stdout")?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("Reading stdin")?;
        monty
            .run_blocking(&format!("{line}\n"))
            .context("Starting the async runtime")?;
        monty.clear_error();
    }
    Ok(())
}
