//! Embedding session.
//!
//! `Monty` owns one interpreter and runs source text through the full
//! pipeline. Static errors are collected and reported together; a runtime
//! error ends the run. Execution state survives between runs until
//! [`Monty::reset`].

use std::io;
use std::rc::Rc;
use std::sync::Arc;

use tokio::task::LocalSet;

use crate::error::{MontyError, Reporter, RuntimeError, StaticError, TracingReporter};
use crate::ffi::HostValue;
use crate::interpreter::{Interpreter, PauseControl};
use crate::lexer::tokenize;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::runtime::{Arity, NativeFunction, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Lexing, parsing or resolution failed; nothing was evaluated.
    StaticErrors(Vec<StaticError>),
    RuntimeError(RuntimeError),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

pub struct Monty {
    interpreter: Interpreter,
    reporter: Rc<dyn Reporter>,
    /// Expression ids keep growing across runs so resolution tables merge.
    next_id: u32,
    had_error: bool,
    had_runtime_error: bool,
}

impl Default for Monty {
    fn default() -> Self {
        Self::new()
    }
}

impl Monty {
    pub fn new() -> Self {
        Self::with_reporter(Rc::new(TracingReporter))
    }

    pub fn with_reporter(reporter: Rc<dyn Reporter>) -> Self {
        Self {
            interpreter: Interpreter::new(),
            reporter,
            next_id: 0,
            had_error: false,
            had_runtime_error: false,
        }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Runs `source`. Must be polled inside a [`LocalSet`].
    pub async fn run(&mut self, source: &str) -> Outcome {
        let scanned = tokenize(source);
        let parsed = Parser::starting_at(scanned.tokens, self.next_id).parse();
        self.next_id = parsed.next_id;

        if scanned.errors.is_empty() && !parsed.has_errors() {
            let statements = parsed.into_statements();
            let resolution = Resolver::new().resolve(&statements);
            if resolution.has_errors() {
                return self.fail_static(resolution.errors);
            }

            let interpreter = self.interpreter.clone();
            interpreter.resolve(resolution);
            return match interpreter.interpret(&statements).await {
                Ok(()) => Outcome::Completed,
                Err(error) => {
                    tracing::debug!(%error, "run aborted");
                    self.had_runtime_error = true;
                    self.reporter.report(&MontyError::Runtime(error.clone()));
                    Outcome::RuntimeError(error)
                }
            };
        }

        let mut errors = scanned.errors;
        errors.extend(parsed.errors);
        self.fail_static(errors)
    }

    fn fail_static(&mut self, errors: Vec<StaticError>) -> Outcome {
        self.had_error = true;
        for error in &errors {
            self.reporter.report(&MontyError::Static(error.clone()));
        }
        Outcome::StaticErrors(errors)
    }

    /// Runs `source` on a private current-thread runtime, then waits for any
    /// async bodies it left running.
    pub fn run_blocking(&mut self, source: &str) -> io::Result<Outcome> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let local = LocalSet::new();
        let outcome = local.block_on(&runtime, self.run(source));
        runtime.block_on(local);
        Ok(outcome)
    }

    pub fn register(&mut self, name: impl Into<String>, value: Value) {
        self.interpreter.register(name, value);
    }

    pub fn register_host(&mut self, name: impl Into<String>, value: HostValue) {
        self.interpreter.register_host(name, value);
    }

    pub fn register_native(
        &mut self,
        name: &str,
        arity: Arity,
        function: impl Fn(&Interpreter, Vec<Value>) -> Result<Value, RuntimeError> + 'static,
    ) {
        let function = NativeFunction::new(name, arity, function);
        self.interpreter.register(name, Value::Callable(function));
    }

    pub fn stop(&self) {
        self.interpreter.stop();
    }

    pub fn resume(&self) {
        self.interpreter.resume();
    }

    /// Handle for stopping and resuming from another thread.
    pub fn control(&self) -> Arc<PauseControl> {
        self.interpreter.control()
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    pub fn had_runtime_error(&self) -> bool {
        self.had_runtime_error
    }

    pub fn clear_error(&mut self) {
        self.had_error = false;
    }

    /// Drops globals, registrations and resolved scopes, then re-seeds the
    /// builtins. The pause control is kept so outside handles stay valid.
    pub fn reset(&mut self) {
        tracing::debug!("resetting session");
        self.interpreter = Interpreter::with_control(self.interpreter.control());
        self.had_error = false;
        self.had_runtime_error = false;
    }
}
