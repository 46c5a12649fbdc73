use std::fmt;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::interpreter::{EvalFuture, Interpreter};
use crate::runtime::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Variadic,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(expected) => expected == count,
            Arity::Variadic => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(count) => write!(f, "{count}"),
            Arity::Variadic => write!(f, "variadic"),
        }
    }
}

/// Anything the language can call: user functions, classes, builtins and
/// bridged host functions.
pub trait Callable {
    fn name(&self) -> &str;

    fn arity(&self) -> Arity;

    /// Arity has already been checked by the caller.
    fn call<'a>(
        self: Rc<Self>,
        interpreter: &'a Interpreter,
        arguments: Vec<Value>,
    ) -> EvalFuture<'a, Value>;
}

type NativeFn = dyn Fn(&Interpreter, Vec<Value>) -> Result<Value, RuntimeError>;

/// A builtin implemented in Rust that completes without suspending.
pub struct NativeFunction {
    name: String,
    arity: Arity,
    function: Box<NativeFn>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        arity: Arity,
        function: impl Fn(&Interpreter, Vec<Value>) -> Result<Value, RuntimeError> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            arity,
            function: Box::new(function),
        })
    }
}

impl Callable for NativeFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> Arity {
        self.arity
    }

    fn call<'a>(
        self: Rc<Self>,
        interpreter: &'a Interpreter,
        arguments: Vec<Value>,
    ) -> EvalFuture<'a, Value> {
        let result = (self.function)(interpreter, arguments);
        Box::pin(std::future::ready(result))
    }
}
