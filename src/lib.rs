pub mod ast;
pub mod builtins;
pub mod error;
pub mod ffi;
pub mod interpreter;
pub mod lexer;
pub mod monty;
pub mod parser;
pub mod resolver;
pub mod runtime;
pub mod token;

pub use error::{MontyError, Reporter, RuntimeError, StaticError};
pub use ffi::{HostMap, HostObject, HostValue};
pub use interpreter::{Interpreter, PauseControl};
pub use monty::{Monty, Outcome};
pub use runtime::Value;
