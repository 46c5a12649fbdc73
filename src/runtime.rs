//! Runtime object model shared by the evaluator, builtins and host bridge.
//!
//! This module contains `Value`, the callable and indexable protocols, and
//! the user-level objects they are implemented by.
pub mod callable;
pub mod class;
pub mod deferred;
pub mod dict;
pub mod function;
pub mod indexable;
pub mod list;
pub mod value;

pub use callable::{Arity, Callable, NativeFunction};
pub use class::{Class, Instance};
pub use deferred::Deferred;
pub use dict::Dict;
pub use function::UserFunction;
pub use indexable::Indexable;
pub use list::List;
pub use value::Value;
