use std::rc::Rc;

use crate::ast::FunctionDecl;
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::interpreter::environment::{Env, Environment};
use crate::interpreter::{EvalFuture, ExecResult, Interpreter};
use crate::runtime::callable::{Arity, Callable};
use crate::runtime::class::Instance;
use crate::runtime::deferred::Deferred;
use crate::runtime::value::Value;

/// A `def` (or `async def`) together with the frame it closes over.
pub struct UserFunction {
    decl: Rc<FunctionDecl>,
    closure: Env,
    is_initializer: bool,
    is_method: bool,
}

impl UserFunction {
    pub fn new(decl: Rc<FunctionDecl>, closure: Env, is_initializer: bool, is_method: bool) -> Self {
        Self {
            decl,
            closure,
            is_initializer,
            is_method,
        }
    }

    /// Returns a copy whose closure binds `self` to `instance`.
    pub fn bind(&self, instance: Rc<Instance>) -> Rc<UserFunction> {
        let closure = Environment::child(&self.closure);
        closure.define("self", Value::Instance(instance));
        Rc::new(Self {
            decl: self.decl.clone(),
            closure,
            is_initializer: self.is_initializer,
            is_method: self.is_method,
        })
    }

    pub fn is_async(&self) -> bool {
        self.decl.is_async
    }

    async fn invoke(&self, interpreter: &Interpreter, arguments: Vec<Value>) -> Result<Value, RuntimeError> {
        let env = Environment::child(&self.closure);
        let mut params = self.decl.params.iter();
        if self.is_method {
            match params.next() {
                Some(param) if param.lexeme == "self" => {
                    env.define("self", self.closure.get_at(0, "self")?);
                }
                _ => return Err(RuntimeErrorKind::MissingSelf.into()),
            }
        }
        for (param, argument) in params.zip(arguments) {
            env.define(param.lexeme.clone(), argument);
        }

        let result = interpreter.execute_block(&self.decl.body, &env).await?;
        if self.is_initializer {
            return self.closure.get_at(0, "self");
        }
        match result {
            ExecResult::Return(value) => Ok(value),
            ExecResult::Continue => Ok(Value::None),
        }
    }
}

impl Callable for UserFunction {
    fn name(&self) -> &str {
        &self.decl.name.lexeme
    }

    /// Methods do not count their leading `self`.
    fn arity(&self) -> Arity {
        let params = self.decl.params.len();
        Arity::Exact(if self.is_method { params.saturating_sub(1) } else { params })
    }

    fn call<'a>(
        self: Rc<Self>,
        interpreter: &'a Interpreter,
        arguments: Vec<Value>,
    ) -> EvalFuture<'a, Value> {
        if self.decl.is_async {
            let interpreter = interpreter.clone();
            let deferred =
                Deferred::spawn(async move { self.invoke(&interpreter, arguments).await });
            return Box::pin(std::future::ready(Ok(Value::Deferred(deferred))));
        }
        Box::pin(async move { self.invoke(interpreter, arguments).await })
    }
}
