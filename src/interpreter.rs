//! Async tree-walking evaluator.
//!
//! `evaluate` and `execute` return boxed local futures so the recursion can
//! suspend at any `await` or pause point. The current environment is always
//! passed explicitly, never stored on the interpreter, because several async
//! bodies may be in flight at once.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::ast::{ClassDecl, Expr, ExprId, LiteralValue, Stmt};
use crate::builtins;
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::ffi::{Bridge, HostList, HostValue};
use crate::resolver::{FunctionScope, Resolution};
use crate::runtime::{Arity, Callable, Class, Dict, List, UserFunction, Value};
use crate::token::{Token, TokenKind};

pub mod control;
pub mod environment;

pub use control::PauseControl;
use environment::{Env, Environment};

pub type EvalFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RuntimeError>> + 'a>>;

/// Calls in flight at once, counted across every running async body.
pub const MAX_CALL_DEPTH: usize = 1000;

/// Each nested call polls several boxed futures on the native stack. Every
/// `CALLS_PER_TASK`-th call continues on a fresh local task so that stack
/// stays shallow however deep the language recursion goes.
const CALLS_PER_TASK: usize = 16;

/// How a statement finished: fell through, or hit `return`.
#[derive(Debug)]
pub enum ExecResult {
    Continue,
    Return(Value),
}

struct InterpreterState {
    globals: Env,
    locals: RefCell<FxHashMap<ExprId, usize>>,
    functions: RefCell<Vec<FunctionScope>>,
    control: Arc<PauseControl>,
    depth: Cell<usize>,
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl Drop for InterpreterState {
    fn drop(&mut self) {
        // Global functions close over the global frame.
        self.globals.clear();
    }
}

/// Cheap handle; clones share globals, resolution table and pause control.
#[derive(Clone)]
pub struct Interpreter(Rc<InterpreterState>);

#[derive(Clone)]
pub struct WeakInterpreter(Weak<InterpreterState>);

impl WeakInterpreter {
    pub fn upgrade(&self) -> Option<Interpreter> {
        self.0.upgrade().map(Interpreter)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_control(PauseControl::new())
    }

    /// Builds a fresh interpreter that answers to an existing `control`.
    pub fn with_control(control: Arc<PauseControl>) -> Self {
        let interpreter = Self(Rc::new(InterpreterState {
            globals: Environment::global(),
            locals: RefCell::default(),
            functions: RefCell::default(),
            control,
            depth: Cell::new(0),
        }));
        builtins::install(&interpreter);
        interpreter
    }

    pub fn globals(&self) -> &Env {
        &self.0.globals
    }

    pub fn control(&self) -> Arc<PauseControl> {
        self.0.control.clone()
    }

    pub fn stop(&self) {
        self.0.control.stop();
    }

    pub fn resume(&self) {
        self.0.control.resume();
    }

    pub fn downgrade(&self) -> WeakInterpreter {
        WeakInterpreter(Rc::downgrade(&self.0))
    }

    pub fn bridge(&self) -> Bridge {
        Bridge::new(self.downgrade())
    }

    /// Merges scope distances from the resolver. Distances inside function
    /// bodies that nothing holds any more are dropped first, so a long-lived
    /// session does not accumulate them.
    pub fn resolve(&self, resolution: Resolution) {
        let mut locals = self.0.locals.borrow_mut();
        let mut functions = self.0.functions.borrow_mut();
        functions.retain(|function| {
            if function.decl.strong_count() > 0 {
                return true;
            }
            for id in &function.ids {
                locals.remove(id);
            }
            false
        });
        locals.extend(resolution.locals);
        functions.extend(resolution.functions);
    }

    /// Number of recorded scope distances.
    pub fn resolved_count(&self) -> usize {
        self.0.locals.borrow().len()
    }

    pub fn register(&self, name: impl Into<String>, value: Value) {
        self.0.globals.define(name, value);
    }

    pub fn register_host(&self, name: impl Into<String>, value: HostValue) {
        let value = self.bridge().wrap(value, &HostValue::None);
        self.register(name, value);
    }

    /// Runs `statements` against the globals, stopping at the first error.
    pub async fn interpret(&self, statements: &[Stmt]) -> Result<(), RuntimeError> {
        tracing::debug!(statements = statements.len(), "interpreting");
        for statement in statements {
            if let ExecResult::Return(_) = self.execute(statement, self.globals()).await? {
                break;
            }
        }
        Ok(())
    }

    /// Runs `statements` directly in `env`. Blocks do not open a frame of
    /// their own; only calls and class bodies do.
    pub fn execute_block<'a>(
        &'a self,
        statements: &'a [Stmt],
        env: &'a Env,
    ) -> EvalFuture<'a, ExecResult> {
        Box::pin(async move {
            for statement in statements {
                if let ExecResult::Return(value) = self.execute(statement, env).await? {
                    return Ok(ExecResult::Return(value));
                }
            }
            Ok(ExecResult::Continue)
        })
    }

    pub fn execute<'a>(&'a self, statement: &'a Stmt, env: &'a Env) -> EvalFuture<'a, ExecResult> {
        Box::pin(async move {
            match statement {
                Stmt::Block(statements) => self.execute_block(statements, env).await,
                Stmt::Class(class) => {
                    self.declare_class(class, env).await?;
                    Ok(ExecResult::Continue)
                }
                Stmt::Function(decl) => {
                    let function = UserFunction::new(decl.clone(), env.clone(), false, false);
                    env.define(decl.name.lexeme.clone(), Value::Callable(Rc::new(function)));
                    Ok(ExecResult::Continue)
                }
                Stmt::Expression(expr) => {
                    self.evaluate(expr, env).await?;
                    Ok(ExecResult::Continue)
                }
                Stmt::If {
                    branches,
                    else_branch,
                } => {
                    for (condition, body) in branches {
                        if self.evaluate(condition, env).await?.is_truthy() {
                            return self.execute(body, env).await;
                        }
                    }
                    match else_branch {
                        Some(body) => self.execute(body, env).await,
                        None => Ok(ExecResult::Continue),
                    }
                }
                Stmt::While { condition, body } => {
                    while self.evaluate(condition, env).await?.is_truthy() {
                        if let ExecResult::Return(value) = self.execute(body, env).await? {
                            return Ok(ExecResult::Return(value));
                        }
                    }
                    Ok(ExecResult::Continue)
                }
                Stmt::Return { value, .. } => {
                    let value = match value {
                        Some(value) => self.evaluate(value, env).await?,
                        None => Value::None,
                    };
                    Ok(ExecResult::Return(value))
                }
            }
        })
    }

    async fn declare_class(&self, class: &ClassDecl, env: &Env) -> Result<(), RuntimeError> {
        let superclass = match &class.superclass {
            Some(expr) => match self.evaluate(expr, env).await? {
                Value::Class(superclass) => Some(superclass),
                _ => {
                    let token = match expr {
                        Expr::Variable { name, .. } => name,
                        _ => &class.name,
                    };
                    return Err(RuntimeError::at(token, RuntimeErrorKind::SuperclassNotClass));
                }
            },
            None => None,
        };

        env.define(class.name.lexeme.clone(), Value::None);
        let method_env = match &superclass {
            Some(superclass) => {
                let method_env = Environment::child(env);
                method_env.define("super", Value::Class(superclass.clone()));
                method_env
            }
            None => env.clone(),
        };

        let methods = class
            .methods
            .iter()
            .map(|decl| {
                let is_initializer = decl.name.lexeme == "__init__";
                let method = UserFunction::new(decl.clone(), method_env.clone(), is_initializer, true);
                (decl.name.lexeme.clone(), Rc::new(method))
            })
            .collect();

        let value = Class::new(class.name.lexeme.clone(), methods, superclass);
        env.define(class.name.lexeme.clone(), Value::Class(Rc::new(value)));
        Ok(())
    }

    pub fn evaluate<'a>(&'a self, expr: &'a Expr, env: &'a Env) -> EvalFuture<'a, Value> {
        Box::pin(async move {
            if self.0.control.is_stopped() {
                self.0.control.wait_while_stopped().await;
            }
            match expr {
                Expr::Literal(literal) => Ok(literal_value(literal)),
                Expr::Variable { id, name } => self.look_up(*id, name, env),
                Expr::Assign { id, name, value } => {
                    let value = self.evaluate(value, env).await?;
                    match self.distance(*id) {
                        Some(distance) => env
                            .assign_at(distance, &name.lexeme, value.clone())
                            .map_err(|error| error.or_at(name))?,
                        None => env.define(name.lexeme.clone(), value.clone()),
                    }
                    Ok(value)
                }
                Expr::Unary { operator, right } => {
                    let right = self.evaluate(right, env).await?;
                    unary(operator, right)
                }
                Expr::Binary {
                    left,
                    operator,
                    right,
                } => {
                    let left = self.evaluate(left, env).await?;
                    let right = self.evaluate(right, env).await?;
                    binary(operator, left, right)
                }
                Expr::Logical {
                    left,
                    operator,
                    right,
                } => {
                    let left = self.evaluate(left, env).await?;
                    let short_circuits = if operator.kind == TokenKind::Or {
                        left.is_truthy()
                    } else {
                        !left.is_truthy()
                    };
                    if short_circuits {
                        Ok(left)
                    } else {
                        self.evaluate(right, env).await
                    }
                }
                Expr::Ternary {
                    condition,
                    then_branch,
                    else_branch,
                } => {
                    if self.evaluate(condition, env).await?.is_truthy() {
                        self.evaluate(then_branch, env).await
                    } else {
                        self.evaluate(else_branch, env).await
                    }
                }
                Expr::Grouping(inner) => self.evaluate(inner, env).await,
                Expr::List { elements, .. } => {
                    let mut values = Vec::with_capacity(elements.len());
                    for element in elements {
                        values.push(self.evaluate(element, env).await?);
                    }
                    Ok(Value::List(Rc::new(List::new(values))))
                }
                Expr::Dict { entries, .. } => {
                    let mut pairs = Vec::with_capacity(entries.len());
                    for (key, value) in entries {
                        let key = self.evaluate(key, env).await?;
                        let value = self.evaluate(value, env).await?;
                        pairs.push((key, value));
                    }
                    Ok(Value::Dict(Rc::new(Dict::new(pairs))))
                }
                Expr::Index {
                    object,
                    bracket,
                    index,
                    value,
                } => {
                    let object = self.evaluate(object, env).await?;
                    let key = self.evaluate(index, env).await?;
                    let value = match value {
                        Some(value) => Some(self.evaluate(value, env).await?),
                        None => None,
                    };
                    let Some(indexable) = object.as_indexable() else {
                        return Err(RuntimeError::at(bracket, RuntimeErrorKind::NotIndexable));
                    };
                    let result = match value {
                        Some(value) => indexable
                            .set_item(&key, value.clone())
                            .map(|()| value),
                        None => indexable.get_item(&key),
                    };
                    result.map_err(|error| error.or_at(bracket))
                }
                Expr::Get { object, name } => match self.evaluate(object, env).await? {
                    Value::Instance(instance) => instance.get(name),
                    Value::HostObject(object) => object.get(name),
                    Value::List(list) => List::attribute(&list, name),
                    Value::HostList(list) => HostList::attribute(&list, name),
                    _ => Err(RuntimeError::at(name, RuntimeErrorKind::PropertyOnNonInstance)),
                },
                Expr::Set {
                    object,
                    name,
                    value,
                } => {
                    let object = self.evaluate(object, env).await?;
                    let value = self.evaluate(value, env).await?;
                    match object {
                        Value::Instance(instance) => instance.set(name, value.clone()),
                        Value::HostObject(object) => object.set(name, value.clone())?,
                        _ => {
                            return Err(RuntimeError::at(
                                name,
                                RuntimeErrorKind::FieldOnNonInstance,
                            ));
                        }
                    }
                    Ok(value)
                }
                Expr::Call {
                    callee,
                    paren,
                    arguments,
                } => {
                    let callee = self.evaluate(callee, env).await?;
                    let mut values = Vec::with_capacity(arguments.len());
                    for argument in arguments {
                        values.push(self.evaluate(argument, env).await?);
                    }
                    self.call(callee, values, paren).await
                }
                Expr::Await { keyword, value } => {
                    let mut value = self.evaluate(value, env).await?;
                    while let Value::Deferred(deferred) = value {
                        value = deferred.wait().await.map_err(|error| error.or_at(keyword))?;
                    }
                    Ok(value)
                }
                Expr::Super {
                    id,
                    keyword,
                    method,
                } => self.super_method(*id, keyword, method, env),
            }
        })
    }

    /// Calls `callee` after checking it is callable with `arguments.len()`
    /// arguments. Errors without a location are pinned to `paren`.
    pub async fn call(
        &self,
        callee: Value,
        arguments: Vec<Value>,
        paren: &Token,
    ) -> Result<Value, RuntimeError> {
        let Some(callable) = callee.as_callable() else {
            return Err(RuntimeError::at(paren, RuntimeErrorKind::NotCallable));
        };
        let arity = callable.arity();
        if !arity.accepts(arguments.len()) {
            let expected = match arity {
                Arity::Exact(expected) => expected,
                Arity::Variadic => arguments.len(),
            };
            return Err(RuntimeError::at(
                paren,
                RuntimeErrorKind::ArityMismatch {
                    expected,
                    found: arguments.len(),
                },
            ));
        }

        let depth = self.0.depth.get() + 1;
        if depth > MAX_CALL_DEPTH {
            return Err(RuntimeError::at(paren, RuntimeErrorKind::RecursionDepth));
        }
        self.0.depth.set(depth);
        let _guard = DepthGuard(&self.0.depth);

        tracing::trace!(callee = callable.name(), arguments = arguments.len(), depth, "call");
        let result = if depth % CALLS_PER_TASK == 0 {
            self.call_on_fresh_task(callable, arguments).await
        } else {
            callable.call(self, arguments).await
        };
        result.map_err(|error| error.or_at(paren))
    }

    async fn call_on_fresh_task(
        &self,
        callable: Rc<dyn Callable>,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let interpreter = self.clone();
        let task =
            tokio::task::spawn_local(async move { callable.call(&interpreter, arguments).await });
        task.await
            .map_err(|error| RuntimeError::internal(format!("call task failed: {error}")))?
    }

    fn distance(&self, id: ExprId) -> Option<usize> {
        self.0.locals.borrow().get(&id).copied()
    }

    fn look_up(&self, id: ExprId, name: &Token, env: &Env) -> Result<Value, RuntimeError> {
        match self.distance(id) {
            Some(distance) => env
                .get_at(distance, &name.lexeme)
                .map_err(|error| error.or_at(name)),
            None => self.0.globals.get(name),
        }
    }

    fn super_method(
        &self,
        id: ExprId,
        keyword: &Token,
        method: &Token,
        env: &Env,
    ) -> Result<Value, RuntimeError> {
        let Some(distance) = self.distance(id).filter(|distance| *distance > 0) else {
            return Err(RuntimeError::internal("unresolved 'super'").or_at(keyword));
        };
        let Value::Class(superclass) = env.get_at(distance, "super")? else {
            return Err(RuntimeError::internal("'super' is not bound to a class").or_at(keyword));
        };
        let Value::Instance(instance) = env.get_at(distance - 1, "self")? else {
            return Err(RuntimeError::internal("'self' is not bound to an instance").or_at(keyword));
        };
        match superclass.find_method(&method.lexeme) {
            Some(found) => Ok(Value::Callable(found.bind(instance))),
            None => Err(RuntimeError::at(
                method,
                RuntimeErrorKind::UndefinedProperty {
                    name: method.lexeme.clone(),
                },
            )),
        }
    }
}

fn literal_value(literal: &LiteralValue) -> Value {
    match literal {
        LiteralValue::None => Value::None,
        LiteralValue::Bool(value) => Value::Bool(*value),
        LiteralValue::Number(value) => Value::Number(*value),
        LiteralValue::Str(value) => Value::Str(value.clone()),
    }
}

fn unary(operator: &Token, right: Value) -> Result<Value, RuntimeError> {
    match operator.kind {
        TokenKind::Minus => match right {
            Value::Number(value) => Ok(Value::Number(-value)),
            _ => Err(RuntimeError::at(operator, RuntimeErrorKind::OperandMustBeNumber)),
        },
        _ => Ok(Value::Bool(!right.is_truthy())),
    }
}

fn binary(operator: &Token, left: Value, right: Value) -> Result<Value, RuntimeError> {
    match operator.kind {
        TokenKind::EqualEqual => return Ok(Value::Bool(left.equals(&right))),
        TokenKind::BangEqual => return Ok(Value::Bool(!left.equals(&right))),
        TokenKind::Plus => {
            return match (&left, &right) {
                (Value::Number(left), Value::Number(right)) => Ok(Value::Number(left + right)),
                (Value::Str(left), Value::Str(right)) => {
                    Ok(Value::str(format!("{left}{right}")))
                }
                _ => Err(RuntimeError::at(
                    operator,
                    RuntimeErrorKind::OperandsMustBeNumbersOrStrings,
                )),
            };
        }
        _ => {}
    }

    let (Value::Number(left), Value::Number(right)) = (left, right) else {
        return Err(RuntimeError::at(operator, RuntimeErrorKind::OperandsMustBeNumbers));
    };
    let value = match operator.kind {
        TokenKind::Minus => Value::Number(left - right),
        TokenKind::Star => Value::Number(left * right),
        TokenKind::Slash => {
            if right == 0.0 {
                return Err(RuntimeError::at(operator, RuntimeErrorKind::DivideByZero));
            }
            Value::Number(left / right)
        }
        TokenKind::Greater => Value::Bool(left > right),
        TokenKind::GreaterEqual => Value::Bool(left >= right),
        TokenKind::Less => Value::Bool(left < right),
        TokenKind::LessEqual => Value::Bool(left <= right),
        _ => {
            return Err(RuntimeError::internal(format!(
                "unsupported binary operator '{}'",
                operator.lexeme
            ))
            .or_at(operator));
        }
    };
    Ok(value)
}
