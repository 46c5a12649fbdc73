use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::interpreter::{EvalFuture, Interpreter};
use crate::runtime::callable::{Arity, Callable};
use crate::runtime::function::UserFunction;
use crate::runtime::value::Value;
use crate::token::Token;

const INITIALIZER: &str = "__init__";

pub struct Class {
    name: String,
    methods: FxHashMap<String, Rc<UserFunction>>,
    superclass: Option<Rc<Class>>,
}

impl Class {
    pub fn new(
        name: impl Into<String>,
        methods: FxHashMap<String, Rc<UserFunction>>,
        superclass: Option<Rc<Class>>,
    ) -> Self {
        Self {
            name: name.into(),
            methods,
            superclass,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superclass(&self) -> Option<&Rc<Class>> {
        self.superclass.as_ref()
    }

    /// Searches this class, then each superclass in turn.
    pub fn find_method(&self, name: &str) -> Option<Rc<UserFunction>> {
        if let Some(method) = self.methods.get(name) {
            return Some(method.clone());
        }
        self.superclass.as_ref()?.find_method(name)
    }
}

impl Callable for Class {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> Arity {
        self.find_method(INITIALIZER)
            .map_or(Arity::Exact(0), |init| init.arity())
    }

    fn call<'a>(
        self: Rc<Self>,
        interpreter: &'a Interpreter,
        arguments: Vec<Value>,
    ) -> EvalFuture<'a, Value> {
        Box::pin(async move {
            let instance = Rc::new(Instance::new(self.clone()));
            if let Some(init) = self.find_method(INITIALIZER) {
                init.bind(instance.clone())
                    .call(interpreter, arguments)
                    .await?;
            }
            Ok(Value::Instance(instance))
        })
    }
}

pub struct Instance {
    class: Rc<Class>,
    fields: RefCell<FxHashMap<String, Value>>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: RefCell::default(),
        }
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    /// Fields shadow methods; methods come back bound to this instance.
    pub fn get(self: &Rc<Self>, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(value) = self.fields.borrow().get(&name.lexeme) {
            return Ok(value.clone());
        }
        if let Some(method) = self.class.find_method(&name.lexeme) {
            return Ok(Value::Callable(method.bind(self.clone())));
        }
        Err(RuntimeError::at(
            name,
            RuntimeErrorKind::UndefinedProperty {
                name: name.lexeme.clone(),
            },
        ))
    }

    pub fn set(&self, name: &Token, value: Value) {
        self.fields.borrow_mut().insert(name.lexeme.clone(), value);
    }
}
