//! Host interop.
//!
//! Embedders describe their objects with [`HostValue`]. The [`Bridge`]
//! converts those into language values (`wrap`) and back again (`unwrap`)
//! every time a value crosses the boundary: arguments going into a host
//! function, results coming out of it, and fields read or written on a
//! host object.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::{RuntimeError, RuntimeErrorKind, TypeErrorKind};
use crate::interpreter::{EvalFuture, Interpreter, WeakInterpreter};
use crate::runtime::indexable::list_position;
use crate::runtime::value::{format_number, join_repr, render_container};
use crate::runtime::{Arity, Callable, Deferred, Indexable, NativeFunction, Value};
use crate::token::Token;

pub type HostItems = Rc<RefCell<Vec<HostValue>>>;

#[derive(Clone)]
pub enum HostValue {
    None,
    Bool(bool),
    Number(f64),
    Str(String),
    List(HostItems),
    Function(Rc<HostFunction>),
    Object(Rc<dyn HostObject>),
    /// A language value passing through host code untouched.
    Opaque(Value),
}

impl HostValue {
    pub fn list(items: Vec<HostValue>) -> Self {
        HostValue::List(Rc::new(RefCell::new(items)))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            HostValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::None => "None",
            HostValue::Bool(_) => "bool",
            HostValue::Number(_) => "number",
            HostValue::Str(_) => "str",
            HostValue::List(_) => "list",
            HostValue::Function(_) => "function",
            HostValue::Object(_) => "host object",
            HostValue::Opaque(value) => value.type_name(),
        }
    }

    /// Reads argument `index` as a number, naming `function` in the error.
    pub fn number_arg(function: &str, arguments: &[HostValue], index: usize) -> Result<f64, String> {
        let argument = arguments.get(index).unwrap_or(&HostValue::None);
        argument.as_number().ok_or_else(|| {
            TypeErrorKind::ExpectedNumber {
                function: function.to_string(),
                got: argument.type_name().to_string(),
            }
            .to_string()
        })
    }

    fn repr(&self) -> String {
        match self {
            HostValue::Str(value) => format!("'{value}'"),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::None => write!(f, "None"),
            HostValue::Bool(true) => write!(f, "True"),
            HostValue::Bool(false) => write!(f, "False"),
            HostValue::Number(value) => write!(f, "{}", format_number(*value)),
            HostValue::Str(value) => write!(f, "{value}"),
            HostValue::List(items) => render_container(f, Rc::as_ptr(items) as usize, "[...]", |f| {
                let rendered = items
                    .borrow()
                    .iter()
                    .map(HostValue::repr)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{rendered}]")
            }),
            HostValue::Function(function) => write!(f, "<fn {}>", function.name()),
            HostValue::Object(_) => write!(f, "<host object>"),
            HostValue::Opaque(value) => write!(f, "{value}"),
        }
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Number(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::Str(value.to_string())
    }
}

type HostFn = dyn Fn(&HostValue, Vec<HostValue>) -> Result<HostValue, String>;

/// A host function. `params == 0` means it takes any number of arguments.
pub struct HostFunction {
    name: String,
    params: usize,
    function: Box<HostFn>,
}

impl HostFunction {
    pub fn new(
        name: impl Into<String>,
        params: usize,
        function: impl Fn(&HostValue, Vec<HostValue>) -> Result<HostValue, String> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            params,
            function: Box::new(function),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> usize {
        self.params
    }

    pub fn invoke(&self, receiver: &HostValue, arguments: Vec<HostValue>) -> Result<HostValue, String> {
        (self.function)(receiver, arguments)
    }
}

/// An object whose attributes live on the host side.
pub trait HostObject {
    /// `None` when the attribute does not exist.
    fn get(&self, name: &str) -> Option<HostValue>;

    fn set(&self, name: &str, value: HostValue) -> Result<(), String>;
}

/// A plain attribute map, enough for most embedders.
#[derive(Default)]
pub struct HostMap {
    values: RefCell<FxHashMap<String, HostValue>>,
}

impl HostMap {
    pub fn builder() -> HostMapBuilder {
        HostMapBuilder::default()
    }
}

impl HostObject for HostMap {
    fn get(&self, name: &str) -> Option<HostValue> {
        self.values.borrow().get(name).cloned()
    }

    fn set(&self, name: &str, value: HostValue) -> Result<(), String> {
        self.values.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }
}

#[derive(Default)]
pub struct HostMapBuilder {
    values: FxHashMap<String, HostValue>,
}

impl HostMapBuilder {
    pub fn value(mut self, name: impl Into<String>, value: HostValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn function(
        self,
        name: &str,
        params: usize,
        function: impl Fn(&HostValue, Vec<HostValue>) -> Result<HostValue, String> + 'static,
    ) -> Self {
        let function = HostFunction::new(name, params, function);
        self.value(name, HostValue::Function(function))
    }

    pub fn build(self) -> Rc<HostMap> {
        Rc::new(HostMap {
            values: RefCell::new(self.values),
        })
    }
}

/// Converts values across the host boundary.
///
/// Holds the interpreter weakly; wrappers stored in globals would otherwise
/// keep it alive forever.
#[derive(Clone)]
pub struct Bridge {
    interpreter: WeakInterpreter,
}

impl Bridge {
    pub fn new(interpreter: WeakInterpreter) -> Self {
        Self { interpreter }
    }

    /// `receiver` is the object a wrapped function is called on.
    pub fn wrap(&self, value: HostValue, receiver: &HostValue) -> Value {
        match value {
            HostValue::None => Value::None,
            HostValue::Bool(value) => Value::Bool(value),
            HostValue::Number(value) => Value::Number(value),
            HostValue::Str(value) => Value::str(value),
            HostValue::List(items) => Value::HostList(Rc::new(HostList {
                items,
                bridge: self.clone(),
            })),
            HostValue::Function(function) => Value::Callable(Rc::new(HostFunctionWrapper {
                function,
                receiver: receiver.clone(),
                bridge: self.clone(),
            })),
            HostValue::Object(object) => {
                Value::HostObject(Rc::new(HostObjectWrapper::new(object, self.clone())))
            }
            HostValue::Opaque(value) => value,
        }
    }

    pub fn unwrap(&self, value: &Value) -> HostValue {
        match value {
            Value::None => HostValue::None,
            Value::Bool(value) => HostValue::Bool(*value),
            Value::Number(value) => HostValue::Number(*value),
            Value::Str(value) => HostValue::Str(value.to_string()),
            Value::HostObject(wrapper) => HostValue::Object(wrapper.object.clone()),
            Value::HostList(list) => HostValue::List(list.items.clone()),
            Value::List(list) => HostValue::list(
                list.snapshot()
                    .iter()
                    .map(|value| self.unwrap(value))
                    .collect(),
            ),
            Value::Callable(_) | Value::Class(_) => match value.as_callable() {
                Some(callable) => HostValue::Function(self.adapter(callable)),
                None => HostValue::Opaque(value.clone()),
            },
            other => HostValue::Opaque(other.clone()),
        }
    }

    /// Lets host code call a language function. The call starts at once as
    /// a local task and the adapter returns `None` without waiting for it.
    fn adapter(&self, callable: Rc<dyn Callable>) -> Rc<HostFunction> {
        let params = match callable.arity() {
            Arity::Exact(count) => count,
            Arity::Variadic => 0,
        };
        let bridge = self.clone();
        let name = callable.name().to_string();
        HostFunction::new(name, params, move |_, arguments| {
            let Some(interpreter) = bridge.interpreter.upgrade() else {
                return Err("interpreter has been dropped".to_string());
            };
            let arguments = arguments
                .into_iter()
                .map(|argument| bridge.wrap(argument, &HostValue::None))
                .collect();
            let callable = callable.clone();
            Deferred::spawn(async move { callable.call(&interpreter, arguments).await });
            Ok(HostValue::None)
        })
    }
}

/// A host object seen from the language. Attribute reads are wrapped once
/// and cached per name.
pub struct HostObjectWrapper {
    object: Rc<dyn HostObject>,
    cache: RefCell<FxHashMap<String, Value>>,
    bridge: Bridge,
}

impl HostObjectWrapper {
    fn new(object: Rc<dyn HostObject>, bridge: Bridge) -> Self {
        Self {
            object,
            cache: RefCell::default(),
            bridge,
        }
    }

    /// Missing attributes read as `None` and are not cached.
    pub fn get(&self, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(value) = self.cache.borrow().get(&name.lexeme) {
            return Ok(value.clone());
        }
        let value = match self.object.get(&name.lexeme) {
            None | Some(HostValue::None) => return Ok(Value::None),
            Some(value) => self
                .bridge
                .wrap(value, &HostValue::Object(self.object.clone())),
        };
        self.cache
            .borrow_mut()
            .insert(name.lexeme.clone(), value.clone());
        Ok(value)
    }

    pub fn set(&self, name: &Token, value: Value) -> Result<(), RuntimeError> {
        self.cache.borrow_mut().remove(&name.lexeme);
        self.object
            .set(&name.lexeme, self.bridge.unwrap(&value))
            .map_err(|message| RuntimeError::at(name, RuntimeErrorKind::Host { message }))
    }

    pub fn same_object(&self, other: &Rc<HostObjectWrapper>) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.object), Rc::as_ptr(&other.object))
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.object).cast::<()>() as usize
    }
}

struct HostFunctionWrapper {
    function: Rc<HostFunction>,
    receiver: HostValue,
    bridge: Bridge,
}

impl Callable for HostFunctionWrapper {
    fn name(&self) -> &str {
        self.function.name()
    }

    fn arity(&self) -> Arity {
        match self.function.params() {
            0 => Arity::Variadic,
            count => Arity::Exact(count),
        }
    }

    fn call<'a>(
        self: Rc<Self>,
        _interpreter: &'a Interpreter,
        arguments: Vec<Value>,
    ) -> EvalFuture<'a, Value> {
        let arguments = arguments
            .iter()
            .map(|argument| self.bridge.unwrap(argument))
            .collect();
        let result = self
            .function
            .invoke(&self.receiver, arguments)
            .map(|value| self.bridge.wrap(value, &HostValue::None))
            .map_err(|message| RuntimeError::new(RuntimeErrorKind::Host { message }));
        Box::pin(std::future::ready(result))
    }
}

/// A host list seen from the language. Reads and writes go straight to the
/// shared host storage.
pub struct HostList {
    items: HostItems,
    bridge: Bridge,
}

impl HostList {
    /// `append` and `pop`, mirroring language lists.
    pub fn attribute(list: &Rc<HostList>, name: &Token) -> Result<Value, RuntimeError> {
        let list = list.clone();
        let method = match name.lexeme.as_str() {
            "append" => NativeFunction::new("append", Arity::Exact(1), move |_, arguments| {
                let value = arguments.first().cloned().unwrap_or(Value::None);
                list.items.borrow_mut().push(list.bridge.unwrap(&value));
                Ok(Value::None)
            }),
            "pop" => NativeFunction::new("pop", Arity::Exact(0), move |_, _| {
                let popped = list.items.borrow_mut().pop();
                let value = popped.ok_or(TypeErrorKind::PopFromEmpty)?;
                Ok(list.bridge.wrap(value, &HostValue::None))
            }),
            _ => {
                return Err(RuntimeError::at(
                    name,
                    RuntimeErrorKind::UndefinedProperty {
                        name: name.lexeme.clone(),
                    },
                ));
            }
        };
        Ok(Value::Callable(method))
    }

    pub fn same_list(&self, other: &Rc<HostList>) -> bool {
        Rc::ptr_eq(&self.items, &other.items)
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.items) as usize
    }
}

impl Indexable for HostList {
    fn get_item(&self, key: &Value) -> Result<Value, RuntimeError> {
        let item = {
            let items = self.items.borrow();
            let position = list_position(key, items.len())?;
            items[position].clone()
        };
        Ok(self.bridge.wrap(item, &HostValue::None))
    }

    fn set_item(&self, key: &Value, value: Value) -> Result<(), RuntimeError> {
        let value = self.bridge.unwrap(&value);
        let mut items = self.items.borrow_mut();
        let position = list_position(key, items.len())?;
        items[position] = value;
        Ok(())
    }

    fn len(&self) -> usize {
        self.items.borrow().len()
    }
}

impl fmt::Display for HostList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render_container(f, self.address(), "[...]", |f| {
            let items = self
                .items
                .borrow()
                .iter()
                .map(|item| self.bridge.wrap(item.clone(), &HostValue::None))
                .collect::<Vec<_>>();
            write!(f, "[{}]", join_repr(&items))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;
    use std::cell::Cell;
    use std::future::Future;

    fn name(lexeme: &str) -> Token {
        Token::new(TokenKind::Identifier, lexeme, 1)
    }

    /// Counts reads so the cache is observable.
    #[derive(Default)]
    struct Counting {
        reads: Cell<usize>,
        inner: HostMap,
    }

    impl HostObject for Counting {
        fn get(&self, name: &str) -> Option<HostValue> {
            self.reads.set(self.reads.get() + 1);
            self.inner.get(name)
        }

        fn set(&self, name: &str, value: HostValue) -> Result<(), String> {
            if name == "frozen" {
                return Err("frozen is read-only".to_string());
            }
            self.inner.set(name, value)
        }
    }

    #[test]
    fn attribute_reads_are_cached_until_set() {
        let interpreter = Interpreter::new();
        let object = Rc::new(Counting::default());
        object
            .set("x", HostValue::Number(1.0))
            .expect("plain attribute");
        let Value::HostObject(wrapper) = interpreter
            .bridge()
            .wrap(HostValue::Object(object.clone()), &HostValue::None)
        else {
            panic!("expected host object");
        };

        wrapper.get(&name("x")).expect("read");
        wrapper.get(&name("x")).expect("cached read");
        assert_eq!(object.reads.get(), 1);

        wrapper.set(&name("x"), Value::Number(2.0)).expect("write");
        let value = wrapper.get(&name("x")).expect("fresh read");
        assert_eq!(value.to_string(), "2");
        assert_eq!(object.reads.get(), 2);
    }

    #[test]
    fn missing_attribute_reads_none_and_is_not_cached() {
        let interpreter = Interpreter::new();
        let object = Rc::new(Counting::default());
        let Value::HostObject(wrapper) = interpreter
            .bridge()
            .wrap(HostValue::Object(object.clone()), &HostValue::None)
        else {
            panic!("expected host object");
        };
        assert!(matches!(wrapper.get(&name("nope")), Ok(Value::None)));
        assert!(matches!(wrapper.get(&name("nope")), Ok(Value::None)));
        assert_eq!(object.reads.get(), 2);
    }

    #[test]
    fn host_set_errors_become_runtime_errors() {
        let interpreter = Interpreter::new();
        let value = interpreter
            .bridge()
            .wrap(HostValue::Object(Rc::new(Counting::default())), &HostValue::None);
        let Value::HostObject(wrapper) = value else {
            panic!("expected host object");
        };
        let error = wrapper
            .set(&name("frozen"), Value::None)
            .expect_err("read-only");
        assert_eq!(
            error.to_string(),
            "[line 1] Error at 'frozen': Host error: frozen is read-only"
        );
    }

    #[test]
    fn functions_receive_their_receiver_and_declare_arity() {
        let interpreter = Interpreter::new();
        let object = HostMap::builder()
            .value("label", "box".into())
            .function("describe", 1, |receiver, arguments| {
                let HostValue::Object(object) = receiver else {
                    return Err("no receiver".to_string());
                };
                let label = object.get("label").unwrap_or(HostValue::None);
                Ok(HostValue::Str(format!("{label}:{}", arguments[0])))
            })
            .function("anything", 0, |_, arguments| {
                Ok(HostValue::Number(arguments.len() as f64))
            })
            .build();
        let Value::HostObject(wrapper) = interpreter
            .bridge()
            .wrap(HostValue::Object(object), &HostValue::None)
        else {
            panic!("expected host object");
        };

        let describe = wrapper.get(&name("describe")).expect("function");
        let callable = describe.as_callable().expect("callable");
        assert_eq!(callable.arity(), Arity::Exact(1));
        let anything = wrapper.get(&name("anything")).expect("function");
        assert_eq!(anything.as_callable().map(|c| c.arity()), Some(Arity::Variadic));

        let result = futures_ready(callable.call(&interpreter, vec![Value::Number(3.0)]));
        assert_eq!(result.expect("call succeeds").to_string(), "box:3");
    }

    #[test]
    fn host_lists_share_storage() {
        let interpreter = Interpreter::new();
        let items = Rc::new(RefCell::new(vec![HostValue::Number(1.0), "a".into()]));
        let value = interpreter
            .bridge()
            .wrap(HostValue::List(items.clone()), &HostValue::None);
        let indexable = value.as_indexable().expect("indexable");
        assert_eq!(indexable.len(), 2);
        assert_eq!(
            indexable.get_item(&Value::Number(-1.0)).expect("last").to_string(),
            "a"
        );
        indexable
            .set_item(&Value::Number(0.0), Value::Number(5.0))
            .expect("in bounds");
        assert!(matches!(items.borrow()[0], HostValue::Number(n) if n == 5.0));
        assert_eq!(value.to_string(), "[5, 'a']");
    }

    #[test]
    fn unwrap_round_trips_host_objects_and_copies_lists() {
        let interpreter = Interpreter::new();
        let bridge = interpreter.bridge();
        let object: Rc<dyn HostObject> = HostMap::builder().build();
        let wrapped = bridge.wrap(HostValue::Object(object.clone()), &HostValue::None);
        let HostValue::Object(unwrapped) = bridge.unwrap(&wrapped) else {
            panic!("expected host object");
        };
        assert!(std::ptr::addr_eq(Rc::as_ptr(&unwrapped), Rc::as_ptr(&object)));

        let list = Value::List(Rc::new(crate::runtime::List::new(vec![Value::from("x")])));
        let HostValue::List(copied) = bridge.unwrap(&list) else {
            panic!("expected host list");
        };
        assert_eq!(copied.borrow().len(), 1);

        let deferred = Value::Deferred(Deferred::resolved(Value::None));
        assert!(matches!(bridge.unwrap(&deferred), HostValue::Opaque(Value::Deferred(_))));
    }

    #[test]
    fn host_function_errors_are_host_errors() {
        let interpreter = Interpreter::new();
        let failing = HostFunction::new("fail", 0, |_, _| Err("nope".to_string()));
        let value = interpreter
            .bridge()
            .wrap(HostValue::Function(failing), &HostValue::None);
        let callable = value.as_callable().expect("callable");
        let error = futures_ready(callable.call(&interpreter, Vec::new())).expect_err("fails");
        assert_eq!(error.to_string(), "Error: Host error: nope");
    }

    /// Host calls never suspend, so one poll is enough.
    fn futures_ready<T>(future: EvalFuture<'_, T>) -> Result<T, RuntimeError> {
        let mut future = future;
        let mut context = std::task::Context::from_waker(std::task::Waker::noop());
        match future.as_mut().poll(&mut context) {
            std::task::Poll::Ready(result) => result,
            std::task::Poll::Pending => panic!("host call suspended"),
        }
    }
}
