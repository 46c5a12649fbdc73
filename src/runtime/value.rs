use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::ffi::{HostList, HostObjectWrapper};
use crate::runtime::callable::Callable;
use crate::runtime::class::{Class, Instance};
use crate::runtime::deferred::Deferred;
use crate::runtime::dict::Dict;
use crate::runtime::indexable::Indexable;
use crate::runtime::list::List;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    List(Rc<List>),
    Dict(Rc<Dict>),
    Callable(Rc<dyn Callable>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
    HostObject(Rc<HostObjectWrapper>),
    HostList(Rc<HostList>),
    Deferred(Deferred),
}

impl Value {
    pub fn str(value: impl Into<Rc<str>>) -> Self {
        Value::Str(value.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "str",
            Value::List(_) | Value::HostList(_) => "list",
            Value::Dict(_) => "dict",
            Value::Callable(_) => "function",
            Value::Class(_) => "class",
            Value::Instance(_) => "instance",
            Value::HostObject(_) => "host object",
            Value::Deferred(_) => "deferred",
        }
    }

    /// Classes are callable too; calling one constructs an instance.
    pub fn as_callable(&self) -> Option<Rc<dyn Callable>> {
        match self {
            Value::Callable(callable) => Some(callable.clone()),
            Value::Class(class) => Some(class.clone() as Rc<dyn Callable>),
            _ => None,
        }
    }

    pub fn as_indexable(&self) -> Option<&dyn Indexable> {
        match self {
            Value::List(list) => Some(list.as_ref()),
            Value::Dict(dict) => Some(dict.as_ref()),
            Value::HostList(list) => Some(list.as_ref()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Only `None`, `False` and zero are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(value) => *value,
            Value::Number(value) => *value != 0.0,
            _ => true,
        }
    }

    /// Language `==`. Scalars compare by value with NaN equal to itself;
    /// everything else compares by identity.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(left), Value::Bool(right)) => left == right,
            (Value::Number(left), Value::Number(right)) => {
                left == right || (left.is_nan() && right.is_nan())
            }
            (Value::Str(left), Value::Str(right)) => left == right,
            (Value::List(left), Value::List(right)) => Rc::ptr_eq(left, right),
            (Value::Dict(left), Value::Dict(right)) => Rc::ptr_eq(left, right),
            (Value::Callable(left), Value::Callable(right)) => {
                std::ptr::addr_eq(Rc::as_ptr(left), Rc::as_ptr(right))
            }
            (Value::Class(left), Value::Class(right)) => Rc::ptr_eq(left, right),
            (Value::Instance(left), Value::Instance(right)) => Rc::ptr_eq(left, right),
            (Value::HostObject(left), Value::HostObject(right)) => left.same_object(right),
            (Value::HostList(left), Value::HostList(right)) => left.same_list(right),
            (Value::Deferred(left), Value::Deferred(right)) => left.ptr_eq(right),
            _ => false,
        }
    }

    /// Rendering used inside containers, where strings are quoted.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(value) => format!("'{value}'"),
            other => other.to_string(),
        }
    }
}

pub(crate) fn format_number(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value == 0.0 {
        "0".to_string()
    } else {
        // f64 Display already drops a zero fraction and spells infinities `inf`.
        value.to_string()
    }
}

pub(crate) fn join_repr<'a>(values: impl IntoIterator<Item = &'a Value>) -> String {
    values
        .into_iter()
        .map(Value::repr)
        .collect::<Vec<_>>()
        .join(", ")
}

thread_local! {
    /// Containers whose rendering is in progress on this thread.
    static RENDERING: RefCell<FxHashSet<usize>> = RefCell::default();
}

struct RenderGuard(usize);

impl Drop for RenderGuard {
    fn drop(&mut self) {
        RENDERING.with(|active| active.borrow_mut().remove(&self.0));
    }
}

/// Renders the container at `address` with `render`, or writes `placeholder`
/// when that container is already being rendered further up.
pub(crate) fn render_container(
    f: &mut fmt::Formatter<'_>,
    address: usize,
    placeholder: &str,
    render: impl FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
) -> fmt::Result {
    if !RENDERING.with(|active| active.borrow_mut().insert(address)) {
        return f.write_str(placeholder);
    }
    let _guard = RenderGuard(address);
    render(f)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Number(value) => write!(f, "{}", format_number(*value)),
            Value::Str(value) => write!(f, "{value}"),
            Value::List(list) => render_container(f, Rc::as_ptr(list) as usize, "[...]", |f| {
                write!(f, "[{}]", join_repr(&list.snapshot()))
            }),
            Value::Dict(dict) => render_container(f, Rc::as_ptr(dict) as usize, "{...}", |f| {
                let rendered = dict
                    .entries()
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key.repr(), value.repr()))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{rendered}}}")
            }),
            Value::Callable(callable) => write!(f, "<fn {}>", callable.name()),
            Value::Class(class) => write!(f, "{}", class.name()),
            Value::Instance(instance) => write!(f, "{} instance", instance.class().name()),
            Value::HostObject(_) => write!(f, "<host object>"),
            Value::HostList(list) => write!(f, "{list}"),
            Value::Deferred(_) => write!(f, "<deferred>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(_) => write!(f, "{}", self.repr()),
            other => write!(f, "{other}"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}
