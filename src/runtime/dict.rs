//! Runtime dictionary with insertion order.
//!
//! Storage preserves insertion order (`entries`) while `buckets` maps each
//! normalized key to its entry. Scalars and strings key by value; every
//! other value keys by identity.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::RuntimeError;
use crate::runtime::indexable::Indexable;
use crate::runtime::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DictKey {
    None,
    Bool(bool),
    Number(u64),
    Str(Rc<str>),
    Identity(usize),
}

impl DictKey {
    fn of(value: &Value) -> Self {
        match value {
            Value::None => DictKey::None,
            Value::Bool(value) => DictKey::Bool(*value),
            Value::Number(value) => DictKey::Number(number_bits(*value)),
            Value::Str(value) => DictKey::Str(value.clone()),
            Value::List(list) => DictKey::Identity(address(Rc::as_ptr(list))),
            Value::Dict(dict) => DictKey::Identity(address(Rc::as_ptr(dict))),
            Value::Callable(callable) => DictKey::Identity(address(Rc::as_ptr(callable))),
            Value::Class(class) => DictKey::Identity(address(Rc::as_ptr(class))),
            Value::Instance(instance) => DictKey::Identity(address(Rc::as_ptr(instance))),
            Value::HostObject(object) => DictKey::Identity(object.address()),
            Value::HostList(list) => DictKey::Identity(list.address()),
            Value::Deferred(deferred) => DictKey::Identity(deferred.address()),
        }
    }
}

/// `-0` and `0` share a key, as do all NaNs.
fn number_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

fn address<T: ?Sized>(pointer: *const T) -> usize {
    pointer.cast::<()>() as usize
}

#[derive(Default)]
struct DictStorage {
    entries: Vec<(Value, Value)>,
    buckets: FxHashMap<DictKey, usize>,
}

#[derive(Default)]
pub struct Dict {
    storage: RefCell<DictStorage>,
}

impl Dict {
    pub fn new(entries: Vec<(Value, Value)>) -> Self {
        let dict = Self::default();
        for (key, value) in entries {
            dict.insert(key, value);
        }
        dict
    }

    /// Later writes to an existing key replace the value in place.
    pub fn insert(&self, key: Value, value: Value) {
        let mut storage = self.storage.borrow_mut();
        let normalized = DictKey::of(&key);
        if let Some(&index) = storage.buckets.get(&normalized) {
            storage.entries[index].1 = value;
            return;
        }
        let index = storage.entries.len();
        storage.entries.push((key, value));
        storage.buckets.insert(normalized, index);
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        let storage = self.storage.borrow();
        storage
            .buckets
            .get(&DictKey::of(key))
            .map(|&index| storage.entries[index].1.clone())
    }

    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.storage.borrow().entries.clone()
    }
}

impl Indexable for Dict {
    /// Missing keys read as `None`.
    fn get_item(&self, key: &Value) -> Result<Value, RuntimeError> {
        Ok(self.get(key).unwrap_or(Value::None))
    }

    fn set_item(&self, key: &Value, value: Value) -> Result<(), RuntimeError> {
        self.insert(key.clone(), value);
        Ok(())
    }

    fn len(&self) -> usize {
        self.storage.borrow().entries.len()
    }
}
