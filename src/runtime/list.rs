use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{RuntimeError, RuntimeErrorKind, TypeErrorKind};
use crate::runtime::callable::{Arity, NativeFunction};
use crate::runtime::indexable::{Indexable, list_position};
use crate::runtime::value::Value;
use crate::token::Token;

#[derive(Default)]
pub struct List {
    values: RefCell<Vec<Value>>,
}

impl List {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values: RefCell::new(values),
        }
    }

    pub fn append(&self, value: Value) {
        self.values.borrow_mut().push(value);
    }

    pub fn pop(&self) -> Result<Value, TypeErrorKind> {
        self.values
            .borrow_mut()
            .pop()
            .ok_or(TypeErrorKind::PopFromEmpty)
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.values.borrow().clone()
    }

    /// `append` and `pop`, bound to `list`.
    pub fn attribute(list: &Rc<List>, name: &Token) -> Result<Value, RuntimeError> {
        let list = list.clone();
        let method = match name.lexeme.as_str() {
            "append" => NativeFunction::new("append", Arity::Exact(1), move |_, arguments| {
                list.append(arguments.into_iter().next().unwrap_or(Value::None));
                Ok(Value::None)
            }),
            "pop" => NativeFunction::new("pop", Arity::Exact(0), move |_, _| {
                Ok(list.pop()?)
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
}

impl Indexable for List {
    fn get_item(&self, key: &Value) -> Result<Value, RuntimeError> {
        let values = self.values.borrow();
        let position = list_position(key, values.len())?;
        Ok(values[position].clone())
    }

    fn set_item(&self, key: &Value, value: Value) -> Result<(), RuntimeError> {
        let mut values = self.values.borrow_mut();
        let position = list_position(key, values.len())?;
        values[position] = value;
        Ok(())
    }

    fn len(&self) -> usize {
        self.values.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(values: &[f64]) -> List {
        List::new(values.iter().copied().map(Value::Number).collect())
    }

    #[test]
    fn reads_from_either_end() {
        let list = numbers(&[1.0, 2.0, 3.0]);
        assert_eq!(list.get_item(&Value::Number(0.0)).map(|v| v.to_string()), Ok("1".into()));
        assert_eq!(list.get_item(&Value::Number(-1.0)).map(|v| v.to_string()), Ok("3".into()));
    }

    #[test]
    fn out_of_bounds_is_a_type_error() {
        let list = numbers(&[1.0]);
        let error = list.get_item(&Value::Number(1.0)).expect_err("index 1 is out of bounds");
        assert!(error.is_type_error());
        assert_eq!(error.message(), "TypeError: Index out of bounds.");
    }

    #[test]
    fn writes_through_negative_index() {
        let list = numbers(&[1.0, 2.0]);
        list.set_item(&Value::Number(-2.0), Value::Number(9.0))
            .expect("in bounds");
        assert_eq!(Value::List(Rc::new(list)).to_string(), "[9, 2]");
    }

    #[test]
    fn append_and_pop() {
        let list = numbers(&[]);
        list.append(Value::Number(4.0));
        assert_eq!(list.len(), 1);
        assert!(matches!(list.pop(), Ok(Value::Number(n)) if n == 4.0));
        assert_eq!(list.pop().map(|_| ()), Err(TypeErrorKind::PopFromEmpty));
    }
}
