use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::runtime::Value;
use crate::token::Token;

pub type Env = Rc<Environment>;

/// One scope frame. Frames are shared by every closure and activation that
/// captured them, so assignments are visible to all holders.
#[derive(Default)]
pub struct Environment {
    values: RefCell<FxHashMap<String, Value>>,
    enclosing: Option<Env>,
}

impl Environment {
    pub fn global() -> Env {
        Rc::new(Self::default())
    }

    pub fn child(enclosing: &Env) -> Env {
        Rc::new(Self {
            values: RefCell::default(),
            enclosing: Some(enclosing.clone()),
        })
    }

    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.values.borrow_mut().insert(name.into(), value);
    }

    /// Looks `name` up in this frame, then its ancestors.
    pub fn get(&self, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(value) = self.values.borrow().get(&name.lexeme) {
            return Ok(value.clone());
        }
        match &self.enclosing {
            Some(enclosing) => enclosing.get(name),
            None => Err(RuntimeError::at(
                name,
                RuntimeErrorKind::UndefinedVariable {
                    name: name.lexeme.clone(),
                },
            )),
        }
    }

    pub fn get_at(self: &Rc<Self>, distance: usize, name: &str) -> Result<Value, RuntimeError> {
        let frame = self.ancestor(distance)?;
        let value = frame.values.borrow().get(name).cloned();
        // A resolved local that is not bound yet, e.g. only assigned on a
        // branch that did not run.
        value.ok_or_else(|| {
            RuntimeError::new(RuntimeErrorKind::UndefinedVariable {
                name: name.to_string(),
            })
        })
    }

    pub fn assign_at(
        self: &Rc<Self>,
        distance: usize,
        name: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        self.ancestor(distance)?.define(name, value);
        Ok(())
    }

    fn ancestor(self: &Rc<Self>, distance: usize) -> Result<Env, RuntimeError> {
        let mut frame = self.clone();
        for _ in 0..distance {
            let enclosing = frame.enclosing.clone().ok_or_else(|| {
                RuntimeError::internal(format!("no scope frame at distance {distance}"))
            })?;
            frame = enclosing;
        }
        Ok(frame)
    }

    /// Drops every binding, breaking reference cycles through closures.
    pub fn clear(&self) {
        self.values.borrow_mut().clear();
    }
}
