//! Global cell: a value plus the declared type. Immutable globals refuse
//! every write after their initializer ran.

use crate::model::{GlobalType, Value};

#[derive(Debug, Clone)]
pub struct GlobalInstance {
    ty: GlobalType,
    val: Value,
}

/// Why a write was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalWriteError {
    Immutable,
    TypeMismatch,
}

impl GlobalInstance {
    pub fn new(ty: GlobalType, init: Value) -> Self {
        Self { ty, val: init }
    }

    pub fn get(&self) -> Value {
        self.val
    }

    pub fn set(&mut self, v: Value) -> Result<(), GlobalWriteError> {
        if !self.ty.mutable {
            return Err(GlobalWriteError::Immutable);
        }
        if v.ty() != self.ty.val_type {
            return Err(GlobalWriteError::TypeMismatch);
        }
        self.val = v;
        Ok(())
    }

    /// Raw-slot write from the interpreter; the slot is reinterpreted at
    /// the declared type.
    pub fn set_raw(&mut self, raw: u64) -> Result<(), GlobalWriteError> {
        self.set(Value::from_raw(self.ty.val_type, raw))
    }

    pub fn get_raw(&self) -> u64 {
        self.val.to_raw()
    }

    pub fn ty(&self) -> &GlobalType {
        &self.ty
    }
}
