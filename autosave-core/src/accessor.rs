/*!
Accessors: the capability boundary between the engine and the variables it
persists.

The engine never looks inside a variable. It only holds an [`Accessor`] per
saved key and calls `get` when snapshotting and `set` when restoring. Which
accessor a key gets is decided once, at registration time: a whole-value
[`ValueAccessor`] or a single-field [`FieldAccessor`] over a [`Variable`].
*/

use crate::error::AccessorError;
use crate::value::Value;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Field name that refers to a variable's primary value.
pub const VALUE_FIELD: &str = "VAL";

/// Get/set capability for one persisted key.
#[cfg_attr(test, mockall::automock)]
pub trait Accessor: Send + Sync {
    /// Read the current value.
    fn get(&self) -> Result<Value, AccessorError>;

    /// Apply a value restored from disk.
    fn set(&self, value: Value) -> Result<(), AccessorError>;
}

/// A variable owned by the external variable framework.
///
/// Implementors expose their primary value and, optionally, named fields.
/// The default field methods report every field as unknown.
pub trait Variable: Send + Sync {
    fn value(&self) -> Result<Value, AccessorError>;

    fn set_value(&self, value: Value) -> Result<(), AccessorError>;

    fn field(&self, name: &str) -> Result<Value, AccessorError> {
        Err(AccessorError::UnknownField(name.to_string()))
    }

    fn set_field(&self, name: &str, _value: Value) -> Result<(), AccessorError> {
        Err(AccessorError::UnknownField(name.to_string()))
    }
}

/// Accessor over a variable's whole value.
pub struct ValueAccessor {
    variable: Arc<dyn Variable>,
}

impl ValueAccessor {
    pub fn new(variable: Arc<dyn Variable>) -> Self {
        Self { variable }
    }
}

impl Accessor for ValueAccessor {
    fn get(&self) -> Result<Value, AccessorError> {
        self.variable.value()
    }

    fn set(&self, value: Value) -> Result<(), AccessorError> {
        let value = widen_from(value, || self.variable.value());
        self.variable.set_value(value)
    }
}

/// Accessor over a single named field of a variable.
pub struct FieldAccessor {
    variable: Arc<dyn Variable>,
    field: String,
}

impl FieldAccessor {
    pub fn new<S: Into<String>>(variable: Arc<dyn Variable>, field: S) -> Self {
        Self {
            variable,
            field: field.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl Accessor for FieldAccessor {
    fn get(&self) -> Result<Value, AccessorError> {
        self.variable.field(&self.field)
    }

    fn set(&self, value: Value) -> Result<(), AccessorError> {
        let value = widen_from(value, || self.variable.field(&self.field));
        self.variable.set_field(&self.field, value)
    }
}

/// Choose the accessor for `field`: `None` or `VAL` selects the whole value.
pub fn accessor_for(variable: Arc<dyn Variable>, field: Option<&str>) -> Box<dyn Accessor> {
    match field {
        None | Some(VALUE_FIELD) => Box::new(ValueAccessor::new(variable)),
        Some(name) => Box::new(FieldAccessor::new(variable, name)),
    }
}

type GetFn = dyn Fn() -> Result<Value, AccessorError> + Send + Sync;
type SetFn = dyn Fn(Value) -> Result<(), AccessorError> + Send + Sync;

/// Accessor built from a pair of closures.
pub struct FnAccessor {
    get: Box<GetFn>,
    set: Box<SetFn>,
}

impl FnAccessor {
    pub fn new<G, S>(get: G, set: S) -> Self
    where
        G: Fn() -> Result<Value, AccessorError> + Send + Sync + 'static,
        S: Fn(Value) -> Result<(), AccessorError> + Send + Sync + 'static,
    {
        Self {
            get: Box::new(get),
            set: Box::new(set),
        }
    }
}

impl Accessor for FnAccessor {
    fn get(&self) -> Result<Value, AccessorError> {
        (self.get)()
    }

    fn set(&self, value: Value) -> Result<(), AccessorError> {
        (self.set)(value)
    }
}

/// Thread-safe in-memory variable cell.
///
/// The cell keeps the kind of its initial value: setting a value of another
/// kind is rejected, except that integers are widened into float cells.
/// Clones share the same underlying value.
#[derive(Clone)]
pub struct SharedValue {
    inner: Arc<RwLock<Value>>,
}

impl SharedValue {
    pub fn new<V: Into<Value>>(initial: V) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial.into())),
        }
    }

    /// Current value.
    pub fn load(&self) -> Result<Value, AccessorError> {
        self.inner
            .read()
            .map(|v| v.clone())
            .map_err(|_| AccessorError::Unavailable("value lock poisoned".to_string()))
    }

    /// Replace the value, enforcing the cell's kind.
    pub fn store<V: Into<Value>>(&self, value: V) -> Result<(), AccessorError> {
        let mut slot = self
            .inner
            .write()
            .map_err(|_| AccessorError::Unavailable("value lock poisoned".to_string()))?;
        *slot = coerce(&slot, value.into())?;
        Ok(())
    }
}

impl fmt::Debug for SharedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.read() {
            Ok(v) => f.debug_tuple("SharedValue").field(&*v).finish(),
            Err(_) => f.write_str("SharedValue(<poisoned>)"),
        }
    }
}

fn coerce(current: &Value, incoming: Value) -> Result<Value, AccessorError> {
    let incoming = incoming.widen_like(current);
    if current.kind() == incoming.kind() {
        Ok(incoming)
    } else {
        Err(AccessorError::TypeMismatch {
            expected: current.kind().to_string(),
            actual: incoming.kind().to_string(),
        })
    }
}

/// Widen integer content read from disk to the kind `current` reports.
///
/// Only integer values can need widening, so other values skip the read.
fn widen_from<F>(incoming: Value, current: F) -> Value
where
    F: FnOnce() -> Result<Value, AccessorError>,
{
    match incoming {
        Value::Int(_) | Value::IntArray(_) => match current() {
            Ok(current) => incoming.widen_like(&current),
            Err(_) => incoming,
        },
        other => other,
    }
}

impl Accessor for SharedValue {
    fn get(&self) -> Result<Value, AccessorError> {
        self.load()
    }

    fn set(&self, value: Value) -> Result<(), AccessorError> {
        self.store(value)
    }
}

impl Variable for SharedValue {
    fn value(&self) -> Result<Value, AccessorError> {
        self.load()
    }

    fn set_value(&self, value: Value) -> Result<(), AccessorError> {
        self.store(value)
    }
}
