use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use crate::value::{PropertyKind, PropertyValue};

/// Opaque, non-owning reference to a host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub u64);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("object {handle} no longer exists")]
    InvalidObject { handle: ObjectHandle },
    #[error("object {handle} has no property '{property}'")]
    UnknownProperty {
        handle: ObjectHandle,
        property: String,
    },
    #[error("property '{property}' holds {expected:?}, got {actual:?}")]
    TypeMismatch {
        property: String,
        expected: PropertyKind,
        actual: PropertyKind,
    },
    #[error("property '{property}' is read-only")]
    ReadOnly { property: String },
    #[error("object {handle} has no function '{function}'")]
    UnknownFunction {
        handle: ObjectHandle,
        function: String,
    },
}

/// Read/write a named property on a host object. Implemented by the host's
/// reflection layer, or by [`PropertyTable`] where none exists.
pub trait ObjectPropertyAccess {
    fn is_alive(&self, handle: ObjectHandle) -> bool;

    /// Human-readable label used in log events.
    fn object_name(&self, _handle: ObjectHandle) -> Option<String> {
        None
    }

    fn read_property(&self, handle: ObjectHandle, name: &str)
        -> Result<PropertyValue, AccessError>;

    fn write_property(
        &self,
        handle: ObjectHandle,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), AccessError>;

    fn invoke_function(&self, handle: ObjectHandle, name: &str) -> Result<(), AccessError> {
        Err(AccessError::UnknownFunction {
            handle,
            function: name.to_string(),
        })
    }
}

type FunctionHook = Rc<dyn Fn()>;

struct TableObject {
    name: String,
    slots: BTreeMap<String, Slot>,
    functions: HashMap<String, FunctionHook>,
}

struct Slot {
    value: PropertyValue,
    read_only: bool,
}

/// In-memory object table with explicit typed slots.
#[derive(Default)]
pub struct PropertyTable {
    objects: RefCell<HashMap<ObjectHandle, TableObject>>,
    next_id: Cell<u64>,
}

impl PropertyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&self, name: impl Into<String>) -> ObjectHandle {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let handle = ObjectHandle(id);
        self.objects.borrow_mut().insert(
            handle,
            TableObject {
                name: name.into(),
                slots: BTreeMap::new(),
                functions: HashMap::new(),
            },
        );
        handle
    }

    pub fn despawn(&self, handle: ObjectHandle) -> bool {
        self.objects.borrow_mut().remove(&handle).is_some()
    }

    /// Declares (or redeclares) a slot. Returns false for dead handles.
    pub fn define(&self, handle: ObjectHandle, name: impl Into<String>, value: PropertyValue) -> bool {
        self.define_slot(handle, name.into(), value, false)
    }

    pub fn define_read_only(
        &self,
        handle: ObjectHandle,
        name: impl Into<String>,
        value: PropertyValue,
    ) -> bool {
        self.define_slot(handle, name.into(), value, true)
    }

    pub fn define_function<F>(&self, handle: ObjectHandle, name: impl Into<String>, hook: F) -> bool
    where
        F: Fn() + 'static,
    {
        let mut objects = self.objects.borrow_mut();
        let Some(object) = objects.get_mut(&handle) else {
            return false;
        };
        object.functions.insert(name.into(), Rc::new(hook));
        true
    }

    /// Host-side mutation that bypasses the read-only flag, as gameplay code would.
    pub fn set_from_host(&self, handle: ObjectHandle, name: &str, value: PropertyValue) -> bool {
        let mut objects = self.objects.borrow_mut();
        let Some(slot) = objects
            .get_mut(&handle)
            .and_then(|object| object.slots.get_mut(name))
        else {
            return false;
        };
        slot.value = value;
        true
    }

    fn define_slot(&self, handle: ObjectHandle, name: String, value: PropertyValue, read_only: bool) -> bool {
        let mut objects = self.objects.borrow_mut();
        let Some(object) = objects.get_mut(&handle) else {
            return false;
        };
        object.slots.insert(name, Slot { value, read_only });
        true
    }
}

impl ObjectPropertyAccess for PropertyTable {
    fn is_alive(&self, handle: ObjectHandle) -> bool {
        self.objects.borrow().contains_key(&handle)
    }

    fn object_name(&self, handle: ObjectHandle) -> Option<String> {
        self.objects
            .borrow()
            .get(&handle)
            .map(|object| object.name.clone())
    }

    fn read_property(&self, handle: ObjectHandle, name: &str) -> Result<PropertyValue, AccessError> {
        let objects = self.objects.borrow();
        let object = objects
            .get(&handle)
            .ok_or(AccessError::InvalidObject { handle })?;
        object
            .slots
            .get(name)
            .map(|slot| slot.value.clone())
            .ok_or_else(|| AccessError::UnknownProperty {
                handle,
                property: name.to_string(),
            })
    }

    fn write_property(
        &self,
        handle: ObjectHandle,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), AccessError> {
        let mut objects = self.objects.borrow_mut();
        let object = objects
            .get_mut(&handle)
            .ok_or(AccessError::InvalidObject { handle })?;
        let slot = object
            .slots
            .get_mut(name)
            .ok_or_else(|| AccessError::UnknownProperty {
                handle,
                property: name.to_string(),
            })?;
        if slot.read_only {
            return Err(AccessError::ReadOnly {
                property: name.to_string(),
            });
        }
        if slot.value.kind() != value.kind() {
            return Err(AccessError::TypeMismatch {
                property: name.to_string(),
                expected: slot.value.kind(),
                actual: value.kind(),
            });
        }
        slot.value = value;
        Ok(())
    }

    fn invoke_function(&self, handle: ObjectHandle, name: &str) -> Result<(), AccessError> {
        let hook = {
            let objects = self.objects.borrow();
            let object = objects
                .get(&handle)
                .ok_or(AccessError::InvalidObject { handle })?;
            object
                .functions
                .get(name)
                .cloned()
                .ok_or_else(|| AccessError::UnknownFunction {
                    handle,
                    function: name.to_string(),
                })?
        };
        debug!(object = %handle, function = name, "table_function_invoked");
        hook();
        Ok(())
    }
}
