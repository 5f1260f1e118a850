//! Inspectable values published by the host runtime.
//!
//! A [`VariableContainer`] is an ordered name/value map that may itself
//! appear as a value, which is how nested structures (vectors, registers
//! grouped by lane) surface in the debugger UI.

use std::fmt;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use itertools::Itertools;

use crate::debugger::id::Id;

pub type ContainerId = Id<VariableContainer>;

/// Type tag of an inspectable value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Ptr,
    Container,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Bool => "bool",
            Kind::U8 => "u8",
            Kind::I8 => "i8",
            Kind::U16 => "u16",
            Kind::I16 => "i16",
            Kind::U32 => "u32",
            Kind::I32 => "i32",
            Kind::U64 => "u64",
            Kind::I64 => "i64",
            Kind::F32 => "f32",
            Kind::F64 => "f64",
            Kind::Ptr => "ptr",
            Kind::Container => "container",
        }
    }
}

/// Scalar contents of a primitive value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Ptr(u64),
}

impl Scalar {
    pub fn kind(self) -> Kind {
        match self {
            Scalar::Bool(_) => Kind::Bool,
            Scalar::U8(_) => Kind::U8,
            Scalar::I8(_) => Kind::I8,
            Scalar::U16(_) => Kind::U16,
            Scalar::I16(_) => Kind::I16,
            Scalar::U32(_) => Kind::U32,
            Scalar::I32(_) => Kind::I32,
            Scalar::U64(_) => Kind::U64,
            Scalar::I64(_) => Kind::I64,
            Scalar::F32(_) => Kind::F32,
            Scalar::F64(_) => Kind::F64,
            Scalar::Ptr(_) => Kind::Ptr,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::U8(v) => write!(f, "{v}"),
            Scalar::I8(v) => write!(f, "{v}"),
            Scalar::U16(v) => write!(f, "{v}"),
            Scalar::I16(v) => write!(f, "{v}"),
            Scalar::U32(v) => write!(f, "{v}"),
            Scalar::I32(v) => write!(f, "{v}"),
            Scalar::U64(v) => write!(f, "{v}"),
            Scalar::I64(v) => write!(f, "{v}"),
            Scalar::F32(v) => write!(f, "{v}"),
            Scalar::F64(v) => write!(f, "{v}"),
            Scalar::Ptr(v) => write!(f, "{v:#x}"),
        }
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Scalar {
            fn from(v: $ty) -> Scalar {
                Scalar::$variant(v)
            }
        })*
    };
}

scalar_from! {
    bool => Bool,
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
}

/// A value visible to the debugger.
///
/// Primitive values expose their scalar through [`Value::get`]; aggregates
/// return `None` and surface their members through [`Value::container`].
/// Writes are refused unless the implementation opts in.
pub trait Value: Send + Sync {
    fn kind(&self) -> Kind;

    fn get(&self) -> Option<Scalar>;

    fn set(&self, _new: Scalar) -> bool {
        false
    }

    fn container(&self) -> Option<&VariableContainer> {
        None
    }

    /// Rendering shown in variable views and evaluate results.
    fn render(&self) -> String {
        self.get().map(|s| s.to_string()).unwrap_or_default()
    }
}

/// Immutable scalar value.
pub struct Constant(Scalar);

impl Constant {
    pub fn new(value: impl Into<Scalar>) -> Constant {
        Constant(value.into())
    }

    pub fn ptr(address: u64) -> Constant {
        Constant(Scalar::Ptr(address))
    }
}

impl Value for Constant {
    fn kind(&self) -> Kind {
        self.0.kind()
    }

    fn get(&self) -> Option<Scalar> {
        Some(self.0)
    }
}

/// Mutable scalar cell. Writes must keep the original type.
pub struct Slot(Mutex<Scalar>);

impl Slot {
    pub fn new(value: impl Into<Scalar>) -> Slot {
        Slot(Mutex::new(value.into()))
    }
}

impl Value for Slot {
    fn kind(&self) -> Kind {
        self.0.lock().unwrap().kind()
    }

    fn get(&self) -> Option<Scalar> {
        Some(*self.0.lock().unwrap())
    }

    fn set(&self, new: Scalar) -> bool {
        let mut current = self.0.lock().unwrap();
        if new.kind() != current.kind() {
            return false;
        }
        *current = new;
        true
    }
}

/// Ordered name/value map. `put` with an existing name replaces the value in
/// place and keeps the original position; enumeration follows insertion
/// order.
pub struct VariableContainer {
    pub id: ContainerId,
    vars: Mutex<IndexMap<String, Arc<dyn Value>>>,
}

impl VariableContainer {
    pub(crate) fn new(id: ContainerId) -> VariableContainer {
        VariableContainer {
            id,
            vars: Mutex::new(IndexMap::new()),
        }
    }

    pub fn put(&self, name: impl Into<String>, value: Arc<dyn Value>) {
        self.vars.lock().unwrap().insert(name.into(), value);
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Value>> {
        self.vars.lock().unwrap().get(name).cloned()
    }

    /// Visit variables in insertion order, starting at `start`.
    pub fn foreach(&self, start: usize, mut f: impl FnMut(&str, &Arc<dyn Value>)) {
        let vars = self.vars.lock().unwrap();
        for (name, value) in vars.iter().skip(start) {
            f(name, value);
        }
    }

    /// Snapshot of the current contents in insertion order.
    pub fn snapshot(&self) -> Vec<(String, Arc<dyn Value>)> {
        self.vars
            .lock()
            .unwrap()
            .iter()
            .map(|(name, value)| (name.clone(), Arc::clone(value)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.vars.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.lock().unwrap().is_empty()
    }
}

impl Value for VariableContainer {
    fn kind(&self) -> Kind {
        Kind::Container
    }

    fn get(&self) -> Option<Scalar> {
        None
    }

    fn container(&self) -> Option<&VariableContainer> {
        Some(self)
    }

    fn render(&self) -> String {
        let members = self
            .snapshot()
            .iter()
            .map(|(name, value)| format!("{name}: {}", value.render()))
            .join(", ");
        format!("[{members}]")
    }
}
