use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, TreeError};
use crate::value::{FromValue, Value, ValueKind};

/// Index of a field inside one [`BlackboardDef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId(u32);

impl FieldId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle for one registered change listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A named field with a declared default. The default's kind fixes the kind
/// of every later write.
#[derive(Debug, Clone)]
pub struct FieldDef {
    name: String,
    default: Value,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default(&self) -> &Value {
        &self.default
    }

    pub fn kind(&self) -> ValueKind {
        self.default.kind()
    }
}

/// Ordered field layout shared by every blackboard built from it.
#[derive(Debug, Clone, Default)]
pub struct BlackboardDef {
    fields: Vec<FieldDef>,
    by_name: HashMap<String, FieldId>,
}

impl BlackboardDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field. Names are unique within one definition.
    pub fn push(&mut self, field: FieldDef) -> Result<FieldId> {
        if self.by_name.contains_key(field.name()) {
            return Err(TreeError::DuplicateField(field.name().to_owned()));
        }
        let id = FieldId(self.fields.len() as u32);
        self.by_name.insert(field.name().to_owned(), id);
        self.fields.push(field);
        Ok(id)
    }

    pub fn get(&self, name: &str) -> Option<FieldId> {
        self.by_name.get(name).copied()
    }

    /// The definition behind `id`. `id` must come from this definition.
    pub fn field(&self, id: FieldId) -> &FieldDef {
        &self.fields[id.index()]
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter()
    }
}

/// Whether a listener stays registered after handling a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listen {
    Keep,
    Stop,
}

/// Read-only view of one field handed to change listeners.
pub struct Field<'a> {
    id: FieldId,
    def: &'a FieldDef,
    value: Option<&'a Value>,
}

impl Field<'_> {
    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.def.name()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// The written value, or the declared default while unset.
    pub fn value(&self) -> &Value {
        self.value.unwrap_or(self.def.default())
    }
}

struct ListenerEntry {
    id: ListenerId,
    field: FieldId,
    dead: bool,
    callback: Box<dyn FnMut(&Field<'_>) -> Listen>,
}

/// Mutable key/value store shared by a tree and everything embedded in it.
///
/// A blackboard is owned by the caller and threaded into the tree by `&mut`,
/// so exactly one writer exists at any point of a tick.
pub struct Blackboard {
    def: Arc<BlackboardDef>,
    slots: Vec<Option<Value>>,
    listeners: Vec<ListenerEntry>,
    next_listener: u64,
}

impl Blackboard {
    pub fn new(def: Arc<BlackboardDef>) -> Self {
        let slots = vec![None; def.len()];
        Self {
            def,
            slots,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn def(&self) -> &BlackboardDef {
        &self.def
    }

    pub fn field(&self, name: &str) -> Option<FieldId> {
        self.def.get(name)
    }

    /// True once the field has been explicitly written.
    pub fn is_set(&self, field: FieldId) -> bool {
        self.slots[field.index()].is_some()
    }

    /// The written value, or the declared default while unset.
    pub fn value(&self, field: FieldId) -> &Value {
        match &self.slots[field.index()] {
            Some(value) => value,
            None => self.def.field(field).default(),
        }
    }

    /// Typed read. Unknown names return `fallback`; a kind mismatch between
    /// `T` and the field is a caller bug and panics.
    pub fn get<T: FromValue>(&self, name: &str, fallback: T) -> T {
        let Some(id) = self.field(name) else {
            return fallback;
        };
        match T::from_value(self.value(id)) {
            Some(value) => value,
            None => panic!(
                "blackboard type mismatch for field `{name}` (stored kind differs from requested)"
            ),
        }
    }

    /// Writes a field and synchronously notifies its listeners when the value
    /// changed or was set for the first time. Returns false for unknown
    /// names; panics when the value kind does not match the field.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> bool {
        let Some(id) = self.field(name) else {
            return false;
        };
        let value = value.into();
        let declared = self.def.field(id).kind();
        if value.kind() != declared {
            panic!(
                "blackboard type mismatch for field `{name}` (wrote {:?} into a {declared:?} field)",
                value.kind()
            );
        }
        let slot = &mut self.slots[id.index()];
        let changed = match slot {
            Some(old) => *old != value,
            None => true,
        };
        *slot = Some(value);
        if changed {
            self.notify(id);
        }
        true
    }

    /// Registers a synchronous change listener for one field. The callback
    /// runs inside `set` and signals its own removal by returning
    /// [`Listen::Stop`].
    pub fn subscribe(
        &mut self,
        field: FieldId,
        callback: impl FnMut(&Field<'_>) -> Listen + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push(ListenerEntry {
            id,
            field,
            dead: false,
            callback: Box::new(callback),
        });
        id
    }

    pub fn unsubscribe(&mut self, listener: ListenerId) {
        self.listeners.retain(|entry| entry.id != listener);
    }

    fn notify(&mut self, field: FieldId) {
        // Listeners only see a read-only field view, so the list cannot grow
        // mid-fanout; removal is deferred to the sweep below.
        for i in 0..self.listeners.len() {
            if self.listeners[i].dead || self.listeners[i].field != field {
                continue;
            }
            let view = Field {
                id: field,
                def: self.def.field(field),
                value: self.slots[field.index()].as_ref(),
            };
            let entry = &mut self.listeners[i];
            if (entry.callback)(&view) == Listen::Stop {
                entry.dead = true;
            }
        }
        self.listeners.retain(|entry| !entry.dead);
    }
}
