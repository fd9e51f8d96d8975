//! Field descriptors and the per-record-type ordinal allocator

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Ordinal reserved for the record identifier
pub const ID_ORDINAL: usize = 0;

/// An opaque field descriptor: (ordinal, display name).
///
/// Ordinals are the lookup key into the index registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    ordinal: usize,
    name: Arc<str>,
}

impl Field {
    /// The identifier field (ordinal 0)
    pub fn id() -> Self {
        Self {
            ordinal: ID_ORDINAL,
            name: Arc::from("id"),
        }
    }

    /// Returns the ordinal
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Returns the display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true for the identifier field
    pub fn is_id(&self) -> bool {
        self.ordinal == ID_ORDINAL
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Hands out field ordinals for one record type.
///
/// Ordinals start at 1. Registering the same name twice returns the
/// original descriptor.
#[derive(Debug)]
pub struct Schema {
    name: String,
    next_ordinal: AtomicUsize,
    fields: Mutex<Vec<Field>>,
}

impl Schema {
    /// Creates a schema containing only the identifier field
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_ordinal: AtomicUsize::new(ID_ORDINAL + 1),
            fields: Mutex::new(vec![Field::id()]),
        }
    }

    /// Schema name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declares a field, assigning the next ordinal
    pub fn field(&self, name: &str) -> Field {
        let mut fields = self.fields.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = fields.iter().find(|f| f.name() == name) {
            return existing.clone();
        }

        let field = Field {
            ordinal: self.next_ordinal.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name),
        };
        fields.push(field.clone());
        field
    }

    /// Looks up a declared field by name
    pub fn lookup(&self, name: &str) -> Option<Field> {
        let fields = self.fields.lock().unwrap_or_else(PoisonError::into_inner);
        fields.iter().find(|f| f.name() == name).cloned()
    }

    /// All declared fields in ordinal order, identifier first
    pub fn fields(&self) -> Vec<Field> {
        self.fields
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of ordinals in use, including the identifier
    pub fn len(&self) -> usize {
        self.next_ordinal.load(Ordering::Relaxed)
    }

    /// Always false: the identifier field is always declared
    pub fn is_empty(&self) -> bool {
        false
    }
}
