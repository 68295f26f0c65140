use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use super::remember::RememberedState;
use crate::transport::TransferProgress;

/// The form's data record: current field values, the committed defaults
/// snapshot, and the derived status fields a UI observes.
///
/// The field key set is fixed at construction. `defaults` is never aliased
/// with `fields`; every read of it is a deep copy, and it only advances when
/// the submission coordinator commits a success. Every mutator of `fields`
/// ends by recomputing `is_dirty` against `defaults`, so dirtiness is
/// consistent whenever a public mutator returns.
#[derive(Debug, Clone)]
pub struct FormState {
    pub(crate) fields: Map<String, Value>,
    pub(crate) defaults: Map<String, Value>,
    pub(crate) errors: BTreeMap<String, String>,
    pub(crate) error_message: Option<String>,
    pub(crate) has_errors: bool,
    pub(crate) is_dirty: bool,
    pub(crate) processing: bool,
    pub(crate) progress: Option<TransferProgress>,
    pub(crate) was_successful: bool,
    pub(crate) recently_successful: bool,
    pub(crate) remember_key: Option<String>,
}

impl FormState {
    /// Create a form state over `initial`, deep-copying it into both the
    /// live fields and the defaults snapshot.
    pub fn new(initial: Map<String, Value>) -> Self {
        let mut state = Self {
            defaults: initial.clone(),
            fields: initial,
            errors: BTreeMap::new(),
            error_message: None,
            has_errors: false,
            is_dirty: false,
            processing: false,
            progress: None,
            was_successful: false,
            recently_successful: false,
            remember_key: None,
        };
        // Immediate first fire of the dirtiness computation.
        state.refresh_dirty();
        state
    }

    /// Project the editable data out of the state: exactly the original
    /// field keys, none of the status fields.
    pub fn data(&self) -> Map<String, Value> {
        self.fields.clone()
    }

    /// Write one field. Keys outside the construction key set are ignored.
    pub fn set(&mut self, field: &str, value: Value) {
        if let Some(slot) = self.fields.get_mut(field) {
            *slot = value;
        } else {
            debug!(field, "ignoring write to unknown form field");
        }
        self.refresh_dirty();
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Restore every field to a deep copy of the defaults snapshot.
    /// Errors are left untouched.
    pub fn reset(&mut self) {
        self.fields = self.defaults.clone();
        self.refresh_dirty();
    }

    /// Restore only the named fields; other fields keep their current
    /// values. Names absent from the defaults key set are ignored.
    pub fn reset_fields(&mut self, names: &[&str]) {
        for name in names {
            if let Some(value) = self.defaults.get(*name) {
                self.fields.insert((*name).to_string(), value.clone());
            }
        }
        self.refresh_dirty();
    }

    /// Clear every field error and the top-level error message.
    pub fn clear_errors(&mut self) {
        self.errors.clear();
        self.error_message = None;
        self.has_errors = false;
    }

    /// Remove exactly the named fields' errors, keeping the rest. The
    /// top-level error message is left alone.
    pub fn clear_field_errors(&mut self, names: &[&str]) {
        for name in names {
            self.errors.remove(*name);
        }
        self.has_errors = !self.errors.is_empty();
    }

    /// Commit the current fields as the new defaults snapshot.
    pub(crate) fn advance_defaults(&mut self) {
        self.defaults = self.fields.clone();
        self.refresh_dirty();
    }

    /// Seed from a remembered snapshot: known field keys take the stored
    /// values, errors are restored wholesale.
    pub(crate) fn restore(&mut self, snapshot: RememberedState) {
        for (field, value) in snapshot.data {
            if self.fields.contains_key(&field) {
                self.fields.insert(field, value);
            }
        }
        self.errors = snapshot.errors;
        self.has_errors = !self.errors.is_empty();
        self.refresh_dirty();
    }

    fn refresh_dirty(&mut self) {
        self.is_dirty = self.fields != self.defaults;
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn processing(&self) -> bool {
        self.processing
    }

    pub fn progress(&self) -> Option<TransferProgress> {
        self.progress
    }

    pub fn was_successful(&self) -> bool {
        self.was_successful
    }

    pub fn recently_successful(&self) -> bool {
        self.recently_successful
    }

    pub fn remember_key(&self) -> Option<&str> {
        self.remember_key.as_deref()
    }

    /// Clone the observable state in one read.
    pub fn snapshot(&self) -> FormSnapshot {
        FormSnapshot {
            fields: self.fields.clone(),
            errors: self.errors.clone(),
            error_message: self.error_message.clone(),
            has_errors: self.has_errors,
            is_dirty: self.is_dirty,
            processing: self.processing,
            progress: self.progress,
            was_successful: self.was_successful,
            recently_successful: self.recently_successful,
        }
    }
}

/// One consistent view of the observable form state.
#[derive(Debug, Clone)]
pub struct FormSnapshot {
    pub fields: Map<String, Value>,
    pub errors: BTreeMap<String, String>,
    pub error_message: Option<String>,
    pub has_errors: bool,
    pub is_dirty: bool,
    pub processing: bool,
    pub progress: Option<TransferProgress>,
    pub was_successful: bool,
    pub recently_successful: bool,
}
