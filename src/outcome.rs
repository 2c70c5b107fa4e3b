use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::error::StageError;

/// A per-item failure attached to the form field it should be reported on.
#[derive(Debug)]
pub struct ValidationError {
    pub field: String,
    pub error: StageError,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, error: StageError) -> Self {
        Self {
            field: field.into(),
            error,
        }
    }

    pub fn message(&self) -> String {
        self.error.to_string()
    }
}

impl Serialize for ValidationError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ValidationError", 3)?;
        state.serialize_field("field", &self.field)?;
        state.serialize_field("code", self.error.code())?;
        state.serialize_field("message", &self.message())?;
        state.end()
    }
}

/// A value together with every diagnostic collected while producing it.
///
/// Stages return an `Outcome` instead of failing on the first bad item; the
/// caller folds the diagnostics of nested calls into its own with [`Outcome::absorb`].
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub errors: Vec<ValidationError>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            errors: Vec::new(),
        }
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Moves the diagnostics of `other` into `self` and hands back its value.
    pub fn absorb<U>(&mut self, other: Outcome<U>) -> U {
        self.errors.extend(other.errors);
        other.value
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
