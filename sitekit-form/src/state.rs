use indexmap::IndexMap;
use serde::Serialize;
use smol_str::SmolStr;

use crate::values::FormValues;

/// Submission lifecycle.
///
/// `Idle -> Validating -> Submitting -> (Success | Error)`; a failed
/// validation goes from `Validating` straight to `Error`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitStatus {
    /// No submission attempted since creation or reset.
    #[default]
    Idle,
    /// Running whole-form validation.
    Validating,
    /// Waiting for the submit callback.
    Submitting,
    /// The callback succeeded.
    Success,
    /// Validation or the callback failed.
    Error,
}

impl SubmitStatus {
    /// Returns `true` while a submission holds the form.
    pub fn is_busy(self) -> bool {
        matches!(self, SubmitStatus::Validating | SubmitStatus::Submitting)
    }
}

/// Which check produced a [`FieldError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// The field is required and empty.
    Required,
    /// A field validator, or an error set by the caller.
    Custom,
    /// The form schema.
    Schema,
}

/// Error attached to one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Message shown to the user.
    pub message: String,
    /// Check that produced it.
    pub kind: ErrorKind,
}

impl FieldError {
    /// Creates an error of `kind`.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

/// Snapshot of a form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormState {
    /// Current values.
    pub values: FormValues,
    /// Error slot per field; `None` when the field passed its last check.
    pub errors: IndexMap<SmolStr, Option<FieldError>>,
    /// Whether each field has been blurred or submitted.
    pub touched: IndexMap<SmolStr, bool>,
    /// `true` iff every error slot is empty.
    pub is_valid: bool,
    /// `true` once any value was set since creation or reset.
    pub is_dirty: bool,
    /// Submission status.
    pub status: SubmitStatus,
    /// Number of submit attempts since creation or reset.
    pub submit_count: u32,
    /// Message of the last failed submit callback.
    pub submit_error: Option<String>,
}

impl FormState {
    pub(crate) fn new(values: FormValues) -> Self {
        let errors = values.iter().map(|(name, _)| (name.clone(), None)).collect();
        let touched = values.iter().map(|(name, _)| (name.clone(), false)).collect();
        Self {
            values,
            errors,
            touched,
            is_valid: true,
            is_dirty: false,
            status: SubmitStatus::Idle,
            submit_count: 0,
            submit_error: None,
        }
    }

    /// Error of `name`, if any.
    pub fn error(&self, name: &str) -> Option<&FieldError> {
        self.errors.get(name).and_then(Option::as_ref)
    }

    /// Returns `true` if `name` has been touched.
    pub fn is_touched(&self, name: &str) -> bool {
        self.touched.get(name).copied().unwrap_or(false)
    }

    /// Error of `name` once the field was touched; what a UI should display.
    pub fn visible_error(&self, name: &str) -> Option<&FieldError> {
        self.error(name).filter(|_| self.is_touched(name))
    }

    pub(crate) fn set_error(&mut self, name: &str, error: Option<FieldError>) {
        if let Some(slot) = self.errors.get_mut(name) {
            *slot = error;
        }
        self.recompute_validity();
    }

    pub(crate) fn recompute_validity(&mut self) {
        self.is_valid = self.errors.values().all(Option::is_none);
    }
}
