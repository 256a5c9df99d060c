//! Declarative form state and validation.
//!
//! Describe fields with [`FieldConfig`], optionally attach a [`Schema`]
//! (such as the built-in [`RuleSchema`]) and a submit callback, and drive the
//! resulting [`FormEngine`] from input events:
//!
//! - [`FormEngine::handle_change`] / [`FormEngine::set_field_value`] store a
//!   value and revalidate that field;
//! - [`FormEngine::handle_blur`] marks a field touched;
//! - [`FormEngine::handle_submit`] validates the whole form and awaits the
//!   callback, moving [`FormState::status`] through
//!   `idle -> validating -> submitting -> success | error`.
//!
//! Validation problems are data in [`FormState`], never `Err`s.
#![warn(missing_docs)]

mod engine;
mod field;
mod schema;
mod state;
mod values;

pub use engine::{FormEngine, FormEngineBuilder, FormError, SubmitOutcome};
pub use field::{FieldConfig, FieldType, TransformFn, ValidatorFn};
pub use schema::{Rule, RuleSchema, Schema, SchemaIssue};
pub use state::{ErrorKind, FieldError, FormState, SubmitStatus};
pub use values::FormValues;
