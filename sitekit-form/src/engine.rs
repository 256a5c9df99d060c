//! The form engine.
//!
//! [`FormEngine`] owns the [`FormState`] of one form behind a lock; every
//! handler takes `&self` and never fails. Share it with an `Arc` when
//! several tasks drive the same form.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;
use smol_str::SmolStr;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::field::{FieldConfig, FieldType};
use crate::schema::Schema;
use crate::state::{ErrorKind, FieldError, FormState, SubmitStatus};
use crate::values::{FormValues, is_blank};

const STATUS_CHANNEL_CAPACITY: usize = 16;

static NULL: Value = Value::Null;

const SUBMIT_CANCELLED: &str = "Submission was cancelled";

type SubmitFn = Arc<dyn Fn(FormValues) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Errors raised while building a [`FormEngine`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormError {
    /// Two fields share a name.
    #[error("field `{0}` is declared more than once")]
    DuplicateField(SmolStr),

    /// A field depends on a field that is not declared.
    #[error("field `{field}` depends on undeclared field `{dependency}`")]
    UnknownDependency {
        /// The declaring field.
        field: SmolStr,
        /// The missing field.
        dependency: SmolStr,
    },
}

/// Result of [`FormEngine::handle_submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Validation passed and the callback succeeded.
    Submitted,
    /// Validation failed; the callback was not called.
    Invalid,
    /// The callback failed with this message.
    Failed(String),
    /// Another submission is in progress; nothing was done.
    AlreadySubmitting,
}

/// Builder for [`FormEngine`].
#[derive(Default)]
pub struct FormEngineBuilder {
    fields: Vec<FieldConfig>,
    schema: Option<Arc<dyn Schema>>,
    on_submit: Option<SubmitFn>,
}

impl FormEngineBuilder {
    /// Adds a field.
    pub fn field(mut self, field: FieldConfig) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds several fields.
    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldConfig>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Sets the schema run on single fields and on the whole form.
    pub fn schema<S>(mut self, schema: S) -> Self
    where
        S: Schema + 'static,
    {
        self.schema = Some(Arc::new(schema));
        self
    }

    /// Sets the callback awaited on a valid submit. An `Err` is stored as
    /// [`FormState::submit_error`].
    pub fn on_submit<F, Fut, E>(mut self, callback: F) -> Self
    where
        F: Fn(FormValues) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + 'static,
    {
        let submit: SubmitFn = Arc::new(move |values| {
            let future = callback(values);
            async move { future.await.map_err(|error| error.to_string()) }.boxed()
        });
        self.on_submit = Some(submit);
        self
    }

    /// Builds the engine. Field names must be unique and dependencies declared.
    pub fn build(self) -> Result<FormEngine, FormError> {
        let mut fields = IndexMap::with_capacity(self.fields.len());
        for field in self.fields {
            let name = field.name().clone();
            if fields.insert(name.clone(), field).is_some() {
                return Err(FormError::DuplicateField(name));
            }
        }

        let mut dependents: IndexMap<SmolStr, Vec<SmolStr>> = IndexMap::new();
        for field in fields.values() {
            for dependency in field.dependencies() {
                if !fields.contains_key(dependency) {
                    return Err(FormError::UnknownDependency {
                        field: field.name().clone(),
                        dependency: dependency.clone(),
                    });
                }
                dependents
                    .entry(dependency.clone())
                    .or_default()
                    .push(field.name().clone());
            }
        }

        let values = fields
            .values()
            .map(|field| (field.name().clone(), field.initial_value().clone()))
            .collect();
        let initial = FormState::new(values);
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);

        Ok(FormEngine {
            fields,
            dependents,
            schema: self.schema,
            on_submit: self.on_submit,
            state: RwLock::new(initial.clone()),
            initial,
            status_tx,
            epoch: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
        })
    }
}

/// Form state plus the handlers that mutate it.
///
/// ```
/// use sitekit_form::{FieldConfig, FieldType, FormEngine, Rule, RuleSchema, SubmitOutcome};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let engine = FormEngine::builder()
///     .field(FieldConfig::new("name").required())
///     .field(FieldConfig::new("email").kind(FieldType::Email).required())
///     .schema(RuleSchema::new().rule("email", Rule::Email))
///     .on_submit(|values| async move {
///         println!("sending {}", values.to_json());
///         Ok::<_, std::io::Error>(())
///     })
///     .build()
///     .unwrap();
///
/// engine.handle_change("name", "Ada");
/// engine.handle_change("email", "ada@example.com");
/// assert_eq!(engine.handle_submit().await, SubmitOutcome::Submitted);
/// # }
/// ```
pub struct FormEngine {
    fields: IndexMap<SmolStr, FieldConfig>,
    dependents: IndexMap<SmolStr, Vec<SmolStr>>,
    schema: Option<Arc<dyn Schema>>,
    on_submit: Option<SubmitFn>,
    initial: FormState,
    state: RwLock<FormState>,
    status_tx: broadcast::Sender<SubmitStatus>,
    /// Bumped on reset; a submission started in an older epoch does not
    /// write its result.
    epoch: AtomicU64,
    /// Set while a submit callback runs; survives reset.
    in_flight: AtomicBool,
}

impl FormEngine {
    /// Starts a [`FormEngineBuilder`].
    pub fn builder() -> FormEngineBuilder {
        FormEngineBuilder::default()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> FormState {
        self.read().clone()
    }

    /// The state the form was created with, and returns to on reset.
    pub fn initial_state(&self) -> &FormState {
        &self.initial
    }

    /// Current values.
    pub fn values(&self) -> FormValues {
        self.read().values.clone()
    }

    /// Current submission status.
    pub fn status(&self) -> SubmitStatus {
        self.read().status
    }

    /// Returns `true` if no field has an error.
    pub fn is_valid(&self) -> bool {
        self.read().is_valid
    }

    /// Descriptor of `name`.
    pub fn field(&self, name: &str) -> Option<&FieldConfig> {
        self.fields.get(name)
    }

    /// Receives every submission status change.
    pub fn subscribe(&self) -> broadcast::Receiver<SubmitStatus> {
        self.status_tx.subscribe()
    }

    /// Sets `name` from raw input, read according to the field type.
    pub fn handle_change(&self, name: &str, raw: &str) {
        let Some(field) = self.lookup(name) else {
            return;
        };
        self.set_field_value(name, field.field_type().coerce(raw));
    }

    /// Transforms and stores `value`, marks the form dirty and revalidates
    /// the field along with touched fields depending on it.
    pub fn set_field_value(&self, name: &str, value: Value) {
        let Some(field) = self.lookup(name) else {
            return;
        };
        let value = field.apply_transform(value);

        let mut state = self.write();
        state.values.insert(field.name().clone(), value);
        state.is_dirty = true;
        self.revalidate(&mut state, field);

        for dependent in self.dependents.get(name).into_iter().flatten() {
            if let Some(dependent) = self.fields.get(dependent)
                && state.is_touched(dependent.name())
            {
                self.revalidate(&mut state, dependent);
            }
        }
    }

    /// Marks `name` touched and revalidates it.
    pub fn handle_blur(&self, name: &str) {
        let Some(field) = self.lookup(name) else {
            return;
        };
        let mut state = self.write();
        state.touched.insert(field.name().clone(), true);
        self.revalidate(&mut state, field);
    }

    /// Sets or clears the error of `name`, e.g. from a server response.
    pub fn set_field_error(&self, name: &str, message: Option<String>) {
        if self.lookup(name).is_none() {
            return;
        }
        let error = message.map(|message| FieldError::new(ErrorKind::Custom, message));
        self.write().set_error(name, error);
    }

    /// Returns the form to its initial state.
    ///
    /// A submission still awaiting its callback finishes without touching
    /// the reset state, and keeps new submissions out until it does.
    pub fn reset_form(&self) {
        let mut state = self.write();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let previous = state.status;
        *state = self.initial.clone();
        if previous != SubmitStatus::Idle {
            let _ = self.status_tx.send(SubmitStatus::Idle);
        }
        debug!("form reset");
    }

    /// Revalidates `name` and returns its error.
    pub fn validate_field(&self, name: &str) -> Option<FieldError> {
        let field = self.lookup(name)?;
        self.revalidate(&mut self.write(), field)
    }

    /// Revalidates every field and runs the schema on the whole form.
    /// Returns `true` iff no field has an error.
    pub fn validate_form(&self) -> bool {
        self.validate_all(&mut self.write())
    }

    /// Validates, then awaits the submit callback with the current values.
    ///
    /// Every attempt marks all fields touched and counts in
    /// [`FormState::submit_count`], except one made while another submission
    /// is in progress, which returns [`SubmitOutcome::AlreadySubmitting`].
    ///
    /// A callback panic is reported as [`SubmitOutcome::Failed`]. Dropping
    /// the returned future while the callback runs fails the submission
    /// with [`FormState::submit_error`] set, so the form accepts the next
    /// submit.
    pub async fn handle_submit(&self) -> SubmitOutcome {
        let (in_flight, values) = {
            let mut state = self.write();
            if state.status.is_busy() || self.in_flight.load(Ordering::SeqCst) {
                debug!(status = ?state.status, "submit ignored, already submitting");
                return SubmitOutcome::AlreadySubmitting;
            }
            let epoch = self.epoch.load(Ordering::SeqCst);

            state.submit_count = state.submit_count.saturating_add(1);
            state.submit_error = None;
            state.touched.values_mut().for_each(|touched| *touched = true);
            self.transition(&mut state, SubmitStatus::Validating);

            if !self.validate_all(&mut state) {
                self.transition(&mut state, SubmitStatus::Error);
                return SubmitOutcome::Invalid;
            }
            self.transition(&mut state, SubmitStatus::Submitting);
            let values = state.values.clone();
            (InFlight::start(self, epoch), values)
        };

        let result = match &self.on_submit {
            Some(callback) => run_callback(callback, values).await,
            None => Ok(()),
        };

        let mut state = self.write();
        let current = in_flight.finish();
        if !current {
            debug!("form was reset during submission, result discarded");
        }
        match result {
            Ok(()) => {
                if current {
                    self.transition(&mut state, SubmitStatus::Success);
                }
                SubmitOutcome::Submitted
            }
            Err(message) => {
                warn!(%message, "submit callback failed");
                if current {
                    state.submit_error = Some(message.clone());
                    self.transition(&mut state, SubmitStatus::Error);
                }
                SubmitOutcome::Failed(message)
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<&FieldConfig> {
        let field = self.fields.get(name);
        if field.is_none() {
            warn!(field = name, "unknown form field");
        }
        field
    }

    fn revalidate(&self, state: &mut FormState, field: &FieldConfig) -> Option<FieldError> {
        let error = self.check_field(field, &state.values);
        trace!(field = %field.name(), error = ?error, "field validated");
        state.set_error(field.name(), error.clone());
        error
    }

    fn validate_all(&self, state: &mut FormState) -> bool {
        for field in self.fields.values() {
            let error = self.check_field(field, &state.values);
            if let Some(slot) = state.errors.get_mut(field.name()) {
                *slot = error;
            }
        }

        if let Some(Err(issues)) = self.schema.as_ref().map(|schema| schema.validate(&state.values))
        {
            for issue in issues {
                match state.errors.get_mut(issue.path.as_str()) {
                    Some(slot) if slot.is_none() => {
                        *slot = Some(FieldError::new(ErrorKind::Schema, issue.message));
                    }
                    Some(_) => {}
                    None => debug!(path = %issue.path, "schema issue for undeclared field ignored"),
                }
            }
        }

        state.recompute_validity();
        debug!(valid = state.is_valid, "form validated");
        state.is_valid
    }

    /// Required check, then the field validator, then the schema on the
    /// field alone. The first failure wins.
    fn check_field(&self, field: &FieldConfig, values: &FormValues) -> Option<FieldError> {
        let value = values.get(field.name()).unwrap_or(&NULL);

        if field.is_required() && is_missing(field, value) {
            return Some(FieldError::new(
                ErrorKind::Required,
                format!("{} is required", field.display_label()),
            ));
        }

        if let Some(message) = field.run_validator(value, values) {
            return Some(FieldError::new(ErrorKind::Custom, message));
        }

        let schema = self.schema.as_ref()?;
        schema
            .validate(&values.project(field.name()))
            .err()?
            .into_iter()
            .find(|issue| issue.path == *field.name())
            .map(|issue| FieldError::new(ErrorKind::Schema, issue.message))
    }

    fn transition(&self, state: &mut FormState, next: SubmitStatus) {
        if state.status == next {
            return;
        }
        debug!(from = ?state.status, to = ?next, "submit status changed");
        state.status = next;
        let _ = self.status_tx.send(next);
    }

    fn read(&self) -> RwLockReadGuard<'_, FormState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FormState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks a submission in flight from the `Submitting` transition until its
/// result is written. Dropped unfinished, it fails the submission.
struct InFlight<'a> {
    engine: &'a FormEngine,
    epoch: u64,
    finished: bool,
}

impl<'a> InFlight<'a> {
    fn start(engine: &'a FormEngine, epoch: u64) -> Self {
        engine.in_flight.store(true, Ordering::SeqCst);
        Self {
            engine,
            epoch,
            finished: false,
        }
    }

    /// Ends the submission. Call with the state lock held; returns whether
    /// the form was not reset meanwhile.
    fn finish(mut self) -> bool {
        self.finished = true;
        self.engine.in_flight.store(false, Ordering::SeqCst);
        self.is_current()
    }

    fn is_current(&self) -> bool {
        self.engine.epoch.load(Ordering::SeqCst) == self.epoch
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.engine.write();
        self.engine.in_flight.store(false, Ordering::SeqCst);
        if self.is_current() {
            warn!("submission dropped before the callback finished");
            state.submit_error = Some(SUBMIT_CANCELLED.to_owned());
            self.engine.transition(&mut state, SubmitStatus::Error);
        }
    }
}

async fn run_callback(callback: &SubmitFn, values: FormValues) -> Result<(), String> {
    let future = panic::catch_unwind(AssertUnwindSafe(|| callback(values))).map_err(panic_message)?;
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(panic_message)?
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|detail| (*detail).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => format!("Submit callback panicked: {detail}"),
        None => "Submit callback panicked".to_owned(),
    }
}

fn is_missing(field: &FieldConfig, value: &Value) -> bool {
    match field.field_type() {
        FieldType::Checkbox => value.as_bool() != Some(true),
        _ => is_blank(value),
    }
}

impl fmt::Debug for FormEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormEngine")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("schema", &self.schema.is_some())
            .field("on_submit", &self.on_submit.is_some())
            .field("state", &*self.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchemaIssue;
    use serde_json::json;

    #[test]
    fn test_duplicate_field_rejected() {
        let err = FormEngine::builder()
            .field(FieldConfig::new("a"))
            .field(FieldConfig::new("a"))
            .build()
            .unwrap_err();
        assert_eq!(err, FormError::DuplicateField("a".into()));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = FormEngine::builder()
            .field(FieldConfig::new("confirm").depends_on("password"))
            .build()
            .unwrap_err();
        assert!(matches!(err, FormError::UnknownDependency { .. }));
    }

    #[test]
    fn test_required_checkbox_must_be_checked() {
        let engine = FormEngine::builder()
            .field(FieldConfig::new("terms").kind(FieldType::Checkbox).required())
            .build()
            .unwrap();
        assert_eq!(
            engine.validate_field("terms").map(|error| error.kind),
            Some(ErrorKind::Required)
        );
        engine.handle_change("terms", "on");
        assert_eq!(engine.state().error("terms"), None);
        assert_eq!(engine.values().get("terms"), Some(&json!(true)));
    }

    #[test]
    fn test_unknown_field_is_ignored() {
        let engine = FormEngine::builder()
            .field(FieldConfig::new("a"))
            .build()
            .unwrap();
        engine.set_field_value("b", json!("x"));
        engine.handle_blur("b");
        engine.set_field_error("b", Some("nope".into()));
        assert_eq!(engine.validate_field("b"), None);
        assert_eq!(engine.state(), *engine.initial_state());
    }

    #[test]
    fn test_schema_issue_for_undeclared_field_is_ignored() {
        let engine = FormEngine::builder()
            .field(FieldConfig::new("a"))
            .schema(|_: &FormValues| Err::<(), _>(vec![SchemaIssue::new("ghost", "boo")]))
            .build()
            .unwrap();
        assert!(engine.validate_form());
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let engine = Arc::new(
            FormEngine::builder()
                .field(FieldConfig::new("a"))
                .build()
                .unwrap(),
        );
        let poisoner = Arc::clone(&engine);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.state.write().unwrap();
            panic!("poison the form lock");
        })
        .join();

        engine.set_field_value("a", json!("still works"));
        assert_eq!(engine.values().get_str("a"), Some("still works"));
    }
}
