use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;
use thiserror::Error;

use super::model::FormModel;
use super::path::{FieldPath, IntoFieldPath};
use super::schema::{FieldKind, FormSchema};
use super::validation::{FieldError, FieldRules, coerce};
use super::value::{FieldValue, FormValues, RawValue};
use super::watch::ListenerRegistry;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitState {
    Idle,
    Validating,
    Submitting,
    Succeeded,
    Failed,
}

/// When a field is validated in response to user interaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationMode {
    OnChange,
    OnBlur,
    OnSubmit,
    All,
}

impl ValidationMode {
    fn runs_on(self, trigger: Trigger) -> bool {
        matches!(
            (self, trigger),
            (ValidationMode::All, _)
                | (ValidationMode::OnChange, Trigger::Change)
                | (ValidationMode::OnBlur, Trigger::Blur)
        )
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Trigger {
    Change,
    Blur,
}

/// `validate_mode` applies until the first submit, `revalidate_mode` after.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FormOptions {
    pub validate_mode: ValidationMode,
    pub revalidate_mode: ValidationMode,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            validate_mode: ValidationMode::OnChange,
            revalidate_mode: ValidationMode::OnChange,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FieldMeta {
    pub dirty: bool,
    pub touched: bool,
}

#[derive(Clone, Debug)]
pub struct FormSnapshot {
    pub values: FormValues,
    pub errors: BTreeMap<FieldPath, FieldError>,
    pub field_meta: BTreeMap<FieldPath, FieldMeta>,
    pub submit_state: SubmitState,
    pub submit_count: u32,
    pub is_dirty: bool,
    pub is_valid: bool,
}

impl FormSnapshot {
    /// Error recorded for `path`; malformed paths have none.
    pub fn error(&self, path: impl IntoFieldPath) -> Option<&FieldError> {
        let path = path.into_field_path().ok()?;
        self.errors.get(&path)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FormError {
    #[error("invalid field path `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("field path `{0}` does not resolve in this form")]
    UnknownPath(FieldPath),
    #[error("field path `{0}` does not address a leaf value")]
    NotALeaf(FieldPath),
    #[error("field path `{0}` is not a field array")]
    NotAFieldArray(FieldPath),
    #[error("conflicting rules for `{path}`: {reason}")]
    ConflictingRules {
        path: FieldPath,
        reason: &'static str,
    },
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("entry does not match the item shape of field array `{0}`")]
    EntryShapeMismatch(FieldPath),
    #[error("form values do not match model `{0}`")]
    ModelMismatch(&'static str),
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("invalid submit state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: SubmitState, to: SubmitState },
    #[error("form submit is already in progress")]
    AlreadySubmitting,
}

pub type FormResult<T> = Result<T, FormError>;

pub(super) struct FormState {
    pub(super) defaults: FormValues,
    pub(super) values: FormValues,
    pub(super) errors: BTreeMap<FieldPath, FieldError>,
    /// Last raw input that failed coercion, per path. Reported ahead of the
    /// rules until a later input coerces.
    pub(super) coercion_errors: BTreeMap<FieldPath, FieldError>,
    pub(super) field_meta: BTreeMap<FieldPath, FieldMeta>,
    pub(super) submit_state: SubmitState,
    pub(super) submit_count: u32,
}

impl FormState {
    pub(super) fn ensure_meta(&mut self, path: FieldPath) -> &mut FieldMeta {
        self.field_meta.entry(path).or_default()
    }

    pub(super) fn refresh_dirty(&mut self, path: &FieldPath) {
        let dirty = self.values.get(path) != self.defaults.get(path);
        self.ensure_meta(path.clone()).dirty = dirty;
    }

    fn validates_on(&self, options: &FormOptions, trigger: Trigger) -> bool {
        let mode = if self.submit_count == 0 {
            options.validate_mode
        } else {
            options.revalidate_mode
        };
        mode.runs_on(trigger)
    }

    /// Drops everything recorded at or below `prefix`.
    pub(super) fn forget_subtree(&mut self, prefix: &FieldPath) {
        self.errors.retain(|path, _| !path.starts_with(prefix));
        self.coercion_errors.retain(|path, _| !path.starts_with(prefix));
        self.field_meta.retain(|path, _| !path.starts_with(prefix));
    }
}

/// Handle to one form's state. Clones share the same form.
#[derive(Clone)]
pub struct FormController {
    pub(super) options: FormOptions,
    pub(super) schema: Arc<FormSchema>,
    pub(super) state: Arc<RwLock<FormState>>,
    pub(super) rules: Arc<RwLock<BTreeMap<FieldPath, FieldRules>>>,
    pub(super) listeners: Arc<RwLock<ListenerRegistry>>,
}

impl FormController {
    /// Seeds the form from `defaults`, inferring the schema from their shape.
    pub fn new(defaults: FormValues, options: FormOptions) -> Self {
        let schema = FormSchema::infer(&defaults);
        Self::with_schema(schema, defaults, options)
    }

    pub fn with_schema(schema: FormSchema, defaults: FormValues, options: FormOptions) -> Self {
        Self {
            options,
            schema: Arc::new(schema),
            state: Arc::new(RwLock::new(FormState {
                values: defaults.clone(),
                defaults,
                errors: BTreeMap::new(),
                coercion_errors: BTreeMap::new(),
                field_meta: BTreeMap::new(),
                submit_state: SubmitState::Idle,
                submit_count: 0,
            })),
            rules: Arc::new(RwLock::new(BTreeMap::new())),
            listeners: Arc::new(RwLock::new(ListenerRegistry::default())),
        }
    }

    /// Seeds the form from a typed model, using the model's declared schema.
    pub fn from_model<M: FormModel>(defaults: &M, options: FormOptions) -> Self {
        Self::with_schema(M::schema(), defaults.to_values(), options)
    }

    pub fn options(&self) -> FormOptions {
        self.options
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    /// Writes raw input to a leaf, coercing it as declared, and revalidates
    /// that path when the validation mode asks for it.
    pub fn set_value(&self, path: impl IntoFieldPath, raw: impl Into<RawValue>) -> FormResult<()> {
        let path = path.into_field_path()?;
        let Some(path) = self.canonical_path(&path)? else {
            debug!("set_value ignored unknown path `{path}`");
            return Ok(());
        };
        let coercion = self.coercion_for(&path)?;
        let has_rules = self.rules_for(&path)?.is_some();
        let any = FieldKind::Any;
        let kind = self.schema.kind_at(&path).unwrap_or(&any);

        let (committed, validate) = {
            let mut state = write_lock(&self.state, "writing field value")?;
            let Some(slot) = state.values.get_mut(&path) else {
                return Ok(());
            };
            if !slot.is_leaf() {
                return Err(FormError::NotALeaf(path));
            }
            let committed = match coerce(raw.into(), coercion, kind) {
                Ok(value) => {
                    *slot = value;
                    // A typed leaf without rules is only validated while its
                    // coercion is failing.
                    if state.coercion_errors.remove(&path).is_some() && !has_rules {
                        state.errors.remove(&path);
                    }
                    state.refresh_dirty(&path);
                    true
                }
                Err(error) => {
                    debug!("coercion failed for `{path}`: {error}");
                    state.coercion_errors.insert(path.clone(), error);
                    false
                }
            };
            (committed, state.validates_on(&self.options, Trigger::Change))
        };

        if validate {
            self.validate_field(&path)?;
        }
        if committed {
            self.notify(&path)?;
        }
        Ok(())
    }

    /// Marks a field as touched, the blur half of a binding.
    pub fn touch(&self, path: impl IntoFieldPath) -> FormResult<()> {
        let path = path.into_field_path()?;
        let Some(path) = self.canonical_path(&path)? else {
            debug!("touch ignored unknown path `{path}`");
            return Ok(());
        };
        let validate = {
            let mut state = write_lock(&self.state, "touching field")?;
            state.ensure_meta(path.clone()).touched = true;
            state.validates_on(&self.options, Trigger::Blur)
        };
        if validate {
            self.validate_field(&path)?;
        }
        Ok(())
    }

    /// Validates the whole form and calls `on_valid` with the values only if
    /// no field has an error. A failed validation is not an `Err`; the errors
    /// stay available in the snapshot.
    pub fn submit(&self, on_valid: impl FnOnce(&FormValues) -> FormResult<()>) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "preparing submit")?;
            if state.submit_state == SubmitState::Submitting {
                return Err(FormError::AlreadySubmitting);
            }
            transition_submit_state(&mut state, SubmitState::Validating)?;
            state.submit_count = state.submit_count.saturating_add(1);
        }

        let errors = self.validate_all()?;
        if !errors.is_empty() {
            debug!("submit blocked by {} invalid field(s)", errors.len());
            let mut state = write_lock(&self.state, "handling submit validation failure")?;
            transition_submit_state(&mut state, SubmitState::Failed)?;
            return Ok(());
        }

        let values = {
            let mut state = write_lock(&self.state, "moving submit state to submitting")?;
            transition_submit_state(&mut state, SubmitState::Submitting)?;
            state.values.clone()
        };
        let submit_result = on_valid(&values);

        let mut state = write_lock(&self.state, "completing submit")?;
        if submit_result.is_ok() {
            transition_submit_state(&mut state, SubmitState::Succeeded)?;
        } else {
            transition_submit_state(&mut state, SubmitState::Failed)?;
        }
        submit_result
    }

    /// [`FormController::submit`] handing over the values as a typed model.
    pub fn submit_model<M: FormModel>(
        &self,
        on_valid: impl FnOnce(M) -> FormResult<()>,
    ) -> FormResult<()> {
        self.submit(|values| on_valid(M::from_values(values)?))
    }

    pub fn reset_to_initial(&self) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "resetting form")?;
            state.values = state.defaults.clone();
            state.submit_state = SubmitState::Idle;
            state.submit_count = 0;
            state.errors.clear();
            state.coercion_errors.clear();
            state.field_meta.clear();
        }
        self.prune_registrations()?;
        self.notify(&FieldPath::root())
    }

    pub fn reset_field(&self, path: impl IntoFieldPath) -> FormResult<()> {
        let path = path.into_field_path()?;
        let Some(path) = self.canonical_path(&path)? else {
            debug!("reset_field ignored unknown path `{path}`");
            return Ok(());
        };
        {
            let mut state = write_lock(&self.state, "resetting field")?;
            if let Some(initial) = state.defaults.get(&path).cloned() {
                if let Some(slot) = state.values.get_mut(&path) {
                    *slot = initial;
                }
            }
            state.forget_subtree(&path);
        }
        self.notify(&path)
    }

    pub fn clear_errors(&self) -> FormResult<()> {
        let mut state = write_lock(&self.state, "clearing all field errors")?;
        state.errors.clear();
        state.coercion_errors.clear();
        Ok(())
    }

    pub fn clear_field_error(&self, path: impl IntoFieldPath) -> FormResult<()> {
        let path = path.into_field_path()?;
        let path = self.canonical_path(&path)?.unwrap_or(path);
        let mut state = write_lock(&self.state, "clearing field error")?;
        state.errors.remove(&path);
        state.coercion_errors.remove(&path);
        Ok(())
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot> {
        let state = read_lock(&self.state, "creating form snapshot")?;
        Ok(FormSnapshot {
            values: state.values.clone(),
            errors: state.errors.clone(),
            field_meta: state.field_meta.clone(),
            submit_state: state.submit_state,
            submit_count: state.submit_count,
            is_dirty: state.values != state.defaults,
            is_valid: state.errors.is_empty(),
        })
    }

    pub fn values(&self) -> FormResult<FormValues> {
        Ok(read_lock(&self.state, "reading form values")?.values.clone())
    }

    pub fn value(&self, path: impl IntoFieldPath) -> FormResult<Option<FieldValue>> {
        let path = path.into_field_path()?;
        Ok(read_lock(&self.state, "reading field value")?
            .values
            .get(&path)
            .cloned())
    }

    pub fn error(&self, path: impl IntoFieldPath) -> FormResult<Option<FieldError>> {
        let path = path.into_field_path()?;
        let state = read_lock(&self.state, "reading field error")?;
        let path = state.values.canonicalize(&path).unwrap_or(path);
        Ok(state.errors.get(&path).cloned())
    }

    pub fn field_meta(&self, path: impl IntoFieldPath) -> FormResult<Option<FieldMeta>> {
        let path = path.into_field_path()?;
        let state = read_lock(&self.state, "reading field meta")?;
        let path = state.values.canonicalize(&path).unwrap_or(path);
        Ok(state.field_meta.get(&path).copied())
    }

    /// Error message to render inline: hidden until the field was touched or
    /// the form was submitted.
    pub fn error_for_display(&self, path: impl IntoFieldPath) -> FormResult<Option<String>> {
        let path = path.into_field_path()?;
        let state = read_lock(&self.state, "reading display error message")?;
        let path = state.values.canonicalize(&path).unwrap_or(path);
        let touched = state
            .field_meta
            .get(&path)
            .is_some_and(|meta| meta.touched);
        if !touched && state.submit_count == 0 {
            return Ok(None);
        }
        Ok(state.errors.get(&path).map(|error| error.message.clone()))
    }

    pub(super) fn canonical_path(&self, path: &FieldPath) -> FormResult<Option<FieldPath>> {
        Ok(read_lock(&self.state, "resolving field path")?
            .values
            .canonicalize(path))
    }

    /// Drops direct registrations whose path no longer resolves, e.g. rules
    /// of a removed field-array entry.
    pub(super) fn prune_registrations(&self) -> FormResult<()> {
        let state = read_lock(&self.state, "reading values for registration pruning")?;
        let mut rules = write_lock(&self.rules, "pruning field registrations")?;
        rules.retain(|path, _| path.is_template() || state.values.get(path).is_some());
        Ok(())
    }
}

pub(super) fn transition_submit_state(
    state: &mut FormState,
    next: SubmitState,
) -> FormResult<()> {
    let current = state.submit_state;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (SubmitState::Idle, SubmitState::Validating)
            | (SubmitState::Validating, SubmitState::Submitting)
            | (SubmitState::Validating, SubmitState::Failed)
            | (SubmitState::Submitting, SubmitState::Succeeded)
            | (SubmitState::Submitting, SubmitState::Failed)
            | (SubmitState::Succeeded, SubmitState::Validating)
            | (SubmitState::Failed, SubmitState::Validating)
            | (_, SubmitState::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    state.submit_state = next;
    Ok(())
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
