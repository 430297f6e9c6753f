use super::controller::{FieldMeta, FormController, FormResult};
use super::path::FieldPath;
use super::validation::FieldError;
use super::value::{FieldValue, RawValue};

/// What an input element needs to drive one registered field: its name,
/// current value and change/blur callbacks.
#[derive(Clone)]
pub struct FieldBinding {
    controller: FormController,
    name: FieldPath,
}

impl FieldBinding {
    pub(super) fn new(controller: FormController, name: FieldPath) -> Self {
        Self { controller, name }
    }

    pub fn name(&self) -> &FieldPath {
        &self.name
    }

    pub fn value(&self) -> FormResult<Option<FieldValue>> {
        self.controller.value(&self.name)
    }

    pub fn on_change(&self, raw: impl Into<RawValue>) -> FormResult<()> {
        self.controller.set_value(&self.name, raw)
    }

    pub fn on_blur(&self) -> FormResult<()> {
        self.controller.touch(&self.name)
    }

    pub fn error(&self) -> FormResult<Option<FieldError>> {
        self.controller.error(&self.name)
    }

    pub fn display_error(&self) -> FormResult<Option<String>> {
        self.controller.error_for_display(&self.name)
    }

    pub fn meta(&self) -> FormResult<Option<FieldMeta>> {
        self.controller.field_meta(&self.name)
    }

    pub fn is_required(&self) -> FormResult<bool> {
        self.controller.is_required(&self.name)
    }
}

impl FormController {
    /// Binding for any concrete path, registered or not.
    pub fn bind(&self, path: impl super::path::IntoFieldPath) -> FormResult<FieldBinding> {
        let path = path.into_field_path()?;
        let path = self.canonical_path(&path)?.unwrap_or(path);
        Ok(FieldBinding::new(self.clone(), path))
    }
}
