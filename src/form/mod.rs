mod binding;
mod controller;
mod field_array;
mod model;
mod path;
mod schema;
mod validation;
mod value;
mod watch;


pub use binding::FieldBinding;
pub use controller::{
    FieldMeta, FormController, FormError, FormOptions, FormResult, FormSnapshot, SubmitState,
    ValidationMode,
};
pub use formstate_form_derive::FormModel;
pub use model::{FieldModel, FormModel};
pub use path::{FieldPath, IntoFieldPath, PathSegment};
pub use schema::{FieldKind, FormSchema};
pub use validation::{
    Coercion, CustomValidatorFn, EMAIL_PATTERN, FieldError, FieldErrorKind, FieldRules,
};
pub use value::{
    DATE_FORMAT, EntryId, FieldArrayEntry, FieldGroup, FieldValue, FormValues, RawValue,
};
pub use watch::Subscription;
