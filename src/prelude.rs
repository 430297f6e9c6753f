pub use crate::form::{
    Coercion, EntryId, FieldBinding, FieldError, FieldErrorKind, FieldModel, FieldPath,
    FieldRules, FieldValue, FormController, FormError, FormModel, FormOptions, FormResult,
    FormSnapshot, FormValues, RawValue, SubmitState, Subscription, ValidationMode,
};
