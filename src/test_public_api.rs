use chrono::NaiveDate;
use rust_decimal::Decimal;

#[derive(Clone, Debug, PartialEq, crate::form::FormModel)]
struct ApiSmokeForm {
    title: String,
    amount: Decimal,
    due: Option<NaiveDate>,
    tags: Vec<String>,
}

#[test]
fn prelude_exports_controller_surface() {
    use crate::prelude::*;

    let defaults = FormValues::new()
        .with("title", "")
        .with("tags", FieldValue::list([FieldValue::text("a")]));
    let controller = FormController::new(defaults, FormOptions::default());
    let binding: FieldBinding = controller
        .register_field("title", FieldRules::new().required("Title is required"))
        .expect("register title");

    binding.on_change("").expect("change title");
    let error: Option<FieldError> = binding.error().expect("binding error");
    assert_eq!(error.map(|error| error.kind), Some(FieldErrorKind::Required));

    let subscription: Subscription = controller
        .watch_all_with(|_values| {})
        .expect("subscribe");
    subscription.unsubscribe();

    let path: FieldPath = "tags.0".parse().expect("parse path");
    assert_eq!(path.to_string(), "tags.0");
    let _: Coercion = FieldRules::new().value_as_date().coercion();
    let _ = ValidationMode::OnBlur;
    let _: RawValue = RawValue::from(7_i64);
    let _: FormResult<EntryId> = Err(FormError::AlreadySubmitting);
}

#[test]
fn derived_model_drives_typed_controller() {
    use crate::prelude::*;

    let defaults = ApiSmokeForm {
        title: String::new(),
        amount: Decimal::ZERO,
        due: None,
        tags: Vec::new(),
    };
    let fields = ApiSmokeForm::fields();
    let controller = FormController::from_model(&defaults, FormOptions::default());
    controller
        .register_field(fields.title(), FieldRules::new().required("Title is required"))
        .expect("register title");
    controller
        .set_value(fields.title(), "Invoice")
        .expect("set title");
    controller
        .set_value(fields.amount(), "12.50")
        .expect("set amount");
    controller
        .set_value(fields.due(), "2026-01-31")
        .expect("set due date");

    let mut submitted = None;
    controller
        .submit_model(|model: ApiSmokeForm| {
            submitted = Some(model);
            Ok(())
        })
        .expect("submit");
    let submitted = submitted.expect("model submitted");
    assert_eq!(submitted.title, "Invoice");
    assert_eq!(submitted.amount, Decimal::new(1250, 2));
    assert_eq!(submitted.due, NaiveDate::from_ymd_opt(2026, 1, 31));
}

#[test]
fn form_module_exports_schema_types() {
    use crate::form::{DATE_FORMAT, EMAIL_PATTERN, FieldKind, FormSchema, PathSegment, SubmitState};

    let schema = FormSchema::new().field("title", FieldKind::Text);
    assert_eq!(
        schema.empty_values().get(&crate::form::FieldPath::root().key("title")),
        Some(&crate::form::FieldValue::text(""))
    );
    assert_eq!(DATE_FORMAT, "%Y-%m-%d");
    assert!(EMAIL_PATTERN.starts_with('^'));
    let _ = PathSegment::Each;
    let _ = SubmitState::Idle;
}
