use formstate::form::{FieldKind, FieldModel, FieldValue, FormModel};

#[derive(Clone, Debug, PartialEq, formstate::form::FormModel)]
struct Social {
    twitter: String,
    facebook: String,
}

#[derive(Clone, Debug, PartialEq, formstate::form::FormModel)]
struct PhoneEntry {
    number: String,
}

#[derive(Clone, Debug, PartialEq, formstate::form::FormModel)]
struct DemoForm {
    #[form(rename = "userName")]
    user_name: String,
    social: Social,
    #[form(rename = "phNumbers")]
    ph_numbers: Vec<PhoneEntry>,
    r#type: String,
}

fn main() {
    let fields = DemoForm::fields();
    assert_eq!(fields.user_name().to_string(), "userName");
    assert_eq!(fields.r#type().to_string(), "type");

    let model = DemoForm {
        user_name: "a".to_string(),
        social: Social {
            twitter: "@a".to_string(),
            facebook: String::new(),
        },
        ph_numbers: vec![PhoneEntry {
            number: "555".to_string(),
        }],
        r#type: "personal".to_string(),
    };
    let value = model.to_value();
    assert!(matches!(value, FieldValue::Group(_)));
    assert!(matches!(DemoForm::kind(), FieldKind::Group(_)));
    assert_eq!(DemoForm::from_values(&model.to_values()), Ok(model));
}
