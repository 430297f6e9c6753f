use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use formstate::prelude::*;
use rust_decimal::Decimal;

#[derive(Clone, Debug, PartialEq, FormModel)]
struct Social {
    twitter: String,
    facebook: String,
}

#[derive(Clone, Debug, PartialEq, FormModel)]
struct PhoneNumber {
    number: String,
}

#[derive(Clone, Debug, PartialEq, FormModel)]
struct YoutubeForm {
    username: String,
    email: String,
    channel: String,
    social: Social,
    #[form(rename = "phoneNumbers")]
    phone_numbers: Vec<String>,
    #[form(rename = "phNumbers")]
    ph_numbers: Vec<PhoneNumber>,
    age: Decimal,
    dob: Option<NaiveDate>,
}

impl Default for YoutubeForm {
    fn default() -> Self {
        Self {
            username: "Batman".to_string(),
            email: String::new(),
            channel: String::new(),
            social: Social {
                twitter: String::new(),
                facebook: String::new(),
            },
            phone_numbers: vec![String::new(), String::new()],
            ph_numbers: vec![PhoneNumber {
                number: String::new(),
            }],
            age: Decimal::ZERO,
            dob: None,
        }
    }
}

fn build_form() -> FormController {
    let fields = YoutubeForm::fields();
    let controller = FormController::from_model(&YoutubeForm::default(), FormOptions::default());

    controller
        .register_field(
            fields.username(),
            FieldRules::new().required("Username is required"),
        )
        .expect("register username");
    controller
        .register_field(
            fields.email(),
            FieldRules::new()
                .required("Email is required")
                .email("Invalid email format")
                .check(
                    "notAdmin",
                    |value| value.as_text() != Some("admin@example.com"),
                    "Enter a different email address",
                )
                .check(
                    "notBlacklisted",
                    |value| !value.text_form().ends_with("baddomain.com"),
                    "This domain is not supported",
                ),
        )
        .expect("register email");
    controller
        .register_field(fields.channel(), FieldRules::new().required("Channel is required"))
        .expect("register channel");
    controller
        .register_field(
            fields.social().key("twitter"),
            FieldRules::new().required("Twitter is required"),
        )
        .expect("register twitter");
    controller
        .register_field(
            fields.phone_numbers().index(0),
            FieldRules::new().required("Primary phone number is required"),
        )
        .expect("register primary phone");
    controller
        .register_field_template(
            fields.ph_numbers().each().key("number"),
            FieldRules::new().required("Phone number is required"),
        )
        .expect("register phone list template");
    controller
        .register_field(
            fields.age(),
            FieldRules::new()
                .required("Age is required")
                .value_as_number(),
        )
        .expect("register age");
    controller
        .register_field(
            fields.dob(),
            FieldRules::new()
                .required("Date of birth is required")
                .value_as_date(),
        )
        .expect("register dob");
    controller
}

/// Renders the dynamic phone list the way a view would: one row per entry,
/// keyed by entry id.
fn rendered_phone_rows(controller: &FormController) -> Vec<(EntryId, String)> {
    controller
        .list_entries(YoutubeForm::fields().ph_numbers())
        .expect("list phone entries")
        .into_iter()
        .map(|entry| {
            let number = entry
                .get("number")
                .map(|value| value.text_form().into_owned())
                .unwrap_or_default();
            (entry.id, number)
        })
        .collect()
}

#[test]
fn youtube_form_end_to_end() {
    let fields = YoutubeForm::fields();
    let controller = build_form();

    let watched_username = Arc::new(Mutex::new(Vec::new()));
    let subscription = {
        let watched_username = watched_username.clone();
        controller
            .watch_with(fields.username(), move |value| {
                watched_username
                    .lock()
                    .expect("watched lock")
                    .push(value.text_form().into_owned());
            })
            .expect("watch username")
    };
    assert_eq!(
        controller.watch(fields.username()).expect("poll username"),
        Some(FieldValue::text("Batman"))
    );

    let email = controller.bind(fields.email()).expect("bind email");
    email.on_change("admin@example.com").expect("type admin email");
    email.on_blur().expect("blur email");
    assert_eq!(
        email.display_error().expect("email display error"),
        Some("Enter a different email address".to_string())
    );
    email.on_change("bruce@wayne.com").expect("type valid email");
    assert_eq!(email.error().expect("email error"), None);

    controller
        .set_value(fields.username(), "Bruce")
        .expect("rename user");
    controller
        .set_value(fields.channel(), "Wayne Enterprises")
        .expect("set channel");
    controller
        .set_value(fields.social().key("twitter"), "@bruce")
        .expect("set twitter");
    controller
        .set_value(fields.phone_numbers().index(0), "555-0100")
        .expect("set primary phone");
    controller
        .set_value(fields.age(), "thirty")
        .expect("type bad age");
    assert!(matches!(
        controller.error(fields.age()).expect("age error").map(|error| error.kind),
        Some(FieldErrorKind::TypeCoercionFailed { .. })
    ));
    controller.set_value(fields.age(), "35").expect("type age");
    controller
        .set_value(fields.dob(), "1985-02-19")
        .expect("type dob");

    let rows = rendered_phone_rows(&controller);
    assert_eq!(rows.len(), 1);
    controller
        .set_value(fields.ph_numbers().entry(rows[0].0).key("number"), "555-0101")
        .expect("fill first phone row");
    let added = controller
        .append_list_model(
            fields.ph_numbers(),
            &PhoneNumber {
                number: String::new(),
            },
        )
        .expect("add phone row");

    let submissions = Arc::new(Mutex::new(Vec::new()));
    let submit = |controller: &FormController| {
        let submissions = submissions.clone();
        controller
            .submit_model(move |model: YoutubeForm| {
                submissions.lock().expect("submissions lock").push(model);
                Ok(())
            })
            .expect("submit")
    };

    submit(&controller);
    assert!(submissions.lock().expect("submissions lock").is_empty());
    let added_number = fields.ph_numbers().entry(added).key("number");
    assert_eq!(
        controller
            .error_for_display(&added_number)
            .expect("added row display error"),
        Some("Phone number is required".to_string())
    );

    controller
        .remove_list_entry(fields.ph_numbers(), added)
        .expect("remove empty phone row");
    assert_eq!(controller.error(&added_number).expect("stale error"), None);
    assert_eq!(rendered_phone_rows(&controller).len(), 1);

    submit(&controller);
    let snapshot = controller.snapshot().expect("snapshot");
    assert!(snapshot.is_valid);
    assert_eq!(snapshot.submit_state, SubmitState::Succeeded);
    assert_eq!(snapshot.submit_count, 2);

    let submissions = submissions.lock().expect("submissions lock");
    assert_eq!(submissions.len(), 1);
    let submitted = &submissions[0];
    assert_eq!(submitted.username, "Bruce");
    assert_eq!(submitted.email, "bruce@wayne.com");
    assert_eq!(submitted.age, Decimal::from(35));
    assert_eq!(submitted.dob, NaiveDate::from_ymd_opt(1985, 2, 19));
    assert_eq!(
        submitted.ph_numbers,
        vec![PhoneNumber {
            number: "555-0101".to_string()
        }]
    );

    subscription.unsubscribe();
    controller
        .set_value(fields.username(), "Batman")
        .expect("rename after unsubscribe");
    assert_eq!(
        *watched_username.lock().expect("watched lock"),
        vec!["Bruce".to_string()]
    );
}
