use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use chrono::NaiveDate;
use log::{debug, trace};
use regex::Regex;
use rust_decimal::Decimal;

use super::binding::FieldBinding;
use super::controller::{FormController, FormError, FormResult, read_lock, write_lock};
use super::path::{FieldPath, IntoFieldPath};
use super::schema::FieldKind;
use super::value::{DATE_FORMAT, FieldValue, RawValue};

/// Email pattern applied by [`FieldRules::email`].
pub const EMAIL_PATTERN: &str =
    r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9-]+(?:\.[a-zA-Z0-9-]+)*$";

static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(EMAIL_PATTERN).expect("email pattern is a valid regex"));

pub type CustomValidatorFn = Arc<dyn Fn(&FieldValue) -> Result<(), String> + Send + Sync>;

/// How raw input is turned into a stored value.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Coercion {
    /// Keep raw text as text.
    #[default]
    None,
    AsNumber,
    AsDate,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldErrorKind {
    Required,
    PatternMismatch,
    CustomValidationFailed { validator: String },
    TypeCoercionFailed { expected: Coercion },
}

/// Validation failure recorded for one field path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldError {
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Clone)]
struct PatternRule {
    regex: Regex,
    message: String,
}

#[derive(Clone)]
struct NamedValidator {
    name: String,
    validate: CustomValidatorFn,
}

/// Validation rules and coercion registered for a field.
///
/// Evaluation order is fixed: required, then pattern, then the named
/// validators in declaration order. The first failure is reported.
#[derive(Clone, Default)]
pub struct FieldRules {
    required: Option<String>,
    pattern: Option<PatternRule>,
    validators: Vec<NamedValidator>,
    coercion: Coercion,
}

impl Debug for FieldRules {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRules")
            .field("required", &self.required)
            .field("pattern", &self.pattern.as_ref().map(|pattern| pattern.regex.as_str()))
            .field("validators", &self.validator_names().collect::<Vec<_>>())
            .field("coercion", &self.coercion)
            .finish()
    }
}

impl FieldRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, message: impl Into<String>) -> Self {
        self.required = Some(message.into());
        self
    }

    pub fn pattern(mut self, pattern: &str, message: impl Into<String>) -> FormResult<Self> {
        let regex = Regex::new(pattern).map_err(|error| FormError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: error.to_string(),
        })?;
        self.pattern = Some(PatternRule {
            regex,
            message: message.into(),
        });
        Ok(self)
    }

    /// Pattern rule using [`EMAIL_PATTERN`].
    pub fn email(mut self, message: impl Into<String>) -> Self {
        self.pattern = Some(PatternRule {
            regex: EMAIL_REGEX.clone(),
            message: message.into(),
        });
        self
    }

    /// Adds a named validator. Reusing a name replaces that validator in
    /// place, keeping its position.
    pub fn validate<F>(mut self, name: impl Into<String>, validate: F) -> Self
    where
        F: Fn(&FieldValue) -> Result<(), String> + Send + Sync + 'static,
    {
        let name = name.into();
        let validate: CustomValidatorFn = Arc::new(validate);
        match self.validators.iter_mut().find(|entry| entry.name == name) {
            Some(existing) => existing.validate = validate,
            None => self.validators.push(NamedValidator { name, validate }),
        }
        self
    }

    /// Adds a named predicate that fails with `message` when it returns false.
    pub fn check<F>(self, name: impl Into<String>, predicate: F, message: impl Into<String>) -> Self
    where
        F: Fn(&FieldValue) -> bool + Send + Sync + 'static,
    {
        let message = message.into();
        self.validate(name, move |value| {
            if predicate(value) {
                Ok(())
            } else {
                Err(message.clone())
            }
        })
    }

    pub fn value_as_number(mut self) -> Self {
        self.coercion = Coercion::AsNumber;
        self
    }

    pub fn value_as_date(mut self) -> Self {
        self.coercion = Coercion::AsDate;
        self
    }

    pub fn coercion(&self) -> Coercion {
        self.coercion
    }

    pub fn is_required(&self) -> bool {
        self.required.is_some()
    }

    pub fn validator_names(&self) -> impl Iterator<Item = &str> {
        self.validators.iter().map(|entry| entry.name.as_str())
    }

    pub(super) fn evaluate(&self, value: &FieldValue) -> Option<FieldError> {
        if let Some(message) = &self.required {
            if value.is_unset() {
                return Some(FieldError {
                    kind: FieldErrorKind::Required,
                    message: message.clone(),
                });
            }
        }

        if let Some(pattern) = &self.pattern {
            if !pattern.regex.is_match(&value.text_form()) {
                return Some(FieldError {
                    kind: FieldErrorKind::PatternMismatch,
                    message: pattern.message.clone(),
                });
            }
        }

        self.validators.iter().find_map(|entry| {
            (entry.validate)(value).err().map(|message| FieldError {
                kind: FieldErrorKind::CustomValidationFailed {
                    validator: entry.name.clone(),
                },
                message,
            })
        })
    }

    /// Rejects rule sets whose shape cannot apply to a leaf of `kind`.
    fn check_shape(&self, path: &FieldPath, kind: &FieldKind) -> FormResult<()> {
        let conflict = |reason: &'static str| FormError::ConflictingRules {
            path: path.clone(),
            reason,
        };
        match (self.coercion, kind) {
            (Coercion::AsNumber, FieldKind::Text | FieldKind::Date) => {
                return Err(conflict("number coercion on a non-numeric field"));
            }
            (Coercion::AsDate, FieldKind::Text | FieldKind::Number | FieldKind::Integer) => {
                return Err(conflict("date coercion on a non-date field"));
            }
            _ => {}
        }
        if self.pattern.is_some() && effective_coercion(self.coercion, kind) != Coercion::None {
            return Err(conflict("pattern on a coerced field"));
        }
        Ok(())
    }
}

/// Declared coercion, or the one implied by the schema when none is declared.
pub(super) fn effective_coercion(declared: Coercion, kind: &FieldKind) -> Coercion {
    match (declared, kind) {
        (Coercion::None, FieldKind::Number | FieldKind::Integer) => Coercion::AsNumber,
        (Coercion::None, FieldKind::Date) => Coercion::AsDate,
        (declared, _) => declared,
    }
}

/// Turns raw input into the value stored at a leaf of `kind`. Text leaves keep
/// the text form of typed input; integer leaves reject fractions.
pub(super) fn coerce(
    raw: RawValue,
    coercion: Coercion,
    kind: &FieldKind,
) -> Result<FieldValue, FieldError> {
    let value = coerce_raw(raw, coercion)?;
    match (value, kind) {
        (value @ (FieldValue::Number(_) | FieldValue::Date(_)), FieldKind::Text) => {
            Ok(FieldValue::Text(value.text_form().into_owned()))
        }
        (FieldValue::Number(number), FieldKind::Integer) if !number.fract().is_zero() => {
            Err(FieldError {
                kind: FieldErrorKind::TypeCoercionFailed {
                    expected: Coercion::AsNumber,
                },
                message: "Expected a whole number".to_string(),
            })
        }
        (value, _) => Ok(value),
    }
}

fn coerce_raw(raw: RawValue, coercion: Coercion) -> Result<FieldValue, FieldError> {
    let mismatch = |expected: Coercion| {
        let message = match expected {
            Coercion::AsDate => "Expected a date (YYYY-MM-DD)",
            Coercion::AsNumber | Coercion::None => "Expected a number",
        };
        FieldError {
            kind: FieldErrorKind::TypeCoercionFailed { expected },
            message: message.to_string(),
        }
    };

    match (raw, coercion) {
        (RawValue::Text(text), Coercion::None) => Ok(FieldValue::Text(text)),
        (RawValue::Text(text), Coercion::AsNumber) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(FieldValue::Empty);
            }
            Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map(FieldValue::Number)
                .map_err(|_| mismatch(Coercion::AsNumber))
        }
        (RawValue::Text(text), Coercion::AsDate) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(FieldValue::Empty);
            }
            NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .map(FieldValue::Date)
                .map_err(|_| mismatch(Coercion::AsDate))
        }
        (RawValue::Number(number), Coercion::None | Coercion::AsNumber) => {
            Ok(FieldValue::Number(number))
        }
        (RawValue::Date(date), Coercion::None | Coercion::AsDate) => Ok(FieldValue::Date(date)),
        (RawValue::Number(_), Coercion::AsDate) => Err(mismatch(Coercion::AsDate)),
        (RawValue::Date(_), Coercion::AsNumber) => Err(mismatch(Coercion::AsNumber)),
    }
}

impl FormController {
    /// Registers `rules` for a concrete leaf path and returns its binding.
    /// Registering the same path again replaces the previous rules.
    pub fn register_field(
        &self,
        path: impl IntoFieldPath,
        rules: FieldRules,
    ) -> FormResult<FieldBinding> {
        let path = path.into_field_path()?;
        if path.is_template() {
            return Err(FormError::ConflictingRules {
                path,
                reason: "wildcard paths are registered with register_field_template",
            });
        }
        let canonical = read_lock(&self.state, "resolving path for registration")?
            .values
            .canonicalize(&path)
            .ok_or_else(|| FormError::UnknownPath(path.clone()))?;
        self.insert_rules(canonical.clone(), rules)?;
        Ok(FieldBinding::new(self.clone(), canonical))
    }

    /// Registers `rules` for every element a wildcard path names, including
    /// field-array entries appended later.
    pub fn register_field_template(
        &self,
        template: impl IntoFieldPath,
        rules: FieldRules,
    ) -> FormResult<()> {
        let template = template.into_field_path()?;
        if !template.is_template() {
            return Err(FormError::ConflictingRules {
                path: template,
                reason: "template paths need a `*` segment",
            });
        }
        self.insert_rules(template, rules)
    }

    pub fn unregister_field(&self, path: impl IntoFieldPath) -> FormResult<()> {
        let path = path.into_field_path()?;
        let path = self.canonical_path(&path)?.unwrap_or(path);
        write_lock(&self.rules, "unregistering field")?.remove(&path);
        let mut state = write_lock(&self.state, "dropping error of unregistered field")?;
        if path.is_template() {
            state.errors.retain(|concrete, _| !concrete.matches(&path));
            state.coercion_errors.retain(|concrete, _| !concrete.matches(&path));
        } else {
            state.errors.remove(&path);
            state.coercion_errors.remove(&path);
        }
        Ok(())
    }

    fn insert_rules(&self, path: FieldPath, rules: FieldRules) -> FormResult<()> {
        let kind = self
            .schema
            .kind_at(&path)
            .ok_or_else(|| FormError::UnknownPath(path.clone()))?;
        if !kind.is_leaf() {
            return Err(FormError::NotALeaf(path));
        }
        rules.check_shape(&path, kind)?;
        debug!("registered field `{path}` with {rules:?}");
        write_lock(&self.rules, "registering field rules")?.insert(path, rules);
        Ok(())
    }

    pub fn is_required(&self, path: impl IntoFieldPath) -> FormResult<bool> {
        let path = path.into_field_path()?;
        let path = self.canonical_path(&path)?.unwrap_or(path);
        Ok(self
            .rules_for(&path)?
            .is_some_and(|rules| rules.is_required()))
    }

    /// Validates a single path and records the outcome. Unknown paths are
    /// ignored; a path without rules only reports a failed coercion.
    pub fn validate_field(&self, path: impl IntoFieldPath) -> FormResult<Option<FieldError>> {
        let path = path.into_field_path()?;
        let Some(path) = self.canonical_path(&path)? else {
            debug!("validate_field ignored unknown path `{path}`");
            return Ok(None);
        };
        let error = self.evaluate_path(&path)?;
        let mut state = write_lock(&self.state, "writing field validation result")?;
        match &error {
            Some(error) => {
                state.errors.insert(path, error.clone());
            }
            None => {
                state.errors.remove(&path);
            }
        }
        Ok(error)
    }

    /// Validates every registered path and replaces the error map.
    pub fn validate_all(&self) -> FormResult<BTreeMap<FieldPath, FieldError>> {
        let mut errors = BTreeMap::new();
        for path in self.registered_paths()? {
            if let Some(error) = self.evaluate_path(&path)? {
                errors.insert(path, error);
            }
        }
        write_lock(&self.state, "applying form validation result")?.errors = errors.clone();
        Ok(errors)
    }

    /// Concrete paths under validation: direct registrations that still
    /// resolve, every expansion of the registered templates, and typed leaves
    /// holding a failed coercion.
    pub fn registered_paths(&self) -> FormResult<BTreeSet<FieldPath>> {
        let templates = read_lock(&self.rules, "reading registered paths")?
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        let state = read_lock(&self.state, "expanding registered paths")?;
        let mut paths = templates
            .iter()
            .flat_map(|path| state.values.expand(path))
            .collect::<BTreeSet<_>>();
        paths.extend(state.coercion_errors.keys().cloned());
        Ok(paths)
    }

    pub(super) fn rules_for(&self, path: &FieldPath) -> FormResult<Option<FieldRules>> {
        let rules = read_lock(&self.rules, "reading field rules")?;
        if let Some(found) = rules.get(path) {
            return Ok(Some(found.clone()));
        }
        Ok(rules
            .iter()
            .find(|(template, _)| template.is_template() && path.matches(template))
            .map(|(_, found)| found.clone()))
    }

    pub(super) fn coercion_for(&self, path: &FieldPath) -> FormResult<Coercion> {
        let declared = self
            .rules_for(path)?
            .map(|rules| rules.coercion())
            .unwrap_or_default();
        Ok(match self.schema.kind_at(path) {
            Some(kind) => effective_coercion(declared, kind),
            None => declared,
        })
    }

    /// Runs the rules of `path` without holding any lock, so validators may
    /// read the form. A failed coercion is reported even without rules.
    fn evaluate_path(&self, path: &FieldPath) -> FormResult<Option<FieldError>> {
        let rules = self.rules_for(path)?;
        let (value, pending) = {
            let state = read_lock(&self.state, "reading value for validation")?;
            (
                state.values.get(path).cloned(),
                state.coercion_errors.get(path).cloned(),
            )
        };
        let Some(value) = value else {
            return Ok(None);
        };
        let error = pending.or_else(|| rules.and_then(|rules| rules.evaluate(&value)));
        match &error {
            Some(error) => trace!("field `{path}` invalid: {error}"),
            None => trace!("field `{path}` valid"),
        }
        Ok(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_pattern_accepts_and_rejects() {
        let rules = FieldRules::new().email("Invalid email format");
        for valid in ["user@example.com", "a.b+c@sub.example.org", "x@localhost"] {
            assert_eq!(rules.evaluate(&FieldValue::text(valid)), None, "{valid}");
        }
        for invalid in ["", "plain", "user@", "@example.com", "user@exa mple.com"] {
            assert_eq!(
                rules
                    .evaluate(&FieldValue::text(invalid))
                    .map(|error| error.kind),
                Some(FieldErrorKind::PatternMismatch),
                "{invalid}"
            );
        }
    }

    #[test]
    fn required_short_circuits_later_rules() {
        let rules = FieldRules::new()
            .required("Email is required")
            .email("Invalid email format")
            .check("never", |_| false, "unreachable");
        let error = rules.evaluate(&FieldValue::Empty).expect("required fails");
        assert_eq!(error.kind, FieldErrorKind::Required);
        assert_eq!(error.message(), "Email is required");
    }

    #[test]
    fn first_failing_custom_validator_wins() {
        let rules = FieldRules::new()
            .check("first", |_| true, "first failed")
            .check("second", |_| false, "second failed")
            .check("third", |_| false, "third failed");
        let error = rules
            .evaluate(&FieldValue::text("value"))
            .expect("custom fails");
        assert_eq!(
            error.kind,
            FieldErrorKind::CustomValidationFailed {
                validator: "second".into()
            }
        );
        assert_eq!(error.message, "second failed");
    }

    #[test]
    fn reusing_a_validator_name_replaces_it_in_place() {
        let rules = FieldRules::new()
            .check("a", |_| false, "old a")
            .check("b", |_| false, "b")
            .check("a", |_| true, "new a");
        assert_eq!(rules.validator_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(
            rules.evaluate(&FieldValue::text("x")).map(|error| error.message),
            Some("b".to_string())
        );
    }

    #[test]
    fn invalid_pattern_is_reported() {
        assert!(matches!(
            FieldRules::new().pattern("(unclosed", "bad"),
            Err(FormError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn coercion_parses_numbers_and_dates() {
        let any = &FieldKind::Any;
        assert_eq!(
            coerce("42".into(), Coercion::AsNumber, any),
            Ok(FieldValue::Number(Decimal::from(42)))
        );
        assert_eq!(coerce("  ".into(), Coercion::AsNumber, any), Ok(FieldValue::Empty));
        assert_eq!(
            coerce("abc".into(), Coercion::AsNumber, any).map_err(|error| error.kind),
            Err(FieldErrorKind::TypeCoercionFailed {
                expected: Coercion::AsNumber
            })
        );
        assert_eq!(
            coerce("2024-02-29".into(), Coercion::AsDate, any),
            Ok(FieldValue::Date(
                NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date")
            ))
        );
        assert!(coerce("2023-02-29".into(), Coercion::AsDate, any).is_err());
        assert_eq!(
            coerce("42".into(), Coercion::None, any),
            Ok(FieldValue::text("42"))
        );
    }

    #[test]
    fn coercion_follows_leaf_kind() {
        let date = NaiveDate::from_ymd_opt(1985, 2, 19).expect("valid date");
        assert_eq!(
            coerce(RawValue::from(42_i64), Coercion::None, &FieldKind::Text),
            Ok(FieldValue::text("42"))
        );
        assert_eq!(
            coerce(RawValue::from(date), Coercion::None, &FieldKind::Text),
            Ok(FieldValue::text("1985-02-19"))
        );
        assert_eq!(
            coerce(RawValue::from(date), Coercion::AsNumber, &FieldKind::Number)
                .map_err(|error| error.kind),
            Err(FieldErrorKind::TypeCoercionFailed {
                expected: Coercion::AsNumber
            })
        );
        assert_eq!(
            coerce("7".into(), Coercion::AsNumber, &FieldKind::Integer),
            Ok(FieldValue::Number(Decimal::from(7)))
        );
        assert_eq!(
            coerce("4.5".into(), Coercion::AsNumber, &FieldKind::Integer)
                .map(|_| ())
                .map_err(|error| error.message),
            Err("Expected a whole number".to_string())
        );
    }

    #[test]
    fn shape_conflicts_fail_fast() {
        let path = FieldPath::parse("age").expect("parse");
        let number_on_text = FieldRules::new().value_as_number();
        assert!(number_on_text.check_shape(&path, &FieldKind::Text).is_err());
        let pattern_on_number = FieldRules::new().email("x");
        assert!(
            pattern_on_number
                .check_shape(&path, &FieldKind::Number)
                .is_err()
        );
        assert!(
            FieldRules::new()
                .value_as_date()
                .check_shape(&path, &FieldKind::Any)
                .is_ok()
        );
    }
}
