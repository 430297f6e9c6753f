use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::controller::{FormError, FormResult};
use super::schema::{FieldKind, FormSchema};
use super::value::{FieldArrayEntry, FieldValue, FormValues};

/// A Rust type that maps onto one node of the form value tree.
pub trait FieldModel: Sized {
    fn kind() -> FieldKind;
    fn to_value(&self) -> FieldValue;
    fn from_value(value: &FieldValue) -> Option<Self>;
}

/// A struct describing a whole form. Usually derived with
/// `#[derive(FormModel)]`, which also implements [`FieldModel`] so models nest.
pub trait FormModel: FieldModel {
    type Fields;

    fn fields() -> Self::Fields;

    fn schema() -> FormSchema {
        FormSchema::from_kind(Self::kind())
    }

    fn to_values(&self) -> FormValues {
        match self.to_value() {
            FieldValue::Group(fields) => FormValues::from_group(fields),
            _ => FormValues::new(),
        }
    }

    fn from_values(values: &FormValues) -> FormResult<Self> {
        Self::from_value(values.as_value())
            .ok_or(FormError::ModelMismatch(std::any::type_name::<Self>()))
    }
}

impl FieldModel for String {
    fn kind() -> FieldKind {
        FieldKind::Text
    }

    fn to_value(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Text(text) => Some(text.clone()),
            FieldValue::Empty => Some(String::new()),
            _ => None,
        }
    }
}

impl FieldModel for Decimal {
    fn kind() -> FieldKind {
        FieldKind::Number
    }

    fn to_value(&self) -> FieldValue {
        FieldValue::Number(*self)
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        value.as_number()
    }
}

impl FieldModel for i64 {
    fn kind() -> FieldKind {
        FieldKind::Integer
    }

    fn to_value(&self) -> FieldValue {
        FieldValue::Number(Decimal::from(*self))
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        let number = value.as_number()?;
        if number.fract().is_zero() {
            number.to_i64()
        } else {
            None
        }
    }
}

impl FieldModel for f64 {
    fn kind() -> FieldKind {
        FieldKind::Number
    }

    fn to_value(&self) -> FieldValue {
        decimal_from_f64(*self).map_or(FieldValue::Empty, FieldValue::Number)
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        value.as_number()?.to_f64()
    }
}

impl FieldModel for NaiveDate {
    fn kind() -> FieldKind {
        FieldKind::Date
    }

    fn to_value(&self) -> FieldValue {
        FieldValue::Date(*self)
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        value.as_date()
    }
}

impl<T: FieldModel> FieldModel for Option<T> {
    fn kind() -> FieldKind {
        T::kind()
    }

    fn to_value(&self) -> FieldValue {
        self.as_ref().map_or(FieldValue::Empty, FieldModel::to_value)
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Empty => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Lists of groups become field arrays with stable entry ids; lists of
/// leaves stay positional.
impl<T: FieldModel> FieldModel for Vec<T> {
    fn kind() -> FieldKind {
        match T::kind() {
            group @ FieldKind::Group(_) => FieldKind::FieldArray(Box::new(group)),
            element => FieldKind::List(Box::new(element)),
        }
    }

    fn to_value(&self) -> FieldValue {
        if matches!(T::kind(), FieldKind::Group(_)) {
            FieldValue::Entries(
                self.iter()
                    .map(|item| FieldArrayEntry::new(item.to_value()))
                    .collect(),
            )
        } else {
            FieldValue::List(self.iter().map(FieldModel::to_value).collect())
        }
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::List(items) => items.iter().map(T::from_value).collect(),
            FieldValue::Entries(entries) => entries
                .iter()
                .map(|entry| T::from_value(&entry.value))
                .collect(),
            _ => None,
        }
    }
}

fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_str(&format!("{value:.18}")).ok()
}
