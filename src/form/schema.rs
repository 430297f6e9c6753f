use std::collections::BTreeMap;

use super::path::{FieldPath, PathSegment};
use super::value::{FieldGroup, FieldValue, FormValues};

/// Declared type of a node in the form value tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// Leaf of unknown type, inferred from an unset default.
    Any,
    Text,
    Number,
    /// Number without a fractional part, e.g. an `i64` model field.
    Integer,
    Date,
    Group(BTreeMap<String, FieldKind>),
    List(Box<FieldKind>),
    /// Field array; the element kind is a [`FieldKind::Group`] or `Any`.
    FieldArray(Box<FieldKind>),
}

impl FieldKind {
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Self::Any | Self::Text | Self::Number | Self::Integer | Self::Date
        )
    }

    pub fn infer(value: &FieldValue) -> Self {
        match value {
            FieldValue::Empty => Self::Any,
            FieldValue::Text(_) => Self::Text,
            FieldValue::Number(_) => Self::Number,
            FieldValue::Date(_) => Self::Date,
            FieldValue::Group(fields) => Self::Group(infer_group(fields)),
            FieldValue::List(items) => {
                Self::List(Box::new(items.first().map(Self::infer).unwrap_or(Self::Any)))
            }
            FieldValue::Entries(entries) => Self::FieldArray(Box::new(
                entries
                    .first()
                    .map(|entry| Self::infer(&entry.value))
                    .unwrap_or(Self::Any),
            )),
        }
    }

    pub fn child(&self, segment: &PathSegment) -> Option<&FieldKind> {
        match (self, segment) {
            (Self::Any, _) => Some(self),
            (Self::Group(fields), PathSegment::Key(key)) => fields.get(key),
            (Self::List(element), PathSegment::Index(_) | PathSegment::Each) => Some(element),
            (
                Self::FieldArray(element),
                PathSegment::Index(_) | PathSegment::Entry(_) | PathSegment::Each,
            ) => Some(element),
            _ => None,
        }
    }

    /// Whether `value` has this shape. Groups may omit members; those are
    /// filled by [`FieldKind::fill_missing`].
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::Text, FieldValue::Text(_) | FieldValue::Empty) => true,
            (Self::Number, FieldValue::Number(_) | FieldValue::Empty) => true,
            (Self::Integer, FieldValue::Number(number)) => number.fract().is_zero(),
            (Self::Integer, FieldValue::Empty) => true,
            (Self::Date, FieldValue::Date(_) | FieldValue::Empty) => true,
            (Self::Group(kinds), FieldValue::Group(fields)) => fields
                .iter()
                .all(|(key, field)| kinds.get(key).is_some_and(|kind| kind.accepts(field))),
            (Self::List(element), FieldValue::List(items)) => {
                items.iter().all(|item| element.accepts(item))
            }
            (Self::FieldArray(element), FieldValue::Entries(entries)) => {
                entries.iter().all(|entry| element.accepts(&entry.value))
            }
            _ => false,
        }
    }

    pub fn fill_missing(&self, value: &mut FieldValue) {
        let (Self::Group(kinds), FieldValue::Group(fields)) = (self, value) else {
            return;
        };
        for (key, kind) in kinds {
            match fields.get_mut(key) {
                Some(existing) => kind.fill_missing(existing),
                None => {
                    fields.insert(key.clone(), kind.empty_value());
                }
            }
        }
    }

    /// Value a freshly added node of this kind starts with.
    pub fn empty_value(&self) -> FieldValue {
        match self {
            Self::Text => FieldValue::Text(String::new()),
            Self::Any | Self::Number | Self::Integer | Self::Date => FieldValue::Empty,
            Self::Group(kinds) => FieldValue::Group(
                kinds
                    .iter()
                    .map(|(key, kind)| (key.clone(), kind.empty_value()))
                    .collect(),
            ),
            Self::List(_) => FieldValue::List(Vec::new()),
            Self::FieldArray(_) => FieldValue::Entries(Vec::new()),
        }
    }
}

fn infer_group(fields: &FieldGroup) -> BTreeMap<String, FieldKind> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), FieldKind::infer(value)))
        .collect()
}

/// Typed description of every path a form can address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FormSchema {
    root: FieldKind,
}

impl Default for FormSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl FormSchema {
    pub fn new() -> Self {
        Self {
            root: FieldKind::Group(BTreeMap::new()),
        }
    }

    /// Schema of a group kind; any other kind yields an empty schema.
    pub fn from_kind(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Group(_) => Self { root: kind },
            _ => Self::new(),
        }
    }

    pub fn infer(values: &FormValues) -> Self {
        Self::from_kind(FieldKind::infer(values.as_value()))
    }

    pub fn field(mut self, key: impl Into<String>, kind: FieldKind) -> Self {
        if let FieldKind::Group(fields) = &mut self.root {
            fields.insert(key.into(), kind);
        }
        self
    }

    pub fn root(&self) -> &FieldKind {
        &self.root
    }

    pub fn kind_at(&self, path: &FieldPath) -> Option<&FieldKind> {
        path.segments()
            .iter()
            .try_fold(&self.root, |current, segment| current.child(segment))
    }

    /// Default values for every member of the schema.
    pub fn empty_values(&self) -> FormValues {
        match self.root.empty_value() {
            FieldValue::Group(fields) => FormValues::from_group(fields),
            _ => FormValues::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_follows_default_shapes() {
        let values = FormValues::new()
            .with("username", "")
            .with("age", FieldValue::Empty)
            .with(
                "phNumbers",
                FieldValue::entries([FieldValue::group([("number", FieldValue::text(""))])]),
            );
        let schema = FormSchema::infer(&values);
        let number = FieldPath::parse("phNumbers.*.number").expect("parse");
        assert_eq!(schema.kind_at(&number), Some(&FieldKind::Text));
        let age = FieldPath::parse("age").expect("parse");
        assert_eq!(schema.kind_at(&age), Some(&FieldKind::Any));
        let missing = FieldPath::parse("channel").expect("parse");
        assert_eq!(schema.kind_at(&missing), None);
    }

    #[test]
    fn fill_missing_adds_empty_members() {
        let kind = FieldKind::Group(BTreeMap::from([
            ("number".to_string(), FieldKind::Text),
            ("since".to_string(), FieldKind::Date),
        ]));
        let mut value = FieldValue::group([("number", FieldValue::text("1"))]);
        assert!(kind.accepts(&value));
        kind.fill_missing(&mut value);
        assert_eq!(
            value,
            FieldValue::group([
                ("number", FieldValue::text("1")),
                ("since", FieldValue::Empty),
            ])
        );
        assert!(!kind.accepts(&FieldValue::group([("other", FieldValue::Empty)])));
    }
}
