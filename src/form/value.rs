use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::path::{FieldPath, PathSegment};

static ENTRY_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

/// Date format used for text input coerced to a date and for the text form
/// of date values.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Stable identity of a field-array entry, independent of its position.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EntryId(pub u64);

impl EntryId {
    pub fn next() -> Self {
        Self(ENTRY_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

impl Display for EntryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type FieldGroup = BTreeMap<String, FieldValue>;

/// A node of the form value tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldValue {
    /// Leaf with no value yet, e.g. a numeric input that was cleared.
    Empty,
    Text(String),
    Number(Decimal),
    Date(NaiveDate),
    Group(FieldGroup),
    /// Fixed or positional list (`phoneNumbers.0`, `phoneNumbers.1`).
    List(Vec<FieldValue>),
    /// Dynamic list of groups, each carrying a stable [`EntryId`].
    Entries(Vec<FieldArrayEntry>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn group<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, FieldValue)>,
    {
        Self::Group(
            fields
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    pub fn list(items: impl IntoIterator<Item = FieldValue>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Builds a field array, allocating a fresh id for every group.
    pub fn entries(groups: impl IntoIterator<Item = FieldValue>) -> Self {
        Self::Entries(groups.into_iter().map(FieldArrayEntry::new).collect())
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Self::Empty | Self::Text(_) | Self::Number(_) | Self::Date(_)
        )
    }

    /// Unset for the purpose of a required check: no value or empty text.
    pub fn is_unset(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Entries(entries) => entries.is_empty(),
            Self::Number(_) | Self::Date(_) | Self::Group(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Self::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(*date),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&FieldGroup> {
        match self {
            Self::Group(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_entries(&self) -> Option<&[FieldArrayEntry]> {
        match self {
            Self::Entries(entries) => Some(entries),
            _ => None,
        }
    }

    /// Text a pattern rule is matched against. Unset leaves read as `""`.
    pub fn text_form(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Number(number) => Cow::Owned(number.to_string()),
            Self::Date(date) => Cow::Owned(date.format(DATE_FORMAT).to_string()),
            Self::Empty | Self::Group(_) | Self::List(_) | Self::Entries(_) => Cow::Borrowed(""),
        }
    }

    pub fn child(&self, segment: &PathSegment) -> Option<&FieldValue> {
        match (self, segment) {
            (Self::Group(fields), PathSegment::Key(key)) => fields.get(key),
            (Self::List(items), PathSegment::Index(index)) => items.get(*index),
            (Self::Entries(entries), PathSegment::Index(index)) => {
                entries.get(*index).map(|entry| &entry.value)
            }
            (Self::Entries(entries), PathSegment::Entry(id)) => entries
                .iter()
                .find(|entry| entry.id == *id)
                .map(|entry| &entry.value),
            _ => None,
        }
    }

    pub fn child_mut(&mut self, segment: &PathSegment) -> Option<&mut FieldValue> {
        match (self, segment) {
            (Self::Group(fields), PathSegment::Key(key)) => fields.get_mut(key),
            (Self::List(items), PathSegment::Index(index)) => items.get_mut(*index),
            (Self::Entries(entries), PathSegment::Index(index)) => {
                entries.get_mut(*index).map(|entry| &mut entry.value)
            }
            (Self::Entries(entries), PathSegment::Entry(id)) => entries
                .iter_mut()
                .find(|entry| entry.id == *id)
                .map(|entry| &mut entry.value),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        Self::Number(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

/// One element of a field array. `value` is always a [`FieldValue::Group`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldArrayEntry {
    pub id: EntryId,
    pub value: FieldValue,
}

impl FieldArrayEntry {
    pub fn new(value: FieldValue) -> Self {
        Self {
            id: EntryId::next(),
            value,
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.value.as_group().and_then(|fields| fields.get(key))
    }
}

/// Raw input handed to the controller by an input element.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RawValue {
    Text(String),
    Number(Decimal),
    Date(NaiveDate),
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for RawValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<Decimal> for RawValue {
    fn from(value: Decimal) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        Self::Number(Decimal::from(value))
    }
}

impl From<NaiveDate> for RawValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

/// The whole value tree of a form. The root is always a group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FormValues {
    root: FieldValue,
}

impl Default for FormValues {
    fn default() -> Self {
        Self::new()
    }
}

impl FormValues {
    pub fn new() -> Self {
        Self {
            root: FieldValue::Group(FieldGroup::new()),
        }
    }

    pub fn from_group(fields: FieldGroup) -> Self {
        Self {
            root: FieldValue::Group(fields),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        if let FieldValue::Group(fields) = &mut self.root {
            fields.insert(key.into(), value.into());
        }
    }

    pub fn as_value(&self) -> &FieldValue {
        &self.root
    }

    pub fn into_value(self) -> FieldValue {
        self.root
    }

    pub fn get(&self, path: &FieldPath) -> Option<&FieldValue> {
        path.segments()
            .iter()
            .try_fold(&self.root, |current, segment| current.child(segment))
    }

    pub fn get_mut(&mut self, path: &FieldPath) -> Option<&mut FieldValue> {
        path.segments()
            .iter()
            .try_fold(&mut self.root, |current, segment| current.child_mut(segment))
    }

    pub fn text(&self, path: &FieldPath) -> Option<&str> {
        self.get(path).and_then(FieldValue::as_text)
    }

    /// Rewrites list indices that land on field arrays into entry ids so the
    /// path keeps addressing the same entry after reordering. `None` when the
    /// path does not resolve or is a template.
    pub fn canonicalize(&self, path: &FieldPath) -> Option<FieldPath> {
        if path.is_template() {
            return None;
        }
        let mut canonical = FieldPath::root();
        let mut current = &self.root;
        for segment in path.segments() {
            let resolved = match (current, segment) {
                (FieldValue::Entries(entries), PathSegment::Index(index)) => {
                    PathSegment::Entry(entries.get(*index)?.id)
                }
                _ => segment.clone(),
            };
            current = current.child(&resolved)?;
            canonical = canonical.segment(resolved);
        }
        Some(canonical)
    }

    /// Expands a template into the concrete paths it currently names.
    /// Concrete paths expand to themselves when they resolve.
    pub fn expand(&self, template: &FieldPath) -> Vec<FieldPath> {
        let mut out = Vec::new();
        expand_into(&self.root, template.segments(), FieldPath::root(), &mut out);
        out
    }

    pub(super) fn remove_entry(&mut self, path: &FieldPath, id: EntryId) -> bool {
        let Some(FieldValue::Entries(entries)) = self.get_mut(path) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }
}

fn expand_into(
    value: &FieldValue,
    rest: &[PathSegment],
    prefix: FieldPath,
    out: &mut Vec<FieldPath>,
) {
    let Some((segment, tail)) = rest.split_first() else {
        out.push(prefix);
        return;
    };
    match (value, segment) {
        (FieldValue::List(items), PathSegment::Each) => {
            for (index, item) in items.iter().enumerate() {
                expand_into(item, tail, prefix.clone().index(index), out);
            }
        }
        (FieldValue::Entries(entries), PathSegment::Each) => {
            for entry in entries {
                expand_into(&entry.value, tail, prefix.clone().entry(entry.id), out);
            }
        }
        (FieldValue::Entries(entries), PathSegment::Index(index)) => {
            if let Some(entry) = entries.get(*index) {
                expand_into(&entry.value, tail, prefix.entry(entry.id), out);
            }
        }
        _ => {
            if let Some(child) = value.child(segment) {
                expand_into(child, tail, prefix.segment(segment.clone()), out);
            }
        }
    }
}
