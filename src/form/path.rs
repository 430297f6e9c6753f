use std::fmt::{Display, Formatter};
use std::str::FromStr;

use super::controller::{FormError, FormResult};
use super::value::EntryId;

/// One step of a [`FieldPath`].
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PathSegment {
    /// Named member of a group (`social`, `twitter`).
    Key(String),
    /// Position inside a list (`phoneNumbers.0`).
    Index(usize),
    /// Field-array entry addressed by its stable id (`phNumbers.#3`).
    Entry(EntryId),
    /// Every element of a list or field array (`phNumbers.*.number`).
    Each,
}

/// Dotted address of a value inside [`FormValues`](super::FormValues).
///
/// Textual form: segments separated by `.`; all-digit segments are list
/// indices, `#<n>` addresses a field-array entry by id and `*` matches every
/// element (registration templates only).
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    pub fn parse(input: &str) -> FormResult<Self> {
        if input.is_empty() {
            return Err(invalid(input, "path is empty"));
        }

        let mut segments = Vec::new();
        for raw in input.split('.') {
            let segment = if raw.is_empty() {
                return Err(invalid(input, "path contains an empty segment"));
            } else if raw == "*" {
                PathSegment::Each
            } else if let Some(id) = raw.strip_prefix('#') {
                let id = id
                    .parse::<u64>()
                    .map_err(|_| invalid(input, "entry segment must be `#` followed by digits"))?;
                PathSegment::Entry(EntryId(id))
            } else if raw.bytes().all(|byte| byte.is_ascii_digit()) {
                let index = raw
                    .parse::<usize>()
                    .map_err(|_| invalid(input, "list index is out of range"))?;
                PathSegment::Index(index)
            } else {
                PathSegment::Key(raw.to_string())
            };
            segments.push(segment);
        }

        if !matches!(segments.first(), Some(PathSegment::Key(_))) {
            return Err(invalid(input, "path must start with a field name"));
        }
        Ok(Self(segments))
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.0.push(PathSegment::Key(key.into()));
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.0.push(PathSegment::Index(index));
        self
    }

    pub fn entry(mut self, id: EntryId) -> Self {
        self.0.push(PathSegment::Entry(id));
        self
    }

    pub fn each(mut self) -> Self {
        self.0.push(PathSegment::Each);
        self
    }

    pub fn segment(mut self, segment: PathSegment) -> Self {
        self.0.push(segment);
        self
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` when the path contains `*` and therefore names a family of
    /// concrete paths.
    pub fn is_template(&self) -> bool {
        self.0.contains(&PathSegment::Each)
    }

    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Either path is a prefix of the other, so a change to one is visible
    /// through the other.
    pub fn overlaps(&self, other: &FieldPath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    /// Whether this concrete path is one of the paths named by `template`.
    pub fn matches(&self, template: &FieldPath) -> bool {
        self.0.len() == template.0.len()
            && self
                .0
                .iter()
                .zip(&template.0)
                .all(|(concrete, pattern)| match pattern {
                    PathSegment::Each => {
                        matches!(concrete, PathSegment::Index(_) | PathSegment::Entry(_))
                    }
                    other => other == concrete,
                })
    }

    pub fn parent(&self) -> Option<FieldPath> {
        let (_, head) = self.0.split_last()?;
        Some(Self(head.to_vec()))
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (position, segment) in self.0.iter().enumerate() {
            if position > 0 {
                f.write_str(".")?;
            }
            match segment {
                PathSegment::Key(key) => f.write_str(key)?,
                PathSegment::Index(index) => write!(f, "{index}")?,
                PathSegment::Entry(id) => write!(f, "#{}", id.0)?,
                PathSegment::Each => f.write_str("*")?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = FormError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

/// Anything the controller accepts where a field path is expected.
pub trait IntoFieldPath {
    fn into_field_path(self) -> FormResult<FieldPath>;
}

impl IntoFieldPath for FieldPath {
    fn into_field_path(self) -> FormResult<FieldPath> {
        Ok(self)
    }
}

impl IntoFieldPath for &FieldPath {
    fn into_field_path(self) -> FormResult<FieldPath> {
        Ok(self.clone())
    }
}

impl IntoFieldPath for &str {
    fn into_field_path(self) -> FormResult<FieldPath> {
        FieldPath::parse(self)
    }
}

impl IntoFieldPath for String {
    fn into_field_path(self) -> FormResult<FieldPath> {
        FieldPath::parse(&self)
    }
}

impl IntoFieldPath for &String {
    fn into_field_path(self) -> FormResult<FieldPath> {
        FieldPath::parse(self)
    }
}

fn invalid(input: &str, reason: &'static str) -> FormError {
    FormError::InvalidPath {
        path: input.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys_indices_entries_and_wildcards() {
        let path = FieldPath::parse("phNumbers.#12.number").expect("entry path parses");
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("phNumbers".into()),
                PathSegment::Entry(EntryId(12)),
                PathSegment::Key("number".into()),
            ]
        );
        assert_eq!(path.to_string(), "phNumbers.#12.number");

        let indexed = FieldPath::parse("phoneNumbers.0").expect("index path parses");
        assert_eq!(indexed, FieldPath::root().key("phoneNumbers").index(0));

        let template = FieldPath::parse("phNumbers.*.number").expect("template parses");
        assert!(template.is_template());
        assert!(path.matches(&template));
        assert!(!indexed.matches(&template));
    }

    #[test]
    fn rejects_malformed_paths() {
        for input in ["", "social..twitter", "0.name", "list.#x", ".leading"] {
            assert!(
                matches!(FieldPath::parse(input), Err(FormError::InvalidPath { .. })),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn overlap_is_symmetric_prefix_relation() {
        let social = FieldPath::parse("social").expect("parse");
        let twitter = FieldPath::parse("social.twitter").expect("parse");
        let email = FieldPath::parse("email").expect("parse");
        assert!(social.overlaps(&twitter));
        assert!(twitter.overlaps(&social));
        assert!(!email.overlaps(&twitter));
        assert_eq!(twitter.parent(), Some(social));
    }
}
