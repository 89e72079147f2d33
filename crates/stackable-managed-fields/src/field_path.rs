use std::{cmp::Ordering, fmt::Display, iter, str::FromStr};

use serde::{Serialize, Serializer};
use snafu::{Snafu, ensure};

/// The error type for [`FieldPath`] parsing operations.
#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum FieldPathError {
    #[snafu(display("field path cannot be empty"))]
    EmptyInput,

    #[snafu(display("field path {input:?} contains an empty segment"))]
    EmptySegment { input: String },
}

/// A location in a document which only threads through named object fields.
///
/// List indices, list keys and set values are never part of a [`FieldPath`], they are dropped
/// when a [`FieldSet`](crate::fields_v1::FieldSet) is flattened. A path always contains at least
/// one segment, the last segment being the [leaf](Self::leaf).
///
/// The canonical representation is the dot-joined list of segments, e.g. `spec.tier.cpu`.
/// Segments are kept separately though, so field names which contain dots themselves (like
/// `app.kubernetes.io/name`) are treated as a single segment.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath {
    parents: Vec<String>,
    leaf: String,
}

impl FieldPath {
    /// Creates a new path from the provided segments. Returns [`None`] if there are no segments.
    pub fn new<S>(segments: impl IntoIterator<Item = S>) -> Option<Self>
    where
        S: Into<String>,
    {
        let mut parents: Vec<String> = segments.into_iter().map(Into::into).collect();
        let leaf = parents.pop()?;

        Some(Self { parents, leaf })
    }

    /// Creates a top-level path consisting of only one segment.
    pub fn top_level(name: impl Into<String>) -> Self {
        Self {
            parents: Vec::new(),
            leaf: name.into(),
        }
    }

    /// Returns a new path pointing at the field `name` below `self`.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut parents = self.parents.clone();
        parents.push(self.leaf.clone());

        Self {
            parents,
            leaf: name.into(),
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.parents
            .iter()
            .map(String::as_str)
            .chain(iter::once(self.leaf.as_str()))
    }

    /// All segments except the leaf.
    pub fn parent_segments(&self) -> &[String] {
        &self.parents
    }

    pub fn leaf(&self) -> &str {
        &self.leaf
    }

    /// Returns the number of segments.
    pub fn depth(&self) -> usize {
        self.parents.len() + 1
    }

    pub fn is_top_level(&self) -> bool {
        self.parents.is_empty()
    }

    /// Returns the path without its leaf, or [`None`] for top-level paths.
    pub fn parent(&self) -> Option<Self> {
        let mut parents = self.parents.clone();
        let leaf = parents.pop()?;

        Some(Self { parents, leaf })
    }

    /// Iterates over all strict ancestors, starting with the direct parent.
    pub fn ancestors(&self) -> impl Iterator<Item = Self> {
        iter::successors(self.parent(), Self::parent)
    }

    /// Returns `true` if `other` is located strictly below `self`.
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other.depth() > self.depth()
            && self
                .segments()
                .zip(other.segments())
                .all(|(ours, theirs)| ours == theirs)
    }
}

impl Ord for FieldPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments().cmp(other.segments())
    }
}

impl PartialOrd for FieldPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for parent in &self.parents {
            write!(f, "{parent}.")?;
        }

        f.write_str(&self.leaf)
    }
}

impl FromStr for FieldPath {
    type Err = FieldPathError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        ensure!(!input.is_empty(), EmptyInputSnafu);

        let segments: Vec<&str> = input.split('.').collect();
        ensure!(
            segments.iter().all(|segment| !segment.is_empty()),
            EmptySegmentSnafu { input }
        );

        Self::new(segments).ok_or(FieldPathError::EmptyInput)
    }
}

impl Serialize for FieldPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn path(input: &str) -> FieldPath {
        input.parse().expect("test path is valid")
    }

    #[rstest]
    #[case("spec", 1)]
    #[case("spec.tier", 2)]
    #[case("spec.tier.cpu", 3)]
    #[case(" metadata.labels ", 2)]
    fn parse_pass(#[case] input: &str, #[case] depth: usize) {
        let parsed = FieldPath::from_str(input).expect("path must parse");
        assert_eq!(parsed.depth(), depth);
        assert_eq!(parsed.to_string(), input.trim());
    }

    #[rstest]
    #[case("", FieldPathError::EmptyInput)]
    #[case("   ", FieldPathError::EmptyInput)]
    #[case("spec..cpu", FieldPathError::EmptySegment { input: "spec..cpu".to_owned() })]
    #[case(".spec", FieldPathError::EmptySegment { input: ".spec".to_owned() })]
    #[case("spec.", FieldPathError::EmptySegment { input: "spec.".to_owned() })]
    fn parse_fail(#[case] input: &str, #[case] expected: FieldPathError) {
        let err = FieldPath::from_str(input).expect_err("path must not parse");
        assert_eq!(err, expected);
    }

    #[test]
    fn new_rejects_empty_segments() {
        assert_eq!(FieldPath::new(Vec::<String>::new()), None);
    }

    #[test]
    fn dotted_segment_stays_single_segment() {
        let path = FieldPath::new(["metadata", "labels", "app.kubernetes.io/name"])
            .expect("path has segments");

        assert_eq!(path.depth(), 3);
        assert_eq!(path.leaf(), "app.kubernetes.io/name");
        assert_eq!(path.to_string(), "metadata.labels.app.kubernetes.io/name");
    }

    #[test]
    fn parent_and_ancestors() {
        let leaf = path("spec.a.b.c");

        assert_eq!(leaf.parent(), Some(path("spec.a.b")));
        assert_eq!(path("spec").parent(), None);
        assert_eq!(
            leaf.ancestors().collect::<Vec<_>>(),
            vec![path("spec.a.b"), path("spec.a"), path("spec")]
        );
    }

    #[rstest]
    #[case("spec", "spec.tier", true)]
    #[case("spec", "spec.tier.cpu", true)]
    #[case("spec.tier", "spec.tier", false)]
    #[case("spec.tier.cpu", "spec.tier", false)]
    #[case("spec.tie", "spec.tier.cpu", false)]
    #[case("status", "spec.tier", false)]
    fn ancestor_relation(#[case] ancestor: &str, #[case] other: &str, #[case] expected: bool) {
        assert_eq!(path(ancestor).is_ancestor_of(&path(other)), expected);
    }

    #[test]
    fn child_appends_segment() {
        assert_eq!(path("spec.tier").child("cpu"), path("spec.tier.cpu"));
        assert_eq!(FieldPath::top_level("spec").child("tier"), path("spec.tier"));
    }

    #[test]
    fn ordering_follows_segments() {
        let mut paths = vec![path("spec.b"), path("spec.a.z"), path("metadata"), path("spec")];
        paths.sort();

        assert_eq!(
            paths,
            vec![path("metadata"), path("spec"), path("spec.a.z"), path("spec.b")]
        );
    }

    #[test]
    fn serializes_as_dotted_string() {
        let serialized = serde_json::to_value(path("spec.tier.cpu")).expect("path serializes");
        assert_eq!(serialized, serde_json::json!("spec.tier.cpu"));
    }
}
