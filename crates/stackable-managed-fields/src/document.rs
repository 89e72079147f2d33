use std::collections::BTreeSet;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ManagedFieldsEntry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::{ResultExt, Snafu};

use crate::field_path::FieldPath;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to serialize object into a document"))]
    SerializeObject { source: serde_json::Error },

    #[snafu(display("expected the document root to be a mapping, got {found}"))]
    RootNotAMapping { found: ValueKind },

    #[snafu(display("expected {location:?} to be a mapping while resolving {path:?}, got {found}"))]
    NotAMapping {
        path: String,
        location: String,
        found: ValueKind,
    },

    #[snafu(display("failed to deserialize the managed fields of the document"))]
    DeserializeManagedFields { source: serde_json::Error },
}

/// The kind of a document node, used to report structural mismatches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ValueKind {
    Null,
    Boolean,
    Number,
    String,
    Sequence,
    Mapping,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Sequence,
            Value::Object(_) => Self::Mapping,
        }
    }
}

/// A generic, schema-agnostic view of a Kubernetes object.
///
/// The root of a document is always a mapping. Nodes below the root can be mappings, sequences
/// or scalars, including the explicit [`Value::Null`] marker which is distinct from a field being
/// absent. All lookups are done using [`FieldPath`]s, which only ever traverse mappings.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Converts any serializable object (typed resources, [`DynamicObject`]s, ...) into a
    /// document.
    ///
    /// [`DynamicObject`]: kube::core::DynamicObject
    pub fn from_object<T>(object: &T) -> Result<Self>
    where
        T: Serialize,
    {
        let value = serde_json::to_value(object).context(SerializeObjectSnafu)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(root) => Ok(Self(root)),
            other => RootNotAMappingSnafu {
                found: ValueKind::of(&other),
            }
            .fail(),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Looks up the value at `path`.
    ///
    /// Returns `Ok(None)` if the field (or any of its parents) is absent. An explicit null is
    /// returned as `Ok(Some(Value::Null))`. Fails if a parent segment exists but is not a
    /// mapping.
    pub fn get(&self, path: &FieldPath) -> Result<Option<&Value>> {
        let mut current = &self.0;

        for (depth, segment) in path.parent_segments().iter().enumerate() {
            current = match current.get(segment) {
                None => return Ok(None),
                Some(Value::Object(map)) => map,
                Some(other) => {
                    return NotAMappingSnafu {
                        path: path.to_string(),
                        location: render_location(&path.parent_segments()[..=depth]),
                        found: ValueKind::of(other),
                    }
                    .fail();
                }
            };
        }

        Ok(current.get(path.leaf()))
    }

    /// Returns `true` if a value (including an explicit null) exists at `path`.
    pub fn contains(&self, path: &FieldPath) -> Result<bool> {
        Ok(self.get(path)?.is_some())
    }

    /// Returns the names of all children of the mapping at `path`, or [`None`] if nothing
    /// exists at `path`. Fails if the value at `path` is not a mapping.
    pub fn child_names(&self, path: &FieldPath) -> Result<Option<BTreeSet<&str>>> {
        match self.get(path)? {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map.keys().map(String::as_str).collect())),
            Some(other) => NotAMappingSnafu {
                path: path.to_string(),
                location: path.to_string(),
                found: ValueKind::of(other),
            }
            .fail(),
        }
    }

    /// Sets `value` at `path`, replacing whatever was there before.
    ///
    /// Missing parents are created as empty mappings. Fails if a parent segment exists but is
    /// not a mapping, in which case the document is left untouched.
    pub fn set(&mut self, path: &FieldPath, value: Value) -> Result<()> {
        let parent = self.mapping_mut(path)?;
        parent.insert(path.leaf().to_owned(), value);

        Ok(())
    }

    /// Returns the [`ManagedFieldsEntry`]s stored in `metadata.managedFields`.
    pub fn managed_fields(&self) -> Result<Vec<ManagedFieldsEntry>> {
        let path = FieldPath::top_level("metadata").child("managedFields");

        match self.get(&path)? {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(entries) => {
                Vec::<ManagedFieldsEntry>::deserialize(entries)
                    .context(DeserializeManagedFieldsSnafu)
            }
        }
    }

    /// Resolves the parent mapping of `path`, creating missing mappings on the way.
    fn mapping_mut(&mut self, path: &FieldPath) -> Result<&mut Map<String, Value>> {
        // Validate first, so that a failing call doesn't leave half-created parents behind.
        self.ensure_settable(path)?;

        let mut current = &mut self.0;
        for (depth, segment) in path.parent_segments().iter().enumerate() {
            let entry = current
                .entry(segment.as_str())
                .or_insert_with(|| Value::Object(Map::new()));

            current = match entry {
                Value::Object(map) => map,
                other => {
                    return NotAMappingSnafu {
                        path: path.to_string(),
                        location: render_location(&path.parent_segments()[..=depth]),
                        found: ValueKind::of(other),
                    }
                    .fail();
                }
            };
        }

        Ok(current)
    }

    fn ensure_settable(&self, path: &FieldPath) -> Result<()> {
        let mut current = &self.0;

        for (depth, segment) in path.parent_segments().iter().enumerate() {
            current = match current.get(segment) {
                // Everything below will be created
                None => return Ok(()),
                Some(Value::Object(map)) => map,
                Some(other) => {
                    return NotAMappingSnafu {
                        path: path.to_string(),
                        location: render_location(&path.parent_segments()[..=depth]),
                        found: ValueKind::of(other),
                    }
                    .fail();
                }
            };
        }

        Ok(())
    }
}

impl From<Document> for Value {
    fn from(document: Document) -> Self {
        document.into_value()
    }
}

impl TryFrom<Value> for Document {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

fn render_location(segments: &[String]) -> String {
    segments.join(".")
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use k8s_openapi::api::core::v1::ConfigMap;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn path(input: &str) -> FieldPath {
        input.parse().expect("test path is valid")
    }

    fn generate_document() -> Document {
        serde_yaml::from_str(indoc! {"
            apiVersion: example.stackable.tech/v1alpha1
            kind: Database
            metadata:
              name: orders
            spec:
              tier:
                cpu: 2
                memory: 4Gi
              storage: null
              replicas: [1, 2]
              empty: {}
        "})
        .expect("test YAML is valid")
    }

    #[rstest]
    #[case("spec.tier.cpu", Some(json!(2)))]
    #[case("spec.tier", Some(json!({"cpu": 2, "memory": "4Gi"})))]
    #[case("spec.storage", Some(Value::Null))]
    #[case("spec.empty", Some(json!({})))]
    #[case("spec.missing", None)]
    #[case("spec.missing.deeper", None)]
    #[case("status", None)]
    fn get_pass(#[case] input: &str, #[case] expected: Option<Value>) {
        let document = generate_document();
        let value = document.get(&path(input)).expect("lookup must succeed");

        assert_eq!(value.cloned(), expected);
    }

    #[rstest]
    #[case("spec.tier.cpu.cores", "spec.tier.cpu", ValueKind::Number)]
    #[case("spec.storage.size", "spec.storage", ValueKind::Null)]
    #[case("spec.replicas.first", "spec.replicas", ValueKind::Sequence)]
    #[case("kind.name", "kind", ValueKind::String)]
    fn get_through_non_mapping_fails(
        #[case] input: &str,
        #[case] expected_location: &str,
        #[case] expected_kind: ValueKind,
    ) {
        let document = generate_document();
        let err = document.get(&path(input)).expect_err("lookup must fail");

        match err {
            Error::NotAMapping {
                location, found, ..
            } => {
                assert_eq!(location, expected_location);
                assert_eq!(found, expected_kind);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn contains_distinguishes_null_from_absent() {
        let document = generate_document();

        assert!(document.contains(&path("spec.storage")).expect("lookup succeeds"));
        assert!(!document.contains(&path("spec.volumes")).expect("lookup succeeds"));
    }

    #[test]
    fn child_names() {
        let document = generate_document();

        assert_eq!(
            document.child_names(&path("spec.tier")).expect("lookup succeeds"),
            Some(BTreeSet::from(["cpu", "memory"]))
        );
        assert_eq!(
            document.child_names(&path("spec.empty")).expect("lookup succeeds"),
            Some(BTreeSet::new())
        );
        assert_eq!(document.child_names(&path("spec.nope")).expect("lookup succeeds"), None);
        document
            .child_names(&path("spec.replicas"))
            .expect_err("sequences have no child names");
    }

    #[test]
    fn set_creates_missing_parents() {
        let mut document = generate_document();
        document
            .set(&path("spec.backup.schedule.cron"), Value::Null)
            .expect("set succeeds");

        assert_eq!(
            document.get(&path("spec.backup")).expect("lookup succeeds"),
            Some(&json!({"schedule": {"cron": null}}))
        );
    }

    #[test]
    fn set_replaces_existing_value() {
        let mut document = generate_document();
        document
            .set(&path("spec.tier"), Value::Null)
            .expect("set succeeds");

        assert_eq!(
            document.get(&path("spec.tier")).expect("lookup succeeds"),
            Some(&Value::Null)
        );
        assert_eq!(
            document.get(&path("metadata.name")).expect("lookup succeeds"),
            Some(&json!("orders"))
        );
    }

    #[test]
    fn set_through_non_mapping_leaves_document_untouched() {
        let mut document = generate_document();
        let original = document.clone();

        document
            .set(&path("spec.replicas.count"), json!(3))
            .expect_err("set must fail");
        document
            .set(&path("spec.storage.size"), json!("1Gi"))
            .expect_err("set must fail");

        assert_eq!(document, original);
    }

    #[rstest]
    #[case::sequence(json!([1, 2]), ValueKind::Sequence)]
    #[case::string(json!("spec"), ValueKind::String)]
    #[case::null(Value::Null, ValueKind::Null)]
    fn non_mapping_roots_are_rejected(#[case] value: Value, #[case] expected: ValueKind) {
        match Document::from_value(value) {
            Err(Error::RootNotAMapping { found }) => assert_eq!(found, expected),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn from_typed_object() {
        let config_map: ConfigMap = serde_yaml::from_str(indoc! {"
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: game-demo
            data:
              foo: bar
        "})
        .expect("test YAML is valid");

        let document = Document::from_object(&config_map).expect("conversion succeeds");
        assert_eq!(
            document.get(&path("data.foo")).expect("lookup succeeds"),
            Some(&json!("bar"))
        );
        assert_eq!(Value::from(document)["kind"], json!("ConfigMap"));
    }

    #[test]
    fn managed_fields() {
        let document: Document = serde_yaml::from_str(indoc! {r#"
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: game-demo
              managedFields:
              - manager: orders-controller
                operation: Apply
                apiVersion: v1
                fieldsType: FieldsV1
                fieldsV1:
                  f:data:
                    f:foo: {}
              - manager: kubectl
                operation: Update
                apiVersion: v1
        "#})
        .expect("test YAML is valid");

        let entries = document.managed_fields().expect("managed fields are valid");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].manager.as_deref(), Some("orders-controller"));
        assert!(entries[1].fields_v1.is_none());

        assert!(generate_document().managed_fields().expect("no managed fields").is_empty());
    }

    #[test]
    fn malformed_managed_fields() {
        let document = Document::from_value(json!({
            "metadata": { "managedFields": "nope" }
        }))
        .expect("root is a mapping");

        document.managed_fields().expect_err("managed fields are malformed");
    }
}
