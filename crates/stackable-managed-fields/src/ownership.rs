use k8s_openapi::apimachinery::pkg::apis::meta::v1::ManagedFieldsEntry;
use snafu::{ResultExt, Snafu};

use crate::{
    field_path::FieldPath,
    fields_v1::{self, FieldSet},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse FieldsV1 of field manager {field_manager:?}"))]
    ParseFieldsV1 {
        source: fields_v1::Error,
        field_manager: String,
    },
}

/// Returns the [`FieldPath`]s owned by `field_manager` according to the `managed_fields`.
///
/// Only entries whose manager is exactly `field_manager` are considered. This matters when
/// multiple controllers use manager names sharing a common prefix, each of them must only ever
/// delete its own fields. Entries without a `fieldsV1` payload are skipped.
///
/// Paths owned via multiple entries (e.g. once by an `Apply` and once by an `Update` operation)
/// are returned multiple times. A single malformed payload fails the whole extraction.
pub fn owned_field_paths(
    managed_fields: &[ManagedFieldsEntry],
    field_manager: &str,
) -> Result<Vec<FieldPath>, Error> {
    let mut owned_paths = Vec::new();

    for entry in managed_fields_of(managed_fields, field_manager) {
        let Some(fields) = &entry.fields_v1 else {
            continue;
        };

        let field_set =
            FieldSet::try_from(fields).with_context(|_| ParseFieldsV1Snafu { field_manager })?;
        owned_paths.extend(field_set.field_paths());
    }

    tracing::trace!(
        field_manager,
        owned_paths = owned_paths.len(),
        "extracted owned field paths"
    );

    Ok(owned_paths)
}

/// Returns all entries which belong to `field_manager`.
pub fn managed_fields_of<'a>(
    managed_fields: &'a [ManagedFieldsEntry],
    field_manager: &'a str,
) -> impl Iterator<Item = &'a ManagedFieldsEntry> {
    managed_fields
        .iter()
        .filter(move |entry| entry.manager.as_deref() == Some(field_manager))
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn generate_managed_fields() -> Vec<ManagedFieldsEntry> {
        serde_yaml::from_str(indoc! {r#"
            - manager: orders-controller
              operation: Apply
              apiVersion: example.stackable.tech/v1alpha1
              fieldsType: FieldsV1
              fieldsV1:
                f:spec:
                  f:tier:
                    f:cpu: {}
                    f:memory: {}
            - manager: orders-controller-canary
              operation: Apply
              apiVersion: example.stackable.tech/v1alpha1
              fieldsType: FieldsV1
              fieldsV1:
                f:spec:
                  f:canary: {}
            - manager: orders-controller
              operation: Update
              apiVersion: example.stackable.tech/v1alpha1
              fieldsType: FieldsV1
              fieldsV1:
                f:spec:
                  f:tier:
                    f:cpu: {}
                  f:containers:
                    'k:{"name":"main"}':
                      f:image: {}
            - manager: orders-controller
              operation: Update
              subresource: status
        "#})
        .expect("test YAML is valid")
    }

    fn rendered(paths: &[FieldPath]) -> Vec<String> {
        let mut rendered: Vec<String> = paths.iter().map(ToString::to_string).collect();
        rendered.sort();
        rendered
    }

    #[test]
    fn exact_manager_match() {
        let paths = owned_field_paths(&generate_managed_fields(), "orders-controller")
            .expect("managed fields are valid");

        // Duplicates across entries are kept
        assert_eq!(
            rendered(&paths),
            vec![
                "spec.containers.image",
                "spec.tier.cpu",
                "spec.tier.cpu",
                "spec.tier.memory",
            ]
        );
    }

    #[test]
    fn prefix_of_manager_does_not_match() {
        let paths = owned_field_paths(&generate_managed_fields(), "orders")
            .expect("managed fields are valid");
        assert!(paths.is_empty());

        let paths = owned_field_paths(&generate_managed_fields(), "orders-controller-canary")
            .expect("managed fields are valid");
        assert_eq!(rendered(&paths), vec!["spec.canary"]);
    }

    #[test]
    fn unknown_manager_owns_nothing() {
        let paths = owned_field_paths(&generate_managed_fields(), "kubectl")
            .expect("managed fields are valid");
        assert!(paths.is_empty());
    }

    #[test]
    fn malformed_payload_aborts_extraction() {
        let mut managed_fields = generate_managed_fields();
        managed_fields.push(
            serde_yaml::from_str(indoc! {"
                manager: orders-controller
                operation: Apply
                fieldsType: FieldsV1
                fieldsV1:
                  f:spec: [1, 2, 3]
            "})
            .expect("test YAML is valid"),
        );

        let err = owned_field_paths(&managed_fields, "orders-controller")
            .expect_err("extraction must fail");
        assert_eq!(
            err.to_string(),
            "failed to parse FieldsV1 of field manager \"orders-controller\""
        );

        // Other managers are not affected by the malformed entry
        owned_field_paths(&managed_fields, "orders-controller-canary")
            .expect("other managers are unaffected");
    }
}
