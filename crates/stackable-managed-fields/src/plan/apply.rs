use serde_json::Value;

use crate::{
    document::{self, Document},
    field_path::FieldPath,
};

/// Sets every path of the `plan` to an explicit null in `desired`.
///
/// Parents which don't exist yet are created as empty mappings. Keys are never removed, the
/// explicit null is what tells server-side apply to delete a field rather than leave it as is.
///
/// The plan is applied as a whole: if any path runs into a parent which is not a mapping, an
/// error is returned and `desired` is left unchanged.
pub fn apply_null_patch<'a>(
    desired: &mut Document,
    plan: impl IntoIterator<Item = &'a FieldPath>,
) -> Result<(), document::Error> {
    let mut patched = desired.clone();

    for path in plan {
        patched.set(path, Value::Null)?;
    }

    *desired = patched;
    Ok(())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use serde_json::json;

    use super::*;

    fn path(input: &str) -> FieldPath {
        input.parse().expect("test path is valid")
    }

    fn document(yaml: &str) -> Document {
        serde_yaml::from_str(yaml).expect("test YAML is valid")
    }

    #[test]
    fn top_level_and_nested_paths() {
        let mut desired = document(indoc! {"
            metadata:
              name: orders
            spec:
              replicas: 3
        "});

        apply_null_patch(
            &mut desired,
            &[path("status"), path("spec.tier"), path("spec.backup.schedule")],
        )
        .expect("patch applies");

        assert_eq!(
            desired.into_value(),
            json!({
                "metadata": {"name": "orders"},
                "status": null,
                "spec": {
                    "replicas": 3,
                    "tier": null,
                    "backup": {"schedule": null},
                },
            })
        );
    }

    #[test]
    fn existing_values_are_overwritten_with_null() {
        let mut desired = document("spec: {tier: {}, storage: null}");

        apply_null_patch(&mut desired, &[path("spec.tier"), path("spec.storage")])
            .expect("patch applies");

        assert_eq!(
            desired.into_value(),
            json!({"spec": {"tier": null, "storage": null}})
        );
    }

    #[test]
    fn conflict_aborts_whole_plan() {
        let mut desired = document("spec: {replicas: [1, 2]}");
        let original = desired.clone();

        let err = apply_null_patch(
            &mut desired,
            &[path("spec.tier"), path("spec.replicas.count")],
        )
        .expect_err("patch must fail");

        assert_eq!(
            err.to_string(),
            "expected \"spec.replicas\" to be a mapping while resolving \"spec.replicas.count\", got sequence"
        );
        assert_eq!(desired, original, "a failed plan must not change anything");
    }

    #[test]
    fn empty_plan_is_a_noop() {
        let mut desired = document("spec: {replicas: 3}");
        let original = desired.clone();

        apply_null_patch(&mut desired, &Vec::<FieldPath>::new()).expect("patch applies");
        assert_eq!(desired, original);
    }
}
