use serde_json::Value;

use crate::{document::Document, field_path::FieldPath};

/// Returns the `owned_paths` which are set in `observed` but absent (or null) in `desired`.
///
/// Paths which are absent or already null in `observed` are skipped, there is nothing to delete.
/// Paths that cannot be resolved in `observed` because a parent is not a mapping are treated the
/// same way. In `desired` such paths count as absent. The relative order of `owned_paths` is kept.
pub fn missing_fields(
    observed: &Document,
    desired: &Document,
    owned_paths: &[FieldPath],
) -> Vec<FieldPath> {
    owned_paths
        .iter()
        .filter(|path| is_set(observed, path) && !is_set(desired, path))
        .cloned()
        .collect()
}

fn is_set(document: &Document, path: &FieldPath) -> bool {
    matches!(document.get(path), Ok(Some(value)) if !value.is_null())
}
