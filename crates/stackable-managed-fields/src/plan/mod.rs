//! Planning the deletion of fields which a field manager owns but no longer wants.
//!
//! Server-side apply interprets omitted fields as "leave unchanged" rather than "delete". A
//! controller which stops setting a field therefore needs to explicitly set it to null in the
//! object it applies. The planning happens in four stages:
//!
//! 1. Extract the paths owned by the field manager from the observed object's managed fields.
//! 2. Find the owned paths which are set in the observed but missing in the desired object
//!    ([`missing_fields`]).
//! 3. Collapse sibling paths into their parent where possible ([`collapse_siblings`]).
//! 4. Set the remaining paths to null in the desired object ([`apply_null_patch`]).
use std::{fmt::Display, slice};

use serde::Serialize;
use snafu::{ResultExt, Snafu};
use tracing::instrument;

pub use crate::plan::{
    apply::apply_null_patch, collapse::collapse_siblings, missing::missing_fields,
};
use crate::{document::Document, field_path::FieldPath, ownership};

mod apply;
mod collapse;
mod missing;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to convert observed object into a document"))]
    ConvertObserved { source: crate::document::Error },

    #[snafu(display("failed to convert desired object into a document"))]
    ConvertDesired { source: crate::document::Error },

    #[snafu(display("failed to read managed fields of observed object"))]
    ReadManagedFields { source: crate::document::Error },

    #[snafu(display("failed to get owned field paths"))]
    OwnedFieldPaths { source: ownership::Error },

    #[snafu(display("failed to set deleted fields to null in desired object"))]
    ApplyNullPatch { source: crate::document::Error },
}

/// The final set of paths which got set to null in the desired object.
///
/// No path in the plan is an ancestor of another path in the plan.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DeletionPlan(Vec<FieldPath>);

impl DeletionPlan {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> slice::Iter<'_, FieldPath> {
        self.0.iter()
    }

    pub fn paths(&self) -> &[FieldPath] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a DeletionPlan {
    type IntoIter = slice::Iter<'a, FieldPath>;
    type Item = &'a FieldPath;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Display for DeletionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let paths: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&paths.join(", "))
    }
}

/// Sets every field to null in `desired` which `field_manager` owns in `observed` but which is
/// missing from `desired`.
///
/// Returns the [`DeletionPlan`], which is empty (and `desired` untouched) if the field manager
/// doesn't own anything or everything it owns is still desired.
#[instrument(skip(observed, desired))]
pub fn prepare_for_field_deletion(
    observed: &Document,
    desired: &mut Document,
    field_manager: &str,
) -> Result<DeletionPlan> {
    let managed_fields = observed.managed_fields().context(ReadManagedFieldsSnafu)?;
    let owned_paths =
        ownership::owned_field_paths(&managed_fields, field_manager).context(OwnedFieldPathsSnafu)?;

    if owned_paths.is_empty() {
        tracing::debug!("field manager owns no fields, nothing to delete");
        return Ok(DeletionPlan::default());
    }

    let missing = missing_fields(observed, desired, &owned_paths);
    let plan = DeletionPlan(collapse_siblings(observed, desired, missing));

    apply_null_patch(desired, &plan).context(ApplyNullPatchSnafu)?;

    tracing::debug!(
        owned_paths = owned_paths.len(),
        deleted_paths = %plan,
        "prepared desired object for field deletion"
    );

    Ok(plan)
}

/// Like [`prepare_for_field_deletion`], but accepts arbitrary serializable objects, like typed
/// Kubernetes resources or [`DynamicObject`](kube::core::DynamicObject)s.
///
/// Returns the desired object as a [`Document`] with all deleted fields set to null, which can be
/// submitted as a server-side apply patch.
pub fn prepare_object_for_field_deletion<O, D>(
    observed: &O,
    desired: &D,
    field_manager: &str,
) -> Result<(Document, DeletionPlan)>
where
    O: Serialize,
    D: Serialize,
{
    let observed = Document::from_object(observed).context(ConvertObservedSnafu)?;
    let mut desired = Document::from_object(desired).context(ConvertDesiredSnafu)?;

    let plan = prepare_for_field_deletion(&observed, &mut desired, field_manager)?;
    Ok((desired, plan))
}
