//! Applying desired objects with server-side apply while deleting fields which are no longer
//! desired.
use kube::{
    Api,
    api::{Patch, PatchParams},
    core::DynamicObject,
};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::instrument;

use crate::{
    document::Document,
    plan::{self, DeletionPlan, prepare_for_field_deletion},
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("desired object has no name"))]
    MissingObjectName,

    #[snafu(display("failed to get observed object {name:?}"))]
    GetObservedObject { source: kube::Error, name: String },

    #[snafu(display("failed to convert observed object {name:?} into a document"))]
    ConvertObserved {
        source: crate::document::Error,
        name: String,
    },

    #[snafu(display("failed to prepare object {name:?} for field deletion"))]
    PrepareFieldDeletion { source: plan::Error, name: String },

    #[snafu(display("failed to convert desired object {name:?} into a document"))]
    ConvertDesired {
        source: crate::document::Error,
        name: String,
    },

    #[snafu(display("failed to apply object {name:?}"))]
    ApplyObject { source: kube::Error, name: String },
}

/// Options used when applying objects via [`apply_with_field_deletion`].
#[cfg_attr(feature = "clap", derive(clap::Args))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDeletionOptions {
    /// The field manager used for server-side apply. Only fields owned by exactly this manager
    /// are ever deleted.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub field_manager: String,

    /// Take ownership of fields which are currently owned by other field managers.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub force_conflicts: bool,
}

impl FieldDeletionOptions {
    pub fn new(field_manager: impl Into<String>) -> Self {
        Self {
            field_manager: field_manager.into(),
            force_conflicts: false,
        }
    }

    pub fn patch_params(&self) -> PatchParams {
        let patch_params = PatchParams::apply(&self.field_manager);

        if self.force_conflicts {
            patch_params.force()
        } else {
            patch_params
        }
    }
}

/// Server-side applies `desired`, explicitly deleting every field which the configured field
/// manager set previously but which is now missing from `desired`.
///
/// If the object doesn't exist yet, `desired` is applied as is. Returns the applied object as
/// returned by the API server together with the [`DeletionPlan`] which was used.
#[instrument(skip(api, desired, options), fields(field_manager = %options.field_manager))]
pub async fn apply_with_field_deletion(
    api: &Api<DynamicObject>,
    desired: &DynamicObject,
    options: &FieldDeletionOptions,
) -> Result<(DynamicObject, DeletionPlan)> {
    let name = desired.metadata.name.clone().context(MissingObjectNameSnafu)?;

    let mut document = Document::from_object(desired).with_context(|_| ConvertDesiredSnafu {
        name: name.clone(),
    })?;

    let observed = api
        .get_opt(&name)
        .await
        .with_context(|_| GetObservedObjectSnafu { name: name.clone() })?;

    let plan = match observed {
        Some(observed) => {
            let observed = Document::from_object(&observed).with_context(|_| ConvertObservedSnafu {
                name: name.clone(),
            })?;

            prepare_for_field_deletion(&observed, &mut document, &options.field_manager)
                .with_context(|_| PrepareFieldDeletionSnafu { name: name.clone() })?
        }
        None => {
            tracing::debug!(name = %name, "object does not exist yet, nothing to delete");
            DeletionPlan::default()
        }
    };

    if !plan.is_empty() {
        tracing::info!(
            name = %name,
            namespace = desired.metadata.namespace.as_deref(),
            deleted_fields = %plan,
            "deleting fields which are no longer desired"
        );
    }

    let applied = api
        .patch(&name, &options.patch_params(), &Patch::Apply(&document))
        .await
        .with_context(|_| ApplyObjectSnafu { name })?;

    Ok((applied, plan))
}
