//! Diagnostics for figuring out why fields are (or are not) deleted.
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ManagedFieldsEntry;
use serde::Serialize;
use serde_json::Value;

use crate::{
    field_path::FieldPath,
    ownership::{self, managed_fields_of, owned_field_paths},
};

/// A serializable summary of an object's managed fields from the perspective of one field
/// manager. Usually emitted as JSON in debug logs.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedFieldsReport {
    /// The field manager the report was created for.
    pub looking_for: String,

    /// Every manager of the object, rendered as `<manager> (<operation>)`.
    pub all_managers: Vec<String>,

    /// The last entry belonging to [`Self::looking_for`], if any.
    pub target_manager: Option<ManagerSummary>,

    pub owned_paths_count: usize,
    pub owned_paths: Vec<FieldPath>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerSummary {
    pub manager: String,
    pub operation: Option<String>,
    pub api_version: Option<String>,
    pub fields_v1: Option<Value>,
}

impl From<&ManagedFieldsEntry> for ManagerSummary {
    fn from(entry: &ManagedFieldsEntry) -> Self {
        Self {
            manager: entry.manager.clone().unwrap_or_default(),
            operation: entry.operation.clone(),
            api_version: entry.api_version.clone(),
            fields_v1: entry.fields_v1.as_ref().map(|fields| fields.0.clone()),
        }
    }
}

/// Creates a [`ManagedFieldsReport`] for `field_manager`.
pub fn describe_managed_fields(
    managed_fields: &[ManagedFieldsEntry],
    field_manager: &str,
) -> Result<ManagedFieldsReport, ownership::Error> {
    let owned_paths = owned_field_paths(managed_fields, field_manager)?;

    let all_managers = managed_fields
        .iter()
        .map(|entry| {
            format!(
                "{manager} ({operation})",
                manager = entry.manager.as_deref().unwrap_or_default(),
                operation = entry.operation.as_deref().unwrap_or_default()
            )
        })
        .collect();

    Ok(ManagedFieldsReport {
        looking_for: field_manager.to_owned(),
        all_managers,
        target_manager: managed_fields_of(managed_fields, field_manager)
            .last()
            .map(ManagerSummary::from),
        owned_paths_count: owned_paths.len(),
        owned_paths,
    })
}
