//! Deletion of fields which a server-side apply field manager no longer sets.
//!
//! Server-side apply only removes a field from an object if the applying field manager sends an
//! explicit null for it, simply omitting the field leaves it untouched. This crate compares the
//! fields a manager owns according to the `metadata.managedFields` of the observed object with
//! the desired object and sets every owned but no longer desired field to null.
//!
//! ```
//! use serde_json::json;
//! use stackable_managed_fields::plan::prepare_object_for_field_deletion;
//!
//! let observed = json!({
//!     "metadata": {
//!         "name": "orders",
//!         "managedFields": [{
//!             "manager": "orders-controller",
//!             "operation": "Apply",
//!             "fieldsType": "FieldsV1",
//!             "fieldsV1": {"f:spec": {"f:replicas": {}, "f:tier": {}}},
//!         }],
//!     },
//!     "spec": {"replicas": 3, "tier": "gold"},
//! });
//! let desired = json!({"metadata": {"name": "orders"}, "spec": {"replicas": 3}});
//!
//! let (desired, plan) =
//!     prepare_object_for_field_deletion(&observed, &desired, "orders-controller").unwrap();
//!
//! assert_eq!(plan.to_string(), "spec.tier");
//! assert_eq!(
//!     desired.into_value(),
//!     json!({"metadata": {"name": "orders"}, "spec": {"replicas": 3, "tier": null}})
//! );
//! ```
//!
//! Use [`client::apply_with_field_deletion`] to plan and apply in one go.
pub mod client;
pub mod debug;
pub mod document;
pub mod field_path;
pub mod fields_v1;
pub mod ownership;
pub mod plan;

pub use crate::{
    client::{FieldDeletionOptions, apply_with_field_deletion},
    document::Document,
    field_path::FieldPath,
    plan::{DeletionPlan, prepare_for_field_deletion, prepare_object_for_field_deletion},
};
