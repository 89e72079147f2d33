use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A Usage marks a resource as being in use, protecting it from deletion.
///
/// As long as at least one Usage refers to a resource via [`UsageSpec::of`], every attempt to
/// delete the resource is denied by the usage protection webhook.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "protection.stackable.tech",
    version = "v1beta1",
    kind = "Usage",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct UsageSpec {
    /// The resource which is in use.
    pub of: UsageResource,

    /// The resource which uses [`Self::of`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by: Option<UsageResource>,

    /// A human readable reason why [`Self::of`] is in use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageResource {
    pub api_version: String,
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_ref: Option<ResourceRef>,
}

impl UsageResource {
    /// The name of the referenced resource, if there is a non-empty one.
    pub fn name(&self) -> Option<&str> {
        self.resource_ref
            .as_ref()
            .map(|resource_ref| resource_ref.name.as_str())
            .filter(|name| !name.is_empty())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
pub struct ResourceRef {
    pub name: String,
}

impl Usage {
    /// The in-use index value of the resource this Usage protects, see [`in_use_index_value`].
    ///
    /// Returns [`None`] if [`UsageSpec::of`] doesn't name a resource.
    pub fn index_value(&self) -> Option<String> {
        let of = &self.spec.of;
        of.name()
            .map(|name| in_use_index_value(&of.api_version, &of.kind, name))
    }
}

/// Builds the value used to look up the Usages of a resource.
pub fn in_use_index_value(api_version: &str, kind: &str, name: &str) -> String {
    format!("{api_version}.{kind}.{name}")
}
