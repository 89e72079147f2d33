//! Registration of the usage protection webhook with the API server.
use std::collections::BTreeMap;

use k8s_openapi::{
    ByteString,
    api::admissionregistration::v1::{
        RuleWithOperations, ValidatingWebhook, ValidatingWebhookConfiguration, WebhookClientConfig,
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta},
};

use crate::{IN_USE_LABEL, options::UsageProtectionOptions};

/// The name of the webhook inside the [`ValidatingWebhookConfiguration`].
pub const WEBHOOK_NAME: &str = "nousages.protection.stackable.tech";

/// Whether calling the webhook has side effects, see the [Kubernetes documentation][k8s-side].
///
/// [k8s-side]: https://kubernetes.io/docs/reference/access-authn-authz/extensible-admission-controllers/#side-effects
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display)]
pub enum SideEffects {
    #[default]
    None,
    NoneOnDryRun,
}

/// Builds a [`ValidatingWebhookConfiguration`] containing a single webhook which is called
/// for every deletion of a labeled object, regardless of its API group, version or resource.
///
/// Deletions are rejected if the webhook can't be reached (`failurePolicy: Fail`), an
/// unreachable webhook must not silently allow deleting used objects.
#[derive(Debug)]
pub struct DeletionWebhookConfigurationBuilder {
    name: String,
    side_effects: SideEffects,
    client_config: WebhookClientConfig,
    object_labels: BTreeMap<String, String>,
}

impl DeletionWebhookConfigurationBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            side_effects: SideEffects::default(),
            client_config: WebhookClientConfig::default(),
            object_labels: BTreeMap::new(),
        }
    }

    pub fn side_effects(mut self, side_effects: SideEffects) -> Self {
        self.side_effects = side_effects;
        self
    }

    pub fn client_config(mut self, client_config: WebhookClientConfig) -> Self {
        self.client_config = client_config;
        self
    }

    /// Restricts the webhook to objects carrying the label `key=value`.
    pub fn match_object_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.object_labels.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> ValidatingWebhookConfiguration {
        let all = || Some(vec!["*".to_owned()]);

        let webhook = ValidatingWebhook {
            admission_review_versions: vec!["v1".to_owned()],
            client_config: self.client_config,
            failure_policy: Some("Fail".to_owned()),
            name: WEBHOOK_NAME.to_owned(),
            object_selector: (!self.object_labels.is_empty()).then(|| LabelSelector {
                match_labels: Some(self.object_labels),
                ..Default::default()
            }),
            rules: Some(vec![RuleWithOperations {
                api_groups: all(),
                api_versions: all(),
                operations: Some(vec!["DELETE".to_owned()]),
                resources: all(),
                scope: Some("*".to_owned()),
            }]),
            side_effects: self.side_effects.to_string(),
            ..Default::default()
        };

        ValidatingWebhookConfiguration {
            metadata: ObjectMeta {
                name: Some(self.name),
                ..Default::default()
            },
            webhooks: Some(vec![webhook]),
        }
    }
}

/// Builds the [`ValidatingWebhookConfiguration`] which registers the webhook for deletions of
/// all resources labeled with [`IN_USE_LABEL`].
///
/// The webhook only reads during dry runs, but records deletion attempts otherwise.
pub fn webhook_configuration(
    name: impl Into<String>,
    options: &UsageProtectionOptions,
    ca_bundle: Option<ByteString>,
) -> ValidatingWebhookConfiguration {
    DeletionWebhookConfigurationBuilder::new(name)
        .side_effects(SideEffects::NoneOnDryRun)
        .client_config(options.webhook_client_config(ca_bundle))
        .match_object_label(IN_USE_LABEL, "true")
        .build()
}
