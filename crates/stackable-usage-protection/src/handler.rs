//! Denies the deletion of resources which are still in use by at least one [`Usage`].
use std::error::Error as StdError;

use async_trait::async_trait;
use futures::StreamExt;
use kube::{
    Api, Client, ResourceExt,
    api::{ApiResource, Patch, PatchParams},
    core::{
        DynamicObject, GroupVersionKind,
        admission::{AdmissionRequest, AdmissionResponse, Operation},
    },
    runtime::{
        WatchStreamExt,
        reflector::{self, Store, store::WriterDropped},
        watcher,
    },
};
use serde_json::{Value, json};
use snafu::{ResultExt, Snafu};
use tracing::instrument;

use crate::crd::{Usage, in_use_index_value};

/// Records the propagation policy of the last denied deletion attempt on the protected object.
pub const DELETION_ATTEMPT_ANNOTATION: &str =
    "protection.stackable.tech/deletion-attempt-with-policy";

/// The propagation policy Kubernetes uses if the delete request doesn't specify one.
pub const DEFAULT_PROPAGATION_POLICY: &str = "Background";

#[derive(Debug, Snafu)]
pub enum ClientUsageIndexError {
    #[snafu(display("the Usage reflector stopped before the initial list of Usages completed"))]
    UsageStoreUnavailable { source: WriterDropped },

    #[snafu(display("failed to record deletion attempt on {kind} {name:?}"))]
    RecordDeletionAttempt {
        source: kube::Error,
        kind: String,
        name: String,
    },
}

/// Looks up the Usages of resources and records denied deletion attempts.
#[async_trait]
pub trait UsageIndex: Send + Sync {
    type Error: StdError + Send + Sync + 'static;

    /// Returns all Usages with the given [in-use index value](in_use_index_value).
    async fn usages_of(&self, index_value: &str) -> Result<Vec<Usage>, Self::Error>;

    /// Annotates `object` with the propagation `policy` of a denied deletion attempt.
    async fn record_deletion_attempt(
        &self,
        object: &DynamicObject,
        gvk: &GroupVersionKind,
        policy: &str,
    ) -> Result<(), Self::Error>;
}

/// A [`UsageIndex`] backed by the Kubernetes API.
///
/// Usages are looked up in a reflector [`Store`] which is kept up to date by watching all
/// Usages in the cluster.
#[derive(Clone)]
pub struct ClientUsageIndex {
    client: Client,
    usages: Store<Usage>,
}

impl ClientUsageIndex {
    /// Returns the index together with the future which watches Usages and feeds the index.
    ///
    /// The future runs until the process shuts down and needs to be polled (e.g. spawned or
    /// joined with the webhook server) for lookups to succeed.
    pub fn new(client: Client) -> (Self, impl Future<Output = ()> + Send + 'static) {
        let (usages, writer) = reflector::store::<Usage>();
        let usage_api = Api::<Usage>::all(client.clone());

        let usage_reflector = reflector::reflector(
            writer,
            watcher::watcher(usage_api, watcher::Config::default()),
        )
        .default_backoff()
        .touched_objects()
        .for_each(|usage| async move {
            if let Err(err) = usage {
                tracing::warn!(error = %err, "failed to watch Usages");
            }
        });

        (Self::from_store(client, usages), usage_reflector)
    }

    fn from_store(client: Client, usages: Store<Usage>) -> Self {
        Self { client, usages }
    }
}

#[async_trait]
impl UsageIndex for ClientUsageIndex {
    type Error = ClientUsageIndexError;

    async fn usages_of(&self, index_value: &str) -> Result<Vec<Usage>, Self::Error> {
        self.usages
            .wait_until_ready()
            .await
            .context(UsageStoreUnavailableSnafu)?;

        Ok(self
            .usages
            .state()
            .into_iter()
            .filter(|usage| usage.index_value().as_deref() == Some(index_value))
            .map(|usage| Usage::clone(&usage))
            .collect())
    }

    async fn record_deletion_attempt(
        &self,
        object: &DynamicObject,
        gvk: &GroupVersionKind,
        policy: &str,
    ) -> Result<(), Self::Error> {
        let api_resource = ApiResource::from_gvk(gvk);
        let api: Api<DynamicObject> = match object.namespace() {
            Some(namespace) => {
                Api::namespaced_with(self.client.clone(), &namespace, &api_resource)
            }
            None => Api::all_with(self.client.clone(), &api_resource),
        };

        let name = object.name_any();
        let patch = json!({
            "metadata": {
                "annotations": {
                    DELETION_ATTEMPT_ANNOTATION: policy,
                },
            },
        });

        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|_| RecordDeletionAttemptSnafu {
                kind: gvk.kind.clone(),
                name: name.clone(),
            })?;

        Ok(())
    }
}

/// Validates that objects which are about to be deleted are not in use.
pub struct UsageProtection<I> {
    index: I,
}

impl<I> UsageProtection<I>
where
    I: UsageIndex,
{
    pub fn new(index: I) -> Self {
        Self { index }
    }

    #[instrument(
        skip(self, request),
        fields(
            uid = %request.uid,
            kind = %request.kind.kind,
            name = %request.name,
            namespace = request.namespace.as_deref(),
        )
    )]
    pub async fn handle(&self, request: AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        if !matches!(request.operation, Operation::Delete) {
            return errored(
                &request,
                format!("unexpected operation {:?}, expected Delete", request.operation),
            );
        }

        let Some(object) = &request.old_object else {
            return errored(&request, "delete request doesn't contain the old object");
        };

        let policy = request
            .options
            .as_ref()
            .and_then(|options| options.0.get("propagationPolicy"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROPAGATION_POLICY);

        let (api_version, kind) = match &object.types {
            Some(types) => (types.api_version.clone(), types.kind.clone()),
            None => (request.kind.api_version(), request.kind.kind.clone()),
        };
        let index_value = in_use_index_value(&api_version, &kind, &object.name_any());

        tracing::debug!(%index_value, policy, "validating that object has no usages");

        let usages = match self.index.usages_of(&index_value).await {
            Ok(usages) => usages,
            Err(err) => return errored(&request, format!("failed to look up usages: {err}")),
        };

        let Some(message) = in_use_message(&usages) else {
            tracing::debug!(%index_value, "object has no usages, deletion allowed");
            return AdmissionResponse::from(&request);
        };

        if object.annotations().get(DELETION_ATTEMPT_ANNOTATION).map(String::as_str) != Some(policy)
        {
            if let Err(err) = self
                .index
                .record_deletion_attempt(object, &request.kind, policy)
                .await
            {
                return errored(
                    &request,
                    format!("failed to record deletion attempt: {err}"),
                );
            }
        }

        tracing::info!(%index_value, usages = usages.len(), "object is in use, deletion denied");
        AdmissionResponse::from(&request).deny(message)
    }
}

/// Denies the request because it couldn't be processed.
///
/// The response needs to carry the request UID, so [`AdmissionResponse::invalid`] can't be used.
fn errored(
    request: &AdmissionRequest<DynamicObject>,
    message: impl Into<String>,
) -> AdmissionResponse {
    let message = message.into();
    tracing::warn!(%message, "failed to validate usages");
    AdmissionResponse::from(request).deny(message)
}

/// Explains why the resource can't be deleted, or returns [`None`] if there are no usages.
fn in_use_message(usages: &[Usage]) -> Option<String> {
    let first = usages.first()?;
    let count = usages.len();
    let name = first.name_any();

    let message = match (&first.spec.by, &first.spec.reason) {
        (Some(by), _) => format!(
            "This resource is in-use by {count} Usage(s), including the Usage {name:?} by resource {kind}/{by_name}.",
            kind = by.kind,
            by_name = by.name().unwrap_or_default(),
        ),
        (None, Some(reason)) => format!(
            "This resource is in-use by {count} Usage(s), including the Usage {name:?} with reason: {reason:?}."
        ),
        (None, None) => {
            format!("This resource is in-use by {count} Usage(s), including the Usage {name:?}.")
        }
    };

    Some(message)
}
