//! An admission webhook which protects resources from deletion while they are in use.
//!
//! Resources are marked as in use by [`Usage`](crd::Usage) objects. The webhook only needs to
//! see objects which are labeled with [`IN_USE_LABEL`], which keeps unrelated deletions away
//! from it. The server serves plain HTTP, TLS needs to be terminated in front of it.
use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::post};
use kube::{
    Client,
    core::{
        DynamicObject,
        admission::{AdmissionRequest, AdmissionResponse, AdmissionReview},
    },
};
use snafu::{ResultExt, Snafu};

use crate::{
    handler::{ClientUsageIndex, UsageIndex, UsageProtection},
    options::UsageProtectionOptions,
};

pub mod crd;
pub mod handler;
pub mod options;
pub mod webhook;

/// The HTTP path the usage protection webhook is served at.
pub const VALIDATE_NO_USAGES_PATH: &str = "/validate-no-usages";

/// Objects carrying this label (with the value `true`) are sent to the webhook on deletion.
pub const IN_USE_LABEL: &str = "protection.stackable.tech/in-use";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to bind TCP listener to {bind_address}"))]
    BindTcpListener {
        source: std::io::Error,
        bind_address: std::net::SocketAddr,
    },

    #[snafu(display("failed to run webhook server"))]
    RunServer { source: std::io::Error },

    #[snafu(display("the Usage reflector stopped unexpectedly"))]
    UsageReflectorStopped,
}

/// Runs the webhook server backed by the Usages in the cluster.
///
/// Returns once either the server or the Usage reflector stops.
pub async fn run(client: Client, options: UsageProtectionOptions) -> Result<(), Error> {
    let (index, usage_reflector) = ClientUsageIndex::new(client);
    let server = UsageProtectionServer::new(index, options);

    tokio::select! {
        result = server.run() => result,
        () = usage_reflector => UsageReflectorStoppedSnafu.fail(),
    }
}

/// Serves the [`UsageProtection`] webhook.
pub struct UsageProtectionServer {
    router: Router,
    options: UsageProtectionOptions,
}

impl UsageProtectionServer {
    pub fn new<I>(index: I, options: UsageProtectionOptions) -> Self
    where
        I: UsageIndex + 'static,
    {
        let router = router(Arc::new(UsageProtection::new(index)));
        Self { router, options }
    }

    pub async fn run(self) -> Result<(), Error> {
        let bind_address = self.options.bind_address;
        let listener = tokio::net::TcpListener::bind(bind_address)
            .await
            .context(BindTcpListenerSnafu { bind_address })?;

        tracing::info!(%bind_address, "starting usage protection webhook server");
        axum::serve(listener, self.router)
            .await
            .context(RunServerSnafu)
    }
}

/// Returns a [`Router`] serving the webhook at [`VALIDATE_NO_USAGES_PATH`].
pub fn router<I>(protection: Arc<UsageProtection<I>>) -> Router
where
    I: UsageIndex + 'static,
{
    Router::new()
        .route(VALIDATE_NO_USAGES_PATH, post(validate_no_usages::<I>))
        .with_state(protection)
}

async fn validate_no_usages<I>(
    State(protection): State<Arc<UsageProtection<I>>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>>
where
    I: UsageIndex + 'static,
{
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(err) => {
            return Json(
                AdmissionResponse::invalid(format!("failed to convert to request: {err}"))
                    .into_review(),
            );
        }
    };

    Json(protection.handle(request).await.into_review())
}
