//! Contains the options to configure the [`UsageProtectionServer`][crate::UsageProtectionServer].
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use k8s_openapi::{
    ByteString,
    api::admissionregistration::v1::{ServiceReference, WebhookClientConfig},
};

use crate::VALIDATE_NO_USAGES_PATH;

/// The default port the webhook server listens on.
pub const DEFAULT_PORT: u16 = 9443;

/// The default socket address the webhook server binds to.
pub const DEFAULT_BIND_ADDRESS: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT);

/// Specifies available usage protection webhook options.
#[cfg_attr(feature = "clap", derive(clap::Args))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsageProtectionOptions {
    /// The socket address the webhook server binds to. Its port is also used in the webhook
    /// client config.
    #[cfg_attr(
        feature = "clap",
        arg(long, env, default_value_t = DEFAULT_BIND_ADDRESS)
    )]
    pub bind_address: SocketAddr,

    /// The name of the Service which exposes the webhook server.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub webhook_service_name: String,

    /// The namespace of the Service which exposes the webhook server.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub webhook_namespace: String,
}

impl UsageProtectionOptions {
    pub fn new(
        webhook_service_name: impl Into<String>,
        webhook_namespace: impl Into<String>,
    ) -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS,
            webhook_service_name: webhook_service_name.into(),
            webhook_namespace: webhook_namespace.into(),
        }
    }

    /// Points the API server to [`VALIDATE_NO_USAGES_PATH`] of the webhook Service.
    ///
    /// The Service is expected to expose the same port the server binds to.
    pub fn webhook_client_config(&self, ca_bundle: Option<ByteString>) -> WebhookClientConfig {
        WebhookClientConfig {
            service: Some(ServiceReference {
                name: self.webhook_service_name.clone(),
                namespace: self.webhook_namespace.clone(),
                path: Some(VALIDATE_NO_USAGES_PATH.to_owned()),
                port: Some(self.bind_address.port().into()),
            }),
            ca_bundle,
            url: None,
        }
    }
}
