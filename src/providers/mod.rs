use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;

use crate::auth::CredentialProvider;
use crate::errors::ConfigError;

mod noop;

pub use noop::NoopCloudClient;

/// Narrow control-plane interface the resource adapters depend on.
///
/// Implementations resolve credentials through their injected
/// [`CredentialProvider`]; a credential failure should be returned as an
/// [`AuthError`](crate::errors::AuthError) inside the `anyhow::Error` so it
/// is reported as an authentication problem.
pub trait CloudClient: Send + Sync {
    fn provider_name(&self) -> &str;

    /// PEM certificate currently served for `domain`, if any.
    fn current_cdn_certificate(&self, domain: &str, region: &str) -> Result<Option<String>>;

    fn update_cdn_certificate(
        &self,
        domain: &str,
        cert: &str,
        private_key: &str,
        region: &str,
    ) -> Result<bool>;

    /// Fingerprint of the certificate bound to the listener, in whatever
    /// format the provider reports it.
    fn current_lb_fingerprint(
        &self,
        instance_id: &str,
        listener_port: u16,
        region: &str,
    ) -> Result<Option<String>>;

    fn update_lb_certificate(
        &self,
        instance_id: &str,
        listener_port: u16,
        cert: &str,
        private_key: &str,
        region: &str,
    ) -> Result<bool>;
}

/// Providers the configuration accepts by name but that have no client here.
pub const NOT_IMPLEMENTED_PROVIDERS: [&str; 3] = ["alibaba", "aws", "azure"];

type ClientFactory = Box<dyn Fn(Arc<dyn CredentialProvider>) -> Arc<dyn CloudClient> + Send + Sync>;

/// Name to client-constructor table, built once at startup and passed by
/// reference to whoever needs a client.
pub struct ClientRegistry {
    factories: BTreeMap<String, ClientFactory>,
}

impl ClientRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("noop", |credentials| {
            Arc::new(NoopCloudClient::new(credentials)) as Arc<dyn CloudClient>
        });
        registry
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(Arc<dyn CredentialProvider>) -> Arc<dyn CloudClient> + Send + Sync + 'static,
    {
        self.factories
            .insert(name.trim().to_ascii_lowercase(), Box::new(factory));
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn create(
        &self,
        name: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Arc<dyn CloudClient>, ConfigError> {
        let key = name.trim().to_ascii_lowercase();
        match self.factories.get(&key) {
            Some(factory) => Ok(factory(credentials)),
            None if NOT_IMPLEMENTED_PROVIDERS.contains(&key.as_str()) => {
                Err(ConfigError::CloudProviderNotImplemented(key))
            }
            None => Err(ConfigError::UnsupportedCloudProvider {
                name: name.to_string(),
                supported: self.names().join(", "),
            }),
        }
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
