use std::sync::Arc;

use anyhow::Result;
use log::info;

use super::CloudClient;
use crate::auth::CredentialProvider;

/// Client that never calls a cloud API. Credentials are still resolved on
/// every call so authentication problems surface in smoke runs.
pub struct NoopCloudClient {
    credentials: Arc<dyn CredentialProvider>,
}

impl NoopCloudClient {
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self { credentials }
    }

    fn touch_auth(&self) -> Result<()> {
        self.credentials.credentials()?;
        Ok(())
    }
}

impl CloudClient for NoopCloudClient {
    fn provider_name(&self) -> &str {
        "noop"
    }

    fn current_cdn_certificate(&self, _domain: &str, _region: &str) -> Result<Option<String>> {
        self.touch_auth()?;
        Ok(None)
    }

    fn update_cdn_certificate(
        &self,
        domain: &str,
        _cert: &str,
        _private_key: &str,
        region: &str,
    ) -> Result<bool> {
        self.touch_auth()?;
        info!("[noop] would update CDN certificate: domain={domain}, region={region}");
        Ok(true)
    }

    fn current_lb_fingerprint(
        &self,
        _instance_id: &str,
        _listener_port: u16,
        _region: &str,
    ) -> Result<Option<String>> {
        self.touch_auth()?;
        Ok(None)
    }

    fn update_lb_certificate(
        &self,
        instance_id: &str,
        listener_port: u16,
        _cert: &str,
        _private_key: &str,
        region: &str,
    ) -> Result<bool> {
        self.touch_auth()?;
        info!(
            "[noop] would update load balancer certificate: instance_id={instance_id}, port={listener_port}, region={region}"
        );
        Ok(true)
    }
}
