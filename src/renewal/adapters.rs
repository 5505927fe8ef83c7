use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use log::warn;

use super::{CurrentCertificate, ResourceAdapter};
use crate::certificate::{is_cert_valid, parse_certificate_info, validate_format};
use crate::core::types::{CertificateMaterial, FingerprintAlgorithm, ResourceKind, TargetDescriptor};
use crate::providers::CloudClient;

/// CDN domains: domain-bound validation, SHA-256 fingerprints, current
/// certificate fetched as PEM by domain.
pub struct CdnAdapter {
    client: Arc<dyn CloudClient>,
}

impl CdnAdapter {
    pub fn new(client: Arc<dyn CloudClient>) -> Self {
        Self { client }
    }
}

impl ResourceAdapter for CdnAdapter {
    fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    fn fingerprint_algorithm(&self) -> FingerprintAlgorithm {
        FingerprintAlgorithm::Sha256
    }

    fn validate(&self, cert: &str, target: &TargetDescriptor, now: DateTime<Utc>) -> bool {
        match target {
            TargetDescriptor::Cdn { domain, .. } => is_cert_valid(cert, domain, now),
            other => {
                warn!("[renewal] CDN adapter cannot validate {other}");
                false
            }
        }
    }

    fn fetch_current_info(&self, target: &TargetDescriptor) -> Result<Option<CurrentCertificate>> {
        let TargetDescriptor::Cdn { domain, region } = target else {
            bail!("CDN adapter cannot handle {target}");
        };
        Ok(self
            .client
            .current_cdn_certificate(domain, region)?
            .filter(|pem| !pem.trim().is_empty())
            .map(CurrentCertificate::Pem))
    }

    fn push(&self, target: &TargetDescriptor, material: &CertificateMaterial) -> Result<bool> {
        let TargetDescriptor::Cdn { domain, region } = target else {
            bail!("CDN adapter cannot handle {target}");
        };
        self.client
            .update_cdn_certificate(domain, &material.cert, &material.private_key, region)
    }
}

/// Load balancer listeners: format-only validation, SHA-1 fingerprints as
/// reported by the provider.
pub struct LoadBalancerAdapter {
    client: Arc<dyn CloudClient>,
}

impl LoadBalancerAdapter {
    pub fn new(client: Arc<dyn CloudClient>) -> Self {
        Self { client }
    }
}

impl ResourceAdapter for LoadBalancerAdapter {
    fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    fn fingerprint_algorithm(&self) -> FingerprintAlgorithm {
        FingerprintAlgorithm::Sha1
    }

    /// Listeners are not bound to a hostname, so only the format is checked.
    /// An expired certificate still passes but is logged.
    fn validate(&self, cert: &str, _target: &TargetDescriptor, now: DateTime<Utc>) -> bool {
        if !validate_format(cert) {
            warn!("[renewal] certificate format validation failed");
            return false;
        }
        if let Ok(info) = parse_certificate_info(cert) {
            if now >= info.not_after {
                warn!(
                    "[renewal] certificate expired at {}, deploying anyway",
                    info.not_after
                );
            }
        }
        true
    }

    fn fetch_current_info(&self, target: &TargetDescriptor) -> Result<Option<CurrentCertificate>> {
        let TargetDescriptor::LoadBalancer {
            instance_id,
            listener_port,
            region,
        } = target
        else {
            bail!("load balancer adapter cannot handle {target}");
        };
        Ok(self
            .client
            .current_lb_fingerprint(instance_id, *listener_port, region)?
            .filter(|raw| !raw.trim().is_empty())
            .map(CurrentCertificate::Fingerprint))
    }

    fn push(&self, target: &TargetDescriptor, material: &CertificateMaterial) -> Result<bool> {
        let TargetDescriptor::LoadBalancer {
            instance_id,
            listener_port,
            region,
        } = target
        else {
            bail!("load balancer adapter cannot handle {target}");
        };
        self.client.update_lb_certificate(
            instance_id,
            *listener_port,
            &material.cert,
            &material.private_key,
            region,
        )
    }
}

pub fn adapter_for_kind(kind: ResourceKind, client: Arc<dyn CloudClient>) -> Arc<dyn ResourceAdapter> {
    match kind {
        ResourceKind::Cdn => Arc::new(CdnAdapter::new(client)),
        ResourceKind::LoadBalancer => Arc::new(LoadBalancerAdapter::new(client)),
    }
}
