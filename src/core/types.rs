use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Kind of cloud resource a certificate is deployed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// CDN acceleration domain; the certificate is bound to a hostname.
    #[serde(rename = "cdn")]
    Cdn,
    /// Load balancer listener; the certificate is bound to an instance port.
    #[serde(rename = "lb")]
    LoadBalancer,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cdn => "cdn",
            ResourceKind::LoadBalancer => "lb",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Digest used to compare a candidate certificate with the deployed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintAlgorithm {
    Sha256,
    Sha1,
}

impl fmt::Display for FingerprintAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FingerprintAlgorithm::Sha256 => f.write_str("sha256"),
            FingerprintAlgorithm::Sha1 => f.write_str("sha1"),
        }
    }
}

/// One resource to update. Each variant carries the identifiers its kind
/// cannot be addressed without.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetDescriptor {
    Cdn {
        domain: String,
        region: String,
    },
    LoadBalancer {
        instance_id: String,
        listener_port: u16,
        region: String,
    },
}

impl TargetDescriptor {
    pub fn cdn(domain: impl Into<String>, region: impl Into<String>) -> Self {
        TargetDescriptor::Cdn {
            domain: domain.into(),
            region: region.into(),
        }
    }

    pub fn load_balancer(
        instance_id: impl Into<String>,
        listener_port: u16,
        region: impl Into<String>,
    ) -> Self {
        TargetDescriptor::LoadBalancer {
            instance_id: instance_id.into(),
            listener_port,
            region: region.into(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            TargetDescriptor::Cdn { .. } => ResourceKind::Cdn,
            TargetDescriptor::LoadBalancer { .. } => ResourceKind::LoadBalancer,
        }
    }

    pub fn region(&self) -> &str {
        match self {
            TargetDescriptor::Cdn { region, .. } => region,
            TargetDescriptor::LoadBalancer { region, .. } => region,
        }
    }

    /// Human readable identifier used in logs and error messages.
    pub fn label(&self) -> String {
        match self {
            TargetDescriptor::Cdn { domain, .. } => domain.clone(),
            TargetDescriptor::LoadBalancer {
                instance_id,
                listener_port,
                ..
            } => format!("{instance_id}:{listener_port}"),
        }
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.label())
    }
}

/// Certificate and private key as supplied by the operator. Held in memory
/// for the duration of a run only.
#[derive(Clone)]
pub struct CertificateMaterial {
    /// PEM certificate, optionally followed by its chain.
    pub cert: String,
    /// PEM private key; wiped on drop.
    pub private_key: Zeroizing<String>,
}

impl CertificateMaterial {
    pub fn new(cert: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            cert: cert.into(),
            private_key: Zeroizing::new(private_key.into()),
        }
    }
}

impl fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("cert_len", &self.cert.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenewOptions {
    /// Skip the fingerprint comparison and always push.
    pub force_update: bool,
    /// Run every check but never call the update path.
    pub dry_run: bool,
}

/// Result of one target renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalOutcome {
    Updated,
    Skipped,
    Failed(String),
}

impl RenewalOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, RenewalOutcome::Failed(_))
    }
}
