use thiserror::Error;

/// Missing or invalid run inputs. Detected before any target is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(String),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
    #[error("unsupported service type: {0}, only cdn or lb are supported")]
    UnsupportedServiceType(String),
    #[error("unsupported cloud provider: {name}, supported: {supported}")]
    UnsupportedCloudProvider { name: String, supported: String },
    #[error("unsupported message format type: {name}, supported: {supported}")]
    UnsupportedMessageFormat { name: String, supported: String },
    #[error("unsupported authentication method: {0}")]
    UnsupportedAuthMethod(String),
    #[error("cloud provider {0} is recognised but no client is built in yet")]
    CloudProviderNotImplemented(String),
}

impl ConfigError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Unsupported-selection errors get their own exit code.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            ConfigError::UnsupportedServiceType(_)
                | ConfigError::UnsupportedCloudProvider { .. }
                | ConfigError::UnsupportedMessageFormat { .. }
                | ConfigError::UnsupportedAuthMethod(_)
        )
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, ConfigError::CloudProviderNotImplemented(_))
    }
}

/// Errors produced while decoding certificate material.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),
}

/// Credential resolution failures raised at the resource adapter boundary.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("unsupported authentication method: {0}, supported: access_key, sts, env")]
    UnsupportedMethod(String),
    #[error("authentication method {0} is not implemented yet")]
    NotImplemented(String),
}

/// Coarse error taxonomy used for exit codes and failure reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    CertificateValidation,
    Authentication,
    Provider,
    Unexpected,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "CONFIG_ERROR",
            ErrorKind::CertificateValidation => "CERT_VALIDATION_ERROR",
            ErrorKind::Authentication => "AUTH_ERROR",
            ErrorKind::Provider => "CLOUD_API_ERROR",
            ErrorKind::Unexpected => "UNEXPECTED_ERROR",
        }
    }
}

/// Failure of a single target renewal.
#[derive(Debug, Error)]
pub enum RenewError {
    #[error(
        "certificate validation failed: {target} is not covered by the certificate or the certificate has expired"
    )]
    CertValidation { target: String },
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error("authentication error: {0}")]
    Auth(String),
    #[error("cloud API error: {0:#}")]
    Provider(anyhow::Error),
}

impl RenewError {
    /// Classifies an adapter error, surfacing credential failures as such.
    pub fn from_adapter(err: anyhow::Error) -> Self {
        match err.downcast_ref::<AuthError>() {
            Some(auth) => RenewError::Auth(auth.to_string()),
            None => RenewError::Provider(err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RenewError::CertValidation { .. } | RenewError::Certificate(_) => {
                ErrorKind::CertificateValidation
            }
            RenewError::Auth(_) => ErrorKind::Authentication,
            RenewError::Provider(_) => ErrorKind::Provider,
        }
    }
}
