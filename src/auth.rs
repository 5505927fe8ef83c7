use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::debug;
use zeroize::Zeroizing;

use crate::errors::AuthError;

pub const ACCESS_KEY_ID_VARS: [&str; 2] = ["CLOUD_ACCESS_KEY_ID", "ALIBABA_CLOUD_ACCESS_KEY_ID"];
pub const ACCESS_KEY_SECRET_VARS: [&str; 2] =
    ["CLOUD_ACCESS_KEY_SECRET", "ALIBABA_CLOUD_ACCESS_KEY_SECRET"];
pub const SECURITY_TOKEN_VAR: &str = "CLOUD_SECURITY_TOKEN";

/// Variable lookup used instead of reading the process environment directly.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Control-plane credentials handed to cloud clients.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub access_key_secret: Zeroizing<String>,
    pub security_token: Option<Zeroizing<String>>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: Zeroizing::new(access_key_secret.into()),
            security_token: None,
        }
    }

    pub fn with_security_token(mut self, token: impl Into<String>) -> Self {
        self.security_token = Some(Zeroizing::new(token.into()));
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<redacted>")
            .field(
                "security_token",
                &self.security_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Source of credentials for the cloud clients. Implementations are
/// interchangeable; callers never inspect which one is in use.
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self) -> Result<Credentials, AuthError>;
}

/// Long-lived access key pair.
pub struct StaticKeyProvider {
    credentials: Credentials,
}

impl StaticKeyProvider {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::new(access_key_id, access_key_secret),
        }
    }
}

impl CredentialProvider for StaticKeyProvider {
    fn credentials(&self) -> Result<Credentials, AuthError> {
        if self.credentials.access_key_id.is_empty() || self.credentials.access_key_secret.is_empty()
        {
            return Err(AuthError::MissingCredentials(
                "access key id and secret are required".into(),
            ));
        }
        Ok(self.credentials.clone())
    }
}

/// Short-lived session credentials: key pair plus security token.
pub struct SessionTokenProvider {
    credentials: Credentials,
}

impl SessionTokenProvider {
    pub fn new(
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
        security_token: impl Into<String>,
    ) -> Self {
        Self {
            credentials: Credentials::new(access_key_id, access_key_secret)
                .with_security_token(security_token),
        }
    }
}

impl CredentialProvider for SessionTokenProvider {
    fn credentials(&self) -> Result<Credentials, AuthError> {
        let token_missing = self
            .credentials
            .security_token
            .as_ref()
            .is_none_or(|token| token.is_empty());
        if token_missing {
            return Err(AuthError::MissingCredentials(
                "sts authentication requires a security token".into(),
            ));
        }
        if self.credentials.access_key_id.is_empty() || self.credentials.access_key_secret.is_empty()
        {
            return Err(AuthError::MissingCredentials(
                "access key id and secret are required".into(),
            ));
        }
        Ok(self.credentials.clone())
    }
}

/// Reads the credential variables each time credentials are requested.
pub struct EnvCredentialProvider {
    lookup: EnvLookup,
}

impl EnvCredentialProvider {
    pub fn new(lookup: EnvLookup) -> Self {
        Self { lookup }
    }

    pub fn from_process_env() -> Self {
        Self::new(Arc::new(|name: &str| std::env::var(name).ok()))
    }

    fn first_of(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .filter_map(|name| (self.lookup)(name))
            .find(|value| !value.is_empty())
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn credentials(&self) -> Result<Credentials, AuthError> {
        let (Some(id), Some(secret)) = (
            self.first_of(&ACCESS_KEY_ID_VARS),
            self.first_of(&ACCESS_KEY_SECRET_VARS),
        ) else {
            return Err(AuthError::MissingCredentials(
                "CLOUD_ACCESS_KEY_ID or CLOUD_ACCESS_KEY_SECRET is not set".into(),
            ));
        };
        let credentials = Credentials::new(id, secret);
        match self.first_of(&[SECURITY_TOKEN_VAR]) {
            Some(token) => {
                debug!("[auth] using session token from environment");
                Ok(credentials.with_security_token(token))
            }
            None => Ok(credentials),
        }
    }
}

/// Selectable authentication strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    AccessKey,
    Sts,
    Env,
    /// Federated identity strategies; recognised but not available here.
    Oidc,
    IamRole,
    ServiceAccount,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::AccessKey => "access_key",
            AuthMethod::Sts => "sts",
            AuthMethod::Env => "env",
            AuthMethod::Oidc => "oidc",
            AuthMethod::IamRole => "iam_role",
            AuthMethod::ServiceAccount => "service_account",
        }
    }

    /// Whether the method needs an access key pair in the run configuration.
    pub fn needs_key_pair(&self) -> bool {
        matches!(self, AuthMethod::AccessKey | AuthMethod::Sts)
    }
}

impl FromStr for AuthMethod {
    type Err = AuthError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "access_key" => Ok(AuthMethod::AccessKey),
            "sts" => Ok(AuthMethod::Sts),
            "env" => Ok(AuthMethod::Env),
            "oidc" => Ok(AuthMethod::Oidc),
            "iam_role" => Ok(AuthMethod::IamRole),
            "service_account" => Ok(AuthMethod::ServiceAccount),
            other => Err(AuthError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Builds the provider for `method` from the configured credentials.
pub fn provider_for_method(
    method: AuthMethod,
    configured: Option<&Credentials>,
    lookup: EnvLookup,
) -> Result<Arc<dyn CredentialProvider>, AuthError> {
    match method {
        AuthMethod::AccessKey => {
            let credentials = configured.ok_or_else(|| {
                AuthError::MissingCredentials("access_key authentication requires a key pair".into())
            })?;
            Ok(Arc::new(StaticKeyProvider::new(
                credentials.access_key_id.clone(),
                credentials.access_key_secret.as_str(),
            )))
        }
        AuthMethod::Sts => {
            let credentials = configured.ok_or_else(|| {
                AuthError::MissingCredentials("sts authentication requires a key pair".into())
            })?;
            let token = credentials
                .security_token
                .as_ref()
                .map(|token| token.as_str())
                .unwrap_or_default();
            Ok(Arc::new(SessionTokenProvider::new(
                credentials.access_key_id.clone(),
                credentials.access_key_secret.as_str(),
                token,
            )))
        }
        AuthMethod::Env => Ok(Arc::new(EnvCredentialProvider::new(lookup))),
        AuthMethod::Oidc | AuthMethod::IamRole | AuthMethod::ServiceAccount => {
            Err(AuthError::NotImplemented(method.as_str().to_string()))
        }
    }
}
