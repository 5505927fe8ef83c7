//! Run configuration read from environment variables.
//!
//! Variables are read through a lookup function so tests can supply a map
//! instead of touching the process environment. Empty values count as unset.

use std::str::FromStr;
use std::time::Duration;

use log::{debug, warn};

use crate::auth::{
    ACCESS_KEY_ID_VARS, ACCESS_KEY_SECRET_VARS, AuthMethod, Credentials, SECURITY_TOKEN_VAR,
};
use crate::core::types::{CertificateMaterial, RenewOptions, ResourceKind, TargetDescriptor};
use crate::errors::ConfigError;
use crate::notify::events::EventType;

pub const DEFAULT_REGION: &str = "cn-hangzhou";
pub const DEFAULT_CLOUD_PROVIDER: &str = "alibaba";

const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 30;
const DEFAULT_WEBHOOK_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_WEBHOOK_RETRY_DELAY_SECS: f64 = 1.0;
const DEFAULT_WEBHOOK_WORKERS: usize = 4;
const DEFAULT_WEBHOOK_QUEUE_CAPACITY: usize = 64;

/// Upper bounds for webhook settings; larger values fall back to the default.
pub const MAX_WEBHOOK_TIMEOUT_SECS: u64 = 300;
pub const MAX_WEBHOOK_RETRY_ATTEMPTS: u32 = 10;
pub const MAX_WEBHOOK_RETRY_DELAY_SECS: f64 = 300.0;

pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    /// Per attempt, applied to connect and read.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retry_attempts: u32,
    /// Base delay, doubled for each further retry.
    pub retry_delay: Duration,
    pub enabled_events: Vec<EventType>,
    pub message_format: String,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(DEFAULT_WEBHOOK_TIMEOUT_SECS),
            retry_attempts: DEFAULT_WEBHOOK_RETRY_ATTEMPTS,
            retry_delay: Duration::from_secs_f64(DEFAULT_WEBHOOK_RETRY_DELAY_SECS),
            enabled_events: EventType::ALL.to_vec(),
            message_format: "generic".to_string(),
            workers: DEFAULT_WEBHOOK_WORKERS,
            queue_capacity: DEFAULT_WEBHOOK_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceConfig {
    Cdn {
        domain_names: Vec<String>,
        region: String,
    },
    LoadBalancer {
        instance_ids: Vec<String>,
        listener_port: u16,
        region: String,
    },
}

impl ServiceConfig {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ServiceConfig::Cdn { .. } => ResourceKind::Cdn,
            ServiceConfig::LoadBalancer { .. } => ResourceKind::LoadBalancer,
        }
    }

    pub fn region(&self) -> &str {
        match self {
            ServiceConfig::Cdn { region, .. } | ServiceConfig::LoadBalancer { region, .. } => {
                region
            }
        }
    }

    /// One descriptor per configured domain or instance, in input order.
    pub fn targets(&self) -> Vec<TargetDescriptor> {
        match self {
            ServiceConfig::Cdn {
                domain_names,
                region,
            } => domain_names
                .iter()
                .map(|domain| TargetDescriptor::cdn(domain.clone(), region.clone()))
                .collect(),
            ServiceConfig::LoadBalancer {
                instance_ids,
                listener_port,
                region,
            } => instance_ids
                .iter()
                .map(|id| TargetDescriptor::load_balancer(id.clone(), *listener_port, region.clone()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub material: CertificateMaterial,
    pub cloud_provider: String,
    pub auth_method: AuthMethod,
    /// Key pair for `access_key` and `sts`; other methods resolve at call time.
    pub credentials: Option<Credentials>,
    pub force_update: bool,
    pub dry_run: bool,
    pub webhook: Option<WebhookConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        load_config(&|name: &str| std::env::var(name).ok())
    }

    pub fn renew_options(&self) -> RenewOptions {
        RenewOptions {
            force_update: self.force_update,
            dry_run: self.dry_run,
        }
    }
}

struct Env<'a> {
    lookup: Lookup<'a>,
}

impl Env<'_> {
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.trim().is_empty())
    }

    /// Current name first, then the deprecated one with a warning.
    fn get_with_fallback(&self, name: &str, deprecated: Option<&str>) -> Option<String> {
        if let Some(value) = self.get(name) {
            return Some(value);
        }
        let old = deprecated?;
        let value = self.get(old)?;
        warn!("[config] environment variable {old} is deprecated, please use {name} instead");
        Some(value)
    }

    fn require(&self, name: &str, deprecated: Option<&str>) -> Result<String, ConfigError> {
        self.get_with_fallback(name, deprecated).ok_or_else(|| {
            ConfigError::Missing(match deprecated {
                Some(old) => format!("{name} or {old}"),
                None => name.to_string(),
            })
        })
    }

    fn flag(&self, name: &str) -> bool {
        self.get(name).is_some_and(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            )
        })
    }

    /// Parses `name`, falling back to `default` with a warning when the
    /// value does not parse or fails `accept`.
    fn parse_or<T>(&self, name: &str, default: T, accept: impl Fn(&T) -> bool) -> T
    where
        T: FromStr + std::fmt::Display + Copy,
    {
        let Some(raw) = self.get(name) else {
            return default;
        };
        match raw.trim().parse::<T>() {
            Ok(value) if accept(&value) => value,
            _ => {
                warn!("[config] invalid value for {name}: {raw}, using default: {default}");
                default
            }
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn has_pem_block(raw: &str, accept: impl Fn(&str) -> bool) -> bool {
    pem::parse_many(raw.trim())
        .map(|blocks| blocks.iter().any(|block| accept(block.tag())))
        .unwrap_or(false)
}

fn load_material(env: &Env<'_>, kind: ResourceKind) -> Result<CertificateMaterial, ConfigError> {
    let (cert_var, key_var, legacy_cert, legacy_key) = match kind {
        ResourceKind::Cdn => ("CDN_CERT", "CDN_CERT_PRIVATE_KEY", None, None),
        ResourceKind::LoadBalancer => (
            "LB_CERT",
            "LB_CERT_PRIVATE_KEY",
            Some("SLB_CERT"),
            Some("SLB_CERT_PRIVATE_KEY"),
        ),
    };
    let cert = env.require(cert_var, legacy_cert)?;
    let key = env.require(key_var, legacy_key)?;

    if !has_pem_block(&cert, |tag| tag == "CERTIFICATE") {
        return Err(ConfigError::invalid(cert_var, "expected a PEM encoded certificate"));
    }
    if !has_pem_block(&key, |tag| tag.ends_with("PRIVATE KEY")) {
        return Err(ConfigError::invalid(key_var, "expected a PEM encoded private key"));
    }
    Ok(CertificateMaterial::new(cert, key))
}

fn load_service(env: &Env<'_>, kind: ResourceKind) -> Result<ServiceConfig, ConfigError> {
    match kind {
        ResourceKind::Cdn => {
            let domain_names = split_list(&env.require("CDN_DOMAIN_NAME", None)?);
            if domain_names.is_empty() {
                return Err(ConfigError::Missing("CDN_DOMAIN_NAME".into()));
            }
            let region = env
                .get("CDN_REGION")
                .unwrap_or_else(|| DEFAULT_REGION.to_string());
            Ok(ServiceConfig::Cdn {
                domain_names,
                region,
            })
        }
        ResourceKind::LoadBalancer => {
            let instance_ids =
                split_list(&env.require("LB_INSTANCE_ID", Some("SLB_INSTANCE_ID"))?);
            if instance_ids.is_empty() {
                return Err(ConfigError::Missing("LB_INSTANCE_ID or SLB_INSTANCE_ID".into()));
            }
            let raw_port = env.require("LB_LISTENER_PORT", Some("SLB_LISTENER_PORT"))?;
            let listener_port = parse_listener_port(&raw_port)?;
            let region = env
                .get_with_fallback("LB_REGION", Some("SLB_REGION"))
                .unwrap_or_else(|| DEFAULT_REGION.to_string());
            Ok(ServiceConfig::LoadBalancer {
                instance_ids,
                listener_port,
                region,
            })
        }
    }
}

fn parse_listener_port(raw: &str) -> Result<u16, ConfigError> {
    let port: i64 = raw.trim().parse().map_err(|_| {
        ConfigError::invalid("LB_LISTENER_PORT", format!("must be a valid integer: {raw}"))
    })?;
    u16::try_from(port)
        .ok()
        .filter(|port| *port >= 1)
        .ok_or_else(|| {
            ConfigError::invalid("LB_LISTENER_PORT", format!("must be between 1-65535: {port}"))
        })
}

fn load_credentials(env: &Env<'_>, method: AuthMethod) -> Result<Option<Credentials>, ConfigError> {
    if !method.needs_key_pair() {
        return Ok(None);
    }
    let [id_var, legacy_id] = ACCESS_KEY_ID_VARS;
    let [secret_var, legacy_secret] = ACCESS_KEY_SECRET_VARS;
    let id = env.require(id_var, Some(legacy_id))?;
    let secret = env.require(secret_var, Some(legacy_secret))?;
    let credentials = Credentials::new(id, secret);
    match (method, env.get(SECURITY_TOKEN_VAR)) {
        (_, Some(token)) => Ok(Some(credentials.with_security_token(token))),
        (AuthMethod::Sts, None) => Err(ConfigError::Missing(format!(
            "{SECURITY_TOKEN_VAR} (required when AUTH_METHOD=sts)"
        ))),
        (_, None) => Ok(Some(credentials)),
    }
}

fn load_webhook(env: &Env<'_>) -> Option<WebhookConfig> {
    let Some(url) = env.get("WEBHOOK_URL") else {
        debug!("[config] WEBHOOK_URL is not set, notifications disabled");
        return None;
    };
    let mut config = WebhookConfig::new(url.trim());

    let timeout = env.parse_or("WEBHOOK_TIMEOUT", DEFAULT_WEBHOOK_TIMEOUT_SECS, |secs| {
        (1..=MAX_WEBHOOK_TIMEOUT_SECS).contains(secs)
    });
    config.timeout = Duration::from_secs(timeout);
    config.retry_attempts =
        env.parse_or("WEBHOOK_RETRY_ATTEMPTS", DEFAULT_WEBHOOK_RETRY_ATTEMPTS, |retries| {
            *retries <= MAX_WEBHOOK_RETRY_ATTEMPTS
        });
    let delay = env.parse_or("WEBHOOK_RETRY_DELAY", DEFAULT_WEBHOOK_RETRY_DELAY_SECS, |secs| {
        (0.0..=MAX_WEBHOOK_RETRY_DELAY_SECS).contains(secs)
    });
    config.retry_delay = Duration::try_from_secs_f64(delay)
        .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_WEBHOOK_RETRY_DELAY_SECS));

    if let Some(raw) = env.get("WEBHOOK_ENABLED_EVENTS") {
        let mut events = Vec::new();
        for name in split_list(&raw) {
            match name.parse::<EventType>() {
                Ok(event) if !events.contains(&event) => events.push(event),
                Ok(_) => {}
                Err(_) => warn!("[config] ignoring unknown webhook event type: {name}"),
            }
        }
        config.enabled_events = events;
    }
    if let Some(format) = env.get("WEBHOOK_MESSAGE_FORMAT") {
        config.message_format = format.trim().to_ascii_lowercase();
    }
    Some(config)
}

/// Reads the full run configuration. Unsupported selections are reported
/// before anything else is validated.
pub fn load_config(lookup: Lookup<'_>) -> Result<AppConfig, ConfigError> {
    let env = Env { lookup };

    let service_type = env
        .get("SERVICE_TYPE")
        .map(|raw| raw.trim().to_ascii_lowercase())
        .unwrap_or_else(|| "cdn".to_string());
    let kind = match service_type.as_str() {
        "cdn" => ResourceKind::Cdn,
        "lb" => ResourceKind::LoadBalancer,
        "slb" => {
            warn!("[config] SERVICE_TYPE=slb is deprecated, please use SERVICE_TYPE=lb");
            ResourceKind::LoadBalancer
        }
        other => return Err(ConfigError::UnsupportedServiceType(other.to_string())),
    };

    let cloud_provider = env
        .get("CLOUD_PROVIDER")
        .map(|raw| raw.trim().to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_CLOUD_PROVIDER.to_string());

    let auth_method = match env.get("AUTH_METHOD") {
        Some(raw) => AuthMethod::from_str(&raw)
            .map_err(|_| ConfigError::UnsupportedAuthMethod(raw.trim().to_string()))?,
        None => AuthMethod::AccessKey,
    };
    let credentials = load_credentials(&env, auth_method)?;

    let service = load_service(&env, kind)?;
    let material = load_material(&env, kind)?;

    Ok(AppConfig {
        service,
        material,
        cloud_provider,
        auth_method,
        credentials,
        force_update: env.flag("FORCE_UPDATE"),
        dry_run: env.flag("DRY_RUN"),
        webhook: load_webhook(&env),
    })
}
