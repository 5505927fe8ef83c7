//! Command line surface: argument parsing, run wiring and exit codes.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use crate::auth::{EnvLookup, provider_for_method};
use crate::config::{AppConfig, load_config};
use crate::errors::{AuthError, ConfigError, ErrorKind};
use crate::notify::events::EventSource;
use crate::notify::formatters::FormatterRegistry;
use crate::notify::{EventSink, NotificationService};
use crate::providers::ClientRegistry;
use crate::renewal::batch::{BatchCoordinator, BatchSummary};
use crate::renewal::{TargetRenewer, adapter_for_kind};

/// How long queued notifications may take to go out before the process exits.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(
    name = "cloud-cert-renewer",
    about = "Deploy a renewed HTTPS certificate to cloud CDN domains or load balancer listeners",
    version
)]
pub struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Run every check without updating any resource
    #[arg(long)]
    pub dry_run: bool,
}

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Failure,
    Config,
    CertValidation,
    Auth,
    Unsupported,
    NotImplemented,
    CloudApi,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Failure => 1,
            ExitCode::Config => 2,
            ExitCode::CertValidation => 3,
            ExitCode::Auth => 4,
            ExitCode::Unsupported => 5,
            ExitCode::NotImplemented => 6,
            ExitCode::CloudApi => 7,
        }
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Configuration => ExitCode::Config,
            ErrorKind::CertificateValidation => ExitCode::CertValidation,
            ErrorKind::Authentication => ExitCode::Auth,
            ErrorKind::Provider => ExitCode::CloudApi,
            ErrorKind::Unexpected => ExitCode::Failure,
        }
    }

    /// A lone target reports its specific failure; a batch only says it failed.
    pub fn from_summary(summary: &BatchSummary) -> Self {
        match summary.failures.as_slice() {
            [] => ExitCode::Success,
            [only] if summary.total == 1 => ExitCode::from_kind(only.kind),
            _ => ExitCode::Failure,
        }
    }
}

fn config_exit(err: &ConfigError) -> ExitCode {
    error!("[config] {err}");
    if err.is_not_implemented() {
        ExitCode::NotImplemented
    } else if err.is_unsupported() {
        ExitCode::Unsupported
    } else {
        ExitCode::Config
    }
}

fn auth_exit(err: &AuthError) -> ExitCode {
    error!("[auth] {err}");
    match err {
        AuthError::UnsupportedMethod(_) => ExitCode::Unsupported,
        AuthError::NotImplemented(_) => ExitCode::NotImplemented,
        AuthError::MissingCredentials(_) => ExitCode::Auth,
    }
}

/// Reads the configuration from the process environment and runs it with
/// the built-in client and formatter tables.
pub fn run(args: &Args) -> ExitCode {
    let mut config = match load_config(&|name: &str| std::env::var(name).ok()) {
        Ok(config) => config,
        Err(err) => return config_exit(&err),
    };
    if args.dry_run {
        config.dry_run = true;
    }
    let lookup: EnvLookup = Arc::new(|name: &str| std::env::var(name).ok());
    execute(
        config,
        &ClientRegistry::with_defaults(),
        &FormatterRegistry::with_defaults(),
        lookup,
    )
}

/// Renews every configured target and flushes notifications before returning.
pub fn execute(
    config: AppConfig,
    clients: &ClientRegistry,
    formatters: &FormatterRegistry,
    lookup: EnvLookup,
) -> ExitCode {
    execute_with_grace(config, clients, formatters, lookup, SHUTDOWN_GRACE)
}

pub fn execute_with_grace(
    config: AppConfig,
    clients: &ClientRegistry,
    formatters: &FormatterRegistry,
    lookup: EnvLookup,
    grace: Duration,
) -> ExitCode {
    let credentials =
        match provider_for_method(config.auth_method, config.credentials.as_ref(), lookup) {
            Ok(provider) => provider,
            Err(err) => return auth_exit(&err),
        };
    let client = match clients.create(&config.cloud_provider, credentials) {
        Ok(client) => client,
        Err(err) => return config_exit(&err),
    };
    let notifier = match NotificationService::new(config.webhook.as_ref(), formatters) {
        Ok(service) => Arc::new(service),
        Err(err) => return config_exit(&err),
    };

    let kind = config.service.kind();
    let options = config.renew_options();
    let targets = config.service.targets();
    info!(
        "[run] renewing {} {kind} target(s) via {} (auth={}, force_update={}, dry_run={})",
        targets.len(),
        client.provider_name(),
        config.auth_method.as_str(),
        options.force_update,
        options.dry_run
    );

    let source = EventSource::new(kind, client.provider_name(), config.service.region());
    let adapter = adapter_for_kind(kind, client);
    let material = Arc::new(config.material);
    let renewers = targets
        .into_iter()
        .map(|target| TargetRenewer::new(adapter.clone(), material.clone(), target, options))
        .collect();

    let events: Arc<dyn EventSink> = notifier.clone();
    let summary = BatchCoordinator::new(renewers, events, source, options).run();
    notifier.shutdown(grace);

    let code = ExitCode::from_summary(&summary);
    if code != ExitCode::Success {
        error!(
            "[run] {}/{} target(s) failed, exiting with code {}",
            summary.failed(),
            summary.total,
            code.as_i32()
        );
    }
    code
}
