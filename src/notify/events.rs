//! Lifecycle events and their JSON wire shape.
//!
//! Optional fields are serialized as `null` rather than omitted; receivers
//! rely on a stable key set.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::certificate::certificate_summary;
use crate::core::types::{FingerprintAlgorithm, ResourceKind, TargetDescriptor};
use crate::errors::ConfigError;

/// Crate version reported in every event's metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RenewalStarted,
    RenewalSuccess,
    RenewalFailed,
    RenewalSkipped,
    BatchCompleted,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::RenewalStarted,
        EventType::RenewalSuccess,
        EventType::RenewalFailed,
        EventType::RenewalSkipped,
        EventType::BatchCompleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RenewalStarted => "renewal_started",
            EventType::RenewalSuccess => "renewal_success",
            EventType::RenewalFailed => "renewal_failed",
            EventType::RenewalSkipped => "renewal_skipped",
            EventType::BatchCompleted => "batch_completed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ConfigError;

    /// Accepts the wire names and the short forms (`started`, `batch-completed`, ...).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let key = raw.trim().to_ascii_lowercase().replace('-', "_");
        match key.as_str() {
            "renewal_started" | "started" => Ok(EventType::RenewalStarted),
            "renewal_success" | "success" => Ok(EventType::RenewalSuccess),
            "renewal_failed" | "failed" => Ok(EventType::RenewalFailed),
            "renewal_skipped" | "skipped" => Ok(EventType::RenewalSkipped),
            "batch_completed" => Ok(EventType::BatchCompleted),
            _ => Err(ConfigError::invalid(
                "WEBHOOK_ENABLED_EVENTS",
                format!("unknown event type '{}'", raw.trim()),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSource {
    pub service_type: ResourceKind,
    pub cloud_provider: String,
    pub region: String,
}

impl EventSource {
    pub fn new(
        service_type: ResourceKind,
        cloud_provider: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            service_type,
            cloud_provider: cloud_provider.into(),
            region: region.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTarget {
    pub domain_names: Option<Vec<String>>,
    pub instance_ids: Option<Vec<String>>,
    pub listener_port: Option<u16>,
}

impl EventTarget {
    /// Aggregated target for a batch summary.
    pub fn from_targets(targets: &[TargetDescriptor]) -> Self {
        let mut merged = EventTarget::default();
        for target in targets {
            match target {
                TargetDescriptor::Cdn { domain, .. } => merged
                    .domain_names
                    .get_or_insert_with(Vec::new)
                    .push(domain.clone()),
                TargetDescriptor::LoadBalancer {
                    instance_id,
                    listener_port,
                    ..
                } => {
                    merged
                        .instance_ids
                        .get_or_insert_with(Vec::new)
                        .push(instance_id.clone());
                    merged.listener_port.get_or_insert(*listener_port);
                }
            }
        }
        merged
    }
}

impl From<&TargetDescriptor> for EventTarget {
    fn from(target: &TargetDescriptor) -> Self {
        Self::from_targets(std::slice::from_ref(target))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCertificate {
    pub fingerprint: Option<String>,
    pub not_after: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub issuer: Option<String>,
}

impl EventCertificate {
    /// Summary of the candidate certificate; empty when it cannot be parsed.
    pub fn from_pem(pem: &str, algorithm: FingerprintAlgorithm) -> Self {
        match certificate_summary(pem, algorithm) {
            Ok(summary) => Self {
                fingerprint: Some(summary.fingerprint),
                not_after: Some(summary.not_after),
                not_before: Some(summary.not_before),
                issuer: Some(summary.issuer),
            },
            Err(err) => {
                debug!("[events] certificate summary unavailable: {err}");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Failure,
    Skipped,
    Started,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResult {
    pub status: ResultStatus,
    pub message: String,
    pub error_code: Option<String>,
    pub error_details: Option<String>,
    pub retry_count: u32,
}

impl EventResult {
    pub fn new(status: ResultStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_code: None,
            error_details: None,
            retry_count: 0,
        }
    }

    pub fn failure(
        message: impl Into<String>,
        error_code: impl Into<String>,
        error_details: impl Into<String>,
    ) -> Self {
        Self {
            error_code: Some(error_code.into()),
            error_details: Some(error_details.into()),
            ..Self::new(ResultStatus::Failure, message)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub version: String,
    pub execution_time_ms: Option<u64>,
    pub total_resources: Option<usize>,
    pub successful_resources: Option<usize>,
    pub failed_resources: Option<usize>,
    pub force_update: bool,
    pub dry_run: bool,
}

impl EventMetadata {
    pub fn new(force_update: bool, dry_run: bool) -> Self {
        Self {
            version: VERSION.to_string(),
            execution_time_ms: None,
            total_resources: None,
            successful_resources: None,
            failed_resources: None,
            force_update,
            dry_run,
        }
    }

    pub fn with_execution_time(mut self, elapsed_ms: u64) -> Self {
        self.execution_time_ms = Some(elapsed_ms);
        self
    }

    pub fn with_totals(mut self, total: usize, succeeded: usize, failed: usize) -> Self {
        self.total_resources = Some(total);
        self.successful_resources = Some(succeeded);
        self.failed_resources = Some(failed);
        self
    }
}

/// One step of the renewal lifecycle. Built once, then handed to the
/// notification path by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub event_type: EventType,
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
    pub target: EventTarget,
    pub certificate: Option<EventCertificate>,
    pub result: Option<EventResult>,
    pub metadata: Option<EventMetadata>,
}

impl LifecycleEvent {
    pub fn new(event_type: EventType, source: EventSource, target: EventTarget) -> Self {
        Self {
            event_type,
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            source,
            target,
            certificate: None,
            result: None,
            metadata: None,
        }
    }

    pub fn with_certificate(mut self, certificate: EventCertificate) -> Self {
        self.certificate = Some(certificate);
        self
    }

    pub fn with_result(mut self, result: EventResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
