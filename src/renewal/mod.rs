//! Per-target renewal: validate, compare, then skip or update.
//!
//! Resource-specific behavior lives behind [`ResourceAdapter`]; [`renew`] is
//! the single state machine shared by every resource kind.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::certificate::{abbreviate, fingerprint, normalize_fingerprint};
use crate::core::types::{
    CertificateMaterial, FingerprintAlgorithm, RenewOptions, RenewalOutcome, TargetDescriptor,
};
use crate::errors::{ErrorKind, RenewError};
use crate::notify::EventSink;
use crate::notify::events::{
    EventCertificate, EventMetadata, EventResult, EventSource, EventTarget, EventType,
    LifecycleEvent, ResultStatus,
};

pub mod adapters;
pub mod batch;

pub use adapters::{CdnAdapter, LoadBalancerAdapter, adapter_for_kind};

/// What a provider reports about the certificate currently deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentCertificate {
    Pem(String),
    Fingerprint(String),
}

/// Resource-kind capabilities used by [`renew`].
pub trait ResourceAdapter: Send + Sync {
    fn provider_name(&self) -> &str;

    fn fingerprint_algorithm(&self) -> FingerprintAlgorithm;

    /// Whether `cert` may be deployed to `target` at `now`.
    fn validate(&self, cert: &str, target: &TargetDescriptor, now: DateTime<Utc>) -> bool;

    fn fetch_current_info(&self, target: &TargetDescriptor) -> Result<Option<CurrentCertificate>>;

    fn push(&self, target: &TargetDescriptor, material: &CertificateMaterial) -> Result<bool>;

    /// Fingerprint of the deployed certificate in canonical form.
    fn current_fingerprint(&self, target: &TargetDescriptor) -> Result<Option<String>> {
        let reported = match self.fetch_current_info(target)? {
            None => return Ok(None),
            Some(CurrentCertificate::Pem(pem)) => fingerprint(&pem, self.fingerprint_algorithm())?,
            Some(CurrentCertificate::Fingerprint(raw)) => raw,
        };
        Ok(Some(normalize_fingerprint(&reported)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenewalState {
    Init,
    Validated,
    Compared,
    Done,
}

struct Machine<'a> {
    state: RenewalState,
    label: &'a str,
}

impl Machine<'_> {
    fn advance(&mut self, next: RenewalState) {
        debug!("[renewal] {}: {:?} -> {:?}", self.label, self.state, next);
        self.state = next;
    }
}

/// Drives one target through validate, compare and update.
///
/// Lifecycle events go to `events` before and after; emitting them never
/// changes the returned value.
pub fn renew(
    adapter: &dyn ResourceAdapter,
    material: &CertificateMaterial,
    target: &TargetDescriptor,
    options: RenewOptions,
    events: &dyn EventSink,
) -> Result<RenewalOutcome, RenewError> {
    let started = Instant::now();
    let report = Report::new(adapter, material, target, options);
    events.emit(report.event(
        EventType::RenewalStarted,
        EventResult::new(
            ResultStatus::Started,
            format!("Certificate renewal started for {}", target.label()),
        ),
        None,
    ));

    let result = run(adapter, material, target, options);

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    events.emit(report.terminal(&result, elapsed_ms));
    result
}

fn run(
    adapter: &dyn ResourceAdapter,
    material: &CertificateMaterial,
    target: &TargetDescriptor,
    options: RenewOptions,
) -> Result<RenewalOutcome, RenewError> {
    let label = target.label();
    let mut machine = Machine {
        state: RenewalState::Init,
        label: &label,
    };

    if !adapter.validate(&material.cert, target, Utc::now()) {
        return Err(RenewError::CertValidation { target: label.clone() });
    }
    machine.advance(RenewalState::Validated);

    if options.force_update {
        info!("[renewal] force update enabled, updating {label} even if unchanged");
    } else {
        let candidate = fingerprint(&material.cert, adapter.fingerprint_algorithm())?;
        match adapter.current_fingerprint(target) {
            Ok(Some(current)) if current == normalize_fingerprint(&candidate) => {
                info!(
                    "[renewal] certificate unchanged, skipping {label}: fingerprint={}",
                    abbreviate(&candidate)
                );
                machine.advance(RenewalState::Done);
                return Ok(RenewalOutcome::Skipped);
            }
            Ok(Some(current)) => debug!(
                "[renewal] {label} serves {}, candidate is {}",
                abbreviate(&current),
                abbreviate(&candidate)
            ),
            Ok(None) => debug!("[renewal] no current certificate reported for {label}"),
            Err(err) => {
                warn!("[renewal] could not query current certificate for {label}, comparison skipped: {err:#}")
            }
        }
    }
    machine.advance(RenewalState::Compared);

    if options.dry_run {
        info!("[renewal] dry run: would update certificate for {label}");
        machine.advance(RenewalState::Done);
        return Ok(RenewalOutcome::Updated);
    }

    let pushed = adapter.push(target, material).map_err(RenewError::from_adapter)?;
    machine.advance(RenewalState::Done);
    if pushed {
        info!("[renewal] certificate updated for {label}");
        Ok(RenewalOutcome::Updated)
    } else {
        warn!("[renewal] provider reported the update of {label} did not succeed");
        Ok(RenewalOutcome::Failed(format!(
            "provider {} did not accept the certificate update",
            adapter.provider_name()
        )))
    }
}

/// Shared parts of the events emitted for one target.
struct Report {
    source: EventSource,
    target: EventTarget,
    certificate: EventCertificate,
    label: String,
    options: RenewOptions,
}

impl Report {
    fn new(
        adapter: &dyn ResourceAdapter,
        material: &CertificateMaterial,
        target: &TargetDescriptor,
        options: RenewOptions,
    ) -> Self {
        Self {
            source: EventSource::new(target.kind(), adapter.provider_name(), target.region()),
            target: EventTarget::from(target),
            certificate: EventCertificate::from_pem(&material.cert, adapter.fingerprint_algorithm()),
            label: target.label(),
            options,
        }
    }

    fn event(
        &self,
        event_type: EventType,
        result: EventResult,
        elapsed_ms: Option<u64>,
    ) -> LifecycleEvent {
        let mut metadata = EventMetadata::new(self.options.force_update, self.options.dry_run);
        if let Some(ms) = elapsed_ms {
            metadata = metadata.with_execution_time(ms);
        }
        LifecycleEvent::new(event_type, self.source.clone(), self.target.clone())
            .with_certificate(self.certificate.clone())
            .with_result(result)
            .with_metadata(metadata)
    }

    fn terminal(
        &self,
        result: &Result<RenewalOutcome, RenewError>,
        elapsed_ms: u64,
    ) -> LifecycleEvent {
        let label = &self.label;
        let (event_type, result) = match result {
            Ok(RenewalOutcome::Updated) if self.options.dry_run => (
                EventType::RenewalSuccess,
                EventResult::new(
                    ResultStatus::Success,
                    format!("Dry run: certificate would be updated for {label}"),
                ),
            ),
            Ok(RenewalOutcome::Updated) => (
                EventType::RenewalSuccess,
                EventResult::new(
                    ResultStatus::Success,
                    format!("Certificate updated for {label}"),
                ),
            ),
            Ok(RenewalOutcome::Skipped) => (
                EventType::RenewalSkipped,
                EventResult::new(
                    ResultStatus::Skipped,
                    format!("Certificate unchanged for {label}, update skipped"),
                ),
            ),
            Ok(RenewalOutcome::Failed(reason)) => (
                EventType::RenewalFailed,
                EventResult::failure(
                    format!("Certificate update failed for {label}"),
                    ErrorKind::Provider.code(),
                    reason.clone(),
                ),
            ),
            Err(err) => (
                EventType::RenewalFailed,
                EventResult::failure(
                    format!("Certificate renewal failed for {label}"),
                    err.kind().code(),
                    err.to_string(),
                ),
            ),
        };
        self.event(event_type, result, Some(elapsed_ms))
    }
}

/// One configured target bound to its adapter and the run's material.
#[derive(Clone)]
pub struct TargetRenewer {
    pub adapter: Arc<dyn ResourceAdapter>,
    pub material: Arc<CertificateMaterial>,
    pub target: TargetDescriptor,
    pub options: RenewOptions,
}

impl TargetRenewer {
    pub fn new(
        adapter: Arc<dyn ResourceAdapter>,
        material: Arc<CertificateMaterial>,
        target: TargetDescriptor,
        options: RenewOptions,
    ) -> Self {
        Self {
            adapter,
            material,
            target,
            options,
        }
    }

    pub fn renew(&self, events: &dyn EventSink) -> Result<RenewalOutcome, RenewError> {
        renew(
            self.adapter.as_ref(),
            &self.material,
            &self.target,
            self.options,
            events,
        )
    }
}
