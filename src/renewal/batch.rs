use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use super::TargetRenewer;
use crate::core::types::{RenewOptions, RenewalOutcome, TargetDescriptor};
use crate::errors::ErrorKind;
use crate::notify::EventSink;
use crate::notify::events::{
    EventMetadata, EventResult, EventSource, EventTarget, EventType, LifecycleEvent, ResultStatus,
};

/// Pause before the summary event so per-target deliveries get picked up first.
pub const DEFAULT_SUMMARY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct TargetFailure {
    pub target: TargetDescriptor,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Counted within `succeeded`.
    pub skipped: usize,
    pub failures: Vec<TargetFailure>,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Renews every target in order; a failing target never stops the rest.
pub struct BatchCoordinator {
    renewers: Vec<TargetRenewer>,
    events: Arc<dyn EventSink>,
    source: EventSource,
    options: RenewOptions,
    summary_delay: Duration,
}

impl BatchCoordinator {
    pub fn new(
        renewers: Vec<TargetRenewer>,
        events: Arc<dyn EventSink>,
        source: EventSource,
        options: RenewOptions,
    ) -> Self {
        Self {
            renewers,
            events,
            source,
            options,
            summary_delay: DEFAULT_SUMMARY_DELAY,
        }
    }

    pub fn with_summary_delay(mut self, delay: Duration) -> Self {
        self.summary_delay = delay;
        self
    }

    pub fn run(&self) -> BatchSummary {
        let started = Instant::now();
        let total = self.renewers.len();
        let mut summary = BatchSummary {
            total,
            ..BatchSummary::default()
        };
        if total == 0 {
            warn!("[batch] no resources to renew");
            self.events.emit(self.summary_event(&summary));
            return summary;
        }

        info!("[batch] starting batch renewal for {total} resource(s)");
        for (index, renewer) in self.renewers.iter().enumerate() {
            let position = index + 1;
            info!("[batch] [{position}/{total}] processing {}", renewer.target);

            let attempt = catch_unwind(AssertUnwindSafe(|| renewer.renew(self.events.as_ref())));
            let failure = match attempt {
                Ok(Ok(RenewalOutcome::Updated)) => None,
                Ok(Ok(RenewalOutcome::Skipped)) => {
                    summary.skipped += 1;
                    None
                }
                Ok(Ok(RenewalOutcome::Failed(reason))) => Some((ErrorKind::Provider, reason)),
                Ok(Err(err)) => Some((err.kind(), err.to_string())),
                Err(panic) => Some((ErrorKind::Unexpected, panic_message(panic.as_ref()))),
            };

            match failure {
                None => summary.succeeded += 1,
                Some((kind, message)) => {
                    error!(
                        "[batch] [{position}/{total}] {} failed ({}): {message}",
                        renewer.target,
                        kind.code()
                    );
                    summary.failures.push(TargetFailure {
                        target: renewer.target.clone(),
                        kind,
                        message,
                    });
                }
            }
        }
        summary.elapsed = started.elapsed();

        if summary.all_succeeded() {
            info!("[batch] batch renewal completed successfully: {total}/{total} succeeded");
        } else {
            error!(
                "[batch] batch renewal completed with errors: {}/{total} failed",
                summary.failed()
            );
        }

        if !self.summary_delay.is_zero() {
            std::thread::sleep(self.summary_delay);
        }
        self.events.emit(self.summary_event(&summary));
        summary
    }

    /// Returns `true` only when every target succeeded or was skipped.
    pub fn renew_all(&self) -> bool {
        self.run().all_succeeded()
    }

    fn summary_event(&self, summary: &BatchSummary) -> LifecycleEvent {
        let targets: Vec<TargetDescriptor> =
            self.renewers.iter().map(|r| r.target.clone()).collect();
        let message = format!(
            "Batch renewal completed: {}/{} succeeded, {} failed",
            summary.succeeded,
            summary.total,
            summary.failed()
        );
        let result = if summary.all_succeeded() {
            EventResult::new(ResultStatus::Success, message)
        } else {
            let details = summary
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.target.label(), f.message))
                .collect::<Vec<_>>()
                .join("; ");
            EventResult {
                error_details: Some(details),
                ..EventResult::new(ResultStatus::Failure, message)
            }
        };
        let elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX);
        LifecycleEvent::new(
            EventType::BatchCompleted,
            self.source.clone(),
            EventTarget::from_targets(&targets),
        )
        .with_result(result)
        .with_metadata(
            EventMetadata::new(self.options.force_update, self.options.dry_run)
                .with_execution_time(elapsed_ms)
                .with_totals(summary.total, summary.succeeded, summary.failed()),
        )
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("unexpected panic: {text}")
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("unexpected panic: {text}")
    } else {
        "unexpected panic".to_string()
    }
}
