//! Lifecycle notifications: event model, payload formatting, and
//! fire-and-forget webhook delivery on a small worker pool.

use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded, unbounded};
use log::{debug, info, warn};

pub mod events;
pub mod formatters;
pub mod http;
pub mod retry;

use crate::config::WebhookConfig;
use crate::errors::ConfigError;
use events::{EventType, LifecycleEvent};
use formatters::{FormatterRegistry, MessageFormatter};
use http::WebhookClient;

/// Receiver of lifecycle events. Emitting never blocks on delivery and
/// never reports failure back to the caller.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LifecycleEvent);
}

/// Discards every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: LifecycleEvent) {}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Dispatcher {
    sender: Mutex<Option<Sender<LifecycleEvent>>>,
    enabled: HashSet<EventType>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// One message per worker that has drained the queue and exited.
    finished: Receiver<()>,
}

/// Webhook notification channel. Disabled when no URL is configured, in
/// which case every event is dropped silently.
pub struct NotificationService {
    dispatcher: Option<Dispatcher>,
}

impl NotificationService {
    pub fn disabled() -> Self {
        Self { dispatcher: None }
    }

    /// Builds the service from configuration, resolving the message format
    /// against `formatters`.
    pub fn new(
        config: Option<&WebhookConfig>,
        formatters: &FormatterRegistry,
    ) -> Result<Self, ConfigError> {
        let Some(config) = config.filter(|config| !config.url.trim().is_empty()) else {
            debug!("[webhook] no webhook URL configured, notifications disabled");
            return Ok(Self::disabled());
        };
        let formatter = formatters.get(&config.message_format)?;
        let client = WebhookClient::new(config.timeout, config.retry_attempts, config.retry_delay);
        Ok(Self::start(config, formatter, client))
    }

    /// Spawns the worker pool around an already built client.
    pub fn start(
        config: &WebhookConfig,
        formatter: Arc<dyn MessageFormatter>,
        client: WebhookClient,
    ) -> Self {
        let (sender, receiver) = bounded(config.queue_capacity.max(1));
        let (finished_tx, finished) = unbounded();
        let client = Arc::new(client);

        let mut workers = Vec::new();
        for index in 0..config.workers.max(1) {
            let worker = Worker {
                url: config.url.clone(),
                receiver: receiver.clone(),
                formatter: formatter.clone(),
                client: client.clone(),
                finished: finished_tx.clone(),
            };
            let spawned = std::thread::Builder::new()
                .name(format!("webhook-{index}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => warn!("[webhook] failed to spawn delivery worker: {err}"),
            }
        }
        if workers.is_empty() {
            warn!("[webhook] no delivery workers available, notifications disabled");
            return Self::disabled();
        }

        info!(
            "[webhook] notifications enabled: format={}, events={}",
            config.message_format,
            config
                .enabled_events
                .iter()
                .map(EventType::as_str)
                .collect::<Vec<_>>()
                .join(",")
        );
        Self {
            dispatcher: Some(Dispatcher {
                sender: Mutex::new(Some(sender)),
                enabled: config.enabled_events.iter().copied().collect(),
                workers: Mutex::new(workers),
                finished,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.dispatcher.is_some()
    }

    /// Stops accepting events and waits up to `grace` for queued deliveries.
    /// Returns whether every worker drained the queue in time.
    pub fn shutdown(&self, grace: Duration) -> bool {
        let Some(dispatcher) = &self.dispatcher else {
            return true;
        };
        drop(lock(&dispatcher.sender).take());

        let mut workers = lock(&dispatcher.workers);
        let deadline = Instant::now() + grace;
        let mut remaining = workers.len();
        while remaining > 0 {
            match dispatcher.finished.recv_deadline(deadline) {
                Ok(()) => remaining -= 1,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "[webhook] {}s grace period elapsed with notifications still pending",
                        grace.as_secs()
                    );
                    return false;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                warn!("[webhook] delivery worker panicked");
            }
        }
        true
    }
}

impl EventSink for NotificationService {
    fn emit(&self, event: LifecycleEvent) {
        let Some(dispatcher) = &self.dispatcher else {
            return;
        };
        if !dispatcher.enabled.contains(&event.event_type) {
            debug!("[webhook] event {} not enabled, skipping", event.event_type);
            return;
        }

        let guard = lock(&dispatcher.sender);
        let Some(sender) = guard.as_ref() else {
            debug!("[webhook] notifier shut down, dropping {}", event.event_type);
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => warn!(
                "[webhook] delivery queue full, dropping {} event {}",
                event.event_type, event.event_id
            ),
            Err(TrySendError::Disconnected(event)) => {
                warn!("[webhook] delivery workers gone, dropping {}", event.event_type)
            }
        }
    }
}

struct Worker {
    url: String,
    receiver: Receiver<LifecycleEvent>,
    formatter: Arc<dyn MessageFormatter>,
    client: Arc<WebhookClient>,
    finished: Sender<()>,
}

impl Worker {
    /// Delivers until the queue is closed and empty. A panic while handling
    /// one event is logged and the worker moves on.
    fn run(self) {
        for event in self.receiver.iter() {
            if catch_unwind(AssertUnwindSafe(|| self.handle(&event))).is_err() {
                warn!(
                    "[webhook] delivery of {} event {} panicked",
                    event.event_type, event.event_id
                );
            }
        }
        let _ = self.finished.send(());
    }

    fn handle(&self, event: &LifecycleEvent) {
        let payload = match self.formatter.format(event) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(
                    "[webhook] failed to format {} event {}: {err}",
                    event.event_type, event.event_id
                );
                return;
            }
        };
        if !self.client.deliver(&self.url, &payload) {
            warn!(
                "[webhook] {} event {} was not delivered",
                event.event_type, event.event_id
            );
        }
    }
}
