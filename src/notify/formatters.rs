use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};
use thiserror::Error;

use super::events::{EventType, LifecycleEvent, ResultStatus};
use crate::core::types::ResourceKind;
use crate::errors::ConfigError;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("content length ({len} bytes) exceeds maximum allowed length ({max} bytes)")]
    ContentTooLong { len: usize, max: usize },
    #[error("content is required for a text message")]
    MissingContent,
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Turns a lifecycle event into the JSON body posted to the webhook.
pub trait MessageFormatter: Send + Sync {
    fn format(&self, event: &LifecycleEvent) -> Result<Value, FormatError>;
}

/// Posts the event's own JSON representation.
pub struct GenericFormatter;

impl MessageFormatter for GenericFormatter {
    fn format(&self, event: &LifecycleEvent) -> Result<Value, FormatError> {
        Ok(serde_json::to_value(event)?)
    }
}

/// `{"msgtype":"text","text":{...}}` payload for WeChat Work group robots.
#[derive(Debug, Default)]
pub struct WeChatWorkTextMessage {
    content: Option<String>,
    mentioned_list: Option<Vec<String>>,
    mentioned_mobile_list: Option<Vec<String>>,
}

impl WeChatWorkTextMessage {
    /// Size ceiling enforced by the robot API, in UTF-8 bytes.
    pub const MAX_CONTENT_BYTES: usize = 2048;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl Into<String>) -> Result<Self, FormatError> {
        let content = content.into();
        if content.len() > Self::MAX_CONTENT_BYTES {
            return Err(FormatError::ContentTooLong {
                len: content.len(),
                max: Self::MAX_CONTENT_BYTES,
            });
        }
        self.content = Some(content);
        Ok(self)
    }

    pub fn mentioned_list(mut self, user_ids: Vec<String>) -> Self {
        self.mentioned_list = Some(user_ids);
        self
    }

    pub fn mentioned_mobile_list(mut self, mobiles: Vec<String>) -> Self {
        self.mentioned_mobile_list = Some(mobiles);
        self
    }

    pub fn build(self) -> Result<Value, FormatError> {
        let content = self.content.ok_or(FormatError::MissingContent)?;
        let mut text = json!({ "content": content });
        if let Some(list) = self.mentioned_list {
            text["mentioned_list"] = json!(list);
        }
        if let Some(list) = self.mentioned_mobile_list {
            text["mentioned_mobile_list"] = json!(list);
        }
        Ok(json!({ "msgtype": "text", "text": text }))
    }
}

/// Renders the event as a single readable text block.
pub struct WeChatWorkFormatter;

impl WeChatWorkFormatter {
    fn title(event_type: EventType) -> &'static str {
        match event_type {
            EventType::RenewalStarted => "Certificate renewal started",
            EventType::RenewalSuccess => "Certificate renewal succeeded",
            EventType::RenewalFailed => "Certificate renewal failed",
            EventType::RenewalSkipped => "Certificate renewal skipped",
            EventType::BatchCompleted => "Batch renewal completed",
        }
    }

    fn status(status: ResultStatus) -> &'static str {
        match status {
            ResultStatus::Success => "✅ success",
            ResultStatus::Failure => "❌ failure",
            ResultStatus::Skipped => "⏭️ skipped",
            ResultStatus::Started => "🔄 in progress",
        }
    }

    pub fn render(event: &LifecycleEvent) -> String {
        let mut lines = vec![format!("📋 {}", Self::title(event.event_type))];

        let service = match event.source.service_type {
            ResourceKind::Cdn => "CDN",
            ResourceKind::LoadBalancer => "Load balancer",
        };
        lines.push(format!("Service: {service}"));
        lines.push(format!("Provider: {}", event.source.cloud_provider));
        lines.push(format!("Region: {}", event.source.region));

        if let Some(domains) = event.target.domain_names.as_ref().filter(|d| !d.is_empty()) {
            lines.push(format!("Domains: {}", domains.join(", ")));
        }
        if let Some(ids) = event.target.instance_ids.as_ref().filter(|i| !i.is_empty()) {
            lines.push(format!("Instance IDs: {}", ids.join(", ")));
        }
        if let Some(port) = event.target.listener_port {
            lines.push(format!("Listener port: {port}"));
        }

        if let Some(certificate) = &event.certificate {
            if let Some(not_after) = certificate.not_after {
                lines.push(format!(
                    "Expires: {}",
                    not_after.format("%Y-%m-%d %H:%M:%S")
                ));
            }
            if let Some(issuer) = &certificate.issuer {
                lines.push(format!("Issuer: {issuer}"));
            }
        }

        if let Some(result) = &event.result {
            lines.push(format!("Status: {}", Self::status(result.status)));
            lines.push(format!("Message: {}", result.message));
            if let Some(code) = &result.error_code {
                lines.push(format!("Error code: {code}"));
            }
            if let Some(details) = &result.error_details {
                lines.push(format!("Error details: {details}"));
            }
        }

        if let Some(metadata) = &event.metadata {
            if metadata.dry_run {
                lines.push("⚠️ Dry run, no changes were made".to_string());
            }
            if let Some(ms) = metadata.execution_time_ms.filter(|ms| *ms > 0) {
                lines.push(format!("Execution time: {ms}ms"));
            }
            if let Some(total) = metadata.total_resources {
                lines.push(format!("Total resources: {total}"));
                if let Some(succeeded) = metadata.successful_resources {
                    lines.push(format!(
                        "Succeeded: {succeeded}, failed: {}",
                        metadata.failed_resources.unwrap_or(0)
                    ));
                }
            }
        }

        lines.push(format!("Event ID: {}", event.event_id));
        lines.push(format!(
            "Time: {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        lines.join("\n")
    }
}

impl MessageFormatter for WeChatWorkFormatter {
    fn format(&self, event: &LifecycleEvent) -> Result<Value, FormatError> {
        WeChatWorkTextMessage::new()
            .content(Self::render(event))?
            .build()
    }
}

/// Format name to formatter table, built once and passed by reference.
pub struct FormatterRegistry {
    formatters: BTreeMap<String, Arc<dyn MessageFormatter>>,
}

impl FormatterRegistry {
    pub fn empty() -> Self {
        Self {
            formatters: BTreeMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("generic", Arc::new(GenericFormatter));
        registry.register("wechat_work", Arc::new(WeChatWorkFormatter));
        registry
    }

    pub fn register(&mut self, name: &str, formatter: Arc<dyn MessageFormatter>) {
        self.formatters
            .insert(name.trim().to_ascii_lowercase(), formatter);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn MessageFormatter>, ConfigError> {
        let key = name.trim().to_ascii_lowercase();
        self.formatters.get(&key).cloned().ok_or_else(|| {
            ConfigError::UnsupportedMessageFormat {
                name: name.to_string(),
                supported: self
                    .formatters
                    .keys()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            }
        })
    }
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
