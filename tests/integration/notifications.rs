use anyhow::Result;
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cloud_cert_renewer::cli::{ExitCode, execute_with_grace};
use cloud_cert_renewer::config::WebhookConfig;
use cloud_cert_renewer::core::types::{RenewOptions, ResourceKind, TargetDescriptor};
use cloud_cert_renewer::notify::NotificationService;
use cloud_cert_renewer::notify::events::{EventSource, EventType};
use cloud_cert_renewer::notify::formatters::FormatterRegistry;
use cloud_cert_renewer::renewal::batch::BatchCoordinator;
use cloud_cert_renewer::renewal::{TargetRenewer, adapter_for_kind};

use super::test_utils::{
    FakeCloudClient, REGION, cdn_config, empty_env, registry_with, self_signed,
};

fn webhook(url: String, format: &str, events: &[EventType]) -> WebhookConfig {
    let mut config = WebhookConfig::new(url);
    config.message_format = format.to_string();
    config.enabled_events = events.to_vec();
    config.retry_attempts = 0;
    config.timeout = Duration::from_secs(5);
    config
}

#[test]
fn batch_summary_is_delivered_before_exit() -> Result<()> {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/hook")
        .match_body(Matcher::PartialJson(json!({
            "event_type": "batch_completed",
            "source": {"service_type": "cdn", "cloud_provider": "fake"},
            "target": {"domain_names": ["a.example.com", "b.example.com"]},
            "result": {"status": "success"},
            "metadata": {"total_resources": 2, "successful_resources": 2, "failed_resources": 0}
        })))
        .with_status(200)
        .expect(1)
        .create();

    let mut config = cdn_config(
        &["a.example.com", "b.example.com"],
        self_signed(&["a.example.com", "b.example.com"])?,
    );
    config.webhook = Some(webhook(
        format!("{}/hook", server.url()),
        "generic",
        &[EventType::BatchCompleted],
    ));

    let code = execute_with_grace(
        config,
        &registry_with(Arc::new(FakeCloudClient::new())),
        &FormatterRegistry::with_defaults(),
        empty_env(),
        Duration::from_secs(10),
    );

    assert_eq!(code, ExitCode::Success);
    mock.assert();
    Ok(())
}

#[test]
fn wechat_work_failure_message_reaches_the_webhook() -> Result<()> {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/hook")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(json!({"msgtype": "text"})),
            Matcher::Regex("Certificate renewal failed".into()),
            Matcher::Regex("CLOUD_API_ERROR".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"errcode":0,"errmsg":"ok"}"#)
        .expect(1)
        .create();

    let mut config = cdn_config(&["a.example.com"], self_signed(&["a.example.com"])?);
    config.webhook = Some(webhook(
        format!("{}/hook", server.url()),
        "WeChat_Work",
        &[EventType::RenewalFailed],
    ));

    let client = Arc::new(FakeCloudClient::new().failing("a.example.com"));
    let code = execute_with_grace(
        config,
        &registry_with(client),
        &FormatterRegistry::with_defaults(),
        empty_env(),
        Duration::from_secs(10),
    );

    assert_eq!(code, ExitCode::CloudApi);
    mock.assert();
    Ok(())
}

#[test]
fn unknown_message_format_is_rejected_before_renewal() -> Result<()> {
    let client = Arc::new(FakeCloudClient::new());
    let mut config = cdn_config(&["a.example.com"], self_signed(&["a.example.com"])?);
    config.webhook = Some(webhook(
        "http://127.0.0.1:9/hook".to_string(),
        "slack",
        &EventType::ALL,
    ));

    let code = execute_with_grace(
        config,
        &registry_with(client.clone()),
        &FormatterRegistry::with_defaults(),
        empty_env(),
        Duration::from_millis(10),
    );

    assert_eq!(code, ExitCode::Unsupported);
    assert!(client.updates().is_empty());
    Ok(())
}

#[test]
fn stuck_webhook_does_not_slow_the_batch() -> Result<()> {
    let mut server = Server::new();
    let _mock = server.mock("POST", "/hook").with_status(500).create();

    let mut config = webhook(format!("{}/hook", server.url()), "generic", &EventType::ALL);
    config.workers = 1;
    config.retry_attempts = 10;
    config.retry_delay = Duration::from_secs(300);
    let notifier = Arc::new(NotificationService::new(
        Some(&config),
        &FormatterRegistry::with_defaults(),
    )?);

    let client = Arc::new(FakeCloudClient::new());
    let material = Arc::new(self_signed(&["a.example.com", "b.example.com"])?);
    let renewers = ["a.example.com", "b.example.com"]
        .into_iter()
        .map(|domain| {
            let target = TargetDescriptor::cdn(domain, REGION);
            TargetRenewer::new(
                adapter_for_kind(target.kind(), client.clone()),
                material.clone(),
                target,
                RenewOptions::default(),
            )
        })
        .collect();
    let coordinator = BatchCoordinator::new(
        renewers,
        notifier.clone(),
        EventSource::new(ResourceKind::Cdn, "fake", REGION),
        RenewOptions::default(),
    )
    .with_summary_delay(Duration::ZERO);

    let started = Instant::now();
    let summary = coordinator.run();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(5), "batch took {elapsed:?}");
    assert!(summary.all_succeeded());
    assert_eq!(summary.total, 2);
    assert_eq!(client.updates(), vec!["a.example.com", "b.example.com"]);

    // The worker is parked in a retry delay, so the grace period runs out.
    assert!(!notifier.shutdown(Duration::from_millis(50)));
    Ok(())
}
