use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use cloud_cert_renewer::certificate::fingerprint;
use cloud_cert_renewer::cli::{ExitCode, execute_with_grace};
use cloud_cert_renewer::config::AppConfig;
use cloud_cert_renewer::core::types::{
    CertificateMaterial, FingerprintAlgorithm, RenewOptions, RenewalOutcome, ResourceKind,
    TargetDescriptor,
};
use cloud_cert_renewer::errors::ErrorKind;
use cloud_cert_renewer::notify::events::{EventSource, EventType};
use cloud_cert_renewer::notify::formatters::FormatterRegistry;
use cloud_cert_renewer::renewal::batch::BatchCoordinator;
use cloud_cert_renewer::renewal::{TargetRenewer, adapter_for_kind};

use super::test_utils::{
    FakeCloudClient, REGION, RecordingSink, ca_signed_chain, cdn_config, empty_env, expired,
    lb_config, registry_with, self_signed,
};

fn renewer(
    client: Arc<FakeCloudClient>,
    material: CertificateMaterial,
    target: TargetDescriptor,
    options: RenewOptions,
) -> TargetRenewer {
    TargetRenewer::new(
        adapter_for_kind(target.kind(), client),
        Arc::new(material),
        target,
        options,
    )
}

fn run(config: AppConfig, client: Arc<FakeCloudClient>) -> ExitCode {
    execute_with_grace(
        config,
        &registry_with(client),
        &FormatterRegistry::with_defaults(),
        empty_env(),
        Duration::from_millis(50),
    )
}

#[test]
fn unchanged_cdn_certificate_is_skipped() -> Result<()> {
    let material = self_signed(&["www.example.com"])?;
    let client = Arc::new(FakeCloudClient::new().serving_cdn("www.example.com", &material.cert));
    let sink = RecordingSink::default();

    let outcome = renewer(
        client.clone(),
        material,
        TargetDescriptor::cdn("www.example.com", REGION),
        RenewOptions::default(),
    )
    .renew(&sink)?;

    assert_eq!(outcome, RenewalOutcome::Skipped);
    assert!(client.updates().is_empty());
    assert_eq!(
        sink.event_types(),
        vec![EventType::RenewalStarted, EventType::RenewalSkipped]
    );
    Ok(())
}

#[test]
fn force_update_pushes_identical_certificate() -> Result<()> {
    let material = self_signed(&["www.example.com"])?;
    let client = Arc::new(FakeCloudClient::new().serving_cdn("www.example.com", &material.cert));
    let sink = RecordingSink::default();

    let outcome = renewer(
        client.clone(),
        material,
        TargetDescriptor::cdn("www.example.com", REGION),
        RenewOptions {
            force_update: true,
            dry_run: false,
        },
    )
    .renew(&sink)?;

    assert_eq!(outcome, RenewalOutcome::Updated);
    assert_eq!(client.queries(), 0);
    assert_eq!(client.updates(), vec!["www.example.com"]);
    assert_eq!(
        sink.event_types(),
        vec![EventType::RenewalStarted, EventType::RenewalSuccess]
    );
    Ok(())
}

#[test]
fn dry_run_reports_success_without_pushing() -> Result<()> {
    let client = Arc::new(FakeCloudClient::new());
    let sink = RecordingSink::default();

    let outcome = renewer(
        client.clone(),
        self_signed(&["www.example.com"])?,
        TargetDescriptor::cdn("www.example.com", REGION),
        RenewOptions {
            force_update: false,
            dry_run: true,
        },
    )
    .renew(&sink)?;

    assert_eq!(outcome, RenewalOutcome::Updated);
    assert!(client.updates().is_empty());
    let events = sink.events();
    let last = events.last().unwrap();
    assert_eq!(last.event_type, EventType::RenewalSuccess);
    assert!(last.metadata.as_ref().unwrap().dry_run);
    assert!(last.result.as_ref().unwrap().message.contains("Dry run"));
    Ok(())
}

#[test]
fn provider_fingerprint_format_does_not_defeat_the_skip() -> Result<()> {
    let material = self_signed(&["lb.example.com"])?;
    let reported = fingerprint(&material.cert, FingerprintAlgorithm::Sha1)?
        .replace(':', "-")
        .to_uppercase();
    let client = Arc::new(FakeCloudClient::new().serving_lb("lb-1", 443, &reported));
    let sink = RecordingSink::default();

    let outcome = renewer(
        client.clone(),
        material,
        TargetDescriptor::load_balancer("lb-1", 443, REGION),
        RenewOptions::default(),
    )
    .renew(&sink)?;

    assert_eq!(outcome, RenewalOutcome::Skipped);
    assert!(client.updates().is_empty());
    Ok(())
}

#[test]
fn wildcard_chain_covers_subdomain() -> Result<()> {
    let client = Arc::new(FakeCloudClient::new());
    let code = run(
        cdn_config(&["www.example.com"], ca_signed_chain(&["*.example.com"])?),
        client.clone(),
    );
    assert_eq!(code, ExitCode::Success);
    assert_eq!(client.updates(), vec!["www.example.com"]);
    Ok(())
}

#[test]
fn expired_certificate_is_refused_for_cdn_but_deployed_to_lb() -> Result<()> {
    let cdn_client = Arc::new(FakeCloudClient::new());
    let code = run(
        cdn_config(&["www.example.com"], expired(&["www.example.com"])?),
        cdn_client.clone(),
    );
    assert_eq!(code, ExitCode::CertValidation);
    assert!(cdn_client.updates().is_empty());

    let lb_client = Arc::new(FakeCloudClient::new());
    let code = run(
        lb_config(&["lb-1"], 443, expired(&["www.example.com"])?),
        lb_client.clone(),
    );
    assert_eq!(code, ExitCode::Success);
    assert_eq!(lb_client.updates(), vec!["lb-1:443"]);
    Ok(())
}

#[test]
fn single_target_exit_codes_follow_the_failure() -> Result<()> {
    let rejecting = Arc::new(FakeCloudClient::new().rejecting("lb-1:443"));
    let code = run(lb_config(&["lb-1"], 443, self_signed(&["a.example.com"])?), rejecting);
    assert_eq!(code, ExitCode::CloudApi);

    let failing = Arc::new(FakeCloudClient::new().failing("lb-1:443"));
    let code = run(lb_config(&["lb-1"], 443, self_signed(&["a.example.com"])?), failing);
    assert_eq!(code, ExitCode::CloudApi);
    Ok(())
}

#[test]
fn failing_target_does_not_stop_the_batch() -> Result<()> {
    let client = Arc::new(FakeCloudClient::new().failing("lb-2:8443"));
    let sink = Arc::new(RecordingSink::default());
    let material = self_signed(&["lb.example.com"])?;
    let renewers = ["lb-1", "lb-2", "lb-3"]
        .into_iter()
        .map(|id| {
            renewer(
                client.clone(),
                material.clone(),
                TargetDescriptor::load_balancer(id, 8443, REGION),
                RenewOptions::default(),
            )
        })
        .collect();
    let coordinator = BatchCoordinator::new(
        renewers,
        sink.clone(),
        EventSource::new(ResourceKind::LoadBalancer, "fake", REGION),
        RenewOptions::default(),
    )
    .with_summary_delay(Duration::ZERO);

    let summary = coordinator.run();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].kind, ErrorKind::Provider);
    assert!(summary.failures[0].message.contains("lb-2:8443 is locked"));
    assert_eq!(client.updates(), vec!["lb-1:8443", "lb-2:8443", "lb-3:8443"]);

    let types = sink.event_types();
    assert_eq!(types.len(), 7);
    assert_eq!(types.last(), Some(&EventType::BatchCompleted));
    Ok(())
}

#[test]
fn batch_exit_code_is_generic_failure() -> Result<()> {
    let client = Arc::new(FakeCloudClient::new().rejecting("b.example.com"));
    let code = run(
        cdn_config(
            &["a.example.com", "b.example.com", "c.example.com"],
            self_signed(&["a.example.com", "b.example.com", "c.example.com"])?,
        ),
        client.clone(),
    );
    assert_eq!(code, ExitCode::Failure);
    assert_eq!(client.updates().len(), 3);
    Ok(())
}
