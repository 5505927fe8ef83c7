use anyhow::{Result, anyhow};
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, date_time_ymd};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cloud_cert_renewer::auth::{AuthMethod, Credentials, EnvLookup};
use cloud_cert_renewer::config::{AppConfig, ServiceConfig};
use cloud_cert_renewer::core::types::CertificateMaterial;
use cloud_cert_renewer::notify::EventSink;
use cloud_cert_renewer::notify::events::{EventType, LifecycleEvent};
use cloud_cert_renewer::notify::retry::SleepFn;
use cloud_cert_renewer::providers::{ClientRegistry, CloudClient};

pub const REGION: &str = "cn-hangzhou";

pub fn self_signed(domains: &[&str]) -> Result<CertificateMaterial> {
    let params = CertificateParams::new(domains.iter().map(|d| d.to_string()).collect::<Vec<_>>())?;
    let key = KeyPair::generate()?;
    let cert = params.self_signed(&key)?;
    Ok(CertificateMaterial::new(cert.pem(), key.serialize_pem()))
}

/// Leaf signed by a throwaway CA, with the CA appended as the chain.
pub fn ca_signed_chain(domains: &[&str]) -> Result<CertificateMaterial> {
    let mut ca_params = CertificateParams::new(Vec::<String>::new())?;
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params
        .distinguished_name
        .push(DnType::CommonName, "Renewal Test CA");
    let ca_key = KeyPair::generate()?;
    let ca = ca_params.self_signed(&ca_key)?;

    let leaf_params =
        CertificateParams::new(domains.iter().map(|d| d.to_string()).collect::<Vec<_>>())?;
    let leaf_key = KeyPair::generate()?;
    let leaf = leaf_params.signed_by(&leaf_key, &ca, &ca_key)?;

    Ok(CertificateMaterial::new(
        format!("{}{}", leaf.pem(), ca.pem()),
        leaf_key.serialize_pem(),
    ))
}

pub fn expired(domains: &[&str]) -> Result<CertificateMaterial> {
    let mut params =
        CertificateParams::new(domains.iter().map(|d| d.to_string()).collect::<Vec<_>>())?;
    params.not_before = date_time_ymd(2019, 1, 1);
    params.not_after = date_time_ymd(2020, 1, 1);
    let key = KeyPair::generate()?;
    let cert = params.self_signed(&key)?;
    Ok(CertificateMaterial::new(cert.pem(), key.serialize_pem()))
}

/// In-memory cloud account. Targets are keyed by domain or `id:port`.
#[derive(Default)]
pub struct FakeCloudClient {
    cdn_certificates: Mutex<HashMap<String, String>>,
    lb_fingerprints: Mutex<HashMap<String, String>>,
    failing: HashSet<String>,
    rejecting: HashSet<String>,
    queries: AtomicUsize,
    updates: Mutex<Vec<String>>,
}

impl FakeCloudClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serving_cdn(self, domain: &str, pem: &str) -> Self {
        self.cdn_certificates
            .lock()
            .unwrap()
            .insert(domain.to_string(), pem.to_string());
        self
    }

    pub fn serving_lb(self, instance_id: &str, port: u16, fingerprint: &str) -> Self {
        self.lb_fingerprints
            .lock()
            .unwrap()
            .insert(format!("{instance_id}:{port}"), fingerprint.to_string());
        self
    }

    /// Update calls for `label` return an error.
    pub fn failing(mut self, label: &str) -> Self {
        self.failing.insert(label.to_string());
        self
    }

    /// Update calls for `label` report `false`.
    pub fn rejecting(mut self, label: &str) -> Self {
        self.rejecting.insert(label.to_string());
        self
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> Vec<String> {
        self.updates.lock().unwrap().clone()
    }

    fn record_update(&self, label: String) -> Result<bool> {
        self.updates.lock().unwrap().push(label.clone());
        if self.failing.contains(&label) {
            return Err(anyhow!("UpdateFailed: {label} is locked"));
        }
        Ok(!self.rejecting.contains(&label))
    }
}

impl CloudClient for FakeCloudClient {
    fn provider_name(&self) -> &str {
        "fake"
    }

    fn current_cdn_certificate(&self, domain: &str, _region: &str) -> Result<Option<String>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.cdn_certificates.lock().unwrap().get(domain).cloned())
    }

    fn update_cdn_certificate(
        &self,
        domain: &str,
        cert: &str,
        _private_key: &str,
        _region: &str,
    ) -> Result<bool> {
        let accepted = self.record_update(domain.to_string())?;
        if accepted {
            self.cdn_certificates
                .lock()
                .unwrap()
                .insert(domain.to_string(), cert.to_string());
        }
        Ok(accepted)
    }

    fn current_lb_fingerprint(
        &self,
        instance_id: &str,
        listener_port: u16,
        _region: &str,
    ) -> Result<Option<String>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .lb_fingerprints
            .lock()
            .unwrap()
            .get(&format!("{instance_id}:{listener_port}"))
            .cloned())
    }

    fn update_lb_certificate(
        &self,
        instance_id: &str,
        listener_port: u16,
        _cert: &str,
        _private_key: &str,
        _region: &str,
    ) -> Result<bool> {
        self.record_update(format!("{instance_id}:{listener_port}"))
    }
}

/// Registry whose `fake` entry always hands out `client`.
pub fn registry_with(client: Arc<FakeCloudClient>) -> ClientRegistry {
    let mut registry = ClientRegistry::with_defaults();
    registry.register("fake", move |_credentials| {
        client.clone() as Arc<dyn CloudClient>
    });
    registry
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<EventType> {
        self.events().iter().map(|e| e.event_type).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: LifecycleEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn recording_sleep() -> (SleepFn, Arc<Mutex<Vec<Duration>>>) {
    let delays = Arc::new(Mutex::new(Vec::new()));
    let recorded = delays.clone();
    let sleep: SleepFn = Arc::new(move |delay| recorded.lock().unwrap().push(delay));
    (sleep, delays)
}

pub fn empty_env() -> EnvLookup {
    Arc::new(|_: &str| None)
}

pub fn cdn_config(domains: &[&str], material: CertificateMaterial) -> AppConfig {
    AppConfig {
        service: ServiceConfig::Cdn {
            domain_names: domains.iter().map(|d| d.to_string()).collect(),
            region: REGION.to_string(),
        },
        material,
        cloud_provider: "fake".to_string(),
        auth_method: AuthMethod::AccessKey,
        credentials: Some(Credentials::new("test-id", "test-secret")),
        force_update: false,
        dry_run: false,
        webhook: None,
    }
}

pub fn lb_config(instance_ids: &[&str], port: u16, material: CertificateMaterial) -> AppConfig {
    AppConfig {
        service: ServiceConfig::LoadBalancer {
            instance_ids: instance_ids.iter().map(|d| d.to_string()).collect(),
            listener_port: port,
            region: REGION.to_string(),
        },
        ..cdn_config(&[], material)
    }
}
