//! End-to-end pipeline tests.
//!
//! Runs the full installer against recording fakes of the cluster, netctl and
//! the certificate generator, with every filesystem location relocated into a
//! temporary directory.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use contiv_installer::cluster::{CertificateGenerator, ClusterClient, NetworkControl};
use contiv_installer::manifest::Fragment;
use contiv_installer::pipeline::resolve_parameters;
use contiv_installer::resolver::PresuppliedInput;
use serde::Deserialize;
use contiv_installer::{
    Delays, ForwardingMode, InstallError, InstallPaths, InstallReport, Pipeline, RawParameters,
};

type Log = Arc<Mutex<Vec<String>>>;

struct RecordingCluster {
    log: Log,
    dns_present: bool,
}

#[async_trait]
impl ClusterClient for RecordingCluster {
    async fn create_secret(&self, name: &str, namespace: &str, file: &Path) -> anyhow::Result<()> {
        let content = std::fs::read_to_string(file)?;
        self.log
            .lock()
            .unwrap()
            .push(format!("secret {namespace}/{name} {}", content.trim()));
        Ok(())
    }

    async fn apply_manifest(&self, path: &Path) -> anyhow::Result<()> {
        let manifest = std::fs::read_to_string(path)?;
        self.log.lock().unwrap().push(format!("apply {}", manifest.len()));
        Ok(())
    }

    async fn export_deployment(&self, name: &str, namespace: &str) -> anyhow::Result<Option<String>> {
        self.log
            .lock()
            .unwrap()
            .push(format!("export {namespace}/{name}"));
        Ok(self
            .dns_present
            .then(|| format!("kind: Deployment\nmetadata:\n  name: {name}\n")))
    }

    async fn delete_deployment(&self, name: &str, namespace: &str) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("delete {namespace}/{name}"));
        Ok(())
    }
}

struct RecordingNetctl {
    log: Log,
}

#[async_trait]
impl NetworkControl for RecordingNetctl {
    async fn set_forwarding_mode(&self, netmaster_url: &str, mode: ForwardingMode) -> anyhow::Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("netctl {netmaster_url} {mode}"));
        Ok(())
    }
}

struct FakeCertificates;

#[async_trait]
impl CertificateGenerator for FakeCertificates {
    async fn generate(&self, cert: &Path, key: &Path) -> anyhow::Result<()> {
        std::fs::write(cert, "GENERATED CERT")?;
        std::fs::write(key, "GENERATED KEY")?;
        Ok(())
    }
}

struct Harness {
    dir: tempfile::TempDir,
    paths: InstallPaths,
    log: Log,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = InstallPaths::rooted(dir.path());
        std::fs::write(&paths.netctl_source, "#!/bin/sh\n").unwrap();
        Self {
            dir,
            paths,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn pipeline(&self, password: Option<&str>) -> Pipeline {
        self.pipeline_with(password, true)
    }

    fn pipeline_with(&self, password: Option<&str>, dns_present: bool) -> Pipeline {
        Pipeline::new(
            Box::new(RecordingCluster {
                log: self.log.clone(),
                dns_present,
            }),
            Box::new(RecordingNetctl {
                log: self.log.clone(),
            }),
            Box::new(FakeCertificates),
        )
        .with_prompt(Box::new(PresuppliedInput(password.map(str::to_string))))
        .with_paths(self.paths.clone())
        .with_delays(Delays::none())
    }

    async fn run(&self, raw: RawParameters) -> Result<InstallReport, InstallError> {
        self.pipeline(None).run(raw).await
    }

    fn manifest(&self) -> String {
        std::fs::read_to_string(&self.paths.manifest).unwrap()
    }

    fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn netctl_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("netctl")).count()
    }
}

fn bridge_inputs() -> RawParameters {
    RawParameters {
        master: Some("10.0.0.1".into()),
        cluster_store: Some(String::new()),
        vlan_interface: Some("eth1".into()),
        forwarding_mode: Some(ForwardingMode::Bridge),
        ..RawParameters::default()
    }
}

fn fabric_inputs() -> RawParameters {
    RawParameters {
        master: Some("10.0.0.1".into()),
        apic_url: Some("https://apic:443".into()),
        apic_username: Some("u".into()),
        apic_phys_domain: Some("d".into()),
        apic_leaf_node: Some("l".into()),
        apic_password: Some("p".into()),
        ..RawParameters::default()
    }
}

#[tokio::test]
async fn test_bridge_install_with_self_hosted_store() {
    let harness = Harness::new();
    let report = harness.run(bridge_inputs()).await.unwrap();

    assert_eq!(
        report.fragments,
        vec![
            Fragment::Base,
            Fragment::ClusterStore,
            Fragment::Core,
            Fragment::AuthProxy
        ]
    );
    assert!(!report.fabric_enabled());
    assert!(!report.forwarding_configured);

    let manifest = harness.manifest();
    assert!(!manifest.contains("__"));
    assert!(manifest.contains("etcd://10.0.0.1:6666"));
    assert!(manifest.contains("vlan_if: \"eth1\""));
    assert!(!manifest.contains("contiv-aci-gw"));
    assert_eq!(harness.netctl_calls(), 0);
}

#[tokio::test]
async fn test_fabric_install_substitutes_every_fabric_value() {
    let harness = Harness::new();
    let report = harness.run(fabric_inputs()).await.unwrap();

    assert!(report.fabric_enabled());
    assert!(report.fragments.contains(&Fragment::FabricGateway));

    let manifest = harness.manifest();
    assert!(!manifest.contains("__"));
    assert!(manifest.contains("value: \"https://apic:443\""));
    assert!(manifest.contains("value: \"not_specified\""));
    assert!(manifest.contains("value: \"no\""));
    assert!(!manifest.contains("APIC_CERT_DN"));
    for line in manifest.lines() {
        assert!(!line.trim().is_empty() || line.is_empty());
    }
}

#[tokio::test]
async fn test_cert_dn_substituted_when_given() {
    let harness = Harness::new();
    let mut inputs = fabric_inputs();
    inputs.apic_cert_dn = Some("uni/userext/user-admin/usercert-admin".into());
    harness.run(inputs).await.unwrap();

    let manifest = harness.manifest();
    assert!(manifest.contains("name: APIC_CERT_DN"));
    assert!(manifest.contains("uni/userext/user-admin/usercert-admin"));
}

#[tokio::test]
async fn test_external_store_skips_etcd() {
    let harness = Harness::new();
    let mut inputs = bridge_inputs();
    inputs.cluster_store = Some("etcd://host:2379".into());
    let report = harness.run(inputs).await.unwrap();

    assert!(!report.fragments.contains(&Fragment::ClusterStore));
    assert!(harness.manifest().contains("etcd://host:2379"));
}

#[tokio::test]
async fn test_operations_run_in_order() {
    let harness = Harness::new();
    let mut inputs = bridge_inputs();
    inputs.forwarding_mode = Some(ForwardingMode::Routing);
    let report = harness.run(inputs).await.unwrap();
    assert!(report.forwarding_configured);
    assert_eq!(report.dns_backup.as_ref(), Some(&harness.paths.dns_backup));

    let calls = harness.calls();
    let kinds: Vec<&str> = calls
        .iter()
        .map(|c| c.split_whitespace().next().unwrap_or_default())
        .collect();
    assert_eq!(kinds, ["secret", "apply", "netctl", "export", "delete"]);
    assert_eq!(calls[0], "secret kube-system/aci.key dummy");
    assert_eq!(calls[2], "netctl http://10.0.0.1:9999 routing");
    assert_eq!(calls[4], "delete kube-system/kube-dns");
    assert!(harness.paths.dns_backup.exists());
}

#[tokio::test]
async fn test_forwarding_mode_unset_never_calls_netctl() {
    let harness = Harness::new();
    let mut inputs = bridge_inputs();
    inputs.forwarding_mode = None;
    harness.run(inputs).await.unwrap();
    assert_eq!(harness.netctl_calls(), 0);
}

#[tokio::test]
async fn test_rerun_keeps_single_hosts_entry() {
    let harness = Harness::new();
    std::fs::create_dir_all(harness.paths.hosts_file.parent().unwrap()).unwrap();
    std::fs::write(&harness.paths.hosts_file, "127.0.0.1 localhost\n").unwrap();

    let first = harness.run(bridge_inputs()).await.unwrap();
    let second = harness.run(bridge_inputs()).await.unwrap();
    assert!(first.hosts_entry_added);
    assert!(!second.hosts_entry_added);

    let hosts = std::fs::read_to_string(&harness.paths.hosts_file).unwrap();
    assert_eq!(hosts.matches("netmaster").count(), 1);
}

#[tokio::test]
async fn test_prompted_password_used() {
    let harness = Harness::new();
    let mut inputs = fabric_inputs();
    inputs.apic_password = None;
    harness
        .pipeline(Some("typed-secret"))
        .run(inputs)
        .await
        .unwrap();
    assert!(harness.manifest().contains("value: \"typed-secret\""));
}

#[tokio::test]
async fn test_missing_password_without_terminal_is_usage_error() {
    let harness = Harness::new();
    let mut inputs = fabric_inputs();
    inputs.apic_password = None;
    let err = harness.run(inputs).await.unwrap_err();
    assert!(err.is_usage());
    assert!(harness.calls().is_empty());
}

#[tokio::test]
async fn test_supplied_credentials_installed() {
    let harness = Harness::new();
    let key = harness.dir.path().join("apic.key");
    let cert = harness.dir.path().join("proxy.pem");
    let tls_key = harness.dir.path().join("proxy.key");
    std::fs::write(&key, "APIC KEY").unwrap();
    std::fs::write(&cert, "PROXY CERT").unwrap();
    std::fs::write(&tls_key, "PROXY KEY").unwrap();

    let mut inputs = fabric_inputs();
    inputs.apic_password = None;
    inputs.apic_cert_key = Some(key);
    inputs.tls_cert = Some(cert);
    inputs.tls_key = Some(tls_key);

    let report = harness.run(inputs).await.unwrap();
    assert!(!report.tls_generated);
    assert_eq!(harness.calls()[0], "secret kube-system/aci.key APIC KEY");
    assert_eq!(
        std::fs::read_to_string(harness.paths.auth_proxy_cert()).unwrap(),
        "PROXY CERT"
    );
    assert!(!harness.paths.local_certs_dir.exists());
}

#[tokio::test]
async fn test_missing_kube_dns_is_skipped() {
    let harness = Harness::new();
    let report = harness
        .pipeline_with(None, false)
        .run(bridge_inputs())
        .await
        .unwrap();

    assert!(!report.dns_removed());
    assert!(!harness.paths.dns_backup.exists());
    assert!(!harness.calls().iter().any(|c| c.starts_with("delete")));
}

#[tokio::test]
async fn test_resolved_parameters_with_quoted_password_install_valid_manifest() {
    let harness = Harness::new();
    let mut inputs = fabric_inputs();
    inputs.apic_password = Some(r#"pa"ss\w"#.into());
    let params = resolve_parameters(inputs, &PresuppliedInput(None)).unwrap();
    assert!(harness.calls().is_empty());

    harness.pipeline(None).run_resolved(params).await.unwrap();

    let manifest = harness.manifest();
    let documents: Vec<serde_yaml::Value> = serde_yaml::Deserializer::from_str(&manifest)
        .map(|document| serde_yaml::Value::deserialize(document).unwrap())
        .collect();
    assert!(documents.len() >= 5);
    assert!(manifest.contains(r#"value: "pa\"ss\\w""#));
}
