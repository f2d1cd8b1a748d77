//! External collaborators: the Kubernetes control plane, netctl, and the
//! certificate generator.
//!
//! Each is a trait so the pipeline can be driven against fakes. The real
//! implementations talk to the API server through `kube` where a typed call
//! exists and shell out to `kubectl`, `netctl` and `openssl` otherwise.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::config::{Config, KubeConfigOptions, Kubeconfig};
use kube::Client;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ForwardingMode;

/// Field manager recorded for server-side apply.
const FIELD_MANAGER: &str = "contiv-installer";

/// Operations the installer performs against the cluster.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create or update an opaque secret holding one file, keyed by the
    /// file's name.
    async fn create_secret(&self, name: &str, namespace: &str, file: &Path) -> Result<()>;

    /// Apply a manifest file (create if absent, update if present).
    async fn apply_manifest(&self, path: &Path) -> Result<()>;

    /// Export a deployment as YAML, `None` if it does not exist.
    async fn export_deployment(&self, name: &str, namespace: &str) -> Result<Option<String>>;

    /// Delete a deployment.
    async fn delete_deployment(&self, name: &str, namespace: &str) -> Result<()>;
}

/// Post-install tuning through the Contiv network control CLI.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkControl: Send + Sync {
    /// Set the global forwarding mode on a running netmaster.
    async fn set_forwarding_mode(&self, netmaster_url: &str, mode: ForwardingMode) -> Result<()>;
}

/// Produces a self-signed certificate and key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CertificateGenerator: Send + Sync {
    /// Write a certificate to `cert` and its key to `key`.
    async fn generate(&self, cert: &Path, key: &Path) -> Result<()>;
}

/// Run a command and return its stdout, failing on a non-zero exit.
async fn run(cmd: &mut Command, what: &str) -> Result<String> {
    debug!(command = ?cmd.as_std(), "Running {what}");
    let output = cmd
        .output()
        .await
        .with_context(|| format!("Failed to execute {what}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{what} failed: {}", stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Cluster access through the Kubernetes API and `kubectl`.
pub struct KubeCluster {
    client: Client,
    kubeconfig: Option<PathBuf>,
}

impl KubeCluster {
    /// Connect using an explicit kubeconfig, or the inferred configuration
    /// (`KUBECONFIG`, `~/.kube/config`, in-cluster) when none is given.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable configuration is found.
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self> {
        let config = match kubeconfig {
            Some(path) => {
                let kc = Kubeconfig::read_from(path)
                    .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
                Config::from_custom_kubeconfig(kc, &KubeConfigOptions::default())
                    .await
                    .context("Failed to load kubeconfig")?
            }
            None => Config::infer()
                .await
                .context("Failed to infer Kubernetes configuration")?,
        };
        let client = Client::try_from(config).context("Failed to create Kubernetes client")?;

        Ok(Self {
            client,
            kubeconfig: kubeconfig.map(Path::to_path_buf),
        })
    }

    fn kubectl(&self) -> Command {
        let mut cmd = Command::new("kubectl");
        if let Some(path) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(path);
        }
        cmd
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn create_secret(&self, name: &str, namespace: &str, file: &Path) -> Result<()> {
        let key = file
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid secret file name: {}", file.display()))?
            .to_string();
        let contents = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;

        info!(secret = name, namespace, key = %key, "Creating secret");

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            type_: Some("Opaque".to_string()),
            data: Some(BTreeMap::from([(key, ByteString(contents))])),
            ..Default::default()
        };

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        secrets
            .patch(
                name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&secret),
            )
            .await
            .with_context(|| format!("Failed to create secret {namespace}/{name}"))?;
        Ok(())
    }

    async fn apply_manifest(&self, path: &Path) -> Result<()> {
        info!(manifest = %path.display(), "Applying manifest");
        let out = run(self.kubectl().arg("apply").arg("-f").arg(path), "kubectl apply").await?;
        for line in out.lines() {
            debug!("{line}");
        }
        Ok(())
    }

    async fn export_deployment(&self, name: &str, namespace: &str) -> Result<Option<String>> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let Some(mut deployment) = deployments
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to read deployment {namespace}/{name}"))?
        else {
            return Ok(None);
        };

        deployment.metadata.managed_fields = None;
        let yaml = serde_yaml::to_string(&deployment)
            .with_context(|| format!("Failed to serialize deployment {namespace}/{name}"))?;
        Ok(Some(yaml))
    }

    async fn delete_deployment(&self, name: &str, namespace: &str) -> Result<()> {
        info!(deployment = name, namespace, "Deleting deployment");
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        deployments
            .delete(name, &DeleteParams::default())
            .await
            .with_context(|| format!("Failed to delete deployment {namespace}/{name}"))?;
        Ok(())
    }
}

/// The `netctl` binary.
#[derive(Debug, Clone)]
pub struct Netctl {
    binary: PathBuf,
}

impl Netctl {
    /// Use the netctl binary at `binary`.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn forwarding_mode_command(&self, netmaster_url: &str, mode: ForwardingMode) -> Command {
        let mode = mode.to_string();
        let mut cmd = Command::new(&self.binary);
        cmd.args(["--netmaster", netmaster_url, "global", "set", "--fwd-mode", mode.as_str()]);
        cmd
    }
}

#[async_trait]
impl NetworkControl for Netctl {
    async fn set_forwarding_mode(&self, netmaster_url: &str, mode: ForwardingMode) -> Result<()> {
        info!(netmaster = netmaster_url, %mode, "Setting global forwarding mode");
        run(
            &mut self.forwarding_mode_command(netmaster_url, mode),
            "netctl global set",
        )
        .await?;
        Ok(())
    }
}

/// Self-signed certificates via `openssl req -x509`.
#[derive(Debug, Clone)]
pub struct OpensslGenerator {
    common_name: String,
    days: u32,
}

impl Default for OpensslGenerator {
    fn default() -> Self {
        Self {
            common_name: "auth-local.cisco.com".to_string(),
            days: 3650,
        }
    }
}

#[async_trait]
impl CertificateGenerator for OpensslGenerator {
    async fn generate(&self, cert: &Path, key: &Path) -> Result<()> {
        info!(cert = %cert.display(), key = %key.display(), "Generating self-signed certificate");
        let subject = format!("/CN={}", self.common_name);
        let days = self.days.to_string();
        run(
            Command::new("openssl")
                .args(["req", "-x509", "-nodes", "-newkey", "rsa:2048"])
                .args(["-days", days.as_str(), "-subj", subject.as_str()])
                .arg("-keyout")
                .arg(key)
                .arg("-out")
                .arg(cert),
            "openssl req",
        )
        .await?;
        Ok(())
    }
}
