//! Credential provisioning.
//!
//! Two independent steps run before the auth proxy is added to the manifest:
//! the APIC key is registered as a cluster secret, and a TLS certificate/key
//! pair is put where the auth proxy reads it. Neither is idempotent across
//! runs: local files are regenerated or overwritten every time.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use crate::cluster::{CertificateGenerator, ClusterClient};
use crate::config::{InstallParameters, InstallPaths, DUMMY_FABRIC_KEY, FABRIC_KEY_SECRET, SYSTEM_NAMESPACE};
use crate::error::{InstallError, InstallResult};

/// What a credential file is made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactContent {
    /// Fixed text written directly.
    Inline(String),
    /// Copy of an operator-supplied file.
    CopyOf(PathBuf),
}

/// A credential waiting to be written to its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialArtifact {
    pub content: ArtifactContent,
    pub destination: PathBuf,
}

impl CredentialArtifact {
    /// Write the artifact, handing ownership to the filesystem.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination cannot be written or the source
    /// cannot be copied.
    pub fn materialize(self) -> anyhow::Result<PathBuf> {
        if let Some(parent) = self.destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        match &self.content {
            ArtifactContent::Inline(text) => std::fs::write(&self.destination, text)
                .with_context(|| format!("Failed to write {}", self.destination.display()))?,
            ArtifactContent::CopyOf(source) => {
                if same_file(source, &self.destination) {
                    return Ok(self.destination);
                }
                std::fs::copy(source, &self.destination).with_context(|| {
                    format!(
                        "Failed to copy {} to {}",
                        source.display(),
                        self.destination.display()
                    )
                })?;
            }
        }
        Ok(self.destination)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Paths of the TLS material the auth proxy will use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPair {
    pub cert: PathBuf,
    pub key: PathBuf,
    /// Whether the pair was generated rather than supplied.
    pub generated: bool,
}

/// Result of credential provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedCredentials {
    /// Local APIC key file registered as a secret.
    pub fabric_key: PathBuf,
    /// Installed auth-proxy TLS material.
    pub tls: TlsPair,
}

/// Creates the APIC key secret and installs TLS material.
pub struct SecretProvisioner<'a> {
    cluster: &'a dyn ClusterClient,
    certificates: &'a dyn CertificateGenerator,
    paths: &'a InstallPaths,
}

impl<'a> SecretProvisioner<'a> {
    pub fn new(
        cluster: &'a dyn ClusterClient,
        certificates: &'a dyn CertificateGenerator,
        paths: &'a InstallPaths,
    ) -> Self {
        Self {
            cluster,
            certificates,
            paths,
        }
    }

    /// Run both provisioning steps.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::External`] on the first failure.
    pub async fn provision(&self, params: &InstallParameters) -> InstallResult<ProvisionedCredentials> {
        let fabric_key = self.provision_fabric_key(params).await?;
        let tls = self.provision_tls(params).await?;
        Ok(ProvisionedCredentials { fabric_key, tls })
    }

    /// Put the APIC key (or a dummy) in place and register it as a secret.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::External`] if the key cannot be written or
    /// the secret cannot be created.
    pub async fn provision_fabric_key(&self, params: &InstallParameters) -> InstallResult<PathBuf> {
        let supplied = params.fabric.as_ref().and_then(|f| f.cert_key_path.clone());
        let content = match supplied {
            Some(path) => ArtifactContent::CopyOf(path),
            None => ArtifactContent::Inline(DUMMY_FABRIC_KEY.to_string()),
        };
        let artifact = CredentialArtifact {
            content,
            destination: self.paths.fabric_key.clone(),
        };

        let key_path = artifact
            .materialize()
            .map_err(|e| InstallError::external("Preparing APIC key", e))?;

        self.cluster
            .create_secret(FABRIC_KEY_SECRET, SYSTEM_NAMESPACE, &key_path)
            .await
            .map_err(|e| InstallError::external("Creating APIC key secret", e))?;

        info!(
            secret = FABRIC_KEY_SECRET,
            namespace = SYSTEM_NAMESPACE,
            "APIC key secret created"
        );
        Ok(key_path)
    }

    /// Resolve or generate the auth-proxy TLS pair and install it into the
    /// system configuration directory.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::External`] if generation or any copy fails.
    pub async fn provision_tls(&self, params: &InstallParameters) -> InstallResult<TlsPair> {
        let (cert, key, generated) = match (&params.tls_cert, &params.tls_key) {
            (None, _) => {
                std::fs::create_dir_all(&self.paths.local_certs_dir)
                    .with_context(|| {
                        format!("Failed to create {}", self.paths.local_certs_dir.display())
                    })
                    .map_err(|e| InstallError::external("Generating TLS certificate", e))?;
                self.certificates
                    .generate(&self.paths.generated_cert, &self.paths.generated_key)
                    .await
                    .map_err(|e| InstallError::external("Generating TLS certificate", e))?;
                (
                    self.paths.generated_cert.clone(),
                    self.paths.generated_key.clone(),
                    true,
                )
            }
            (Some(cert), Some(key)) => (cert.clone(), key.clone(), false),
            (Some(_), None) => {
                return Err(InstallError::external(
                    "Installing TLS certificate",
                    anyhow::anyhow!("a TLS key must accompany the supplied certificate"),
                ));
            }
        };

        let installed_cert = CredentialArtifact {
            content: ArtifactContent::CopyOf(cert),
            destination: self.paths.auth_proxy_cert(),
        }
        .materialize()
        .map_err(|e| InstallError::external("Installing TLS certificate", e))?;

        let installed_key = CredentialArtifact {
            content: ArtifactContent::CopyOf(key),
            destination: self.paths.auth_proxy_key(),
        }
        .materialize()
        .map_err(|e| InstallError::external("Installing TLS key", e))?;
        restrict_permissions(&installed_key)
            .map_err(|e| InstallError::external("Installing TLS key", e))?;

        info!(
            cert = %installed_cert.display(),
            key = %installed_key.display(),
            generated,
            "Auth proxy TLS material installed"
        );
        Ok(TlsPair {
            cert: installed_cert,
            key: installed_key,
            generated,
        })
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
