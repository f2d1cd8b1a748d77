//! Host preparation and cluster installation.
//!
//! Runs after the manifest is final. Steps execute strictly in order:
//! hosts entry, cancellation window, netctl install, manifest apply,
//! optional forwarding-mode change, and removal of the conflicting DNS
//! deployment. Nothing is rolled back if a later step fails.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use crate::cluster::{ClusterClient, NetworkControl};
use crate::config::{
    Delays, ForwardingMode, InstallParameters, InstallPaths, CONFLICTING_DNS_DEPLOYMENT,
    NETMASTER_HOSTNAME, SYSTEM_NAMESPACE,
};
use crate::error::{InstallError, InstallResult};
use crate::hosts;
use crate::ui;

/// What the installer changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOutcome {
    /// A hosts entry for netmaster was appended.
    pub hosts_entry_added: bool,
    /// The global forwarding mode was set through netctl.
    pub forwarding_configured: bool,
    /// The conflicting DNS deployment was backed up and deleted.
    pub dns_removed: bool,
}

/// Applies the final manifest and performs the host-level side effects.
pub struct ClusterInstaller<'a> {
    cluster: &'a dyn ClusterClient,
    netctl: &'a dyn NetworkControl,
    paths: &'a InstallPaths,
    delays: Delays,
}

impl<'a> ClusterInstaller<'a> {
    pub fn new(
        cluster: &'a dyn ClusterClient,
        netctl: &'a dyn NetworkControl,
        paths: &'a InstallPaths,
        delays: Delays,
    ) -> Self {
        Self {
            cluster,
            netctl,
            paths,
            delays,
        }
    }

    /// Run every installation step.
    ///
    /// # Errors
    ///
    /// Returns the first step failure. Earlier side effects are left in place.
    pub async fn install(&self, params: &InstallParameters) -> InstallResult<InstallOutcome> {
        let hosts_entry_added =
            hosts::ensure_entry(&self.paths.hosts_file, &params.master, NETMASTER_HOSTNAME)
                .map_err(|e| {
                    InstallError::io(
                        format!("Failed to update {}", self.paths.hosts_file.display()),
                        e,
                    )
                })?;

        self.cancellation_window().await;

        let netctl = install_netctl(&self.paths.netctl_source, &self.paths.netctl_destination)
            .map_err(|e| InstallError::external("Installing netctl", e))?;
        info!(path = %netctl.display(), "netctl installed");

        self.cluster
            .apply_manifest(&self.paths.manifest)
            .await
            .map_err(|e| InstallError::external("Applying manifest", e))?;
        ui::print_success("Contiv manifest applied");

        let forwarding_configured = self.configure_forwarding(params).await?;
        let dns_removed = self.remove_conflicting_dns().await?;

        Ok(InstallOutcome {
            hosts_entry_added,
            forwarding_configured,
            dns_removed,
        })
    }

    async fn cancellation_window(&self) {
        let window = self.delays.cancellation_window;
        if window.is_zero() {
            return;
        }
        ui::print_warning(&format!(
            "Installing Contiv in {}s. Press Ctrl+C to cancel",
            window.as_secs()
        ));
        tokio::time::sleep(window).await;
    }

    async fn configure_forwarding(&self, params: &InstallParameters) -> InstallResult<bool> {
        if params.forwarding_mode != ForwardingMode::Routing {
            return Ok(false);
        }

        let wait = self.delays.stabilization;
        if !wait.is_zero() {
            ui::print_info(&format!(
                "Waiting {}s for netmaster before enabling routing mode",
                wait.as_secs()
            ));
            tokio::time::sleep(wait).await;
        }

        self.netctl
            .set_forwarding_mode(&params.netmaster_url(), ForwardingMode::Routing)
            .await
            .map_err(|e| InstallError::external("Setting forwarding mode", e))?;
        ui::print_success("Forwarding mode set to routing");
        Ok(true)
    }

    async fn remove_conflicting_dns(&self) -> InstallResult<bool> {
        let exported = self
            .cluster
            .export_deployment(CONFLICTING_DNS_DEPLOYMENT, SYSTEM_NAMESPACE)
            .await
            .map_err(|e| InstallError::external("Exporting kube-dns", e))?;

        let Some(yaml) = exported else {
            warn!(
                deployment = CONFLICTING_DNS_DEPLOYMENT,
                namespace = SYSTEM_NAMESPACE,
                "Deployment not found, nothing to remove"
            );
            ui::print_warning("kube-dns deployment not found; skipping removal");
            return Ok(false);
        };

        std::fs::write(&self.paths.dns_backup, yaml).map_err(|e| {
            InstallError::io(
                format!("Failed to write {}", self.paths.dns_backup.display()),
                e,
            )
        })?;
        info!(backup = %self.paths.dns_backup.display(), "kube-dns deployment backed up");

        self.cluster
            .delete_deployment(CONFLICTING_DNS_DEPLOYMENT, SYSTEM_NAMESPACE)
            .await
            .map_err(|e| InstallError::external("Deleting kube-dns", e))?;
        ui::print_success("kube-dns deployment removed");
        Ok(true)
    }
}

/// Copy the netctl binary into place and make it executable.
fn install_netctl(source: &Path, destination: &Path) -> anyhow::Result<PathBuf> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::copy(source, destination).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            source.display(),
            destination.display()
        )
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(destination, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("Failed to make {} executable", destination.display()))?;
    }

    Ok(destination.to_path_buf())
}
