//! Installation pipeline.
//!
//! Drives the five stages in order, carrying each stage's output into the
//! next. The first failure aborts the run; nothing is retried and nothing
//! already done is undone.

use std::path::PathBuf;

use tracing::{error, info};

use crate::cluster::{CertificateGenerator, ClusterClient, NetworkControl};
use crate::config::{Delays, InstallParameters, InstallPaths};
use crate::error::{InstallError, InstallResult};
use crate::installer::ClusterInstaller;
use crate::manifest::{EmbeddedFragments, Fragment, FragmentSource, ManifestAssembler, ManifestDocument};
use crate::resolver::{ParameterResolver, RawParameters, SecretPrompt, TerminalPrompt};
use crate::secrets::SecretProvisioner;
use crate::state::InstallStage;
use crate::substitute::{substitute, SubstitutionMap};
use crate::ui;

/// Summary of a completed installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Resolved parameters the cluster was installed with.
    pub params: InstallParameters,
    /// Fragments in the applied manifest, in order.
    pub fragments: Vec<Fragment>,
    /// Final manifest location.
    pub manifest_path: PathBuf,
    /// TLS material was generated rather than supplied.
    pub tls_generated: bool,
    /// A netmaster hosts entry was appended.
    pub hosts_entry_added: bool,
    /// The forwarding mode was set after install.
    pub forwarding_configured: bool,
    /// Backup of the removed kube-dns deployment.
    pub dns_backup: Option<PathBuf>,
}

impl InstallReport {
    /// APIC integration was installed.
    #[must_use]
    pub fn fabric_enabled(&self) -> bool {
        self.params.fabric_mode()
    }

    /// kube-dns was backed up and removed.
    #[must_use]
    pub fn dns_removed(&self) -> bool {
        self.dns_backup.is_some()
    }

    /// The embedded etcd store was installed.
    #[must_use]
    pub fn self_hosted_store(&self) -> bool {
        self.params.self_hosted_store()
    }
}

/// Data carried between stages.
enum PipelineState {
    Resolving(RawParameters),
    Assembling(InstallParameters),
    Provisioning {
        params: InstallParameters,
        manifest: ManifestDocument,
    },
    Substituting {
        params: InstallParameters,
        manifest: ManifestDocument,
        tls_generated: bool,
    },
    Installing {
        params: InstallParameters,
        manifest: ManifestDocument,
        tls_generated: bool,
    },
    Done(InstallReport),
}

impl PipelineState {
    fn stage(&self) -> InstallStage {
        match self {
            Self::Resolving(_) => InstallStage::Resolving,
            Self::Assembling(_) => InstallStage::Assembling,
            Self::Provisioning { .. } => InstallStage::Provisioning,
            Self::Substituting { .. } => InstallStage::Substituting,
            Self::Installing { .. } => InstallStage::Installing,
            Self::Done(_) => InstallStage::Done,
        }
    }
}

fn announce(stage: InstallStage) {
    ui::print_progress_step(
        stage.step_number(),
        InstallStage::TOTAL_STEPS,
        stage.description(),
    );
    info!(stage = ?stage, "Executing stage");
}

/// Resolve parameters ahead of building a [`Pipeline`], reporting progress
/// as its first stage.
///
/// Needs no cluster access, so usage errors surface before any preflight
/// check or connection attempt.
///
/// # Errors
///
/// Returns [`InstallError::Usage`] for missing or invalid input.
pub fn resolve_parameters(
    raw: RawParameters,
    prompt: &dyn SecretPrompt,
) -> InstallResult<InstallParameters> {
    announce(InstallStage::Resolving);
    ParameterResolver::new(prompt).resolve(raw).inspect_err(|e| {
        error!(stage = ?InstallStage::Resolving, error = %e, "Installation failed");
    })
}

/// The installer with all of its collaborators.
pub struct Pipeline {
    cluster: Box<dyn ClusterClient>,
    netctl: Box<dyn NetworkControl>,
    certificates: Box<dyn CertificateGenerator>,
    prompt: Box<dyn SecretPrompt>,
    fragments: Box<dyn FragmentSource>,
    paths: InstallPaths,
    delays: Delays,
}

impl Pipeline {
    /// Create a pipeline with the default prompt, embedded templates,
    /// standard paths, and standard delays.
    pub fn new(
        cluster: Box<dyn ClusterClient>,
        netctl: Box<dyn NetworkControl>,
        certificates: Box<dyn CertificateGenerator>,
    ) -> Self {
        Self {
            cluster,
            netctl,
            certificates,
            prompt: Box::new(TerminalPrompt),
            fragments: Box::new(EmbeddedFragments),
            paths: InstallPaths::default(),
            delays: Delays::default(),
        }
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: Box<dyn SecretPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    #[must_use]
    pub fn with_fragments(mut self, fragments: Box<dyn FragmentSource>) -> Self {
        self.fragments = fragments;
        self
    }

    #[must_use]
    pub fn with_paths(mut self, paths: InstallPaths) -> Self {
        self.paths = paths;
        self
    }

    #[must_use]
    pub fn with_delays(mut self, delays: Delays) -> Self {
        self.delays = delays;
        self
    }

    /// Run every stage to completion.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage.
    pub async fn run(&self, raw: RawParameters) -> InstallResult<InstallReport> {
        self.drive(PipelineState::Resolving(raw)).await
    }

    /// Run the stages after resolution, for parameters already obtained
    /// through [`resolve_parameters`].
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage.
    pub async fn run_resolved(&self, params: InstallParameters) -> InstallResult<InstallReport> {
        self.drive(PipelineState::Assembling(params)).await
    }

    async fn drive(&self, mut state: PipelineState) -> InstallResult<InstallReport> {
        loop {
            let stage = state.stage();
            if stage.is_done() {
                if let PipelineState::Done(report) = state {
                    info!(fragments = ?report.fragments, "Installation complete");
                    return Ok(report);
                }
            }

            announce(stage);
            state = match self.advance(state).await {
                Ok(next) => next,
                Err(e) => {
                    error!(stage = ?stage, error = %e, "Installation failed");
                    return Err(e);
                }
            };
            debug_assert_eq!(state.stage(), stage.next());
        }
    }

    async fn advance(&self, state: PipelineState) -> InstallResult<PipelineState> {
        let next = match state {
            PipelineState::Resolving(raw) => {
                PipelineState::Assembling(ParameterResolver::new(self.prompt.as_ref()).resolve(raw)?)
            }

            PipelineState::Assembling(params) => {
                let manifest = ManifestAssembler::new(self.fragments.as_ref())
                    .assemble(&params)
                    .map_err(|e| InstallError::external("Assembling manifest", e))?;
                self.write_manifest(&manifest)?;
                PipelineState::Provisioning { params, manifest }
            }

            PipelineState::Provisioning {
                params,
                mut manifest,
            } => {
                let credentials = SecretProvisioner::new(
                    self.cluster.as_ref(),
                    self.certificates.as_ref(),
                    &self.paths,
                )
                .provision(&params)
                .await?;

                ManifestAssembler::new(self.fragments.as_ref())
                    .append_auth_proxy(&mut manifest)
                    .map_err(|e| InstallError::external("Assembling manifest", e))?;
                self.write_manifest(&manifest)?;

                PipelineState::Substituting {
                    params,
                    manifest,
                    tls_generated: credentials.tls.generated,
                }
            }

            PipelineState::Substituting {
                params,
                mut manifest,
                tls_generated,
            } => {
                substitute(&mut manifest, &SubstitutionMap::for_parameters(&params))?;
                self.write_manifest(&manifest)?;
                PipelineState::Installing {
                    params,
                    manifest,
                    tls_generated,
                }
            }

            PipelineState::Installing {
                params,
                manifest,
                tls_generated,
            } => {
                let outcome = ClusterInstaller::new(
                    self.cluster.as_ref(),
                    self.netctl.as_ref(),
                    &self.paths,
                    self.delays,
                )
                .install(&params)
                .await?;

                PipelineState::Done(InstallReport {
                    params,
                    fragments: manifest.fragments(),
                    manifest_path: self.paths.manifest.clone(),
                    tls_generated,
                    hosts_entry_added: outcome.hosts_entry_added,
                    forwarding_configured: outcome.forwarding_configured,
                    dns_backup: outcome
                        .dns_removed
                        .then(|| self.paths.dns_backup.clone()),
                })
            }

            done @ PipelineState::Done(_) => done,
        };
        Ok(next)
    }

    fn write_manifest(&self, manifest: &ManifestDocument) -> InstallResult<()> {
        manifest.write_to(&self.paths.manifest).map_err(|e| {
            InstallError::io(
                format!("Failed to write {}", self.paths.manifest.display()),
                e,
            )
        })
    }
}
