use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use tracing::debug;

use crate::ui;

/// Validates prerequisites for a Contiv installation
pub struct PrerequisitesValidator {
    requirements: Vec<Requirement>,
}

/// A requirement that did not pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Missing {
    pub name: String,
    /// How to satisfy it.
    pub remedy: String,
    /// The install cannot proceed without it.
    pub critical: bool,
}

struct Requirement {
    name: String,
    check: Box<dyn Fn() -> Result<bool>>,
    install_instructions: String,
    critical: bool,
}

fn on_path(executable: &'static str) -> Box<dyn Fn() -> Result<bool>> {
    Box::new(move || Ok(which::which(executable).is_ok()))
}

impl PrerequisitesValidator {
    /// Requirements for an install. `openssl` is only needed when the auth
    /// proxy certificate has to be generated.
    pub fn new(generate_certificate: bool, netctl_source: &Path) -> Self {
        let mut requirements = Vec::new();

        requirements.push(Requirement {
            name: "kubectl".to_string(),
            check: on_path("kubectl"),
            install_instructions: "Install kubectl from https://kubernetes.io/docs/tasks/tools/"
                .to_string(),
            critical: true,
        });

        requirements.push(Requirement {
            name: "openssl".to_string(),
            check: on_path("openssl"),
            install_instructions: "Install openssl, or pass --tls-cert and --tls-key".to_string(),
            critical: generate_certificate,
        });

        let source: PathBuf = netctl_source.to_path_buf();
        requirements.push(Requirement {
            name: "netctl binary".to_string(),
            check: Box::new(move || Ok(source.is_file())),
            install_instructions: format!(
                "Place the netctl binary at {} or pass --netctl-binary",
                netctl_source.display()
            ),
            critical: true,
        });

        Self { requirements }
    }

    /// Run every check without printing anything.
    #[must_use]
    pub fn missing(&self) -> Vec<Missing> {
        self.requirements
            .iter()
            .filter(|r| !matches!((r.check)(), Ok(true)))
            .map(|r| {
                debug!(requirement = %r.name, critical = r.critical, "Prerequisite not met");
                Missing {
                    name: r.name.clone(),
                    remedy: r.install_instructions.clone(),
                    critical: r.critical,
                }
            })
            .collect()
    }

    /// Check everything, report once, and fail if a critical requirement is
    /// unmet.
    ///
    /// # Errors
    ///
    /// Names every missing critical requirement.
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing();
        ui::print_preflight(&missing);

        let critical: Vec<&str> = missing
            .iter()
            .filter(|m| m.critical)
            .map(|m| m.name.as_str())
            .collect();
        if !critical.is_empty() {
            bail!("Missing required prerequisites: {}", critical.join(", "));
        }
        Ok(())
    }
}
