//! Parameter resolution.
//!
//! Turns raw operator input into an immutable [`InstallParameters`],
//! applying defaults and the few validation rules the installer enforces.
//! The APIC password is the only value that may be asked for interactively;
//! the prompt is injected so the rules can be exercised without a terminal.

use std::path::PathBuf;

use anyhow::bail;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Password;
use tracing::{debug, warn};

use crate::config::{
    FabricParameters, ForwardingMode, InstallParameters, ParameterFile,
    BRIDGE_DOMAIN_NOT_SPECIFIED, CONTRACTS_UNRESTRICTED_DEFAULT,
};
use crate::error::{InstallError, InstallResult};

/// Source of a masked secret value.
pub trait SecretPrompt {
    /// Ask the operator for a secret.
    ///
    /// # Errors
    ///
    /// Returns an error if no input could be obtained.
    fn read_secret(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Masked prompt on the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl SecretPrompt for TerminalPrompt {
    fn read_secret(&self, prompt: &str) -> anyhow::Result<String> {
        let value = Password::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()?;
        Ok(value)
    }
}

/// Non-interactive input: a value supplied up front, or nothing.
#[derive(Debug, Default)]
pub struct PresuppliedInput(pub Option<String>);

impl SecretPrompt for PresuppliedInput {
    fn read_secret(&self, prompt: &str) -> anyhow::Result<String> {
        match &self.0 {
            Some(value) => Ok(value.clone()),
            None => bail!("{prompt} is required but no terminal is available to ask for it"),
        }
    }
}

/// Operator input before defaults and validation.
///
/// Empty strings are treated the same as absent values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawParameters {
    pub master: Option<String>,
    pub cluster_store: Option<String>,
    pub vlan_interface: Option<String>,
    pub forwarding_mode: Option<ForwardingMode>,
    pub config_file: Option<PathBuf>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub apic_url: Option<String>,
    pub apic_username: Option<String>,
    pub apic_password: Option<String>,
    pub apic_leaf_node: Option<String>,
    pub apic_phys_domain: Option<String>,
    pub apic_epg_bridge_domain: Option<String>,
    pub apic_contracts_unrestricted: Option<String>,
    pub apic_cert_key: Option<PathBuf>,
    pub apic_cert_dn: Option<String>,
}

impl RawParameters {
    /// Fill every value not given explicitly from a parameter file.
    #[must_use]
    pub fn merged_with(self, file: ParameterFile) -> Self {
        Self {
            master: self.master.or(file.master),
            cluster_store: self.cluster_store.or(file.cluster_store),
            vlan_interface: self.vlan_interface.or(file.vlan_interface),
            forwarding_mode: self.forwarding_mode.or(file.forwarding_mode),
            config_file: self.config_file,
            tls_cert: self.tls_cert.or(file.tls_cert),
            tls_key: self.tls_key.or(file.tls_key),
            apic_url: self.apic_url.or(file.apic_url),
            apic_username: self.apic_username.or(file.apic_username),
            apic_password: self.apic_password.or(file.apic_password),
            apic_leaf_node: self.apic_leaf_node.or(file.apic_leaf_node),
            apic_phys_domain: self.apic_phys_domain.or(file.apic_phys_domain),
            apic_epg_bridge_domain: self.apic_epg_bridge_domain.or(file.apic_epg_bridge_domain),
            apic_contracts_unrestricted: self
                .apic_contracts_unrestricted
                .or(file.apic_contracts_unrestricted),
            apic_cert_key: self.apic_cert_key.or(file.apic_cert_key),
            apic_cert_dn: self.apic_cert_dn.or(file.apic_cert_dn),
        }
    }

    fn has_fabric_details(&self) -> bool {
        [
            &self.apic_username,
            &self.apic_password,
            &self.apic_leaf_node,
            &self.apic_phys_domain,
            &self.apic_epg_bridge_domain,
            &self.apic_contracts_unrestricted,
            &self.apic_cert_dn,
        ]
        .iter()
        .any(|value| value.as_deref().is_some_and(|v| !v.is_empty()))
            || self.apic_cert_key.is_some()
    }
}

/// Resolves raw input into [`InstallParameters`].
pub struct ParameterResolver<'a> {
    prompt: &'a dyn SecretPrompt,
}

impl<'a> ParameterResolver<'a> {
    /// Create a resolver using the given prompt for the APIC password.
    pub fn new(prompt: &'a dyn SecretPrompt) -> Self {
        Self { prompt }
    }

    /// Merge the parameter file, apply defaults and validate.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Usage`] if the parameter file cannot be loaded,
    /// if the master address is missing, if APIC mode lacks a mandatory
    /// value, if the prompted password is empty, or if any value spans more
    /// than one line.
    pub fn resolve(&self, raw: RawParameters) -> InstallResult<InstallParameters> {
        let raw = match raw.config_file.clone() {
            Some(path) => {
                let file = ParameterFile::load(&path).map_err(|e| InstallError::usage(format!("{e:#}")))?;
                raw.merged_with(file)
            }
            None => raw,
        };
        let master =
            non_empty(raw.master.clone()).ok_or_else(|| InstallError::usage("Netmaster IP is required"))?;

        let fabric = match non_empty(raw.apic_url.clone()) {
            Some(url) => Some(self.resolve_fabric(url, &raw)?),
            None => {
                if raw.has_fabric_details() {
                    warn!("APIC options given without an APIC URL; ignoring them");
                }
                None
            }
        };

        let params = InstallParameters {
            master,
            cluster_store: non_empty(raw.cluster_store),
            vlan_interface: non_empty(raw.vlan_interface),
            forwarding_mode: raw.forwarding_mode.unwrap_or_default(),
            config_file: raw.config_file,
            tls_cert: raw.tls_cert.filter(|p| !p.as_os_str().is_empty()),
            tls_key: raw.tls_key.filter(|p| !p.as_os_str().is_empty()),
            fabric,
        };

        ensure_single_line(&params)?;

        debug!(
            master = %params.master,
            self_hosted_store = params.self_hosted_store(),
            fabric = params.fabric_mode(),
            forwarding_mode = %params.forwarding_mode,
            "Resolved installation parameters"
        );
        Ok(params)
    }

    fn resolve_fabric(&self, url: String, raw: &RawParameters) -> InstallResult<FabricParameters> {
        let username = non_empty(raw.apic_username.clone());
        let phys_domain = non_empty(raw.apic_phys_domain.clone());
        let leaf_node = non_empty(raw.apic_leaf_node.clone());

        let missing: Vec<&str> = [
            ("APIC username", username.is_none()),
            ("APIC physical domain", phys_domain.is_none()),
            ("APIC leaf node", leaf_node.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        if !missing.is_empty() {
            return Err(InstallError::usage(format!(
                "{} required when an APIC URL is given",
                missing.join(", ")
            )));
        }

        let cert_key_path = raw
            .apic_cert_key
            .clone()
            .filter(|p| !p.as_os_str().is_empty());
        let password = match non_empty(raw.apic_password.clone()) {
            Some(password) => password,
            None if cert_key_path.is_some() => String::new(),
            None => {
                let entered = self
                    .prompt
                    .read_secret("APIC password")
                    .map_err(|e| InstallError::usage(format!("{e:#}")))?;
                if entered.is_empty() {
                    return Err(InstallError::usage("APIC password cannot be empty"));
                }
                entered
            }
        };

        Ok(FabricParameters {
            url,
            username: username.unwrap_or_default(),
            password,
            leaf_node: leaf_node.unwrap_or_default(),
            phys_domain: phys_domain.unwrap_or_default(),
            epg_bridge_domain: non_empty(raw.apic_epg_bridge_domain.clone())
                .unwrap_or_else(|| BRIDGE_DOMAIN_NOT_SPECIFIED.to_string()),
            contracts_unrestricted: non_empty(raw.apic_contracts_unrestricted.clone())
                .unwrap_or_else(|| CONTRACTS_UNRESTRICTED_DEFAULT.to_string()),
            cert_key_path,
            cert_dn: non_empty(raw.apic_cert_dn.clone()),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Values are spliced into single manifest lines.
fn ensure_single_line(params: &InstallParameters) -> InstallResult<()> {
    let mut values = vec![
        ("master", Some(params.master.as_str())),
        ("cluster store", params.cluster_store.as_deref()),
        ("VLAN interface", params.vlan_interface.as_deref()),
    ];
    if let Some(fabric) = &params.fabric {
        values.extend([
            ("APIC URL", Some(fabric.url.as_str())),
            ("APIC username", Some(fabric.username.as_str())),
            ("APIC password", Some(fabric.password.as_str())),
            ("APIC leaf node", Some(fabric.leaf_node.as_str())),
            ("APIC physical domain", Some(fabric.phys_domain.as_str())),
            ("APIC EPG bridge domain", Some(fabric.epg_bridge_domain.as_str())),
            ("APIC contracts unrestricted mode", Some(fabric.contracts_unrestricted.as_str())),
            ("APIC certificate DN", fabric.cert_dn.as_deref()),
        ]);
    }

    match values
        .into_iter()
        .find(|(_, value)| value.is_some_and(|v| v.contains(|c| c == '\n' || c == '\r')))
    {
        Some((name, _)) => Err(InstallError::usage(format!(
            "{name} must not contain line breaks"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Prompt that records how often it was asked.
    struct CountingPrompt {
        answer: &'static str,
        calls: Cell<u32>,
    }

    impl CountingPrompt {
        fn answering(answer: &'static str) -> Self {
            Self {
                answer,
                calls: Cell::new(0),
            }
        }
    }

    impl SecretPrompt for CountingPrompt {
        fn read_secret(&self, _prompt: &str) -> anyhow::Result<String> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.answer.to_string())
        }
    }

    fn fabric_raw() -> RawParameters {
        RawParameters {
            master: Some("10.0.0.1".into()),
            apic_url: Some("https://apic:443".into()),
            apic_username: Some("u".into()),
            apic_phys_domain: Some("d".into()),
            apic_leaf_node: Some("l".into()),
            ..RawParameters::default()
        }
    }

    #[test]
    fn test_missing_master_is_usage_error() {
        let prompt = CountingPrompt::answering("p");
        let resolver = ParameterResolver::new(&prompt);

        for raw in [
            RawParameters::default(),
            RawParameters {
                master: Some(String::new()),
                ..RawParameters::default()
            },
            RawParameters {
                master: None,
                ..fabric_raw()
            },
            RawParameters {
                cluster_store: Some("etcd://host:2379".into()),
                forwarding_mode: Some(ForwardingMode::Routing),
                ..RawParameters::default()
            },
        ] {
            let err = resolver.resolve(raw).unwrap_err();
            assert!(err.is_usage(), "expected usage error, got {err}");
        }
        assert_eq!(prompt.calls.get(), 0);
    }

    #[test]
    fn test_defaults_applied() {
        let prompt = PresuppliedInput(None);
        let params = ParameterResolver::new(&prompt)
            .resolve(RawParameters {
                master: Some("10.0.0.1".into()),
                cluster_store: Some(String::new()),
                ..RawParameters::default()
            })
            .unwrap();

        assert_eq!(params.master, "10.0.0.1");
        assert_eq!(params.forwarding_mode, ForwardingMode::Bridge);
        assert!(params.cluster_store.is_none());
        assert!(params.fabric.is_none());
    }

    #[test]
    fn test_fabric_defaults() {
        let prompt = CountingPrompt::answering("unused");
        let params = ParameterResolver::new(&prompt)
            .resolve(RawParameters {
                apic_password: Some("p".into()),
                ..fabric_raw()
            })
            .unwrap();

        let fabric = params.fabric.unwrap();
        assert_eq!(fabric.password, "p");
        assert_eq!(fabric.epg_bridge_domain, "not_specified");
        assert_eq!(fabric.contracts_unrestricted, "no");
        assert!(fabric.cert_dn.is_none());
        assert_eq!(prompt.calls.get(), 0);
    }

    #[test]
    fn test_password_prompted_without_password_or_key() {
        let prompt = CountingPrompt::answering("secret");
        let params = ParameterResolver::new(&prompt)
            .resolve(fabric_raw())
            .unwrap();

        assert_eq!(prompt.calls.get(), 1);
        assert_eq!(params.fabric.unwrap().password, "secret");
    }

    #[test]
    fn test_empty_prompted_password_rejected() {
        let prompt = CountingPrompt::answering("");
        let err = ParameterResolver::new(&prompt)
            .resolve(fabric_raw())
            .unwrap_err();

        assert!(err.is_usage());
        assert_eq!(prompt.calls.get(), 1);
    }

    #[test]
    fn test_no_terminal_and_no_password_rejected() {
        let prompt = PresuppliedInput(None);
        let err = ParameterResolver::new(&prompt)
            .resolve(fabric_raw())
            .unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn test_key_file_skips_prompt() {
        let prompt = CountingPrompt::answering("secret");
        let params = ParameterResolver::new(&prompt)
            .resolve(RawParameters {
                apic_cert_key: Some(PathBuf::from("/tmp/apic.key")),
                ..fabric_raw()
            })
            .unwrap();

        assert_eq!(prompt.calls.get(), 0);
        let fabric = params.fabric.unwrap();
        assert!(fabric.password.is_empty());
        assert_eq!(fabric.cert_key_path, Some(PathBuf::from("/tmp/apic.key")));
    }

    #[test]
    fn test_fabric_mandatory_fields() {
        let prompt = PresuppliedInput(Some("p".into()));
        let resolver = ParameterResolver::new(&prompt);

        for raw in [
            RawParameters {
                apic_username: None,
                ..fabric_raw()
            },
            RawParameters {
                apic_phys_domain: Some(String::new()),
                ..fabric_raw()
            },
            RawParameters {
                apic_leaf_node: None,
                ..fabric_raw()
            },
        ] {
            assert!(resolver.resolve(raw).unwrap_err().is_usage());
        }
    }

    #[test]
    fn test_fabric_details_without_url_ignored() {
        let prompt = CountingPrompt::answering("p");
        let params = ParameterResolver::new(&prompt)
            .resolve(RawParameters {
                apic_url: None,
                ..fabric_raw()
            })
            .unwrap();

        assert!(params.fabric.is_none());
        assert_eq!(prompt.calls.get(), 0);
    }

    #[test]
    fn test_multiline_value_rejected() {
        let prompt = PresuppliedInput(None);
        let err = ParameterResolver::new(&prompt)
            .resolve(RawParameters {
                master: Some("10.0.0.1".into()),
                vlan_interface: Some("eth1\nkind: Secret".into()),
                ..RawParameters::default()
            })
            .unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn test_parameter_file_merged_during_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("params.yaml");
        std::fs::write(&config, "master: 10.0.0.9\ntls-cert: /etc/proxy.pem\n").unwrap();

        let prompt = CountingPrompt::answering("p");
        let params = ParameterResolver::new(&prompt)
            .resolve(RawParameters {
                config_file: Some(config),
                ..RawParameters::default()
            })
            .unwrap();
        assert_eq!(params.master, "10.0.0.9");
        assert_eq!(params.tls_cert, Some(PathBuf::from("/etc/proxy.pem")));

        let err = ParameterResolver::new(&prompt)
            .resolve(RawParameters {
                config_file: Some(dir.path().join("missing.yaml")),
                ..RawParameters::default()
            })
            .unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn test_flags_override_parameter_file() {
        let raw = RawParameters {
            master: Some("10.0.0.1".into()),
            ..RawParameters::default()
        }
        .merged_with(ParameterFile {
            master: Some("10.9.9.9".into()),
            vlan_interface: Some("eth2".into()),
            forwarding_mode: Some(ForwardingMode::Routing),
            ..ParameterFile::default()
        });

        assert_eq!(raw.master.as_deref(), Some("10.0.0.1"));
        assert_eq!(raw.vlan_interface.as_deref(), Some("eth2"));
        assert_eq!(raw.forwarding_mode, Some(ForwardingMode::Routing));
    }
}
