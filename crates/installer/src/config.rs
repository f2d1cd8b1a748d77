//! Installation configuration types.
//!
//! This module defines the resolved parameter record, the optional YAML
//! parameter file, the fixed filesystem locations the installer writes to,
//! and the fixed pauses taken during installation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Sentinel used when no EPG bridge domain is supplied.
pub const BRIDGE_DOMAIN_NOT_SPECIFIED: &str = "not_specified";

/// Default for the APIC contracts-unrestricted flag.
pub const CONTRACTS_UNRESTRICTED_DEFAULT: &str = "no";

/// Port the self-hosted etcd listens on.
pub const SELF_HOSTED_ETCD_PORT: u16 = 6666;

/// Port of the netmaster REST API used by netctl.
pub const NETMASTER_API_PORT: u16 = 9999;

/// Hostname every node uses to reach netmaster.
pub const NETMASTER_HOSTNAME: &str = "netmaster";

/// Namespace holding the fabric key secret and the DNS deployment.
pub const SYSTEM_NAMESPACE: &str = "kube-system";

/// Name of the APIC credential-key secret.
pub const FABRIC_KEY_SECRET: &str = "aci.key";

/// Content written when no APIC key file is supplied.
pub const DUMMY_FABRIC_KEY: &str = "dummy\n";

/// Deployment removed once the network plugin takes over DNS.
pub const CONFLICTING_DNS_DEPLOYMENT: &str = "kube-dns";

/// Data-plane forwarding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ForwardingMode {
    /// Layer-2 bridging (VLAN/VXLAN).
    #[default]
    Bridge,
    /// Layer-3 routing (BGP).
    Routing,
}

impl std::fmt::Display for ForwardingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bridge => write!(f, "bridge"),
            Self::Routing => write!(f, "routing"),
        }
    }
}

impl std::str::FromStr for ForwardingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bridge" => Ok(Self::Bridge),
            "routing" => Ok(Self::Routing),
            _ => Err(anyhow::anyhow!(
                "Unknown forwarding mode: {s}. Supported: bridge, routing"
            )),
        }
    }
}

/// APIC fabric integration parameters.
///
/// Present only when an APIC URL was supplied, in which case the URL,
/// username, physical domain and leaf node are all non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FabricParameters {
    /// APIC controller URL (e.g. `https://apic:443`).
    pub url: String,
    /// APIC username.
    pub username: String,
    /// APIC password. Empty when a credential key is used instead.
    pub password: String,
    /// Leaf node identifier(s).
    pub leaf_node: String,
    /// Physical domain.
    pub phys_domain: String,
    /// EPG bridge domain, `not_specified` by default.
    pub epg_bridge_domain: String,
    /// Contracts-unrestricted mode, `no` by default.
    pub contracts_unrestricted: String,
    /// Local path of the APIC certificate key.
    pub cert_key_path: Option<PathBuf>,
    /// APIC certificate distinguished name.
    pub cert_dn: Option<String>,
}

/// Fully resolved installation parameters.
///
/// Built once by the resolver and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallParameters {
    /// Netmaster (Kubernetes master) address.
    pub master: String,
    /// External cluster store, `None` to self-host etcd.
    pub cluster_store: Option<String>,
    /// Data-plane (VLAN) interface.
    pub vlan_interface: Option<String>,
    /// Forwarding mode.
    pub forwarding_mode: ForwardingMode,
    /// YAML parameter file the values were read from, if any.
    pub config_file: Option<PathBuf>,
    /// Auth-proxy TLS certificate.
    pub tls_cert: Option<PathBuf>,
    /// Auth-proxy TLS key.
    pub tls_key: Option<PathBuf>,
    /// APIC integration, present only in fabric mode.
    pub fabric: Option<FabricParameters>,
}

impl InstallParameters {
    /// Minimal parameters for a master address, everything else defaulted.
    #[must_use]
    pub fn for_master(master: impl Into<String>) -> Self {
        Self {
            master: master.into(),
            cluster_store: None,
            vlan_interface: None,
            forwarding_mode: ForwardingMode::default(),
            config_file: None,
            tls_cert: None,
            tls_key: None,
            fabric: None,
        }
    }

    /// Whether the embedded etcd fragment must be deployed.
    #[must_use]
    pub fn self_hosted_store(&self) -> bool {
        self.cluster_store.is_none()
    }

    /// Whether APIC integration is active.
    #[must_use]
    pub fn fabric_mode(&self) -> bool {
        self.fabric.is_some()
    }

    /// Cluster store the workload is configured with.
    #[must_use]
    pub fn effective_cluster_store(&self) -> String {
        match &self.cluster_store {
            Some(store) => store.clone(),
            None => format!("etcd://{}:{SELF_HOSTED_ETCD_PORT}", self.master),
        }
    }

    /// Netmaster API URL handed to netctl.
    #[must_use]
    pub fn netmaster_url(&self) -> String {
        format!("http://{}:{NETMASTER_API_PORT}", self.master)
    }
}

/// Parameters as written in a `--config` YAML file.
///
/// Keys mirror the long command-line flags. Explicit flags win over file
/// values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ParameterFile {
    pub master: Option<String>,
    pub cluster_store: Option<String>,
    pub vlan_interface: Option<String>,
    pub forwarding_mode: Option<ForwardingMode>,
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

impl ParameterFile {
    /// Load a parameter file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML for
    /// this schema.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read parameter file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse parameter file {}", path.display()))
    }
}

/// Fixed filesystem locations used during installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    /// Composite manifest written for `kubectl apply`.
    pub manifest: PathBuf,
    /// Local copy of the APIC key registered as a secret.
    pub fabric_key: PathBuf,
    /// Directory generated TLS material is written to.
    pub local_certs_dir: PathBuf,
    /// Generated self-signed certificate.
    pub generated_cert: PathBuf,
    /// Generated private key.
    pub generated_key: PathBuf,
    /// Directory the auth proxy reads its TLS material from.
    pub system_config_dir: PathBuf,
    /// netctl binary shipped alongside the installer.
    pub netctl_source: PathBuf,
    /// Where netctl is installed.
    pub netctl_destination: PathBuf,
    /// Hosts file the netmaster mapping is added to.
    pub hosts_file: PathBuf,
    /// Backup of the removed DNS deployment.
    pub dns_backup: PathBuf,
}

impl Default for InstallPaths {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("./.contiv.yaml"),
            fabric_key: PathBuf::from("./contiv_aci.key"),
            local_certs_dir: PathBuf::from("./local_certs"),
            generated_cert: PathBuf::from("./local_certs/cert.pem"),
            generated_key: PathBuf::from("./local_certs/local.key"),
            system_config_dir: PathBuf::from("/var/contiv"),
            netctl_source: PathBuf::from("./netctl"),
            netctl_destination: PathBuf::from("/usr/bin/netctl"),
            hosts_file: PathBuf::from("/etc/hosts"),
            dns_backup: PathBuf::from("./kube-dns.yaml"),
        }
    }
}

impl InstallPaths {
    /// Every location relocated under `root`.
    #[must_use]
    pub fn rooted(root: &Path) -> Self {
        Self {
            manifest: root.join(".contiv.yaml"),
            fabric_key: root.join("contiv_aci.key"),
            local_certs_dir: root.join("local_certs"),
            generated_cert: root.join("local_certs").join("cert.pem"),
            generated_key: root.join("local_certs").join("local.key"),
            system_config_dir: root.join("var").join("contiv"),
            netctl_source: root.join("netctl"),
            netctl_destination: root.join("usr").join("bin").join("netctl"),
            hosts_file: root.join("etc").join("hosts"),
            dns_backup: root.join("kube-dns.yaml"),
        }
    }

    /// Use a different netctl source binary.
    #[must_use]
    pub fn with_netctl_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.netctl_source = path.into();
        self
    }

    /// Certificate location read by the auth proxy.
    #[must_use]
    pub fn auth_proxy_cert(&self) -> PathBuf {
        self.system_config_dir.join("auth_proxy_cert.pem")
    }

    /// Key location read by the auth proxy.
    #[must_use]
    pub fn auth_proxy_key(&self) -> PathBuf {
        self.system_config_dir.join("auth_proxy_key.pem")
    }
}

/// Unconditional pauses taken while installing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delays {
    /// Window in which the operator can still interrupt before the cluster
    /// is touched.
    pub cancellation_window: Duration,
    /// Wait between applying the manifest and setting the forwarding mode.
    pub stabilization: Duration,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            cancellation_window: Duration::from_secs(10),
            stabilization: Duration::from_secs(60),
        }
    }
}

impl Delays {
    /// No pauses at all.
    #[must_use]
    pub fn none() -> Self {
        Self {
            cancellation_window: Duration::ZERO,
            stabilization: Duration::ZERO,
        }
    }
}
