//! Command-line interface.

use std::path::PathBuf;

use clap::{CommandFactory, Parser};

use crate::config::ForwardingMode;
use crate::resolver::RawParameters;

/// Contiv network plugin installer.
#[derive(Parser, Debug)]
#[command(
    name = "contiv-install",
    version,
    about = "Install the Contiv network plugin into a Kubernetes cluster",
    long_about = "Install the Contiv network plugin into a Kubernetes cluster.\n\n\
                  Builds the Contiv manifest for this cluster, provisions the APIC key\n\
                  secret and auth proxy certificate, applies the manifest, and removes\n\
                  kube-dns. Must be run as root on the Kubernetes master."
)]
pub struct Cli {
    /// Netmaster IP (the Kubernetes master address)
    #[arg(short = 'n', long, env = "CONTIV_MASTER", value_name = "IP")]
    pub master: Option<String>,

    /// External cluster store URL; an etcd is deployed when omitted
    #[arg(short = 's', long, env = "CONTIV_CLUSTER_STORE", value_name = "URL")]
    pub cluster_store: Option<String>,

    /// Data-plane interface
    #[arg(short = 'v', long, env = "CONTIV_VLAN_INTERFACE", value_name = "IFACE")]
    pub vlan_interface: Option<String>,

    /// Forwarding mode
    #[arg(short = 'w', long, env = "CONTIV_FORWARDING_MODE", value_enum)]
    pub forwarding_mode: Option<ForwardingMode>,

    /// YAML parameter file; explicit flags take precedence
    #[arg(short = 'c', long = "config", env = "CONTIV_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Auth proxy TLS certificate; generated when omitted
    #[arg(short = 't', long, value_name = "FILE", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// Auth proxy TLS key
    #[arg(short = 'k', long, value_name = "FILE")]
    pub tls_key: Option<PathBuf>,

    /// APIC URL; enables ACI fabric integration
    #[arg(short = 'a', long, value_name = "URL")]
    pub apic_url: Option<String>,

    /// APIC username
    #[arg(short = 'u', long, value_name = "USER")]
    pub apic_username: Option<String>,

    /// APIC password; prompted for when omitted and no cert key is given
    #[arg(short = 'p', long, env = "CONTIV_APIC_PASSWORD", hide_env_values = true)]
    pub apic_password: Option<String>,

    /// APIC leaf node(s)
    #[arg(short = 'l', long, value_name = "NODE")]
    pub apic_leaf_node: Option<String>,

    /// APIC physical domain
    #[arg(short = 'd', long, value_name = "DOMAIN")]
    pub apic_phys_domain: Option<String>,

    /// APIC EPG bridge domain
    #[arg(short = 'e', long, value_name = "DOMAIN")]
    pub apic_epg_bridge_domain: Option<String>,

    /// APIC contracts unrestricted mode (yes/no)
    #[arg(short = 'm', long, value_name = "MODE")]
    pub apic_contracts_unrestricted: Option<String>,

    /// APIC certificate key file
    #[arg(long, value_name = "FILE")]
    pub apic_cert_key: Option<PathBuf>,

    /// APIC certificate DN
    #[arg(long, value_name = "DN")]
    pub apic_cert_dn: Option<String>,

    /// Kubeconfig to use instead of the inferred configuration
    #[arg(long, env = "KUBECONFIG", value_name = "FILE")]
    pub kubeconfig: Option<PathBuf>,

    /// Read manifest templates from this directory instead of the built-in ones
    #[arg(long, value_name = "DIR")]
    pub template_dir: Option<PathBuf>,

    /// netctl binary to install
    #[arg(long, value_name = "FILE", default_value = "./netctl")]
    pub netctl_binary: PathBuf,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,
}

impl Cli {
    /// Operator input for the resolver.
    #[must_use]
    pub fn raw_parameters(&self) -> RawParameters {
        RawParameters {
            master: self.master.clone(),
            cluster_store: self.cluster_store.clone(),
            vlan_interface: self.vlan_interface.clone(),
            forwarding_mode: self.forwarding_mode,
            config_file: self.config.clone(),
            tls_cert: self.tls_cert.clone(),
            tls_key: self.tls_key.clone(),
            apic_url: self.apic_url.clone(),
            apic_username: self.apic_username.clone(),
            apic_password: self.apic_password.clone(),
            apic_leaf_node: self.apic_leaf_node.clone(),
            apic_phys_domain: self.apic_phys_domain.clone(),
            apic_epg_bridge_domain: self.apic_epg_bridge_domain.clone(),
            apic_contracts_unrestricted: self.apic_contracts_unrestricted.clone(),
            apic_cert_key: self.apic_cert_key.clone(),
            apic_cert_dn: self.apic_cert_dn.clone(),
        }
    }

    /// Full usage text.
    #[must_use]
    pub fn usage() -> String {
        Self::command().render_help().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("contiv-install").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_short_flags() {
        let cli = parse(&[
            "-n", "10.0.0.1", "-v", "eth1", "-w", "routing", "-a", "https://apic:443", "-u",
            "admin", "-l", "topology/pod-1/node-101", "-d", "phys",
        ])
        .unwrap();
        let raw = cli.raw_parameters();
        assert_eq!(raw.master.as_deref(), Some("10.0.0.1"));
        assert_eq!(raw.vlan_interface.as_deref(), Some("eth1"));
        assert_eq!(raw.forwarding_mode, Some(ForwardingMode::Routing));
        assert_eq!(raw.apic_leaf_node.as_deref(), Some("topology/pod-1/node-101"));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(parse(&["-n", "10.0.0.1", "--bogus"]).is_err());
        assert!(parse(&["-w", "vxlan"]).is_err());
    }

    #[test]
    fn test_tls_cert_requires_key() {
        assert!(parse(&["-n", "10.0.0.1", "-t", "cert.pem"]).is_err());
        assert!(parse(&["-n", "10.0.0.1", "-t", "cert.pem", "-k", "key.pem"]).is_ok());
    }

    #[test]
    fn test_usage_mentions_master() {
        assert!(Cli::usage().contains("--master"));
    }
}
