//! Placeholder substitution.
//!
//! Fragments carry `__NAME__` tokens, always inside double-quoted scalars.
//! Every token is either replaced with a resolved value or, for optional
//! blocks, every line mentioning it is dropped. Nothing shaped like a token
//! may survive into the applied manifest.

use std::borrow::Cow;
use std::fmt::Write as _;

use regex::{Captures, Regex};
use tracing::debug;

use crate::config::InstallParameters;
use crate::error::{InstallError, InstallResult};
use crate::manifest::ManifestDocument;

/// Kind of value a placeholder receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDomain {
    /// Plain identifier such as an IP, interface or domain name.
    Token,
    /// URL-bearing value; may contain `/`, `:`, `#` and `?`.
    Url,
    /// Credential; never logged.
    Secret,
}

impl ValueDomain {
    /// Escape `value` for a double-quoted YAML (or JSON) string.
    ///
    /// The result decodes back to `value` exactly.
    #[must_use]
    pub fn quote(self, value: &str) -> Cow<'_, str> {
        if !value.chars().any(|c| c == '"' || c == '\\' || c.is_control()) {
            return Cow::Borrowed(value);
        }
        let mut out = String::with_capacity(value.len() + 8);
        for c in value.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {
                    let _ = write!(out, "\\u{:04X}", u32::from(c));
                }
                c => out.push(c),
            }
        }
        Cow::Owned(out)
    }

    fn shown(self, value: &str) -> &str {
        match self {
            Self::Secret => "<redacted>",
            Self::Token | Self::Url => value,
        }
    }
}

/// Named placeholder slots understood by the fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    NetmasterIp,
    VlanInterface,
    ClusterStore,
    ApicUrl,
    ApicUsername,
    ApicPassword,
    ApicLeafNode,
    ApicPhysDomain,
    ApicEpgBridgeDomain,
    ApicContractsUnrestrictedMode,
    ApicCertDn,
}

impl Placeholder {
    pub const ALL: [Self; 11] = [
        Self::NetmasterIp,
        Self::VlanInterface,
        Self::ClusterStore,
        Self::ApicUrl,
        Self::ApicUsername,
        Self::ApicPassword,
        Self::ApicLeafNode,
        Self::ApicPhysDomain,
        Self::ApicEpgBridgeDomain,
        Self::ApicContractsUnrestrictedMode,
        Self::ApicCertDn,
    ];

    /// Placeholders only meaningful in fabric mode.
    pub const FABRIC: [Self; 8] = [
        Self::ApicUrl,
        Self::ApicUsername,
        Self::ApicPassword,
        Self::ApicLeafNode,
        Self::ApicPhysDomain,
        Self::ApicEpgBridgeDomain,
        Self::ApicContractsUnrestrictedMode,
        Self::ApicCertDn,
    ];

    /// Name without the surrounding underscores. Also marks the lines of an
    /// optional block.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::NetmasterIp => "NETMASTER_IP",
            Self::VlanInterface => "VLAN_IF",
            Self::ClusterStore => "CLUSTER_STORE",
            Self::ApicUrl => "APIC_URL",
            Self::ApicUsername => "APIC_USERNAME",
            Self::ApicPassword => "APIC_PASSWORD",
            Self::ApicLeafNode => "APIC_LEAF_NODE",
            Self::ApicPhysDomain => "APIC_PHYS_DOMAIN",
            Self::ApicEpgBridgeDomain => "APIC_EPG_BRIDGE_DOMAIN",
            Self::ApicContractsUnrestrictedMode => "APIC_CONTRACTS_UNRESTRICTED_MODE",
            Self::ApicCertDn => "APIC_CERT_DN",
        }
    }

    /// Placeholder called `name`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Token as written in fragments.
    #[must_use]
    pub fn token(self) -> String {
        format!("__{}__", self.name())
    }

    /// Domain of the value substituted for this placeholder.
    #[must_use]
    pub fn domain(self) -> ValueDomain {
        match self {
            Self::ClusterStore | Self::ApicUrl => ValueDomain::Url,
            Self::ApicPassword => ValueDomain::Secret,
            _ => ValueDomain::Token,
        }
    }
}

/// What happens to a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substitution {
    /// Replace every occurrence of the token with a value.
    Replace(String),
    /// Drop every line mentioning the placeholder name.
    DeleteLines,
}

/// Ordered set of substitutions applied to a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionMap {
    entries: Vec<(Placeholder, Substitution)>,
}

impl SubstitutionMap {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `placeholder` with `value`.
    #[must_use]
    pub fn replace(mut self, placeholder: Placeholder, value: impl Into<String>) -> Self {
        self.entries
            .push((placeholder, Substitution::Replace(value.into())));
        self
    }

    /// Remove the lines of `placeholder`'s optional block.
    #[must_use]
    pub fn delete_lines(mut self, placeholder: Placeholder) -> Self {
        self.entries.push((placeholder, Substitution::DeleteLines));
        self
    }

    /// Substitutions derived from resolved parameters.
    #[must_use]
    pub fn for_parameters(params: &InstallParameters) -> Self {
        let mut map = Self::new()
            .replace(Placeholder::NetmasterIp, &params.master)
            .replace(
                Placeholder::VlanInterface,
                params.vlan_interface.clone().unwrap_or_default(),
            )
            .replace(Placeholder::ClusterStore, params.effective_cluster_store());

        if let Some(fabric) = &params.fabric {
            map = map
                .replace(Placeholder::ApicUrl, &fabric.url)
                .replace(Placeholder::ApicUsername, &fabric.username)
                .replace(Placeholder::ApicPassword, &fabric.password)
                .replace(Placeholder::ApicLeafNode, &fabric.leaf_node)
                .replace(Placeholder::ApicPhysDomain, &fabric.phys_domain)
                .replace(Placeholder::ApicEpgBridgeDomain, &fabric.epg_bridge_domain)
                .replace(
                    Placeholder::ApicContractsUnrestrictedMode,
                    &fabric.contracts_unrestricted,
                );
        }

        match params.fabric.as_ref().and_then(|f| f.cert_dn.as_deref()) {
            Some(dn) => map.replace(Placeholder::ApicCertDn, dn),
            None => map.delete_lines(Placeholder::ApicCertDn),
        }
    }

    /// Substitution registered for a placeholder, if any.
    #[must_use]
    pub fn get(&self, placeholder: Placeholder) -> Option<&Substitution> {
        self.entries
            .iter()
            .find(|(p, _)| *p == placeholder)
            .map(|(_, s)| s)
    }

    /// Value replacing `placeholder`, if it has one.
    fn value(&self, placeholder: Placeholder) -> Option<&str> {
        match self.get(placeholder)? {
            Substitution::Replace(value) => Some(value),
            Substitution::DeleteLines => None,
        }
    }

    /// Rewrite the manifest in place and return the tokens left standing,
    /// deduplicated in order of first appearance.
    ///
    /// Line deletions run first so a deleted block never has a value spliced
    /// into it. Replacement is a single pass over the template text, so a
    /// value that looks like a token is never expanded again.
    ///
    /// # Errors
    ///
    /// Returns an error if the token pattern fails to compile.
    pub fn apply(&self, doc: &mut ManifestDocument) -> InstallResult<Vec<String>> {
        let pattern = Regex::new(r"__([A-Z][A-Z0-9_]*)__")
            .map_err(|e| InstallError::external("Scanning manifest", e))?;
        let deletions: Vec<Placeholder> = self
            .entries
            .iter()
            .filter(|(_, s)| *s == Substitution::DeleteLines)
            .map(|(p, _)| *p)
            .collect();

        let mut unresolved: Vec<String> = Vec::new();
        doc.rewrite(|text| {
            let text = delete_marked_lines(text, &deletions);
            pattern
                .replace_all(&text, |caps: &Captures<'_>| {
                    let known = Placeholder::from_name(&caps[1])
                        .and_then(|p| self.value(p).map(|v| p.domain().quote(v).into_owned()));
                    known.unwrap_or_else(|| {
                        let token = caps[0].to_string();
                        if !unresolved.contains(&token) {
                            unresolved.push(token.clone());
                        }
                        token
                    })
                })
                .into_owned()
        });

        for (placeholder, substitution) in &self.entries {
            match substitution {
                Substitution::DeleteLines => {
                    debug!(placeholder = placeholder.name(), "Removed optional block");
                }
                Substitution::Replace(value) => {
                    let shown = placeholder.domain().shown(value);
                    debug!(placeholder = placeholder.name(), value = shown, "Substituted");
                }
            }
        }
        Ok(unresolved)
    }
}

fn delete_marked_lines(text: &str, markers: &[Placeholder]) -> String {
    if markers.is_empty() {
        return text.to_string();
    }
    text.split_inclusive('\n')
        .filter(|line| !markers.iter().any(|m| line.contains(m.name())))
        .collect()
}

/// Apply `map` and verify that no placeholder is left.
///
/// # Errors
///
/// Returns [`InstallError::UnresolvedPlaceholders`] if the template holds a
/// token the map has no value for.
pub fn substitute(doc: &mut ManifestDocument, map: &SubstitutionMap) -> InstallResult<()> {
    let leftover = map.apply(doc)?;
    if leftover.is_empty() {
        Ok(())
    } else {
        Err(InstallError::UnresolvedPlaceholders(leftover))
    }
}
