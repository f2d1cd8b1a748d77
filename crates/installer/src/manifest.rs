//! Manifest assembly.
//!
//! The Contiv manifest is a concatenation of YAML fragments. Which fragments
//! are included depends on the resolved parameters, and their order matters:
//! later fragments rely on the config map, service accounts and labels
//! declared by earlier ones.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::InstallParameters;

/// A pre-authored block of manifest content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fragment {
    /// Config map, service accounts and RBAC.
    Base,
    /// Self-hosted etcd used when no cluster store is supplied.
    ClusterStore,
    /// netplugin and netmaster workloads.
    Core,
    /// APIC fabric gateway.
    FabricGateway,
    /// Auth proxy serving the Contiv API over TLS.
    AuthProxy,
}

impl Fragment {
    /// Template file backing this fragment.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Base => "base.yaml",
            Self::ClusterStore => "etcd.yaml",
            Self::Core => "contiv.yaml",
            Self::FabricGateway => "aci_gw.yaml",
            Self::AuthProxy => "auth_proxy.yaml",
        }
    }
}

impl std::fmt::Display for Fragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Where fragment contents come from.
pub trait FragmentSource {
    /// Load the raw text of a fragment.
    ///
    /// # Errors
    ///
    /// Returns an error if the fragment cannot be read.
    fn load(&self, fragment: Fragment) -> Result<String>;
}

/// Fragments compiled into the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedFragments;

impl FragmentSource for EmbeddedFragments {
    fn load(&self, fragment: Fragment) -> Result<String> {
        let text = match fragment {
            Fragment::Base => include_str!("../templates/base.yaml"),
            Fragment::ClusterStore => include_str!("../templates/etcd.yaml"),
            Fragment::Core => include_str!("../templates/contiv.yaml"),
            Fragment::FabricGateway => include_str!("../templates/aci_gw.yaml"),
            Fragment::AuthProxy => include_str!("../templates/auth_proxy.yaml"),
        };
        Ok(text.to_string())
    }
}

/// Fragments read from a template directory.
#[derive(Debug, Clone)]
pub struct DirectoryFragments {
    dir: PathBuf,
}

impl DirectoryFragments {
    /// Read fragments from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FragmentSource for DirectoryFragments {
    fn load(&self, fragment: Fragment) -> Result<String> {
        let path = self.dir.join(fragment.file_name());
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read template {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    fragment: Fragment,
    text: String,
}

/// The composite manifest, kept as an ordered list of fragment texts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDocument {
    segments: Vec<Segment>,
}

impl ManifestDocument {
    /// An empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment's text.
    pub fn push(&mut self, fragment: Fragment, mut text: String) {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        self.segments.push(Segment { fragment, text });
    }

    /// Fragments in document order.
    #[must_use]
    pub fn fragments(&self) -> Vec<Fragment> {
        self.segments.iter().map(|s| s.fragment).collect()
    }

    /// Whether a fragment was included.
    #[must_use]
    pub fn contains(&self, fragment: Fragment) -> bool {
        self.segments.iter().any(|s| s.fragment == fragment)
    }

    /// Rewrite the text of every fragment.
    pub fn rewrite(&mut self, mut f: impl FnMut(&str) -> String) {
        for segment in &mut self.segments {
            segment.text = f(&segment.text);
        }
    }

    /// The full manifest text.
    #[must_use]
    pub fn render(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    /// Write the manifest, replacing any previous file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        file.write_all(self.render().as_bytes())?;
        file.flush()
    }
}

/// Selects and concatenates fragments.
pub struct ManifestAssembler<'a> {
    source: &'a dyn FragmentSource,
}

impl<'a> ManifestAssembler<'a> {
    /// Create an assembler reading from `source`.
    pub fn new(source: &'a dyn FragmentSource) -> Self {
        Self { source }
    }

    /// Fragments included before credentials are provisioned.
    #[must_use]
    pub fn plan(params: &InstallParameters) -> Vec<Fragment> {
        let mut plan = vec![Fragment::Base];
        if params.self_hosted_store() {
            plan.push(Fragment::ClusterStore);
        }
        plan.push(Fragment::Core);
        if params.fabric_mode() {
            plan.push(Fragment::FabricGateway);
        }
        plan
    }

    /// Build the manifest up to, but not including, the auth proxy.
    ///
    /// # Errors
    ///
    /// Returns an error if a fragment cannot be loaded.
    pub fn assemble(&self, params: &InstallParameters) -> Result<ManifestDocument> {
        let mut doc = ManifestDocument::new();
        for fragment in Self::plan(params) {
            self.append(&mut doc, fragment)?;
        }
        info!(fragments = ?doc.fragments(), "Assembled manifest");
        Ok(doc)
    }

    /// Append the auth proxy once its TLS material is in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the fragment cannot be loaded.
    pub fn append_auth_proxy(&self, doc: &mut ManifestDocument) -> Result<()> {
        self.append(doc, Fragment::AuthProxy)
    }

    fn append(&self, doc: &mut ManifestDocument, fragment: Fragment) -> Result<()> {
        let text = self
            .source
            .load(fragment)
            .with_context(|| format!("Failed to load fragment {fragment}"))?;
        debug!(%fragment, bytes = text.len(), "Appending fragment");
        doc.push(fragment, text);
        Ok(())
    }
}
