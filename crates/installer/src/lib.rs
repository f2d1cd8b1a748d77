//! Contiv network plugin installer library.
//!
//! Resolves operator input, assembles the Contiv manifest from template
//! fragments, provisions the APIC key secret and auth proxy TLS material,
//! substitutes placeholders, and applies the result to the cluster.
//!
//! # Example
//!
//! ```ignore
//! use contiv_installer::cluster::{KubeCluster, Netctl, OpensslGenerator};
//! use contiv_installer::{Pipeline, RawParameters};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cluster = KubeCluster::connect(None).await?;
//!     let pipeline = Pipeline::new(
//!         Box::new(cluster),
//!         Box::new(Netctl::new("/usr/bin/netctl")),
//!         Box::new(OpensslGenerator::default()),
//!     );
//!     let raw = RawParameters {
//!         master: Some("10.0.0.1".into()),
//!         ..RawParameters::default()
//!     };
//!     pipeline.run(raw).await?;
//!     Ok(())
//! }
//! ```

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod hosts;
pub mod installer;
pub mod manifest;
pub mod pipeline;
pub mod resolver;
pub mod secrets;
pub mod state;
pub mod substitute;
pub mod ui;
pub mod validator;

// Re-export commonly used types at the crate root
pub use config::{Delays, ForwardingMode, InstallParameters, InstallPaths};
pub use error::{InstallError, InstallResult};
pub use pipeline::{InstallReport, Pipeline};
pub use resolver::RawParameters;
pub use state::InstallStage;
