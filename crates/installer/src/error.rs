//! Installer error taxonomy.

use thiserror::Error;

/// Errors that abort an installation.
///
/// Every variant is fatal; nothing is retried or downgraded.
#[derive(Error, Debug)]
pub enum InstallError {
    /// Missing or invalid operator input.
    #[error("{0}")]
    Usage(String),

    /// Not running as root.
    #[error("This installer must be run as root")]
    Privilege,

    /// A secret, certificate, copy, or cluster operation failed.
    #[error("{operation} failed: {source:#}")]
    External {
        operation: &'static str,
        source: anyhow::Error,
    },

    /// Placeholders survived substitution.
    #[error("Manifest still contains unresolved placeholders: {}", .0.join(", "))]
    UnresolvedPlaceholders(Vec<String>),

    /// Local filesystem failure.
    #[error("{context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl InstallError {
    /// Create a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Wrap a failed external operation.
    pub fn external(operation: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::External {
            operation,
            source: source.into(),
        }
    }

    /// Wrap a filesystem error.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether usage text should accompany this error.
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }

    /// Process exit status for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Result alias for installer operations.
pub type InstallResult<T> = Result<T, InstallError>;
