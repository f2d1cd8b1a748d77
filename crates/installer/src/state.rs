//! Installation stages.
//!
//! The pipeline is a strictly linear state machine with no retries and no
//! persistence between runs.

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstallStage {
    /// Collecting and validating operator input.
    Resolving,
    /// Concatenating template fragments.
    Assembling,
    /// Creating the fabric key secret and TLS material.
    Provisioning,
    /// Replacing placeholders in the manifest.
    Substituting,
    /// Applying the manifest and post-install adjustments.
    Installing,
    /// Terminal state.
    Done,
}

impl InstallStage {
    /// Total number of working stages.
    pub const TOTAL_STEPS: u8 = 5;

    /// Get the next stage in the sequence.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Resolving => Self::Assembling,
            Self::Assembling => Self::Provisioning,
            Self::Provisioning => Self::Substituting,
            Self::Substituting => Self::Installing,
            Self::Installing | Self::Done => Self::Done,
        }
    }

    /// Get a human-readable description of the stage.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Resolving => "Resolving installation parameters",
            Self::Assembling => "Assembling Contiv manifest",
            Self::Provisioning => "Provisioning secrets and certificates",
            Self::Substituting => "Substituting manifest placeholders",
            Self::Installing => "Installing Contiv on the cluster",
            Self::Done => "Complete",
        }
    }

    /// Get the stage number for progress display.
    #[must_use]
    pub fn step_number(self) -> u8 {
        match self {
            Self::Resolving => 1,
            Self::Assembling => 2,
            Self::Provisioning => 3,
            Self::Substituting => 4,
            Self::Installing | Self::Done => 5,
        }
    }

    /// Whether this is the terminal stage.
    #[must_use]
    pub fn is_done(self) -> bool {
        self == Self::Done
    }
}

impl std::fmt::Display for InstallStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
