use std::fmt;
use thiserror::Error;

/// The three ordered stages of a translation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Recognize,
    Translate,
    Synthesize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Recognize => "speech recognition",
            Stage::Translate => "translation",
            Stage::Synthesize => "speech synthesis",
        };
        f.write_str(label)
    }
}

/// Typed failure from an external capability.
///
/// The variant kind survives up to the dispatcher, which logs it
/// server-side and chooses what the client is told.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("speech recognition error: {0}")]
    Recognize(String),

    #[error("translation error: {0}")]
    Translate(String),

    #[error("speech synthesis error: {0}")]
    Synthesize(String),

    /// The capability endpoint could not be reached. Transient: worth a
    /// bounded retry.
    #[error("{0} endpoint unreachable: {1}")]
    Unreachable(Stage, String),

    /// A stage exceeded its bounded timeout. Transient.
    #[error("{0} timed out after {1}s")]
    Timeout(Stage, u64),
}

impl CapabilityError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(..) | Self::Timeout(..))
    }

    /// The stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Recognize(_) => Stage::Recognize,
            Self::Translate(_) => Stage::Translate,
            Self::Synthesize(_) => Stage::Synthesize,
            Self::Unreachable(stage, _) | Self::Timeout(stage, _) => *stage,
        }
    }
}
