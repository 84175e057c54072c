use thiserror::Error;

use crate::channel::Channel;
use crate::session::SessionState;

/// Rejected session configuration. Raised before any session state exists.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("channel set is empty")]
    EmptyChannelSet,

    #[error("n-back level must be at least 1, got {0}")]
    InvalidNBack(usize),

    #[error("multi-stimulus count must be between 1 and 4, got {0}")]
    UnsupportedMulti(usize),

    #[error("{channel} is active but only {multi} simultaneous stimuli are shown")]
    PositionBeyondMulti { channel: Channel, multi: usize },

    #[error("ticks per trial must be at least {minimum}, got {ticks}")]
    TicksTooShort { ticks: i32, minimum: i32 },

    #[error("{name} must be within [0, 1], got {value}")]
    ProbabilityOutOfRange { name: &'static str, value: f64 },

    #[error("arithmetic maximum operand must be between 1 and {limit}, got {max}")]
    InvalidArithmeticRange { max: i32, limit: i32 },

    #[error("fixed-count protocol requires the {0} channel")]
    FixedCountRequires(Channel),

    #[error("fixed-count protocol supports a single position stimulus, got multi {0}")]
    FixedCountMulti(usize),

    #[error("fixed-count and variable-n protocols cannot be combined")]
    ConflictingProtocols,

    #[error("trial count overflows at n={n}")]
    TrialCountOverflow { n: usize },

    #[error("session must contain more trials ({total}) than the n-back level ({n})")]
    TooFewTrials { total: usize, n: usize },
}

/// Failure of a bounded generate-and-test sequence search.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error(
        "sequence generation failed for n={n}, {total_trials} trials after {attempts} attempts"
    )]
    SequenceGenerationFailed {
        n: usize,
        total_trials: usize,
        attempts: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("cannot {operation} while session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("{0} is not active in this session")]
    InactiveChannel(Channel),
}

/// Errors from the on-disk collaborators (journal, stats database, settings).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
