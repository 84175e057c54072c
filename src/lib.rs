// Library surface for the CLI and integration tests.
pub mod app_dirs;
pub mod channel;
pub mod config;
pub mod error;
pub mod generator;
pub mod history;
pub mod journal;
pub mod player;
pub mod progress;
pub mod runtime;
pub mod score;
pub mod session;
pub mod stats;
pub mod util;

pub use channel::{Channel, ChannelSet, GameMode, MultiStyle, Slot};
pub use config::{ConfigStore, FileConfigStore, SessionConfig, Settings};
pub use error::{ConfigError, GenerationError, SessionError, StoreError};
pub use history::{SessionHistory, TrialRecord};
pub use journal::{Journal, JournalEntry, JournalRecord};
pub use player::{play, PlayerProfile, RunnerResponder, SimulatedPlayer};
pub use progress::{apply_session_result, retrieve_progress, Progress, SessionOutcome, Tier};
pub use runtime::{
    drive, ChannelInputSource, EventSink, FixedTicker, InputSource, Runner, RunnerEvent, Ticker,
    DEFAULT_TICK,
};
pub use score::{calculate_session_score, ChannelScore, Outcome, ScoreResult};
pub use session::{Session, SessionEvent, SessionState};
pub use stats::StatsDb;
