//! Level progression across sessions.

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::{debug, info};

use crate::channel::GameMode;
use crate::config::Settings;
use crate::journal::JournalRecord;

/// Where a player stands in one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub n: usize,
    pub session_number: usize,
    /// Consecutive sub-fallback sessions at the current level.
    pub progress: usize,
}

impl Progress {
    pub fn starting(mode: GameMode) -> Self {
        Self {
            n: mode.default_n(),
            session_number: 0,
            progress: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Tier {
    Perfect,
    Awesome,
    Great,
    Good,
}

impl Tier {
    pub fn for_percent(percent: f64, settings: &Settings) -> Option<Self> {
        let advance = settings.threshold_advance();
        let fallback = settings.threshold_fallback();
        if percent >= 100.0 {
            Some(Tier::Perfect)
        } else if percent >= advance {
            Some(Tier::Awesome)
        } else if percent >= (advance + fallback) / 2.0 {
            Some(Tier::Great)
        } else if percent >= fallback {
            Some(Tier::Good)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub advanced: bool,
    pub fell_back: bool,
    pub tier: Option<Tier>,
}

/// Rebuild the current level for `mode` from journal records.
///
/// With `reset_level` only `today` counts, otherwise the whole `history`.
/// Manual sessions are ignored.
pub fn retrieve_progress(
    history: &[JournalRecord],
    today: &[JournalRecord],
    mode: GameMode,
    settings: &Settings,
) -> Progress {
    let source = if settings.reset_level { today } else { history };
    let sessions: Vec<&JournalRecord> = source
        .iter()
        .filter(|r| r.mode_id == mode.id() && !r.manual)
        .collect();

    let Some(last) = sessions.last() else {
        return Progress::starting(mode);
    };

    let mut n = last.n;
    if f64::from(last.percent) >= settings.threshold_advance() {
        n += 1;
    }

    let mut progress = 0;
    for session in &sessions {
        if session.n != n {
            progress = 0;
        } else if f64::from(session.percent) < settings.threshold_fallback() {
            progress += 1;
        }
    }

    if progress >= settings.threshold_fallback_sessions {
        progress = 0;
        n = n.saturating_sub(1).max(1);
    }

    let current = Progress {
        n,
        session_number: last.session_number,
        progress,
    };
    debug!(?mode, ?current, sessions = sessions.len(), "progress restored");
    current
}

/// Fold one finished session into `progress`.
pub fn apply_session_result(
    progress: &mut Progress,
    percent: f64,
    manual: bool,
    settings: &Settings,
) -> SessionOutcome {
    let mut outcome = SessionOutcome {
        tier: Tier::for_percent(percent, settings),
        ..SessionOutcome::default()
    };
    if manual {
        return outcome;
    }

    if percent >= settings.threshold_advance() {
        progress.n += 1;
        progress.progress = 0;
        outcome.advanced = true;
    } else if progress.n > 1 && percent < settings.threshold_fallback() {
        if settings.fixed_count || progress.progress + 1 >= settings.threshold_fallback_sessions {
            progress.n -= 1;
            progress.progress = 0;
            outcome.fell_back = true;
        } else {
            progress.progress += 1;
        }
    }

    if outcome.advanced || outcome.fell_back {
        info!(n = progress.n, advanced = outcome.advanced, "level changed");
    }
    outcome
}
