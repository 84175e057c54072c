use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::channel::{Channel, ChannelSet};
use crate::generator::{Operation, Stimuli};
use crate::history::{SessionHistory, TrialRecord};
use crate::util::percent;

/// Absolute tolerance for division answers.
pub const DIVISION_TOLERANCE: f64 = 0.01;

/// Signal-detection outcome of one trial on one channel.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    Hit,
    Miss,
    FalseAlarm,
    CorrectRejection,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::Hit,
        Outcome::Miss,
        Outcome::FalseAlarm,
        Outcome::CorrectRejection,
    ];

    pub fn classify(is_match: bool, pressed: bool) -> Self {
        match (is_match, pressed) {
            (true, true) => Outcome::Hit,
            (true, false) => Outcome::Miss,
            (false, true) => Outcome::FalseAlarm,
            (false, false) => Outcome::CorrectRejection,
        }
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, Outcome::Hit | Outcome::CorrectRejection)
    }
}

/// Whether completed trial `trial_number` (1-based) matches `n` trials back
/// on `channel`. Warm-up trials and missing history never match.
pub fn is_match(history: &SessionHistory, channel: Channel, trial_number: usize, n: usize) -> bool {
    let Some(current) = trial_number
        .checked_sub(1)
        .and_then(|i| history.get(i))
    else {
        return false;
    };
    matches_nback(&current.stimuli, history, channel, trial_number, n)
}

/// Compare a trial's stimuli (which may not be in `history` yet) with the
/// value `n` trials back.
fn matches_nback(
    stimuli: &Stimuli,
    history: &SessionHistory,
    channel: Channel,
    trial_number: usize,
    n: usize,
) -> bool {
    if trial_number <= n {
        return false;
    }
    match (channel.current_slot(), channel.nback_slot()) {
        (Some(current), Some(back)) => history
            .nback_value(back, trial_number, n)
            .is_some_and(|value| value == stimuli.get(current)),
        _ => false,
    }
}

/// Check a numeric answer for `nback (operation) current`.
pub fn check_arithmetic_answer(
    operation: Operation,
    nback_number: i32,
    current_number: i32,
    answer: f64,
) -> bool {
    match operation.apply(nback_number, current_number) {
        Some(expected) if operation == Operation::Divide => {
            (answer - expected).abs() <= DIVISION_TOLERANCE
        }
        Some(expected) => answer == expected,
        None => false,
    }
}

fn arithmetic_correct(
    record: &TrialRecord,
    history: &SessionHistory,
    trial_number: usize,
    n: usize,
) -> bool {
    if trial_number <= n {
        return false;
    }
    match (history.nback_number(trial_number, n), record.arithmetic_answer) {
        (Some(nback), Some(answer)) => {
            check_arithmetic_answer(record.operation, nback, record.stimuli.number, answer)
        }
        _ => false,
    }
}

/// Tally for one channel across a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelScore {
    pub hits: usize,
    pub misses: usize,
    pub false_alarms: usize,
    pub correct_rejections: usize,
}

impl ChannelScore {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Hit => self.hits += 1,
            Outcome::Miss => self.misses += 1,
            Outcome::FalseAlarm => self.false_alarms += 1,
            Outcome::CorrectRejection => self.correct_rejections += 1,
        }
    }

    pub fn correct(&self) -> usize {
        self.hits + self.correct_rejections
    }

    pub fn scoreable(&self) -> usize {
        self.hits + self.misses + self.false_alarms + self.correct_rejections
    }

    /// Percentage correct; 0 when nothing was scoreable.
    pub fn percent(&self) -> f64 {
        percent(self.correct(), self.scoreable())
    }
}

/// Final session score. Immutable once produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub channels: BTreeMap<Channel, ChannelScore>,
    /// Pooled accuracy over every scoreable trial of every channel.
    pub overall: f64,
}

impl ScoreResult {
    /// Result of a cancelled session.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn percent(&self, channel: Channel) -> f64 {
        self.channels.get(&channel).map_or(0.0, ChannelScore::percent)
    }

    pub fn get(&self, channel: Channel) -> Option<&ChannelScore> {
        self.channels.get(&channel)
    }
}

/// Score one channel over the first `num_trials` trials.
pub fn calculate_channel_score(
    history: &SessionHistory,
    n: usize,
    channel: Channel,
    num_trials: usize,
) -> ChannelScore {
    let mut score = ChannelScore::default();
    let last = num_trials.min(history.len());

    for trial in (n + 1)..=last {
        let Some(record) = history.get(trial - 1) else {
            continue;
        };
        let outcome = match channel {
            Channel::Arithmetic => {
                if arithmetic_correct(record, history, trial, n) {
                    Outcome::Hit
                } else {
                    Outcome::Miss
                }
            }
            _ => Outcome::classify(
                is_match(history, channel, trial, n),
                record.pressed(channel),
            ),
        };
        score.record(outcome);
    }
    score
}

/// Score every active channel and pool them into an overall percentage.
pub fn calculate_session_score(
    history: &SessionHistory,
    n: usize,
    channels: &ChannelSet,
    num_trials: usize,
) -> ScoreResult {
    let scores: BTreeMap<Channel, ChannelScore> = channels
        .iter()
        .map(|channel| {
            (
                channel,
                calculate_channel_score(history, n, channel, num_trials),
            )
        })
        .collect();

    let (correct, scoreable) = scores
        .values()
        .fold((0, 0), |(c, s), score| (c + score.correct(), s + score.scoreable()));

    ScoreResult {
        channels: scores,
        overall: percent(correct, scoreable),
    }
}

/// Classify the live trial (not yet in `history`) for feedback.
pub fn classify_trial(
    current: &TrialRecord,
    history: &SessionHistory,
    trial_number: usize,
    n: usize,
    channels: &ChannelSet,
) -> Vec<(Channel, Outcome)> {
    if trial_number <= n {
        return Vec::new();
    }
    channels
        .iter()
        .map(|channel| {
            let outcome = match channel {
                Channel::Arithmetic => {
                    if arithmetic_correct(current, history, trial_number, n) {
                        Outcome::Hit
                    } else {
                        Outcome::Miss
                    }
                }
                _ => Outcome::classify(
                    matches_nback(&current.stimuli, history, channel, trial_number, n),
                    current.pressed(channel),
                ),
            };
            (channel, outcome)
        })
        .collect()
}
