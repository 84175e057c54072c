//! Tick-driven session state machine.
//!
//! A host calls [`Session::advance`] at a fixed cadence (nominally 10 Hz) and
//! forwards player input through [`Session::register_input`]. Each call returns
//! the [`SessionEvent`]s produced, which renderers, audio players and the
//! persistence layer consume. The session owns its configuration, the live
//! trial and the history; nothing outside it mutates them.
//!
//! Trial timeline, in ticks after the trial starts at tick 1:
//!
//! * `6 + extra positions` the stimulus is hidden,
//! * `ticks_per_trial - 2` feedback is shown and the tick wraps to 0,
//!   so the next advance starts the following trial.
//!
//! In self-paced mode the tick holds at `5..=ticks_per_trial - 6` until the
//! player responds or the host calls [`Session::release`].

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::channel::{Channel, ChannelSet, MultiStyle};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::generator::{
    apply_nback_matching, apply_static_defaults, choose_arithmetic_operation,
    compute_fixed_count_sequence, compute_variable_n_sequence, generate_arithmetic_operand,
    generate_base_stimuli, FixedCountSequence, Operation, Stimuli,
};
use crate::history::{SessionHistory, TrialRecord};
use crate::score::{calculate_session_score, classify_trial, Outcome, ScoreResult};

/// First tick of the self-paced hold window.
const HOLD_START: i32 = 5;
/// Tick at which the stimulus disappears when a single position is shown.
const HIDE_TICK: i32 = 6;
/// Ticks before the first trial with a single stimulus.
const LEAD_IN: i32 = 9;
/// Extra lead-in ticks per additional simultaneous stimulus.
const LEAD_IN_PER_STIMULUS: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Running,
    Paused,
    Ended,
}

/// Everything a session reports to its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A new trial began; render and play `stimuli`.
    TrialStarted {
        trial: usize,
        stimuli: Stimuli,
        operation: Operation,
        effective_n: usize,
    },
    /// Clear the visuals. The stimulus stays current for matching.
    StimulusHidden { trial: usize },
    /// Reveal how the player did on each channel this trial.
    Feedback {
        trial: usize,
        outcomes: Vec<(Channel, Outcome)>,
    },
    /// The session finished. `scores` is empty when cancelled.
    SessionEnded { cancelled: bool, scores: ScoreResult },
}

#[derive(Debug, Clone)]
struct LiveTrial {
    number: usize,
    effective_n: usize,
    started_at: f64,
    released: bool,
    record: TrialRecord,
}

pub struct Session<R: Rng> {
    config: SessionConfig,
    rng: R,
    state: SessionState,
    tick: i32,
    trial_number: usize,
    session_number: usize,
    clock: f64,
    show_missed: bool,
    history: SessionHistory,
    current: Option<LiveTrial>,
    fixed_sequence: Option<FixedCountSequence>,
    variable_levels: Vec<usize>,
    scores: Option<ScoreResult>,
}

impl<R: Rng> Session<R> {
    pub fn new(config: SessionConfig, rng: R) -> Self {
        Self {
            config,
            rng,
            state: SessionState::Idle,
            tick: 0,
            trial_number: 0,
            session_number: 0,
            clock: 0.0,
            show_missed: false,
            history: SessionHistory::default(),
            current: None,
            fixed_sequence: None,
            variable_levels: Vec::new(),
            scores: None,
        }
    }

    /// Continue numbering from an earlier day's sessions.
    pub fn with_session_number(mut self, session_number: usize) -> Self {
        self.session_number = session_number;
        self
    }

    /// Begin a session, precomputing protocol sequences first.
    ///
    /// On failure nothing changes: the state and session counter are as before.
    pub fn start(&mut self) -> Result<()> {
        if !matches!(self.state, SessionState::Idle | SessionState::Ended) {
            return Err(self.invalid("start"));
        }

        let n = self.config.n;
        let total = self.config.total_trials;
        let fixed_sequence = if self.config.fixed_count {
            Some(compute_fixed_count_sequence(n, total, &mut self.rng)?)
        } else {
            None
        };
        let variable_levels = if self.config.variable_n {
            compute_variable_n_sequence(n, total, &mut self.rng)
        } else {
            Vec::new()
        };

        self.fixed_sequence = fixed_sequence;
        self.variable_levels = variable_levels;
        self.tick = self.lead_in();
        self.trial_number = 0;
        self.clock = 0.0;
        self.show_missed = false;
        self.history = SessionHistory::default();
        self.current = None;
        self.scores = None;
        self.session_number += 1;
        self.state = SessionState::Running;

        info!(
            mode = %self.config.short_name(),
            total_trials = total,
            session = self.session_number,
            "session started"
        );
        Ok(())
    }

    fn lead_in(&self) -> i32 {
        let extra = LEAD_IN_PER_STIMULUS * (self.config.multi as i32 - 1);
        let extra = if self.config.multi_style == MultiStyle::Image {
            extra * 2
        } else {
            extra
        };
        -LEAD_IN - extra
    }

    /// Advance the clock by `dt` seconds and process one tick.
    pub fn advance(&mut self, dt: f64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.state != SessionState::Running {
            return events;
        }

        self.clock += dt;
        if self.is_holding() {
            return events;
        }
        self.tick += 1;

        let tpt = self.config.ticks_per_trial;
        if self.tick == 1 {
            self.begin_trial(&mut events);
            if self.state == SessionState::Ended {
                return events;
            }
        }

        if self.tick == HIDE_TICK + self.config.extra_position_channels() || self.tick == tpt - 1 {
            events.push(SessionEvent::StimulusHidden {
                trial: self.trial_number,
            });
        }

        if self.tick == tpt - 2 {
            self.tick = 0;
            self.show_missed = true;
            events.push(SessionEvent::Feedback {
                trial: self.trial_number,
                outcomes: self.current_outcomes(),
            });
        }

        if self.tick == tpt {
            self.tick = 0;
        }

        events
    }

    /// Whether a self-paced session is waiting for the player.
    pub fn is_holding(&self) -> bool {
        self.config.self_paced
            && (HOLD_START..=self.config.ticks_per_trial - 6).contains(&self.tick)
            && self.current.as_ref().is_some_and(|t| !t.released)
    }

    /// Let a held self-paced trial run on without input.
    pub fn release(&mut self) {
        if let Some(trial) = self.current.as_mut() {
            trial.released = true;
        }
    }

    fn begin_trial(&mut self, events: &mut Vec<SessionEvent>) {
        self.show_missed = false;
        if let Some(previous) = self.current.take() {
            self.history.push(previous.record);
        }

        self.trial_number += 1;
        if self.trial_number > self.config.total_trials {
            events.push(self.finish(false));
            return;
        }

        let trial = self.trial_number;
        let effective_n = self.effective_n(trial);
        let (stimuli, operation) = self.generate(trial, effective_n);
        debug!(trial, effective_n, ?stimuli, %operation, "trial started");

        self.current = Some(LiveTrial {
            number: trial,
            effective_n,
            started_at: self.clock,
            released: false,
            record: TrialRecord::new(stimuli).with_operation(operation),
        });
        events.push(SessionEvent::TrialStarted {
            trial,
            stimuli,
            operation,
            effective_n,
        });
    }

    /// N-back level used to generate trial `trial`.
    pub fn effective_n(&self, trial: usize) -> usize {
        let n = self.config.n;
        if self.config.crab {
            1 + 2 * (trial.saturating_sub(1) % n)
        } else {
            trial
                .checked_sub(n + 1)
                .and_then(|i| self.variable_levels.get(i))
                .copied()
                .unwrap_or(n)
        }
    }

    fn generate(&mut self, trial: usize, effective_n: usize) -> (Stimuli, Operation) {
        let config = &self.config;
        let rng = &mut self.rng;

        let mut stimuli = generate_base_stimuli(rng);
        let operation = choose_arithmetic_operation(&config.operations, rng);

        let previous_result = if operation == Operation::Divide
            && config.channels.contains(Channel::Arithmetic)
            && trial > config.n
        {
            self.history.nback_number(trial, config.n)
        } else {
            None
        };
        stimuli.number = generate_arithmetic_operand(
            operation,
            config.arithmetic_min,
            config.arithmetic_max,
            &config.acceptable_decimals,
            previous_result,
            rng,
        );

        let mut matching: ChannelSet = config.channels.clone();
        if let Some((position, audio)) = self
            .fixed_sequence
            .as_ref()
            .and_then(|sequence| sequence.trial(trial))
        {
            let displaced = stimuli.positions[0];
            if let Some(i) = (1..4).find(|i| stimuli.positions[*i] == position) {
                stimuli.positions[i] = displaced;
            }
            stimuli.positions[0] = position;
            stimuli.audio = audio;
            matching = matching
                .iter()
                .filter(|c| !matches!(c, Channel::Position1 | Channel::Audio))
                .collect();
        }

        if !config.channels.is_arithmetic_only() {
            apply_nback_matching(
                &mut stimuli,
                &self.history,
                trial,
                effective_n,
                &matching,
                config.chances,
                config.multi,
                rng,
            );
        }
        apply_static_defaults(&mut stimuli, &config.channels, config.default_color);

        (stimuli, operation)
    }

    fn current_outcomes(&self) -> Vec<(Channel, Outcome)> {
        match &self.current {
            Some(trial) => classify_trial(
                &trial.record,
                &self.history,
                trial.number,
                self.config.n,
                &self.config.channels,
            ),
            None => Vec::new(),
        }
    }

    /// Record a press on `channel` at the session clock.
    pub fn register_input(&mut self, channel: Channel) -> Result<()> {
        self.register_input_at(channel, self.clock)
    }

    /// Record a press on `channel` at `timestamp` seconds of session time.
    /// Only the first press in a trial sets the reaction time.
    pub fn register_input_at(&mut self, channel: Channel, timestamp: f64) -> Result<()> {
        if self.state != SessionState::Running {
            return Err(self.invalid("register input"));
        }
        if !self.config.channels.contains(channel) || channel == Channel::Arithmetic {
            return Err(SessionError::InactiveChannel(channel));
        }
        if let Some(trial) = self.current.as_mut() {
            let reaction_time = timestamp - trial.started_at;
            trial.record.responses.entry(channel).or_insert(reaction_time);
            trial.released = true;
            debug!(%channel, reaction_time, trial = trial.number, "input");
        }
        Ok(())
    }

    /// Record the player's answer to the current arithmetic problem.
    pub fn register_arithmetic_answer(&mut self, answer: f64) -> Result<()> {
        if self.state != SessionState::Running {
            return Err(self.invalid("register answer"));
        }
        if !self.config.channels.contains(Channel::Arithmetic) {
            return Err(SessionError::InactiveChannel(Channel::Arithmetic));
        }
        if let Some(trial) = self.current.as_mut() {
            trial.record.arithmetic_answer = Some(answer);
            trial.released = true;
        }
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.state != SessionState::Running {
            return Err(self.invalid("pause"));
        }
        self.state = SessionState::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.state != SessionState::Paused {
            return Err(self.invalid("resume"));
        }
        self.state = SessionState::Running;
        Ok(())
    }

    /// Stop the session. A cancelled session is not scored and does not
    /// count towards the session number.
    pub fn end(&mut self, cancelled: bool) -> Result<SessionEvent> {
        if !matches!(self.state, SessionState::Running | SessionState::Paused) {
            return Err(self.invalid("end"));
        }
        Ok(self.finish(cancelled))
    }

    fn finish(&mut self, cancelled: bool) -> SessionEvent {
        self.state = SessionState::Ended;
        self.current = None;

        let scores = if cancelled {
            self.session_number = self.session_number.saturating_sub(1);
            ScoreResult::empty()
        } else {
            calculate_session_score(
                &self.history,
                self.config.n,
                &self.config.channels,
                self.trial_number.saturating_sub(1),
            )
        };
        info!(
            cancelled,
            trials = self.history.len(),
            overall = scores.overall,
            "session ended"
        );
        self.scores = Some(scores.clone());
        SessionEvent::SessionEnded { cancelled, scores }
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    pub fn tick(&self) -> i32 {
        self.tick
    }

    pub fn trial_number(&self) -> usize {
        self.trial_number
    }

    pub fn session_number(&self) -> usize {
        self.session_number
    }

    /// Seconds of session time accumulated by `advance`.
    pub fn elapsed(&self) -> f64 {
        self.clock
    }

    pub fn show_missed(&self) -> bool {
        self.show_missed
    }

    pub fn current_stimuli(&self) -> Option<&Stimuli> {
        self.current.as_ref().map(|t| &t.record.stimuli)
    }

    pub fn current_effective_n(&self) -> Option<usize> {
        self.current.as_ref().map(|t| t.effective_n)
    }

    pub fn current_record(&self) -> Option<&TrialRecord> {
        self.current.as_ref().map(|t| &t.record)
    }

    pub fn scores(&self) -> Option<&ScoreResult> {
        self.scores.as_ref()
    }

    pub fn fixed_sequence(&self) -> Option<&FixedCountSequence> {
        self.fixed_sequence.as_ref()
    }

    pub fn variable_levels(&self) -> &[usize] {
        &self.variable_levels
    }

    /// Trials played in the finished session, for the journal.
    pub fn trials_completed(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{GameMode, Slot};
    use crate::config::Settings;
    use crate::error::GenerationError;
    use assert_matches::assert_matches;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const DT: f64 = 0.1;

    fn session_with(settings: Settings) -> Session<StdRng> {
        let config = SessionConfig::from_settings(&settings).unwrap();
        Session::new(config, StdRng::seed_from_u64(42))
    }

    fn dual() -> Session<StdRng> {
        session_with(Settings::default())
    }

    /// Advance until `pred` matches an event, returning that event.
    fn advance_until(
        session: &mut Session<StdRng>,
        pred: impl Fn(&SessionEvent) -> bool,
    ) -> SessionEvent {
        for _ in 0..10_000 {
            for event in session.advance(DT) {
                if pred(&event) {
                    return event;
                }
            }
        }
        panic!("event never emitted");
    }

    fn is_trial_start(event: &SessionEvent) -> bool {
        matches!(event, SessionEvent::TrialStarted { .. })
    }

    #[test]
    fn start_moves_to_running_with_lead_in() {
        let mut session = dual();
        assert_eq!(session.state(), SessionState::Idle);
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.tick(), -9);
        assert_eq!(session.trial_number(), 0);
        assert_eq!(session.session_number(), 1);
    }

    #[test]
    fn lead_in_scales_with_multi() {
        let mut session = session_with(Settings {
            multi: 3,
            ..Settings::default()
        });
        session.start().unwrap();
        assert_eq!(session.tick(), -19);

        let mut session = session_with(Settings {
            multi: 3,
            multi_style: MultiStyle::Image,
            ..Settings::default()
        });
        session.start().unwrap();
        assert_eq!(session.tick(), -29);
    }

    #[test]
    fn advance_is_noop_unless_running() {
        let mut session = dual();
        assert!(session.advance(DT).is_empty());
        assert_eq!(session.tick(), 0);

        session.start().unwrap();
        session.pause().unwrap();
        for _ in 0..50 {
            assert!(session.advance(DT).is_empty());
        }
        assert_eq!(session.tick(), -9);
        session.resume().unwrap();
        session.advance(DT);
        assert_eq!(session.tick(), -8);
    }

    #[test]
    fn first_trial_starts_after_lead_in() {
        let mut session = dual();
        session.start().unwrap();
        for _ in 0..9 {
            assert!(session.advance(DT).is_empty());
        }
        let events = session.advance(DT);
        assert_matches!(
            events.as_slice(),
            [SessionEvent::TrialStarted {
                trial: 1,
                effective_n: 2,
                ..
            }]
        );
        assert_eq!(session.tick(), 1);
    }

    #[test]
    fn trial_timeline() {
        let mut session = dual();
        session.start().unwrap();
        advance_until(&mut session, is_trial_start);

        // ticks 2..=5 are quiet, tick 6 hides
        for _ in 2..6 {
            assert!(session.advance(DT).is_empty());
        }
        assert_eq!(
            session.advance(DT),
            vec![SessionEvent::StimulusHidden { trial: 1 }]
        );

        // feedback at ticks_per_trial - 2 wraps the tick
        for _ in 7..28 {
            assert!(session.advance(DT).is_empty());
        }
        let events = session.advance(DT);
        assert_matches!(events.as_slice(), [SessionEvent::Feedback { trial: 1, .. }]);
        assert_eq!(session.tick(), 0);
        assert!(session.show_missed());

        assert_matches!(
            session.advance(DT).as_slice(),
            [SessionEvent::TrialStarted { trial: 2, .. }]
        );
        assert!(!session.show_missed());
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn hide_is_delayed_by_extra_positions() {
        let mut session = session_with(Settings {
            multi: 3,
            ..Settings::default()
        });
        session.start().unwrap();
        advance_until(&mut session, is_trial_start);
        for _ in 2..8 {
            assert!(session.advance(DT).is_empty());
        }
        assert_eq!(
            session.advance(DT),
            vec![SessionEvent::StimulusHidden { trial: 1 }]
        );
    }

    #[test]
    fn full_session_runs_to_completion() {
        let mut session = dual();
        session.start().unwrap();
        let mut started = 0;
        let mut ended = None;
        for _ in 0..10_000 {
            for event in session.advance(DT) {
                match event {
                    SessionEvent::TrialStarted { .. } => started += 1,
                    SessionEvent::SessionEnded { cancelled, scores } => {
                        ended = Some((cancelled, scores))
                    }
                    _ => {}
                }
            }
            if session.state() == SessionState::Ended {
                break;
            }
        }
        let (cancelled, scores) = ended.unwrap();
        assert!(!cancelled);
        assert_eq!(started, 24);
        assert_eq!(session.history().len(), 24);
        assert_eq!(session.trials_completed(), 24);
        assert_eq!(session.trial_number(), 25);
        assert_eq!(scores.channels.len(), 2);
        // nothing pressed, so no hits and no false alarms
        let audio = scores.get(Channel::Audio).unwrap();
        assert_eq!(audio.scoreable(), 22);
        assert_eq!(audio.hits + audio.false_alarms, 0);
        assert_eq!(session.scores(), Some(&scores));
        assert!(session.advance(DT).is_empty());
    }

    #[test]
    fn guaranteed_match_copies_nback_trial() {
        let mut session = session_with(Settings {
            chance_of_guaranteed_match: 1.0,
            ..Settings::default()
        });
        session.start().unwrap();
        advance_until(&mut session, is_trial_start);
        advance_until(&mut session, is_trial_start);
        let third = advance_until(&mut session, is_trial_start);
        let SessionEvent::TrialStarted { stimuli, .. } = third else {
            unreachable!()
        };
        let first = session.history().get(0).unwrap().stimuli;
        assert_eq!(stimuli.audio, first.audio);
        assert_eq!(stimuli.positions[0], first.positions[0]);
    }

    #[test]
    fn reaction_time_is_first_press() {
        let mut session = dual();
        session.start().unwrap();
        advance_until(&mut session, is_trial_start);
        let start = session.elapsed();

        session.register_input_at(Channel::Audio, start + 0.3).unwrap();
        session.register_input_at(Channel::Audio, start + 0.9).unwrap();
        let rt = session.current_record().unwrap().reaction_time(Channel::Audio);
        assert!((rt.unwrap() - 0.3).abs() < 1e-9);

        advance_until(&mut session, is_trial_start);
        let rts = session.history().reaction_times(Channel::Audio);
        assert!((rts[0] - 0.3).abs() < 1e-9);
        assert_eq!(session.history().inputs(Channel::Position1), vec![false]);
    }

    #[test]
    fn input_validation() {
        let mut session = dual();
        assert_matches!(
            session.register_input(Channel::Audio),
            Err(SessionError::InvalidState {
                state: SessionState::Idle,
                ..
            })
        );
        session.start().unwrap();
        assert_matches!(
            session.register_input(Channel::Color),
            Err(SessionError::InactiveChannel(Channel::Color))
        );
        assert_matches!(
            session.register_arithmetic_answer(3.0),
            Err(SessionError::InactiveChannel(Channel::Arithmetic))
        );
        // during the lead-in there is no trial to record against
        assert!(session.register_input(Channel::Audio).is_ok());

        session.pause().unwrap();
        assert_matches!(
            session.register_input(Channel::Audio),
            Err(SessionError::InvalidState {
                state: SessionState::Paused,
                ..
            })
        );
        assert_matches!(session.pause(), Err(SessionError::InvalidState { .. }));
    }

    #[test]
    fn cancel_restores_session_number() {
        let mut session = dual().with_session_number(7);
        session.start().unwrap();
        assert_eq!(session.session_number(), 8);
        for _ in 0..5 {
            advance_until(&mut session, is_trial_start);
        }
        let event = session.end(true).unwrap();
        assert_eq!(
            event,
            SessionEvent::SessionEnded {
                cancelled: true,
                scores: ScoreResult::empty()
            }
        );
        assert_eq!(session.session_number(), 7);
        assert_eq!(session.state(), SessionState::Ended);
        assert!(session.advance(DT).is_empty());
        assert_matches!(session.end(true), Err(SessionError::InvalidState { .. }));
    }

    #[test]
    fn early_end_scores_completed_trials_only() {
        let mut session = dual();
        session.start().unwrap();
        for _ in 0..6 {
            advance_until(&mut session, is_trial_start);
        }
        let SessionEvent::SessionEnded { cancelled, scores } = session.end(false).unwrap() else {
            panic!("expected session end");
        };
        assert!(!cancelled);
        assert_eq!(session.history().len(), 5);
        assert_eq!(scores.get(Channel::Audio).unwrap().scoreable(), 3);
        assert_eq!(session.session_number(), 1);
    }

    #[test]
    fn self_paced_holds_until_input() {
        let mut session = session_with(Settings {
            self_paced: true,
            ..Settings::default()
        });
        session.start().unwrap();
        advance_until(&mut session, is_trial_start);
        for _ in 0..4 {
            session.advance(DT);
        }
        assert_eq!(session.tick(), 5);
        assert!(session.is_holding());
        for _ in 0..100 {
            assert!(session.advance(DT).is_empty());
        }
        assert_eq!(session.tick(), 5);

        session.register_input(Channel::Position1).unwrap();
        assert!(!session.is_holding());
        assert_eq!(
            session.advance(DT),
            vec![SessionEvent::StimulusHidden { trial: 1 }]
        );
        let rt = session
            .current_record()
            .unwrap()
            .reaction_time(Channel::Position1)
            .unwrap();
        assert!((rt - 10.4).abs() < 1e-6);
    }

    #[test]
    fn release_lifts_hold() {
        let mut session = session_with(Settings {
            self_paced: true,
            ..Settings::default()
        });
        session.start().unwrap();
        advance_until(&mut session, is_trial_start);
        for _ in 0..10 {
            session.advance(DT);
        }
        assert_eq!(session.tick(), 5);
        session.release();
        session.advance(DT);
        assert_eq!(session.tick(), 6);
    }

    #[test]
    fn hold_window_ends_six_ticks_before_trial_end() {
        let mut session = session_with(Settings {
            self_paced: true,
            ..Settings::default()
        });
        session.start().unwrap();
        advance_until(&mut session, is_trial_start);
        let last_held = session.config().ticks_per_trial - 6;

        let rearm = |session: &mut Session<StdRng>| {
            if let Some(trial) = session.current.as_mut() {
                trial.released = false;
            }
        };

        session.release();
        while session.tick() < last_held {
            session.advance(DT);
        }
        assert_eq!(session.tick(), last_held);
        rearm(&mut session);
        assert!(session.is_holding());
        for _ in 0..20 {
            session.advance(DT);
        }
        assert_eq!(session.tick(), last_held);

        session.release();
        session.advance(DT);
        assert_eq!(session.tick(), last_held + 1);
        rearm(&mut session);
        assert!(!session.is_holding());
        session.advance(DT);
        assert_eq!(session.tick(), last_held + 2);
        assert_eq!(session.trial_number(), 1);
    }

    #[test]
    fn fixed_count_uses_precomputed_sequence() {
        let mut session = session_with(Settings {
            fixed_count: true,
            ..Settings::default()
        });
        session.start().unwrap();
        while session.state() == SessionState::Running {
            session.advance(DT);
        }
        let sequence = session.fixed_sequence().unwrap();
        assert_eq!(sequence.len(), 24);
        assert_eq!(session.history().values(Slot::Position(1)), sequence.position);
        assert_eq!(session.history().values(Slot::Audio), sequence.audio);
    }

    #[test]
    fn failed_precomputation_leaves_session_idle() {
        let mut session = session_with(Settings {
            fixed_count: true,
            num_trials: 0,
            ..Settings::default()
        });
        assert_matches!(
            session.start(),
            Err(SessionError::Generation(
                GenerationError::SequenceGenerationFailed { .. }
            ))
        );
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.session_number(), 0);
    }

    #[test]
    fn crab_mode_cycles_levels() {
        let session = session_with(Settings {
            n: 3,
            crab: true,
            ..Settings::default()
        });
        let levels: Vec<usize> = (1..=6).map(|t| session.effective_n(t)).collect();
        assert_eq!(levels, vec![1, 3, 5, 1, 3, 5]);
    }

    #[test]
    fn variable_n_levels_come_from_precomputed_list() {
        let mut session = session_with(Settings {
            n: 3,
            variable_n: true,
            ..Settings::default()
        });
        session.start().unwrap();
        let levels = session.variable_levels().to_vec();
        assert_eq!(levels.len(), 29 - 3);
        assert_eq!(session.effective_n(2), 3);
        assert_eq!(session.effective_n(4), levels[0]);
        assert_eq!(session.effective_n(29), levels[25]);
    }

    #[test]
    fn arithmetic_answers_are_recorded() {
        let mut session = session_with(Settings {
            mode: GameMode::Arithmetic,
            ..Settings::default()
        });
        session.start().unwrap();
        advance_until(&mut session, is_trial_start);
        session.register_arithmetic_answer(1.0).unwrap();
        session.register_arithmetic_answer(4.5).unwrap();
        assert_eq!(session.current_record().unwrap().arithmetic_answer, Some(4.5));
        assert_matches!(
            session.register_input(Channel::Arithmetic),
            Err(SessionError::InactiveChannel(Channel::Arithmetic))
        );
    }

    #[test]
    fn feedback_reports_current_trial() {
        let mut session = session_with(Settings {
            n: 1,
            chance_of_guaranteed_match: 1.0,
            ..Settings::default()
        });
        session.start().unwrap();
        advance_until(&mut session, is_trial_start);
        advance_until(&mut session, is_trial_start);
        session.register_input(Channel::Audio).unwrap();
        let event = advance_until(&mut session, |e| {
            matches!(e, SessionEvent::Feedback { .. })
        });
        assert_eq!(
            event,
            SessionEvent::Feedback {
                trial: 2,
                outcomes: vec![
                    (Channel::Position1, Outcome::Miss),
                    (Channel::Audio, Outcome::Hit)
                ]
            }
        );
    }

    #[test]
    fn static_defaults_applied_for_inactive_channels() {
        let mut session = session_with(Settings {
            mode: GameMode::Sound,
            default_color: 3,
            ..Settings::default()
        });
        session.start().unwrap();
        let SessionEvent::TrialStarted { stimuli, .. } = advance_until(&mut session, is_trial_start)
        else {
            unreachable!()
        };
        assert_eq!(stimuli.positions[0], 0);
        assert_eq!(stimuli.color, 3);
        assert_eq!(stimuli.vis, 0);
    }
}
