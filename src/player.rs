//! Scripted stand-in for a human player.
//!
//! The player watches [`SessionEvent::TrialStarted`] events, keeps its own
//! log of what it has seen, and answers with configurable accuracy. It never
//! looks inside the session, so it exercises the same surface a real input
//! layer would.

use std::sync::mpsc::Sender;

use rand::Rng;

use crate::channel::{Channel, ChannelSet};
use crate::config::SessionConfig;
use crate::error::Result;
use crate::generator::{Operation, Stimuli};
use crate::history::{SessionHistory, TrialRecord};
use crate::runtime::{EventSink, RunnerEvent};
use crate::score::ScoreResult;
use crate::session::{Session, SessionEvent, SessionState};

/// How well the simulated player performs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerProfile {
    /// Chance of pressing when a channel matches.
    pub hit_rate: f64,
    /// Chance of pressing when it does not.
    pub false_alarm_rate: f64,
    /// Chance of typing the right arithmetic answer.
    pub arithmetic_accuracy: f64,
    /// Seconds between stimulus onset and the press.
    pub latency: f64,
}

impl PlayerProfile {
    pub fn with_accuracy(accuracy: f64) -> Self {
        let accuracy = accuracy.clamp(0.0, 1.0);
        Self {
            hit_rate: accuracy,
            false_alarm_rate: 1.0 - accuracy,
            arithmetic_accuracy: accuracy,
            latency: 0.45,
        }
    }
}

impl Default for PlayerProfile {
    fn default() -> Self {
        Self::with_accuracy(1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Response {
    Press { channel: Channel, latency: f64 },
    Answer(f64),
}

pub struct SimulatedPlayer<R: Rng> {
    profile: PlayerProfile,
    channels: ChannelSet,
    n: usize,
    seen: SessionHistory,
    rng: R,
}

impl<R: Rng> SimulatedPlayer<R> {
    pub fn new(config: &SessionConfig, profile: PlayerProfile, rng: R) -> Self {
        Self {
            profile,
            channels: config.channels.clone(),
            n: config.n,
            seen: SessionHistory::default(),
            rng,
        }
    }

    pub fn profile(&self) -> &PlayerProfile {
        &self.profile
    }

    /// React to one session event.
    pub fn respond(&mut self, event: &SessionEvent) -> Vec<Response> {
        let SessionEvent::TrialStarted {
            trial,
            stimuli,
            operation,
            ..
        } = event
        else {
            return Vec::new();
        };

        if *trial == 1 {
            self.seen = SessionHistory::default();
        }

        let channels = self.channels.clone();
        let mut responses = Vec::new();
        for channel in channels.iter() {
            let response = match channel {
                Channel::Arithmetic => self.answer(*trial, stimuli, *operation),
                _ => self.press(channel, *trial, stimuli),
            };
            responses.extend(response);
        }

        self.seen
            .push(TrialRecord::new(*stimuli).with_operation(*operation));
        responses
    }

    fn press(&mut self, channel: Channel, trial: usize, stimuli: &Stimuli) -> Option<Response> {
        let is_match = match (channel.current_slot(), channel.nback_slot()) {
            (Some(current), Some(back)) if trial > self.n => {
                self.seen.nback_value(back, trial, self.n) == Some(stimuli.get(current))
            }
            _ => false,
        };
        let chance = if is_match {
            self.profile.hit_rate
        } else {
            self.profile.false_alarm_rate
        };
        (self.rng.gen::<f64>() < chance).then_some(Response::Press {
            channel,
            latency: self.profile.latency,
        })
    }

    fn answer(&mut self, trial: usize, stimuli: &Stimuli, operation: Operation) -> Option<Response> {
        let nback = self.seen.nback_number(trial, self.n)?;
        let expected = operation.apply(nback, stimuli.number)?;
        if self.rng.gen::<f64>() < self.profile.arithmetic_accuracy {
            Some(Response::Answer(expected))
        } else {
            Some(Response::Answer(expected + 1.0))
        }
    }
}

/// Play `session` to the end with `player`, crediting `dt` seconds per tick.
/// Held self-paced trials are released once the player has responded.
pub fn play<R, P, K>(
    session: &mut Session<R>,
    player: &mut SimulatedPlayer<P>,
    dt: f64,
    sink: &mut K,
) -> Result<ScoreResult>
where
    R: Rng,
    P: Rng,
    K: EventSink + ?Sized,
{
    if session.state() == SessionState::Idle {
        session.start()?;
    }

    while session.state() == SessionState::Running {
        for event in session.advance(dt) {
            sink.emit(&event);
            for response in player.respond(&event) {
                match response {
                    Response::Press { channel, latency } => {
                        let at = session.elapsed() + latency;
                        session.register_input_at(channel, at)?;
                    }
                    Response::Answer(answer) => session.register_arithmetic_answer(answer)?,
                }
            }
        }
        if session.is_holding() {
            session.release();
        }
    }

    Ok(session.scores().cloned().unwrap_or_default())
}

/// Connects a [`SimulatedPlayer`] to a runtime runner: every response is
/// sent back as a [`RunnerEvent`] and lands on the next runner step.
pub struct RunnerResponder<R: Rng> {
    player: SimulatedPlayer<R>,
    tx: Sender<RunnerEvent>,
}

impl<R: Rng> RunnerResponder<R> {
    pub fn new(player: SimulatedPlayer<R>, tx: Sender<RunnerEvent>) -> Self {
        Self { player, tx }
    }
}

impl<R: Rng> EventSink for RunnerResponder<R> {
    fn emit(&mut self, event: &SessionEvent) {
        if !matches!(event, SessionEvent::TrialStarted { .. }) {
            return;
        }
        for response in self.player.respond(event) {
            let message = match response {
                Response::Press { channel, .. } => RunnerEvent::Input(channel),
                Response::Answer(answer) => RunnerEvent::Answer(answer),
            };
            let _ = self.tx.send(message);
        }
        let _ = self.tx.send(RunnerEvent::Release);
    }
}
