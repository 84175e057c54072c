use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::channel::Channel;
use crate::error::Result;
use crate::score::ScoreResult;
use crate::session::{Session, SessionEvent, SessionState};

/// Nominal engine cadence.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Unified event type consumed by the session runner
#[derive(Clone, Debug, PartialEq)]
pub enum RunnerEvent {
    Input(Channel),
    Answer(f64),
    /// Let a held self-paced trial continue.
    Release,
    Pause,
    Resume,
    Cancel,
    Tick,
}

/// Source of player events (key presses, typed answers, pause requests)
pub trait InputSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<RunnerEvent, RecvTimeoutError>;
}

/// Input source fed by any thread holding the matching `Sender`
pub struct ChannelInputSource {
    rx: Receiver<RunnerEvent>,
}

impl ChannelInputSource {
    pub fn new(rx: Receiver<RunnerEvent>) -> Self {
        Self { rx }
    }

    /// A connected sender and source.
    pub fn pair() -> (Sender<RunnerEvent>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self::new(rx))
    }
}

impl InputSource for ChannelInputSource {
    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<RunnerEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    /// Wall-clock time to wait for input before ticking.
    fn interval(&self) -> Duration;

    /// Session time credited per tick.
    fn step(&self) -> Duration {
        self.interval()
    }
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
    step: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            step: interval,
        }
    }

    /// Ticks as fast as possible while crediting `step` of session time.
    pub fn simulated(step: Duration) -> Self {
        Self {
            interval: Duration::ZERO,
            step,
        }
    }
}

impl Default for FixedTicker {
    fn default() -> Self {
        Self::new(DEFAULT_TICK)
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }

    fn step(&self) -> Duration {
        self.step
    }
}

/// Runner that advances a session one event/tick at a time
pub struct Runner<S: InputSource, T: Ticker> {
    source: S,
    ticker: T,
}

impl<S: InputSource, T: Ticker> Runner<S, T> {
    pub fn new(source: S, ticker: T) -> Self {
        Self { source, ticker }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> RunnerEvent {
        match self.source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                RunnerEvent::Tick
            }
        }
    }

    /// Seconds of session time per tick.
    pub fn dt(&self) -> f64 {
        self.ticker.step().as_secs_f64()
    }
}

/// Receives every event a session emits.
pub trait EventSink {
    fn emit(&mut self, event: &SessionEvent);
}

impl EventSink for Vec<SessionEvent> {
    fn emit(&mut self, event: &SessionEvent) {
        self.push(event.clone());
    }
}

impl EventSink for Sender<SessionEvent> {
    fn emit(&mut self, event: &SessionEvent) {
        // subscriber may have hung up
        let _ = self.send(event.clone());
    }
}

/// Run `session` to its end, applying runner events and forwarding every
/// session event to `sink`. Starts the session if it is idle.
///
/// Returns the final scores, empty when the session was cancelled.
pub fn drive<R, S, T, K>(
    session: &mut Session<R>,
    runner: &Runner<S, T>,
    sink: &mut K,
) -> Result<ScoreResult>
where
    R: Rng,
    S: InputSource,
    T: Ticker,
    K: EventSink + ?Sized,
{
    if session.state() == SessionState::Idle {
        session.start()?;
    }

    while session.state() != SessionState::Ended {
        let outcome = match runner.step() {
            RunnerEvent::Tick => {
                for event in session.advance(runner.dt()) {
                    sink.emit(&event);
                }
                Ok(())
            }
            RunnerEvent::Input(channel) => session.register_input(channel),
            RunnerEvent::Answer(answer) => session.register_arithmetic_answer(answer),
            RunnerEvent::Release => {
                session.release();
                Ok(())
            }
            RunnerEvent::Pause => session.pause(),
            RunnerEvent::Resume => session.resume(),
            RunnerEvent::Cancel => {
                info!("session cancelled by host");
                session.end(true).map(|event| sink.emit(&event))
            }
        };
        if let Err(err) = outcome {
            warn!(%err, "ignored runner event");
        }
    }

    Ok(session.scores().cloned().unwrap_or_default())
}
