use rand::Rng;
use tracing::{debug, warn};

use crate::error::GenerationError;

/// Matches each channel must contain in the fixed-count protocol.
pub const FIXED_COUNT_MATCHES: usize = 6;
/// Trials on which both channels match at once.
pub const FIXED_COUNT_SIMULTANEOUS: usize = 2;
/// Upper bound on sequence draws before giving up.
pub const MAX_SEQUENCE_ATTEMPTS: usize = 1_000_000;

/// Precomputed position and audio values for a whole fixed-count session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedCountSequence {
    pub position: Vec<u8>,
    pub audio: Vec<u8>,
}

impl FixedCountSequence {
    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// Values for 1-based `trial_number`.
    pub fn trial(&self, trial_number: usize) -> Option<(u8, u8)> {
        let index = trial_number.checked_sub(1)?;
        Some((*self.position.get(index)?, *self.audio.get(index)?))
    }
}

/// Count post-warm-up entries equal to the entry `n` before them.
pub fn count_matches(sequence: &[u8], n: usize) -> usize {
    (n..sequence.len())
        .filter(|&i| sequence[i] == sequence[i - n])
        .count()
}

fn count_simultaneous(a: &[u8], b: &[u8], n: usize) -> usize {
    (n..a.len().min(b.len()))
        .filter(|&i| a[i] == a[i - n] && b[i] == b[i - n])
        .count()
}

fn regenerate_tail<R: Rng + ?Sized>(sequence: &mut [u8], n: usize, rng: &mut R) {
    for value in sequence.iter_mut().skip(n) {
        *value = rng.gen_range(1..=8);
    }
}

/// Generate the research protocol's sequences: exactly six n-back matches
/// per channel and exactly two simultaneous matches.
pub fn compute_fixed_count_sequence<R: Rng + ?Sized>(
    n: usize,
    total_trials: usize,
    rng: &mut R,
) -> Result<FixedCountSequence, GenerationError> {
    compute_fixed_count_sequence_bounded(n, total_trials, MAX_SEQUENCE_ATTEMPTS, rng)
}

/// As [`compute_fixed_count_sequence`] with an explicit draw budget.
pub fn compute_fixed_count_sequence_bounded<R: Rng + ?Sized>(
    n: usize,
    total_trials: usize,
    max_attempts: usize,
    rng: &mut R,
) -> Result<FixedCountSequence, GenerationError> {
    let failed = |attempts| GenerationError::SequenceGenerationFailed {
        n,
        total_trials,
        attempts,
    };

    if n == 0 || total_trials < n + FIXED_COUNT_MATCHES {
        return Err(failed(0));
    }

    let mut position = vec![0u8; total_trials];
    let mut audio = vec![0u8; total_trials];
    for i in 0..n {
        position[i] = rng.gen_range(1..=8);
        audio[i] = rng.gen_range(1..=8);
    }

    let mut attempts = 0;
    loop {
        loop {
            if attempts >= max_attempts {
                warn!(n, total_trials, attempts, "fixed-count sequence search exhausted");
                return Err(failed(attempts));
            }
            attempts += 1;
            regenerate_tail(&mut position, n, rng);
            if count_matches(&position, n) == FIXED_COUNT_MATCHES {
                break;
            }
        }
        loop {
            if attempts >= max_attempts {
                warn!(n, total_trials, attempts, "fixed-count sequence search exhausted");
                return Err(failed(attempts));
            }
            attempts += 1;
            regenerate_tail(&mut audio, n, rng);
            if count_matches(&audio, n) == FIXED_COUNT_MATCHES {
                break;
            }
        }
        if count_simultaneous(&position, &audio, n) == FIXED_COUNT_SIMULTANEOUS {
            debug!(n, total_trials, attempts, "fixed-count sequence found");
            return Ok(FixedCountSequence { position, audio });
        }
    }
}

/// Per-trial n-back levels for the `total_trials - n` scoreable trials.
///
/// Levels are `floor(B * n) + 1` with `B ~ Beta(n/2, 1)`, which leans toward
/// `n` as `n` grows. Beta(a, 1) is sampled by inversion as `U^(1/a)`.
pub fn compute_variable_n_sequence<R: Rng + ?Sized>(
    n: usize,
    total_trials: usize,
    rng: &mut R,
) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let alpha = n as f64 / 2.0;
    (0..total_trials.saturating_sub(n))
        .map(|_| {
            let u: f64 = rng.gen();
            let beta = u.powf(1.0 / alpha);
            ((beta * n as f64) as usize + 1).min(n)
        })
        .collect()
}
