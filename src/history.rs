use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::channel::{Channel, Slot};
use crate::generator::{Operation, Stimuli};
use crate::util::{mean, std_dev};

/// Everything recorded about one completed trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub stimuli: Stimuli,
    pub operation: Operation,
    /// Channels the player pressed, with the first press's reaction time in seconds.
    pub responses: BTreeMap<Channel, f64>,
    pub arithmetic_answer: Option<f64>,
}

impl TrialRecord {
    pub fn new(stimuli: Stimuli) -> Self {
        Self {
            stimuli,
            operation: Operation::Add,
            responses: BTreeMap::new(),
            arithmetic_answer: None,
        }
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    pub fn with_response(mut self, channel: Channel, reaction_time: f64) -> Self {
        self.responses.insert(channel, reaction_time);
        self
    }

    pub fn with_answer(mut self, answer: f64) -> Self {
        self.arithmetic_answer = Some(answer);
        self
    }

    pub fn pressed(&self, channel: Channel) -> bool {
        self.responses.contains_key(&channel)
    }

    pub fn reaction_time(&self, channel: Channel) -> Option<f64> {
        self.responses.get(&channel).copied()
    }
}

/// Append-only log of completed trials. Index `i` holds trial `i + 1`.
///
/// Stored row-wise, so every per-channel sequence has the same length by
/// construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionHistory {
    records: Vec<TrialRecord>,
}

impl SessionHistory {
    pub fn push(&mut self, record: TrialRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TrialRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn value(&self, slot: Slot, index: usize) -> Option<u8> {
        self.records.get(index).map(|r| r.stimuli.get(slot))
    }

    /// Value of `slot` shown `back` trials before 1-based `trial_number`.
    /// `None` when that trial precedes the session or was never recorded.
    pub fn nback_value(&self, slot: Slot, trial_number: usize, back: usize) -> Option<u8> {
        let index = trial_number.checked_sub(back + 1)?;
        self.value(slot, index)
    }

    /// Arithmetic operand shown `back` trials before `trial_number`.
    pub fn nback_number(&self, trial_number: usize, back: usize) -> Option<i32> {
        let index = trial_number.checked_sub(back + 1)?;
        self.records.get(index).map(|r| r.stimuli.number)
    }

    /// The per-slot stimulus sequence across all completed trials.
    pub fn values(&self, slot: Slot) -> Vec<u8> {
        self.records.iter().map(|r| r.stimuli.get(slot)).collect()
    }

    pub fn inputs(&self, channel: Channel) -> Vec<bool> {
        self.records.iter().map(|r| r.pressed(channel)).collect()
    }

    /// Reaction times per trial, `0.0` where the channel was not pressed.
    pub fn reaction_times(&self, channel: Channel) -> Vec<f64> {
        self.records
            .iter()
            .map(|r| r.reaction_time(channel).unwrap_or(0.0))
            .collect()
    }

    /// Mean and standard deviation of the pressed trials' reaction times.
    pub fn reaction_time_stats(&self, channel: Channel) -> Option<(f64, f64)> {
        let pressed: Vec<f64> = self
            .records
            .iter()
            .filter_map(|r| r.reaction_time(channel))
            .collect();
        Some((mean(&pressed)?, std_dev(&pressed)?))
    }

    pub fn numbers(&self) -> Vec<i32> {
        self.records.iter().map(|r| r.stimuli.number).collect()
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.records.iter().map(|r| r.operation).collect()
    }
}
