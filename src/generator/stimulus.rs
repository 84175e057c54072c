use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::channel::{Channel, ChannelSet, Slot};
use crate::history::SessionHistory;

/// Number of cells a position stimulus can occupy (the centre is reserved).
pub const GRID_CELLS: u8 = 8;

/// Values presented on one trial, one per slot, plus the arithmetic operand.
///
/// Every slot is populated on every trial whether or not its channel is
/// active; inactive slots are neutralised by [`apply_static_defaults`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stimuli {
    pub positions: [u8; 4],
    pub multi_vis: [u8; 4],
    pub color: u8,
    pub vis: u8,
    pub audio: u8,
    pub audio2: u8,
    pub number: i32,
}

impl Stimuli {
    pub fn get(&self, slot: Slot) -> u8 {
        match slot {
            Slot::Position(i) => slot_index(i).map_or(0, |i| self.positions[i]),
            Slot::MultiVis(i) => slot_index(i).map_or(0, |i| self.multi_vis[i]),
            Slot::Color => self.color,
            Slot::Vis => self.vis,
            Slot::Audio => self.audio,
            Slot::Audio2 => self.audio2,
        }
    }

    pub fn set(&mut self, slot: Slot, value: u8) {
        match slot {
            Slot::Position(i) => {
                if let Some(i) = slot_index(i) {
                    self.positions[i] = value;
                }
            }
            Slot::MultiVis(i) => {
                if let Some(i) = slot_index(i) {
                    self.multi_vis[i] = value;
                }
            }
            Slot::Color => self.color = value,
            Slot::Vis => self.vis = value,
            Slot::Audio => self.audio = value,
            Slot::Audio2 => self.audio2 = value,
        }
    }

    /// Value a channel presents on this trial.
    pub fn value(&self, channel: Channel) -> Option<u8> {
        channel.current_slot().map(|slot| self.get(slot))
    }
}

fn slot_index(i: usize) -> Option<usize> {
    (1..=4).contains(&i).then(|| i - 1)
}

/// Draw a fresh trial. Positions are sampled without replacement so no two
/// simultaneous squares share a cell; everything else is an independent
/// uniform draw in `1..=8`.
pub fn generate_base_stimuli<R: Rng + ?Sized>(rng: &mut R) -> Stimuli {
    let mut cells: Vec<u8> = (1..=GRID_CELLS).collect();
    let (picked, _) = cells.partial_shuffle(rng, 4);

    let mut stimuli = Stimuli::default();
    for (i, cell) in picked.iter().enumerate() {
        stimuli.positions[i] = *cell;
        stimuli.multi_vis[i] = rng.gen_range(1..=8);
    }
    stimuli.color = rng.gen_range(1..=8);
    stimuli.vis = rng.gen_range(1..=8);
    stimuli.audio = rng.gen_range(1..=8);
    stimuli.audio2 = rng.gen_range(1..=8);
    stimuli
}

/// Probabilities controlling how often matches and lures are forced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchChances {
    pub guaranteed_match: f64,
    pub interference: f64,
}

/// Force n-back matches and n±1 lures into `stimuli` for trial
/// `trial_number` (1-based). `history` holds every earlier trial.
#[allow(clippy::too_many_arguments)]
pub fn apply_nback_matching<R: Rng + ?Sized>(
    stimuli: &mut Stimuli,
    history: &SessionHistory,
    trial_number: usize,
    n: usize,
    channels: &ChannelSet,
    chances: MatchChances,
    multi: usize,
    rng: &mut R,
) {
    if trial_number <= n {
        return;
    }
    let multi = multi.min(stimuli.positions.len());

    let mut positions = stimuli.positions;

    for channel in channels.iter() {
        let (Some(current), Some(back_slot)) = (channel.current_slot(), channel.nback_slot())
        else {
            continue;
        };

        let r1: f64 = rng.gen();
        let mut r2: f64 = rng.gen();
        if multi > 1 {
            r2 *= 1.5;
        }

        let back = if r1 < chances.guaranteed_match {
            Some(n)
        } else if r2 < chances.interference && n > 1 {
            let lure = interference_offset(history, back_slot, trial_number, n, rng);
            if let Some(back) = lure {
                debug!(%channel, back, trial_number, "forcing interference");
            }
            lure
        } else {
            None
        };

        let Some(back) = back else {
            continue;
        };
        let Some(matching) = history.nback_value(back_slot, trial_number, back) else {
            continue;
        };

        if multi > 1 {
            if let Some(k) = channel.position_index() {
                let conflict = (1..=multi)
                    .filter(|i| *i != k)
                    .find(|i| positions[i - 1] == matching);
                if let Some(i) = conflict {
                    let displaced = stimuli.get(current);
                    debug!(
                        from = positions[i - 1],
                        to = displaced,
                        "moving position{} to avoid collision",
                        i
                    );
                    stimuli.positions[i - 1] = displaced;
                    positions[i - 1] = displaced;
                }
                positions[k - 1] = matching;
            }
        }

        debug!(%channel, value = matching, back, "forcing match");
        stimuli.set(current, matching);
    }

    if multi > 1 && rng.gen::<f64>() < chances.interference / 3.0 {
        apply_reversal(stimuli, history, trial_number, n, channels, multi, rng);
    }
}

/// Pick an offset among `n-1`, `n+1`, `2n` whose historical value differs
/// from the true n-back value, so copying it produces a plausible lure.
fn interference_offset<R: Rng + ?Sized>(
    history: &SessionHistory,
    slot: Slot,
    trial_number: usize,
    n: usize,
    rng: &mut R,
) -> Option<usize> {
    let target = history.nback_value(slot, trial_number, n)?;
    let mut candidates: Vec<usize> = if n < 3 {
        vec![n + 1, 2 * n]
    } else {
        vec![n - 1, n + 1, 2 * n]
    };
    candidates.shuffle(rng);

    candidates.into_iter().find(|back| {
        history
            .nback_value(slot, trial_number, *back)
            .is_some_and(|value| value != target)
    })
}

/// Rotate the n-back trial's positions (or multi-stimulus visuals) among the
/// simultaneous slots, so the right values appear in the wrong places.
fn apply_reversal<R: Rng + ?Sized>(
    stimuli: &mut Stimuli,
    history: &SessionHistory,
    trial_number: usize,
    n: usize,
    channels: &ChannelSet,
    multi: usize,
    rng: &mut R,
) {
    let use_vis = channels.contains(Channel::Vis1) && rng.gen::<f64>() < 0.5;
    let slot = |i: usize| {
        if use_vis {
            Slot::MultiVis(i)
        } else {
            Slot::Position(i)
        }
    };
    let offset = rng.gen_range(1..multi);

    let rotated: Option<Vec<u8>> = (0..multi)
        .map(|i| history.nback_value(slot((i + offset) % multi + 1), trial_number, n))
        .collect();
    let Some(rotated) = rotated else {
        return;
    };

    debug!(use_vis, offset, trial_number, "applying multi-stimulus reversal");
    for (i, value) in rotated.into_iter().enumerate() {
        stimuli.set(slot(i + 1), value);
    }
}

/// Neutralise slots whose channels are inactive so renderers can show a
/// centred square, a plain shape and a fixed colour.
pub fn apply_static_defaults(stimuli: &mut Stimuli, channels: &ChannelSet, default_color: u8) {
    if !channels.contains(Channel::Color) {
        stimuli.color = default_color;
    }
    if !channels.contains(Channel::Position1) {
        stimuli.positions[0] = 0;
    }
    if !channels.contains_any(&[
        Channel::VisVis,
        Channel::VisAudio,
        Channel::AudioVis,
        Channel::Arithmetic,
        Channel::Image,
    ]) {
        stimuli.vis = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::TrialRecord;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn history_of(rows: &[Stimuli]) -> SessionHistory {
        let mut history = SessionHistory::default();
        for s in rows {
            history.push(TrialRecord::new(*s));
        }
        history
    }

    fn dual() -> ChannelSet {
        ChannelSet::new([Channel::Position1, Channel::Audio])
    }

    #[test]
    fn base_positions_are_distinct() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let s = generate_base_stimuli(&mut rng);
            let unique: HashSet<u8> = s.positions.iter().copied().collect();
            assert_eq!(unique.len(), 4);
            assert!(s.positions.iter().all(|p| (1..=8).contains(p)));
            assert!((1..=8).contains(&s.audio));
            assert!((1..=8).contains(&s.color));
        }
    }

    #[test]
    fn no_matching_during_warm_up() {
        let mut rng = StdRng::seed_from_u64(1);
        let base = generate_base_stimuli(&mut rng);
        let history = history_of(&[generate_base_stimuli(&mut rng)]);
        let mut s = base;
        let chances = MatchChances {
            guaranteed_match: 1.0,
            interference: 1.0,
        };
        apply_nback_matching(&mut s, &history, 2, 2, &dual(), chances, 1, &mut rng);
        assert_eq!(s, base);
    }

    #[test]
    fn guaranteed_match_copies_nback_value() {
        let mut rng = StdRng::seed_from_u64(3);
        let rows: Vec<Stimuli> = (0..4).map(|_| generate_base_stimuli(&mut rng)).collect();
        let history = history_of(&rows);
        let mut s = generate_base_stimuli(&mut rng);
        let chances = MatchChances {
            guaranteed_match: 1.0,
            interference: 0.0,
        };
        apply_nback_matching(&mut s, &history, 5, 2, &dual(), chances, 1, &mut rng);
        assert_eq!(s.positions[0], rows[2].positions[0]);
        assert_eq!(s.audio, rows[2].audio);
    }

    #[test]
    fn combination_match_crosses_slots() {
        let mut rng = StdRng::seed_from_u64(11);
        let rows: Vec<Stimuli> = (0..3).map(|_| generate_base_stimuli(&mut rng)).collect();
        let history = history_of(&rows);
        let mut s = generate_base_stimuli(&mut rng);
        let chances = MatchChances {
            guaranteed_match: 1.0,
            interference: 0.0,
        };
        let channels = ChannelSet::new([Channel::VisAudio]);
        apply_nback_matching(&mut s, &history, 4, 1, &channels, chances, 1, &mut rng);
        assert_eq!(s.vis, rows[2].audio);
    }

    #[test]
    fn interference_produces_lure_not_match() {
        let mut rng = StdRng::seed_from_u64(5);
        // Audio history with distinct values so every offset is a valid lure.
        let rows: Vec<Stimuli> = (1..=6)
            .map(|v| Stimuli {
                audio: v,
                ..Stimuli::default()
            })
            .collect();
        let history = history_of(&rows);
        let channels = ChannelSet::new([Channel::Audio]);
        let chances = MatchChances {
            guaranteed_match: 0.0,
            interference: 1.0,
        };
        for _ in 0..50 {
            let mut s = Stimuli {
                audio: 8,
                ..Stimuli::default()
            };
            apply_nback_matching(&mut s, &history, 7, 3, &channels, chances, 1, &mut rng);
            // trial 7, n=3 → true n-back is trial 4 (audio 4); lures are 3-back±1 or 6-back
            assert_ne!(s.audio, 4);
            assert!([5, 3, 1].contains(&s.audio), "unexpected lure {}", s.audio);
        }
    }

    #[test]
    fn interference_skipped_for_one_back() {
        let mut rng = StdRng::seed_from_u64(9);
        let rows: Vec<Stimuli> = (1..=4)
            .map(|v| Stimuli {
                audio: v,
                ..Stimuli::default()
            })
            .collect();
        let history = history_of(&rows);
        let channels = ChannelSet::new([Channel::Audio]);
        let chances = MatchChances {
            guaranteed_match: 0.0,
            interference: 1.0,
        };
        let mut s = Stimuli {
            audio: 8,
            ..Stimuli::default()
        };
        apply_nback_matching(&mut s, &history, 5, 1, &channels, chances, 1, &mut rng);
        assert_eq!(s.audio, 8);
    }

    #[test]
    fn forced_positions_never_collide_in_multi_mode() {
        let mut rng = StdRng::seed_from_u64(21);
        let channels = ChannelSet::new([
            Channel::Position1,
            Channel::Position2,
            Channel::Position3,
            Channel::Audio,
        ]);
        let chances = MatchChances {
            guaranteed_match: 0.5,
            interference: 0.5,
        };
        let mut history = SessionHistory::default();
        for trial in 1..=200 {
            let mut s = generate_base_stimuli(&mut rng);
            apply_nback_matching(&mut s, &history, trial, 2, &channels, chances, 3, &mut rng);
            let shown: HashSet<u8> = s.positions[..3].iter().copied().collect();
            assert_eq!(shown.len(), 3, "collision on trial {trial}: {:?}", s.positions);
            history.push(TrialRecord::new(s));
        }
    }

    #[test]
    fn oversized_multi_is_clamped_to_four_slots() {
        let mut rng = StdRng::seed_from_u64(13);
        let channels = ChannelSet::new([Channel::Position1, Channel::Position4, Channel::Audio]);
        let chances = MatchChances {
            guaranteed_match: 1.0,
            interference: 1.0,
        };
        let mut history = SessionHistory::default();
        for trial in 1..=30 {
            let mut s = generate_base_stimuli(&mut rng);
            apply_nback_matching(&mut s, &history, trial, 2, &channels, chances, 6, &mut rng);
            let shown: HashSet<u8> = s.positions.iter().copied().collect();
            assert_eq!(shown.len(), 4, "collision on trial {trial}: {:?}", s.positions);
            history.push(TrialRecord::new(s));
        }
    }

    /// Every call reverses: n = 1 disables lures and interference / 3 >= 1.
    fn always_reverse() -> MatchChances {
        MatchChances {
            guaranteed_match: 0.0,
            interference: 3.0,
        }
    }

    fn reversal_history() -> SessionHistory {
        history_of(&[Stimuli {
            positions: [1, 2, 3, 4],
            multi_vis: [5, 6, 7, 8],
            ..Stimuli::default()
        }])
    }

    fn current_trial() -> Stimuli {
        Stimuli {
            positions: [8, 7, 6, 5],
            multi_vis: [4, 3, 2, 1],
            ..Stimuli::default()
        }
    }

    #[test]
    fn reversal_rotates_nback_positions() {
        let mut rng = StdRng::seed_from_u64(17);
        let history = reversal_history();
        let channels = ChannelSet::new([
            Channel::Position1,
            Channel::Position2,
            Channel::Position3,
            Channel::Audio,
        ]);
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let mut s = current_trial();
            apply_nback_matching(&mut s, &history, 2, 1, &channels, always_reverse(), 3, &mut rng);
            let shown = [s.positions[0], s.positions[1], s.positions[2]];
            assert!(
                shown == [2, 3, 1] || shown == [3, 1, 2],
                "not a rotation of [1, 2, 3]: {shown:?}"
            );
            assert_eq!(s.positions[3], 5);
            assert_eq!(s.multi_vis, current_trial().multi_vis);
            seen.insert(shown);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn reversal_rotates_visuals_only_when_vis1_is_active() {
        let mut rng = StdRng::seed_from_u64(19);
        let history = reversal_history();
        let channels = ChannelSet::new([
            Channel::Position1,
            Channel::Position2,
            Channel::Vis1,
            Channel::Vis2,
        ]);
        let (mut rotated_positions, mut rotated_visuals) = (0, 0);
        for _ in 0..100 {
            let mut s = current_trial();
            apply_nback_matching(&mut s, &history, 2, 1, &channels, always_reverse(), 2, &mut rng);
            let positions = [s.positions[0], s.positions[1]];
            let visuals = [s.multi_vis[0], s.multi_vis[1]];
            if positions == [2, 1] {
                assert_eq!(visuals, [4, 3]);
                rotated_positions += 1;
            } else {
                assert_eq!(positions, [8, 7]);
                assert_eq!(visuals, [6, 5]);
                rotated_visuals += 1;
            }
            assert_ne!(s.positions[0], s.positions[1]);
        }
        assert!(rotated_positions > 0);
        assert!(rotated_visuals > 0);
    }

    #[test]
    fn static_defaults_neutralise_inactive_slots() {
        let mut s = Stimuli {
            positions: [3, 4, 5, 6],
            color: 7,
            vis: 2,
            audio: 5,
            ..Stimuli::default()
        };
        apply_static_defaults(&mut s, &ChannelSet::new([Channel::Audio]), 1);
        assert_eq!(s.positions[0], 0);
        assert_eq!(s.color, 1);
        assert_eq!(s.vis, 0);
        assert_eq!(s.audio, 5);
    }

    #[test]
    fn static_defaults_keep_active_slots() {
        let mut s = Stimuli {
            positions: [3, 4, 5, 6],
            color: 7,
            vis: 2,
            ..Stimuli::default()
        };
        let channels = ChannelSet::new([Channel::Position1, Channel::Color, Channel::VisVis]);
        apply_static_defaults(&mut s, &channels, 1);
        assert_eq!(s.positions[0], 3);
        assert_eq!(s.color, 7);
        assert_eq!(s.vis, 2);
    }
}
