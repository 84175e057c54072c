use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One stimulus/response dimension the player scores on.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Channel {
    Position1,
    Position2,
    Position3,
    Position4,
    Vis1,
    Vis2,
    Vis3,
    Vis4,
    Color,
    Image,
    Audio,
    Audio2,
    VisVis,
    VisAudio,
    AudioVis,
    Arithmetic,
}

/// A stimulus value slot stored for every trial.
///
/// Channels read their current value from one slot and their n-back value
/// from another; combination channels cross the visual and audio slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    Position(usize),
    MultiVis(usize),
    Color,
    Vis,
    Audio,
    Audio2,
}

impl Channel {
    pub const ALL: [Channel; 16] = [
        Channel::Position1,
        Channel::Position2,
        Channel::Position3,
        Channel::Position4,
        Channel::Vis1,
        Channel::Vis2,
        Channel::Vis3,
        Channel::Vis4,
        Channel::Color,
        Channel::Image,
        Channel::Audio,
        Channel::Audio2,
        Channel::VisVis,
        Channel::VisAudio,
        Channel::AudioVis,
        Channel::Arithmetic,
    ];

    pub fn position(index: usize) -> Option<Channel> {
        match index {
            1 => Some(Channel::Position1),
            2 => Some(Channel::Position2),
            3 => Some(Channel::Position3),
            4 => Some(Channel::Position4),
            _ => None,
        }
    }

    pub fn multi_vis(index: usize) -> Option<Channel> {
        match index {
            1 => Some(Channel::Vis1),
            2 => Some(Channel::Vis2),
            3 => Some(Channel::Vis3),
            4 => Some(Channel::Vis4),
            _ => None,
        }
    }

    /// 1-based index among the simultaneous position channels.
    pub fn position_index(&self) -> Option<usize> {
        match self {
            Channel::Position1 => Some(1),
            Channel::Position2 => Some(2),
            Channel::Position3 => Some(3),
            Channel::Position4 => Some(4),
            _ => None,
        }
    }

    pub fn is_position(&self) -> bool {
        self.position_index().is_some()
    }

    /// Slot holding this channel's value on the current trial.
    pub fn current_slot(&self) -> Option<Slot> {
        match self {
            Channel::Position1 => Some(Slot::Position(1)),
            Channel::Position2 => Some(Slot::Position(2)),
            Channel::Position3 => Some(Slot::Position(3)),
            Channel::Position4 => Some(Slot::Position(4)),
            Channel::Vis1 => Some(Slot::MultiVis(1)),
            Channel::Vis2 => Some(Slot::MultiVis(2)),
            Channel::Vis3 => Some(Slot::MultiVis(3)),
            Channel::Vis4 => Some(Slot::MultiVis(4)),
            Channel::Color => Some(Slot::Color),
            Channel::Image | Channel::VisVis | Channel::VisAudio => Some(Slot::Vis),
            Channel::Audio | Channel::AudioVis => Some(Slot::Audio),
            Channel::Audio2 => Some(Slot::Audio2),
            Channel::Arithmetic => None,
        }
    }

    /// Slot holding the value this channel is compared against n trials back.
    pub fn nback_slot(&self) -> Option<Slot> {
        match self {
            Channel::Image | Channel::VisVis | Channel::AudioVis => Some(Slot::Vis),
            Channel::VisAudio => Some(Slot::Audio),
            other => other.current_slot(),
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.to_string() == s)
            .ok_or_else(|| format!("unknown channel '{s}'"))
    }
}

/// Ordered, duplicate-free set of channels active for a session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelSet {
    channels: Vec<Channel>,
}

impl ChannelSet {
    pub fn new<I: IntoIterator<Item = Channel>>(channels: I) -> Self {
        let mut set = Self::default();
        for channel in channels {
            set.insert(channel);
        }
        set
    }

    pub fn insert(&mut self, channel: Channel) {
        if !self.channels.contains(&channel) {
            self.channels.push(channel);
        }
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.channels.contains(&channel)
    }

    pub fn contains_any(&self, channels: &[Channel]) -> bool {
        channels.iter().any(|c| self.contains(*c))
    }

    pub fn iter(&self) -> impl Iterator<Item = Channel> + '_ {
        self.channels.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn position_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_position()).count()
    }

    pub fn is_arithmetic_only(&self) -> bool {
        self.channels == [Channel::Arithmetic]
    }

    /// Channels scored with a yes/no button press.
    pub fn response_channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.iter().filter(|c| *c != Channel::Arithmetic)
    }
}

impl FromIterator<Channel> for ChannelSet {
    fn from_iter<I: IntoIterator<Item = Channel>>(iter: I) -> Self {
        ChannelSet::new(iter)
    }
}

/// How extra simultaneous stimuli are told apart in multi-stimulus mode.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum_macros::Display,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MultiStyle {
    #[default]
    Color,
    Image,
}

/// Preset channel combinations.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum_macros::Display,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum GameMode {
    Position,
    Sound,
    #[default]
    Dual,
    PositionColorSound,
    DualCombination,
    TriCombination,
    Quad,
    Arithmetic,
    DualArithmetic,
    TripleArithmetic,
    DualAudio,
}

impl GameMode {
    /// Stable numeric id written to the session journal.
    pub fn id(&self) -> u32 {
        match self {
            GameMode::Dual => 2,
            GameMode::PositionColorSound => 3,
            GameMode::DualCombination => 4,
            GameMode::TriCombination => 5,
            GameMode::Quad => 6,
            GameMode::Arithmetic => 7,
            GameMode::DualArithmetic => 8,
            GameMode::TripleArithmetic => 9,
            GameMode::Position => 10,
            GameMode::Sound => 11,
            GameMode::DualAudio => 12,
        }
    }

    pub fn from_id(id: u32) -> Option<GameMode> {
        [
            GameMode::Position,
            GameMode::Sound,
            GameMode::Dual,
            GameMode::PositionColorSound,
            GameMode::DualCombination,
            GameMode::TriCombination,
            GameMode::Quad,
            GameMode::Arithmetic,
            GameMode::DualArithmetic,
            GameMode::TripleArithmetic,
            GameMode::DualAudio,
        ]
        .into_iter()
        .find(|m| m.id() == id)
    }

    fn letters(&self) -> &'static str {
        match self {
            GameMode::Position => "P",
            GameMode::Sound => "S",
            GameMode::Dual => "D",
            GameMode::PositionColorSound => "PCS",
            GameMode::DualCombination => "DC",
            GameMode::TriCombination => "TC",
            GameMode::Quad => "Q",
            GameMode::Arithmetic => "Ar",
            GameMode::DualArithmetic => "DA",
            GameMode::TripleArithmetic => "TA",
            GameMode::DualAudio => "DS",
        }
    }

    /// Short label such as `D2B`, or `3-D2B` with three simultaneous stimuli.
    pub fn short_name(&self, n: usize, multi: usize) -> String {
        if multi > 1 {
            format!("{}-{}{}B", multi, self.letters(), n)
        } else {
            format!("{}{}B", self.letters(), n)
        }
    }

    pub fn default_n(&self) -> usize {
        match self {
            GameMode::TriCombination | GameMode::Quad | GameMode::TripleArithmetic => 1,
            _ => 2,
        }
    }

    fn base_channels(&self) -> &'static [Channel] {
        use Channel::*;
        match self {
            GameMode::Position => &[Position1],
            GameMode::Sound => &[Audio],
            GameMode::Dual => &[Position1, Audio],
            GameMode::PositionColorSound => &[Position1, Color, Audio],
            GameMode::DualCombination => &[VisVis, VisAudio, AudioVis, Audio],
            GameMode::TriCombination => &[Position1, VisVis, VisAudio, AudioVis, Audio],
            GameMode::Quad => &[Position1, Color, VisVis, Audio],
            GameMode::Arithmetic => &[Arithmetic],
            GameMode::DualArithmetic => &[Position1, Arithmetic],
            GameMode::TripleArithmetic => &[Position1, Color, Arithmetic],
            GameMode::DualAudio => &[Position1, Audio, Audio2],
        }
    }

    /// Channel set for this mode. With `multi > 1`, positions `2..=multi` are
    /// added to modes that show a position, plus `vis1..=multi` in image style.
    pub fn channels(&self, multi: usize, style: MultiStyle) -> ChannelSet {
        let mut set: ChannelSet = self.base_channels().iter().copied().collect();
        if multi > 1 && set.contains(Channel::Position1) {
            for i in 2..=multi {
                if let Some(channel) = Channel::position(i) {
                    set.insert(channel);
                }
            }
            if style == MultiStyle::Image {
                for i in 1..=multi {
                    if let Some(channel) = Channel::multi_vis(i) {
                        set.insert(channel);
                    }
                }
            }
        }
        set
    }
}
