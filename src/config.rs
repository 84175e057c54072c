use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::channel::{Channel, ChannelSet, GameMode, MultiStyle};
use crate::error::{ConfigError, StoreError};
use crate::generator::{
    default_acceptable_decimals, AcceptableDecimal, EnabledOperations, MatchChances,
};

/// Shortest trial that still fits the hide, hold and feedback ticks.
pub const MIN_TICKS_PER_TRIAL: i32 = 12;

/// Largest accepted `arithmetic_max_number`.
pub const MAX_ARITHMETIC_OPERAND: i32 = 1000;

/// Persisted user settings. Missing fields take their default value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub mode: GameMode,
    pub n: usize,
    pub multi: usize,
    pub multi_style: MultiStyle,
    pub num_trials: usize,
    pub num_trials_factor: usize,
    pub num_trials_exponent: u32,
    pub ticks_per_trial: i32,
    pub chance_of_guaranteed_match: f64,
    pub chance_of_interference: f64,
    pub self_paced: bool,
    pub fixed_count: bool,
    pub variable_n: bool,
    pub crab: bool,
    pub manual: bool,
    pub arithmetic_max_number: i32,
    pub arithmetic_use_negatives: bool,
    pub arithmetic_operations: EnabledOperations,
    pub arithmetic_acceptable_decimals: Vec<f64>,
    pub default_color: u8,
    pub threshold_advance: f64,
    pub threshold_fallback: f64,
    pub threshold_fallback_sessions: usize,
    pub fixed_count_threshold_advance: f64,
    pub fixed_count_threshold_fallback: f64,
    /// Only sessions played today count towards the starting level.
    pub reset_level: bool,
    /// Hour of the day at which "today" begins.
    pub rollover_hour: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: GameMode::Dual,
            n: 2,
            multi: 1,
            multi_style: MultiStyle::Color,
            num_trials: 20,
            num_trials_factor: 1,
            num_trials_exponent: 2,
            ticks_per_trial: 30,
            chance_of_guaranteed_match: 0.125,
            chance_of_interference: 0.125,
            self_paced: false,
            fixed_count: false,
            variable_n: false,
            crab: false,
            manual: false,
            arithmetic_max_number: 12,
            arithmetic_use_negatives: false,
            arithmetic_operations: EnabledOperations::default(),
            arithmetic_acceptable_decimals: default_acceptable_decimals(),
            default_color: 1,
            threshold_advance: 80.0,
            threshold_fallback: 50.0,
            threshold_fallback_sessions: 3,
            fixed_count_threshold_advance: 90.0,
            fixed_count_threshold_fallback: 75.0,
            reset_level: false,
            rollover_hour: 4,
        }
    }
}

impl Settings {
    /// Trials in a session at level `n`: `num_trials + factor * n^exponent`.
    /// `None` when the count does not fit in a `usize`.
    pub fn total_trials(&self, n: usize) -> Option<usize> {
        n.checked_pow(self.num_trials_exponent)
            .and_then(|power| power.checked_mul(self.num_trials_factor))
            .and_then(|extra| extra.checked_add(self.num_trials))
    }

    pub fn threshold_advance(&self) -> f64 {
        if self.fixed_count {
            self.fixed_count_threshold_advance
        } else {
            self.threshold_advance
        }
    }

    pub fn threshold_fallback(&self) -> f64 {
        if self.fixed_count {
            self.fixed_count_threshold_fallback
        } else {
            self.threshold_fallback
        }
    }
}

/// Validated configuration for one session. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub mode: GameMode,
    pub channels: ChannelSet,
    pub n: usize,
    pub multi: usize,
    pub multi_style: MultiStyle,
    pub total_trials: usize,
    pub ticks_per_trial: i32,
    pub chances: MatchChances,
    pub self_paced: bool,
    pub fixed_count: bool,
    pub variable_n: bool,
    pub crab: bool,
    pub manual: bool,
    pub operations: EnabledOperations,
    pub arithmetic_min: i32,
    pub arithmetic_max: i32,
    pub acceptable_decimals: Vec<AcceptableDecimal>,
    pub default_color: u8,
}

impl SessionConfig {
    /// Build from settings using the channel set of `settings.mode`.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let channels = settings.mode.channels(settings.multi, settings.multi_style);
        Self::with_channels(channels, settings)
    }

    /// Build from settings with an explicit channel set.
    pub fn with_channels(channels: ChannelSet, settings: &Settings) -> Result<Self, ConfigError> {
        if channels.is_empty() {
            return Err(ConfigError::EmptyChannelSet);
        }
        if settings.n == 0 {
            return Err(ConfigError::InvalidNBack(settings.n));
        }
        if !(1..=4).contains(&settings.multi) {
            return Err(ConfigError::UnsupportedMulti(settings.multi));
        }
        let beyond = channels.iter().find(|c| {
            let index = c
                .position_index()
                .or_else(|| (1..=4).find(|i| Channel::multi_vis(*i) == Some(*c)));
            index.is_some_and(|i| i > settings.multi)
        });
        if let Some(channel) = beyond {
            return Err(ConfigError::PositionBeyondMulti {
                channel,
                multi: settings.multi,
            });
        }
        if settings.ticks_per_trial < MIN_TICKS_PER_TRIAL {
            return Err(ConfigError::TicksTooShort {
                ticks: settings.ticks_per_trial,
                minimum: MIN_TICKS_PER_TRIAL,
            });
        }
        for (name, value) in [
            ("chance of guaranteed match", settings.chance_of_guaranteed_match),
            ("chance of interference", settings.chance_of_interference),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ProbabilityOutOfRange { name, value });
            }
        }
        if !(1..=MAX_ARITHMETIC_OPERAND).contains(&settings.arithmetic_max_number) {
            return Err(ConfigError::InvalidArithmeticRange {
                max: settings.arithmetic_max_number,
                limit: MAX_ARITHMETIC_OPERAND,
            });
        }
        if settings.fixed_count && settings.variable_n {
            return Err(ConfigError::ConflictingProtocols);
        }
        if settings.fixed_count && settings.multi > 1 {
            return Err(ConfigError::FixedCountMulti(settings.multi));
        }
        if settings.fixed_count {
            for required in [Channel::Position1, Channel::Audio] {
                if !channels.contains(required) {
                    return Err(ConfigError::FixedCountRequires(required));
                }
            }
        }

        let total_trials = settings
            .total_trials(settings.n)
            .ok_or(ConfigError::TrialCountOverflow { n: settings.n })?;
        if total_trials <= settings.n {
            return Err(ConfigError::TooFewTrials {
                total: total_trials,
                n: settings.n,
            });
        }

        let acceptable_decimals = settings
            .arithmetic_acceptable_decimals
            .iter()
            .filter_map(|fraction| {
                let decimal = AcceptableDecimal::from_fraction(*fraction);
                if decimal.is_none() {
                    warn!(fraction, "ignoring acceptable decimal outside (0, 1)");
                }
                decimal
            })
            .collect();

        let arithmetic_max = settings.arithmetic_max_number;
        let arithmetic_min = if settings.arithmetic_use_negatives {
            -arithmetic_max
        } else {
            0
        };

        Ok(Self {
            mode: settings.mode,
            channels,
            n: settings.n,
            multi: settings.multi,
            multi_style: settings.multi_style,
            total_trials,
            ticks_per_trial: settings.ticks_per_trial,
            chances: MatchChances {
                guaranteed_match: settings.chance_of_guaranteed_match,
                interference: settings.chance_of_interference,
            },
            self_paced: settings.self_paced,
            fixed_count: settings.fixed_count,
            variable_n: settings.variable_n,
            crab: settings.crab,
            manual: settings.manual,
            operations: settings.arithmetic_operations,
            arithmetic_min,
            arithmetic_max,
            acceptable_decimals,
            default_color: settings.default_color,
        })
    }

    pub fn short_name(&self) -> String {
        self.mode.short_name(self.n, self.multi)
    }

    /// Extra ticks the stimulus stays visible for each additional position.
    pub fn extra_position_channels(&self) -> i32 {
        self.channels.position_count().saturating_sub(1) as i32
    }
}

pub trait ConfigStore {
    fn load(&self) -> Settings;
    fn save(&self, settings: &Settings) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "nback") {
            pd.config_dir().join("settings.json")
        } else {
            PathBuf::from("nback_settings.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Settings {
        let Ok(bytes) = fs::read(&self.path) else {
            return Settings::default();
        };
        match serde_json::from_slice::<Settings>(&bytes) {
            Ok(settings) => settings,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "unreadable settings, using defaults");
                Settings::default()
            }
        }
    }

    fn save(&self, settings: &Settings) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(settings)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}
