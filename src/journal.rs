//! Session summary journal.
//!
//! One tab-separated line per finished session, in the column order the
//! desktop trainer's `stats.txt` has always used, so existing histories can
//! be read and extended:
//!
//! ```text
//! timestamp  short-name  percent  mode-id  n  ticks  trials  manual  session
//! position1 audio color visvis audiovis arithmetic image visaudio audio2
//! position2 position3 position4 vis1 vis2 vis3 vis4  session-seconds
//! ```
//!
//! Older files may use commas instead of tabs; both are read.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime, Timelike};
use tracing::{debug, warn};

use crate::app_dirs::AppDirs;
use crate::channel::Channel;
use crate::config::SessionConfig;
use crate::error::StoreError;
use crate::score::ScoreResult;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Per-channel percentage columns, in file order.
pub const JOURNAL_CATEGORIES: [Channel; 16] = [
    Channel::Position1,
    Channel::Audio,
    Channel::Color,
    Channel::VisVis,
    Channel::AudioVis,
    Channel::Arithmetic,
    Channel::Image,
    Channel::VisAudio,
    Channel::Audio2,
    Channel::Position2,
    Channel::Position3,
    Channel::Position4,
    Channel::Vis1,
    Channel::Vis2,
    Channel::Vis3,
    Channel::Vis4,
];

/// Fields before the category columns.
const LEADING_FIELDS: usize = 9;
/// Seconds per engine tick.
const TICK_SECONDS: f64 = 0.1;

/// A line to append for a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    pub timestamp: NaiveDateTime,
    pub short_name: String,
    pub percent: u32,
    pub mode_id: u32,
    pub n: usize,
    pub ticks_per_trial: i32,
    pub trials: usize,
    pub manual: bool,
    pub session_number: usize,
    pub category_percents: BTreeMap<Channel, u32>,
    pub session_seconds: u64,
}

impl JournalEntry {
    pub fn from_session(
        config: &SessionConfig,
        scores: &ScoreResult,
        session_number: usize,
        timestamp: NaiveDateTime,
    ) -> Self {
        let session_seconds =
            (config.total_trials as f64 * f64::from(config.ticks_per_trial) * TICK_SECONDS).round();
        Self {
            timestamp,
            short_name: config.short_name(),
            percent: scores.overall.round() as u32,
            mode_id: config.mode.id(),
            n: config.n,
            ticks_per_trial: config.ticks_per_trial,
            trials: config.total_trials,
            manual: config.manual,
            session_number,
            category_percents: scores
                .channels
                .iter()
                .map(|(channel, score)| (*channel, score.percent().round() as u32))
                .collect(),
            session_seconds: session_seconds as u64,
        }
    }

    fn fields(&self) -> Vec<String> {
        let mut fields = vec![
            self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            self.short_name.clone(),
            self.percent.to_string(),
            self.mode_id.to_string(),
            self.n.to_string(),
            self.ticks_per_trial.to_string(),
            self.trials.to_string(),
            u8::from(self.manual).to_string(),
            self.session_number.to_string(),
        ];
        fields.extend(
            JOURNAL_CATEGORIES
                .iter()
                .map(|c| self.category_percents.get(c).copied().unwrap_or(0).to_string()),
        );
        fields.push(self.session_seconds.to_string());
        fields
    }
}

/// The parts of a journal line that drive level progression.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalRecord {
    pub timestamp: NaiveDateTime,
    /// Zero for manual sessions, which never count towards progress.
    pub session_number: usize,
    pub mode_id: u32,
    pub n: usize,
    pub percent: u32,
    pub manual: bool,
    /// Zero when the line predates the column.
    pub session_seconds: u64,
}

impl JournalRecord {
    fn parse(record: &csv::StringRecord) -> Option<Self> {
        let field = |i: usize| record.get(i).map(str::trim);
        let timestamp = NaiveDateTime::parse_from_str(field(0)?, TIMESTAMP_FORMAT).ok()?;
        let manual = field(7)?.parse::<u8>().ok()? != 0;
        let session_number = field(8)?.parse().ok()?;
        let session_seconds = field(LEADING_FIELDS + JOURNAL_CATEGORIES.len())
            .and_then(|s| s.parse::<f64>().ok())
            .map_or(0, |s| s.round() as u64);

        Some(Self {
            timestamp,
            session_number: if manual { 0 } else { session_number },
            mode_id: field(3)?.parse().ok()?,
            n: field(4)?.parse().ok()?,
            percent: field(2)?.parse().ok()?,
            manual,
            session_seconds,
        })
    }
}

/// Whether `timestamp` falls on the training day containing `now`, where a
/// day begins at `rollover_hour`.
pub fn is_today(timestamp: NaiveDateTime, now: NaiveDateTime, rollover_hour: u32) -> bool {
    let today = now.date();
    let yesterday = today - Duration::days(1);
    let date = timestamp.date();
    let hour = timestamp.hour();

    if now.hour() < rollover_hour {
        date == today || (date == yesterday && hour >= rollover_hour)
    } else {
        date == today && hour >= rollover_hour
    }
}

#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::journal_path().unwrap_or_else(|| PathBuf::from("nback_stats.txt"));
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

    pub fn append(&self, entry: &JournalEntry) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(file);
        writer.write_record(entry.fields())?;
        writer.flush()?;
        debug!(path = %self.path.display(), session = entry.session_number, "journal entry written");
        Ok(())
    }

    /// Every well-formed line, oldest first. A missing file is an empty journal.
    pub fn load(&self) -> Result<Vec<JournalRecord>, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let delimiter = contents
            .lines()
            .find(|line| starts_with_digit(line))
            .map_or(b'\t', |line| if line.contains('\t') { b'\t' } else { b',' });

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(contents.as_bytes());

        let mut records = Vec::new();
        for (line, row) in reader.records().enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(err) => {
                    warn!(line = line + 1, %err, "skipping unreadable journal line");
                    continue;
                }
            };
            if !row.get(0).is_some_and(starts_with_digit) {
                continue;
            }
            match JournalRecord::parse(&row) {
                Some(record) => records.push(record),
                None => warn!(line = line + 1, "skipping malformed journal line"),
            }
        }
        Ok(records)
    }

    /// Sessions played on the training day containing `now`.
    pub fn today(
        &self,
        now: NaiveDateTime,
        rollover_hour: u32,
    ) -> Result<Vec<JournalRecord>, StoreError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|r| is_today(r.timestamp, now, rollover_hour))
            .collect())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

fn starts_with_digit(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_digit())
}
