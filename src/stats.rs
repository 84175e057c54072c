use chrono::{DateTime, Local};
use rusqlite::{params, Connection, Result};
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::channel::{Channel, ChannelSet};
use crate::history::SessionHistory;
use crate::score::{is_match, Outcome};

/// One scoreable trial on one channel
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseStat {
    pub channel: Channel,
    pub session_number: usize,
    pub trial: usize,
    pub n: usize,
    pub is_match: bool,
    pub pressed: bool,
    pub reaction_time_ms: Option<u64>,
    pub outcome: Outcome,
    pub timestamp: DateTime<Local>,
}

/// Per-channel aggregate over every recorded session
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSummary {
    pub channel: Channel,
    pub avg_hit_time_ms: Option<f64>,
    pub miss_rate: f64,
    pub false_alarm_rate: f64,
    pub total: i64,
}

/// Database manager for per-trial response statistics
#[derive(Debug)]
pub struct StatsDb {
    conn: Connection,
}

impl StatsDb {
    /// Open the database at the default location, creating it if needed
    pub fn new() -> Result<Self> {
        let db_path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("nback_stats.db"));
        Self::open(db_path)
    }

    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory: {}", e)),
                )
            })?;
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS response_stats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel TEXT NOT NULL,
                session_number INTEGER NOT NULL,
                trial INTEGER NOT NULL,
                n INTEGER NOT NULL,
                is_match BOOLEAN NOT NULL,
                pressed BOOLEAN NOT NULL,
                reaction_time_ms INTEGER,
                outcome TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_response_stats_channel ON response_stats(channel)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_response_stats_timestamp ON response_stats(timestamp)",
            [],
        )?;

        Ok(StatsDb { conn })
    }

    pub fn record_response(&self, stat: &ResponseStat) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO response_stats
            (channel, session_number, trial, n, is_match, pressed, reaction_time_ms, outcome, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                stat.channel.to_string(),
                stat.session_number as i64,
                stat.trial as i64,
                stat.n as i64,
                stat.is_match,
                stat.pressed,
                stat.reaction_time_ms,
                stat.outcome.to_string(),
                stat.timestamp.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Record several responses in one transaction
    pub fn record_responses_batch(&mut self, stats: &[ResponseStat]) -> Result<()> {
        let tx = self.conn.transaction()?;

        for stat in stats {
            tx.execute(
                r#"
                INSERT INTO response_stats
                (channel, session_number, trial, n, is_match, pressed, reaction_time_ms, outcome, timestamp)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    stat.channel.to_string(),
                    stat.session_number as i64,
                    stat.trial as i64,
                    stat.n as i64,
                    stat.is_match,
                    stat.pressed,
                    stat.reaction_time_ms,
                    stat.outcome.to_string(),
                    stat.timestamp.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Record every scoreable button-press trial of a finished session
    pub fn record_session(
        &mut self,
        history: &SessionHistory,
        n: usize,
        channels: &ChannelSet,
        session_number: usize,
        timestamp: DateTime<Local>,
    ) -> Result<usize> {
        let stats = session_responses(history, n, channels, session_number, timestamp);
        self.record_responses_batch(&stats)?;
        Ok(stats.len())
    }

    pub fn get_channel_stats(&self, channel: Channel) -> Result<Vec<ResponseStat>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT channel, session_number, trial, n, is_match, pressed, reaction_time_ms, outcome, timestamp
            FROM response_stats
            WHERE channel = ?1
            ORDER BY session_number, trial
            "#,
        )?;

        let stat_iter = stmt.query_map([channel.to_string()], |row| {
            let channel: String = row.get(0)?;
            let outcome: String = row.get(7)?;
            let timestamp: String = row.get(8)?;

            Ok(ResponseStat {
                channel: channel.parse().map_err(|_| invalid_column(0, "channel"))?,
                session_number: row.get::<_, i64>(1)? as usize,
                trial: row.get::<_, i64>(2)? as usize,
                n: row.get::<_, i64>(3)? as usize,
                is_match: row.get(4)?,
                pressed: row.get(5)?,
                reaction_time_ms: row.get(6)?,
                outcome: parse_outcome(&outcome).ok_or_else(|| invalid_column(7, "outcome"))?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .map_err(|_| invalid_column(8, "timestamp"))?
                    .with_timezone(&Local),
            })
        })?;

        let mut stats = Vec::new();
        for stat in stat_iter {
            stats.push(stat?);
        }

        Ok(stats)
    }

    /// Mean reaction time of hits on a channel
    pub fn get_avg_hit_time(&self, channel: Channel) -> Result<Option<f64>> {
        let mut stmt = self.conn.prepare(
            "SELECT AVG(reaction_time_ms) FROM response_stats WHERE channel = ?1 AND outcome = 'hit'",
        )?;

        let avg: Option<f64> = stmt.query_row([channel.to_string()], |row| row.get(0))?;
        Ok(avg)
    }

    /// Percentage of matching trials the player failed to press
    pub fn get_miss_rate(&self, channel: Channel) -> Result<f64> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                COUNT(*) as matches,
                COALESCE(SUM(CASE WHEN pressed = 0 THEN 1 ELSE 0 END), 0) as missed
            FROM response_stats
            WHERE channel = ?1 AND is_match = 1
            "#,
        )?;

        let (matches, missed): (i64, i64) =
            stmt.query_row([channel.to_string()], |row| Ok((row.get(0)?, row.get(1)?)))?;

        if matches == 0 {
            Ok(0.0)
        } else {
            Ok((missed as f64 / matches as f64) * 100.0)
        }
    }

    /// Aggregate every channel seen so far
    pub fn get_summary(&self) -> Result<Vec<ChannelSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                channel,
                AVG(CASE WHEN outcome = 'hit' THEN reaction_time_ms END) as avg_hit_time,
                COALESCE(SUM(CASE WHEN is_match = 1 AND pressed = 0 THEN 1 ELSE 0 END) * 100.0
                    / NULLIF(SUM(CASE WHEN is_match = 1 THEN 1 ELSE 0 END), 0), 0.0) as miss_rate,
                COALESCE(SUM(CASE WHEN is_match = 0 AND pressed = 1 THEN 1 ELSE 0 END) * 100.0
                    / NULLIF(SUM(CASE WHEN is_match = 0 THEN 1 ELSE 0 END), 0), 0.0) as false_alarm_rate,
                COUNT(*) as total
            FROM response_stats
            GROUP BY channel
            ORDER BY channel
            "#,
        )?;

        let summary_iter = stmt.query_map([], |row| {
            let channel: String = row.get(0)?;
            Ok(ChannelSummary {
                channel: channel.parse().map_err(|_| invalid_column(0, "channel"))?,
                avg_hit_time_ms: row.get(1)?,
                miss_rate: row.get(2)?,
                false_alarm_rate: row.get(3)?,
                total: row.get(4)?,
            })
        })?;

        let mut summary = Vec::new();
        for item in summary_iter {
            summary.push(item?);
        }

        Ok(summary)
    }

    /// Clear all statistics (for testing or reset purposes)
    pub fn clear_all_stats(&self) -> Result<()> {
        self.conn.execute("DELETE FROM response_stats", [])?;
        Ok(())
    }
}

fn invalid_column(index: usize, name: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(index, name.to_string(), rusqlite::types::Type::Text)
}

fn parse_outcome(s: &str) -> Option<Outcome> {
    Outcome::ALL.into_iter().find(|o| o.to_string() == s)
}

/// Per-trial rows for every scoreable trial of every button-press channel.
pub fn session_responses(
    history: &SessionHistory,
    n: usize,
    channels: &ChannelSet,
    session_number: usize,
    timestamp: DateTime<Local>,
) -> Vec<ResponseStat> {
    let mut stats = Vec::new();
    for channel in channels.response_channels() {
        for (index, record) in history.records().iter().enumerate().skip(n) {
            let trial = index + 1;
            let matched = is_match(history, channel, trial, n);
            let pressed = record.pressed(channel);
            stats.push(ResponseStat {
                channel,
                session_number,
                trial,
                n,
                is_match: matched,
                pressed,
                reaction_time_ms: record
                    .reaction_time(channel)
                    .map(|rt| (rt.max(0.0) * 1000.0).round() as u64),
                outcome: Outcome::classify(matched, pressed),
                timestamp,
            });
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::Stimuli;
    use crate::history::TrialRecord;

    fn stat(channel: Channel, is_match: bool, pressed: bool, rt: Option<u64>) -> ResponseStat {
        ResponseStat {
            channel,
            session_number: 1,
            trial: 3,
            n: 2,
            is_match,
            pressed,
            reaction_time_ms: rt,
            outcome: Outcome::classify(is_match, pressed),
            timestamp: Local::now(),
        }
    }

    #[test]
    fn test_record_and_retrieve_response() {
        let db = StatsDb::open_in_memory().unwrap();
        db.record_response(&stat(Channel::Audio, true, true, Some(420)))
            .unwrap();

        let stats = db.get_channel_stats(Channel::Audio).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].channel, Channel::Audio);
        assert_eq!(stats[0].outcome, Outcome::Hit);
        assert_eq!(stats[0].reaction_time_ms, Some(420));
        assert!(db.get_channel_stats(Channel::Color).unwrap().is_empty());
    }

    #[test]
    fn test_avg_hit_time() {
        let db = StatsDb::open_in_memory().unwrap();
        for s in [
            stat(Channel::Position1, true, true, Some(300)),
            stat(Channel::Position1, true, true, Some(500)),
            stat(Channel::Position1, false, true, Some(900)),
        ] {
            db.record_response(&s).unwrap();
        }

        assert_eq!(db.get_avg_hit_time(Channel::Position1).unwrap(), Some(400.0));
        assert_eq!(db.get_avg_hit_time(Channel::Audio).unwrap(), None);
    }

    #[test]
    fn test_miss_rate() {
        let db = StatsDb::open_in_memory().unwrap();
        for s in [
            stat(Channel::Audio, true, true, Some(300)),
            stat(Channel::Audio, true, false, None),
            stat(Channel::Audio, true, false, None),
            stat(Channel::Audio, true, true, Some(350)),
            stat(Channel::Audio, false, false, None),
        ] {
            db.record_response(&s).unwrap();
        }

        assert_eq!(db.get_miss_rate(Channel::Audio).unwrap(), 50.0);
        assert_eq!(db.get_miss_rate(Channel::Color).unwrap(), 0.0);
    }

    #[test]
    fn test_summary() {
        let mut db = StatsDb::open_in_memory().unwrap();
        db.record_responses_batch(&[
            stat(Channel::Audio, true, true, Some(200)),
            stat(Channel::Audio, false, true, Some(100)),
            stat(Channel::Audio, false, false, None),
            stat(Channel::Position1, true, false, None),
        ])
        .unwrap();

        let summary = db.get_summary().unwrap();
        assert_eq!(summary.len(), 2);
        let audio = summary.iter().find(|s| s.channel == Channel::Audio).unwrap();
        assert_eq!(audio.total, 3);
        assert_eq!(audio.avg_hit_time_ms, Some(200.0));
        assert_eq!(audio.miss_rate, 0.0);
        assert_eq!(audio.false_alarm_rate, 50.0);
        let position = summary
            .iter()
            .find(|s| s.channel == Channel::Position1)
            .unwrap();
        assert_eq!(position.miss_rate, 100.0);
        assert_eq!(position.avg_hit_time_ms, None);
    }

    #[test]
    fn test_clear_all_stats() {
        let db = StatsDb::open_in_memory().unwrap();
        db.record_response(&stat(Channel::Audio, false, false, None))
            .unwrap();
        assert_eq!(db.get_channel_stats(Channel::Audio).unwrap().len(), 1);

        db.clear_all_stats().unwrap();
        assert!(db.get_channel_stats(Channel::Audio).unwrap().is_empty());
    }

    #[test]
    fn test_record_session() {
        let mut history = SessionHistory::default();
        for (audio, pressed) in [(1u8, false), (2, false), (1, true), (5, true)] {
            let mut record = TrialRecord::new(Stimuli {
                audio,
                ..Stimuli::default()
            });
            if pressed {
                record = record.with_response(Channel::Audio, 0.5);
            }
            history.push(record);
        }
        let channels = ChannelSet::new([Channel::Audio, Channel::Arithmetic]);

        let mut db = StatsDb::open_in_memory().unwrap();
        let written = db
            .record_session(&history, 2, &channels, 4, Local::now())
            .unwrap();
        assert_eq!(written, 2);

        let stats = db.get_channel_stats(Channel::Audio).unwrap();
        assert_eq!(stats[0].trial, 3);
        assert_eq!(stats[0].outcome, Outcome::Hit);
        assert_eq!(stats[0].reaction_time_ms, Some(500));
        assert_eq!(stats[1].outcome, Outcome::FalseAlarm);
        assert!(db.get_channel_stats(Channel::Arithmetic).unwrap().is_empty());
    }
}
