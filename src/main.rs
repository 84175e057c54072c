use std::error::Error;

use chrono::Local;
use clap::Parser;
use itertools::Itertools;
use nback::{
    apply_session_result, drive, play, retrieve_progress, ChannelInputSource, ConfigStore,
    FileConfigStore, FixedTicker, GameMode, Journal, JournalEntry, JournalRecord, MultiStyle,
    PlayerProfile, Runner, RunnerResponder, ScoreResult, Session, SessionConfig, SessionHistory,
    Settings, SimulatedPlayer, StatsDb, DEFAULT_TICK,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// n-back working memory trainer, played by a simulated player
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Runs one n-back session with a scripted player, scores it, and tracks level progression across sessions."
)]
pub struct Cli {
    /// game mode
    #[clap(short = 'm', long, value_enum)]
    mode: Option<GameMode>,

    /// n-back level; choosing one marks the session as manual
    #[clap(short = 'n', long = "back")]
    n: Option<usize>,

    /// base number of trials (n squared is added)
    #[clap(short = 't', long)]
    trials: Option<usize>,

    /// engine ticks per trial, at 10 ticks per second
    #[clap(long)]
    ticks: Option<i32>,

    /// number of simultaneous position stimuli (1-4)
    #[clap(long)]
    multi: Option<usize>,

    /// how multi-stimulus positions are told apart
    #[clap(long, value_enum)]
    multi_style: Option<MultiStyle>,

    /// hold each trial until the player responds
    #[clap(long)]
    self_paced: bool,

    /// fixed match counts per session
    #[clap(long)]
    jaeggi: bool,

    /// vary n from trial to trial
    #[clap(long)]
    variable: bool,

    /// crab-back: n cycles 1, 3, 5, ...
    #[clap(long)]
    crab: bool,

    /// seed for stimuli and the player
    #[clap(long)]
    seed: Option<u64>,

    /// simulated player accuracy in [0, 1]
    #[clap(short = 'a', long, default_value_t = 0.9)]
    accuracy: f64,

    /// run without real-time pacing
    #[clap(long)]
    fast: bool,

    /// do not write the journal or the response database
    #[clap(long)]
    no_save: bool,

    /// print today's sessions and per-channel statistics, then exit
    #[clap(long)]
    history: bool,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(mode) = self.mode {
            settings.mode = mode;
        }
        if let Some(trials) = self.trials {
            settings.num_trials = trials;
        }
        if let Some(ticks) = self.ticks {
            settings.ticks_per_trial = ticks;
        }
        if let Some(multi) = self.multi {
            settings.multi = multi;
        }
        if let Some(style) = self.multi_style {
            settings.multi_style = style;
        }
        settings.self_paced |= self.self_paced;
        settings.fixed_count |= self.jaeggi;
        settings.variable_n |= self.variable;
        settings.crab |= self.crab;
    }

    fn rngs(&self) -> (StdRng, StdRng) {
        match self.seed {
            Some(seed) => (
                StdRng::seed_from_u64(seed),
                StdRng::seed_from_u64(seed.wrapping_add(1)),
            ),
            None => (StdRng::from_entropy(), StdRng::from_entropy()),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut settings = FileConfigStore::new().load();
    cli.apply(&mut settings);

    let journal = Journal::new();
    let now = Local::now();
    let today = journal.today(now.naive_local(), settings.rollover_hour)?;

    if cli.history {
        return print_history(&today);
    }

    let history = journal.load()?;
    let mut progress = retrieve_progress(&history, &today, settings.mode, &settings);
    match cli.n {
        Some(n) => {
            settings.n = n;
            settings.manual = true;
        }
        None => settings.n = progress.n,
    }

    let config = SessionConfig::from_settings(&settings)?;
    let (session_rng, player_rng) = cli.rngs();
    let mut player = SimulatedPlayer::new(
        &config,
        PlayerProfile::with_accuracy(cli.accuracy),
        player_rng,
    );
    let mut session =
        Session::new(config.clone(), session_rng).with_session_number(progress.session_number);

    println!(
        "{} | {} trials | accuracy {:.0}%",
        config.short_name(),
        config.total_trials,
        cli.accuracy * 100.0
    );

    let scores = if cli.fast {
        play(
            &mut session,
            &mut player,
            DEFAULT_TICK.as_secs_f64(),
            &mut Vec::new(),
        )?
    } else {
        let (tx, source) = ChannelInputSource::pair();
        let runner = Runner::new(source, FixedTicker::default());
        let mut responder = RunnerResponder::new(player, tx);
        drive(&mut session, &runner, &mut responder)?
    };

    print_scores(&scores, session.history());

    let outcome = apply_session_result(&mut progress, scores.overall, config.manual, &settings);
    if let Some(tier) = outcome.tier {
        println!("{tier}!");
    }
    if config.manual {
        println!("manual session, level unchanged");
    } else if outcome.advanced {
        println!("advancing to {}-back", progress.n);
    } else if outcome.fell_back {
        println!("falling back to {}-back", progress.n);
    } else {
        println!("next session: {}-back", progress.n);
    }

    if cli.no_save {
        return Ok(());
    }

    let finished = Local::now();
    journal.append(&JournalEntry::from_session(
        &config,
        &scores,
        session.session_number(),
        finished.naive_local(),
    ))?;
    let mut db = StatsDb::new()?;
    let recorded = db.record_session(
        session.history(),
        config.n,
        &config.channels,
        session.session_number(),
        finished,
    )?;
    info!(recorded, journal = %journal.path().display(), "session saved");

    Ok(())
}

fn print_scores(scores: &ScoreResult, history: &SessionHistory) {
    for (channel, score) in &scores.channels {
        let rt = history
            .reaction_time_stats(*channel)
            .map_or_else(String::new, |(avg, sd)| {
                format!("  rt {:.0}±{:.0} ms", avg * 1000.0, sd * 1000.0)
            });
        println!(
            "  {:<11} {:>5.1}%  hits {:>2}  misses {:>2}  false alarms {:>2}{}",
            channel.to_string(),
            score.percent(),
            score.hits,
            score.misses,
            score.false_alarms,
            rt
        );
    }
    println!("  {:<11} {:>5.1}%", "overall", scores.overall);
}

fn print_history(today: &[JournalRecord]) -> Result<(), Box<dyn Error>> {
    if today.is_empty() {
        println!("no sessions today");
    } else {
        let minutes = today.iter().map(|r| r.session_seconds).sum::<u64>() / 60;
        println!("{} sessions today, {} min", today.len(), minutes);
        println!(
            "levels: {}",
            today.iter().map(|r| format!("{}@{}%", r.n, r.percent)).join(" ")
        );
    }

    let db = StatsDb::new()?;
    for summary in db.get_summary()? {
        let avg = summary
            .avg_hit_time_ms
            .map_or_else(|| "-".to_string(), |ms| format!("{ms:.0} ms"));
        println!(
            "  {:<11} hit time {:>7}  miss {:>5.1}%  false alarm {:>5.1}%  ({} trials)",
            summary.channel.to_string(),
            avg,
            summary.miss_rate,
            summary.false_alarm_rate,
            summary.total
        );
    }
    Ok(())
}
