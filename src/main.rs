//! Prediction game command line.
//!
//! Every subcommand opens the ledger, performs one engine operation and prints
//! the outcome. `simulate` plays a scripted week against an in-memory ledger.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use predictor_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "predictor")]
#[command(about = "Daily stock-change prediction game: bets, settlement, balances")]
struct Args {
    /// Path to the SQLite ledger (overrides PREDICTOR_DB_PATH)
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Place today's prediction (percentage change, e.g. 1.25 or -0.4)
    Bet {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        name: String,

        #[arg(allow_hyphen_values = true)]
        value: Decimal,
    },

    /// Settle a date. the realized change has to be supplied with --change
    Settle {
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Settle the previous calendar day (implies --retroactive)
        #[arg(long, conflicts_with = "date")]
        yesterday: bool,

        #[arg(long, allow_hyphen_values = true)]
        change: Option<Decimal>,

        /// Skip the market-close check
        #[arg(long)]
        retroactive: bool,
    },

    /// Show (and register) a participant's balance
    Balance {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        name: String,
    },

    /// All balances, highest first
    Leaderboard,

    /// The day's bets; values are hidden until the cutoff
    Bets {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Current weekly pot
    Pot,

    /// Ban a participant by display name for a number of days
    Ban { name: String, days: i64 },

    /// Lift a ban
    Unban { name: String },

    /// List active bans
    Bans,

    /// Play a scripted week against an in-memory ledger
    Simulate,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::from_env().context("failed to load configuration")?;
    if let Some(db) = args.db {
        config.db_path = db;
    }
    init_tracing(&config.log_filter);

    match args.command {
        Commands::Bet { id, name, value } => {
            let engine = open_engine(&config, Arc::new(UnavailableOracle))?;
            match engine.place_bet(ParticipantId(id), &name, value) {
                Ok(p) => println!("Bet recorded: @{} {} for {}", p.display_name, p.value, p.date),
                Err(e) => println!("Bet rejected: {e}"),
            }
        }
        Commands::Settle {
            date,
            yesterday,
            change,
            retroactive,
        } => {
            let oracle = StaticOracle::new();
            let engine_today = SystemClock::new(config.engine.calendar.timezone).today();
            let date = match (yesterday, date) {
                (true, _) => engine_today - Duration::days(1),
                (false, Some(d)) => d,
                (false, None) => engine_today,
            };
            if let Some(change) = change {
                oracle.set_change(date, Percent::new(change));
            }
            let engine = open_engine(&config, Arc::new(oracle))?;
            match engine.settle(date, retroactive || yesterday) {
                Ok(settlement) => {
                    if settlement.from_cache {
                        println!("(already settled, showing the stored result)");
                    }
                    print!("{}", settlement.report);
                }
                Err(e) if e.is_retryable() => println!("Not settled: {e}"),
                Err(e) => return Err(e).context("settlement failed"),
            }
        }
        Commands::Balance { id, name } => {
            let engine = open_engine(&config, Arc::new(UnavailableOracle))?;
            let balance = engine.view_balance(ParticipantId(id), &name)?;
            println!("@{name}: {balance}");
        }
        Commands::Leaderboard => {
            let engine = open_engine(&config, Arc::new(UnavailableOracle))?;
            print_leaderboard(&engine)?;
        }
        Commands::Bets { date } => {
            let engine = open_engine(&config, Arc::new(UnavailableOracle))?;
            let date = date.unwrap_or_else(|| engine.today());
            let bets = engine.bets_for(date)?;
            println!("Bets for {date}: {}", bets.len());
            for bet in bets {
                match bet.value {
                    Some(v) => println!("  @{}: {v}", bet.display_name),
                    None => println!("  @{}", bet.display_name),
                }
            }
        }
        Commands::Pot => {
            let engine = open_engine(&config, Arc::new(UnavailableOracle))?;
            println!("Weekly pot: {}", engine.current_pot()?);
        }
        Commands::Ban { name, days } => {
            let engine = open_engine(&config, Arc::new(UnavailableOracle))?;
            let record = engine.ban(&name, days)?;
            println!("@{} banned until {}", bans::normalize_name(&name), record.ban_until);
        }
        Commands::Unban { name } => {
            let engine = open_engine(&config, Arc::new(UnavailableOracle))?;
            if engine.unban(&name)? {
                println!("@{} unbanned", bans::normalize_name(&name));
            } else {
                println!("@{} was not banned", bans::normalize_name(&name));
            }
        }
        Commands::Bans => {
            let engine = open_engine(&config, Arc::new(UnavailableOracle))?;
            let active = engine.active_bans()?;
            if active.is_empty() {
                println!("No active bans");
            }
            for ban in active {
                println!("  @{} until {} ({} days left)", ban.display_name, ban.ban_until, ban.days_remaining);
            }
        }
        Commands::Simulate => simulate(&config)?,
    }

    Ok(())
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_engine(config: &AppConfig, oracle: Arc<dyn PriceOracle>) -> Result<SettlementEngine> {
    let store = Store::open(&config.db_path)
        .with_context(|| format!("failed to open ledger at {}", config.db_path.display()))?;
    let clock = SystemClock::new(config.engine.calendar.timezone);
    Ok(SettlementEngine::new(config.engine.clone(), Arc::new(store), oracle, Arc::new(clock)))
}

fn print_leaderboard(engine: &SettlementEngine) -> Result<()> {
    let rows = engine.get_leaderboard()?;
    println!("Leaderboard:");
    for (i, row) in rows.iter().enumerate() {
        println!("  {:>2}. @{} {}", i + 1, row.display_name, row.balance);
    }
    let total: Points = rows.iter().map(|r| r.balance).sum();
    println!("  ledger total: {total}");
    Ok(())
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> Result<NaiveDateTime> {
    date.and_hms_opt(hour, minute, 0).context("invalid simulation time")
}

/// One scripted trading week, 2025-06-16 to 2025-06-20. Thursday is a holiday.
fn simulate(config: &AppConfig) -> Result<()> {
    println!("Prediction Game Simulation");
    println!("One week, five players, one of whom never bets\n");

    let monday = NaiveDate::from_ymd_opt(2025, 6, 16).context("invalid start date")?;
    let clock = Arc::new(ManualClock::new(at(monday, 9, 0)?));
    let oracle = Arc::new(StaticOracle::new());
    let engine = SettlementEngine::new(
        config.engine.clone(),
        Arc::new(Store::open_in_memory()?),
        oracle.clone(),
        clock.clone(),
    );
    let mut reminders = ReminderSchedule::default();

    // erin only ever checks a balance, which is enough to owe the non-bettor penalty
    engine.view_balance(ParticipantId(5), "erin")?;

    let players = [(1, "alice"), (2, "bob"), (3, "carol"), (4, "dave")];
    let week: [(i64, Decimal, [Decimal; 4]); 5] = [
        (0, dec!(1.20), [dec!(1.00), dec!(-0.50), dec!(2.00), dec!(1.35)]),
        (1, dec!(-0.85), [dec!(0.30), dec!(-1.10), dec!(-0.80), dec!(0.90)]),
        (2, dec!(0.40), [dec!(0.10), dec!(0.75), dec!(0.40), dec!(-0.20)]),
        (3, dec!(0.00), [dec!(0.50), dec!(0.60), dec!(0.70), dec!(0.80)]),
        (4, dec!(2.10), [dec!(1.90), dec!(2.50), dec!(-0.30), dec!(1.00)]),
    ];

    for (offset, realized, values) in week {
        let day = monday + Duration::days(offset);
        println!("{} ({})", day, day.format("%A"));

        clock.set(at(day, 9, 0)?);
        for ((id, name), value) in players.iter().zip(values) {
            // dave sits out tuesday
            if offset == 1 && *id == 4 {
                continue;
            }
            if let Err(e) = engine.place_bet(ParticipantId(*id), name, value) {
                println!("  @{name} bet rejected: {e}");
            }
        }

        clock.set(at(day, 15, 15)?);
        for _ in 0..=15 {
            for reminder in reminders.due(engine.calendar(), clock.now()) {
                println!("  reminder: {}", reminder.message(engine.prediction_count(day)?));
            }
            clock.advance(Duration::minutes(1));
        }

        clock.set(at(day, 22, 15)?);
        oracle.set_change(day, Percent::new(realized));
        match engine.settle(day, false) {
            Ok(settlement) => {
                for line in settlement.report.to_string().lines() {
                    println!("  {line}");
                }
                // a second call serves the stored result
                let again = engine.settle(day, false)?;
                println!("  re-settle served from cache: {}", again.from_cache);
            }
            Err(e) => println!("  not settled: {e}"),
        }
        println!("  weekly pot now: {}\n", engine.pot_for(day)?);
        reminders.prune_before(day);
    }

    print_leaderboard(&engine)?;
    println!("\nSimulation complete.");
    Ok(())
}
