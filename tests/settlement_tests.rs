//! Settlement lifecycle tests.
//!
//! These drive the engine through whole trading days against a real sqlite
//! ledger and check what ends up in balances, the weekly pot and the cache.

use chrono::{NaiveDate, NaiveDateTime};
use predictor_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

const MON: (i32, u32, u32) = (2025, 6, 16);
const TUE: (i32, u32, u32) = (2025, 6, 17);
const WED: (i32, u32, u32) = (2025, 6, 18);
const THU: (i32, u32, u32) = (2025, 6, 19); // juneteenth, market closed
const FRI: (i32, u32, u32) = (2025, 6, 20);
const SAT: (i32, u32, u32) = (2025, 6, 21);

fn day((y, m, d): (i32, u32, u32)) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    date.and_hms_opt(hour, minute, 0).unwrap()
}

struct Harness {
    engine: Arc<SettlementEngine>,
    clock: Arc<ManualClock>,
    oracle: Arc<StaticOracle>,
}

impl Harness {
    fn new() -> Self {
        Self::with_store(Store::open_in_memory().unwrap())
    }

    fn with_store(store: Store) -> Self {
        let clock = Arc::new(ManualClock::new(at(day(MON), 9, 0)));
        let oracle = Arc::new(StaticOracle::new());
        let engine = SettlementEngine::new(EngineConfig::default(), Arc::new(store), oracle.clone(), clock.clone());
        Self {
            engine: Arc::new(engine),
            clock,
            oracle,
        }
    }

    fn bet_all(&self, date: NaiveDate, bets: &[(i64, &str, Decimal)]) {
        self.clock.set(at(date, 9, 0));
        for (id, name, value) in bets {
            self.engine.place_bet(ParticipantId(*id), name, *value).unwrap();
        }
    }

    // after market close, with the realized change published
    fn close(&self, date: NaiveDate, realized: Decimal) {
        self.clock.set(at(date, 22, 15));
        self.oracle.set_change(date, Percent::new(realized));
    }

    fn balance(&self, id: i64) -> Points {
        self.engine.get_balance(ParticipantId(id)).unwrap()
    }

    fn ledger_total(&self) -> Points {
        self.engine.get_leaderboard().unwrap().iter().map(|r| r.balance).sum()
    }
}

fn four_players() -> Vec<(i64, &'static str, Decimal)> {
    vec![
        (1, "a", dec!(0.10)),
        (2, "b", dec!(-0.30)),
        (3, "c", dec!(0.50)),
        (4, "d", dec!(-0.70)),
    ]
}

/// Hand-computed settlement outcomes.
mod scenarios {
    use super::*;

    #[test]
    fn four_players_no_exact_match() {
        let h = Harness::new();
        h.bet_all(day(MON), &four_players());
        h.close(day(MON), dec!(0.00));

        let settlement = h.engine.settle(day(MON), false).unwrap();
        assert!(!settlement.from_cache);
        assert!(!settlement.report.scoreboard.is_perfect_guess());

        assert_eq!(h.balance(1), Points::new(dec!(153)));
        assert_eq!(h.balance(2), Points::new(dec!(51)));
        assert_eq!(h.balance(3), Points::new(dec!(-51)));
        assert_eq!(h.balance(4), Points::new(dec!(-153)));

        let board: Vec<i64> = h.engine.get_leaderboard().unwrap().iter().map(|r| r.participant_id.0).collect();
        assert_eq!(board, vec![1, 2, 3, 4]);
        assert_eq!(h.ledger_total(), Points::zero());
    }

    #[test]
    fn exact_guess_collects_the_pool() {
        let h = Harness::new();
        h.bet_all(
            day(MON),
            &[(1, "A", dec!(1.00)), (2, "B", dec!(-1.00)), (3, "C", dec!(0.50)), (4, "D", dec!(-0.50))],
        );
        h.close(day(MON), dec!(0.50));

        let report = h.engine.settle(day(MON), false).unwrap().report;
        assert_eq!(
            report.scoreboard.kind,
            ScoreKind::PerfectGuess {
                participant_id: ParticipantId(3),
                variable_pool: Points::new(dec!(10)),
            }
        );

        assert_eq!(h.balance(3), Points::new(dec!(310)));
        assert_eq!(h.balance(1), Points::new(dec!(-50)));
        assert_eq!(h.balance(4), Points::new(dec!(-102.5)));
        assert_eq!(h.balance(2), Points::new(dec!(-157.5)));

        let text = report.to_string();
        assert!(text.contains("Perfect guess by @C"));
    }

    #[test]
    fn single_bettor_settles_to_zero() {
        let h = Harness::new();
        h.bet_all(day(MON), &[(1, "solo", dec!(2.00))]);
        h.close(day(MON), dec!(-1.00));

        h.engine.settle(day(MON), false).unwrap();
        // a settled bettor gets a row even at zero
        assert_eq!(h.engine.get_leaderboard().unwrap().len(), 1);
        assert_eq!(h.balance(1), Points::zero());
    }
}

/// Known participants who skip a trading day.
mod non_bettors {
    use super::*;

    #[test]
    fn penalized_and_pot_accrues() {
        let h = Harness::new();
        h.engine.view_balance(ParticipantId(9), "idle").unwrap();
        h.bet_all(day(MON), &four_players());
        h.close(day(MON), dec!(0.00));

        let report = h.engine.settle(day(MON), false).unwrap().report;
        assert_eq!(report.non_bettors.len(), 1);
        assert_eq!(report.non_bettors[0].display_name, "idle");
        assert_eq!(report.pot_accrued, Points::new(dec!(10)));
        assert!(report.pot_award.is_none());

        assert_eq!(h.balance(9), Points::new(dec!(-10)));
        assert_eq!(h.engine.pot_for(day(MON)).unwrap(), Points::new(dec!(10)));
        assert_eq!(h.ledger_total(), report.net_ledger_change());
        assert_eq!(h.ledger_total(), Points::new(dec!(-10)));
    }

    #[test]
    fn unregistered_participants_are_never_charged() {
        let h = Harness::new();
        h.bet_all(day(MON), &four_players());
        h.close(day(MON), dec!(0.00));

        let report = h.engine.settle(day(MON), false).unwrap().report;
        assert!(report.non_bettors.is_empty());
        assert_eq!(h.balance(99), Points::zero());
        assert!(h.engine.get_leaderboard().unwrap().iter().all(|r| r.participant_id.0 != 99));
        assert_eq!(h.engine.pot_for(day(MON)).unwrap(), Points::zero());
    }

    #[test]
    fn banned_participant_still_pays() {
        let h = Harness::new();
        h.engine.view_balance(ParticipantId(9), "idle").unwrap();
        h.engine.ban("@idle", 5).unwrap();

        h.clock.set(at(day(MON), 9, 0));
        assert!(matches!(
            h.engine.place_bet(ParticipantId(9), "idle", dec!(0.25)),
            Err(BetError::Banned { .. })
        ));

        h.bet_all(day(MON), &four_players());
        h.close(day(MON), dec!(0.00));
        h.engine.settle(day(MON), false).unwrap();
        assert_eq!(h.balance(9), Points::new(dec!(-10)));
    }
}

/// Weekly pot lifecycle across one trading week.
mod weekly_pot {
    use super::*;

    #[test]
    fn friday_pays_the_week_to_the_winner() {
        let h = Harness::new();
        h.engine.view_balance(ParticipantId(9), "idle").unwrap();

        for date in [day(MON), day(TUE), day(WED)] {
            h.bet_all(date, &four_players());
            h.close(date, dec!(0.00));
            h.engine.settle(date, false).unwrap();
        }
        // every day of the week reads the same pot
        assert_eq!(h.engine.pot_for(day(MON)).unwrap(), Points::new(dec!(30)));
        assert_eq!(h.engine.pot_for(day(FRI)).unwrap(), Points::new(dec!(30)));

        h.close(day(THU), dec!(0.00));
        assert!(matches!(
            h.engine.settle(day(THU), false),
            Err(SettleError::MarketClosed { .. })
        ));

        h.bet_all(day(FRI), &four_players());
        h.close(day(FRI), dec!(0.00));
        let report = h.engine.settle(day(FRI), false).unwrap().report;

        assert_eq!(report.pot_after_accrual, Points::new(dec!(40)));
        let award = report.pot_award.clone().unwrap();
        assert_eq!(award.participant_id, ParticipantId(1));
        assert_eq!(award.amount, Points::new(dec!(40)));
        assert_eq!(report.total_for(ParticipantId(1)), Some(Points::new(dec!(193))));

        assert_eq!(h.engine.pot_for(day(FRI)).unwrap(), Points::zero());
        assert_eq!(h.balance(1), Points::new(dec!(652)));
        assert_eq!(h.balance(9), Points::new(dec!(-40)));
        // penalties collected during the week went back out through the pot
        assert_eq!(h.ledger_total(), Points::zero());
    }

    #[test]
    fn exact_guesser_wins_the_pot() {
        let h = Harness::new();
        h.engine.view_balance(ParticipantId(9), "idle").unwrap();
        h.bet_all(
            day(FRI),
            &[(1, "A", dec!(1.00)), (2, "B", dec!(-1.00)), (3, "C", dec!(0.50)), (4, "D", dec!(-0.50))],
        );
        h.close(day(FRI), dec!(0.50));

        let report = h.engine.settle(day(FRI), false).unwrap().report;
        assert_eq!(report.pot_award.as_ref().map(|a| a.participant_id), Some(ParticipantId(3)));
        assert_eq!(h.balance(3), Points::new(dec!(320)));
    }

    #[test]
    fn empty_pot_pays_nothing() {
        let h = Harness::new();
        h.bet_all(day(FRI), &four_players());
        h.close(day(FRI), dec!(0.00));

        let report = h.engine.settle(day(FRI), false).unwrap().report;
        assert!(report.pot_award.is_none());
        assert_eq!(h.balance(1), Points::new(dec!(153)));
    }
}

/// Refusals that must leave the ledger untouched.
mod preconditions {
    use super::*;

    #[test]
    fn market_still_open() {
        let h = Harness::new();
        h.bet_all(day(MON), &four_players());
        h.oracle.set_change(day(MON), Percent::new(dec!(0)));
        h.clock.set(at(day(MON), 16, 0));

        let err = h.engine.settle(day(MON), false).unwrap_err();
        assert!(matches!(err, SettleError::MarketStillOpen { .. }));
        assert!(err.is_retryable());
        assert!(h.engine.settlement_report(day(MON)).unwrap().is_none());
        assert!(h.engine.get_leaderboard().unwrap().is_empty());

        // retroactive skips the close check
        assert!(h.engine.settle(day(MON), true).is_ok());
    }

    #[test]
    fn weekend_is_closed() {
        let h = Harness::new();
        h.close(day(SAT), dec!(1.00));
        assert!(matches!(
            h.engine.settle(day(SAT), true),
            Err(SettleError::MarketClosed { .. })
        ));
    }

    #[test]
    fn no_predictions() {
        let h = Harness::new();
        h.engine.view_balance(ParticipantId(9), "idle").unwrap();
        h.close(day(TUE), dec!(1.00));

        assert!(matches!(
            h.engine.settle(day(TUE), false),
            Err(SettleError::NoPredictions { .. })
        ));
        assert_eq!(h.balance(9), Points::zero());
        assert_eq!(h.engine.pot_for(day(TUE)).unwrap(), Points::zero());
        assert!(h.engine.settlement_report(day(TUE)).unwrap().is_none());
    }

    #[test]
    fn oracle_unavailable_then_retry() {
        let h = Harness::new();
        h.engine.view_balance(ParticipantId(9), "idle").unwrap();
        h.bet_all(day(WED), &four_players());
        h.clock.set(at(day(WED), 22, 15));

        assert!(matches!(
            h.engine.settle(day(WED), false),
            Err(SettleError::OracleUnavailable { .. })
        ));
        assert_eq!(h.balance(9), Points::zero());
        assert!(h.engine.settlement_report(day(WED)).unwrap().is_none());

        h.oracle.set_change(day(WED), Percent::new(dec!(0)));
        let settlement = h.engine.settle(day(WED), false).unwrap();
        assert!(!settlement.from_cache);
        assert_eq!(h.balance(9), Points::new(dec!(-10)));
    }
}

/// A settled date is terminal.
mod idempotence {
    use super::*;

    #[test]
    fn second_call_serves_the_cache() {
        let h = Harness::new();
        h.engine.view_balance(ParticipantId(9), "idle").unwrap();
        h.bet_all(day(MON), &four_players());
        h.close(day(MON), dec!(0.00));

        let first = h.engine.settle(day(MON), false).unwrap();
        // a revised quote must not change a settled day
        h.oracle.set_change(day(MON), Percent::new(dec!(3.00)));
        let second = h.engine.settle(day(MON), false).unwrap();

        assert!(second.from_cache);
        assert_eq!(first.report, second.report);
        assert_eq!(h.balance(1), Points::new(dec!(153)));
        assert_eq!(h.balance(9), Points::new(dec!(-10)));
        assert_eq!(h.engine.pot_for(day(MON)).unwrap(), Points::new(dec!(10)));
    }

    #[test]
    fn cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let first = {
            let h = Harness::with_store(Store::open(&path).unwrap());
            h.bet_all(day(MON), &four_players());
            h.close(day(MON), dec!(0.00));
            h.engine.settle(day(MON), false).unwrap()
        };

        // no realized change available this time: only the cache can answer
        let h = Harness::with_store(Store::open(&path).unwrap());
        h.clock.set(at(day(MON), 23, 0));
        let again = h.engine.settle(day(MON), false).unwrap();

        assert!(again.from_cache);
        assert_eq!(again.report, first.report);
        assert_eq!(h.balance(1), Points::new(dec!(153)));
        assert_eq!(h.ledger_total(), Points::zero());
    }

    #[test]
    fn concurrent_settles_apply_once() {
        let h = Harness::new();
        h.engine.view_balance(ParticipantId(9), "idle").unwrap();
        h.bet_all(day(MON), &four_players());
        h.close(day(MON), dec!(0.00));

        let results: Vec<Settlement> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let engine = h.engine.clone();
                    s.spawn(move || engine.settle(day(MON), false).unwrap())
                })
                .collect();
            handles.into_iter().map(|j| j.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| !r.from_cache).count(), 1);
        assert!(results.iter().all(|r| r.report == results[0].report));
        assert_eq!(h.balance(1), Points::new(dec!(153)));
        assert_eq!(h.balance(9), Points::new(dec!(-10)));
        assert_eq!(h.engine.pot_for(day(MON)).unwrap(), Points::new(dec!(10)));
    }

    #[test]
    fn different_dates_settle_independently() {
        let h = Harness::new();
        h.bet_all(day(MON), &four_players());
        h.bet_all(day(TUE), &four_players());
        h.oracle.set_change(day(MON), Percent::new(dec!(0)));
        h.oracle.set_change(day(TUE), Percent::new(dec!(0)));
        h.clock.set(at(day(TUE), 22, 15));

        std::thread::scope(|s| {
            for date in [day(MON), day(TUE)] {
                let engine = h.engine.clone();
                s.spawn(move || engine.settle(date, false).unwrap());
            }
        });

        assert_eq!(h.balance(1), Points::new(dec!(306)));
        assert_eq!(h.balance(4), Points::new(dec!(-306)));
    }
}

/// A failure anywhere inside the settlement transaction undoes all of it.
mod rollback {
    use super::*;

    #[test]
    fn failed_cache_write_undoes_everything() {
        let h = Harness::new();
        h.engine.view_balance(ParticipantId(9), "idle").unwrap();
        h.bet_all(day(MON), &four_players());
        h.close(day(MON), dec!(0.00));

        // the cache insert is the last write of a settlement
        h.engine
            .store()
            .with_conn(|c| {
                c.execute_batch(
                    "CREATE TRIGGER reject_results BEFORE INSERT ON settlement_results
                     BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
                )?;
                Ok(())
            })
            .unwrap();

        let err = h.engine.settle(day(MON), false).unwrap_err();
        assert!(matches!(err, SettleError::Store(_)));
        assert!(!err.is_retryable());

        assert_eq!(h.balance(9), Points::zero());
        assert_eq!(h.engine.get_leaderboard().unwrap().len(), 1);
        assert_eq!(h.engine.pot_for(day(MON)).unwrap(), Points::zero());
        assert!(h.engine.settlement_report(day(MON)).unwrap().is_none());

        h.engine
            .store()
            .with_conn(|c| {
                c.execute_batch("DROP TRIGGER reject_results;")?;
                Ok(())
            })
            .unwrap();

        let settlement = h.engine.settle(day(MON), false).unwrap();
        assert!(!settlement.from_cache);
        assert_eq!(h.balance(1), Points::new(dec!(153)));
        assert_eq!(h.balance(9), Points::new(dec!(-10)));
    }
}
