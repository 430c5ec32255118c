//! Property-based tests for the scoring math and the ledger.
//!
//! These tests verify invariants hold under random prediction sets.

use chrono::NaiveDate;
use predictor_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 18).unwrap()
}

// Strategies for generating test data

// distinct predicted values in hundredths, -10.00% to +10.00%
fn values_strategy(min: usize, max: usize) -> impl Strategy<Value = Vec<i64>> {
    proptest::collection::hash_set(-1000i64..=1000i64, min..max).prop_map(|s| s.into_iter().collect())
}

fn realized_strategy() -> impl Strategy<Value = i64> {
    -1000i64..=1000i64
}

fn predictions(values: &[i64]) -> Vec<Prediction> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| Prediction::new(ParticipantId(i as i64 + 1), format!("p{}", i + 1), Percent::from_cents(*v), day()))
        .collect()
}

fn total_sum(board: &Scoreboard) -> Decimal {
    board.entries.iter().map(|e| e.total().value()).sum()
}

proptest! {
    /// Ranks run 1..=N in ascending error order
    #[test]
    fn ranking_is_sorted_and_dense(
        values in values_strategy(1, 15),
        realized in realized_strategy(),
    ) {
        let board = score(&predictions(&values), Percent::from_cents(realized), &ScoringParams::default());

        prop_assert_eq!(board.entries.len(), values.len());
        for (i, pair) in board.entries.windows(2).enumerate() {
            prop_assert!(pair[0].diff <= pair[1].diff);
            prop_assert_eq!(pair[0].rank, i + 1);
        }
    }

    /// Variable transfers are zero-sum in both branches
    #[test]
    fn variable_component_is_zero_sum(
        values in values_strategy(1, 15),
        realized in realized_strategy(),
    ) {
        let board = score(&predictions(&values), Percent::from_cents(realized), &ScoringParams::default());
        prop_assert_eq!(board.variable_sum(), Points::zero());
    }

    /// Without an exact guess an odd field leaves the middle rank at zero
    #[test]
    fn odd_middle_gets_nothing(
        values in values_strategy(1, 15),
        realized in realized_strategy(),
    ) {
        prop_assume!(values.len() % 2 == 1);
        prop_assume!(!values.contains(&realized));

        let board = score(&predictions(&values), Percent::from_cents(realized), &ScoringParams::default());
        let mid = &board.entries[values.len() / 2];
        prop_assert_eq!(mid.fixed, Points::zero());
        prop_assert_eq!(mid.variable, Points::zero());
    }

    /// Six or more players with no exact guess: fixed prizes cancel, so the day is zero-sum
    #[test]
    fn large_ordinary_field_is_zero_sum(
        values in values_strategy(6, 20),
        realized in realized_strategy(),
    ) {
        prop_assume!(!values.contains(&realized));

        let board = score(&predictions(&values), Percent::from_cents(realized), &ScoringParams::default());
        prop_assert_eq!(&board.kind, &ScoreKind::Ordinary);
        prop_assert_eq!(total_sum(&board), Decimal::ZERO);
    }

    /// The exact guesser is rank 1 and earns the prize plus the whole pool
    #[test]
    fn exact_guess_credit(
        values in values_strategy(4, 15),
        pick in any::<prop::sample::Index>(),
    ) {
        let realized = values[pick.index(values.len())];
        let board = score(&predictions(&values), Percent::from_cents(realized), &ScoringParams::default());

        let ScoreKind::PerfectGuess { participant_id, variable_pool } = board.kind.clone() else {
            return Err(TestCaseError::fail("expected a perfect guess"));
        };
        let guesser = &board.entries[0];
        prop_assert_eq!(guesser.participant_id, participant_id);
        prop_assert_eq!(guesser.fixed, Points::new(dec!(300)));
        prop_assert_eq!(guesser.total(), Points::new(dec!(300)).add(variable_pool));
        prop_assert!(!variable_pool.is_negative());
        prop_assert_eq!(board.winner().map(|w| w.participant_id), Some(participant_id));
    }

    /// Balances after one settlement add up to the report's net ledger change
    #[test]
    fn ledger_matches_report(
        values in values_strategy(1, 10),
        realized in realized_strategy(),
        idle in 0usize..4,
    ) {
        let clock = Arc::new(ManualClock::new(day().and_hms_opt(9, 0, 0).unwrap()));
        let oracle = Arc::new(StaticOracle::new().with_change(day(), Percent::from_cents(realized)));
        let engine = SettlementEngine::new(
            EngineConfig::default(),
            Arc::new(Store::open_in_memory().unwrap()),
            oracle,
            clock.clone(),
        );

        for i in 0..idle {
            engine.view_balance(ParticipantId(1000 + i as i64), &format!("idle{i}")).unwrap();
        }
        for p in predictions(&values) {
            engine.place_bet(p.participant_id, &p.display_name, p.value.value()).unwrap();
        }

        clock.set(day().and_hms_opt(22, 30, 0).unwrap());
        let report = engine.settle(day(), false).unwrap().report;

        let ledger: Points = engine.get_leaderboard().unwrap().iter().map(|r| r.balance).sum();
        prop_assert_eq!(ledger, report.net_ledger_change());
        prop_assert_eq!(report.non_bettors.len(), idle);
        prop_assert_eq!(engine.pot_for(day()).unwrap(), Points::new(Decimal::from(idle as i64 * 10)));
    }
}
