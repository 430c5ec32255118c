// 3.0: ranking and scoring. pure function from (predictions, realized move) to per-participant deltas.
// 3.1 ranks by rounded absolute error, 3.2 is the perfect-guess branch, 3.3 the ordinary branch.
// no I/O, no clock. the orchestrator owns everything around it.

use crate::types::{round2, ParticipantId, Percent, Points, Prediction};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringParams {
    // fixed rewards for rank 1, 2, 3
    pub top_rewards: [Decimal; 3],
    // fixed penalties (as magnitudes) for last, second to last, third to last
    pub bottom_penalties: [Decimal; 3],
    // fixed prize for an exact guess, replaces the three top rewards
    pub perfect_prize: Decimal,
    // scales the accuracy gap of each top/bottom pair into points
    pub risk_multiplier: Decimal,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            top_rewards: [dec!(150), dec!(100), dec!(50)],
            bottom_penalties: [dec!(150), dec!(100), dec!(50)],
            perfect_prize: dec!(300),
            risk_multiplier: dec!(5),
        }
    }
}

/// One ranked participant with the two components of their settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredEntry {
    // 1-based position after sorting by error
    pub rank: usize,
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub prediction: Percent,
    pub diff: Decimal,
    pub fixed: Points,
    pub variable: Points,
}

impl ScoredEntry {
    pub fn total(&self) -> Points {
        Points::new(self.fixed.value() + self.variable.value())
    }

    pub fn is_perfect(&self) -> bool {
        self.diff.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoreKind {
    Ordinary,
    PerfectGuess {
        participant_id: ParticipantId,
        // sum of everything the bottom half lost to the exact guesser
        variable_pool: Points,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scoreboard {
    pub realized: Percent,
    pub kind: ScoreKind,
    // ordered by rank
    pub entries: Vec<ScoredEntry>,
}

impl Scoreboard {
    pub fn is_perfect_guess(&self) -> bool {
        matches!(self.kind, ScoreKind::PerfectGuess { .. })
    }

    /// Top finisher of the day: the exact guesser if any, else the highest total
    /// with earlier rank winning ties.
    pub fn winner(&self) -> Option<&ScoredEntry> {
        if let ScoreKind::PerfectGuess { participant_id, .. } = self.kind {
            return self.entry(participant_id);
        }
        self.entries.iter().fold(None, |best: Option<&ScoredEntry>, e| match best {
            Some(b) if b.total() >= e.total() => Some(b),
            _ => Some(e),
        })
    }

    pub fn entry(&self, participant_id: ParticipantId) -> Option<&ScoredEntry> {
        self.entries.iter().find(|e| e.participant_id == participant_id)
    }

    pub fn variable_sum(&self) -> Points {
        self.entries.iter().map(|e| e.variable).sum()
    }

    /// Entries ordered by total, best first. stable on rank.
    pub fn by_total(&self) -> Vec<&ScoredEntry> {
        let mut sorted: Vec<&ScoredEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.total().cmp(&a.total()));
        sorted
    }
}

// 3.1: error per participant, stable ascending sort. equal errors keep submission order.
pub fn rank(predictions: &[Prediction], realized: Percent) -> Vec<ScoredEntry> {
    let mut entries: Vec<ScoredEntry> = predictions
        .iter()
        .map(|p| ScoredEntry {
            rank: 0,
            participant_id: p.participant_id,
            display_name: p.display_name.clone(),
            prediction: p.value,
            diff: p.value.distance(realized),
            fixed: Points::zero(),
            variable: Points::zero(),
        })
        .collect();

    entries.sort_by(|a, b| a.diff.cmp(&b.diff));
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i + 1;
    }
    entries
}

pub fn score(predictions: &[Prediction], realized: Percent, params: &ScoringParams) -> Scoreboard {
    let mut entries = rank(predictions, realized);

    let kind = match entries.iter().position(ScoredEntry::is_perfect) {
        Some(idx) => score_perfect_guess(&mut entries, idx, params),
        None => {
            score_ordinary(&mut entries, params);
            ScoreKind::Ordinary
        }
    };

    Scoreboard {
        realized,
        kind,
        entries,
    }
}

fn pair_gap(entries: &[ScoredEntry], top: usize, bottom: usize, multiplier: Decimal) -> Decimal {
    round2((entries[bottom].diff - entries[top].diff) * multiplier)
}

// 3.2: the exact guesser takes the perfect prize plus everything the bottom half loses.
// the three bottom fixed penalties still stack on top of the variable losses.
fn score_perfect_guess(entries: &mut [ScoredEntry], perfect_idx: usize, params: &ScoringParams) -> ScoreKind {
    let n = entries.len();
    let mut pool = Decimal::ZERO;

    for i in 0..n / 2 {
        let bottom = n - 1 - i;
        let loss = pair_gap(entries, i, bottom, params.risk_multiplier).abs();
        pool += loss;
        entries[bottom].variable = entries[bottom].variable.sub(Points::new(loss));
    }

    for (slot, penalty) in params.bottom_penalties.iter().enumerate() {
        if slot < n {
            let idx = n - 1 - slot;
            entries[idx].fixed = entries[idx].fixed.sub(Points::new(*penalty));
        }
    }

    let variable_pool = Points::new(pool);
    let guesser = &mut entries[perfect_idx];
    guesser.fixed = guesser.fixed.add(Points::new(params.perfect_prize));
    guesser.variable = guesser.variable.add(variable_pool);

    ScoreKind::PerfectGuess {
        participant_id: guesser.participant_id,
        variable_pool,
    }
}

// 3.3: positional fixed slots (they may overlap when fewer than six play),
// then symmetric top/bottom transfers. an odd middle gets nothing at all.
fn score_ordinary(entries: &mut [ScoredEntry], params: &ScoringParams) {
    let n = entries.len();

    for slot in 0..3 {
        if slot < n {
            entries[slot].fixed = entries[slot].fixed.add(Points::new(params.top_rewards[slot]));
            let idx = n - 1 - slot;
            entries[idx].fixed = entries[idx].fixed.sub(Points::new(params.bottom_penalties[slot]));
        }
    }

    for i in 0..n / 2 {
        let bottom = n - 1 - i;
        let delta = Points::new(pair_gap(entries, i, bottom, params.risk_multiplier));
        entries[i].variable = entries[i].variable.add(delta);
        entries[bottom].variable = entries[bottom].variable.sub(delta);
    }

    if n % 2 == 1 {
        let mid = &mut entries[n / 2];
        mid.fixed = Points::zero();
        mid.variable = Points::zero();
    }
}
