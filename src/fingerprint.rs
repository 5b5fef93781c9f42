use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::situation::{ActionKind, Situation, Street, TablePosition};
use crate::strength::strength_score;

/// Version of the normalization scheme. Bumping any bucket width or the
/// canonical serialization requires bumping this, which invalidates every
/// previously written cache key.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("expected exactly 2 hole cards, got {0}")]
    HoleCardCount(usize),
    #[error("board must have 0, 3, 4 or 5 cards, got {0}")]
    BoardSize(usize),
    #[error("duplicate card {0} in situation")]
    DuplicateCard(String),
    #[error("big blind must be positive, got {0}")]
    NonPositiveBlind(f64),
    #[error("pot must be positive, got {0}")]
    NonPositivePot(f64),
    #[error("call amount may not be negative, got {0}")]
    NegativeCall(f64),
    #[error("at least 2 players required, got {0}")]
    TooFewPlayers(usize),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PositionClass {
    Early,
    Middle,
    Late,
    Blinds,
}

impl PositionClass {
    fn from_table(position: TablePosition) -> Self {
        match position {
            TablePosition::UnderTheGun => PositionClass::Early,
            TablePosition::Middle => PositionClass::Middle,
            TablePosition::Cutoff | TablePosition::Button => PositionClass::Late,
            TablePosition::SmallBlind | TablePosition::BigBlind => PositionClass::Blinds,
        }
    }

    fn code(self) -> &'static str {
        match self {
            PositionClass::Early => "ep",
            PositionClass::Middle => "mp",
            PositionClass::Late => "lp",
            PositionClass::Blinds => "bl",
        }
    }
}

/// Betting-pattern signature derived from the hand's history. Evaluated in
/// a fixed order so one history never maps to two patterns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BettingPattern {
    Unopened,
    Limped,
    SingleRaised,
    ThreeBet,
    FourBetPlus,
    CheckRaise,
    Anomalous,
}

impl BettingPattern {
    fn code(self) -> &'static str {
        match self {
            BettingPattern::Unopened => "none",
            BettingPattern::Limped => "limp",
            BettingPattern::SingleRaised => "1r",
            BettingPattern::ThreeBet => "3b",
            BettingPattern::FourBetPlus => "4b+",
            BettingPattern::CheckRaise => "xr",
            BettingPattern::Anomalous => "anom",
        }
    }
}

/// Fixed-shape feature tuple derived deterministically from a situation.
/// Feeds both the fingerprint digest and the similarity metric.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NormalizedFeatures {
    pub street: Street,
    pub strength_bucket: u8,
    pub pot_odds_bucket: u8,
    pub position: PositionClass,
    pub pattern: BettingPattern,
    pub stack_bucket: u8,
}

impl NormalizedFeatures {
    /// Canonical serialization; the digest input. Field order is part of the
    /// schema.
    pub fn canonical_string(&self) -> String {
        format!(
            "{}|hs{}|po{}|{}|{}|sd{}",
            self.street.label(),
            self.strength_bucket,
            self.pot_odds_bucket,
            self.position.code(),
            self.pattern.code(),
            self.stack_bucket,
        )
    }
}

/// Weighted per-field mismatch distance between two feature tuples.
/// Entries from different streets are never comparable.
pub fn feature_distance(a: &NormalizedFeatures, b: &NormalizedFeatures) -> f64 {
    if a.street != b.street {
        return f64::INFINITY;
    }
    let mut distance = 0.0;
    distance += 0.02 * a.strength_bucket.abs_diff(b.strength_bucket) as f64;
    distance += 0.02 * a.pot_odds_bucket.abs_diff(b.pot_odds_bucket) as f64;
    distance += 0.015 * a.stack_bucket.abs_diff(b.stack_bucket) as f64;
    if a.position != b.position {
        distance += 0.04;
    }
    if a.pattern != b.pattern {
        distance += 0.10;
    }
    distance
}

/// Stable digest of a feature tuple, prefixed with the schema version.
/// Doubles as the cache key and the single-flight key; entries written
/// under another schema version can never collide with it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic RNG seed for this fingerprint, so local simulation
    /// tiers give the same answer to the same normalized situation.
    pub fn seed(&self) -> u64 {
        let digest = Sha256::digest(self.0.as_bytes());
        u64::from_be_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ])
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NormalizerConfig {
    /// Width of one hand-strength bucket on the 0..=100 score axis.
    pub strength_bucket_width: u8,
    /// Pot-odds granularity; odds are rounded to multiples of this.
    pub pot_odds_granularity: f64,
    /// Width of one stack-depth bucket, in big blinds of effective stack.
    pub stack_bucket_width_bb: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            strength_bucket_width: 10,
            pot_odds_granularity: 0.05,
            stack_bucket_width_bb: 25.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Pure, deterministic mapping from a raw situation to its feature
    /// tuple. Semantically irrelevant differences (a pot of 501 vs 505 with
    /// the same rounded pot odds) land in the same tuple.
    pub fn normalize(&self, situation: &Situation) -> Result<NormalizedFeatures, NormalizeError> {
        validate(situation)?;

        let street = match situation.board.len() {
            0 => Street::Preflop,
            3 => Street::Flop,
            4 => Street::Turn,
            5 => Street::River,
            n => return Err(NormalizeError::BoardSize(n)),
        };

        let score = strength_score(&situation.hole_cards, &situation.board);
        let strength_bucket = score / self.config.strength_bucket_width.max(1);

        let pot_odds = situation.to_call / (situation.pot + situation.to_call);
        let pot_odds_bucket = (pot_odds / self.config.pot_odds_granularity).round() as u8;

        let depth = situation.effective_stack() / situation.big_blind;
        let stack_bucket = ((depth / self.config.stack_bucket_width_bb) as u8).min(8);

        Ok(NormalizedFeatures {
            street,
            strength_bucket,
            pot_odds_bucket,
            position: PositionClass::from_table(situation.position),
            pattern: betting_pattern(situation, street),
            stack_bucket,
        })
    }

    pub fn fingerprint(&self, features: &NormalizedFeatures) -> Fingerprint {
        let digest = Sha256::digest(features.canonical_string().as_bytes());
        Fingerprint(format!("v{}:{}", SCHEMA_VERSION, hex::encode(&digest[..16])))
    }
}

fn validate(situation: &Situation) -> Result<(), NormalizeError> {
    if situation.hole_cards.len() != 2 {
        return Err(NormalizeError::HoleCardCount(situation.hole_cards.len()));
    }
    if !matches!(situation.board.len(), 0 | 3 | 4 | 5) {
        return Err(NormalizeError::BoardSize(situation.board.len()));
    }
    let mut seen = Vec::with_capacity(7);
    for card in situation.hole_cards.iter().chain(situation.board.iter()) {
        if seen.contains(card) {
            return Err(NormalizeError::DuplicateCard(card.notation()));
        }
        seen.push(*card);
    }
    if situation.big_blind <= 0.0 {
        return Err(NormalizeError::NonPositiveBlind(situation.big_blind));
    }
    if situation.pot <= 0.0 {
        return Err(NormalizeError::NonPositivePot(situation.pot));
    }
    if situation.to_call < 0.0 {
        return Err(NormalizeError::NegativeCall(situation.to_call));
    }
    if situation.players.len() < 2 {
        return Err(NormalizeError::TooFewPlayers(situation.players.len()));
    }
    Ok(())
}

fn betting_pattern(situation: &Situation, street: Street) -> BettingPattern {
    let history = &situation.history;

    // Anomaly checks come first: a malformed aggressive amount or an
    // impossible sequence disqualifies the hand from any known template.
    for action in history {
        let aggressive = matches!(action.kind, ActionKind::Bet | ActionKind::Raise);
        if aggressive && action.amount.map(|a| a <= 0.0).unwrap_or(true) {
            return BettingPattern::Anomalous;
        }
    }
    // Aggressive amounts must grow within a street; the bar resets when the
    // action moves to the next street. All-ins with a recorded amount count.
    let mut last_raise_to = 0.0f64;
    let mut prev_street = None;
    for action in history {
        if prev_street.is_some() && prev_street != Some(action.street) {
            last_raise_to = 0.0;
        }
        prev_street = Some(action.street);
        if matches!(
            action.kind,
            ActionKind::Bet | ActionKind::Raise | ActionKind::AllIn
        ) {
            if let Some(amount) = action.amount {
                if amount <= last_raise_to {
                    return BettingPattern::Anomalous;
                }
                last_raise_to = amount;
            }
        }
    }

    // Check-raise on the current street takes priority over raise counting.
    let mut saw_check = false;
    for action in history.iter().filter(|a| a.street == street) {
        match action.kind {
            ActionKind::Check => saw_check = true,
            ActionKind::Bet | ActionKind::Raise if saw_check => {
                return BettingPattern::CheckRaise;
            }
            _ => {}
        }
    }

    let raises = history
        .iter()
        .filter(|a| matches!(a.kind, ActionKind::Bet | ActionKind::Raise | ActionKind::AllIn))
        .count();
    match raises {
        0 if history.iter().any(|a| a.kind == ActionKind::Call) => BettingPattern::Limped,
        0 => BettingPattern::Unopened,
        1 => BettingPattern::SingleRaised,
        2 => BettingPattern::ThreeBet,
        _ => BettingPattern::FourBetPlus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::situation::{PlayerState, RecordedAction};

    fn base_situation() -> Situation {
        Situation {
            hole_cards: vec!["As".parse().unwrap(), "Kd".parse().unwrap()],
            board: vec![],
            pot: 6.0,
            to_call: 2.0,
            big_blind: 2.0,
            position: TablePosition::Button,
            players: vec![
                PlayerState { stack: 100.0, folded: false },
                PlayerState { stack: 120.0, folded: false },
            ],
            history: vec![],
        }
    }

    #[test]
    fn equal_features_yield_equal_fingerprints() {
        let normalizer = Normalizer::default();
        let a = base_situation();
        let mut b = base_situation();
        // Same rounded pot odds bucket, different raw chip counts.
        b.pot = 6.2;
        b.to_call = 2.05;

        let fa = normalizer.normalize(&a).unwrap();
        let fb = normalizer.normalize(&b).unwrap();
        assert_eq!(fa, fb);
        assert_eq!(normalizer.fingerprint(&fa), normalizer.fingerprint(&fb));
    }

    #[test]
    fn fingerprint_embeds_schema_version() {
        let normalizer = Normalizer::default();
        let features = normalizer.normalize(&base_situation()).unwrap();
        let fingerprint = normalizer.fingerprint(&features);
        assert!(fingerprint.as_str().starts_with("v1:"));
    }

    #[test]
    fn seed_is_stable() {
        let normalizer = Normalizer::default();
        let features = normalizer.normalize(&base_situation()).unwrap();
        let fp = normalizer.fingerprint(&features);
        assert_eq!(fp.seed(), normalizer.fingerprint(&features).seed());
    }

    #[test]
    fn duplicate_cards_rejected() {
        let mut situation = base_situation();
        situation.board = vec!["As".parse().unwrap(), "2c".parse().unwrap(), "7h".parse().unwrap()];
        let err = Normalizer::default().normalize(&situation).unwrap_err();
        assert!(matches!(err, NormalizeError::DuplicateCard(_)));
    }

    #[test]
    fn invalid_board_size_rejected() {
        let mut situation = base_situation();
        situation.board = vec!["2c".parse().unwrap(), "7h".parse().unwrap()];
        let err = Normalizer::default().normalize(&situation).unwrap_err();
        assert!(matches!(err, NormalizeError::BoardSize(2)));
    }

    #[test]
    fn three_bet_pattern_detected() {
        let mut situation = base_situation();
        situation.history = vec![
            RecordedAction {
                street: Street::Preflop,
                seat: 0,
                kind: ActionKind::Raise,
                amount: Some(6.0),
            },
            RecordedAction {
                street: Street::Preflop,
                seat: 1,
                kind: ActionKind::Raise,
                amount: Some(18.0),
            },
        ];
        let features = Normalizer::default().normalize(&situation).unwrap();
        assert_eq!(features.pattern, BettingPattern::ThreeBet);
    }

    #[test]
    fn shrinking_raise_is_anomalous() {
        let mut situation = base_situation();
        situation.history = vec![
            RecordedAction {
                street: Street::Preflop,
                seat: 0,
                kind: ActionKind::Raise,
                amount: Some(10.0),
            },
            RecordedAction {
                street: Street::Preflop,
                seat: 1,
                kind: ActionKind::Raise,
                amount: Some(4.0),
            },
        ];
        let features = Normalizer::default().normalize(&situation).unwrap();
        assert_eq!(features.pattern, BettingPattern::Anomalous);
    }

    #[test]
    fn shrinking_raise_on_earlier_street_is_anomalous() {
        let mut situation = base_situation();
        situation.board = vec![
            "2c".parse().unwrap(),
            "7h".parse().unwrap(),
            "Js".parse().unwrap(),
            "9d".parse().unwrap(),
            "3s".parse().unwrap(),
        ];
        situation.history = vec![
            RecordedAction {
                street: Street::Flop,
                seat: 0,
                kind: ActionKind::Raise,
                amount: Some(10.0),
            },
            RecordedAction {
                street: Street::Flop,
                seat: 1,
                kind: ActionKind::Raise,
                amount: Some(4.0),
            },
        ];
        let features = Normalizer::default().normalize(&situation).unwrap();
        assert_eq!(features.pattern, BettingPattern::Anomalous);
    }

    #[test]
    fn all_in_below_prior_raise_is_anomalous() {
        let mut situation = base_situation();
        situation.history = vec![
            RecordedAction {
                street: Street::Preflop,
                seat: 0,
                kind: ActionKind::Raise,
                amount: Some(10.0),
            },
            RecordedAction {
                street: Street::Preflop,
                seat: 1,
                kind: ActionKind::AllIn,
                amount: Some(4.0),
            },
        ];
        let features = Normalizer::default().normalize(&situation).unwrap();
        assert_eq!(features.pattern, BettingPattern::Anomalous);
    }

    #[test]
    fn fresh_street_resets_the_raise_bar() {
        let mut situation = base_situation();
        situation.board = vec![
            "2c".parse().unwrap(),
            "7h".parse().unwrap(),
            "Js".parse().unwrap(),
            "9d".parse().unwrap(),
        ];
        situation.history = vec![
            RecordedAction {
                street: Street::Flop,
                seat: 0,
                kind: ActionKind::Bet,
                amount: Some(10.0),
            },
            RecordedAction {
                street: Street::Turn,
                seat: 0,
                kind: ActionKind::Bet,
                amount: Some(4.0),
            },
        ];
        let features = Normalizer::default().normalize(&situation).unwrap();
        assert_ne!(features.pattern, BettingPattern::Anomalous);
    }

    #[test]
    fn check_raise_detected_on_current_street() {
        let mut situation = base_situation();
        situation.board = vec![
            "2c".parse().unwrap(),
            "7h".parse().unwrap(),
            "Js".parse().unwrap(),
        ];
        situation.history = vec![
            RecordedAction {
                street: Street::Flop,
                seat: 1,
                kind: ActionKind::Check,
                amount: None,
            },
            RecordedAction {
                street: Street::Flop,
                seat: 0,
                kind: ActionKind::Bet,
                amount: Some(4.0),
            },
        ];
        let features = Normalizer::default().normalize(&situation).unwrap();
        assert_eq!(features.pattern, BettingPattern::CheckRaise);
    }

    #[test]
    fn street_mismatch_is_incomparable() {
        let normalizer = Normalizer::default();
        let preflop = normalizer.normalize(&base_situation()).unwrap();
        let mut flop_situation = base_situation();
        flop_situation.board = vec![
            "2c".parse().unwrap(),
            "7h".parse().unwrap(),
            "Js".parse().unwrap(),
        ];
        let flop = normalizer.normalize(&flop_situation).unwrap();
        assert!(feature_distance(&preflop, &flop).is_infinite());
    }

    #[test]
    fn adjacent_bucket_distance_is_small() {
        let a = NormalizedFeatures {
            street: Street::Flop,
            strength_bucket: 5,
            pot_odds_bucket: 4,
            position: PositionClass::Late,
            pattern: BettingPattern::SingleRaised,
            stack_bucket: 3,
        };
        let mut b = a;
        b.strength_bucket = 6;
        let d = feature_distance(&a, &b);
        assert!(d > 0.0 && d <= 0.05, "adjacent buckets within threshold, got {d}");

        let mut c = a;
        c.pattern = BettingPattern::ThreeBet;
        assert!(feature_distance(&a, &c) > 0.05);
    }
}
