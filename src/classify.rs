use serde::{Deserialize, Serialize};

use crate::fingerprint::{BettingPattern, NormalizedFeatures};
use crate::situation::{Situation, Street};

/// Computation tiers ordered by cost and latency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Cheap,
    Moderate,
    Expensive,
}

impl Tier {
    /// Next cheaper tier, if any.
    pub fn downgrade(self) -> Option<Tier> {
        match self {
            Tier::Expensive => Some(Tier::Moderate),
            Tier::Moderate => Some(Tier::Cheap),
            Tier::Cheap => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Cheap => "cheap",
            Tier::Moderate => "moderate",
            Tier::Expensive => "expensive",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClassifierConfig {
    /// Strength bucket at or below which a raised preflop pot is a trivial fold.
    pub trivial_fold_bucket: u8,
    /// Pot-odds bucket at or below which calling is automatic.
    pub overwhelming_odds_bucket: u8,
    /// River bet-to-pot ratio that forces the expensive tier in multi-way pots.
    pub large_river_bet_ratio: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            trivial_fold_bucket: 1,
            overwhelming_odds_bucket: 1,
            large_river_bet_ratio: 0.6,
        }
    }
}

/// Deterministic rule evaluation, force-cheap rules strictly before
/// force-expensive ones so no situation is ambiguous between tiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TierClassifier {
    config: ClassifierConfig,
}

impl TierClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, features: &NormalizedFeatures, situation: &Situation) -> Tier {
        if self.force_cheap(features, situation) {
            return Tier::Cheap;
        }
        if self.force_expensive(features, situation) {
            return Tier::Expensive;
        }
        Tier::Moderate
    }

    fn force_cheap(&self, features: &NormalizedFeatures, situation: &Situation) -> bool {
        // Trivial preflop fold: junk hand facing a raise.
        if features.street == Street::Preflop
            && features.strength_bucket <= self.config.trivial_fold_bucket
            && situation.to_call > situation.big_blind
        {
            return true;
        }
        // Overwhelming pot odds: the call costs next to nothing.
        if situation.to_call > 0.0 && features.pot_odds_bucket <= self.config.overwhelming_odds_bucket
        {
            return true;
        }
        false
    }

    fn force_expensive(&self, features: &NormalizedFeatures, situation: &Situation) -> bool {
        if features.pattern == BettingPattern::Anomalous {
            return true;
        }
        // Repeated 3-bet action.
        if matches!(
            features.pattern,
            BettingPattern::ThreeBet | BettingPattern::FourBetPlus
        ) {
            return true;
        }
        // Multi-way pot facing a large river bet.
        if features.street == Street::River
            && situation.active_players() >= 3
            && situation.to_call >= self.config.large_river_bet_ratio * situation.pot
        {
            return true;
        }
        false
    }
}
