use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cards::{deal_unique_cards, Card};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Street {
    Preflop,
    Flop,
    Turn,
    River,
}

impl Street {
    pub fn label(self) -> &'static str {
        match self {
            Street::Preflop => "preflop",
            Street::Flop => "flop",
            Street::Turn => "turn",
            Street::River => "river",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TablePosition {
    UnderTheGun,
    Middle,
    Cutoff,
    Button,
    SmallBlind,
    BigBlind,
}

impl TablePosition {
    pub const ALL: [TablePosition; 6] = [
        TablePosition::UnderTheGun,
        TablePosition::Middle,
        TablePosition::Cutoff,
        TablePosition::Button,
        TablePosition::SmallBlind,
        TablePosition::BigBlind,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Fold,
    Check,
    Call,
    Bet,
    Raise,
    AllIn,
}

/// One entry of the betting history, in the order actions occurred.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedAction {
    pub street: Street,
    pub seat: usize,
    pub kind: ActionKind,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerState {
    pub stack: f64,
    #[serde(default)]
    pub folded: bool,
}

/// A raw game situation as received from the agent. Immutable for the
/// duration of one decision request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Situation {
    pub hole_cards: Vec<Card>,
    #[serde(default)]
    pub board: Vec<Card>,
    pub pot: f64,
    pub to_call: f64,
    pub big_blind: f64,
    pub position: TablePosition,
    pub players: Vec<PlayerState>,
    #[serde(default)]
    pub history: Vec<RecordedAction>,
}

impl Situation {
    /// Players still contesting the pot.
    pub fn active_players(&self) -> usize {
        self.players.iter().filter(|p| !p.folded).count()
    }

    /// Smallest stack among active players, the amount that can still go in.
    pub fn effective_stack(&self) -> f64 {
        self.players
            .iter()
            .filter(|p| !p.folded)
            .map(|p| p.stack)
            .fold(f64::INFINITY, f64::min)
            .max(0.0)
    }

    /// Generates a random but legal situation, used by the CLI sampler and
    /// smoke tests.
    pub fn sample<R: Rng>(rng: &mut R) -> Self {
        let board_len = *[0usize, 3, 4, 5].choose(rng).unwrap_or(&0);
        let cards = deal_unique_cards(rng, 2 + board_len, &[]);
        let hole_cards = cards[..2].to_vec();
        let board = cards[2..].to_vec();

        let big_blind = 2.0;
        let pot = big_blind * rng.gen_range(1.5..20.0);
        let to_call = if rng.gen_bool(0.3) {
            0.0
        } else {
            big_blind * rng.gen_range(0.5..6.0)
        };
        let players = (0..rng.gen_range(2..=6))
            .map(|_| PlayerState {
                stack: big_blind * rng.gen_range(10.0..120.0),
                folded: false,
            })
            .collect();
        let position = *TablePosition::ALL.choose(rng).unwrap_or(&TablePosition::Button);

        Self {
            hole_cards,
            board,
            pot,
            to_call,
            big_blind,
            position,
            players,
            history: Vec::new(),
        }
    }
}

/// The router's answer for one situation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub action: ActionKind,
    pub amount: Option<f64>,
    pub confidence: f32,
    pub reasoning: Option<String>,
    pub latency_ms: u64,
}

impl Decision {
    pub fn new(action: ActionKind, amount: Option<f64>, confidence: f32) -> Self {
        Self {
            action,
            amount,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: None,
            latency_ms: 0,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}
