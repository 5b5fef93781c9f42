pub mod budget;
pub mod cache;
pub mod cards;
pub mod classify;
pub mod fingerprint;
pub mod inflight;
pub mod provider;
pub mod router;
pub mod situation;
pub mod strategy;
pub mod strength;

pub use classify::Tier;
pub use router::{DecisionRouter, DecisionSource, RoutedDecision, RouterConfig};
pub use situation::{Decision, Situation};
