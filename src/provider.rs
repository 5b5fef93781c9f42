use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::fingerprint::Normalizer;
use crate::situation::{Decision, Situation};
use crate::strategy::simulated_decision;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("provider timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Narrow seam to the expensive reasoning collaborator. The router treats
/// every error as "tier unavailable" and downgrades instead of failing.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    async fn compute(
        &self,
        situation: &Situation,
        timeout: Duration,
    ) -> Result<Decision, ProviderError>;
}

/// Local stand-in for the expensive tier: a high-sample seeded simulation.
/// Used by the CLI and as a default when no remote provider is wired in.
pub struct DeepSimProvider {
    samples: u32,
}

impl DeepSimProvider {
    pub fn new(samples: u32) -> Self {
        Self { samples: samples.max(1) }
    }
}

impl Default for DeepSimProvider {
    fn default() -> Self {
        Self::new(2_000)
    }
}

#[async_trait]
impl ReasoningProvider for DeepSimProvider {
    async fn compute(
        &self,
        situation: &Situation,
        _timeout: Duration,
    ) -> Result<Decision, ProviderError> {
        let normalizer = Normalizer::default();
        let features = normalizer
            .normalize(situation)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let seed = normalizer.fingerprint(&features).seed();
        Ok(simulated_decision(situation, self.samples, seed, 0.92))
    }
}
