use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::budget::BudgetManager;
use crate::cache::{CacheStore, MatchPrecision};
use crate::classify::{Tier, TierClassifier};
use crate::fingerprint::{Fingerprint, NormalizeError, NormalizedFeatures, Normalizer};
use crate::inflight::{FlightError, FlightRole, InFlight};
use crate::provider::ReasoningProvider;
use crate::situation::{Decision, Situation};
use crate::strategy::{cheap_decision, moderate_decision};

#[derive(Debug, Clone, Copy)]
pub struct RouterConfig {
    /// Maximum feature distance for a similarity cache hit.
    pub similarity_threshold: f64,
    /// Sample count for the moderate tier's local simulation.
    pub moderate_samples: u32,
    /// Estimated cost units of one expensive-tier call.
    pub expensive_cost_estimate: u64,
    /// Cap on one expensive-tier call regardless of the caller's deadline.
    pub provider_timeout: Duration,
    /// Time reserved for the synchronous cheap fallback; suspension points
    /// give up once less than this remains.
    pub fallback_margin: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.05,
            moderate_samples: 300,
            expensive_cost_estimate: 25,
            provider_timeout: Duration::from_secs(10),
            fallback_margin: Duration::from_millis(25),
        }
    }
}

/// Where a routed answer came from.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    CacheExact,
    CacheSimilar,
    Computed(Tier),
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutedDecision {
    pub decision: Decision,
    pub source: DecisionSource,
    pub fingerprint: Fingerprint,
    pub request_id: Uuid,
}

/// Only malformed input is a hard failure; every other failure mode
/// degrades to a cheaper tier inside `decide`.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

/// Orchestrates normalize → cache lookup → classify → budget check →
/// compute (single-flight for the expensive tier) → cache write.
pub struct DecisionRouter {
    config: RouterConfig,
    normalizer: Normalizer,
    classifier: TierClassifier,
    cache: Arc<CacheStore>,
    budget: Arc<BudgetManager>,
    inflight: InFlight,
    provider: Arc<dyn ReasoningProvider>,
}

impl DecisionRouter {
    pub fn new(
        config: RouterConfig,
        cache: Arc<CacheStore>,
        budget: Arc<BudgetManager>,
        provider: Arc<dyn ReasoningProvider>,
    ) -> Self {
        Self {
            config,
            normalizer: Normalizer::default(),
            classifier: TierClassifier::default(),
            cache,
            budget,
            inflight: InFlight::new(),
            provider,
        }
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_classifier(mut self, classifier: TierClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Decides one situation within `deadline`. Blocks past the deadline
    /// only by the bounded cost of the synchronous cheap fallback.
    pub async fn decide(
        &self,
        situation: &Situation,
        deadline: Duration,
    ) -> Result<RoutedDecision, DecisionError> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let deadline_at = started + deadline;

        let features = self.normalizer.normalize(situation)?;
        let fingerprint = self.normalizer.fingerprint(&features);
        debug!(%request_id, %fingerprint, "situation normalized");

        if let Some(entry) = self.cache.get_exact(&fingerprint).await {
            let mut decision = entry.decision;
            decision.confidence =
                (decision.confidence - entry.confidence_adjustment).clamp(0.05, 1.0);
            return Ok(self.finish(
                request_id,
                fingerprint,
                decision,
                DecisionSource::CacheExact,
                started,
            ));
        }

        if self.out_of_time(deadline_at) {
            return Ok(self.fallback(request_id, fingerprint, &features, situation, started));
        }

        if let Some(entry) = self
            .cache
            .get_similar(&features, self.config.similarity_threshold)
        {
            let mut decision = entry.decision;
            decision.confidence =
                (decision.confidence - entry.confidence_adjustment).clamp(0.05, 1.0);
            // Write back under this fingerprint so the next identical
            // situation hits exactly; similar precision keeps the TTL short.
            self.cache
                .put(&fingerprint, features, decision.clone(), MatchPrecision::Similar)
                .await;
            return Ok(self.finish(
                request_id,
                fingerprint,
                decision,
                DecisionSource::CacheSimilar,
                started,
            ));
        }

        let mut tier = self.classifier.classify(&features, situation);
        debug!(%request_id, tier = tier.label(), "cache miss, classified");

        if tier == Tier::Expensive && !self.budget.can_escalate(self.config.expensive_cost_estimate)
        {
            info!(%request_id, remaining = self.budget.remaining_budget(), "budget denied escalation");
            tier = tier.downgrade().unwrap_or(Tier::Cheap);
        }

        loop {
            match tier {
                Tier::Cheap => {
                    let decision = cheap_decision(&features, situation);
                    self.cache
                        .put(&fingerprint, features, decision.clone(), MatchPrecision::Exact)
                        .await;
                    return Ok(self.finish(
                        request_id,
                        fingerprint,
                        decision,
                        DecisionSource::Computed(Tier::Cheap),
                        started,
                    ));
                }
                Tier::Moderate => {
                    if self.out_of_time(deadline_at) {
                        return Ok(self.fallback(
                            request_id,
                            fingerprint,
                            &features,
                            situation,
                            started,
                        ));
                    }
                    let decision = moderate_decision(
                        situation,
                        self.config.moderate_samples,
                        fingerprint.seed(),
                    );
                    self.cache
                        .put(&fingerprint, features, decision.clone(), MatchPrecision::Exact)
                        .await;
                    return Ok(self.finish(
                        request_id,
                        fingerprint,
                        decision,
                        DecisionSource::Computed(Tier::Moderate),
                        started,
                    ));
                }
                Tier::Expensive => {
                    let remaining = self.remaining(deadline_at);
                    if remaining <= self.config.fallback_margin {
                        return Ok(self.fallback(
                            request_id,
                            fingerprint,
                            &features,
                            situation,
                            started,
                        ));
                    }

                    match self.inflight.acquire(&fingerprint) {
                        FlightRole::Leader(guard) => {
                            let call_budget = self
                                .config
                                .provider_timeout
                                .min(remaining - self.config.fallback_margin);
                            let call_started = Instant::now();
                            let outcome = tokio::time::timeout(
                                call_budget,
                                self.provider.compute(situation, call_budget),
                            )
                            .await;

                            match outcome {
                                Ok(Ok(decision)) => {
                                    self.budget.record(
                                        self.config.expensive_cost_estimate,
                                        call_started.elapsed(),
                                    );
                                    self.cache
                                        .put(
                                            &fingerprint,
                                            features,
                                            decision.clone(),
                                            MatchPrecision::Exact,
                                        )
                                        .await;
                                    guard.complete(Ok(decision.clone()));
                                    return Ok(self.finish(
                                        request_id,
                                        fingerprint,
                                        decision,
                                        DecisionSource::Computed(Tier::Expensive),
                                        started,
                                    ));
                                }
                                Ok(Err(err)) => {
                                    // Failed calls are not charged.
                                    warn!(%request_id, error = %err, "expensive tier failed, downgrading");
                                    guard.complete(Err(FlightError::LeaderFailed(err.to_string())));
                                    tier = tier.downgrade().unwrap_or(Tier::Cheap);
                                }
                                Err(_) => {
                                    warn!(%request_id, "expensive tier timed out, downgrading");
                                    guard.complete(Err(FlightError::LeaderFailed(
                                        "provider timeout".to_string(),
                                    )));
                                    tier = tier.downgrade().unwrap_or(Tier::Cheap);
                                }
                            }
                        }
                        FlightRole::Follower(waiter) => {
                            let wait_budget =
                                remaining.saturating_sub(self.config.fallback_margin);
                            match waiter.wait(wait_budget).await {
                                Ok(Ok(decision)) => {
                                    // Leader already cached and charged.
                                    return Ok(self.finish(
                                        request_id,
                                        fingerprint,
                                        decision,
                                        DecisionSource::Computed(Tier::Expensive),
                                        started,
                                    ));
                                }
                                Ok(Err(err)) => {
                                    debug!(%request_id, error = %err, "flight failed, falling back");
                                    return Ok(self.fallback(
                                        request_id,
                                        fingerprint,
                                        &features,
                                        situation,
                                        started,
                                    ));
                                }
                                Err(_) => {
                                    debug!(%request_id, "follower deadline elapsed, falling back");
                                    return Ok(self.fallback(
                                        request_id,
                                        fingerprint,
                                        &features,
                                        situation,
                                        started,
                                    ));
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    fn remaining(&self, deadline_at: Instant) -> Duration {
        deadline_at.saturating_duration_since(Instant::now())
    }

    fn out_of_time(&self, deadline_at: Instant) -> bool {
        self.remaining(deadline_at) <= self.config.fallback_margin
    }

    fn fallback(
        &self,
        request_id: Uuid,
        fingerprint: Fingerprint,
        features: &NormalizedFeatures,
        situation: &Situation,
        started: Instant,
    ) -> RoutedDecision {
        let decision = cheap_decision(features, situation);
        self.finish(
            request_id,
            fingerprint,
            decision,
            DecisionSource::Fallback,
            started,
        )
    }

    fn finish(
        &self,
        request_id: Uuid,
        fingerprint: Fingerprint,
        mut decision: Decision,
        source: DecisionSource,
        started: Instant,
    ) -> RoutedDecision {
        decision.latency_ms = started.elapsed().as_millis() as u64;
        debug!(%request_id, %fingerprint, ?source, action = ?decision.action, "decision routed");
        RoutedDecision {
            decision,
            source,
            fingerprint,
            request_id,
        }
    }
}
