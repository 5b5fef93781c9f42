use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::fingerprint::{feature_distance, Fingerprint, NormalizedFeatures};
use crate::situation::Decision;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchPrecision {
    Exact,
    Similar,
}

/// One cached answer. Owned by the store; mutated only through writes.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub decision: Decision,
    pub features: NormalizedFeatures,
    pub precision: MatchPrecision,
    pub confidence_adjustment: f32,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

#[derive(Debug, Clone, Error)]
#[error("shared cache backend unavailable: {0}")]
pub struct CacheUnavailable(pub String);

/// Key/value collaborator for the shared tier. Possibly slow or briefly
/// unavailable; errors degrade the request to fast-tier-only operation.
#[async_trait]
pub trait SharedCacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheUnavailable>;
    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheUnavailable>;
}

/// In-process shared backend: TTL-only expiry, unbounded capacity.
#[derive(Default)]
pub struct MemoryBackend {
    entries: tokio::sync::RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops physically expired entries. Reads never return them either
    /// way; this just bounds memory.
    pub async fn prune_expired(&self) {
        let now = Instant::now();
        self.entries.write().await.retain(|_, e| !e.is_expired(now));
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl SharedCacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheUnavailable> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| !e.is_expired(Instant::now()))
            .cloned())
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheUnavailable> {
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Number of fast-tier shards; fingerprints hash across them so one
    /// entry's lock never blocks unrelated entries.
    pub shards: usize,
    /// LRU capacity per shard.
    pub shard_capacity: usize,
    /// TTL for exact-precision writes.
    pub exact_ttl: Duration,
    /// TTL for similarity-precision writes; shorter because the underlying
    /// features may have drifted.
    pub similar_ttl: Duration,
    /// Confidence floor an exact entry must meet to answer similarity probes.
    pub min_similar_confidence: f32,
    /// Budget for one shared-backend round trip.
    pub backend_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shards: 8,
            shard_capacity: 256,
            exact_ttl: Duration::from_secs(600),
            similar_ttl: Duration::from_secs(120),
            min_similar_confidence: 0.7,
            backend_timeout: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub fast_hits: AtomicU64,
    pub shared_hits: AtomicU64,
    pub similar_hits: AtomicU64,
    pub misses: AtomicU64,
    pub writes: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheStatsSnapshot {
    pub fast_hits: u64,
    pub shared_hits: u64,
    pub similar_hits: u64,
    pub misses: u64,
    pub writes: u64,
}

/// Two-level decision cache: sharded LRU fast tier in front of an optional
/// shared backend. Keys carry the normalizer schema version, so entries
/// written under another scheme are never read back.
pub struct CacheStore {
    config: CacheConfig,
    shards: Vec<Mutex<LruCache<String, CacheEntry>>>,
    backend: Option<Arc<dyn SharedCacheBackend>>,
    stats: CacheStats,
}

impl CacheStore {
    pub fn new(config: CacheConfig, backend: Option<Arc<dyn SharedCacheBackend>>) -> Self {
        let shard_count = config.shards.max(1);
        let capacity = NonZeroUsize::new(config.shard_capacity.max(1))
            .unwrap_or(NonZeroUsize::new(1).unwrap());
        let shards = (0..shard_count)
            .map(|_| Mutex::new(LruCache::new(capacity)))
            .collect();
        Self {
            config,
            shards,
            backend,
            stats: CacheStats::default(),
        }
    }

    fn shard(&self, key: &str) -> &Mutex<LruCache<String, CacheEntry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Exact lookup: fast tier first, shared tier on miss. Shared hits are
    /// promoted into the fast tier. Expired entries are never returned,
    /// even if not yet physically evicted.
    pub async fn get_exact(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let key = fingerprint.as_str();
        let now = Instant::now();

        {
            let mut shard = self.shard(key).lock();
            match shard.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.stats.fast_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.clone());
                }
                Some(_) => {
                    shard.pop(key);
                }
                None => {}
            }
        }

        if let Some(backend) = &self.backend {
            match tokio::time::timeout(self.config.backend_timeout, backend.get(key)).await {
                Ok(Ok(Some(entry))) if !entry.is_expired(now) => {
                    self.stats.shared_hits.fetch_add(1, Ordering::Relaxed);
                    self.shard(key).lock().put(key.to_string(), entry.clone());
                    debug!(%fingerprint, "promoted shared-tier hit");
                    return Some(entry);
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => warn!(%fingerprint, error = %err, "shared cache read failed"),
                Err(_) => warn!(%fingerprint, "shared cache read timed out"),
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Similarity lookup over the fast tier: returns the closest entry
    /// within `threshold` distance of `features`. Only confident
    /// exact-precision entries are eligible, so a novel situation class can
    /// never be answered approximately.
    pub fn get_similar(
        &self,
        features: &NormalizedFeatures,
        threshold: f64,
    ) -> Option<CacheEntry> {
        let now = Instant::now();
        let mut best: Option<(f64, CacheEntry)> = None;

        for shard in &self.shards {
            let shard = shard.lock();
            for (_, entry) in shard.iter() {
                if entry.is_expired(now)
                    || entry.precision != MatchPrecision::Exact
                    || entry.decision.confidence < self.config.min_similar_confidence
                {
                    continue;
                }
                let distance = feature_distance(features, &entry.features);
                if distance > threshold {
                    continue;
                }
                if best.as_ref().map(|(d, _)| distance < *d).unwrap_or(true) {
                    best = Some((distance, entry.clone()));
                }
            }
        }

        best.map(|(distance, mut entry)| {
            self.stats.similar_hits.fetch_add(1, Ordering::Relaxed);
            entry.precision = MatchPrecision::Similar;
            entry.confidence_adjustment = (0.1 + distance as f32).min(0.5);
            entry
        })
    }

    /// Writes through both tiers. Exact precision gets the longer TTL.
    pub async fn put(
        &self,
        fingerprint: &Fingerprint,
        features: NormalizedFeatures,
        decision: Decision,
        precision: MatchPrecision,
    ) {
        let ttl = match precision {
            MatchPrecision::Exact => self.config.exact_ttl,
            MatchPrecision::Similar => self.config.similar_ttl,
        };
        let entry = CacheEntry {
            decision,
            features,
            precision,
            confidence_adjustment: 0.0,
            inserted_at: Instant::now(),
            ttl,
        };

        let key = fingerprint.as_str();
        self.shard(key).lock().put(key.to_string(), entry.clone());
        self.stats.writes.fetch_add(1, Ordering::Relaxed);

        if let Some(backend) = &self.backend {
            match tokio::time::timeout(self.config.backend_timeout, backend.put(key, entry)).await
            {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(%fingerprint, error = %err, "shared cache write failed"),
                Err(_) => warn!(%fingerprint, "shared cache write timed out"),
            }
        }
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            fast_hits: self.stats.fast_hits.load(Ordering::Relaxed),
            shared_hits: self.stats.shared_hits.load(Ordering::Relaxed),
            similar_hits: self.stats.similar_hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            writes: self.stats.writes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{BettingPattern, Normalizer, PositionClass};
    use crate::situation::{ActionKind, Street};

    fn features(strength_bucket: u8) -> NormalizedFeatures {
        NormalizedFeatures {
            street: Street::Flop,
            strength_bucket,
            pot_odds_bucket: 4,
            position: PositionClass::Late,
            pattern: BettingPattern::SingleRaised,
            stack_bucket: 3,
        }
    }

    fn fingerprint_for(f: &NormalizedFeatures) -> Fingerprint {
        Normalizer::default().fingerprint(f)
    }

    fn decision(confidence: f32) -> Decision {
        Decision::new(ActionKind::Call, Some(6.0), confidence)
    }

    #[tokio::test]
    async fn exact_hit_before_ttl_and_never_after() {
        let config = CacheConfig {
            exact_ttl: Duration::from_millis(60),
            ..CacheConfig::default()
        };
        let store = CacheStore::new(config, None);
        let f = features(5);
        let fp = fingerprint_for(&f);

        store.put(&fp, f, decision(0.9), MatchPrecision::Exact).await;
        assert!(store.get_exact(&fp).await.is_some());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.get_exact(&fp).await.is_none());
    }

    #[tokio::test]
    async fn shared_hit_promotes_to_fast_tier() {
        let backend = Arc::new(MemoryBackend::new());
        let store = CacheStore::new(CacheConfig::default(), Some(backend.clone()));
        let f = features(5);
        let fp = fingerprint_for(&f);

        let entry = CacheEntry {
            decision: decision(0.9),
            features: f,
            precision: MatchPrecision::Exact,
            confidence_adjustment: 0.0,
            inserted_at: Instant::now(),
            ttl: Duration::from_secs(60),
        };
        backend.put(fp.as_str(), entry).await.unwrap();

        assert!(store.get_exact(&fp).await.is_some());
        let stats = store.stats();
        assert_eq!(stats.shared_hits, 1);

        // Second read is served from the fast tier.
        assert!(store.get_exact(&fp).await.is_some());
        assert_eq!(store.stats().fast_hits, 1);
    }

    #[tokio::test]
    async fn similar_lookup_returns_closest_confident_entry() {
        let store = CacheStore::new(CacheConfig::default(), None);
        let stored = features(5);
        let fp = fingerprint_for(&stored);
        store
            .put(&fp, stored, decision(0.9), MatchPrecision::Exact)
            .await;

        let probe = features(6); // one bucket away, distance 0.02
        let hit = store.get_similar(&probe, 0.05).expect("similar hit");
        assert_eq!(hit.precision, MatchPrecision::Similar);
        assert!(hit.confidence_adjustment > 0.0);

        let far_probe = features(9);
        assert!(store.get_similar(&far_probe, 0.05).is_none());
    }

    #[tokio::test]
    async fn low_confidence_entries_never_answer_similarity() {
        let store = CacheStore::new(CacheConfig::default(), None);
        let stored = features(5);
        let fp = fingerprint_for(&stored);
        store
            .put(&fp, stored, decision(0.4), MatchPrecision::Exact)
            .await;

        assert!(store.get_similar(&features(6), 0.05).is_none());
    }

    #[tokio::test]
    async fn similar_precision_entries_never_answer_similarity() {
        let store = CacheStore::new(CacheConfig::default(), None);
        let stored = features(5);
        let fp = fingerprint_for(&stored);
        store
            .put(&fp, stored, decision(0.9), MatchPrecision::Similar)
            .await;

        assert!(store.get_similar(&features(5), 0.05).is_none());
    }

    #[tokio::test]
    async fn lru_evicts_oldest_in_shard() {
        let config = CacheConfig {
            shards: 1,
            shard_capacity: 2,
            ..CacheConfig::default()
        };
        let store = CacheStore::new(config, None);

        let fs: Vec<NormalizedFeatures> = (0..3).map(features).collect();
        let fps: Vec<Fingerprint> = fs.iter().map(fingerprint_for).collect();
        for (f, fp) in fs.iter().zip(&fps) {
            store.put(fp, *f, decision(0.9), MatchPrecision::Exact).await;
        }

        assert!(store.get_exact(&fps[0]).await.is_none(), "oldest evicted");
        assert!(store.get_exact(&fps[1]).await.is_some());
        assert!(store.get_exact(&fps[2]).await.is_some());
    }

    #[tokio::test]
    async fn backend_prune_drops_expired_only() {
        let backend = MemoryBackend::new();
        let fresh = CacheEntry {
            decision: decision(0.9),
            features: features(5),
            precision: MatchPrecision::Exact,
            confidence_adjustment: 0.0,
            inserted_at: Instant::now(),
            ttl: Duration::from_secs(60),
        };
        let mut stale = fresh.clone();
        stale.ttl = Duration::from_millis(0);

        backend.put("fresh", fresh).await.unwrap();
        backend.put("stale", stale).await.unwrap();
        backend.prune_expired().await;

        assert_eq!(backend.len().await, 1);
        assert!(backend.get("stale").await.unwrap().is_none());
    }
}
