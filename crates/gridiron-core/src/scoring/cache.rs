// Process-wide cache of scored player lists.
//
// Keyed by (week, variant, profile fingerprint). Entries never expire; they
// are dropped wholesale per week or globally. Misses for the same key are
// single-flighted: concurrent callers wait for the first computation and then
// read its result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::debug;

use crate::slate::player::Variant;

use super::profile::Fingerprint;
use super::ScoredPlayer;

/// Cache key for one scored slate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub week: u32,
    pub variant: Variant,
    pub fingerprint: Fingerprint,
}

/// Counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub computations: u64,
    pub invalidations: u64,
}

/// Invalidation generation a computation started under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Generation {
    global: u64,
    week: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Arc<Vec<ScoredPlayer>>>,
    global_epoch: u64,
    week_epochs: HashMap<u32, u64>,
}

impl CacheState {
    fn generation(&self, week: u32) -> Generation {
        Generation {
            global: self.global_epoch,
            week: self.week_epochs.get(&week).copied().unwrap_or(0),
        }
    }
}

/// Thread-safe scored-slate cache.
#[derive(Default)]
pub struct ScoreCache {
    state: RwLock<CacheState>,
    flights: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    invalidations: AtomicU64,
}

impl ScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached entry without computing.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<ScoredPlayer>>> {
        self.state.read().entries.get(key).cloned()
    }

    /// Return the cached entry for `key`, or run `compute` and cache its
    /// result. The boolean is `true` on a cache hit.
    ///
    /// A computation that overlaps an invalidation of its week is returned to
    /// its caller but not stored, so reads issued after the invalidation
    /// always recompute.
    pub fn get_or_compute<F, E>(&self, key: CacheKey, compute: F) -> Result<(Arc<Vec<ScoredPlayer>>, bool), E>
    where
        F: FnOnce() -> Result<Vec<ScoredPlayer>, E>,
    {
        if let Some(hit) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(week = key.week, variant = %key.variant, fingerprint = %key.fingerprint, "score cache hit");
            return Ok((hit, true));
        }

        let flight = self.flight_lock(key);
        let guard = flight.lock();

        // Another caller may have finished while we waited.
        if let Some(hit) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(week = key.week, variant = %key.variant, "score cache hit after wait");
            drop(guard);
            self.release_flight(&key, flight);
            return Ok((hit, true));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(week = key.week, variant = %key.variant, fingerprint = %key.fingerprint, "score cache miss");

        let started_under = self.state.read().generation(key.week);
        let result = compute();
        let value = match result {
            Ok(players) => Arc::new(players),
            Err(e) => {
                drop(guard);
                self.release_flight(&key, flight);
                return Err(e);
            }
        };
        self.computations.fetch_add(1, Ordering::Relaxed);

        {
            let mut state = self.state.write();
            if state.generation(key.week) == started_under {
                state.entries.insert(key, Arc::clone(&value));
            } else {
                debug!(week = key.week, "discarding score result computed across an invalidation");
            }
        }

        drop(guard);
        self.release_flight(&key, flight);
        Ok((value, false))
    }

    /// Drop every entry for `week`, across variants and fingerprints.
    /// Returns the number of entries removed.
    pub fn invalidate_week(&self, week: u32) -> usize {
        let mut state = self.state.write();
        *state.week_epochs.entry(week).or_insert(0) += 1;
        let before = state.entries.len();
        state.entries.retain(|k, _| k.week != week);
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        before - state.entries.len()
    }

    /// Drop every entry. Returns the number of entries removed.
    pub fn invalidate_all(&self) -> usize {
        let mut state = self.state.write();
        state.global_epoch += 1;
        let removed = state.entries.len();
        state.entries.clear();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.state.read().entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    fn flight_lock(&self, key: CacheKey) -> Arc<Mutex<()>> {
        let mut flights = self.flights.lock();
        Arc::clone(flights.entry(key).or_default())
    }

    /// Give back this caller's handle on the flight lock and remove the map
    /// entry once no other caller holds one. Handles are only cloned and
    /// dropped under the map lock, so the count read here is exact.
    fn release_flight(&self, key: &CacheKey, flight: Arc<Mutex<()>>) {
        let mut flights = self.flights.lock();
        drop(flight);
        if flights.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            flights.remove(key);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slate::player::{Player, Position, Signals};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn key(week: u32, variant: Variant, fp: u64) -> CacheKey {
        CacheKey {
            week,
            variant,
            fingerprint: Fingerprint(fp),
        }
    }

    fn scored(id: &str, score: f64) -> ScoredPlayer {
        ScoredPlayer {
            player: Player {
                id: id.into(),
                name: id.into(),
                team: "KC".into(),
                opponent: None,
                game: None,
                position: Position::WR,
                salary: 5000,
                variant: Variant::Standard,
                signals: Signals::default(),
            },
            smart_score: score,
            fingerprint: Fingerprint(1),
        }
    }

    fn compute_ok(score: f64) -> Result<Vec<ScoredPlayer>, ()> {
        Ok(vec![scored("a", score)])
    }

    #[test]
    fn miss_then_hit() {
        let cache = ScoreCache::new();
        let k = key(1, Variant::Standard, 7);

        let (first, hit) = cache.get_or_compute(k, || compute_ok(10.0)).unwrap();
        assert!(!hit);
        let (second, hit) = cache
            .get_or_compute(k, || -> Result<Vec<ScoredPlayer>, ()> { panic!("should not recompute") })
            .unwrap();
        assert!(hit);
        assert!(Arc::ptr_eq(&first, &second));

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.computations, 1);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = ScoreCache::new();
        let k = key(1, Variant::Standard, 7);
        let err: Result<_, &str> = cache.get_or_compute(k, || Err("boom"));
        assert_eq!(err.unwrap_err(), "boom");
        assert!(cache.get(&k).is_none());

        let (_, hit) = cache.get_or_compute(k, || compute_ok(1.0)).unwrap();
        assert!(!hit);
    }

    #[test]
    fn invalidate_week_only_touches_that_week() {
        let cache = ScoreCache::new();
        for (week, variant, fp) in [
            (1, Variant::Standard, 1),
            (1, Variant::Captain, 1),
            (1, Variant::Standard, 2),
            (2, Variant::Standard, 1),
        ] {
            cache.get_or_compute(key(week, variant, fp), || compute_ok(1.0)).unwrap();
        }

        assert_eq!(cache.invalidate_week(1), 3);
        assert!(cache.get(&key(1, Variant::Standard, 1)).is_none());
        assert!(cache.get(&key(1, Variant::Captain, 1)).is_none());
        assert!(cache.get(&key(2, Variant::Standard, 1)).is_some());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn invalidate_all_clears_everything() {
        let cache = ScoreCache::new();
        cache.get_or_compute(key(1, Variant::Standard, 1), || compute_ok(1.0)).unwrap();
        cache.get_or_compute(key(2, Variant::Captain, 1), || compute_ok(1.0)).unwrap();
        assert_eq!(cache.invalidate_all(), 2);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn computation_across_invalidation_is_not_stored() {
        let cache = ScoreCache::new();
        let k = key(3, Variant::Standard, 1);

        let (value, hit) = cache
            .get_or_compute(k, || {
                // Invalidation lands while the computation is running.
                cache.invalidate_week(3);
                compute_ok(5.0)
            })
            .unwrap();
        assert!(!hit);
        assert_eq!(value[0].smart_score, 5.0);
        assert!(cache.get(&k).is_none());

        let (_, hit) = cache.get_or_compute(k, || compute_ok(6.0)).unwrap();
        assert!(!hit);
        assert_eq!(cache.get(&k).unwrap()[0].smart_score, 6.0);
    }

    #[test]
    fn concurrent_misses_compute_once() {
        let cache = Arc::new(ScoreCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let k = key(9, Variant::Standard, 42);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    cache
                        .get_or_compute(k, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(50));
                            compute_ok(3.0)
                        })
                        .map(|(v, _)| v[0].smart_score)
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Ok(3.0));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().computations, 1);
        assert!(cache.flights.lock().is_empty());
    }
}
