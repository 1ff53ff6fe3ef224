//! Eviction policy definitions and pure candidate selection.

use std::time::{Duration, Instant};

use super::handle::{ModelHandle, ModelId};

/// Policy governing which loaded artifacts are eviction candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnloadingPolicy {
    /// Evict handles whose `last_used_at` is older than `max_age`.
    LeastRecentlyUsed { max_age: Duration },
    /// Evict oldest-used handles until the aggregate resident footprint
    /// fits at or below `max_total_bytes`.
    MemoryThreshold { max_total_bytes: u64 },
    /// Evict handles loaded longer than `max_age` ago, regardless of use.
    TimeBased { max_age: Duration },
    /// Union of the LRU and memory-threshold rules: a handle is evicted
    /// if either rule independently selects it.
    Hybrid {
        max_age: Duration,
        max_total_bytes: u64,
    },
}

impl UnloadingPolicy {
    /// Memory cap carried by this policy, if any.
    pub fn memory_threshold(&self) -> Option<u64> {
        match self {
            Self::MemoryThreshold { max_total_bytes } | Self::Hybrid { max_total_bytes, .. } => {
                Some(*max_total_bytes)
            }
            _ => None,
        }
    }

    /// Age bound carried by this policy, if any.
    pub fn max_age(&self) -> Option<Duration> {
        match self {
            Self::LeastRecentlyUsed { max_age }
            | Self::TimeBased { max_age }
            | Self::Hybrid { max_age, .. } => Some(*max_age),
            Self::MemoryThreshold { .. } => None,
        }
    }
}

#[derive(Clone, Copy)]
enum AgeRule {
    /// Compare against `last_used_at` (LRU and the age half of Hybrid).
    LastUsed(Duration),
    /// Compare against `loaded_at` (TimeBased).
    Loaded(Duration),
}

impl AgeRule {
    fn selects(self, handle: &ModelHandle, now: Instant) -> bool {
        // Strictly greater: a handle exactly at the boundary is kept.
        match self {
            Self::LastUsed(max_age) => now.duration_since(handle.last_used_at) > max_age,
            Self::Loaded(max_age) => now.duration_since(handle.loaded_at) > max_age,
        }
    }
}

/// Select eviction candidates, oldest `last_used_at` first.
///
/// Pure and side-effect free: safe to call repeatedly with hypothetical
/// inputs. Handles with active borrows never appear in the output.
///
/// `pending_bytes` is counted toward the aggregate for the memory rules,
/// so a pre-load capacity check can evaluate the projected footprint of an
/// incoming artifact; pass 0 for a plain evaluation. The memory walk sums
/// the footprints of already-selected candidates (including age-selected
/// ones) and stops selecting once the projected remainder fits under the
/// threshold, giving a deterministic sequence for budgeted callers.
pub fn select_candidates(
    handles: &[ModelHandle],
    now: Instant,
    policy: &UnloadingPolicy,
    pending_bytes: u64,
) -> Vec<ModelId> {
    let (age_rule, memory_cap) = match policy {
        UnloadingPolicy::LeastRecentlyUsed { max_age } => {
            (Some(AgeRule::LastUsed(*max_age)), None)
        }
        UnloadingPolicy::TimeBased { max_age } => (Some(AgeRule::Loaded(*max_age)), None),
        UnloadingPolicy::MemoryThreshold { max_total_bytes } => (None, Some(*max_total_bytes)),
        UnloadingPolicy::Hybrid {
            max_age,
            max_total_bytes,
        } => (Some(AgeRule::LastUsed(*max_age)), Some(*max_total_bytes)),
    };

    // Aggregate covers every loaded handle, pinned ones included: pinned
    // memory still counts against the threshold even though the handles
    // themselves are not candidates.
    let total: u64 = handles.iter().map(|h| h.memory_bytes).sum();
    let mut remaining = total.saturating_add(pending_bytes);

    let mut eligible: Vec<&ModelHandle> = handles.iter().filter(|h| !h.is_pinned()).collect();
    eligible.sort_by_key(|h| h.last_used_at);

    let mut selected = Vec::new();
    for handle in eligible {
        let by_age = age_rule.is_some_and(|rule| rule.selects(handle, now));
        let by_memory = memory_cap.is_some_and(|cap| remaining > cap);
        if by_age || by_memory {
            selected.push(handle.id);
            remaining = remaining.saturating_sub(handle.memory_bytes);
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::handle::ModelKind;
    use std::path::PathBuf;

    const MB: u64 = 1024 * 1024;

    /// Anchor point far enough ahead of the monotonic clock that
    /// subtracting test ages can never underflow.
    fn test_now() -> Instant {
        Instant::now() + Duration::from_secs(86_400)
    }

    /// Handle last used `used_ago` before `now` and loaded `loaded_ago`
    /// before `now`.
    fn aged_handle(
        name: &str,
        memory_bytes: u64,
        now: Instant,
        used_ago: Duration,
        loaded_ago: Duration,
    ) -> ModelHandle {
        let mut h = ModelHandle::new(
            PathBuf::from(name),
            ModelKind::Gguf,
            memory_bytes,
            memory_bytes,
        );
        h.last_used_at = now - used_ago;
        h.loaded_at = now - loaded_ago;
        h
    }

    #[test]
    fn lru_boundary_is_exclusive() {
        let now = test_now();
        let max_age = Duration::from_secs(60);
        let at_boundary = aged_handle("a.gguf", MB, now, max_age, max_age);
        let just_past = aged_handle(
            "b.gguf",
            MB,
            now,
            max_age + Duration::from_micros(1),
            max_age,
        );

        let policy = UnloadingPolicy::LeastRecentlyUsed { max_age };
        let out = select_candidates(&[at_boundary, just_past.clone()], now, &policy, 0);
        assert_eq!(out, vec![just_past.id]);
    }

    #[test]
    fn time_based_ignores_recent_use() {
        let now = test_now();
        let max_age = Duration::from_secs(3600);
        // Loaded long ago but used just now: still selected.
        let h = aged_handle(
            "a.gguf",
            MB,
            now,
            Duration::ZERO,
            max_age + Duration::from_secs(1),
        );

        let policy = UnloadingPolicy::TimeBased { max_age };
        assert_eq!(select_candidates(&[h.clone()], now, &policy, 0), vec![h.id]);

        let lru = UnloadingPolicy::LeastRecentlyUsed { max_age };
        assert!(select_candidates(&[h], now, &lru, 0).is_empty());
    }

    #[test]
    fn memory_threshold_stops_once_remainder_fits() {
        let now = test_now();
        // Oldest-used first: 100, 200, 300. Total 600, threshold 350:
        // evicting the two oldest brings the remainder to 300 <= 350.
        let a = aged_handle("a.gguf", 100, now, Duration::from_secs(30), Duration::ZERO);
        let b = aged_handle("b.gguf", 200, now, Duration::from_secs(20), Duration::ZERO);
        let c = aged_handle("c.gguf", 300, now, Duration::from_secs(10), Duration::ZERO);

        let policy = UnloadingPolicy::MemoryThreshold {
            max_total_bytes: 350,
        };
        let out = select_candidates(&[c.clone(), a.clone(), b.clone()], now, &policy, 0);
        assert_eq!(out, vec![a.id, b.id]);
    }

    #[test]
    fn memory_threshold_selects_nothing_when_under_cap() {
        let now = test_now();
        let a = aged_handle("a.gguf", 100, now, Duration::from_secs(30), Duration::ZERO);
        let policy = UnloadingPolicy::MemoryThreshold {
            max_total_bytes: 100,
        };
        assert!(select_candidates(&[a], now, &policy, 0).is_empty());
    }

    #[test]
    fn pending_bytes_are_counted_toward_the_aggregate() {
        let now = test_now();
        let a = aged_handle("a.gguf", 400, now, Duration::from_secs(30), Duration::ZERO);
        let b = aged_handle("b.gguf", 400, now, Duration::from_secs(20), Duration::ZERO);
        let policy = UnloadingPolicy::MemoryThreshold {
            max_total_bytes: 1000,
        };

        // 800 resident fits, but a projected 400 more does not: the oldest
        // handle is selected to make room.
        assert!(select_candidates(&[a.clone(), b.clone()], now, &policy, 0).is_empty());
        let out = select_candidates(&[a.clone(), b], now, &policy, 400);
        assert_eq!(out, vec![a.id]);
    }

    #[test]
    fn pinned_handles_are_never_selected() {
        let now = test_now();
        let old = Duration::from_secs(7200);
        let mut pinned = aged_handle("a.gguf", 500, now, old, old);
        pinned.ref_count = 1;
        let idle = aged_handle("b.gguf", 500, now, old, old);

        let policies = [
            UnloadingPolicy::LeastRecentlyUsed {
                max_age: Duration::from_secs(60),
            },
            UnloadingPolicy::TimeBased {
                max_age: Duration::from_secs(60),
            },
            UnloadingPolicy::MemoryThreshold { max_total_bytes: 0 },
            UnloadingPolicy::Hybrid {
                max_age: Duration::from_secs(60),
                max_total_bytes: 0,
            },
        ];
        for policy in &policies {
            let out = select_candidates(&[pinned.clone(), idle.clone()], now, policy, 0);
            assert_eq!(out, vec![idle.id], "policy {policy:?}");
        }
    }

    #[test]
    fn hybrid_is_the_union_of_both_rules() {
        let now = test_now();
        let max_age = Duration::from_secs(60);
        // `stale` is selected only by the age rule (tiny footprint).
        // `fat` is selected only by the memory rule (recently used).
        let stale = aged_handle(
            "stale.gguf",
            1,
            now,
            max_age + Duration::from_secs(1),
            Duration::ZERO,
        );
        let fat = aged_handle("fat.gguf", 900, now, Duration::from_secs(1), Duration::ZERO);

        let policy = UnloadingPolicy::Hybrid {
            max_age,
            max_total_bytes: 500,
        };
        let out = select_candidates(&[fat.clone(), stale.clone()], now, &policy, 0);
        assert_eq!(out, vec![stale.id, fat.id]);
    }

    #[test]
    fn hybrid_memory_walk_counts_age_selected_footprints() {
        let now = test_now();
        let max_age = Duration::from_secs(60);
        // The age rule already frees 600; the remainder (400) fits under
        // the threshold, so the memory rule adds nothing.
        let stale = aged_handle(
            "stale.gguf",
            600,
            now,
            max_age + Duration::from_secs(1),
            Duration::ZERO,
        );
        let fresh = aged_handle("fresh.gguf", 400, now, Duration::from_secs(1), Duration::ZERO);

        let policy = UnloadingPolicy::Hybrid {
            max_age,
            max_total_bytes: 500,
        };
        let out = select_candidates(&[stale.clone(), fresh], now, &policy, 0);
        assert_eq!(out, vec![stale.id]);
    }

    #[test]
    fn candidates_are_ordered_oldest_used_first() {
        let now = test_now();
        let max_age = Duration::from_secs(10);
        let mid = aged_handle("m.gguf", 1, now, Duration::from_secs(20), Duration::ZERO);
        let oldest = aged_handle("o.gguf", 1, now, Duration::from_secs(30), Duration::ZERO);
        let newest = aged_handle("n.gguf", 1, now, Duration::from_secs(15), Duration::ZERO);

        let policy = UnloadingPolicy::LeastRecentlyUsed { max_age };
        let out = select_candidates(
            &[mid.clone(), oldest.clone(), newest.clone()],
            now,
            &policy,
            0,
        );
        assert_eq!(out, vec![oldest.id, mid.id, newest.id]);
    }

    #[test]
    fn empty_input_selects_nothing() {
        let policy = UnloadingPolicy::MemoryThreshold { max_total_bytes: 0 };
        assert!(select_candidates(&[], Instant::now(), &policy, 0).is_empty());
    }

    #[test]
    fn policy_accessors_expose_bounds() {
        let hybrid = UnloadingPolicy::Hybrid {
            max_age: Duration::from_secs(60),
            max_total_bytes: 100,
        };
        assert_eq!(hybrid.memory_threshold(), Some(100));
        assert_eq!(hybrid.max_age(), Some(Duration::from_secs(60)));

        let lru = UnloadingPolicy::LeastRecentlyUsed {
            max_age: Duration::from_secs(1),
        };
        assert_eq!(lru.memory_threshold(), None);
    }
}
