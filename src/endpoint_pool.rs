// =============================================================================
// Endpoint Pool — random selection over flaky mirrors with eviction
// =============================================================================
//
// A pool fronts one logical capability served by several interchangeable
// endpoints (e.g. a swarm of Nitter mirrors).  Each member is either Healthy
// or Evicted:
//
//   acquire()          uniform random pick among Healthy members; when none
//                      remain, every member is restored first (self-healing)
//   report_failure(e)  marks `e` Evicted for the rest of this pool's life
//   reset_if_empty()   restores every member if none is Healthy
//
// The static member list never changes.  A pool is built per run, so an
// eviction never outlives the run that caused it.
//
// Thread-safety: member health sits behind a `parking_lot::Mutex` so that
// concurrent verification tasks can share one `Arc<EndpointPool>`.
// =============================================================================

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

/// Health of a single pool member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointHealth {
    Healthy,
    Evicted,
}

#[derive(Debug)]
struct Member {
    endpoint: String,
    health: EndpointHealth,
}

/// Set of interchangeable endpoints for one capability.
#[derive(Debug)]
pub struct EndpointPool {
    name: String,
    members: Mutex<Vec<Member>>,
}

impl EndpointPool {
    /// Build a pool with every endpoint Healthy. Duplicates are collapsed.
    pub fn new(name: impl Into<String>, endpoints: impl IntoIterator<Item = String>) -> Self {
        let mut members: Vec<Member> = Vec::new();
        for endpoint in endpoints {
            let endpoint = endpoint.trim_end_matches('/').to_string();
            if endpoint.is_empty() || members.iter().any(|m| m.endpoint == endpoint) {
                continue;
            }
            members.push(Member {
                endpoint,
                health: EndpointHealth::Healthy,
            });
        }
        Self {
            name: name.into(),
            members: Mutex::new(members),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the static member list.
    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick a random Healthy endpoint, refilling the pool first if every
    /// member has been evicted. Returns `None` only for a pool built with no
    /// endpoints at all.
    pub fn acquire(&self) -> Option<String> {
        self.acquire_excluding(&[])
    }

    /// Like [`acquire`](Self::acquire), but never hands out an endpoint in
    /// `tried`. Returns `None` when every Healthy member has been tried.
    pub fn acquire_excluding(&self, tried: &[String]) -> Option<String> {
        let mut members = self.members.lock();
        Self::refill_locked(&self.name, &mut members);

        let candidates: Vec<&Member> = members
            .iter()
            .filter(|m| m.health == EndpointHealth::Healthy)
            .filter(|m| !tried.iter().any(|t| *t == m.endpoint))
            .collect();

        let picked = candidates
            .choose(&mut rand::thread_rng())
            .map(|m| m.endpoint.clone());

        if let Some(ref endpoint) = picked {
            debug!(pool = %self.name, endpoint = %endpoint, "endpoint acquired");
        }
        picked
    }

    /// Evict `endpoint` for the remainder of this pool's life.
    pub fn report_failure(&self, endpoint: &str) {
        let mut members = self.members.lock();
        if let Some(member) = members.iter_mut().find(|m| m.endpoint == endpoint) {
            if member.health == EndpointHealth::Healthy {
                member.health = EndpointHealth::Evicted;
                let remaining = members
                    .iter()
                    .filter(|m| m.health == EndpointHealth::Healthy)
                    .count();
                warn!(pool = %self.name, endpoint, remaining, "endpoint evicted");
            }
        }
    }

    /// Restore every member if none is Healthy. Returns `true` if a refill
    /// happened.
    pub fn reset_if_empty(&self) -> bool {
        let mut members = self.members.lock();
        Self::refill_locked(&self.name, &mut members)
    }

    #[cfg(test)]
    pub fn health_of(&self, endpoint: &str) -> Option<EndpointHealth> {
        self.members
            .lock()
            .iter()
            .find(|m| m.endpoint == endpoint)
            .map(|m| m.health)
    }

    pub fn healthy_count(&self) -> usize {
        self.members
            .lock()
            .iter()
            .filter(|m| m.health == EndpointHealth::Healthy)
            .count()
    }

    fn refill_locked(name: &str, members: &mut [Member]) -> bool {
        if members.is_empty() || members.iter().any(|m| m.health == EndpointHealth::Healthy) {
            return false;
        }
        warn!(pool = %name, size = members.len(), "all endpoints evicted — resetting pool");
        for member in members.iter_mut() {
            member.health = EndpointHealth::Healthy;
        }
        true
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> EndpointPool {
        EndpointPool::new(
            "nitter",
            vec![
                "https://a.example".to_string(),
                "https://b.example/".to_string(),
                "https://c.example".to_string(),
            ],
        )
    }

    #[test]
    fn acquire_only_returns_healthy_members() {
        let pool = pool();
        pool.report_failure("https://a.example");
        pool.report_failure("https://b.example");
        for _ in 0..50 {
            assert_eq!(pool.acquire().as_deref(), Some("https://c.example"));
        }
    }

    #[test]
    fn trailing_slash_and_duplicates_are_normalised() {
        let pool = EndpointPool::new(
            "dup",
            vec!["https://x/".to_string(), "https://x".to_string()],
        );
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.acquire().as_deref(), Some("https://x"));
    }

    #[test]
    fn pool_self_heals_after_total_eviction() {
        let pool = pool();
        for endpoint in ["https://a.example", "https://b.example", "https://c.example"] {
            pool.report_failure(endpoint);
        }
        assert_eq!(pool.healthy_count(), 0);

        assert!(pool.acquire().is_some());
        assert_eq!(pool.healthy_count(), 3);
    }

    #[test]
    fn reset_if_empty_is_a_noop_while_members_remain() {
        let pool = pool();
        pool.report_failure("https://a.example");
        assert!(!pool.reset_if_empty());
        assert_eq!(pool.health_of("https://a.example"), Some(EndpointHealth::Evicted));
    }

    #[test]
    fn reset_if_empty_restores_everything() {
        let pool = pool();
        for endpoint in ["https://a.example", "https://b.example", "https://c.example"] {
            pool.report_failure(endpoint);
        }
        assert!(pool.reset_if_empty());
        assert_eq!(pool.health_of("https://b.example"), Some(EndpointHealth::Healthy));
    }

    #[test]
    fn unknown_endpoint_failure_is_ignored() {
        let pool = pool();
        pool.report_failure("https://zzz.example");
        assert_eq!(pool.healthy_count(), 3);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn acquire_excluding_skips_tried_endpoints() {
        let pool = pool();
        let tried = vec!["https://a.example".to_string(), "https://c.example".to_string()];
        for _ in 0..20 {
            assert_eq!(pool.acquire_excluding(&tried).as_deref(), Some("https://b.example"));
        }
        let all = vec![
            "https://a.example".to_string(),
            "https://b.example".to_string(),
            "https://c.example".to_string(),
        ];
        assert_eq!(pool.acquire_excluding(&all), None);
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let pool = EndpointPool::new("none", Vec::<String>::new());
        assert!(pool.is_empty());
        assert_eq!(pool.acquire(), None);
        assert!(!pool.reset_if_empty());
    }
}
