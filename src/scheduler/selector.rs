use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rand::Rng;

use crate::scheduler::quorum::Quorum;

/// Picks which keeper of a quorum receives a job.
///
/// Implementations must return one of `quorum.active_nodes`, or `None` when
/// the quorum is empty. `release` is called once the dispatch to the returned
/// keeper has finished, successful or not.
pub trait KeeperSelector: Send + Sync {
    fn select(&self, quorum: &Quorum) -> Option<String>;

    fn release(&self, _keeper: &str) {}
}

/// Uniform random choice over the active nodes
#[derive(Debug, Default)]
pub struct RandomSelector;

impl KeeperSelector for RandomSelector {
    fn select(&self, quorum: &Quorum) -> Option<String> {
        if quorum.active_nodes.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..quorum.active_nodes.len());
        quorum.active_nodes.get(index).cloned()
    }
}

/// Cycles through the active nodes in order
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    next: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeeperSelector for RoundRobinSelector {
    fn select(&self, quorum: &Quorum) -> Option<String> {
        if quorum.active_nodes.is_empty() {
            return None;
        }
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        quorum
            .active_nodes
            .get(n % quorum.active_nodes.len())
            .cloned()
    }
}

/// Picks the keeper with the fewest dispatches in flight
#[derive(Debug, Default)]
pub struct LeastLoadedSelector {
    in_flight: Mutex<HashMap<String, usize>>,
}

impl LeastLoadedSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self, keeper: &str) -> usize {
        self.in_flight
            .lock()
            .map(|counts| counts.get(keeper).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl KeeperSelector for LeastLoadedSelector {
    fn select(&self, quorum: &Quorum) -> Option<String> {
        let mut counts = self.in_flight.lock().ok()?;

        // Ties go to the earliest node in quorum order
        let keeper = quorum
            .active_nodes
            .iter()
            .min_by_key(|node| counts.get(node.as_str()).copied().unwrap_or(0))?
            .clone();

        *counts.entry(keeper.clone()).or_insert(0) += 1;
        Some(keeper)
    }

    fn release(&self, keeper: &str) {
        if let Ok(mut counts) = self.in_flight.lock() {
            if let Some(count) = counts.get_mut(keeper) {
                *count = count.saturating_sub(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quorum(nodes: &[&str]) -> Quorum {
        Quorum::new(
            "q",
            "chain_1",
            nodes.iter().map(|n| n.to_string()).collect(),
        )
    }

    #[test]
    fn random_selects_member() {
        let q = quorum(&["n1", "n2", "n3"]);
        let selector = RandomSelector;
        for _ in 0..50 {
            let keeper = selector.select(&q).unwrap();
            assert!(q.active_nodes.contains(&keeper));
        }
    }

    #[test]
    fn selectors_return_none_for_empty_quorum() {
        let q = quorum(&[]);
        assert!(RandomSelector.select(&q).is_none());
        assert!(RoundRobinSelector::new().select(&q).is_none());
        assert!(LeastLoadedSelector::new().select(&q).is_none());
    }

    #[test]
    fn round_robin_cycles_in_order() {
        let q = quorum(&["n1", "n2", "n3"]);
        let selector = RoundRobinSelector::new();
        let picks: Vec<String> = (0..4).map(|_| selector.select(&q).unwrap()).collect();
        assert_eq!(picks, vec!["n1", "n2", "n3", "n1"]);
    }

    #[test]
    fn least_loaded_balances_and_releases() {
        let q = quorum(&["n1", "n2"]);
        let selector = LeastLoadedSelector::new();

        assert_eq!(selector.select(&q).unwrap(), "n1");
        assert_eq!(selector.select(&q).unwrap(), "n2");
        assert_eq!(selector.in_flight("n1"), 1);
        assert_eq!(selector.in_flight("n2"), 1);

        selector.release("n2");
        assert_eq!(selector.in_flight("n2"), 0);
        assert_eq!(selector.select(&q).unwrap(), "n2");

        // Releasing an idle keeper never underflows
        selector.release("n3");
        assert_eq!(selector.in_flight("n3"), 0);
    }
}
