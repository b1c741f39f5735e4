use std::future::Future;

use common_errors::RequestResult;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{cache::QueryCache, entry::RefetchType, key::QueryKey};

/// Cache effects of a single mutation.
#[derive(Debug, Clone, Default)]
pub struct MutationPlan {
    pub optimistic: Option<(QueryKey, Value)>,
    pub invalidate: Vec<(QueryKey, RefetchType)>,
    pub remove_on_success: Vec<QueryKey>,
}

impl MutationPlan {
    pub fn new() -> Self { Self::default() }

    /// Show `value` under `key` before the server confirms it.
    pub fn optimistic(mut self, key: QueryKey, value: Value) -> Self {
        self.optimistic = Some((key, value));
        self
    }

    /// Invalidate `prefix` once the mutation settles, either way.
    pub fn invalidate(mut self, prefix: QueryKey, refetch: RefetchType) -> Self {
        self.invalidate.push((prefix, refetch));
        self
    }

    pub fn remove_on_success(mut self, key: QueryKey) -> Self {
        self.remove_on_success.push(key);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    OptimisticApplied,
    Pending,
    Committed,
    RolledBack,
    Settled,
}

/// Runs mutations against the cache: optimistic write, rollback on failure,
/// invalidation on settle.
#[derive(Clone)]
pub struct MutationCoordinator {
    cache: QueryCache,
}

struct PendingGuard<'a>(&'a QueryCache);

impl<'a> PendingGuard<'a> {
    fn new(cache: &'a QueryCache) -> Self {
        cache.mutation_started();
        Self(cache)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) { self.0.mutation_settled(); }
}

impl MutationCoordinator {
    pub fn new(cache: QueryCache) -> Self { Self { cache } }

    pub fn cache(&self) -> &QueryCache { &self.cache }

    /// Apply `plan` around `operation` and return the operation's outcome.
    pub async fn run<T, F>(
        &self, name: &str, plan: MutationPlan, operation: F,
    ) -> RequestResult<T>
    where
        F: Future<Output = RequestResult<T>>,
    {
        let _pending = PendingGuard::new(&self.cache);
        let mut state = MutationState::Idle;

        let applied = match plan.optimistic {
            Some((key, value)) => {
                self.cache.cancel(&key).await;
                let snapshot = self.cache.snapshot(&key);
                let seq = self.cache.write_tracked(&key, value);
                state = self.transition(name, state, MutationState::OptimisticApplied);
                Some((snapshot, seq))
            }
            None => None,
        };

        state = self.transition(name, state, MutationState::Pending);
        let result = operation.await;

        match &result {
            Ok(_) => {
                state = self.transition(name, state, MutationState::Committed);
                for key in &plan.remove_on_success {
                    self.cache.remove(key);
                }
            }
            Err(err) => {
                warn!("Mutation {} failed: {}", name, err);
                if let Some((snapshot, seq)) = &applied {
                    if self.cache.rollback(snapshot, *seq) {
                        warn!("Rolled back optimistic write to {}", snapshot.key);
                        state =
                            self.transition(name, state, MutationState::RolledBack);
                    } else {
                        debug!(
                            "{} was written again since, keeping newer value",
                            snapshot.key
                        );
                    }
                }
            }
        }

        for (prefix, refetch) in &plan.invalidate {
            self.cache.invalidate(prefix, *refetch);
        }
        self.transition(name, state, MutationState::Settled);

        result
    }

    fn transition(
        &self, name: &str, from: MutationState, to: MutationState,
    ) -> MutationState {
        debug!(mutation = name, ?from, ?to, "Mutation state change");
        if to == MutationState::Settled {
            info!(mutation = name, "Mutation settled");
        }
        to
    }
}
