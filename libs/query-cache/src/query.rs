use std::{future::Future, sync::Arc};

use common_errors::{RequestError, RequestResult};
use futures::{FutureExt, future::BoxFuture};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    cache::QueryCache,
    entry::{QueryResult, ReadPolicy},
    key::QueryKey,
};

/// Type-erased network call producing the JSON stored under a key.
pub type QueryFn = Arc<
    dyn Fn(CancellationToken) -> BoxFuture<'static, RequestResult<Value>>
        + Send
        + Sync,
>;

/// Wrap a typed request as a [`QueryFn`].
pub fn query_fn<T, F, Fut>(f: F) -> QueryFn
where
    T: Serialize,
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RequestResult<T>> + Send + 'static,
{
    Arc::new(move |cancel| {
        let request = f(cancel);
        async move {
            let output = request.await?;
            serde_json::to_value(output).map_err(RequestError::from)
        }
        .boxed()
    })
}

/// A typed, cacheable read.
pub trait Query {
    type Output: Serialize + DeserializeOwned + Send + 'static;

    fn key(&self) -> QueryKey;

    /// Disabled queries never fetch.
    fn enabled(&self) -> bool { true }
}

/// Read `query` through the cache and decode the result.
pub async fn read_query<Q: Query>(
    cache: &QueryCache, query: &Q, policy: ReadPolicy, fetch: QueryFn,
    cancel: Option<&CancellationToken>,
) -> RequestResult<QueryResult<Q::Output>> {
    let enabled = policy.enabled && query.enabled();
    let policy = policy.enabled(enabled);
    let entry = cache.read(&query.key(), &policy, fetch, cancel).await?;
    QueryResult::from_entry(&entry)
}

/// Cached data for `query` without triggering a fetch.
pub fn peek_data<Q: Query>(
    cache: &QueryCache, query: &Q,
) -> RequestResult<Option<Q::Output>> {
    match cache.peek(&query.key()) {
        Some(entry) => entry.decode(),
        None => Ok(None),
    }
}
