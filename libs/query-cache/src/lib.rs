pub mod cache;
pub mod config;
pub mod entry;
pub mod key;
pub mod mutation;
pub mod observer;
pub mod query;

pub use cache::QueryCache;
pub use config::QueryCacheConfig;
pub use entry::{
    CacheEntry, CacheEvent, CacheEventKind, QueryResult, QueryStatus,
    QueryView, ReadPolicy, RefetchType,
};
pub use key::{KeyParams, KeySegment, QueryKey};
pub use mutation::{MutationCoordinator, MutationPlan, MutationState};
pub use observer::QueryObserver;
pub use query::{Query, QueryFn, peek_data, query_fn, read_query};
pub use tokio_util::sync::CancellationToken;
