use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{Night, NightId},
    error::StoreError,
};

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence gateway the session controllers depend on. Implementations own
/// durable state and must be safe to share across controllers; the controllers
/// only ever hold an `Arc<dyn NightStore>`.
#[async_trait]
pub trait NightStore: Send + Sync {
    /// Creates a new open night (`end_time == start_time`, unrated) and
    /// returns the stored record with its assigned id.
    async fn insert(&self, start_time: DateTime<Utc>) -> StoreResult<Night>;

    /// Overwrites an existing night by id. `StoreError::NotFound` if no such
    /// night exists.
    async fn update(&self, night: &Night) -> StoreResult<()>;

    async fn get(&self, id: NightId) -> StoreResult<Option<Night>>;

    /// The latest-created night, or `None` for an empty store.
    async fn most_recent(&self) -> StoreResult<Option<Night>>;

    /// Full history, most recent first.
    async fn all_nights(&self) -> StoreResult<Vec<Night>>;

    async fn clear_all(&self) -> StoreResult<()>;
}
