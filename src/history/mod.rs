//! History recording.
//!
//! Every successful classification leaves exactly one immutable
//! [`HistoryRecord`] behind. Stores are append-only: records are written
//! once under a fresh id and never updated or deleted by the service.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::HistoryError;
use crate::HistoryRecord;

pub mod file;
pub mod memory;

pub use self::file::{FileHistoryStore, RotatingWriter, RotationPolicy};
pub use self::memory::MemoryHistoryStore;

/// Durable key-value store for [`HistoryRecord`]s keyed by their id.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    fn name(&self) -> &str;

    /// Persist `record`. Decimal fields must survive a round trip exactly.
    async fn put(&self, record: &HistoryRecord) -> Result<(), HistoryError>;

    async fn get(&self, id: &Uuid) -> Result<Option<HistoryRecord>, HistoryError>;
}
