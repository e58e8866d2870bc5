//! Record trait for database models.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

/// Trait for database records backed by a single table.
#[async_trait]
pub trait Record: Sized + Send + Sync {
    /// The table name for this record type.
    const TABLE: &'static str;

    /// The ID type for this record.
    type Id: Send;

    /// Find a record by its ID. Returns `None` when the row does not exist.
    async fn find_by_id(id: Self::Id, db: &PgPool) -> Result<Option<Self>>;

    /// Insert a new record. Returns the number of rows written.
    async fn insert(&self, db: &PgPool) -> Result<u64>;
}
