use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::OrganizationRecord;

/// Errors from a [`PartitionStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A registry uniqueness constraint was violated. Carries the field name
    /// (`organization_name`, `admin_email`, or `partition_name`).
    #[error("duplicate value for {0}")]
    Duplicate(&'static str),

    #[error("no matching registry record")]
    NotFound,

    /// A conditional update matched no row: the record was modified or
    /// deleted since it was read.
    #[error("record was modified concurrently")]
    Stale,

    #[error("invalid partition name: {0}")]
    InvalidPartitionName(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// Lookup key for `registry_find_one`.
#[derive(Debug, Clone, Copy)]
pub enum RegistryFilter<'a> {
    Id(Uuid),
    Name(&'a str),
    Email(&'a str),
    /// By derived partition name. Distinct organization names can collapse
    /// to the same partition name, so partition ownership must be checked
    /// separately from name ownership.
    Partition(&'a str),
}

/// Fields written by `registry_update` in a single conditional write.
///
/// The admin email is deliberately absent: the rename protocol uses it as
/// the lookup key and never rewrites it.
#[derive(Debug, Clone)]
pub struct RegistryUpdate {
    pub organization_name: String,
    pub partition_name: String,
    pub admin_credential_hash: String,
    pub updated_at: DateTime<Utc>,
}

/// Storage primitives consumed by the tenant registry.
///
/// Partitions are opaque named containers of tenant records; the registry is
/// a single global collection of [`OrganizationRecord`]s with uniqueness
/// enforced by the store itself (not by check-then-insert alone).
#[async_trait]
pub trait PartitionStore: Send + Sync {
    /// Create the named partition if it does not already exist.
    async fn ensure_partition(&self, name: &str) -> Result<(), StoreError>;

    /// Drop the named partition. Idempotent: dropping an absent partition
    /// succeeds, so a registry record orphaned by an interrupted delete can
    /// still be cleaned up.
    async fn drop_partition(&self, name: &str) -> Result<(), StoreError>;

    async fn partition_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Copy every record from `src` into `dst`, returning the number copied.
    /// `dst` must already exist.
    async fn copy_all(&self, src: &str, dst: &str) -> Result<u64, StoreError>;

    async fn count_records(&self, name: &str) -> Result<u64, StoreError>;

    async fn registry_find_one(
        &self,
        filter: RegistryFilter<'_>,
    ) -> Result<Option<OrganizationRecord>, StoreError>;

    /// Insert a new registry record. Fails with [`StoreError::Duplicate`]
    /// when any unique field is already taken.
    async fn registry_insert(&self, record: &OrganizationRecord) -> Result<(), StoreError>;

    /// Update the record with the given `id`, but only if its `updated_at`
    /// still equals `expected_updated_at`. Fails with [`StoreError::Stale`]
    /// otherwise.
    async fn registry_update(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        update: RegistryUpdate,
    ) -> Result<(), StoreError>;

    async fn registry_delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Ping the underlying store.
    async fn health_check(&self) -> Result<(), StoreError>;
}
