//! In-memory [`PartitionStore`] used by service unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::database::{PartitionStore, RegistryFilter, RegistryUpdate, StoreError};
use crate::models::OrganizationRecord;

#[derive(Default)]
struct MemoryState {
    registry: HashMap<Uuid, OrganizationRecord>,
    partitions: HashMap<String, Vec<Value>>,
}

/// Mirrors the production store's semantics: uniqueness enforced on insert
/// (name checked before email), conditional updates on `updated_at`, and
/// idempotent partition drops.
#[derive(Default)]
pub struct MemoryPartitionStore {
    state: Mutex<MemoryState>,
}

impl MemoryPartitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record into an existing partition.
    pub async fn insert_record(&self, partition: &str, doc: Value) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let records = state
            .partitions
            .get_mut(partition)
            .ok_or(StoreError::NotFound)?;
        records.push(doc);
        Ok(())
    }
}

#[async_trait]
impl PartitionStore for MemoryPartitionStore {
    async fn ensure_partition(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.partitions.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn drop_partition(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.partitions.remove(name);
        Ok(())
    }

    async fn partition_exists(&self, name: &str) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state.partitions.contains_key(name))
    }

    async fn copy_all(&self, src: &str, dst: &str) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let records = state
            .partitions
            .get(src)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        let count = records.len() as u64;
        let target = state
            .partitions
            .get_mut(dst)
            .ok_or(StoreError::NotFound)?;
        target.extend(records);
        Ok(count)
    }

    async fn count_records(&self, name: &str) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        state
            .partitions
            .get(name)
            .map(|r| r.len() as u64)
            .ok_or(StoreError::NotFound)
    }

    async fn registry_find_one(
        &self,
        filter: RegistryFilter<'_>,
    ) -> Result<Option<OrganizationRecord>, StoreError> {
        let state = self.state.lock().await;
        let found = state.registry.values().find(|r| match filter {
            RegistryFilter::Id(id) => r.id == id,
            RegistryFilter::Name(name) => r.organization_name == name,
            RegistryFilter::Email(email) => r.admin_email == email,
            RegistryFilter::Partition(partition) => r.partition_name == partition,
        });
        Ok(found.cloned())
    }

    async fn registry_insert(&self, record: &OrganizationRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        for existing in state.registry.values() {
            if existing.organization_name == record.organization_name {
                return Err(StoreError::Duplicate("organization_name"));
            }
            if existing.partition_name == record.partition_name {
                return Err(StoreError::Duplicate("partition_name"));
            }
            if existing.admin_email == record.admin_email {
                return Err(StoreError::Duplicate("admin_email"));
            }
        }
        state.registry.insert(record.id, record.clone());
        Ok(())
    }

    async fn registry_update(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        update: RegistryUpdate,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;

        for existing in state.registry.values() {
            if existing.id != id && existing.organization_name == update.organization_name {
                return Err(StoreError::Duplicate("organization_name"));
            }
            if existing.id != id && existing.partition_name == update.partition_name {
                return Err(StoreError::Duplicate("partition_name"));
            }
        }

        let record = state.registry.get_mut(&id).ok_or(StoreError::Stale)?;
        if record.updated_at != expected_updated_at {
            return Err(StoreError::Stale);
        }
        record.organization_name = update.organization_name;
        record.partition_name = update.partition_name;
        record.admin_credential_hash = update.admin_credential_hash;
        record.updated_at = update.updated_at;
        Ok(())
    }

    async fn registry_delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.registry.remove(&id).ok_or(StoreError::NotFound)?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
