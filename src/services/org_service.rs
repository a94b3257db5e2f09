use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::{PartitionStore, RegistryFilter, RegistryUpdate, StoreError};
use crate::models::{
    now_utc, partition_name_for, validate_org_input, DeleteConfirmation, MigrationSummary,
    OrganizationRecord, OrganizationView,
};
use crate::security;

#[derive(Debug, thiserror::Error)]
pub enum OrgError {
    #[error("invalid input")]
    Validation { field_errors: HashMap<String, String> },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("partition migration timed out for organization: {0}")]
    MigrationTimeout(String),

    #[error("credential error: {0}")]
    Credential(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-tenant exclusive locks, keyed by the immutable record id.
///
/// Rename and delete hold the tenant's lock across their whole
/// read-modify-write sequence; reads take no lock. The conditional
/// `registry_update` on `updated_at` backstops anything that slips past
/// the lock (e.g. a second process).
struct TenantLocks {
    inner: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl TenantLocks {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().await;
            map.entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    async fn discard(&self, id: Uuid) {
        self.inner.lock().await.remove(&id);
    }
}

/// The tenant registry: owns the invariants linking an organization record
/// to its data partition across create, rename (with migration), and delete.
pub struct OrganizationService {
    store: Arc<dyn PartitionStore>,
    locks: TenantLocks,
    migration_timeout: Duration,
}

impl OrganizationService {
    pub fn new(store: Arc<dyn PartitionStore>, migration_timeout: Duration) -> Self {
        Self {
            store,
            locks: TenantLocks::new(),
            migration_timeout,
        }
    }

    /// Register a new organization and provision its partition.
    ///
    /// The registry insert happens before partition provisioning; a
    /// provisioning failure is logged but not rolled back, leaving a record
    /// whose partition will be created on demand or by reconciliation. The
    /// store's unique constraints make the name/email checks race-safe.
    pub async fn create(
        &self,
        organization_name: &str,
        email: &str,
        secret: &str,
    ) -> Result<OrganizationView, OrgError> {
        let field_errors = validate_org_input(organization_name, email, secret);
        if !field_errors.is_empty() {
            return Err(OrgError::Validation { field_errors });
        }
        let name = organization_name.trim();

        info!("Creating organization: {}", name);

        // Name first, then email, so the caller learns about a name clash
        // even when both are taken.
        if self
            .store
            .registry_find_one(RegistryFilter::Name(name))
            .await?
            .is_some()
        {
            warn!("Organization already exists: {}", name);
            return Err(OrgError::Conflict(format!(
                "Organization '{}' already exists",
                name
            )));
        }

        if self
            .store
            .registry_find_one(RegistryFilter::Email(email))
            .await?
            .is_some()
        {
            warn!("Email already registered: {}", email);
            return Err(OrgError::Conflict(
                "This email is already registered with another organization".to_string(),
            ));
        }

        let partition_name = partition_name_for(name);
        let credential_hash =
            security::hash_secret(secret).map_err(|e| OrgError::Credential(e.to_string()))?;

        let now = now_utc();
        let record = OrganizationRecord {
            id: Uuid::new_v4(),
            organization_name: name.to_string(),
            partition_name: partition_name.clone(),
            admin_email: email.to_string(),
            admin_credential_hash: credential_hash,
            created_at: now,
            updated_at: now,
        };

        match self.store.registry_insert(&record).await {
            Ok(()) => {}
            Err(StoreError::Duplicate("admin_email")) => {
                return Err(OrgError::Conflict(
                    "This email is already registered with another organization".to_string(),
                ));
            }
            Err(StoreError::Duplicate(_)) => {
                return Err(OrgError::Conflict(format!(
                    "Organization '{}' already exists",
                    name
                )));
            }
            Err(e) => return Err(e.into()),
        }

        // Known inconsistency window: the record now exists, and a failure
        // here leaves it without a partition until reconciliation.
        if let Err(e) = self.store.ensure_partition(&partition_name).await {
            warn!(
                "Partition provisioning failed for {} ({}): {}",
                name, partition_name, e
            );
        }

        info!("Organization created successfully: {}", name);
        Ok(record.view())
    }

    /// Fetch an organization by name. Lock-free; during a concurrent rename
    /// this observes either the pre- or post-migration record.
    pub async fn get(&self, organization_name: &str) -> Result<OrganizationView, OrgError> {
        info!("Fetching organization: {}", organization_name);

        let record = self
            .store
            .registry_find_one(RegistryFilter::Name(organization_name))
            .await?
            .ok_or_else(|| {
                warn!("Organization not found: {}", organization_name);
                OrgError::NotFound(format!(
                    "Organization '{}' not found",
                    organization_name
                ))
            })?;

        Ok(record.view())
    }

    /// Rename an organization, migrating its partition when the derived
    /// partition name changes.
    ///
    /// The record is located by its current admin email (`email`), which is
    /// also the authorization field compared against `acting_email`; the
    /// email itself is never rewritten here. Migration sequence: create the
    /// new partition, copy everything (bounded by the migration timeout),
    /// swap the registry record, then drop the old partition. The registry
    /// only ever points at a fully populated partition.
    pub async fn rename(
        &self,
        new_name: &str,
        email: &str,
        new_secret: &str,
        acting_email: &str,
    ) -> Result<MigrationSummary, OrgError> {
        let field_errors = validate_org_input(new_name, email, new_secret);
        if !field_errors.is_empty() {
            return Err(OrgError::Validation { field_errors });
        }
        let new_name = new_name.trim();

        info!("Updating organization for email: {}", email);

        let record = self
            .store
            .registry_find_one(RegistryFilter::Email(email))
            .await?
            .ok_or_else(|| OrgError::NotFound("Organization not found for this email".to_string()))?;

        if record.admin_email != acting_email {
            return Err(OrgError::Forbidden(
                "You are not authorized to update this organization".to_string(),
            ));
        }

        let _guard = self.locks.acquire(record.id).await;

        // Re-read under the lock; a concurrent delete may have won.
        let record = self
            .store
            .registry_find_one(RegistryFilter::Id(record.id))
            .await?
            .ok_or_else(|| OrgError::NotFound("Organization not found for this email".to_string()))?;

        if record.admin_email != acting_email {
            return Err(OrgError::Forbidden(
                "You are not authorized to update this organization".to_string(),
            ));
        }

        let old_name = record.organization_name.clone();
        let old_partition = record.partition_name.clone();

        if new_name != old_name {
            if let Some(existing) = self
                .store
                .registry_find_one(RegistryFilter::Name(new_name))
                .await?
            {
                if existing.id != record.id {
                    return Err(OrgError::Conflict(format!(
                        "Organization name '{}' is already taken",
                        new_name
                    )));
                }
            }
        }

        let new_partition = partition_name_for(new_name);
        let mut migrated: Option<u64> = None;

        if new_partition != old_partition {
            // Distinct names can derive the same partition name (spaces and
            // hyphens both collapse to underscores). If another record owns
            // the target partition, migrating into it would pollute a live
            // tenant, so the rename is refused up front.
            if let Some(owner) = self
                .store
                .registry_find_one(RegistryFilter::Partition(&new_partition))
                .await?
            {
                if owner.id != record.id {
                    return Err(OrgError::Conflict(format!(
                        "Organization name '{}' is already taken",
                        new_name
                    )));
                }
            }

            info!(
                "Migrating partition {} -> {}",
                old_partition, new_partition
            );
            self.store.ensure_partition(&new_partition).await?;

            let copy = self.store.copy_all(&old_partition, &new_partition);
            match tokio::time::timeout(self.migration_timeout, copy).await {
                Ok(Ok(count)) => {
                    info!("Migrated {} records", count);
                    migrated = Some(count);
                }
                Ok(Err(e)) => {
                    self.discard_partition(&new_partition).await;
                    return Err(e.into());
                }
                Err(_) => {
                    // Pre-swap timeout: remove the partial copy so the
                    // tenant stays on its old partition untouched.
                    self.discard_partition(&new_partition).await;
                    return Err(OrgError::MigrationTimeout(old_name));
                }
            }
        }

        let credential_hash =
            security::hash_secret(new_secret).map_err(|e| OrgError::Credential(e.to_string()))?;

        let update = RegistryUpdate {
            organization_name: new_name.to_string(),
            partition_name: new_partition.clone(),
            admin_credential_hash: credential_hash,
            updated_at: now_utc(),
        };

        match self
            .store
            .registry_update(record.id, record.updated_at, update)
            .await
        {
            Ok(()) => {}
            Err(e) => {
                if migrated.is_some() {
                    self.discard_partition(&new_partition).await;
                }
                return match e {
                    StoreError::Stale => Err(OrgError::Conflict(
                        "The organization was modified concurrently; please retry".to_string(),
                    )),
                    StoreError::Duplicate(_) => Err(OrgError::Conflict(format!(
                        "Organization name '{}' is already taken",
                        new_name
                    ))),
                    other => Err(other.into()),
                };
            }
        }

        if migrated.is_some() {
            // The registry now points at the new partition; the old one is
            // dead weight. A failed drop is logged for reconciliation.
            if let Err(e) = self.store.drop_partition(&old_partition).await {
                warn!("Failed to drop old partition {}: {}", old_partition, e);
            } else {
                info!("Dropped old partition: {}", old_partition);
            }
        }

        info!("Organization updated successfully: {}", new_name);

        Ok(MigrationSummary {
            old_name,
            new_name: new_name.to_string(),
            old_partition,
            new_partition,
            migrated_records: migrated,
        })
    }

    /// Delete an organization: drop the partition first, then the registry
    /// record. An interruption between the two can leave an orphan record
    /// (cleaned up by re-running delete), but never an orphan partition.
    pub async fn delete(
        &self,
        organization_name: &str,
        acting_email: &str,
    ) -> Result<DeleteConfirmation, OrgError> {
        info!("Deleting organization: {}", organization_name);

        let record = self
            .store
            .registry_find_one(RegistryFilter::Name(organization_name))
            .await?
            .ok_or_else(|| {
                OrgError::NotFound(format!(
                    "Organization '{}' not found",
                    organization_name
                ))
            })?;

        if record.admin_email != acting_email {
            warn!("Unauthorized deletion attempt by {}", acting_email);
            return Err(OrgError::Forbidden(
                "You are not authorized to delete this organization".to_string(),
            ));
        }

        let _guard = self.locks.acquire(record.id).await;

        let record = self
            .store
            .registry_find_one(RegistryFilter::Id(record.id))
            .await?
            .ok_or_else(|| {
                OrgError::NotFound(format!(
                    "Organization '{}' not found",
                    organization_name
                ))
            })?;

        if record.admin_email != acting_email {
            return Err(OrgError::Forbidden(
                "You are not authorized to delete this organization".to_string(),
            ));
        }

        self.store.drop_partition(&record.partition_name).await?;
        info!("Dropped partition: {}", record.partition_name);

        self.store.registry_delete(record.id).await?;
        self.locks.discard(record.id).await;

        info!("Organization deleted successfully: {}", record.organization_name);

        Ok(DeleteConfirmation {
            organization_name: record.organization_name,
            dropped_partition: record.partition_name,
        })
    }

    /// Best-effort removal of a partition that never got swapped in.
    /// Re-checks ownership first: a partition some registry record points at
    /// is live tenant data and must never be dropped here.
    async fn discard_partition(&self, name: &str) {
        match self.store.registry_find_one(RegistryFilter::Partition(name)).await {
            Ok(None) => {
                if let Err(e) = self.store.drop_partition(name).await {
                    warn!("Failed to clean up partition {}: {}", name, e);
                }
            }
            Ok(Some(owner)) => {
                warn!(
                    "Leaving partition {} in place: owned by organization {}",
                    name, owner.organization_name
                );
            }
            Err(e) => {
                warn!("Could not verify ownership of partition {}: {}", name, e);
            }
        }
    }
}
