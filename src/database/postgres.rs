use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::{OrganizationRecord, PARTITION_PREFIX};

use super::store::{PartitionStore, RegistryFilter, RegistryUpdate, StoreError};

/// Name of the global registry table.
const REGISTRY_TABLE: &str = "organizations";

/// PostgreSQL-backed partition store.
///
/// The registry is a single `organizations` table; each tenant partition is
/// a dynamically named table of opaque JSONB records. All queries are
/// runtime strings with bound parameters; dynamic identifiers pass through
/// name validation and quoting before interpolation.
pub struct PgPartitionStore {
    pool: PgPool,
}

impl PgPartitionStore {
    /// Build a lazily connecting pool. The process can start without a
    /// reachable database; operations then fail with `Unavailable` until it
    /// comes back.
    pub fn connect(config: &AppConfig, database_url: &str) -> Result<Self, StoreError> {
        let url = url::Url::parse(database_url)
            .map_err(|_| StoreError::Unavailable("DATABASE_URL is not a valid URL".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
            .connect_lazy(url.as_str())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the registry table and its uniqueness constraints if absent.
    /// The constraints back the registry's check-then-insert against
    /// concurrent creates.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {REGISTRY_TABLE} (
                id UUID PRIMARY KEY,
                organization_name TEXT NOT NULL,
                partition_name TEXT NOT NULL,
                admin_email TEXT NOT NULL,
                admin_credential_hash TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                CONSTRAINT organizations_organization_name_key UNIQUE (organization_name),
                CONSTRAINT organizations_partition_name_key UNIQUE (partition_name),
                CONSTRAINT organizations_admin_email_key UNIQUE (admin_email)
            )
            "#
        );
        sqlx::query(&ddl).execute(&self.pool).await.map_err(map_sqlx)?;
        info!("Registry schema ready");
        Ok(())
    }

    /// Validate partition names before they reach an identifier position.
    /// Accepts only the derived form: `org_` followed by lowercase
    /// alphanumerics and underscores.
    fn is_valid_partition_name(name: &str) -> bool {
        match name.strip_prefix(PARTITION_PREFIX) {
            Some(rest) => {
                !rest.is_empty()
                    && rest
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            }
            None => false,
        }
    }

    fn checked_identifier(name: &str) -> Result<String, StoreError> {
        if !Self::is_valid_partition_name(name) {
            return Err(StoreError::InvalidPartitionName(name.to_string()));
        }
        Ok(Self::quote_identifier(name))
    }

    /// Quote a SQL identifier to prevent injection.
    fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<OrganizationRecord, StoreError> {
        Ok(OrganizationRecord {
            id: row.try_get("id").map_err(map_sqlx)?,
            organization_name: row.try_get("organization_name").map_err(map_sqlx)?,
            partition_name: row.try_get("partition_name").map_err(map_sqlx)?,
            admin_email: row.try_get("admin_email").map_err(map_sqlx)?,
            admin_credential_hash: row.try_get("admin_credential_hash").map_err(map_sqlx)?,
            created_at: row.try_get("created_at").map_err(map_sqlx)?,
            updated_at: row.try_get("updated_at").map_err(map_sqlx)?,
        })
    }
}

/// Classify sqlx errors into store errors. Unique violations map to
/// `Duplicate` with the offending field derived from the constraint name;
/// connectivity problems map to `Unavailable`; the rest stay opaque.
fn map_sqlx(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23505") {
            let constraint = db.constraint().unwrap_or_default();
            let field = if constraint.contains("admin_email") {
                "admin_email"
            } else if constraint.contains("partition_name") {
                "partition_name"
            } else {
                "organization_name"
            };
            return StoreError::Duplicate(field);
        }
    }
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}

#[async_trait]
impl PartitionStore for PgPartitionStore {
    async fn ensure_partition(&self, name: &str) -> Result<(), StoreError> {
        let ident = Self::checked_identifier(name)?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {ident} (id UUID NOT NULL, doc JSONB NOT NULL)"
        );
        sqlx::query(&ddl).execute(&self.pool).await.map_err(map_sqlx)?;
        info!("Partition ready: {}", name);
        Ok(())
    }

    async fn drop_partition(&self, name: &str) -> Result<(), StoreError> {
        let ident = Self::checked_identifier(name)?;
        let ddl = format!("DROP TABLE IF EXISTS {ident}");
        sqlx::query(&ddl).execute(&self.pool).await.map_err(map_sqlx)?;
        info!("Dropped partition: {}", name);
        Ok(())
    }

    async fn partition_exists(&self, name: &str) -> Result<bool, StoreError> {
        if !Self::is_valid_partition_name(name) {
            return Err(StoreError::InvalidPartitionName(name.to_string()));
        }
        let row = sqlx::query("SELECT COUNT(*) AS n FROM pg_tables WHERE tablename = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
        let n: i64 = row.try_get("n").map_err(map_sqlx)?;
        Ok(n > 0)
    }

    async fn copy_all(&self, src: &str, dst: &str) -> Result<u64, StoreError> {
        let src_ident = Self::checked_identifier(src)?;
        let dst_ident = Self::checked_identifier(dst)?;
        let sql = format!("INSERT INTO {dst_ident} SELECT * FROM {src_ident}");
        let result = sqlx::query(&sql).execute(&self.pool).await.map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn count_records(&self, name: &str) -> Result<u64, StoreError> {
        let ident = Self::checked_identifier(name)?;
        let sql = format!("SELECT COUNT(*) AS n FROM {ident}");
        let row = sqlx::query(&sql).fetch_one(&self.pool).await.map_err(map_sqlx)?;
        let n: i64 = row.try_get("n").map_err(map_sqlx)?;
        Ok(n.max(0) as u64)
    }

    async fn registry_find_one(
        &self,
        filter: RegistryFilter<'_>,
    ) -> Result<Option<OrganizationRecord>, StoreError> {
        let column = match filter {
            RegistryFilter::Id(_) => "id",
            RegistryFilter::Name(_) => "organization_name",
            RegistryFilter::Email(_) => "admin_email",
            RegistryFilter::Partition(_) => "partition_name",
        };
        let query = format!("SELECT * FROM {REGISTRY_TABLE} WHERE {column} = $1");

        let row = match filter {
            RegistryFilter::Id(id) => sqlx::query(&query).bind(id).fetch_optional(&self.pool).await,
            RegistryFilter::Name(name) => {
                sqlx::query(&query).bind(name).fetch_optional(&self.pool).await
            }
            RegistryFilter::Email(email) => {
                sqlx::query(&query).bind(email).fetch_optional(&self.pool).await
            }
            RegistryFilter::Partition(partition) => {
                sqlx::query(&query).bind(partition).fetch_optional(&self.pool).await
            }
        }
        .map_err(map_sqlx)?;

        row.map(|r| Self::row_to_record(&r)).transpose()
    }

    async fn registry_insert(&self, record: &OrganizationRecord) -> Result<(), StoreError> {
        let sql = format!(
            r#"
            INSERT INTO {REGISTRY_TABLE}
                (id, organization_name, partition_name, admin_email,
                 admin_credential_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#
        );
        sqlx::query(&sql)
            .bind(record.id)
            .bind(&record.organization_name)
            .bind(&record.partition_name)
            .bind(&record.admin_email)
            .bind(&record.admin_credential_hash)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn registry_update(
        &self,
        id: Uuid,
        expected_updated_at: DateTime<Utc>,
        update: RegistryUpdate,
    ) -> Result<(), StoreError> {
        let sql = format!(
            r#"
            UPDATE {REGISTRY_TABLE}
            SET organization_name = $1,
                partition_name = $2,
                admin_credential_hash = $3,
                updated_at = $4
            WHERE id = $5 AND updated_at = $6
            "#
        );
        let result = sqlx::query(&sql)
            .bind(&update.organization_name)
            .bind(&update.partition_name)
            .bind(&update.admin_credential_hash)
            .bind(update.updated_at)
            .bind(id)
            .bind(expected_updated_at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Stale);
        }
        Ok(())
    }

    async fn registry_delete(&self, id: Uuid) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {REGISTRY_TABLE} WHERE id = $1");
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}
