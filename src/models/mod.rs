use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Prefix applied to every partition name derived from an organization name.
pub const PARTITION_PREFIX: &str = "org_";

/// One row per tenant in the global registry.
///
/// `admin_credential_hash` never leaves the registry/auth services; API
/// responses use [`OrganizationView`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub id: Uuid,
    pub organization_name: String,
    pub partition_name: String,
    pub admin_email: String,
    pub admin_credential_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrganizationRecord {
    pub fn view(&self) -> OrganizationView {
        OrganizationView {
            organization_name: self.organization_name.clone(),
            partition_name: self.partition_name.clone(),
            admin_email: self.admin_email.clone(),
            created_at: self.created_at,
        }
    }
}

/// Client-facing projection of an organization record (no credential hash).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationView {
    pub organization_name: String,
    pub partition_name: String,
    pub admin_email: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a rename, returned for audit purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub old_name: String,
    pub new_name: String,
    pub old_partition: String,
    pub new_partition: String,
    /// Records copied during partition migration; `None` when the partition
    /// name did not change and no migration ran.
    pub migrated_records: Option<u64>,
}

/// Result of a delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteConfirmation {
    pub organization_name: String,
    pub dropped_partition: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    pub organization_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrganizationRequest {
    pub organization_name: String,
    /// Current admin email, used to locate the record. Not updated.
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub organization_name: String,
    pub admin_email: String,
}

/// Current UTC time truncated to microseconds, matching the precision the
/// store round-trips. Conditional updates compare `updated_at` for equality,
/// so in-process timestamps must not carry more precision than stored ones.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Derive the partition name from an organization name: lower-cased, spaces
/// and hyphens replaced with underscores, prefixed.
pub fn partition_name_for(organization_name: &str) -> String {
    let sanitized = organization_name
        .to_lowercase()
        .replace(' ', "_")
        .replace('-', "_");
    format!("{}{}", PARTITION_PREFIX, sanitized)
}

/// Validate registration/update input, collecting every violated constraint.
///
/// Returns an empty map when all fields pass. Keys are field names, values
/// are human-readable messages.
pub fn validate_org_input(
    organization_name: &str,
    email: &str,
    password: &str,
) -> HashMap<String, String> {
    let mut violations = HashMap::new();

    let name = organization_name.trim();
    if name.len() < 3 || name.len() > 50 {
        violations.insert(
            "organization_name".to_string(),
            "Organization name must be between 3 and 50 characters".to_string(),
        );
    } else if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == ' ' || c == '-' || c == '_')
    {
        violations.insert(
            "organization_name".to_string(),
            "Organization name can only contain letters, numbers, spaces, hyphens, and underscores"
                .to_string(),
        );
    }

    if !is_well_formed_email(email) {
        violations.insert("email".to_string(), "Invalid email address".to_string());
    }

    if password.len() < 8 {
        violations.insert(
            "password".to_string(),
            "Password must be at least 8 characters".to_string(),
        );
    }

    violations
}

/// Minimal structural email check: one `@`, non-empty local part, and a
/// domain containing a dot with non-empty labels.
fn is_well_formed_email(email: &str) -> bool {
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = match parts.next() {
        Some(d) => d,
        None => return false,
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    if local.contains(char::is_whitespace) || domain.contains(char::is_whitespace) {
        return false;
    }
    domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}
