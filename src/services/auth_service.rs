use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::auth::{self, Claims, TokenError};
use crate::database::{PartitionStore, RegistryFilter, StoreError};
use crate::models::TokenResponse;
use crate::security::{self, CredentialError};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown email or wrong secret. Deliberately a single variant so the
    /// caller cannot tell which one it was.
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Admin login: verifies the credential and issues a bearer token carrying
/// the tenant identity claims.
pub struct AuthService {
    store: Arc<dyn PartitionStore>,
    jwt_secret: String,
    token_ttl_hours: u64,
}

impl AuthService {
    pub fn new(store: Arc<dyn PartitionStore>, jwt_secret: String, token_ttl_hours: u64) -> Self {
        Self {
            store,
            jwt_secret,
            token_ttl_hours,
        }
    }

    pub async fn login(&self, email: &str, secret: &str) -> Result<TokenResponse, AuthError> {
        info!("Authentication attempt for email: {}", email);

        let record = match self
            .store
            .registry_find_one(RegistryFilter::Email(email))
            .await?
        {
            Some(record) => record,
            None => {
                warn!("Login failed: email not found - {}", email);
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !security::verify_secret(secret, &record.admin_credential_hash)? {
            warn!("Login failed: invalid password for {}", email);
            return Err(AuthError::InvalidCredentials);
        }

        let claims = Claims::new(
            record.admin_email.clone(),
            record.id,
            record.organization_name.clone(),
            Utc::now(),
            self.token_ttl_hours,
        );
        let access_token = auth::issue_token(&claims, &self.jwt_secret)?;

        info!("Login successful for {}", email);

        Ok(TokenResponse {
            access_token,
            token_type: "bearer".to_string(),
            organization_name: record.organization_name,
            admin_email: record.admin_email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{now_utc, OrganizationRecord};
    use crate::testing::MemoryPartitionStore;
    use uuid::Uuid;

    const SECRET: &str = "unit-test-secret";

    async fn seeded_store() -> (Arc<MemoryPartitionStore>, Uuid) {
        let store = Arc::new(MemoryPartitionStore::new());
        let id = Uuid::new_v4();
        let now = now_utc();
        store
            .registry_insert(&OrganizationRecord {
                id,
                organization_name: "TechCorp".into(),
                partition_name: "org_techcorp".into(),
                admin_email: "admin@techcorp.com".into(),
                admin_credential_hash: security::hash_secret("Secret123").unwrap(),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn login_issues_token_with_matching_claims() {
        let (store, id) = seeded_store().await;
        let svc = AuthService::new(store, SECRET.into(), 24);

        let response = svc.login("admin@techcorp.com", "Secret123").await.unwrap();
        assert_eq!(response.token_type, "bearer");
        assert_eq!(response.organization_name, "TechCorp");
        assert_eq!(response.admin_email, "admin@techcorp.com");

        let claims = auth::verify_token(&response.access_token, SECRET, Utc::now()).unwrap();
        assert_eq!(claims.admin_email, "admin@techcorp.com");
        assert_eq!(claims.org_id, id);
        assert_eq!(claims.organization_name, "TechCorp");
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let (store, _) = seeded_store().await;
        let svc = AuthService::new(store, SECRET.into(), 24);

        let err = svc
            .login("admin@techcorp.com", "WrongPass1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unknown_email_is_indistinguishable_from_wrong_password() {
        let (store, _) = seeded_store().await;
        let svc = AuthService::new(store, SECRET.into(), 24);

        let unknown = svc
            .login("ghost@nowhere.com", "Secret123")
            .await
            .unwrap_err();
        let wrong = svc
            .login("admin@techcorp.com", "WrongPass1")
            .await
            .unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
    }
}
