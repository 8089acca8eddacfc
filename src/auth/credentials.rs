use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::{password, validation};
use crate::error::{ServiceError, ServiceResult};
use crate::repo::{CredentialStore, StoreError};

#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    admin_token: Arc<str>,
}

impl CredentialService {
    pub fn new(store: Arc<dyn CredentialStore>, admin_token: impl Into<String>) -> Self {
        Self {
            store,
            admin_token: Arc::from(admin_token.into()),
        }
    }

    /// Admin-gated account creation. Both checks run before anything is written.
    pub async fn register(
        &self,
        admin_token: &str,
        login: &str,
        password: &str,
    ) -> ServiceResult<Uuid> {
        if self.admin_token.is_empty() || admin_token != &*self.admin_token {
            info!(login = %login, "registration rejected: not admin");
            return Err(ServiceError::Forbidden);
        }
        if !validation::are_credentials_valid(login, password) {
            info!(login = %login, "registration rejected: bad password or login");
            return Err(ServiceError::invalid_input("bad password or login"));
        }

        self.create_user(login, password).await
    }

    pub async fn create_user(&self, login: &str, raw_password: &str) -> ServiceResult<Uuid> {
        let password_hash = password::hash_password(raw_password)?;

        match self.store.insert_user(login, &password_hash).await {
            Ok(id) => {
                info!(login = %login, user_id = %id, "user registered");
                Ok(id)
            }
            Err(StoreError::UniqueViolation) => {
                info!(login = %login, "registration rejected: login already exists");
                Err(ServiceError::Conflict)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Unknown logins and wrong passwords are both plain `false`.
    pub async fn verify_credentials(&self, login: &str, raw_password: &str) -> ServiceResult<bool> {
        let user = match self.store.find_user(login).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                debug!(login = %login, "login not found");
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };

        let valid = password::verify_password(raw_password, &user.password_hash)?;
        if !valid {
            debug!(login = %login, "password is incorrect");
        }
        Ok(valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::MemoryStore;

    fn service() -> CredentialService {
        CredentialService::new(Arc::new(MemoryStore::new()), "admin-secret")
    }

    #[tokio::test]
    async fn register_then_verify() {
        let credentials = service();
        credentials
            .register("admin-secret", "alice1234", "Passw0rd!")
            .await
            .unwrap();

        assert!(credentials
            .verify_credentials("alice1234", "Passw0rd!")
            .await
            .unwrap());
        assert!(!credentials
            .verify_credentials("alice1234", "Passw0rd?")
            .await
            .unwrap());
        assert!(!credentials
            .verify_credentials("nobody123", "Passw0rd!")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn duplicate_login_conflicts() {
        let credentials = service();
        credentials
            .create_user("alice1234", "Passw0rd!")
            .await
            .unwrap();
        let err = credentials
            .create_user("alice1234", "0therPass!")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict));
    }

    #[tokio::test]
    async fn register_checks_admin_token_before_rules() {
        let credentials = service();
        let err = credentials
            .register("wrong", "short", "weak")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));

        let err = credentials
            .register("admin-secret", "short", "weak")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn empty_admin_token_disables_registration() {
        let credentials = CredentialService::new(Arc::new(MemoryStore::new()), "");
        let err = credentials
            .register("", "alice1234", "Passw0rd!")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
    }
}
