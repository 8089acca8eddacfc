use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::credentials::CredentialService;
use super::token::generate_token;
use crate::error::{ServiceError, ServiceResult};
use crate::models::NewSession;
use crate::repo::{StoreError, TokenRepo};

/// Bound on issuance retries. Each retry either re-reads a session created
/// by a concurrent login or draws a fresh token after a collision.
pub const MAX_TOKEN_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSession {
    pub login: String,
    pub valid_until: DateTime<Utc>,
}

/// Issues, validates, refreshes and revokes bearer tokens.
///
/// Each login holds at most one session row. Expiry is checked lazily on
/// validation; an expired row is refreshed in place on the next login so
/// the token string never changes while the row lives.
#[derive(Clone)]
pub struct SessionManager {
    tokens: Arc<dyn TokenRepo>,
    credentials: CredentialService,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(tokens: Arc<dyn TokenRepo>, credentials: CredentialService, ttl: Duration) -> Self {
        Self {
            tokens,
            credentials,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn login(&self, login: &str, raw_password: &str) -> ServiceResult<String> {
        if !self.credentials.verify_credentials(login, raw_password).await? {
            info!(login = %login, "login rejected: bad credentials");
            return Err(ServiceError::BadCredentials);
        }

        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let now = Utc::now();
            match self.tokens.find_by_login(login).await {
                Ok(session) if !session.is_expired_at(now) => {
                    debug!(login = %login, "reusing active session");
                    return Ok(session.token);
                }
                Ok(session) => {
                    let refreshed = self
                        .tokens
                        .extend_session(&session.token, now + self.ttl)
                        .await;
                    match refreshed {
                        Ok(()) => {
                            info!(login = %login, "expired session refreshed");
                            return Ok(session.token);
                        }
                        // Revoked between the read and the update.
                        Err(StoreError::NotFound) => continue,
                        Err(err) => return Err(err.into()),
                    }
                }
                Err(StoreError::NotFound) => {}
                Err(err) => return Err(err.into()),
            }

            let new_session = NewSession {
                login: login.to_owned(),
                token: generate_token(),
                valid_until: now + self.ttl,
            };
            match self.tokens.insert_session(new_session).await {
                Ok(session) => {
                    info!(login = %login, "session issued");
                    return Ok(session.token);
                }
                Err(StoreError::UniqueViolation) => {
                    debug!(login = %login, attempt, "session insert lost a race, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(login = %login, "gave up issuing a session token");
        Err(ServiceError::Conflict)
    }

    pub async fn validate_token(&self, token: &str) -> ServiceResult<ValidatedSession> {
        if token.is_empty() {
            return Err(ServiceError::InvalidToken);
        }

        let session = match self.tokens.find_by_token(token).await {
            Ok(session) => session,
            Err(StoreError::NotFound) => return Err(ServiceError::InvalidToken),
            Err(err) => return Err(err.into()),
        };

        if session.is_expired_at(Utc::now()) {
            debug!(login = %session.login, "token expired");
            return Err(ServiceError::TokenExpired);
        }

        Ok(ValidatedSession {
            login: session.login,
            valid_until: session.valid_until,
        })
    }

    pub async fn logout(&self, token: &str) -> ServiceResult<()> {
        match self.tokens.delete_session(token).await {
            Ok(()) => {
                info!("session revoked");
                Ok(())
            }
            Err(StoreError::NotFound) => Err(ServiceError::TokenNotFound),
            Err(err) => Err(err.into()),
        }
    }

    /// Login owning `token`, without an expiry check.
    pub async fn resolve_login(&self, token: &str) -> ServiceResult<String> {
        if token.is_empty() {
            return Err(ServiceError::NotFound);
        }
        Ok(self.tokens.find_by_token(token).await?.login)
    }
}
