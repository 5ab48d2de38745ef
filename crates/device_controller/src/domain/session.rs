use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::domain::{DomainError, DomainResult};
use tokio::sync::{Mutex, RwLock};
use tonic::metadata::MetadataValue;
use tracing::{debug, info, instrument, warn};

/// Login identity used to obtain session credentials
#[derive(Clone)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Credential granted by a successful login exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Performs the login exchange against the login API
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LoginAuthority: Send + Sync {
    async fn login(&self, credentials: &LoginCredentials) -> DomainResult<LoginGrant>;
}

/// Per-call snapshot of the session credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    token: String,
    generation: u64,
}

impl SessionContext {
    pub fn new(token: impl Into<String>, generation: u64) -> Self {
        Self {
            token: token.into(),
            generation,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Login count at the time this snapshot was taken
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Set `authorization: Bearer <token>` on an outgoing request.
    pub fn attach<T>(&self, request: &mut tonic::Request<T>) -> DomainResult<()> {
        let value = MetadataValue::try_from(format!("Bearer {}", self.token)).map_err(|_| {
            DomainError::Login("session token is not a valid header value".to_string())
        })?;
        request.metadata_mut().insert("authorization", value);
        Ok(())
    }
}

/// Owner of the upstream session credential
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Snapshot of the live session.
    async fn current(&self) -> DomainResult<SessionContext>;

    /// Replace a credential the upstream rejected.
    ///
    /// Callers holding the same stale snapshot share a single login.
    async fn renew(&self, stale: &SessionContext) -> DomainResult<SessionContext>;
}

struct Session {
    token: String,
    expires_at: Option<DateTime<Utc>>,
    generation: u64,
}

impl Session {
    fn context(&self) -> SessionContext {
        SessionContext::new(self.token.clone(), self.generation)
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Renewal attempt that failed, kept so callers queued behind it share the error
struct FailedRenewal {
    attempt: u64,
    stale_generation: u64,
    message: String,
}

/// Session manager backed by the login API.
///
/// Reads go through the `RwLock`; every login happens while holding the
/// renewal gate, and `generation` tells late callers that a newer session
/// already exists. A caller that queued on the gate while an attempt for its
/// stale generation failed gets that failure instead of logging in again.
pub struct LoginSessionManager {
    authority: Arc<dyn LoginAuthority>,
    credentials: LoginCredentials,
    login_timeout: Duration,
    session: RwLock<Option<Session>>,
    renewal: Mutex<Option<FailedRenewal>>,
    attempts: AtomicU64,
}

impl LoginSessionManager {
    pub fn new(
        authority: Arc<dyn LoginAuthority>,
        credentials: LoginCredentials,
        login_timeout: Duration,
    ) -> Self {
        Self {
            authority,
            credentials,
            login_timeout,
            session: RwLock::new(None),
            renewal: Mutex::new(None),
            attempts: AtomicU64::new(0),
        }
    }

    /// Perform the initial login.
    pub async fn login(&self) -> DomainResult<SessionContext> {
        let _gate = self.renewal.lock().await;
        self.login_locked().await
    }

    fn snapshot(session: &Option<Session>) -> Option<(SessionContext, bool)> {
        session
            .as_ref()
            .map(|s| (s.context(), s.is_expired(Utc::now())))
    }

    async fn login_locked(&self) -> DomainResult<SessionContext> {
        let grant = tokio::time::timeout(self.login_timeout, self.authority.login(&self.credentials))
            .await
            .map_err(|_| {
                DomainError::Login(format!("login timed out after {:?}", self.login_timeout))
            })??;

        let mut session = self.session.write().await;
        let generation = session.as_ref().map_or(0, |s| s.generation) + 1;
        *session = Some(Session {
            token: grant.token.clone(),
            expires_at: grant.expires_at,
            generation,
        });

        info!(
            email = %self.credentials.email,
            generation,
            expires_at = ?grant.expires_at,
            has_refresh_token = !grant.refresh_token.is_empty(),
            "Session established"
        );
        Ok(SessionContext::new(grant.token, generation))
    }
}

#[async_trait]
impl SessionManager for LoginSessionManager {
    async fn current(&self) -> DomainResult<SessionContext> {
        let snapshot = Self::snapshot(&*self.session.read().await);
        match snapshot {
            Some((context, false)) => Ok(context),
            Some((context, true)) => {
                debug!(generation = context.generation(), "Session expired, renewing");
                self.renew(&context).await
            }
            None => {
                warn!("No session established, logging in");
                self.renew(&SessionContext::new("", 0)).await
            }
        }
    }

    #[instrument(skip(self, stale), fields(stale_generation = stale.generation()))]
    async fn renew(&self, stale: &SessionContext) -> DomainResult<SessionContext> {
        let seen = self.attempts.load(Ordering::SeqCst);
        let mut gate = self.renewal.lock().await;

        let snapshot = Self::snapshot(&*self.session.read().await);
        if let Some((context, false)) = snapshot {
            if context.generation() > stale.generation() {
                debug!(
                    generation = context.generation(),
                    "Session already renewed by another caller"
                );
                return Ok(context);
            }
        }

        if let Some(failed) = gate.as_ref() {
            if failed.attempt > seen && failed.stale_generation == stale.generation() {
                debug!(attempt = failed.attempt, "Sharing failed renewal with queued caller");
                return Err(DomainError::Login(failed.message.clone()));
            }
        }

        let result = self.login_locked().await;
        // Counts finished attempts; waiters compare it with what they saw on arrival
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        *gate = match &result {
            Ok(_) => None,
            Err(e) => Some(FailedRenewal {
                attempt,
                stale_generation: stale.generation(),
                message: match e {
                    DomainError::Login(message) => message.clone(),
                    other => other.to_string(),
                },
            }),
        };
        result
    }
}
