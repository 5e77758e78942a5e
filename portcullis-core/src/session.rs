//! Session authority
//!
//! Issues, resolves and invalidates login sessions. All session state lives in
//! one table behind a single `RwLock`; the per-identity cap check and the
//! insertion of the new session happen under the same write guard, so two
//! concurrent logins for one identity can never both pass the check.

use crate::config::{SessionConfig, SessionLimitPolicy};
use crate::error::{AuthError, AuthResult};
use crate::password::verify_off_thread;
use crate::traits::{CredentialHasher, CredentialStore};
use crate::types::{Credentials, Role};
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Opaque session token
pub type SessionId = String;

/// Server-side record of a live login
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        (now - self.last_accessed).to_std().unwrap_or_default() > ttl
    }
}

/// Session state as seen by one request
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub session: Option<Session>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self { session: None }
    }

    pub fn authenticated(session: Session) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.session.as_ref().map(|s| s.role)
    }

    pub fn username(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.username.as_str())
    }
}

#[derive(Debug, Default)]
struct SessionTable {
    sessions: HashMap<SessionId, Session>,
    // Oldest first
    by_user: HashMap<String, Vec<SessionId>>,
}

impl SessionTable {
    fn insert(&mut self, session: Session) {
        self.by_user
            .entry(session.username.clone())
            .or_default()
            .push(session.id.clone());
        self.sessions.insert(session.id.clone(), session);
    }

    fn remove(&mut self, id: &str) -> Option<Session> {
        let session = self.sessions.remove(id)?;
        if let Some(ids) = self.by_user.get_mut(&session.username) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                self.by_user.remove(&session.username);
            }
        }
        Some(session)
    }

    /// Drop expired sessions of one identity and return the live ids, oldest first
    fn live_ids(&mut self, username: &str, now: DateTime<Utc>, ttl: Duration) -> Vec<SessionId> {
        let ids = self.by_user.get(username).cloned().unwrap_or_default();
        let mut live = Vec::with_capacity(ids.len());

        for id in ids {
            let expired = self
                .sessions
                .get(&id)
                .map_or(true, |session| session.is_expired(now, ttl));
            if expired {
                self.remove(&id);
            } else {
                live.push(id);
            }
        }

        live
    }
}

/// Issues and tracks login sessions under a per-identity cap
#[derive(Clone)]
pub struct SessionAuthority {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn CredentialHasher>,
    /// Verified against when the username is unknown, so both failure paths
    /// pay for one hash
    dummy_verifier: String,
    max_sessions: usize,
    policy: SessionLimitPolicy,
    ttl: Duration,
    table: Arc<RwLock<SessionTable>>,
}

impl SessionAuthority {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: impl CredentialHasher + 'static,
        config: &SessionConfig,
    ) -> Self {
        let dummy_verifier = hasher.hash(&generate_session_id()).unwrap_or_else(|e| {
            warn!("Could not prepare the unknown-user verifier: {}", e);
            String::new()
        });

        Self {
            store,
            hasher: Arc::new(hasher),
            dummy_verifier,
            max_sessions: config.max_sessions.max(1),
            policy: config.on_limit,
            ttl: config.ttl(),
            table: Arc::new(RwLock::new(SessionTable::default())),
        }
    }

    pub fn policy(&self) -> SessionLimitPolicy {
        self.policy
    }

    /// Verify credentials and open a new session.
    ///
    /// `previous` is the session token the client presented before logging in,
    /// if any. It is never reused: the new token always differs from it, and a
    /// live session under that token is closed once the new one is admitted.
    pub async fn authenticate(
        &self,
        credentials: &Credentials,
        previous: Option<&str>,
    ) -> AuthResult<Session> {
        let username = credentials.username.trim();

        let found = self.store.find_by_username(username).await?;
        let verifier = match &found {
            Some(identity) => identity.password_hash.clone(),
            None => self.dummy_verifier.clone(),
        };
        let matches =
            verify_off_thread(self.hasher.clone(), credentials.password.clone(), verifier).await;

        let identity = match found {
            Some(identity) if matches => identity,
            Some(_) => {
                warn!(username = %username, "Login failed: invalid password");
                return Err(AuthError::InvalidCredentials);
            }
            None => {
                warn!(username = %username, "Login failed: unknown username");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let now = Utc::now();
        let mut table = self.table.write().await;

        let mut live = table.live_ids(&identity.username, now, self.ttl);
        if let Some(previous) = previous {
            live.retain(|id| id != previous);
        }

        if live.len() >= self.max_sessions {
            match self.policy {
                SessionLimitPolicy::RejectNew => {
                    warn!(
                        username = %identity.username,
                        active = live.len(),
                        max = self.max_sessions,
                        "Login rejected: session limit reached"
                    );
                    return Err(AuthError::SessionLimitExceeded(identity.username));
                }
                SessionLimitPolicy::EvictOldest => {
                    let excess = live.len() + 1 - self.max_sessions;
                    for id in live.iter().take(excess) {
                        table.remove(id);
                    }
                    info!(
                        username = %identity.username,
                        evicted = excess,
                        "Evicted oldest sessions to admit new login"
                    );
                }
            }
        }

        if let Some(previous) = previous {
            if table.remove(previous).is_some() {
                debug!("Closed pre-login session");
            }
        }

        let id = loop {
            let candidate = generate_session_id();
            if Some(candidate.as_str()) != previous && !table.sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        let session = Session {
            id,
            username: identity.username,
            role: identity.role,
            created_at: now,
            last_accessed: now,
        };
        table.insert(session.clone());

        info!(username = %session.username, role = %session.role, "Session established");
        Ok(session)
    }

    /// Look up a live session and mark it as accessed
    pub async fn resolve(&self, id: &str) -> Option<Session> {
        let now = Utc::now();
        let mut table = self.table.write().await;

        let expired = table.sessions.get(id)?.is_expired(now, self.ttl);
        if expired {
            table.remove(id);
            debug!("Session expired on access");
            return None;
        }

        let session = table.sessions.get_mut(id)?;
        session.last_accessed = now;
        Some(session.clone())
    }

    /// Invalidate a session. Returns the closed session, if it existed.
    pub async fn logout(&self, id: &str) -> Option<Session> {
        let session = self.table.write().await.remove(id);
        if let Some(session) = &session {
            info!(username = %session.username, "Session closed");
        }
        session
    }

    /// Count live sessions for an identity
    pub async fn active_sessions(&self, username: &str) -> usize {
        let now = Utc::now();
        let table = self.table.read().await;

        table
            .by_user
            .get(username)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| table.sessions.get(id))
                    .filter(|session| !session.is_expired(now, self.ttl))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Remove every idle-expired session. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut table = self.table.write().await;

        let expired: Vec<SessionId> = table
            .sessions
            .values()
            .filter(|session| session.is_expired(now, self.ttl))
            .map(|session| session.id.clone())
            .collect();

        for id in &expired {
            table.remove(id);
        }

        if !expired.is_empty() {
            debug!("Purged {} expired sessions", expired.len());
        }
        expired.len()
    }
}

/// 256-bit random token, base64url without padding
fn generate_session_id() -> SessionId {
    let mut buf = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}
