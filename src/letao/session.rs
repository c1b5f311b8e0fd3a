//! Shared, TTL-bounded cache of the Letao login session.

use crate::error::AuthError;
use crate::letao::auth::Authenticator;
use chrono::{DateTime, Utc};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// An authenticated session: the `guid` plus the cookie jar the login filled.
///
/// Every request made with the token shares the jar, so cookies the site rotates
/// mid-session are kept until the token is dropped.
#[derive(Debug, Clone)]
pub struct SessionToken {
    /// Session id, also stored in the jar as the `guid` cookie
    pub value: String,
    /// Server-declared expiry of the session id
    pub expires_at: DateTime<Utc>,
    jar: Arc<Jar>,
}

impl SessionToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>, jar: Arc<Jar>) -> Self {
        Self { value: value.into(), expires_at, jar }
    }

    /// Cookie store backing this session.
    pub fn jar(&self) -> Arc<Jar> {
        self.jar.clone()
    }

    /// Returns the `Cookie` header the jar would send to `url`.
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        self.jar.cookies(url).and_then(|value| value.to_str().ok().map(str::to_string))
    }
}

impl PartialEq for SessionToken {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
            && self.expires_at == other.expires_at
            && Arc::ptr_eq(&self.jar, &other.jar)
    }
}

impl Eq for SessionToken {}

#[derive(Debug)]
struct CachedSession {
    token: SessionToken,
    valid_until: DateTime<Utc>,
}

/// Lazily authenticating session cache.
///
/// Concurrent misses may each authenticate; the last one to finish is kept.
pub struct SessionCache {
    authenticator: Arc<dyn Authenticator>,
    ttl: Duration,
    slot: Mutex<Option<CachedSession>>,
}

impl SessionCache {
    pub fn new(authenticator: Arc<dyn Authenticator>, ttl: Duration) -> Self {
        Self { authenticator, ttl, slot: Mutex::new(None) }
    }

    /// Returns the cached token, authenticating first if it is missing or stale.
    pub async fn get_valid_token(&self) -> Result<SessionToken, AuthError> {
        if let Some(token) = self.cached(Utc::now()) {
            return Ok(token);
        }

        info!("No valid session cached, logging in");
        let token = self.authenticator.authenticate().await?;

        let now = Utc::now();
        let ttl_end = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let valid_until = ttl_end.min(token.expires_at);
        if valid_until <= now {
            warn!("Login returned a session that already expired at {}", token.expires_at);
        }

        *self.lock() = Some(CachedSession { token: token.clone(), valid_until });
        Ok(token)
    }

    /// Drops the cached session so the next call logs in again.
    pub fn clear(&self) {
        if self.lock().take().is_some() {
            info!("Cleared cached session");
        }
    }

    /// Returns true when a session is cached, stale or not.
    pub fn is_cached(&self) -> bool {
        self.lock().is_some()
    }

    fn cached(&self, now: DateTime<Utc>) -> Option<SessionToken> {
        let slot = self.lock();
        let cached = slot.as_ref().filter(|c| now < c.valid_until)?;
        debug!("Using cached session (valid until {})", cached.valid_until);
        Some(cached.token.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Option<CachedSession>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
