//! Issued-but-unanswered challenges, keyed by nonce.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::types::SignInInput;

#[derive(Debug, Clone)]
struct Pending {
    input: SignInInput,
    expires_at: DateTime<Utc>,
}

/// Pending challenges kept unless configured otherwise.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Each nonce can be taken out exactly once, and only before it expires.
#[derive(Debug, Clone)]
pub struct ChallengeStore {
    pending: Arc<Mutex<HashMap<String, Pending>>>,
    capacity: usize,
}

impl Default for ChallengeStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_PENDING)
    }
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// At most `capacity` unanswered challenges are held at once.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Pending>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Record `input` until `now + ttl`. Returns the expiry.
    ///
    /// Challenges without a nonce cannot be answered and are not recorded.
    pub fn issue(&self, input: SignInInput, ttl: Duration) -> Result<DateTime<Utc>, StoreError> {
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .ok_or(StoreError::ExpiryOutOfRange)?;
        self.issue_until(input, expires_at)
    }

    /// Expired entries are swept before a full table refuses a new one.
    pub fn issue_until(
        &self,
        input: SignInInput,
        expires_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, StoreError> {
        let nonce = input.nonce.clone().ok_or(StoreError::MissingNonce)?;
        let mut pending = self.lock();
        if pending.len() >= self.capacity && !pending.contains_key(&nonce) {
            let now = Utc::now();
            pending.retain(|_, p| p.expires_at >= now);
            if pending.len() >= self.capacity {
                warn!(capacity = self.capacity, "pending challenge table is full");
                return Err(StoreError::Full);
            }
        }
        pending.insert(nonce, Pending { input, expires_at });
        Ok(expires_at)
    }

    /// Remove and return the challenge for `nonce`. Expired entries are
    /// removed as well but reported as [`StoreError::Expired`].
    pub fn take(&self, nonce: &str) -> Result<SignInInput, StoreError> {
        let pending = self.lock().remove(nonce).ok_or(StoreError::UnknownNonce)?;
        if pending.expires_at < Utc::now() {
            return Err(StoreError::Expired);
        }
        Ok(pending.input)
    }

    /// Drop every expired entry, returning how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|_, p| p.expires_at >= now);
        let purged = before - pending.len();
        if purged > 0 {
            debug!(purged, "expired challenges removed");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
