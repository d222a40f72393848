//! Mutual exclusion per business-order key.
//!
//! The lock manager serializes every check-then-act sequence on one order reference: payment-order creation, refund
//! processing, and anything else that must observe and mutate order state as a unit. Acquisition waits a bounded
//! time and then fails fast with [`LockError::Busy`], so a stampede on one reference degrades into "retry later"
//! responses rather than queued work. Every lock carries a holder token and a TTL: release requires the token (so a
//! slow holder cannot release a lock that has since expired and been re-granted), the TTL reclaims locks abandoned
//! by a crashed task, and [`LockManager::sweep_expired`] exists as a scheduled clean-up pass. A separate
//! [`LockManager::force_unlock`] is reserved for operator recovery and skips the token check.
use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use log::*;
use thiserror::Error;

const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Error)]
pub enum LockError {
    #[error("The lock on {0} is held elsewhere. Busy, retry later")]
    Busy(String),
    #[error("The lock on {0} is not held by the presented token")]
    NotHolder(String),
}

struct LockEntry {
    token: u64,
    expires_at: Instant,
}

pub struct LockManager {
    entries: Mutex<HashMap<String, LockEntry>>,
    ttl: Duration,
    max_wait: Duration,
}

impl LockManager {
    pub fn new(ttl: Duration, max_wait: Duration) -> Self {
        Self { entries: Mutex::new(HashMap::new()), ttl, max_wait }
    }

    /// Acquire the lock for `key`, waiting up to the configured bound. The returned guard releases the lock when
    /// dropped, so the lock is released on every exit path, including early returns and panics.
    pub async fn acquire(&self, key: &str) -> Result<LockGuard<'_>, LockError> {
        let deadline = Instant::now() + self.max_wait;
        loop {
            if let Some(token) = self.try_acquire(key) {
                trace!("🔒️ Lock acquired on {key}");
                return Ok(LockGuard { manager: self, key: key.to_string(), token });
            }
            if Instant::now() >= deadline {
                debug!("🔒️ Gave up waiting for the lock on {key}");
                return Err(LockError::Busy(key.to_string()));
            }
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }

    fn try_acquire(&self, key: &str) -> Option<u64> {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => None,
            _ => {
                let token = rand::random::<u64>();
                entries.insert(key.to_string(), LockEntry { token, expires_at: now + self.ttl });
                Some(token)
            },
        }
    }

    /// Release the lock on `key`. A no-op if the lock has already expired and vanished; an error if it is now held
    /// under a different token.
    pub fn release(&self, key: &str, token: u64) -> Result<(), LockError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.token == token => {
                entries.remove(key);
                trace!("🔒️ Lock released on {key}");
                Ok(())
            },
            Some(_) => Err(LockError::NotHolder(key.to_string())),
            None => Ok(()),
        }
    }

    /// Operator recovery: drop the lock regardless of holder. Returns whether a lock existed.
    pub fn force_unlock(&self, key: &str) -> bool {
        let existed = self.entries.lock().unwrap().remove(key).is_some();
        if existed {
            warn!("🔒️ Lock on {key} was forcibly removed");
        }
        existed
    }

    /// Drops every expired entry, returning the number removed. Run periodically so abandoned keys do not
    /// accumulate.
    pub fn sweep_expired(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

pub struct LockGuard<'a> {
    manager: &'a LockManager,
    key: String,
    token: u64,
}

impl std::fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("key", &self.key).field("token", &self.token).finish()
    }
}

impl LockGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> u64 {
        self.token
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.manager.release(&self.key, self.token) {
            warn!("🔒️ Could not release lock: {e}");
        }
    }
}
