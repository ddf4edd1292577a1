// Per-resource mutual exclusion with TTL-bounded ownership. Acquisition is an
// atomic conditional insert in a poll loop; release requires the token handed
// out at acquire time, so a holder that lost its lock to TTL expiry cannot
// release the next owner's lock. There is no fairness guarantee: the first
// successful racer wins and starvation is bounded only by the caller timeout.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::LockConfig;
use crate::error::LockError;

// Opaque proof of lock ownership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

fn new_token() -> LockToken {
    LockToken(format!(
        "{:016x}{:016x}",
        rand::random::<u64>(),
        rand::random::<u64>()
    ))
}

struct LockRecord {
    token: LockToken,
    expires_at: Instant,
}

pub struct LockManager {
    locks: DashMap<String, LockRecord>,
    ttl: Duration,
    poll_interval: Duration,
}

impl LockManager {
    pub fn new(config: LockConfig) -> Self {
        Self {
            locks: DashMap::new(),
            ttl: Duration::from_millis(config.ttl_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    // Single atomic attempt: the entry guard serializes racers on the key.
    fn try_acquire(&self, resource_id: &str) -> Option<LockToken> {
        let now = Instant::now();
        match self.locks.entry(resource_id.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().expires_at <= now {
                    // Holder crashed or stalled past the TTL; take over
                    let token = new_token();
                    tracing::warn!(resource_id, "lock expired, taking over");
                    entry.insert(LockRecord {
                        token: token.clone(),
                        expires_at: now + self.ttl,
                    });
                    Some(token)
                } else {
                    None
                }
            }
            Entry::Vacant(entry) => {
                let token = new_token();
                entry.insert(LockRecord {
                    token: token.clone(),
                    expires_at: now + self.ttl,
                });
                Some(token)
            }
        }
    }

    pub async fn acquire(
        &self,
        resource_id: &str,
        timeout: Duration,
    ) -> Result<LockToken, LockError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(token) = self.try_acquire(resource_id) {
                tracing::debug!(resource_id, "lock acquired");
                return Ok(token);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Timeout {
                    resource_id: resource_id.to_string(),
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    // Deletes the record only when the stored token matches. Returns false
    // for a stale or foreign token.
    pub fn release(&self, resource_id: &str, token: &LockToken) -> bool {
        let removed = self
            .locks
            .remove_if(resource_id, |_, record| record.token == *token)
            .is_some();
        if !removed {
            tracing::debug!(resource_id, "release ignored, token does not own the lock");
        }
        removed
    }

    // Acquire as an RAII lease: dropping the guard releases the lock, so a
    // cancelled caller never leaks one. The TTL remains the crash backstop.
    pub async fn lease(
        self: &Arc<Self>,
        resource_id: &str,
        timeout: Duration,
    ) -> Result<LockGuard, LockError> {
        let token = self.acquire(resource_id, timeout).await?;
        Ok(LockGuard {
            manager: Arc::clone(self),
            resource_id: resource_id.to_string(),
            token: Some(token),
        })
    }
}

pub struct LockGuard {
    manager: Arc<LockManager>,
    resource_id: String,
    token: Option<LockToken>,
}

impl LockGuard {
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn release(mut self) -> bool {
        match self.token.take() {
            Some(token) => self.manager.release(&self.resource_id, &token),
            None => false,
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.manager.release(&self.resource_id, &token);
        }
    }
}
