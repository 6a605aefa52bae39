//! In-memory pending MFA login challenges
//!
//! After a password-verified login for an MFA-enabled user, the server
//! parks a single-use pending code here and hands it to the client; the
//! client must echo it back together with a TOTP code to finish the
//! login. Entries live only in this process and die with it, which just
//! forces an interrupted login to start over.

use std::collections::HashMap;
use std::sync::Arc;

use rand::RngCore;
use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Pending challenge lifetime (after password verification, before MFA)
pub const CHALLENGE_TTL_MINUTES: i64 = 5;

#[derive(Debug, Clone)]
struct PendingChallenge {
    pending_code: String,
    expires_at: OffsetDateTime,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("No pending challenge")]
    NotFound,
    #[error("Pending code mismatch")]
    Mismatch,
    #[error("Pending challenge expired")]
    Expired,
}

/// Process-wide store of pending login challenges, at most one per
/// username
///
/// `user_lock` serializes racing logins for the same username so one
/// request's challenge cannot be verified against another's; the guard
/// must never be held across a database or network await.
pub struct ChallengeStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, PendingChallenge>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ChallengeStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::minutes(CHALLENGE_TTL_MINUTES))
    }

    /// Construct with an explicit TTL (tests use zero to force expiry)
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the per-username lock
    ///
    /// Concurrent logins for different usernames never contend; two for
    /// the same username run their issue/consume sections one at a time.
    pub async fn user_lock(&self, username: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(username.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Issue a fresh challenge, replacing any prior one for the username
    pub async fn issue(&self, username: &str) -> String {
        let pending_code = generate_pending_code();
        let challenge = PendingChallenge {
            pending_code: pending_code.clone(),
            expires_at: OffsetDateTime::now_utc() + self.ttl,
        };

        let mut entries = self.entries.lock().await;
        entries.insert(username.to_string(), challenge);
        pending_code
    }

    /// Consume the challenge for a username
    ///
    /// The entry is removed no matter the outcome: a failed attempt must
    /// not leave a code behind to retry against.
    pub async fn consume(&self, username: &str, pending_code: &str) -> Result<(), ChallengeError> {
        let mut entries = self.entries.lock().await;
        let challenge = entries.remove(username).ok_or(ChallengeError::NotFound)?;

        if challenge.expires_at <= OffsetDateTime::now_utc() {
            return Err(ChallengeError::Expired);
        }
        if challenge.pending_code != pending_code {
            return Err(ChallengeError::Mismatch);
        }
        Ok(())
    }

    /// Drop any pending challenge for a username
    pub async fn remove(&self, username: &str) {
        self.entries.lock().await.remove(username);
    }

    /// Sweep expired entries (opportunistic; expired entries fail
    /// `consume` regardless)
    pub async fn purge_expired(&self) {
        let now = OffsetDateTime::now_utc();
        self.entries
            .lock()
            .await
            .retain(|_, challenge| challenge.expires_at > now);
    }
}

impl Default for ChallengeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 32 random bytes, hex encoded
fn generate_pending_code() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_issue_and_consume() {
        let store = ChallengeStore::new();
        let code = store.issue("alice").await;
        assert_eq!(store.consume("alice", &code).await, Ok(()));
    }

    #[tokio::test]
    async fn test_challenge_is_single_use() {
        let store = ChallengeStore::new();
        let code = store.issue("alice").await;
        store.consume("alice", &code).await.unwrap();
        // No second chance, even with the right code
        assert_eq!(
            store.consume("alice", &code).await,
            Err(ChallengeError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_mismatch_purges_the_challenge() {
        let store = ChallengeStore::new();
        let code = store.issue("alice").await;
        assert_eq!(
            store.consume("alice", "wrong-code").await,
            Err(ChallengeError::Mismatch)
        );
        // The correct code no longer works either
        assert_eq!(
            store.consume("alice", &code).await,
            Err(ChallengeError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_expired_challenge_never_validates() {
        let store = ChallengeStore::with_ttl(Duration::ZERO);
        let code = store.issue("alice").await;
        assert_eq!(
            store.consume("alice", &code).await,
            Err(ChallengeError::Expired)
        );
    }

    #[tokio::test]
    async fn test_reissue_replaces_previous_challenge() {
        let store = ChallengeStore::new();
        let first = store.issue("alice").await;
        let second = store.issue("alice").await;
        assert_ne!(first, second);

        // The first code is stale
        assert_eq!(
            store.consume("alice", &first).await,
            Err(ChallengeError::Mismatch)
        );
    }

    #[tokio::test]
    async fn test_usernames_are_independent() {
        let store = ChallengeStore::new();
        let alice = store.issue("alice").await;
        let bob = store.issue("bob").await;

        assert_eq!(store.consume("bob", &bob).await, Ok(()));
        assert_eq!(store.consume("alice", &alice).await, Ok(()));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = ChallengeStore::with_ttl(Duration::ZERO);
        store.issue("alice").await;
        store.purge_expired().await;
        assert_eq!(
            store.consume("alice", "anything").await,
            Err(ChallengeError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_user_lock_serializes_same_username() {
        let store = Arc::new(ChallengeStore::new());

        let guard = store.user_lock("alice").await;
        // A different username is not blocked
        let _bob = store.user_lock("bob").await;

        let contended = {
            let store = store.clone();
            tokio::spawn(async move {
                let _guard = store.user_lock("alice").await;
            })
        };
        // The spawned task cannot finish while we hold alice's lock
        tokio::task::yield_now().await;
        assert!(!contended.is_finished());

        drop(guard);
        contended.await.unwrap();
    }
}
