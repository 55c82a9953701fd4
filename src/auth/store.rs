use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::{sync::RwLock, task};

/// Validates `(user, pass)` pairs against hashed storage (spec.md §4.B).
/// `valid()` must not leak whether a user exists beyond what the bcrypt
/// comparison already exhibits; unknown users are rejected without ever
/// touching bcrypt, which is the only state-independent shortcut the
/// interface allows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn valid(&self, user: &str, pass: &str) -> bool;

    /// Used only by the (out-of-scope) administrative surface; the core
    /// never calls this.
    async fn add(&self, user: &str, pass: &str) -> Result<()>;

    /// Used only by the (out-of-scope) administrative surface.
    async fn remove(&self, user: &str) -> Result<()>;
}

/// In-memory `username -> bcrypt hash` store. Reads and writes share one
/// `RwLock`, so a `valid()` call observes a single consistent snapshot even
/// if a concurrent `add`/`remove` lands mid-handshake (spec.md §9 open
/// question).
pub struct StaticCredentialStore {
    users: Arc<RwLock<HashMap<String, String>>>,
}

impl StaticCredentialStore {
    pub fn new() -> StaticCredentialStore {
        StaticCredentialStore { users: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Parses the `credentials` config key: comma-separated `user:bcrypt-hash`
    /// pairs. Empty input yields an empty (but present) store — callers that
    /// want auth disabled entirely should pass `None` instead of an empty
    /// store, since an empty store still rejects every login attempt.
    pub fn from_pairs(raw: &str) -> Result<StaticCredentialStore> {
        let mut users = HashMap::new();
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (user, hash) = pair.split_once(':').ok_or_else(|| anyhow!("malformed credential entry: {pair:?}"))?;
            users.insert(user.to_string(), hash.to_string());
        }
        Ok(StaticCredentialStore { users: Arc::new(RwLock::new(users)) })
    }
}

impl Default for StaticCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn valid(&self, user: &str, pass: &str) -> bool {
        let hash = {
            let users = self.users.read().await;
            match users.get(user) {
                Some(hash) => hash.clone(),
                None => return false,
            }
        };

        let pass = pass.to_string();
        task::spawn_blocking(move || bcrypt::verify(pass, &hash).unwrap_or(false))
            .await
            .unwrap_or(false)
    }

    async fn add(&self, user: &str, pass: &str) -> Result<()> {
        let hash = bcrypt::hash(pass, bcrypt::DEFAULT_COST)?;
        self.users.write().await.insert(user.to_string(), hash);
        Ok(())
    }

    async fn remove(&self, user: &str) -> Result<()> {
        self.users.write().await.remove(user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn valid_accepts_matching_password() {
        let store = StaticCredentialStore::new();
        store.add("foo", "bar").await.unwrap();

        assert!(store.valid("foo", "bar").await);
        assert!(!store.valid("foo", "wrong").await);
    }

    #[tokio::test]
    async fn valid_rejects_unknown_user() {
        let store = StaticCredentialStore::new();
        assert!(!store.valid("nobody", "whatever").await);
    }

    #[tokio::test]
    async fn from_pairs_parses_comma_separated_entries() {
        let store = StaticCredentialStore::new();
        store.add("foo", "bar").await.unwrap();
        let hash = store.users.read().await.get("foo").unwrap().clone();

        let parsed = StaticCredentialStore::from_pairs(&format!("foo:{hash}")).unwrap();
        assert_eq!(true, parsed.valid("foo", "bar").await);
    }

    #[tokio::test]
    async fn remove_drops_user() {
        let store = StaticCredentialStore::new();
        store.add("foo", "bar").await.unwrap();
        store.remove("foo").await.unwrap();
        assert!(store.users.read().await.get("foo").is_none());
    }
}
