//! Credential exchange for providers that want short-lived bearer tokens.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

/// A bearer token and the moment it stops being accepted.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: SecretString,
    pub expires_at: Instant,
}

/// Exchanges a raw credential for an access token, following a provider-specific flow.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn exchange(&self, credential: &SecretString) -> crate::Result<AccessToken>;
}

/// Process-wide cache of exchanged tokens, keyed by a hash of the credential.
pub struct TokenCache {
    tokens: Mutex<HashMap<String, AccessToken>>,
    refresh_lock: Mutex<()>,
    expiry_buffer: Duration,
}

impl TokenCache {
    /// A token is served only while it stays valid for at least `expiry_buffer`.
    pub fn new(expiry_buffer: Duration) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            refresh_lock: Mutex::new(()),
            expiry_buffer,
        }
    }

    pub async fn get_or_exchange(
        &self,
        credential: &SecretString,
        provider: &dyn AuthProvider,
    ) -> crate::Result<SecretString> {
        let key = hash_credential(credential);

        if let Some(token) = self.lookup(&key).await {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another task may have exchanged the same credential while we waited.
        if let Some(token) = self.lookup(&key).await {
            return Ok(token);
        }

        log::debug!("Exchanging credential for a new access token");

        let access = provider.exchange(credential).await?;
        let token = access.token.clone();

        if self.is_fresh(&access) {
            self.tokens.lock().await.insert(key, access);
        } else {
            log::warn!("Exchanged access token expires within the safety buffer, not caching it");
        }

        Ok(token)
    }

    async fn lookup(&self, key: &str) -> Option<SecretString> {
        let mut tokens = self.tokens.lock().await;

        match tokens.get(key) {
            Some(access) if self.is_fresh(access) => Some(access.token.clone()),
            Some(_) => {
                tokens.remove(key);
                None
            }
            None => None,
        }
    }

    fn is_fresh(&self, access: &AccessToken) -> bool {
        Instant::now() + self.expiry_buffer < access.expires_at
    }
}

/// An auth provider bound to the cache it shares with other adapters.
#[derive(Clone)]
pub struct CachedAuth {
    provider: Arc<dyn AuthProvider>,
    cache: Arc<TokenCache>,
}

impl CachedAuth {
    pub fn new(provider: Arc<dyn AuthProvider>, cache: Arc<TokenCache>) -> Self {
        Self { provider, cache }
    }

    pub async fn token(&self, credential: &SecretString) -> crate::Result<SecretString> {
        self.cache.get_or_exchange(credential, self.provider.as_ref()).await
    }
}

impl std::fmt::Debug for CachedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedAuth").finish_non_exhaustive()
    }
}

fn hash_credential(credential: &SecretString) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credential.expose_secret().as_bytes());
    format!("{:x}", hasher.finalize())
}
