//! TTL caching decorators for the asynchronous lookup clients.
//!
//! External authentication and group lookups sit on the hot path of every
//! request, so both clients can be wrapped in a time-bounded cache. The
//! cache is a plain concurrent map with lazy expiry on read: no single
//! flight, concurrent misses for the same key each hit the backing service
//! and the last answer wins. Cached credentials are stored as a SHA-256
//! fingerprint, never as cleartext.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::Result;
use crate::context::{Credentials, LoggedUser};
use crate::rules::{AuthenticationServiceClient, GroupsProviderClient};

/// Thread-safe map of values with per-entry TTL and lazy expiry.
pub struct TtlCache<K, V> {
    entries: DashMap<K, CachedEntry<V>>,
    ttl: Duration,
}

struct CachedEntry<V> {
    value: V,
    cached_at: Instant,
}

impl<K, V> TtlCache<K, V>
where
    K: std::hash::Hash + Eq,
    V: Clone,
{
    /// Create a cache whose entries live for `ttl` after insertion.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Get a live entry, evicting it first when expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        if Instant::now().duration_since(entry.cached_at) > self.ttl {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Insert a value, resetting its TTL.
    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(
            key,
            CachedEntry {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    /// Number of entries, expired ones included until their next read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lowercase hex SHA-256 of a secret, for storing comparison material
/// without retaining the secret itself.
#[must_use]
pub fn fingerprint(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Constant-time comparison of two fingerprints.
fn fingerprint_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Caching decorator for an [`AuthenticationServiceClient`].
///
/// A successful authentication is remembered as `user -> fingerprint` for
/// the TTL; a later request with the same user and a password matching the
/// fingerprint passes without contacting the service. Rejections are not
/// cached, so a wrong password never shadows a later correct one.
pub struct CachedAuthenticationClient<C> {
    inner: C,
    cache: TtlCache<String, String>,
}

impl<C> CachedAuthenticationClient<C> {
    /// Wrap a client with the given positive-result TTL.
    pub fn new(inner: C, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl),
        }
    }
}

#[async_trait]
impl<C> AuthenticationServiceClient for CachedAuthenticationClient<C>
where
    C: AuthenticationServiceClient,
{
    async fn authenticate(&self, credentials: &Credentials) -> Result<bool> {
        let provided = fingerprint(&credentials.password);
        if let Some(cached) = self.cache.get(&credentials.user) {
            if fingerprint_eq(&cached, &provided) {
                return Ok(true);
            }
            // Same user, different password: fall through to the service.
        }

        let accepted = self.inner.authenticate(credentials).await?;
        if accepted {
            self.cache.insert(credentials.user.clone(), provided);
        }
        Ok(accepted)
    }
}

/// Caching decorator for a [`GroupsProviderClient`].
pub struct CachedGroupsProviderClient<C> {
    inner: C,
    cache: TtlCache<String, Arc<BTreeSet<String>>>,
}

impl<C> CachedGroupsProviderClient<C> {
    /// Wrap a client with the given TTL.
    pub fn new(inner: C, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl),
        }
    }
}

#[async_trait]
impl<C> GroupsProviderClient for CachedGroupsProviderClient<C>
where
    C: GroupsProviderClient,
{
    async fn fetch_groups(&self, user: &LoggedUser) -> Result<BTreeSet<String>> {
        if let Some(groups) = self.cache.get(&user.id().to_string()) {
            return Ok((*groups).clone());
        }
        let groups = self.inner.fetch_groups(user).await?;
        self.cache
            .insert(user.id().to_string(), Arc::new(groups.clone()));
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    // ── TtlCache ──────────────────────────────────────────────────────

    #[test]
    fn entries_live_until_ttl() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        cache.insert("k".to_string(), 7);
        assert_eq!(cache.get(&"k".to_string()), Some(7));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entries_are_evicted_on_read() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_millis(1));
        cache.insert("k".to_string(), 7);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&"k".to_string()), None);
        assert!(cache.is_empty());
    }

    // ── Authentication decorator ──────────────────────────────────────

    struct CountingAuth {
        accept: bool,
        calls: AtomicUsize,
    }

    impl CountingAuth {
        fn new(accept: bool) -> Self {
            Self {
                accept,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AuthenticationServiceClient for CountingAuth {
        async fn authenticate(&self, _credentials: &Credentials) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.accept)
        }
    }

    fn creds(user: &str, password: &str) -> Credentials {
        Credentials {
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn repeated_authentication_hits_the_service_once() {
        let client = CachedAuthenticationClient::new(
            CountingAuth::new(true),
            Duration::from_secs(60),
        );
        for _ in 0..5 {
            assert!(client.authenticate(&creds("bob", "pw")).await.unwrap());
        }
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn changed_password_goes_back_to_the_service() {
        let client = CachedAuthenticationClient::new(
            CountingAuth::new(true),
            Duration::from_secs(60),
        );
        assert!(client.authenticate(&creds("bob", "pw1")).await.unwrap());
        assert!(client.authenticate(&creds("bob", "pw2")).await.unwrap());
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejections_are_not_cached() {
        let client = CachedAuthenticationClient::new(
            CountingAuth::new(false),
            Duration::from_secs(60),
        );
        assert!(!client.authenticate(&creds("bob", "pw")).await.unwrap());
        assert!(!client.authenticate(&creds("bob", "pw")).await.unwrap());
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_positive_entry_is_refreshed() {
        let client = CachedAuthenticationClient::new(
            CountingAuth::new(true),
            Duration::from_millis(1),
        );
        assert!(client.authenticate(&creds("bob", "pw")).await.unwrap());
        std::thread::sleep(Duration::from_millis(5));
        assert!(client.authenticate(&creds("bob", "pw")).await.unwrap());
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 2);
    }

    // ── Groups decorator ──────────────────────────────────────────────

    struct CountingGroups {
        groups: BTreeSet<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GroupsProviderClient for CountingGroups {
        async fn fetch_groups(&self, _user: &LoggedUser) -> Result<BTreeSet<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.groups.clone())
        }
    }

    #[tokio::test]
    async fn group_lookups_are_cached_per_user() {
        let client = CachedGroupsProviderClient::new(
            CountingGroups {
                groups: ["team-a".to_string()].into_iter().collect(),
                calls: AtomicUsize::new(0),
            },
            Duration::from_secs(60),
        );

        let bob = LoggedUser::new("bob");
        let alice = LoggedUser::new("alice");
        for _ in 0..3 {
            assert!(client.fetch_groups(&bob).await.unwrap().contains("team-a"));
        }
        client.fetch_groups(&alice).await.unwrap();
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 2);
    }

    // ── Fingerprint ───────────────────────────────────────────────────

    #[test]
    fn fingerprint_is_hex_sha256() {
        let fp = fingerprint("secret");
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, fingerprint("secret"));
        assert_ne!(fp, fingerprint("Secret"));
    }
}
