//! Remote JWK Set cache.
//!
//! [`RemoteKeySet`] keeps one entry per URL holding the last good document,
//! when it was fetched, the fetch currently in flight and the end of the
//! cooldown window. Concurrent lookups for the same URL share one fetch.
//! A lookup that misses re-fetches once; if the key is still missing the
//! URL cools down and further misses are answered without a fetch until
//! the window closes.
//!
//! # Examples
//!
//! ```rust,no_run
//! use jose_envelope_core::prelude::*;
//! use jose_envelope_jwks::{RemoteKeySet, RemoteKeySetOptions};
//!
//! async fn verify(token: &str) -> Result<VerifiedJws> {
//!     let key_set = RemoteKeySet::with_http(RemoteKeySetOptions::default())?;
//!     let resolver = key_set.resolver("https://example.com/.well-known/jwks.json");
//!     let policy = JwsPolicy::new([SignatureAlgorithm::Es256]);
//!     verify_compact_with(token, &resolver, &policy).await
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use jose_envelope_core::error::{Error, Result};
use jose_envelope_core::key::KeyHandle;
use jose_envelope_core::resolver::{KeyResolver, KeySelector};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::fetch::{HttpFetcher, JwksFetcher};
use crate::select::{select_key, JwkSet};

/// Configuration for a [`RemoteKeySet`]
#[derive(Debug, Clone)]
pub struct RemoteKeySetOptions {
    /// Timeout for a single fetch
    pub timeout: Duration,
    /// How long a URL is left alone after a key was missing from a fresh
    /// document
    pub cooldown: Duration,
    /// Age after which a cached document is fetched again
    pub max_age: Duration,
    /// Extra headers sent with every fetch
    pub headers: Vec<(String, String)>,
}

impl Default for RemoteKeySetOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            cooldown: Duration::from_secs(30),
            max_age: Duration::from_secs(600),
            headers: Vec::new(),
        }
    }
}

/// Failure of a shared fetch. Cloned out to every waiter.
#[derive(Debug, Clone)]
enum FetchFailure {
    Timeout,
    Jose(String),
}

impl From<Error> for FetchFailure {
    fn from(error: Error) -> Self {
        match error {
            Error::JwksTimeout => Self::Timeout,
            Error::Jose(message) => Self::Jose(message),
            other => Self::Jose(other.to_string()),
        }
    }
}

impl From<FetchFailure> for Error {
    fn from(failure: FetchFailure) -> Self {
        match failure {
            FetchFailure::Timeout => Self::JwksTimeout,
            FetchFailure::Jose(message) => Self::Jose(message),
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, std::result::Result<Arc<JwkSet>, FetchFailure>>>;

#[derive(Default)]
struct State {
    jwks: Option<Arc<JwkSet>>,
    fetched_at: Option<Instant>,
    in_flight: Option<SharedFetch>,
    cooldown_until: Option<Instant>,
}

type Entry = Arc<Mutex<State>>;

/// Clears `in_flight` when the fetch task ends, including by panic.
struct InFlightGuard(Entry);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.0).in_flight = None;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A cache of remote JSON Web Key Sets, keyed by URL.
pub struct RemoteKeySet {
    fetcher: Arc<dyn JwksFetcher>,
    options: RemoteKeySetOptions,
    entries: Mutex<HashMap<String, Entry>>,
}

impl std::fmt::Debug for RemoteKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteKeySet")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl RemoteKeySet {
    /// Creates a cache that fetches through `fetcher`.
    #[must_use]
    pub fn new(fetcher: Arc<dyn JwksFetcher>, options: RemoteKeySetOptions) -> Self {
        Self {
            fetcher,
            options,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a cache that fetches over HTTP(S).
    ///
    /// # Errors
    /// * `Error::Jose` - If the HTTP client cannot be built
    pub fn with_http(options: RemoteKeySetOptions) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpFetcher::new()?), options))
    }

    /// The options this cache was created with
    #[must_use]
    pub fn options(&self) -> &RemoteKeySetOptions {
        &self.options
    }

    /// Binds the cache to one URL, giving a [`KeyResolver`].
    #[must_use]
    pub fn resolver(&self, url: impl Into<String>) -> RemoteKeyResolver<'_> {
        RemoteKeyResolver {
            key_set: self,
            url: url.into(),
        }
    }

    fn entry(&self, url: &str) -> Entry {
        Arc::clone(lock(&self.entries).entry(url.to_owned()).or_default())
    }

    /// Returns the in-flight fetch for `url`, starting one if there is none.
    fn fetch(&self, url: &str) -> SharedFetch {
        let entry = self.entry(url);
        let mut state = lock(&entry);
        if let Some(in_flight) = &state.in_flight {
            debug!("Joining in-flight JSON Web Key Set fetch for {url}");
            return in_flight.clone();
        }

        let fetcher = Arc::clone(&self.fetcher);
        let timeout = self.options.timeout;
        let headers = self.options.headers.clone();
        let url = url.to_owned();
        let completed = Arc::clone(&entry);

        // Runs on its own task so the deadline starts now and the fetch
        // finishes even when every waiter is dropped.
        let task = tokio::spawn(async move {
            let _in_flight = InFlightGuard(Arc::clone(&completed));
            debug!("Fetching JSON Web Key Set from {url}");
            let outcome = match tokio::time::timeout(timeout, fetcher.fetch(&url, timeout, &headers))
                .await
            {
                Err(_) => Err(FetchFailure::Timeout),
                Ok(Err(error)) => Err(FetchFailure::from(error)),
                Ok(Ok(document)) => JwkSet::from_value(document)
                    .map(Arc::new)
                    .map_err(FetchFailure::from),
            };

            let mut state = lock(&completed);
            match &outcome {
                Ok(jwks) => {
                    state.jwks = Some(Arc::clone(jwks));
                    state.fetched_at = Some(Instant::now());
                    state.cooldown_until = None;
                }
                Err(FetchFailure::Timeout) => {
                    warn!("Timed out fetching JSON Web Key Set from {url}");
                }
                Err(FetchFailure::Jose(message)) => {
                    warn!("Failed to fetch JSON Web Key Set from {url}: {message}");
                }
            }
            drop(state);
            outcome
        });

        let fetch = async move {
            task.await.unwrap_or_else(|error| {
                Err(FetchFailure::Jose(format!(
                    "JSON Web Key Set fetch task failed: {error}"
                )))
            })
        }
        .boxed()
        .shared();

        state.in_flight = Some(fetch.clone());
        fetch
    }

    fn fresh_document(&self, url: &str) -> Option<Arc<JwkSet>> {
        let entry = self.entry(url);
        let state = lock(&entry);
        let fetched_at = state.fetched_at?;
        if fetched_at.elapsed() < self.options.max_age {
            state.jwks.clone()
        } else {
            None
        }
    }

    /// Fetches `url` now, joining a fetch already in flight.
    ///
    /// # Errors
    /// * `Error::JwksTimeout` - The fetch timed out
    /// * `Error::Jose` - The fetch failed or the document is not a JWK Set
    pub async fn reload(&self, url: &str) -> Result<Arc<JwkSet>> {
        self.fetch(url).await.map_err(Error::from)
    }

    /// The last good document for `url`, however old.
    #[must_use]
    pub fn jwks(&self, url: &str) -> Option<Arc<JwkSet>> {
        lock(&self.entry(url)).jwks.clone()
    }

    /// Whether `url` has a document younger than `max_age`.
    #[must_use]
    pub fn is_fresh(&self, url: &str) -> bool {
        self.fresh_document(url).is_some()
    }

    /// Whether misses for `url` are currently answered without a fetch.
    #[must_use]
    pub fn is_cooling_down(&self, url: &str) -> bool {
        lock(&self.entry(url))
            .cooldown_until
            .is_some_and(|until| Instant::now() < until)
    }

    /// Resolves the key matching `selector` from the JWK Set at `url`.
    ///
    /// # Errors
    /// * `Error::JwksTimeout` - A needed fetch timed out
    /// * `Error::Jose` - A needed fetch failed
    /// * `Error::NoMatchingKey` - No key matches, even after a re-fetch
    /// * `Error::MultipleMatchingKeys` - The selector is ambiguous
    pub async fn resolve(&self, url: &str, selector: &KeySelector) -> Result<KeyHandle> {
        let jwks = match self.fresh_document(url) {
            Some(jwks) => jwks,
            None => self.fetch(url).await?,
        };

        match select_key(&jwks, selector) {
            Err(Error::NoMatchingKey) => {}
            other => return other,
        }

        if self.is_cooling_down(url) {
            warn!(kid = ?selector.kid, "No matching key in {url}, cooling down");
            return Err(Error::NoMatchingKey);
        }

        debug!(kid = ?selector.kid, "No matching key in {url}, re-fetching");
        let jwks = self.fetch(url).await?;
        match select_key(&jwks, selector) {
            Err(Error::NoMatchingKey) => {
                lock(&self.entry(url)).cooldown_until = Some(Instant::now() + self.options.cooldown);
                warn!(kid = ?selector.kid, "No matching key in {url} after re-fetch");
                Err(Error::NoMatchingKey)
            }
            other => other,
        }
    }
}

/// A [`RemoteKeySet`] bound to one URL.
#[derive(Debug, Clone)]
pub struct RemoteKeyResolver<'a> {
    key_set: &'a RemoteKeySet,
    url: String,
}

impl RemoteKeyResolver<'_> {
    /// The bound URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<'a> KeyResolver for RemoteKeyResolver<'a> {
    async fn resolve_key(&self, selector: &KeySelector) -> Result<KeyHandle> {
        self.key_set.resolve(&self.url, selector).await
    }
}
