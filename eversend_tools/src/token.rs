//! Process-wide cache for the provider's bearer credential.
//!
//! Tokens are expensive to mint and short-lived. The cache serves the same token to every caller until it comes
//! within a safety margin of expiry, and refreshes are single-flight: concurrent callers that observe a stale or
//! missing token all wait on one in-flight fetch instead of issuing N parallel credential requests.

use std::time::{Duration, Instant};

use log::*;
use spg_common::Secret;

use crate::{data_objects::IssuedToken, EversendApiError};

/// Injectable time source, so expiry logic is testable without waiting.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Anything that can mint a fresh credential. The HTTP client implements this with the client-credentials call;
/// tests implement it with counters.
#[allow(async_fn_in_trait)]
pub trait TokenSource {
    async fn fetch_token(&self) -> Result<IssuedToken, EversendApiError>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: Secret<String>,
    deadline: Instant,
}

pub struct TokenCache<S, C = SystemClock> {
    source: S,
    clock: C,
    /// Subtracted from the provider-declared expiry, so a token is never served moments before it lapses.
    margin: Duration,
    cached: tokio::sync::Mutex<Option<CachedToken>>,
}

impl<S: TokenSource> TokenCache<S> {
    pub fn new(source: S, margin: Duration) -> Self {
        Self::with_clock(source, SystemClock, margin)
    }
}

impl<S, C> TokenCache<S, C>
where
    S: TokenSource,
    C: Clock,
{
    pub fn with_clock(source: S, clock: C, margin: Duration) -> Self {
        Self { source, clock, margin, cached: tokio::sync::Mutex::new(None) }
    }

    /// Returns the cached token while it is fresh, refreshing it otherwise.
    ///
    /// The whole check-and-refresh runs under one async mutex: the first caller to observe a stale token performs
    /// the fetch, everyone queued behind it re-checks the cache on entry and finds the fresh token already there.
    pub async fn get_token(&self) -> Result<Secret<String>, EversendApiError> {
        let mut cached = self.cached.lock().await;
        if let Some(current) = cached.as_ref() {
            if self.clock.now() < current.deadline {
                trace!("🎫️ Serving cached provider token");
                return Ok(current.token.clone());
            }
            debug!("🎫️ Cached provider token is within the expiry margin. Refreshing.");
        }
        let issued = self.source.fetch_token().await?;
        let ttl = issued.expires_in.saturating_sub(self.margin);
        let deadline = self.clock.now() + ttl;
        debug!("🎫️ Fresh provider token fetched. Good for {ttl:?}");
        *cached = Some(CachedToken { token: issued.token.clone(), deadline });
        Ok(issued.token)
    }

    /// Drops the cached token so the next [`TokenCache::get_token`] refreshes regardless of TTL. Called when the
    /// provider answers with a 401: the token may have been revoked before its declared expiry.
    pub async fn invalidate(&self) {
        debug!("🎫️ Provider token invalidated");
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    };

    use super::*;

    struct CountingSource {
        calls: AtomicU32,
        delay: Duration,
    }

    impl CountingSource {
        fn new() -> Self {
            Self { calls: AtomicU32::new(0), delay: Duration::ZERO }
        }

        fn slow(delay: Duration) -> Self {
            Self { calls: AtomicU32::new(0), delay }
        }

        fn count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenSource for &CountingSource {
        async fn fetch_token(&self) -> Result<IssuedToken, EversendApiError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(IssuedToken { token: Secret::new(format!("token-{n}")), expires_in: Duration::from_secs(3600) })
        }
    }

    #[derive(Clone)]
    struct ManualClock(Arc<Mutex<Instant>>);

    impl ManualClock {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(Instant::now())))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock().unwrap()
        }
    }

    #[tokio::test]
    async fn fresh_tokens_are_reused() {
        let source = CountingSource::new();
        let cache = TokenCache::new(&source, Duration::from_secs(60));
        let first = cache.get_token().await.unwrap();
        let second = cache.get_token().await.unwrap();
        assert_eq!(first.reveal(), second.reveal());
        assert_eq!(source.count(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_a_refresh() {
        let source = CountingSource::new();
        let cache = TokenCache::new(&source, Duration::from_secs(60));
        cache.get_token().await.unwrap();
        cache.invalidate().await;
        let token = cache.get_token().await.unwrap();
        assert_eq!(token.reveal(), "token-2");
        assert_eq!(source.count(), 2);
    }

    #[tokio::test]
    async fn expiry_margin_triggers_a_refresh() {
        let source = CountingSource::new();
        let clock = ManualClock::new();
        let cache = TokenCache::with_clock(&source, clock.clone(), Duration::from_secs(60));
        cache.get_token().await.unwrap();
        // 3600s lifetime minus the 60s margin: at 3539s the token is still good, at 3541s it is not.
        clock.advance(Duration::from_secs(3539));
        cache.get_token().await.unwrap();
        assert_eq!(source.count(), 1);
        clock.advance(Duration::from_secs(2));
        cache.get_token().await.unwrap();
        assert_eq!(source.count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_fetch() {
        let source = CountingSource::slow(Duration::from_millis(50));
        let cache = Arc::new(TokenCache::new(&source, Duration::from_secs(60)));
        let (a, b, c) = tokio::join!(cache.get_token(), cache.get_token(), cache.get_token());
        assert_eq!(a.unwrap().reveal(), "token-1");
        assert_eq!(b.unwrap().reveal(), "token-1");
        assert_eq!(c.unwrap().reveal(), "token-1");
        assert_eq!(source.count(), 1);
    }
}
