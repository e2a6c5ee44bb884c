//! Counter operations on top of a store
//!
//! Seeds the key when it is missing, retries transport failures with
//! exponential backoff, and turns raw replies into counter values. The
//! `try_*` methods surface errors for the reconciler; the plain ones fall back
//! to the store floor and never fail.

use serde::{Deserialize, Serialize};

use super::parse::parse_counter;
use super::reconciler::{RemoteCompletion, RemoteRequest};
use super::store::{CounterStore, StoreError};
use super::CounterConfig;
use crate::consts::*;

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub retries: u32,
    /// Delay before retry `n` (0-based) is `exp(n) * backoff_base_ms`
    pub backoff_base_ms: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: STORE_RETRIES,
            backoff_base_ms: STORE_BACKOFF_BASE_MS,
        }
    }
}

impl RetryPolicy {
    pub fn backoff_ms(&self, retry: u32) -> u64 {
        ((retry as f64).exp() * self.backoff_base_ms).round() as u64
    }
}

/// Waits between retries
#[allow(async_fn_in_trait)]
pub trait Sleeper {
    async fn sleep_ms(&self, ms: u64);
}

/// Retries immediately (tests)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSleep;

impl Sleeper for NoSleep {
    async fn sleep_ms(&self, _ms: u64) {}
}

pub struct CounterService<S, Z> {
    /// `None` when credentials are missing
    store: Option<S>,
    config: CounterConfig,
    retry: RetryPolicy,
    sleeper: Z,
}

impl<S: CounterStore, Z: Sleeper> CounterService<S, Z> {
    pub fn new(store: Option<S>, config: CounterConfig, retry: RetryPolicy, sleeper: Z) -> Self {
        Self {
            store,
            config,
            retry,
            sleeper,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn store(&self) -> Option<&S> {
        self.store.as_ref()
    }

    fn store_or_disabled(&self) -> Result<&S, StoreError> {
        self.store.as_ref().ok_or(StoreError::Disabled)
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retry < self.retry.retries => {
                    let delay = self.retry.backoff_ms(retry);
                    log::warn!("{what} failed ({e}), retrying in {delay}ms");
                    self.sleeper.sleep_ms(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Seed the counter with the store floor if the key is missing
    pub async fn ensure_initialized(&self) -> Result<(), StoreError> {
        let store = self.store_or_disabled()?;
        let key = self.config.key.as_str();
        let exists = self.with_retry("EXISTS", || store.exists(key)).await?;
        if !exists {
            log::info!("Counter doesn't exist, initializing with {}", self.config.store_floor);
            let floor = self.config.store_floor;
            self.with_retry("SET", || store.set(key, floor)).await?;
        }
        Ok(())
    }

    pub async fn try_get_counter(&self) -> Result<i64, StoreError> {
        let store = self.store_or_disabled()?;
        self.ensure_initialized().await?;
        let key = self.config.key.as_str();
        let raw = self.with_retry("GET", || store.get(key)).await?;
        parse_counter(&raw).ok_or(StoreError::Unparseable(raw))
    }

    pub async fn try_increment(&self) -> Result<i64, StoreError> {
        let store = self.store_or_disabled()?;
        self.ensure_initialized().await?;
        let key = self.config.key.as_str();
        let raw = self.with_retry("INCR", || store.incr(key)).await?;
        parse_counter(&raw).ok_or(StoreError::Unparseable(raw))
    }

    /// Add `amount` in one round trip. Non-positive amounts just read.
    pub async fn try_increment_by(&self, amount: i64) -> Result<i64, StoreError> {
        if amount <= 0 {
            return self.try_get_counter().await;
        }
        let store = self.store_or_disabled()?;
        self.ensure_initialized().await?;
        let key = self.config.key.as_str();
        let raw = self.with_retry("INCRBY", || store.incr_by(key, amount)).await?;
        parse_counter(&raw).ok_or(StoreError::Unparseable(raw))
    }

    /// Current value, or the store floor if anything goes wrong
    pub async fn get_counter(&self) -> i64 {
        self.or_floor("get", self.try_get_counter().await)
    }

    pub async fn increment(&self) -> i64 {
        self.or_floor("increment", self.try_increment().await)
    }

    pub async fn increment_by(&self, amount: i64) -> i64 {
        self.or_floor("increment_by", self.try_increment_by(amount).await)
    }

    fn or_floor(&self, what: &str, result: Result<i64, StoreError>) -> i64 {
        result.unwrap_or_else(|e| {
            log::error!("Counter {what} failed, using fallback: {e}");
            self.config.store_floor
        })
    }

    /// Whether the store answers a ping
    pub async fn health(&self) -> bool {
        let Ok(store) = self.store_or_disabled() else {
            return false;
        };
        match store.ping().await {
            Ok(pong) => {
                log::info!("Store connection test: {pong}");
                true
            }
            Err(e) => {
                log::error!("Store connection error: {e}");
                false
            }
        }
    }

    /// Carry out a request queued by the reconciler
    pub async fn perform(&self, request: RemoteRequest) -> RemoteCompletion {
        let result = match request {
            RemoteRequest::Load | RemoteRequest::Poll => self.try_get_counter().await,
            RemoteRequest::Increment => self.try_increment().await,
            RemoteRequest::IncrementBy(amount) => self.try_increment_by(amount).await,
        };
        RemoteCompletion { request, result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::store::{MemoryStore, StoreCall};
    use pollster::block_on;

    fn service(store: MemoryStore) -> CounterService<MemoryStore, NoSleep> {
        CounterService::new(
            Some(store),
            CounterConfig::default(),
            RetryPolicy::default(),
            NoSleep,
        )
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_ms(0), 50);
        assert_eq!(policy.backoff_ms(1), 136);
        assert_eq!(policy.backoff_ms(2), 369);
    }

    #[test]
    fn test_empty_store_is_seeded_with_floor() {
        let svc = service(MemoryStore::new());
        assert_eq!(block_on(svc.try_get_counter()).unwrap(), 170_000);

        let store = svc.store().unwrap();
        assert_eq!(
            store.calls(),
            vec![StoreCall::Exists, StoreCall::Set(170_000), StoreCall::Get]
        );
    }

    #[test]
    fn test_existing_value_is_not_overwritten() {
        let svc = service(MemoryStore::with_value(COUNTER_KEY, 250_000));
        assert_eq!(block_on(svc.try_get_counter()).unwrap(), 250_000);
        assert!(!svc.store().unwrap().calls().contains(&StoreCall::Set(170_000)));
    }

    #[test]
    fn test_increment_paths() {
        let svc = service(MemoryStore::with_value(COUNTER_KEY, 10));
        assert_eq!(block_on(svc.try_increment()).unwrap(), 11);
        assert_eq!(block_on(svc.try_increment_by(5)).unwrap(), 16);
        assert_eq!(block_on(svc.try_increment_by(0)).unwrap(), 16);
        assert_eq!(block_on(svc.try_increment_by(-3)).unwrap(), 16);
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let store = MemoryStore::with_value(COUNTER_KEY, 42);
        store.fail_next(3);
        let svc = service(store);
        assert_eq!(block_on(svc.try_get_counter()).unwrap(), 42);
    }

    #[test]
    fn test_retries_are_bounded() {
        let store = MemoryStore::with_value(COUNTER_KEY, 42);
        store.set_unreachable(true);
        let svc = service(store);
        assert!(matches!(block_on(svc.try_get_counter()), Err(StoreError::Transport(_))));
        // First attempt plus three retries
        assert_eq!(svc.store().unwrap().calls().len(), 4);
    }

    #[test]
    fn test_fallbacks_never_go_below_floor() {
        let store = MemoryStore::new();
        store.set_unreachable(true);
        let svc = service(store);
        assert_eq!(block_on(svc.get_counter()), 170_000);
        assert_eq!(block_on(svc.increment()), 170_000);
        assert_eq!(block_on(svc.increment_by(9)), 170_000);
        assert!(!block_on(svc.health()));
    }

    #[test]
    fn test_unparseable_value_is_reported() {
        let store = MemoryStore::new();
        store.put_raw(COUNTER_KEY, serde_json::json!({"weird": "shape"}));
        let svc = service(store);
        assert!(matches!(block_on(svc.try_get_counter()), Err(StoreError::Unparseable(_))));
        assert_eq!(block_on(svc.get_counter()), 170_000);
    }

    #[test]
    fn test_disabled_service() {
        let svc: CounterService<MemoryStore, NoSleep> =
            CounterService::new(None, CounterConfig::default(), RetryPolicy::default(), NoSleep);
        assert!(!svc.is_enabled());
        assert!(matches!(block_on(svc.try_increment()), Err(StoreError::Disabled)));
        assert_eq!(block_on(svc.get_counter()), 170_000);
    }

    #[test]
    fn test_perform_maps_requests() {
        let svc = service(MemoryStore::with_value(COUNTER_KEY, 100));
        let done = block_on(svc.perform(RemoteRequest::IncrementBy(5)));
        assert_eq!(done.request, RemoteRequest::IncrementBy(5));
        assert_eq!(done.result.unwrap(), 105);
        assert!(svc.store().unwrap().calls().contains(&StoreCall::IncrBy(5)));
    }
}
