//! Remote counter store interface
//!
//! A Redis-like key-value store holding the shared counter under one key.
//! Values come back as raw JSON so callers can parse them leniently.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("remote store disabled (missing credentials)")]
    Disabled,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("store replied with an error: {0}")]
    Remote(String),
    #[error("could not parse counter value {0}")]
    Unparseable(Value),
    #[error("malformed store response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether trying the same call again could help
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transport(_))
    }
}

/// Shared key-value counter store
///
/// Futures are not `Send`: everything runs on the page's single thread.
#[allow(async_fn_in_trait)]
pub trait CounterStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
    async fn get(&self, key: &str) -> Result<Value, StoreError>;
    async fn set(&self, key: &str, value: i64) -> Result<(), StoreError>;
    async fn incr(&self, key: &str) -> Result<Value, StoreError>;
    async fn incr_by(&self, key: &str, amount: i64) -> Result<Value, StoreError>;
    async fn ping(&self) -> Result<String, StoreError>;
}

/// A call made against a `MemoryStore`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Exists,
    Get,
    Set(i64),
    Incr,
    IncrBy(i64),
    Ping,
}

/// In-process store for tests and the headless demo
///
/// Failures can be scripted: `fail_next(n)` makes the next `n` calls fail with
/// a transport error, `set_unreachable(true)` fails every call.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, Value>>,
    calls: RefCell<Vec<StoreCall>>,
    fail_next: Cell<u32>,
    unreachable: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with a preset counter
    pub fn with_value(key: &str, value: i64) -> Self {
        let store = Self::new();
        store.put_raw(key, Value::from(value));
        store
    }

    /// Overwrite a key with any JSON value
    pub fn put_raw(&self, key: &str, value: Value) {
        self.values.borrow_mut().insert(key.to_string(), value);
    }

    pub fn raw(&self, key: &str) -> Option<Value> {
        self.values.borrow().get(key).cloned()
    }

    pub fn fail_next(&self, calls: u32) {
        self.fail_next.set(calls);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.set(unreachable);
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.borrow().clone()
    }

    fn enter(&self, call: StoreCall) -> Result<(), StoreError> {
        self.calls.borrow_mut().push(call);
        if self.unreachable.get() {
            return Err(StoreError::Transport("store unreachable".into()));
        }
        let remaining = self.fail_next.get();
        if remaining > 0 {
            self.fail_next.set(remaining - 1);
            return Err(StoreError::Transport("injected failure".into()));
        }
        Ok(())
    }

    fn add(&self, key: &str, amount: i64) -> Result<Value, StoreError> {
        let mut values = self.values.borrow_mut();
        let current = match values.get(key) {
            None => 0,
            Some(Value::Number(n)) => n.as_i64().ok_or_else(not_an_integer)?,
            Some(Value::String(s)) => s.parse::<i64>().map_err(|_| not_an_integer())?,
            Some(_) => return Err(not_an_integer()),
        };
        let next = current
            .checked_add(amount)
            .ok_or_else(|| StoreError::Remote("increment or decrement would overflow".into()))?;
        values.insert(key.to_string(), Value::from(next));
        Ok(Value::from(next))
    }
}

fn not_an_integer() -> StoreError {
    StoreError::Remote("value is not an integer or out of range".into())
}

impl CounterStore for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.enter(StoreCall::Exists)?;
        Ok(self.values.borrow().contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Value, StoreError> {
        self.enter(StoreCall::Get)?;
        Ok(self.raw(key).unwrap_or(Value::Null))
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.enter(StoreCall::Set(value))?;
        self.put_raw(key, Value::from(value));
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<Value, StoreError> {
        self.enter(StoreCall::Incr)?;
        self.add(key, 1)
    }

    async fn incr_by(&self, key: &str, amount: i64) -> Result<Value, StoreError> {
        self.enter(StoreCall::IncrBy(amount))?;
        self.add(key, amount)
    }

    async fn ping(&self) -> Result<String, StoreError> {
        self.enter(StoreCall::Ping)?;
        Ok("PONG".to_string())
    }
}
