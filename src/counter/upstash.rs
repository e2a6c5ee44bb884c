//! Redis-over-REST client (Upstash wire format)
//!
//! Each command is POSTed to the database URL as a JSON array of strings with
//! a bearer token. The reply is `{"result": ...}` or `{"error": "..."}`.

use serde::Deserialize;
use serde_json::Value;

use super::parse::parse_counter;
use super::store::{CounterStore, StoreError};
use crate::settings::RemoteCredentials;

/// Commands this client issues
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Exists(&'a str),
    Get(&'a str),
    Set(&'a str, i64),
    Incr(&'a str),
    IncrBy(&'a str, i64),
    Ping,
}

impl Command<'_> {
    /// JSON request body
    pub fn to_body(&self) -> String {
        let parts: Vec<String> = match self {
            Command::Exists(key) => vec!["EXISTS".into(), (*key).into()],
            Command::Get(key) => vec!["GET".into(), (*key).into()],
            Command::Set(key, value) => vec!["SET".into(), (*key).into(), value.to_string()],
            Command::Incr(key) => vec!["INCR".into(), (*key).into()],
            Command::IncrBy(key, amount) => {
                vec!["INCRBY".into(), (*key).into(), amount.to_string()]
            }
            Command::Ping => vec!["PING".into()],
        };
        Value::from(parts).to_string()
    }
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Decode a REST reply body into the command result
pub fn decode_reply(body: &str) -> Result<Value, StoreError> {
    let reply: Reply = serde_json::from_str(body)?;
    match (reply.error, reply.result) {
        (Some(error), _) => Err(StoreError::Remote(error)),
        (None, result) => Ok(result.unwrap_or(Value::Null)),
    }
}

/// Moves request bodies to the store and reply bodies back
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn post(&self, url: &str, token: &str, body: String) -> Result<String, StoreError>;
}

pub struct UpstashStore<T> {
    credentials: RemoteCredentials,
    transport: T,
}

impl<T: Transport> UpstashStore<T> {
    pub fn new(credentials: RemoteCredentials, transport: T) -> Self {
        Self {
            credentials,
            transport,
        }
    }

    async fn send(&self, command: Command<'_>) -> Result<Value, StoreError> {
        let body = command.to_body();
        let reply = self
            .transport
            .post(&self.credentials.url, &self.credentials.token, body)
            .await?;
        decode_reply(&reply)
    }
}

impl<T: Transport> CounterStore for UpstashStore<T> {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let value = self.send(Command::Exists(key)).await?;
        match parse_counter(&value) {
            Some(n) => Ok(n > 0),
            None => Err(StoreError::Unparseable(value)),
        }
    }

    async fn get(&self, key: &str) -> Result<Value, StoreError> {
        self.send(Command::Get(key)).await
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.send(Command::Set(key, value)).await.map(|_| ())
    }

    async fn incr(&self, key: &str) -> Result<Value, StoreError> {
        self.send(Command::Incr(key)).await
    }

    async fn incr_by(&self, key: &str, amount: i64) -> Result<Value, StoreError> {
        self.send(Command::IncrBy(key, amount)).await
    }

    async fn ping(&self) -> Result<String, StoreError> {
        let value = self.send(Command::Ping).await?;
        Ok(value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string()))
    }
}
