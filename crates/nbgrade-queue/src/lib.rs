#![deny(clippy::print_stdout, clippy::print_stderr, clippy::unwrap_used)]

//! Named one-way channels over the message broker, used between the upload
//! pipeline and the worker pool.
//!
//! A queue is a broker-side list: `post` appends a message, `receive` pops
//! one, blocking until a message arrives. Messages fan out among competing
//! consumers and are consumed destructively, so a consumer crash after
//! `receive` loses the message. A `Channel` is not thread-safe; callers keep
//! all posts on one background sender and all receives on one background
//! listener.

use redis::Commands;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("invalid queue spec {0:?}")]
    Spec(String, #[source] redis::RedisError),
    #[error("error connecting to queue at {0:?}")]
    Connect(String, #[source] redis::RedisError),
    #[error("error posting to queue {0:?}")]
    Post(String, #[source] redis::RedisError),
    #[error("error receiving from queue {0:?}")]
    Receive(String, #[source] redis::RedisError),
}

/// A connection to the queue service.
pub struct Channel {
    conn: redis::Connection,
}

impl Channel {
    /// Takes a spec string and opens a connection to the broker.
    /// Example of a connection spec: `redis://localhost:6379/`.
    pub fn open(spec: &str) -> Result<Self, QueueError> {
        let client =
            redis::Client::open(spec).map_err(|e| QueueError::Spec(spec.to_string(), e))?;
        let conn = client
            .get_connection()
            .map_err(|e| QueueError::Connect(spec.to_string(), e))?;
        Ok(Self { conn })
    }

    /// Opens the channel, retrying with exponential back-off until the
    /// deadline passes. Used at process start, when the broker may still be
    /// coming up.
    pub fn open_with_backoff(spec: &str, retry_for: Duration) -> Result<Self, QueueError> {
        let deadline = Instant::now() + retry_for;
        let mut delay = Duration::from_millis(500);
        loop {
            match Self::open(spec) {
                Ok(channel) => return Ok(channel),
                Err(err) => {
                    if Instant::now() > deadline {
                        return Err(err);
                    }
                    log::info!("error opening queue {spec:?}: {err}, retrying in {delay:?}");
                    std::thread::sleep(delay);
                    delay *= 2;
                }
            }
        }
    }

    /// Sends the content to the named queue.
    pub fn post(&mut self, queue: &str, content: &[u8]) -> Result<(), QueueError> {
        self.conn
            .rpush::<_, _, ()>(queue, content)
            .map_err(|e| QueueError::Post(queue.to_string(), e))
    }

    /// Blocks until a message is available on the named queue and returns it.
    pub fn receive(&mut self, queue: &str) -> Result<Vec<u8>, QueueError> {
        let (_key, value): (String, Vec<u8>) = self
            .conn
            .blpop(queue, 0.0)
            .map_err(|e| QueueError::Receive(queue.to_string(), e))?;
        Ok(value)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn bad_spec_is_rejected() {
        assert!(matches!(
            Channel::open("not a url"),
            Err(QueueError::Spec(_, _))
        ));
    }

    #[test]
    fn backoff_gives_up_after_deadline() {
        // port 1 refuses connections quickly
        let start = Instant::now();
        let res = Channel::open_with_backoff("redis://127.0.0.1:1/", Duration::from_millis(600));
        assert!(res.is_err());
        assert!(start.elapsed() >= Duration::from_millis(600));
    }
}
