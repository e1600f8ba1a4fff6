//! # Message Handlers
//!
//! The application callback invoked once per delivered message.
//!
//! A handler returns the number of seconds after which the message should be
//! delivered again: `0` means handled, anything above `0` requeues a copy with
//! that delay. Older callback shapes are supported through thin adapters.

use crate::error::BoxError;
use crate::message::Message;
use async_trait::async_trait;
use rand::Rng;
use std::ops::Range;

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;

/// Delay range used when a legacy boolean handler reports failure
pub const LEGACY_RETRY_DELAY_SECS: Range<u64> = 5..30;

/// Processes one delivered message
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle the message, returning the requested retry delay in seconds
    async fn handle(&self, message: &Message) -> Result<u64, BoxError>;
}

/// Handler backed by a synchronous closure
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, E> MessageHandler for FnHandler<F>
where
    F: Fn(&Message) -> Result<u64, E> + Send + Sync,
    E: Into<BoxError>,
{
    async fn handle(&self, message: &Message) -> Result<u64, BoxError> {
        (self.f)(message).map_err(Into::into)
    }
}

/// Wrap a closure returning the retry delay
pub fn handler_fn<F, E>(f: F) -> FnHandler<F>
where
    F: Fn(&Message) -> Result<u64, E> + Send + Sync,
    E: Into<BoxError>,
{
    FnHandler { f }
}

/// Handler that reports success as `true`.
///
/// `false` requeues after a random delay in [`LEGACY_RETRY_DELAY_SECS`].
pub fn legacy_bool_handler<F>(
    f: F,
) -> FnHandler<impl Fn(&Message) -> Result<u64, BoxError> + Send + Sync>
where
    F: Fn(&Message) -> bool + Send + Sync,
{
    handler_fn(move |message: &Message| {
        let delay = if f(message) {
            0
        } else {
            rand::thread_rng().gen_range(LEGACY_RETRY_DELAY_SECS)
        };
        Ok::<u64, BoxError>(delay)
    })
}

/// Handler that never requests a retry
pub fn legacy_unit_handler<F>(
    f: F,
) -> FnHandler<impl Fn(&Message) -> Result<u64, BoxError> + Send + Sync>
where
    F: Fn(&Message) + Send + Sync,
{
    handler_fn(move |message: &Message| {
        f(message);
        Ok::<u64, BoxError>(0)
    })
}
