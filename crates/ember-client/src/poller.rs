//! Waiting for an assistant placeholder to settle.
//!
//! The server answers a turn before the reply exists, so clients re-fetch the
//! channel on a fixed interval until the placeholder's `pending` flag clears.
//! Polling is bounded: after `max_attempts` fetches the poller gives up.

use std::time::Duration;

use ember_types::Message;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::MessageSource;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1500);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 40;

/// How a [`Poller::wait`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The message was seen with `pending == false`.
    Resolved(Message),
    /// Every attempt was used without seeing the message settle.
    GaveUp { attempts: u32 },
    /// The token was cancelled first.
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
    max_attempts: u32,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL, DEFAULT_MAX_ATTEMPTS)
    }
}

impl Poller {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        // `tokio::time::interval` panics on a zero period.
        let interval = interval.max(Duration::from_millis(1));
        Self { interval, max_attempts }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Poll `channel_id` until `message_id` is no longer pending.
    ///
    /// Attempts start on a fixed interval and each fetch of the full message
    /// list gets at most one interval to answer. A failed, timed out or
    /// incomplete fetch still uses up the attempt.
    pub async fn wait<S>(
        &self,
        source: &S,
        channel_id: &str,
        message_id: &str,
        cancel: CancellationToken,
    ) -> PollOutcome
    where
        S: MessageSource + ?Sized,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        for attempt in 1..=self.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                fetched = tokio::time::timeout(self.interval, source.list_messages(channel_id)) => fetched,
            };
            match fetched {
                Ok(Ok(list)) => match list.messages.into_iter().find(|m| m.id == message_id) {
                    Some(message) if !message.pending => {
                        debug!(attempt, message_id, "message settled");
                        return PollOutcome::Resolved(message);
                    }
                    Some(_) => debug!(attempt, message_id, "still pending"),
                    None => debug!(attempt, message_id, "message not in channel yet"),
                },
                Ok(Err(e)) => warn!(attempt, error = %e, "poll fetch failed"),
                Err(_elapsed) => warn!(attempt, "poll fetch timed out"),
            }
        }
        PollOutcome::GaveUp { attempts: self.max_attempts }
    }

    /// Invoke `on_done` once the message settles.
    ///
    /// Gives up silently: when every attempt is used, `on_done` is never
    /// called.
    pub async fn await_completion<S, F>(
        &self,
        source: &S,
        channel_id: &str,
        message_id: &str,
        on_done: F,
    ) where
        S: MessageSource + ?Sized,
        F: FnOnce(Message),
    {
        let outcome = self
            .wait(source, channel_id, message_id, CancellationToken::new())
            .await;
        if let PollOutcome::Resolved(message) = outcome {
            on_done(message);
        }
    }
}
