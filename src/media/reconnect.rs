//! Reconnection manager — bounded, cancellable connect attempts.
//!
//! Wraps a single media-engine connect in a delayed, cancellable task. The
//! state machine owns the retry accounting (`retry_count` vs `max_retries`)
//! and asks for one attempt at a time; attempt outcomes re-enter the
//! machine's queue as ordinary events. Cancelling an attempt (user hangs up
//! mid-retry) guarantees no late success or failure is ever enqueued.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::backend::EngineCredentials;
use crate::call::events::SessionInput;
use crate::media::MediaEngine;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Attempt delay schedule: first attempt immediate, retries at ~1s, 5s,
/// then 10s capped.
pub fn delay_for_attempt(attempt: u32) -> Duration {
    match attempt {
        0 => Duration::ZERO,
        1 => Duration::from_secs(1),
        2 => Duration::from_secs(5),
        _ => Duration::from_secs(10),
    }
}

pub struct ReconnectManager {
    engine: Arc<dyn MediaEngine>,
    queue: UnboundedSender<SessionInput>,
    cancel: Option<CancellationToken>,
}

impl ReconnectManager {
    pub fn new(engine: Arc<dyn MediaEngine>, queue: UnboundedSender<SessionInput>) -> Self {
        Self {
            engine,
            queue,
            cancel: None,
        }
    }

    /// Cancel the in-flight attempt, if any. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }

    /// Schedule connect attempt number `attempt` (0-based) for the given
    /// session. Any previous attempt is cancelled first, so at most one
    /// attempt is ever in flight.
    pub fn spawn_attempt(&mut self, session_id: String, creds: EngineCredentials, attempt: u32) {
        self.cancel();

        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        let engine = self.engine.clone();
        let queue = self.queue.clone();

        tokio::spawn(async move {
            let delay = delay_for_attempt(attempt);
            if delay > Duration::ZERO {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = time::sleep(delay) => {}
                }
            }

            tracing::info!(
                "Media connect attempt {} for session {} -> {}",
                attempt + 1,
                session_id,
                creds.engine_server_url
            );

            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("Connect attempt for {} cancelled mid-flight", session_id);
                }
                result = engine.connect(&creds.engine_server_url, &creds.engine_token) => {
                    let input = match result {
                        Ok(()) => SessionInput::MediaConnected { session_id },
                        Err(error) => SessionInput::MediaConnectFailed { session_id, error },
                    };
                    let _ = queue.send(input);
                }
            }
        });
    }
}
