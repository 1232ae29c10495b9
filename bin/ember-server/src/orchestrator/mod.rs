//! Completion orchestrator: the deferred-completion pipeline.
//!
//! [`Orchestrator::submit_turn`] persists the user turn and an empty, pending
//! assistant placeholder, schedules fulfillment, and returns both messages
//! without waiting on the generation backend.
//!
//! Fulfillment runs as a supervised tokio task keyed by the placeholder id in
//! the [`TaskManager`]. It is detached from the HTTP request, so it finishes
//! even after the response is flushed and the connection closed. The
//! supervisor owns the error boundary: a worker that panics still gets the
//! failure text written onto its placeholder. The placeholder moves from
//! `pending` to exactly one of two terminal states:
//!
//! * **fulfilled**: sanitized reply text, or the generated-image marker plus
//!   an image reference;
//! * **failed**: [`FULFILLMENT_FAILED_TEXT`], same shape, no retry.

pub mod context;
pub mod directive;
mod fulfillment;
pub mod sanitize;

use std::sync::Arc;
use std::time::Duration;

use ember_types::FULFILLMENT_FAILED_TEXT;
use tokio::task::AbortHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::backend::GenerationBackend;
use crate::entities::{ChannelStore, ImageStore, MessageRecord, MessageStore, SqliteStore};
use crate::error::ServerError;
use crate::state::TaskManager;

pub use fulfillment::Job;

/// Tunables for fulfillment.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Messages of history handed to the backend.
    pub context_window: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self { context_window: 10 }
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// The user turn and its placeholder, as persisted at submission time.
#[derive(Debug, Clone)]
pub struct SubmittedTurn {
    pub user_message: MessageRecord,
    pub placeholder: MessageRecord,
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<SqliteStore>,
    backend: Arc<dyn GenerationBackend>,
    tasks: Arc<TaskManager>,
    settings: Arc<OrchestratorSettings>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tasks", &self.tasks)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        store: Arc<SqliteStore>,
        backend: Arc<dyn GenerationBackend>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            backend,
            tasks: Arc::new(TaskManager::new()),
            settings: Arc::new(settings),
        }
    }

    /// Accept a user turn.
    ///
    /// Either `text` or `image_ref` may be absent; rejecting a turn with
    /// neither is the caller's job. The returned placeholder is always
    /// `pending` with empty text.
    pub async fn submit_turn(
        &self,
        channel_id: &str,
        text: Option<String>,
        image_ref: Option<String>,
    ) -> Result<SubmittedTurn, ServerError> {
        if channel_id.trim().is_empty() {
            return Err(ServerError::BadRequest("missing channelId".into()));
        }
        if self.store.get_channel(channel_id).await?.is_none() {
            return Err(ServerError::NotFound(format!("channel {channel_id} not found")));
        }
        if let Some(image_id) = image_ref.as_deref() {
            if !self.store.image_exists(image_id).await? {
                return Err(ServerError::NotFound(format!("image {image_id} not found")));
            }
        }

        let user_message = MessageRecord::user(channel_id, text, image_ref);
        let placeholder = MessageRecord::placeholder(channel_id);
        self.store
            .insert_turn(user_message.clone(), placeholder.clone())
            .await?;

        let job = Job::for_turn(&user_message, &placeholder);
        if !self.schedule(job) {
            // Fresh UUIDs never collide; reaching this means a scheduling bug.
            return Err(ServerError::Internal(format!(
                "fulfillment already scheduled for {}",
                placeholder.id
            )));
        }

        debug!(
            channel_id = %channel_id,
            user_message_id = %user_message.id,
            placeholder_id = %placeholder.id,
            "turn accepted; fulfillment scheduled"
        );
        Ok(SubmittedTurn { user_message, placeholder })
    }

    /// Start the supervised fulfillment task for `job`.
    ///
    /// Returns `false` when a task for the same placeholder is already in
    /// flight; the second schedule is dropped.
    pub fn schedule(&self, job: Job) -> bool {
        let placeholder_id = job.placeholder_id.clone();
        let span = info_span!(
            "fulfillment",
            placeholder_id = %job.placeholder_id,
            channel_id = %job.channel_id,
        );
        let this = self.clone();
        let supervised = async move {
            let worker_self = this.clone();
            let worker_job = job.clone();
            let worker = tokio::spawn(
                async move { worker_self.fulfill(worker_job).await }.in_current_span(),
            );
            // Aborting the supervisor takes the worker down with it.
            let _worker_guard = AbortOnDrop(worker.abort_handle());
            match worker.await {
                Ok(()) => {}
                Err(e) if e.is_panic() => {
                    error!("fulfillment worker panicked; writing failure text");
                    this.write_terminal(&job.placeholder_id, FULFILLMENT_FAILED_TEXT, None)
                        .await;
                }
                Err(e) => warn!(error = %e, "fulfillment worker cancelled"),
            }
        }
        .instrument(span);

        let scheduled = self.tasks.spawn_unique(placeholder_id.clone(), supervised);
        if !scheduled {
            warn!(placeholder_id = %placeholder_id, "duplicate fulfillment schedule ignored");
        }
        scheduled
    }

    /// Resolve placeholders left pending by a process that exited mid-fulfillment.
    pub async fn recover_stale_placeholders(&self) -> Result<u64, sqlx::Error> {
        let recovered = self
            .store
            .fail_pending_placeholders(FULFILLMENT_FAILED_TEXT)
            .await?;
        if recovered > 0 {
            warn!(count = recovered, "resolved stale pending placeholders from a previous run");
        }
        Ok(recovered)
    }

    /// Number of fulfillment tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.tasks.in_flight()
    }

    /// Give running fulfillments up to `timeout` to finish.
    pub async fn drain(&self, timeout: Duration) {
        let abandoned = self.tasks.drain(timeout).await;
        if abandoned.is_empty() {
            info!("all fulfillment tasks finished");
        } else {
            warn!(
                count = abandoned.len(),
                placeholders = ?abandoned,
                "fulfillment tasks abandoned at shutdown; they will be failed on next start"
            );
        }
    }
}

#[cfg(test)]
mod test;
