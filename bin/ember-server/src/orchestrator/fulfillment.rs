use std::time::Instant;

use chrono::Utc;
use ember_types::{FULFILLMENT_FAILED_TEXT, IMAGE_GENERATED_TEXT};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Orchestrator;
use super::context::ConversationContext;
use super::directive::{Branch, classify};
use super::sanitize::sanitize_reply;
use crate::backend::BackendError;
use crate::entities::{ChannelStore, ImageRecord, ImageStore, MessageRecord, MessageStore};

/// Everything a fulfillment task needs to know about the turn it answers.
#[derive(Debug, Clone)]
pub struct Job {
    pub placeholder_id: String,
    pub channel_id: String,
    /// Text of the user turn that triggered the reply.
    pub trigger_text: String,
    /// Image attached to that turn, if any.
    pub attachment: Option<String>,
}

impl Job {
    pub fn for_turn(user_message: &MessageRecord, placeholder: &MessageRecord) -> Self {
        Self {
            placeholder_id: placeholder.id.clone(),
            channel_id: placeholder.channel_id.clone(),
            trigger_text: user_message.text.clone(),
            attachment: user_message.image_ref.clone(),
        }
    }
}

#[derive(Debug, Error)]
enum FulfillmentError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("store: {0}")]
    Store(#[from] sqlx::Error),
    #[error("channel no longer exists")]
    ChannelGone,
    #[error("placeholder no longer exists")]
    PlaceholderGone,
}

impl FulfillmentError {
    /// Nothing is left to write onto.
    fn is_gone(&self) -> bool {
        matches!(self, Self::ChannelGone | Self::PlaceholderGone)
    }
}

impl Orchestrator {
    /// Run one job to a terminal state. Never returns an error: every failure
    /// ends up as the fallback text on the placeholder.
    pub(super) async fn fulfill(&self, job: Job) {
        let started = Instant::now();
        let branch = classify(&job.trigger_text);
        debug!(branch = branch.name(), "fulfillment started");

        match self.generate(&job, &branch).await {
            Ok((text, image_ref)) => {
                self.write_terminal(&job.placeholder_id, &text, image_ref.as_deref())
                    .await;
                info!(
                    branch = branch.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "placeholder fulfilled"
                );
            }
            Err(e) if e.is_gone() => {
                warn!(error = %e, "fulfillment abandoned");
            }
            Err(e) => {
                warn!(
                    branch = branch.name(),
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "fulfillment failed; writing failure text"
                );
                self.write_terminal(&job.placeholder_id, FULFILLMENT_FAILED_TEXT, None)
                    .await;
            }
        }
    }

    async fn generate(
        &self,
        job: &Job,
        branch: &Branch,
    ) -> Result<(String, Option<String>), FulfillmentError> {
        if self.store.get_channel(&job.channel_id).await?.is_none() {
            return Err(FulfillmentError::ChannelGone);
        }
        if self.store.get_message(&job.placeholder_id).await?.is_none() {
            return Err(FulfillmentError::PlaceholderGone);
        }

        match branch {
            Branch::Image { prompt } => {
                let image = self.backend.generate_image(prompt).await?;
                let record = ImageRecord {
                    id: Uuid::new_v4().to_string(),
                    filename: None,
                    content_type: image.content_type,
                    data: image.data,
                    created_at: Utc::now(),
                };
                let image_id = record.id.clone();
                self.store.insert_image(record).await?;
                Ok((IMAGE_GENERATED_TEXT.to_owned(), Some(image_id)))
            }
            Branch::Text => {
                let history = self
                    .store
                    .recent_messages_before(
                        &job.channel_id,
                        &job.placeholder_id,
                        self.settings.context_window,
                    )
                    .await?;
                let context = ConversationContext::from_messages(&history);
                debug!(context_lines = context.lines().len(), "context assembled");
                let raw = self
                    .backend
                    .generate_text(&context.to_prompt(job.attachment.as_deref()))
                    .await?;
                Ok((sanitize_reply(&raw), None))
            }
        }
    }

    /// The single write that ends a placeholder's pending state.
    pub(super) async fn write_terminal(
        &self,
        placeholder_id: &str,
        text: &str,
        image_ref: Option<&str>,
    ) {
        match self
            .store
            .resolve_placeholder(placeholder_id, text, image_ref)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!("placeholder vanished before its reply was written"),
            Err(e) => warn!(error = %e, "failed to write placeholder reply"),
        }
    }
}
