use ember_types::{Message, SubmitTurnRequest, SubmitTurnResponse};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{ApiClient, ClientError, PollOutcome, Poller};

/// What the user currently has selected in a chat view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub current_channel: Option<String>,
    /// Image id attached to the next turn.
    pub staged_image: Option<String>,
    /// Text of the message picked for a follow-up question.
    pub selected_text: Option<String>,
}

/// One chat view: a client, a poller and the selection state they act on.
#[derive(Debug, Clone)]
pub struct ChatSession {
    client: ApiClient,
    poller: Poller,
    view: ViewState,
}

impl ChatSession {
    pub fn new(client: ApiClient, poller: Poller) -> Self {
        Self { client, poller, view: ViewState::default() }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn select_channel(&mut self, channel_id: impl Into<String>) {
        self.view.current_channel = Some(channel_id.into());
        self.view.selected_text = None;
    }

    pub fn stage_image(&mut self, image_ref: impl Into<String>) {
        self.view.staged_image = Some(image_ref.into());
    }

    pub fn clear_staged_image(&mut self) {
        self.view.staged_image = None;
    }

    /// Pick `message` for a follow-up and return the composer text for it.
    ///
    /// Messages without text cannot be picked.
    pub fn select_message(&mut self, message: &Message) -> Option<String> {
        self.view.selected_text = Some(message.text.clone()).filter(|t| !t.is_empty());
        self.follow_up_prompt()
    }

    pub fn follow_up_prompt(&self) -> Option<String> {
        self.view
            .selected_text
            .as_ref()
            .map(|text| format!("Follow up: \"{text}\"\n\n"))
    }

    /// The request a send of `text` would make from the current view.
    pub fn compose(&self, text: &str) -> Result<SubmitTurnRequest, ClientError> {
        let channel_id = self
            .view
            .current_channel
            .clone()
            .ok_or(ClientError::NoChannel)?;
        let text = text.trim();
        if text.is_empty() && self.view.staged_image.is_none() {
            return Err(ClientError::EmptyTurn);
        }
        Ok(SubmitTurnRequest {
            channel_id,
            text: Some(text.to_owned()).filter(|t| !t.is_empty()),
            image_ref: self.view.staged_image.clone(),
        })
    }

    /// Submit a turn. The staged image is consumed on success.
    pub async fn send(&mut self, text: &str) -> Result<SubmitTurnResponse, ClientError> {
        let req = self.compose(text)?;
        let resp = self.client.submit_turn(&req).await?;
        info!(
            channel_id = %req.channel_id,
            placeholder_id = %resp.assistant_placeholder.id,
            "turn submitted"
        );
        self.view.staged_image = None;
        Ok(resp)
    }

    /// Submit a turn and wait for the assistant reply to settle.
    pub async fn send_and_wait(
        &mut self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<(SubmitTurnResponse, PollOutcome), ClientError> {
        let resp = self.send(text).await?;
        let placeholder = &resp.assistant_placeholder;
        let outcome = if placeholder.pending {
            self.poller
                .wait(&self.client, &placeholder.channel_id, &placeholder.id, cancel)
                .await
        } else {
            PollOutcome::Resolved(placeholder.clone())
        };
        Ok((resp, outcome))
    }
}
