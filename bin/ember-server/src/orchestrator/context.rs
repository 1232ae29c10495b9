use crate::entities::MessageRecord;

/// Marker standing in for a message that carries only an image.
pub const IMAGE_MARKER: &str = "[image]";

/// The recent-message window handed to the backend as grounding.
///
/// Built fresh for every generation call from a point-in-time snapshot of the
/// channel; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationContext {
    lines: Vec<String>,
}

impl ConversationContext {
    /// `messages` must already be in chronological order.
    pub fn from_messages(messages: &[MessageRecord]) -> Self {
        Self {
            lines: messages.iter().map(render_line).collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The prompt text for a text reply.
    ///
    /// `attachment` names an image attached to the triggering turn.
    pub fn to_prompt(&self, attachment: Option<&str>) -> String {
        let mut prompt = self.lines.join("\n");
        if !prompt.is_empty() {
            prompt.push('\n');
        }
        prompt.push_str("Assistant:");
        if let Some(attachment) = attachment {
            prompt.push_str("\nUser attached image: ");
            prompt.push_str(attachment);
        }
        prompt
    }
}

fn render_line(msg: &MessageRecord) -> String {
    let body = if !msg.text.is_empty() {
        msg.text.as_str()
    } else if msg.image_ref.is_some() {
        IMAGE_MARKER
    } else {
        ""
    };
    format!("{}: {}", msg.role.label(), body)
}
