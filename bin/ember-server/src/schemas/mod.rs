//! Conversions from stored records to the wire types in `ember-types`.

use ember_types::{Channel, Message};

use crate::entities::{ChannelRecord, MessageRecord};

impl ChannelRecord {
    pub fn to_response(&self) -> Channel {
        Channel {
            id: self.id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
        }
    }
}

impl MessageRecord {
    pub fn to_response(&self) -> Message {
        Message {
            id: self.id.clone(),
            channel_id: self.channel_id.clone(),
            role: self.role,
            text: self.text.clone(),
            image_ref: self.image_ref.clone(),
            pending: self.pending,
            created_at: self.created_at,
        }
    }
}
