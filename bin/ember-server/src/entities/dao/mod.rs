pub mod channel;
pub mod image;
pub mod message;

pub use channel::ChannelRecord;
pub use image::ImageRecord;
pub use message::MessageRecord;
