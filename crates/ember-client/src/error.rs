use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a usable response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with an error status.
    #[error("server returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The configured server URL cannot be used.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    /// A send was attempted without a selected channel.
    #[error("no channel selected")]
    NoChannel,

    /// A send was attempted with neither text nor a staged image.
    #[error("enter text or attach an image")]
    EmptyTurn,
}
