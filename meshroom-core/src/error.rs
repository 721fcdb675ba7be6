use thiserror::Error;

/// Failure to turn bytes or text received from the network into a typed message.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed json message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed binary record: {0}")]
    Binary(#[from] postcard::Error),

    #[error("invalid identifier `{0}`")]
    InvalidId(String),
}
