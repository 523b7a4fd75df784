/// Error types for the conversation sync core
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    /// Rejected before any network call (empty body, missing ids)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Remote read failed; cache state is unchanged and the call is retryable
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    /// Remote insert failed; the optimistic entry is marked failed, not removed
    #[error("Remote error: {0}")]
    Remote(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
