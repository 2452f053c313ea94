use thiserror::Error;

/// Pipeline error taxonomy. Every variant is terminal for the current
/// capture; none of them is retried. The lifecycle converts all of these
/// into its `Error` state, so nothing escapes to the consuming UI.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("no image supplied")]
    MissingImage,

    /// Server-side credential absent. Surfaced to callers as a generic
    /// failure; the detail stays in the logs.
    #[error("classification service is not configured")]
    MissingCredential,

    #[error("classification request failed: {0}")]
    Transport(String),

    #[error("model answer was not usable: {0}")]
    MalformedResponse(String),

    /// A capture arrived while another one was in flight.
    #[error("a capture is already in progress")]
    Busy,
}

impl DetectError {
    /// Message safe to show an end user. Internal detail (status codes, raw
    /// model text) is logged, never displayed.
    pub fn user_message(&self) -> &'static str {
        match self {
            DetectError::MissingImage => "No image was captured. Please try again.",
            DetectError::Busy => "A scan is already running.",
            DetectError::MissingCredential
            | DetectError::Transport(_)
            | DetectError::MalformedResponse(_) => "Analysis failed. Please try again.",
        }
    }
}
