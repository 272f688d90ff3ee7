use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("document has no text to extract")]
    EmptyDocument,

    #[error("pass 1 failed: {0}")]
    Pass1Failed(#[source] anyhow::Error),

    #[error("pass 1 reply is not a structure object")]
    Pass1Malformed,

    #[error("prompt is too large: {prompt_tokens} tokens leave no reply budget in a {max_context}-token context")]
    PromptTooLarge {
        prompt_tokens: usize,
        max_context: usize,
    },

    #[error("generation service error: {0}")]
    Service(#[source] anyhow::Error),

    #[error("malformed reply: {0}")]
    MalformedReply(String),
}

impl ExtractError {
    /// Whether a repair call could still recover the reply.
    pub fn is_repairable(&self) -> bool {
        matches!(self, ExtractError::MalformedReply(_))
    }
}
