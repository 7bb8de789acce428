use crate::domain::PollId;

/// Core error type for the bot.
///
/// Adapter crates map their library errors into this so the dispatcher can
/// decide between retry (transient) and log-and-continue.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// Transient transport failure; retried with backoff, never fatal.
    #[error("network error: {0}")]
    Network(String),

    /// The generator failed or produced content the bot cannot send.
    #[error("quiz generation error: {0}")]
    Generation(String),

    /// A live session already exists for this poll id. Should not occur
    /// under correct platform behavior.
    #[error("duplicate session for poll {poll_id}")]
    DuplicateSession { poll_id: PollId },

    /// Non-transient collaborator rejection.
    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Whether retrying the same operation can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
