use std::time::Duration;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, PollId, QuizContent, Update, UpdateId},
    Result,
};

/// Hexagonal port for the messaging platform.
///
/// Telegram is the first implementation; the dispatcher only ever sees this
/// interface, which keeps the core testable with in-memory fakes.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Long-poll the platform for the next batch of updates, ascending by
    /// id. Blocks until data is available or `timeout` elapses; an empty
    /// batch is not an error. `offset = None` asks for whatever is pending.
    async fn fetch_updates(
        &self,
        offset: Option<UpdateId>,
        timeout: Duration,
    ) -> Result<Vec<Update>>;

    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<()>;

    /// Send `content` as a quiz poll under `question` (the display text may
    /// carry an ordinal prefix) and return the platform's poll id.
    async fn send_quiz_poll(
        &self,
        chat_id: ChatId,
        question: &str,
        content: &QuizContent,
    ) -> Result<PollId>;
}

/// Port for the prompt-driven quiz-content generator.
#[async_trait]
pub trait QuizGenerator: Send + Sync {
    async fn generate(&self) -> Result<QuizContent>;
}
