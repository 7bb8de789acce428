//! Quiz creation: ask the generator for content, send it as a quiz poll,
//! and register the pending session.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::{
    domain::{ChatId, PendingQuiz, PollId, QuizContent, UserId},
    errors::Error,
    ports::{MessagingGateway, QuizGenerator},
    retry::{with_backoff, RetryPolicy},
    sessions::SessionRegistry,
    stats::StatsTracker,
    Result,
};

pub struct QuizEngine {
    generator: Arc<dyn QuizGenerator>,
    gateway: Arc<dyn MessagingGateway>,
    retry: RetryPolicy,
}

impl QuizEngine {
    pub fn new(
        generator: Arc<dyn QuizGenerator>,
        gateway: Arc<dyn MessagingGateway>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            generator,
            gateway,
            retry,
        }
    }

    /// Fetch fresh quiz content from the generator. Content the platform
    /// cannot represent is rejected here, before any session exists.
    pub async fn request_quiz_content(&self) -> Result<QuizContent> {
        let content = self.generator.generate().await?;
        content.validate().map_err(Error::Generation)?;
        Ok(content)
    }

    /// Send `content` as a quiz poll and register the pending session.
    ///
    /// The registry and stats are only touched after the send succeeded, so
    /// a failed send leaves no trace.
    pub async fn dispatch_quiz(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        content: &QuizContent,
        sessions: &mut SessionRegistry,
        stats: &mut StatsTracker,
    ) -> Result<PollId> {
        let ordinal = stats.get(user_id).map_or(0, |s| s.quizzes_taken) + 1;
        let question = format!("Question {ordinal}: {}", content.question);

        let gateway = &self.gateway;
        let poll_id = with_backoff(&self.retry, "send quiz poll", || {
            gateway.send_quiz_poll(chat_id, &question, content)
        })
        .await?;

        sessions.register(PendingQuiz {
            poll_id: poll_id.clone(),
            chat_id,
            user_id,
            correct_option_index: content.correct_option_index,
            created_at: Utc::now(),
        })?;
        stats.record_quiz_sent(user_id);

        debug!("quiz poll {poll_id} pending for user {}", user_id.0);
        Ok(poll_id)
    }
}
