use std::fmt;

use chrono::{DateTime, Utc};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Update sequence number; `next()` is the offset value that commits it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UpdateId(pub i32);

impl UpdateId {
    pub fn next(self) -> UpdateId {
        UpdateId(self.0 + 1)
    }
}

/// Poll id (opaque string handed out by the platform).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PollId(pub String);

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One platform event, consumed exactly once by the dispatcher.
#[derive(Clone, Debug)]
pub struct Update {
    pub id: UpdateId,
    pub kind: UpdateKind,
}

#[derive(Clone, Debug)]
pub enum UpdateKind {
    Message(MessageUpdate),
    PollAnswer(PollAnswer),
    /// Anything the bot does not act on (media messages, vote retractions,
    /// unknown update types). Still consumes offset.
    Other,
}

#[derive(Clone, Debug)]
pub struct MessageUpdate {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub text: String,
}

/// A user's selection on a previously sent quiz poll.
#[derive(Clone, Debug, PartialEq)]
pub struct PollAnswer {
    pub poll_id: PollId,
    pub user_id: UserId,
    pub chosen_option_index: usize,
}

/// Telegram allows at most this many options per poll.
pub const MAX_POLL_OPTIONS: usize = 10;

/// Generated quiz material, validated before anything is sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuizContent {
    pub question: String,
    pub options: Vec<String>,
    pub correct_option_index: usize,
    pub explanation: String,
}

impl QuizContent {
    /// Rejects content the platform cannot represent as a quiz poll.
    pub fn validate(&self) -> Result<(), String> {
        if self.question.trim().is_empty() {
            return Err("question is empty".to_string());
        }
        if self.options.len() < 2 {
            return Err(format!(
                "need at least 2 options, got {}",
                self.options.len()
            ));
        }
        if self.options.len() > MAX_POLL_OPTIONS {
            return Err(format!(
                "too many options: {} (max {MAX_POLL_OPTIONS})",
                self.options.len()
            ));
        }
        if self.correct_option_index >= self.options.len() {
            return Err(format!(
                "correct option index {} out of range for {} options",
                self.correct_option_index,
                self.options.len()
            ));
        }
        Ok(())
    }
}

/// A quiz poll that was sent and is awaiting a matching poll answer.
#[derive(Clone, Debug)]
pub struct PendingQuiz {
    pub poll_id: PollId,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub correct_option_index: usize,
    pub created_at: DateTime<Utc>,
}

/// Per-user counters, kept in memory for the process lifetime only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UserStats {
    pub quizzes_taken: u32,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
}
