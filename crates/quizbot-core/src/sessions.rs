//! Outstanding quizzes awaiting a poll answer, keyed by poll id.

use std::collections::HashMap;

use crate::{
    domain::{ChatId, PendingQuiz, PollId, UserId},
    errors::Error,
    Result,
};

/// Result of resolving a pending quiz against a poll answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedQuiz {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub correct: bool,
}

/// Tracks every quiz poll that was sent and not yet answered.
///
/// Owned by the dispatcher; all mutation happens on its single task.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    pending: HashMap<PollId, PendingQuiz>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new pending quiz. A second live session for the same poll
    /// id is a platform-contract violation and is rejected.
    pub fn register(&mut self, pending: PendingQuiz) -> Result<()> {
        if self.pending.contains_key(&pending.poll_id) {
            return Err(Error::DuplicateSession {
                poll_id: pending.poll_id,
            });
        }
        self.pending.insert(pending.poll_id.clone(), pending);
        Ok(())
    }

    /// Remove and score the pending quiz for `poll_id`. The chosen option
    /// is identified by its index among the poll options. `None` means
    /// unknown or already resolved; the caller skips stats updates.
    pub fn resolve(&mut self, poll_id: &PollId, chosen_option_index: usize) -> Option<ResolvedQuiz> {
        let pending = self.pending.remove(poll_id)?;
        Some(ResolvedQuiz {
            user_id: pending.user_id,
            chat_id: pending.chat_id,
            correct: chosen_option_index == pending.correct_option_index,
        })
    }

    /// Live sessions for `user_id`.
    pub fn pending_for(&self, user_id: UserId) -> usize {
        self.pending
            .values()
            .filter(|p| p.user_id == user_id)
            .count()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
