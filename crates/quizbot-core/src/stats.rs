//! Per-user quiz counters, in memory for the process lifetime.

use std::collections::HashMap;

use crate::domain::{UserId, UserStats};

#[derive(Debug, Default)]
pub struct StatsTracker {
    by_user: HashMap<UserId, UserStats>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a zeroed entry exists (first interaction).
    pub fn touch(&mut self, user_id: UserId) {
        self.by_user.entry(user_id).or_default();
    }

    pub fn record_quiz_sent(&mut self, user_id: UserId) {
        self.by_user.entry(user_id).or_default().quizzes_taken += 1;
    }

    pub fn record_outcome(&mut self, user_id: UserId, correct: bool) {
        let stats = self.by_user.entry(user_id).or_default();
        if correct {
            stats.correct_answers += 1;
        } else {
            stats.incorrect_answers += 1;
        }
    }

    pub fn get(&self, user_id: UserId) -> Option<&UserStats> {
        self.by_user.get(&user_id)
    }
}
