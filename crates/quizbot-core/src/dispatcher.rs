//! The single driver loop: long-poll for updates, route each one, and
//! advance the offset cursor only past fully handled updates.

use std::{sync::Arc, time::Duration};

use tracing::{debug, error, info, warn};

use crate::{
    domain::{ChatId, PollAnswer, Update, UpdateId, UserId},
    engine::QuizEngine,
    errors::Error,
    ports::{MessagingGateway, QuizGenerator},
    retry::{with_backoff, RetryPolicy},
    router::{route, Command, Route},
    sessions::SessionRegistry,
    stats::StatsTracker,
    Result,
};

pub(crate) const GREETING: &str = "Hi! I'm a Programming Quiz bot";
pub(crate) const HELP: &str =
    "Hi! I'm a Programming Quiz bot. \nUse commands: /start, /help, /quiz, /stats to interact with me.";
pub(crate) const UNKNOWN_COMMAND: &str =
    "Sorry, I do not understand that command. Please type /help for a list of commands.";
pub(crate) const NO_STATS_YET: &str = "You haven't taken any quizzes yet.";
pub(crate) const GENERATION_APOLOGY: &str =
    "Sorry, I couldn't come up with a quiz right now. Please try again later.";

/// Drives the whole bot.
///
/// Owns every piece of mutable state (offset cursor, session registry,
/// stats); handlers receive the registries by reference, never through
/// globals. Everything runs on this one task, so no locking is needed.
pub struct Dispatcher {
    gateway: Arc<dyn MessagingGateway>,
    engine: QuizEngine,
    sessions: SessionRegistry,
    stats: StatsTracker,
    offset: Option<UpdateId>,
    retry: RetryPolicy,
    long_poll_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        generator: Arc<dyn QuizGenerator>,
        retry: RetryPolicy,
        long_poll_timeout: Duration,
    ) -> Self {
        Self {
            engine: QuizEngine::new(generator, gateway.clone(), retry),
            gateway,
            sessions: SessionRegistry::new(),
            stats: StatsTracker::new(),
            offset: None,
            retry,
            long_poll_timeout,
        }
    }

    /// Run until externally terminated. No collaborator failure aborts the
    /// loop once it is running.
    pub async fn run(&mut self) -> Result<()> {
        info!("dispatcher started");
        loop {
            self.poll_once().await;
        }
    }

    /// One fetch + process cycle; `run` is just this in a loop.
    pub async fn poll_once(&mut self) {
        let mut batch = match self.fetch_batch().await {
            Ok(batch) => batch,
            Err(e) => {
                error!("fetching updates failed beyond retry budget: {e}");
                tokio::time::sleep(self.retry.delay(0)).await;
                return;
            }
        };

        // The platform already orders updates; sorting keeps the strictly
        // ascending contract even if an adapter misbehaves.
        batch.sort_by_key(|u| u.id);

        for update in batch {
            match self.process(&update).await {
                Ok(()) => self.offset = Some(update.id.next()),
                Err(e) if e.is_transient() => {
                    // Leave the cursor where it is: this update is re-fetched
                    // and re-processed after a pause. Earlier updates in the
                    // batch are already committed and will not come back.
                    warn!("update {} failed transiently, will re-fetch: {e}", update.id.0);
                    tokio::time::sleep(self.retry.delay(0)).await;
                    return;
                }
                Err(e) => {
                    error!("update {} failed: {e}", update.id.0);
                    self.offset = Some(update.id.next());
                }
            }
        }
    }

    async fn fetch_batch(&self) -> Result<Vec<Update>> {
        let gateway = &self.gateway;
        let offset = self.offset;
        let timeout = self.long_poll_timeout;
        with_backoff(&self.retry, "fetch updates", || {
            gateway.fetch_updates(offset, timeout)
        })
        .await
    }

    async fn process(&mut self, update: &Update) -> Result<()> {
        match route(update) {
            Route::Command {
                chat_id,
                user_id,
                command,
            } => self.handle_command(chat_id, user_id, command).await,
            Route::PollAnswer(answer) => {
                self.handle_poll_answer(&answer);
                Ok(())
            }
            Route::Ignored => {
                debug!("ignoring update {}", update.id.0);
                Ok(())
            }
        }
    }

    async fn handle_command(
        &mut self,
        chat_id: ChatId,
        user_id: UserId,
        command: Command,
    ) -> Result<()> {
        self.stats.touch(user_id);

        match command {
            Command::Start => self.reply(chat_id, GREETING).await,
            Command::Help => self.reply(chat_id, HELP).await,
            Command::Quiz => self.handle_quiz_request(chat_id, user_id).await,
            Command::Stats => {
                let text = self.stats_reply(user_id);
                self.reply(chat_id, &text).await
            }
            Command::Unknown(text) => {
                debug!("unknown command from user {}: {text:?}", user_id.0);
                self.reply(chat_id, UNKNOWN_COMMAND).await
            }
        }
    }

    async fn handle_quiz_request(&mut self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        let content = match self.engine.request_quiz_content().await {
            Ok(content) => content,
            Err(e @ Error::Generation(_)) => {
                warn!("quiz generation failed for user {}: {e}", user_id.0);
                return self.reply(chat_id, GENERATION_APOLOGY).await;
            }
            Err(e) => return Err(e),
        };

        match self
            .engine
            .dispatch_quiz(chat_id, user_id, &content, &mut self.sessions, &mut self.stats)
            .await
        {
            Ok(poll_id) => {
                info!("quiz poll {poll_id} sent to chat {}", chat_id.0);
                Ok(())
            }
            Err(e @ Error::DuplicateSession { .. }) => {
                // The platform handed out a poll id we still track. Log and
                // move on without crediting anything.
                error!("{e}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn handle_poll_answer(&mut self, answer: &PollAnswer) {
        match self
            .sessions
            .resolve(&answer.poll_id, answer.chosen_option_index)
        {
            Some(resolved) => {
                self.stats.record_outcome(resolved.user_id, resolved.correct);
                info!(
                    "poll {} resolved for user {}: {}",
                    answer.poll_id,
                    resolved.user_id.0,
                    if resolved.correct { "correct" } else { "incorrect" }
                );
            }
            None => {
                // Duplicate or stale answer; nothing to credit.
                debug!(
                    "ignoring poll answer for unknown or resolved poll {}",
                    answer.poll_id
                );
            }
        }
    }

    fn stats_reply(&self, user_id: UserId) -> String {
        match self.stats.get(user_id) {
            Some(stats) if stats.quizzes_taken > 0 => format!(
                "You have taken {} quizzes.\nCorrect answers: {}\nIncorrect answers: {}",
                stats.quizzes_taken, stats.correct_answers, stats.incorrect_answers
            ),
            _ => NO_STATS_YET.to_string(),
        }
    }

    async fn reply(&self, chat_id: ChatId, text: &str) -> Result<()> {
        let gateway = &self.gateway;
        with_backoff(&self.retry, "send message", || {
            gateway.send_message(chat_id, text)
        })
        .await
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn offset(&self) -> Option<UpdateId> {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::domain::{MessageUpdate, PollId, QuizContent, UpdateKind, UserStats};

    enum Fetch {
        Batch(Vec<Update>),
        Fail,
    }

    #[derive(Default)]
    struct ScriptedGateway {
        script: Mutex<VecDeque<Fetch>>,
        fetch_offsets: Mutex<Vec<Option<UpdateId>>>,
        messages: Mutex<Vec<(ChatId, String)>>,
        polls: Mutex<Vec<(ChatId, String, QuizContent)>>,
        fail_message_sends: Mutex<u32>,
    }

    impl ScriptedGateway {
        fn push_batch(&self, updates: Vec<Update>) {
            self.script.lock().unwrap().push_back(Fetch::Batch(updates));
        }

        fn push_fetch_failure(&self) {
            self.script.lock().unwrap().push_back(Fetch::Fail);
        }

        fn sent_messages(&self) -> Vec<(ChatId, String)> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessagingGateway for ScriptedGateway {
        async fn fetch_updates(
            &self,
            offset: Option<UpdateId>,
            _timeout: Duration,
        ) -> Result<Vec<Update>> {
            self.fetch_offsets.lock().unwrap().push(offset);
            match self.script.lock().unwrap().pop_front() {
                Some(Fetch::Batch(updates)) => Ok(updates),
                Some(Fetch::Fail) => Err(Error::Network("long poll dropped".to_string())),
                None => Ok(Vec::new()),
            }
        }

        async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<()> {
            let mut fails = self.fail_message_sends.lock().unwrap();
            if *fails > 0 {
                *fails -= 1;
                return Err(Error::Network("send failed".to_string()));
            }
            self.messages
                .lock()
                .unwrap()
                .push((chat_id, text.to_string()));
            Ok(())
        }

        async fn send_quiz_poll(
            &self,
            chat_id: ChatId,
            question: &str,
            content: &QuizContent,
        ) -> Result<PollId> {
            let mut polls = self.polls.lock().unwrap();
            polls.push((chat_id, question.to_string(), content.clone()));
            Ok(PollId(format!("poll-{}", polls.len())))
        }
    }

    struct FixedGenerator {
        content: Option<QuizContent>,
    }

    #[async_trait]
    impl QuizGenerator for FixedGenerator {
        async fn generate(&self) -> Result<QuizContent> {
            self.content
                .clone()
                .ok_or_else(|| Error::Generation("model unavailable".to_string()))
        }
    }

    fn quiz_content() -> QuizContent {
        QuizContent {
            question: "What does `Vec::with_capacity` preallocate?".to_string(),
            options: vec![
                "nothing".to_string(),
                "elements".to_string(),
                "heap space".to_string(),
                "stack space".to_string(),
            ],
            correct_option_index: 2,
            explanation: "Capacity reserves heap space without elements.".to_string(),
        }
    }

    fn message(id: i32, chat: i64, user: i64, text: &str) -> Update {
        Update {
            id: UpdateId(id),
            kind: UpdateKind::Message(MessageUpdate {
                chat_id: ChatId(chat),
                user_id: UserId(user),
                text: text.to_string(),
            }),
        }
    }

    fn answer(id: i32, poll_id: &str, user: i64, chosen: usize) -> Update {
        Update {
            id: UpdateId(id),
            kind: UpdateKind::PollAnswer(PollAnswer {
                poll_id: PollId(poll_id.to_string()),
                user_id: UserId(user),
                chosen_option_index: chosen,
            }),
        }
    }

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn dispatcher(
        gateway: Arc<ScriptedGateway>,
        generated: Option<QuizContent>,
    ) -> Dispatcher {
        Dispatcher::new(
            gateway,
            Arc::new(FixedGenerator { content: generated }),
            instant_policy(2),
            Duration::from_secs(0),
        )
    }

    fn assert_stats_reconcile(d: &Dispatcher, user: UserId) {
        let stats = d.stats().get(user).copied().unwrap_or_default();
        assert_eq!(
            stats.quizzes_taken,
            stats.correct_answers
                + stats.incorrect_answers
                + d.sessions().pending_for(user) as u32
        );
    }

    #[tokio::test]
    async fn start_command_sends_the_greeting() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push_batch(vec![message(1, 10, 5, "/start")]);
        let mut d = dispatcher(gateway.clone(), None);

        d.poll_once().await;

        assert_eq!(
            gateway.sent_messages(),
            vec![(ChatId(10), GREETING.to_string())]
        );
        assert_eq!(d.offset(), Some(UpdateId(2)));
    }

    #[tokio::test]
    async fn quiz_then_correct_answer_credits_the_user() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push_batch(vec![message(1, 10, 5, "/quiz")]);
        gateway.push_batch(vec![answer(2, "poll-1", 5, 2)]);
        let mut d = dispatcher(gateway.clone(), Some(quiz_content()));

        d.poll_once().await;
        assert_eq!(d.sessions().pending_for(UserId(5)), 1);
        assert_stats_reconcile(&d, UserId(5));

        d.poll_once().await;
        assert_eq!(
            d.stats().get(UserId(5)),
            Some(&UserStats {
                quizzes_taken: 1,
                correct_answers: 1,
                incorrect_answers: 0,
            })
        );
        assert_eq!(d.sessions().pending_for(UserId(5)), 0);
        assert_stats_reconcile(&d, UserId(5));
    }

    #[tokio::test]
    async fn quiz_then_wrong_answer_counts_as_incorrect() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push_batch(vec![message(1, 10, 5, "/quiz")]);
        gateway.push_batch(vec![answer(2, "poll-1", 5, 0)]);
        let mut d = dispatcher(gateway.clone(), Some(quiz_content()));

        d.poll_once().await;
        d.poll_once().await;

        assert_eq!(
            d.stats().get(UserId(5)),
            Some(&UserStats {
                quizzes_taken: 1,
                correct_answers: 0,
                incorrect_answers: 1,
            })
        );
        assert_stats_reconcile(&d, UserId(5));
    }

    #[tokio::test]
    async fn duplicate_poll_answer_is_ignored() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push_batch(vec![message(1, 10, 5, "/quiz")]);
        gateway.push_batch(vec![answer(2, "poll-1", 5, 2), answer(3, "poll-1", 5, 0)]);
        let mut d = dispatcher(gateway.clone(), Some(quiz_content()));

        d.poll_once().await;
        d.poll_once().await;

        // The second answer resolved nothing and changed nothing.
        assert_eq!(
            d.stats().get(UserId(5)),
            Some(&UserStats {
                quizzes_taken: 1,
                correct_answers: 1,
                incorrect_answers: 0,
            })
        );
        assert_eq!(d.offset(), Some(UpdateId(4)));
    }

    #[tokio::test]
    async fn stale_poll_answer_changes_no_state() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push_batch(vec![answer(1, "never-sent", 5, 0)]);
        let mut d = dispatcher(gateway.clone(), None);

        d.poll_once().await;

        assert_eq!(d.stats().get(UserId(5)), None);
        assert_eq!(d.offset(), Some(UpdateId(2)));
    }

    #[tokio::test]
    async fn stats_without_history_gets_the_empty_reply() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push_batch(vec![message(1, 10, 5, "/stats")]);
        let mut d = dispatcher(gateway.clone(), None);

        d.poll_once().await;

        assert_eq!(
            gateway.sent_messages(),
            vec![(ChatId(10), NO_STATS_YET.to_string())]
        );
    }

    #[tokio::test]
    async fn stats_after_a_resolved_quiz_reports_the_counters() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push_batch(vec![message(1, 10, 5, "/quiz")]);
        gateway.push_batch(vec![answer(2, "poll-1", 5, 2)]);
        gateway.push_batch(vec![message(3, 10, 5, "/stats")]);
        let mut d = dispatcher(gateway.clone(), Some(quiz_content()));

        d.poll_once().await;
        d.poll_once().await;
        d.poll_once().await;

        let messages = gateway.sent_messages();
        assert_eq!(
            messages.last().unwrap().1,
            "You have taken 1 quizzes.\nCorrect answers: 1\nIncorrect answers: 0"
        );
    }

    #[tokio::test]
    async fn unknown_command_gets_the_help_hint() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push_batch(vec![message(1, 10, 5, "make me a sandwich")]);
        let mut d = dispatcher(gateway.clone(), None);

        d.poll_once().await;

        assert_eq!(
            gateway.sent_messages(),
            vec![(ChatId(10), UNKNOWN_COMMAND.to_string())]
        );
        // First interaction still creates the (zeroed) stats entry.
        assert_eq!(d.stats().get(UserId(5)), Some(&UserStats::default()));
    }

    #[tokio::test]
    async fn generation_failure_sends_an_apology_and_no_poll() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push_batch(vec![message(1, 10, 5, "/quiz")]);
        let mut d = dispatcher(gateway.clone(), None);

        d.poll_once().await;

        assert_eq!(
            gateway.sent_messages(),
            vec![(ChatId(10), GENERATION_APOLOGY.to_string())]
        );
        assert!(gateway.polls.lock().unwrap().is_empty());
        assert!(d.sessions().is_empty());
        assert_eq!(d.stats().get(UserId(5)).unwrap().quizzes_taken, 0);
    }

    #[tokio::test]
    async fn offset_advances_past_each_processed_batch() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push_batch(vec![message(3, 10, 5, "/start"), message(4, 10, 5, "/help")]);
        gateway.push_batch(vec![message(5, 10, 5, "/start")]);
        let mut d = dispatcher(gateway.clone(), None);

        d.poll_once().await;
        assert_eq!(d.offset(), Some(UpdateId(5)));

        d.poll_once().await;
        assert_eq!(d.offset(), Some(UpdateId(6)));

        // The first fetch carries no cursor; later fetches resume past the
        // last committed update.
        assert_eq!(
            *gateway.fetch_offsets.lock().unwrap(),
            vec![None, Some(UpdateId(5))]
        );
    }

    #[tokio::test]
    async fn transient_fetch_failures_are_retried_within_a_cycle() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.push_fetch_failure();
        gateway.push_batch(vec![message(1, 10, 5, "/start")]);
        let mut d = dispatcher(gateway.clone(), None);

        d.poll_once().await;

        assert_eq!(
            gateway.sent_messages(),
            vec![(ChatId(10), GREETING.to_string())]
        );
        assert_eq!(d.offset(), Some(UpdateId(2)));
    }

    #[tokio::test]
    async fn transient_processing_failure_does_not_commit_the_update() {
        let gateway = Arc::new(ScriptedGateway::default());
        // Both attempts of the reply fail; the update must stay uncommitted.
        *gateway.fail_message_sends.lock().unwrap() = 2;
        gateway.push_batch(vec![message(1, 10, 5, "/start")]);
        // The re-fetch after the failure delivers the same update again.
        gateway.push_batch(vec![message(1, 10, 5, "/start")]);
        let mut d = dispatcher(gateway.clone(), None);

        d.poll_once().await;
        assert_eq!(d.offset(), None);
        assert!(gateway.sent_messages().is_empty());

        d.poll_once().await;
        assert_eq!(d.offset(), Some(UpdateId(2)));
        assert_eq!(
            gateway.sent_messages(),
            vec![(ChatId(10), GREETING.to_string())]
        );
    }

    #[tokio::test]
    async fn batches_are_processed_in_ascending_id_order() {
        let gateway = Arc::new(ScriptedGateway::default());
        // /quiz must land before the answer even if the adapter misorders.
        gateway.push_batch(vec![answer(2, "poll-1", 5, 2), message(1, 10, 5, "/quiz")]);
        let mut d = dispatcher(gateway.clone(), Some(quiz_content()));

        d.poll_once().await;

        assert_eq!(
            d.stats().get(UserId(5)),
            Some(&UserStats {
                quizzes_taken: 1,
                correct_answers: 1,
                incorrect_answers: 0,
            })
        );
    }
}
