//! Telegram adapter (teloxide).
//!
//! This crate implements the `quizbot-core` MessagingGateway over the
//! Telegram Bot API: long-poll update fetch, plain messages, and quiz polls.

use std::time::Duration;

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{AllowedUpdate, PollType, UpdateKind as TgUpdateKind},
};

use tokio::time::sleep;

use quizbot_core::{
    domain::{
        ChatId, MessageUpdate, PollAnswer, PollId, QuizContent, Update, UpdateId, UpdateKind,
        UserId,
    },
    errors::Error,
    ports::MessagingGateway,
    Result,
};

/// Headroom above the long-poll timeout so the HTTP client does not cut the
/// held-open request short.
const HTTP_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    /// Build a gateway whose HTTP client tolerates `long_poll_timeout`.
    pub fn new(token: impl Into<String>, long_poll_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(long_poll_timeout + HTTP_TIMEOUT_MARGIN)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::External(format!("http client build: {e}")))?;

        Ok(Self {
            bot: Bot::with_client(token, client),
        })
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    /// Startup identity check; also verifies the token works.
    pub async fn me(&self) -> Result<String> {
        let me = self.bot.get_me().await.map_err(map_err)?;
        Ok(me.username().to_string())
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        // Honor the platform's flood-control hint once; everything beyond
        // that is the dispatcher's retry policy.
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    async fn fetch_updates(
        &self,
        offset: Option<UpdateId>,
        timeout: Duration,
    ) -> Result<Vec<Update>> {
        let raw = self
            .with_retry(|| {
                let mut req = self.bot.get_updates();
                req.timeout = Some(timeout.as_secs() as u32);
                req.allowed_updates =
                    Some(vec![AllowedUpdate::Message, AllowedUpdate::PollAnswer]);
                if let Some(UpdateId(n)) = offset {
                    req.offset = Some(n);
                }
                req
            })
            .await?;

        Ok(raw.into_iter().map(convert_update).collect())
    }

    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.with_retry(|| self.bot.send_message(tg_chat(chat_id), text.to_string()))
            .await?;
        Ok(())
    }

    async fn send_quiz_poll(
        &self,
        chat_id: ChatId,
        question: &str,
        content: &QuizContent,
    ) -> Result<PollId> {
        let correct = u8::try_from(content.correct_option_index).map_err(|_| {
            Error::External(format!(
                "correct option index {} does not fit the wire format",
                content.correct_option_index
            ))
        })?;

        let msg = self
            .with_retry(|| {
                let mut req = self.bot.send_poll(
                    tg_chat(chat_id),
                    question.to_string(),
                    content.options.clone(),
                );
                req.type_ = Some(PollType::Quiz);
                req.is_anonymous = Some(false);
                req.correct_option_id = Some(correct);
                req.explanation = Some(content.explanation.clone());
                req
            })
            .await?;

        let poll = msg
            .poll()
            .ok_or_else(|| Error::External("sendPoll reply carried no poll".to_string()))?;
        Ok(PollId(poll.id.clone()))
    }
}

fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
    teloxide::types::ChatId(chat_id.0)
}

fn map_err(e: teloxide::RequestError) -> Error {
    match e {
        teloxide::RequestError::Network(e) => Error::Network(format!("telegram transport: {e}")),
        teloxide::RequestError::Io(e) => Error::Network(format!("telegram i/o: {e}")),
        teloxide::RequestError::RetryAfter(d) => {
            Error::Network(format!("telegram flood control, retry after {d:?}"))
        }
        other => Error::External(format!("telegram error: {other}")),
    }
}

/// Map a wire update to the domain model. Everything the bot does not act on
/// becomes `UpdateKind::Other` (it still consumes offset).
fn convert_update(update: teloxide::types::Update) -> Update {
    let id = UpdateId(update.id);
    let kind = match update.kind {
        TgUpdateKind::Message(msg) => match (msg.from(), msg.text()) {
            (Some(from), Some(text)) => UpdateKind::Message(MessageUpdate {
                chat_id: ChatId(msg.chat.id.0),
                user_id: UserId(from.id.0 as i64),
                text: text.to_string(),
            }),
            _ => UpdateKind::Other,
        },
        TgUpdateKind::PollAnswer(answer) => match chosen_option(&answer.option_ids) {
            Some(chosen) => UpdateKind::PollAnswer(PollAnswer {
                poll_id: PollId(answer.poll_id),
                user_id: UserId(answer.user.id.0 as i64),
                chosen_option_index: chosen,
            }),
            // Retracted vote: no selected option left.
            None => UpdateKind::Other,
        },
        _ => UpdateKind::Other,
    };

    Update { id, kind }
}

/// The chosen option is the first selected *index* reported by the platform,
/// never a vote count.
fn chosen_option(option_ids: &[i32]) -> Option<usize> {
    option_ids.first().and_then(|&i| usize::try_from(i).ok())
}
