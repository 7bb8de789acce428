//! Pure classification of incoming updates into commands and poll-answer
//! events. No side effects; the dispatcher acts on the result.

use crate::domain::{ChatId, PollAnswer, Update, UpdateKind, UserId};

/// Closed command set understood by the bot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Quiz,
    Stats,
    Unknown(String),
}

/// Where an update should go.
#[derive(Clone, Debug, PartialEq)]
pub enum Route {
    Command {
        chat_id: ChatId,
        user_id: UserId,
        command: Command,
    },
    PollAnswer(PollAnswer),
    Ignored,
}

/// Map raw message text to a command.
///
/// Accepts the `/cmd@BotName` form Telegram produces in group chats and is
/// case-insensitive on the command itself; anything else is `Unknown`.
pub fn classify(text: &str) -> Command {
    let trimmed = text.trim();
    let head = trimmed.split_whitespace().next().unwrap_or("");
    let cmd = head.split('@').next().unwrap_or("").to_lowercase();

    match cmd.as_str() {
        "/start" => Command::Start,
        "/help" => Command::Help,
        "/quiz" => Command::Quiz,
        "/stats" => Command::Stats,
        _ => Command::Unknown(trimmed.to_string()),
    }
}

/// A poll answer routes as such regardless of anything else on the update.
pub fn route(update: &Update) -> Route {
    match &update.kind {
        UpdateKind::Message(msg) => Route::Command {
            chat_id: msg.chat_id,
            user_id: msg.user_id,
            command: classify(&msg.text),
        },
        UpdateKind::PollAnswer(answer) => Route::PollAnswer(answer.clone()),
        UpdateKind::Other => Route::Ignored,
    }
}
