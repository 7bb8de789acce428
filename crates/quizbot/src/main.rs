use std::sync::Arc;

use quizbot_core::{
    config::Config,
    dispatcher::Dispatcher,
    ports::{MessagingGateway, QuizGenerator},
};
use quizbot_gemini::GeminiClient;
use quizbot_telegram::TelegramGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    quizbot_core::logging::init("quizbot")?;

    let cfg = Config::load()?;

    let telegram = TelegramGateway::new(cfg.telegram_bot_token.clone(), cfg.long_poll_timeout)?;

    // Basic startup info.
    match telegram.me().await {
        Ok(username) => println!("quizbot started: @{username}"),
        Err(e) => eprintln!("could not fetch bot identity: {e}"),
    }
    println!("Known chats: {}", cfg.known_chat_ids.len());
    println!("Quiz topic: {}", cfg.quiz_topic);

    let gateway: Arc<dyn MessagingGateway> = Arc::new(telegram);
    let generator: Arc<dyn QuizGenerator> = Arc::new(GeminiClient::new(
        cfg.gemini_api_key.clone(),
        cfg.quiz_topic.clone(),
        cfg.generator_timeout,
    )?);

    let mut dispatcher = Dispatcher::new(gateway, generator, cfg.retry, cfg.long_poll_timeout);
    dispatcher.run().await?;

    Ok(())
}
