use std::{env, fs, path::Path, time::Duration};

use crate::{errors::Error, retry::RetryPolicy, Result};

/// Typed configuration, loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    pub gemini_api_key: String,

    /// Chat ids found via the `TELEGRAM_CHAT_ID*` scan. Informational:
    /// logged at startup, not enforced as an access gate.
    pub known_chat_ids: Vec<i64>,

    /// Topic the generator is prompted with.
    pub quiz_topic: String,

    pub long_poll_timeout: Duration,
    pub generator_timeout: Duration,

    pub retry: RetryPolicy,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let gemini_api_key = env_str("GEMINI_API_KEY").unwrap_or_default();
        if gemini_api_key.trim().is_empty() {
            return Err(Error::Config(
                "GEMINI_API_KEY environment variable is required".to_string(),
            ));
        }

        let known_chat_ids = known_chat_ids_from(env::vars());

        let quiz_topic = env_str("QUIZ_TOPIC")
            .and_then(non_empty)
            .unwrap_or_else(|| "programming".to_string());

        let long_poll_timeout =
            Duration::from_secs(env_u64("LONG_POLL_TIMEOUT_SECS").unwrap_or(25));
        let generator_timeout =
            Duration::from_secs(env_u64("GENERATOR_TIMEOUT_SECS").unwrap_or(30));

        let retry = RetryPolicy {
            max_attempts: env_u32("RETRY_MAX_ATTEMPTS").unwrap_or(5).max(1),
            base_delay: Duration::from_millis(env_u64("RETRY_BASE_DELAY_MS").unwrap_or(500)),
            max_delay: Duration::from_millis(env_u64("RETRY_MAX_DELAY_MS").unwrap_or(30_000)),
        };

        Ok(Self {
            telegram_bot_token,
            gemini_api_key,
            known_chat_ids,
            quiz_topic,
            long_poll_timeout,
            generator_timeout,
            retry,
        })
    }
}

/// `TELEGRAM_CHAT_ID`, `TELEGRAM_CHAT_ID_ALICE`, ... -> chat ids.
fn known_chat_ids_from(vars: impl Iterator<Item = (String, String)>) -> Vec<i64> {
    let mut out: Vec<i64> = vars
        .filter(|(key, _)| key.starts_with("TELEGRAM_CHAT_ID"))
        .filter_map(|(_, value)| value.trim().parse::<i64>().ok())
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}
