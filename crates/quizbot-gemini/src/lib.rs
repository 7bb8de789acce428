//! Quiz-content generator adapter (Google Generative Language API).
//!
//! Prompts the model for a single multiple-choice question and parses the
//! strict-JSON reply into `QuizContent`. Every failure on this path is a
//! `Generation` error: the bot apologizes instead of sending a poll.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use quizbot_core::{domain::QuizContent, errors::Error, ports::QuizGenerator, Result};

const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Clone, Debug)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    topic: String,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        topic: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Generation(format!("http client build: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            topic: topic.into(),
            http,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn prompt(&self) -> String {
        format!(
            "Generate one multiple-choice {} quiz question. Reply with a single JSON object \
             and nothing else, with exactly these fields: \"question\" (string), \"options\" \
             (array of 4 strings), \"correct_option_id\" (0-based index of the right option), \
             \"explanation\" (one short sentence).",
            self.topic
        )
    }
}

#[async_trait]
impl QuizGenerator for GeminiClient {
    async fn generate(&self) -> Result<QuizContent> {
        let url = format!("{API_BASE}/{}:generateContent", self.model);
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": self.prompt() }] }],
            "generationConfig": { "response_mime_type": "application/json" },
        });

        let resp = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("generator request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Generation(format!(
                "generator request failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let payload: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::Generation(format!("generator json error: {e}")))?;

        parse_quiz(&payload)
    }
}

#[derive(Debug, Deserialize)]
struct RawQuiz {
    question: String,
    options: Vec<String>,
    correct_option_id: usize,
    #[serde(default)]
    explanation: String,
}

/// Extract the model's JSON reply (`candidates[0].content.parts[0].text`)
/// and map it onto the domain content type.
fn parse_quiz(payload: &serde_json::Value) -> Result<QuizContent> {
    let text = payload
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(|t| t.as_str())
        .ok_or_else(|| Error::Generation("generator reply carried no text part".to_string()))?;

    let raw: RawQuiz = serde_json::from_str(strip_code_fences(text))
        .map_err(|e| Error::Generation(format!("generator reply is not a quiz object: {e}")))?;

    Ok(QuizContent {
        question: raw.question,
        options: raw.options,
        correct_option_index: raw.correct_option_id,
        explanation: raw.explanation,
    })
}

/// Models occasionally wrap the JSON in a markdown code fence despite the
/// mime type hint.
fn strip_code_fences(text: &str) -> &str {
    let t = text.trim();
    let t = t
        .strip_prefix("```json")
        .or_else(|| t.strip_prefix("```"))
        .unwrap_or(t);
    t.strip_suffix("```").unwrap_or(t).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_with(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }] },
                "finishReason": "STOP",
            }]
        })
    }

    const QUIZ_JSON: &str = r#"{
        "question": "Which trait powers the ? operator?",
        "options": ["Display", "From", "Iterator", "Clone"],
        "correct_option_id": 1,
        "explanation": "Error conversion goes through From."
    }"#;

    #[test]
    fn parses_a_well_formed_reply() {
        let quiz = parse_quiz(&reply_with(QUIZ_JSON)).unwrap();
        assert_eq!(quiz.question, "Which trait powers the ? operator?");
        assert_eq!(quiz.options.len(), 4);
        assert_eq!(quiz.correct_option_index, 1);
        assert_eq!(quiz.explanation, "Error conversion goes through From.");
        assert!(quiz.validate().is_ok());
    }

    #[test]
    fn tolerates_a_code_fenced_reply() {
        let fenced = format!("```json\n{QUIZ_JSON}\n```");
        let quiz = parse_quiz(&reply_with(&fenced)).unwrap();
        assert_eq!(quiz.correct_option_index, 1);
    }

    #[test]
    fn missing_text_part_is_a_generation_error() {
        let payload = serde_json::json!({ "candidates": [] });
        let err = parse_quiz(&payload).unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }

    #[test]
    fn non_quiz_reply_is_a_generation_error() {
        let err = parse_quiz(&reply_with("I'd rather chat about the weather.")).unwrap_err();
        assert!(matches!(err, Error::Generation(_)));

        let err = parse_quiz(&reply_with(r#"{"question": "q"}"#)).unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }

    #[test]
    fn strips_fences_only_when_present() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
    }
}
