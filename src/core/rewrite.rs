//! Optional paraphrasing of a card's narrative by an external text
//! generator, guarded so that no number on the card can change.

use regex::Regex;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RewriteConfig;
use crate::schema::card::{RenderedCard, RewriteStatus};

pub const SYSTEM_PROMPT: &str =
    "Rewrite for playful horoscope tone. Keep all numbers and units unchanged.";

/// A candidate longer than this multiple of the original is rejected.
const MAX_GROWTH: usize = 4;

const NUMERIC_TOKEN: &str = r"\d+(\.\d+)?";

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("request timed out")]
    Timeout,
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("numeric token '{0}' missing from rewrite")]
    NumericViolation(String),
    #[error("value '{0}' missing from rewrite or its unit changed")]
    SlotViolation(String),
    #[error("rejected candidate: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for RewriteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RewriteError::Timeout
        } else if err.is_decode() {
            RewriteError::Malformed(err.to_string())
        } else {
            RewriteError::Http(err.to_string())
        }
    }
}

/// External paraphrasing collaborator. Called at most once per card.
pub trait Rewriter: Send + Sync {
    fn rewrite(&self, text: &str) -> Result<String, RewriteError>;
}

/// OpenAI-compatible chat completion client.
pub struct HttpRewriter {
    client: reqwest::blocking::Client,
    config: RewriteConfig,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

impl HttpRewriter {
    pub fn new(config: &RewriteConfig) -> Result<HttpRewriter, RewriteError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(HttpRewriter {
            client,
            config: config.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

impl Rewriter for HttpRewriter {
    fn rewrite(&self, text: &str) -> Result<String, RewriteError> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": text },
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let response: ChatResponse = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?;

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| RewriteError::Malformed("no choices".to_string()))?;

        // Some reasoning models leave content empty.
        [message.content, message.reasoning]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty())
            .ok_or_else(|| RewriteError::Malformed("empty completion".to_string()))
    }
}

/// Checks that a candidate keeps every rendered value of the original.
///
/// Values written by numeric slots (`9.1 bar`, `2.03:1`, `92.0°C`) must come
/// back verbatim, unit included. Any other digits in the original must come
/// back as bare numbers.
#[derive(Debug, Clone)]
pub struct NumericGuard {
    pattern: Regex,
}

impl NumericGuard {
    pub fn new() -> Result<NumericGuard, regex::Error> {
        Ok(NumericGuard {
            pattern: Regex::new(NUMERIC_TOKEN)?,
        })
    }

    /// Numeric tokens in order of appearance: `2.03:1` yields `2.03` and `1`.
    pub fn tokens<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.pattern.find_iter(text).map(|m| m.as_str()).collect()
    }

    /// `slots` are the numeric slot values the original was rendered with.
    pub fn check(
        &self,
        original: &str,
        candidate: &str,
        slots: &[String],
    ) -> Result<(), RewriteError> {
        if candidate.trim().is_empty() {
            return Err(RewriteError::Rejected("empty".to_string()));
        }
        if candidate.len() > original.len().max(1) * MAX_GROWTH {
            return Err(RewriteError::Rejected(format!(
                "{} bytes for a {} byte original",
                candidate.len(),
                original.len()
            )));
        }
        if let Some(slot) = slots.iter().find(|slot| !contains_value(candidate, slot)) {
            return Err(RewriteError::SlotViolation(slot.to_string()));
        }
        let kept: FxHashSet<&str> = self.tokens(candidate).into_iter().collect();
        match self.tokens(original).into_iter().find(|t| !kept.contains(t)) {
            Some(missing) => Err(RewriteError::NumericViolation(missing.to_string())),
            None => Ok(()),
        }
    }
}

/// `value` occurs in `text` as a whole value: `9.1 bar` is not found in
/// `19.1 bar` or `9.1 bars`.
fn contains_value(text: &str, value: &str) -> bool {
    text.match_indices(value).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + value.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_digit() || c == '.')
            && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Decorator over a rendered card: replaces the narrative with a checked
/// paraphrase or leaves the card exactly as rendered.
pub struct RewriteFilter {
    rewriter: Option<Box<dyn Rewriter>>,
    guard: NumericGuard,
}

impl RewriteFilter {
    pub fn new(rewriter: Option<Box<dyn Rewriter>>) -> Result<RewriteFilter, regex::Error> {
        Ok(RewriteFilter {
            rewriter,
            guard: NumericGuard::new()?,
        })
    }

    pub fn disabled() -> Result<RewriteFilter, regex::Error> {
        Self::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.rewriter.is_some()
    }

    /// `slots` are the numeric slot values of the card's narrative.
    pub fn apply(&self, mut card: RenderedCard, slots: &[String]) -> RenderedCard {
        let Some(rewriter) = self.rewriter.as_deref() else {
            card.metadata.rewrite = RewriteStatus::Skipped;
            return card;
        };

        let outcome = rewriter
            .rewrite(&card.narrative)
            .and_then(|candidate| {
                self.guard.check(&card.narrative, &candidate, slots)?;
                Ok(candidate)
            });

        match outcome {
            Ok(candidate) => {
                debug!(shot_id = %card.metadata.shot_id, "narrative rewritten");
                card.narrative = candidate;
                card.metadata.rewrite = RewriteStatus::Rewritten;
            }
            Err(err) => {
                warn!(
                    shot_id = %card.metadata.shot_id,
                    error = %err,
                    "rewrite discarded, keeping rendered narrative"
                );
                card.metadata.rewrite = RewriteStatus::Fallback(err.to_string());
            }
        }
        card
    }
}
