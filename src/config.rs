//! Engine configuration and the load-time error type shared by every
//! configuration table (rules, styles, templates).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that overrides `rewrite.base_url`.
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("rule {rule}: unknown feature field '{field}'")]
    UnknownField { rule: String, field: String },
    #[error("rule {rule}: malformed bound on {field}: {reason}")]
    MalformedBound {
        rule: String,
        field: String,
        reason: String,
    },
    #[error("duplicate rule id: {0}")]
    DuplicateRule(String),
    #[error("template parse error in {context}: {reason}")]
    TemplateParse { context: String, reason: String },
    #[error("style bank not found: {0}")]
    UnknownStyleBank(String),
    #[error("style bank inheritance cycle through: {0}")]
    StyleCycle(String),
    #[error("style bank {bank}: template uses missing phrase bank '{phrase}'")]
    MissingPhraseBank { bank: String, phrase: String },
    #[error("style bank {bank}: outcome {outcome} has no variants")]
    EmptyVariants { bank: String, outcome: String },
    #[error("style bank {bank}: no variants for outcome {outcome} and no \"*\" fallback")]
    MissingOutcome { bank: String, outcome: String },
    #[error("invalid identity '{0}': expected MMDD")]
    InvalidIdentity(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for the optional paraphrasing collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:11434/v1".to_string(),
            model: "gpt-oss:20b".to_string(),
            timeout_secs: 30,
            temperature: 0.4,
            max_tokens: 2000,
        }
    }
}

/// Top-level engine configuration, usually read from `oracle.ron`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub rules_path: PathBuf,
    pub styles_path: PathBuf,
    pub style_bank: String,
    /// Birth date token in `MMDD` form.
    pub identity: String,
    pub use_time_bucket: bool,
    pub deck_size: usize,
    pub rewrite: RewriteConfig,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            rules_path: PathBuf::from("content/diagnostics.ron"),
            styles_path: PathBuf::from("content/styles.ron"),
            style_bank: "chill".to_string(),
            identity: "0101".to_string(),
            use_time_bucket: false,
            deck_size: 3,
            rewrite: RewriteConfig::default(),
        }
    }
}

impl OracleConfig {
    /// Load a config file and apply environment overrides.
    pub fn load_from_ron(path: &Path) -> Result<OracleConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse_ron(&contents)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn parse_ron(input: &str) -> Result<OracleConfig, ConfigError> {
        Ok(ron::from_str(input)?)
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.rewrite.base_url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identity(&self.identity)?;
        if self.style_bank.trim().is_empty() {
            return Err(ConfigError::Invalid("style_bank is empty".to_string()));
        }
        if self.rewrite.enabled && self.rewrite.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "rewrite.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Check an `MMDD` birth date token (month 01-12, day 01-31).
pub fn validate_identity(mmdd: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidIdentity(mmdd.to_string());
    if mmdd.len() != 4 || !mmdd.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let month: u32 = mmdd[..2].parse().map_err(|_| invalid())?;
    let day: u32 = mmdd[2..].parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = OracleConfig::parse_ron("()").unwrap();
        assert_eq!(config, OracleConfig::default());
        assert!(!config.rewrite.enabled);
    }

    #[test]
    fn partial_rewrite_section_keeps_other_defaults() {
        let config = OracleConfig::parse_ron(
            r#"(identity: "0802", rewrite: (enabled: true, timeout_secs: 5))"#,
        )
        .unwrap();
        assert_eq!(config.identity, "0802");
        assert!(config.rewrite.enabled);
        assert_eq!(config.rewrite.timeout_secs, 5);
        assert_eq!(config.rewrite.model, "gpt-oss:20b");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn identity_validation() {
        assert!(validate_identity("0802").is_ok());
        assert!(validate_identity("1231").is_ok());
        assert!(validate_identity("1300").is_err());
        assert!(validate_identity("0800").is_err());
        assert!(validate_identity("802").is_err());
        assert!(validate_identity("08a2").is_err());
    }

    #[test]
    fn zero_timeout_rejected_only_when_enabled() {
        let mut config = OracleConfig::default();
        config.rewrite.timeout_secs = 0;
        assert!(config.validate().is_ok());
        config.rewrite.enabled = true;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
