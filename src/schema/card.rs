use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// How serious a diagnostic outcome is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Neutral,
    Success,
    Warning,
    Error,
}

impl Severity {
    /// Returns the tag string for this severity (e.g., "severity:warning").
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Neutral => "severity:neutral",
            Self::Success => "severity:success",
            Self::Warning => "severity:warning",
            Self::Error => "severity:error",
        }
    }
}

/// Pre-formatted numeric snapshot. Every string comes from
/// `template::format_feature`, never from ad-hoc formatting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub ratio: String,
    pub time: String,
    pub peak_pressure: String,
    pub avg_temp: String,
    pub channeling: String,
}

/// What happened to the free-text slots after rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RewriteStatus {
    Skipped,
    Rewritten,
    Fallback(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardMetadata {
    pub shot_id: String,
    pub rule_id: String,
    pub severity: Severity,
    pub style_bank: String,
    pub variant: usize,
    /// The literal selection key string the card was seeded from.
    pub seed: String,
    pub rewrite: RewriteStatus,
}

/// A finished reading for one shot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedCard {
    pub icon: String,
    pub title: String,
    pub quote: String,
    pub snapshot: Snapshot,
    pub advice: Vec<String>,
    pub narrative: String,
    pub metadata: CardMetadata,
}

impl RenderedCard {
    /// Render the card as a Markdown section.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## {} {}\n", self.icon, self.title);
        let _ = writeln!(out, "**Shot ID:** {}  ", self.metadata.shot_id);
        let _ = writeln!(out, "**Mantra:** *{}*\n", self.quote);
        let _ = writeln!(out, "### Brew Snapshot");
        let _ = writeln!(out, "- **Ratio:** {}", self.snapshot.ratio);
        let _ = writeln!(out, "- **Time:** {}", self.snapshot.time);
        let _ = writeln!(out, "- **Peak Pressure:** {}", self.snapshot.peak_pressure);
        let _ = writeln!(out, "- **Temperature:** {}", self.snapshot.avg_temp);
        let _ = writeln!(out, "- **Channeling:** {}\n", self.snapshot.channeling);
        let _ = writeln!(out, "### Reading\n{}\n", self.narrative);
        let _ = writeln!(out, "### Brewing Wisdom");
        for line in &self.advice {
            let _ = writeln!(out, "- {}", line);
        }
        out.push_str("\n---\n\n");
        out
    }
}

/// Render a whole deck with a header, as written by the `cards` command.
pub fn deck_markdown(cards: &[RenderedCard]) -> String {
    let mut out = String::from("# Espresso Readings\n\n");
    let _ = writeln!(out, "*Generated from {} shot(s)*\n", cards.len());
    for card in cards {
        out.push_str(&card.to_markdown());
    }
    out
}
