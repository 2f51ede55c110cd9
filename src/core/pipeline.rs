/// The reading pipeline: ShotRecord → RenderedCard orchestration.
///
/// Wires together feature extraction, rule matching, deterministic
/// selection, template rendering, and the optional rewrite pass.

use chrono::NaiveDateTime;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, OracleConfig};
use crate::core::extract::{extract_features, InputError};
use crate::core::render::{narrative_values, render_card};
use crate::core::rewrite::{HttpRewriter, RewriteFilter, Rewriter};
use crate::core::rules::RuleSet;
use crate::core::selector::{self, SelectionKey};
use crate::core::style::{ResolvedStyle, StyleRegistry};
use crate::schema::card::{RenderedCard, RewriteStatus};
use crate::schema::shot::ShotRecord;

/// Why one record produced no card. Other records are unaffected.
#[derive(Debug, Error)]
pub enum ReadingError {
    #[error("shot {shot_id}: {source}")]
    Input {
        shot_id: String,
        #[source]
        source: InputError,
    },
    #[error("shot {shot_id}: {source}")]
    Style {
        shot_id: String,
        #[source]
        source: ConfigError,
    },
}

impl ReadingError {
    pub fn shot_id(&self) -> &str {
        match self {
            Self::Input { shot_id, .. } | Self::Style { shot_id, .. } => shot_id,
        }
    }
}

/// Per-record progress, emitted as debug events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Extracting,
    Matching,
    Selecting,
    Rendering,
    RewritePending,
    Rewritten,
    RewriteSkipped,
    Done,
}

fn enter(shot_id: &str, stage: Stage) {
    debug!(shot_id, ?stage, "stage");
}

/// The top-level reading engine. Built via `OracleEngine::builder()`.
///
/// Holds only immutable tables, so one engine can serve many threads.
pub struct OracleEngine {
    config: OracleConfig,
    rules: RuleSet,
    style: ResolvedStyle,
    rewrite: RewriteFilter,
}

/// Builder for constructing an `OracleEngine`.
pub struct OracleEngineBuilder {
    config: OracleConfig,
    /// Directly provided rules (for testing without files).
    rules: Option<RuleSet>,
    /// Directly provided styles (for testing without files).
    styles: Option<StyleRegistry>,
    /// Directly provided rewriter; takes precedence over `rewrite.enabled`.
    rewriter: Option<Box<dyn Rewriter>>,
}

impl OracleEngine {
    pub fn builder() -> OracleEngineBuilder {
        OracleEngineBuilder {
            config: OracleConfig::default(),
            rules: None,
            styles: None,
            rewriter: None,
        }
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn style(&self) -> &ResolvedStyle {
        &self.style
    }

    /// Selection key for one record: identity, record id, date (and time
    /// bucket when configured), style bank.
    pub fn selection_key(&self, shot_id: &str, at: NaiveDateTime) -> SelectionKey {
        SelectionKey::new()
            .identity(self.config.identity.as_str())
            .content(shot_id)
            .at(at, self.config.use_time_bucket)
            .bank(self.style.name.as_str())
    }

    /// Produce the card for one record. Either the whole card is returned or
    /// an error naming the record.
    pub fn read(&self, shot: &ShotRecord, at: NaiveDateTime) -> Result<RenderedCard, ReadingError> {
        let shot_id = shot.id();
        enter(shot_id, Stage::Idle);

        enter(shot_id, Stage::Extracting);
        let features = extract_features(shot).map_err(|source| ReadingError::Input {
            shot_id: shot_id.to_string(),
            source,
        })?;

        enter(shot_id, Stage::Matching);
        let rule = self.rules.evaluate(&features);
        debug!(shot_id, rule = %rule.id, "matched");

        enter(shot_id, Stage::Selecting);
        let key = self.selection_key(shot_id, at);

        enter(shot_id, Stage::Rendering);
        let card = render_card(&features, rule, &self.style, &key).map_err(|source| {
            ReadingError::Style {
                shot_id: shot_id.to_string(),
                source,
            }
        })?;

        let values = if self.rewrite.is_enabled() {
            enter(shot_id, Stage::RewritePending);
            narrative_values(&features, &self.style, &card)
        } else {
            Vec::new()
        };
        let card = self.rewrite.apply(card, &values);
        match card.metadata.rewrite {
            RewriteStatus::Rewritten => enter(shot_id, Stage::Rewritten),
            _ => enter(shot_id, Stage::RewriteSkipped),
        }

        enter(shot_id, Stage::Done);
        Ok(card)
    }

    /// Read many records in parallel. Results keep input order.
    pub fn read_batch(
        &self,
        shots: &[ShotRecord],
        at: NaiveDateTime,
    ) -> Vec<Result<RenderedCard, ReadingError>> {
        let results: Vec<_> = shots.par_iter().map(|shot| self.read(shot, at)).collect();
        log_summary(&results);
        results
    }

    /// Pick `deck_size` records from a palette for an identity. A time
    /// variant (e.g. a date or "morning") changes the pick.
    pub fn pick_deck<'s>(
        &self,
        palette: &'s [ShotRecord],
        identity: &str,
        time_variant: Option<&str>,
    ) -> Vec<&'s ShotRecord> {
        let mut key = SelectionKey::new().identity(identity);
        if let Some(variant) = time_variant {
            key = key.date_token(variant);
        }
        let picked = selector::select(&key, palette.len(), self.config.deck_size);
        debug!(key = %key, ?picked, "deck picked");
        picked.into_iter().map(|i| &palette[i]).collect()
    }

    /// Pick a deck for the configured identity and read it.
    pub fn read_deck(
        &self,
        palette: &[ShotRecord],
        at: NaiveDateTime,
        time_variant: Option<&str>,
    ) -> Vec<Result<RenderedCard, ReadingError>> {
        let deck = self.pick_deck(palette, &self.config.identity, time_variant);
        let results: Vec<_> = deck.par_iter().map(|shot| self.read(shot, at)).collect();
        log_summary(&results);
        results
    }
}

fn log_summary(results: &[Result<RenderedCard, ReadingError>]) {
    let failed = results.iter().filter(|r| r.is_err()).count();
    info!(
        total = results.len(),
        failed,
        "batch read complete"
    );
}

impl OracleEngineBuilder {
    pub fn config(mut self, config: OracleConfig) -> Self {
        self.config = config;
        self
    }

    /// Provide rules directly (for testing without files).
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Provide styles directly (for testing without files).
    pub fn with_styles(mut self, styles: StyleRegistry) -> Self {
        self.styles = Some(styles);
        self
    }

    pub fn with_rewriter(mut self, rewriter: Box<dyn Rewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// Load and validate every table. Any problem surfaces here, before a
    /// single record is read.
    pub fn build(self) -> Result<OracleEngine, ConfigError> {
        let config = self.config;
        config.validate()?;

        let rules = match self.rules {
            Some(rules) => rules,
            None => RuleSet::load_from_ron(&config.rules_path)?,
        };
        let styles = match self.styles {
            Some(styles) => styles,
            None => {
                let mut registry = StyleRegistry::new();
                registry.load_from_ron(&config.styles_path)?;
                registry
            }
        };
        styles.validate_all()?;

        let style = styles.resolve(&config.style_bank)?;
        for outcome in rules.outcome_ids() {
            if style.variants(outcome).is_none() {
                return Err(ConfigError::MissingOutcome {
                    bank: style.name.clone(),
                    outcome: outcome.to_string(),
                });
            }
        }

        let rewriter = match self.rewriter {
            Some(rewriter) => Some(rewriter),
            None if config.rewrite.enabled => {
                let client = HttpRewriter::new(&config.rewrite)
                    .map_err(|e| ConfigError::Invalid(format!("rewrite client: {}", e)))?;
                Some(Box::new(client) as Box<dyn Rewriter>)
            }
            None => None,
        };
        let rewrite = RewriteFilter::new(rewriter)
            .map_err(|e| ConfigError::Invalid(format!("numeric guard: {}", e)))?;

        info!(
            rules = rules.rules.len(),
            bank = %style.name,
            rewrite = rewrite.is_enabled(),
            "engine ready"
        );

        Ok(OracleEngine {
            config,
            rules,
            style,
            rewrite,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const RULES: &str = r#"#![enable(implicit_some)]
    (
        rules: [
            (
                id: "fast",
                severity: warning,
                when: [(field: "shot_end_s", max: 20.0, max_exclusive: true)],
                advice: ["Grind finer."],
            ),
        ],
        nominal: (id: "nominal", advice: ["Carry on."]),
    )"#;

    const STYLES: &str = r#"(
        banks: [(
            name: "chill",
            phrases: { "opener": ["Hm.", "Ah."] },
            outcomes: {
                "*": [(icon: "cup", title: "Reading", quote: "Brew on.",
                       narrative: "{phrase:opener} {shot_end_s} of flow.")],
            },
        )],
    )"#;

    fn engine() -> OracleEngine {
        let mut styles = StyleRegistry::new();
        styles.load_from_str(STYLES).unwrap();
        OracleEngine::builder()
            .with_rules(RuleSet::parse_ron(RULES).unwrap())
            .with_styles(styles)
            .build()
            .unwrap()
    }

    fn shot(id: &str, end: f64) -> ShotRecord {
        ShotRecord {
            shot_id: Some(id.to_string()),
            timestamp: "2024-12-01T08:00:00".to_string(),
            target_mass_g: 36.0,
            dose_g: Some(18.0),
            brew_ratio: None,
            pressure_bar: vec![2.0, 9.0, 9.0, 8.5],
            flow_ml_s: vec![0.5, 1.5, 1.6, 1.5],
            temp_c: vec![92.0, 92.0, 92.0, 92.0],
            pump_pct: vec![40.0, 90.0, 90.0, 85.0],
            preinfusion_ms: 3000.0,
            first_drip_s: 5.0,
            shot_end_s: end,
        }
    }

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn reads_a_record() {
        let card = engine().read(&shot("s1", 18.0), at()).unwrap();
        assert_eq!(card.metadata.rule_id, "fast");
        assert_eq!(card.snapshot.time, "18s");
        assert!(card.narrative.ends_with("18s of flow."));
        assert_eq!(card.metadata.rewrite, RewriteStatus::Skipped);
    }

    #[test]
    fn bad_record_names_itself() {
        let mut bad = shot("broken", 28.0);
        bad.flow_ml_s.pop();
        let err = engine().read(&bad, at()).unwrap_err();
        assert_eq!(err.shot_id(), "broken");
        assert!(matches!(err, ReadingError::Input { .. }));
    }

    #[test]
    fn unknown_bank_fails_build() {
        let mut styles = StyleRegistry::new();
        styles.load_from_str(STYLES).unwrap();
        let config = OracleConfig {
            style_bank: "nerdy".to_string(),
            ..OracleConfig::default()
        };
        let result = OracleEngine::builder()
            .config(config)
            .with_rules(RuleSet::parse_ron(RULES).unwrap())
            .with_styles(styles)
            .build();
        assert!(matches!(result, Err(ConfigError::UnknownStyleBank(_))));
    }

    #[test]
    fn deck_size_bounds_pick() {
        let engine = engine();
        let palette: Vec<_> = (0..10).map(|i| shot(&format!("p{}", i), 28.0)).collect();
        let deck = engine.pick_deck(&palette, "1007", None);
        assert_eq!(deck.len(), 3);
        let again = engine.pick_deck(&palette, "1007", None);
        let ids: Vec<_> = deck.iter().map(|s| s.id()).collect();
        let ids_again: Vec<_> = again.iter().map(|s| s.id()).collect();
        assert_eq!(ids, ids_again);
        assert_eq!(engine.pick_deck(&palette[..2], "1007", None).len(), 2);
    }
}
