//! Diagnostic rules: ordered threshold predicates over a FeatureSet.
//!
//! Rules are evaluated top to bottom and the first rule whose bounds all hold
//! wins. When nothing matches, the nominal outcome is returned.

use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::path::Path;

use crate::config::ConfigError;
use crate::schema::card::Severity;
use crate::schema::features::{FeatureField, FeatureSet};

/// One side of a bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit {
    pub value: f64,
    pub inclusive: bool,
}

/// A range check on one feature field.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub field: FeatureField,
    pub min: Option<Limit>,
    pub max: Option<Limit>,
}

impl Bound {
    pub fn admits(&self, value: f64) -> bool {
        let above_min = match self.min {
            Some(Limit { value: min, inclusive: true }) => value >= min,
            Some(Limit { value: min, inclusive: false }) => value > min,
            None => true,
        };
        let below_max = match self.max {
            Some(Limit { value: max, inclusive: true }) => value <= max,
            Some(Limit { value: max, inclusive: false }) => value < max,
            None => true,
        };
        above_min && below_max
    }
}

/// A named, ordered predicate with its severity and advice.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticRule {
    pub id: String,
    pub severity: Severity,
    pub when: Vec<Bound>,
    pub advice: Vec<String>,
}

impl DiagnosticRule {
    pub fn matches(&self, features: &FeatureSet) -> bool {
        self.when
            .iter()
            .all(|bound| bound.admits(features.get(bound.field)))
    }

    /// The region this rule accepts on `field`, intersected over its bounds.
    fn interval(&self, field: FeatureField) -> Interval {
        self.when
            .iter()
            .filter(|b| b.field == field)
            .fold(Interval::FULL, |acc, b| acc.intersect(b))
    }
}

/// The full ordered rule table plus its nominal fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    pub rules: Vec<DiagnosticRule>,
    pub nominal: DiagnosticRule,
}

// RON shape: field names are plain strings here and validated into
// FeatureField so that a typo surfaces as a ConfigError naming the rule.

#[derive(Debug, Deserialize)]
struct RonBound {
    field: String,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
    #[serde(default)]
    min_exclusive: bool,
    #[serde(default)]
    max_exclusive: bool,
}

#[derive(Debug, Deserialize)]
struct RonRule {
    id: String,
    severity: Severity,
    #[serde(default)]
    when: Vec<RonBound>,
    #[serde(default)]
    advice: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RonNominal {
    #[serde(default = "default_nominal_id")]
    id: String,
    #[serde(default)]
    advice: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RonRuleSet {
    rules: Vec<RonRule>,
    #[serde(default)]
    nominal: Option<RonNominal>,
}

fn default_nominal_id() -> String {
    "nominal".to_string()
}

impl RuleSet {
    /// Load a rule table from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<RuleSet, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse and validate a rule table from a RON string.
    pub fn parse_ron(input: &str) -> Result<RuleSet, ConfigError> {
        let raw: RonRuleSet = ron::from_str(input)?;

        let mut seen = FxHashSet::default();
        let mut rules = Vec::with_capacity(raw.rules.len());
        for ron_rule in raw.rules {
            if !seen.insert(ron_rule.id.clone()) {
                return Err(ConfigError::DuplicateRule(ron_rule.id));
            }
            let when = ron_rule
                .when
                .into_iter()
                .map(|b| validate_bound(&ron_rule.id, b))
                .collect::<Result<Vec<_>, _>>()?;
            rules.push(DiagnosticRule {
                id: ron_rule.id,
                severity: ron_rule.severity,
                when,
                advice: ron_rule.advice,
            });
        }

        let nominal = raw.nominal.unwrap_or(RonNominal {
            id: default_nominal_id(),
            advice: Vec::new(),
        });
        if seen.contains(&nominal.id) {
            return Err(ConfigError::DuplicateRule(nominal.id));
        }

        Ok(RuleSet {
            rules,
            nominal: DiagnosticRule {
                id: nominal.id,
                severity: Severity::Neutral,
                when: Vec::new(),
                advice: nominal.advice,
            },
        })
    }

    /// First matching rule in declaration order, else the nominal outcome.
    pub fn evaluate(&self, features: &FeatureSet) -> &DiagnosticRule {
        self.rules
            .iter()
            .find(|rule| rule.matches(features))
            .unwrap_or(&self.nominal)
    }

    /// Every matching rule in declaration order. Diagnostic only.
    pub fn matches_all(&self, features: &FeatureSet) -> Vec<&DiagnosticRule> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(features))
            .collect()
    }

    /// All outcome ids, nominal last.
    pub fn outcome_ids(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .chain(std::iter::once(&self.nominal))
            .map(|r| r.id.as_str())
    }

    /// Pairs of (later, earlier) where the earlier rule accepts every
    /// feature set the later one does, so the later rule never fires.
    pub fn shadowed_rules(&self) -> Vec<(&str, &str)> {
        let mut shadowed = Vec::new();
        for (i, later) in self.rules.iter().enumerate() {
            if let Some(earlier) = self.rules[..i].iter().find(|earlier| {
                FeatureField::ALL
                    .iter()
                    .all(|&f| earlier.interval(f).contains(&later.interval(f)))
            }) {
                shadowed.push((later.id.as_str(), earlier.id.as_str()));
            }
        }
        shadowed
    }
}

fn validate_bound(rule: &str, raw: RonBound) -> Result<Bound, ConfigError> {
    let field: FeatureField = raw.field.parse().map_err(|field| ConfigError::UnknownField {
        rule: rule.to_string(),
        field,
    })?;
    let malformed = |reason: &str| ConfigError::MalformedBound {
        rule: rule.to_string(),
        field: field.name().to_string(),
        reason: reason.to_string(),
    };

    if raw.min.is_none() && raw.max.is_none() {
        return Err(malformed("needs min or max"));
    }
    if raw.min.is_some_and(|v| !v.is_finite()) || raw.max.is_some_and(|v| !v.is_finite()) {
        return Err(malformed("limits must be finite"));
    }
    if let (Some(min), Some(max)) = (raw.min, raw.max) {
        let exclusive = raw.min_exclusive || raw.max_exclusive;
        if min > max || (min == max && exclusive) {
            return Err(malformed("empty range"));
        }
    }

    Ok(Bound {
        field,
        min: raw.min.map(|value| Limit {
            value,
            inclusive: !raw.min_exclusive,
        }),
        max: raw.max.map(|value| Limit {
            value,
            inclusive: !raw.max_exclusive,
        }),
    })
}

/// Accepted range on one field; used only for shadowing analysis.
#[derive(Debug, Clone, Copy)]
struct Interval {
    lo: Limit,
    hi: Limit,
}

impl Interval {
    const FULL: Interval = Interval {
        lo: Limit {
            value: f64::NEG_INFINITY,
            inclusive: true,
        },
        hi: Limit {
            value: f64::INFINITY,
            inclusive: true,
        },
    };

    fn intersect(self, bound: &Bound) -> Interval {
        let lo = match bound.min {
            Some(min) if min.value > self.lo.value => min,
            Some(min) if min.value == self.lo.value => Limit {
                value: min.value,
                inclusive: min.inclusive && self.lo.inclusive,
            },
            _ => self.lo,
        };
        let hi = match bound.max {
            Some(max) if max.value < self.hi.value => max,
            Some(max) if max.value == self.hi.value => Limit {
                value: max.value,
                inclusive: max.inclusive && self.hi.inclusive,
            },
            _ => self.hi,
        };
        Interval { lo, hi }
    }

    fn contains(&self, other: &Interval) -> bool {
        let lo_ok = self.lo.value < other.lo.value
            || (self.lo.value == other.lo.value && (self.lo.inclusive || !other.lo.inclusive));
        let hi_ok = self.hi.value > other.hi.value
            || (self.hi.value == other.hi.value && (self.hi.inclusive || !other.hi.inclusive));
        lo_ok && hi_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"#![enable(implicit_some)]
    (
        rules: [
            (
                id: "choking_high_resistance",
                severity: error,
                when: [
                    (field: "peak_pressure_bar", min: 10.5),
                    (field: "shot_end_s", min: 32.0),
                ],
                advice: ["Grind coarser."],
            ),
            (
                id: "channeling_instability",
                severity: warning,
                when: [(field: "channeling_score_0_1", min: 0.2)],
                advice: ["Distribute evenly.", "Tamp level."],
            ),
            (
                id: "sweet_spot",
                severity: success,
                when: [
                    (field: "brew_ratio", min: 1.8, max: 2.5),
                    (field: "shot_end_s", min: 24.0, max: 34.0),
                ],
                advice: ["Repeat it."],
            ),
        ],
        nominal: (id: "steady", advice: ["Keep logging."]),
    )"#;

    fn features(ratio: f64, time: f64, peak: f64, channeling: f64) -> FeatureSet {
        FeatureSet {
            shot_id: "t".to_string(),
            brew_ratio: ratio,
            peak_pressure_bar: peak,
            shot_end_s: time,
            temp_avg_c: 92.0,
            temp_std_c: 0.2,
            flow_avg_ml_s: 1.4,
            channeling_score_0_1: channeling,
            preinfusion_s: 3.0,
            first_drip_s: 4.0,
        }
    }

    #[test]
    fn loads_rules_in_declaration_order() {
        let rs = RuleSet::parse_ron(RULES).unwrap();
        let ids: Vec<_> = rs.outcome_ids().collect();
        assert_eq!(
            ids,
            vec!["choking_high_resistance", "channeling_instability", "sweet_spot", "steady"]
        );
        assert_eq!(rs.nominal.severity, Severity::Neutral);
    }

    #[test]
    fn first_declared_match_wins_over_better_fit() {
        let rs = RuleSet::parse_ron(RULES).unwrap();
        // matches both channeling (barely) and sweet_spot (squarely)
        let fs = features(2.0, 29.0, 9.0, 0.2);
        assert_eq!(rs.matches_all(&fs).len(), 2);
        assert_eq!(rs.evaluate(&fs).id, "channeling_instability");
    }

    #[test]
    fn falls_back_to_nominal() {
        let rs = RuleSet::parse_ron(RULES).unwrap();
        let fs = features(3.0, 50.0, 9.0, 0.0);
        let outcome = rs.evaluate(&fs);
        assert_eq!(outcome.id, "steady");
        assert_eq!(outcome.severity, Severity::Neutral);
    }

    #[test]
    fn exclusive_bounds() {
        let bound = Bound {
            field: FeatureField::ShotEnd,
            min: Some(Limit { value: 20.0, inclusive: false }),
            max: Some(Limit { value: 30.0, inclusive: true }),
        };
        assert!(!bound.admits(20.0));
        assert!(bound.admits(20.5));
        assert!(bound.admits(30.0));
        assert!(!bound.admits(30.1));
    }

    #[test]
    fn unknown_field_is_config_error() {
        let err = RuleSet::parse_ron(
            r#"(rules: [(id: "x", severity: warning, when: [(field: "grind", min: Some(1.0))])])"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownField { ref field, .. } if field == "grind"));
    }

    #[test]
    fn malformed_bounds_are_config_errors() {
        for when in [
            r#"(field: "shot_end_s")"#,
            r#"(field: "shot_end_s", min: Some(30.0), max: Some(20.0))"#,
            r#"(field: "shot_end_s", min: Some(20.0), max: Some(20.0), max_exclusive: true)"#,
        ] {
            let input = format!(r#"(rules: [(id: "x", severity: warning, when: [{}])])"#, when);
            assert!(
                matches!(RuleSet::parse_ron(&input), Err(ConfigError::MalformedBound { .. })),
                "expected malformed bound for {}",
                when
            );
        }
    }

    #[test]
    fn duplicate_ids_rejected() {
        let input = r#"(rules: [
            (id: "a", severity: warning, when: []),
            (id: "a", severity: error, when: []),
        ])"#;
        assert!(matches!(
            RuleSet::parse_ron(input),
            Err(ConfigError::DuplicateRule(ref id)) if id == "a"
        ));
    }

    #[test]
    fn default_nominal_when_omitted() {
        let rs = RuleSet::parse_ron(r#"(rules: [])"#).unwrap();
        assert_eq!(rs.nominal.id, "nominal");
        assert!(rs.nominal.advice.is_empty());
    }

    #[test]
    fn detects_shadowed_rules() {
        let input = r#"#![enable(implicit_some)]
        (rules: [
            (id: "slow", severity: warning, when: [(field: "shot_end_s", min: 35.0)]),
            (id: "very_slow", severity: error, when: [
                (field: "shot_end_s", min: 45.0),
                (field: "brew_ratio", max: 3.0),
            ]),
            (id: "fast", severity: warning, when: [(field: "shot_end_s", max: 20.0)]),
        ])"#;
        let rs = RuleSet::parse_ron(input).unwrap();
        assert_eq!(rs.shadowed_rules(), vec![("very_slow", "slow")]);
    }

    #[test]
    fn sample_rules_have_no_shadowing() {
        let rs = RuleSet::parse_ron(RULES).unwrap();
        assert!(rs.shadowed_rules().is_empty());
    }
}
