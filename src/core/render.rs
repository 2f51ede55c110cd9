use crate::config::ConfigError;
use crate::core::rules::DiagnosticRule;
use crate::core::selector::{self, SelectionKey};
use crate::core::style::ResolvedStyle;
use crate::core::template::format_feature;
use crate::schema::card::{CardMetadata, RenderedCard, RewriteStatus, Snapshot};
use crate::schema::features::{FeatureField, FeatureSet};

/// Numeric snapshot shown on every card.
pub fn snapshot(features: &FeatureSet) -> Snapshot {
    Snapshot {
        ratio: format_feature(FeatureField::BrewRatio, features.brew_ratio),
        time: format_feature(FeatureField::ShotEnd, features.shot_end_s),
        peak_pressure: format_feature(FeatureField::PeakPressure, features.peak_pressure_bar),
        avg_temp: format_feature(FeatureField::TempAvg, features.temp_avg_c),
        channeling: format_feature(FeatureField::Channeling, features.channeling_score_0_1),
    }
}

/// Assemble the card for one matched rule.
///
/// `key` must already carry identity, content, date and bank tokens. The
/// variant is drawn with `key` itself; each phrase slot draws with `key`
/// extended by `bank#position`, so two slots on one bank can differ.
pub fn render_card(
    features: &FeatureSet,
    rule: &DiagnosticRule,
    style: &ResolvedStyle,
    key: &SelectionKey,
) -> Result<RenderedCard, ConfigError> {
    let missing = || ConfigError::MissingOutcome {
        bank: style.name.clone(),
        outcome: rule.id.clone(),
    };
    let variants = style.variants(&rule.id).ok_or_else(missing)?;
    let index = selector::select_one(key, variants.len()).ok_or_else(missing)?;
    let variant = &variants[index];

    let narrative = variant.narrative.render(features, |bank, pos| {
        let pool = style.phrases(bank);
        selector::select_one(&key.slot(format!("{}#{}", bank, pos)), pool.len())
            .map(|i| pool[i].as_str())
            .unwrap_or("")
    });

    Ok(RenderedCard {
        icon: variant.icon.clone(),
        title: variant.title.clone(),
        quote: variant.quote.clone(),
        snapshot: snapshot(features),
        advice: rule.advice.clone(),
        narrative,
        metadata: CardMetadata {
            shot_id: features.shot_id.clone(),
            rule_id: rule.id.clone(),
            severity: rule.severity,
            style_bank: style.name.clone(),
            variant: index,
            seed: key.to_string(),
            rewrite: RewriteStatus::Skipped,
        },
    })
}

/// Numeric slot values the card's narrative was rendered with.
pub fn narrative_values(
    features: &FeatureSet,
    style: &ResolvedStyle,
    card: &RenderedCard,
) -> Vec<String> {
    style
        .variants(&card.metadata.rule_id)
        .and_then(|variants| variants.get(card.metadata.variant))
        .map(|variant| variant.narrative.numeric_slots(features))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::style::StyleRegistry;
    use crate::schema::card::Severity;

    const STYLES: &str = r#"(
        banks: [(
            name: "chill",
            phrases: {
                "opener": ["Easy now.", "Deep breath.", "Slow sip."],
            },
            outcomes: {
                "*": [
                    (icon: "cup", title: "Reading", quote: "Brew on.",
                     narrative: "{phrase:opener} {brew_ratio} in {shot_end_s}."),
                    (icon: "moon", title: "Night Reading", quote: "Rest.",
                     narrative: "{phrase:opener} {peak_pressure_bar} at peak. {phrase:opener}"),
                ],
            },
        )],
    )"#;

    fn style() -> ResolvedStyle {
        let mut reg = StyleRegistry::new();
        reg.load_from_str(STYLES).unwrap();
        reg.resolve("chill").unwrap()
    }

    fn features() -> FeatureSet {
        FeatureSet {
            shot_id: "shot-7".to_string(),
            brew_ratio: 2.03,
            peak_pressure_bar: 9.1,
            shot_end_s: 29.0,
            temp_avg_c: 92.0,
            temp_std_c: 0.3,
            flow_avg_ml_s: 1.3,
            channeling_score_0_1: 0.04,
            preinfusion_s: 3.0,
            first_drip_s: 5.0,
        }
    }

    fn rule() -> DiagnosticRule {
        DiagnosticRule {
            id: "sweet_spot".to_string(),
            severity: Severity::Success,
            when: Vec::new(),
            advice: vec!["Keep the grind.".to_string(), "Note the bean.".to_string()],
        }
    }

    fn key() -> SelectionKey {
        SelectionKey::new()
            .identity("1007")
            .content("shot-7")
            .date_token("20241201")
            .bank("chill")
    }

    #[test]
    fn card_carries_snapshot_advice_and_seed() {
        let card = render_card(&features(), &rule(), &style(), &key()).unwrap();
        assert_eq!(card.snapshot.ratio, "2.03:1");
        assert_eq!(card.snapshot.time, "29s");
        assert_eq!(card.snapshot.peak_pressure, "9.1 bar");
        assert_eq!(card.snapshot.avg_temp, "92.0°C");
        assert_eq!(card.snapshot.channeling, "0.04");
        assert_eq!(card.advice, rule().advice);
        assert_eq!(card.metadata.rule_id, "sweet_spot");
        assert_eq!(card.metadata.severity, Severity::Success);
        assert_eq!(
            card.metadata.seed,
            "identity=1007|content=shot-7|date=20241201|bank=chill"
        );
    }

    #[test]
    fn rendering_is_repeatable() {
        let a = render_card(&features(), &rule(), &style(), &key()).unwrap();
        let b = render_card(&features(), &rule(), &style(), &key()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn narrative_numbers_match_snapshot_formatting() {
        let card = render_card(&features(), &rule(), &style(), &key()).unwrap();
        let expected = if card.metadata.variant == 0 { "2.03:1" } else { "9.1 bar" };
        assert!(card.narrative.contains(expected), "{}", card.narrative);
    }

    #[test]
    fn narrative_values_come_from_the_drawn_variant() {
        let card = render_card(&features(), &rule(), &style(), &key()).unwrap();
        let values = narrative_values(&features(), &style(), &card);
        let expected = if card.metadata.variant == 0 {
            vec!["2.03:1", "29s"]
        } else {
            vec!["9.1 bar"]
        };
        assert_eq!(values, expected);
        for value in &values {
            assert!(card.narrative.contains(value.as_str()));
        }
    }

    #[test]
    fn missing_outcome_without_fallback_is_error() {
        let mut reg = StyleRegistry::new();
        reg.load_from_str(r#"(banks: [(name: "bare")])"#).unwrap();
        let bare = reg.resolve("bare").unwrap();
        assert!(matches!(
            render_card(&features(), &rule(), &bare, &key()),
            Err(ConfigError::MissingOutcome { .. })
        ));
    }
}
