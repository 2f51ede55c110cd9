/// Card templates: parsing, numeric formatting, and slot filling.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::schema::features::{FeatureField, FeatureSet};

/// A segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateSegment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// Numeric slot bound to one feature: `{brew_ratio}`.
    Feature(FeatureField),
    /// Free-text slot drawn from a phrase bank: `{phrase:opener}`.
    Phrase(String),
}

/// A parsed template: a sequence of segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub segments: Vec<TemplateSegment>,
}

/// Render one feature value with its fixed precision and unit.
///
/// Every numeric string on a card, snapshot or prose, comes from here.
pub fn format_feature(field: FeatureField, value: f64) -> String {
    match field {
        FeatureField::BrewRatio => format!("{:.2}:1", value),
        FeatureField::ShotEnd => format!("{:.0}s", value),
        FeatureField::PeakPressure => format!("{:.1} bar", value),
        FeatureField::TempAvg | FeatureField::TempStd => format!("{:.1}°C", value),
        FeatureField::FlowAvg => format!("{:.2} ml/s", value),
        FeatureField::Channeling => format!("{:.2}", value),
        FeatureField::Preinfusion => format!("{:.1}s", value),
        FeatureField::FirstDrip => format!("{:.0}s", value),
    }
}

fn parse_error(input: &str, reason: &str) -> ConfigError {
    ConfigError::TemplateParse {
        context: input.to_string(),
        reason: reason.to_string(),
    }
}

impl Template {
    /// Parse a template string into a sequence of segments.
    ///
    /// Syntax:
    /// - `{feature_name}` → `Feature`, e.g. `{peak_pressure_bar}`
    /// - `{phrase:bank}` → `Phrase`
    /// - `{{` / `}}` → literal braces
    /// - Everything else → `Literal`
    pub fn parse(input: &str) -> Result<Template, ConfigError> {
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            if chars[i] == '{' {
                if i + 1 < len && chars[i + 1] == '{' {
                    literal_buf.push('{');
                    i += 2;
                    continue;
                }

                if !literal_buf.is_empty() {
                    segments.push(TemplateSegment::Literal(std::mem::take(&mut literal_buf)));
                }

                let start = i + 1;
                let mut end = start;
                while end < len && chars[end] != '}' {
                    if chars[end] == '{' {
                        return Err(parse_error(input, "nested braces are not allowed"));
                    }
                    end += 1;
                }
                if end == len {
                    return Err(parse_error(input, "unclosed brace"));
                }

                let content: String = chars[start..end].iter().collect();
                segments.push(Self::parse_segment(input, content.trim())?);
                i = end + 1;
            } else if chars[i] == '}' {
                if i + 1 < len && chars[i + 1] == '}' {
                    literal_buf.push('}');
                    i += 2;
                    continue;
                }
                return Err(parse_error(input, "unmatched closing brace"));
            } else {
                literal_buf.push(chars[i]);
                i += 1;
            }
        }

        if !literal_buf.is_empty() {
            segments.push(TemplateSegment::Literal(literal_buf));
        }

        Ok(Template { segments })
    }

    fn parse_segment(input: &str, content: &str) -> Result<TemplateSegment, ConfigError> {
        if content.is_empty() {
            return Err(parse_error(input, "empty braces"));
        }

        if let Some(bank) = content.strip_prefix("phrase:") {
            if bank.is_empty() {
                return Err(parse_error(input, "empty phrase bank name"));
            }
            return Ok(TemplateSegment::Phrase(bank.to_string()));
        }

        content
            .parse::<FeatureField>()
            .map(TemplateSegment::Feature)
            .map_err(|name| parse_error(input, &format!("unknown feature '{}'", name)))
    }

    /// Phrase banks this template draws from, in order of appearance.
    pub fn phrase_banks(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|seg| match seg {
            TemplateSegment::Phrase(bank) => Some(bank.as_str()),
            _ => None,
        })
    }

    /// The formatted value of every numeric slot, in order, exactly as
    /// `render` writes it.
    pub fn numeric_slots(&self, features: &FeatureSet) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(|seg| match seg {
                TemplateSegment::Feature(field) => {
                    Some(format_feature(*field, features.get(*field)))
                }
                _ => None,
            })
            .collect()
    }

    /// Fill every slot. `phrase` is called once per phrase slot with the bank
    /// name and the slot's position among phrase slots.
    pub fn render<'p, F>(&self, features: &FeatureSet, mut phrase: F) -> String
    where
        F: FnMut(&str, usize) -> &'p str,
    {
        let mut out = String::new();
        let mut phrase_pos = 0;
        for seg in &self.segments {
            match seg {
                TemplateSegment::Literal(text) => out.push_str(text),
                TemplateSegment::Feature(field) => {
                    out.push_str(&format_feature(*field, features.get(*field)))
                }
                TemplateSegment::Phrase(bank) => {
                    out.push_str(phrase(bank.as_str(), phrase_pos));
                    phrase_pos += 1;
                }
            }
        }
        out
    }
}
