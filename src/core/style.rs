/// Style banks: phrase pools and per-outcome card variants that give a
/// reading its voice.
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::config::ConfigError;
use crate::core::template::Template;

/// Outcome key used when a bank has no entry for a specific rule.
pub const FALLBACK_OUTCOME: &str = "*";

/// One way of presenting an outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub icon: String,
    pub title: String,
    pub quote: String,
    pub narrative: Template,
}

/// A style bank as declared, before inheritance is applied.
#[derive(Debug, Clone)]
pub struct StyleBank {
    pub name: String,
    pub parent: Option<String>,
    pub phrases: HashMap<String, Vec<String>>,
    pub outcomes: HashMap<String, Vec<Variant>>,
}

/// A bank with its inheritance chain merged. Child entries replace parent
/// entries with the same key; nothing is merged inside a single entry.
#[derive(Debug, Clone)]
pub struct ResolvedStyle {
    pub name: String,
    pub phrases: HashMap<String, Vec<String>>,
    pub outcomes: HashMap<String, Vec<Variant>>,
}

impl ResolvedStyle {
    /// Variants for a rule id, falling back to the `"*"` entry.
    pub fn variants(&self, rule_id: &str) -> Option<&[Variant]> {
        self.outcomes
            .get(rule_id)
            .or_else(|| self.outcomes.get(FALLBACK_OUTCOME))
            .map(Vec::as_slice)
    }

    pub fn phrases(&self, bank: &str) -> &[String] {
        self.phrases.get(bank).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every template's phrase slots resolve to a non-empty phrase bank and
    /// every outcome has at least one variant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (outcome, variants) in &self.outcomes {
            if variants.is_empty() {
                return Err(ConfigError::EmptyVariants {
                    bank: self.name.clone(),
                    outcome: outcome.clone(),
                });
            }
            for variant in variants {
                for phrase in variant.narrative.phrase_banks() {
                    if self.phrases(phrase).is_empty() {
                        return Err(ConfigError::MissingPhraseBank {
                            bank: self.name.clone(),
                            phrase: phrase.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Registry of all loaded style banks with inheritance resolution.
#[derive(Debug, Clone, Default)]
pub struct StyleRegistry {
    banks: FxHashMap<String, StyleBank>,
}

// RON shape; narratives arrive as strings and are parsed into templates.

#[derive(Debug, Deserialize)]
struct RonVariant {
    icon: String,
    title: String,
    quote: String,
    narrative: String,
}

#[derive(Debug, Deserialize)]
struct RonBank {
    name: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    phrases: HashMap<String, Vec<String>>,
    #[serde(default)]
    outcomes: HashMap<String, Vec<RonVariant>>,
}

#[derive(Debug, Deserialize)]
struct RonStyles {
    banks: Vec<RonBank>,
}

impl StyleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, bank: StyleBank) {
        self.banks.insert(bank.name.clone(), bank);
    }

    pub fn get(&self, name: &str) -> Option<&StyleBank> {
        self.banks.get(name)
    }

    /// Bank names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.banks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Load banks from a RON file, adding to (and overriding) what is loaded.
    pub fn load_from_ron(&mut self, path: &Path) -> Result<(), ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        self.load_from_str(&contents)
    }

    pub fn load_from_str(&mut self, input: &str) -> Result<(), ConfigError> {
        let raw: RonStyles = ron::from_str(input)?;
        for bank in raw.banks {
            let mut outcomes = HashMap::with_capacity(bank.outcomes.len());
            for (outcome, variants) in bank.outcomes {
                let parsed = variants
                    .into_iter()
                    .map(|v| {
                        Ok(Variant {
                            icon: v.icon,
                            title: v.title,
                            quote: v.quote,
                            narrative: Template::parse(&v.narrative)?,
                        })
                    })
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                outcomes.insert(outcome, parsed);
            }
            self.register(StyleBank {
                name: bank.name,
                parent: bank.parent,
                phrases: bank.phrases,
                outcomes,
            });
        }
        Ok(())
    }

    /// Resolve a bank by walking its parent chain, root ancestor first so
    /// that children override.
    pub fn resolve(&self, name: &str) -> Result<ResolvedStyle, ConfigError> {
        let bank = self
            .banks
            .get(name)
            .ok_or_else(|| ConfigError::UnknownStyleBank(name.to_string()))?;

        let mut chain = vec![bank];
        let mut visited = FxHashSet::default();
        visited.insert(bank.name.as_str());
        let mut current = bank;
        while let Some(parent_name) = current.parent.as_deref() {
            if !visited.insert(parent_name) {
                return Err(ConfigError::StyleCycle(parent_name.to_string()));
            }
            let parent = self
                .banks
                .get(parent_name)
                .ok_or_else(|| ConfigError::UnknownStyleBank(parent_name.to_string()))?;
            chain.push(parent);
            current = parent;
        }

        let mut phrases = HashMap::new();
        let mut outcomes = HashMap::new();
        for ancestor in chain.iter().rev() {
            for (k, v) in &ancestor.phrases {
                phrases.insert(k.clone(), v.clone());
            }
            for (k, v) in &ancestor.outcomes {
                outcomes.insert(k.clone(), v.clone());
            }
        }

        Ok(ResolvedStyle {
            name: bank.name.clone(),
            phrases,
            outcomes,
        })
    }

    /// Resolve and validate every registered bank.
    pub fn validate_all(&self) -> Result<(), ConfigError> {
        for name in self.names() {
            self.resolve(name)?.validate()?;
        }
        Ok(())
    }
}
