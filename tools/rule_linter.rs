/// Rule Linter: validates diagnostic rules against the style banks.
///
/// Usage: rule_linter [rules.ron] [styles.ron]

use clap::Parser;
use shot_oracle::core::rules::RuleSet;
use shot_oracle::core::style::{StyleRegistry, FALLBACK_OUTCOME};
use std::collections::HashSet;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "rule_linter")]
#[command(about = "Check rule reachability and style coverage", long_about = None)]
struct Args {
    #[arg(default_value = "content/diagnostics.ron")]
    rules: PathBuf,
    #[arg(default_value = "content/styles.ron")]
    styles: PathBuf,
}

fn main() {
    let args = Args::parse();

    let rules = match RuleSet::load_from_ron(&args.rules) {
        Ok(rules) => rules,
        Err(e) => {
            eprintln!("ERROR: Failed to load rules file: {}", e);
            process::exit(1);
        }
    };
    println!(
        "Loaded {} rules (+ nominal '{}')",
        rules.rules.len(),
        rules.nominal.id
    );

    let mut styles = StyleRegistry::new();
    if let Err(e) = styles.load_from_ron(&args.styles) {
        eprintln!("ERROR: Failed to load styles file: {}", e);
        process::exit(1);
    }
    println!("Loaded {} style banks", styles.names().len());

    let (errors, warnings) = lint(&rules, &styles);

    println!("\n=== Rule Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn lint(rules: &RuleSet, styles: &StyleRegistry) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // Reachability: a rule fully covered by an earlier one never fires
    for (later, earlier) in rules.shadowed_rules() {
        warnings.push(format!(
            "Rule '{}' can never match: '{}' is declared earlier and accepts everything it does",
            later, earlier
        ));
    }

    for rule in &rules.rules {
        if rule.when.is_empty() {
            warnings.push(format!(
                "Rule '{}' has no bounds and matches every shot",
                rule.id
            ));
        }
        if rule.advice.is_empty() {
            warnings.push(format!("Rule '{}' has no advice", rule.id));
        }
    }

    let outcome_ids: HashSet<&str> = rules.outcome_ids().collect();

    for name in styles.names() {
        let resolved = match styles.resolve(name) {
            Ok(resolved) => resolved,
            Err(e) => {
                errors.push(format!("Style bank '{}': {}", name, e));
                continue;
            }
        };
        if let Err(e) = resolved.validate() {
            errors.push(e.to_string());
        }

        // Coverage
        let has_fallback = resolved.outcomes.contains_key(FALLBACK_OUTCOME);
        for id in rules.outcome_ids() {
            if !resolved.outcomes.contains_key(id) {
                if has_fallback {
                    warnings.push(format!(
                        "Style bank '{}' has no entry for '{}' (uses \"*\")",
                        name, id
                    ));
                } else {
                    errors.push(format!(
                        "Style bank '{}' cannot render '{}': no entry and no \"*\" fallback",
                        name, id
                    ));
                }
            }
        }

        // Entries for outcomes that no rule produces
        let mut stray: Vec<&str> = resolved
            .outcomes
            .keys()
            .map(String::as_str)
            .filter(|k| *k != FALLBACK_OUTCOME && !outcome_ids.contains(k))
            .collect();
        stray.sort_unstable();
        for key in stray {
            warnings.push(format!(
                "Style bank '{}' has an entry for unknown outcome '{}'",
                name, key
            ));
        }

        // Low variety
        let mut thin: Vec<(&String, usize)> = resolved
            .phrases
            .iter()
            .filter(|(_, phrases)| phrases.len() < 2)
            .map(|(bank, phrases)| (bank, phrases.len()))
            .collect();
        thin.sort_unstable();
        for (bank, count) in thin {
            warnings.push(format!(
                "Style bank '{}': phrase bank '{}' has only {} entries (minimum 2 recommended)",
                name, bank, count
            ));
        }
    }

    (errors, warnings)
}
