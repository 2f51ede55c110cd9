//! shot-oracle: command-line front end for the reading pipeline.
//!
//! - `extract`: shot records (JSONL) to feature lines (JSONL)
//! - `cards`: shot records (or a palette deck) to `cards.json` and Markdown
//! - `pick`: print the palette indices an identity would draw

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use serde_json::json;
use shot_oracle::config::{validate_identity, OracleConfig};
use shot_oracle::core::extract::extract_features;
use shot_oracle::core::pipeline::OracleEngine;
use shot_oracle::core::selector::{select, SelectionKey};
use shot_oracle::schema::card::{deck_markdown, RenderedCard};
use shot_oracle::schema::shot::{parse_jsonl, parse_palette, ShotRecord};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info, warn};

const DEFAULT_CONFIG: &str = "oracle.ron";

#[derive(Parser)]
#[command(name = "shot-oracle")]
#[command(about = "Deterministic espresso shot readings", long_about = None)]
#[command(version)]
struct Cli {
    /// Engine configuration (RON). Defaults to ./oracle.ron when present.
    #[arg(short, long, env = "SHOT_ORACLE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive feature lines from shot records
    Extract {
        /// Shot records, one JSON object per line
        input: PathBuf,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Render reading cards
    Cards {
        /// Shot records, one JSON object per line
        input: PathBuf,
        /// Treat the input as a palette and read only the identity's deck
        #[arg(long)]
        deck: bool,
        /// Extra token that reshuffles the deck (e.g. a date or "morning")
        #[arg(long)]
        time_variant: Option<String>,
        /// Birth date as MMDD
        #[arg(long)]
        identity: Option<String>,
        /// Style bank name
        #[arg(long)]
        style: Option<String>,
        /// Ask the rewrite endpoint to paraphrase narratives
        #[arg(long)]
        rewrite: bool,
        /// Reading time, e.g. 2024-12-01T08:30:00 (defaults to now)
        #[arg(long)]
        at: Option<NaiveDateTime>,
        /// JSON output
        #[arg(long, default_value = "cards.json")]
        json: PathBuf,
        /// Markdown output
        #[arg(long)]
        md: Option<PathBuf>,
    },

    /// Print the palette indices drawn for an identity
    Pick {
        /// Number of shots in the palette
        #[arg(long)]
        palette_size: usize,
        /// Birth date as MMDD
        #[arg(long)]
        identity: String,
        #[arg(long)]
        time_variant: Option<String>,
        /// Deck size; defaults to the configured value
        #[arg(short, long)]
        k: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let config = load_config(cli.config.as_deref())?;

    let failed = match cli.command {
        Commands::Extract { input, out } => run_extract(&input, out.as_deref())?,
        Commands::Cards {
            input,
            deck,
            time_variant,
            identity,
            style,
            rewrite,
            at,
            json,
            md,
        } => {
            let mut config = config;
            if let Some(identity) = identity {
                config.identity = identity;
            }
            if let Some(style) = style {
                config.style_bank = style;
            }
            config.rewrite.enabled |= rewrite;
            let at = at.unwrap_or_else(|| Local::now().naive_local());
            let opts = CardsOptions {
                deck,
                time_variant: time_variant.as_deref(),
                at,
                json: &json,
                md: md.as_deref(),
            };
            run_cards(config, &input, &opts)?
        }
        Commands::Pick {
            palette_size,
            identity,
            time_variant,
            k,
        } => {
            validate_identity(&identity)?;
            let mut key = SelectionKey::new().identity(identity);
            if let Some(variant) = time_variant {
                key = key.date_token(variant);
            }
            let picked = select(&key, palette_size, k.unwrap_or(config.deck_size));
            println!("{}", json!({ "key": key.to_string(), "indices": picked }));
            0
        }
    };

    if failed > 0 {
        error!(failed, "some records could not be read");
        process::exit(1);
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<OracleConfig> {
    let default_path = Path::new(DEFAULT_CONFIG);
    let path = match path {
        Some(p) => Some(p),
        None if default_path.exists() => Some(default_path),
        None => None,
    };
    match path {
        Some(p) => OracleConfig::load_from_ron(p)
            .with_context(|| format!("loading config {}", p.display())),
        None => {
            let mut config = OracleConfig::default();
            config.apply_env();
            Ok(config)
        }
    }
}

/// Parse a JSONL file into (line number, record) pairs. Bad lines are
/// logged and counted; good records keep file order.
fn read_records(path: &Path) -> Result<(Vec<(usize, ShotRecord)>, usize)> {
    let contents = read_input(path)?;
    let mut records = Vec::new();
    let mut bad = 0;
    for (line, record) in parse_jsonl(&contents) {
        match record {
            Ok(record) => records.push((line, record)),
            Err(e) => {
                warn!(line, error = %e, "skipping malformed record");
                bad += 1;
            }
        }
    }
    Ok((records, bad))
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn run_extract(input: &Path, out: Option<&Path>) -> Result<usize> {
    let (records, mut failed) = read_records(input)?;

    let mut writer: Box<dyn Write> = match out {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    let mut written = 0;
    for (line, record) in &records {
        match extract_features(record) {
            Ok(features) => {
                writeln!(writer, "{}", features.to_json_line()?)?;
                written += 1;
            }
            Err(e) => {
                warn!(line, shot_id = record.id(), error = %e, "skipping record");
                failed += 1;
            }
        }
    }
    writer.flush()?;

    info!(written, failed, "features extracted");
    Ok(failed)
}

struct CardsOptions<'a> {
    deck: bool,
    time_variant: Option<&'a str>,
    at: NaiveDateTime,
    json: &'a Path,
    md: Option<&'a Path>,
}

fn run_cards(config: OracleConfig, input: &Path, opts: &CardsOptions<'_>) -> Result<usize> {
    let engine = OracleEngine::builder()
        .config(config)
        .build()
        .context("loading rules and styles")?;

    let mut failed = 0;
    let results = if opts.deck {
        // palette indices are line positions, so a bad line aborts the deck
        let palette = parse_palette(&read_input(input)?)
            .with_context(|| format!("palette {}", input.display()))?;
        engine.read_deck(&palette, opts.at, opts.time_variant)
    } else {
        let (records, bad) = read_records(input)?;
        failed += bad;
        let records: Vec<ShotRecord> = records.into_iter().map(|(_, r)| r).collect();
        engine.read_batch(&records, opts.at)
    };

    let mut cards: Vec<RenderedCard> = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(card) => cards.push(card),
            Err(e) => {
                warn!(shot_id = e.shot_id(), error = %e, "no card for record");
                failed += 1;
            }
        }
    }

    let document = json!({
        "metadata": {
            "generated_at": opts.at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "identity": engine.config().identity,
            "style_bank": engine.style().name,
            "time_variant": opts.time_variant,
            "count": cards.len(),
        },
        "readings": cards,
    });
    std::fs::write(opts.json, serde_json::to_string_pretty(&document)?)
        .with_context(|| format!("writing {}", opts.json.display()))?;

    if let Some(md) = opts.md {
        std::fs::write(md, deck_markdown(&cards))
            .with_context(|| format!("writing {}", md.display()))?;
    }

    info!(cards = cards.len(), out = %opts.json.display(), "cards written");
    Ok(failed)
}
