/// Shot Palette: deterministic simulated shots covering every diagnostic
/// pattern, written as JSONL shot records.
///
/// Usage: shot_palette [--out palette.jsonl] [--start 2024-12-01T08:00:00]

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime};
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use shot_oracle::core::selector::derive_seed;
use shot_oracle::schema::shot::ShotRecord;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "shot_palette")]
#[command(about = "Generate a simulated palette of espresso shots", long_about = None)]
struct Args {
    /// Output file; stdout when omitted
    #[arg(short, long)]
    out: Option<PathBuf>,
    /// Timestamp of the first shot; later shots follow at 5 minute steps
    #[arg(long, default_value = "2024-12-01T08:00:00")]
    start: NaiveDateTime,
}

/// One simulated pattern and the base curves it is drawn from.
struct Pattern {
    name: &'static str,
    duration_s: usize,
    dose_g: f64,
    yield_g: f64,
    preinfusion_ms: f64,
    temp_c: f64,
    pressure: &'static [f64],
    flow: &'static [f64],
}

const SWEET_PRESSURE: &[f64] = &[
    0.0, 2.0, 6.0, 8.5, 9.1, 9.0, 8.8, 8.5, 8.2, 7.8, 7.5, 7.0, 6.5, 6.0, 5.5, 5.0, 4.5, 4.0, 3.5,
    3.0, 2.5, 2.0, 1.5, 1.0, 0.5, 0.0,
];
const SWEET_FLOW: &[f64] = &[
    0.0, 0.0, 0.5, 1.2, 1.8, 2.0, 2.1, 2.0, 1.9, 1.8, 1.7, 1.6, 1.5, 1.4, 1.3, 1.2, 1.1, 1.0, 0.9,
    0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.0,
];

const PATTERNS: &[Pattern] = &[
    Pattern {
        name: "sweet_spot",
        duration_s: 29,
        dose_g: 18.0,
        yield_g: 36.5,
        preinfusion_ms: 3000.0,
        temp_c: 91.7,
        pressure: SWEET_PRESSURE,
        flow: SWEET_FLOW,
    },
    Pattern {
        name: "fast",
        duration_s: 18,
        dose_g: 18.0,
        yield_g: 27.0,
        preinfusion_ms: 2000.0,
        temp_c: 92.0,
        pressure: &[
            0.0, 1.0, 3.0, 5.0, 6.0, 6.5, 6.8, 7.0, 6.8, 6.5, 6.2, 5.8, 5.5, 5.0, 4.5, 4.0, 3.5,
            3.0, 2.5, 2.0, 1.5, 1.0, 0.5, 0.0,
        ],
        flow: &[
            0.0, 0.0, 0.8, 1.8, 2.5, 2.8, 3.0, 2.9, 2.7, 2.5, 2.3, 2.1, 1.9, 1.7, 1.5, 1.3, 1.1,
            0.9, 0.7, 0.5, 0.3, 0.1, 0.0,
        ],
    },
    Pattern {
        name: "slow",
        duration_s: 45,
        dose_g: 18.0,
        yield_g: 50.4,
        preinfusion_ms: 4000.0,
        temp_c: 91.5,
        pressure: &[
            0.0, 1.0, 3.0, 5.0, 7.0, 8.0, 8.5, 9.0, 9.2, 9.1, 9.0, 8.8, 8.6, 8.4, 8.2, 8.0, 7.8,
            7.6, 7.4, 7.2, 7.0, 6.8, 6.6, 6.4, 6.2, 6.0, 5.8, 5.6, 5.4, 5.2, 5.0, 4.8, 4.6, 4.4,
            4.2, 4.0, 3.8, 3.6, 3.4, 3.2, 3.0, 2.8, 2.6, 2.4, 2.2, 2.0, 1.8, 1.6, 1.4, 1.2, 1.0,
            0.8, 0.6, 0.4, 0.2, 0.0,
        ],
        flow: &[
            0.0, 0.0, 0.3, 0.8, 1.2, 1.4, 1.5, 1.4, 1.3, 1.2, 1.1, 1.0, 0.9, 0.8, 0.7, 0.6, 0.5,
            0.4, 0.3, 0.2, 0.1, 0.0,
        ],
    },
    Pattern {
        name: "choke",
        duration_s: 35,
        dose_g: 18.0,
        yield_g: 21.6,
        preinfusion_ms: 5000.0,
        temp_c: 92.5,
        pressure: &[
            0.0, 1.0, 3.0, 5.0, 7.0, 9.0, 10.0, 10.5, 11.0, 11.2, 11.0, 10.8, 10.6, 10.4, 10.2,
            10.0, 9.8, 9.6, 9.4, 9.2, 9.0, 8.8, 8.6, 8.4, 8.2, 8.0, 7.8, 7.6, 7.4, 7.2, 7.0, 6.8,
            6.6, 6.4, 6.2, 6.0, 5.8, 5.6, 5.4, 5.2, 5.0, 4.8, 4.6, 4.4, 4.2, 4.0, 3.8, 3.6, 3.4,
            3.2, 3.0, 2.8, 2.6, 2.4, 2.2, 2.0, 1.8, 1.6, 1.4, 1.2, 1.0, 0.8, 0.6, 0.4, 0.2, 0.0,
        ],
        flow: &[
            0.0, 0.0, 0.2, 0.5, 0.8, 1.0, 1.1, 1.0, 0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.2, 0.1,
            0.0,
        ],
    },
    Pattern {
        name: "channel",
        duration_s: 28,
        dose_g: 18.0,
        yield_g: 37.8,
        preinfusion_ms: 2500.0,
        temp_c: 91.8,
        pressure: &[
            0.0, 2.0, 6.0, 8.0, 7.5, 8.5, 7.0, 8.8, 6.5, 9.0, 6.0, 8.5, 7.5, 8.0, 6.8, 7.2, 6.5,
            7.0, 6.2, 6.8, 6.0, 6.5, 5.8, 6.2, 5.5, 6.0, 5.2, 5.8, 5.0, 5.5, 4.8, 5.2, 4.5, 5.0,
            4.2, 4.8, 4.0, 4.5, 3.8, 4.2, 3.5, 4.0, 3.2, 3.8, 3.0, 3.5, 2.8, 3.2, 2.5, 3.0, 2.2,
            2.8, 2.0, 2.5, 1.8, 2.2, 1.5, 2.0, 1.2, 1.8, 1.0, 1.5, 0.8, 1.2, 0.5, 1.0, 0.2, 0.8,
            0.0,
        ],
        flow: &[
            0.0, 0.0, 0.5, 1.0, 1.5, 2.0, 1.8, 2.2, 1.6, 2.4, 1.4, 2.0, 1.8, 1.9, 1.7, 1.8, 1.6,
            1.7, 1.5, 1.6, 1.4, 1.5, 1.3, 1.4, 1.2, 1.3, 1.1, 1.2, 1.0, 1.1, 0.9, 1.0, 0.8, 0.9,
            0.7, 0.8, 0.6, 0.7, 0.5, 0.6, 0.4, 0.5, 0.3, 0.4, 0.2, 0.3, 0.1, 0.2, 0.0,
        ],
    },
    Pattern {
        name: "temp_low",
        duration_s: 29,
        dose_g: 18.0,
        yield_g: 36.5,
        preinfusion_ms: 3000.0,
        temp_c: 89.5,
        pressure: SWEET_PRESSURE,
        flow: SWEET_FLOW,
    },
    Pattern {
        name: "temp_high",
        duration_s: 29,
        dose_g: 18.0,
        yield_g: 36.5,
        preinfusion_ms: 3000.0,
        temp_c: 95.2,
        pressure: SWEET_PRESSURE,
        flow: SWEET_FLOW,
    },
    Pattern {
        name: "overshoot",
        duration_s: 28,
        dose_g: 18.0,
        yield_g: 37.8,
        preinfusion_ms: 2000.0,
        temp_c: 92.0,
        pressure: &[
            0.0, 1.0, 3.0, 5.0, 7.0, 9.0, 10.5, 11.2, 10.8, 9.5, 9.0, 8.5, 8.0, 7.5, 7.0, 6.5,
            6.0, 5.5, 5.0, 4.5, 4.0, 3.5, 3.0, 2.5, 2.0, 1.5, 1.0, 0.5, 0.0,
        ],
        flow: &[
            0.0, 0.0, 0.3, 0.8, 1.2, 1.5, 1.8, 2.0, 1.9, 1.7, 1.5, 1.3, 1.1, 0.9, 0.7, 0.5, 0.3,
            0.1, 0.0,
        ],
    },
    Pattern {
        name: "short_pi",
        duration_s: 28,
        dose_g: 18.0,
        yield_g: 37.8,
        preinfusion_ms: 1000.0,
        temp_c: 91.5,
        pressure: &[
            0.0, 0.5, 1.0, 2.0, 4.0, 6.0, 8.0, 8.5, 9.0, 8.8, 8.5, 8.2, 7.8, 7.5, 7.0, 6.5, 6.0,
            5.5, 5.0, 4.5, 4.0, 3.5, 3.0, 2.5, 2.0, 1.5, 1.0, 0.5, 0.0,
        ],
        flow: &[
            0.0, 0.0, 0.8, 1.5, 2.0, 2.2, 2.1, 2.0, 1.9, 1.8, 1.7, 1.6, 1.5, 1.4, 1.3, 1.2, 1.1,
            1.0, 0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.0,
        ],
    },
];

/// Palette order; the tail repeats the patterns most worth seeing twice.
const PALETTE: &[&str] = &[
    "sweet_spot",
    "fast",
    "slow",
    "choke",
    "channel",
    "temp_low",
    "temp_high",
    "overshoot",
    "short_pi",
    "sweet_spot",
    "fast",
    "slow",
    "channel",
    "temp_low",
    "temp_high",
];

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Stretch a base curve onto `duration_s + 1` one-second samples.
fn resample(base: &[f64], duration_s: usize) -> Vec<f64> {
    if base.len() == duration_s + 1 {
        return base.to_vec();
    }
    let last = base.len() - 1;
    (0..=duration_s)
        .map(|i| {
            let pos = i as f64 / duration_s as f64 * last as f64;
            let lower = pos.floor() as usize;
            let upper = (lower + 1).min(last);
            if lower == upper {
                base[lower]
            } else {
                let weight = pos - lower as f64;
                round1(base[lower] * (1.0 - weight) + base[upper] * weight)
            }
        })
        .collect()
}

fn simulate(pattern: &Pattern, index: usize, at: NaiveDateTime) -> ShotRecord {
    let id = at.format("%Y-%m-%dT%H:%M:%S").to_string();
    let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(&format!("{}#{}", pattern.name, index)));

    let n = pattern.duration_s + 1;
    let pressure_bar = resample(pattern.pressure, pattern.duration_s);
    let flow_ml_s = resample(pattern.flow, pattern.duration_s);
    let temp_c = (0..n)
        .map(|_| round1(pattern.temp_c + rng.gen_range(-0.5..=0.5)))
        .collect();
    let pump_pct = std::iter::once(0.0)
        .chain((1..n).map(|_| rng.gen_range(85..=95) as f64))
        .collect();

    let first_drip_s = flow_ml_s
        .iter()
        .position(|&f| f > 0.5)
        .unwrap_or(pattern.duration_s / 3) as f64;

    ShotRecord {
        shot_id: Some(id.clone()),
        timestamp: id,
        target_mass_g: pattern.yield_g,
        dose_g: Some(pattern.dose_g),
        brew_ratio: None,
        pressure_bar,
        flow_ml_s,
        temp_c,
        pump_pct,
        preinfusion_ms: pattern.preinfusion_ms,
        first_drip_s,
        shot_end_s: pattern.duration_s as f64,
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let args = Args::parse();

    let mut writer: Box<dyn Write> = match &args.out {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    let mut written = 0;
    for (i, name) in PALETTE.iter().enumerate() {
        let Some(pattern) = PATTERNS.iter().find(|p| p.name == *name) else {
            continue;
        };
        let at = args.start + Duration::minutes(5 * i as i64);
        let shot = simulate(pattern, i, at);
        writeln!(writer, "{}", serde_json::to_string(&shot)?)?;
        written += 1;
    }
    writer.flush()?;

    info!(written, "palette generated");
    Ok(())
}
