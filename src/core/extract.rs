//! Signal feature extraction: raw shot telemetry to scalar descriptors.

use thiserror::Error;

use crate::schema::features::FeatureSet;
use crate::schema::shot::ShotRecord;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("record has neither shot_id nor timestamp")]
    MissingId,
    #[error("series {series} has {len} samples, need at least 2")]
    TooShort { series: &'static str, len: usize },
    #[error("series {series} has {found} samples, expected {expected}")]
    LengthMismatch {
        series: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
    #[error("negative timing mark {field}: {value}")]
    NegativeTiming { field: &'static str, value: f64 },
    #[error("negative mass {field}: {value}")]
    NegativeMass { field: &'static str, value: f64 },
    #[error("no dose and no precomputed brew ratio")]
    MissingRatio,
}

/// Derive the feature set for one shot.
///
/// The record is validated first; nothing is computed from a record that
/// fails validation.
pub fn extract_features(shot: &ShotRecord) -> Result<FeatureSet, InputError> {
    validate(shot)?;

    let features = FeatureSet {
        shot_id: shot.id().to_string(),
        brew_ratio: brew_ratio(shot)?,
        peak_pressure_bar: peak(&shot.pressure_bar),
        shot_end_s: shot.shot_end_s,
        temp_avg_c: time_weighted_mean(&shot.temp_c, shot.shot_end_s),
        temp_std_c: std_dev(&shot.temp_c),
        flow_avg_ml_s: time_weighted_mean(&shot.flow_ml_s, shot.shot_end_s),
        channeling_score_0_1: channeling_score(&shot.flow_ml_s),
        preinfusion_s: shot.preinfusion_ms / 1000.0,
        first_drip_s: shot.first_drip_s,
    };

    for (name, value) in [
        ("brew_ratio", features.brew_ratio),
        ("temp_avg_c", features.temp_avg_c),
        ("temp_std_c", features.temp_std_c),
        ("flow_avg_ml_s", features.flow_avg_ml_s),
    ] {
        if !value.is_finite() {
            return Err(InputError::NonFinite(name));
        }
    }

    Ok(features)
}

fn validate(shot: &ShotRecord) -> Result<(), InputError> {
    if shot.id().trim().is_empty() {
        return Err(InputError::MissingId);
    }

    let expected = shot.pressure_bar.len();
    for (series, samples) in shot.series() {
        if samples.len() < 2 {
            return Err(InputError::TooShort {
                series,
                len: samples.len(),
            });
        }
        if samples.len() != expected {
            return Err(InputError::LengthMismatch {
                series,
                expected,
                found: samples.len(),
            });
        }
        if samples.iter().any(|v| !v.is_finite()) {
            return Err(InputError::NonFinite(series));
        }
    }

    for (field, value) in [
        ("preinfusion_ms", shot.preinfusion_ms),
        ("first_drip_s", shot.first_drip_s),
        ("shot_end_s", shot.shot_end_s),
    ] {
        if !value.is_finite() {
            return Err(InputError::NonFinite(field));
        }
        if value < 0.0 {
            return Err(InputError::NegativeTiming { field, value });
        }
    }

    let masses = [
        ("target_mass_g", Some(shot.target_mass_g)),
        ("dose_g", shot.dose_g),
        ("brew_ratio", shot.brew_ratio),
    ];
    for (field, value) in masses {
        if let Some(value) = value {
            if !value.is_finite() {
                return Err(InputError::NonFinite(field));
            }
            if value < 0.0 {
                return Err(InputError::NegativeMass { field, value });
            }
        }
    }

    Ok(())
}

fn brew_ratio(shot: &ShotRecord) -> Result<f64, InputError> {
    match (shot.dose_g, shot.brew_ratio) {
        (Some(dose), _) if dose > 0.0 => Ok(shot.target_mass_g / dose),
        (_, Some(ratio)) => Ok(ratio),
        _ => Err(InputError::MissingRatio),
    }
}

fn peak(samples: &[f64]) -> f64 {
    samples.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Trapezoidal mean over evenly spaced samples. With zero duration there is
/// no time axis, so every sample weighs the same.
fn time_weighted_mean(samples: &[f64], duration_s: f64) -> f64 {
    let n = samples.len();
    let sum: f64 = samples.iter().sum();
    if duration_s <= 0.0 {
        return sum / n as f64;
    }
    let edges = (samples[0] + samples[n - 1]) / 2.0;
    (sum - edges) / (n - 1) as f64
}

fn std_dev(samples: &[f64]) -> f64 {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    var.sqrt()
}

/// Flow irregularity against the tightest rise-then-fall envelope.
///
/// The envelope is the prefix running maximum up to the peak sample and the
/// suffix running maximum after it. A pour that only rises and then only
/// falls coincides with its envelope and scores 0. The largest dip below the
/// envelope, relative to peak flow, is the score.
pub fn channeling_score(flow: &[f64]) -> f64 {
    let Some((peak_idx, peak_flow)) = flow
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
    else {
        return 0.0;
    };
    if peak_flow <= 0.0 {
        return 0.0;
    }

    let mut max_dip = 0.0f64;

    let mut envelope = f64::NEG_INFINITY;
    for &v in &flow[..=peak_idx] {
        envelope = envelope.max(v);
        max_dip = max_dip.max(envelope - v);
    }

    envelope = f64::NEG_INFINITY;
    for &v in flow[peak_idx..].iter().rev() {
        envelope = envelope.max(v);
        max_dip = max_dip.max(envelope - v);
    }

    (max_dip / peak_flow).clamp(0.0, 1.0)
}
