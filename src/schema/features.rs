use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scalar descriptors derived from a single shot.
///
/// Recomputed on every run; every value is finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub shot_id: String,
    pub brew_ratio: f64,
    pub peak_pressure_bar: f64,
    pub shot_end_s: f64,
    pub temp_avg_c: f64,
    pub temp_std_c: f64,
    pub flow_avg_ml_s: f64,
    pub channeling_score_0_1: f64,
    pub preinfusion_s: f64,
    pub first_drip_s: f64,
}

/// A named FeatureSet field that rules and templates may refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureField {
    #[serde(rename = "brew_ratio")]
    BrewRatio,
    #[serde(rename = "peak_pressure_bar")]
    PeakPressure,
    #[serde(rename = "shot_end_s")]
    ShotEnd,
    #[serde(rename = "temp_avg_c")]
    TempAvg,
    #[serde(rename = "temp_std_c")]
    TempStd,
    #[serde(rename = "flow_avg_ml_s")]
    FlowAvg,
    #[serde(rename = "channeling_score_0_1")]
    Channeling,
    #[serde(rename = "preinfusion_s")]
    Preinfusion,
    #[serde(rename = "first_drip_s")]
    FirstDrip,
}

impl FeatureField {
    pub const ALL: [FeatureField; 9] = [
        Self::BrewRatio,
        Self::PeakPressure,
        Self::ShotEnd,
        Self::TempAvg,
        Self::TempStd,
        Self::FlowAvg,
        Self::Channeling,
        Self::Preinfusion,
        Self::FirstDrip,
    ];

    /// Wire name, identical to the feature line key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BrewRatio => "brew_ratio",
            Self::PeakPressure => "peak_pressure_bar",
            Self::ShotEnd => "shot_end_s",
            Self::TempAvg => "temp_avg_c",
            Self::TempStd => "temp_std_c",
            Self::FlowAvg => "flow_avg_ml_s",
            Self::Channeling => "channeling_score_0_1",
            Self::Preinfusion => "preinfusion_s",
            Self::FirstDrip => "first_drip_s",
        }
    }
}

impl fmt::Display for FeatureField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeatureField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|field| field.name() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl FeatureSet {
    pub fn get(&self, field: FeatureField) -> f64 {
        match field {
            FeatureField::BrewRatio => self.brew_ratio,
            FeatureField::PeakPressure => self.peak_pressure_bar,
            FeatureField::ShotEnd => self.shot_end_s,
            FeatureField::TempAvg => self.temp_avg_c,
            FeatureField::TempStd => self.temp_std_c,
            FeatureField::FlowAvg => self.flow_avg_ml_s,
            FeatureField::Channeling => self.channeling_score_0_1,
            FeatureField::Preinfusion => self.preinfusion_s,
            FeatureField::FirstDrip => self.first_drip_s,
        }
    }

    /// Serialize as one derived-feature JSONL line.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_round_trip_through_from_str() {
        for field in FeatureField::ALL {
            assert_eq!(field.name().parse::<FeatureField>(), Ok(field));
        }
        assert!("grind_size".parse::<FeatureField>().is_err());
    }

    #[test]
    fn serde_name_matches_wire_name() {
        let json = serde_json::to_string(&FeatureField::Channeling).unwrap();
        assert_eq!(json, "\"channeling_score_0_1\"");
    }

    #[test]
    fn feature_line_uses_wire_keys() {
        let fs = FeatureSet {
            shot_id: "s1".to_string(),
            brew_ratio: 2.0,
            peak_pressure_bar: 9.0,
            shot_end_s: 28.0,
            temp_avg_c: 92.0,
            temp_std_c: 0.2,
            flow_avg_ml_s: 1.3,
            channeling_score_0_1: 0.0,
            preinfusion_s: 3.0,
            first_drip_s: 4.0,
        };
        let line = fs.to_json_line().unwrap();
        assert!(line.contains("\"peak_pressure_bar\":9.0"));
        assert!(line.contains("\"channeling_score_0_1\":0.0"));
        assert_eq!(fs.get(FeatureField::TempAvg), 92.0);
    }
}
