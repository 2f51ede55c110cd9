use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One completed espresso shot as delivered by the normalization layer.
///
/// The four series are parallel samples spaced evenly across
/// `[0, shot_end_s]`. Records are the sole input to the reading pipeline
/// and are never mutated after deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotRecord {
    #[serde(default)]
    pub shot_id: Option<String>,
    #[serde(default)]
    pub timestamp: String,
    pub target_mass_g: f64,
    #[serde(default)]
    pub dose_g: Option<f64>,
    /// Precomputed ratio, used only when no dose is known.
    #[serde(default)]
    pub brew_ratio: Option<f64>,
    pub pressure_bar: Vec<f64>,
    pub flow_ml_s: Vec<f64>,
    pub temp_c: Vec<f64>,
    pub pump_pct: Vec<f64>,
    #[serde(default)]
    pub preinfusion_ms: f64,
    #[serde(default)]
    pub first_drip_s: f64,
    pub shot_end_s: f64,
}

impl ShotRecord {
    /// The identifier used in error reports, selection keys and card metadata.
    pub fn id(&self) -> &str {
        match self.shot_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => &self.timestamp,
        }
    }

    /// Parse one JSONL line.
    pub fn from_json_line(line: &str) -> Result<ShotRecord, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Iterate the four series with their wire names.
    pub fn series(&self) -> [(&'static str, &[f64]); 4] {
        [
            ("pressure_bar", &self.pressure_bar),
            ("flow_ml_s", &self.flow_ml_s),
            ("temp_c", &self.temp_c),
            ("pump_pct", &self.pump_pct),
        ]
    }
}

/// A palette line that is not a valid shot record.
#[derive(Debug, Error)]
#[error("line {line}: {source}")]
pub struct RecordLineError {
    pub line: usize,
    #[source]
    pub source: serde_json::Error,
}

/// Parse JSONL into one result per non-blank line, tagged with its 1-based
/// line number.
pub fn parse_jsonl(contents: &str) -> Vec<(usize, Result<ShotRecord, serde_json::Error>)> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| (i + 1, ShotRecord::from_json_line(line)))
        .collect()
}

/// Parse a palette. Palette index `i` is the `i`-th non-blank line, so a
/// single bad line fails the whole palette.
pub fn parse_palette(contents: &str) -> Result<Vec<ShotRecord>, RecordLineError> {
    parse_jsonl(contents)
        .into_iter()
        .map(|(line, record)| record.map_err(|source| RecordLineError { line, source }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_normalized_line_and_ignores_extra_keys() {
        let line = r#"{"timestamp":"2024-12-01T14:30:22","bean_id":"GAGGIUINO","dose_g":18.0,
            "target_mass_g":36.5,"pressure_bar":[0,9.1,0],"flow_ml_s":[0,2.0,0],
            "temp_c":[92,92,92],"pump_pct":[0,90,0],"preinfusion_ms":3000,
            "first_drip_s":4,"shot_end_s":29,"basket":"18g"}"#;
        let shot = ShotRecord::from_json_line(line).unwrap();
        assert_eq!(shot.dose_g, Some(18.0));
        assert_eq!(shot.pressure_bar.len(), 3);
        assert_eq!(shot.id(), "2024-12-01T14:30:22");
    }

    #[test]
    fn explicit_shot_id_wins_over_timestamp() {
        let line = r#"{"shot_id":"shot-7","timestamp":"t","target_mass_g":36,
            "pressure_bar":[0,1],"flow_ml_s":[0,1],"temp_c":[90,90],"pump_pct":[0,1],
            "shot_end_s":2}"#;
        let shot = ShotRecord::from_json_line(line).unwrap();
        assert_eq!(shot.id(), "shot-7");
        assert_eq!(shot.preinfusion_ms, 0.0);
    }

    #[test]
    fn missing_series_is_rejected() {
        let line = r#"{"timestamp":"t","target_mass_g":36,"shot_end_s":2}"#;
        assert!(ShotRecord::from_json_line(line).is_err());
    }

    const PALETTE: &str = r#"{"shot_id":"p0","target_mass_g":36,"pressure_bar":[0,9],"flow_ml_s":[0,1],"temp_c":[92,92],"pump_pct":[0,90],"shot_end_s":28}

{"shot_id":"p1","target_mass_g":36,"pressure_bar":[0,9],"flow_ml_s":[0,1],"temp_c":[92,92],"pump_pct":[0,90],"shot_end_s":30}
"#;

    #[test]
    fn palette_keeps_line_order() {
        let palette = parse_palette(PALETTE).unwrap();
        let ids: Vec<_> = palette.iter().map(ShotRecord::id).collect();
        assert_eq!(ids, vec!["p0", "p1"]);
    }

    #[test]
    fn bad_palette_line_fails_whole_palette() {
        let broken = PALETTE.replace(r#""shot_id":"p1","target_mass_g":36,"#, r#""shot_id":"p1","#);
        let err = parse_palette(&broken).unwrap_err();
        assert_eq!(err.line, 3);

        let lines = parse_jsonl(&broken);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].1.is_ok());
        assert_eq!(lines[1].0, 3);
        assert!(lines[1].1.is_err());
    }
}
