//! Deterministic selection: reproducible k-of-n choices seeded from a
//! composite key string.
//!
//! Every caller goes through [`derive_seed`] and [`select`]; nothing else in
//! the crate hashes keys or seeds an RNG for content choices.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Coarse time-of-day token used to vary readings through the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeBucket {
    pub fn from_hour(hour: u32) -> TimeBucket {
        match hour {
            5..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=20 => Self::Evening,
            _ => Self::Night,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Night => "night",
        }
    }
}

/// Composite key for one deterministic choice.
///
/// Tokens are written in a fixed order as `name=value` pairs joined by `|`;
/// absent tokens are left out. The rendered string is the only thing that is
/// ever hashed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SelectionKey {
    pub identity: Option<String>,
    pub content: Option<String>,
    pub date: Option<String>,
    pub bucket: Option<TimeBucket>,
    pub bank: Option<String>,
    pub slot: Option<String>,
}

impl SelectionKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Date token in `YYYYMMDD` form.
    pub fn date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date.format("%Y%m%d").to_string());
        self
    }

    /// Free-form temporal token, e.g. a deck time variant.
    pub fn date_token(mut self, token: impl Into<String>) -> Self {
        self.date = Some(token.into());
        self
    }

    pub fn bucket(mut self, bucket: TimeBucket) -> Self {
        self.bucket = Some(bucket);
        self
    }

    /// Date plus, when `with_bucket`, the time-of-day bucket of `at`.
    pub fn at(self, at: NaiveDateTime, with_bucket: bool) -> Self {
        let key = self.date(at.date());
        if with_bucket {
            key.bucket(TimeBucket::from_hour(at.hour()))
        } else {
            key
        }
    }

    pub fn bank(mut self, bank: impl Into<String>) -> Self {
        self.bank = Some(bank.into());
        self
    }

    /// Derive a sub-key for one named slot of the same card.
    pub fn slot(&self, slot: impl Into<String>) -> Self {
        let mut key = self.clone();
        key.slot = Some(slot.into());
        key
    }
}

impl fmt::Display for SelectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens = [
            ("identity", self.identity.as_deref()),
            ("content", self.content.as_deref()),
            ("date", self.date.as_deref()),
            ("bucket", self.bucket.as_ref().map(TimeBucket::name)),
            ("bank", self.bank.as_deref()),
            ("slot", self.slot.as_deref()),
        ];
        let mut first = true;
        for (name, value) in tokens {
            if let Some(value) = value {
                if !first {
                    f.write_str("|")?;
                }
                write!(f, "{}={}", name, value)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// SHA-256 of the UTF-8 key, first eight digest bytes read big-endian.
pub fn derive_seed(key: &str) -> u64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Pick `k` distinct indices from `0..domain`, ascending.
///
/// When `k >= domain` every index is returned. The draw order inside the
/// sampler never leaks: results are always sorted.
pub fn select(key: &SelectionKey, domain: usize, k: usize) -> Vec<usize> {
    select_with_seed(derive_seed(&key.to_string()), domain, k)
}

/// Same as [`select`] for an already derived seed.
///
/// Draws from ChaCha8, whose stream is fixed for a given seed.
pub fn select_with_seed(seed: u64, domain: usize, k: usize) -> Vec<usize> {
    if k >= domain {
        return (0..domain).collect();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut picked = rand::seq::index::sample(&mut rng, domain, k).into_vec();
    picked.sort_unstable();
    picked
}

/// Pick a single index, or `None` for an empty domain.
pub fn select_one(key: &SelectionKey, domain: usize) -> Option<usize> {
    if domain == 0 {
        return None;
    }
    select(key, domain, 1).first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_renders_tokens_in_fixed_order() {
        let key = SelectionKey::new()
            .bank("chill")
            .content("shot-1")
            .identity("0802")
            .date(NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(
            key.to_string(),
            "identity=0802|content=shot-1|date=20241201|bank=chill"
        );
        assert_eq!(
            key.slot("opener").to_string(),
            "identity=0802|content=shot-1|date=20241201|bank=chill|slot=opener"
        );
    }

    #[test]
    fn bucket_only_when_requested() {
        let at = NaiveDate::from_ymd_opt(2024, 12, 1)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        let plain = SelectionKey::new().identity("0802").at(at, false);
        let bucketed = SelectionKey::new().identity("0802").at(at, true);
        assert_eq!(plain.to_string(), "identity=0802|date=20241201");
        assert_eq!(
            bucketed.to_string(),
            "identity=0802|date=20241201|bucket=afternoon"
        );
    }

    #[test]
    fn seed_is_sha256_prefix() {
        // sha256("") = e3b0c442 98fc1c14 ...
        assert_eq!(derive_seed(""), 0xe3b0_c442_98fc_1c14);
        assert_eq!(derive_seed("identity=1007"), derive_seed("identity=1007"));
        assert_ne!(derive_seed("identity=1007"), derive_seed("identity=1008"));
    }

    #[test]
    fn deterministic_distinct_sorted() {
        let key = SelectionKey::new().identity("0802");
        let a = select(&key, 15, 3);
        let b = select(&key, 15, 3);
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert!(a.iter().all(|&i| i < 15));
    }

    #[test]
    fn saturation_returns_full_range() {
        let key = SelectionKey::new().identity("0802");
        assert_eq!(select(&key, 4, 4), vec![0, 1, 2, 3]);
        assert_eq!(select(&key, 4, 10), vec![0, 1, 2, 3]);
        assert!(select(&key, 0, 3).is_empty());
        assert_eq!(select(&key, 5, 0), Vec::<usize>::new());
    }

    #[test]
    fn select_one_in_range() {
        let key = SelectionKey::new().content("x");
        assert_eq!(select_one(&key, 0), None);
        assert_eq!(select_one(&key, 1), Some(0));
        let i = select_one(&key, 7).unwrap();
        assert!(i < 7);
    }

    #[test]
    fn time_buckets() {
        assert_eq!(TimeBucket::from_hour(5), TimeBucket::Morning);
        assert_eq!(TimeBucket::from_hour(12), TimeBucket::Afternoon);
        assert_eq!(TimeBucket::from_hour(20), TimeBucket::Evening);
        assert_eq!(TimeBucket::from_hour(21), TimeBucket::Night);
        assert_eq!(TimeBucket::from_hour(3), TimeBucket::Night);
    }
}
