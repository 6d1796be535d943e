//! Risk tiers and prediction records.
//!
//! Represents the output of the heart disease scoring pipeline.

use serde::{Deserialize, Serialize};

use super::patient::PatientRecord;

/// Risk level classification for heart disease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Low risk of heart disease
    Low,
    /// Moderate risk, monitoring recommended
    Moderate,
    /// High risk, professional evaluation recommended
    High,
}

impl RiskLevel {
    /// Get a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "Low risk - No significant indicators",
            Self::Moderate => "Moderate risk - Follow-up recommended",
            Self::High => "High risk - Professional evaluation advised",
        }
    }

    /// Numeric tier code stored in the prediction log (three-tier scheme).
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Moderate => 1,
            Self::High => 2,
        }
    }

    /// Inverse of [`RiskLevel::code`].
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Low),
            1 => Some(Self::Moderate),
            2 => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MODERATE" => Ok(Self::Moderate),
            "HIGH" => Ok(Self::High),
            other => Err(format!("unknown risk level: {other}")),
        }
    }
}

/// Probability cut points between risk tiers.
///
/// Each band includes its lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Probabilities at or above this are at least MODERATE.
    pub moderate: f64,
    /// Probabilities at or above this are HIGH.
    pub high: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            moderate: 0.33,
            high: 0.66,
        }
    }
}

impl RiskThresholds {
    /// Map a probability to its tier.
    #[must_use]
    pub fn classify(&self, probability: f64) -> RiskLevel {
        if probability >= self.high {
            RiskLevel::High
        } else if probability >= self.moderate {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }
}

/// Classify a probability with the default thresholds.
#[must_use]
pub fn classify(probability: f64) -> RiskLevel {
    RiskThresholds::default().classify(probability)
}

/// One logged inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Unique identifier
    pub id: String,

    /// The scored input
    pub input: PatientRecord,

    /// Risk classification
    pub risk_level: RiskLevel,

    /// Positive-class probability (0.0 to 1.0)
    pub probability: f64,

    /// Timestamp of the inference
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl PredictionRecord {
    /// Create a new record stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(input: PatientRecord, risk_level: RiskLevel, probability: f64) -> Self {
        Self {
            id: uuid_v4(),
            input,
            risk_level,
            probability,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Generate a random UUID v4 string using a CSPRNG seeded from OS entropy.
fn uuid_v4() -> String {
    use rand::Rng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    let mut rng = ChaCha20Rng::from_entropy();
    let mut bytes: [u8; 16] = rng.gen();
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_from_probability() {
        assert_eq!(classify(0.0), RiskLevel::Low);
        assert_eq!(classify(0.329), RiskLevel::Low);
        assert_eq!(classify(0.33), RiskLevel::Moderate);
        assert_eq!(classify(0.659), RiskLevel::Moderate);
        assert_eq!(classify(0.66), RiskLevel::High);
        assert_eq!(classify(1.0), RiskLevel::High);
    }

    #[test]
    fn test_classify_is_monotonic() {
        let mut previous = RiskLevel::Low;
        for i in 0..1000 {
            let p = f64::from(i) / 1000.0;
            let tier = classify(p);
            assert!(tier >= previous, "tier dropped at p={p}");
            previous = tier;
        }
        assert_eq!(previous, RiskLevel::High);
    }

    #[test]
    fn test_tier_codes_roundtrip() {
        for level in [RiskLevel::Low, RiskLevel::Moderate, RiskLevel::High] {
            assert_eq!(RiskLevel::from_code(i64::from(level.code())), Some(level));
            assert_eq!(level.to_string().parse::<RiskLevel>(), Ok(level));
        }
        assert_eq!(RiskLevel::from_code(7), None);
    }

    #[test]
    fn test_prediction_record_creation() {
        let record = PredictionRecord::new(PatientRecord::default(), RiskLevel::High, 0.8);
        assert_eq!(record.risk_level, RiskLevel::High);
        assert_eq!(record.id.len(), 36);
        assert_eq!(&record.id[14..15], "4");
    }

    #[test]
    fn test_uuid_generation() {
        let id1 = uuid_v4();
        let id2 = uuid_v4();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36);
    }
}
