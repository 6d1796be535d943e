//! Rule-based clinical advisories.
//!
//! A fixed, ordered table of independent threshold rules is evaluated against
//! the raw patient record. Each rule contributes at most one string.

use super::diagnosis::RiskLevel;
use super::patient::{ClinicalField, PatientRecord};

/// Prepended to every HIGH-tier recommendation list.
pub const HIGH_RISK_ADVISORY: &str =
    "High predicted risk: seek professional evaluation by a cardiologist as soon as possible.";

/// Returned alone when nothing fires and the tier is not HIGH.
pub const NO_ABNORMALITIES: &str =
    "No abnormalities detected in the provided indicators. Maintain a healthy lifestyle and routine check-ups.";

/// Which side of a threshold counts as abnormal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Values at or above the threshold are abnormal.
    AtLeast,
    /// Values strictly below the threshold are abnormal.
    Below,
}

impl Direction {
    fn crosses(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::AtLeast => value >= threshold,
            Self::Below => value < threshold,
        }
    }
}

/// One advisory rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// Continuous measurement with moderate and severe bands; severe wins.
    Banded {
        field: ClinicalField,
        direction: Direction,
        moderate: f64,
        severe: f64,
        moderate_advice: &'static str,
        severe_advice: &'static str,
    },
    /// Binary flag that fires when set to 1.
    Flag {
        field: ClinicalField,
        advice: &'static str,
    },
    /// Integer code that fires for any of the listed codes.
    Category {
        field: ClinicalField,
        codes: &'static [i64],
        advice: &'static str,
    },
}

impl Rule {
    /// Advisory contributed by this rule, if any.
    #[must_use]
    pub fn evaluate(&self, record: &PatientRecord) -> Option<&'static str> {
        match *self {
            Self::Banded {
                field,
                direction,
                moderate,
                severe,
                moderate_advice,
                severe_advice,
            } => {
                let v = record.get(field);
                if direction.crosses(v, severe) {
                    Some(severe_advice)
                } else if direction.crosses(v, moderate) {
                    Some(moderate_advice)
                } else {
                    None
                }
            }
            Self::Flag { field, advice } => (record.get(field) == 1.0).then_some(advice),
            Self::Category {
                field,
                codes,
                advice,
            } => {
                let v = record.get(field);
                codes
                    .iter()
                    .any(|&c| (v - c as f64).abs() < f64::EPSILON)
                    .then_some(advice)
            }
        }
    }
}

/// The canonical rule table, in evaluation order.
#[must_use]
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::Banded {
            field: ClinicalField::Cholesterol,
            direction: Direction::AtLeast,
            moderate: 240.0,
            severe: 300.0,
            moderate_advice: "High cholesterol (240-299 mg/dL): reduce saturated fat intake and recheck lipids within 3 months.",
            severe_advice: "Very high cholesterol (>= 300 mg/dL): discuss lipid-lowering therapy with a physician.",
        },
        Rule::Banded {
            field: ClinicalField::RestingBp,
            direction: Direction::AtLeast,
            moderate: 140.0,
            severe: 160.0,
            moderate_advice: "Elevated resting blood pressure (140-159 mmHg): limit sodium and monitor blood pressure regularly.",
            severe_advice: "Severely elevated resting blood pressure (>= 160 mmHg): seek prompt blood pressure management.",
        },
        Rule::Banded {
            field: ClinicalField::StDepression,
            direction: Direction::AtLeast,
            moderate: 1.5,
            severe: 2.5,
            moderate_advice: "Notable ST depression (1.5-2.4): consider a follow-up stress test.",
            severe_advice: "Marked ST depression (>= 2.5): possible ischemia, arrange a cardiac workup.",
        },
        Rule::Banded {
            field: ClinicalField::MaxHeartRate,
            direction: Direction::Below,
            moderate: 120.0,
            severe: 100.0,
            moderate_advice: "Reduced maximum heart rate (100-119 bpm): discuss exercise capacity with a physician.",
            severe_advice: "Very low maximum heart rate (< 100 bpm): evaluate for chronotropic incompetence.",
        },
        Rule::Flag {
            field: ClinicalField::ExerciseAngina,
            advice: "Exercise-induced angina reported: avoid strenuous exertion until evaluated.",
        },
        Rule::Category {
            field: ClinicalField::ChestPain,
            codes: &[1, 2, 3],
            advice: "Chest pain symptoms reported: keep a symptom diary and mention it at your next visit.",
        },
        Rule::Banded {
            field: ClinicalField::Age,
            direction: Direction::AtLeast,
            moderate: 55.0,
            severe: 70.0,
            moderate_advice: "Age 55 or older: schedule regular cardiovascular screening.",
            severe_advice: "Age 70 or older: annual cardiovascular assessment is recommended.",
        },
    ]
}

/// Maps a record and its risk tier to ordered advisory strings.
#[derive(Debug, Clone)]
pub struct RecommendationEngine {
    rules: Vec<Rule>,
}

impl Default for RecommendationEngine {
    fn default() -> Self {
        Self::with_rules(default_rules())
    }
}

impl RecommendationEngine {
    /// Create an engine over a custom rule table.
    #[must_use]
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The rule table in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Build the advisory list.
    ///
    /// The HIGH-tier priority advisory always comes first; rule output follows
    /// in table order; the fallback appears only when the list would otherwise
    /// be empty.
    #[must_use]
    pub fn recommend(&self, record: &PatientRecord, tier: RiskLevel) -> Vec<String> {
        let mut out = Vec::new();
        if tier == RiskLevel::High {
            out.push(HIGH_RISK_ADVISORY.to_string());
        }
        out.extend(
            self.rules
                .iter()
                .filter_map(|rule| rule.evaluate(record))
                .map(str::to_string),
        );
        if out.is_empty() {
            out.push(NO_ABNORMALITIES.to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normal() -> PatientRecord {
        PatientRecord {
            age: 45.0,
            sex: 0.0,
            cp: 0.0,
            trestbps: 118.0,
            chol: 190.0,
            fbs: 0.0,
            restecg: 0.0,
            thalach: 165.0,
            exang: 0.0,
            oldpeak: 0.4,
            slope: 2.0,
            ca: 0.0,
            thal: 2.0,
        }
    }

    fn severe_advice(index: usize) -> &'static str {
        match &default_rules()[index] {
            Rule::Banded { severe_advice, .. } => *severe_advice,
            other => panic!("rule {index} is not banded: {other:?}"),
        }
    }

    #[test]
    fn test_high_tier_ordering() {
        let record = PatientRecord {
            chol: 310.0,
            trestbps: 165.0,
            oldpeak: 1.0,
            thalach: 150.0,
            exang: 0.0,
            cp: 0.0,
            age: 50.0,
            ..normal()
        };

        let advice = RecommendationEngine::default().recommend(&record, RiskLevel::High);
        assert_eq!(
            advice,
            vec![
                HIGH_RISK_ADVISORY.to_string(),
                severe_advice(0).to_string(),
                severe_advice(1).to_string(),
            ]
        );
    }

    #[test]
    fn test_fallback_for_normal_record() {
        let advice = RecommendationEngine::default().recommend(&normal(), RiskLevel::Low);
        assert_eq!(advice, vec![NO_ABNORMALITIES.to_string()]);

        let advice = RecommendationEngine::default().recommend(&normal(), RiskLevel::Moderate);
        assert_eq!(advice, vec![NO_ABNORMALITIES.to_string()]);
    }

    #[test]
    fn test_high_tier_without_findings_has_no_fallback() {
        let advice = RecommendationEngine::default().recommend(&normal(), RiskLevel::High);
        assert_eq!(advice, vec![HIGH_RISK_ADVISORY.to_string()]);
    }

    #[test]
    fn test_moderate_bands_and_rule_order() {
        let record = PatientRecord {
            chol: 250.0,
            trestbps: 145.0,
            oldpeak: 1.5,
            thalach: 110.0,
            exang: 1.0,
            cp: 2.0,
            age: 60.0,
            ..normal()
        };
        let advice = RecommendationEngine::default().recommend(&record, RiskLevel::Moderate);
        assert_eq!(advice.len(), 7);
        assert!(advice[0].starts_with("High cholesterol"));
        assert!(advice[1].starts_with("Elevated resting blood pressure"));
        assert!(advice[2].starts_with("Notable ST depression"));
        assert!(advice[3].starts_with("Reduced maximum heart rate"));
        assert!(advice[4].starts_with("Exercise-induced angina"));
        assert!(advice[5].starts_with("Chest pain"));
        assert!(advice[6].starts_with("Age 55"));
    }

    #[test]
    fn test_band_edges() {
        let engine = RecommendationEngine::default();
        let at = |record: PatientRecord| engine.recommend(&record, RiskLevel::Low);

        assert_eq!(at(PatientRecord { chol: 239.0, ..normal() }), vec![NO_ABNORMALITIES]);
        assert!(at(PatientRecord { chol: 240.0, ..normal() })[0].starts_with("High cholesterol"));
        assert!(at(PatientRecord { chol: 300.0, ..normal() })[0].starts_with("Very high"));
        assert_eq!(at(PatientRecord { thalach: 120.0, ..normal() }), vec![NO_ABNORMALITIES]);
        assert!(at(PatientRecord { thalach: 99.0, ..normal() })[0].starts_with("Very low"));
        assert!(at(PatientRecord { age: 70.0, ..normal() })[0].starts_with("Age 70"));
    }

    #[test]
    fn test_recommend_is_deterministic() {
        let engine = RecommendationEngine::default();
        let record = PatientRecord {
            chol: 280.0,
            exang: 1.0,
            ..normal()
        };
        assert_eq!(
            engine.recommend(&record, RiskLevel::High),
            engine.recommend(&record, RiskLevel::High)
        );
    }
}
