//! Patient record types for heart disease risk prediction.
//!
//! Based on the 13 clinical attributes of the UCI / Cleveland heart disease dataset.

use serde::{Deserialize, Serialize};

/// Errors raised while turning raw input into a numeric patient record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodingError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field {field} is not numeric: {value}")]
    NonNumeric { field: &'static str, value: String },

    #[error("Expected {expected} features, got {got}")]
    Arity { expected: usize, got: usize },

    #[error("Encoder has not been fitted on any records")]
    EmptyFit,

    #[error("Column {0} has no observed values to impute from")]
    Unobserved(&'static str),
}

/// The 13 clinical fields, in canonical column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClinicalField {
    Age,
    Sex,
    ChestPain,
    RestingBp,
    Cholesterol,
    FastingBloodSugar,
    RestEcg,
    MaxHeartRate,
    ExerciseAngina,
    StDepression,
    Slope,
    Vessels,
    Thal,
}

impl ClinicalField {
    /// All fields in canonical order.
    pub const ALL: [ClinicalField; 13] = [
        Self::Age,
        Self::Sex,
        Self::ChestPain,
        Self::RestingBp,
        Self::Cholesterol,
        Self::FastingBloodSugar,
        Self::RestEcg,
        Self::MaxHeartRate,
        Self::ExerciseAngina,
        Self::StDepression,
        Self::Slope,
        Self::Vessels,
        Self::Thal,
    ];

    /// Column name used by the training table, the prediction log and JSON input.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Age => "age",
            Self::Sex => "sex",
            Self::ChestPain => "cp",
            Self::RestingBp => "trestbps",
            Self::Cholesterol => "chol",
            Self::FastingBloodSugar => "fbs",
            Self::RestEcg => "restecg",
            Self::MaxHeartRate => "thalach",
            Self::ExerciseAngina => "exang",
            Self::StDepression => "oldpeak",
            Self::Slope => "slope",
            Self::Vessels => "ca",
            Self::Thal => "thal",
        }
    }

    /// Whether the field is a measurement rather than an integer code.
    #[must_use]
    pub fn is_continuous(self) -> bool {
        matches!(
            self,
            Self::Age | Self::RestingBp | Self::Cholesterol | Self::MaxHeartRate | Self::StDepression
        )
    }
}

/// Field names in canonical order.
pub const FEATURE_NAMES: [&str; 13] = [
    "age", "sex", "cp", "trestbps", "chol", "fbs", "restecg", "thalach", "exang", "oldpeak",
    "slope", "ca", "thal",
];

/// Derived three-way bucketing of patient age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeBand {
    /// Age up to and including 54.
    Band40To54,
    /// Age 55 through 69.
    Band55To69,
    /// Age 70 and over.
    Band70Plus,
}

impl AgeBand {
    pub const ALL: [AgeBand; 3] = [Self::Band40To54, Self::Band55To69, Self::Band70Plus];

    /// Category label as stored in the `age_group` column.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Band40To54 => "40_54",
            Self::Band55To69 => "55_69",
            Self::Band70Plus => "70_plus",
        }
    }
}

impl std::fmt::Display for AgeBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Compute the age band for an age in years.
///
/// Fractional ages between bands fall into the lower band, so the three bands
/// cover the whole real line.
#[must_use]
pub fn compute_age_band(age: f64) -> AgeBand {
    if age < 55.0 {
        AgeBand::Band40To54
    } else if age < 70.0 {
        AgeBand::Band55To69
    } else {
        AgeBand::Band70Plus
    }
}

/// One patient's clinical attributes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PatientRecord {
    /// Age in years
    pub age: f64,
    /// Sex: 1 = male, 0 = female
    pub sex: f64,
    /// Chest pain type code (0-3)
    pub cp: f64,
    /// Resting blood pressure in mmHg
    pub trestbps: f64,
    /// Serum cholesterol in mg/dL
    pub chol: f64,
    /// Fasting blood sugar > 120 mg/dL: 1 = yes, 0 = no
    pub fbs: f64,
    /// Resting ECG code (0-2)
    pub restecg: f64,
    /// Maximum heart rate achieved
    pub thalach: f64,
    /// Exercise-induced angina: 1 = yes, 0 = no
    pub exang: f64,
    /// ST depression induced by exercise relative to rest
    pub oldpeak: f64,
    /// Slope of the peak exercise ST segment (0-2)
    pub slope: f64,
    /// Number of major vessels colored by fluoroscopy (0-3)
    pub ca: f64,
    /// Thalassemia code
    pub thal: f64,
}

impl PatientRecord {
    /// Value of one field.
    #[must_use]
    pub fn get(&self, field: ClinicalField) -> f64 {
        match field {
            ClinicalField::Age => self.age,
            ClinicalField::Sex => self.sex,
            ClinicalField::ChestPain => self.cp,
            ClinicalField::RestingBp => self.trestbps,
            ClinicalField::Cholesterol => self.chol,
            ClinicalField::FastingBloodSugar => self.fbs,
            ClinicalField::RestEcg => self.restecg,
            ClinicalField::MaxHeartRate => self.thalach,
            ClinicalField::ExerciseAngina => self.exang,
            ClinicalField::StDepression => self.oldpeak,
            ClinicalField::Slope => self.slope,
            ClinicalField::Vessels => self.ca,
            ClinicalField::Thal => self.thal,
        }
    }

    /// The derived age band.
    #[must_use]
    pub fn age_band(&self) -> AgeBand {
        compute_age_band(self.age)
    }

    /// Convert to a vector in canonical field order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f64> {
        ClinicalField::ALL.iter().map(|&f| self.get(f)).collect()
    }

    /// Create a record from a vector in canonical field order.
    ///
    /// # Errors
    /// Returns `EncodingError::Arity` if the vector length is not 13.
    pub fn from_vec(v: &[f64]) -> Result<Self, EncodingError> {
        if v.len() != FEATURE_NAMES.len() {
            return Err(EncodingError::Arity {
                expected: FEATURE_NAMES.len(),
                got: v.len(),
            });
        }

        Ok(Self {
            age: v[0],
            sex: v[1],
            cp: v[2],
            trestbps: v[3],
            chol: v[4],
            fbs: v[5],
            restecg: v[6],
            thalach: v[7],
            exang: v[8],
            oldpeak: v[9],
            slope: v[10],
            ca: v[11],
            thal: v[12],
        })
    }

    /// Parse a record from a JSON object keyed by field name.
    ///
    /// Numbers and numeric strings are accepted; anything else is rejected.
    ///
    /// # Errors
    /// Returns `MissingField` for an absent key and `NonNumeric` for a value that
    /// is not a finite number.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, EncodingError> {
        let mut values = Vec::with_capacity(FEATURE_NAMES.len());
        for field in ClinicalField::ALL {
            let name = field.name();
            let raw = value.get(name).ok_or(EncodingError::MissingField(name))?;
            let parsed = match raw {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            match parsed {
                Some(x) if x.is_finite() => values.push(x),
                _ => {
                    return Err(EncodingError::NonNumeric {
                        field: name,
                        value: raw.to_string(),
                    })
                }
            }
        }
        Self::from_vec(&values)
    }

    /// Reject records carrying NaN or infinite values.
    ///
    /// # Errors
    /// Returns `NonNumeric` naming the first offending field.
    pub fn ensure_finite(&self) -> Result<(), EncodingError> {
        for field in ClinicalField::ALL {
            let v = self.get(field);
            if !v.is_finite() {
                return Err(EncodingError::NonNumeric {
                    field: field.name(),
                    value: v.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Validate that all fields are within the accepted input domains.
    ///
    /// This is the input boundary check; the scoring core assumes it passed.
    ///
    /// # Errors
    /// Returns validation errors as a vector of strings.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let mut range = |name: &str, v: f64, lo: f64, hi: f64| {
            if !(lo..=hi).contains(&v) {
                errors.push(format!("{name} {v} out of range [{lo}, {hi}]"));
            }
        };
        range("Age", self.age, 18.0, 100.0);
        range("Resting BP", self.trestbps, 80.0, 220.0);
        range("Cholesterol", self.chol, 100.0, 600.0);
        range("Max heart rate", self.thalach, 60.0, 220.0);
        range("ST depression", self.oldpeak, 0.0, 10.0);

        let mut code = |name: &str, v: f64, allowed: &[f64]| {
            if !allowed.contains(&v) {
                errors.push(format!("{name} {v} must be one of {allowed:?}"));
            }
        };
        code("Sex", self.sex, &[0.0, 1.0]);
        code("Chest pain type", self.cp, &[0.0, 1.0, 2.0, 3.0]);
        code("Fasting blood sugar", self.fbs, &[0.0, 1.0]);
        code("Rest ECG", self.restecg, &[0.0, 1.0, 2.0]);
        code("Exercise angina", self.exang, &[0.0, 1.0]);
        code("Slope", self.slope, &[0.0, 1.0, 2.0]);
        code("Major vessels", self.ca, &[0.0, 1.0, 2.0, 3.0]);
        code("Thal", self.thal, &[0.0, 1.0, 2.0, 3.0]);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// One row of the training table: identifier, clinical fields and label.
///
/// Source tables may leave cells empty; those are `None` here and filled in by
/// the trainer. Scoring input is always a complete [`PatientRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    pub id: i64,
    /// Values in canonical field order
    pub values: [Option<f64>; 13],
    /// 1 = heart disease present, 0 = absent
    pub label: u8,
}

impl LabeledRecord {
    /// A row with every field present.
    #[must_use]
    pub fn new(id: i64, record: &PatientRecord, label: u8) -> Self {
        Self {
            id,
            values: ClinicalField::ALL.map(|field| Some(record.get(field))),
            label,
        }
    }

    /// The clinical fields, if none is missing.
    #[must_use]
    pub fn record(&self) -> Option<PatientRecord> {
        let values: Vec<f64> = self.values.iter().copied().collect::<Option<_>>()?;
        PatientRecord::from_vec(&values).ok()
    }

    /// Fields with no value.
    pub fn missing_fields(&self) -> impl Iterator<Item = ClinicalField> + '_ {
        ClinicalField::ALL
            .into_iter()
            .zip(&self.values)
            .filter(|(_, v)| v.is_none())
            .map(|(field, _)| field)
    }
}
