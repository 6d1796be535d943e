//! Feature encoder: standard scaling of the 13 numeric columns plus a one-hot
//! encoding of the derived age band.
//!
//! Statistics are captured once by [`FeatureEncoder::fit`] on the training
//! split and never recomputed; [`FeatureEncoder::transform`] is a pure function
//! of the fitted state and the record.

use std::collections::BTreeSet;

use ndarray::{Array1, Array2, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::domain::{AgeBand, ClinicalField, EncodingError, PatientRecord, FEATURE_NAMES};

/// Fitted column transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    means: Array1<f64>,
    scales: Array1<f64>,
    categories: Vec<AgeBand>,
}

/// Raw records as an `n x 13` matrix in canonical column order.
fn raw_matrix(records: &[PatientRecord]) -> Array2<f64> {
    Array2::from_shape_fn((records.len(), ClinicalField::ALL.len()), |(i, j)| {
        records[i].get(ClinicalField::ALL[j])
    })
}

impl FeatureEncoder {
    /// Capture scaling statistics and the seen age bands.
    ///
    /// Uses population variance; a constant column keeps a scale of 1.
    ///
    /// # Errors
    /// Returns `EmptyFit` for no records and `NonNumeric` for NaN/inf values.
    pub fn fit(records: &[PatientRecord]) -> Result<Self, EncodingError> {
        for record in records {
            record.ensure_finite()?;
        }

        let raw = raw_matrix(records);
        let means = raw.mean_axis(Axis(0)).ok_or(EncodingError::EmptyFit)?;
        let scales = Zip::from(&raw.std_axis(Axis(0), 0.0))
            .and(&means)
            .map_collect(|&std, &mean| {
                if std > 10.0 * f64::EPSILON * mean.abs().max(1.0) {
                    std
                } else {
                    1.0
                }
            });

        let categories: Vec<AgeBand> = records
            .iter()
            .map(PatientRecord::age_band)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        tracing::debug!(
            "Fitted encoder on {} records ({} age bands seen)",
            records.len(),
            categories.len()
        );

        Ok(Self {
            means,
            scales,
            categories,
        })
    }

    /// Number of raw fields consumed.
    #[must_use]
    pub fn n_inputs(&self) -> usize {
        self.means.len()
    }

    /// Width of the encoded vector.
    #[must_use]
    pub fn n_outputs(&self) -> usize {
        self.means.len() + self.categories.len()
    }

    /// Age bands that have a one-hot column.
    #[must_use]
    pub fn categories(&self) -> &[AgeBand] {
        &self.categories
    }

    /// Names of the encoded columns, in output order.
    #[must_use]
    pub fn output_names(&self) -> Vec<String> {
        FEATURE_NAMES
            .iter()
            .map(|name| (*name).to_string())
            .chain(
                self.categories
                    .iter()
                    .map(|band| format!("age_group={}", band.label())),
            )
            .collect()
    }

    /// Encode one record.
    ///
    /// An age band not seen during `fit` encodes to all zeros.
    ///
    /// # Errors
    /// Returns `NonNumeric` if any field is NaN or infinite.
    pub fn transform(&self, record: &PatientRecord) -> Result<Array1<f64>, EncodingError> {
        record.ensure_finite()?;

        let band = record.age_band();
        let scaled = ClinicalField::ALL
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(&field, (mean, scale))| (record.get(field) - mean) / scale);
        let one_hot = self
            .categories
            .iter()
            .map(|&c| if c == band { 1.0 } else { 0.0 });
        Ok(scaled.chain(one_hot).collect())
    }

    /// Encode many records into an `n x n_outputs` matrix.
    ///
    /// # Errors
    /// Fails on the first record that cannot be encoded.
    pub fn transform_batch(
        &self,
        records: &[PatientRecord],
    ) -> Result<Array2<f64>, EncodingError> {
        let mut out = Array2::zeros((records.len(), self.n_outputs()));
        for (mut row, record) in out.outer_iter_mut().zip(records) {
            row.assign(&self.transform(record)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, s};

    use super::*;

    fn record(age: f64, chol: f64) -> PatientRecord {
        PatientRecord {
            age,
            sex: 1.0,
            cp: 0.0,
            trestbps: 130.0,
            chol,
            fbs: 0.0,
            restecg: 1.0,
            thalach: 150.0,
            exang: 0.0,
            oldpeak: 1.0,
            slope: 1.0,
            ca: 0.0,
            thal: 2.0,
        }
    }

    #[test]
    fn test_fit_standardizes_training_split() {
        let train = vec![record(40.0, 200.0), record(60.0, 300.0)];
        let encoder = FeatureEncoder::fit(&train).expect("fit");
        assert_eq!(encoder.n_inputs(), 13);
        assert_eq!(encoder.n_outputs(), 15);

        let x = encoder.transform(&train[0]).expect("transform");
        assert!((x[0] + 1.0).abs() < 1e-12); // age: (40 - 50) / 10
        assert!((x[4] + 1.0).abs() < 1e-12); // chol: (200 - 250) / 50
        // constant columns keep scale 1 and center to zero
        assert!(x[3].abs() < 1e-12);
        assert_eq!(x.slice(s![13..]), array![1.0, 0.0]);
    }

    #[test]
    fn test_unseen_age_band_encodes_to_zeros() {
        let encoder = FeatureEncoder::fit(&[record(45.0, 220.0), record(50.0, 240.0)]).expect("fit");
        assert_eq!(encoder.categories(), &[AgeBand::Band40To54]);

        let x = encoder.transform(&record(75.0, 230.0)).expect("transform");
        assert_eq!(x.len(), 14);
        assert_eq!(x[13], 0.0);
    }

    #[test]
    fn test_transform_is_pure() {
        let encoder = FeatureEncoder::fit(&[record(45.0, 220.0), record(66.0, 280.0)]).expect("fit");
        let patient = record(58.0, 251.0);
        let first = encoder.transform(&patient).expect("transform");
        let second = encoder.transform(&patient).expect("transform");
        assert_eq!(first, second);
        // statistics unaffected by scoring
        assert_eq!(
            encoder,
            FeatureEncoder::fit(&[record(45.0, 220.0), record(66.0, 280.0)]).expect("fit")
        );
    }

    #[test]
    fn test_transform_batch_stacks_rows() {
        let train = vec![record(40.0, 200.0), record(60.0, 300.0), record(72.0, 250.0)];
        let encoder = FeatureEncoder::fit(&train).expect("fit");
        let x = encoder.transform_batch(&train).expect("transform");
        assert_eq!(x.dim(), (3, 16));
        for (row, record) in x.outer_iter().zip(&train) {
            assert_eq!(row, encoder.transform(record).expect("transform"));
        }
        // standardized columns are centered on the training split
        assert!(x.column(4).sum().abs() < 1e-9);
    }

    #[test]
    fn test_output_names() {
        let encoder =
            FeatureEncoder::fit(&[record(45.0, 220.0), record(72.0, 280.0)]).expect("fit");
        let names = encoder.output_names();
        assert_eq!(names.len(), encoder.n_outputs());
        assert_eq!(names[0], "age");
        assert_eq!(names[13], "age_group=40_54");
        assert_eq!(names[14], "age_group=70_plus");
    }

    #[test]
    fn test_encoding_errors() {
        assert_eq!(FeatureEncoder::fit(&[]), Err(EncodingError::EmptyFit));

        let encoder = FeatureEncoder::fit(&[record(45.0, 220.0)]).expect("fit");
        let bad = PatientRecord {
            chol: f64::INFINITY,
            ..record(45.0, 220.0)
        };
        assert!(matches!(
            encoder.transform(&bad),
            Err(EncodingError::NonNumeric { field: "chol", .. })
        ));
    }
}
