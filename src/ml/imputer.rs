//! Fill values for empty training cells.
//!
//! Measurements take the median of the observed values and coded fields the
//! most frequent code, both learned on the training split only. Scoring input
//! is never imputed.

use std::collections::BTreeMap;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::domain::{ClinicalField, EncodingError, LabeledRecord, PatientRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnImputer {
    fill: Array1<f64>,
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Most frequent value; ties go to the smallest.
fn most_frequent(values: &[f64]) -> f64 {
    let mut counts: BTreeMap<u64, (f64, usize)> = BTreeMap::new();
    for &v in values {
        counts.entry(v.to_bits()).or_insert((v, 0)).1 += 1;
    }
    counts
        .into_values()
        .fold((f64::INFINITY, 0), |best, (v, count)| {
            if count > best.1 || (count == best.1 && v < best.0) {
                (v, count)
            } else {
                best
            }
        })
        .0
}

impl ColumnImputer {
    /// Learn one fill value per column from the finite values present.
    ///
    /// # Errors
    /// `EmptyFit` for no rows, `Unobserved` for a column with no usable value.
    pub fn fit(rows: &[LabeledRecord]) -> Result<Self, EncodingError> {
        if rows.is_empty() {
            return Err(EncodingError::EmptyFit);
        }
        let fill = ClinicalField::ALL
            .iter()
            .enumerate()
            .map(|(j, &field)| {
                let observed: Vec<f64> = rows
                    .iter()
                    .filter_map(|row| row.values[j])
                    .filter(|v| v.is_finite())
                    .collect();
                if observed.is_empty() {
                    Err(EncodingError::Unobserved(field.name()))
                } else if field.is_continuous() {
                    Ok(median(observed))
                } else {
                    Ok(most_frequent(&observed))
                }
            })
            .collect::<Result<Array1<f64>, _>>()?;
        Ok(Self { fill })
    }

    /// Fill value for one field.
    #[must_use]
    pub fn fill_value(&self, field: ClinicalField) -> f64 {
        let j = ClinicalField::ALL
            .iter()
            .position(|&f| f == field)
            .unwrap_or_default();
        self.fill[j]
    }

    /// Complete a row, replacing empty cells with the learned values.
    ///
    /// # Errors
    /// `Arity` if the imputer was not fitted on 13 columns.
    pub fn fill(&self, row: &LabeledRecord) -> Result<PatientRecord, EncodingError> {
        let values: Vec<f64> = row
            .values
            .iter()
            .zip(&self.fill)
            .map(|(value, &fill)| value.unwrap_or(fill))
            .collect();
        PatientRecord::from_vec(&values)
    }

    /// Complete every row, returning the records and the number of cells filled.
    ///
    /// # Errors
    /// See [`ColumnImputer::fill`].
    pub fn fill_all(
        &self,
        rows: &[LabeledRecord],
    ) -> Result<(Vec<PatientRecord>, usize), EncodingError> {
        let filled = rows.iter().map(|row| row.missing_fields().count()).sum();
        let records = rows
            .iter()
            .map(|row| self.fill(row))
            .collect::<Result<_, _>>()?;
        Ok((records, filled))
    }
}
