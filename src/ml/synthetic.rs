//! Seeded synthetic cohorts shaped like the Cleveland heart disease table.
//!
//! Labels alternate 0/1 so every cohort is balanced. Class 1 rows are shifted
//! towards older age, higher blood pressure and cholesterol, lower maximum
//! heart rate and more ST depression, which makes the classes separable but
//! overlapping. All values stay inside the documented input domains.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::domain::{LabeledRecord, PatientRecord};

/// Generate `rows` labeled records; ids run from 1.
#[must_use]
pub fn generate_cohort(rows: usize, seed: u64) -> Vec<LabeledRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..rows)
        .map(|i| {
            let label = (i % 2) as u8;
            LabeledRecord::new(i as i64 + 1, &sample_record(&mut rng, label == 1), label)
        })
        .collect()
}

fn sample_record<R: Rng>(rng: &mut R, disease: bool) -> PatientRecord {
    let shift = if disease { 1.0 } else { -1.0 };
    let mut normal = |mean: f64, sd: f64, lo: f64, hi: f64| -> f64 {
        let z: f64 = rng.sample(StandardNormal);
        (mean + sd * z).clamp(lo, hi)
    };

    let age = normal(54.0 + 5.0 * shift, 8.0, 29.0, 77.0).round();
    let trestbps = normal(131.0 + 6.0 * shift, 16.0, 94.0, 200.0).round();
    let chol = normal(246.0 + 18.0 * shift, 48.0, 126.0, 564.0).round();
    let thalach = normal(150.0 - 14.0 * shift, 20.0, 71.0, 202.0).round();
    let oldpeak = (normal(1.0 + 0.6 * shift, 0.9, 0.0, 6.2) * 10.0).round() / 10.0;

    let flag = |rng: &mut R, p: f64| if rng.gen_bool(p) { 1.0 } else { 0.0 };
    let (p_exang, p_male, p_reversible) = if disease {
        (0.55, 0.8, 0.65)
    } else {
        (0.15, 0.55, 0.2)
    };

    PatientRecord {
        age,
        sex: flag(rng, p_male),
        cp: if disease && rng.gen_bool(0.6) {
            0.0
        } else {
            f64::from(rng.gen_range(0..4u8))
        },
        trestbps,
        chol,
        fbs: flag(rng, 0.15),
        restecg: f64::from(rng.gen_range(0..3u8)),
        thalach,
        exang: flag(rng, p_exang),
        oldpeak,
        slope: f64::from(rng.gen_range(0..3u8)),
        ca: f64::from(rng.gen_range(0..if disease { 4u8 } else { 2u8 })),
        thal: if rng.gen_bool(p_reversible) { 3.0 } else { 2.0 },
    }
}
