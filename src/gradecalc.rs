use crate::store::StoreError;

/// How adjacent equal thresholds get separated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingOption {
    /// Spread by whole points.
    Whole,
    /// Spread by half points.
    Half,
}

impl RoundingOption {
    pub fn parse(raw: i64) -> Result<Self, StoreError> {
        match raw {
            1 => Ok(RoundingOption::Whole),
            2 => Ok(RoundingOption::Half),
            _ => Err(StoreError::validation(
                "rounding option must be 1 (whole points) or 2 (half points)",
            )),
        }
    }

    fn increment(self) -> f64 {
        match self {
            RoundingOption::Whole => 1.0,
            RoundingOption::Half => 0.5,
        }
    }
}

/// Cutoffs for very small scales, where the percentage ladder collapses.
/// Indexed by the rounded maximum (4..=9).
const SMALL_SCALE_TABLES: [[i64; 10]; 6] = [
    [4, 4, 3, 3, 2, 2, 1, 1, 0, 0],
    [5, 5, 4, 3, 2, 2, 1, 1, 0, 0],
    [6, 6, 5, 4, 3, 3, 2, 1, 0, 0],
    [7, 6, 5, 4, 3, 2, 1, 1, 0, 0],
    [8, 7, 6, 5, 4, 3, 2, 1, 0, 0],
    [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
];

/// Fraction of the maximum at each boundary: the top and bottom of the five
/// grade bands, interleaved high/low.
const BAND_FRACTIONS: [f64; 10] = [1.0, 0.90, 0.89, 0.75, 0.74, 0.50, 0.49, 0.35, 0.34, 0.0];

/// Ten descending grade-band cutoffs for a test worth `max_points`.
///
/// Scales that round below 4 have no usable ladder and yield nothing. Scales
/// rounding into 4..=9 use fixed tables (both rounding options agree there).
/// Larger scales take the percentage ladder, then nudge collided neighbors
/// apart by the rounding increment and re-open any band squeezed shut by the
/// nudges.
pub fn thresholds(max_points: f64, rounding: RoundingOption) -> Vec<f64> {
    let scale = max_points.round_ties_even();
    if scale < 4.0 {
        return Vec::new();
    }
    if scale <= 9.0 {
        let table = SMALL_SCALE_TABLES[(scale as usize) - 4];
        return table.iter().map(|&g| g as f64).collect();
    }

    let mut grades: Vec<f64> = BAND_FRACTIONS
        .iter()
        .map(|&frac| (max_points * frac).round_ties_even())
        .collect();

    // Adjacent boundaries that rounded onto the same value get split apart.
    for i in 0..9 {
        if grades[i] == grades[i + 1] {
            grades[i] += rounding.increment();
        }
    }
    // A band's floor must sit at least a point under its ceiling; lift the
    // floor of the band below when the gap opened up.
    for (high, low) in [(1, 2), (3, 4), (5, 6), (7, 8)] {
        if grades[high] - grades[low] >= 1.0 {
            grades[low] += rounding.increment();
        }
    }
    grades[0] = max_points;
    grades
}
