//! Annual macro history, starting in 2000.
//!
//! Used in place of the scalar market assumptions when the matching history
//! toggle is set. Simulation year `i` reads element `i`; years past the end of
//! a series reuse its last element. Values are annual fractions except
//! [`USD_ILS`], which is the average exchange rate for the year.

/// S&P 500 total return.
pub const EQUITY_RETURNS: &[f64] = &[
    -0.0910, -0.1189, -0.2210, 0.2868, 0.1088, 0.0491, 0.1579, 0.0549, -0.3700, 0.2646, 0.1506,
    0.0211, 0.1600, 0.3239, 0.1369, 0.0138, 0.1196, 0.2183, -0.0438, 0.3149, 0.1840, 0.2871,
    -0.1811, 0.2629, 0.2502,
];

/// Israeli dwelling price index change.
pub const APPRECIATION: &[f64] = &[
    -0.020, -0.015, 0.010, -0.040, -0.020, 0.015, -0.010, 0.005, 0.080, 0.200, 0.160, 0.060,
    0.065, 0.075, 0.055, 0.070, 0.085, 0.030, -0.010, 0.025, 0.035, 0.130, 0.185, -0.005, 0.070,
];

pub const USD_ILS: &[f64] = &[
    4.08, 4.21, 4.74, 4.55, 4.48, 4.49, 4.46, 4.11, 3.59, 3.93, 3.73, 3.58, 3.86, 3.61, 3.58,
    3.89, 3.84, 3.60, 3.59, 3.56, 3.44, 3.23, 3.36, 3.69, 3.70,
];

/// Israeli consumer price index change.
pub const CPI: &[f64] = &[
    0.000, 0.014, 0.065, -0.019, 0.012, 0.024, -0.001, 0.034, 0.038, 0.039, 0.027, 0.022, 0.016,
    0.018, -0.002, -0.010, -0.002, 0.004, 0.008, 0.006, -0.007, 0.028, 0.053, 0.030, 0.032,
];

/// Bank of Israel year-end policy rate. Starts in 2001, one year after the other series.
pub const POLICY_RATE: &[f64] = &[
    0.0380, 0.0910, 0.0520, 0.0390, 0.0450, 0.0500, 0.0400, 0.0250, 0.0100, 0.0200, 0.0275,
    0.0200, 0.0100, 0.0025, 0.0010, 0.0010, 0.0010, 0.0025, 0.0025, 0.0010, 0.0010, 0.0325,
    0.0475, 0.0450,
];

/// Element `index` of `series`, clamped to the last element.
pub fn at(series: &[f64], index: usize) -> f64 {
    match series.get(index) {
        Some(value) => *value,
        None => series.last().copied().unwrap_or(0.0),
    }
}

/// Year-over-year FX ratio from simulation year `index` to the next.
pub fn fx_ratio(index: usize) -> f64 {
    let from = at(USD_ILS, index);
    let to = at(USD_ILS, index + 1);
    if from > 0.0 { to / from } else { 1.0 }
}
