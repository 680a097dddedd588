//! Money-weighted return over irregular monthly cash flows.
//!
//! Solves `Σ cf·(1+r)^(T−month) = terminal` for the monthly rate `r`.
//! Newton-Raphson runs first from a fixed guess; if it stalls or leaves the
//! real line the root is bracketed and bisected instead.

use thiserror::Error;

use super::types::CashFlow;

const NEWTON_ITERATIONS: u32 = 50;
const NEWTON_GUESS: f64 = 0.007;
const RESIDUAL_TOLERANCE: f64 = 0.01;
const BRACKET_LOW: f64 = -0.99;
const BRACKET_HIGH: f64 = 1.0;
const BISECTION_ITERATIONS: u32 = 200;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IrrError {
    #[error("cash flow series is empty")]
    EmptyCashFlows,
    #[error("no rate in [{low}, {high}] reproduces the terminal value")]
    NoBracket { low: f64, high: f64 },
    #[error("bisection did not converge (residual {residual:.4})")]
    ConvergenceFailed { residual: f64 },
}

/// Annualized return in percent.
pub fn solve_irr(
    cash_flows: &[CashFlow],
    terminal_value: f64,
    total_months: u32,
) -> Result<f64, IrrError> {
    let monthly = solve_monthly_rate(cash_flows, terminal_value, total_months)?;
    Ok(annualize(monthly))
}

pub fn solve_monthly_rate(
    cash_flows: &[CashFlow],
    terminal_value: f64,
    total_months: u32,
) -> Result<f64, IrrError> {
    if cash_flows.is_empty() {
        return Err(IrrError::EmptyCashFlows);
    }

    if let Some(rate) = newton(cash_flows, terminal_value, total_months) {
        return Ok(rate);
    }
    bisect(cash_flows, terminal_value, total_months)
}

pub fn annualize(monthly_rate: f64) -> f64 {
    ((1.0 + monthly_rate).powi(12) - 1.0) * 100.0
}

fn residual(cash_flows: &[CashFlow], terminal_value: f64, total_months: u32, rate: f64) -> f64 {
    let future: f64 = cash_flows
        .iter()
        .map(|cf| cf.amount * (1.0 + rate).powf(exponent(cf, total_months)))
        .sum();
    future - terminal_value
}

fn derivative(cash_flows: &[CashFlow], total_months: u32, rate: f64) -> f64 {
    cash_flows
        .iter()
        .map(|cf| {
            let t = exponent(cf, total_months);
            cf.amount * t * (1.0 + rate).powf(t - 1.0)
        })
        .sum()
}

fn exponent(cf: &CashFlow, total_months: u32) -> f64 {
    total_months as f64 - cf.month as f64
}

fn newton(cash_flows: &[CashFlow], terminal_value: f64, total_months: u32) -> Option<f64> {
    let mut rate = NEWTON_GUESS;
    for _ in 0..NEWTON_ITERATIONS {
        let f = residual(cash_flows, terminal_value, total_months, rate);
        if !f.is_finite() {
            return None;
        }
        if f.abs() < RESIDUAL_TOLERANCE {
            return Some(rate);
        }
        let df = derivative(cash_flows, total_months, rate);
        if df == 0.0 || !df.is_finite() {
            return None;
        }
        rate -= f / df;
        if !rate.is_finite() || rate <= -1.0 {
            return None;
        }
    }
    let f = residual(cash_flows, terminal_value, total_months, rate);
    (f.abs() < RESIDUAL_TOLERANCE).then_some(rate)
}

fn bisect(
    cash_flows: &[CashFlow],
    terminal_value: f64,
    total_months: u32,
) -> Result<f64, IrrError> {
    let mut low = BRACKET_LOW;
    let mut high = BRACKET_HIGH;
    let mut f_low = residual(cash_flows, terminal_value, total_months, low);
    let f_high = residual(cash_flows, terminal_value, total_months, high);

    if !f_low.is_finite() || !f_high.is_finite() || f_low * f_high > 0.0 {
        return Err(IrrError::NoBracket { low, high });
    }

    let mut mid = 0.5 * (low + high);
    let mut f_mid = f64::INFINITY;
    for _ in 0..BISECTION_ITERATIONS {
        mid = 0.5 * (low + high);
        f_mid = residual(cash_flows, terminal_value, total_months, mid);
        if f_mid.abs() < RESIDUAL_TOLERANCE || (high - low) < 1e-15 {
            return Ok(mid);
        }
        if f_low * f_mid < 0.0 {
            high = mid;
        } else {
            low = mid;
            f_low = f_mid;
        }
    }

    if (high - low) < 1e-12 {
        Ok(mid)
    } else {
        Err(IrrError::ConvergenceFailed { residual: f_mid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn flow(month: u32, amount: f64) -> CashFlow {
        CashFlow { month, amount }
    }

    #[test]
    fn single_outlay_recovers_compound_rate() {
        let terminal = 1_000.0 * 1.08_f64.powi(10);
        let irr = solve_irr(&[flow(0, 1_000.0)], terminal, 120).expect("solvable");
        assert_close(irr, 8.0, 1e-4);
    }

    #[test]
    fn zero_growth_gives_zero_return() {
        let flows = [flow(0, 500.0), flow(12, 500.0)];
        let irr = solve_irr(&flows, 1_000.0, 24).expect("solvable");
        assert_close(irr, 0.0, 1e-3);
    }

    #[test]
    fn intermediate_contributions_are_weighted_by_time() {
        let monthly: f64 = 0.01;
        let flows = [flow(0, 10_000.0), flow(60, 5_000.0)];
        let terminal =
            10_000.0 * (1.0 + monthly).powi(120) + 5_000.0 * (1.0 + monthly).powi(60);
        let rate = solve_monthly_rate(&flows, terminal, 120).expect("solvable");
        assert_close(rate, monthly, 1e-7);
    }

    #[test]
    fn heavy_loss_resolves_to_deeply_negative_return() {
        let irr = solve_irr(&[flow(0, 100_000.0)], 1_000.0, 12).expect("solvable");
        assert_close(irr, -99.0, 0.01);
    }

    #[test]
    fn bisection_agrees_with_newton() {
        let flows = [flow(0, 1_000.0), flow(36, 250.0)];
        let terminal = 2_100.0;
        let from_newton = newton(&flows, terminal, 120).expect("newton converges");
        let from_bisection = bisect(&flows, terminal, 120).expect("bracketed");
        assert_close(from_bisection, from_newton, 1e-6);
    }

    #[test]
    fn empty_flows_are_rejected() {
        assert_eq!(solve_irr(&[], 10.0, 12), Err(IrrError::EmptyCashFlows));
    }

    #[test]
    fn unreachable_terminal_reports_missing_bracket() {
        let err = solve_irr(&[flow(0, 1.0)], 1e30, 12).expect_err("no root");
        assert!(matches!(err, IrrError::NoBracket { .. }));
    }
}
