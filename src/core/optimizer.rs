use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use super::engine::simulate;
use super::types::SimulationParams;

pub const DOWN_PERCENT_RANGE: (u32, u32, u32) = (25, 100, 5);
pub const TERM_YEARS_RANGE: (u32, u32, u32) = (10, 30, 1);
pub const HORIZON_YEARS_RANGE: (u32, u32, u32) = (5, 50, 2);

/// Objectives closer than this count as a tie, broken toward the longer term.
const TIE_TOLERANCE: f64 = 0.05;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum HorizonMode {
    #[default]
    Sweep,
    Locked,
    /// Horizon equals the candidate term.
    MatchTerm,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct OptimizerConfig {
    pub lock_down: bool,
    pub lock_term: bool,
    pub horizon: HorizonMode,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweetSpot {
    /// Down payment in percent of the price.
    pub down: u32,
    pub term: u32,
    pub horizon: u32,
    /// Real-estate annualized return in percent.
    pub objective: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct Cell {
    down: u32,
    term: u32,
    horizon: u32,
}

/// Grid search for the (down payment, term, horizon) maximizing the
/// real-estate annualized return. Locked axes use the value in `base`.
///
/// Returns `None` when no cell produced a finite objective, including when
/// `cancel` was raised before any cell finished.
pub fn search_sweet_spots(
    base: &SimulationParams,
    config: OptimizerConfig,
    cancel: Option<&AtomicBool>,
) -> Option<SweetSpot> {
    let cells = grid(base, config);
    let is_cancelled = || cancel.is_some_and(|flag| flag.load(Ordering::Relaxed));

    let objectives: Vec<Option<f64>> = cells
        .par_iter()
        .map(|cell| {
            if is_cancelled() {
                return None;
            }
            Some(evaluate(base, *cell))
        })
        .collect();

    if is_cancelled() {
        debug!(cells = cells.len(), "sweet spot search cancelled");
    }

    let mut best: Option<SweetSpot> = None;
    for (cell, objective) in cells.iter().zip(objectives) {
        let Some(objective) = objective.filter(|value| value.is_finite()) else {
            continue;
        };
        let candidate = SweetSpot {
            down: cell.down,
            term: cell.term,
            horizon: cell.horizon,
            objective,
        };
        if best.is_none_or(|incumbent| replaces(&candidate, &incumbent)) {
            best = Some(candidate);
        }
    }

    info!(cells = cells.len(), best = ?best, "sweet spot search finished");
    best
}

fn replaces(candidate: &SweetSpot, incumbent: &SweetSpot) -> bool {
    candidate.objective > incumbent.objective
        || ((candidate.objective - incumbent.objective).abs() < TIE_TOLERANCE
            && candidate.term > incumbent.term)
}

fn evaluate(base: &SimulationParams, cell: Cell) -> f64 {
    let params = SimulationParams {
        down_payment: cell.down as f64 / 100.0,
        loan_term_years: cell.term,
        sim_horizon_years: cell.horizon,
        return_series: false,
        ..base.clone()
    };
    simulate(&params).cagr_re
}

fn axis((start, end, step): (u32, u32, u32)) -> Vec<u32> {
    (start..=end).step_by(step as usize).collect()
}

fn grid(base: &SimulationParams, config: OptimizerConfig) -> Vec<Cell> {
    let current_down = (base.down_payment * 100.0).round().max(0.0) as u32;
    let downs = if config.lock_down {
        vec![current_down]
    } else {
        axis(DOWN_PERCENT_RANGE)
    };
    let terms = if config.lock_term {
        vec![base.loan_term_years]
    } else {
        axis(TERM_YEARS_RANGE)
    };
    let swept_horizons = match config.horizon {
        HorizonMode::Sweep => axis(HORIZON_YEARS_RANGE),
        HorizonMode::Locked => vec![base.sim_horizon_years],
        HorizonMode::MatchTerm => Vec::new(),
    };

    let mut cells = Vec::new();
    for &down in &downs {
        for &term in &terms {
            if config.horizon == HorizonMode::MatchTerm {
                cells.push(Cell {
                    down,
                    term,
                    horizon: term,
                });
                continue;
            }
            for &horizon in &swept_horizons {
                cells.push(Cell {
                    down,
                    term,
                    horizon,
                });
            }
        }
    }
    cells
}
