mod engine;
pub mod history;
pub mod irr;
mod optimizer;
mod payment;
mod tax;
mod types;

pub use engine::simulate;
pub use irr::{IrrError, solve_irr};
pub use optimizer::{HorizonMode, OptimizerConfig, SweetSpot, search_sweet_spots};
pub use payment::{
    CpiLinkage, RateReset, Schedule, ScheduleParams, ScheduleRow, balance_after,
    generate_schedule, payment, total_interest,
};
pub use tax::{CapitalGainsTax, capital_gains, purchase_tax, rental_tax};
pub use types::{
    CashFlow, ExchangeMode, ExemptionType, Fees, GainsBasis, HistoryToggles, MarketAssumptions,
    Prepayment, PurchaseTax, RepayMethod, SaleTax, SeriesPoint, SimConfig, SimulationParams,
    SimulationResult, SurplusMode, TaxRegime, TaxSummary, TrackKind, TrackMap,
};
