use std::ops::{Index, IndexMut};

use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TrackKind {
    Prime,
    Kalats,
    Katz,
    Malatz,
    Matz,
}

impl TrackKind {
    pub const ALL: [TrackKind; 5] = [
        TrackKind::Prime,
        TrackKind::Kalats,
        TrackKind::Katz,
        TrackKind::Malatz,
        TrackKind::Matz,
    ];
}

/// One value per mortgage track, addressable by [`TrackKind`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMap<T> {
    pub prime: T,
    pub kalats: T,
    pub katz: T,
    pub malatz: T,
    pub matz: T,
}

impl<T> TrackMap<T> {
    pub fn from_fn(mut f: impl FnMut(TrackKind) -> T) -> Self {
        Self {
            prime: f(TrackKind::Prime),
            kalats: f(TrackKind::Kalats),
            katz: f(TrackKind::Katz),
            malatz: f(TrackKind::Malatz),
            matz: f(TrackKind::Matz),
        }
    }
}

impl<T> Index<TrackKind> for TrackMap<T> {
    type Output = T;

    fn index(&self, kind: TrackKind) -> &T {
        match kind {
            TrackKind::Prime => &self.prime,
            TrackKind::Kalats => &self.kalats,
            TrackKind::Katz => &self.katz,
            TrackKind::Malatz => &self.malatz,
            TrackKind::Matz => &self.matz,
        }
    }
}

impl<T> IndexMut<TrackKind> for TrackMap<T> {
    fn index_mut(&mut self, kind: TrackKind) -> &mut T {
        match kind {
            TrackKind::Prime => &mut self.prime,
            TrackKind::Kalats => &mut self.kalats,
            TrackKind::Katz => &mut self.katz,
            TrackKind::Malatz => &mut self.malatz,
            TrackKind::Matz => &mut self.matz,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RepayMethod {
    Annuity,
    LinearPrincipal,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SurplusMode {
    Pocket,
    Invest,
    Match,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExchangeMode {
    Hedged,
    Unhedged,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExemptionType {
    None,
    Single,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SaleTax {
    Off,
    On(ExemptionType),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GainsBasis {
    Real,
    Nominal,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PurchaseTax {
    None,
    Brackets { first_home: bool },
    Rate(f64),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MarketAssumptions {
    pub equity_return: f64,
    pub appreciation: f64,
    pub cpi: f64,
    pub policy_rate: f64,
    pub rent_yield: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Fees {
    pub buy: f64,
    pub sell: f64,
    pub trade: f64,
    pub management: f64,
    pub purchase_tax: PurchaseTax,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TaxRegime {
    pub equity_gains: bool,
    pub side_portfolio_gains: bool,
    pub rental_income: bool,
    pub sale: SaleTax,
    pub gains_basis: GainsBasis,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HistoryToggles {
    pub equity: bool,
    pub appreciation: bool,
    pub fx: bool,
    pub cpi: bool,
    pub policy_rate: bool,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SimConfig {
    pub fx_drift: f64,
    pub surplus: SurplusMode,
    pub exchange: ExchangeMode,
    pub history: HistoryToggles,
    pub repay: RepayMethod,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Prepayment {
    /// 1-based simulation year in which the prepayment is made.
    pub year: u32,
    pub track: TrackKind,
    pub amount: f64,
}

#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub equity: f64,
    pub down_payment: f64,
    pub loan_term_years: u32,
    pub sim_horizon_years: u32,
    pub track_terms: TrackMap<Option<u32>>,
    pub mix: TrackMap<f64>,
    pub rates: TrackMap<f64>,
    pub market: MarketAssumptions,
    pub fees: Fees,
    pub maintenance: f64,
    pub purchase_discount: f64,
    pub taxes: TaxRegime,
    pub config: SimConfig,
    pub prepayments: Vec<Prepayment>,
    pub return_series: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlow {
    pub month: u32,
    pub amount: f64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxSummary {
    pub purchase: f64,
    pub sale: f64,
    pub side_portfolio: f64,
    pub equity: f64,
    pub rental: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub label: u32,
    pub re_value: f64,
    pub sp_value: f64,
    pub re_pct: f64,
    pub sp_pct: f64,
    pub rent: f64,
    pub interest: f64,
    pub principal: f64,
    pub out_of_pocket: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub net_re: f64,
    pub net_sp: f64,
    pub cagr_re: f64,
    pub cagr_sp: f64,
    pub total_interest: f64,
    pub interest_by_track: TrackMap<f64>,
    pub total_rent: f64,
    pub first_positive_cashflow_month: Option<u32>,
    pub remaining_loan: f64,
    pub side_portfolio: f64,
    pub re_cash: f64,
    pub sp_gross: f64,
    pub sp_cash: f64,
    pub total_invested: f64,
    pub taxes: TaxSummary,
    pub series: Option<Vec<SeriesPoint>>,
}
