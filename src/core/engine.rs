use tracing::{debug, warn};

use super::history;
use super::irr::solve_irr;
use super::payment::payment;
use super::tax::{capital_gains, purchase_tax, rental_tax, securities_gain_tax};
use super::types::{
    CashFlow, ExchangeMode, GainsBasis, HistoryToggles, MarketAssumptions, PurchaseTax,
    RepayMethod, SaleTax, SeriesPoint, SimulationParams, SimulationResult, SurplusMode, TaxSummary,
    TrackKind, TrackMap,
};

/// Balances below this are treated as repaid.
const MIN_BALANCE: f64 = 10.0;
const RATE_RESET_MONTHS: u32 = 60;

#[derive(Copy, Clone, Debug)]
enum RateRule {
    Fixed,
    /// Policy rate plus the initial spread, re-read at the start of every block.
    Floating { reset_months: u32 },
}

#[derive(Copy, Clone, Debug)]
struct TrackSpec {
    kind: TrackKind,
    rule: RateRule,
    cpi_linked: bool,
}

const TRACKS: [TrackSpec; 5] = [
    TrackSpec {
        kind: TrackKind::Prime,
        rule: RateRule::Floating { reset_months: 1 },
        cpi_linked: false,
    },
    TrackSpec {
        kind: TrackKind::Kalats,
        rule: RateRule::Fixed,
        cpi_linked: false,
    },
    TrackSpec {
        kind: TrackKind::Katz,
        rule: RateRule::Fixed,
        cpi_linked: true,
    },
    TrackSpec {
        kind: TrackKind::Malatz,
        rule: RateRule::Floating {
            reset_months: RATE_RESET_MONTHS,
        },
        cpi_linked: false,
    },
    TrackSpec {
        kind: TrackKind::Matz,
        rule: RateRule::Floating {
            reset_months: RATE_RESET_MONTHS,
        },
        cpi_linked: true,
    },
];

#[derive(Debug)]
struct Track {
    spec: TrackSpec,
    initial_principal: f64,
    /// Real (CPI-deflated) for linked tracks, nominal otherwise.
    balance: f64,
    initial_rate: f64,
    spread: f64,
    term_months: u32,
    interest_paid: f64,
}

#[derive(Copy, Clone, Debug, Default)]
struct TrackStep {
    interest: f64,
    principal: f64,
}

impl TrackStep {
    fn payment(self) -> f64 {
        self.interest + self.principal
    }
}

impl Track {
    fn scale(&self, cpi_index: f64) -> f64 {
        if self.spec.cpi_linked { cpi_index } else { 1.0 }
    }

    fn nominal_balance(&self, cpi_index: f64) -> f64 {
        self.balance * self.scale(cpi_index)
    }

    fn rate_at(&self, month: u32, macros: &MacroPath) -> f64 {
        match self.spec.rule {
            RateRule::Fixed => self.initial_rate,
            RateRule::Floating { reset_months } => {
                let anchor = month - month % reset_months.max(1);
                macros.policy_rate(year_index(anchor)) + self.spread
            }
        }
    }

    fn step(
        &mut self,
        month: u32,
        macros: &MacroPath,
        method: RepayMethod,
        cpi_index: f64,
    ) -> Option<TrackStep> {
        if month >= self.term_months || self.balance < MIN_BALANCE {
            return None;
        }
        let annual_rate = self.rate_at(month, macros);
        let remaining = self.term_months - month;
        let interest = self.balance * annual_rate / 12.0;
        let principal = match method {
            RepayMethod::Annuity => payment(self.balance, annual_rate, remaining) - interest,
            RepayMethod::LinearPrincipal => self.initial_principal / self.term_months as f64,
        }
        .clamp(0.0, self.balance);
        self.balance -= principal;

        let scale = self.scale(cpi_index);
        let step = TrackStep {
            interest: interest * scale,
            principal: principal * scale,
        };
        self.interest_paid += step.interest;
        Some(step)
    }

    /// Pays down up to `amount` (nominal) and returns what was actually paid.
    fn prepay(&mut self, amount: f64, cpi_index: f64) -> f64 {
        let paid = amount.max(0.0).min(self.nominal_balance(cpi_index));
        self.balance = (self.balance - paid / self.scale(cpi_index)).max(0.0);
        paid
    }
}

/// Macro variables per simulation year, scalar or historical.
struct MacroPath {
    market: MarketAssumptions,
    history: HistoryToggles,
}

impl MacroPath {
    fn equity_return(&self, year: usize) -> f64 {
        pick(self.history.equity, history::EQUITY_RETURNS, year, self.market.equity_return)
    }

    fn appreciation(&self, year: usize) -> f64 {
        pick(self.history.appreciation, history::APPRECIATION, year, self.market.appreciation)
    }

    fn cpi(&self, year: usize) -> f64 {
        pick(self.history.cpi, history::CPI, year, self.market.cpi)
    }

    fn policy_rate(&self, year: usize) -> f64 {
        pick(self.history.policy_rate, history::POLICY_RATE, year, self.market.policy_rate)
    }

    fn fx_step(&self, year: usize, drift: f64) -> f64 {
        if self.history.fx {
            monthly_factor(history::fx_ratio(year) - 1.0)
        } else {
            monthly_factor(drift)
        }
    }
}

fn pick(use_history: bool, series: &[f64], year: usize, scalar: f64) -> f64 {
    if use_history {
        history::at(series, year)
    } else {
        scalar
    }
}

/// An equity holding, tracked in ILS when hedged or in FX units when not.
#[derive(Debug)]
struct Position {
    exchange: ExchangeMode,
    holdings: f64,
    basis_nominal: f64,
    basis_real: f64,
}

impl Position {
    fn new(exchange: ExchangeMode) -> Self {
        Self {
            exchange,
            holdings: 0.0,
            basis_nominal: 0.0,
            basis_real: 0.0,
        }
    }

    fn price(&self, fx: f64) -> f64 {
        match self.exchange {
            ExchangeMode::Hedged => 1.0,
            ExchangeMode::Unhedged => fx,
        }
    }

    fn value(&self, fx: f64) -> f64 {
        self.holdings * self.price(fx)
    }

    fn buy(&mut self, amount: f64, fx: f64) {
        if amount <= 0.0 {
            return;
        }
        self.holdings += amount / self.price(fx);
        self.basis_nominal += amount;
        self.basis_real += amount;
    }

    fn sell(&mut self, amount: f64, fx: f64) -> f64 {
        let value = self.value(fx);
        let sold = amount.max(0.0).min(value);
        if value > 0.0 {
            let kept = 1.0 - sold / value;
            self.holdings *= kept;
            self.basis_nominal *= kept;
            self.basis_real *= kept;
        }
        sold
    }

    fn grow(&mut self, factor: f64) {
        self.holdings *= factor;
    }

    fn index_basis(&mut self, cpi_factor: f64) {
        self.basis_real *= cpi_factor;
    }

    fn gains_tax(&self, fx: f64, basis: GainsBasis) -> f64 {
        let basis = match basis {
            GainsBasis::Real => self.basis_real,
            GainsBasis::Nominal => self.basis_nominal,
        };
        securities_gain_tax(self.value(fx), basis)
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct YearTotals {
    rent: f64,
    interest: f64,
    principal: f64,
    out_of_pocket: f64,
}

pub fn simulate(params: &SimulationParams) -> SimulationResult {
    let macros = MacroPath {
        market: params.market,
        history: params.config.history,
    };
    let fees = params.fees;
    let trade_keep = 1.0 - fees.trade;

    let price = params.equity / params.down_payment;
    let mut asset_value = price / (1.0 - params.purchase_discount);
    let total_loan = price - params.equity;
    let initial_policy = macros.policy_rate(0);

    let mut tracks: Vec<Track> = TRACKS
        .iter()
        .map(|spec| {
            let principal = total_loan * params.mix[spec.kind] / 100.0;
            let term_years = params.track_terms[spec.kind].unwrap_or(params.loan_term_years);
            let initial_rate = params.rates[spec.kind];
            Track {
                spec: *spec,
                initial_principal: principal,
                balance: principal,
                initial_rate,
                spread: initial_rate - initial_policy,
                term_months: term_years * 12,
                interest_paid: 0.0,
            }
        })
        .collect();

    let acquisition_tax = match fees.purchase_tax {
        PurchaseTax::None => 0.0,
        PurchaseTax::Brackets { first_home } => purchase_tax(price, first_home),
        PurchaseTax::Rate(rate) => price * rate,
    };
    let outlay = params.equity + price * fees.buy + acquisition_tax;

    let mut fx = if macros.history.fx {
        history::at(history::USD_ILS, 0)
    } else {
        1.0
    };
    let mut cpi_index = 1.0;
    let mut flows = vec![CashFlow {
        month: 0,
        amount: outlay,
    }];
    let mut index_fund = Position::new(params.config.exchange);
    index_fund.buy(outlay * trade_keep, fx);
    let mut side_portfolio = Position::new(ExchangeMode::Hedged);
    let mut re_cash = 0.0;
    let mut sp_cash = 0.0;

    let mut total_interest = 0.0;
    let mut total_rent = 0.0;
    let mut rental_tax_paid = 0.0;
    let mut first_positive_cashflow_month = None;
    let mut series = params.return_series.then(Vec::new);

    let total_months = params.sim_horizon_years * 12;

    for year in 0..params.sim_horizon_years {
        let year_start = year * 12;
        let year_idx = year as usize;

        for prepayment in params.prepayments.iter().filter(|p| p.year == year + 1) {
            let Some(track) = tracks.iter_mut().find(|t| t.spec.kind == prepayment.track) else {
                continue;
            };
            let paid = track.prepay(prepayment.amount, cpi_index);
            if paid > 0.0 {
                flows.push(CashFlow {
                    month: year_start,
                    amount: paid,
                });
                index_fund.buy(paid * trade_keep, fx);
            }
        }

        let cpi_factor = monthly_factor(macros.cpi(year_idx));
        let equity_factor =
            monthly_factor((1.0 + macros.equity_return(year_idx)) * (1.0 - fees.management) - 1.0);
        let appreciation_factor = monthly_factor(macros.appreciation(year_idx));
        let fx_factor = macros.fx_step(year_idx, params.config.fx_drift);

        let mut totals = YearTotals::default();

        for month in year_start..year_start + 12 {
            let mut month_step = TrackStep::default();
            for track in tracks.iter_mut() {
                if let Some(step) = track.step(month, &macros, params.config.repay, cpi_index) {
                    month_step.interest += step.interest;
                    month_step.principal += step.principal;
                }
            }
            total_interest += month_step.interest;

            let gross_rent = asset_value * params.market.rent_yield / 12.0;
            let tax = if params.taxes.rental_income {
                rental_tax(gross_rent, cpi_index)
            } else {
                0.0
            };
            rental_tax_paid += tax;
            let net_rent = gross_rent - gross_rent * params.maintenance - tax;
            total_rent += net_rent;

            let out_of_pocket = month_step.payment() - net_rent;
            if out_of_pocket <= 0.0 && first_positive_cashflow_month.is_none() {
                first_positive_cashflow_month = Some(month + 1);
            }

            if out_of_pocket < 0.0 {
                let surplus = -out_of_pocket;
                match params.config.surplus {
                    SurplusMode::Pocket => re_cash += surplus,
                    SurplusMode::Invest => side_portfolio.buy(surplus * trade_keep, 1.0),
                    SurplusMode::Match => {
                        re_cash += surplus;
                        sp_cash += index_fund.sell(surplus * trade_keep, fx);
                    }
                }
            } else if out_of_pocket > 0.0 {
                flows.push(CashFlow {
                    month,
                    amount: out_of_pocket,
                });
                index_fund.buy(out_of_pocket * trade_keep, fx);
            }

            totals.rent += net_rent;
            totals.interest += month_step.interest;
            totals.principal += month_step.principal;
            totals.out_of_pocket += out_of_pocket;

            index_fund.index_basis(cpi_factor);
            side_portfolio.index_basis(cpi_factor);
            index_fund.grow(equity_factor);
            side_portfolio.grow(equity_factor);
            cpi_index *= cpi_factor;
            asset_value *= appreciation_factor;
            fx *= fx_factor;
        }

        if let Some(points) = series.as_mut() {
            let invested: f64 = flows.iter().map(|cf| cf.amount).sum();
            let re_value = asset_value - remaining_loan(&tracks, cpi_index)
                + side_portfolio.value(1.0)
                + re_cash;
            let sp_value = index_fund.value(fx) + sp_cash;
            points.push(SeriesPoint {
                label: year + 1,
                re_value,
                sp_value,
                re_pct: percent_gain(re_value, invested),
                sp_pct: percent_gain(sp_value, invested),
                rent: totals.rent,
                interest: totals.interest,
                principal: totals.principal,
                out_of_pocket: totals.out_of_pocket,
            });
        }
    }

    let remaining_loan = remaining_loan(&tracks, cpi_index);
    let sale_proceeds = asset_value * (1.0 - fees.sell);
    let sale_tax = match params.taxes.sale {
        SaleTax::Off => 0.0,
        SaleTax::On(exemption) => capital_gains(sale_proceeds, price * cpi_index, exemption).tax,
    };

    let side_value = side_portfolio.value(1.0);
    let side_tax = if params.taxes.side_portfolio_gains {
        side_portfolio.gains_tax(1.0, params.taxes.gains_basis)
    } else {
        0.0
    };
    let sp_gross = index_fund.value(fx);
    let sp_tax = if params.taxes.equity_gains {
        index_fund.gains_tax(fx, params.taxes.gains_basis)
    } else {
        0.0
    };

    let net_re = (sale_proceeds - sale_tax - remaining_loan) + (side_value - side_tax) + re_cash;
    let net_sp = (sp_gross - sp_tax) + sp_cash;

    let cagr_re = annualized_or_nan(&flows, net_re, total_months, "real estate");
    let cagr_sp = annualized_or_nan(&flows, net_sp, total_months, "equity index");
    let total_invested = flows.iter().map(|cf| cf.amount).sum();

    debug!(
        horizon_years = params.sim_horizon_years,
        net_re, net_sp, cagr_re, cagr_sp, total_interest, remaining_loan, "simulation finished"
    );

    SimulationResult {
        net_re,
        net_sp,
        cagr_re,
        cagr_sp,
        total_interest,
        interest_by_track: TrackMap::from_fn(|kind| {
            tracks
                .iter()
                .find(|t| t.spec.kind == kind)
                .map_or(0.0, |t| t.interest_paid)
        }),
        total_rent,
        first_positive_cashflow_month,
        remaining_loan,
        side_portfolio: side_value,
        re_cash,
        sp_gross,
        sp_cash,
        total_invested,
        taxes: TaxSummary {
            purchase: acquisition_tax,
            sale: sale_tax,
            side_portfolio: side_tax,
            equity: sp_tax,
            rental: rental_tax_paid,
        },
        series,
    }
}

fn remaining_loan(tracks: &[Track], cpi_index: f64) -> f64 {
    tracks.iter().map(|t| t.nominal_balance(cpi_index)).sum()
}

fn annualized_or_nan(flows: &[CashFlow], terminal: f64, total_months: u32, ledger: &str) -> f64 {
    match solve_irr(flows, terminal, total_months) {
        Ok(rate) => rate,
        Err(err) => {
            warn!(ledger, terminal, %err, "annualized return unavailable");
            f64::NAN
        }
    }
}

fn monthly_factor(annual: f64) -> f64 {
    (1.0 + annual).powf(1.0 / 12.0)
}

fn year_index(month: u32) -> usize {
    (month / 12) as usize
}

fn percent_gain(value: f64, invested: f64) -> f64 {
    if invested > 0.0 {
        (value / invested - 1.0) * 100.0
    } else {
        0.0
    }
}
