use serde::Serialize;

use super::types::RepayMethod;

const PRINCIPAL_EPS: f64 = 1e-9;

/// Monthly annuity payment for `principal` over `months` at `annual_rate`.
pub fn payment(principal: f64, annual_rate: f64, months: u32) -> f64 {
    if principal <= PRINCIPAL_EPS || months == 0 {
        return 0.0;
    }
    let n = months as f64;
    if annual_rate == 0.0 {
        return principal / n;
    }
    let r = annual_rate / 12.0;
    let growth = (1.0 + r).powf(n);
    principal * r * growth / (growth - 1.0)
}

/// Outstanding balance after `k` payments.
pub fn balance_after(
    principal: f64,
    annual_rate: f64,
    total_months: u32,
    k: i64,
    method: RepayMethod,
) -> f64 {
    if k <= 0 {
        return principal;
    }
    if k >= total_months as i64 {
        return 0.0;
    }
    let n = total_months as f64;
    let k_f = k as f64;
    let linear = principal * (1.0 - k_f / n);

    match method {
        RepayMethod::LinearPrincipal => linear,
        RepayMethod::Annuity => {
            let r = annual_rate / 12.0;
            if r == 0.0 {
                return linear;
            }
            let a = payment(principal, annual_rate, total_months);
            let growth = (1.0 + r).powf(k_f);
            (principal * growth - a * (growth - 1.0) / r).max(0.0)
        }
    }
}

/// Interest paid over the full life of the loan.
pub fn total_interest(principal: f64, annual_rate: f64, months: u32, method: RepayMethod) -> f64 {
    if principal <= PRINCIPAL_EPS || months == 0 {
        return 0.0;
    }
    match method {
        RepayMethod::Annuity => payment(principal, annual_rate, months) * months as f64 - principal,
        RepayMethod::LinearPrincipal => {
            let r = annual_rate / 12.0;
            r * principal * (months as f64 + 1.0) / 2.0
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RateReset {
    /// 1-based month from which `new_rate` applies.
    pub month: u32,
    pub new_rate: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CpiLinkage {
    Flat(f64),
    /// Annual CPI per loan year; years past the end reuse the last value.
    PerYear(Vec<f64>),
}

impl CpiLinkage {
    fn annual_for_year(&self, year: usize) -> f64 {
        match self {
            CpiLinkage::Flat(rate) => *rate,
            CpiLinkage::PerYear(rates) => match rates.get(year) {
                Some(rate) => *rate,
                None => rates.last().copied().unwrap_or(0.0),
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct ScheduleParams {
    pub principal: f64,
    pub annual_rate: f64,
    pub months: u32,
    pub method: RepayMethod,
    pub rate_resets: Vec<RateReset>,
    pub cpi: Option<CpiLinkage>,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRow {
    pub month: u32,
    pub payment: f64,
    pub interest: f64,
    pub principal: f64,
    pub balance: f64,
    pub cpi_adjustment: f64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub rows: Vec<ScheduleRow>,
    pub total_interest: f64,
    pub total_payments: f64,
}

pub fn generate_schedule(params: &ScheduleParams) -> Schedule {
    let mut resets = params.rate_resets.clone();
    resets.sort_by_key(|reset| reset.month);
    let mut next_reset = resets.iter().peekable();

    let mut rows = Vec::with_capacity(params.months as usize);
    let mut balance = params.principal.max(0.0);
    let mut rate = params.annual_rate;
    let mut level_payment = payment(balance, rate, params.months);
    let mut total_interest = 0.0;
    let mut total_payments = 0.0;

    for month in 1..=params.months {
        if balance <= PRINCIPAL_EPS {
            break;
        }
        let remaining = params.months - month + 1;

        let mut rate_changed = false;
        while let Some(reset) = next_reset.next_if(|reset| reset.month <= month) {
            rate = reset.new_rate;
            rate_changed = true;
        }

        let mut cpi_adjustment = 0.0;
        if let Some(cpi) = &params.cpi {
            let annual = cpi.annual_for_year(((month - 1) / 12) as usize);
            let factor = (1.0 + annual).powf(1.0 / 12.0);
            cpi_adjustment = balance * (factor - 1.0);
            balance += cpi_adjustment;
        }

        if rate_changed || params.cpi.is_some() {
            level_payment = payment(balance, rate, remaining);
        }

        let interest = balance * rate / 12.0;
        let principal = match params.method {
            RepayMethod::Annuity => level_payment - interest,
            RepayMethod::LinearPrincipal => balance / remaining as f64,
        }
        .clamp(0.0, balance);
        balance -= principal;

        let row = ScheduleRow {
            month,
            payment: round_cents(interest + principal),
            interest: round_cents(interest),
            principal: round_cents(principal),
            balance: round_cents(balance.max(0.0)),
            cpi_adjustment: round_cents(cpi_adjustment),
        };
        total_interest += row.interest;
        total_payments += row.payment;
        rows.push(row);
    }

    Schedule {
        rows,
        total_interest: round_cents(total_interest),
        total_payments: round_cents(total_payments),
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
