use axum::{
    Router,
    extract::{Json, Query},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    CapitalGainsTax, CpiLinkage, ExchangeMode, ExemptionType, Fees, GainsBasis, HistoryToggles,
    HorizonMode, MarketAssumptions, OptimizerConfig, Prepayment, PurchaseTax, RateReset,
    RepayMethod, SaleTax, Schedule, ScheduleParams, SimConfig, SimulationParams,
    SimulationResult, SurplusMode, SweetSpot, TaxRegime, TrackKind, TrackMap, capital_gains,
    generate_schedule, purchase_tax, search_sweet_spots, simulate,
};
use crate::error::AppError;

const MAX_SCHEDULE_MONTHS: u32 = 600;
const MAX_TERM_YEARS: u32 = 50;
const MAX_HORIZON_YEARS: u32 = 100;
const SHARE_SUM_TOLERANCE: f64 = 0.01;

#[derive(Parser, Debug)]
#[command(
    name = "nadlan",
    about = "Leveraged Israeli real estate vs. equity index: mortgage simulator and optimizer"
)]
pub struct App {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API.
    Serve {
        #[arg(default_value_t = 8080)]
        port: u16,
    },
    /// Run one simulation and print the result as JSON.
    Simulate(Cli),
    /// Grid-search down payment, term and horizon and print the sweet spot as JSON.
    Optimize(OptimizeArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliSurplusMode {
    Pocket,
    Invest,
    Match,
}

impl From<CliSurplusMode> for SurplusMode {
    fn from(value: CliSurplusMode) -> Self {
        match value {
            CliSurplusMode::Pocket => SurplusMode::Pocket,
            CliSurplusMode::Invest => SurplusMode::Invest,
            CliSurplusMode::Match => SurplusMode::Match,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliExchangeMode {
    Hedged,
    Unhedged,
}

impl From<CliExchangeMode> for ExchangeMode {
    fn from(value: CliExchangeMode) -> Self {
        match value {
            CliExchangeMode::Hedged => ExchangeMode::Hedged,
            CliExchangeMode::Unhedged => ExchangeMode::Unhedged,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliRepayMethod {
    Annuity,
    Linear,
}

impl From<CliRepayMethod> for RepayMethod {
    fn from(value: CliRepayMethod) -> Self {
        match value {
            CliRepayMethod::Annuity => RepayMethod::Annuity,
            CliRepayMethod::Linear => RepayMethod::LinearPrincipal,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliSaleTax {
    Off,
    NoExemption,
    SingleExemption,
}

impl From<CliSaleTax> for SaleTax {
    fn from(value: CliSaleTax) -> Self {
        match value {
            CliSaleTax::Off => SaleTax::Off,
            CliSaleTax::NoExemption => SaleTax::On(ExemptionType::None),
            CliSaleTax::SingleExemption => SaleTax::On(ExemptionType::Single),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliGainsBasis {
    Real,
    Nominal,
}

impl From<CliGainsBasis> for GainsBasis {
    fn from(value: CliGainsBasis) -> Self {
        match value {
            CliGainsBasis::Real => GainsBasis::Real,
            CliGainsBasis::Nominal => GainsBasis::Nominal,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliPurchaseTax {
    None,
    FirstHome,
    Investment,
    Rate,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliHorizonMode {
    Sweep,
    Locked,
    Auto,
}

impl From<CliHorizonMode> for HorizonMode {
    fn from(value: CliHorizonMode) -> Self {
        match value {
            CliHorizonMode::Sweep => HorizonMode::Sweep,
            CliHorizonMode::Locked => HorizonMode::Locked,
            CliHorizonMode::Auto => HorizonMode::MatchTerm,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiSurplusMode {
    Pocket,
    #[serde(alias = "reinvest")]
    Invest,
    #[serde(alias = "matchSp", alias = "match_sp")]
    Match,
}

impl From<ApiSurplusMode> for CliSurplusMode {
    fn from(value: ApiSurplusMode) -> Self {
        match value {
            ApiSurplusMode::Pocket => CliSurplusMode::Pocket,
            ApiSurplusMode::Invest => CliSurplusMode::Invest,
            ApiSurplusMode::Match => CliSurplusMode::Match,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiExchangeMode {
    #[serde(alias = "ils")]
    Hedged,
    #[serde(alias = "usd")]
    Unhedged,
}

impl From<ApiExchangeMode> for CliExchangeMode {
    fn from(value: ApiExchangeMode) -> Self {
        match value {
            ApiExchangeMode::Hedged => CliExchangeMode::Hedged,
            ApiExchangeMode::Unhedged => CliExchangeMode::Unhedged,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiRepayMethod {
    #[serde(alias = "spitzer")]
    Annuity,
    #[serde(alias = "linearPrincipal", alias = "linear_principal", alias = "equal-principal")]
    Linear,
}

impl From<ApiRepayMethod> for CliRepayMethod {
    fn from(value: ApiRepayMethod) -> Self {
        match value {
            ApiRepayMethod::Annuity => CliRepayMethod::Annuity,
            ApiRepayMethod::Linear => CliRepayMethod::Linear,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiSaleTax {
    Off,
    #[serde(alias = "none", alias = "noExemption", alias = "no_exemption")]
    NoExemption,
    #[serde(alias = "single", alias = "singleExemption", alias = "single_exemption")]
    SingleExemption,
}

impl From<ApiSaleTax> for CliSaleTax {
    fn from(value: ApiSaleTax) -> Self {
        match value {
            ApiSaleTax::Off => CliSaleTax::Off,
            ApiSaleTax::NoExemption => CliSaleTax::NoExemption,
            ApiSaleTax::SingleExemption => CliSaleTax::SingleExemption,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiGainsBasis {
    Real,
    Nominal,
}

impl From<ApiGainsBasis> for CliGainsBasis {
    fn from(value: ApiGainsBasis) -> Self {
        match value {
            ApiGainsBasis::Real => CliGainsBasis::Real,
            ApiGainsBasis::Nominal => CliGainsBasis::Nominal,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiPurchaseTax {
    None,
    #[serde(alias = "firstHome", alias = "first_home", alias = "single")]
    FirstHome,
    #[serde(alias = "additional")]
    Investment,
    #[serde(alias = "flat")]
    Rate,
}

impl From<ApiPurchaseTax> for CliPurchaseTax {
    fn from(value: ApiPurchaseTax) -> Self {
        match value {
            ApiPurchaseTax::None => CliPurchaseTax::None,
            ApiPurchaseTax::FirstHome => CliPurchaseTax::FirstHome,
            ApiPurchaseTax::Investment => CliPurchaseTax::Investment,
            ApiPurchaseTax::Rate => CliPurchaseTax::Rate,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiTrack {
    Prime,
    Kalats,
    Katz,
    Malatz,
    Matz,
}

impl From<ApiTrack> for TrackKind {
    fn from(value: ApiTrack) -> Self {
        match value {
            ApiTrack::Prime => TrackKind::Prime,
            ApiTrack::Kalats => TrackKind::Kalats,
            ApiTrack::Katz => TrackKind::Katz,
            ApiTrack::Malatz => TrackKind::Malatz,
            ApiTrack::Matz => TrackKind::Matz,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiHorizonMode {
    Sweep,
    #[serde(alias = "lock", alias = "fixed")]
    Locked,
    #[serde(alias = "match-term", alias = "matchTerm")]
    Auto,
}

impl From<ApiHorizonMode> for CliHorizonMode {
    fn from(value: ApiHorizonMode) -> Self {
        match value {
            ApiHorizonMode::Sweep => CliHorizonMode::Sweep,
            ApiHorizonMode::Locked => CliHorizonMode::Locked,
            ApiHorizonMode::Auto => CliHorizonMode::Auto,
        }
    }
}

#[derive(Copy, Clone, Debug, Deserialize)]
struct PrepaymentPayload {
    year: u32,
    track: ApiTrack,
    amount: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    equity: Option<f64>,
    down_payment: Option<f64>,
    loan_term: Option<u32>,
    horizon: Option<u32>,

    prime_share: Option<f64>,
    kalats_share: Option<f64>,
    katz_share: Option<f64>,
    malatz_share: Option<f64>,
    matz_share: Option<f64>,

    prime_rate: Option<f64>,
    kalats_rate: Option<f64>,
    katz_rate: Option<f64>,
    malatz_rate: Option<f64>,
    matz_rate: Option<f64>,

    prime_term: Option<u32>,
    kalats_term: Option<u32>,
    katz_term: Option<u32>,
    malatz_term: Option<u32>,
    matz_term: Option<u32>,

    equity_return: Option<f64>,
    appreciation: Option<f64>,
    cpi: Option<f64>,
    policy_rate: Option<f64>,
    rent_yield: Option<f64>,

    buy_fee: Option<f64>,
    sell_fee: Option<f64>,
    trade_fee: Option<f64>,
    management_fee: Option<f64>,
    purchase_tax: Option<ApiPurchaseTax>,
    purchase_tax_rate: Option<f64>,
    maintenance: Option<f64>,
    purchase_discount: Option<f64>,

    equity_gains_tax: Option<bool>,
    side_gains_tax: Option<bool>,
    rental_tax: Option<bool>,
    sale_tax: Option<ApiSaleTax>,
    gains_basis: Option<ApiGainsBasis>,

    fx_drift: Option<f64>,
    surplus_mode: Option<ApiSurplusMode>,
    exchange: Option<ApiExchangeMode>,
    repay_method: Option<ApiRepayMethod>,
    historical_equity: Option<bool>,
    historical_appreciation: Option<bool>,
    historical_fx: Option<bool>,
    historical_cpi: Option<bool>,
    historical_policy_rate: Option<bool>,

    prepayments: Option<Vec<PrepaymentPayload>>,
    series: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OptimizePayload {
    #[serde(flatten)]
    simulate: SimulatePayload,
    lock_down: Option<bool>,
    lock_term: Option<bool>,
    horizon_mode: Option<ApiHorizonMode>,
}

#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateResetPayload {
    month: u32,
    rate: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchedulePayload {
    principal: f64,
    rate: f64,
    months: u32,
    #[serde(default)]
    method: Option<ApiRepayMethod>,
    #[serde(default)]
    rate_resets: Vec<RateResetPayload>,
    #[serde(default)]
    cpi: Option<f64>,
    #[serde(default)]
    cpi_by_year: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseTaxQuery {
    value: f64,
    #[serde(default)]
    first_home: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapitalGainsQuery {
    sale_price: f64,
    cost_basis: f64,
    #[serde(default)]
    exemption: Option<ApiSaleTax>,
}

#[derive(Args, Debug, Clone)]
pub struct Cli {
    #[arg(long, default_value_t = 500_000.0, help = "Own capital available")]
    equity: f64,
    #[arg(
        long,
        default_value_t = 30.0,
        help = "Down payment in percent of the purchase price"
    )]
    down_payment: f64,
    #[arg(long, default_value_t = 20, help = "Default loan term in years")]
    loan_term: u32,
    #[arg(long, default_value_t = 20, help = "Simulation horizon in years")]
    horizon: u32,

    #[arg(long, default_value_t = 33.0, help = "Prime share of the loan in percent")]
    prime_share: f64,
    #[arg(long, default_value_t = 34.0)]
    kalats_share: f64,
    #[arg(long, default_value_t = 33.0)]
    katz_share: f64,
    #[arg(long, default_value_t = 0.0)]
    malatz_share: f64,
    #[arg(long, default_value_t = 0.0)]
    matz_share: f64,

    #[arg(long, default_value_t = 5.75, help = "Initial Prime track rate in percent")]
    prime_rate: f64,
    #[arg(long, default_value_t = 4.8)]
    kalats_rate: f64,
    #[arg(long, default_value_t = 3.2, help = "Real rate on the CPI-linked fixed track")]
    katz_rate: f64,
    #[arg(long, default_value_t = 5.0)]
    malatz_rate: f64,
    #[arg(long, default_value_t = 3.5)]
    matz_rate: f64,

    #[arg(long, help = "Prime term in years, defaults to --loan-term")]
    prime_term: Option<u32>,
    #[arg(long)]
    kalats_term: Option<u32>,
    #[arg(long)]
    katz_term: Option<u32>,
    #[arg(long)]
    malatz_term: Option<u32>,
    #[arg(long)]
    matz_term: Option<u32>,

    #[arg(long, default_value_t = 10.0, help = "Equity index annual return in percent")]
    equity_return: f64,
    #[arg(long, default_value_t = 4.0, help = "Property appreciation in percent")]
    appreciation: f64,
    #[arg(long, default_value_t = 2.5, help = "Annual CPI in percent")]
    cpi: f64,
    #[arg(long, default_value_t = 4.25, help = "Bank of Israel policy rate in percent")]
    policy_rate: f64,
    #[arg(long, default_value_t = 3.2, help = "Gross rental yield in percent")]
    rent_yield: f64,

    #[arg(long, default_value_t = 0.0, help = "Buying costs in percent of price")]
    buy_fee: f64,
    #[arg(long, default_value_t = 0.0, help = "Selling costs in percent of sale value")]
    sell_fee: f64,
    #[arg(long, default_value_t = 0.0, help = "Index trade fee in percent")]
    trade_fee: f64,
    #[arg(long, default_value_t = 0.0, help = "Index annual management fee in percent")]
    management_fee: f64,
    #[arg(long, value_enum, default_value_t = CliPurchaseTax::None)]
    purchase_tax: CliPurchaseTax,
    #[arg(
        long,
        default_value_t = 8.0,
        help = "Flat purchase tax in percent, used when --purchase-tax=rate"
    )]
    purchase_tax_rate: f64,
    #[arg(long, default_value_t = 0.0, help = "Maintenance in percent of gross rent")]
    maintenance: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Discount to market value at purchase in percent"
    )]
    purchase_discount: f64,

    #[arg(long, help = "Tax index gains at sale")]
    equity_gains_tax: bool,
    #[arg(long, help = "Tax side-portfolio gains at sale")]
    side_gains_tax: bool,
    #[arg(long, help = "Apply the 10% rental income track")]
    rental_tax: bool,
    #[arg(long, value_enum, default_value_t = CliSaleTax::Off)]
    sale_tax: CliSaleTax,
    #[arg(long, value_enum, default_value_t = CliGainsBasis::Real)]
    gains_basis: CliGainsBasis,

    #[arg(long, default_value_t = 0.0, help = "Annual USD/ILS drift in percent")]
    fx_drift: f64,
    #[arg(long, value_enum, default_value_t = CliSurplusMode::Pocket)]
    surplus_mode: CliSurplusMode,
    #[arg(long, value_enum, default_value_t = CliExchangeMode::Hedged)]
    exchange: CliExchangeMode,
    #[arg(long, value_enum, default_value_t = CliRepayMethod::Annuity)]
    repay_method: CliRepayMethod,
    #[arg(long)]
    historical_equity: bool,
    #[arg(long)]
    historical_appreciation: bool,
    #[arg(long)]
    historical_fx: bool,
    #[arg(long)]
    historical_cpi: bool,
    #[arg(long)]
    historical_policy_rate: bool,

    #[arg(
        long = "prepay",
        value_parser = parse_prepayment,
        help = "Prepayment as YEAR:TRACK:AMOUNT, e.g. 5:kalats:100000; repeatable"
    )]
    prepayments: Vec<Prepayment>,
    #[arg(long, help = "Include the yearly series in the output")]
    series: bool,
}

#[derive(Args, Debug, Clone)]
pub struct OptimizeArgs {
    #[command(flatten)]
    cli: Cli,
    #[arg(long, help = "Keep --down-payment fixed")]
    lock_down: bool,
    #[arg(long, help = "Keep --loan-term fixed")]
    lock_term: bool,
    #[arg(long, value_enum, default_value_t = CliHorizonMode::Sweep)]
    horizon_mode: CliHorizonMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeResponse {
    sweet_spot: Option<SweetSpot>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseTaxResponse {
    value: f64,
    first_home: bool,
    tax: f64,
}

fn parse_prepayment(raw: &str) -> Result<Prepayment, String> {
    let parts: Vec<&str> = raw.split(':').collect();
    let [year, track, amount] = parts.as_slice() else {
        return Err(format!("expected YEAR:TRACK:AMOUNT, got '{raw}'"));
    };
    let year = year
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid prepayment year '{year}': {e}"))?;
    let track = parse_track(track.trim())?;
    let amount = amount
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid prepayment amount '{amount}': {e}"))?;
    Ok(Prepayment {
        year,
        track,
        amount,
    })
}

fn parse_track(raw: &str) -> Result<TrackKind, String> {
    match raw.to_ascii_lowercase().as_str() {
        "prime" => Ok(TrackKind::Prime),
        "kalats" => Ok(TrackKind::Kalats),
        "katz" => Ok(TrackKind::Katz),
        "malatz" => Ok(TrackKind::Malatz),
        "matz" => Ok(TrackKind::Matz),
        other => Err(format!("unknown track '{other}'")),
    }
}

fn check_percent(name: &str, value: f64) -> Result<(), String> {
    if !(0.0..=100.0).contains(&value) {
        return Err(format!("{name} must be between 0 and 100"));
    }
    Ok(())
}

fn check_growth(name: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value <= -100.0 {
        return Err(format!("{name} must be > -100"));
    }
    Ok(())
}

fn build_params(cli: Cli) -> Result<SimulationParams, String> {
    if !cli.equity.is_finite() || cli.equity <= 0.0 {
        return Err("--equity must be > 0".to_string());
    }

    if !cli.down_payment.is_finite() || cli.down_payment <= 0.0 || cli.down_payment > 100.0 {
        return Err("--down-payment must be > 0 and <= 100".to_string());
    }

    if cli.loan_term == 0 || cli.loan_term > MAX_TERM_YEARS {
        return Err(format!("--loan-term must be between 1 and {MAX_TERM_YEARS}"));
    }

    if cli.horizon == 0 || cli.horizon > MAX_HORIZON_YEARS {
        return Err(format!("--horizon must be between 1 and {MAX_HORIZON_YEARS}"));
    }

    let mix = TrackMap {
        prime: cli.prime_share,
        kalats: cli.kalats_share,
        katz: cli.katz_share,
        malatz: cli.malatz_share,
        matz: cli.matz_share,
    };
    for (name, share) in [
        ("--prime-share", mix.prime),
        ("--kalats-share", mix.kalats),
        ("--katz-share", mix.katz),
        ("--malatz-share", mix.malatz),
        ("--matz-share", mix.matz),
    ] {
        check_percent(name, share)?;
    }
    let share_sum: f64 = TrackKind::ALL.iter().map(|kind| mix[*kind]).sum();
    if cli.down_payment < 100.0 && (share_sum - 100.0).abs() > SHARE_SUM_TOLERANCE {
        return Err(format!(
            "--prime-share through --matz-share must sum to 100, got {share_sum}"
        ));
    }

    for (name, rate) in [
        ("--prime-rate", cli.prime_rate),
        ("--kalats-rate", cli.kalats_rate),
        ("--katz-rate", cli.katz_rate),
        ("--malatz-rate", cli.malatz_rate),
        ("--matz-rate", cli.matz_rate),
    ] {
        check_growth(name, rate)?;
    }

    for (name, term) in [
        ("--prime-term", cli.prime_term),
        ("--kalats-term", cli.kalats_term),
        ("--katz-term", cli.katz_term),
        ("--malatz-term", cli.malatz_term),
        ("--matz-term", cli.matz_term),
    ] {
        if term.is_some_and(|years| years == 0 || years > MAX_TERM_YEARS) {
            return Err(format!("{name} must be between 1 and {MAX_TERM_YEARS}"));
        }
    }

    check_growth("--equity-return", cli.equity_return)?;
    check_growth("--appreciation", cli.appreciation)?;
    check_growth("--cpi", cli.cpi)?;
    check_growth("--policy-rate", cli.policy_rate)?;
    check_growth("--fx-drift", cli.fx_drift)?;
    check_percent("--rent-yield", cli.rent_yield)?;

    check_percent("--buy-fee", cli.buy_fee)?;
    check_percent("--sell-fee", cli.sell_fee)?;
    check_percent("--trade-fee", cli.trade_fee)?;
    check_percent("--management-fee", cli.management_fee)?;
    check_percent("--purchase-tax-rate", cli.purchase_tax_rate)?;
    check_percent("--maintenance", cli.maintenance)?;

    if !(0.0..100.0).contains(&cli.purchase_discount) {
        return Err("--purchase-discount must be >= 0 and < 100".to_string());
    }

    for prepayment in &cli.prepayments {
        if prepayment.year == 0 || prepayment.year > cli.horizon {
            return Err(format!(
                "--prepay year must be between 1 and --horizon, got {}",
                prepayment.year
            ));
        }
        if !prepayment.amount.is_finite() || prepayment.amount < 0.0 {
            return Err("--prepay amount must be >= 0".to_string());
        }
    }

    let purchase_tax = match cli.purchase_tax {
        CliPurchaseTax::None => PurchaseTax::None,
        CliPurchaseTax::FirstHome => PurchaseTax::Brackets { first_home: true },
        CliPurchaseTax::Investment => PurchaseTax::Brackets { first_home: false },
        CliPurchaseTax::Rate => PurchaseTax::Rate(cli.purchase_tax_rate / 100.0),
    };

    Ok(SimulationParams {
        equity: cli.equity,
        down_payment: cli.down_payment / 100.0,
        loan_term_years: cli.loan_term,
        sim_horizon_years: cli.horizon,
        track_terms: TrackMap {
            prime: cli.prime_term,
            kalats: cli.kalats_term,
            katz: cli.katz_term,
            malatz: cli.malatz_term,
            matz: cli.matz_term,
        },
        mix,
        rates: TrackMap {
            prime: cli.prime_rate / 100.0,
            kalats: cli.kalats_rate / 100.0,
            katz: cli.katz_rate / 100.0,
            malatz: cli.malatz_rate / 100.0,
            matz: cli.matz_rate / 100.0,
        },
        market: MarketAssumptions {
            equity_return: cli.equity_return / 100.0,
            appreciation: cli.appreciation / 100.0,
            cpi: cli.cpi / 100.0,
            policy_rate: cli.policy_rate / 100.0,
            rent_yield: cli.rent_yield / 100.0,
        },
        fees: Fees {
            buy: cli.buy_fee / 100.0,
            sell: cli.sell_fee / 100.0,
            trade: cli.trade_fee / 100.0,
            management: cli.management_fee / 100.0,
            purchase_tax,
        },
        maintenance: cli.maintenance / 100.0,
        purchase_discount: cli.purchase_discount / 100.0,
        taxes: TaxRegime {
            equity_gains: cli.equity_gains_tax,
            side_portfolio_gains: cli.side_gains_tax,
            rental_income: cli.rental_tax,
            sale: cli.sale_tax.into(),
            gains_basis: cli.gains_basis.into(),
        },
        config: SimConfig {
            fx_drift: cli.fx_drift / 100.0,
            surplus: cli.surplus_mode.into(),
            exchange: cli.exchange.into(),
            history: HistoryToggles {
                equity: cli.historical_equity,
                appreciation: cli.historical_appreciation,
                fx: cli.historical_fx,
                cpi: cli.historical_cpi,
                policy_rate: cli.historical_policy_rate,
            },
            repay: cli.repay_method.into(),
        },
        prepayments: cli.prepayments,
        return_series: cli.series,
    })
}

fn build_optimizer_config(args: &OptimizeArgs) -> OptimizerConfig {
    OptimizerConfig {
        lock_down: args.lock_down,
        lock_term: args.lock_term,
        horizon: args.horizon_mode.into(),
    }
}

fn build_schedule_params(payload: SchedulePayload) -> Result<ScheduleParams, String> {
    if !payload.principal.is_finite() || payload.principal < 0.0 {
        return Err("principal must be >= 0".to_string());
    }
    if payload.months == 0 || payload.months > MAX_SCHEDULE_MONTHS {
        return Err(format!("months must be between 1 and {MAX_SCHEDULE_MONTHS}"));
    }
    check_growth("rate", payload.rate)?;
    for reset in &payload.rate_resets {
        check_growth("rateResets.rate", reset.rate)?;
    }

    let cpi = match (payload.cpi, payload.cpi_by_year) {
        (_, Some(years)) if !years.is_empty() => {
            for value in &years {
                check_growth("cpiByYear", *value)?;
            }
            Some(CpiLinkage::PerYear(
                years.into_iter().map(|value| value / 100.0).collect(),
            ))
        }
        (Some(flat), _) => {
            check_growth("cpi", flat)?;
            Some(CpiLinkage::Flat(flat / 100.0))
        }
        _ => None,
    };

    Ok(ScheduleParams {
        principal: payload.principal,
        annual_rate: payload.rate / 100.0,
        months: payload.months,
        method: payload
            .method
            .map(CliRepayMethod::from)
            .unwrap_or(CliRepayMethod::Annuity)
            .into(),
        rate_resets: payload
            .rate_resets
            .into_iter()
            .map(|reset| RateReset {
                month: reset.month,
                new_rate: reset.rate / 100.0,
            })
            .collect(),
        cpi,
    })
}

fn cli_from_payload(payload: SimulatePayload) -> Cli {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.equity {
        cli.equity = v;
    }
    if let Some(v) = payload.down_payment {
        cli.down_payment = v;
    }
    if let Some(v) = payload.loan_term {
        cli.loan_term = v;
    }
    if let Some(v) = payload.horizon {
        cli.horizon = v;
    }

    if let Some(v) = payload.prime_share {
        cli.prime_share = v;
    }
    if let Some(v) = payload.kalats_share {
        cli.kalats_share = v;
    }
    if let Some(v) = payload.katz_share {
        cli.katz_share = v;
    }
    if let Some(v) = payload.malatz_share {
        cli.malatz_share = v;
    }
    if let Some(v) = payload.matz_share {
        cli.matz_share = v;
    }

    if let Some(v) = payload.prime_rate {
        cli.prime_rate = v;
    }
    if let Some(v) = payload.kalats_rate {
        cli.kalats_rate = v;
    }
    if let Some(v) = payload.katz_rate {
        cli.katz_rate = v;
    }
    if let Some(v) = payload.malatz_rate {
        cli.malatz_rate = v;
    }
    if let Some(v) = payload.matz_rate {
        cli.matz_rate = v;
    }

    if payload.prime_term.is_some() {
        cli.prime_term = payload.prime_term;
    }
    if payload.kalats_term.is_some() {
        cli.kalats_term = payload.kalats_term;
    }
    if payload.katz_term.is_some() {
        cli.katz_term = payload.katz_term;
    }
    if payload.malatz_term.is_some() {
        cli.malatz_term = payload.malatz_term;
    }
    if payload.matz_term.is_some() {
        cli.matz_term = payload.matz_term;
    }

    if let Some(v) = payload.equity_return {
        cli.equity_return = v;
    }
    if let Some(v) = payload.appreciation {
        cli.appreciation = v;
    }
    if let Some(v) = payload.cpi {
        cli.cpi = v;
    }
    if let Some(v) = payload.policy_rate {
        cli.policy_rate = v;
    }
    if let Some(v) = payload.rent_yield {
        cli.rent_yield = v;
    }

    if let Some(v) = payload.buy_fee {
        cli.buy_fee = v;
    }
    if let Some(v) = payload.sell_fee {
        cli.sell_fee = v;
    }
    if let Some(v) = payload.trade_fee {
        cli.trade_fee = v;
    }
    if let Some(v) = payload.management_fee {
        cli.management_fee = v;
    }
    if let Some(v) = payload.purchase_tax {
        cli.purchase_tax = v.into();
    }
    if let Some(v) = payload.purchase_tax_rate {
        cli.purchase_tax_rate = v;
    }
    if let Some(v) = payload.maintenance {
        cli.maintenance = v;
    }
    if let Some(v) = payload.purchase_discount {
        cli.purchase_discount = v;
    }

    if let Some(v) = payload.equity_gains_tax {
        cli.equity_gains_tax = v;
    }
    if let Some(v) = payload.side_gains_tax {
        cli.side_gains_tax = v;
    }
    if let Some(v) = payload.rental_tax {
        cli.rental_tax = v;
    }
    if let Some(v) = payload.sale_tax {
        cli.sale_tax = v.into();
    }
    if let Some(v) = payload.gains_basis {
        cli.gains_basis = v.into();
    }

    if let Some(v) = payload.fx_drift {
        cli.fx_drift = v;
    }
    if let Some(v) = payload.surplus_mode {
        cli.surplus_mode = v.into();
    }
    if let Some(v) = payload.exchange {
        cli.exchange = v.into();
    }
    if let Some(v) = payload.repay_method {
        cli.repay_method = v.into();
    }
    if let Some(v) = payload.historical_equity {
        cli.historical_equity = v;
    }
    if let Some(v) = payload.historical_appreciation {
        cli.historical_appreciation = v;
    }
    if let Some(v) = payload.historical_fx {
        cli.historical_fx = v;
    }
    if let Some(v) = payload.historical_cpi {
        cli.historical_cpi = v;
    }
    if let Some(v) = payload.historical_policy_rate {
        cli.historical_policy_rate = v;
    }

    if let Some(list) = payload.prepayments {
        cli.prepayments = list
            .into_iter()
            .map(|p| Prepayment {
                year: p.year,
                track: p.track.into(),
                amount: p.amount,
            })
            .collect();
    }
    if let Some(v) = payload.series {
        cli.series = v;
    }

    cli
}

fn optimize_args_from_payload(payload: OptimizePayload) -> OptimizeArgs {
    let mut args = OptimizeArgs {
        cli: cli_from_payload(payload.simulate),
        lock_down: false,
        lock_term: false,
        horizon_mode: CliHorizonMode::Sweep,
    };
    if let Some(v) = payload.lock_down {
        args.lock_down = v;
    }
    if let Some(v) = payload.lock_term {
        args.lock_term = v;
    }
    if let Some(v) = payload.horizon_mode {
        args.horizon_mode = v.into();
    }
    args
}

fn default_cli_for_api() -> Cli {
    Cli {
        equity: 500_000.0,
        down_payment: 30.0,
        loan_term: 20,
        horizon: 20,
        prime_share: 33.0,
        kalats_share: 34.0,
        katz_share: 33.0,
        malatz_share: 0.0,
        matz_share: 0.0,
        prime_rate: 5.75,
        kalats_rate: 4.8,
        katz_rate: 3.2,
        malatz_rate: 5.0,
        matz_rate: 3.5,
        prime_term: None,
        kalats_term: None,
        katz_term: None,
        malatz_term: None,
        matz_term: None,
        equity_return: 10.0,
        appreciation: 4.0,
        cpi: 2.5,
        policy_rate: 4.25,
        rent_yield: 3.2,
        buy_fee: 0.0,
        sell_fee: 0.0,
        trade_fee: 0.0,
        management_fee: 0.0,
        purchase_tax: CliPurchaseTax::None,
        purchase_tax_rate: 8.0,
        maintenance: 0.0,
        purchase_discount: 0.0,
        equity_gains_tax: false,
        side_gains_tax: false,
        rental_tax: false,
        sale_tax: CliSaleTax::Off,
        gains_basis: CliGainsBasis::Real,
        fx_drift: 0.0,
        surplus_mode: CliSurplusMode::Pocket,
        exchange: CliExchangeMode::Hedged,
        repay_method: CliRepayMethod::Annuity,
        historical_equity: false,
        historical_appreciation: false,
        historical_fx: false,
        historical_cpi: false,
        historical_policy_rate: false,
        prepayments: Vec::new(),
        series: false,
    }
}

/// Runs one simulation and renders the result as pretty JSON.
pub fn simulate_command(cli: Cli) -> Result<String, String> {
    let params = build_params(cli)?;
    let result = simulate(&params);
    serde_json::to_string_pretty(&result).map_err(|e| format!("failed to encode result: {e}"))
}

pub fn optimize_command(args: OptimizeArgs) -> Result<String, String> {
    let config = build_optimizer_config(&args);
    let params = build_params(args.cli)?;
    let response = OptimizeResponse {
        sweet_spot: search_sweet_spots(&params, config, None),
    };
    serde_json::to_string_pretty(&response).map_err(|e| format!("failed to encode result: {e}"))
}

pub fn router() -> Router {
    Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/optimize", post(optimize_handler))
        .route("/api/schedule", post(schedule_handler))
        .route("/api/tax/purchase", get(purchase_tax_handler))
        .route("/api/tax/capital-gains", get(capital_gains_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "nadlan HTTP API listening");

    axum::serve(listener, router()).await
}

async fn not_found_handler() -> AppError {
    AppError::NotFound("no such route".to_string())
}

async fn simulate_get_handler(
    Query(payload): Query<SimulatePayload>,
) -> Result<Response, AppError> {
    simulate_handler_impl(payload)
}

async fn simulate_post_handler(
    Json(payload): Json<SimulatePayload>,
) -> Result<Response, AppError> {
    simulate_handler_impl(payload)
}

fn simulate_handler_impl(payload: SimulatePayload) -> Result<Response, AppError> {
    let params = build_params(cli_from_payload(payload)).map_err(AppError::BadRequest)?;
    let result: SimulationResult = simulate(&params);
    Ok(json_response(StatusCode::OK, result))
}

/// Raises the optimizer's cancel flag when the request future is dropped.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

async fn optimize_handler(Json(payload): Json<OptimizePayload>) -> Result<Response, AppError> {
    let args = optimize_args_from_payload(payload);
    let config = build_optimizer_config(&args);
    let params = build_params(args.cli).map_err(AppError::BadRequest)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let _guard = CancelOnDrop(Arc::clone(&cancel));
    let sweet_spot =
        tokio::task::spawn_blocking(move || search_sweet_spots(&params, config, Some(cancel.as_ref())))
            .await?;

    Ok(json_response(StatusCode::OK, OptimizeResponse { sweet_spot }))
}

async fn schedule_handler(Json(payload): Json<SchedulePayload>) -> Result<Response, AppError> {
    let params = build_schedule_params(payload).map_err(AppError::BadRequest)?;
    let schedule: Schedule = generate_schedule(&params);
    Ok(json_response(StatusCode::OK, schedule))
}

async fn purchase_tax_handler(
    Query(query): Query<PurchaseTaxQuery>,
) -> Result<Response, AppError> {
    if !query.value.is_finite() || query.value < 0.0 {
        return Err(AppError::BadRequest("value must be >= 0".to_string()));
    }
    Ok(json_response(
        StatusCode::OK,
        PurchaseTaxResponse {
            value: query.value,
            first_home: query.first_home,
            tax: purchase_tax(query.value, query.first_home),
        },
    ))
}

async fn capital_gains_handler(
    Query(query): Query<CapitalGainsQuery>,
) -> Result<Response, AppError> {
    if !query.sale_price.is_finite() || !query.cost_basis.is_finite() {
        return Err(AppError::BadRequest(
            "salePrice and costBasis must be finite".to_string(),
        ));
    }
    let exemption = match query.exemption.map(CliSaleTax::from) {
        Some(CliSaleTax::SingleExemption) => ExemptionType::Single,
        _ => ExemptionType::None,
    };
    let result: CapitalGainsTax = capital_gains(query.sale_price, query.cost_basis, exemption);
    Ok(json_response(StatusCode::OK, result))
}

pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_cli() -> Cli {
        default_cli_for_api()
    }

    fn params_from_json(json: &str) -> Result<SimulationParams, String> {
        let payload = serde_json::from_str::<SimulatePayload>(json)
            .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
        build_params(cli_from_payload(payload))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    #[test]
    fn build_params_converts_percent_inputs() {
        let params = build_params(sample_cli()).expect("valid defaults");
        assert_approx(params.down_payment, 0.30);
        assert_approx(params.rates.prime, 0.0575);
        assert_approx(params.market.policy_rate, 0.0425);
        assert_approx(params.mix.kalats, 34.0);
        assert_eq!(params.track_terms.katz, None);
        assert_eq!(params.config.surplus, SurplusMode::Pocket);
        assert_eq!(params.fees.purchase_tax, PurchaseTax::None);
    }

    #[test]
    fn build_params_rejects_shares_not_summing_to_hundred() {
        let mut cli = sample_cli();
        cli.prime_share = 50.0;
        let err = build_params(cli).expect_err("must reject share sum");
        assert!(err.contains("--prime-share"));
    }

    #[test]
    fn build_params_allows_any_mix_without_a_loan() {
        let mut cli = sample_cli();
        cli.down_payment = 100.0;
        cli.prime_share = 0.0;
        cli.kalats_share = 0.0;
        cli.katz_share = 0.0;
        assert!(build_params(cli).is_ok());
    }

    #[test]
    fn build_params_rejects_zero_down_payment() {
        let mut cli = sample_cli();
        cli.down_payment = 0.0;
        let err = build_params(cli).expect_err("must reject zero down payment");
        assert!(err.contains("--down-payment"));
    }

    #[test]
    fn build_params_rejects_fee_above_hundred() {
        let mut cli = sample_cli();
        cli.buy_fee = 120.0;
        let err = build_params(cli).expect_err("must reject fee");
        assert!(err.contains("--buy-fee"));
    }

    #[test]
    fn build_params_rejects_zero_track_term() {
        let mut cli = sample_cli();
        cli.matz_term = Some(0);
        let err = build_params(cli).expect_err("must reject zero term");
        assert!(err.contains("--matz-term"));
    }

    #[test]
    fn build_params_rejects_oversized_horizon_and_terms() {
        let mut cli = sample_cli();
        cli.horizon = 400_000_000;
        let err = build_params(cli).expect_err("must reject huge horizon");
        assert!(err.contains("--horizon"));

        let mut cli = sample_cli();
        cli.loan_term = 400_000_000;
        let err = build_params(cli).expect_err("must reject huge loan term");
        assert!(err.contains("--loan-term"));

        let mut cli = sample_cli();
        cli.prime_term = Some(51);
        let err = build_params(cli).expect_err("must reject long track term");
        assert!(err.contains("--prime-term"));

        let mut cli = sample_cli();
        cli.loan_term = 50;
        cli.horizon = 100;
        assert!(build_params(cli).is_ok());
    }

    #[test]
    fn build_params_rejects_prepayment_past_horizon() {
        let mut cli = sample_cli();
        cli.prepayments = vec![Prepayment {
            year: 21,
            track: TrackKind::Prime,
            amount: 10_000.0,
        }];
        let err = build_params(cli).expect_err("must reject late prepayment");
        assert!(err.contains("--prepay"));
    }

    #[test]
    fn purchase_tax_modes_map_to_core_variants() {
        let mut cli = sample_cli();
        cli.purchase_tax = CliPurchaseTax::FirstHome;
        assert_eq!(
            build_params(cli.clone()).expect("valid").fees.purchase_tax,
            PurchaseTax::Brackets { first_home: true }
        );
        cli.purchase_tax = CliPurchaseTax::Rate;
        cli.purchase_tax_rate = 5.0;
        assert_eq!(
            build_params(cli).expect("valid").fees.purchase_tax,
            PurchaseTax::Rate(0.05)
        );
    }

    #[test]
    fn parse_prepayment_reads_year_track_amount() {
        let prepayment = parse_prepayment("5:Kalats:100000").expect("valid prepayment");
        assert_eq!(prepayment.year, 5);
        assert_eq!(prepayment.track, TrackKind::Kalats);
        assert_approx(prepayment.amount, 100_000.0);

        assert!(parse_prepayment("5:kalats").is_err());
        assert!(parse_prepayment("x:kalats:1").is_err());
        assert!(
            parse_prepayment("5:fixed:1")
                .expect_err("unknown track")
                .contains("fixed")
        );
    }

    #[test]
    fn cli_parses_subcommands_and_flags() {
        let app = App::try_parse_from([
            "nadlan",
            "simulate",
            "--down-payment",
            "40",
            "--surplus-mode",
            "match",
            "--repay-method",
            "linear",
            "--sale-tax",
            "single-exemption",
            "--prepay",
            "3:katz:50000",
            "--historical-cpi",
        ])
        .expect("valid command line");
        let Command::Simulate(cli) = app.command else {
            panic!("expected simulate subcommand");
        };
        let params = build_params(cli).expect("valid params");
        assert_approx(params.down_payment, 0.40);
        assert_eq!(params.config.surplus, SurplusMode::Match);
        assert_eq!(params.config.repay, RepayMethod::LinearPrincipal);
        assert_eq!(params.taxes.sale, SaleTax::On(ExemptionType::Single));
        assert!(params.config.history.cpi);
        assert!(!params.config.history.equity);
        assert_eq!(params.prepayments.len(), 1);
        assert_eq!(params.prepayments[0].track, TrackKind::Katz);
    }

    #[test]
    fn cli_parses_serve_with_default_port() {
        let app = App::try_parse_from(["nadlan", "serve"]).expect("valid command line");
        assert!(matches!(app.command, Command::Serve { port: 8080 }));
    }

    #[test]
    fn payload_overlays_defaults_and_accepts_aliases() {
        let json = r#"{
          "equity": 800000,
          "downPayment": 50,
          "loanTerm": 25,
          "horizon": 30,
          "primeShare": 40,
          "kalatsShare": 20,
          "katzShare": 0,
          "malatzShare": 20,
          "matzShare": 20,
          "matzTerm": 15,
          "surplusMode": "reinvest",
          "exchange": "usd",
          "repayMethod": "linearPrincipal",
          "saleTax": "single",
          "gainsBasis": "nominal",
          "purchaseTax": "firstHome",
          "historicalFx": true,
          "prepayments": [{ "year": 2, "track": "malatz", "amount": 75000 }],
          "series": true
        }"#;
        let params = params_from_json(json).expect("json should parse");

        assert_approx(params.equity, 800_000.0);
        assert_approx(params.down_payment, 0.50);
        assert_eq!(params.loan_term_years, 25);
        assert_eq!(params.sim_horizon_years, 30);
        assert_eq!(params.track_terms.matz, Some(15));
        assert_eq!(params.track_terms.prime, None);
        assert_eq!(params.config.surplus, SurplusMode::Invest);
        assert_eq!(params.config.exchange, ExchangeMode::Unhedged);
        assert_eq!(params.config.repay, RepayMethod::LinearPrincipal);
        assert_eq!(params.taxes.sale, SaleTax::On(ExemptionType::Single));
        assert_eq!(params.taxes.gains_basis, GainsBasis::Nominal);
        assert_eq!(
            params.fees.purchase_tax,
            PurchaseTax::Brackets { first_home: true }
        );
        assert!(params.config.history.fx);
        assert_eq!(params.prepayments.len(), 1);
        assert_eq!(params.prepayments[0].track, TrackKind::Malatz);
        assert!(params.return_series);
        assert_approx(params.rates.prime, 0.0575);
    }

    #[test]
    fn payload_rejects_unknown_enum_value() {
        let err = params_from_json(r#"{ "surplusMode": "spend" }"#).expect_err("bad enum");
        assert!(err.contains("Invalid API JSON payload"));
    }

    #[test]
    fn optimize_payload_reads_locks_and_horizon_mode() {
        let payload: OptimizePayload = serde_json::from_str(
            r#"{ "lockDown": true, "horizonMode": "match-term", "equity": 600000 }"#,
        )
        .expect("json should parse");
        let args = optimize_args_from_payload(payload);
        let config = build_optimizer_config(&args);
        assert!(config.lock_down);
        assert!(!config.lock_term);
        assert_eq!(config.horizon, HorizonMode::MatchTerm);
        assert_approx(args.cli.equity, 600_000.0);
    }

    #[test]
    fn schedule_params_prefer_per_year_cpi() {
        let payload: SchedulePayload = serde_json::from_str(
            r#"{ "principal": 900000, "rate": 4.7, "months": 300, "method": "linear",
                 "rateResets": [{ "month": 61, "rate": 6.5 }],
                 "cpi": 3, "cpiByYear": [2, 2.5] }"#,
        )
        .expect("json should parse");
        let params = build_schedule_params(payload).expect("valid schedule");
        assert_approx(params.annual_rate, 0.047);
        assert_eq!(params.method, RepayMethod::LinearPrincipal);
        assert_eq!(params.rate_resets[0].month, 61);
        assert_approx(params.rate_resets[0].new_rate, 0.065);
        assert_eq!(params.cpi, Some(CpiLinkage::PerYear(vec![0.02, 0.025])));
    }

    #[test]
    fn schedule_params_reject_excessive_term() {
        let payload: SchedulePayload =
            serde_json::from_str(r#"{ "principal": 1000, "rate": 5, "months": 601 }"#)
                .expect("json should parse");
        let err = build_schedule_params(payload).expect_err("must reject months");
        assert!(err.contains("months"));
    }

    #[test]
    fn simulation_result_serializes_camel_case_fields() {
        let mut cli = sample_cli();
        cli.series = true;
        let json = simulate_command(cli).expect("simulation should serialize");
        for field in [
            "\"netRe\"",
            "\"netSp\"",
            "\"cagrRe\"",
            "\"cagrSp\"",
            "\"totalInterest\"",
            "\"interestByTrack\"",
            "\"firstPositiveCashflowMonth\"",
            "\"remainingLoan\"",
            "\"taxes\"",
            "\"series\"",
            "\"outOfPocket\"",
        ] {
            assert!(json.contains(field), "missing {field}");
        }
    }

    #[test]
    fn optimize_command_with_all_axes_locked_returns_current_point() {
        let args = OptimizeArgs {
            cli: sample_cli(),
            lock_down: true,
            lock_term: true,
            horizon_mode: CliHorizonMode::Locked,
        };
        let json = optimize_command(args).expect("optimizer should run");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");
        assert_eq!(value["sweetSpot"]["down"], 30);
        assert_eq!(value["sweetSpot"]["term"], 20);
        assert_eq!(value["sweetSpot"]["horizon"], 20);
    }

    #[tokio::test]
    async fn simulate_handler_rejects_invalid_payload_with_400() {
        let payload = SimulatePayload {
            equity: Some(-1.0),
            ..SimulatePayload::default()
        };
        let err = simulate_post_handler(Json(payload))
            .await
            .expect_err("must reject negative equity");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(
            body["error"]
                .as_str()
                .expect("error string")
                .contains("--equity")
        );
    }

    #[tokio::test]
    async fn optimize_handler_runs_on_blocking_pool() {
        let payload = OptimizePayload {
            lock_down: Some(true),
            lock_term: Some(true),
            horizon_mode: Some(ApiHorizonMode::Auto),
            ..OptimizePayload::default()
        };
        let response = optimize_handler(Json(payload))
            .await
            .expect("optimizer should succeed");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL),
            Some(&HeaderValue::from_static("no-store"))
        );
        let body = body_json(response).await;
        assert_eq!(body["sweetSpot"]["horizon"], 20);
    }

    #[tokio::test]
    async fn tax_handlers_return_reference_values() {
        let response = purchase_tax_handler(Query(PurchaseTaxQuery {
            value: 3_000_000.0,
            first_home: false,
        }))
        .await
        .expect("valid query");
        let body = body_json(response).await;
        assert_eq!(body["tax"], 240_000.0);

        let response = capital_gains_handler(Query(CapitalGainsQuery {
            sale_price: 3_000_000.0,
            cost_basis: 2_000_000.0,
            exemption: Some(ApiSaleTax::NoExemption),
        }))
        .await
        .expect("valid query");
        let body = body_json(response).await;
        assert_eq!(body["tax"], 250_000.0);
        assert_eq!(body["taxableGain"], 1_000_000.0);
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let response = not_found_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert!(body["error"].is_string());
    }
}
