use serde::Serialize;

use super::types::ExemptionType;

pub const CAPITAL_GAINS_RATE: f64 = 0.25;
pub const SALE_EXEMPTION_CAP: f64 = 5_008_000.0;
pub const RENTAL_TAX_RATE: f64 = 0.10;
/// Annual rental income below which the flat rental track is exempt, in today's money.
pub const RENTAL_EXEMPTION_ANNUAL: f64 = 65_652.0;

#[derive(Copy, Clone, Debug)]
struct Bracket {
    limit: f64,
    rate: f64,
}

const FIRST_HOME_BRACKETS: [Bracket; 5] = [
    Bracket {
        limit: 1_978_745.0,
        rate: 0.0,
    },
    Bracket {
        limit: 2_347_040.0,
        rate: 0.035,
    },
    Bracket {
        limit: 6_055_070.0,
        rate: 0.05,
    },
    Bracket {
        limit: 20_183_565.0,
        rate: 0.08,
    },
    Bracket {
        limit: f64::INFINITY,
        rate: 0.10,
    },
];

const INVESTMENT_BRACKETS: [Bracket; 2] = [
    Bracket {
        limit: 6_055_070.0,
        rate: 0.08,
    },
    Bracket {
        limit: f64::INFINITY,
        rate: 0.10,
    },
];

/// Acquisition tax on a property bought for `value`, rounded to whole units.
pub fn purchase_tax(value: f64, first_home: bool) -> f64 {
    let brackets: &[Bracket] = if first_home {
        &FIRST_HOME_BRACKETS
    } else {
        &INVESTMENT_BRACKETS
    };

    let mut tax = 0.0;
    let mut floor = 0.0;
    for bracket in brackets {
        if value <= floor {
            break;
        }
        let taxed = value.min(bracket.limit) - floor;
        tax += taxed * bracket.rate;
        floor = bracket.limit;
    }
    tax.round()
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalGainsTax {
    pub tax: f64,
    pub exempt_gain: f64,
    pub taxable_gain: f64,
}

/// Capital-gains tax due on the sale of a residence.
///
/// `cost_basis` is expected to already be indexed to the sale date, so the
/// difference is a real gain.
pub fn capital_gains(sale_price: f64, cost_basis: f64, exemption: ExemptionType) -> CapitalGainsTax {
    let gain = sale_price - cost_basis;
    if gain <= 0.0 {
        return CapitalGainsTax::default();
    }

    let exempt_gain = match exemption {
        ExemptionType::None => 0.0,
        ExemptionType::Single if sale_price <= SALE_EXEMPTION_CAP => gain,
        ExemptionType::Single => gain * (SALE_EXEMPTION_CAP / sale_price),
    };
    let taxable_gain = gain - exempt_gain;

    CapitalGainsTax {
        tax: taxable_gain * CAPITAL_GAINS_RATE,
        exempt_gain,
        taxable_gain,
    }
}

/// Monthly rental tax under the flat track; the exemption threshold is indexed by `cpi_index`.
pub fn rental_tax(gross_monthly_rent: f64, cpi_index: f64) -> f64 {
    let threshold = RENTAL_EXEMPTION_ANNUAL * cpi_index / 12.0;
    (gross_monthly_rent - threshold).max(0.0) * RENTAL_TAX_RATE
}

/// Flat tax on a securities gain; losses are not refunded.
pub fn securities_gain_tax(value: f64, basis: f64) -> f64 {
    (value - basis).max(0.0) * CAPITAL_GAINS_RATE
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

    #[test]
    fn first_home_below_threshold_is_exempt() {
        assert_eq!(purchase_tax(1_978_745.0, true), 0.0);
        assert_eq!(purchase_tax(1_500_000.0, true), 0.0);
    }

    #[test]
    fn first_home_second_bracket_is_marginal() {
        assert_close(purchase_tax(2_200_000.0, true), 7_744.0, 0.5);
    }

    #[test]
    fn first_home_spanning_three_brackets() {
        let expected: f64 =
            (2_347_040.0 - 1_978_745.0) * 0.035 + (3_000_000.0 - 2_347_040.0) * 0.05;
        assert_close(purchase_tax(3_000_000.0, true), expected.round(), 1e-9);
    }

    #[test]
    fn investment_property_pays_flat_eight_percent() {
        assert_eq!(purchase_tax(3_000_000.0, false), 240_000.0);
    }

    #[test]
    fn investment_property_above_top_limit_pays_ten_percent_marginally() {
        let expected: f64 = 6_055_070.0 * 0.08 + 1_000_000.0 * 0.10;
        assert_close(purchase_tax(7_055_070.0, false), expected.round(), 1e-9);
    }

    #[test]
    fn zero_value_has_no_tax() {
        assert_eq!(purchase_tax(0.0, true), 0.0);
        assert_eq!(purchase_tax(0.0, false), 0.0);
    }

    #[test]
    fn single_exemption_under_cap_is_fully_exempt() {
        let result = capital_gains(3_000_000.0, 2_000_000.0, ExemptionType::Single);
        assert_eq!(result.tax, 0.0);
        assert_close(result.exempt_gain, 1_000_000.0, 1e-9);
        assert_eq!(result.taxable_gain, 0.0);
    }

    #[test]
    fn no_exemption_taxes_full_gain() {
        let result = capital_gains(3_000_000.0, 2_000_000.0, ExemptionType::None);
        assert_close(result.tax, 250_000.0, 1e-9);
        assert_close(result.taxable_gain, 1_000_000.0, 1e-9);
    }

    #[test]
    fn single_exemption_above_cap_splits_pro_rata() {
        let sale = 8_000_000.0;
        let result = capital_gains(sale, 6_000_000.0, ExemptionType::Single);
        let exempt = 2_000_000.0 * SALE_EXEMPTION_CAP / sale;
        assert_close(result.exempt_gain, exempt, 1e-6);
        assert_close(result.tax, (2_000_000.0 - exempt) * 0.25, 1e-6);
    }

    #[test]
    fn loss_has_no_tax() {
        let result = capital_gains(1_800_000.0, 2_000_000.0, ExemptionType::None);
        assert_eq!(result, CapitalGainsTax::default());
    }

    #[test]
    fn rental_tax_applies_only_above_indexed_threshold() {
        assert_eq!(rental_tax(5_000.0, 1.0), 0.0);
        assert_close(rental_tax(6_471.0, 1.0), 100.0, 1e-9);
        assert_eq!(rental_tax(6_471.0, 1.2), 0.0);
    }
}
