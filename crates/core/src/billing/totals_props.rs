//! Property-based tests for TotalsCalculator.
//!
//! - Totals are idempotent and the grand total is never negative
//! - Tax-inclusive lines decompose exactly into pre-tax + tax
//! - The grand total identity holds whenever it is not floored

use proptest::prelude::*;
use rust_decimal::Decimal;
use visadesk_shared::types::Currency;

use super::totals::{FeeSchedule, TotalsCalculator};
use super::types::{InvoiceTerms, LineItem, TaxConfig, WithholdingConfig};

/// Strategy to generate non-negative money amounts (0.00 to 5,000.00).
fn amount() -> impl Strategy<Value = Decimal> {
    (0i64..500_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy to generate quantities (0 to 20, with up to one decimal).
fn quantity() -> impl Strategy<Value = Decimal> {
    (0i64..200i64).prop_map(|tenths| Decimal::new(tenths, 1))
}

/// Strategy to generate fractional rates (0.00 to 0.50).
fn rate() -> impl Strategy<Value = Decimal> {
    (0i64..=50i64).prop_map(|pct| Decimal::new(pct, 2))
}

fn line_item() -> impl Strategy<Value = LineItem> {
    (quantity(), amount(), any::<bool>(), any::<bool>()).prop_map(
        |(quantity, unit_price, tax_exempt, is_pre_tax)| LineItem {
            description: "Service".to_string(),
            quantity,
            unit_price,
            tax_exempt,
            is_pre_tax,
        },
    )
}

fn currency() -> impl Strategy<Value = Currency> {
    prop_oneof![Just(Currency::Try), Just(Currency::Eur), Just(Currency::Usd)]
}

fn terms() -> impl Strategy<Value = InvoiceTerms> {
    (
        currency(),
        any::<bool>(),
        rate(),
        (0i64..50_000i64).prop_map(|c| Decimal::new(c, 2)),
        any::<bool>(),
        any::<bool>(),
        rate(),
    )
        .prop_map(
            |(currency, tax_enabled, tax_rate, discount, stamp_duty, wh_enabled, wh_rate)| {
                InvoiceTerms {
                    currency,
                    tax: TaxConfig {
                        enabled: tax_enabled,
                        rate: tax_rate,
                    },
                    discount,
                    stamp_duty,
                    withholding: WithholdingConfig {
                        enabled: wh_enabled,
                        rate: wh_rate,
                    },
                }
            },
        )
}

fn fees() -> FeeSchedule {
    FeeSchedule {
        local_currency: Currency::Try,
        stamp_duty_amount: Decimal::new(1_500, 2),
        withholding_threshold: Decimal::new(1_000, 0),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// *For any* valid input, computing twice yields identical totals and the
    /// grand total is never negative.
    #[test]
    fn prop_totals_idempotent_and_non_negative(
        items in prop::collection::vec(line_item(), 0..8),
        terms in terms(),
    ) {
        let first = TotalsCalculator::compute(&items, &terms, &fees()).unwrap();
        let second = TotalsCalculator::compute(&items, &terms, &fees()).unwrap();

        prop_assert_eq!(first, second);
        prop_assert!(first.grand_total >= Decimal::ZERO);
    }

    /// *For any* line, pre-tax plus tax equals the line total for
    /// tax-inclusive and exempt lines.
    #[test]
    fn prop_inclusive_lines_decompose_exactly(
        item in line_item(),
        terms in terms(),
    ) {
        let line = TotalsCalculator::line_breakdown(&item, &terms);
        if item.tax_exempt || !item.is_pre_tax {
            prop_assert_eq!(line.pre_tax + line.tax, line.line_total);
        } else {
            prop_assert_eq!(line.pre_tax, line.line_total);
        }
        prop_assert!(line.tax >= Decimal::ZERO);
    }

    /// *For any* input, the grand total equals
    /// `subtotal + tax - discount + stamp - withholding` floored at zero.
    #[test]
    fn prop_grand_total_identity(
        items in prop::collection::vec(line_item(), 0..8),
        terms in terms(),
    ) {
        let totals = TotalsCalculator::compute(&items, &terms, &fees()).unwrap();
        let expected = totals.subtotal + totals.tax_amount - totals.discount
            + totals.stamp_duty
            - totals.withholding_amount;

        prop_assert_eq!(totals.grand_total, expected.max(Decimal::ZERO));
    }

    /// *For any* non-local currency, stamp duty and withholding are zero.
    #[test]
    fn prop_foreign_currency_has_no_local_fees(
        items in prop::collection::vec(line_item(), 0..8),
        terms in terms(),
    ) {
        prop_assume!(terms.currency != Currency::Try);
        let totals = TotalsCalculator::compute(&items, &terms, &fees()).unwrap();

        prop_assert_eq!(totals.stamp_duty, Decimal::ZERO);
        prop_assert_eq!(totals.withholding_amount, Decimal::ZERO);
    }
}
