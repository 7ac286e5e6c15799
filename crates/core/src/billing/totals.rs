//! Invoice totals calculation.
//!
//! Pure functions only. The same line items and terms always produce the
//! same [`Totals`]; nothing here touches the ledger.

use rust_decimal::Decimal;
use visadesk_shared::BillingConfig;
use visadesk_shared::types::{Currency, round_money};

use super::error::BillingError;
use super::types::{InvoiceTerms, LineBreakdown, LineItem, Totals};

/// Business constants that feed the totals calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    /// Stamp duty and withholding only apply in this currency.
    pub local_currency: Currency,
    /// Fixed stamp-duty fee.
    pub stamp_duty_amount: Decimal,
    /// Withholding applies only above this total.
    pub withholding_threshold: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::from(&BillingConfig::default())
    }
}

impl From<&BillingConfig> for FeeSchedule {
    fn from(config: &BillingConfig) -> Self {
        Self {
            local_currency: config.local_currency,
            stamp_duty_amount: config.stamp_duty_amount,
            withholding_threshold: config.withholding_threshold,
        }
    }
}

/// Largest items sum accepted: 10^15 currency units.
const MAX_AMOUNT: Decimal = Decimal::from_parts(2_764_472_320, 232_830, 0, false, 0);

/// Stateless calculator for invoice totals.
pub struct TotalsCalculator;

impl TotalsCalculator {
    /// Rejects malformed line items and terms.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found, in line order.
    pub fn validate(items: &[LineItem], terms: &InvoiceTerms) -> Result<(), BillingError> {
        let mut sum = Decimal::ZERO;
        for (line, item) in items.iter().enumerate() {
            if item.description.trim().is_empty() {
                return Err(BillingError::EmptyDescription { line });
            }
            if item.quantity < Decimal::ZERO {
                return Err(BillingError::NegativeQuantity {
                    line,
                    value: item.quantity,
                });
            }
            if item.unit_price < Decimal::ZERO {
                return Err(BillingError::NegativeUnitPrice {
                    line,
                    value: item.unit_price,
                });
            }
            sum = item
                .quantity
                .checked_mul(item.unit_price)
                .and_then(|total| sum.checked_add(total))
                .filter(|next| *next <= MAX_AMOUNT)
                .ok_or(BillingError::AmountOutOfRange { line })?;
        }

        if !(Decimal::ZERO..=Decimal::ONE).contains(&terms.tax.rate) {
            return Err(BillingError::InvalidTaxRate(terms.tax.rate));
        }
        if !(Decimal::ZERO..=Decimal::ONE).contains(&terms.withholding.rate) {
            return Err(BillingError::InvalidWithholdingRate(terms.withholding.rate));
        }
        if terms.discount < Decimal::ZERO {
            return Err(BillingError::NegativeDiscount(terms.discount));
        }

        Ok(())
    }

    /// Splits one line into its pre-tax and tax contributions.
    ///
    /// Tax-inclusive lines are decomposed so that `pre_tax + tax == line_total`
    /// exactly after rounding.
    #[must_use]
    pub fn line_breakdown(item: &LineItem, terms: &InvoiceTerms) -> LineBreakdown {
        let line_total = item.line_total();
        let rate = terms.tax.effective_rate();

        let (pre_tax, tax) = if item.tax_exempt || rate.is_zero() {
            (line_total, Decimal::ZERO)
        } else if item.is_pre_tax {
            (line_total, round_money(line_total * rate))
        } else {
            let pre_tax = round_money(line_total / (Decimal::ONE + rate));
            (pre_tax, line_total - pre_tax)
        };

        LineBreakdown {
            line_total,
            pre_tax,
            tax,
        }
    }

    /// Computes invoice totals after validating the input.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed items or terms.
    pub fn compute(
        items: &[LineItem],
        terms: &InvoiceTerms,
        fees: &FeeSchedule,
    ) -> Result<Totals, BillingError> {
        Self::validate(items, terms)?;
        Ok(Self::compute_unchecked(items, terms, fees))
    }

    /// Computes totals for input already known to be valid.
    fn compute_unchecked(items: &[LineItem], terms: &InvoiceTerms, fees: &FeeSchedule) -> Totals {
        let (subtotal, tax_amount) = items
            .iter()
            .map(|item| Self::line_breakdown(item, terms))
            .fold((Decimal::ZERO, Decimal::ZERO), |(sub, tax), line| {
                (sub + line.pre_tax, tax + line.tax)
            });

        let discount = terms.discount;
        let total = subtotal + tax_amount - discount;
        let is_local = terms.currency == fees.local_currency;

        let stamp_duty = if terms.stamp_duty && is_local {
            fees.stamp_duty_amount
        } else {
            Decimal::ZERO
        };

        let withholding_amount =
            if terms.withholding.enabled && is_local && total > fees.withholding_threshold {
                round_money(total * terms.withholding.rate)
            } else {
                Decimal::ZERO
            };

        let grand_total = (total + stamp_duty - withholding_amount).max(Decimal::ZERO);

        Totals {
            subtotal,
            tax_amount,
            discount,
            stamp_duty,
            withholding_amount,
            grand_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::types::{TaxConfig, WithholdingConfig};
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn fees() -> FeeSchedule {
        FeeSchedule {
            local_currency: Currency::Try,
            stamp_duty_amount: dec!(15.00),
            withholding_threshold: dec!(1000),
        }
    }

    fn taxed(currency: Currency, rate: Decimal) -> InvoiceTerms {
        InvoiceTerms {
            tax: TaxConfig::at(rate),
            ..InvoiceTerms::plain(currency)
        }
    }

    #[test]
    fn test_mixed_tax_semantics() {
        let items = vec![
            LineItem::new("Application fee", dec!(1), dec!(100)).exempt(),
            LineItem::new("Consultation", dec!(1), dec!(100)).pre_tax(),
            LineItem::new("Translation", dec!(1), dec!(100)),
        ];
        let totals =
            TotalsCalculator::compute(&items, &taxed(Currency::Eur, dec!(0.19)), &fees()).unwrap();

        assert_eq!(totals.subtotal, dec!(284.03));
        assert_eq!(totals.tax_amount, dec!(34.97));
        assert_eq!(totals.grand_total, dec!(319.00));
        assert_eq!(totals.withholding_amount, Decimal::ZERO);
    }

    #[test]
    fn test_withholding_above_threshold() {
        let items = vec![LineItem::new("Residence permit file", dec!(1), dec!(1200))];
        let terms = InvoiceTerms {
            withholding: WithholdingConfig::at(dec!(0.05)),
            ..InvoiceTerms::plain(Currency::Try)
        };
        let totals = TotalsCalculator::compute(&items, &terms, &fees()).unwrap();

        assert_eq!(totals.withholding_amount, dec!(60.00));
        assert_eq!(totals.grand_total, dec!(1140.00));
    }

    #[test]
    fn test_withholding_with_stamp_duty() {
        let items = vec![LineItem::new("Residence permit file", dec!(1), dec!(1200))];
        let terms = InvoiceTerms {
            stamp_duty: true,
            withholding: WithholdingConfig::at(dec!(0.05)),
            ..InvoiceTerms::plain(Currency::Try)
        };
        let totals = TotalsCalculator::compute(&items, &terms, &fees()).unwrap();

        assert_eq!(totals.stamp_duty, dec!(15.00));
        assert_eq!(totals.grand_total, dec!(1155.00));
    }

    #[rstest]
    #[case(dec!(1000), Decimal::ZERO)]
    #[case(dec!(1000.01), dec!(50.00))]
    #[case(dec!(999.99), Decimal::ZERO)]
    fn test_withholding_threshold_is_strict(#[case] price: Decimal, #[case] expected: Decimal) {
        let items = vec![LineItem::new("Visa service", dec!(1), price)];
        let terms = InvoiceTerms {
            withholding: WithholdingConfig::at(dec!(0.05)),
            ..InvoiceTerms::plain(Currency::Try)
        };
        let totals = TotalsCalculator::compute(&items, &terms, &fees()).unwrap();
        assert_eq!(totals.withholding_amount, expected);
    }

    #[test]
    fn test_foreign_currency_skips_stamp_and_withholding() {
        let items = vec![LineItem::new("Visa service", dec!(2), dec!(900))];
        let terms = InvoiceTerms {
            stamp_duty: true,
            withholding: WithholdingConfig::at(dec!(0.05)),
            ..InvoiceTerms::plain(Currency::Usd)
        };
        let totals = TotalsCalculator::compute(&items, &terms, &fees()).unwrap();

        assert_eq!(totals.stamp_duty, Decimal::ZERO);
        assert_eq!(totals.withholding_amount, Decimal::ZERO);
        assert_eq!(totals.grand_total, dec!(1800));
    }

    #[test]
    fn test_discount_floors_at_zero() {
        let items = vec![LineItem::new("Photo service", dec!(1), dec!(20))];
        let terms = InvoiceTerms {
            discount: dec!(50),
            ..InvoiceTerms::plain(Currency::Try)
        };
        let totals = TotalsCalculator::compute(&items, &terms, &fees()).unwrap();

        assert_eq!(totals.discount, dec!(50));
        assert_eq!(totals.grand_total, Decimal::ZERO);
    }

    #[test]
    fn test_disabled_tax_keeps_inclusive_line_whole() {
        let items = vec![LineItem::new("Courier", dec!(1), dec!(100))];
        let terms = InvoiceTerms {
            tax: TaxConfig {
                enabled: false,
                rate: dec!(0.19),
            },
            ..InvoiceTerms::plain(Currency::Eur)
        };
        let line = TotalsCalculator::line_breakdown(&items[0], &terms);
        assert_eq!(line.pre_tax, dec!(100));
        assert_eq!(line.tax, Decimal::ZERO);
    }

    #[test]
    fn test_exempt_wins_over_pre_tax() {
        let item = LineItem::new("Embassy fee", dec!(1), dec!(80)).exempt().pre_tax();
        let line = TotalsCalculator::line_breakdown(&item, &taxed(Currency::Eur, dec!(0.2)));
        assert_eq!(line.tax, Decimal::ZERO);
        assert_eq!(line.pre_tax, dec!(80));
    }

    #[test]
    fn test_empty_invoice_is_zero() {
        let totals =
            TotalsCalculator::compute(&[], &InvoiceTerms::plain(Currency::Try), &fees()).unwrap();
        assert_eq!(totals, Totals::default());
    }

    #[rstest]
    #[case(LineItem::new("", dec!(1), dec!(1)), "EMPTY_DESCRIPTION")]
    #[case(LineItem::new("   ", dec!(1), dec!(1)), "EMPTY_DESCRIPTION")]
    #[case(LineItem::new("Fee", dec!(-1), dec!(1)), "NEGATIVE_QUANTITY")]
    #[case(LineItem::new("Fee", dec!(1), dec!(-0.01)), "NEGATIVE_UNIT_PRICE")]
    #[case(LineItem::new("Fee", dec!(2), Decimal::MAX), "AMOUNT_OUT_OF_RANGE")]
    #[case(LineItem::new("Fee", dec!(1), dec!(1000000000000000.01)), "AMOUNT_OUT_OF_RANGE")]
    fn test_invalid_line_items_rejected(#[case] item: LineItem, #[case] code: &str) {
        let err = TotalsCalculator::compute(&[item], &InvoiceTerms::plain(Currency::Try), &fees())
            .unwrap_err();
        assert_eq!(err.error_code(), code);
    }

    #[test]
    fn test_invalid_terms_rejected() {
        let items = vec![LineItem::new("Fee", dec!(1), dec!(10))];

        let err = TotalsCalculator::compute(&items, &taxed(Currency::Try, dec!(19)), &fees())
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidTaxRate(_)));

        let terms = InvoiceTerms {
            discount: dec!(-1),
            ..InvoiceTerms::plain(Currency::Try)
        };
        let err = TotalsCalculator::compute(&items, &terms, &fees()).unwrap_err();
        assert!(matches!(err, BillingError::NegativeDiscount(_)));

        let terms = InvoiceTerms {
            withholding: WithholdingConfig::at(dec!(1.5)),
            ..InvoiceTerms::plain(Currency::Try)
        };
        let err = TotalsCalculator::compute(&items, &terms, &fees()).unwrap_err();
        assert!(matches!(err, BillingError::InvalidWithholdingRate(_)));
    }

    #[test]
    fn test_items_sum_beyond_range_names_the_line() {
        let items = vec![
            LineItem::new("Fee", dec!(1), dec!(600000000000000)),
            LineItem::new("Fee", dec!(1), dec!(10)),
            LineItem::new("Fee", dec!(1), dec!(600000000000000)),
        ];
        let err = TotalsCalculator::validate(&items, &InvoiceTerms::plain(Currency::Try))
            .unwrap_err();
        assert!(matches!(err, BillingError::AmountOutOfRange { line: 2 }));
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn test_sum_at_limit_is_accepted() {
        let items = vec![LineItem::new("Fee", dec!(4), dec!(250000000000000))];
        let totals =
            TotalsCalculator::compute(&items, &InvoiceTerms::plain(Currency::Try), &fees()).unwrap();
        assert_eq!(totals.grand_total, dec!(1000000000000000));
    }

    #[test]
    fn test_negative_zero_quantity_is_accepted() {
        let items = vec![LineItem::new("Fee", -Decimal::ZERO, dec!(10))];
        assert!(TotalsCalculator::validate(&items, &InvoiceTerms::plain(Currency::Try)).is_ok());
    }
}
