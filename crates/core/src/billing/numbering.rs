//! Invoice number generation.
//!
//! Numbers look like `{prefix}{year}-{sequence}`, e.g. `INV-2026-00042`.
//! A sequence is resumed from the numbers already stored for the same
//! prefix and year, so the store stays the single source of truth.

use super::error::BillingError;

const DEFAULT_PADDING: usize = 5;

/// Sequential invoice number generator for one prefix and year.
#[derive(Debug, Clone)]
pub struct InvoiceNumberSequence {
    prefix: String,
    year: i32,
    /// `None` once the sequence ran past `u64::MAX`.
    next_number: Option<u64>,
    zero_pad: usize,
}

impl InvoiceNumberSequence {
    /// Create a new sequence starting at 1.
    pub fn new(prefix: impl Into<String>, year: i32) -> Self {
        Self {
            prefix: prefix.into(),
            year,
            next_number: Some(1),
            zero_pad: DEFAULT_PADDING,
        }
    }

    /// Continue after the highest sequence found among `existing`.
    ///
    /// Numbers with another prefix or year, with a non-numeric tail, or at
    /// the very end of the `u64` range are ignored.
    pub fn resume<'a>(
        prefix: impl Into<String>,
        year: i32,
        existing: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut seq = Self::new(prefix, year);
        let highest = existing
            .into_iter()
            .filter_map(|number| seq.sequence_of(number))
            .filter(|&n| n < u64::MAX)
            .max()
            .unwrap_or(0);
        seq.next_number = highest.checked_add(1);
        seq
    }

    /// The part shared by every number of this sequence, e.g. `INV-2026-`.
    #[must_use]
    pub fn stem(&self) -> String {
        format!("{}{}-", self.prefix, self.year)
    }

    /// Extracts the sequence part of `number` if it belongs to this sequence.
    #[must_use]
    pub fn sequence_of(&self, number: &str) -> Option<u64> {
        let tail = number.strip_prefix(&self.stem())?;
        if tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        tail.parse().ok()
    }

    /// Generate the next invoice number.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceNumbersExhausted` once the sequence has no numbers left.
    pub fn next_number(&mut self) -> Result<String, BillingError> {
        let number = self.peek()?;
        self.next_number = self.next_number.and_then(|n| n.checked_add(1));
        Ok(number)
    }

    /// Preview the next number without consuming it.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceNumbersExhausted` once the sequence has no numbers left.
    pub fn peek(&self) -> Result<String, BillingError> {
        let next = self
            .next_number
            .ok_or_else(|| BillingError::InvoiceNumbersExhausted { stem: self.stem() })?;
        Ok(format!("{}{:0>width$}", self.stem(), next, width = self.zero_pad))
    }

    /// Get the year of the sequence.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }
}

/// Trims a caller-supplied invoice number.
///
/// # Errors
///
/// Returns `BlankInvoiceNumber` when nothing is left after trimming.
pub fn normalize_number(number: &str) -> Result<String, BillingError> {
    let trimmed = number.trim();
    if trimmed.is_empty() {
        return Err(BillingError::BlankInvoiceNumber);
    }
    Ok(trimmed.to_string())
}
