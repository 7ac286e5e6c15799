//! Invoice status state machine.
//!
//! Stored states are `draft`, `sent`, `paid` and `cancelled`. `overdue` is
//! derived at read time and is never a transition target. The machine only
//! decides legality and the ledger side effect of a move; the engine carries
//! the side effect out.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::BillingError;

/// Stored lifecycle status of an invoice.
///
/// Valid transitions:
/// - Draft → Sent, Paid, Cancelled
/// - Sent → Draft, Paid, Cancelled
/// - Paid → Draft, Sent, Cancelled (undo of paid)
/// - any status → itself (no-op; re-affirms the ledger for Paid)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    /// Being prepared; freely editable.
    Draft,
    /// Sent to the client, awaiting payment.
    Sent,
    /// Collected into an account.
    Paid,
    /// Withdrawn.
    Cancelled,
}

impl InvoiceStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "sent" => Some(Self::Sent),
            "paid" => Some(Self::Paid),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns true if line items and terms may change.
    #[must_use]
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft | Self::Sent)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status as presented to operators, including the derived `overdue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    /// Draft.
    Draft,
    /// Sent and not yet due.
    Sent,
    /// Sent and past its due date.
    Overdue,
    /// Paid.
    Paid,
    /// Cancelled.
    Cancelled,
}

impl From<InvoiceStatus> for DisplayStatus {
    fn from(value: InvoiceStatus) -> Self {
        match value {
            InvoiceStatus::Draft => Self::Draft,
            InvoiceStatus::Sent => Self::Sent,
            InvoiceStatus::Paid => Self::Paid,
            InvoiceStatus::Cancelled => Self::Cancelled,
        }
    }
}

/// Ledger side effect required by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    /// Status field only.
    None,
    /// Create the invoice's ledger transaction (idempotent).
    Materialize,
    /// Reverse and remove the invoice's ledger transaction before the status write.
    Dematerialize,
}

/// A validated transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPlan {
    /// Status before.
    pub from: InvoiceStatus,
    /// Status after.
    pub to: InvoiceStatus,
    /// Ledger work that must happen first.
    pub ledger: LedgerEffect,
}

impl TransitionPlan {
    /// True when nothing changes and no ledger work is needed.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.ledger == LedgerEffect::None
    }

    /// Whether the collection reference must be present after the move.
    #[must_use]
    pub fn keeps_collection(&self) -> bool {
        self.to == InvoiceStatus::Paid
    }
}

/// Stateless validator for invoice status transitions.
pub struct InvoiceStatusMachine;

impl InvoiceStatusMachine {
    /// Check if a status transition is valid.
    #[must_use]
    pub fn is_valid_transition(from: InvoiceStatus, to: InvoiceStatus) -> bool {
        use InvoiceStatus::{Cancelled, Draft, Paid, Sent};

        from == to
            || matches!(
                (from, to),
                (Draft, Sent | Paid | Cancelled)
                    | (Sent, Draft | Paid | Cancelled)
                    | (Paid, Draft | Sent | Cancelled)
            )
    }

    /// Validates a transition and returns the ledger work it requires.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` for moves the machine does not allow.
    pub fn plan(from: InvoiceStatus, to: InvoiceStatus) -> Result<TransitionPlan, BillingError> {
        if !Self::is_valid_transition(from, to) {
            return Err(BillingError::InvalidTransition { from, to });
        }

        let ledger = match (from, to) {
            (_, InvoiceStatus::Paid) => LedgerEffect::Materialize,
            (InvoiceStatus::Paid, _) => LedgerEffect::Dematerialize,
            _ => LedgerEffect::None,
        };

        Ok(TransitionPlan { from, to, ledger })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use InvoiceStatus::{Cancelled, Draft, Paid, Sent};

    #[test]
    fn test_status_as_str_and_parse() {
        for status in [Draft, Sent, Paid, Cancelled] {
            assert_eq!(InvoiceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(InvoiceStatus::parse("PAID"), Some(Paid));
        assert_eq!(InvoiceStatus::parse("canceled"), Some(Cancelled));
        assert_eq!(InvoiceStatus::parse("overdue"), None);
    }

    #[test]
    fn test_status_editable() {
        assert!(Draft.is_editable());
        assert!(Sent.is_editable());
        assert!(!Paid.is_editable());
        assert!(!Cancelled.is_editable());
    }

    #[rstest]
    #[case(Draft, Sent, LedgerEffect::None)]
    #[case(Sent, Draft, LedgerEffect::None)]
    #[case(Draft, Paid, LedgerEffect::Materialize)]
    #[case(Sent, Paid, LedgerEffect::Materialize)]
    #[case(Paid, Paid, LedgerEffect::Materialize)]
    #[case(Paid, Draft, LedgerEffect::Dematerialize)]
    #[case(Paid, Sent, LedgerEffect::Dematerialize)]
    #[case(Paid, Cancelled, LedgerEffect::Dematerialize)]
    #[case(Draft, Cancelled, LedgerEffect::None)]
    #[case(Sent, Cancelled, LedgerEffect::None)]
    #[case(Cancelled, Cancelled, LedgerEffect::None)]
    fn test_valid_plans(
        #[case] from: InvoiceStatus,
        #[case] to: InvoiceStatus,
        #[case] effect: LedgerEffect,
    ) {
        let plan = InvoiceStatusMachine::plan(from, to).unwrap();
        assert_eq!(plan.ledger, effect);
        assert_eq!(plan.keeps_collection(), to == Paid);
    }

    #[rstest]
    #[case(Cancelled, Draft)]
    #[case(Cancelled, Sent)]
    #[case(Cancelled, Paid)]
    fn test_cancelled_is_terminal(#[case] from: InvoiceStatus, #[case] to: InvoiceStatus) {
        assert!(matches!(
            InvoiceStatusMachine::plan(from, to),
            Err(BillingError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_noop_plans() {
        assert!(InvoiceStatusMachine::plan(Draft, Draft).unwrap().is_noop());
        assert!(InvoiceStatusMachine::plan(Sent, Sent).unwrap().is_noop());
        assert!(!InvoiceStatusMachine::plan(Paid, Paid).unwrap().is_noop());
    }

    #[test]
    fn test_display_status_from_stored() {
        assert_eq!(DisplayStatus::from(Paid), DisplayStatus::Paid);
        assert_eq!(DisplayStatus::from(Cancelled), DisplayStatus::Cancelled);
    }
}
