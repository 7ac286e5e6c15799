//! Property-based tests for InvoiceStatusMachine.

use proptest::prelude::*;

use super::status::{InvoiceStatus, InvoiceStatusMachine, LedgerEffect};

fn status() -> impl Strategy<Value = InvoiceStatus> {
    prop_oneof![
        Just(InvoiceStatus::Draft),
        Just(InvoiceStatus::Sent),
        Just(InvoiceStatus::Paid),
        Just(InvoiceStatus::Cancelled),
    ]
}

proptest! {
    /// *For any* pair, `plan` succeeds exactly when the transition is valid.
    #[test]
    fn prop_plan_agrees_with_validity(from in status(), to in status()) {
        let plan = InvoiceStatusMachine::plan(from, to);
        prop_assert_eq!(plan.is_ok(), InvoiceStatusMachine::is_valid_transition(from, to));
    }

    /// *For any* valid move, ledger work is needed exactly when entering or
    /// leaving `paid`.
    #[test]
    fn prop_ledger_effect_follows_paid(from in status(), to in status()) {
        if let Ok(plan) = InvoiceStatusMachine::plan(from, to) {
            let expected = if to == InvoiceStatus::Paid {
                LedgerEffect::Materialize
            } else if from == InvoiceStatus::Paid {
                LedgerEffect::Dematerialize
            } else {
                LedgerEffect::None
            };
            prop_assert_eq!(plan.ledger, expected);
        }
    }

    /// *For any* status, staying put is allowed and nothing leaves `cancelled`.
    #[test]
    fn prop_self_loops_and_terminal_cancel(s in status()) {
        prop_assert!(InvoiceStatusMachine::is_valid_transition(s, s));
        prop_assert_eq!(
            InvoiceStatusMachine::is_valid_transition(InvoiceStatus::Cancelled, s),
            s == InvoiceStatus::Cancelled
        );
    }
}
