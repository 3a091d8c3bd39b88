//! Balance accounting over the payment ledger.
//!
//! Amounts paid, refunded and outstanding are always derived from the [`PaymentRecord`] stream and never
//! stored, so they cannot drift from the ledger under partial payments, declines and refunds.

use abg_common::Money;

use crate::db_types::{PaymentRecord, PaymentStatus};

pub fn amount_paid(records: &[PaymentRecord]) -> Money {
    records.iter().filter(|r| r.status == PaymentStatus::Completed).map(|r| r.amount).sum()
}

pub fn amount_refunded(records: &[PaymentRecord]) -> Money {
    records.iter().filter(|r| r.status == PaymentStatus::Refunded).map(|r| r.amount).sum()
}

/// Paid minus refunded, floored at zero.
pub fn net_paid(records: &[PaymentRecord]) -> Money {
    let net = amount_paid(records) - amount_refunded(records);
    net.max(Money::default())
}

/// The amount still outstanding against `amount_payable`. Zero once the net paid amount covers the
/// payable amount; the full payable amount while nothing has effectively been paid.
pub fn balance(amount_payable: Money, records: &[PaymentRecord]) -> Money {
    let net = net_paid(records);
    if net >= amount_payable {
        Money::default()
    } else if net > Money::default() {
        amount_payable - net
    } else {
        amount_payable
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::db_types::{Gateway, LedgerTarget, OrderId, PaymentStatus};

    fn record(amount: i64, status: PaymentStatus) -> PaymentRecord {
        PaymentRecord {
            id: 0,
            target: LedgerTarget::Order(OrderId(1)),
            txid: None,
            amount: Money::from_cents(amount),
            status,
            gateway: Gateway::Paypal,
            paid_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_ledger_owes_everything() {
        let payable = Money::whole(100);
        assert_eq!(balance(payable, &[]), payable);
        assert_eq!(net_paid(&[]), Money::default());
    }

    #[test]
    fn declines_do_not_count() {
        let records = [record(5_000, PaymentStatus::Completed), record(9_999, PaymentStatus::Declined)];
        assert_eq!(amount_paid(&records), Money::whole(50));
        assert_eq!(balance(Money::whole(100), &records), Money::whole(50));
    }

    #[test]
    fn refunds_reduce_net_paid() {
        let records = [
            record(10_000, PaymentStatus::Completed),
            record(4_000, PaymentStatus::Refunded),
        ];
        assert_eq!(net_paid(&records), Money::whole(60));
        assert_eq!(balance(Money::whole(100), &records), Money::whole(40));
    }

    #[test]
    fn refund_exceeding_payments_floors_at_zero() {
        let records = [record(3_000, PaymentStatus::Completed), record(5_000, PaymentStatus::Refunded)];
        assert_eq!(net_paid(&records), Money::default());
        assert_eq!(balance(Money::whole(100), &records), Money::whole(100));
    }

    #[test]
    fn overpayment_clamps_balance_to_zero() {
        let records = [record(20_000, PaymentStatus::Completed)];
        assert_eq!(balance(Money::whole(100), &records), Money::default());
    }

    #[test]
    fn balance_plus_net_paid_equals_payable() {
        // Holds for any sequence that does not overpay.
        let payable = Money::whole(264);
        let sequences: Vec<Vec<PaymentRecord>> = vec![
            vec![record(10_000, PaymentStatus::Completed)],
            vec![record(10_000, PaymentStatus::Completed), record(5_000, PaymentStatus::Declined)],
            vec![record(20_000, PaymentStatus::Completed), record(6_000, PaymentStatus::Refunded)],
            vec![
                record(15_000, PaymentStatus::Completed),
                record(11_400, PaymentStatus::Completed),
                record(2_000, PaymentStatus::Refunded),
                record(1, PaymentStatus::Failed),
            ],
        ];
        for records in sequences {
            assert_eq!(balance(payable, &records) + net_paid(&records), payable);
        }
    }
}
