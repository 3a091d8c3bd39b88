use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderLine};

/// Emitted after a checkout transaction commits. Drives the "order received" notification to the
/// customer (delivery itself is an external collaborator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceivedEvent {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

impl OrderReceivedEvent {
    pub fn new(order: Order, lines: Vec<OrderLine>) -> Self {
        Self { order, lines }
    }
}

/// Emitted exactly once per order, when its derived balance first reaches zero and the order
/// transitions to `Paid`. Drives the new-order notifications to store staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}
