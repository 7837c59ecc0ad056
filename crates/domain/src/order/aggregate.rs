//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::line::{LineSnapshot, OrderLine};
use crate::Money;

use super::{OrderError, OrderStatus};

/// Order aggregate root.
///
/// An immutable snapshot of purchased lines plus a status. Lines are fixed
/// at creation; afterwards only the status (and with it `updated_at`)
/// changes, always through [`Order::set_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    lines: Vec<OrderLine>,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a pending order from cart line snapshots.
    ///
    /// Lines with a non-positive quantity are dropped; if nothing remains
    /// the order is not created. Lines whose combined total does not fit a
    /// money amount are rejected.
    pub fn create_from_lines(
        user_id: UserId,
        lines: impl IntoIterator<Item = LineSnapshot>,
    ) -> Result<Self, OrderError> {
        let lines: Vec<OrderLine> = lines
            .into_iter()
            .filter_map(|line| {
                u32::try_from(line.quantity)
                    .ok()
                    .filter(|q| *q > 0)
                    .map(|q| OrderLine::new(line.product, q))
            })
            .collect();

        if lines.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        lines
            .iter()
            .try_fold(Money::zero(), |acc, line| {
                line.checked_line_total().and_then(|t| acc.checked_add(t))
            })
            .ok_or(OrderError::AmountOverflow)?;

        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(),
            user_id,
            lines,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuilds an order from persisted rows.
    ///
    /// Persistence reload path only.
    #[doc(hidden)]
    pub fn rehydrate(
        id: OrderId,
        user_id: UserId,
        lines: Vec<OrderLine>,
        status: OrderStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            lines,
            status,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the number of lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Returns the sum of all line totals.
    pub fn total(&self) -> Money {
        self.lines.iter().map(OrderLine::line_total).sum()
    }

    /// Moves the order to `Paid`.
    pub fn mark_paid(&mut self) -> OrderStatus {
        self.set_status(OrderStatus::Paid)
    }

    /// Moves the order to `status` and refreshes `updated_at`.
    ///
    /// This is the single entry point for status changes. Returns the
    /// previous status.
    pub fn set_status(&mut self, status: OrderStatus) -> OrderStatus {
        let previous = self.status;
        self.status = status;
        self.touch();
        previous
    }

    fn touch(&mut self) {
        // Wall clocks can step backwards; never report an update before creation.
        self.updated_at = Utc::now().max(self.created_at);
    }
}
