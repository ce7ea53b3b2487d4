use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct Order {
    pub order_id: i32,
    pub client_id: i32,
    pub project_id: Option<i32>,
    /// Staff member or account that placed the order
    pub user_id: i32,
    pub status: String,
    pub total_amount: f64,
    pub total_paid: f64,
    pub balance_due: f64,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

impl Order {
    pub fn balance(&self) -> Balance {
        Balance::new(self.total_amount, self.total_paid)
    }
}

/// Money owed on an order.
///
/// `balance_due` is always derived, never stored independently of the two
/// totals it comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Balance {
    pub total_amount: f64,
    pub total_paid: f64,
}

impl Balance {
    pub fn new(total_amount: f64, total_paid: f64) -> Self {
        Self {
            total_amount,
            total_paid,
        }
    }

    pub fn balance_due(&self) -> f64 {
        (self.total_amount - self.total_paid).max(0.0)
    }

    pub fn record_payment(self, amount: f64) -> Self {
        Self {
            total_paid: self.total_paid + amount,
            ..self
        }
    }

    /// Replace a previously recorded payment amount with a new one
    pub fn amend_payment(self, old_amount: f64, new_amount: f64) -> Self {
        Self {
            total_paid: (self.total_paid + new_amount - old_amount).max(0.0),
            ..self
        }
    }

    pub fn remove_payment(self, amount: f64) -> Self {
        Self {
            total_paid: (self.total_paid - amount).max(0.0),
            ..self
        }
    }

    pub fn with_total(self, total_amount: f64) -> Self {
        Self {
            total_amount,
            ..self
        }
    }

    pub fn add_line(self, line_total: f64) -> Self {
        self.with_total(self.total_amount + line_total)
    }

    pub fn remove_line(self, line_total: f64) -> Self {
        self.with_total((self.total_amount - line_total).max(0.0))
    }
}

pub const STATUS_PENDING: &str = "Pending";
pub const STATUS_COMPLETED: &str = "Completed";
pub const CASH_ON_DELIVERY: &str = "cod";

/// How a checkout is paid for
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Nothing paid yet, the full total stays due
    OnDelivery,
    /// Paid in full at checkout
    Immediate { method: String, reference: String },
}

impl Settlement {
    /// Anything other than cash on delivery settles immediately
    pub fn for_method(method: &str, now_millis: i64) -> Self {
        if method.trim().eq_ignore_ascii_case(CASH_ON_DELIVERY) {
            Self::OnDelivery
        } else {
            Self::Immediate {
                method: method.trim().to_string(),
                reference: format!("TXN-{now_millis}"),
            }
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::OnDelivery => STATUS_PENDING,
            Self::Immediate { .. } => STATUS_COMPLETED,
        }
    }

    pub fn balance(&self, total_amount: f64) -> Balance {
        match self {
            Self::OnDelivery => Balance::new(total_amount, 0.0),
            Self::Immediate { .. } => Balance::new(total_amount, total_amount),
        }
    }

    /// Method and reference of the payment row to record.
    ///
    /// A zero total is settled without one, payments must be positive.
    pub fn payment(&self, total_amount: f64) -> Option<(&str, &str)> {
        match self {
            Self::Immediate { method, reference } if total_amount > 0.0 => Some((method.as_str(), reference.as_str())),
            _ => None,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OrderStats {
    pub total_orders: i64,
    pub pending_orders: i64,
    pub completed_orders: i64,
    pub today_orders: i64,
    pub total_revenue: f64,
    pub monthly_revenue: f64,
}

/// Pending and completed counts from per-status totals, ignoring case
pub fn tally_statuses<'a, I>(counts: I) -> (i64, i64)
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    counts.into_iter().fold((0, 0), |(pending, completed), (status, count)| {
        let status = status.trim();
        if status.eq_ignore_ascii_case(STATUS_PENDING) {
            (pending + count, completed)
        } else if status.eq_ignore_ascii_case(STATUS_COMPLETED) {
            (pending, completed + count)
        } else {
            (pending, completed)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payments_reduce_balance_to_zero_floor() {
        let balance = Balance::new(100.0, 0.0);
        assert_eq!(balance.balance_due(), 100.0);

        let balance = balance.record_payment(40.0);
        assert_eq!(balance.total_paid, 40.0);
        assert_eq!(balance.balance_due(), 60.0);

        // overpayment is kept in total_paid but never yields a negative balance
        let balance = balance.record_payment(100.0);
        assert_eq!(balance.total_paid, 140.0);
        assert_eq!(balance.balance_due(), 0.0);
    }

    #[test]
    fn amending_and_removing_payments() {
        let balance = Balance::new(200.0, 0.0).record_payment(50.0);

        let amended = balance.amend_payment(50.0, 80.0);
        assert_eq!(amended.total_paid, 80.0);
        assert_eq!(amended.balance_due(), 120.0);

        let removed = amended.remove_payment(80.0);
        assert_eq!(removed.total_paid, 0.0);
        assert_eq!(removed.balance_due(), 200.0);

        assert_eq!(Balance::new(10.0, 5.0).remove_payment(20.0).total_paid, 0.0);
    }

    #[test]
    fn changing_total_recomputes_balance() {
        let balance = Balance::new(100.0, 30.0);
        assert_eq!(balance.with_total(20.0).balance_due(), 0.0);
        assert_eq!(balance.add_line(50.0).balance_due(), 120.0);
        assert_eq!(balance.remove_line(500.0).total_amount, 0.0);
    }

    #[test]
    fn cash_on_delivery_leaves_the_total_due() {
        let settlement = Settlement::for_method("COD", 1_700_000_000_000);
        assert_eq!(settlement, Settlement::OnDelivery);
        assert_eq!(settlement.status(), "Pending");
        assert_eq!(settlement.balance(45.0).total_paid, 0.0);
        assert_eq!(settlement.balance(45.0).balance_due(), 45.0);
        assert_eq!(settlement.payment(45.0), None);
    }

    #[test]
    fn other_methods_settle_in_full() {
        let settlement = Settlement::for_method(" momo ", 1_700_000_000_000);
        assert_eq!(settlement.status(), "Completed");

        let balance = settlement.balance(45.0);
        assert_eq!(balance.total_paid, 45.0);
        assert_eq!(balance.balance_due(), 0.0);
        assert_eq!(settlement.payment(45.0), Some(("momo", "TXN-1700000000000")));
    }

    #[test]
    fn free_orders_complete_without_a_payment_row() {
        let settlement = Settlement::for_method("card", 5);
        assert_eq!(settlement.status(), "Completed");
        assert_eq!(settlement.balance(0.0).balance_due(), 0.0);
        assert_eq!(settlement.payment(0.0), None);
    }

    #[test]
    fn status_tally_ignores_case() {
        let rows = [("Pending", 2), ("pending", 1), ("COMPLETED", 4), ("Completed ", 1), ("Cancelled", 7)];
        assert_eq!(tally_statuses(rows), (3, 5));
        assert_eq!(tally_statuses(Vec::<(&str, i64)>::new()), (0, 0));
    }
}
