//! Persistence port for the lending core.
//!
//! Services hold an `Arc<S: LoanStore>` and never reach storage any other
//! way. Every write to a loan record goes through [`LoanStore::transaction`],
//! which gives the closure exclusive access to the rows it locks and commits
//! all staged writes together or not at all.

pub mod memory;

use chrono::NaiveDate;

use crate::collateral::GoldItem;
use crate::decimal::Money;
use crate::errors::Result;
use crate::events::Event;
use crate::loan::Loan;
use crate::payments::Payment;
use crate::types::{GoldItemId, LoanId, LoanStatus};

pub use memory::InMemoryLoanStore;

/// query over loan records; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoanFilter {
    pub status: Option<LoanStatus>,
    pub is_overdue: Option<bool>,
    pub min_days_overdue: Option<u32>,
    pub max_days_overdue: Option<u32>,
    pub min_overdue_amount: Option<Money>,
}

impl LoanFilter {
    pub fn with_status(status: LoanStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// active loans whose cached snapshot says overdue
    pub fn overdue() -> Self {
        Self {
            status: Some(LoanStatus::Active),
            is_overdue: Some(true),
            ..Self::default()
        }
    }

    pub fn matches(&self, loan: &Loan) -> bool {
        if self.status.is_some_and(|s| s != loan.status) {
            return false;
        }
        if self.is_overdue.is_some_and(|o| o != loan.overdue.is_overdue) {
            return false;
        }
        if self.min_days_overdue.is_some_and(|d| loan.overdue.days_overdue < d) {
            return false;
        }
        if self.max_days_overdue.is_some_and(|d| loan.overdue.days_overdue > d) {
            return false;
        }
        if self.min_overdue_amount.is_some_and(|a| loan.overdue.overdue_amount < a) {
            return false;
        }
        true
    }
}

/// view of the store inside an atomic unit of work
pub trait StoreTransaction {
    /// read a loan and hold it exclusively until the transaction ends
    fn lock_loan(&mut self, id: LoanId) -> Result<Loan>;

    fn put_loan(&mut self, loan: Loan) -> Result<()>;

    fn insert_payment(&mut self, payment: Payment) -> Result<()>;

    /// payments for one loan, including any staged in this transaction
    fn payments(&mut self, loan_id: LoanId) -> Result<Vec<Payment>>;

    fn gold_items(&mut self, loan_id: LoanId) -> Result<Vec<GoldItem>>;

    fn put_gold_item(&mut self, item: GoldItem) -> Result<()>;

    fn remove_gold_item(&mut self, id: GoldItemId) -> Result<()>;

    fn append_event(&mut self, event: Event);
}

pub trait LoanStore: Send + Sync {
    fn find_loan(&self, id: LoanId) -> Result<Loan>;

    fn find_loans(&self, filter: &LoanFilter) -> Result<Vec<Loan>>;

    fn find_active_loans(&self) -> Result<Vec<Loan>> {
        self.find_loans(&LoanFilter::with_status(LoanStatus::Active))
    }

    /// next per-day sequence number for loan numbering, starting at 1
    fn next_loan_sequence(&self, date: NaiveDate) -> Result<u32>;

    fn find_gold_item(&self, id: GoldItemId) -> Result<GoldItem>;

    fn find_gold_items(&self, loan_id: LoanId) -> Result<Vec<GoldItem>>;

    /// payments for one loan in recording order
    fn find_payments(&self, loan_id: LoanId) -> Result<Vec<Payment>>;

    fn all_payments(&self) -> Result<Vec<Payment>>;

    fn events(&self) -> Result<Vec<Event>>;

    /// audit trail of one loan, oldest first
    fn events_for_loan(&self, loan_id: LoanId) -> Result<Vec<Event>> {
        Ok(self.events()?.into_iter().filter(|e| e.loan_id() == loan_id).collect())
    }

    /// run `f` as one atomic unit of work
    ///
    /// Writes staged through the transaction become visible only if `f`
    /// returns `Ok`. The closure must not call back into the store itself.
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T>,
        Self: Sized;
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::fixtures::{active_loan, jan_17};
    use crate::overdue::OverdueStatus;

    fn overdue_loan(days: u32, amount: i64) -> Loan {
        let mut loan = active_loan(jan_17());
        loan.overdue = OverdueStatus {
            is_overdue: true,
            days_overdue: days,
            overdue_amount: Money::from_major(amount),
            penalty_amount: Money::ZERO,
            next_due_date: Some(jan_17()),
        };
        loan
    }

    #[test]
    fn test_filter_ranges() {
        let filter = LoanFilter {
            min_days_overdue: Some(30),
            max_days_overdue: Some(60),
            min_overdue_amount: Some(Money::from_major(5_000)),
            ..LoanFilter::overdue()
        };

        assert!(filter.matches(&overdue_loan(30, 5_000)));
        assert!(filter.matches(&overdue_loan(60, 9_000)));
        assert!(!filter.matches(&overdue_loan(29, 9_000)));
        assert!(!filter.matches(&overdue_loan(61, 9_000)));
        assert!(!filter.matches(&overdue_loan(45, 4_999)));
        assert!(!filter.matches(&active_loan(jan_17())));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let mut loan = active_loan(jan_17());
        assert!(LoanFilter::default().matches(&loan));

        loan.status = LoanStatus::Rejected;
        assert!(LoanFilter::default().matches(&loan));
        assert!(!LoanFilter::with_status(LoanStatus::Active).matches(&loan));
    }
}
