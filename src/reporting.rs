use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::Result;
use crate::overdue::AgingBuckets;
use crate::store::{LoanFilter, LoanStore};
use crate::types::LoanStatus;

/// read-only rollup over the whole book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReport {
    pub loans_by_status: BTreeMap<String, usize>,
    /// principal of every loan that has been disbursed
    pub total_disbursed: Money,
    /// outstanding balance of ACTIVE and DEFAULTED loans
    pub total_outstanding: Money,
    /// completed EMI, PARTIAL and CLOSURE payments
    pub total_collected: Money,
    pub total_penalty_accrued: Money,
    pub overdue_buckets: AgingBuckets,
    /// collections per calendar month, keyed `YYYY-MM`
    pub monthly_collections: BTreeMap<String, Money>,
}

impl PortfolioReport {
    pub fn build<S: LoanStore>(store: &S) -> Result<Self> {
        let loans = store.find_loans(&LoanFilter::default())?;
        let payments = store.all_payments()?;

        let mut loans_by_status: BTreeMap<String, usize> =
            LoanStatus::ALL.iter().map(|s| (s.to_string(), 0)).collect();
        let mut total_disbursed = Money::ZERO;
        let mut total_outstanding = Money::ZERO;
        let mut total_penalty_accrued = Money::ZERO;
        let mut overdue_buckets = AgingBuckets::default();

        for loan in &loans {
            *loans_by_status.entry(loan.status.to_string()).or_insert(0) += 1;

            if loan.disbursement_date.is_some() {
                total_disbursed += loan.principal;
            }
            if matches!(loan.status, LoanStatus::Active | LoanStatus::Defaulted) {
                total_outstanding += loan.outstanding_balance;
            }
            if loan.is_overdue() {
                total_penalty_accrued += loan.overdue.penalty_amount;
                overdue_buckets.record(loan.overdue.days_overdue);
            }
        }

        let mut total_collected = Money::ZERO;
        let mut monthly_collections: BTreeMap<String, Money> = BTreeMap::new();
        for payment in payments.iter().filter(|p| p.is_amortizing()) {
            total_collected += payment.amount;
            *monthly_collections
                .entry(payment.payment_date.format("%Y-%m").to_string())
                .or_insert(Money::ZERO) += payment.amount;
        }

        Ok(Self {
            loans_by_status,
            total_disbursed,
            total_outstanding,
            total_collected,
            total_penalty_accrued,
            overdue_buckets,
            monthly_collections,
        })
    }

    pub fn count(&self, status: LoanStatus) -> usize {
        self.loans_by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}
