use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::loan::Loan;
use crate::store::LoanFilter;

/// caller-facing query over overdue loans
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverdueFilter {
    pub min_days: Option<u32>,
    pub max_days: Option<u32>,
    pub min_amount: Option<Money>,
}

impl OverdueFilter {
    pub fn at_least_days(days: u32) -> Self {
        Self {
            min_days: Some(days),
            ..Self::default()
        }
    }

    pub fn to_loan_filter(&self) -> LoanFilter {
        LoanFilter {
            min_days_overdue: self.min_days,
            max_days_overdue: self.max_days,
            min_overdue_amount: self.min_amount,
            ..LoanFilter::overdue()
        }
    }
}

/// overdue loans counted by age
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgingBuckets {
    pub days_1_to_30: usize,
    pub days_31_to_60: usize,
    pub days_61_to_90: usize,
    pub days_over_90: usize,
}

impl AgingBuckets {
    /// count one overdue loan; less than a full day late falls in the first bucket
    pub fn record(&mut self, days_overdue: u32) {
        match days_overdue {
            0..=30 => self.days_1_to_30 += 1,
            31..=60 => self.days_31_to_60 += 1,
            61..=90 => self.days_61_to_90 += 1,
            _ => self.days_over_90 += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.days_1_to_30 + self.days_31_to_60 + self.days_61_to_90 + self.days_over_90
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverdueStatistics {
    pub total_overdue_loans: usize,
    pub total_overdue_amount: Money,
    pub total_penalty: Money,
    /// mean days overdue, 2 decimal places
    pub average_days_overdue: Decimal,
    pub buckets: AgingBuckets,
}

impl OverdueStatistics {
    /// aggregate the cached snapshots of the overdue loans among `loans`
    pub fn from_loans<'a>(loans: impl IntoIterator<Item = &'a Loan>) -> Self {
        let mut count = 0usize;
        let mut total_days = 0u64;
        let mut total_overdue_amount = Money::ZERO;
        let mut total_penalty = Money::ZERO;
        let mut buckets = AgingBuckets::default();

        for loan in loans.into_iter().filter(|l| l.is_active() && l.is_overdue()) {
            count += 1;
            total_days += u64::from(loan.overdue.days_overdue);
            total_overdue_amount += loan.overdue.overdue_amount;
            total_penalty += loan.overdue.penalty_amount;
            buckets.record(loan.overdue.days_overdue);
        }

        let average_days_overdue = if count == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(total_days) / Decimal::from(count as u64)).round_dp(2)
        };

        Self {
            total_overdue_loans: count,
            total_overdue_amount,
            total_penalty,
            average_days_overdue,
            buckets,
        }
    }
}
