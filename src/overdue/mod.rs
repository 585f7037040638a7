//! Overdue & penalty engine.
//!
//! Overdue state is derived from the loan's terms, disbursement date and
//! last payment, then cached on the loan record. The cached snapshot only
//! ever changes through [`OverdueService`], inside a store transaction.

pub mod due_date;
pub mod penalty;
pub mod statistics;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::decimal::Money;
use crate::errors::Result;
use crate::events::Event;
use crate::loan::Loan;
use crate::store::LoanStore;
use crate::types::{LoanId, LoanStatus};

pub use due_date::{next_due_date, AVERAGE_DAYS_PER_MONTH};
pub use penalty::PenaltyConfig;
pub use statistics::{AgingBuckets, OverdueFilter, OverdueStatistics};

/// days overdue at which an active loan is escalated when no threshold is configured
pub const DEFAULT_THRESHOLD_DAYS: u32 = 90;

/// `overdue_since` records the first time a loan ever went overdue and
/// survives recovery; a loan that falls behind again keeps the original stamp
pub const KEEP_OVERDUE_SINCE_AFTER_RECOVERY: bool = true;

/// cached overdue snapshot carried on the loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverdueStatus {
    pub is_overdue: bool,
    pub days_overdue: u32,
    pub overdue_amount: Money,
    pub penalty_amount: Money,
    pub next_due_date: Option<DateTime<Utc>>,
}

impl OverdueStatus {
    pub fn not_overdue(next_due_date: Option<DateTime<Utc>>) -> Self {
        Self {
            is_overdue: false,
            days_overdue: 0,
            overdue_amount: Money::ZERO,
            penalty_amount: Money::ZERO,
            next_due_date,
        }
    }
}

/// how a recomputation moved the overdue flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverdueChange {
    Unchanged,
    BecameOverdue,
    Cleared,
}

impl OverdueChange {
    fn between(was_overdue: bool, is_overdue: bool) -> Self {
        match (was_overdue, is_overdue) {
            (false, true) => OverdueChange::BecameOverdue,
            (true, false) => OverdueChange::Cleared,
            _ => OverdueChange::Unchanged,
        }
    }
}

/// overdue snapshot of `loan` as of `now`
pub fn calculate_overdue_status(loan: &Loan, now: DateTime<Utc>) -> Result<OverdueStatus> {
    if loan.status != LoanStatus::Active {
        return Ok(OverdueStatus::not_overdue(None));
    }

    let next_due = next_due_date(loan, now)?;
    let due = match next_due {
        Some(due) if now > due => due,
        _ => return Ok(OverdueStatus::not_overdue(next_due)),
    };

    let days_overdue = u32::try_from((now - due).num_days()).unwrap_or(u32::MAX);
    // exposure is the installment currently due, not the whole balance
    let overdue_amount = loan.emi_amount.min(loan.outstanding_balance);
    let penalty_amount = loan.penalty.calculate(overdue_amount, days_overdue);

    Ok(OverdueStatus {
        is_overdue: true,
        days_overdue,
        overdue_amount,
        penalty_amount,
        next_due_date: Some(due),
    })
}

/// value of `overdue_since` after a recomputation
pub fn resolve_overdue_since(
    previous: Option<DateTime<Utc>>,
    is_overdue: bool,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if is_overdue {
        Some(previous.unwrap_or(now))
    } else if KEEP_OVERDUE_SINCE_AFTER_RECOVERY {
        previous
    } else {
        None
    }
}

pub struct OverdueService<S: LoanStore> {
    store: Arc<S>,
    time: SafeTimeProvider,
    default_threshold_days: u32,
}

impl<S: LoanStore> OverdueService<S> {
    pub fn new(store: Arc<S>, time: SafeTimeProvider) -> Self {
        Self {
            store,
            time,
            default_threshold_days: DEFAULT_THRESHOLD_DAYS,
        }
    }

    pub fn with_threshold(mut self, days: u32) -> Self {
        self.default_threshold_days = days;
        self
    }

    pub fn default_threshold_days(&self) -> u32 {
        self.default_threshold_days
    }

    /// pure recomputation against the service clock; nothing is persisted
    pub fn calculate_overdue_status(&self, loan: &Loan) -> Result<OverdueStatus> {
        calculate_overdue_status(loan, self.time.now())
    }

    /// recompute and persist the overdue snapshot of one loan
    pub fn update_loan_overdue_status(&self, loan_id: LoanId) -> Result<Loan> {
        self.refresh(loan_id).map(|(loan, _)| loan)
    }

    pub(crate) fn refresh(&self, loan_id: LoanId) -> Result<(Loan, OverdueChange)> {
        let now = self.time.now();

        self.store.transaction(|tx| {
            let mut loan = tx.lock_loan(loan_id)?;
            let status = calculate_overdue_status(&loan, now)?;
            let change = OverdueChange::between(loan.overdue.is_overdue, status.is_overdue);
            let overdue_since = resolve_overdue_since(loan.overdue_since, status.is_overdue, now);

            if status == loan.overdue && overdue_since == loan.overdue_since {
                debug!(loan_id = %loan_id, "overdue snapshot unchanged");
                return Ok((loan, change));
            }

            match change {
                OverdueChange::BecameOverdue => {
                    info!(
                        loan_id = %loan_id,
                        loan_number = %loan.loan_number,
                        days_overdue = status.days_overdue,
                        overdue_amount = %status.overdue_amount,
                        "loan became overdue"
                    );
                    tx.append_event(Event::OverdueStarted {
                        loan_id,
                        days_overdue: status.days_overdue,
                        overdue_amount: status.overdue_amount,
                        timestamp: now,
                    });
                }
                OverdueChange::Cleared => {
                    info!(loan_id = %loan_id, loan_number = %loan.loan_number, "overdue cleared");
                    tx.append_event(Event::OverdueCleared { loan_id, timestamp: now });
                }
                OverdueChange::Unchanged => {
                    debug!(
                        loan_id = %loan_id,
                        days_overdue = status.days_overdue,
                        penalty = %status.penalty_amount,
                        "overdue snapshot recomputed"
                    );
                }
            }

            loan.overdue = status;
            loan.overdue_since = overdue_since;
            loan.updated_at = now;
            tx.put_loan(loan.clone())?;

            Ok((loan, change))
        })
    }

    /// escalate to DEFAULTED when the cached snapshot is at least `threshold_days` overdue
    ///
    /// Returns whether the loan was escalated by this call.
    pub fn check_and_mark_defaulted(&self, loan_id: LoanId, threshold_days: u32) -> Result<bool> {
        let now = self.time.now();

        self.store.transaction(|tx| {
            let mut loan = tx.lock_loan(loan_id)?;
            if !loan.is_active() || !loan.is_overdue() || loan.overdue.days_overdue < threshold_days {
                return Ok(false);
            }

            let days_overdue = loan.overdue.days_overdue;
            loan.transition(LoanStatus::Defaulted, now);

            tx.append_event(Event::StatusChanged {
                loan_id,
                old_status: LoanStatus::Active,
                new_status: LoanStatus::Defaulted,
                timestamp: now,
            });
            tx.append_event(Event::LoanDefaulted {
                loan_id,
                days_overdue,
                outstanding: loan.outstanding_balance,
                timestamp: now,
            });

            info!(
                loan_id = %loan_id,
                loan_number = %loan.loan_number,
                days_overdue,
                threshold_days,
                "loan marked defaulted"
            );

            tx.put_loan(loan)?;
            Ok(true)
        })
    }

    /// overdue loans matching `filter`, most overdue first
    pub fn get_overdue_loans(&self, filter: &OverdueFilter) -> Result<Vec<Loan>> {
        let mut loans = self.store.find_loans(&filter.to_loan_filter())?;
        loans.sort_by(|a, b| b.overdue.days_overdue.cmp(&a.overdue.days_overdue));
        Ok(loans)
    }

    pub fn get_overdue_statistics(&self) -> Result<OverdueStatistics> {
        let loans = self.store.find_loans(&OverdueFilter::default().to_loan_filter())?;
        Ok(OverdueStatistics::from_loans(&loans))
    }
}
