use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::events::Event;
use crate::loan::Loan;
use crate::store::LoanStore;
use crate::types::LoanId;

use super::{Payment, PaymentLedger};

/// cached balance fields disagreeing with payment history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub loan_id: LoanId,
    pub loan_number: String,
    pub cached_outstanding: Money,
    pub expected_outstanding: Money,
    pub cached_paid: Money,
    pub expected_paid: Money,
}

impl DriftReport {
    fn compare(loan: &Loan, payments: &[Payment]) -> Option<Self> {
        let (expected_outstanding, expected_paid) = expected_balances(loan.principal, payments);
        if expected_outstanding == loan.outstanding_balance && expected_paid == loan.total_amount_paid {
            return None;
        }

        Some(Self {
            loan_id: loan.id,
            loan_number: loan.loan_number.clone(),
            cached_outstanding: loan.outstanding_balance,
            expected_outstanding,
            cached_paid: loan.total_amount_paid,
            expected_paid,
        })
    }

    pub fn to_error(&self) -> LendingError {
        LendingError::ReconciliationDrift {
            loan_number: self.loan_number.clone(),
            cached_outstanding: self.cached_outstanding,
            expected_outstanding: self.expected_outstanding,
            cached_paid: self.cached_paid,
            expected_paid: self.expected_paid,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub loan_id: LoanId,
    /// drift that was repaired, if any
    pub drift: Option<DriftReport>,
    pub outstanding_balance: Money,
    pub total_amount_paid: Money,
}

/// (outstanding, total paid) implied by completed EMI, PARTIAL and CLOSURE payments
pub fn expected_balances(principal: Money, payments: &[Payment]) -> (Money, Money) {
    let paid: Money = payments.iter().filter(|p| p.is_amortizing()).map(|p| p.amount).sum();
    (principal.saturating_sub(paid), paid)
}

impl<S: LoanStore> PaymentLedger<S> {
    pub fn detect_drift(&self, loan_id: LoanId) -> Result<Option<DriftReport>> {
        let loan = self.store.find_loan(loan_id)?;
        let payments = self.store.find_payments(loan_id)?;
        Ok(DriftReport::compare(&loan, &payments))
    }

    /// fail with `ReconciliationDrift` when the cached balances have drifted
    pub fn verify_balances(&self, loan_id: LoanId) -> Result<()> {
        match self.detect_drift(loan_id)? {
            Some(drift) => Err(drift.to_error()),
            None => Ok(()),
        }
    }

    /// rewrite outstanding balance and total paid from the full payment history
    ///
    /// Status is left alone; the repair realigns figures only.
    pub fn reconcile_loan(&self, loan_id: LoanId) -> Result<ReconciliationOutcome> {
        let now = self.time.now();

        self.store.transaction(|tx| {
            let mut loan = tx.lock_loan(loan_id)?;
            let payments = tx.payments(loan_id)?;

            let Some(drift) = DriftReport::compare(&loan, &payments) else {
                return Ok(ReconciliationOutcome {
                    loan_id,
                    drift: None,
                    outstanding_balance: loan.outstanding_balance,
                    total_amount_paid: loan.total_amount_paid,
                });
            };

            warn!(
                loan_id = %loan_id,
                loan_number = %loan.loan_number,
                cached_outstanding = %drift.cached_outstanding,
                expected_outstanding = %drift.expected_outstanding,
                cached_paid = %drift.cached_paid,
                expected_paid = %drift.expected_paid,
                "balance drift repaired"
            );

            loan.outstanding_balance = drift.expected_outstanding;
            loan.total_amount_paid = drift.expected_paid;
            loan.updated_at = now;

            tx.append_event(Event::BalanceReconciled {
                loan_id,
                old_outstanding: drift.cached_outstanding,
                new_outstanding: drift.expected_outstanding,
                old_total_paid: drift.cached_paid,
                new_total_paid: drift.expected_paid,
                timestamp: now,
            });

            let outcome = ReconciliationOutcome {
                loan_id,
                outstanding_balance: loan.outstanding_balance,
                total_amount_paid: loan.total_amount_paid,
                drift: Some(drift),
            };
            tx.put_loan(loan)?;

            info!(loan_id = %loan_id, "loan reconciled");
            Ok(outcome)
        })
    }
}
