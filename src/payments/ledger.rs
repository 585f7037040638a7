use std::sync::Arc;

use hourglass_rs::SafeTimeProvider;
use tracing::{info, warn};

use crate::config::LendingConfig;
use crate::errors::{LendingError, Result};
use crate::events::Event;
use crate::loan::Loan;
use crate::overdue::OverdueService;
use crate::store::LoanStore;
use crate::terms::split_installment;
use crate::types::{LoanId, LoanStatus, PaymentBreakdown, PaymentType};

use super::{Payment, PaymentRequest};

/// records payments and keeps loan balances in step with them
pub struct PaymentLedger<S: LoanStore> {
    pub(super) store: Arc<S>,
    pub(super) time: SafeTimeProvider,
    overdue: OverdueService<S>,
    receipt_prefix: String,
}

impl<S: LoanStore> PaymentLedger<S> {
    pub fn new(store: Arc<S>, time: SafeTimeProvider, config: &LendingConfig) -> Self {
        let overdue = OverdueService::new(Arc::clone(&store), time.clone()).with_threshold(config.default_threshold_days);

        Self {
            store,
            time,
            overdue,
            receipt_prefix: config.receipt_prefix.clone(),
        }
    }

    /// record a completed payment against its loan
    ///
    /// EMI, PARTIAL and CLOSURE payments reduce the outstanding balance in
    /// the same transaction that stores the payment. The overdue snapshot is
    /// refreshed after commit; a failed refresh leaves the payment in place.
    pub fn record_payment(&self, request: PaymentRequest) -> Result<Payment> {
        request.validate()?;
        let loan_id = request.loan_id;
        let now = self.time.now();

        let payment = self.store.transaction(|tx| {
            let mut loan = tx.lock_loan(loan_id)?;

            if !request.payment_type.permitted_for(loan.status) {
                if request.payment_type == PaymentType::Disbursement {
                    return Err(LendingError::InvalidState {
                        current: loan.status.to_string(),
                        expected: "disbursement through loan disbursement".to_string(),
                    });
                }
                return Err(LendingError::invalid_status(loan.status, "ACTIVE or DEFAULTED"));
            }

            let mut request = request.clone();
            if request.breakdown.is_none() {
                request.breakdown = default_breakdown(&loan, &request);
            }
            let payment = Payment::completed(&request, &self.receipt_prefix, now);

            if payment.payment_type.amortizes() {
                let old_status = loan.status;
                let completed = loan.apply_amortizing_payment(payment.amount, now);

                if completed {
                    tx.append_event(Event::StatusChanged {
                        loan_id,
                        old_status,
                        new_status: LoanStatus::Completed,
                        timestamp: now,
                    });
                    tx.append_event(Event::LoanCompleted {
                        loan_id,
                        total_paid: loan.total_amount_paid,
                        timestamp: now,
                    });
                    info!(loan_id = %loan_id, loan_number = %loan.loan_number, "loan completed");
                }

                tx.put_loan(loan.clone())?;
            }

            tx.insert_payment(payment.clone())?;
            tx.append_event(Event::PaymentRecorded {
                loan_id,
                payment_id: payment.id,
                receipt_number: payment.receipt_number.clone(),
                payment_type: payment.payment_type,
                amount: payment.amount,
                outstanding_after: loan.outstanding_balance,
                timestamp: now,
            });

            info!(
                loan_id = %loan_id,
                receipt = %payment.receipt_number,
                payment_type = ?payment.payment_type,
                amount = %payment.amount,
                outstanding = %loan.outstanding_balance,
                "payment recorded"
            );

            Ok(payment)
        })?;

        if let Err(e) = self.overdue.refresh(loan_id) {
            warn!(
                loan_id = %loan_id,
                receipt = %payment.receipt_number,
                error = %e,
                "overdue refresh after payment failed"
            );
        }

        Ok(payment)
    }

    /// every payment recorded against a loan, oldest first
    pub fn payment_history(&self, loan_id: LoanId) -> Result<Vec<Payment>> {
        self.store.find_loan(loan_id)?;
        let mut payments = self.store.find_payments(loan_id)?;
        payments.sort_by_key(|p| p.payment_date);
        Ok(payments)
    }
}

/// EMI payments without an explicit split are divided into this month's
/// interest on the balance and principal; other types carry no breakdown
fn default_breakdown(loan: &Loan, request: &PaymentRequest) -> Option<PaymentBreakdown> {
    match request.payment_type {
        PaymentType::Emi => Some(split_installment(
            loan.outstanding_balance,
            loan.annual_rate,
            request.amount,
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Money;
    use crate::loan::fixtures::{active_loan, jan_17};
    use crate::overdue::OverdueStatus;
    use crate::store::testing::FailingStore;
    use crate::store::InMemoryLoanStore;
    use crate::types::PaymentMethod;
    use chrono::{Duration, TimeZone, Utc};
    use hourglass_rs::TimeSource;

    fn setup() -> (Arc<InMemoryLoanStore>, PaymentLedger<InMemoryLoanStore>, SafeTimeProvider, LoanId) {
        let store = Arc::new(InMemoryLoanStore::new());
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 2, 17, 0, 0, 0).unwrap()));
        let ledger = PaymentLedger::new(Arc::clone(&store), time.clone(), &LendingConfig::default());

        let loan = active_loan(jan_17());
        let id = loan.id;
        store.insert_loan(loan).unwrap();

        (store, ledger, time, id)
    }

    fn emi(id: LoanId, amount: Money) -> PaymentRequest {
        PaymentRequest::new(id, amount, PaymentType::Emi, PaymentMethod::Upi)
    }

    #[test]
    fn test_emi_payment_updates_balance() {
        let (store, ledger, _, id) = setup();

        let payment = ledger.record_payment(emi(id, Money::from_str_exact("8884.88").unwrap())).unwrap();
        let loan = store.find_loan(id).unwrap();

        assert_eq!(loan.outstanding_balance, Money::from_str_exact("91115.12").unwrap());
        assert_eq!(loan.total_amount_paid, Money::from_str_exact("8884.88").unwrap());
        assert_eq!(loan.last_payment_date, Some(payment.payment_date));
        assert!(!loan.is_overdue());
        assert!(payment.receipt_number.starts_with("RCP-20240217-"));

        let breakdown = payment.breakdown.unwrap();
        assert_eq!(breakdown.interest, Money::from_major(1_000));
        assert_eq!(breakdown.total(), payment.amount);
    }

    #[test]
    fn test_non_amortizing_payment_leaves_balance() {
        let (store, ledger, _, id) = setup();

        let request = PaymentRequest::new(id, Money::from_major(500), PaymentType::Penalty, PaymentMethod::Cash);
        let payment = ledger.record_payment(request).unwrap();
        let loan = store.find_loan(id).unwrap();

        assert_eq!(payment.breakdown, None);
        assert_eq!(loan.outstanding_balance, Money::from_major(100_000));
        assert_eq!(loan.total_amount_paid, Money::ZERO);
        assert_eq!(store.find_payments(id).unwrap().len(), 1);
    }

    #[test]
    fn test_closure_completes_loan() {
        let (store, ledger, _, id) = setup();

        let request = PaymentRequest::new(id, Money::from_major(100_000), PaymentType::Closure, PaymentMethod::BankTransfer);
        ledger.record_payment(request).unwrap();

        let loan = store.find_loan(id).unwrap();
        assert_eq!(loan.status, LoanStatus::Completed);
        assert_eq!(loan.outstanding_balance, Money::ZERO);
        assert!(store
            .events()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Event::LoanCompleted { .. })));

        // completed loans accept no further payments
        let err = ledger.record_payment(emi(id, Money::from_major(1))).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");
    }

    #[test]
    fn test_rejected_requests() {
        let (store, ledger, _, id) = setup();

        let err = ledger.record_payment(emi(id, Money::ZERO)).unwrap_err();
        assert_eq!(err, LendingError::InvalidPaymentAmount { amount: Money::ZERO });

        let err = ledger.record_payment(emi(uuid::Uuid::new_v4(), Money::from_major(10))).unwrap_err();
        assert_eq!(err.http_status(), 404);

        let disbursement = PaymentRequest::new(id, Money::from_major(10), PaymentType::Disbursement, PaymentMethod::Cash);
        assert!(ledger.record_payment(disbursement).is_err());

        let mut pending = store.find_loan(id).unwrap();
        pending.status = LoanStatus::Pending;
        store.save_loan(&pending).unwrap();
        let err = ledger.record_payment(emi(id, Money::from_major(10))).unwrap_err();
        assert_eq!(err.http_status(), 409);

        assert!(store.find_payments(id).unwrap().is_empty());
    }

    #[test]
    fn test_defaulted_loan_accepts_recovery_payments() {
        let (store, ledger, _, id) = setup();
        let mut loan = store.find_loan(id).unwrap();
        loan.status = LoanStatus::Defaulted;
        store.save_loan(&loan).unwrap();

        ledger.record_payment(emi(id, Money::from_major(10_000))).unwrap();

        let loan = store.find_loan(id).unwrap();
        assert_eq!(loan.status, LoanStatus::Defaulted);
        assert_eq!(loan.outstanding_balance, Money::from_major(90_000));
    }

    #[test]
    fn test_payment_history_ordered() {
        let (_, ledger, time, id) = setup();
        let control = time.test_control().unwrap();

        ledger.record_payment(emi(id, Money::from_major(1_000))).unwrap();
        control.advance(Duration::days(3));
        ledger
            .record_payment(PaymentRequest::new(id, Money::from_major(200), PaymentType::Partial, PaymentMethod::Cash))
            .unwrap();

        let history = ledger.payment_history(id).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].payment_date < history[1].payment_date);
        assert!(ledger.payment_history(uuid::Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_receipts_use_configured_prefix() {
        let store = Arc::new(InMemoryLoanStore::new());
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 2, 17, 0, 0, 0).unwrap()));
        let config = LendingConfig {
            receipt_prefix: "GLR".to_string(),
            ..LendingConfig::default()
        };
        let ledger = PaymentLedger::new(Arc::clone(&store), time, &config);

        let loan = active_loan(jan_17());
        let id = loan.id;
        store.insert_loan(loan).unwrap();

        let payment = ledger.record_payment(emi(id, Money::from_major(1_000))).unwrap();
        assert!(payment.receipt_number.starts_with("GLR-20240217-"));
    }

    #[test]
    fn test_failed_overdue_refresh_keeps_payment() {
        let mut loan = active_loan(jan_17());
        // stale snapshot from an earlier sweep
        loan.overdue = OverdueStatus {
            is_overdue: true,
            days_overdue: 3,
            overdue_amount: loan.emi_amount,
            penalty_amount: Money::ZERO,
            next_due_date: Some(Utc.with_ymd_and_hms(2024, 2, 17, 0, 0, 0).unwrap()),
        };
        let id = loan.id;

        // the payment transaction locks the loan once; the refresh after it fails
        let store = Arc::new(FailingStore::new(id, 1));
        store.inner.insert_loan(loan).unwrap();
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 2, 20, 0, 0, 0).unwrap()));
        let ledger = PaymentLedger::new(Arc::clone(&store), time, &LendingConfig::default());

        let payment = ledger.record_payment(emi(id, Money::from_major(1_000))).unwrap();

        let payments = store.find_payments(id).unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].receipt_number, payment.receipt_number);

        let loan = store.find_loan(id).unwrap();
        assert_eq!(loan.outstanding_balance, Money::from_major(99_000));
        assert_eq!(loan.total_amount_paid, Money::from_major(1_000));
        // snapshot was not refreshed
        assert!(loan.overdue.is_overdue);
        assert_eq!(loan.overdue.days_overdue, 3);
    }
}
