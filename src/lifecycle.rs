use std::sync::Arc;

use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::collateral::{CollateralSummary, GoldItem, NewGoldItem};
use crate::config::LendingConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{LendingError, Result};
use crate::events::Event;
use crate::loan::Loan;
use crate::overdue::{OverdueStatus, PenaltyConfig};
use crate::payments::{Payment, PaymentRequest};
use crate::store::{LoanStore, StoreTransaction};
use crate::terms::{calculate_emi, loan_to_value, maturity_date, AmortizationSchedule, MAX_TENURE_MONTHS};
use crate::types::{GoldItemId, GoldItemStatus, LoanId, LoanStatus, PaymentMethod, PaymentType};

/// loan application as submitted by staff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateLoanRequest {
    pub customer_id: String,
    pub principal: Money,
    pub annual_rate: Rate,
    pub tenure_months: u32,
    pub gold_items: Vec<NewGoldItem>,
    /// falls back to the configured default penalty terms
    pub penalty: Option<PenaltyConfig>,
}

impl CreateLoanRequest {
    fn validate(&self, config: &LendingConfig) -> Result<()> {
        if self.principal < config.minimum_principal {
            return Err(LendingError::PrincipalBelowMinimum {
                minimum: config.minimum_principal,
                requested: self.principal,
            });
        }
        if self.tenure_months == 0 || self.tenure_months > MAX_TENURE_MONTHS {
            return Err(LendingError::InvalidLoanTerms {
                message: format!(
                    "tenure must be between 1 and {} months, got {}",
                    MAX_TENURE_MONTHS, self.tenure_months
                ),
            });
        }
        if self.annual_rate.as_decimal().is_sign_negative() {
            return Err(LendingError::InvalidLoanTerms {
                message: format!("interest rate cannot be negative: {}", self.annual_rate),
            });
        }
        if let Some(penalty) = &self.penalty {
            if penalty.rate.is_sign_negative() {
                return Err(LendingError::InvalidLoanTerms {
                    message: format!("penalty rate cannot be negative: {}", penalty.rate),
                });
            }
        }
        if self.gold_items.is_empty() {
            return Err(LendingError::InvalidCollateral {
                message: "at least one gold item must be pledged".to_string(),
            });
        }
        self.gold_items.iter().try_for_each(NewGoldItem::validate)
    }
}

/// origination and lifecycle transitions of a loan
pub struct LoanService<S: LoanStore> {
    store: Arc<S>,
    time: SafeTimeProvider,
    config: LendingConfig,
}

impl<S: LoanStore> LoanService<S> {
    pub fn new(store: Arc<S>, time: SafeTimeProvider, config: LendingConfig) -> Self {
        Self { store, time, config }
    }

    pub fn config(&self) -> &LendingConfig {
        &self.config
    }

    pub fn find_loan(&self, loan_id: LoanId) -> Result<Loan> {
        self.store.find_loan(loan_id)
    }

    pub fn gold_items(&self, loan_id: LoanId) -> Result<Vec<GoldItem>> {
        self.store.find_loan(loan_id)?;
        self.store.find_gold_items(loan_id)
    }

    /// originate a PENDING loan with its pledged gold items
    pub fn create_loan(&self, request: CreateLoanRequest) -> Result<Loan> {
        request.validate(&self.config)?;
        let now = self.time.now();

        let emi_amount = calculate_emi(request.principal, request.annual_rate, request.tenure_months)?;
        let sequence = self.store.next_loan_sequence(now.date_naive())?;
        let loan_number = format!("{}{}{:04}", self.config.loan_number_prefix, now.format("%Y%m%d"), sequence);

        let loan_id = Uuid::new_v4();
        let items: Vec<GoldItem> = request
            .gold_items
            .into_iter()
            .map(|item| item.into_pledged(loan_id, now))
            .collect();
        let collateral = CollateralSummary::from_items(&items);

        let loan = Loan {
            id: loan_id,
            loan_number,
            customer_id: request.customer_id,
            principal: request.principal,
            annual_rate: request.annual_rate,
            tenure_months: request.tenure_months,
            emi_amount,
            collateral,
            ltv: loan_to_value(request.principal, collateral.total_value),
            application_date: now,
            approval_date: None,
            disbursement_date: None,
            maturity_date: None,
            last_payment_date: None,
            outstanding_balance: request.principal,
            total_amount_paid: Money::ZERO,
            overdue: OverdueStatus::not_overdue(None),
            overdue_since: None,
            penalty: request.penalty.unwrap_or(self.config.default_penalty),
            status: LoanStatus::Pending,
            rejection_reason: None,
            updated_at: now,
        };

        self.store.transaction(|tx| {
            for item in &items {
                tx.put_gold_item(item.clone())?;
            }
            tx.append_event(Event::LoanCreated {
                loan_id,
                loan_number: loan.loan_number.clone(),
                principal: loan.principal,
                emi_amount: loan.emi_amount,
                ltv: loan.ltv,
                timestamp: now,
            });
            tx.put_loan(loan.clone())
        })?;

        info!(
            loan_id = %loan.id,
            loan_number = %loan.loan_number,
            principal = %loan.principal,
            emi = %loan.emi_amount,
            ltv = %loan.ltv,
            "loan created"
        );

        Ok(loan)
    }

    /// PENDING → APPROVED
    pub fn approve_loan(&self, loan_id: LoanId) -> Result<Loan> {
        self.change_status(loan_id, |loan, tx, now| {
            if loan.status != LoanStatus::Pending {
                return Err(LendingError::invalid_status(loan.status, "PENDING"));
            }
            loan.approval_date = Some(now);
            tx.append_event(Event::LoanApproved { loan_id, timestamp: now });
            Ok(LoanStatus::Approved)
        })
    }

    /// PENDING or APPROVED → REJECTED
    pub fn reject_loan(&self, loan_id: LoanId, reason: impl Into<String>) -> Result<Loan> {
        let reason = reason.into();
        self.change_status(loan_id, |loan, tx, now| {
            if !loan.status.is_pre_disbursement() {
                return Err(LendingError::invalid_status(loan.status, "PENDING or APPROVED"));
            }
            loan.rejection_reason = Some(reason.clone());
            tx.append_event(Event::LoanRejected {
                loan_id,
                reason: reason.clone(),
                timestamp: now,
            });
            Ok(LoanStatus::Rejected)
        })
    }

    /// PENDING or APPROVED → ACTIVE, recording the DISBURSEMENT payment
    ///
    /// Balances are untouched; the outstanding balance has equalled the
    /// principal since creation.
    pub fn disburse_loan(&self, loan_id: LoanId, method: PaymentMethod) -> Result<Loan> {
        let receipt_prefix = self.config.receipt_prefix.clone();

        self.change_status(loan_id, |loan, tx, now| {
            if !loan.status.is_pre_disbursement() {
                return Err(LendingError::invalid_status(loan.status, "PENDING or APPROVED"));
            }

            let maturity = maturity_date(now, loan.tenure_months)?;
            loan.approval_date.get_or_insert(now);
            loan.disbursement_date = Some(now);
            loan.maturity_date = Some(maturity);

            let request = PaymentRequest::new(loan_id, loan.principal, PaymentType::Disbursement, method);
            let payment = Payment::completed(&request, &receipt_prefix, now);

            tx.append_event(Event::LoanDisbursed {
                loan_id,
                amount: loan.principal,
                maturity_date: maturity,
                timestamp: now,
            });
            tx.append_event(Event::PaymentRecorded {
                loan_id,
                payment_id: payment.id,
                receipt_number: payment.receipt_number.clone(),
                payment_type: PaymentType::Disbursement,
                amount: payment.amount,
                outstanding_after: loan.outstanding_balance,
                timestamp: now,
            });
            tx.insert_payment(payment)?;

            Ok(LoanStatus::Active)
        })
    }

    /// pledge another item while the loan is still PENDING
    pub fn add_gold_item(&self, loan_id: LoanId, item: NewGoldItem) -> Result<GoldItem> {
        item.validate()?;
        let now = self.time.now();

        self.store.transaction(|tx| {
            let mut loan = tx.lock_loan(loan_id)?;
            ensure_collateral_editable(&loan)?;

            let pledged = item.into_pledged(loan_id, now);
            tx.put_gold_item(pledged.clone())?;
            recompute_collateral(tx, &mut loan, now)?;

            tx.append_event(Event::GoldItemAdded {
                loan_id,
                item_id: pledged.id,
                value: pledged.value,
                new_total_value: loan.collateral.total_value,
                timestamp: now,
            });
            tx.put_loan(loan)?;

            Ok(pledged)
        })
    }

    /// remove a pledged item while its loan is still PENDING
    pub fn delete_gold_item(&self, item_id: GoldItemId) -> Result<Loan> {
        let loan_id = self.store.find_gold_item(item_id)?.loan_id;
        let now = self.time.now();

        self.store.transaction(|tx| {
            let mut loan = tx.lock_loan(loan_id)?;
            ensure_collateral_editable(&loan)?;

            tx.remove_gold_item(item_id)?;
            recompute_collateral(tx, &mut loan, now)?;

            tx.append_event(Event::GoldItemRemoved {
                loan_id,
                item_id,
                new_total_value: loan.collateral.total_value,
                timestamp: now,
            });
            tx.put_loan(loan.clone())?;

            Ok(loan)
        })
    }

    /// hand pledged items back once the loan is COMPLETED
    pub fn release_gold_items(&self, loan_id: LoanId) -> Result<Vec<GoldItem>> {
        let now = self.time.now();

        let released = self.store.transaction(|tx| {
            let loan = tx.lock_loan(loan_id)?;
            if loan.status != LoanStatus::Completed {
                return Err(LendingError::invalid_status(loan.status, "COMPLETED"));
            }

            let mut released = Vec::new();
            for mut item in tx.gold_items(loan_id)? {
                if item.status == GoldItemStatus::Pledged {
                    item.release(now);
                    tx.put_gold_item(item.clone())?;
                    released.push(item);
                }
            }

            tx.append_event(Event::CollateralReleased {
                loan_id,
                items_released: released.len(),
                timestamp: now,
            });
            Ok(released)
        })?;

        info!(loan_id = %loan_id, items = released.len(), "collateral released");
        Ok(released)
    }

    /// equal-installment plan from disbursement, or from application when not yet disbursed
    pub fn amortization_schedule(&self, loan_id: LoanId) -> Result<AmortizationSchedule> {
        let loan = self.store.find_loan(loan_id)?;
        let start = loan.disbursement_date.unwrap_or(loan.application_date);
        AmortizationSchedule::generate(loan.principal, loan.annual_rate, loan.tenure_months, start)
    }

    /// lock, validate and transition a loan in one transaction
    ///
    /// `apply` checks the current status, edits the loan and returns the
    /// status to move to.
    fn change_status<F>(&self, loan_id: LoanId, apply: F) -> Result<Loan>
    where
        F: FnOnce(&mut Loan, &mut dyn StoreTransaction, DateTime<Utc>) -> Result<LoanStatus>,
    {
        let now = self.time.now();

        let loan = self.store.transaction(|tx| {
            let mut loan = tx.lock_loan(loan_id)?;
            let old_status = loan.status;
            let new_status = apply(&mut loan, tx, now)?;

            loan.transition(new_status, now);
            tx.append_event(Event::StatusChanged {
                loan_id,
                old_status,
                new_status,
                timestamp: now,
            });
            tx.put_loan(loan.clone())?;

            Ok(loan)
        })?;

        info!(
            loan_id = %loan.id,
            loan_number = %loan.loan_number,
            status = %loan.status,
            "loan status changed"
        );
        Ok(loan)
    }
}

fn ensure_collateral_editable(loan: &Loan) -> Result<()> {
    if loan.status != LoanStatus::Pending {
        return Err(LendingError::invalid_status(loan.status, "PENDING"));
    }
    Ok(())
}

/// re-derive the collateral aggregate and LTV from the loan's current items
fn recompute_collateral(tx: &mut dyn StoreTransaction, loan: &mut Loan, now: DateTime<Utc>) -> Result<()> {
    let items = tx.gold_items(loan.id)?;
    loan.collateral = CollateralSummary::from_items(&items);
    loan.ltv = loan_to_value(loan.principal, loan.collateral.total_value);
    loan.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryLoanStore;
    use crate::types::PurityGrade;
    use chrono::TimeZone;
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<InMemoryLoanStore>, LoanService<InMemoryLoanStore>) {
        let store = Arc::new(InMemoryLoanStore::new());
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 17, 10, 0, 0).unwrap()));
        let service = LoanService::new(Arc::clone(&store), time, LendingConfig::default());
        (store, service)
    }

    fn bangle(grams: rust_decimal::Decimal) -> NewGoldItem {
        NewGoldItem {
            description: "22K bangle".to_string(),
            weight_grams: grams,
            purity: PurityGrade::K22,
            rate_per_gram: Money::from_major(6_250),
        }
    }

    fn request() -> CreateLoanRequest {
        CreateLoanRequest {
            customer_id: "CUST-042".to_string(),
            principal: Money::from_major(250_000),
            annual_rate: Rate::from_percentage(12),
            tenure_months: 24,
            gold_items: vec![bangle(dec!(30)), bangle(dec!(20))],
            penalty: None,
        }
    }

    #[test]
    fn test_create_loan() {
        let (store, service) = setup();
        let loan = service.create_loan(request()).unwrap();

        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(loan.loan_number, "GL202401170001");
        assert_eq!(loan.collateral.total_value, Money::from_major(312_500));
        assert_eq!(loan.ltv.as_percentage(), dec!(80.00));
        assert_eq!(loan.emi_amount, Money::from_str_exact("11768.37").unwrap());
        assert_eq!(loan.outstanding_balance, loan.principal);
        assert_eq!(loan.penalty, LendingConfig::default().default_penalty);
        assert_eq!(store.find_gold_items(loan.id).unwrap().len(), 2);

        let second = service.create_loan(request()).unwrap();
        assert_eq!(second.loan_number, "GL202401170002");
    }

    #[test]
    fn test_create_loan_validation() {
        let (_, service) = setup();

        let mut small = request();
        small.principal = Money::from_major(500);
        assert_eq!(service.create_loan(small).unwrap_err().error_code(), "PRINCIPAL_BELOW_MINIMUM");

        let mut no_tenure = request();
        no_tenure.tenure_months = 0;
        assert_eq!(service.create_loan(no_tenure).unwrap_err().error_code(), "INVALID_LOAN_TERMS");

        let mut endless = request();
        endless.tenure_months = 5_000;
        assert_eq!(service.create_loan(endless).unwrap_err().error_code(), "INVALID_LOAN_TERMS");

        let mut longest = request();
        longest.tenure_months = MAX_TENURE_MONTHS;
        assert!(service.create_loan(longest).is_ok());

        let mut no_gold = request();
        no_gold.gold_items.clear();
        assert_eq!(service.create_loan(no_gold).unwrap_err().error_code(), "INVALID_COLLATERAL");

        let mut weightless = request();
        weightless.gold_items.push(bangle(dec!(0)));
        assert!(service.create_loan(weightless).is_err());
    }

    #[test]
    fn test_negative_penalty_rate_rejected() {
        let (_, service) = setup();

        let mut negative = request();
        negative.penalty = Some(PenaltyConfig::percentage(-24));
        assert_eq!(service.create_loan(negative).unwrap_err().error_code(), "INVALID_LOAN_TERMS");

        let mut negative_fixed = request();
        negative_fixed.penalty = Some(PenaltyConfig::fixed_per_day(Money::from_major(-50)));
        assert!(service.create_loan(negative_fixed).is_err());

        let mut custom = request();
        custom.penalty = Some(PenaltyConfig::fixed_per_day(Money::from_major(50)));
        let loan = service.create_loan(custom).unwrap();
        assert_eq!(loan.penalty, PenaltyConfig::fixed_per_day(Money::from_major(50)));
    }

    #[test]
    fn test_status_transitions() {
        let (store, service) = setup();
        let loan = service.create_loan(request()).unwrap();

        let approved = service.approve_loan(loan.id).unwrap();
        assert_eq!(approved.status, LoanStatus::Approved);
        assert!(approved.approval_date.is_some());
        assert!(service.approve_loan(loan.id).is_err());

        let active = service.disburse_loan(loan.id, PaymentMethod::BankTransfer).unwrap();
        assert_eq!(active.status, LoanStatus::Active);
        assert_eq!(active.disbursement_date, Some(Utc.with_ymd_and_hms(2024, 1, 17, 10, 0, 0).unwrap()));
        assert_eq!(active.maturity_date, Some(Utc.with_ymd_and_hms(2026, 1, 17, 10, 0, 0).unwrap()));
        assert_eq!(active.outstanding_balance, active.principal);

        let payments = store.find_payments(loan.id).unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].payment_type, PaymentType::Disbursement);

        let err = service.reject_loan(loan.id, "too late").unwrap_err();
        assert_eq!(err.http_status(), 409);
        assert!(service.disburse_loan(loan.id, PaymentMethod::Cash).is_err());
    }

    #[test]
    fn test_reject_loan() {
        let (_, service) = setup();
        let loan = service.create_loan(request()).unwrap();

        let rejected = service.reject_loan(loan.id, "purity below declared grade").unwrap();
        assert_eq!(rejected.status, LoanStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("purity below declared grade"));
        assert!(service.disburse_loan(loan.id, PaymentMethod::Cash).is_err());
    }

    #[test]
    fn test_gold_items_editable_only_while_pending() {
        let (_, service) = setup();
        let loan = service.create_loan(request()).unwrap();

        let added = service.add_gold_item(loan.id, bangle(dec!(10))).unwrap();
        let updated = service.find_loan(loan.id).unwrap();
        assert_eq!(updated.collateral.total_value, Money::from_major(375_000));
        assert_eq!(updated.ltv.as_percentage(), dec!(66.67));

        let after_delete = service.delete_gold_item(added.id).unwrap();
        assert_eq!(after_delete.collateral.total_value, Money::from_major(312_500));
        assert_eq!(service.gold_items(loan.id).unwrap().len(), 2);

        service.approve_loan(loan.id).unwrap();
        assert!(service.add_gold_item(loan.id, bangle(dec!(5))).is_err());

        let item_id = service.gold_items(loan.id).unwrap()[0].id;
        assert!(service.delete_gold_item(item_id).is_err());
    }

    #[test]
    fn test_release_requires_completion() {
        let (store, service) = setup();
        let loan = service.create_loan(request()).unwrap();
        service.disburse_loan(loan.id, PaymentMethod::Cash).unwrap();

        assert_eq!(
            service.release_gold_items(loan.id).unwrap_err().error_code(),
            "INVALID_STATE"
        );

        let mut completed = store.find_loan(loan.id).unwrap();
        completed.status = LoanStatus::Completed;
        store.save_loan(&completed).unwrap();

        let released = service.release_gold_items(loan.id).unwrap();
        assert_eq!(released.len(), 2);
        assert!(service
            .gold_items(loan.id)
            .unwrap()
            .iter()
            .all(|i| i.status == GoldItemStatus::Released));

        // nothing left to release
        assert!(service.release_gold_items(loan.id).unwrap().is_empty());
    }

    #[test]
    fn test_amortization_schedule() {
        let (_, service) = setup();
        let loan = service.create_loan(request()).unwrap();

        let schedule = service.amortization_schedule(loan.id).unwrap();
        assert_eq!(schedule.installments.len(), 24);
        assert_eq!(schedule.emi, loan.emi_amount);
        assert_eq!(schedule.balance_after(24), Money::ZERO);
    }
}
