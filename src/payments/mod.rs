pub mod ledger;
pub mod reconciliation;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::types::{LoanId, PaymentBreakdown, PaymentId, PaymentMethod, PaymentStatus, PaymentType};

pub use ledger::PaymentLedger;
pub use reconciliation::{DriftReport, ReconciliationOutcome};

/// payment request
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub loan_id: LoanId,
    pub amount: Money,
    pub payment_type: PaymentType,
    pub method: PaymentMethod,
    pub breakdown: Option<PaymentBreakdown>,
}

impl PaymentRequest {
    pub fn new(loan_id: LoanId, amount: Money, payment_type: PaymentType, method: PaymentMethod) -> Self {
        Self {
            loan_id,
            amount,
            payment_type,
            method,
            breakdown: None,
        }
    }

    pub fn with_breakdown(mut self, breakdown: PaymentBreakdown) -> Self {
        self.breakdown = Some(breakdown);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_positive() {
            return Err(LendingError::InvalidPaymentAmount { amount: self.amount });
        }
        Ok(())
    }
}

/// recorded payment; immutable once completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub loan_id: LoanId,
    pub receipt_number: String,
    pub amount: Money,
    pub payment_type: PaymentType,
    pub method: PaymentMethod,
    pub breakdown: Option<PaymentBreakdown>,
    pub payment_date: DateTime<Utc>,
    pub status: PaymentStatus,
}

impl Payment {
    /// completed payment stamped with a fresh receipt number
    pub fn completed(request: &PaymentRequest, receipt_prefix: &str, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id: request.loan_id,
            receipt_number: receipt_number(receipt_prefix, at),
            amount: request.amount,
            payment_type: request.payment_type,
            method: request.method,
            breakdown: request.breakdown,
            payment_date: at,
            status: PaymentStatus::Completed,
        }
    }

    /// counts toward the balance in reconciliation
    pub fn is_amortizing(&self) -> bool {
        self.status == PaymentStatus::Completed && self.payment_type.amortizes()
    }
}

/// `{prefix}-{YYYYMMDD}-{8 hex}`
pub fn receipt_number(prefix: &str, at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, at.format("%Y%m%d"), suffix[..8].to_uppercase())
}
