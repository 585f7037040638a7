use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::decimal::Money;

/// internal identifier for a loan
pub type LoanId = Uuid;

/// internal identifier for a payment
pub type PaymentId = Uuid;

/// internal identifier for a pledged gold item
pub type GoldItemId = Uuid;

/// loan lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    /// application recorded, nothing disbursed
    Pending,
    /// approved by staff, awaiting disbursement
    Approved,
    /// disbursed and being serviced
    Active,
    /// outstanding balance reached zero
    Completed,
    /// escalated after sustained non-payment
    Defaulted,
    /// refused before disbursement
    Rejected,
}

impl LoanStatus {
    pub const ALL: [LoanStatus; 6] = [
        LoanStatus::Pending,
        LoanStatus::Approved,
        LoanStatus::Active,
        LoanStatus::Completed,
        LoanStatus::Defaulted,
        LoanStatus::Rejected,
    ];

    /// loan has not been disbursed yet
    pub fn is_pre_disbursement(&self) -> bool {
        matches!(self, LoanStatus::Pending | LoanStatus::Approved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "PENDING",
            LoanStatus::Approved => "APPROVED",
            LoanStatus::Active => "ACTIVE",
            LoanStatus::Completed => "COMPLETED",
            LoanStatus::Defaulted => "DEFAULTED",
            LoanStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// kind of money movement recorded against a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Disbursement,
    Emi,
    Partial,
    Interest,
    Penalty,
    Closure,
}

impl PaymentType {
    /// payment types that reduce the outstanding balance
    pub fn amortizes(&self) -> bool {
        matches!(self, PaymentType::Emi | PaymentType::Partial | PaymentType::Closure)
    }

    /// whether the ledger may record a payment of this type against a loan in `status`
    ///
    /// Disbursements are only written by loan disbursement, never the ledger.
    pub fn permitted_for(&self, status: LoanStatus) -> bool {
        match self {
            PaymentType::Disbursement => false,
            _ => matches!(status, LoanStatus::Active | LoanStatus::Defaulted),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Upi,
    Cheque,
    Card,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

/// how a loan's penalty rate is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PenaltyType {
    /// annual percentage applied as simple daily interest on the overdue installment
    Percentage,
    /// flat currency amount charged per day overdue
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoldItemStatus {
    Pledged,
    Released,
}

/// karat grade of a pledged item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurityGrade {
    K24,
    K22,
    K18,
    K14,
}

impl PurityGrade {
    /// fine-gold fraction of the gross weight
    pub fn fineness(&self) -> Decimal {
        match self {
            PurityGrade::K24 => dec!(0.999),
            PurityGrade::K22 => dec!(0.916),
            PurityGrade::K18 => dec!(0.750),
            PurityGrade::K14 => dec!(0.585),
        }
    }
}

/// optional split of a payment amount
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PaymentBreakdown {
    pub principal: Money,
    pub interest: Money,
    pub penalty: Money,
}

impl PaymentBreakdown {
    pub fn total(&self) -> Money {
        self.principal + self.interest + self.penalty
    }
}
