use thiserror::Error;

use crate::decimal::Money;
use crate::types::LoanStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LendingError {
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: String,
    },

    #[error("invalid state: current {current}, expected {expected}")]
    InvalidState {
        current: String,
        expected: String,
    },

    #[error("invalid payment amount: {amount}")]
    InvalidPaymentAmount {
        amount: Money,
    },

    #[error("principal below minimum: minimum {minimum}, requested {requested}")]
    PrincipalBelowMinimum {
        minimum: Money,
        requested: Money,
    },

    #[error(
        "reconciliation drift on {loan_number}: cached outstanding {cached_outstanding}, \
         expected {expected_outstanding}; cached paid {cached_paid}, expected {expected_paid}"
    )]
    ReconciliationDrift {
        loan_number: String,
        cached_outstanding: Money,
        expected_outstanding: Money,
        cached_paid: Money,
        expected_paid: Money,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("invalid loan terms: {message}")]
    InvalidLoanTerms {
        message: String,
    },

    #[error("invalid collateral: {message}")]
    InvalidCollateral {
        message: String,
    },

    #[error("invalid date: {message}")]
    InvalidDate {
        message: String,
    },

    #[error("storage error: {message}")]
    Storage {
        message: String,
    },
}

impl LendingError {
    pub fn loan_not_found(id: impl ToString) -> Self {
        LendingError::NotFound {
            entity: "loan",
            id: id.to_string(),
        }
    }

    /// status transition rejected
    pub fn invalid_status(current: LoanStatus, expected: &str) -> Self {
        LendingError::InvalidState {
            current: current.to_string(),
            expected: expected.to_string(),
        }
    }

    /// stable code for the HTTP boundary
    pub fn error_code(&self) -> &'static str {
        match self {
            LendingError::NotFound { .. } => "NOT_FOUND",
            LendingError::InvalidState { .. } => "INVALID_STATE",
            LendingError::InvalidPaymentAmount { .. } => "INVALID_PAYMENT_AMOUNT",
            LendingError::PrincipalBelowMinimum { .. } => "PRINCIPAL_BELOW_MINIMUM",
            LendingError::ReconciliationDrift { .. } => "RECONCILIATION_DRIFT",
            LendingError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            LendingError::InvalidLoanTerms { .. } => "INVALID_LOAN_TERMS",
            LendingError::InvalidCollateral { .. } => "INVALID_COLLATERAL",
            LendingError::InvalidDate { .. } => "INVALID_DATE",
            LendingError::Storage { .. } => "STORAGE_ERROR",
        }
    }

    /// HTTP status the boundary should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            LendingError::NotFound { .. } => 404,
            LendingError::InvalidState { .. } | LendingError::ReconciliationDrift { .. } => 409,
            LendingError::InvalidPaymentAmount { .. }
            | LendingError::PrincipalBelowMinimum { .. }
            | LendingError::InvalidLoanTerms { .. }
            | LendingError::InvalidCollateral { .. }
            | LendingError::InvalidDate { .. } => 400,
            LendingError::InvalidConfiguration { .. } | LendingError::Storage { .. } => 500,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.http_status() >= 500
    }

    /// message safe to show a caller; server errors lose their detail in production
    pub fn public_message(&self, production: bool) -> String {
        if production && self.is_server_error() {
            "internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

pub type Result<T> = std::result::Result<T, LendingError>;
