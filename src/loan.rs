use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collateral::CollateralSummary;
use crate::decimal::{Money, Rate};
use crate::overdue::{OverdueStatus, PenaltyConfig};
use crate::types::{LoanId, LoanStatus};

/// loan record as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    // identification
    pub id: LoanId,
    pub loan_number: String,
    pub customer_id: String,

    // terms
    pub principal: Money,
    pub annual_rate: Rate,
    pub tenure_months: u32,
    pub emi_amount: Money,

    // collateral aggregate, fixed at creation
    pub collateral: CollateralSummary,
    pub ltv: Rate,

    // lifecycle dates
    pub application_date: DateTime<Utc>,
    pub approval_date: Option<DateTime<Utc>>,
    pub disbursement_date: Option<DateTime<Utc>>,
    pub maturity_date: Option<DateTime<Utc>>,
    pub last_payment_date: Option<DateTime<Utc>>,

    // balances
    pub outstanding_balance: Money,
    pub total_amount_paid: Money,

    // cached overdue snapshot
    pub overdue: OverdueStatus,
    pub overdue_since: Option<DateTime<Utc>>,

    pub penalty: PenaltyConfig,
    pub status: LoanStatus,
    pub rejection_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    pub fn is_overdue(&self) -> bool {
        self.overdue.is_overdue
    }

    /// move to `status`; leaving ACTIVE drops the overdue snapshot
    pub fn transition(&mut self, status: LoanStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;

        if status != LoanStatus::Active {
            self.overdue = OverdueStatus::not_overdue(None);
        }
    }

    /// reduce the balance by an amortizing payment, completing the loan at zero
    ///
    /// Returns true when this payment completed the loan.
    pub fn apply_amortizing_payment(&mut self, amount: Money, at: DateTime<Utc>) -> bool {
        self.outstanding_balance = self.outstanding_balance.saturating_sub(amount);
        self.total_amount_paid += amount;
        self.last_payment_date = Some(at);
        self.updated_at = at;

        if self.outstanding_balance.is_zero() && self.status != LoanStatus::Completed {
            self.transition(LoanStatus::Completed, at);
            return true;
        }
        false
    }

    /// json representation for logs and admin tooling
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("JSON error: {}", e))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use crate::terms::{calculate_emi, loan_to_value};
    use crate::types::PenaltyType;

    /// active 100k / 12% / 12 month loan disbursed on `disbursed`
    pub fn active_loan(disbursed: DateTime<Utc>) -> Loan {
        let principal = Money::from_major(100_000);
        let rate = Rate::from_percentage(12);
        let collateral = CollateralSummary {
            total_weight_grams: Decimal::from(25),
            total_value: Money::from_major(125_000),
        };

        Loan {
            id: Uuid::new_v4(),
            loan_number: "GL202401170001".to_string(),
            customer_id: "CUST-001".to_string(),
            principal,
            annual_rate: rate,
            tenure_months: 12,
            emi_amount: calculate_emi(principal, rate, 12).unwrap(),
            collateral,
            ltv: loan_to_value(principal, collateral.total_value),
            application_date: disbursed,
            approval_date: Some(disbursed),
            disbursement_date: Some(disbursed),
            maturity_date: crate::terms::maturity_date(disbursed, 12).ok(),
            last_payment_date: None,
            outstanding_balance: principal,
            total_amount_paid: Money::ZERO,
            overdue: OverdueStatus::not_overdue(None),
            overdue_since: None,
            penalty: PenaltyConfig {
                rate: Decimal::from(24),
                penalty_type: PenaltyType::Percentage,
            },
            status: LoanStatus::Active,
            rejection_reason: None,
            updated_at: disbursed,
        }
    }

    pub fn jan_17() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 17, 0, 0, 0).unwrap()
    }
}
