use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::Result;
use crate::terms::{add_months, calculate_emi};

/// one installment of an equal-installment schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledInstallment {
    pub installment_number: u32,
    pub due_date: DateTime<Utc>,
    pub opening_balance: Money,
    pub amount: Money,
    pub principal_portion: Money,
    pub interest_portion: Money,
    pub closing_balance: Money,
}

/// full repayment plan for a loan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmortizationSchedule {
    pub principal: Money,
    pub annual_rate: Rate,
    pub tenure_months: u32,
    pub emi: Money,
    pub installments: Vec<ScheduledInstallment>,
    pub total_interest: Money,
    pub total_payment: Money,
}

impl AmortizationSchedule {
    /// generate the schedule; installment `i` falls due `i` months after `start_date`
    pub fn generate(
        principal: Money,
        annual_rate: Rate,
        tenure_months: u32,
        start_date: DateTime<Utc>,
    ) -> Result<Self> {
        let emi = calculate_emi(principal, annual_rate, tenure_months)?;
        let monthly_rate = annual_rate.monthly_rate().as_decimal();

        let mut installments = Vec::with_capacity(tenure_months as usize);
        let mut balance = principal;

        for i in 1..=tenure_months {
            let interest_portion = Money::from_decimal(balance.as_decimal() * monthly_rate);
            let is_last = i == tenure_months;

            // the last installment absorbs rounding residue
            let principal_portion = if is_last { balance } else { (emi - interest_portion).min(balance) };
            let amount = principal_portion + interest_portion;
            let closing_balance = balance.saturating_sub(principal_portion);

            installments.push(ScheduledInstallment {
                installment_number: i,
                due_date: add_months(start_date, i)?,
                opening_balance: balance,
                amount,
                principal_portion,
                interest_portion,
                closing_balance,
            });

            balance = closing_balance;
        }

        let total_interest = installments.iter().map(|p| p.interest_portion).sum();
        let total_payment = installments.iter().map(|p| p.amount).sum();

        Ok(Self {
            principal,
            annual_rate,
            tenure_months,
            emi,
            installments,
            total_interest,
            total_payment,
        })
    }

    pub fn installment(&self, number: u32) -> Option<&ScheduledInstallment> {
        number
            .checked_sub(1)
            .and_then(|idx| self.installments.get(idx as usize))
    }

    /// scheduled balance after `number` installments
    pub fn balance_after(&self, number: u32) -> Money {
        self.installment(number)
            .map(|p| p.closing_balance)
            .unwrap_or(self.principal)
    }
}
