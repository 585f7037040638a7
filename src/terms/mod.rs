//! Loan terms calculator: EMI, loan-to-value and calendar projection.
//!
//! Everything here is pure. Monetary results are rounded to minor units at
//! the function boundary.

pub mod amortization;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;

use crate::decimal::{Money, Rate};
use crate::errors::{LendingError, Result};
use crate::types::PaymentBreakdown;

pub use amortization::{AmortizationSchedule, ScheduledInstallment};

/// longest tenure accepted at origination, 30 years
pub const MAX_TENURE_MONTHS: u32 = 360;

/// equated monthly installment on a reducing balance
///
/// `EMI = P·r·(1+r)^n / ((1+r)^n − 1)` with `r = annual / 12`. A zero rate
/// amortizes linearly (`P / n`) rather than dividing by zero. Terms whose
/// compounding overflows `Decimal` fail with `InvalidLoanTerms`.
pub fn calculate_emi(principal: Money, annual_rate: Rate, tenure_months: u32) -> Result<Money> {
    if tenure_months == 0 {
        return Ok(principal);
    }

    let r = annual_rate.monthly_rate().as_decimal();
    if r.is_zero() {
        return Ok(principal / Decimal::from(tenure_months));
    }

    let overflow = || LendingError::InvalidLoanTerms {
        message: format!("installment overflows for {} at {} over {} months", principal, annual_rate, tenure_months),
    };

    let base = Decimal::ONE + r;
    let mut compound = Decimal::ONE;
    for _ in 0..tenure_months {
        compound = compound.checked_mul(base).ok_or_else(overflow)?;
    }

    let numerator = principal
        .as_decimal()
        .checked_mul(r)
        .and_then(|n| n.checked_mul(compound))
        .ok_or_else(overflow)?;
    let denominator = compound - Decimal::ONE;

    Ok(Money::from_decimal(numerator / denominator))
}

/// loan principal as a share of collateral value, rounded to 2 decimal places
/// of a percent; zero collateral yields a zero ratio
pub fn loan_to_value(loan_amount: Money, collateral_value: Money) -> Rate {
    if collateral_value.is_zero() {
        return Rate::ZERO;
    }

    let percent = (loan_amount.as_decimal() / collateral_value.as_decimal() * Decimal::from(100)).round_dp(2);
    Rate::from_percentage(percent)
}

/// disbursement date plus tenure in calendar months
pub fn maturity_date(disbursement_date: DateTime<Utc>, tenure_months: u32) -> Result<DateTime<Utc>> {
    add_months(disbursement_date, tenure_months)
}

/// interest/principal split of an installment paid against `outstanding`
pub fn split_installment(outstanding: Money, annual_rate: Rate, amount: Money) -> PaymentBreakdown {
    let interest = Money::from_decimal(outstanding.as_decimal() * annual_rate.monthly_rate().as_decimal()).min(amount);

    PaymentBreakdown {
        principal: amount - interest,
        interest,
        penalty: Money::ZERO,
    }
}

/// add calendar months keeping the day-of-month
///
/// When the day does not exist in the target month the surplus days roll
/// into the following month (Jan 31 + 1 month = Mar 2 or Mar 3), which is
/// the overflow convention the due-date rules are written against. chrono's
/// own `checked_add_months` clamps to month end instead, so it is not used.
pub fn add_months(date: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>> {
    let total = date.month0().checked_add(months).ok_or_else(|| LendingError::InvalidDate {
        message: format!("cannot add {} months to {}", months, date),
    })?;
    let year = date.year() + (total / 12) as i32;
    let month = total % 12 + 1;

    rolled_date(year, month, date.day(), date.time())
}

/// move `date` to `day` of its month, rolling forward on overflow
pub fn with_day_of_month(date: DateTime<Utc>, day: u32) -> Result<DateTime<Utc>> {
    rolled_date(date.year(), date.month(), day, date.time())
}

fn rolled_date(year: i32, month: u32, day: u32, time: NaiveTime) -> Result<DateTime<Utc>> {
    let invalid = || LendingError::InvalidDate {
        message: format!("cannot build {}-{:02}-{:02}", year, month, day),
    };

    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let date = first
        .checked_add_days(Days::new(day.saturating_sub(1) as u64))
        .ok_or_else(invalid)?;

    Ok(date.and_time(time).and_utc())
}
