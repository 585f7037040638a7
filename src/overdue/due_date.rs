use chrono::{DateTime, Datelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::errors::Result;
use crate::loan::Loan;
use crate::terms::{add_months, with_day_of_month};

/// average Gregorian month length used to count elapsed installment periods
///
/// Counting months this way is approximate: for loans disbursed near month
/// end it can disagree with the true calendar month count by one around
/// the boundary. Accepted as a known limitation.
pub const AVERAGE_DAYS_PER_MONTH: Decimal = dec!(30.44);

const SECONDS_PER_DAY: i64 = 86_400;

/// date the next installment falls due, or `None` before disbursement
///
/// The due day-of-month is pinned to the disbursement day for the whole
/// life of the loan, whatever day payments actually arrive on.
/// - after a payment: one month past the last payment, on the due day
/// - no payment yet: one month past disbursement; once that has passed,
///   the most recent due date counted in whole elapsed periods
pub fn next_due_date(loan: &Loan, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    let Some(disbursed) = loan.disbursement_date else {
        return Ok(None);
    };
    let due_day = disbursed.day();

    if let Some(last_payment) = loan.last_payment_date {
        let next = add_months(last_payment, 1)?;
        return with_day_of_month(next, due_day).map(Some);
    }

    let first_due = add_months(disbursed, 1)?;
    if first_due >= now {
        return Ok(Some(first_due));
    }

    let elapsed = elapsed_periods(first_due, now);
    let next = add_months(disbursed, elapsed + 1)?;
    with_day_of_month(next, due_day).map(Some)
}

/// whole average-length months between two instants
fn elapsed_periods(from: DateTime<Utc>, to: DateTime<Utc>) -> u32 {
    let seconds = Decimal::from((to - from).num_seconds().max(0));
    let period = AVERAGE_DAYS_PER_MONTH * Decimal::from(SECONDS_PER_DAY);

    (seconds / period).floor().to_u32().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::fixtures::{active_loan, jan_17};
    use chrono::{Duration, TimeZone};

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_no_disbursement_no_due_date() {
        let mut loan = active_loan(jan_17());
        loan.disbursement_date = None;
        assert_eq!(next_due_date(&loan, jan_17()).unwrap(), None);
    }

    #[test]
    fn test_first_due_date() {
        let loan = active_loan(jan_17());
        assert_eq!(next_due_date(&loan, jan_17()).unwrap(), Some(utc(2024, 2, 17)));
        assert_eq!(next_due_date(&loan, utc(2024, 2, 17)).unwrap(), Some(utc(2024, 2, 17)));
    }

    #[test]
    fn test_due_day_pinned_after_late_payment() {
        let mut loan = active_loan(jan_17());
        // paid late on the 23rd; the due day stays the 17th
        loan.last_payment_date = Some(utc(2024, 2, 23));
        assert_eq!(next_due_date(&loan, utc(2024, 2, 23)).unwrap(), Some(utc(2024, 3, 17)));
    }

    #[test]
    fn test_due_day_pinned_after_early_payment() {
        let mut loan = active_loan(jan_17());
        loan.last_payment_date = Some(utc(2024, 2, 10));
        assert_eq!(next_due_date(&loan, utc(2024, 2, 10)).unwrap(), Some(utc(2024, 3, 17)));
    }

    #[test]
    fn test_unpaid_loan_tracks_most_recent_due_date() {
        let loan = active_loan(jan_17());

        // one day past the first due date
        let now = utc(2024, 2, 18);
        assert_eq!(next_due_date(&loan, now).unwrap(), Some(utc(2024, 2, 17)));

        // 45 days past the first due date: one whole period elapsed
        let now = utc(2024, 2, 17) + Duration::days(45);
        assert_eq!(next_due_date(&loan, now).unwrap(), Some(utc(2024, 3, 17)));

        // 100 days past: three periods elapsed
        let now = utc(2024, 2, 17) + Duration::days(100);
        assert_eq!(next_due_date(&loan, now).unwrap(), Some(utc(2024, 5, 17)));
    }

    #[test]
    fn test_elapsed_periods() {
        let start = utc(2024, 1, 1);
        assert_eq!(elapsed_periods(start, start + Duration::days(30)), 0);
        assert_eq!(elapsed_periods(start, start + Duration::days(31)), 1);
        assert_eq!(elapsed_periods(start, start + Duration::days(91)), 2);
        assert_eq!(elapsed_periods(start + Duration::days(5), start), 0);
    }
}
