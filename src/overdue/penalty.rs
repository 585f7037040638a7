use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::PenaltyType;

/// penalty terms carried by each loan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyConfig {
    /// percent per annum for `Percentage`, currency per day for `Fixed`
    pub rate: Decimal,
    pub penalty_type: PenaltyType,
}

impl PenaltyConfig {
    pub fn percentage(annual_percent: impl Into<Decimal>) -> Self {
        Self {
            rate: annual_percent.into(),
            penalty_type: PenaltyType::Percentage,
        }
    }

    pub fn fixed_per_day(amount: Money) -> Self {
        Self {
            rate: amount.as_decimal(),
            penalty_type: PenaltyType::Fixed,
        }
    }

    /// penalty accrued on the overdue installment after `days_overdue` days
    pub fn calculate(&self, overdue_amount: Money, days_overdue: u32) -> Money {
        if days_overdue == 0 {
            return Money::ZERO;
        }

        let days = Decimal::from(days_overdue);
        let penalty = match self.penalty_type {
            PenaltyType::Percentage => {
                let daily_rate = self.rate / Decimal::from(100) / Decimal::from(365);
                overdue_amount.as_decimal() * daily_rate * days
            }
            // flat charge, independent of the amount overdue
            PenaltyType::Fixed => self.rate * days,
        };

        Money::from_decimal(penalty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_percentage_penalty() {
        let config = PenaltyConfig::percentage(24);
        let penalty = config.calculate(Money::from_major(10_000), 30);
        assert_eq!(penalty, Money::from_str_exact("197.26").unwrap());
    }

    #[test]
    fn test_fixed_penalty_ignores_amount() {
        let config = PenaltyConfig::fixed_per_day(Money::from_major(50));
        assert_eq!(config.calculate(Money::from_major(10_000), 12), Money::from_major(600));
        assert_eq!(config.calculate(Money::from_major(1), 12), Money::from_major(600));
    }

    #[test]
    fn test_no_penalty_without_days() {
        let config = PenaltyConfig::percentage(dec!(36.5));
        assert_eq!(config.calculate(Money::from_major(10_000), 0), Money::ZERO);
        assert_eq!(config.calculate(Money::from_major(10_000), 1), Money::from_major(10));
    }
}
