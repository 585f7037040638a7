use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::types::{GoldItemId, GoldItemStatus, LoanId, PurityGrade};

/// gold item as supplied at loan creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGoldItem {
    pub description: String,
    /// gross weight in grams
    pub weight_grams: Decimal,
    pub purity: PurityGrade,
    /// valuation rate per gram for this purity on the pledge date
    pub rate_per_gram: Money,
}

impl NewGoldItem {
    pub fn validate(&self) -> Result<()> {
        if self.weight_grams <= Decimal::ZERO {
            return Err(LendingError::InvalidCollateral {
                message: format!("{}: weight must be positive", self.description),
            });
        }
        if !self.rate_per_gram.is_positive() {
            return Err(LendingError::InvalidCollateral {
                message: format!("{}: rate per gram must be positive", self.description),
            });
        }
        Ok(())
    }

    /// pledge value: weight × rate-at-pledge
    pub fn value(&self) -> Money {
        Money::from_decimal(self.weight_grams * self.rate_per_gram.as_decimal())
    }

    pub fn into_pledged(self, loan_id: LoanId, pledged_at: DateTime<Utc>) -> GoldItem {
        let value = self.value();
        GoldItem {
            id: Uuid::new_v4(),
            loan_id,
            net_weight_grams: (self.weight_grams * self.purity.fineness()).round_dp(3),
            description: self.description,
            weight_grams: self.weight_grams,
            purity: self.purity,
            rate_per_gram: self.rate_per_gram,
            value,
            status: GoldItemStatus::Pledged,
            pledged_at,
            released_at: None,
        }
    }
}

/// collateral line item pledged against a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldItem {
    pub id: GoldItemId,
    pub loan_id: LoanId,
    pub description: String,
    pub weight_grams: Decimal,
    /// fine-gold content implied by the purity grade
    pub net_weight_grams: Decimal,
    pub purity: PurityGrade,
    pub rate_per_gram: Money,
    pub value: Money,
    pub status: GoldItemStatus,
    pub pledged_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl GoldItem {
    pub fn release(&mut self, at: DateTime<Utc>) {
        self.status = GoldItemStatus::Released;
        self.released_at = Some(at);
    }
}

/// collateral aggregate stored on the loan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct CollateralSummary {
    pub total_weight_grams: Decimal,
    pub total_value: Money,
}

impl CollateralSummary {
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a GoldItem>) -> Self {
        items.into_iter().fold(Self::default(), |acc, item| CollateralSummary {
            total_weight_grams: acc.total_weight_grams + item.weight_grams,
            total_value: acc.total_value + item.value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn chain() -> NewGoldItem {
        NewGoldItem {
            description: "22K chain".to_string(),
            weight_grams: dec!(25.5),
            purity: PurityGrade::K22,
            rate_per_gram: Money::from_major(6_000),
        }
    }

    #[test]
    fn test_item_valuation() {
        let item = chain();
        assert_eq!(item.value(), Money::from_major(153_000));

        let pledged = item.into_pledged(Uuid::new_v4(), Utc::now());
        assert_eq!(pledged.status, GoldItemStatus::Pledged);
        assert_eq!(pledged.net_weight_grams, dec!(23.358));
        assert_eq!(pledged.value, Money::from_major(153_000));
    }

    #[test]
    fn test_validation() {
        let mut item = chain();
        item.weight_grams = Decimal::ZERO;
        assert!(item.validate().is_err());

        let mut item = chain();
        item.rate_per_gram = Money::ZERO;
        assert!(item.validate().is_err());

        assert!(chain().validate().is_ok());
    }

    #[test]
    fn test_summary() {
        let loan_id = Uuid::new_v4();
        let now = Utc::now();
        let items = vec![
            chain().into_pledged(loan_id, now),
            NewGoldItem {
                description: "24K coin".to_string(),
                weight_grams: dec!(10),
                purity: PurityGrade::K24,
                rate_per_gram: Money::from_major(6_500),
            }
            .into_pledged(loan_id, now),
        ];

        let summary = CollateralSummary::from_items(&items);
        assert_eq!(summary.total_weight_grams, dec!(35.5));
        assert_eq!(summary.total_value, Money::from_major(218_000));
    }
}
