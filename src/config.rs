use std::str::FromStr;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::overdue::PenaltyConfig;
use crate::types::PenaltyType;

/// deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            other => Err(LendingError::InvalidConfiguration {
                message: format!("unknown environment '{}', expected dev, staging or prod", other),
            }),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// lending core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LendingConfig {
    pub environment: Environment,
    /// smallest principal a loan may be created with
    pub minimum_principal: Money,
    /// penalty terms stamped on new loans
    pub default_penalty: PenaltyConfig,
    /// days overdue at which an active loan is escalated to defaulted
    pub default_threshold_days: u32,
    /// hours between background overdue sweeps
    pub sweep_interval_hours: u32,
    pub loan_number_prefix: String,
    pub receipt_prefix: String,
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            minimum_principal: Money::from_major(1_000),
            default_penalty: PenaltyConfig {
                rate: Decimal::from(24),
                penalty_type: PenaltyType::Percentage,
            },
            default_threshold_days: 90,
            sweep_interval_hours: 24,
            loan_number_prefix: "GL".to_string(),
            receipt_prefix: "RCP".to_string(),
        }
    }
}

impl LendingConfig {
    /// load from process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// build from an arbitrary key lookup, starting from defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(env) = lookup("GOLD_LOAN_ENV") {
            config.environment = Environment::parse(&env)?;
        }
        if let Some(raw) = lookup("GOLD_LOAN_MIN_PRINCIPAL") {
            config.minimum_principal = Money::from_decimal(parse_value("GOLD_LOAN_MIN_PRINCIPAL", &raw)?);
        }
        if let Some(raw) = lookup("GOLD_LOAN_PENALTY_RATE") {
            config.default_penalty.rate = parse_value("GOLD_LOAN_PENALTY_RATE", &raw)?;
        }
        if let Some(raw) = lookup("GOLD_LOAN_PENALTY_TYPE") {
            config.default_penalty.penalty_type = match raw.to_lowercase().as_str() {
                "percentage" => PenaltyType::Percentage,
                "fixed" => PenaltyType::Fixed,
                other => {
                    return Err(LendingError::InvalidConfiguration {
                        message: format!("GOLD_LOAN_PENALTY_TYPE must be percentage or fixed, got '{}'", other),
                    })
                }
            };
        }
        if let Some(raw) = lookup("GOLD_LOAN_DEFAULT_THRESHOLD_DAYS") {
            config.default_threshold_days = parse_value("GOLD_LOAN_DEFAULT_THRESHOLD_DAYS", &raw)?;
        }
        if let Some(raw) = lookup("GOLD_LOAN_SWEEP_INTERVAL_HOURS") {
            config.sweep_interval_hours = parse_value("GOLD_LOAN_SWEEP_INTERVAL_HOURS", &raw)?;
        }
        if let Some(prefix) = lookup("GOLD_LOAN_NUMBER_PREFIX") {
            config.loan_number_prefix = prefix;
        }
        if let Some(prefix) = lookup("GOLD_LOAN_RECEIPT_PREFIX") {
            config.receipt_prefix = prefix;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.minimum_principal.is_positive() {
            return Err(LendingError::InvalidConfiguration {
                message: "minimum principal must be positive".to_string(),
            });
        }
        if self.default_penalty.rate.is_sign_negative() {
            return Err(LendingError::InvalidConfiguration {
                message: "penalty rate cannot be negative".to_string(),
            });
        }
        if self.default_threshold_days == 0 {
            return Err(LendingError::InvalidConfiguration {
                message: "default threshold must be at least one day".to_string(),
            });
        }
        if self.sweep_interval_hours == 0 {
            return Err(LendingError::InvalidConfiguration {
                message: "sweep interval must be at least one hour".to_string(),
            });
        }
        if self.loan_number_prefix.is_empty() || self.receipt_prefix.is_empty() {
            return Err(LendingError::InvalidConfiguration {
                message: "loan number and receipt prefixes cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::hours(self.sweep_interval_hours as i64)
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| LendingError::InvalidConfiguration {
        message: format!("{} has invalid value '{}'", key, raw),
    })
}
