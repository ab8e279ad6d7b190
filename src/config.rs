//! Runtime configuration
//!
//! Loaded from the environment (after `dotenv`). Thresholds that the
//! compliance and recommendation rules depend on live here rather than in
//! the rules themselves.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AdvisorError;
use crate::Result;

const SHARE_TOLERANCE: f64 = 1e-9;

/// Shares of monthly income per budget category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BudgetSplit {
    pub essential: f64,
    pub savings: f64,
    pub investment: f64,
    pub charity: f64,
    pub personal_development: f64,
}

impl BudgetSplit {
    pub fn total(&self) -> f64 {
        self.essential + self.savings + self.investment + self.charity + self.personal_development
    }

    pub fn validate(&self) -> Result<()> {
        let shares = [
            ("budget.essential", self.essential),
            ("budget.savings", self.savings),
            ("budget.investment", self.investment),
            ("budget.charity", self.charity),
            ("budget.personal_development", self.personal_development),
        ];
        for (name, share) in shares {
            if !share.is_finite() || share < 0.0 {
                return Err(AdvisorError::Config(format!("{} must be a non-negative share", name)));
            }
        }
        if (self.total() - 1.0).abs() > SHARE_TOLERANCE {
            return Err(AdvisorError::Config(format!(
                "budget shares must sum to 100%, got {:.4}%",
                self.total() * 100.0
            )));
        }
        Ok(())
    }
}

impl Default for BudgetSplit {
    fn default() -> Self {
        Self {
            essential: 0.5,
            savings: 0.2,
            investment: 0.15,
            charity: 0.025,
            personal_development: 0.125,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorConfig {
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub remote_timeout_secs: u64,
    /// Spending above this in a non-essential category counts as israf
    pub israf_threshold: f64,
    pub nisab_threshold: f64,
    pub gharar_uncertainty_limit: f64,
    pub financing_income_threshold: f64,
    pub budget: BudgetSplit,
    pub history_turns: usize,
    /// Conversation histories kept at once; least recently active go first
    pub history_max_users: usize,
    pub environment: Environment,
    pub port: u16,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
            remote_timeout_secs: 30,
            israf_threshold: 100_000.0,
            nisab_threshold: 85_000.0,
            gharar_uncertainty_limit: 0.7,
            financing_income_threshold: 300_000.0,
            budget: BudgetSplit::default(),
            history_turns: 6,
            history_max_users: 10_000,
            environment: Environment::Development,
            port: 8080,
        }
    }
}

impl AdvisorConfig {
    /// Load configuration from environment variables over defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let gemini_api_key = env::var("GEMINI_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && k != "your_gemini_api_key_here");

        let environment = match env::var("APP_ENV")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        };

        let port_var = env::var("PORT").or_else(|_| env::var("API_PORT")).ok();
        let port = match port_var {
            Some(raw) => raw
                .parse()
                .map_err(|_| AdvisorError::Config(format!("PORT is not a valid port: {}", raw)))?,
            None => defaults.port,
        };

        let config = Self {
            gemini_api_key,
            gemini_model: env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            remote_timeout_secs: env_or("REMOTE_TIMEOUT_SECS", defaults.remote_timeout_secs)?,
            israf_threshold: env_or("ISRAF_THRESHOLD", defaults.israf_threshold)?,
            nisab_threshold: env_or("NISAB_THRESHOLD", defaults.nisab_threshold)?,
            gharar_uncertainty_limit: env_or(
                "GHARAR_UNCERTAINTY_LIMIT",
                defaults.gharar_uncertainty_limit,
            )?,
            financing_income_threshold: env_or(
                "FINANCING_INCOME_THRESHOLD",
                defaults.financing_income_threshold,
            )?,
            budget: BudgetSplit {
                essential: env_or("BUDGET_ESSENTIAL", defaults.budget.essential)?,
                savings: env_or("BUDGET_SAVINGS", defaults.budget.savings)?,
                investment: env_or("BUDGET_INVESTMENT", defaults.budget.investment)?,
                charity: env_or("BUDGET_CHARITY", defaults.budget.charity)?,
                personal_development: env_or(
                    "BUDGET_DEVELOPMENT",
                    defaults.budget.personal_development,
                )?,
            },
            history_turns: env_or("HISTORY_TURNS", defaults.history_turns)?,
            history_max_users: env_or("HISTORY_MAX_USERS", defaults.history_max_users)?,
            environment,
            port,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.budget.validate()?;

        let positive = [
            ("ISRAF_THRESHOLD", self.israf_threshold),
            ("NISAB_THRESHOLD", self.nisab_threshold),
            ("FINANCING_INCOME_THRESHOLD", self.financing_income_threshold),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(AdvisorError::Config(format!("{} must be positive", name)));
            }
        }

        if !(0.0..=1.0).contains(&self.gharar_uncertainty_limit) {
            return Err(AdvisorError::Config(
                "GHARAR_UNCERTAINTY_LIMIT must be between 0 and 1".to_string(),
            ));
        }
        if self.history_max_users == 0 {
            return Err(AdvisorError::Config(
                "HISTORY_MAX_USERS must be at least 1".to_string(),
            ));
        }
        if self.remote_timeout_secs == 0 {
            return Err(AdvisorError::Config(
                "REMOTE_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    pub fn expose_error_details(&self) -> bool {
        self.environment == Environment::Development
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| AdvisorError::Config(format!("{} has an invalid value: {}", name, raw))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AdvisorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.remote_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_budget_shares_must_sum_to_one() {
        let split = BudgetSplit {
            essential: 0.6,
            ..BudgetSplit::default()
        };
        let err = split.validate().unwrap_err();
        assert!(err.to_string().contains("100%"));
    }

    #[test]
    fn test_negative_share_rejected() {
        let split = BudgetSplit {
            essential: 0.7,
            savings: -0.2,
            ..BudgetSplit::default()
        };
        assert!(split.validate().is_err());
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let config = AdvisorConfig {
            nisab_threshold: 0.0,
            ..AdvisorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AdvisorConfig {
            gharar_uncertainty_limit: 1.5,
            ..AdvisorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
