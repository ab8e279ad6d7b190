//! Budget allocator
//!
//! Canonical Islamic budget split and reconciliation against actual spending.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::BudgetSplit;
use crate::metrics::is_essential_category;
use crate::models::{Budget, BudgetCategory, Transaction, UserProfile};

/// Differences below half a minor currency unit count as zero
const OPTIMAL_TOLERANCE: f64 = 0.005;

const CHARITY_CATEGORIES: &[&str] = &["charity", "zakat", "sadaqa", "садака", "закят"];
const INVESTMENT_CATEGORIES: &[&str] = &["investment", "инвестиции"];
const SAVINGS_CATEGORIES: &[&str] = &["savings", "сбережения"];
const DEVELOPMENT_CATEGORIES: &[&str] = &["education", "courses", "books", "образование"];

/// Budget bucket an expense category is counted against. Consumption that
/// is not charity, investment, saving or self-development counts against
/// the essential share.
pub fn budget_category_for(expense_category: &str) -> BudgetCategory {
    let category = expense_category.trim().to_lowercase();
    let is = |table: &[&str]| table.contains(&category.as_str());

    if is_essential_category(&category) {
        BudgetCategory::Essential
    } else if is(CHARITY_CATEGORIES) {
        BudgetCategory::Charity
    } else if is(INVESTMENT_CATEGORIES) {
        BudgetCategory::Investment
    } else if is(SAVINGS_CATEGORIES) {
        BudgetCategory::Savings
    } else if is(DEVELOPMENT_CATEGORIES) {
        BudgetCategory::PersonalDevelopment
    } else {
        BudgetCategory::Essential
    }
}

/// Actual monthly outflow per budget bucket. Whatever income is left after
/// expenses counts as savings. Without recorded expenses the profile's
/// declared expenses stand in for essential spending.
pub fn current_spending(
    profile: &UserProfile,
    transactions: &[Transaction],
) -> BTreeMap<BudgetCategory, f64> {
    let mut spending: BTreeMap<BudgetCategory, f64> = BTreeMap::new();
    let mut total_expenses = 0.0;

    for tx in transactions.iter().filter(|t| t.is_expense()) {
        *spending.entry(budget_category_for(&tx.category)).or_insert(0.0) += tx.amount;
        total_expenses += tx.amount;
    }

    if total_expenses == 0.0 {
        total_expenses = profile.monthly_expenses;
        spending.insert(BudgetCategory::Essential, total_expenses);
    }

    let unspent = (profile.monthly_income - total_expenses).max(0.0);
    *spending.entry(BudgetCategory::Savings).or_insert(0.0) += unspent;
    spending
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", content = "amount", rename_all = "snake_case")]
pub enum Directive {
    Reduce(f64),
    MayIncrease(f64),
    Optimal,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Reduce(amount) => write!(f, "Сократите на {:.0}", amount),
            Directive::MayIncrease(amount) => write!(f, "Можно увеличить на {:.0}", amount),
            Directive::Optimal => write!(f, "Оптимально"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetRecommendation {
    pub category: BudgetCategory,
    pub recommended_amount: f64,
    pub current_amount: f64,
    /// current - recommended
    pub difference: f64,
    pub directive: Directive,
    pub advice: String,
}

#[derive(Debug, Clone, Copy)]
pub struct BudgetAllocator {
    split: BudgetSplit,
}

impl BudgetAllocator {
    /// The split is validated when configuration loads
    pub fn new(split: BudgetSplit) -> Self {
        Self { split }
    }

    pub fn share(&self, category: BudgetCategory) -> f64 {
        match category {
            BudgetCategory::Essential => self.split.essential,
            BudgetCategory::Savings => self.split.savings,
            BudgetCategory::Investment => self.split.investment,
            BudgetCategory::Charity => self.split.charity,
            BudgetCategory::PersonalDevelopment => self.split.personal_development,
        }
    }

    pub fn generate_budget(&self, monthly_income: f64) -> Budget {
        BudgetCategory::ALL
            .iter()
            .map(|c| (*c, monthly_income * self.share(*c)))
            .collect()
    }

    /// One recommendation per category, in canonical order
    pub fn recommend_adjustments(
        &self,
        monthly_income: f64,
        current_spending: &BTreeMap<BudgetCategory, f64>,
    ) -> Vec<BudgetRecommendation> {
        let budget = self.generate_budget(monthly_income);

        BudgetCategory::ALL
            .iter()
            .map(|category| {
                let recommended_amount = budget.get(category).copied().unwrap_or(0.0);
                let current_amount = current_spending.get(category).copied().unwrap_or(0.0);
                let difference = current_amount - recommended_amount;

                let directive = if difference.abs() < OPTIMAL_TOLERANCE {
                    Directive::Optimal
                } else if difference > 0.0 {
                    Directive::Reduce(difference)
                } else {
                    Directive::MayIncrease(-difference)
                };

                BudgetRecommendation {
                    category: *category,
                    recommended_amount,
                    current_amount,
                    difference,
                    directive,
                    advice: format!("{}: {}", category.label(), directive),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> BudgetAllocator {
        BudgetAllocator::new(BudgetSplit::default())
    }

    #[test]
    fn test_budget_sums_to_income() {
        for income in [0.0, 1.0, 123_456.78, 300_000.0, 9_999_999.0] {
            let total: f64 = allocator().generate_budget(income).values().sum();
            assert!((total - income).abs() < 1e-6 * income.max(1.0));
        }
    }

    #[test]
    fn test_budget_amounts() {
        let budget = allocator().generate_budget(300_000.0);
        assert_eq!(budget[&BudgetCategory::Essential], 150_000.0);
        assert_eq!(budget[&BudgetCategory::Savings], 60_000.0);
        assert_eq!(budget[&BudgetCategory::Charity], 7_500.0);
    }

    #[test]
    fn test_generate_budget_is_idempotent() {
        let a = allocator();
        assert_eq!(a.generate_budget(250_000.0), a.generate_budget(250_000.0));
    }

    #[test]
    fn test_budget_category_mapping() {
        assert_eq!(budget_category_for("Food"), BudgetCategory::Essential);
        assert_eq!(budget_category_for("zakat"), BudgetCategory::Charity);
        assert_eq!(budget_category_for("education"), BudgetCategory::PersonalDevelopment);
        assert_eq!(budget_category_for("entertainment"), BudgetCategory::Essential);
    }

    #[test]
    fn test_current_spending_without_transactions() {
        let profile = UserProfile {
            name: None,
            monthly_income: 300_000.0,
            monthly_expenses: 200_000.0,
            age: 28,
            risk_profile: Default::default(),
            islamic_knowledge: Default::default(),
            family_size: 1,
            currency: "KZT".to_string(),
        };
        let spending = current_spending(&profile, &[]);
        assert_eq!(spending[&BudgetCategory::Essential], 200_000.0);
        assert_eq!(spending[&BudgetCategory::Savings], 100_000.0);
    }

    #[test]
    fn test_recommend_adjustments_directives() {
        let mut spending = BTreeMap::new();
        spending.insert(BudgetCategory::Essential, 180_000.0);
        spending.insert(BudgetCategory::Savings, 60_000.0);
        spending.insert(BudgetCategory::Investment, 10_000.0);

        let recs = allocator().recommend_adjustments(300_000.0, &spending);
        assert_eq!(recs.len(), 5);
        assert_eq!(recs[0].category, BudgetCategory::Essential);
        assert_eq!(recs[0].directive, Directive::Reduce(30_000.0));
        assert_eq!(recs[1].directive, Directive::Optimal);
        assert_eq!(recs[2].directive, Directive::MayIncrease(35_000.0));
        // missing categories count as zero spending
        assert_eq!(recs[3].current_amount, 0.0);
        assert!(recs[0].advice.contains("Сократите"));
    }
}
