//! Financial metrics engine
//!
//! Pure calculators over profile and transaction inputs. No I/O.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::budget::BudgetAllocator;
use crate::models::{FinancialMetrics, Transaction, UserProfile};

/// Expense categories counted as essential spending
pub const ESSENTIAL_CATEGORIES: &[&str] = &["housing", "food", "transport", "health"];

pub const ZAKAT_RATE: f64 = 0.025;

/// Fallback essential share of declared expenses when no expense was recorded
const FALLBACK_ESSENTIAL_SHARE: f64 = 0.6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ZakatPeriod {
    Monthly,
    Annual,
}

/// Aggregates over a transaction list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpendingPattern {
    pub total_income: f64,
    pub total_expenses: f64,
    pub savings_rate: f64,
    pub expenses_by_category: BTreeMap<String, f64>,
}

pub struct FinancialMetricsEngine {
    budget: BudgetAllocator,
}

impl FinancialMetricsEngine {
    pub fn new(budget: BudgetAllocator) -> Self {
        Self { budget }
    }

    pub fn compute_metrics(
        &self,
        profile: &UserProfile,
        transactions: &[Transaction],
    ) -> FinancialMetrics {
        let income = profile.monthly_income;
        let expenses = profile.monthly_expenses;
        let rate = savings_rate(income, expenses);

        let expense_txs: Vec<&Transaction> =
            transactions.iter().filter(|t| t.is_expense()).collect();

        let (essential_spending, discretionary_spending) = if expense_txs.is_empty() {
            let essential = expenses * FALLBACK_ESSENTIAL_SHARE;
            (essential, expenses - essential)
        } else {
            let total: f64 = expense_txs.iter().map(|t| t.amount).sum();
            let essential: f64 = expense_txs
                .iter()
                .filter(|t| is_essential_category(&t.category))
                .map(|t| t.amount)
                .sum();
            (essential, total - essential)
        };

        FinancialMetrics {
            monthly_income: income,
            monthly_expenses: expenses,
            monthly_savings: income - expenses,
            savings_rate: rate,
            essential_spending,
            discretionary_spending,
            recommended_budget: self.budget.generate_budget(income),
            financial_health_score: financial_health_score(rate),
        }
    }
}

pub fn is_essential_category(category: &str) -> bool {
    let lowered = category.trim().to_lowercase();
    ESSENTIAL_CATEGORIES.iter().any(|c| *c == lowered)
}

/// (income - expenses) / income, 0 when income is not positive
pub fn savings_rate(income: f64, expenses: f64) -> f64 {
    if income <= 0.0 {
        return 0.0;
    }
    (income - expenses) / income
}

/// A 50% savings rate maps to a perfect score
pub fn financial_health_score(savings_rate: f64) -> u8 {
    (savings_rate * 200.0).round().clamp(0.0, 100.0) as u8
}

/// Remaining amount spread over the timeline; the full remainder when due now
pub fn monthly_saving(target: f64, current: f64, timeline_months: i32) -> f64 {
    let remaining = target - current;
    if timeline_months <= 0 {
        return remaining;
    }
    remaining / timeline_months as f64
}

pub fn goal_progress(current: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }
    (current / target * 100.0).clamp(0.0, 100.0)
}

pub fn zakat(monthly_income: f64, period: ZakatPeriod) -> f64 {
    match period {
        ZakatPeriod::Monthly => monthly_income * ZAKAT_RATE,
        ZakatPeriod::Annual => monthly_income * 12.0 * ZAKAT_RATE,
    }
}

pub fn analyze_spending(transactions: &[Transaction]) -> SpendingPattern {
    let mut total_income = 0.0;
    let mut total_expenses = 0.0;
    let mut expenses_by_category: BTreeMap<String, f64> = BTreeMap::new();

    for tx in transactions {
        if tx.is_expense() {
            total_expenses += tx.amount;
            *expenses_by_category
                .entry(tx.category.trim().to_lowercase())
                .or_insert(0.0) += tx.amount;
        } else {
            total_income += tx.amount;
        }
    }

    SpendingPattern {
        total_income,
        total_expenses,
        savings_rate: savings_rate(total_income, total_expenses),
        expenses_by_category,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BudgetSplit;
    use crate::models::{
        ComplianceVerdict, IslamicKnowledge, NewTransaction, RiskProfile, TransactionType,
    };

    fn tx(amount: f64, category: &str, kind: TransactionType) -> Transaction {
        let verdict = ComplianceVerdict {
            is_compliant: true,
            issues: vec![],
            recommendations: vec![],
            zakat_eligible: false,
            zakat_amount: 0.0,
        };
        Transaction::record(
            NewTransaction {
                amount,
                category: category.to_string(),
                description: String::new(),
                transaction_type: kind,
            },
            &verdict,
        )
    }

    fn profile(income: f64, expenses: f64) -> UserProfile {
        UserProfile {
            name: None,
            monthly_income: income,
            monthly_expenses: expenses,
            age: 30,
            risk_profile: RiskProfile::Moderate,
            islamic_knowledge: IslamicKnowledge::Beginner,
            family_size: 2,
            currency: "KZT".to_string(),
        }
    }

    fn engine() -> FinancialMetricsEngine {
        FinancialMetricsEngine::new(BudgetAllocator::new(BudgetSplit::default()))
    }

    #[test]
    fn test_savings_rate_guards_zero_income() {
        assert_eq!(savings_rate(0.0, 1000.0), 0.0);
        assert!((savings_rate(300_000.0, 200_000.0) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_health_score_clamps() {
        assert_eq!(financial_health_score(0.5), 100);
        assert_eq!(financial_health_score(0.9), 100);
        assert_eq!(financial_health_score(0.25), 50);
        assert_eq!(financial_health_score(-0.4), 0);
    }

    #[test]
    fn test_monthly_saving() {
        assert_eq!(monthly_saving(5_000_000.0, 500_000.0, 60), 75_000.0);
        assert_eq!(monthly_saving(1_000.0, 400.0, 0), 600.0);
        assert_eq!(monthly_saving(1_000.0, 400.0, -2), 600.0);
    }

    #[test]
    fn test_goal_progress_bounds_and_monotonicity() {
        assert_eq!(goal_progress(10.0, 0.0), 0.0);
        assert_eq!(goal_progress(2_000.0, 1_000.0), 100.0);

        let mut last = 0.0;
        for step in 0..=30 {
            let p = goal_progress(step as f64 * 50.0, 1_000.0);
            assert!((0.0..=100.0).contains(&p));
            assert!(p >= last);
            last = p;
        }
    }

    #[test]
    fn test_zakat_periods() {
        assert_eq!(zakat(300_000.0, ZakatPeriod::Monthly), 7_500.0);
        assert_eq!(zakat(300_000.0, ZakatPeriod::Annual), 90_000.0);
    }

    #[test]
    fn test_compute_metrics_from_transactions() {
        let transactions = vec![
            tx(50_000.0, "housing", TransactionType::Expense),
            tx(15_000.0, "food", TransactionType::Expense),
            tx(12_000.0, "entertainment", TransactionType::Expense),
            tx(300_000.0, "salary", TransactionType::Income),
        ];
        let metrics = engine().compute_metrics(&profile(300_000.0, 200_000.0), &transactions);

        assert_eq!(metrics.monthly_savings, 100_000.0);
        assert_eq!(metrics.essential_spending, 65_000.0);
        assert_eq!(metrics.discretionary_spending, 12_000.0);
        assert_eq!(metrics.financial_health_score, 67);
        assert_eq!(metrics.recommended_budget.len(), 5);
    }

    #[test]
    fn test_compute_metrics_without_expenses_uses_profile_split() {
        let metrics = engine().compute_metrics(&profile(100_000.0, 50_000.0), &[]);
        assert_eq!(metrics.essential_spending, 30_000.0);
        assert_eq!(metrics.discretionary_spending, 20_000.0);
    }

    #[test]
    fn test_analyze_spending_groups_by_category() {
        let transactions = vec![
            tx(100.0, "Food", TransactionType::Expense),
            tx(50.0, "food", TransactionType::Expense),
            tx(1_000.0, "salary", TransactionType::Income),
        ];
        let pattern = analyze_spending(&transactions);
        assert_eq!(pattern.total_expenses, 150.0);
        assert_eq!(pattern.expenses_by_category.get("food"), Some(&150.0));
        assert!((pattern.savings_rate - 0.85).abs() < 1e-12);
    }
}
