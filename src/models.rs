//! Core data models for the advisor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::AdvisorError;
use crate::metrics;
use crate::Result;

/// `goals[2]` + `amount` -> `goals[2].amount`
fn prefixed(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

//
// ================= Profile Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

impl RiskProfile {
    /// conservative ⊂ {low}, moderate ⊂ {low, medium}, aggressive ⊂ {low, medium, high}
    pub fn permits(&self, level: RiskLevel) -> bool {
        match self {
            RiskProfile::Conservative => level == RiskLevel::Low,
            RiskProfile::Moderate => matches!(level, RiskLevel::Low | RiskLevel::Medium),
            RiskProfile::Aggressive => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IslamicKnowledge {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

//
// ================= User Profile =================
//

fn default_family_size() -> u32 {
    1
}

fn default_currency() -> String {
    "KZT".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    pub monthly_income: f64,
    pub monthly_expenses: f64,
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub risk_profile: RiskProfile,
    #[serde(default)]
    pub islamic_knowledge: IslamicKnowledge,
    #[serde(default = "default_family_size")]
    pub family_size: u32,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl UserProfile {
    pub fn validate(&self) -> Result<()> {
        if !self.monthly_income.is_finite() || self.monthly_income < 0.0 {
            return Err(AdvisorError::validation(
                "monthly_income",
                "must be a non-negative amount",
            ));
        }
        if !self.monthly_expenses.is_finite() || self.monthly_expenses < 0.0 {
            return Err(AdvisorError::validation(
                "monthly_expenses",
                "must be a non-negative amount",
            ));
        }
        if self.monthly_expenses > self.monthly_income * 2.0 {
            return Err(AdvisorError::validation(
                "monthly_expenses",
                "must not exceed twice the monthly income",
            ));
        }
        if self.family_size < 1 {
            return Err(AdvisorError::validation("family_size", "must be at least 1"));
        }
        if self.currency.trim().is_empty() {
            return Err(AdvisorError::validation("currency", "must not be empty"));
        }
        Ok(())
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("друг")
    }

    pub fn currency_symbol(&self) -> &str {
        match self.currency.to_uppercase().as_str() {
            "KZT" => "₸",
            "RUB" => "₽",
            "USD" => "$",
            "EUR" => "€",
            _ => self.currency.as_str(),
        }
    }
}

//
// ================= Goals =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GoalCategory {
    Housing,
    Education,
    Hajj,
    Business,
    Transport,
    Health,
    Marriage,
    Other,
}

impl GoalCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalCategory::Housing => "housing",
            GoalCategory::Education => "education",
            GoalCategory::Hajj => "hajj",
            GoalCategory::Business => "business",
            GoalCategory::Transport => "transport",
            GoalCategory::Health => "health",
            GoalCategory::Marriage => "marriage",
            GoalCategory::Other => "other",
        }
    }
}

impl fmt::Display for GoalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Lower rank is served first
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IslamicImportance {
    Fard,
    Sunnah,
    Mustahabb,
    #[default]
    Mubah,
}

/// Goal creation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGoal {
    pub goal_name: String,
    pub target_amount: f64,
    #[serde(default)]
    pub current_amount: f64,
    pub timeline_months: i32,
    pub category: GoalCategory,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub islamic_importance: IslamicImportance,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinancialGoal {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub goal_name: String,
    pub target_amount: f64,
    #[serde(default)]
    pub current_amount: f64,
    pub timeline_months: i32,
    pub category: GoalCategory,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub islamic_importance: IslamicImportance,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl FinancialGoal {
    pub fn new(goal: NewGoal) -> Self {
        let mut created = Self {
            id: Uuid::new_v4(),
            goal_name: goal.goal_name,
            target_amount: goal.target_amount,
            current_amount: goal.current_amount,
            timeline_months: goal.timeline_months,
            category: goal.category,
            priority: goal.priority,
            islamic_importance: goal.islamic_importance,
            is_completed: false,
            created_at: Utc::now(),
        };
        created.refresh_completion();
        created
    }

    /// Validate with a field prefix such as `goals[2]`
    pub fn validate(&self, prefix: &str) -> Result<()> {
        let field = |name: &str| prefixed(prefix, name);

        if self.goal_name.trim().is_empty() {
            return Err(AdvisorError::validation(field("goal_name"), "must not be empty"));
        }
        if !self.target_amount.is_finite() || self.target_amount <= 0.0 {
            return Err(AdvisorError::validation(field("target_amount"), "must be positive"));
        }
        if !self.current_amount.is_finite() || self.current_amount < 0.0 {
            return Err(AdvisorError::validation(
                field("current_amount"),
                "must be non-negative",
            ));
        }
        if self.timeline_months < 0 {
            return Err(AdvisorError::validation(
                field("timeline_months"),
                "must be non-negative",
            ));
        }
        Ok(())
    }

    pub fn monthly_saving(&self) -> f64 {
        metrics::monthly_saving(self.target_amount, self.current_amount, self.timeline_months)
    }

    pub fn progress_percentage(&self) -> f64 {
        metrics::goal_progress(self.current_amount, self.target_amount)
    }

    /// Apply a deposit and update completion
    pub fn deposit(&mut self, amount: f64) -> Result<()> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(AdvisorError::validation("amount", "deposit must be positive"));
        }
        self.current_amount += amount;
        self.refresh_completion();
        Ok(())
    }

    fn refresh_completion(&mut self) {
        self.is_completed = self.current_amount >= self.target_amount;
    }
}

/// Goal enriched with its derived figures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalSummary {
    #[serde(flatten)]
    pub goal: FinancialGoal,
    pub monthly_saving: f64,
    pub progress_percentage: f64,
}

impl From<&FinancialGoal> for GoalSummary {
    fn from(goal: &FinancialGoal) -> Self {
        Self {
            goal: goal.clone(),
            monthly_saving: goal.monthly_saving(),
            progress_percentage: goal.progress_percentage(),
        }
    }
}

//
// ================= Transactions =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

/// Transaction as submitted, before classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub amount: f64,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub transaction_type: TransactionType,
}

impl NewTransaction {
    /// Validate with a field prefix such as `transactions[0]`
    pub fn validate(&self, prefix: &str) -> Result<()> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(AdvisorError::validation(
                prefixed(prefix, "amount"),
                "must be positive",
            ));
        }
        if self.category.trim().is_empty() {
            return Err(AdvisorError::validation(
                prefixed(prefix, "category"),
                "must not be empty",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub amount: f64,
    pub category: String,
    pub description: String,
    pub transaction_type: TransactionType,
    /// Derived by the compliance classifier when recorded
    pub is_halal: bool,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn record(tx: NewTransaction, verdict: &ComplianceVerdict) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount: tx.amount,
            category: tx.category,
            description: tx.description,
            transaction_type: tx.transaction_type,
            is_halal: verdict.is_compliant,
            created_at: Utc::now(),
        }
    }

    pub fn is_expense(&self) -> bool {
        self.transaction_type == TransactionType::Expense
    }
}

//
// ================= Investments =================
//

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InvestmentDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub interest_based: bool,
    #[serde(default)]
    pub uncertainty_level: f64,
    #[serde(default)]
    pub speculative: bool,
}

impl InvestmentDescriptor {
    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(AdvisorError::validation("amount", "must be non-negative"));
        }
        if !(0.0..=1.0).contains(&self.uncertainty_level) {
            return Err(AdvisorError::validation(
                "uncertainty_level",
                "must be between 0 and 1",
            ));
        }
        Ok(())
    }
}

//
// ================= Products =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Deposit,
    Financing,
    Investment,
    Savings,
    Card,
    Special,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShariaPrinciple {
    Murabaha,
    Mudaraba,
    Musharaka,
    Ijara,
    Salam,
    Istisna,
    Wadiah,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BankProduct {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub product_type: ProductType,
    pub description: String,
    pub features: Vec<String>,
    pub risk_level: RiskLevel,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub timeline: Option<String>,
    pub recommended_for: Vec<String>,
    pub sharia_principles: Vec<ShariaPrinciple>,
    pub eligibility: Vec<String>,
    pub profit_rate: Option<String>,
}

//
// ================= Derived Results =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BudgetCategory {
    Essential,
    Savings,
    Investment,
    Charity,
    PersonalDevelopment,
}

impl BudgetCategory {
    pub const ALL: [BudgetCategory; 5] = [
        BudgetCategory::Essential,
        BudgetCategory::Savings,
        BudgetCategory::Investment,
        BudgetCategory::Charity,
        BudgetCategory::PersonalDevelopment,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            BudgetCategory::Essential => "Основные нужды",
            BudgetCategory::Savings => "Сбережения",
            BudgetCategory::Investment => "Инвестиции",
            BudgetCategory::Charity => "Закят",
            BudgetCategory::PersonalDevelopment => "Развитие",
        }
    }
}

pub type Budget = BTreeMap<BudgetCategory, f64>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinancialMetrics {
    pub monthly_income: f64,
    pub monthly_expenses: f64,
    pub monthly_savings: f64,
    pub savings_rate: f64,
    pub essential_spending: f64,
    pub discretionary_spending: f64,
    pub recommended_budget: Budget,
    pub financial_health_score: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceVerdict {
    pub is_compliant: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub zakat_eligible: bool,
    pub zakat_amount: f64,
}
