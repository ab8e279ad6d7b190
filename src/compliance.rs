//! Sharia compliance classifier
//!
//! Rules-based evaluation of transactions and investments.
//! Every rule runs; a verdict carries the union of violations in rule order.

use crate::config::AdvisorConfig;
use crate::models::{ComplianceVerdict, InvestmentDescriptor, NewTransaction};
use crate::metrics::ZAKAT_RATE;
use tracing::debug;

/// Prohibited (haram) activities. Matched as case-insensitive substrings.
pub const PROHIBITED: &[&str] = &[
    "alcohol",
    "tobacco",
    "gambling",
    "casino",
    "lottery",
    "pork",
    "conventional_banking",
    "insurance",
    "adult_entertainment",
    "weapons",
    "алкогол",
    "табак",
    "казино",
    "лотере",
    "свинин",
];

/// Discouraged (makruh) activities. Reported as warnings only.
pub const DISCOURAGED: &[&str] = &[
    "speculative_trading",
    "high_risk_investments",
    "excessive_leverage",
];

/// Substrings of the description. No bare stems that occur inside ordinary words.
const SPECULATIVE_KEYWORDS: &[&str] = &[
    "speculative",
    "gambling",
    "спекул",
    "букмекер",
    "ставки на спорт",
    "ставка на спорт",
];

const NON_ESSENTIAL_CATEGORIES: &[&str] = &["entertainment", "luxury"];

/// Threshold and limit values the rules read
#[derive(Debug, Clone, Copy)]
pub struct ComplianceLimits {
    pub israf_threshold: f64,
    pub nisab_threshold: f64,
    pub gharar_uncertainty_limit: f64,
}

impl From<&AdvisorConfig> for ComplianceLimits {
    fn from(config: &AdvisorConfig) -> Self {
        Self {
            israf_threshold: config.israf_threshold,
            nisab_threshold: config.nisab_threshold,
            gharar_uncertainty_limit: config.gharar_uncertainty_limit,
        }
    }
}

impl Default for ComplianceLimits {
    fn default() -> Self {
        Self::from(&AdvisorConfig::default())
    }
}

/// A single Sharia rule over subject `T`. Returns every violation found.
pub trait ShariaRule<T>: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, subject: &T, limits: &ComplianceLimits) -> Vec<String>;
}

/// Zakat assessment over a set of asset values
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ZakatAssessment {
    pub total_assets: f64,
    pub nisab: f64,
    pub zakat_eligible: bool,
    pub zakat_amount: f64,
}

pub struct ComplianceClassifier {
    limits: ComplianceLimits,
    transaction_rules: Vec<Box<dyn ShariaRule<NewTransaction>>>,
    investment_rules: Vec<Box<dyn ShariaRule<InvestmentDescriptor>>>,
}

impl ComplianceClassifier {
    pub fn new(limits: ComplianceLimits) -> Self {
        Self {
            limits,
            transaction_rules: Vec::new(),
            investment_rules: Vec::new(),
        }
    }

    pub fn add_transaction_rule(&mut self, rule: Box<dyn ShariaRule<NewTransaction>>) {
        self.transaction_rules.push(rule);
    }

    pub fn add_investment_rule(&mut self, rule: Box<dyn ShariaRule<InvestmentDescriptor>>) {
        self.investment_rules.push(rule);
    }

    /// Assumes the transaction passed boundary validation
    pub fn classify_transaction(&self, tx: &NewTransaction) -> ComplianceVerdict {
        let (issues, fired) = run_rules(&self.transaction_rules, tx, &self.limits);
        let text = format!("{} {}", tx.category, tx.description).to_lowercase();
        let recommendations = build_recommendations(&text, &issues, &fired);

        debug!(
            category = %tx.category,
            amount = tx.amount,
            issue_count = issues.len(),
            "Transaction classified"
        );

        ComplianceVerdict {
            is_compliant: issues.is_empty(),
            issues,
            recommendations,
            zakat_eligible: false,
            zakat_amount: 0.0,
        }
    }

    pub fn classify_investment(&self, investment: &InvestmentDescriptor) -> ComplianceVerdict {
        let (issues, fired) = run_rules(&self.investment_rules, investment, &self.limits);
        let text = format!("{} {}", investment.industry, investment.name).to_lowercase();
        let recommendations = build_recommendations(&text, &issues, &fired);
        let zakat = self.assess_zakat(&[investment.amount]);

        debug!(
            industry = %investment.industry,
            issue_count = issues.len(),
            zakat_eligible = zakat.zakat_eligible,
            "Investment classified"
        );

        ComplianceVerdict {
            is_compliant: issues.is_empty(),
            issues,
            recommendations,
            zakat_eligible: zakat.zakat_eligible,
            zakat_amount: zakat.zakat_amount,
        }
    }

    /// Eligible when the summed value meets the nisab; 2.5% of the total is due
    pub fn assess_zakat(&self, asset_values: &[f64]) -> ZakatAssessment {
        let total_assets: f64 = asset_values.iter().sum();
        let zakat_eligible = total_assets >= self.limits.nisab_threshold;

        ZakatAssessment {
            total_assets,
            nisab: self.limits.nisab_threshold,
            zakat_eligible,
            zakat_amount: if zakat_eligible {
                total_assets * ZAKAT_RATE
            } else {
                0.0
            },
        }
    }
}

impl Default for ComplianceClassifier {
    fn default() -> Self {
        create_default_classifier(ComplianceLimits::default())
    }
}

/// Issues in rule order, plus the names of the rules that fired
fn run_rules<T>(
    rules: &[Box<dyn ShariaRule<T>>],
    subject: &T,
    limits: &ComplianceLimits,
) -> (Vec<String>, Vec<&'static str>) {
    let mut issues = Vec::new();
    let mut fired = Vec::new();

    for rule in rules {
        let found = rule.evaluate(subject, limits);
        if !found.is_empty() {
            debug!(rule = rule.name(), violations = found.len(), "Sharia rule fired");
            fired.push(rule.name());
            issues.extend(found);
        }
    }

    (issues, fired)
}

fn build_recommendations(text: &str, issues: &[String], fired: &[&str]) -> Vec<String> {
    let mut recommendations: Vec<String> = Vec::new();

    for term in matched_terms(text, PROHIBITED) {
        push_alternatives(term, &mut recommendations);
    }

    // maysir can fire on description wording alone
    if fired.contains(&SpeculationRule.name()) {
        push_alternatives("gambling", &mut recommendations);
    }

    for term in matched_terms(text, DISCOURAGED) {
        recommendations.push(format!(
            "Сомнительная деятельность (макрух): {}. {}",
            term,
            halal_alternatives(term).join(", ")
        ));
    }

    if issues.is_empty() && recommendations.is_empty() {
        recommendations.push("Операция соответствует принципам шариата".to_string());
    }

    recommendations
}

fn push_alternatives(activity: &str, recommendations: &mut Vec<String>) {
    for alternative in halal_alternatives(activity) {
        if !recommendations.iter().any(|r| r == alternative) {
            recommendations.push(alternative.to_string());
        }
    }
}

fn matched_terms<'a>(text: &str, table: &[&'a str]) -> Vec<&'a str> {
    table.iter().copied().filter(|term| text.contains(term)).collect()
}

/// Halal alternatives for a prohibited or discouraged activity
pub fn halal_alternatives(activity: &str) -> &'static [&'static str] {
    match activity {
        "alcohol" | "алкогол" => &["Безалкогольные напитки", "Соки", "Чай/кофе"],
        "conventional_banking" => &["Исламские банки", "Сберегательные кассы"],
        "gambling" | "casino" | "lottery" | "казино" | "лотере" => {
            &["Благотворительность", "Спорт", "Образование"]
        }
        "speculative_trading" | "high_risk_investments" => {
            &["Реальные инвестиции", "Бизнес-партнерства"]
        }
        "insurance" => &["Такафул (взаимное страхование)"],
        _ => &["Обратитесь к исламскому финансовому консультанту"],
    }
}

//
// ========== Transaction Rules ==========
//

/// Rule: category or description references a prohibited activity
pub struct ProhibitedActivityRule;

impl ShariaRule<NewTransaction> for ProhibitedActivityRule {
    fn name(&self) -> &'static str {
        "prohibited_activity"
    }

    fn evaluate(&self, tx: &NewTransaction, _limits: &ComplianceLimits) -> Vec<String> {
        let text = format!("{} {}", tx.category, tx.description).to_lowercase();
        matched_terms(&text, PROHIBITED)
            .into_iter()
            .map(|term| format!("Транзакция связана с запрещенной деятельностью: {}", term))
            .collect()
    }
}

/// Rule: excessive spending (israf) in a non-essential category
pub struct IsrafRule;

impl ShariaRule<NewTransaction> for IsrafRule {
    fn name(&self) -> &'static str {
        "israf"
    }

    fn evaluate(&self, tx: &NewTransaction, limits: &ComplianceLimits) -> Vec<String> {
        let category = tx.category.trim().to_lowercase();
        if tx.amount > limits.israf_threshold && NON_ESSENTIAL_CATEGORIES.contains(&category.as_str())
        {
            vec!["Избегайте излишних расходов на развлечения и роскошь (исраф)".to_string()]
        } else {
            vec![]
        }
    }
}

/// Rule: speculative or gambling language in the description (maysir)
pub struct SpeculationRule;

impl ShariaRule<NewTransaction> for SpeculationRule {
    fn name(&self) -> &'static str {
        "maysir"
    }

    fn evaluate(&self, tx: &NewTransaction, _limits: &ComplianceLimits) -> Vec<String> {
        let description = tx.description.to_lowercase();
        if SPECULATIVE_KEYWORDS.iter().any(|kw| description.contains(kw)) {
            vec!["Спекулятивные операции запрещены в исламе (майсир)".to_string()]
        } else {
            vec![]
        }
    }
}

//
// ========== Investment Rules ==========
//

/// Rule: interest-bearing instruments (riba)
pub struct RibaRule;

impl ShariaRule<InvestmentDescriptor> for RibaRule {
    fn name(&self) -> &'static str {
        "riba"
    }

    fn evaluate(&self, inv: &InvestmentDescriptor, _limits: &ComplianceLimits) -> Vec<String> {
        if inv.interest_based {
            vec!["Инвестиция основана на процентах (риба)".to_string()]
        } else {
            vec![]
        }
    }
}

pub struct ProhibitedIndustryRule;

impl ShariaRule<InvestmentDescriptor> for ProhibitedIndustryRule {
    fn name(&self) -> &'static str {
        "prohibited_industry"
    }

    fn evaluate(&self, inv: &InvestmentDescriptor, _limits: &ComplianceLimits) -> Vec<String> {
        let industry = inv.industry.to_lowercase();
        matched_terms(&industry, PROHIBITED)
            .into_iter()
            .map(|term| format!("Инвестиция в запрещенную отрасль: {}", term))
            .collect()
    }
}

/// Rule: excessive uncertainty (gharar)
pub struct GhararRule;

impl ShariaRule<InvestmentDescriptor> for GhararRule {
    fn name(&self) -> &'static str {
        "gharar"
    }

    fn evaluate(&self, inv: &InvestmentDescriptor, limits: &ComplianceLimits) -> Vec<String> {
        if inv.uncertainty_level > limits.gharar_uncertainty_limit {
            vec!["Высокий уровень неопределенности (гарар)".to_string()]
        } else {
            vec![]
        }
    }
}

pub struct SpeculativeInvestmentRule;

impl ShariaRule<InvestmentDescriptor> for SpeculativeInvestmentRule {
    fn name(&self) -> &'static str {
        "maysir"
    }

    fn evaluate(&self, inv: &InvestmentDescriptor, _limits: &ComplianceLimits) -> Vec<String> {
        if inv.speculative {
            vec!["Спекулятивный характер инвестиции (майсир)".to_string()]
        } else {
            vec![]
        }
    }
}

/// Create a classifier with the standard rule set
pub fn create_default_classifier(limits: ComplianceLimits) -> ComplianceClassifier {
    let mut classifier = ComplianceClassifier::new(limits);

    classifier.add_transaction_rule(Box::new(ProhibitedActivityRule));
    classifier.add_transaction_rule(Box::new(IsrafRule));
    classifier.add_transaction_rule(Box::new(SpeculationRule));

    classifier.add_investment_rule(Box::new(RibaRule));
    classifier.add_investment_rule(Box::new(ProhibitedIndustryRule));
    classifier.add_investment_rule(Box::new(GhararRule));
    classifier.add_investment_rule(Box::new(SpeculativeInvestmentRule));

    classifier
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionType;

    fn tx(amount: f64, category: &str, description: &str) -> NewTransaction {
        NewTransaction {
            amount,
            category: category.to_string(),
            description: description.to_string(),
            transaction_type: TransactionType::Expense,
        }
    }

    #[test]
    fn test_gambling_category_always_non_compliant() {
        let classifier = ComplianceClassifier::default();
        for amount in [1.0, 50_000.0, 5_000_000.0] {
            let verdict = classifier.classify_transaction(&tx(amount, "Online_Gambling", ""));
            assert!(!verdict.is_compliant);
            assert!(verdict.issues[0].contains("gambling"));
        }
    }

    #[test]
    fn test_food_below_threshold_is_compliant() {
        let classifier = ComplianceClassifier::default();
        let verdict = classifier.classify_transaction(&tx(50_000.0, "food", "Продукты"));
        assert!(verdict.is_compliant);
        assert!(verdict.issues.is_empty());
        assert!(!verdict.zakat_eligible);
    }

    #[test]
    fn test_delivery_is_not_speculation() {
        let classifier = ComplianceClassifier::default();
        for description in ["Доставка продуктов", "Доставка мебели на дом"] {
            let verdict = classifier.classify_transaction(&tx(5_000.0, "food", description));
            assert!(verdict.is_compliant, "{} flagged", description);
            assert!(verdict.issues.is_empty());
        }
    }

    #[test]
    fn test_maysir_only_verdict_offers_alternatives() {
        let classifier = ComplianceClassifier::default();
        let verdict =
            classifier.classify_transaction(&tx(3_000.0, "entertainment", "Пополнение счета у букмекера"));
        assert!(!verdict.is_compliant);
        assert_eq!(verdict.issues.len(), 1);
        assert!(verdict.issues[0].contains("майсир"));
        assert!(verdict.recommendations.iter().any(|r| r == "Благотворительность"));
    }

    #[test]
    fn test_israf_threshold() {
        let classifier = ComplianceClassifier::default();
        assert!(classifier
            .classify_transaction(&tx(100_000.0, "luxury", ""))
            .is_compliant);
        let verdict = classifier.classify_transaction(&tx(100_001.0, "Luxury", ""));
        assert!(!verdict.is_compliant);
        assert!(verdict.issues[0].contains("исраф"));
        // same amount in an essential category is fine
        assert!(classifier
            .classify_transaction(&tx(500_000.0, "housing", "Аренда"))
            .is_compliant);
    }

    #[test]
    fn test_transaction_reports_all_violations() {
        let classifier = ComplianceClassifier::default();
        let verdict =
            classifier.classify_transaction(&tx(200_000.0, "entertainment", "casino speculative bets"));
        assert!(!verdict.is_compliant);
        assert_eq!(verdict.issues.len(), 3);
        assert!(verdict.recommendations.iter().any(|r| r == "Благотворительность"));
    }

    #[test]
    fn test_investment_union_of_issues() {
        let classifier = ComplianceClassifier::default();
        let investment = InvestmentDescriptor {
            name: "Fund".to_string(),
            industry: "Alcohol and tobacco".to_string(),
            amount: 100_000.0,
            interest_based: true,
            uncertainty_level: 0.9,
            speculative: true,
        };
        let verdict = classifier.classify_investment(&investment);
        assert!(!verdict.is_compliant);
        // riba + 2 industries + gharar + maysir
        assert_eq!(verdict.issues.len(), 5);
        assert!(verdict.issues[0].contains("риба"));
        assert!(verdict.zakat_eligible);
        assert_eq!(verdict.zakat_amount, 2_500.0);
    }

    #[test]
    fn test_uncertainty_boundary() {
        let classifier = ComplianceClassifier::default();
        let mut investment = InvestmentDescriptor {
            industry: "agriculture".to_string(),
            uncertainty_level: 0.7,
            amount: 10_000.0,
            ..InvestmentDescriptor::default()
        };
        let verdict = classifier.classify_investment(&investment);
        assert!(verdict.is_compliant);
        assert!(!verdict.zakat_eligible);
        assert_eq!(verdict.zakat_amount, 0.0);

        investment.uncertainty_level = 0.71;
        assert!(!classifier.classify_investment(&investment).is_compliant);
    }

    #[test]
    fn test_discouraged_is_warning_only() {
        let classifier = ComplianceClassifier::default();
        let investment = InvestmentDescriptor {
            industry: "excessive_leverage".to_string(),
            ..InvestmentDescriptor::default()
        };
        let verdict = classifier.classify_investment(&investment);
        assert!(verdict.is_compliant);
        assert!(verdict.recommendations[0].contains("макрух"));
    }

    #[test]
    fn test_zakat_nisab() {
        let classifier = ComplianceClassifier::default();
        let below = classifier.assess_zakat(&[40_000.0, 44_999.0]);
        assert!(!below.zakat_eligible);
        assert_eq!(below.zakat_amount, 0.0);

        let at = classifier.assess_zakat(&[40_000.0, 45_000.0]);
        assert!(at.zakat_eligible);
        assert_eq!(at.zakat_amount, 2_125.0);
    }

    #[test]
    fn test_custom_limits() {
        let classifier = create_default_classifier(ComplianceLimits {
            israf_threshold: 10_000.0,
            nisab_threshold: 1_000.0,
            gharar_uncertainty_limit: 0.5,
        });
        assert!(!classifier
            .classify_transaction(&tx(20_000.0, "entertainment", ""))
            .is_compliant);
        assert!(classifier.assess_zakat(&[1_000.0]).zakat_eligible);
    }
}
