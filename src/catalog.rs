//! Product catalog and matcher
//!
//! Static catalog of Sharia-compliant bank products, goal/risk scoring,
//! dedicated goal products and term calculation.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

use crate::error::AdvisorError;
use crate::models::{
    BankProduct, FinancialGoal, GoalCategory, ProductType, RiskLevel, RiskProfile,
    ShariaPrinciple,
};
use crate::Result;

const GOAL_MATCH_POINTS: u32 = 2;
const FINANCING_MARKUP: f64 = 0.15;
const DEPOSIT_ANNUAL_PROFIT: f64 = 0.10;

const HOUSING_DEDICATED_ABOVE: f64 = 1_000_000.0;
const BUSINESS_DEDICATED_ABOVE: f64 = 500_000.0;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

lazy_static! {
    /// Process-wide read-only catalog
    pub static ref CATALOG: Vec<BankProduct> = vec![
        BankProduct {
            id: "amanat_deposit".to_string(),
            name: "Вклад 'Аманат'".to_string(),
            product_type: ProductType::Deposit,
            description: "Исламский беспроцентный вклад с участием в прибыли банка по принципу Мудараба.".to_string(),
            features: strings(&[
                "Отсутствие рибы (процентов)",
                "Участие в прибыли банка",
                "Капитализация доходов",
                "Досрочное снятие возможно",
            ]),
            risk_level: RiskLevel::Low,
            min_amount: Some(50_000.0),
            max_amount: None,
            timeline: Some("3-36 месяцев".to_string()),
            recommended_for: strings(&[
                "Сбережения",
                "Краткосрочные цели",
                "Создание финансовой подушки",
                "savings",
                "marriage",
            ]),
            sharia_principles: vec![ShariaPrinciple::Mudaraba],
            eligibility: strings(&["Физические лица", "Резиденты РК", "От 18 лет"]),
            profit_rate: Some("До 12% годовых (участие в прибыли)".to_string()),
        },
        BankProduct {
            id: "murabaha_real_estate".to_string(),
            name: "Мурабаха финансирование недвижимости".to_string(),
            product_type: ProductType::Financing,
            description: "Приобретение жилья через перепродажу с согласованной наценкой.".to_string(),
            features: strings(&[
                "Фиксированная стоимость",
                "Прозрачные условия",
                "Рассрочка до 20 лет",
                "Первоначальный взнос от 15%",
            ]),
            risk_level: RiskLevel::Medium,
            min_amount: Some(5_000_000.0),
            max_amount: Some(50_000_000.0),
            timeline: Some("до 20 лет".to_string()),
            recommended_for: strings(&[
                "Покупка квартиры",
                "Приобретение дома",
                "Ипотека",
                "housing",
            ]),
            sharia_principles: vec![ShariaPrinciple::Murabaha],
            eligibility: strings(&["Физические лица", "Постоянный доход"]),
            profit_rate: None,
        },
        BankProduct {
            id: "ijara_auto".to_string(),
            name: "Иджара автомобильное финансирование".to_string(),
            product_type: ProductType::Financing,
            description: "Аренда автомобиля с правом выкупа по остаточной стоимости.".to_string(),
            features: strings(&[
                "Аренда с выкупом",
                "Низкий первоначальный платеж",
                "Страхование включено",
                "Досрочный выкуп",
            ]),
            risk_level: RiskLevel::Medium,
            min_amount: Some(3_000_000.0),
            max_amount: None,
            timeline: Some("1-7 лет".to_string()),
            recommended_for: strings(&[
                "Покупка автомобиля",
                "Семейный автомобиль",
                "transport",
            ]),
            sharia_principles: vec![ShariaPrinciple::Ijara],
            eligibility: strings(&["Физические и юридические лица", "Подтверждение дохода"]),
            profit_rate: None,
        },
        BankProduct {
            id: "sadaka_investment".to_string(),
            name: "Инвестиционный счет 'Садака'".to_string(),
            product_type: ProductType::Investment,
            description: "Социально ответственные инвестиции в халяльные секторы экономики.".to_string(),
            features: strings(&[
                "Диверсификация портфеля",
                "Экспертное управление",
                "Часть прибыли на благотворительность",
            ]),
            risk_level: RiskLevel::Medium,
            min_amount: Some(100_000.0),
            max_amount: None,
            timeline: None,
            recommended_for: strings(&[
                "Долгосрочные инвестиции",
                "Пенсионные накопления",
                "investment",
                "retirement",
            ]),
            sharia_principles: vec![ShariaPrinciple::Mudaraba],
            eligibility: strings(&["Резиденты РК", "От 18 лет"]),
            profit_rate: Some("Зависит от результатов инвестирования".to_string()),
        },
        BankProduct {
            id: "wadiah_current".to_string(),
            name: "Текущий счет 'Вадиа'".to_string(),
            product_type: ProductType::Savings,
            description: "Беспроцентный текущий счет с гарантией сохранности средств.".to_string(),
            features: strings(&[
                "Бесплатное обслуживание",
                "Мобильное приложение",
                "Бесплатные переводы",
            ]),
            risk_level: RiskLevel::Low,
            min_amount: Some(0.0),
            max_amount: None,
            timeline: None,
            recommended_for: strings(&[
                "Ежедневные операции",
                "Управление личными финансами",
                "daily",
            ]),
            sharia_principles: vec![ShariaPrinciple::Wadiah],
            eligibility: strings(&["Физические лица", "От 14 лет"]),
            profit_rate: None,
        },
        BankProduct {
            id: "rahmat_card".to_string(),
            name: "Карта 'Рахмат'".to_string(),
            product_type: ProductType::Card,
            description: "Дебетовая карта с кэшбэком и предложениями партнеров банка.".to_string(),
            features: strings(&["Кэшбэк до 5%", "Бесплатное обслуживание", "Скидки у партнеров"]),
            risk_level: RiskLevel::Low,
            min_amount: None,
            max_amount: None,
            timeline: None,
            recommended_for: strings(&["Ежедневные покупки", "Путешествия", "daily", "travel"]),
            sharia_principles: vec![ShariaPrinciple::Wadiah],
            eligibility: strings(&["Владельцы текущих счетов", "От 18 лет"]),
            profit_rate: None,
        },
        BankProduct {
            id: "education_financing".to_string(),
            name: "Образовательное финансирование".to_string(),
            product_type: ProductType::Financing,
            description: "Финансирование обучения в вузах РК и за рубежом.".to_string(),
            features: strings(&[
                "Финансирование до 100% стоимости",
                "Льготный период погашения",
                "Гибкий график платежей",
            ]),
            risk_level: RiskLevel::Medium,
            min_amount: Some(500_000.0),
            max_amount: None,
            timeline: Some("до 10 лет".to_string()),
            recommended_for: strings(&[
                "Высшее образование",
                "Профессиональные курсы",
                "education",
            ]),
            sharia_principles: vec![ShariaPrinciple::Murabaha],
            eligibility: strings(&["Студенты", "Абитуриенты"]),
            profit_rate: None,
        },
        BankProduct {
            id: "medical_financing".to_string(),
            name: "Медицинское финансирование".to_string(),
            product_type: ProductType::Financing,
            description: "Финансирование лечения и операций в клиниках Казахстана и за рубежом.".to_string(),
            features: strings(&["Широкий список клиник", "Экспресс-одобрение", "Гибкие условия"]),
            risk_level: RiskLevel::Medium,
            min_amount: Some(300_000.0),
            max_amount: None,
            timeline: Some("до 5 лет".to_string()),
            recommended_for: strings(&["Плановые операции", "Стоматология", "health"]),
            sharia_principles: vec![ShariaPrinciple::Murabaha],
            eligibility: strings(&["Физические лица", "Медицинские показания"]),
            profit_rate: None,
        },
        BankProduct {
            id: "musharaka_venture".to_string(),
            name: "Венчурный фонд 'Мушарака'".to_string(),
            product_type: ProductType::Investment,
            description: "Долевое участие в капитале растущих халяльных компаний.".to_string(),
            features: strings(&["Партнерство в капитале", "Разделение прибыли и убытков"]),
            risk_level: RiskLevel::High,
            min_amount: Some(1_000_000.0),
            max_amount: None,
            timeline: Some("от 3 лет".to_string()),
            recommended_for: strings(&["Развитие бизнеса", "business", "venture"]),
            sharia_principles: vec![ShariaPrinciple::Musharaka],
            eligibility: strings(&["Квалифицированные инвесторы"]),
            profit_rate: Some("Доля в прибыли компаний".to_string()),
        },
    ];
}

pub fn find_product(id: &str) -> Option<&'static BankProduct> {
    CATALOG.iter().find(|p| p.id == id)
}

pub fn get_product(id: &str) -> Result<&'static BankProduct> {
    find_product(id).ok_or_else(|| AdvisorError::NotFound(format!("product {}", id)))
}

//
// ================= Browsing =================
//

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    #[serde(rename = "type")]
    pub product_type: Option<ProductType>,
    pub risk_level: Option<RiskLevel>,
    pub search: Option<String>,
}

pub fn browse(filter: &ProductFilter) -> Vec<&'static BankProduct> {
    let search = filter
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    CATALOG
        .iter()
        .filter(|p| filter.product_type.map_or(true, |t| p.product_type == t))
        .filter(|p| filter.risk_level.map_or(true, |r| p.risk_level == r))
        .filter(|p| match &search {
            Some(term) => {
                p.name.to_lowercase().contains(term) || p.description.to_lowercase().contains(term)
            }
            None => true,
        })
        .collect()
}

/// Known ids in request order; unknown ids are skipped
pub fn compare(ids: &[String]) -> Result<Vec<&'static BankProduct>> {
    let found: Vec<&'static BankProduct> = ids.iter().filter_map(|id| find_product(id)).collect();
    if found.is_empty() {
        return Err(AdvisorError::NotFound(
            "no products found for comparison".to_string(),
        ));
    }
    Ok(found)
}

/// Distinct product types in catalog order
pub fn product_types() -> Vec<ProductType> {
    let mut types = Vec::new();
    for product in CATALOG.iter() {
        if !types.contains(&product.product_type) {
            types.push(product.product_type);
        }
    }
    types
}

pub fn sharia_principles() -> Vec<ShariaPrinciple> {
    CATALOG
        .iter()
        .flat_map(|p| p.sharia_principles.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

//
// ================= Terms & Applications =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductTerms {
    pub product_id: String,
    pub product_name: String,
    pub amount: f64,
    pub timeline_months: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_monthly_payment: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_profit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_return: Option<f64>,
}

/// Financing spreads a fixed markup over the timeline; deposits accrue an
/// annual profit share. Other product types only echo the request.
pub fn calculate_terms(
    product: &BankProduct,
    amount: f64,
    timeline_months: Option<u32>,
) -> Result<ProductTerms> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AdvisorError::validation("amount", "must be positive"));
    }
    if timeline_months == Some(0) {
        return Err(AdvisorError::validation("timeline_months", "must be positive"));
    }

    let mut terms = ProductTerms {
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        amount,
        timeline_months,
        estimated_monthly_payment: None,
        total_amount: None,
        estimated_profit: None,
        total_return: None,
    };

    if let Some(months) = timeline_months {
        match product.product_type {
            ProductType::Financing => {
                let monthly = (amount * (1.0 + FINANCING_MARKUP) / months as f64).floor();
                terms.estimated_monthly_payment = Some(monthly);
                terms.total_amount = Some(monthly * months as f64);
            }
            ProductType::Deposit => {
                let profit = (amount * DEPOSIT_ANNUAL_PROFIT * months as f64 / 12.0).floor();
                terms.estimated_profit = Some(profit);
                terms.total_return = Some(amount + profit);
            }
            _ => {}
        }
    }

    Ok(terms)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductApplication {
    pub product_id: String,
    pub user_id: String,
    pub amount: f64,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub additional_info: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application_id: Uuid,
    pub product_id: String,
    pub product_name: String,
    pub amount: f64,
    pub timeline: Option<String>,
    pub additional_info: Option<String>,
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
}

impl ProductApplication {
    /// Check the amount against the product bounds and build a pending record
    pub fn into_record(self, product: &BankProduct) -> Result<ApplicationRecord> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(AdvisorError::validation("amount", "must be positive"));
        }
        if let Some(min) = product.min_amount {
            if self.amount < min {
                return Err(AdvisorError::validation(
                    "amount",
                    format!("minimum amount for this product is {:.0} ₸", min),
                ));
            }
        }
        if let Some(max) = product.max_amount {
            if self.amount > max {
                return Err(AdvisorError::validation(
                    "amount",
                    format!("maximum amount for this product is {:.0} ₸", max),
                ));
            }
        }

        Ok(ApplicationRecord {
            application_id: Uuid::new_v4(),
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            amount: self.amount,
            timeline: self.timeline,
            additional_info: self.additional_info,
            status: ApplicationStatus::Pending,
            applied_at: Utc::now(),
        })
    }
}

//
// ================= Matching =================
//

/// What a goal contributes to matching: its category and display name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalDescriptor {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub name: String,
}

impl GoalDescriptor {
    /// A free-text goal such as "housing" or "Покупка квартиры"
    pub fn from_term(term: &str) -> Self {
        Self {
            category: term.to_string(),
            name: term.to_string(),
        }
    }

    fn matches(&self, product: &BankProduct) -> bool {
        [&self.category, &self.name]
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .any(|needle| {
                product
                    .recommended_for
                    .iter()
                    .any(|tag| tag.to_lowercase().contains(&needle))
            })
    }
}

impl From<&FinancialGoal> for GoalDescriptor {
    fn from(goal: &FinancialGoal) -> Self {
        Self {
            category: goal.category.as_str().to_string(),
            name: goal.goal_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredProduct {
    #[serde(flatten)]
    pub product: BankProduct,
    pub match_score: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    Baseline,
    Goal,
    Catalog,
}

/// Product suggestion as presented next to advice
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSuggestion {
    pub product_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub product_type: ProductType,
    pub description: String,
    pub features: Vec<String>,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    pub estimated_monthly: Option<f64>,
    pub match_score: Option<u32>,
    pub source: SuggestionSource,
}

impl From<ScoredProduct> for ProductSuggestion {
    fn from(scored: ScoredProduct) -> Self {
        let p = scored.product;
        Self {
            product_id: p.id,
            name: p.name,
            product_type: p.product_type,
            description: p.description,
            features: p.features,
            min_amount: p.min_amount,
            max_amount: p.max_amount,
            estimated_monthly: None,
            match_score: Some(scored.match_score),
            source: SuggestionSource::Catalog,
        }
    }
}

pub struct ProductCatalogMatcher {
    financing_income_threshold: f64,
}

impl ProductCatalogMatcher {
    pub fn new(financing_income_threshold: f64) -> Self {
        Self {
            financing_income_threshold,
        }
    }

    pub fn score(
        &self,
        product: &BankProduct,
        goals: &[GoalDescriptor],
        risk_profile: RiskProfile,
        monthly_income: Option<f64>,
    ) -> u32 {
        let goal_points = goals.iter().filter(|g| g.matches(product)).count() as u32
            * GOAL_MATCH_POINTS;

        let risk_point = u32::from(risk_profile.permits(product.risk_level));

        let income_point = match monthly_income {
            Some(income)
                if product.product_type == ProductType::Financing
                    && income > self.financing_income_threshold =>
            {
                1
            }
            _ => 0,
        };

        goal_points + risk_point + income_point
    }

    /// Catalog products ranked by score, zero scores excluded
    pub fn recommend(
        &self,
        goals: &[GoalDescriptor],
        risk_profile: RiskProfile,
        monthly_income: Option<f64>,
    ) -> Vec<ScoredProduct> {
        let mut ranked: Vec<ScoredProduct> = CATALOG
            .iter()
            .filter_map(|product| {
                let match_score = self.score(product, goals, risk_profile, monthly_income);
                (match_score > 0).then(|| ScoredProduct {
                    product: product.clone(),
                    match_score,
                })
            })
            .collect();

        // sort_by is stable: ties keep catalog order
        ranked.sort_by(|a, b| b.match_score.cmp(&a.match_score));

        debug!(
            goal_count = goals.len(),
            matched = ranked.len(),
            "Catalog products scored"
        );
        ranked
    }

    /// Baseline savings product followed by one dedicated product per qualifying goal
    pub fn goal_products(&self, goals: &[FinancialGoal], monthly_income: f64) -> Vec<ProductSuggestion> {
        let mut products = vec![baseline_savings(monthly_income)];
        products.extend(goals.iter().filter_map(dedicated_product));
        products
    }

    /// Baseline and goal products first, then ranked catalog products, deduplicated by id
    pub fn suggest(
        &self,
        goals: &[FinancialGoal],
        risk_profile: RiskProfile,
        monthly_income: f64,
    ) -> Vec<ProductSuggestion> {
        let descriptors: Vec<GoalDescriptor> = goals.iter().map(GoalDescriptor::from).collect();
        let ranked = self.recommend(&descriptors, risk_profile, Some(monthly_income));

        let mut merged: Vec<ProductSuggestion> = Vec::new();
        let candidates = self
            .goal_products(goals, monthly_income)
            .into_iter()
            .chain(ranked.into_iter().map(ProductSuggestion::from));

        for candidate in candidates {
            if !merged.iter().any(|p| p.product_id == candidate.product_id) {
                merged.push(candidate);
            }
        }
        merged
    }
}

fn estimated_monthly(goal: &FinancialGoal) -> f64 {
    if goal.timeline_months > 0 {
        goal.target_amount / goal.timeline_months as f64
    } else {
        goal.target_amount
    }
}

fn baseline_savings(monthly_income: f64) -> ProductSuggestion {
    ProductSuggestion {
        product_id: "mudaraba_savings".to_string(),
        name: "Мудараба Сберегательный".to_string(),
        product_type: ProductType::Deposit,
        description: "Участие в прибыли банка без фиксированного процента. Подходит для накопления на любые цели.".to_string(),
        features: strings(&[
            "Участие в прибыли",
            "Без гарантированного процента",
            "Гибкие взносы",
        ]),
        min_amount: Some((monthly_income * 0.1).max(50_000.0)),
        max_amount: Some(10_000_000.0),
        estimated_monthly: Some(monthly_income * 0.15),
        match_score: None,
        source: SuggestionSource::Baseline,
    }
}

fn dedicated_product(goal: &FinancialGoal) -> Option<ProductSuggestion> {
    let target = goal.target_amount;
    let suggestion = match goal.category {
        GoalCategory::Housing if target > HOUSING_DEDICATED_ABOVE => ProductSuggestion {
            product_id: "murabaha_housing".to_string(),
            name: "Мурабаха Жилье".to_string(),
            product_type: ProductType::Financing,
            description: format!(
                "Финансирование с фиксированной наценкой для покупки жилья за {:.0} ₸. Без процентов.",
                target
            ),
            features: vec![
                "Без риба".to_string(),
                "Прозрачная наценка".to_string(),
                format!("Рассрочка до {} месяцев", goal.timeline_months),
                "Страхование такафул".to_string(),
            ],
            min_amount: Some(1_000_000.0),
            max_amount: Some(50_000_000.0),
            estimated_monthly: Some(estimated_monthly(goal)),
            match_score: None,
            source: SuggestionSource::Goal,
        },
        GoalCategory::Business if target > BUSINESS_DEDICATED_ABOVE => ProductSuggestion {
            product_id: "musharaka_business".to_string(),
            name: "Мушарака Бизнес".to_string(),
            product_type: ProductType::Investment,
            description: format!(
                "Совместное предпринимательство для бизнеса с бюджетом {:.0} ₸ и разделением прибыли.",
                target
            ),
            features: strings(&[
                "Совместное владение",
                "Разделение рисков",
                "Профессиональная поддержка",
            ]),
            min_amount: Some(500_000.0),
            max_amount: Some(50_000_000.0),
            estimated_monthly: Some(estimated_monthly(goal)),
            match_score: None,
            source: SuggestionSource::Goal,
        },
        GoalCategory::Hajj => ProductSuggestion {
            product_id: "hajj_savings".to_string(),
            name: "Накопление на Хадж".to_string(),
            product_type: ProductType::Special,
            description: format!(
                "Целевой счет для накопления {:.0} ₸ на Хадж с духовным сопровождением.",
                target
            ),
            features: strings(&[
                "Целевой счет",
                "Консультации по Хаджу",
                "Гибкий график накоплений",
            ]),
            min_amount: Some(50_000.0),
            max_amount: Some(target),
            estimated_monthly: Some(estimated_monthly(goal)),
            match_score: None,
            source: SuggestionSource::Goal,
        },
        _ => return None,
    };
    Some(suggestion)
}

//
// ================= Tests =================
//
