//! Advisory orchestrator
//!
//! PROFILE → CONTEXT BUNDLE → REMOTE NARRATIVE? → FALLBACK → PRODUCTS
//!
//! Combines the compliance classifier, metrics engine, budget allocator,
//! catalog matcher and savings optimizer with the remote text model.
//! Remote failures never surface to the caller.

pub mod narrative;
pub mod strategies;

use crate::budget::{self, BudgetAllocator, BudgetRecommendation};
use crate::catalog::{ApplicationRecord, ProductApplication, ProductCatalogMatcher, ProductSuggestion};
use crate::classifier::{Intent, IntentClassifier};
use crate::compliance::{create_default_classifier, ComplianceClassifier, ComplianceLimits, ZakatAssessment};
use crate::config::AdvisorConfig;
use crate::error::AdvisorError;
use crate::gemini::GeminiClient;
use crate::memory::ConversationMemory;
use crate::metrics::{self, FinancialMetricsEngine, SpendingPattern, ZakatPeriod};
use crate::models::{
    BudgetCategory, ComplianceVerdict, FinancialGoal, FinancialMetrics, GoalSummary, InvestmentDescriptor,
    NewGoal, NewTransaction, RiskProfile, Transaction, UserProfile,
};
use crate::optimizer::{GoalRequirement, GoalSavingsOptimizer, SavingsPlan};
use crate::remote::{PromptMessage, TextModel, Transcriber, Transcription};
use crate::store::AdvisorStore;
use crate::{catalog, Result};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use strategies::{default_strategies, Narrative, NarrativeInput, NarrativeSource, NarrativeStrategy};

const SUGGESTED_PRODUCTS: usize = 3;

//
// ================= Context Bundle =================
//

/// Numeric context handed to the remote model and the templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
    pub metrics: FinancialMetrics,
    pub zakat_monthly: f64,
    pub zakat_annual: f64,
    pub goals: Vec<GoalSummary>,
    pub savings_plan: SavingsPlan,
}

impl ContextBundle {
    /// SHA-256 over the serialized bundle, streamed into the hasher
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();

        if serde_json::to_writer(&mut HashWriter(&mut hasher), self).is_err() {
            return String::new();
        }

        hex::encode(hasher.finalize())
    }
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

//
// ================= Requests & Results =================
//

/// Profile and goals a chat turn is answered against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatContext {
    pub profile: UserProfile,
    #[serde(default)]
    pub goals: Vec<FinancialGoal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub recommendations: Vec<String>,
    pub suggested_products: Vec<ProductSuggestion>,
    pub intent: Intent,
    pub source: NarrativeSource,
    pub context_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceChatResponse {
    pub transcript: Option<String>,
    pub reply: ChatResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyPlan {
    pub essential_spending: f64,
    pub current_expenses: f64,
    pub savings: f64,
    pub investments: f64,
    pub charity: f64,
    pub personal_development: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialPlan {
    pub monthly_plan: MonthlyPlan,
    pub metrics: FinancialMetrics,
    pub goals: Vec<GoalSummary>,
    pub savings_plan: SavingsPlan,
    pub islamic_products: Vec<ProductSuggestion>,
    pub recommendations: Vec<String>,
    pub risk_assessment: RiskProfile,
    pub timeline_analysis: String,
    pub advice: String,
    pub source: NarrativeSource,
    pub context_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionReview {
    pub transaction: Transaction,
    pub verdict: ComplianceVerdict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingAnalysis {
    pub metrics: FinancialMetrics,
    pub spending_pattern: SpendingPattern,
    pub budget_adjustments: Vec<BudgetRecommendation>,
    pub transactions: Vec<TransactionReview>,
    pub non_compliant_count: usize,
    pub habits_to_improve: Vec<String>,
    pub islamic_recommendations: Vec<String>,
    pub charity_suggestions: Vec<String>,
    pub stress_alternatives: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZakatRequest {
    #[serde(default)]
    pub assets: Vec<f64>,
    #[serde(default)]
    pub monthly_income: Option<f64>,
    #[serde(default)]
    pub period: Option<ZakatPeriod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZakatReport {
    pub assets: ZakatAssessment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub income_zakat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<ZakatPeriod>,
}

//
// ================= Advisor =================
//

pub struct Advisor {
    config: Arc<AdvisorConfig>,
    compliance: ComplianceClassifier,
    metrics: FinancialMetricsEngine,
    budget: BudgetAllocator,
    matcher: ProductCatalogMatcher,
    optimizer: GoalSavingsOptimizer,
    model: Option<Arc<dyn TextModel>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    strategies: Vec<Box<dyn NarrativeStrategy>>,
    store: Arc<dyn AdvisorStore>,
    memory: ConversationMemory,
}

impl Advisor {
    /// Advisor without remote collaborators: template narratives only
    pub fn new(config: Arc<AdvisorConfig>, store: Arc<dyn AdvisorStore>) -> Self {
        let budget = BudgetAllocator::new(config.budget);

        Self {
            compliance: create_default_classifier(ComplianceLimits::from(config.as_ref())),
            metrics: FinancialMetricsEngine::new(budget),
            budget,
            matcher: ProductCatalogMatcher::new(config.financing_income_threshold),
            optimizer: GoalSavingsOptimizer::new(),
            model: None,
            transcriber: None,
            strategies: default_strategies(),
            store,
            memory: ConversationMemory::new(config.history_turns, config.history_max_users),
            config,
        }
    }

    /// Wire Gemini for both text and transcription when an API key is configured
    pub fn from_config(config: Arc<AdvisorConfig>, store: Arc<dyn AdvisorStore>) -> Result<Self> {
        let advisor = Self::new(Arc::clone(&config), store);

        match GeminiClient::from_config(&config)? {
            Some(client) => {
                info!(model = %config.gemini_model, "Remote model enabled");
                let client = Arc::new(client);
                Ok(advisor
                    .with_text_model(client.clone())
                    .with_transcriber(client))
            }
            None => {
                warn!("GEMINI_API_KEY not configured, using template narratives only");
                Ok(advisor)
            }
        }
    }

    pub fn with_text_model(mut self, model: Arc<dyn TextModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn AdvisorStore> {
        &self.store
    }

    pub fn budget(&self) -> &BudgetAllocator {
        &self.budget
    }

    pub fn matcher(&self) -> &ProductCatalogMatcher {
        &self.matcher
    }

    pub fn optimizer(&self) -> &GoalSavingsOptimizer {
        &self.optimizer
    }

    //
    // ---------- Context ----------
    //

    pub fn build_bundle(
        &self,
        profile: &UserProfile,
        goals: &[FinancialGoal],
        transactions: &[Transaction],
    ) -> ContextBundle {
        let metrics = self.metrics.compute_metrics(profile, transactions);

        let requirements: Vec<GoalRequirement> = goals
            .iter()
            .filter(|g| !g.is_completed)
            .map(GoalRequirement::from)
            .collect();
        let savings_plan = self
            .optimizer
            .optimize(&requirements, metrics.monthly_savings.max(0.0));

        ContextBundle {
            zakat_monthly: metrics::zakat(profile.monthly_income, ZakatPeriod::Monthly),
            zakat_annual: metrics::zakat(profile.monthly_income, ZakatPeriod::Annual),
            goals: goals.iter().map(GoalSummary::from).collect(),
            savings_plan,
            metrics,
        }
    }

    /// Remote reply if the model answered in time
    async fn remote_reply(
        &self,
        user_id: Uuid,
        message: &str,
        profile: &UserProfile,
        bundle: &ContextBundle,
    ) -> Option<String> {
        let model = self.model.as_ref()?;

        let bundle_json = match serde_json::to_string_pretty(bundle) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize context bundle: {}", e);
                return None;
            }
        };

        let mut prompt = vec![PromptMessage::system(narrative::system_instruction(
            profile,
            &bundle_json,
        ))];
        prompt.extend(self.memory.recent_prompt(user_id).await);
        prompt.push(PromptMessage::user(message));

        let started = Instant::now();
        match tokio::time::timeout(self.config.remote_timeout(), model.complete(&prompt, true)).await
        {
            Ok(Ok(text)) => {
                debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Remote narrative received"
                );
                Some(text)
            }
            Ok(Err(e)) if e.is_recoverable() => {
                warn!(error = %e, "Remote model failed, falling back");
                None
            }
            Ok(Err(e)) => {
                error!(error = %e, "Remote model returned an unexpected error, falling back");
                None
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.remote_timeout_secs,
                    "Remote model timed out, falling back"
                );
                None
            }
        }
    }

    fn compose(&self, input: &NarrativeInput<'_>) -> Narrative {
        for strategy in &self.strategies {
            if let Some(narrative) = strategy.compose(input) {
                debug!(strategy = strategy.name(), "Narrative composed");
                return narrative;
            }
            debug!(strategy = strategy.name(), "Narrative strategy declined");
        }

        // the template strategy never declines; this covers a custom chain without one
        strategies::Template
            .compose(input)
            .unwrap_or_else(|| Narrative {
                response: narrative::render(input.intent, input.profile, input.goals, input.bundle),
                recommendations: Vec::new(),
                source: NarrativeSource::Template,
            })
    }

    async fn narrate(
        &self,
        user_id: Uuid,
        message: &str,
        intent: Intent,
        profile: &UserProfile,
        goals: &[FinancialGoal],
        bundle: &ContextBundle,
    ) -> Narrative {
        let raw = self.remote_reply(user_id, message, profile, bundle).await;
        self.compose(&NarrativeInput {
            raw: raw.as_deref(),
            intent,
            profile,
            goals,
            bundle,
        })
    }

    //
    // ---------- Chat ----------
    //

    pub async fn chat(&self, user_id: Uuid, message: &str, context: &ChatContext) -> Result<ChatResponse> {
        validate_message(message)?;
        context.profile.validate()?;
        for (i, goal) in context.goals.iter().enumerate() {
            goal.validate(&format!("goals[{}]", i))?;
        }

        let intent = IntentClassifier::classify(message);
        let bundle = self.build_bundle(&context.profile, &context.goals, &[]);

        info!(user_id = %user_id, intent = %intent, "Chat turn");

        let narrative = self
            .narrate(user_id, message, intent, &context.profile, &context.goals, &bundle)
            .await;

        self.memory
            .record_exchange(user_id, message, &narrative.response, intent)
            .await;

        let mut suggested_products = self.matcher.suggest(
            &context.goals,
            context.profile.risk_profile,
            context.profile.monthly_income,
        );
        suggested_products.truncate(SUGGESTED_PRODUCTS);

        Ok(ChatResponse {
            response: narrative.response,
            recommendations: narrative.recommendations,
            suggested_products,
            intent,
            source: narrative.source,
            context_hash: bundle.hash(),
        })
    }

    /// Chat against the stored profile and goals
    pub async fn chat_stored(&self, user_id: Uuid, message: &str) -> Result<ChatResponse> {
        let context = self.stored_context(user_id).await?;
        self.chat(user_id, message, &context).await
    }

    async fn stored_context(&self, user_id: Uuid) -> Result<ChatContext> {
        let profile = self.load_profile(user_id).await?;
        let goals = self.store.load_goals(user_id).await?;
        Ok(ChatContext { profile, goals })
    }

    /// Transcribe then chat. Unintelligible or untranscribable audio yields a
    /// canned reply rather than an error.
    pub async fn voice_chat(
        &self,
        user_id: Uuid,
        audio: &[u8],
        mime_type: &str,
        language: &str,
        context: Option<&ChatContext>,
    ) -> Result<VoiceChatResponse> {
        let transcription = match &self.transcriber {
            Some(transcriber) => {
                match tokio::time::timeout(
                    self.config.remote_timeout(),
                    transcriber.transcribe(audio, mime_type, language),
                )
                .await
                {
                    Ok(Ok(t)) => t,
                    Ok(Err(e)) => {
                        warn!(error = %e, "Transcription failed");
                        Transcription::CouldNotTranscribe
                    }
                    Err(_) => {
                        warn!("Transcription timed out");
                        Transcription::CouldNotTranscribe
                    }
                }
            }
            None => Transcription::CouldNotTranscribe,
        };

        let transcript = match transcription {
            Transcription::Text(text) => text,
            Transcription::CouldNotTranscribe => {
                return Ok(VoiceChatResponse {
                    transcript: None,
                    reply: self.could_not_transcribe(user_id, context).await,
                });
            }
        };

        let reply = match context {
            Some(context) => self.chat(user_id, &transcript, context).await?,
            None => self.chat_stored(user_id, &transcript).await?,
        };

        Ok(VoiceChatResponse {
            transcript: Some(transcript),
            reply,
        })
    }

    async fn could_not_transcribe(&self, user_id: Uuid, context: Option<&ChatContext>) -> ChatResponse {
        let context = match context {
            Some(context) => Some(context.clone()),
            None => self.stored_context(user_id).await.ok(),
        };

        let (suggested_products, context_hash) = match &context {
            Some(ctx) => {
                let mut products = self.matcher.suggest(
                    &ctx.goals,
                    ctx.profile.risk_profile,
                    ctx.profile.monthly_income,
                );
                products.truncate(SUGGESTED_PRODUCTS);
                let hash = self.build_bundle(&ctx.profile, &ctx.goals, &[]).hash();
                (products, hash)
            }
            // no profile to rank against: baseline savings product only
            None => (self.matcher.goal_products(&[], 0.0), String::new()),
        };

        ChatResponse {
            response: narrative::COULD_NOT_TRANSCRIBE_REPLY.to_string(),
            recommendations: Vec::new(),
            suggested_products,
            intent: Intent::General,
            source: NarrativeSource::Template,
            context_hash,
        }
    }

    //
    // ---------- Plans & Analysis ----------
    //

    pub async fn financial_plan(
        &self,
        user_id: Uuid,
        profile: &UserProfile,
        goals: &[FinancialGoal],
    ) -> Result<FinancialPlan> {
        profile.validate()?;
        for (i, goal) in goals.iter().enumerate() {
            let prefix = format!("goals[{}]", i);
            goal.validate(&prefix)?;
            if goal.timeline_months <= 0 {
                return Err(AdvisorError::validation(
                    format!("{}.timeline_months", prefix),
                    "must be positive to build a plan",
                ));
            }
        }

        let bundle = self.build_bundle(profile, goals, &[]);
        let budget = &bundle.metrics.recommended_budget;
        let share = |c: BudgetCategory| budget.get(&c).copied().unwrap_or(0.0);

        let monthly_plan = MonthlyPlan {
            essential_spending: share(BudgetCategory::Essential),
            current_expenses: profile.monthly_expenses,
            savings: share(BudgetCategory::Savings).min(bundle.savings_plan.total_required),
            investments: share(BudgetCategory::Investment),
            charity: share(BudgetCategory::Charity),
            personal_development: share(BudgetCategory::PersonalDevelopment),
        };

        let narrative = self
            .narrate(
                user_id,
                "Составь исламский финансовый план для моих целей",
                Intent::GoalSetting,
                profile,
                goals,
                &bundle,
            )
            .await;

        let mut recommendations = narrative::plan_recommendations(profile, &bundle, goals.len());
        for rec in narrative.recommendations {
            if !recommendations.contains(&rec) {
                recommendations.push(rec);
            }
        }

        info!(
            user_id = %user_id,
            goals = goals.len(),
            feasible = bundle.savings_plan.feasible,
            "Financial plan built"
        );

        Ok(FinancialPlan {
            monthly_plan,
            islamic_products: self
                .matcher
                .suggest(goals, profile.risk_profile, profile.monthly_income),
            recommendations,
            risk_assessment: profile.risk_profile,
            timeline_analysis: narrative::timeline_analysis(
                profile,
                goals,
                bundle.savings_plan.feasible,
            ),
            advice: narrative.response,
            source: narrative.source,
            context_hash: bundle.hash(),
            metrics: bundle.metrics,
            goals: bundle.goals,
            savings_plan: bundle.savings_plan,
        })
    }

    /// Plan for new goal payloads
    pub async fn financial_plan_for(
        &self,
        user_id: Uuid,
        profile: &UserProfile,
        goals: Vec<NewGoal>,
    ) -> Result<FinancialPlan> {
        let goals: Vec<FinancialGoal> = goals.into_iter().map(FinancialGoal::new).collect();
        self.financial_plan(user_id, profile, &goals).await
    }

    pub fn analyze_spending(
        &self,
        profile: &UserProfile,
        transactions: Vec<NewTransaction>,
    ) -> Result<SpendingAnalysis> {
        profile.validate()?;
        for (i, tx) in transactions.iter().enumerate() {
            tx.validate(&format!("transactions[{}]", i))?;
        }

        let reviews: Vec<TransactionReview> = transactions
            .into_iter()
            .map(|tx| {
                let verdict = self.compliance.classify_transaction(&tx);
                TransactionReview {
                    transaction: Transaction::record(tx, &verdict),
                    verdict,
                }
            })
            .collect();
        let recorded: Vec<Transaction> = reviews.iter().map(|r| r.transaction.clone()).collect();

        let metrics = self.metrics.compute_metrics(profile, &recorded);
        let spending_pattern = metrics::analyze_spending(&recorded);
        let budget_adjustments = self.budget.recommend_adjustments(
            profile.monthly_income,
            &budget::current_spending(profile, &recorded),
        );

        let cur = profile.currency_symbol();
        let mut habits_to_improve = Vec::new();
        let essential_target = metrics
            .recommended_budget
            .get(&BudgetCategory::Essential)
            .copied()
            .unwrap_or(0.0);
        if profile.monthly_expenses > essential_target {
            habits_to_improve.push(format!(
                "Сократите расходы на {} {} для баланса",
                narrative::format_money(profile.monthly_expenses - essential_target),
                cur
            ));
        }
        for review in reviews.iter().filter(|r| !r.verdict.is_compliant) {
            habits_to_improve.push(format!(
                "Откажитесь от операций в категории «{}»",
                review.transaction.category
            ));
        }
        habits_to_improve.push("Планируйте крупные покупки согласно исламскому бюджету".to_string());
        habits_to_improve.push("Увеличьте благотворительные взносы до 2.5% от дохода".to_string());

        let non_compliant_count = reviews.iter().filter(|r| !r.verdict.is_compliant).count();
        debug!(
            transactions = reviews.len(),
            non_compliant = non_compliant_count,
            "Spending analyzed"
        );

        Ok(SpendingAnalysis {
            metrics,
            spending_pattern,
            budget_adjustments,
            transactions: reviews,
            non_compliant_count,
            habits_to_improve,
            islamic_recommendations: narrative::islamic_recommendations(profile),
            charity_suggestions: narrative::charity_suggestions(profile),
            stress_alternatives: narrative::stress_alternatives(),
        })
    }

    /// Analyze the stored transactions against the stored profile
    pub async fn analyze_stored_spending(&self, user_id: Uuid) -> Result<SpendingAnalysis> {
        let profile = self.load_profile(user_id).await?;
        let transactions = self
            .store
            .load_transactions(user_id)
            .await?
            .into_iter()
            .map(|t| NewTransaction {
                amount: t.amount,
                category: t.category,
                description: t.description,
                transaction_type: t.transaction_type,
            })
            .collect();
        self.analyze_spending(&profile, transactions)
    }

    //
    // ---------- Compliance ----------
    //

    pub fn validate_transaction(&self, tx: &NewTransaction) -> Result<ComplianceVerdict> {
        tx.validate("")?;
        Ok(self.compliance.classify_transaction(tx))
    }

    pub fn validate_investment(&self, investment: &InvestmentDescriptor) -> Result<ComplianceVerdict> {
        investment.validate()?;
        Ok(self.compliance.classify_investment(investment))
    }

    pub fn assess_zakat(&self, request: &ZakatRequest) -> Result<ZakatReport> {
        for (i, value) in request.assets.iter().enumerate() {
            if !value.is_finite() || *value < 0.0 {
                return Err(AdvisorError::validation(
                    format!("assets[{}]", i),
                    "must be non-negative",
                ));
            }
        }

        let income_zakat = match request.monthly_income {
            Some(income) => {
                if !income.is_finite() || income < 0.0 {
                    return Err(AdvisorError::validation("monthly_income", "must be non-negative"));
                }
                let period = request.period.ok_or_else(|| {
                    AdvisorError::validation("period", "required when monthly_income is given")
                })?;
                Some(metrics::zakat(income, period))
            }
            None => None,
        };

        Ok(ZakatReport {
            assets: self.compliance.assess_zakat(&request.assets),
            income_zakat,
            period: request.period,
        })
    }

    /// Classify and persist a transaction; `is_halal` comes from the verdict
    pub async fn record_transaction(&self, user_id: Uuid, tx: NewTransaction) -> Result<TransactionReview> {
        tx.validate("")?;
        let verdict = self.compliance.classify_transaction(&tx);
        let transaction = Transaction::record(tx, &verdict);
        self.store.record_transaction(user_id, &transaction).await?;

        info!(
            user_id = %user_id,
            transaction_id = %transaction.id,
            is_halal = transaction.is_halal,
            "Transaction recorded"
        );
        Ok(TransactionReview { transaction, verdict })
    }

    //
    // ---------- Profile & Goals ----------
    //

    pub async fn save_profile(&self, user_id: Uuid, profile: &UserProfile) -> Result<()> {
        profile.validate()?;
        self.store.save_profile(user_id, profile).await
    }

    pub async fn load_profile(&self, user_id: Uuid) -> Result<UserProfile> {
        self.store
            .load_profile(user_id)
            .await?
            .ok_or_else(|| AdvisorError::NotFound(format!("profile for user {}", user_id)))
    }

    pub async fn create_goal(&self, user_id: Uuid, goal: NewGoal) -> Result<GoalSummary> {
        let goal = FinancialGoal::new(goal);
        goal.validate("")?;
        self.store.save_goal(user_id, &goal).await?;

        info!(user_id = %user_id, goal_id = %goal.id, category = %goal.category, "Goal created");
        Ok(GoalSummary::from(&goal))
    }

    pub async fn list_goals(&self, user_id: Uuid) -> Result<Vec<GoalSummary>> {
        let goals = self.store.load_goals(user_id).await?;
        Ok(goals.iter().map(GoalSummary::from).collect())
    }

    pub async fn get_goal(&self, user_id: Uuid, goal_id: Uuid) -> Result<GoalSummary> {
        self.store
            .load_goals(user_id)
            .await?
            .iter()
            .find(|g| g.id == goal_id)
            .map(GoalSummary::from)
            .ok_or_else(|| AdvisorError::NotFound(format!("goal {}", goal_id)))
    }

    pub async fn deposit(&self, user_id: Uuid, goal_id: Uuid, amount: f64) -> Result<GoalSummary> {
        let goal = self.store.deposit_to_goal(user_id, goal_id, amount).await?;
        if goal.is_completed {
            info!(user_id = %user_id, goal_id = %goal_id, "Goal completed");
        }
        Ok(GoalSummary::from(&goal))
    }

    //
    // ---------- Products ----------
    //

    pub async fn apply_for_product(
        &self,
        user_id: Uuid,
        application: ProductApplication,
    ) -> Result<ApplicationRecord> {
        let product = catalog::get_product(&application.product_id)?;
        let record = application.into_record(product)?;
        self.store.save_application(user_id, &record).await?;

        info!(
            user_id = %user_id,
            product_id = %record.product_id,
            application_id = %record.application_id,
            "Product application submitted"
        );
        Ok(record)
    }

    pub async fn applications(&self, user_id: Uuid) -> Result<Vec<ApplicationRecord>> {
        self.store.load_applications(user_id).await
    }
}

fn validate_message(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(AdvisorError::validation("message", "must not be empty"));
    }
    Ok(())
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GoalCategory, IslamicImportance, IslamicKnowledge, Priority, TransactionType};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedModel(&'static str);

    #[async_trait]
    impl TextModel for FixedModel {
        async fn complete(&self, _messages: &[PromptMessage], _json_mode: bool) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct SlowModel;

    #[async_trait]
    impl TextModel for SlowModel {
        async fn complete(&self, _messages: &[PromptMessage], _json_mode: bool) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".to_string())
        }
    }

    struct SilentTranscriber;

    #[async_trait]
    impl Transcriber for SilentTranscriber {
        async fn transcribe(&self, _: &[u8], _: &str, _: &str) -> Result<Transcription> {
            Ok(Transcription::CouldNotTranscribe)
        }
    }

    struct EchoTranscriber;

    #[async_trait]
    impl Transcriber for EchoTranscriber {
        async fn transcribe(&self, audio: &[u8], _: &str, _: &str) -> Result<Transcription> {
            Ok(Transcription::Text(String::from_utf8_lossy(audio).to_string()))
        }
    }

    fn advisor() -> Advisor {
        Advisor::new(
            Arc::new(AdvisorConfig::default()),
            Arc::new(InMemoryStore::new()),
        )
    }

    fn context() -> ChatContext {
        let goal = |name: &str, category, target, current, months, priority| {
            FinancialGoal::new(NewGoal {
                goal_name: name.to_string(),
                target_amount: target,
                current_amount: current,
                timeline_months: months,
                category,
                priority,
                islamic_importance: IslamicImportance::Mubah,
            })
        };

        ChatContext {
            profile: UserProfile {
                name: Some("Асан".to_string()),
                monthly_income: 300_000.0,
                monthly_expenses: 200_000.0,
                age: 28,
                risk_profile: RiskProfile::Moderate,
                islamic_knowledge: IslamicKnowledge::Intermediate,
                family_size: 1,
                currency: "KZT".to_string(),
            },
            goals: vec![
                goal("Покупка квартиры", GoalCategory::Housing, 5_000_000.0, 500_000.0, 60, Priority::High),
                goal("Хадж", GoalCategory::Hajj, 1_500_000.0, 200_000.0, 24, Priority::Medium),
            ],
        }
    }

    #[tokio::test]
    async fn test_chat_without_model_uses_template() {
        let reply = advisor()
            .chat(Uuid::new_v4(), "Как накопить на хадж?", &context())
            .await
            .unwrap();

        assert_eq!(reply.source, NarrativeSource::Template);
        assert_eq!(reply.intent, Intent::GoalSetting);
        assert!(reply.response.contains("Асан"));
        assert!(!reply.recommendations.is_empty());
        assert_eq!(reply.suggested_products.len(), 3);
        assert_eq!(reply.suggested_products[0].product_id, "mudaraba_savings");
        assert_eq!(reply.context_hash.len(), 64);
    }

    #[tokio::test]
    async fn test_chat_uses_structured_remote_reply() {
        let advisor = advisor().with_text_model(Arc::new(FixedModel(
            r#"{"response": "Откройте счет Мудараба", "recommendations": ["Откладывайте 75 000 ₸ ежемесячно"]}"#,
        )));
        let reply = advisor
            .chat(Uuid::new_v4(), "Дай совет", &context())
            .await
            .unwrap();

        assert_eq!(reply.source, NarrativeSource::Remote);
        assert_eq!(reply.response, "Откройте счет Мудараба");
        assert_eq!(reply.recommendations.len(), 1);
    }

    #[tokio::test]
    async fn test_chat_falls_back_to_prose_extraction() {
        let advisor = advisor().with_text_model(Arc::new(FixedModel(
            "Рекомендую:\n• Открыть целевой счет на Хадж\n• Автоматизировать переводы",
        )));
        let reply = advisor
            .chat(Uuid::new_v4(), "хадж", &context())
            .await
            .unwrap();

        assert_eq!(reply.source, NarrativeSource::RemoteUnstructured);
        assert_eq!(reply.recommendations[0], "Открыть целевой счет на Хадж");
    }

    #[tokio::test]
    async fn test_broken_json_reply_falls_to_template() {
        let advisor = advisor().with_text_model(Arc::new(FixedModel("{\"response\": ")));
        let reply = advisor
            .chat(Uuid::new_v4(), "бюджет", &context())
            .await
            .unwrap();
        assert_eq!(reply.source, NarrativeSource::Template);
        assert_eq!(reply.intent, Intent::Budgeting);
    }

    #[tokio::test]
    async fn test_remote_timeout_falls_back() {
        let config = AdvisorConfig {
            remote_timeout_secs: 1,
            ..AdvisorConfig::default()
        };
        let advisor = Advisor::new(Arc::new(config), Arc::new(InMemoryStore::new()))
            .with_text_model(Arc::new(SlowModel));
        let reply = advisor
            .chat(Uuid::new_v4(), "закят", &context())
            .await
            .unwrap();
        assert_eq!(reply.source, NarrativeSource::Template);
        assert!(reply.response.contains("90 000"));
    }

    #[tokio::test]
    async fn test_chat_rejects_invalid_goal() {
        let mut ctx = context();
        ctx.goals[1].timeline_months = -1;
        let err = advisor()
            .chat(Uuid::new_v4(), "привет", &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("goals[1].timeline_months"));
    }

    #[tokio::test]
    async fn test_chat_stored_requires_profile() {
        let err = advisor().chat_stored(Uuid::new_v4(), "привет").await.unwrap_err();
        assert!(matches!(err, AdvisorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_voice_could_not_transcribe_is_not_an_error() {
        let advisor = advisor().with_transcriber(Arc::new(SilentTranscriber));
        let ctx = context();
        let reply = advisor
            .voice_chat(Uuid::new_v4(), b"noise", "audio/webm", "ru-RU", Some(&ctx))
            .await
            .unwrap();
        assert!(reply.transcript.is_none());
        assert_eq!(reply.reply.response, narrative::COULD_NOT_TRANSCRIBE_REPLY);
    }

    #[tokio::test]
    async fn test_voice_without_any_profile_offers_baseline_product() {
        let advisor = advisor().with_transcriber(Arc::new(SilentTranscriber));
        let reply = advisor
            .voice_chat(Uuid::new_v4(), b"noise", "audio/webm", "ru-RU", None)
            .await
            .unwrap();
        assert!(reply.transcript.is_none());
        assert_eq!(reply.reply.suggested_products.len(), 1);
        assert_eq!(reply.reply.suggested_products[0].product_id, "mudaraba_savings");
    }

    #[tokio::test]
    async fn test_voice_transcript_is_chatted() {
        let advisor = advisor().with_transcriber(Arc::new(EchoTranscriber));
        let ctx = context();
        let reply = advisor
            .voice_chat(Uuid::new_v4(), "Привет".as_bytes(), "audio/webm", "ru-RU", Some(&ctx))
            .await
            .unwrap();
        assert_eq!(reply.transcript.as_deref(), Some("Привет"));
        assert_eq!(reply.reply.intent, Intent::Greeting);
    }

    #[tokio::test]
    async fn test_financial_plan() {
        let ctx = context();
        let plan = advisor()
            .financial_plan(Uuid::new_v4(), &ctx.profile, &ctx.goals)
            .await
            .unwrap();

        assert_eq!(plan.monthly_plan.essential_spending, 150_000.0);
        assert_eq!(plan.monthly_plan.charity, 7_500.0);
        // 4.5M / 60 + 1.3M / 24 exceeds the 100k monthly surplus
        assert!(!plan.savings_plan.feasible);
        assert_eq!(plan.savings_plan.allocations[0].allocated, 75_000.0);
        assert_eq!(plan.monthly_plan.savings, 60_000.0);
        let ids: Vec<&str> = plan.islamic_products.iter().map(|p| p.product_id.as_str()).collect();
        assert!(ids.contains(&"murabaha_housing"));
        assert!(ids.contains(&"hajj_savings"));
        assert!(plan.recommendations.len() >= 4);
    }

    #[tokio::test]
    async fn test_financial_plan_requires_positive_timeline() {
        let mut ctx = context();
        ctx.goals[0].timeline_months = 0;
        let err = advisor()
            .financial_plan(Uuid::new_v4(), &ctx.profile, &ctx.goals)
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("goals[0].timeline_months"));
    }

    #[test]
    fn test_analyze_spending() {
        let ctx = context();
        let tx = |amount, category: &str, kind| NewTransaction {
            amount,
            category: category.to_string(),
            description: String::new(),
            transaction_type: kind,
        };
        let analysis = advisor()
            .analyze_spending(
                &ctx.profile,
                vec![
                    tx(120_000.0, "housing", TransactionType::Expense),
                    tx(30_000.0, "gambling", TransactionType::Expense),
                    tx(300_000.0, "salary", TransactionType::Income),
                ],
            )
            .unwrap();

        assert_eq!(analysis.non_compliant_count, 1);
        assert!(!analysis.transactions[1].transaction.is_halal);
        assert_eq!(analysis.metrics.essential_spending, 120_000.0);
        assert_eq!(analysis.budget_adjustments.len(), 5);
        assert!(analysis.habits_to_improve.iter().any(|h| h.contains("gambling")));
        assert_eq!(analysis.stress_alternatives.len(), 5);
    }

    #[test]
    fn test_analyze_spending_names_bad_field() {
        let ctx = context();
        let err = advisor()
            .analyze_spending(
                &ctx.profile,
                vec![NewTransaction {
                    amount: -5.0,
                    category: "food".to_string(),
                    description: String::new(),
                    transaction_type: TransactionType::Expense,
                }],
            )
            .unwrap_err();
        assert_eq!(err.field(), Some("transactions[0].amount"));
    }

    #[test]
    fn test_assess_zakat() {
        let report = advisor()
            .assess_zakat(&ZakatRequest {
                assets: vec![50_000.0, 50_000.0],
                monthly_income: Some(300_000.0),
                period: Some(ZakatPeriod::Annual),
            })
            .unwrap();
        assert!(report.assets.zakat_eligible);
        assert_eq!(report.assets.zakat_amount, 2_500.0);
        assert_eq!(report.income_zakat, Some(90_000.0));

        let err = advisor()
            .assess_zakat(&ZakatRequest {
                assets: vec![],
                monthly_income: Some(1.0),
                period: None,
            })
            .unwrap_err();
        assert_eq!(err.field(), Some("period"));
    }

    #[tokio::test]
    async fn test_goal_lifecycle() {
        let advisor = advisor();
        let user = Uuid::new_v4();
        let created = advisor
            .create_goal(
                user,
                NewGoal {
                    goal_name: "Свадьба".to_string(),
                    target_amount: 1_000_000.0,
                    current_amount: 0.0,
                    timeline_months: 10,
                    category: GoalCategory::Marriage,
                    priority: Priority::High,
                    islamic_importance: IslamicImportance::Sunnah,
                },
            )
            .await
            .unwrap();
        assert_eq!(created.monthly_saving, 100_000.0);

        let updated = advisor.deposit(user, created.goal.id, 250_000.0).await.unwrap();
        assert_eq!(updated.progress_percentage, 25.0);
        assert_eq!(advisor.list_goals(user).await.unwrap().len(), 1);
        assert!(advisor.get_goal(user, Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn test_record_transaction_derives_is_halal() {
        let advisor = advisor();
        let user = Uuid::new_v4();
        let review = advisor
            .record_transaction(
                user,
                NewTransaction {
                    amount: 5_000.0,
                    category: "alcohol".to_string(),
                    description: String::new(),
                    transaction_type: TransactionType::Expense,
                },
            )
            .await
            .unwrap();
        assert!(!review.transaction.is_halal);
        assert_eq!(advisor.store().load_transactions(user).await.unwrap().len(), 1);
    }

    #[test]
    fn test_bundle_hash_is_deterministic() {
        let ctx = context();
        let a = advisor();
        let first = a.build_bundle(&ctx.profile, &ctx.goals, &[]);
        let second = a.build_bundle(&ctx.profile, &ctx.goals, &[]);
        assert_eq!(first.hash(), second.hash());
    }
}
