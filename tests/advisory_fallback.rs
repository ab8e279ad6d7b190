use async_trait::async_trait;
use islamic_finance_advisor::{
    advisor::{strategies::NarrativeSource, ChatContext},
    models::{
        FinancialGoal, GoalCategory, IslamicImportance, IslamicKnowledge, NewGoal, Priority,
        RiskProfile, UserProfile,
    },
    remote::{PromptMessage, TextModel, Transcriber, Transcription},
    store::InMemoryStore,
    Advisor, AdvisorConfig, AdvisorError, Intent, Result,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_test::assert_ok;
use uuid::Uuid;

/// Remote model that is always down
#[derive(Default)]
struct FailingModel {
    calls: AtomicUsize,
}

#[async_trait]
impl TextModel for FailingModel {
    async fn complete(&self, _messages: &[PromptMessage], _json_mode: bool) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AdvisorError::RemoteService("503 Service Unavailable".to_string()))
    }
}

struct FailingTranscriber;

#[async_trait]
impl Transcriber for FailingTranscriber {
    async fn transcribe(&self, _: &[u8], _: &str, _: &str) -> Result<Transcription> {
        Err(AdvisorError::RemoteService("connection reset".to_string()))
    }
}

fn context(goals: Vec<FinancialGoal>) -> ChatContext {
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
        goals,
    }
}

fn housing_goal() -> FinancialGoal {
    FinancialGoal::new(NewGoal {
        goal_name: "Покупка квартиры".to_string(),
        target_amount: 5_000_000.0,
        current_amount: 500_000.0,
        timeline_months: 60,
        category: GoalCategory::Housing,
        priority: Priority::High,
        islamic_importance: IslamicImportance::Mubah,
    })
}

#[tokio::test]
async fn test_failing_remote_model_never_surfaces() {
    let model = Arc::new(FailingModel::default());
    let advisor = Advisor::new(
        Arc::new(AdvisorConfig::default()),
        Arc::new(InMemoryStore::new()),
    )
    .with_text_model(model.clone());

    let messages = [
        "Привет!",
        "Как накопить на квартиру?",
        "Дай совет по инвестициям",
        "Сколько платить закят?",
        "Помоги с бюджетом",
        "Я много трачу из-за стресса",
        "что-то совсем другое",
    ];

    let user_id = Uuid::new_v4();
    let ctx = context(vec![housing_goal()]);
    for message in messages {
        let reply = assert_ok!(advisor.chat(user_id, message, &ctx).await);
        assert_eq!(reply.source, NarrativeSource::Template);
        assert!(!reply.response.trim().is_empty(), "empty narrative for {}", message);
        assert!(!reply.recommendations.is_empty());
        assert!(!reply.suggested_products.is_empty());
    }

    assert_eq!(model.calls.load(Ordering::SeqCst), messages.len());
}

#[tokio::test]
async fn test_fallback_without_goals_still_suggests_products() {
    let advisor = Advisor::new(
        Arc::new(AdvisorConfig::default()),
        Arc::new(InMemoryStore::new()),
    )
    .with_text_model(Arc::new(FailingModel::default()));

    let reply = assert_ok!(advisor.chat(Uuid::new_v4(), "общий вопрос", &context(vec![])).await);
    assert_eq!(reply.intent, Intent::General);
    assert_eq!(reply.suggested_products[0].product_id, "mudaraba_savings");
}

#[tokio::test]
async fn test_financial_plan_survives_remote_failure() {
    let advisor = Advisor::new(
        Arc::new(AdvisorConfig::default()),
        Arc::new(InMemoryStore::new()),
    )
    .with_text_model(Arc::new(FailingModel::default()));

    let ctx = context(vec![housing_goal()]);
    let plan = assert_ok!(
        advisor
            .financial_plan(Uuid::new_v4(), &ctx.profile, &ctx.goals)
            .await
    );
    assert_eq!(plan.source, NarrativeSource::Template);
    assert!(!plan.advice.is_empty());
    assert!(plan.savings_plan.feasible);
    assert!(plan
        .islamic_products
        .iter()
        .any(|p| p.product_id == "murabaha_housing"));
}

#[tokio::test]
async fn test_failing_transcriber_yields_canned_reply() {
    let advisor = Advisor::new(
        Arc::new(AdvisorConfig::default()),
        Arc::new(InMemoryStore::new()),
    )
    .with_transcriber(Arc::new(FailingTranscriber));

    let ctx = context(vec![]);
    let reply = assert_ok!(
        advisor
            .voice_chat(Uuid::new_v4(), &[1, 2, 3], "audio/webm", "ru-RU", Some(&ctx))
            .await
    );
    assert!(reply.transcript.is_none());
    assert!(!reply.reply.response.is_empty());
    assert!(!reply.reply.suggested_products.is_empty());
}

#[tokio::test]
async fn test_failing_transcriber_without_profile_still_suggests_savings() {
    let advisor = Advisor::new(
        Arc::new(AdvisorConfig::default()),
        Arc::new(InMemoryStore::new()),
    )
    .with_transcriber(Arc::new(FailingTranscriber));

    let reply = assert_ok!(
        advisor
            .voice_chat(Uuid::new_v4(), &[1, 2, 3], "audio/webm", "ru-RU", None)
            .await
    );
    assert!(reply.transcript.is_none());
    assert_eq!(reply.reply.suggested_products[0].product_id, "mudaraba_savings");
}
