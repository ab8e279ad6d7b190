use islamic_finance_advisor::{
    advisor::ChatContext,
    models::{
        FinancialGoal, GoalCategory, IslamicImportance, IslamicKnowledge, NewGoal,
        NewTransaction, Priority, RiskProfile, TransactionType, UserProfile,
    },
    store::InMemoryStore,
    Advisor, AdvisorConfig,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

fn sample_profile() -> UserProfile {
    UserProfile {
        name: Some("Асан".to_string()),
        monthly_income: 300_000.0,
        monthly_expenses: 200_000.0,
        age: 28,
        risk_profile: RiskProfile::Moderate,
        islamic_knowledge: IslamicKnowledge::Intermediate,
        family_size: 1,
        currency: "KZT".to_string(),
    }
}

fn sample_goals() -> Vec<FinancialGoal> {
    vec![
        FinancialGoal::new(NewGoal {
            goal_name: "Покупка квартиры".to_string(),
            target_amount: 5_000_000.0,
            current_amount: 500_000.0,
            timeline_months: 60,
            category: GoalCategory::Housing,
            priority: Priority::High,
            islamic_importance: IslamicImportance::Mubah,
        }),
        FinancialGoal::new(NewGoal {
            goal_name: "Хадж".to_string(),
            target_amount: 1_500_000.0,
            current_amount: 200_000.0,
            timeline_months: 24,
            category: GoalCategory::Hajj,
            priority: Priority::Medium,
            islamic_importance: IslamicImportance::Fard,
        }),
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    info!("Islamic Finance Advisor demo starting");

    let config = Arc::new(AdvisorConfig::from_env()?);
    let advisor = Advisor::from_config(config, Arc::new(InMemoryStore::new()))?;

    let user_id = Uuid::new_v4();
    let context = ChatContext {
        profile: sample_profile(),
        goals: sample_goals(),
    };

    let message = "Как мне накопить на квартиру и хадж одновременно?";
    info!(user_id = %user_id, query = message, "Running advisory chat");

    let reply = advisor.chat(user_id, message, &context).await?;
    println!("\n=== ADVICE ({:?}, {}) ===", reply.source, reply.intent);
    println!("{}", reply.response);
    println!("\nRecommendations:");
    for (i, rec) in reply.recommendations.iter().enumerate() {
        println!("  {}: {}", i + 1, rec);
    }
    println!("\nSuggested products:");
    for product in &reply.suggested_products {
        println!("  - {} ({})", product.name, product.product_id);
    }

    let plan = advisor
        .financial_plan(user_id, &context.profile, &context.goals)
        .await?;
    println!("\n=== SAVINGS PLAN ===");
    for allocation in &plan.savings_plan.allocations {
        println!(
            "  {} [{}]: {:.0} of {:.0}",
            allocation.goal_name, allocation.priority, allocation.allocated, allocation.required
        );
    }
    println!("Feasible: {}", plan.savings_plan.feasible);

    let verdict = advisor.validate_transaction(&NewTransaction {
        amount: 15_000.0,
        category: "entertainment".to_string(),
        description: "casino night".to_string(),
        transaction_type: TransactionType::Expense,
    })?;
    println!("\n=== COMPLIANCE ===");
    println!("Compliant: {}", verdict.is_compliant);
    for issue in &verdict.issues {
        println!("  ! {}", issue);
    }
    println!("Context hash: {}", plan.context_hash);

    Ok(())
}
