//! REST API server for the advisor
//!
//! Thin axum layer: decode, call the advisor, wrap the result in the
//! response envelope.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use uuid::Uuid;

use crate::advisor::{
    Advisor, ChatContext, ChatResponse, FinancialPlan, SpendingAnalysis, TransactionReview,
    VoiceChatResponse, ZakatRequest,
};
use crate::catalog::{self, ApplicationRecord, GoalDescriptor, ProductApplication, ProductFilter};
use crate::error::AdvisorError;
use crate::models::{
    BudgetCategory, FinancialGoal, GoalSummary, InvestmentDescriptor, NewGoal, NewTransaction,
    RiskProfile, UserProfile,
};
use crate::optimizer::{GoalRequirement, SavingsPlan};
use crate::Result;

/// =============================
/// Request Models
/// =============================

fn default_mime_type() -> String {
    "audio/webm".to_string()
}

fn default_language() -> String {
    "ru-RU".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ChatMessageRequest {
    pub user_id: String,
    pub message: String,
    /// Inline profile; the stored profile is used when absent
    #[serde(default)]
    pub profile: Option<UserProfile>,
    #[serde(default)]
    pub goals: Vec<FinancialGoal>,
}

#[derive(Debug, Deserialize)]
pub struct VoiceChatRequest {
    pub user_id: String,
    pub audio_base64: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub profile: Option<UserProfile>,
    #[serde(default)]
    pub goals: Vec<FinancialGoal>,
}

#[derive(Debug, Deserialize)]
pub struct FinancialPlanRequest {
    pub user_id: String,
    #[serde(default)]
    pub profile: Option<UserProfile>,
    #[serde(default)]
    pub goals: Option<Vec<NewGoal>>,
}

#[derive(Debug, Deserialize)]
pub struct SpendingRequest {
    pub user_id: String,
    #[serde(default)]
    pub profile: Option<UserProfile>,
    #[serde(default)]
    pub transactions: Option<Vec<NewTransaction>>,
}

#[derive(Debug, Deserialize)]
pub struct BudgetRequest {
    pub monthly_income: f64,
    #[serde(default)]
    pub current_spending: BTreeMap<BudgetCategory, f64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGoalRequest {
    pub user_id: String,
    #[serde(flatten)]
    pub goal: NewGoal,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub goals: Vec<GoalRequirement>,
    pub available_savings: f64,
}

#[derive(Debug, Deserialize)]
pub struct RecordTransactionRequest {
    pub user_id: String,
    #[serde(flatten)]
    pub transaction: NewTransaction,
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub risk_profile: RiskProfile,
    #[serde(default)]
    pub monthly_income: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub product_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CalculateRequest {
    pub amount: f64,
    #[serde(default)]
    pub timeline_months: Option<u32>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Offending field for validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            field: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String, field: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            field,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiReply = (StatusCode, Json<ApiResponse>);

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub advisor: Arc<Advisor>,
}

impl ApiState {
    fn reply<T: Serialize>(&self, result: Result<T>) -> ApiReply {
        match result {
            Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))),
            Err(e) => self.failure(e),
        }
    }

    fn failure(&self, e: AdvisorError) -> ApiReply {
        let status = match &e {
            AdvisorError::Validation { .. } => StatusCode::BAD_REQUEST,
            AdvisorError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => {
                error!(error = %e, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let expose = self.advisor.config().expose_error_details();
        (
            status,
            Json(ApiResponse::error(
                e.public_message(expose),
                e.field().map(str::to_string),
            )),
        )
    }
}

/// Malformed bodies are answered in the envelope, not axum's plain text
fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> std::result::Result<T, ApiReply> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(rejection.body_text(), None)),
        )
    })
}

fn query<T>(params: std::result::Result<Query<T>, QueryRejection>) -> std::result::Result<T, ApiReply> {
    params.map(|Query(value)| value).map_err(|rejection| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(rejection.body_text(), None)),
        )
    })
}

/// =============================
/// Helpers: user ids
/// =============================

fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

/// Client user ids are free-form; non-UUIDs map to a stable UUID
pub fn user_uuid(user_id: &str) -> Result<Uuid> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(AdvisorError::validation("user_id", "must not be empty"));
    }
    Ok(Uuid::parse_str(trimmed).unwrap_or_else(|_| stable_uuid_from_string(trimmed)))
}

fn parse_goal_id(goal_id: &str) -> Result<Uuid> {
    Uuid::parse_str(goal_id).map_err(|_| AdvisorError::validation("goal_id", "must be a UUID"))
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoints
/// =============================

async fn chat_message(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<ChatMessageRequest>, JsonRejection>,
) -> ApiReply {
    let req = match body(payload) {
        Ok(req) => req,
        Err(reply) => return reply,
    };

    let result: Result<ChatResponse> = async {
        let user_id = user_uuid(&req.user_id)?;
        match req.profile {
            Some(profile) => {
                let context = ChatContext {
                    profile,
                    goals: req.goals,
                };
                state.advisor.chat(user_id, &req.message, &context).await
            }
            None => state.advisor.chat_stored(user_id, &req.message).await,
        }
    }
    .await;

    state.reply(result)
}

async fn voice_chat(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<VoiceChatRequest>, JsonRejection>,
) -> ApiReply {
    let req = match body(payload) {
        Ok(req) => req,
        Err(reply) => return reply,
    };

    let result: Result<VoiceChatResponse> = async {
        let user_id = user_uuid(&req.user_id)?;
        let audio = STANDARD
            .decode(req.audio_base64.trim())
            .map_err(|_| AdvisorError::validation("audio_base64", "must be valid base64"))?;
        if audio.is_empty() {
            return Err(AdvisorError::validation("audio_base64", "must not be empty"));
        }
        info!(user_id = %user_id, bytes = audio.len(), mime_type = %req.mime_type, "Voice message received");

        let context = req.profile.map(|profile| ChatContext {
            profile,
            goals: req.goals,
        });
        state
            .advisor
            .voice_chat(user_id, &audio, &req.mime_type, &req.language, context.as_ref())
            .await
    }
    .await;

    state.reply(result)
}

async fn financial_plan(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<FinancialPlanRequest>, JsonRejection>,
) -> ApiReply {
    let req = match body(payload) {
        Ok(req) => req,
        Err(reply) => return reply,
    };

    let result: Result<FinancialPlan> = async {
        let user_id = user_uuid(&req.user_id)?;
        let profile = match req.profile {
            Some(profile) => profile,
            None => state.advisor.load_profile(user_id).await?,
        };
        match req.goals {
            Some(goals) => state.advisor.financial_plan_for(user_id, &profile, goals).await,
            None => {
                let goals = state.advisor.store().load_goals(user_id).await?;
                state.advisor.financial_plan(user_id, &profile, &goals).await
            }
        }
    }
    .await;

    state.reply(result)
}

/// =============================
/// Analysis Endpoints
/// =============================

async fn analyze_spending(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<SpendingRequest>, JsonRejection>,
) -> ApiReply {
    let req = match body(payload) {
        Ok(req) => req,
        Err(reply) => return reply,
    };

    let result: Result<SpendingAnalysis> = async {
        let user_id = user_uuid(&req.user_id)?;
        match req.profile {
            Some(profile) => state
                .advisor
                .analyze_spending(&profile, req.transactions.unwrap_or_default()),
            None => state.advisor.analyze_stored_spending(user_id).await,
        }
    }
    .await;

    state.reply(result)
}

async fn validate_transaction(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<NewTransaction>, JsonRejection>,
) -> ApiReply {
    match body(payload) {
        Ok(tx) => state.reply(state.advisor.validate_transaction(&tx)),
        Err(reply) => reply,
    }
}

async fn validate_investment(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<InvestmentDescriptor>, JsonRejection>,
) -> ApiReply {
    match body(payload) {
        Ok(investment) => state.reply(state.advisor.validate_investment(&investment)),
        Err(reply) => reply,
    }
}

async fn zakat(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<ZakatRequest>, JsonRejection>,
) -> ApiReply {
    match body(payload) {
        Ok(req) => state.reply(state.advisor.assess_zakat(&req)),
        Err(reply) => reply,
    }
}

async fn budget(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<BudgetRequest>, JsonRejection>,
) -> ApiReply {
    let req = match body(payload) {
        Ok(req) => req,
        Err(reply) => return reply,
    };

    let result: Result<serde_json::Value> = (|| {
        if !req.monthly_income.is_finite() || req.monthly_income < 0.0 {
            return Err(AdvisorError::validation("monthly_income", "must be non-negative"));
        }
        let allocator = state.advisor.budget();
        let adjustments = if req.current_spending.is_empty() {
            Vec::new()
        } else {
            allocator.recommend_adjustments(req.monthly_income, &req.current_spending)
        };
        Ok(serde_json::json!({
            "budget": allocator.generate_budget(req.monthly_income),
            "adjustments": adjustments,
        }))
    })();

    state.reply(result)
}

/// =============================
/// Profile & Goal Endpoints
/// =============================

async fn put_profile(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    payload: std::result::Result<Json<UserProfile>, JsonRejection>,
) -> ApiReply {
    let profile = match body(payload) {
        Ok(profile) => profile,
        Err(reply) => return reply,
    };

    let result: Result<UserProfile> = async {
        let user_id = user_uuid(&user_id)?;
        state.advisor.save_profile(user_id, &profile).await?;
        Ok(profile)
    }
    .await;

    state.reply(result)
}

async fn get_profile(State(state): State<ApiState>, Path(user_id): Path<String>) -> ApiReply {
    let result: Result<UserProfile> = async {
        let user_id = user_uuid(&user_id)?;
        state.advisor.load_profile(user_id).await
    }
    .await;

    state.reply(result)
}

async fn create_goal(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<CreateGoalRequest>, JsonRejection>,
) -> ApiReply {
    let req = match body(payload) {
        Ok(req) => req,
        Err(reply) => return reply,
    };

    let result: Result<GoalSummary> = async {
        let user_id = user_uuid(&req.user_id)?;
        state.advisor.create_goal(user_id, req.goal).await
    }
    .await;

    state.reply(result)
}

async fn list_goals(State(state): State<ApiState>, Path(user_id): Path<String>) -> ApiReply {
    let result: Result<Vec<GoalSummary>> = async {
        let user_id = user_uuid(&user_id)?;
        state.advisor.list_goals(user_id).await
    }
    .await;

    state.reply(result)
}

async fn get_goal(
    State(state): State<ApiState>,
    Path((user_id, goal_id)): Path<(String, String)>,
) -> ApiReply {
    let result: Result<GoalSummary> = async {
        let user_id = user_uuid(&user_id)?;
        let goal_id = parse_goal_id(&goal_id)?;
        state.advisor.get_goal(user_id, goal_id).await
    }
    .await;

    state.reply(result)
}

async fn deposit(
    State(state): State<ApiState>,
    Path((user_id, goal_id)): Path<(String, String)>,
    payload: std::result::Result<Json<DepositRequest>, JsonRejection>,
) -> ApiReply {
    let req = match body(payload) {
        Ok(req) => req,
        Err(reply) => return reply,
    };

    let result: Result<GoalSummary> = async {
        let user_id = user_uuid(&user_id)?;
        let goal_id = parse_goal_id(&goal_id)?;
        state.advisor.deposit(user_id, goal_id, req.amount).await
    }
    .await;

    state.reply(result)
}

async fn optimize_goals(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<OptimizeRequest>, JsonRejection>,
) -> ApiReply {
    let req = match body(payload) {
        Ok(req) => req,
        Err(reply) => return reply,
    };

    let result: Result<SavingsPlan> = (|| {
        if !req.available_savings.is_finite() || req.available_savings < 0.0 {
            return Err(AdvisorError::validation("available_savings", "must be non-negative"));
        }
        for (i, goal) in req.goals.iter().enumerate() {
            if !goal.monthly_required.is_finite() || goal.monthly_required < 0.0 {
                return Err(AdvisorError::validation(
                    format!("goals[{}].monthly_required", i),
                    "must be non-negative",
                ));
            }
        }
        Ok(state.advisor.optimizer().optimize(&req.goals, req.available_savings))
    })();

    state.reply(result)
}

async fn record_transaction(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<RecordTransactionRequest>, JsonRejection>,
) -> ApiReply {
    let req = match body(payload) {
        Ok(req) => req,
        Err(reply) => return reply,
    };

    let result: Result<TransactionReview> = async {
        let user_id = user_uuid(&req.user_id)?;
        state.advisor.record_transaction(user_id, req.transaction).await
    }
    .await;

    state.reply(result)
}

/// =============================
/// Product Endpoints
/// =============================

async fn list_products(
    State(state): State<ApiState>,
    params: std::result::Result<Query<ProductFilter>, QueryRejection>,
) -> ApiReply {
    match query(params) {
        Ok(filter) => state.reply(Ok(catalog::browse(&filter))),
        Err(reply) => reply,
    }
}

async fn product_types(State(state): State<ApiState>) -> ApiReply {
    state.reply(Ok(catalog::product_types()))
}

async fn sharia_principles(State(state): State<ApiState>) -> ApiReply {
    state.reply(Ok(catalog::sharia_principles()))
}

async fn get_product(State(state): State<ApiState>, Path(id): Path<String>) -> ApiReply {
    state.reply(catalog::get_product(&id))
}

async fn recommend_products(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<RecommendRequest>, JsonRejection>,
) -> ApiReply {
    let req = match body(payload) {
        Ok(req) => req,
        Err(reply) => return reply,
    };

    let goals: Vec<GoalDescriptor> = req.goals.iter().map(|g| GoalDescriptor::from_term(g)).collect();
    let ranked = state
        .advisor
        .matcher()
        .recommend(&goals, req.risk_profile, req.monthly_income);
    state.reply(Ok(ranked))
}

async fn compare_products(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<CompareRequest>, JsonRejection>,
) -> ApiReply {
    match body(payload) {
        Ok(req) => state.reply(catalog::compare(&req.product_ids)),
        Err(reply) => reply,
    }
}

async fn apply_for_product(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<ProductApplication>, JsonRejection>,
) -> ApiReply {
    let application = match body(payload) {
        Ok(application) => application,
        Err(reply) => return reply,
    };

    let result: Result<ApplicationRecord> = async {
        let user_id = user_uuid(&application.user_id)?;
        state.advisor.apply_for_product(user_id, application).await
    }
    .await;

    state.reply(result)
}

async fn list_applications(State(state): State<ApiState>, Path(user_id): Path<String>) -> ApiReply {
    let result: Result<Vec<ApplicationRecord>> = async {
        let user_id = user_uuid(&user_id)?;
        state.advisor.applications(user_id).await
    }
    .await;

    state.reply(result)
}

async fn calculate_terms(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<CalculateRequest>, JsonRejection>,
) -> ApiReply {
    let req = match body(payload) {
        Ok(req) => req,
        Err(reply) => return reply,
    };

    let result = catalog::get_product(&id)
        .and_then(|product| catalog::calculate_terms(product, req.amount, req.timeline_months));
    state.reply(result)
}

/// =============================
/// Router
/// =============================

pub fn create_router(advisor: Arc<Advisor>) -> Router {
    let state = ApiState { advisor };

    Router::new()
        .route("/health", get(health))
        // chat
        .route("/api/v1/chat/message", post(chat_message))
        .route("/api/v1/chat/voice", post(voice_chat))
        .route("/api/v1/chat/financial-plan", post(financial_plan))
        // analysis
        .route("/api/v1/analysis/spending", post(analyze_spending))
        .route("/api/v1/analysis/validate-transaction", post(validate_transaction))
        .route("/api/v1/analysis/validate-investment", post(validate_investment))
        .route("/api/v1/analysis/zakat", post(zakat))
        .route("/api/v1/analysis/budget", post(budget))
        // profile & goals
        .route("/api/v1/profile/:user_id", get(get_profile).put(put_profile))
        .route("/api/v1/goals", post(create_goal))
        .route("/api/v1/goals/optimize", post(optimize_goals))
        .route("/api/v1/goals/:user_id", get(list_goals))
        .route("/api/v1/goals/:user_id/:goal_id", get(get_goal))
        .route("/api/v1/goals/:user_id/:goal_id/deposit", post(deposit))
        .route("/api/v1/transactions", post(record_transaction))
        // products
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/types", get(product_types))
        .route("/api/v1/products/principles", get(sharia_principles))
        .route("/api/v1/products/recommend", post(recommend_products))
        .route("/api/v1/products/compare", post(compare_products))
        .route("/api/v1/products/apply", post(apply_for_product))
        .route("/api/v1/products/applications/:user_id", get(list_applications))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/products/:id/calculate", post(calculate_terms))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(advisor: Arc<Advisor>, port: u16) -> Result<()> {
    let router = create_router(advisor);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
