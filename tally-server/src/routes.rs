use crate::session_manager::{SessionError, SessionManager};
use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;
use serde_json::json;
use tally_core::CurrencyType;
use tally_fi::Action;
use tally_serve::{AggregateError, AggregateReport, TargetError, TierError};
use tower_http::cors::{Any, CorsLayer};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("no active session for wallet: {0}")]
    NoSession(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("no default {0} account")]
    NoDefaultAccount(CurrencyType),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Targets(#[from] TargetError),
    #[error(transparent)]
    Tier(#[from] TierError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Session(SessionError::UnknownWallet(_)) => StatusCode::NOT_FOUND,
            ApiError::Session(SessionError::Fixture(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NoSession(_) | ApiError::NoDefaultAccount(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Aggregate(e) => aggregate_status(e),
            ApiError::Targets(TargetError::Resolver(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Targets(TargetError::Aggregate(e)) => aggregate_status(e),
            ApiError::Tier(TierError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Tier(TierError::Network(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Tier(TierError::Cancelled | TierError::Cache(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

fn aggregate_status(error: &AggregateError) -> StatusCode {
    match error {
        AggregateError::InitializationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        AggregateError::AccountNotFound { .. } | AggregateError::UnknownCurrency(_) => {
            StatusCode::NOT_FOUND
        }
        AggregateError::Source(_) => StatusCode::BAD_GATEWAY,
        AggregateError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "Request failed");
        } else {
            tracing::debug!(%status, error = %self, "Request rejected");
        }
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}

fn parse_currency(code: &str) -> Result<CurrencyType, ApiError> {
    code.parse().map_err(ApiError::BadRequest)
}

#[derive(Debug, Deserialize)]
struct AccountsQuery {
    #[serde(default)]
    refresh: bool,
}

#[derive(Debug, Deserialize)]
struct CurrencyAccountsQuery {
    from_cache: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SddQuery {
    #[serde(default)]
    poll: bool,
}

#[derive(Debug, Deserialize)]
struct TargetsRequest {
    address: String,
    currency: CurrencyType,
    action: Action,
}

// GET /wallets/{wallet_id}/accounts
async fn accounts_handler(
    State(manager): State<SessionManager>,
    Path(wallet_id): Path<String>,
    Query(query): Query<AccountsQuery>,
) -> Result<Json<AggregateReport>, ApiError> {
    let session = manager.get_or_create(&wallet_id).await?;
    let report = if query.refresh {
        session.aggregator().fetch_report().await?
    } else {
        session.aggregator().report().await?
    };
    Ok(Json(report))
}

// GET /wallets/{wallet_id}/accounts/{currency}
async fn currency_accounts_handler(
    State(manager): State<SessionManager>,
    Path((wallet_id, currency)): Path<(String, String)>,
    Query(query): Query<CurrencyAccountsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let currency = parse_currency(&currency)?;
    let session = manager.get_or_create(&wallet_id).await?;
    let accounts = session
        .aggregator()
        .accounts_for(currency, query.from_cache.unwrap_or(true))
        .await?;
    Ok(Json(json!({"currency": currency, "accounts": accounts})))
}

// GET /wallets/{wallet_id}/accounts/{currency}/default
async fn default_account_handler(
    State(manager): State<SessionManager>,
    Path((wallet_id, currency)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let currency = parse_currency(&currency)?;
    let session = manager.get_or_create(&wallet_id).await?;
    let account = session
        .aggregator()
        .default_account(currency)
        .await?
        .ok_or(ApiError::NoDefaultAccount(currency))?;
    Ok(Json(account))
}

// POST /wallets/{wallet_id}/targets
async fn targets_handler(
    State(manager): State<SessionManager>,
    Path(wallet_id): Path<String>,
    Json(request): Json<TargetsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = manager.get_or_create(&wallet_id).await?;
    let targets = session
        .targets()
        .targets_from(&request.address, request.currency, request.action)
        .await?;
    Ok(Json(json!({
        "address": request.address,
        "action": request.action,
        "targets": targets,
    })))
}

// GET /wallets/{wallet_id}/tiers
async fn tiers_handler(
    State(manager): State<SessionManager>,
    Path(wallet_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = manager.get_or_create(&wallet_id).await?;
    let tiers = session.tier_gate().tiers().await?;
    Ok(Json(json!({
        "latest_approved_tier": tiers.latest_approved_tier(),
        "tiers": tiers.tiers,
    })))
}

// GET /wallets/{wallet_id}/sdd
async fn sdd_handler(
    State(manager): State<SessionManager>,
    Path(wallet_id): Path<String>,
    Query(query): Query<SddQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session = manager.get_or_create(&wallet_id).await?;
    let gate = session.tier_gate();
    let tier = gate.tiers().await?.latest_approved_tier();
    let eligibility = gate.sdd_eligibility(tier).await;
    let verified = gate.is_sdd_verified(tier, query.poll).await;
    Ok(Json(json!({
        "tier": tier,
        "eligible": eligibility.eligible,
        "verified": verified,
    })))
}

// DELETE /wallets/{wallet_id}/session
async fn logout_handler(
    State(manager): State<SessionManager>,
    Path(wallet_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !manager.remove(&wallet_id).await {
        return Err(ApiError::NoSession(wallet_id));
    }
    Ok((
        StatusCode::OK,
        Json(json!({"message": "Session cleared"})),
    ))
}

pub fn router(manager: SessionManager) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/wallets/{wallet_id}/accounts", get(accounts_handler))
        .route(
            "/wallets/{wallet_id}/accounts/{currency}",
            get(currency_accounts_handler),
        )
        .route(
            "/wallets/{wallet_id}/accounts/{currency}/default",
            get(default_account_handler),
        )
        .route("/wallets/{wallet_id}/targets", post(targets_handler))
        .route("/wallets/{wallet_id}/tiers", get(tiers_handler))
        .route("/wallets/{wallet_id}/sdd", get(sdd_handler))
        .route("/wallets/{wallet_id}/session", delete(logout_handler))
        .layer(cors)
        .with_state(manager)
}
