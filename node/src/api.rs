//! # JSON-RPC + REST + WebSocket API
//!
//! Builds the axum router that exposes the ledger over HTTP. All endpoints
//! share application state through axum's `State` extractor, and every
//! endpoint except `/health` and `/status` requires a bearer token. `/ws`
//! also accepts it as `?token=`, since browsers cannot set headers on an
//! upgrade request.
//!
//! ## Endpoints
//!
//! | Method | Path            | Description                              |
//! |--------|-----------------|------------------------------------------|
//! | GET    | `/health`       | Liveness probe                           |
//! | GET    | `/status`       | Store summary                            |
//! | POST   | `/rpc`          | JSON-RPC 2.0 gateway (named params)      |
//! | GET    | `/ws`           | Caller's ledger events, `?token=`        |
//! | GET    | `/wallet`       | Caller's wallet                          |
//! | GET    | `/ledger`       | Caller's ledger, `?limit=&offset=`       |
//! | GET    | `/quests`       | Quests visible to the caller, `?status=` |
//! | GET    | `/quests/:id`   | One quest                                |
//!
//! ## Error Codes
//!
//! | Class       | JSON-RPC | HTTP |
//! |-------------|----------|------|
//! | auth        | -32000   | 401  |
//! | not found   | -32001   | 404  |
//! | forbidden   | -32003   | 403  |
//! | conflict    | -32009   | 409  |
//! | validation  | -32602   | 400  |
//! | internal    | -32603   | 500  |

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use chess_ledger::quest::{NewQuest, Quest, QuestStatus, SubmissionStatus};
use chess_ledger::service::{Approval, Graded, Posting};
use chess_ledger::wallet::{LedgerEntry, LedgerKind, Wallet};
use chess_ledger::{ErrorCode, LedgerError, LedgerService, Principal, Role};

use crate::auth::{extract_token_from_header, AuthError, JwtValidator};
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc` or an internally shared handle.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The ledger procedures, backed by the sled store.
    pub service: LedgerService,
    /// Bearer token verification.
    pub auth: Arc<JwtValidator>,
    /// Broadcast channel for live ledger events.
    pub event_tx: broadcast::Sender<LedgerEvent>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

/// Events pushed to WebSocket subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A quest was approved and its budget debited.
    QuestApproved {
        quest_id: Uuid,
        approved_by: Uuid,
        reward_coins: u64,
    },
    /// A submission was auto-graded, recorded as pending, or reviewed.
    SubmissionGraded {
        submission_id: Uuid,
        quest_id: Uuid,
        user_id: Uuid,
        status: SubmissionStatus,
        score: Option<u8>,
    },
    /// A wallet balance moved.
    WalletChanged {
        user_id: Uuid,
        balance: u64,
        delta: i64,
        kind: LedgerKind,
    },
}

impl LedgerEvent {
    /// Returns `true` if `caller` may see this event. Staff and above see
    /// everything; everyone else only sees events about their own wallet and
    /// submissions, plus quest approvals.
    pub fn visible_to(&self, caller: &Principal) -> bool {
        if caller.role.at_least(Role::Staff) {
            return true;
        }
        match self {
            LedgerEvent::QuestApproved { .. } => true,
            LedgerEvent::SubmissionGraded { user_id, .. }
            | LedgerEvent::WalletChanged { user_id, .. } => *user_id == caller.user_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .route("/wallet", get(wallet_handler))
        .route("/ledger", get(ledger_handler))
        .route("/quests", get(quests_handler))
        .route("/quests/:id", get(quest_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything a request can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// JSON-RPC error code.
    pub fn rpc_code(&self) -> i32 {
        match self {
            ApiError::Auth(_) => -32000,
            ApiError::InvalidParams(_) => -32602,
            ApiError::MethodNotFound(_) => -32601,
            ApiError::Internal(_) => -32603,
            ApiError::Ledger(e) => match e.code() {
                ErrorCode::NotFound => -32001,
                ErrorCode::Forbidden => -32003,
                ErrorCode::Conflict => -32009,
                ErrorCode::Validation => -32602,
                ErrorCode::Internal => -32603,
            },
        }
    }

    /// HTTP status for REST responses.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidParams(_) => StatusCode::BAD_REQUEST,
            ApiError::MethodNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Ledger(e) => match e.code() {
                ErrorCode::NotFound => StatusCode::NOT_FOUND,
                ErrorCode::Forbidden => StatusCode::FORBIDDEN,
                ErrorCode::Conflict => StatusCode::CONFLICT,
                ErrorCode::Validation => StatusCode::BAD_REQUEST,
                ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Named method parameters.
    pub params: Option<Value>,
    /// Request identifier. Echoed back in the response.
    pub id: Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version. Always "2.0".
    pub jsonrpc: String,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request identifier, echoed from the request.
    pub id: Value,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn failure(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Human-readable error description, shown to users as-is.
    pub message: String,
    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ---------------------------------------------------------------------------
// Method Parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct QuestIdParams {
    quest_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct McqAnswerParams {
    quest_id: Uuid,
    choice: String,
}

#[derive(Debug, Deserialize)]
struct TextAnswerParams {
    quest_id: Uuid,
    answer: String,
}

#[derive(Debug, Deserialize)]
struct QuestActiveParams {
    quest_id: Uuid,
    active: bool,
}

#[derive(Debug, Deserialize)]
struct ReviewParams {
    submission_id: Uuid,
    accept: bool,
    #[serde(default)]
    score: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct GrantParams {
    recipient: Uuid,
    amount: u64,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetRoleParams {
    user_id: Uuid,
    role: Role,
}

/// Pagination for `get_my_ledger` and `GET /ledger`.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Filter for `list_quests` and `GET /quests`.
#[derive(Debug, Default, Deserialize)]
pub struct QuestFilter {
    pub status: Option<QuestStatus>,
}

/// Query parameters for `GET /ws`.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

fn params<T: DeserializeOwned>(raw: Option<Value>) -> Result<T, ApiError> {
    let raw = match raw {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(v) => v,
    };
    serde_json::from_value(raw).map_err(|e| ApiError::InvalidParams(e.to_string()))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(e.to_string()))
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Applied schema migration version.
    pub schema_version: u64,
    pub wallets: usize,
    pub ledger_entries: usize,
    pub quests: usize,
    pub submissions: usize,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

// ---------------------------------------------------------------------------
// Authentication & Events
// ---------------------------------------------------------------------------

/// Verifies the bearer token and resolves the caller's role.
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_token_from_header)
        .ok_or(AuthError::MissingToken)?;
    authenticate_token(state, token)
}

fn authenticate_token(state: &AppState, token: &str) -> Result<Principal, ApiError> {
    let user_id = state.auth.verify_token(token)?;
    Ok(state.service.principal_for(user_id)?)
}

fn publish(state: &AppState, event: LedgerEvent) {
    // No subscribers is not an error.
    let _ = state.event_tx.send(event);
}

fn publish_posting(state: &AppState, posting: &Posting) {
    publish(
        state,
        LedgerEvent::WalletChanged {
            user_id: posting.wallet.user_id,
            balance: posting.wallet.balance,
            delta: posting.entry.delta,
            kind: posting.entry.kind,
        },
    );
}

fn publish_approval(state: &AppState, approval: &Approval) {
    state.metrics.quests_approved_total.inc();
    state
        .metrics
        .coins_budgeted_total
        .inc_by(approval.quest.reward_coins);
    publish(
        state,
        LedgerEvent::QuestApproved {
            quest_id: approval.quest.id,
            approved_by: approval.budget.entry.created_by,
            reward_coins: approval.quest.reward_coins,
        },
    );
    publish_posting(state, &approval.budget);
}

fn publish_graded(state: &AppState, graded: &Graded) {
    let sub = &graded.submission;
    publish(
        state,
        LedgerEvent::SubmissionGraded {
            submission_id: sub.id,
            quest_id: sub.quest_id,
            user_id: sub.user_id,
            status: sub.status,
            score: sub.score,
        },
    );
    if let Some(award) = &graded.award {
        state
            .metrics
            .coins_awarded_total
            .inc_by(award.entry.delta.unsigned_abs());
        publish_posting(state, award);
    }
}

/// Counts and logs a failed request.
fn observe<T>(state: &AppState, what: &str, result: Result<T, ApiError>) -> Result<T, ApiError> {
    if let Err(e) = &result {
        state.metrics.rpc_errors_total.inc();
        tracing::debug!(method = what, code = e.rpc_code(), error = %e, "request failed");
    }
    result
}

// ---------------------------------------------------------------------------
// RPC Dispatch
// ---------------------------------------------------------------------------

/// Runs one named procedure on behalf of `caller`.
fn dispatch(
    state: &AppState,
    caller: &Principal,
    method: &str,
    raw: Option<Value>,
) -> Result<Value, ApiError> {
    let svc = &state.service;
    match method {
        // -- Quests ---------------------------------------------------------
        "create_quest" => {
            let new: NewQuest = params(raw)?;
            to_json(&svc.create_quest(caller, new)?)
        }
        "submit_quest" => {
            let p: QuestIdParams = params(raw)?;
            to_json(&svc.submit_quest(caller, p.quest_id)?)
        }
        "approve_quest" => {
            let p: QuestIdParams = params(raw)?;
            let approval = svc.approve_quest(caller, p.quest_id)?;
            publish_approval(state, &approval);
            to_json(&approval)
        }
        "reject_quest" => {
            let p: QuestIdParams = params(raw)?;
            to_json(&svc.reject_quest(caller, p.quest_id)?)
        }
        "set_quest_active" => {
            let p: QuestActiveParams = params(raw)?;
            to_json(&svc.set_quest_active(caller, p.quest_id, p.active)?)
        }
        "get_quest" => {
            let p: QuestIdParams = params(raw)?;
            to_json(&svc.get_quest(caller, p.quest_id)?)
        }
        "list_quests" => {
            let p: QuestFilter = params(raw)?;
            to_json(&svc.list_quests(caller, p.status)?)
        }

        // -- Submissions ----------------------------------------------------
        "submit_mcq_answer" => {
            let p: McqAnswerParams = params(raw)?;
            let graded = svc.submit_mcq_answer(caller, p.quest_id, &p.choice)?;
            state.metrics.submissions_total.inc();
            publish_graded(state, &graded);
            to_json(&graded)
        }
        "submit_text_answer" => {
            let p: TextAnswerParams = params(raw)?;
            let submission = svc.submit_text_answer(caller, p.quest_id, &p.answer)?;
            state.metrics.submissions_total.inc();
            publish_graded(
                state,
                &Graded {
                    submission: submission.clone(),
                    award: None,
                },
            );
            to_json(&submission)
        }
        "review_submission" => {
            let p: ReviewParams = params(raw)?;
            let graded = svc.review_submission(caller, p.submission_id, p.accept, p.score)?;
            publish_graded(state, &graded);
            to_json(&graded)
        }
        "list_my_submissions" => to_json(&svc.list_my_submissions(caller)?),
        "list_pending_submissions" => to_json(&svc.list_pending_submissions(caller)?),

        // -- Wallet ---------------------------------------------------------
        "get_my_wallet" => to_json(&svc.get_my_wallet(caller)?),
        "get_my_ledger" => {
            let p: PageParams = params(raw)?;
            to_json(&svc.get_my_ledger(caller, p.limit, p.offset)?)
        }
        "grant_coins" => {
            let p: GrantParams = params(raw)?;
            let posting = svc.grant_coins(caller, p.recipient, p.amount, p.note)?;
            state
                .metrics
                .coins_granted_total
                .inc_by(posting.entry.delta.unsigned_abs());
            publish_posting(state, &posting);
            to_json(&posting)
        }

        // -- Profiles & admin ----------------------------------------------
        "get_my_profile" => to_json(&svc.get_profile(caller.user_id)?),
        "set_user_role" => {
            let p: SetRoleParams = params(raw)?;
            to_json(&svc.set_user_role(caller, p.user_id, p.role)?)
        }
        "list_role_changes" => to_json(&svc.role_changes(caller)?),
        "audit_ledger" => to_json(&svc.audit_ledger(caller)?),

        other => Err(ApiError::MethodNotFound(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — returns a summary of the store.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let db = state.service.db();
    let schema_version = match db.schema_version() {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("failed to read schema version: {}", e);
            return ApiError::from(e).into_response();
        }
    };

    let resp = StatusResponse {
        version: state.version.clone(),
        schema_version,
        wallets: db.wallet_count(),
        ledger_entries: db.entry_count(),
        quests: db.quest_count(),
        submissions: db.submission_count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Json(resp).into_response()
}

/// `POST /rpc` — JSON-RPC 2.0 gateway.
///
/// Authenticates the caller, then routes the method to the ledger service.
/// Unknown methods return error code -32601 (Method not found).
async fn rpc_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse::failure(
            req.id,
            -32600,
            "Invalid Request: jsonrpc must be \"2.0\"".into(),
        ));
    }

    let timer = state.metrics.rpc_latency_seconds.start_timer();
    let outcome = authenticate(&state, &headers)
        .and_then(|caller| dispatch(&state, &caller, &req.method, req.params));
    timer.observe_duration();

    match observe(&state, &req.method, outcome) {
        Ok(result) => Json(JsonRpcResponse::success(req.id, result)),
        Err(e) => Json(JsonRpcResponse::failure(req.id, e.rpc_code(), e.to_string())),
    }
}

/// `GET /wallet` — the caller's wallet.
async fn wallet_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Wallet>, ApiError> {
    let result = authenticate(&state, &headers)
        .and_then(|caller| Ok(state.service.get_my_wallet(&caller)?));
    observe(&state, "GET /wallet", result).map(Json)
}

/// `GET /ledger?limit=&offset=` — one page of the caller's ledger, newest
/// first.
async fn ledger_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
    let result = authenticate(&state, &headers)
        .and_then(|caller| Ok(state.service.get_my_ledger(&caller, page.limit, page.offset)?));
    observe(&state, "GET /ledger", result).map(Json)
}

/// `GET /quests?status=` — quests visible to the caller.
async fn quests_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<QuestFilter>,
) -> Result<Json<Vec<Quest>>, ApiError> {
    let result = authenticate(&state, &headers)
        .and_then(|caller| Ok(state.service.list_quests(&caller, filter.status)?));
    observe(&state, "GET /quests", result).map(Json)
}

/// `GET /quests/:id` — one quest, redacted for students.
async fn quest_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Quest>, ApiError> {
    let result = authenticate(&state, &headers)
        .and_then(|caller| Ok(state.service.get_quest(&caller, id)?));
    observe(&state, "GET /quests/:id", result).map(Json)
}

/// `GET /ws?token=` — WebSocket upgrade for the caller's live ledger events.
///
/// The caller is authenticated before the upgrade, from the `Authorization`
/// header or the `token` query parameter. Clients receive JSON-encoded
/// [`LedgerEvent`] messages filtered by [`LedgerEvent::visible_to`]. The
/// connection is push-only; client messages are ignored.
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<WsParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let caller = match params.token.as_deref() {
        Some(token) if !headers.contains_key(AUTHORIZATION) => authenticate_token(&state, token),
        _ => authenticate(&state, &headers),
    };
    let caller = match observe(&state, "GET /ws", caller) {
        Ok(caller) => caller,
        Err(e) => return e.into_response(),
    };
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_ws_connection(socket, state, caller)),
        Err(rejection) => rejection.into_response(),
    }
}

/// Drives a single WebSocket connection, forwarding the broadcast events
/// `caller` may see until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState, caller: Principal) {
    let mut rx = state.event_tx.subscribe();
    tracing::debug!(user = %caller.user_id, role = %caller.role, "ws subscriber connected");

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) if !ev.visible_to(&caller) => {}
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
