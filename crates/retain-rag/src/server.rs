//! HTTP surface over the query engine: natural-language queries, a simple
//! chat shape, health and client listings, and fixed quick-query shortcuts.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::query::{client_question, QueryEngine, QueryOutcome};
use crate::store::VectorStore;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
    pub store: Arc<dyn VectorStore>,
    pub collection_name: String,
}

#[derive(Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub num_sources: Option<usize>,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Deserialize)]
pub struct ClientInfoRequest {
    pub client_name: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub id: String,
    pub content: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub documents_count: usize,
    pub collection_name: String,
    pub ready: bool,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/clients", get(list_clients))
        .route("/query", post(query))
        .route("/chat", post(chat))
        .route("/client", post(client_info))
        .route("/quick/highest-usage", get(quick_highest_usage))
        .route("/quick/at-risk", get(quick_at_risk))
        .route("/quick/bugs", get(quick_bugs))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Query API listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Retention analysis query API",
        "endpoints": {
            "POST /query": "Full query with sources and query type",
            "POST /chat": "Simple chat (message in, response out)",
            "POST /client": "Everything known about one client",
            "GET /health": "Index readiness",
            "GET /clients": "List all clients in the knowledge base",
            "GET /quick/highest-usage": "Quick: highest usage client",
            "GET /quick/at-risk": "Quick: at-risk clients",
            "GET /quick/bugs": "Quick: bug impact summary",
        },
        "example_questions": [
            "Which client has the highest usage?",
            "Tell me about UB Civil",
            "What bugs are affecting clients?",
            "Which clients have declining trends?",
        ],
    }))
}

async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, String)> {
    let count = state
        .store
        .count()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(HealthResponse {
        status: if count > 0 { "healthy" } else { "empty" }.to_string(),
        documents_count: count,
        collection_name: state.collection_name.clone(),
        ready: count > 0,
    }))
}

async fn list_clients(State(state): State<AppState>) -> Result<Json<Value>, (StatusCode, String)> {
    let chunks = state
        .store
        .get_all()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let mut clients: Vec<String> = chunks
        .into_iter()
        .filter_map(|c| c.metadata.client_name)
        .collect();
    clients.sort();
    clients.dedup();

    Ok(Json(json!({
        "clients": clients,
        "count": clients.len(),
    })))
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Json<QueryOutcome> {
    Json(state.engine.query(&request.question, request.num_sources).await)
}

async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Json<ChatResponse> {
    let outcome = state.engine.query(&request.message, None).await;
    Json(ChatResponse {
        id: uuid::Uuid::new_v4().to_string(),
        content: outcome.answer,
    })
}

async fn client_info(
    State(state): State<AppState>,
    Json(request): Json<ClientInfoRequest>,
) -> Json<ChatResponse> {
    let outcome = state
        .engine
        .query(&client_question(&request.client_name), None)
        .await;
    Json(ChatResponse {
        id: uuid::Uuid::new_v4().to_string(),
        content: outcome.answer,
    })
}

async fn quick(state: &AppState, question: &str) -> ChatResponse {
    let outcome = state.engine.query(question, None).await;
    ChatResponse {
        id: uuid::Uuid::new_v4().to_string(),
        content: outcome.answer,
    }
}

async fn quick_highest_usage(State(state): State<AppState>) -> Json<ChatResponse> {
    Json(quick(&state, "Which client has the highest total usage and activities?").await)
}

async fn quick_at_risk(State(state): State<AppState>) -> Json<ChatResponse> {
    Json(quick(&state, "Which clients have declining or decreasing usage trends?").await)
}

async fn quick_bugs(State(state): State<AppState>) -> Json<ChatResponse> {
    Json(quick(&state, "What bugs are affecting clients and what is their impact?").await)
}
