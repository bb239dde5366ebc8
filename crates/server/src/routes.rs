use axum::extract::{FromRequest, Request, State};
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use cinepost_core::error::ApiError;
use cinepost_core::types::CascadeRequest;
use cinepost_metadata::cascade::Unconfigured;
use cinepost_metadata::{ProviderDescriptor, Resolution};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    // the editor is a browser SPA served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .route("/providers", get(list_providers))
        .route("/assist", post(assist))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    providers: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        providers: state.cascade.providers().len(),
    })
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ProvidersResponse {
    providers: Vec<ProviderDescriptor>,
    unconfigured: Vec<Unconfigured>,
    advisories: Vec<String>,
}

async fn list_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    let unconfigured = state.cascade.unconfigured().to_vec();
    Json(ProvidersResponse {
        providers: state.cascade.providers(),
        advisories: unconfigured.iter().map(Unconfigured::advisory).collect(),
        unconfigured,
    })
}

// ---------------------------------------------------------------------------
// Assist
// ---------------------------------------------------------------------------

/// JSON body whose rejections go through the error envelope.
struct AssistBody(CascadeRequest);

impl<S: Send + Sync> FromRequest<S> for AssistBody {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(body) = Json::<CascadeRequest>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(Self(body))
    }
}

async fn assist(
    State(state): State<AppState>,
    AssistBody(req): AssistBody,
) -> Result<Json<Resolution>, AppError> {
    validate_request(&req)?;
    let resolution = state.cascade.resolve(&req).await?;
    Ok(Json(resolution))
}

fn validate_request(req: &CascadeRequest) -> Result<(), ApiError> {
    if req.operation.wants_metadata() {
        if req.title.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "a title is required to fetch metadata".into(),
            ));
        }
    } else if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest(format!(
            "content is required for {}",
            req.operation
        )));
    }
    Ok(())
}
