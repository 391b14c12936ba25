//! Gateway HTTP server with Axum routes for chat, backup chat and image chat

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{HeaderValue, Method, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use polyems_core::protocol::{ChatReply, ChatRequest, VisionRequest, routes};
use polyems_core::{ModelRouter, ProviderKind, VisionProvider};
use tower_http::cors::CorsLayer;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::error::{ApiError, AppJson};

/// Origin of the local web UI, the only one allowed by CORS
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:5173";

/// Models used by the routes that do not take the caller's model name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteModels {
    /// Model the backup route sends to the default provider
    pub backup_model: String,
    /// Vision model for image-augmented chat
    pub vision_model: String,
}

impl Default for RouteModels {
    fn default() -> Self {
        Self {
            backup_model: "llama-3.1-8b-instant".to_string(),
            vision_model: "llama-3.2-11b-vision-preview".to_string(),
        }
    }
}

/// Shared, read-only state for every request
#[derive(Clone)]
pub struct GatewayState {
    pub router: Arc<ModelRouter>,
    pub vision: Arc<dyn VisionProvider>,
    pub models: RouteModels,
}

/// The gateway server
pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
    allowed_origin: HeaderValue,
}

impl GatewayServer {
    /// Create a new gateway server
    pub fn new(bind: SocketAddr, allowed_origin: &str, state: GatewayState) -> Result<Self> {
        let allowed_origin = HeaderValue::from_str(allowed_origin)
            .with_context(|| format!("Invalid CORS origin: {}", allowed_origin))?;
        Ok(Self {
            state,
            bind,
            allowed_origin,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(self.allowed_origin.clone())
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE]);

        Router::new()
            .route(routes::ROOT, get(root_handler))
            .route(routes::CHAT, post(chat_handler))
            .route(routes::CHAT_BACKUP, post(backup_chat_handler))
            .route(routes::CHAT_VISION, post(vision_handler))
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind)
            .await
            .with_context(|| format!("Failed to bind gateway to {}", self.bind))?;
        info!("Gateway listening on http://{}", self.bind);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Gateway stopped");
        Ok(())
    }
}

// ── HTTP Handlers ──

async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Server running" }))
}

async fn chat_handler(
    State(state): State<GatewayState>,
    AppJson(req): AppJson<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let span = info_span!("chat", request_id = %Uuid::new_v4(), model = %req.model);
    async move {
        let response = state.router.chat(&req.messages, &req.model).await?;
        Ok(Json(ChatReply { response }))
    }
    .instrument(span)
    .await
}

/// Backup route: the same conversation goes to the default provider with the
/// configured backup model, whatever model the caller asked for.
async fn backup_chat_handler(
    State(state): State<GatewayState>,
    AppJson(req): AppJson<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let backup_model = state.models.backup_model.clone();
    let span = info_span!(
        "chat_backup",
        request_id = %Uuid::new_v4(),
        requested = %req.model,
        model = %backup_model,
    );
    async move {
        let response = state
            .router
            .chat_via(ProviderKind::Default, &req.messages, &backup_model)
            .await
            .map_err(|mut e| {
                // callers only know the model they asked for
                e.model = req.model.clone();
                e
            })?;
        Ok(Json(ChatReply { response }))
    }
    .instrument(span)
    .await
}

async fn vision_handler(
    State(state): State<GatewayState>,
    AppJson(req): AppJson<VisionRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let model = state.models.vision_model.clone();
    let span = info_span!("chat_vision", request_id = %Uuid::new_v4(), model = %model);
    async move {
        match state
            .vision
            .describe_image(&model, &req.messages, &req.image_url)
            .await
        {
            Ok(response) => Ok(Json(ChatReply { response })),
            Err(e) => {
                error!(
                    "Vision provider {} failed: {:#}",
                    state.vision.provider_name(),
                    e
                );
                Err(ApiError::VisionUnavailable)
            }
        }
    }
    .instrument(span)
    .await
}
