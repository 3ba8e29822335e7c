//! Gateway HTTP API
//!
//! The interface the manager daemon speaks:
//! - GET    /clients        — live peer ids
//! - POST   /client         — provision a peer
//! - DELETE /client/:id     — remove a peer
//! - POST   /client/enable  — restore a disabled peer
//! - POST   /client/disable — disable a peer

use crate::provisioner::{PeerProvisioner, ProvisionedPeer};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use qrcode::render::svg;
use qrcode::QrCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};
use wgfleet_common::Error;

/// Agent API state
pub struct AgentState {
    pub provisioner: Arc<PeerProvisioner>,
}

#[derive(Debug, Deserialize)]
struct CreateClientRequest {
    id: i64,
}

#[derive(Debug, Serialize)]
struct CreateClientResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    conf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    qr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    already_exist: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnableClientRequest {
    id: i64,
    public_key: String,
}

#[derive(Debug, Deserialize)]
struct DisableClientRequest {
    id: i64,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    success: bool,
}

pub fn router(state: Arc<AgentState>) -> Router {
    Router::new()
        .route("/clients", get(list_clients_handler))
        .route("/client", post(create_client_handler))
        .route("/client/:id", delete(remove_client_handler))
        .route("/client/enable", post(enable_client_handler))
        .route("/client/disable", post(disable_client_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn status(code: StatusCode, success: bool) -> Response {
    (code, Json(StatusResponse { success })).into_response()
}

fn error_status(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::AlreadyExists { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn peer_response(peer: &ProvisionedPeer, already_exist: bool) -> CreateClientResponse {
    let qr = QrCode::new(peer.client_config.as_bytes())
        .map(|code| code.render::<svg::Color>().min_dimensions(220, 220).build())
        .map(|svg| STANDARD.encode(svg))
        .ok();

    CreateClientResponse {
        success: true,
        conf: Some(STANDARD.encode(&peer.client_config)),
        qr,
        already_exist: already_exist.then_some(true),
        public_key: Some(peer.public_key.clone()),
    }
}

async fn list_clients_handler(State(state): State<Arc<AgentState>>) -> Response {
    match state.provisioner.live_peers() {
        Ok(names) => {
            let ids: Vec<i64> = names
                .iter()
                .filter_map(|name| match name.parse::<i64>() {
                    Ok(id) => Some(id),
                    Err(_) => {
                        warn!("Skipping non-numeric peer name {:?}", name);
                        None
                    }
                })
                .collect();
            Json(ids).into_response()
        }
        Err(e) => {
            error!("Failed to list peers: {}", e);
            status(StatusCode::INTERNAL_SERVER_ERROR, false)
        }
    }
}

async fn create_client_handler(
    State(state): State<Arc<AgentState>>,
    Json(req): Json<CreateClientRequest>,
) -> Response {
    let name = req.id.to_string();
    match state.provisioner.provision(&name).await {
        Ok(peer) => Json(peer_response(&peer, false)).into_response(),
        Err(Error::AlreadyExists { .. }) => match state.provisioner.existing(&name) {
            Ok(peer) => Json(peer_response(&peer, true)).into_response(),
            Err(e) => {
                warn!("Peer {} exists but its artifacts are unreadable: {}", name, e);
                Json(CreateClientResponse {
                    success: false,
                    conf: None,
                    qr: None,
                    already_exist: Some(true),
                    public_key: None,
                })
                .into_response()
            }
        },
        Err(e) => {
            error!("Failed to provision peer {}: {}", name, e);
            status(error_status(&e), false)
        }
    }
}

async fn remove_client_handler(
    State(state): State<Arc<AgentState>>,
    Path(id): Path<i64>,
) -> Response {
    match state.provisioner.remove(&id.to_string()).await {
        Ok(()) => status(StatusCode::OK, true),
        Err(e) => {
            error!("Failed to remove peer {}: {}", id, e);
            status(error_status(&e), false)
        }
    }
}

async fn enable_client_handler(
    State(state): State<Arc<AgentState>>,
    Json(req): Json<EnableClientRequest>,
) -> Response {
    match state
        .provisioner
        .enable(&req.id.to_string(), &req.public_key)
        .await
    {
        Ok(()) => status(StatusCode::OK, true),
        Err(e) => {
            error!("Failed to enable peer {}: {}", req.id, e);
            status(error_status(&e), false)
        }
    }
}

async fn disable_client_handler(
    State(state): State<Arc<AgentState>>,
    Json(req): Json<DisableClientRequest>,
) -> Response {
    match state.provisioner.disable(&req.id.to_string()).await {
        Ok(()) => status(StatusCode::OK, true),
        Err(e) => {
            error!("Failed to disable peer {}: {}", req.id, e);
            status(error_status(&e), false)
        }
    }
}
