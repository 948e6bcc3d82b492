//! HTTP API exposing both transaction pipelines
//!
//! Every route takes a JSON body carrying a `network` label; only the exact
//! value `"main"` selects the main network.

use crate::account::AccountTransferRequest;
use crate::config::ApiConfig;
use crate::error::GatewayError;
use crate::pipeline::{AccountPipeline, SyncStatus, TransferOrder, UtxoPipeline};
use crate::rpc::Network;
use crate::tx::SignRequest;
use crate::utxo::node::BlockchainInfo;
use crate::utxo::UnspentOutput;

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub bitcoin: Arc<UtxoPipeline>,
    pub ethereum: Arc<AccountPipeline>,
}

/// Build the router with all gateway routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/bitcoin/status", post(bitcoin_status))
        .route("/bitcoin/fee", post(bitcoin_fee))
        .route("/bitcoin/transaction/create", post(bitcoin_create))
        .route("/bitcoin/transaction/decode", post(bitcoin_decode))
        .route("/bitcoin/transaction/fund", post(bitcoin_fund))
        .route("/bitcoin/transaction/sign", post(bitcoin_sign))
        .route("/bitcoin/transaction/send", post(bitcoin_send))
        .route("/bitcoin/transaction/transfer", post(bitcoin_transfer))
        .route("/ethereum/status", post(ethereum_status))
        .route("/ethereum/transaction/create", post(ethereum_create))
        .route("/ethereum/transaction/sign", post(ethereum_sign))
        .route("/ethereum/transaction/send", post(ethereum_send))
        .route("/ethereum/transaction/get", post(ethereum_get))
        .route("/ethereum/transaction/transfer", post(ethereum_transfer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> anyhow::Result<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API server on {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = if matches!(self, GatewayError::TransactionNotFound(_)) {
            StatusCode::NOT_FOUND
        } else if self.is_validation() {
            StatusCode::BAD_REQUEST
        } else if self.is_rejection() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else if self.is_retryable() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if status.is_server_error() {
            warn!("Request failed: {}", self);
        }

        let body = ErrorResponse {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, GatewayError>;

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// UTXO ledger

async fn bitcoin_status(
    State(state): State<AppState>,
    Json(req): Json<NetworkRequest>,
) -> ApiResult<BlockchainInfo> {
    Ok(Json(state.bitcoin.status(req.network()).await?))
}

async fn bitcoin_fee(
    State(state): State<AppState>,
    Json(req): Json<NetworkRequest>,
) -> ApiResult<FeeResponse> {
    let rate = state.bitcoin.current_fee(req.network()).await?;
    Ok(Json(FeeResponse {
        fee_per_kb: rate.per_kb,
        fee_per_byte: rate.per_byte,
    }))
}

async fn bitcoin_create(
    State(state): State<AppState>,
    Json(req): Json<BitcoinCreateRequest>,
) -> ApiResult<CreateResponse> {
    let built = state.bitcoin.create(&req.order()).await?;
    Ok(Json(CreateResponse {
        tx: built.raw_hex.clone(),
        fee: built.fee(),
    }))
}

async fn bitcoin_decode(
    State(state): State<AppState>,
    Json(req): Json<RawTxRequest>,
) -> ApiResult<Value> {
    Ok(Json(state.bitcoin.decode(&req.tx, req.network()).await?))
}

async fn bitcoin_fund(
    State(state): State<AppState>,
    Json(req): Json<BitcoinFundRequest>,
) -> ApiResult<CreateResponse> {
    let network = Network::from(req.network.as_str());
    let funded = state
        .bitcoin
        .fund(&req.tx, &req.change_address, network)
        .await?;
    Ok(Json(CreateResponse {
        tx: funded.hex,
        fee: funded.fee,
    }))
}

async fn bitcoin_sign(
    State(state): State<AppState>,
    Json(req): Json<BitcoinSignRequest>,
) -> ApiResult<SignResponse> {
    let network = Network::from(req.network.as_str());
    let payload = state
        .bitcoin
        .sign(&SignRequest {
            raw_tx: req.tx,
            private_key: req.private_key,
            inputs: req.inputs,
            network,
        })
        .await?;
    Ok(Json(SignResponse {
        hash: payload.to_hex(),
    }))
}

async fn bitcoin_send(
    State(state): State<AppState>,
    Json(req): Json<RawTxRequest>,
) -> ApiResult<SendResponse> {
    let tx_id = state.bitcoin.send(&req.tx, req.network()).await?;
    Ok(Json(SendResponse { tx_id }))
}

async fn bitcoin_transfer(
    State(state): State<AppState>,
    Json(req): Json<BitcoinTransferRequest>,
) -> ApiResult<SendResponse> {
    let tx_id = state
        .bitcoin
        .transfer(&req.transfer.order(), &req.private_key)
        .await?;
    Ok(Json(SendResponse { tx_id }))
}

// Account ledger

async fn ethereum_status(
    State(state): State<AppState>,
    Json(req): Json<NetworkRequest>,
) -> ApiResult<SyncResponse> {
    let response = match state.ethereum.status(req.network()).await? {
        SyncStatus::Synced => SyncResponse {
            synced: true,
            message: "node has synced".to_string(),
            progress: None,
        },
        SyncStatus::Syncing(progress) => SyncResponse {
            synced: false,
            message: "node is syncing".to_string(),
            progress: Some(progress),
        },
    };
    Ok(Json(response))
}

async fn ethereum_create(
    State(state): State<AppState>,
    Json(req): Json<EthereumCreateRequest>,
) -> ApiResult<CreateResponse> {
    let draft = state.ethereum.create(&req.transfer()).await?;
    Ok(Json(CreateResponse {
        tx: draft.raw_hex,
        fee: draft.fee,
    }))
}

async fn ethereum_sign(
    State(state): State<AppState>,
    Json(req): Json<EthereumSignRequest>,
) -> ApiResult<SignResponse> {
    let network = Network::from(req.network.as_str());
    let payload = state
        .ethereum
        .sign(&req.tx, &req.private_key, network)
        .await?;
    Ok(Json(SignResponse {
        hash: payload.to_hex(),
    }))
}

async fn ethereum_send(
    State(state): State<AppState>,
    Json(req): Json<RawTxRequest>,
) -> ApiResult<SendResponse> {
    let tx_id = state.ethereum.send(&req.tx, req.network()).await?;
    Ok(Json(SendResponse { tx_id }))
}

async fn ethereum_get(
    State(state): State<AppState>,
    Json(req): Json<HashRequest>,
) -> ApiResult<Value> {
    let network = Network::from(req.network.as_str());
    Ok(Json(state.ethereum.transaction(&req.hash, network).await?))
}

async fn ethereum_transfer(
    State(state): State<AppState>,
    Json(req): Json<EthereumTransferRequest>,
) -> ApiResult<SendResponse> {
    let tx_id = state
        .ethereum
        .transfer(&req.transfer.transfer(), &req.private_key)
        .await?;
    Ok(Json(SendResponse { tx_id }))
}

// Request types

#[derive(Deserialize)]
struct NetworkRequest {
    #[serde(default)]
    network: String,
}

impl NetworkRequest {
    fn network(&self) -> Network {
        Network::from(self.network.as_str())
    }
}

#[derive(Deserialize)]
struct RawTxRequest {
    #[serde(default)]
    network: String,
    tx: String,
}

impl RawTxRequest {
    fn network(&self) -> Network {
        Network::from(self.network.as_str())
    }
}

#[derive(Deserialize)]
struct HashRequest {
    #[serde(default)]
    network: String,
    hash: String,
}

#[derive(Deserialize)]
struct BitcoinCreateRequest {
    #[serde(default)]
    network: String,
    inputs: Vec<UnspentOutput>,
    source_address: String,
    destination_address: String,
    /// Satoshi
    amount: u64,
}

impl BitcoinCreateRequest {
    fn order(&self) -> TransferOrder {
        TransferOrder {
            inputs: self.inputs.clone(),
            source_address: self.source_address.clone(),
            destination_address: self.destination_address.clone(),
            amount: self.amount,
            network: Network::from(self.network.as_str()),
        }
    }
}

#[derive(Deserialize)]
struct BitcoinTransferRequest {
    #[serde(flatten)]
    transfer: BitcoinCreateRequest,
    private_key: String,
}

#[derive(Deserialize)]
struct BitcoinFundRequest {
    #[serde(default)]
    network: String,
    tx: String,
    change_address: String,
}

#[derive(Deserialize)]
struct BitcoinSignRequest {
    #[serde(default)]
    network: String,
    tx: String,
    private_key: String,
    inputs: Vec<UnspentOutput>,
}

#[derive(Deserialize)]
struct EthereumCreateRequest {
    #[serde(default)]
    network: String,
    from: String,
    to: String,
    /// Major units
    amount: f64,
}

impl EthereumCreateRequest {
    fn transfer(&self) -> AccountTransferRequest {
        AccountTransferRequest {
            from_address: self.from.clone(),
            to_address: self.to.clone(),
            amount: self.amount,
            network: Network::from(self.network.as_str()),
        }
    }
}

#[derive(Deserialize)]
struct EthereumTransferRequest {
    #[serde(flatten)]
    transfer: EthereumCreateRequest,
    private_key: String,
}

#[derive(Deserialize)]
struct EthereumSignRequest {
    #[serde(default)]
    network: String,
    tx: String,
    private_key: String,
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

#[derive(Serialize)]
struct FeeResponse {
    fee_per_kb: f64,
    fee_per_byte: u64,
}

#[derive(Serialize)]
struct CreateResponse {
    tx: String,
    fee: f64,
}

#[derive(Serialize)]
struct SignResponse {
    hash: String,
}

#[derive(Serialize)]
struct SendResponse {
    tx_id: String,
}

#[derive(Serialize)]
struct SyncResponse {
    synced: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<Value>,
}
