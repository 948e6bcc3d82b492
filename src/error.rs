//! Error types for the gateway

use crate::rpc::RpcError;
use thiserror::Error;

/// Main error type for the transaction pipelines
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to parse input {txid}: {message}")]
    InputParseFailed { txid: String, message: String },

    #[error("Failed to decode address {address}: {message}")]
    AddressDecodeFailed { address: String, message: String },

    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: String, need: String },

    #[error("Fee estimate unavailable: {0}")]
    FeeUnavailable(String),

    #[error("Fee estimate request failed: {0}")]
    FeeEstimateFailed(#[source] RpcError),

    #[error("Transaction serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Failed to retrieve nonce: {0}")]
    NonceRetrievalFailed(#[source] RpcError),

    #[error("Gas price unavailable: {0}")]
    GasPriceUnavailable(#[source] RpcError),

    #[error("Gas estimation failed: {0}")]
    GasEstimateFailed(#[source] RpcError),

    #[error("Chain id unavailable: {0}")]
    ChainIdUnavailable(#[source] RpcError),

    #[error("Signing transaction not complete")]
    SigningIncomplete,

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Node signing request failed: {0}")]
    SigningRpcFailed(#[source] RpcError),

    #[error("Node funding request failed: {0}")]
    FundingFailed(#[source] RpcError),

    #[error("Broadcast rejected: {0}")]
    BroadcastRejected(#[source] RpcError),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Node request failed: {0}")]
    Node(#[source] RpcError),
}

impl GatewayError {
    /// Stable label used in metrics and API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::InputParseFailed { .. } => "input_parse_failed",
            GatewayError::AddressDecodeFailed { .. } => "address_decode_failed",
            GatewayError::InsufficientBalance { .. } => "insufficient_balance",
            GatewayError::FeeUnavailable(_) => "fee_unavailable",
            GatewayError::FeeEstimateFailed(_) => "fee_estimate_failed",
            GatewayError::SerializationFailed(_) => "serialization_failed",
            GatewayError::NonceRetrievalFailed(_) => "nonce_retrieval_failed",
            GatewayError::GasPriceUnavailable(_) => "gas_price_unavailable",
            GatewayError::GasEstimateFailed(_) => "gas_estimate_failed",
            GatewayError::ChainIdUnavailable(_) => "chain_id_unavailable",
            GatewayError::SigningIncomplete => "signing_incomplete",
            GatewayError::SigningFailed(_) => "signing_failed",
            GatewayError::SigningRpcFailed(_) => "signing_failed",
            GatewayError::FundingFailed(_) => "funding_failed",
            GatewayError::BroadcastRejected(_) => "broadcast_rejected",
            GatewayError::TransactionNotFound(_) => "transaction_not_found",
            GatewayError::Node(_) => "node",
        }
    }

    /// Check if the request should be resubmitted with different parameters
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GatewayError::InvalidRequest(_)
                | GatewayError::InputParseFailed { .. }
                | GatewayError::AddressDecodeFailed { .. }
                | GatewayError::InsufficientBalance { .. }
                | GatewayError::FeeUnavailable(_)
        )
    }

    /// Check if the same request can simply be retried later
    pub fn is_retryable(&self) -> bool {
        self.rpc_source().map(RpcError::is_transport).unwrap_or(false)
    }

    /// Check if the node itself refused the request
    pub fn is_rejection(&self) -> bool {
        match self {
            GatewayError::SigningIncomplete => true,
            GatewayError::SigningRpcFailed(e)
            | GatewayError::FundingFailed(e)
            | GatewayError::BroadcastRejected(e) => !e.is_transport(),
            _ => false,
        }
    }

    fn rpc_source(&self) -> Option<&RpcError> {
        match self {
            GatewayError::FeeEstimateFailed(e)
            | GatewayError::NonceRetrievalFailed(e)
            | GatewayError::GasPriceUnavailable(e)
            | GatewayError::GasEstimateFailed(e)
            | GatewayError::ChainIdUnavailable(e)
            | GatewayError::SigningRpcFailed(e)
            | GatewayError::FundingFailed(e)
            | GatewayError::BroadcastRejected(e)
            | GatewayError::Node(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
