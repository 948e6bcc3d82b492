//! Remote node transport shared by both ledger pipelines
//!
//! This module provides:
//! - Network routing (`"main"` vs everything else)
//! - JSON-RPC request encoding and response decoding
//! - The `RpcTransport` capability injected into every pipeline stage

pub mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Target network of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Main,
    Test,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Main => "main",
            Network::Test => "test",
        }
    }

    /// Chain parameters used to decode UTXO addresses
    pub fn bitcoin_params(&self) -> bitcoin::Network {
        match self {
            Network::Main => bitcoin::Network::Bitcoin,
            Network::Test => bitcoin::Network::Testnet,
        }
    }
}

impl From<&str> for Network {
    /// Only the exact label `main` selects the main network.
    fn from(label: &str) -> Self {
        if label == "main" {
            Network::Main
        } else {
            Network::Test
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while talking to a remote node
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("{message}")]
    Node { code: i64, message: String },

    #[error("invalid node response: {0}")]
    Decode(String),
}

impl RpcError {
    pub fn is_transport(&self) -> bool {
        matches!(self, RpcError::Transport(_))
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

/// Request/response transport toward a remote node
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Send an encoded request body and return the raw response body.
    ///
    /// A non-empty `wallet` scopes the call to that wallet on the node.
    async fn send(&self, body: Vec<u8>, wallet: &str, network: Network) -> RpcResult<Vec<u8>>;
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: String,
    method: &'a str,
    params: &'a [Value],
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Encode a JSON-RPC 2.0 request body
pub fn encode(method: &str, params: &[Value]) -> RpcResult<Vec<u8>> {
    let request = RpcRequest {
        jsonrpc: "2.0",
        id: uuid::Uuid::new_v4().to_string(),
        method,
        params,
    };
    serde_json::to_vec(&request).map_err(|e| RpcError::Decode(e.to_string()))
}

/// Encode, send and decode a single JSON-RPC call
pub async fn call<T: DeserializeOwned>(
    transport: &dyn RpcTransport,
    method: &str,
    params: &[Value],
    wallet: &str,
    network: Network,
) -> RpcResult<T> {
    call_optional(transport, method, params, wallet, network)
        .await?
        .ok_or_else(|| RpcError::Decode(format!("{}: missing result", method)))
}

/// Like [`call`], for methods whose result may legitimately be `null`
pub async fn call_optional<T: DeserializeOwned>(
    transport: &dyn RpcTransport,
    method: &str,
    params: &[Value],
    wallet: &str,
    network: Network,
) -> RpcResult<Option<T>> {
    let body = encode(method, params)?;
    debug!("RPC {} on {} network", method, network);

    let raw = transport.send(body, wallet, network).await?;
    let response: RpcResponse<T> = serde_json::from_slice(&raw)
        .map_err(|e| RpcError::Decode(format!("{}: {}", method, e)))?;

    if let Some(error) = response.error {
        return Err(RpcError::Node {
            code: error.code,
            message: error.message,
        });
    }

    Ok(response.result)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_network_routing_is_exact() {
        assert_eq!(Network::from("main"), Network::Main);
        assert_eq!(Network::from("Main"), Network::Test);
        assert_eq!(Network::from("MAIN"), Network::Test);
        assert_eq!(Network::from(""), Network::Test);
        assert_eq!(Network::from("testnet"), Network::Test);
    }

    #[test]
    fn test_encode_request_shape() {
        let body = encode("estimatesmartfee", &[json!(2)]).unwrap();
        let request: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(request["jsonrpc"], "2.0");
        assert_eq!(request["method"], "estimatesmartfee");
        assert_eq!(request["params"], json!([2]));
        assert!(request["id"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_call_surfaces_node_error_verbatim() {
        let node = scripted_node(vec![(
            "sendrawtransaction",
            node_error(-25, "bad-txns-inputs-missingorspent"),
        )]);

        let err = call::<String>(&node, "sendrawtransaction", &[json!("00")], "", Network::Test)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RpcError::Node {
                code: -25,
                message: "bad-txns-inputs-missingorspent".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_call_passes_wallet_and_network() {
        let mut node = MockRpcTransport::new();
        node.expect_send()
            .withf(|body, wallet, network| {
                method_of(body) == "getwalletinfo" && wallet == "w1" && *network == Network::Main
            })
            .times(1)
            .returning(|_, _, _| Ok(serde_json::to_vec(&ok(json!({"walletname": "w1"}))).unwrap()));

        let info: Value = call(&node, "getwalletinfo", &[], "w1", Network::Main)
            .await
            .unwrap();
        assert_eq!(info["walletname"], "w1");
    }

    #[tokio::test]
    async fn test_call_missing_result_is_decode_error() {
        let node = scripted_node(vec![("eth_gasPrice", json!({"id": "1"}))]);

        let err = call::<String>(&node, "eth_gasPrice", &[], "", Network::Test)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Decode(_)));
    }
}
