//! JSON-RPC methods of the account node

use crate::rpc::{self, Network, RpcError, RpcResult, RpcTransport};

use ethers::types::{Address, U256, U64};
use serde_json::{json, Value};
use std::sync::Arc;

/// Typed access to the account node over a shared transport
#[derive(Clone)]
pub struct EthereumNode {
    transport: Arc<dyn RpcTransport>,
}

impl EthereumNode {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    /// Transaction count of `address` including the node's pending pool
    pub async fn pending_nonce(&self, address: Address, network: Network) -> RpcResult<U64> {
        rpc::call(
            self.transport.as_ref(),
            "eth_getTransactionCount",
            &[json!(address), json!("pending")],
            "",
            network,
        )
        .await
    }

    pub async fn gas_price(&self, network: Network) -> RpcResult<U256> {
        rpc::call(self.transport.as_ref(), "eth_gasPrice", &[], "", network).await
    }

    pub async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        value: U256,
        gas_price: U256,
        network: Network,
    ) -> RpcResult<U64> {
        let call = json!({
            "from": from,
            "to": to,
            "value": value,
            "gasPrice": gas_price,
        });

        rpc::call(self.transport.as_ref(), "eth_estimateGas", &[call], "", network).await
    }

    /// Chain identifier as reported by `net_version`
    pub async fn chain_id(&self, network: Network) -> RpcResult<u64> {
        let version: String =
            rpc::call(self.transport.as_ref(), "net_version", &[], "", network).await?;

        version
            .trim()
            .parse()
            .map_err(|_| RpcError::Decode(format!("net_version: not a chain id: {}", version)))
    }

    /// Submit a signed transaction given as hex without the `0x` prefix
    pub async fn send_raw_transaction(&self, signed_hex: &str, network: Network) -> RpcResult<String> {
        rpc::call(
            self.transport.as_ref(),
            "eth_sendRawTransaction",
            &[json!(format!("0x{}", signed_hex))],
            "",
            network,
        )
        .await
    }

    /// `false` once synced, otherwise the node's sync progress object
    pub async fn syncing(&self, network: Network) -> RpcResult<Value> {
        rpc::call(self.transport.as_ref(), "eth_syncing", &[], "", network).await
    }

    pub async fn transaction_by_hash(&self, hash: &str, network: Network) -> RpcResult<Option<Value>> {
        rpc::call_optional(
            self.transport.as_ref(),
            "eth_getTransactionByHash",
            &[json!(hash)],
            "",
            network,
        )
        .await
    }
}
