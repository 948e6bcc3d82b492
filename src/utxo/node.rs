//! JSON-RPC methods of the UTXO node

use super::{UnspentOutput, SATS_PER_COIN};
use crate::rpc::{self, Network, RpcResult, RpcTransport};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Confirmation target requested from the smart-fee estimator
pub const FEE_CONFIRMATION_TARGET: u32 = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct SmartFee {
    /// Fee rate in coins per kilobyte; absent when the node has no estimate
    #[serde(default)]
    pub feerate: f64,
    #[serde(default)]
    pub blocks: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignedRaw {
    pub hex: String,
    pub complete: bool,
}

/// Result of `fundrawtransaction`
#[derive(Debug, Clone, Deserialize)]
pub struct FundedRaw {
    pub hex: String,
    /// Fee added by the node, in coins
    pub fee: f64,
    #[serde(default = "no_change", rename = "changepos")]
    pub change_position: i64,
}

fn no_change() -> i64 {
    -1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockchainInfo {
    pub chain: String,
    #[serde(default)]
    pub blocks: u64,
    #[serde(default)]
    pub headers: u64,
    #[serde(default)]
    pub verificationprogress: f64,
    #[serde(default)]
    pub warnings: Value,
}

/// Typed access to the UTXO node over a shared transport
#[derive(Clone)]
pub struct BitcoinNode {
    transport: Arc<dyn RpcTransport>,
}

impl BitcoinNode {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    pub async fn estimate_smart_fee(&self, network: Network) -> RpcResult<SmartFee> {
        rpc::call(
            self.transport.as_ref(),
            "estimatesmartfee",
            &[json!(FEE_CONFIRMATION_TARGET)],
            "",
            network,
        )
        .await
    }

    pub async fn sign_raw_transaction_with_key(
        &self,
        raw_tx: &str,
        private_key: &str,
        inputs: &[UnspentOutput],
        network: Network,
    ) -> RpcResult<SignedRaw> {
        let prevtxs: Vec<Value> = inputs.iter().map(prevtx).collect();

        rpc::call(
            self.transport.as_ref(),
            "signrawtransactionwithkey",
            &[json!(raw_tx), json!([private_key]), Value::Array(prevtxs)],
            "",
            network,
        )
        .await
    }

    /// Let the node add inputs and change, taking the fee out of the first output
    pub async fn fund_raw_transaction(
        &self,
        raw_tx: &str,
        change_address: &str,
        network: Network,
    ) -> RpcResult<FundedRaw> {
        rpc::call(
            self.transport.as_ref(),
            "fundrawtransaction",
            &[
                json!(raw_tx),
                json!({
                    "changeAddress": change_address,
                    "subtractFeeFromOutputs": [0],
                }),
            ],
            "",
            network,
        )
        .await
    }

    pub async fn send_raw_transaction(&self, signed_tx: &str, network: Network) -> RpcResult<String> {
        rpc::call(
            self.transport.as_ref(),
            "sendrawtransaction",
            &[json!(signed_tx)],
            "",
            network,
        )
        .await
    }

    pub async fn blockchain_info(&self, network: Network) -> RpcResult<BlockchainInfo> {
        rpc::call(self.transport.as_ref(), "getblockchaininfo", &[], "", network).await
    }

    pub async fn decode_raw_transaction(&self, raw_tx: &str, network: Network) -> RpcResult<Value> {
        rpc::call(
            self.transport.as_ref(),
            "decoderawtransaction",
            &[json!(raw_tx)],
            "",
            network,
        )
        .await
    }
}

/// Previous-output metadata the node needs to sign an input
fn prevtx(input: &UnspentOutput) -> Value {
    json!({
        "txid": input.transaction_id,
        "vout": input.output_index,
        "scriptPubKey": input.locking_script.to_hex_string(),
        "amount": input.amount as f64 / SATS_PER_COIN as f64,
    })
}
