//! Node-side and local transaction signing

use super::{SignRequest, SignedPayload, TransactionSigner};
use crate::account::{EthereumNode, UnsignedAccountTransaction};
use crate::error::{GatewayError, GatewayResult};
use crate::utxo::BitcoinNode;

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::str::FromStr;
use tracing::{debug, info};

/// Delegates UTXO signing to the node's `signrawtransactionwithkey`
#[derive(Clone)]
pub struct RemoteSigner {
    node: BitcoinNode,
}

impl RemoteSigner {
    pub fn new(node: BitcoinNode) -> Self {
        Self { node }
    }
}

#[async_trait]
impl TransactionSigner for RemoteSigner {
    async fn sign(&self, request: &SignRequest) -> GatewayResult<SignedPayload> {
        let signed = self
            .node
            .sign_raw_transaction_with_key(
                &request.raw_tx,
                &request.private_key,
                &request.inputs,
                request.network,
            )
            .await
            .map_err(GatewayError::SigningRpcFailed)?;

        if !signed.complete {
            return Err(GatewayError::SigningIncomplete);
        }

        let raw = hex::decode(&signed.hex)
            .map_err(|e| GatewayError::SigningFailed(format!("node returned invalid hex: {}", e)))?;

        info!(
            "Node signed UTXO transaction with {} inputs on {}",
            request.inputs.len(),
            request.network
        );
        Ok(SignedPayload::new(raw))
    }
}

/// Signs account transactions in-process with a chain-id-bound signature
#[derive(Clone)]
pub struct LocalSigner {
    node: EthereumNode,
}

impl LocalSigner {
    pub fn new(node: EthereumNode) -> Self {
        Self { node }
    }
}

#[async_trait]
impl TransactionSigner for LocalSigner {
    async fn sign(&self, request: &SignRequest) -> GatewayResult<SignedPayload> {
        let chain_id = self
            .node
            .chain_id(request.network)
            .await
            .map_err(GatewayError::ChainIdUnavailable)?;

        let key = request.private_key.trim();
        let wallet = LocalWallet::from_str(key.strip_prefix("0x").unwrap_or(key))
            .map_err(|_| GatewayError::SigningFailed("invalid private key".to_string()))?
            .with_chain_id(chain_id);

        let unsigned = UnsignedAccountTransaction::from_hex(&request.raw_tx)?;
        let tx = TypedTransaction::Legacy(unsigned.to_request().chain_id(chain_id));

        let signature = wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| GatewayError::SigningFailed(e.to_string()))?;

        debug!(
            "Signed nonce {} from {:?} for chain {}",
            unsigned.nonce,
            wallet.address(),
            chain_id
        );
        Ok(SignedPayload::new(tx.rlp_signed(&signature).to_vec()))
    }
}
