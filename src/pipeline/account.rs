//! Account pipeline: nonce/gas sequencing, assembly, local signing, broadcast

use super::observe;
use crate::account::{
    AccountAssembler, AccountSequencer, AccountTransferRequest, EthereumNode, GasOracle,
    NonceStrategy, TransferPlan,
};
use crate::error::{GatewayError, GatewayResult};
use crate::metrics;
use crate::rpc::{Network, RpcTransport};
use crate::tx::{Broadcaster, LocalSigner, SignRequest, SignedPayload, TransactionSigner};

use ethers::utils::format_units;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const LEDGER: &str = "ethereum";

/// An assembled, unsigned transfer and its maximum fee
#[derive(Debug, Clone)]
pub struct AccountDraft {
    /// Unsigned RLP hex without `0x`
    pub raw_hex: String,
    /// Maximum fee in major units
    pub fee: f64,
    pub plan: TransferPlan,
}

/// Node synchronisation as reported by `eth_syncing`
#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    Synced,
    Syncing(Value),
}

pub struct AccountPipeline {
    node: EthereumNode,
    sequencer: AccountSequencer,
    assembler: AccountAssembler,
    signer: Arc<dyn TransactionSigner>,
    broadcaster: Broadcaster,
}

impl AccountPipeline {
    pub fn new(transport: Arc<dyn RpcTransport>, strategy: NonceStrategy) -> Self {
        let node = EthereumNode::new(transport);
        Self {
            sequencer: AccountSequencer::new(
                strategy.sequencer(node.clone()),
                GasOracle::new(node.clone()),
            ),
            assembler: AccountAssembler::new(),
            signer: Arc::new(LocalSigner::new(node.clone())),
            broadcaster: Broadcaster::Account(node.clone()),
            node,
        }
    }

    pub async fn status(&self, network: Network) -> GatewayResult<SyncStatus> {
        let syncing = observe(LEDGER, "status", async {
            self.node.syncing(network).await.map_err(GatewayError::Node)
        })
        .await?;

        Ok(match syncing {
            Value::Bool(false) => SyncStatus::Synced,
            progress => SyncStatus::Syncing(progress),
        })
    }

    /// Quote nonce and gas, then assemble the unsigned transaction.
    ///
    /// The nonce is not reserved: a quote that is never broadcast leaves the
    /// sender's sequence untouched.
    pub async fn create(&self, request: &AccountTransferRequest) -> GatewayResult<AccountDraft> {
        let plan = observe(LEDGER, "sequence", self.sequencer.quote(request)).await?;
        Ok(self.draft(plan, request.network))
    }

    fn draft(&self, plan: TransferPlan, network: Network) -> AccountDraft {
        if let Ok(gwei) = format_units(plan.gas_price, "gwei") {
            metrics::record_gas_price(network.as_str(), gwei.parse().unwrap_or_default());
        }

        let raw_hex = self.assembler.assemble(&plan);
        info!(
            "Assembled transfer nonce {} from {:?} on {}, max fee {} wei",
            plan.nonce,
            plan.from,
            network,
            plan.fee()
        );

        AccountDraft {
            raw_hex,
            fee: plan.fee_major(),
            plan,
        }
    }

    pub async fn sign(
        &self,
        raw_tx: &str,
        private_key: &str,
        network: Network,
    ) -> GatewayResult<SignedPayload> {
        let request = SignRequest {
            raw_tx: raw_tx.to_string(),
            private_key: private_key.to_string(),
            inputs: Vec::new(),
            network,
        };
        observe(LEDGER, "sign", self.signer.sign(&request)).await
    }

    pub async fn broadcast(&self, payload: &SignedPayload, network: Network) -> GatewayResult<String> {
        let tx_hash = observe(LEDGER, "broadcast", self.broadcaster.broadcast(payload, network)).await?;
        metrics::record_broadcast(LEDGER, network.as_str());
        Ok(tx_hash)
    }

    /// Broadcast caller-supplied signed hex
    pub async fn send(&self, signed_tx: &str, network: Network) -> GatewayResult<String> {
        let payload = SignedPayload::from_hex(signed_tx)?;
        self.broadcast(&payload, network).await
    }

    pub async fn transaction(&self, hash: &str, network: Network) -> GatewayResult<Value> {
        observe(LEDGER, "lookup", async {
            self.node
                .transaction_by_hash(hash, network)
                .await
                .map_err(GatewayError::Node)?
                .ok_or_else(|| GatewayError::TransactionNotFound(hash.to_string()))
        })
        .await
    }

    /// Sequence, assemble, sign and broadcast in one request.
    ///
    /// The reserved nonce is released if signing fails or the node refuses
    /// the broadcast. After a transport failure the node may already hold the
    /// transaction, so the nonce is settled instead.
    pub async fn transfer(
        &self,
        request: &AccountTransferRequest,
        private_key: &str,
    ) -> GatewayResult<String> {
        let network = request.network;
        let plan = observe(LEDGER, "sequence", self.sequencer.sequence(request)).await?;
        let draft = self.draft(plan, network);

        let result = async {
            let payload = self.sign(&draft.raw_hex, private_key, network).await?;
            self.broadcast(&payload, network).await
        }
        .await;

        match &result {
            Ok(_) => self.sequencer.settle(&draft.plan, network).await,
            Err(GatewayError::BroadcastRejected(source)) if source.is_transport() => {
                warn!(
                    "Broadcast of nonce {} did not complete, node state unknown: {}",
                    draft.plan.nonce, source
                );
                self.sequencer.settle(&draft.plan, network).await;
            }
            Err(e) => {
                warn!("Transfer with nonce {} abandoned: {}", draft.plan.nonce, e);
                self.sequencer.abandon(&draft.plan, network).await;
            }
        }
        result
    }
}
