//! UTXO pipeline: fee estimate, build, node-side signing, broadcast

use super::observe;
use crate::error::{GatewayError, GatewayResult};
use crate::metrics;
use crate::rpc::{Network, RpcTransport};
use crate::tx::{Broadcaster, RemoteSigner, SignRequest, SignedPayload, TransactionSigner};
use crate::utxo::builder::locking_script;
use crate::utxo::node::{BlockchainInfo, FundedRaw};
use crate::utxo::{
    BitcoinNode, BuiltTransaction, FeeDeductionPolicy, FeeRate, FeeRateEstimator,
    TransactionBuilder, TransferRequest, UnspentOutput,
};

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

const LEDGER: &str = "bitcoin";

/// A transfer as requested by a caller, before a fee rate is known
#[derive(Debug, Clone)]
pub struct TransferOrder {
    pub inputs: Vec<UnspentOutput>,
    pub source_address: String,
    pub destination_address: String,
    pub amount: u64,
    pub network: Network,
}

impl TransferOrder {
    fn priced(&self, rate: FeeRate) -> TransferRequest {
        TransferRequest {
            inputs: self.inputs.clone(),
            source_address: self.source_address.clone(),
            destination_address: self.destination_address.clone(),
            amount: self.amount,
            fee_rate_per_byte: rate.per_byte,
            network: self.network,
        }
    }
}

pub struct UtxoPipeline {
    node: BitcoinNode,
    estimator: FeeRateEstimator,
    builder: TransactionBuilder,
    signer: Arc<dyn TransactionSigner>,
    broadcaster: Broadcaster,
}

impl UtxoPipeline {
    pub fn new(transport: Arc<dyn RpcTransport>, policy: FeeDeductionPolicy) -> Self {
        let node = BitcoinNode::new(transport);
        Self {
            estimator: FeeRateEstimator::new(node.clone()),
            builder: TransactionBuilder::new(policy),
            signer: Arc::new(RemoteSigner::new(node.clone())),
            broadcaster: Broadcaster::Utxo(node.clone()),
            node,
        }
    }

    pub async fn status(&self, network: Network) -> GatewayResult<BlockchainInfo> {
        observe(LEDGER, "status", async {
            self.node
                .blockchain_info(network)
                .await
                .map_err(GatewayError::Node)
        })
        .await
    }

    /// Fresh fee rate from the node
    pub async fn current_fee(&self, network: Network) -> GatewayResult<FeeRate> {
        let rate = observe(LEDGER, "fee", self.estimator.estimate(network)).await?;
        metrics::record_fee_rate(network.as_str(), rate.per_byte);
        Ok(rate)
    }

    /// Estimate a fee rate and build the unsigned transaction
    pub async fn create(&self, order: &TransferOrder) -> GatewayResult<BuiltTransaction> {
        let rate = self.current_fee(order.network).await?;
        let request = order.priced(rate);

        let built = observe(LEDGER, "build", async { self.builder.build(&request) }).await?;
        info!(
            "Built {} transaction: {} inputs, {} outputs, fee {} sat",
            order.network,
            built.transaction.input.len(),
            built.transaction.output.len(),
            built.fee_sats
        );
        Ok(built)
    }

    pub async fn decode(&self, raw_tx: &str, network: Network) -> GatewayResult<Value> {
        observe(LEDGER, "decode", async {
            self.node
                .decode_raw_transaction(raw_tx, network)
                .await
                .map_err(GatewayError::Node)
        })
        .await
    }

    /// Have the node fund a created transaction from its own wallet.
    ///
    /// The fee is taken out of the first output and change goes to `change_address`.
    pub async fn fund(
        &self,
        raw_tx: &str,
        change_address: &str,
        network: Network,
    ) -> GatewayResult<FundedRaw> {
        if hex::decode(raw_tx).is_err() {
            return Err(GatewayError::InvalidRequest(
                "transaction is not valid hex".to_string(),
            ));
        }
        locking_script(change_address, network.bitcoin_params())?;

        let funded = observe(LEDGER, "fund", async {
            self.node
                .fund_raw_transaction(raw_tx, change_address, network)
                .await
                .map_err(GatewayError::FundingFailed)
        })
        .await?;

        info!(
            "Node funded {} transaction, fee {} coins, change at {}",
            network, funded.fee, funded.change_position
        );
        Ok(funded)
    }

    pub async fn sign(&self, request: &SignRequest) -> GatewayResult<SignedPayload> {
        observe(LEDGER, "sign", self.signer.sign(request)).await
    }

    pub async fn broadcast(&self, payload: &SignedPayload, network: Network) -> GatewayResult<String> {
        let tx_id = observe(LEDGER, "broadcast", self.broadcaster.broadcast(payload, network)).await?;
        metrics::record_broadcast(LEDGER, network.as_str());
        Ok(tx_id)
    }

    /// Broadcast caller-supplied signed hex
    pub async fn send(&self, signed_tx: &str, network: Network) -> GatewayResult<String> {
        let payload = SignedPayload::from_hex(signed_tx)?;
        self.broadcast(&payload, network).await
    }

    /// Build, sign and broadcast in one request
    pub async fn transfer(&self, order: &TransferOrder, private_key: &str) -> GatewayResult<String> {
        let built = self.create(order).await?;

        let payload = self
            .sign(&SignRequest {
                raw_tx: built.raw_hex,
                private_key: private_key.to_string(),
                inputs: order.inputs.clone(),
                network: order.network,
            })
            .await?;
        debug!("Signed transaction is {} bytes", payload.raw.len());

        self.broadcast(&payload, order.network).await
    }
}
