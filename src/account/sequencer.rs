//! Nonce, gas price and gas limit for one account transfer

use super::gas::GasOracle;
use super::nonce::NonceSequencer;
use super::{parse_address, to_major_units, to_minor_units, AccountTransferRequest};
use crate::error::{GatewayError, GatewayResult};
use crate::rpc::Network;

use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::debug;

/// Everything needed to assemble an unsigned transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferPlan {
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    /// Value in wei
    pub value: U256,
}

impl TransferPlan {
    /// Maximum fee in wei
    pub fn fee(&self) -> U256 {
        GasOracle::calculate_cost(self.gas_limit, self.gas_price)
    }

    /// Maximum fee in major units
    pub fn fee_major(&self) -> f64 {
        to_major_units(self.fee())
    }
}

/// Runs the three node queries an account transfer needs
pub struct AccountSequencer {
    nonces: Arc<dyn NonceSequencer>,
    gas: GasOracle,
}

impl AccountSequencer {
    pub fn new(nonces: Arc<dyn NonceSequencer>, gas: GasOracle) -> Self {
        Self { nonces, gas }
    }

    /// Resolve nonce, gas price and gas limit for a quote. No nonce is reserved.
    pub async fn quote(&self, request: &AccountTransferRequest) -> GatewayResult<TransferPlan> {
        self.plan(request, false).await
    }

    /// Like [`quote`](Self::quote), reserving the nonce for a transfer about to be broadcast.
    ///
    /// The reservation must end with [`settle`](Self::settle) or [`abandon`](Self::abandon).
    pub async fn sequence(&self, request: &AccountTransferRequest) -> GatewayResult<TransferPlan> {
        self.plan(request, true).await
    }

    async fn plan(
        &self,
        request: &AccountTransferRequest,
        reserve: bool,
    ) -> GatewayResult<TransferPlan> {
        let from = parse_address(&request.from_address)?;
        let to = parse_address(&request.to_address)?;
        let value = to_minor_units(request.amount)?;
        let network = request.network;

        let nonce = if reserve {
            self.nonces.next_nonce(from, network).await?
        } else {
            self.nonces.peek_nonce(from, network).await?
        };

        let gas = async {
            let gas_price = self.gas.gas_price(network).await?;
            let gas_limit = self
                .gas
                .estimate_transfer_gas(from, to, value, gas_price, network)
                .await?;
            Ok::<_, GatewayError>((gas_price, gas_limit))
        };

        let (gas_price, gas_limit) = match gas.await {
            Ok(gas) => gas,
            Err(e) => {
                if reserve {
                    self.nonces.release(from, network, nonce).await;
                }
                return Err(e);
            }
        };

        debug!(
            "Sequenced transfer {:?} -> {:?}: nonce={} gas_price={} gas_limit={}",
            from, to, nonce, gas_price, gas_limit
        );

        Ok(TransferPlan {
            from,
            to,
            nonce,
            gas_price,
            gas_limit,
            value,
        })
    }

    /// The plan's transaction was handed to the node
    pub async fn settle(&self, plan: &TransferPlan, network: Network) {
        self.nonces.settle(plan.from, network, plan.nonce).await;
    }

    /// Give back the plan's nonce when the transfer is abandoned
    pub async fn abandon(&self, plan: &TransferPlan, network: Network) {
        self.nonces.release(plan.from, network, plan.nonce).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::node::EthereumNode;
    use crate::account::nonce::{MockNonceSequencer, NodeNonceSequencer};
    use crate::rpc::testing::{node_error, ok, scripted_node};
    use serde_json::json;

    const FROM: &str = "0x1111111111111111111111111111111111111111";
    const TO: &str = "0x3535353535353535353535353535353535353535";

    fn request(amount: f64) -> AccountTransferRequest {
        AccountTransferRequest {
            from_address: FROM.to_string(),
            to_address: TO.to_string(),
            amount,
            network: Network::Test,
        }
    }

    fn sequencer(responses: Vec<(&'static str, serde_json::Value)>) -> AccountSequencer {
        let node = EthereumNode::new(Arc::new(scripted_node(responses)));
        AccountSequencer::new(
            Arc::new(NodeNonceSequencer::new(node.clone())),
            GasOracle::new(node),
        )
    }

    #[tokio::test]
    async fn test_worked_example() {
        let sequencer = sequencer(vec![
            ("eth_getTransactionCount", ok(json!("0x5"))),
            ("eth_gasPrice", ok(json!("0x4a817c800"))),
            ("eth_estimateGas", ok(json!("0x5208"))),
        ]);

        let plan = sequencer.sequence(&request(0.01)).await.unwrap();
        assert_eq!(plan.nonce, 5);
        assert_eq!(plan.gas_price, U256::from(20_000_000_000u64));
        assert_eq!(plan.gas_limit, 21_000);
        assert_eq!(plan.value, U256::from(10_000_000_000_000_000u64));
        assert_eq!(plan.fee(), U256::from(420_000_000_000_000u64));
        assert_eq!(plan.fee_major(), 0.00042);
    }

    #[tokio::test]
    async fn test_nonce_failure_aborts_before_gas_queries() {
        let sequencer = sequencer(vec![
            ("eth_getTransactionCount", node_error(-32000, "unknown account")),
            ("eth_gasPrice", ok(json!("0x1"))),
            ("eth_estimateGas", ok(json!("0x5208"))),
        ]);

        let err = sequencer.sequence(&request(0.01)).await.unwrap_err();
        assert!(matches!(err, GatewayError::NonceRetrievalFailed(_)));
    }

    #[tokio::test]
    async fn test_gas_failure_releases_nonce() {
        let node = EthereumNode::new(Arc::new(scripted_node(vec![(
            "eth_gasPrice",
            node_error(-32000, "no suggestion"),
        )])));

        let mut nonces = MockNonceSequencer::new();
        nonces.expect_next_nonce().times(1).returning(|_, _| Ok(12));
        nonces
            .expect_release()
            .withf(|_, network, nonce| *network == Network::Test && *nonce == 12)
            .times(1)
            .returning(|_, _, _| ());

        let sequencer = AccountSequencer::new(Arc::new(nonces), GasOracle::new(node));
        let err = sequencer.sequence(&request(0.5)).await.unwrap_err();
        assert!(matches!(err, GatewayError::GasPriceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_quote_peeks_without_reserving() {
        let node = EthereumNode::new(Arc::new(scripted_node(vec![
            ("eth_gasPrice", ok(json!("0x4a817c800"))),
            ("eth_estimateGas", ok(json!("0x5208"))),
        ])));

        let mut nonces = MockNonceSequencer::new();
        nonces.expect_peek_nonce().times(1).returning(|_, _| Ok(5));
        nonces.expect_next_nonce().never();
        nonces.expect_release().never();

        let sequencer = AccountSequencer::new(Arc::new(nonces), GasOracle::new(node));
        let plan = sequencer.quote(&request(0.01)).await.unwrap();
        assert_eq!(plan.nonce, 5);
    }

    #[tokio::test]
    async fn test_bad_addresses_and_amounts_are_rejected_locally() {
        let sequencer = sequencer(vec![]);

        let mut bad_to = request(0.01);
        bad_to.to_address = "0xnot-an-address".to_string();
        assert!(matches!(
            sequencer.sequence(&bad_to).await,
            Err(GatewayError::AddressDecodeFailed { .. })
        ));

        assert!(matches!(
            sequencer.sequence(&request(0.0)).await,
            Err(GatewayError::InvalidRequest(_))
        ));
    }
}
