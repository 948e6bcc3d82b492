//! Gas price and gas limit discovery for account transfers

use super::node::EthereumNode;
use crate::error::{GatewayError, GatewayResult};
use crate::rpc::Network;

use ethers::types::{Address, U256};
use tracing::debug;

/// Asks the node for gas parameters; nothing is buffered or cached
#[derive(Clone)]
pub struct GasOracle {
    node: EthereumNode,
}

impl GasOracle {
    pub fn new(node: EthereumNode) -> Self {
        Self { node }
    }

    /// Suggested legacy gas price in wei
    pub async fn gas_price(&self, network: Network) -> GatewayResult<U256> {
        let price = self
            .node
            .gas_price(network)
            .await
            .map_err(GatewayError::GasPriceUnavailable)?;

        debug!("Gas price on {}: {}", network, price);
        Ok(price)
    }

    /// Gas limit for a plain value transfer
    pub async fn estimate_transfer_gas(
        &self,
        from: Address,
        to: Address,
        value: U256,
        gas_price: U256,
        network: Network,
    ) -> GatewayResult<u64> {
        let gas = self
            .node
            .estimate_gas(from, to, value, gas_price, network)
            .await
            .map_err(GatewayError::GasEstimateFailed)?;

        debug!("Gas estimate for {:?} -> {:?}: {}", from, to, gas);
        Ok(gas.as_u64())
    }

    /// Maximum fee in wei
    pub fn calculate_cost(gas_limit: u64, gas_price: U256) -> U256 {
        gas_price.saturating_mul(U256::from(gas_limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testing::{node_error, ok, scripted_node};
    use serde_json::json;
    use std::sync::Arc;

    fn oracle(responses: Vec<(&'static str, serde_json::Value)>) -> GasOracle {
        GasOracle::new(EthereumNode::new(Arc::new(scripted_node(responses))))
    }

    #[test]
    fn test_calculate_cost() {
        assert_eq!(
            GasOracle::calculate_cost(21_000, U256::from(20_000_000_000u64)),
            U256::from(420_000_000_000_000u64)
        );
        assert_eq!(GasOracle::calculate_cost(0, U256::MAX), U256::zero());
    }

    #[tokio::test]
    async fn test_gas_price_and_estimate() {
        let oracle = oracle(vec![
            ("eth_gasPrice", ok(json!("0x4a817c800"))),
            ("eth_estimateGas", ok(json!("0x5208"))),
        ]);

        let price = oracle.gas_price(Network::Test).await.unwrap();
        assert_eq!(price, U256::from(20_000_000_000u64));

        let gas = oracle
            .estimate_transfer_gas(
                Address::repeat_byte(1),
                Address::repeat_byte(2),
                U256::one(),
                price,
                Network::Test,
            )
            .await
            .unwrap();
        assert_eq!(gas, 21_000);
    }

    #[tokio::test]
    async fn test_failures_map_to_stage_errors() {
        let oracle = oracle(vec![
            ("eth_gasPrice", node_error(-32000, "gas price oracle down")),
            ("eth_estimateGas", node_error(-32000, "insufficient funds for transfer")),
        ]);

        let err = oracle.gas_price(Network::Main).await.unwrap_err();
        assert!(matches!(err, GatewayError::GasPriceUnavailable(_)));

        let err = oracle
            .estimate_transfer_gas(
                Address::zero(),
                Address::zero(),
                U256::one(),
                U256::one(),
                Network::Main,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::GasEstimateFailed(_)));
        assert!(err.to_string().contains("insufficient funds for transfer"));
    }
}
