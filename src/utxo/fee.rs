//! Fee rate estimation for UTXO transactions

use super::node::BitcoinNode;
use super::SATS_PER_COIN;
use crate::error::{GatewayError, GatewayResult};
use crate::rpc::Network;

use tracing::debug;

/// Node estimates above this (coins per kB) are treated as implausible
const MAX_SANE_FEE_PER_KB: f64 = 0.05;
/// Value substituted for an implausible estimate
const SUBSTITUTE_FEE_PER_KB: f64 = 0.1;

/// Fee rate derived from a single node query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeRate {
    /// Satoshi per byte
    pub per_byte: u64,
    /// Clamped coins per kilobyte as reported by the node
    pub per_kb: f64,
}

/// Apply the sanity clamp to a node-reported fee per kilobyte.
///
/// Values above 0.05 are replaced with 0.1 and negative values become 0.
pub fn clamp_fee_per_kb(fee: f64) -> f64 {
    if fee > MAX_SANE_FEE_PER_KB {
        SUBSTITUTE_FEE_PER_KB
    } else if fee < 0.0 {
        0.0
    } else {
        fee
    }
}

/// Convert coins per kilobyte into whole satoshi per byte (truncating)
pub fn per_byte_rate(fee_per_kb: f64) -> u64 {
    let sats_per_kb = (fee_per_kb * SATS_PER_COIN as f64).round() as u64;
    sats_per_kb / 1000
}

/// Queries the node for a fresh fee rate on every call
pub struct FeeRateEstimator {
    node: BitcoinNode,
}

impl FeeRateEstimator {
    pub fn new(node: BitcoinNode) -> Self {
        Self { node }
    }

    /// Estimate the fee rate for a 2-block confirmation target
    pub async fn estimate(&self, network: Network) -> GatewayResult<FeeRate> {
        let estimate = self
            .node
            .estimate_smart_fee(network)
            .await
            .map_err(GatewayError::FeeEstimateFailed)?;

        let per_kb = clamp_fee_per_kb(estimate.feerate);
        if per_kb == 0.0 {
            return Err(GatewayError::FeeUnavailable(format!(
                "node reported fee rate {} for {} network",
                estimate.feerate, network
            )));
        }

        let rate = FeeRate {
            per_byte: per_byte_rate(per_kb),
            per_kb,
        };
        debug!(
            "Fee rate on {}: {} per kB ({} sat/byte) for {} blocks",
            network, rate.per_kb, rate.per_byte, estimate.blocks
        );
        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testing::{node_error, ok, scripted_node};
    use serde_json::json;
    use std::sync::Arc;

    fn estimator(reply: serde_json::Value) -> FeeRateEstimator {
        let node = scripted_node(vec![("estimatesmartfee", reply)]);
        FeeRateEstimator::new(BitcoinNode::new(Arc::new(node)))
    }

    #[test]
    fn test_clamp_replaces_high_estimates() {
        assert_eq!(clamp_fee_per_kb(0.2), 0.1);
        assert_eq!(clamp_fee_per_kb(0.0500001), 0.1);
        assert_eq!(clamp_fee_per_kb(0.05), 0.05);
        assert_eq!(clamp_fee_per_kb(-1.0), 0.0);
        assert_eq!(clamp_fee_per_kb(0.00012), 0.00012);
    }

    #[test]
    fn test_per_byte_conversion() {
        assert_eq!(per_byte_rate(0.1), 10_000);
        assert_eq!(per_byte_rate(0.0001), 10);
        assert_eq!(per_byte_rate(0.00012), 12);
        assert_eq!(per_byte_rate(0.000015), 1);
    }

    #[tokio::test]
    async fn test_estimate_converts_node_rate() {
        let estimator = estimator(ok(json!({"feerate": 0.0001, "blocks": 2})));
        let rate = estimator.estimate(Network::Test).await.unwrap();
        assert_eq!(rate.per_byte, 10);
        assert_eq!(rate.per_kb, 0.0001);
    }

    #[tokio::test]
    async fn test_estimate_clamps_high_rate() {
        let estimator = estimator(ok(json!({"feerate": 0.2, "blocks": 2})));
        let rate = estimator.estimate(Network::Main).await.unwrap();
        assert_eq!(rate.per_kb, 0.1);
        assert_eq!(rate.per_byte, 10_000);
    }

    #[tokio::test]
    async fn test_negative_rate_is_unavailable() {
        let estimator = estimator(ok(json!({"feerate": -1, "blocks": 2})));
        let err = estimator.estimate(Network::Test).await.unwrap_err();
        assert!(matches!(err, GatewayError::FeeUnavailable(_)));
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_missing_estimate_is_unavailable() {
        let estimator = estimator(ok(json!({"errors": ["Insufficient data or no feerate found"], "blocks": 0})));
        let err = estimator.estimate(Network::Test).await.unwrap_err();
        assert!(matches!(err, GatewayError::FeeUnavailable(_)));
    }

    #[tokio::test]
    async fn test_node_error_is_wrapped() {
        let estimator = estimator(node_error(-32603, "fee estimation disabled"));
        let err = estimator.estimate(Network::Test).await.unwrap_err();
        assert!(matches!(err, GatewayError::FeeEstimateFailed(_)));
        assert!(err.to_string().contains("fee estimation disabled"));
    }
}
