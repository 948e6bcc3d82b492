//! Submission of signed payloads to the node

use super::SignedPayload;
use crate::account::EthereumNode;
use crate::error::{GatewayError, GatewayResult};
use crate::rpc::Network;
use crate::utxo::BitcoinNode;

use tracing::{info, warn};

/// Broadcasts through the raw-transaction method of one ledger's node
#[derive(Clone)]
pub enum Broadcaster {
    Utxo(BitcoinNode),
    Account(EthereumNode),
}

impl Broadcaster {
    fn ledger(&self) -> &'static str {
        match self {
            Broadcaster::Utxo(_) => "bitcoin",
            Broadcaster::Account(_) => "ethereum",
        }
    }

    /// Submit once and return the node's transaction id
    pub async fn broadcast(&self, payload: &SignedPayload, network: Network) -> GatewayResult<String> {
        let signed = payload.to_hex();
        let result = match self {
            Broadcaster::Utxo(node) => node.send_raw_transaction(&signed, network).await,
            Broadcaster::Account(node) => node.send_raw_transaction(&signed, network).await,
        };

        match result {
            Ok(tx_id) => {
                info!("Broadcast {} transaction {} on {}", self.ledger(), tx_id, network);
                Ok(tx_id)
            }
            Err(e) => {
                warn!("Node rejected {} transaction on {}: {}", self.ledger(), network, e);
                Err(GatewayError::BroadcastRejected(e))
            }
        }
    }
}
