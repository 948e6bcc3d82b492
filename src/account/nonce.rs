//! Nonce sequencing for account transactions
//!
//! Handles:
//! - Reading the pending nonce straight from the node
//! - Optional per-address local reservation so concurrent transfers
//!   from one sender never share a nonce
//! - Settling or rewinding a reservation once its transfer ends

use super::node::EthereumNode;
use crate::error::{GatewayError, GatewayResult};
use crate::rpc::Network;

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::types::Address;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Which sequencer the account pipeline uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonceStrategy {
    /// Trust the node's pending count on every request
    #[default]
    Node,
    /// Reserve nonces locally per sender
    Local,
}

impl NonceStrategy {
    pub fn sequencer(self, node: EthereumNode) -> Arc<dyn NonceSequencer> {
        match self {
            NonceStrategy::Node => Arc::new(NodeNonceSequencer::new(node)),
            NonceStrategy::Local => Arc::new(LockingNonceSequencer::new(node)),
        }
    }
}

/// Source of the next nonce for a sending address
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NonceSequencer: Send + Sync {
    /// Nonce the next transaction from `address` would use, without reserving it
    async fn peek_nonce(&self, address: Address, network: Network) -> GatewayResult<u64>;

    /// Reserve the next nonce for a transaction that is about to be broadcast
    async fn next_nonce(&self, address: Address, network: Network) -> GatewayResult<u64>;

    /// The reserved nonce reached the node, or may have
    async fn settle(&self, address: Address, network: Network, nonce: u64);

    /// Give back a reserved nonce that was never broadcast
    async fn release(&self, address: Address, network: Network, nonce: u64);
}

/// Returns whatever the node reports as the pending transaction count.
///
/// Two concurrent requests for the same sender can observe the same count
/// and build transactions with identical nonces.
pub struct NodeNonceSequencer {
    node: EthereumNode,
}

impl NodeNonceSequencer {
    pub fn new(node: EthereumNode) -> Self {
        Self { node }
    }
}

#[async_trait]
impl NonceSequencer for NodeNonceSequencer {
    async fn peek_nonce(&self, address: Address, network: Network) -> GatewayResult<u64> {
        let nonce = pending_nonce(&self.node, address, network).await?;
        debug!("Pending nonce for {:?} on {}: {}", address, network, nonce);
        Ok(nonce)
    }

    async fn next_nonce(&self, address: Address, network: Network) -> GatewayResult<u64> {
        self.peek_nonce(address, network).await
    }

    async fn settle(&self, _address: Address, _network: Network, _nonce: u64) {}

    async fn release(&self, _address: Address, _network: Network, _nonce: u64) {}
}

async fn pending_nonce(node: &EthereumNode, address: Address, network: Network) -> GatewayResult<u64> {
    Ok(node
        .pending_nonce(address, network)
        .await
        .map_err(GatewayError::NonceRetrievalFailed)?
        .as_u64())
}

/// Per-address reservation state
#[derive(Default)]
struct AddressNonceState {
    /// Next nonce to hand out while reservations are in flight
    next: u64,
    /// Reserved nonces whose transfer has not finished yet
    in_flight: BTreeSet<u64>,
}

impl AddressNonceState {
    /// Nonce following the node's pending count and every in-flight reservation.
    ///
    /// With nothing in flight the node's count is authoritative, so a counter
    /// left ahead by a lost transaction resyncs instead of leaving a gap.
    fn following(&self, pending: u64) -> u64 {
        if self.in_flight.is_empty() {
            pending
        } else {
            self.next.max(pending)
        }
    }
}

/// Hands out strictly increasing nonces per `(network, address)` while
/// transfers are in flight.
///
/// The node's pending count is still consulted on every call so that
/// transactions sent by other clients move the counter forward.
pub struct LockingNonceSequencer {
    node: EthereumNode,
    addresses: DashMap<(Network, Address), Arc<Mutex<AddressNonceState>>>,
}

impl LockingNonceSequencer {
    pub fn new(node: EthereumNode) -> Self {
        Self {
            node,
            addresses: DashMap::new(),
        }
    }

    fn state(&self, address: Address, network: Network) -> Arc<Mutex<AddressNonceState>> {
        self.addresses
            .entry((network, address))
            .or_default()
            .clone()
    }

    /// Finish a reservation, dropping the sender's entry once nothing is in flight
    async fn finish(&self, address: Address, network: Network, nonce: u64, rewind: bool) {
        let key = (network, address);
        let Some(state) = self.addresses.get(&key).map(|entry| entry.value().clone()) else {
            return;
        };

        {
            let mut state = state.lock().await;
            if !state.in_flight.remove(&nonce) {
                warn!(
                    "Nonce {} for {:?} on {} was not reserved",
                    nonce, address, network
                );
                return;
            }
            if rewind && state.next == nonce + 1 {
                state.next = nonce;
            }
        }
        drop(state);

        // Entries other tasks still hold are left alone.
        self.addresses.remove_if(&key, |_, state| {
            Arc::strong_count(state) == 1
                && state
                    .try_lock()
                    .map(|state| state.in_flight.is_empty())
                    .unwrap_or(false)
        });
    }
}

#[async_trait]
impl NonceSequencer for LockingNonceSequencer {
    async fn peek_nonce(&self, address: Address, network: Network) -> GatewayResult<u64> {
        let pending = pending_nonce(&self.node, address, network).await?;

        let state = self
            .addresses
            .get(&(network, address))
            .map(|entry| entry.value().clone());
        let nonce = match state {
            Some(state) => state.lock().await.following(pending),
            None => pending,
        };
        debug!("Next nonce for {:?} on {}: {}", address, network, nonce);
        Ok(nonce)
    }

    async fn next_nonce(&self, address: Address, network: Network) -> GatewayResult<u64> {
        let state = self.state(address, network);
        let mut state = state.lock().await;

        let pending = pending_nonce(&self.node, address, network).await?;
        if !state.in_flight.is_empty() && pending > state.next {
            warn!(
                "Node nonce for {:?} on {} moved ahead of local counter: {} > {}",
                address, network, pending, state.next
            );
        }

        let nonce = state.following(pending);
        state.next = nonce + 1;
        state.in_flight.insert(nonce);

        debug!("Reserved nonce {} for {:?} on {}", nonce, address, network);
        Ok(nonce)
    }

    async fn settle(&self, address: Address, network: Network, nonce: u64) {
        self.finish(address, network, nonce, false).await;
        debug!("Settled nonce {} for {:?} on {}", nonce, address, network);
    }

    async fn release(&self, address: Address, network: Network, nonce: u64) {
        self.finish(address, network, nonce, true).await;
        debug!("Released nonce {} for {:?} on {}", nonce, address, network);
    }
}
