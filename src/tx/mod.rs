//! Signing and broadcasting shared by both ledger models
//!
//! This module provides:
//! - `TransactionSigner`, with a node-side variant for UTXO transactions
//!   and a local variant for account transactions
//! - `Broadcaster`, submitting signed payloads to the node

mod broadcast;
mod signer;

pub use broadcast::Broadcaster;
pub use signer::{LocalSigner, RemoteSigner};

use crate::error::{GatewayError, GatewayResult};
use crate::rpc::Network;
use crate::utxo::UnspentOutput;

use async_trait::async_trait;
use std::fmt;

/// Signed transaction bytes ready for broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    pub raw: Vec<u8>,
}

impl SignedPayload {
    pub fn new(raw: Vec<u8>) -> Self {
        Self { raw }
    }

    /// Parse hex with or without a `0x` prefix
    pub fn from_hex(signed: &str) -> GatewayResult<Self> {
        hex::decode(signed.strip_prefix("0x").unwrap_or(signed))
            .map(Self::new)
            .map_err(|e| GatewayError::InvalidRequest(format!("signed transaction is not hex: {}", e)))
    }

    /// Hex without `0x`
    pub fn to_hex(&self) -> String {
        hex::encode(&self.raw)
    }
}

/// Everything a signer may need. UTXO signing uses `inputs`; account signing ignores it.
#[derive(Clone)]
pub struct SignRequest {
    pub raw_tx: String,
    pub private_key: String,
    pub inputs: Vec<UnspentOutput>,
    pub network: Network,
}

impl fmt::Debug for SignRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignRequest")
            .field("raw_tx", &self.raw_tx)
            .field("private_key", &"<redacted>")
            .field("inputs", &self.inputs.len())
            .field("network", &self.network)
            .finish()
    }
}

/// Turns an unsigned raw transaction into a signed payload
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign(&self, request: &SignRequest) -> GatewayResult<SignedPayload>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_hex() {
        let payload = SignedPayload::from_hex("0xf86c01").unwrap();
        assert_eq!(payload.raw, vec![0xf8, 0x6c, 0x01]);
        assert_eq!(payload.to_hex(), "f86c01");
        assert!(matches!(
            SignedPayload::from_hex("xyz"),
            Err(GatewayError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_sign_request_debug_hides_key() {
        let request = SignRequest {
            raw_tx: "0200".to_string(),
            private_key: "cVt4o7BGAig1UXywgGSmARhxMdzP5qvQsxKkSsc1XEkw3tDTQFpy".to_string(),
            inputs: Vec::new(),
            network: Network::Test,
        };
        let debug = format!("{:?}", request);
        assert!(!debug.contains("cVt4o7"));
        assert!(debug.contains("<redacted>"));
    }
}
