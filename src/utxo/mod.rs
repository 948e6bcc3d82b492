//! UTXO-model transaction construction
//!
//! Handles:
//! - Smart-fee estimation with sanity clamping
//! - Caller-ordered input selection and change computation
//! - Unsigned transaction serialization

pub mod builder;
pub mod fee;
pub mod node;

pub use builder::{BuiltTransaction, FeeDeductionPolicy, TransactionBuilder};
pub use fee::{FeeRate, FeeRateEstimator};
pub use node::BitcoinNode;

use crate::rpc::Network;

use bitcoin::ScriptBuf;
use serde::{Deserialize, Serialize};

/// Minor units per major unit (satoshi per coin)
pub const SATS_PER_COIN: u64 = 100_000_000;

/// An unspent output offered by the caller as a candidate input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnspentOutput {
    #[serde(rename = "txid")]
    pub transaction_id: String,
    #[serde(rename = "vout")]
    pub output_index: u32,
    /// Value in satoshi
    pub amount: u64,
    #[serde(rename = "pk_script")]
    pub locking_script: ScriptBuf,
}

/// A request to move `amount` satoshi from `source_address` to `destination_address`
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Candidate inputs, consumed in this exact order
    pub inputs: Vec<UnspentOutput>,
    pub source_address: String,
    pub destination_address: String,
    pub amount: u64,
    pub fee_rate_per_byte: u64,
    pub network: Network,
}
