//! Input selection and unsigned transaction construction

use super::{TransferRequest, UnspentOutput};
use crate::error::{GatewayError, GatewayResult};

use bitcoin::absolute::LockTime;
use bitcoin::consensus::Encodable;
use bitcoin::transaction::Version;
use bitcoin::{Address, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use serde::Deserialize;
use std::str::FromStr;
use tracing::debug;

/// Which output pays the network fee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeDeductionPolicy {
    /// The destination output is reduced by the fee
    #[default]
    #[serde(alias = "destination")]
    DestinationBears,
    /// The change output is reduced by the fee
    #[serde(alias = "sender")]
    SenderBears,
}

/// Heuristic serialized size: 180 bytes per input, 34 per output, 10 fixed, 1 per input
pub fn estimate_size(input_count: usize, output_count: usize) -> u64 {
    (180 * input_count + 34 * output_count + 10 + input_count) as u64
}

/// Result of a build: the unsigned transaction and the fee it pays
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub transaction: Transaction,
    pub raw_hex: String,
    pub fee_sats: u64,
}

impl BuiltTransaction {
    /// Fee in coins
    pub fn fee(&self) -> f64 {
        Amount::from_sat(self.fee_sats).to_btc()
    }
}

/// Builds unsigned transactions from caller-ordered inputs
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    policy: FeeDeductionPolicy,
}

impl TransactionBuilder {
    pub fn new(policy: FeeDeductionPolicy) -> Self {
        Self { policy }
    }

    /// Select inputs, build outputs, charge the fee and serialize
    pub fn build(&self, request: &TransferRequest) -> GatewayResult<BuiltTransaction> {
        if request.amount == 0 {
            return Err(GatewayError::InvalidRequest("amount must be positive".to_string()));
        }
        if request.inputs.is_empty() {
            return Err(GatewayError::InvalidRequest("no inputs supplied".to_string()));
        }

        let (inputs, selected_total) = select_inputs(&request.inputs, request.amount)?;
        let params = request.network.bitcoin_params();

        let mut outputs = vec![TxOut {
            value: Amount::from_sat(request.amount),
            script_pubkey: locking_script(&request.destination_address, params)?,
        }];

        if selected_total < request.amount {
            return Err(GatewayError::InsufficientBalance {
                have: selected_total.to_string(),
                need: request.amount.to_string(),
            });
        }

        let change = selected_total - request.amount;
        if change != 0 {
            outputs.push(TxOut {
                value: Amount::from_sat(change),
                script_pubkey: locking_script(&request.source_address, params)?,
            });
        }

        let size = estimate_size(inputs.len(), outputs.len());
        let total_fee = request
            .fee_rate_per_byte
            .checked_mul(size)
            .ok_or_else(|| GatewayError::InvalidRequest("fee rate overflows".to_string()))?;

        // Compares amount minus fee, not amount plus fee, with the selected total
        if request.amount as i128 - total_fee as i128 >= selected_total as i128 {
            return Err(GatewayError::InsufficientBalance {
                have: selected_total.to_string(),
                need: (request.amount as u128 + total_fee as u128).to_string(),
            });
        }

        self.charge_fee(&mut outputs, request.amount, change, total_fee)?;

        debug!(
            "Built transaction: {} inputs, {} outputs, size {} bytes, fee {} sat",
            inputs.len(),
            outputs.len(),
            size,
            total_fee
        );

        let transaction = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: inputs,
            output: outputs,
        };

        let mut raw = Vec::new();
        transaction
            .consensus_encode(&mut raw)
            .map_err(|e| GatewayError::SerializationFailed(e.to_string()))?;

        Ok(BuiltTransaction {
            transaction,
            raw_hex: hex::encode(raw),
            fee_sats: total_fee,
        })
    }

    fn charge_fee(
        &self,
        outputs: &mut [TxOut],
        amount: u64,
        change: u64,
        total_fee: u64,
    ) -> GatewayResult<()> {
        match self.policy {
            FeeDeductionPolicy::DestinationBears => {
                let value = amount.checked_sub(total_fee).ok_or_else(|| {
                    GatewayError::InsufficientBalance {
                        have: amount.to_string(),
                        need: total_fee.to_string(),
                    }
                })?;
                outputs[0].value = Amount::from_sat(value);
            }
            FeeDeductionPolicy::SenderBears => {
                if outputs.len() < 2 || change <= total_fee {
                    return Err(GatewayError::InsufficientBalance {
                        have: change.to_string(),
                        need: total_fee.to_string(),
                    });
                }
                outputs[1].value = Amount::from_sat(change - total_fee);
            }
        }
        Ok(())
    }
}

/// Consume inputs in caller order until their sum reaches `amount`.
///
/// The threshold-crossing input is consumed whole; if the threshold is never
/// reached every input is consumed.
fn select_inputs(candidates: &[UnspentOutput], amount: u64) -> GatewayResult<(Vec<TxIn>, u64)> {
    let mut selected_total: u64 = 0;
    let mut inputs = Vec::new();

    for candidate in candidates {
        selected_total = selected_total
            .checked_add(candidate.amount)
            .ok_or_else(|| GatewayError::InvalidRequest("input amounts overflow".to_string()))?;

        let txid = Txid::from_str(&candidate.transaction_id).map_err(|e| {
            GatewayError::InputParseFailed {
                txid: candidate.transaction_id.clone(),
                message: e.to_string(),
            }
        })?;

        inputs.push(TxIn {
            previous_output: OutPoint::new(txid, candidate.output_index),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        });

        if selected_total >= amount {
            break;
        }
    }

    Ok((inputs, selected_total))
}

pub(crate) fn locking_script(address: &str, network: bitcoin::Network) -> GatewayResult<ScriptBuf> {
    let address = Address::from_str(address)
        .and_then(|addr| addr.require_network(network))
        .map_err(|e| GatewayError::AddressDecodeFailed {
            address: address.to_string(),
            message: e.to_string(),
        })?;
    Ok(address.script_pubkey())
}
