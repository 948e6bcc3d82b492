//! Legacy account transaction assembly and its RLP transport encoding

use super::sequencer::TransferPlan;
use crate::error::{GatewayError, GatewayResult};

use ethers::types::{Address, Bytes, NameOrAddress, TransactionRequest, U256};
use ethers::utils::rlp;

/// Fixed-shape unsigned legacy transfer with empty call data
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedAccountTransaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
}

impl UnsignedAccountTransaction {
    pub fn to_request(&self) -> TransactionRequest {
        TransactionRequest::new()
            .nonce(self.nonce)
            .gas_price(self.gas_price)
            .gas(self.gas_limit)
            .to(self.to)
            .value(self.value)
            .data(Bytes::new())
    }

    /// Six-field RLP list `[nonce, gasPrice, gasLimit, to, value, data]`
    pub fn encode(&self) -> Vec<u8> {
        self.to_request().rlp().to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }

    /// Decode hex produced by [`to_hex`](Self::to_hex); a `0x` prefix is accepted
    pub fn from_hex(raw: &str) -> GatewayResult<Self> {
        let bytes = hex::decode(raw.strip_prefix("0x").unwrap_or(raw))
            .map_err(|e| malformed(e.to_string()))?;
        let request = TransactionRequest::decode_unsigned_rlp(&rlp::Rlp::new(&bytes))
            .map_err(|e| malformed(e.to_string()))?;
        Self::try_from(request)
    }
}

impl TryFrom<TransactionRequest> for UnsignedAccountTransaction {
    type Error = GatewayError;

    fn try_from(request: TransactionRequest) -> GatewayResult<Self> {
        let to = match request.to {
            Some(NameOrAddress::Address(to)) => to,
            _ => return Err(malformed("missing recipient".to_string())),
        };
        if request.data.as_ref().is_some_and(|data| !data.is_empty()) {
            return Err(malformed("call data is not supported".to_string()));
        }

        let nonce = request.nonce.unwrap_or_default();
        let gas = request.gas.unwrap_or_default();
        if nonce > U256::from(u64::MAX) || gas > U256::from(u64::MAX) {
            return Err(malformed("nonce or gas limit out of range".to_string()));
        }

        Ok(Self {
            nonce: nonce.as_u64(),
            gas_price: request.gas_price.unwrap_or_default(),
            gas_limit: gas.as_u64(),
            to,
            value: request.value.unwrap_or_default(),
        })
    }
}

fn malformed(message: String) -> GatewayError {
    GatewayError::SigningFailed(format!("malformed unsigned transaction: {}", message))
}

/// Turns a sequenced plan into the unsigned wire form
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountAssembler;

impl AccountAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn transaction(&self, plan: &TransferPlan) -> UnsignedAccountTransaction {
        UnsignedAccountTransaction {
            nonce: plan.nonce,
            gas_price: plan.gas_price,
            gas_limit: plan.gas_limit,
            to: plan.to,
            value: plan.value,
        }
    }

    /// Unsigned transaction hex without `0x`
    pub fn assemble(&self, plan: &TransferPlan) -> String {
        self.transaction(plan).to_hex()
    }
}
