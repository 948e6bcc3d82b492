//! Account/nonce-model transaction construction
//!
//! Handles:
//! - Nonce sequencing (node-reported or locally reserved)
//! - Gas price and gas limit discovery
//! - Legacy transaction assembly and its binary encoding

pub mod assembler;
pub mod gas;
pub mod node;
pub mod nonce;
pub mod sequencer;

pub use assembler::{AccountAssembler, UnsignedAccountTransaction};
pub use gas::GasOracle;
pub use node::EthereumNode;
pub use nonce::NonceStrategy;
pub use sequencer::{AccountSequencer, TransferPlan};

use crate::error::{GatewayError, GatewayResult};
use crate::rpc::Network;

use ethers::types::{Address, U256};
use ethers::utils::{format_ether, parse_ether};
use std::str::FromStr;

/// A request to move `amount` (in major units) between two accounts
#[derive(Debug, Clone)]
pub struct AccountTransferRequest {
    pub from_address: String,
    pub to_address: String,
    pub amount: f64,
    pub network: Network,
}

/// Convert a major-unit amount into wei (18 decimals)
pub fn to_minor_units(amount: f64) -> GatewayResult<U256> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(GatewayError::InvalidRequest(format!(
            "amount must be a positive number, got {}",
            amount
        )));
    }

    parse_ether(amount.to_string())
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid amount {}: {}", amount, e)))
}

/// Convert wei into major units for reporting
pub fn to_major_units(value: U256) -> f64 {
    format_ether(value).parse().unwrap_or(f64::NAN)
}

/// Parse a hex account address
pub fn parse_address(address: &str) -> GatewayResult<Address> {
    Address::from_str(address).map_err(|e| GatewayError::AddressDecodeFailed {
        address: address.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_unit_conversion() {
        assert_eq!(
            to_minor_units(0.01).unwrap(),
            U256::from(10_000_000_000_000_000u64)
        );
        assert_eq!(
            to_minor_units(1.5).unwrap(),
            U256::from(1_500_000_000_000_000_000u64)
        );
        assert!(matches!(
            to_minor_units(0.0),
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(matches!(
            to_minor_units(-0.01),
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(to_minor_units(f64::NAN).is_err());
    }

    #[test]
    fn test_major_unit_conversion() {
        assert_eq!(to_major_units(U256::from(420_000_000_000_000u64)), 0.00042);
        assert_eq!(to_major_units(U256::zero()), 0.0);
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address("0x3535353535353535353535353535353535353535").is_ok());
        assert!(parse_address("3535353535353535353535353535353535353535").is_ok());
        assert!(matches!(
            parse_address("0x1234"),
            Err(GatewayError::AddressDecodeFailed { .. })
        ));
    }
}
