use anyhow::{anyhow, bail, Result};
use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Human-readable prefix of bech32-rendered account addresses.
const ADDRESS_HRP: &str = "pol";

/// An amount of some fungible asset, in that asset's native base units.
///
/// The ledger never converts between decimals; every asset is bookkept in
/// whatever minimal unit it was credited in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenAmount(u64);

impl TokenAmount {
    pub const ZERO: Self = Self(0);

    pub fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    pub fn to_base_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountAddress([u8; 32]);

impl AccountAddress {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_bech32(&self) -> Result<String> {
        let hrp = Hrp::parse(ADDRESS_HRP)?;
        Ok(bech32::encode::<Bech32>(hrp, &self.0)?)
    }

    pub fn from_bech32(address: &str) -> Result<Self> {
        let (hrp, data) = bech32::decode(address)?;
        if hrp.as_str() != ADDRESS_HRP {
            bail!("Unexpected address prefix '{}'", hrp.as_str());
        }
        Self::from_payload(data)
    }

    /// Parse either rendering: bech32 with the `pol` prefix, or 32 hex
    /// bytes with an optional `0x` prefix.
    pub fn from_string(address: &str) -> Result<Self> {
        if address.starts_with(ADDRESS_HRP) {
            return Self::from_bech32(address);
        }

        let hex_str = address.strip_prefix("0x").unwrap_or(address);
        let bytes = hex::decode(hex_str)
            .map_err(|_| anyhow!("Address is neither bech32 nor hex: {}", address))?;
        Self::from_payload(bytes)
    }

    fn from_payload(bytes: Vec<u8>) -> Result<Self> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| anyhow!("Address payload is {} bytes, expected 32", b.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_bech32() {
            Ok(addr) => write!(f, "{}", addr),
            // Fall back to hex if encoding fails
            Err(_) => write!(f, "0x{}", hex::encode(&self.0[..8])),
        }
    }
}

/// Identity of a fungible asset tracked by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetId([u8; 32]);

impl AssetId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset:{}", hex::encode(&self.0[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_checked_math() {
        let a = TokenAmount::from_base_units(u64::MAX);
        assert!(a.checked_add(TokenAmount::from_base_units(1)).is_none());
        assert!(TokenAmount::ZERO
            .checked_sub(TokenAmount::from_base_units(1))
            .is_none());
        assert_eq!(
            TokenAmount::from_base_units(5).saturating_sub(TokenAmount::from_base_units(9)),
            TokenAmount::ZERO
        );
    }

    #[test]
    fn test_address_roundtrip() {
        let addr = AccountAddress::from_bytes([7; 32]);
        let encoded = addr.to_bech32().unwrap();
        assert!(encoded.starts_with("pol1"));
        assert_eq!(AccountAddress::from_bech32(&encoded).unwrap(), addr);
        assert_eq!(AccountAddress::from_string(&encoded).unwrap(), addr);
    }

    #[test]
    fn test_address_rejects_foreign_prefix_and_garbage() {
        let foreign = bech32::encode::<Bech32>(Hrp::parse("btc").unwrap(), &[7u8; 32]).unwrap();
        assert!(AccountAddress::from_bech32(&foreign).is_err());
        assert!(AccountAddress::from_string("not an address").is_err());

        // Hex of the wrong length
        assert!(AccountAddress::from_string("0xdeadbeef").is_err());
    }

    #[test]
    fn test_address_parses_hex() {
        let addr = AccountAddress::from_bytes([0xAB; 32]);
        let bare = hex::encode([0xAB; 32]);
        let prefixed = format!("0x{}", bare);

        assert_eq!(AccountAddress::from_string(&bare).unwrap(), addr);
        assert_eq!(AccountAddress::from_string(&prefixed).unwrap(), addr);
    }

    #[test]
    fn test_zero_address() {
        assert!(AccountAddress::ZERO.is_zero());
        assert!(!AccountAddress::from_bytes([1; 32]).is_zero());
    }
}
