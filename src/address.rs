/* This file is part of sprout
 *
 * Copyright (C) 2023-2026 Sprout developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! On-chain account and contract addresses.
use std::str::FromStr;

use crate::{error::Error, Result};

/// Number of checksum bytes appended to the payload before encoding
const CHECKSUM_LEN: usize = 4;

/// A 32-byte chain address, rendered as base58 with a 4-byte blake3
/// checksum suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// The all-zero address, used by the contracts as an "unset" sentinel.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Whether this is the zero sentinel address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
        let hash = blake3::hash(payload);
        let mut cksum = [0u8; CHECKSUM_LEN];
        cksum.copy_from_slice(&hash.as_bytes()[..CHECKSUM_LEN]);
        cksum
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut bytes = Vec::with_capacity(32 + CHECKSUM_LEN);
        bytes.extend_from_slice(&self.0);
        bytes.extend_from_slice(&Self::checksum(&self.0));
        write!(f, "{}", bs58::encode(bytes).into_string())
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let Ok(bytes) = bs58::decode(s).into_vec() else {
            return Err(Error::InvalidAddress(s.to_string()))
        };

        if bytes.len() != 32 + CHECKSUM_LEN {
            return Err(Error::InvalidAddress(s.to_string()))
        }

        let (payload, cksum) = bytes.split_at(32);
        if cksum != Self::checksum(payload) {
            return Err(Error::InvalidAddress(s.to_string()))
        }

        let mut inner = [0u8; 32];
        inner.copy_from_slice(payload);
        Ok(Self(inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_string_roundtrip() {
        let addr = Address([7u8; 32]);
        let encoded = addr.to_string();
        assert_eq!(Address::from_str(&encoded).unwrap(), addr);
    }

    #[test]
    fn corrupted_checksum_rejected() {
        let addr = Address([7u8; 32]);
        let mut encoded = addr.to_string();
        // Flip the last character to another base58 digit
        let last = encoded.pop().unwrap();
        encoded.push(if last == '1' { '2' } else { '1' });
        assert!(Address::from_str(&encoded).is_err());
    }

    #[test]
    fn garbage_rejected() {
        assert!(Address::from_str("").is_err());
        assert!(Address::from_str("0OIl").is_err());
        assert!(Address::from_str("tooshort").is_err());
    }

    #[test]
    fn zero_sentinel() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address([1u8; 32]).is_zero());
    }
}
