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

//! Account resolution. Two signer backends are supported: the embedded
//! signer daemon, preferred when installed and unlocked, and an injected
//! external wallet daemon as fallback.
use std::str::FromStr;

use log::debug;
use rusqlite::types::Value;

use crate::{
    address::Address,
    convert_named_params,
    error::{Error, WalletDbError},
    rpc::{json_str, JsonValue},
    Result, Sprout,
};

/// Key under which the embedded signer address is cached in the wallet
const WALLET_EMBEDDED_ADDRESS_KEY: &str = "embedded_address";

/// Which signer daemon a transaction should be routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletSource {
    /// Embedded signer daemon
    Embedded,
    /// Injected external wallet daemon
    Injected,
}

impl std::fmt::Display for WalletSource {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Embedded => write!(f, "embedded"),
            Self::Injected => write!(f, "injected"),
        }
    }
}

/// The account the client will act as, together with the signer that
/// controls it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Account {
    pub address: Address,
    pub source: WalletSource,
}

impl Sprout {
    /// Whether an embedded signer daemon is configured. Feature detection
    /// only, no network round-trip is made.
    pub fn has_embedded_wallet(&self) -> bool {
        self.settings.embedded_signer.is_some()
    }

    /// Fetch the cached embedded signer address, if a previous unlock
    /// stored one.
    pub fn cached_embedded_address(&self) -> Result<Option<Address>> {
        let row = match self.wallet.query_single(
            "wallet_info",
            &["value"],
            convert_named_params! {("key", WALLET_EMBEDDED_ADDRESS_KEY)},
        ) {
            Ok(row) => row,
            Err(WalletDbError::RowNotFound) => return Ok(None),
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[cached_embedded_address] Wallet info retrieval failed: {e:?}"
                )))
            }
        };

        let Value::Text(ref addr) = row[0] else {
            return Err(Error::ParseFailed("[cached_embedded_address] Address parsing failed"))
        };

        Ok(Some(Address::from_str(addr)?))
    }

    /// Unlock the embedded signer daemon with the given passphrase and
    /// cache the address it serves.
    pub async fn unlock_embedded_wallet(&self, passphrase: &str) -> Result<Address> {
        if !self.has_embedded_wallet() {
            return Err(Error::NoEmbeddedWallet)
        }

        let params = JsonValue::Array(vec![json_str(passphrase)]);
        let rep = self.signer_request(WalletSource::Embedded, "wallet.unlock", &params).await?;

        let Some(addr) = rep.get::<String>() else {
            return Err(Error::UnexpectedJsonRpc("Unlock reply is not a string".to_string()))
        };
        let address = Address::from_str(addr)?;

        debug!(target: "wallet", "Caching embedded signer address {address}");
        let query = format!(
            "INSERT OR REPLACE INTO wallet_info ( key, value ) VALUES ('{WALLET_EMBEDDED_ADDRESS_KEY}', ?1);"
        );
        if let Err(e) = self.wallet.exec_sql(&query, rusqlite::params![address.to_string()]) {
            return Err(Error::DatabaseError(format!(
                "[unlock_embedded_wallet] Address caching failed: {e:?}"
            )))
        }

        Ok(address)
    }

    /// Forget the cached embedded signer address, forcing the next
    /// resolution to fall back to the injected wallet.
    pub fn disconnect_embedded_wallet(&self) -> Result<()> {
        let query = format!(
            "DELETE FROM wallet_info WHERE key = '{WALLET_EMBEDDED_ADDRESS_KEY}';"
        );
        if let Err(e) = self.wallet.exec_sql(&query, &[]) {
            return Err(Error::DatabaseError(format!(
                "[disconnect_embedded_wallet] Address removal failed: {e:?}"
            )))
        }

        Ok(())
    }

    /// Resolve the active account: a cached embedded signer address wins,
    /// otherwise the injected wallet daemon is asked for its account.
    pub async fn resolved_account(&self) -> Result<Account> {
        if self.has_embedded_wallet() {
            if let Some(address) = self.cached_embedded_address()? {
                return Ok(Account { address, source: WalletSource::Embedded })
            }
        }

        let rep = self
            .signer_request(WalletSource::Injected, "wallet.address", &JsonValue::Array(vec![]))
            .await
            .map_err(|_| Error::NoWalletAddress)?;

        let Some(addr) = rep.get::<String>() else {
            return Err(Error::UnexpectedJsonRpc("Address reply is not a string".to_string()))
        };

        Ok(Account { address: Address::from_str(addr)?, source: WalletSource::Injected })
    }
}
