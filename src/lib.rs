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

use std::{fs, time::Duration};

use url::Url;

/// Error codes
pub mod error;
pub use error::Result;
use error::{Error, WalletDbError};

/// JSON-RPC primitives and client
pub mod rpc;
use rpc::{client::RpcClient, jsonrpc::JsonRequest, JsonValue};

/// Chain access seam (contract calls, tx submission, statuses)
pub mod chain;
use chain::ConfirmSettings;

/// On-chain addresses
pub mod address;
use address::Address;

/// Account resolution (embedded/injected signer wallets)
pub mod wallet;
use wallet::WalletSource;

/// Token contract reads and approvals
pub mod token;

/// Vesting contract functionality
pub mod vesting;

/// Yield-farm contract functionality
pub mod farm;

/// Derived display-state calculators
pub mod view;

/// Input validation
pub mod validate;

/// Transaction submission lifecycle
pub mod lifecycle;
use lifecycle::Lifecycle;

/// Wallet functionality related to transactions history
pub mod txs_history;

/// Various utilities
pub mod util;
use util::expand_path;

/// Wallet database operations handler
pub mod walletdb;
use walletdb::{WalletDb, WalletPtr};

/// Client configuration resolved from arguments and the config file.
pub struct ClientSettings {
    /// Chain node JSON-RPC endpoint
    pub endpoint: Option<Url>,
    /// Embedded signer daemon endpoint, if one is installed
    pub embedded_signer: Option<Url>,
    /// Injected (external) wallet daemon endpoint
    pub injected_signer: Option<Url>,
    /// Vesting contract address
    pub vesting_contract: Address,
    /// Yield-farm contract address
    pub farm_contract: Address,
    /// How long to wait for a single RPC reply
    pub rpc_timeout: Duration,
    /// Receipt-confirmation polling knobs
    pub confirm: ConfirmSettings,
    /// Seconds between two refreshes of live pool views
    pub pool_refresh_interval: u64,
    /// Block-explorer base URL for linking transaction hashes
    pub explorer_url: Option<String>,
}

/// CLI-util structure
pub struct Sprout {
    /// Wallet database operations handler
    pub wallet: WalletPtr,
    /// JSON-RPC client to execute requests to the chain node
    pub rpc_client: Option<RpcClient>,
    /// Transaction submission driver and idempotency guard
    pub lifecycle: Lifecycle,
    /// Resolved client configuration
    pub settings: ClientSettings,
}

impl Sprout {
    pub async fn new(wallet_path: String, settings: ClientSettings) -> Result<Self> {
        // Initialize wallet
        let wallet_path = expand_path(&wallet_path)?;
        if !wallet_path.exists() {
            if let Some(parent) = wallet_path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        let Ok(wallet) = WalletDb::new(Some(wallet_path)) else {
            return Err(Error::DatabaseError(format!(
                "{}",
                WalletDbError::ConnectionFailed
            )))
        };

        // Initialize rpc client
        let rpc_client = match &settings.endpoint {
            Some(endpoint) => Some(RpcClient::new(endpoint.clone(), settings.rpc_timeout).await?),
            None => None,
        };

        Ok(Self { wallet, rpc_client, lifecycle: Lifecycle::new(), settings })
    }

    /// Initialize wallet with tables for sprout.
    pub fn initialize_wallet(&self) -> Result<()> {
        let wallet_schema = include_str!("../wallet.sql");
        if let Err(e) = self.wallet.exec_batch_sql(wallet_schema) {
            return Err(Error::DatabaseError(format!(
                "[initialize_wallet] Wallet schema creation failed: {e:?}"
            )))
        }

        Ok(())
    }

    /// Auxiliary function to execute a request towards the configured
    /// chain node JSON-RPC endpoint.
    pub async fn node_request(&self, method: &str, params: &JsonValue) -> Result<JsonValue> {
        let Some(ref rpc_client) = self.rpc_client else {
            return Err(Error::RpcClientNotConfigured("chain node"))
        };
        let req = JsonRequest::new(method, params.clone());
        rpc_client.request(req).await
    }

    /// Auxiliary function to execute a one-off request towards the signer
    /// daemon behind the given wallet source.
    pub async fn signer_request(
        &self,
        source: WalletSource,
        method: &str,
        params: &JsonValue,
    ) -> Result<JsonValue> {
        let endpoint = match source {
            WalletSource::Embedded => self.settings.embedded_signer.clone(),
            WalletSource::Injected => self.settings.injected_signer.clone(),
        };
        let Some(endpoint) = endpoint else {
            return Err(Error::RpcClientNotConfigured("signer"))
        };

        let req = JsonRequest::new(method, params.clone());
        RpcClient::oneshot_request(endpoint, self.settings.rpc_timeout, req).await
    }

    /// Auxiliary function to ping the configured chain node for liveness.
    pub async fn ping(&self) -> Result<()> {
        println!("Executing ping request to the node...");
        let latency = std::time::Instant::now();
        let rep = self.node_request("ping", &JsonValue::Array(vec![])).await?;
        let latency = latency.elapsed();
        println!("Got reply: {rep:?}");
        println!("Latency: {latency:?}");
        Ok(())
    }

    /// Auxiliary function to stop the current JSON-RPC client, if initialized.
    pub async fn stop_rpc_client(&self) -> Result<()> {
        if let Some(ref rpc_client) = self.rpc_client {
            rpc_client.stop().await;
        };
        Ok(())
    }

    /// Render a transaction hash as a block-explorer URL when the chain
    /// configuration provides one.
    pub fn explorer_link(&self, hash: &chain::TxHash) -> Option<String> {
        self.settings
            .explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{hash}", base.trim_end_matches('/')))
    }
}
