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

//! Chain access seam: contract reads, transaction submission and
//! confirmation status, behind a trait so the lifecycle and read layers
//! can be exercised against a mock node.
use async_trait::async_trait;
use log::warn;

use crate::{
    address::Address,
    error::Error,
    farm,
    rpc::{json_str, JsonValue},
    token, vesting,
    wallet::WalletSource,
    Result, Sprout,
};

/// A single read-only contract call.
#[derive(Clone, Debug)]
pub struct ContractCall {
    /// Target contract address
    pub contract: Address,
    /// Contract function name
    pub function: String,
    /// Call arguments
    pub args: Vec<JsonValue>,
}

impl ContractCall {
    pub fn new(contract: Address, function: &str, args: Vec<JsonValue>) -> Self {
        Self { contract, function: function.to_string(), args }
    }
}

/// A state-mutating contract call, to be signed and broadcast.
#[derive(Clone, Debug)]
pub struct TxRequest {
    /// Target contract address
    pub contract: Address,
    /// Contract function name
    pub function: String,
    /// Call arguments
    pub args: Vec<JsonValue>,
}

impl TxRequest {
    pub fn new(contract: Address, function: &str, args: Vec<JsonValue>) -> Self {
        Self { contract, function: function.to_string(), args }
    }
}

/// Hash identifying a broadcast transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxHash(pub String);

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Confirmation status of a broadcast transaction, as reported by the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxStatus {
    /// The node does not know the hash (yet)
    NotFound,
    /// Sitting in the mempool
    Pending,
    /// Included in a block, awaiting finality
    Included,
    /// Finalized successfully
    Confirmed,
    /// Included but the contract call failed
    Reverted(String),
}

/// Receipt-polling knobs. Both are expressed in seconds and are
/// configurable; waiting for a confirmation is never unbounded.
#[derive(Clone, Copy, Debug)]
pub struct ConfirmSettings {
    /// Seconds between two status polls
    pub poll_interval: u64,
    /// Total seconds to wait before giving up on a confirmation
    pub timeout: u64,
}

impl Default for ConfirmSettings {
    fn default() -> Self {
        Self { poll_interval: 2, timeout: 120 }
    }
}

/// A read that must be re-issued once a transaction touching it confirms.
/// Every write path declares the reads it invalidates; there is no global
/// invalidation bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Refresh {
    Balance { token: Address, owner: Address },
    Allowance { token: Address, owner: Address, spender: Address },
    StakePosition { owner: Address },
    PendingRewards { owner: Address },
    Schedule { beneficiary: Address },
    Whitelist { address: Address },
    TokenWhitelisted { token: Address },
    PoolState,
}

/// Chain access used by the read layer and the transaction lifecycle.
#[async_trait]
pub trait ChainClient: Sync {
    /// Execute a single read-only contract call.
    async fn contract_read(&self, call: &ContractCall) -> Result<JsonValue>;

    /// Ask the signer behind `source` to sign the given transaction
    /// request, returning the signed transaction blob.
    async fn sign(&self, source: WalletSource, tx: &TxRequest) -> Result<String>;

    /// Broadcast a signed transaction, returning its hash.
    async fn broadcast(&self, signed: &str) -> Result<TxHash>;

    /// Query the confirmation status of a broadcast transaction.
    async fn tx_status(&self, hash: &TxHash) -> Result<TxStatus>;

    /// Re-issue the given reads after a confirmed state change.
    async fn refresh(&self, set: &[Refresh]) -> Result<()>;

    /// Execute a group of read-only calls. Each result is individually
    /// nullable: a failing call never aborts its siblings.
    async fn batch_read(&self, calls: &[ContractCall]) -> Vec<Result<JsonValue>> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.contract_read(call).await);
        }
        results
    }
}

#[async_trait]
impl ChainClient for Sprout {
    async fn contract_read(&self, call: &ContractCall) -> Result<JsonValue> {
        let params = JsonValue::Array(vec![
            json_str(&call.contract.to_string()),
            json_str(&call.function),
            JsonValue::Array(call.args.clone()),
        ]);
        self.node_request("contract.read", &params).await
    }

    async fn sign(&self, source: WalletSource, tx: &TxRequest) -> Result<String> {
        let params = JsonValue::Array(vec![
            json_str(&tx.contract.to_string()),
            json_str(&tx.function),
            JsonValue::Array(tx.args.clone()),
        ]);
        let rep = self.signer_request(source, "wallet.sign_tx", &params).await?;

        let Some(signed) = rep.get::<String>() else {
            return Err(Error::UnexpectedJsonRpc("Signer reply is not a string".to_string()))
        };
        Ok(signed.clone())
    }

    async fn broadcast(&self, signed: &str) -> Result<TxHash> {
        let params = JsonValue::Array(vec![json_str(signed)]);
        let rep = self.node_request("tx.broadcast", &params).await?;

        let Some(hash) = rep.get::<String>() else {
            return Err(Error::UnexpectedJsonRpc("Broadcast reply is not a string".to_string()))
        };
        Ok(TxHash(hash.clone()))
    }

    async fn tx_status(&self, hash: &TxHash) -> Result<TxStatus> {
        let params = JsonValue::Array(vec![json_str(&hash.0)]);
        let rep = self.node_request("tx.status", &params).await?;

        let Some(obj) = rep.get::<std::collections::HashMap<String, JsonValue>>() else {
            return Err(Error::UnexpectedJsonRpc("Status reply is not an object".to_string()))
        };
        let Some(status) = obj.get("status").and_then(|v| v.get::<String>()) else {
            return Err(Error::UnexpectedJsonRpc("Status reply has no status field".to_string()))
        };

        match status.as_str() {
            "not_found" => Ok(TxStatus::NotFound),
            "pending" => Ok(TxStatus::Pending),
            "included" => Ok(TxStatus::Included),
            "confirmed" => Ok(TxStatus::Confirmed),
            "reverted" => {
                let reason = match obj.get("error").and_then(|v| v.get::<String>()) {
                    Some(r) => r.clone(),
                    None => "execution reverted".to_string(),
                };
                Ok(TxStatus::Reverted(reason))
            }
            x => Err(Error::UnexpectedJsonRpc(format!("Unknown transaction status: {x}"))),
        }
    }

    async fn refresh(&self, set: &[Refresh]) -> Result<()> {
        let vesting_contract = self.settings.vesting_contract;
        let farm_contract = self.settings.farm_contract;

        let mut calls = vec![];
        for item in set {
            match item {
                Refresh::Balance { token, owner } => {
                    calls.push(token::balance_of_call(*token, *owner))
                }
                Refresh::Allowance { token, owner, spender } => {
                    calls.push(token::allowance_call(*token, *owner, *spender))
                }
                Refresh::StakePosition { owner } => {
                    calls.push(farm::user_info_call(farm_contract, *owner))
                }
                Refresh::PendingRewards { owner } => {
                    calls.push(farm::pending_rewards_call(farm_contract, *owner))
                }
                Refresh::Schedule { beneficiary } => {
                    calls.push(vesting::schedule_call(vesting_contract, *beneficiary))
                }
                Refresh::Whitelist { address } => {
                    calls.push(vesting::whitelist_call(vesting_contract, *address))
                }
                Refresh::TokenWhitelisted { token } => {
                    calls.push(vesting::token_whitelisted_call(vesting_contract, *token))
                }
                Refresh::PoolState => calls.extend(farm::pool_calls(farm_contract)),
            }
        }

        // A refresh failure is a read failure: it leaves a stale view but
        // never invalidates the confirmed transaction.
        for (call, result) in calls.iter().zip(self.batch_read(&calls).await) {
            if let Err(e) = result {
                warn!(
                    target: "chain::refresh",
                    "Refreshing {} on {} failed: {e}", call.function, call.contract
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{rpc::json_str, wallet::WalletSource};

    /// Read-only mock that fails any call against the "dead" contract.
    struct FlakyNode {
        dead: Address,
    }

    #[async_trait]
    impl ChainClient for FlakyNode {
        async fn contract_read(&self, call: &ContractCall) -> Result<JsonValue> {
            if call.contract == self.dead {
                return Err(Error::JsonRpcError("no contract at address".to_string()))
            }
            Ok(json_str(&call.function))
        }

        async fn sign(&self, _source: WalletSource, _tx: &TxRequest) -> Result<String> {
            unreachable!()
        }

        async fn broadcast(&self, _signed: &str) -> Result<TxHash> {
            unreachable!()
        }

        async fn tx_status(&self, _hash: &TxHash) -> Result<TxStatus> {
            unreachable!()
        }

        async fn refresh(&self, _set: &[Refresh]) -> Result<()> {
            unreachable!()
        }
    }

    #[test]
    fn batch_read_partial_failure() {
        smol::block_on(async {
            let good = Address([1u8; 32]);
            let dead = Address([2u8; 32]);
            let node = FlakyNode { dead };

            let calls = [
                ContractCall::new(good, "totalStaked", vec![]),
                ContractCall::new(dead, "totalStaked", vec![]),
                ContractCall::new(good, "rewardRate", vec![]),
            ];
            let results = node.batch_read(&calls).await;

            assert_eq!(results.len(), 3);
            assert!(results[0].is_ok());
            assert!(results[1].is_err());
            assert_eq!(results[2].as_ref().unwrap(), &json_str("rewardRate"));
        });
    }
}
