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

//! Yield-farm contract functionality: pool and position reads, staking,
//! withdrawals and reward claims.
use std::{collections::HashMap, str::FromStr};

use num_bigint::BigUint;

use crate::{
    address::Address,
    chain::{ChainClient, ContractCall, Refresh, TxRequest},
    error::Error,
    lifecycle::SubmitPlan,
    rpc::{json_str, JsonValue},
    token,
    view::{needs_approval, Approval},
    wallet::Account,
    Result, Sprout,
};

/// A staker's position in the farm.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StakePosition {
    /// Raw amount of LP tokens staked
    pub amount: BigUint,
    /// Bookkeeping value the contract uses for reward accounting
    pub reward_debt: BigUint,
    /// UNIX timestamp of the first stake, zero if never staked
    pub stake_time: u64,
}

/// Global farm state, assembled from a batched read. Every field is
/// individually nullable: one failing call leaves a gap in the view, it
/// never blanks the other fields.
#[derive(Clone, Debug, Default)]
pub struct PoolSnapshot {
    pub lp_token: Option<Address>,
    pub reward_token: Option<Address>,
    pub reward_rate: Option<BigUint>,
    pub total_staked: Option<BigUint>,
    pub reward_per_token_stored: Option<BigUint>,
    pub last_update_time: Option<u64>,
    /// Staking-duration thresholds unlocking the boost tiers, in seconds
    pub boost_thresholds: [Option<u64>; 3],
}

/// Build a `userInfo` read call.
pub fn user_info_call(farm: Address, owner: Address) -> ContractCall {
    ContractCall::new(farm, "userInfo", vec![json_str(&owner.to_string())])
}

/// Build a `pendingRewards` read call.
pub fn pending_rewards_call(farm: Address, owner: Address) -> ContractCall {
    ContractCall::new(farm, "pendingRewards", vec![json_str(&owner.to_string())])
}

/// Build the batched read covering the global pool state.
pub fn pool_calls(farm: Address) -> Vec<ContractCall> {
    [
        "lpToken",
        "rewardToken",
        "rewardRate",
        "totalStaked",
        "rewardPerTokenStored",
        "lastUpdateTime",
        "BOOST_THRESHOLD_1",
        "BOOST_THRESHOLD_2",
        "BOOST_THRESHOLD_3",
    ]
    .iter()
    .map(|function| ContractCall::new(farm, function, vec![]))
    .collect()
}

/// Parse a `userInfo` reply.
pub fn parse_position(rep: &JsonValue) -> Result<StakePosition> {
    let Some(obj) = rep.get::<HashMap<String, JsonValue>>() else {
        return Err(Error::UnexpectedJsonRpc("Position reply is not an object".to_string()))
    };

    let amount_field = |key: &str| -> Result<BigUint> {
        let Some(s) = obj.get(key).and_then(|v| v.get::<String>()) else {
            return Err(Error::UnexpectedJsonRpc(format!("Position reply has no {key} field")))
        };
        Ok(s.parse::<BigUint>()?)
    };

    let Some(stake_time) = obj.get("stakeTime").and_then(|v| v.get::<f64>()) else {
        return Err(Error::UnexpectedJsonRpc("Position reply has no stakeTime field".to_string()))
    };

    Ok(StakePosition {
        amount: amount_field("amount")?,
        reward_debt: amount_field("rewardDebt")?,
        stake_time: *stake_time as u64,
    })
}

fn parse_address(rep: &JsonValue) -> Result<Address> {
    let Some(addr) = rep.get::<String>() else {
        return Err(Error::UnexpectedJsonRpc("Address reply is not a string".to_string()))
    };
    Address::from_str(addr)
}

fn parse_seconds(rep: &JsonValue) -> Result<u64> {
    if let Some(num) = rep.get::<f64>() {
        return Ok(*num as u64)
    }
    let Some(s) = rep.get::<String>() else {
        return Err(Error::UnexpectedJsonRpc("Seconds reply is not a number".to_string()))
    };
    Ok(s.parse::<u64>()?)
}

impl Sprout {
    /// Fetch the global pool state in a single batched read.
    pub async fn pool_snapshot(&self) -> PoolSnapshot {
        let calls = pool_calls(self.settings.farm_contract);
        let results = self.batch_read(&calls).await;
        let ok = |idx: usize| results.get(idx).and_then(|r| r.as_ref().ok());

        PoolSnapshot {
            lp_token: ok(0).and_then(|v| parse_address(v).ok()),
            reward_token: ok(1).and_then(|v| parse_address(v).ok()),
            reward_rate: ok(2).and_then(|v| token::parse_amount(v).ok()),
            total_staked: ok(3).and_then(|v| token::parse_amount(v).ok()),
            reward_per_token_stored: ok(4).and_then(|v| token::parse_amount(v).ok()),
            last_update_time: ok(5).and_then(|v| parse_seconds(v).ok()),
            boost_thresholds: [
                ok(6).and_then(|v| parse_seconds(v).ok()),
                ok(7).and_then(|v| parse_seconds(v).ok()),
                ok(8).and_then(|v| parse_seconds(v).ok()),
            ],
        }
    }

    /// Fetch a staker's position.
    pub async fn stake_position(&self, owner: Address) -> Result<StakePosition> {
        let rep = self.contract_read(&user_info_call(self.settings.farm_contract, owner)).await?;
        parse_position(&rep)
    }

    /// Fetch a staker's accrued but unclaimed rewards.
    pub async fn pending_rewards(&self, owner: Address) -> Result<BigUint> {
        let rep =
            self.contract_read(&pending_rewards_call(self.settings.farm_contract, owner)).await?;
        token::parse_amount(&rep)
    }

    /// Ask the contract for a staker's current boost multiplier, in basis
    /// points.
    pub async fn boost_multiplier(&self, owner: Address) -> Result<u64> {
        let call = ContractCall::new(
            self.settings.farm_contract,
            "calculateBoostMultiplier",
            vec![json_str(&owner.to_string())],
        );
        parse_seconds(&self.contract_read(&call).await?)
    }

    /// Build the submission plan for staking LP tokens. Staking pulls the
    /// tokens from the staker, so a token approval is prepended when the
    /// given allowance does not cover the amount. An unknown allowance
    /// blocks submission rather than guessing. The caller passes the LP
    /// token, allowance and decimals it already fetched for validation,
    /// so building a plan costs no extra round trips.
    pub fn stake_plan(
        &self,
        account: Account,
        lp_token: Address,
        allowance: Option<&BigUint>,
        decimals: Option<u32>,
        amount: &str,
    ) -> Result<SubmitPlan> {
        let farm = self.settings.farm_contract;

        let refresh_base = vec![
            Refresh::StakePosition { owner: account.address },
            Refresh::PendingRewards { owner: account.address },
            Refresh::Balance { token: lp_token, owner: account.address },
            Refresh::PoolState,
        ];

        match needs_approval(allowance, amount, decimals) {
            Approval::NotRequired { amount } => Ok(SubmitPlan {
                kind: "stake".to_string(),
                approval: None,
                action: stake_request(farm, &amount),
                source: account.source,
                refresh: refresh_base,
            }),
            Approval::Required { amount } => {
                let mut refresh = refresh_base;
                refresh.push(Refresh::Allowance {
                    token: lp_token,
                    owner: account.address,
                    spender: farm,
                });
                Ok(SubmitPlan {
                    kind: "stake".to_string(),
                    approval: Some(token::approve_request(lp_token, farm, &amount)),
                    action: stake_request(farm, &amount),
                    source: account.source,
                    refresh,
                })
            }
            Approval::Unknown => Err(Error::ApprovalUnknown),
        }
    }

    /// Build the submission plan for withdrawing staked LP tokens.
    pub fn withdraw_plan(&self, account: Account, raw_amount: &BigUint) -> SubmitPlan {
        let farm = self.settings.farm_contract;
        SubmitPlan {
            kind: "withdraw".to_string(),
            approval: None,
            action: TxRequest::new(
                farm,
                "withdraw",
                vec![json_str(&raw_amount.to_str_radix(10))],
            ),
            source: account.source,
            refresh: vec![
                Refresh::StakePosition { owner: account.address },
                Refresh::PendingRewards { owner: account.address },
                Refresh::PoolState,
            ],
        }
    }

    /// Build the submission plan for claiming accrued rewards.
    pub fn claim_plan(&self, account: Account) -> SubmitPlan {
        let farm = self.settings.farm_contract;
        SubmitPlan {
            kind: "claim".to_string(),
            approval: None,
            action: TxRequest::new(farm, "claimRewards", vec![]),
            source: account.source,
            refresh: vec![
                Refresh::PendingRewards { owner: account.address },
                Refresh::StakePosition { owner: account.address },
            ],
        }
    }

    /// Build the submission plan for an emergency withdrawal, forfeiting
    /// accrued rewards.
    pub fn emergency_withdraw_plan(&self, account: Account) -> SubmitPlan {
        let farm = self.settings.farm_contract;
        SubmitPlan {
            kind: "emergency-withdraw".to_string(),
            approval: None,
            action: TxRequest::new(farm, "emergencyWithdraw", vec![]),
            source: account.source,
            refresh: vec![
                Refresh::StakePosition { owner: account.address },
                Refresh::PendingRewards { owner: account.address },
                Refresh::PoolState,
            ],
        }
    }

    /// Build the submission plan for changing the pool reward rate. Owner
    /// only, the contract enforces it.
    pub fn set_reward_rate_plan(&self, account: Account, raw_rate: &BigUint) -> SubmitPlan {
        let farm = self.settings.farm_contract;
        SubmitPlan {
            kind: "set-reward-rate".to_string(),
            approval: None,
            action: TxRequest::new(
                farm,
                "updateRewardRate",
                vec![json_str(&raw_rate.to_str_radix(10))],
            ),
            source: account.source,
            refresh: vec![Refresh::PoolState],
        }
    }
}

fn stake_request(farm: Address, raw_amount: &BigUint) -> TxRequest {
    TxRequest::new(farm, "stake", vec![json_str(&raw_amount.to_str_radix(10))])
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        chain::ConfirmSettings,
        lifecycle::Lifecycle,
        wallet::WalletSource,
        walletdb::WalletDb,
        ClientSettings,
    };

    fn client() -> Sprout {
        Sprout {
            wallet: WalletDb::new(None).unwrap(),
            rpc_client: None,
            lifecycle: Lifecycle::new(),
            settings: ClientSettings {
                endpoint: None,
                embedded_signer: None,
                injected_signer: None,
                vesting_contract: Address([7u8; 32]),
                farm_contract: Address([9u8; 32]),
                rpc_timeout: Duration::from_secs(1),
                confirm: ConfirmSettings::default(),
                pool_refresh_interval: 60,
                explorer_url: None,
            },
        }
    }

    fn staker() -> Account {
        Account { address: Address([1u8; 32]), source: WalletSource::Injected }
    }

    #[test]
    fn short_allowance_prepends_approval() {
        let sprout = client();
        let lp = Address([4u8; 32]);
        let allowance = BigUint::from(0_u32);

        let plan = sprout.stake_plan(staker(), lp, Some(&allowance), Some(18), "100").unwrap();
        let scaled = BigUint::from(100_u32) * BigUint::from(10_u64).pow(18);

        let approval = plan.approval.unwrap();
        assert_eq!(approval.contract, lp);
        assert_eq!(approval.function, "approve");
        assert_eq!(
            approval.args[0].get::<String>().unwrap(),
            &sprout.settings.farm_contract.to_string()
        );
        assert_eq!(approval.args[1].get::<String>().unwrap(), &scaled.to_str_radix(10));

        assert_eq!(plan.action.function, "stake");
        assert_eq!(plan.action.args[0].get::<String>().unwrap(), &scaled.to_str_radix(10));

        // The approval invalidates the allowance read
        assert!(plan.refresh.contains(&Refresh::Allowance {
            token: lp,
            owner: staker().address,
            spender: sprout.settings.farm_contract,
        }));
    }

    #[test]
    fn covered_allowance_omits_approval() {
        let sprout = client();
        let lp = Address([4u8; 32]);
        let allowance = BigUint::from(100_u32) * BigUint::from(10_u64).pow(18);

        let plan = sprout.stake_plan(staker(), lp, Some(&allowance), Some(18), "100").unwrap();
        assert!(plan.approval.is_none());
        assert_eq!(plan.action.function, "stake");
        assert!(!plan
            .refresh
            .iter()
            .any(|r| matches!(r, Refresh::Allowance { .. })));
    }

    #[test]
    fn unknown_allowance_blocks_staking() {
        let sprout = client();
        let lp = Address([4u8; 32]);
        let allowance = BigUint::from(0_u32);

        let err = sprout.stake_plan(staker(), lp, None, Some(18), "100").unwrap_err();
        assert!(matches!(err, Error::ApprovalUnknown));

        let err = sprout.stake_plan(staker(), lp, Some(&allowance), None, "100").unwrap_err();
        assert!(matches!(err, Error::ApprovalUnknown));
    }

    #[test]
    fn position_parses() {
        let rep: JsonValue =
            r#"{"amount": "500000", "rewardDebt": "120", "stakeTime": 1700000000}"#.parse().unwrap();
        let pos = parse_position(&rep).unwrap();
        assert_eq!(pos.amount, BigUint::from(500000_u32));
        assert_eq!(pos.reward_debt, BigUint::from(120_u32));
        assert_eq!(pos.stake_time, 1700000000);
    }

    #[test]
    fn malformed_position_rejected() {
        let rep: JsonValue = r#"{"amount": "500000"}"#.parse().unwrap();
        assert!(parse_position(&rep).is_err());
        let rep: JsonValue = r#"[1, 2, 3]"#.parse().unwrap();
        assert!(parse_position(&rep).is_err());
    }

    #[test]
    fn pool_calls_cover_global_state() {
        let farm = Address([9u8; 32]);
        let calls = pool_calls(farm);
        assert_eq!(calls.len(), 9);
        assert!(calls.iter().all(|c| c.contract == farm));
        assert!(calls.iter().any(|c| c.function == "totalStaked"));
        assert!(calls.iter().any(|c| c.function == "BOOST_THRESHOLD_3"));
    }
}
