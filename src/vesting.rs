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

//! Vesting contract functionality: schedule reads, whitelist management
//! and schedule creation.
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

/// A beneficiary's vesting schedule, as stored by the contract. Durations
/// are relative to `start_time`; `revoked_at` is zero while the schedule
/// is live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VestingSchedule {
    /// Token the schedule pays out
    pub token: Address,
    /// UNIX timestamp the schedule starts at
    pub start_time: u64,
    /// Seconds from start until the cliff lifts
    pub cliff_duration: u64,
    /// Seconds from start until the schedule is fully vested
    pub vesting_duration: u64,
    /// Total raw amount locked in the schedule
    pub total_amount: BigUint,
    /// Raw amount the beneficiary already claimed
    pub amount_claimed: BigUint,
    /// UNIX timestamp of revocation, zero if not revoked
    pub revoked_at: u64,
}

impl VestingSchedule {
    /// UNIX timestamp the cliff lifts at.
    pub fn cliff_time(&self) -> u64 {
        self.start_time + self.cliff_duration
    }

    /// UNIX timestamp the schedule is fully vested at. The cliff lies
    /// within the total duration, it does not extend it.
    pub fn end_time(&self) -> u64 {
        self.start_time + self.vesting_duration
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at > 0
    }
}

/// A beneficiary's vesting state, assembled from a batched read. Every
/// field is individually nullable so one failing call never blanks the
/// whole view.
#[derive(Clone, Debug, Default)]
pub struct VestingOverview {
    pub schedule: Option<VestingSchedule>,
    pub vested_amount: Option<BigUint>,
    pub whitelisted: Option<bool>,
}

/// Build a `vestingSchedules` read call.
pub fn schedule_call(vesting: Address, beneficiary: Address) -> ContractCall {
    ContractCall::new(vesting, "vestingSchedules", vec![json_str(&beneficiary.to_string())])
}

/// Build a `whitelist` membership read call.
pub fn whitelist_call(vesting: Address, address: Address) -> ContractCall {
    ContractCall::new(vesting, "whitelist", vec![json_str(&address.to_string())])
}

/// Build a `tokens` (token-whitelist membership) read call.
pub fn token_whitelisted_call(vesting: Address, token: Address) -> ContractCall {
    ContractCall::new(vesting, "tokens", vec![json_str(&token.to_string())])
}

/// Build a `calculateVestedAmount` read call.
pub fn vested_amount_call(vesting: Address, beneficiary: Address) -> ContractCall {
    ContractCall::new(vesting, "calculateVestedAmount", vec![json_str(&beneficiary.to_string())])
}

fn parse_u64_field(obj: &HashMap<String, JsonValue>, key: &str) -> Result<u64> {
    let Some(num) = obj.get(key).and_then(|v| v.get::<f64>()) else {
        return Err(Error::UnexpectedJsonRpc(format!("Schedule reply has no {key} field")))
    };
    Ok(*num as u64)
}

fn parse_amount_field(obj: &HashMap<String, JsonValue>, key: &str) -> Result<BigUint> {
    let Some(s) = obj.get(key).and_then(|v| v.get::<String>()) else {
        return Err(Error::UnexpectedJsonRpc(format!("Schedule reply has no {key} field")))
    };
    Ok(s.parse::<BigUint>()?)
}

/// Parse a `vestingSchedules` reply. A schedule with a zero start time is
/// the contract's "no schedule" sentinel and parses to `None`.
pub fn parse_schedule(rep: &JsonValue) -> Result<Option<VestingSchedule>> {
    let Some(obj) = rep.get::<HashMap<String, JsonValue>>() else {
        return Err(Error::UnexpectedJsonRpc("Schedule reply is not an object".to_string()))
    };

    let start_time = parse_u64_field(obj, "startTime")?;
    if start_time == 0 {
        return Ok(None)
    }

    let Some(token_str) = obj.get("token").and_then(|v| v.get::<String>()) else {
        return Err(Error::UnexpectedJsonRpc("Schedule reply has no token field".to_string()))
    };

    Ok(Some(VestingSchedule {
        token: Address::from_str(token_str)?,
        start_time,
        cliff_duration: parse_u64_field(obj, "cliffDuration")?,
        vesting_duration: parse_u64_field(obj, "vestingDuration")?,
        total_amount: parse_amount_field(obj, "totalAmount")?,
        amount_claimed: parse_amount_field(obj, "amountClaimed")?,
        revoked_at: parse_u64_field(obj, "revokedAt")?,
    }))
}

impl Sprout {
    /// Fetch the vesting contract owner.
    pub async fn vesting_owner(&self) -> Result<Address> {
        let call = ContractCall::new(self.settings.vesting_contract, "owner", vec![]);
        let rep = self.contract_read(&call).await?;
        let Some(addr) = rep.get::<String>() else {
            return Err(Error::UnexpectedJsonRpc("Owner reply is not a string".to_string()))
        };
        Address::from_str(addr)
    }

    /// Fetch a beneficiary's full vesting state in a single batched read.
    /// Failing calls leave their field unset.
    pub async fn vesting_overview(&self, beneficiary: Address) -> VestingOverview {
        let vesting = self.settings.vesting_contract;
        let calls = [
            schedule_call(vesting, beneficiary),
            vested_amount_call(vesting, beneficiary),
            whitelist_call(vesting, beneficiary),
        ];
        let mut results = self.batch_read(&calls).await;
        let whitelist_rep = results.pop();
        let vested_rep = results.pop();
        let schedule_rep = results.pop();

        VestingOverview {
            schedule: schedule_rep
                .and_then(|r| r.ok())
                .and_then(|v| parse_schedule(&v).ok())
                .flatten(),
            vested_amount: vested_rep
                .and_then(|r| r.ok())
                .and_then(|v| token::parse_amount(&v).ok()),
            whitelisted: whitelist_rep
                .and_then(|r| r.ok())
                .and_then(|v| token::parse_bool(&v).ok()),
        }
    }

    /// Check whether an address is whitelisted as a beneficiary.
    pub async fn is_whitelisted(&self, address: Address) -> Result<bool> {
        let rep =
            self.contract_read(&whitelist_call(self.settings.vesting_contract, address)).await?;
        token::parse_bool(&rep)
    }

    /// Check whether a token is accepted by the vesting contract.
    pub async fn is_token_whitelisted(&self, tkn: Address) -> Result<bool> {
        let rep =
            self.contract_read(&token_whitelisted_call(self.settings.vesting_contract, tkn)).await?;
        token::parse_bool(&rep)
    }

    /// Build the submission plan for whitelisting a beneficiary.
    pub fn whitelist_add_plan(&self, account: Account, address: Address) -> SubmitPlan {
        let vesting = self.settings.vesting_contract;
        SubmitPlan {
            kind: "whitelist-add".to_string(),
            approval: None,
            action: TxRequest::new(vesting, "addToWhitelist", vec![json_str(&address.to_string())]),
            source: account.source,
            refresh: vec![Refresh::Whitelist { address }],
        }
    }

    /// Build the submission plan for removing a beneficiary from the
    /// whitelist.
    pub fn whitelist_remove_plan(&self, account: Account, address: Address) -> SubmitPlan {
        let vesting = self.settings.vesting_contract;
        SubmitPlan {
            kind: "whitelist-remove".to_string(),
            approval: None,
            action: TxRequest::new(
                vesting,
                "removeFromWhitelist",
                vec![json_str(&address.to_string())],
            ),
            source: account.source,
            refresh: vec![Refresh::Whitelist { address }],
        }
    }

    /// Build the submission plan for setting a token's whitelist
    /// membership. The contract takes the desired state explicitly.
    pub fn change_token_plan(&self, account: Account, tkn: Address, enable: bool) -> SubmitPlan {
        let vesting = self.settings.vesting_contract;
        SubmitPlan {
            kind: if enable { "token-whitelist" } else { "token-delist" }.to_string(),
            approval: None,
            action: TxRequest::new(
                vesting,
                "changeWhitelistedToken",
                vec![json_str(&tkn.to_string()), JsonValue::Boolean(enable)],
            ),
            source: account.source,
            refresh: vec![Refresh::TokenWhitelisted { token: tkn }],
        }
    }

    /// Build the submission plan for creating a vesting schedule. The
    /// locked amount is pulled from the creator, so a token approval is
    /// prepended when the given allowance does not cover it. An unknown
    /// allowance blocks submission rather than guessing. The caller passes
    /// the allowance and decimals it already fetched for validation, so
    /// building a plan costs no extra round trips.
    #[allow(clippy::too_many_arguments)]
    pub fn create_schedule_plan(
        &self,
        account: Account,
        beneficiary: Address,
        tkn: Address,
        allowance: Option<&BigUint>,
        decimals: Option<u32>,
        amount: &str,
        start_time: u64,
        cliff_duration: u64,
        vesting_duration: u64,
    ) -> Result<SubmitPlan> {
        let vesting = self.settings.vesting_contract;

        let raw_amount = match needs_approval(allowance, amount, decimals) {
            Approval::NotRequired { amount } => {
                return Ok(SubmitPlan {
                    kind: "create-schedule".to_string(),
                    approval: None,
                    action: create_schedule_request(
                        vesting,
                        beneficiary,
                        &amount,
                        start_time,
                        cliff_duration,
                        vesting_duration,
                        tkn,
                    ),
                    source: account.source,
                    refresh: vec![
                        Refresh::Schedule { beneficiary },
                        Refresh::Balance { token: tkn, owner: account.address },
                    ],
                })
            }
            Approval::Required { amount } => amount,
            Approval::Unknown => return Err(Error::ApprovalUnknown),
        };

        Ok(SubmitPlan {
            kind: "create-schedule".to_string(),
            approval: Some(token::approve_request(tkn, vesting, &raw_amount)),
            action: create_schedule_request(
                vesting,
                beneficiary,
                &raw_amount,
                start_time,
                cliff_duration,
                vesting_duration,
                tkn,
            ),
            source: account.source,
            refresh: vec![
                Refresh::Schedule { beneficiary },
                Refresh::Balance { token: tkn, owner: account.address },
                Refresh::Allowance { token: tkn, owner: account.address, spender: vesting },
            ],
        })
    }
}

// Argument order follows the contract ABI: beneficiary, amount, cliff
// duration, vesting duration, start time, token.
#[allow(clippy::too_many_arguments)]
fn create_schedule_request(
    vesting: Address,
    beneficiary: Address,
    raw_amount: &BigUint,
    start_time: u64,
    cliff_duration: u64,
    vesting_duration: u64,
    tkn: Address,
) -> TxRequest {
    TxRequest::new(
        vesting,
        "createVestingSchedule",
        vec![
            json_str(&beneficiary.to_string()),
            json_str(&raw_amount.to_str_radix(10)),
            json_str(&cliff_duration.to_string()),
            json_str(&vesting_duration.to_string()),
            json_str(&start_time.to_string()),
            json_str(&tkn.to_string()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        chain::ConfirmSettings,
        lifecycle::Lifecycle,
        rpc::JsonValue,
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

    fn owner() -> Account {
        Account { address: Address([1u8; 32]), source: WalletSource::Injected }
    }

    fn schedule_json(start: f64, revoked_at: f64) -> JsonValue {
        let token = Address([3u8; 32]).to_string();
        let raw = format!(
            r#"{{"token": "{token}", "startTime": {start}, "cliffDuration": 500, "vestingDuration": 2000, "totalAmount": "1000", "amountClaimed": "250", "revokedAt": {revoked_at}}}"#
        );
        raw.parse().unwrap()
    }

    #[test]
    fn schedule_parses() {
        let sched = parse_schedule(&schedule_json(1000.0, 0.0)).unwrap().unwrap();
        assert_eq!(sched.start_time, 1000);
        assert_eq!(sched.cliff_time(), 1500);
        assert_eq!(sched.end_time(), 3000);
        assert!(!sched.is_revoked());
        assert_eq!(sched.total_amount, BigUint::from(1000_u32));
    }

    #[test]
    fn zero_start_is_no_schedule() {
        assert!(parse_schedule(&schedule_json(0.0, 0.0)).unwrap().is_none());
    }

    #[test]
    fn revocation_flag_parses() {
        let sched = parse_schedule(&schedule_json(1000.0, 1700.0)).unwrap().unwrap();
        assert!(sched.is_revoked());
        assert_eq!(sched.revoked_at, 1700);
    }

    #[test]
    fn short_allowance_prepends_approval() {
        let sprout = client();
        let beneficiary = Address([2u8; 32]);
        let tkn = Address([3u8; 32]);
        let allowance = BigUint::from(0_u32);

        let plan = sprout
            .create_schedule_plan(
                owner(),
                beneficiary,
                tkn,
                Some(&allowance),
                Some(18),
                "100",
                1000,
                500,
                2000,
            )
            .unwrap();
        let scaled = BigUint::from(100_u32) * BigUint::from(10_u64).pow(18);

        let approval = plan.approval.unwrap();
        assert_eq!(approval.contract, tkn);
        assert_eq!(approval.function, "approve");
        assert_eq!(
            approval.args[0].get::<String>().unwrap(),
            &sprout.settings.vesting_contract.to_string()
        );
        assert_eq!(approval.args[1].get::<String>().unwrap(), &scaled.to_str_radix(10));

        // beneficiary, amount, cliffDuration, vestingDuration, startTime, token
        assert_eq!(plan.action.function, "createVestingSchedule");
        assert_eq!(plan.action.args[0].get::<String>().unwrap(), &beneficiary.to_string());
        assert_eq!(plan.action.args[1].get::<String>().unwrap(), &scaled.to_str_radix(10));
        assert_eq!(plan.action.args[2].get::<String>().unwrap(), "500");
        assert_eq!(plan.action.args[3].get::<String>().unwrap(), "2000");
        assert_eq!(plan.action.args[4].get::<String>().unwrap(), "1000");
        assert_eq!(plan.action.args[5].get::<String>().unwrap(), &tkn.to_string());

        assert!(plan.refresh.contains(&Refresh::Allowance {
            token: tkn,
            owner: owner().address,
            spender: sprout.settings.vesting_contract,
        }));
    }

    #[test]
    fn covered_allowance_omits_approval() {
        let sprout = client();
        let allowance = BigUint::from(100_u32) * BigUint::from(10_u64).pow(18);

        let plan = sprout
            .create_schedule_plan(
                owner(),
                Address([2u8; 32]),
                Address([3u8; 32]),
                Some(&allowance),
                Some(18),
                "100",
                1000,
                500,
                2000,
            )
            .unwrap();
        assert!(plan.approval.is_none());
        assert!(!plan.refresh.iter().any(|r| matches!(r, Refresh::Allowance { .. })));
    }

    #[test]
    fn unknown_allowance_blocks_schedule_creation() {
        let sprout = client();
        let allowance = BigUint::from(0_u32);

        let err = sprout
            .create_schedule_plan(
                owner(),
                Address([2u8; 32]),
                Address([3u8; 32]),
                None,
                Some(18),
                "100",
                1000,
                500,
                2000,
            )
            .unwrap_err();
        assert!(matches!(err, Error::ApprovalUnknown));

        let err = sprout
            .create_schedule_plan(
                owner(),
                Address([2u8; 32]),
                Address([3u8; 32]),
                Some(&allowance),
                None,
                "100",
                1000,
                500,
                2000,
            )
            .unwrap_err();
        assert!(matches!(err, Error::ApprovalUnknown));
    }

    #[test]
    fn malformed_schedule_rejected() {
        let rep: JsonValue = r#"{"startTime": 1000}"#.parse().unwrap();
        assert!(parse_schedule(&rep).is_err());
        let rep: JsonValue = r#""not an object""#.parse().unwrap();
        assert!(parse_schedule(&rep).is_err());
    }
}
