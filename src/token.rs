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

//! Fungible-token contract reads and spending approvals.
use num_bigint::BigUint;

use crate::{
    address::Address,
    chain::{ChainClient, ContractCall, TxRequest},
    error::Error,
    rpc::{json_str, JsonValue},
    Result, Sprout,
};

/// Token metadata, fetched once per token and then treated as immutable.
/// Every field is individually nullable: a token that fails to report its
/// metadata still renders, with raw amounts.
#[derive(Clone, Debug, Default)]
pub struct TokenMeta {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u32>,
}

/// Build a `balanceOf` read call.
pub fn balance_of_call(token: Address, owner: Address) -> ContractCall {
    ContractCall::new(token, "balanceOf", vec![json_str(&owner.to_string())])
}

/// Build an `allowance` read call.
pub fn allowance_call(token: Address, owner: Address, spender: Address) -> ContractCall {
    ContractCall::new(
        token,
        "allowance",
        vec![json_str(&owner.to_string()), json_str(&spender.to_string())],
    )
}

/// Build an `approve` transaction request. The amount is the raw scaled
/// integer, stringified.
pub fn approve_request(token: Address, spender: Address, amount: &BigUint) -> TxRequest {
    TxRequest::new(
        token,
        "approve",
        vec![json_str(&spender.to_string()), json_str(&amount.to_str_radix(10))],
    )
}

/// Parse a raw integer amount from a contract-read reply. Amounts travel
/// as decimal strings so they survive u64 overflow.
pub fn parse_amount(rep: &JsonValue) -> Result<BigUint> {
    let Some(s) = rep.get::<String>() else {
        return Err(Error::UnexpectedJsonRpc("Amount reply is not a string".to_string()))
    };
    Ok(s.parse::<BigUint>()?)
}

/// Parse a boolean flag from a contract-read reply.
pub fn parse_bool(rep: &JsonValue) -> Result<bool> {
    let Some(b) = rep.get::<bool>() else {
        return Err(Error::UnexpectedJsonRpc("Flag reply is not a boolean".to_string()))
    };
    Ok(*b)
}

impl Sprout {
    /// Fetch token metadata. Each field is fetched independently, a
    /// failing read leaves its field unset rather than aborting.
    pub async fn token_meta(&self, token: Address) -> TokenMeta {
        let calls = [
            ContractCall::new(token, "name", vec![]),
            ContractCall::new(token, "symbol", vec![]),
            ContractCall::new(token, "decimals", vec![]),
        ];
        let mut results = self.batch_read(&calls).await;
        let decimals_rep = results.pop();
        let symbol_rep = results.pop();
        let name_rep = results.pop();

        let as_string = |rep: Option<Result<JsonValue>>| -> Option<String> {
            rep?.ok()?.get::<String>().cloned()
        };

        TokenMeta {
            name: as_string(name_rep),
            symbol: as_string(symbol_rep),
            decimals: decimals_rep
                .and_then(|r| r.ok())
                .and_then(|v| v.get::<f64>().copied())
                .map(|d| d as u32),
        }
    }

    /// Fetch the raw token balance of `owner`.
    pub async fn balance_of(&self, token: Address, owner: Address) -> Result<BigUint> {
        let rep = self.contract_read(&balance_of_call(token, owner)).await?;
        parse_amount(&rep)
    }

    /// Fetch the raw amount `spender` may move out of `owner`'s balance.
    pub async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<BigUint> {
        let rep = self.contract_read(&allowance_call(token, owner, spender)).await?;
        parse_amount(&rep)
    }
}
