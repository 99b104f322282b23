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

//! Wallet functionality related to transactions history.
use rusqlite::types::Value;

use crate::{
    chain::{ChainClient, TxHash, TxStatus},
    convert_named_params,
    error::Error,
    util::unix_timestamp,
    Result, Sprout,
};

/// A row of the local transactions history.
#[derive(Clone, Debug)]
pub struct TxHistoryRecord {
    pub hash: String,
    pub kind: String,
    pub status: String,
    pub created_at: u64,
}

impl Sprout {
    /// Insert or update a transaction history record.
    pub fn record_tx_history(&self, hash: &TxHash, kind: &str, status: &str) -> Result<()> {
        let query = "INSERT OR REPLACE INTO transactions_history ( transaction_hash, kind, status, created_at ) VALUES (?1, ?2, ?3, ?4);";
        if let Err(e) = self.wallet.exec_sql(
            query,
            rusqlite::params![hash.to_string(), kind, status, unix_timestamp()? as i64],
        ) {
            return Err(Error::DatabaseError(format!(
                "[record_tx_history] Record insertion failed: {e:?}"
            )))
        }

        Ok(())
    }

    /// Fetch a single transaction history record by hash.
    pub fn get_tx_history_record(&self, hash: &str) -> Result<TxHistoryRecord> {
        let row = match self.wallet.query_single(
            "transactions_history",
            &[],
            convert_named_params! {("transaction_hash", hash)},
        ) {
            Ok(row) => row,
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[get_tx_history_record] Record retrieval failed: {e:?}"
                )))
            }
        };

        parse_record(&row)
    }

    /// Fetch all transaction history records, newest first.
    pub fn get_txs_history(&self) -> Result<Vec<TxHistoryRecord>> {
        let rows = match self.wallet.query_multiple("transactions_history", &[], &[]) {
            Ok(rows) => rows,
            Err(e) => {
                return Err(Error::DatabaseError(format!(
                    "[get_txs_history] Records retrieval failed: {e:?}"
                )))
            }
        };

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(parse_record(&row)?);
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(records)
    }

    /// Re-check every unresolved record against the node and update its
    /// status.
    pub async fn resolve_txs_history(&self) -> Result<()> {
        for record in self.get_txs_history()? {
            if record.status != "Broadcasted" {
                continue
            }

            let status = match self.tx_status(&TxHash(record.hash.clone())).await? {
                TxStatus::Confirmed => "Confirmed",
                TxStatus::Reverted(_) => "Failed",
                TxStatus::NotFound => "Dropped",
                TxStatus::Pending | TxStatus::Included => continue,
            };

            self.record_tx_history(&TxHash(record.hash), &record.kind, status)?;
        }

        Ok(())
    }
}

fn parse_record(row: &[Value]) -> Result<TxHistoryRecord> {
    let [Value::Text(ref hash), Value::Text(ref kind), Value::Text(ref status), Value::Integer(created_at)] =
        row[..]
    else {
        return Err(Error::ParseFailed("[parse_record] Malformed transactions history record"))
    };

    Ok(TxHistoryRecord {
        hash: hash.clone(),
        kind: kind.clone(),
        status: status.clone(),
        created_at: created_at as u64,
    })
}
