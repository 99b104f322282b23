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

/// Main result type used throughout the codebase.
pub type Result<T> = std::result::Result<T, Error>;

/// General client errors used throughout the codebase.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // ==============
    // Parsing errors
    // ==============
    #[error("Parse failed: {0}")]
    ParseFailed(&'static str),

    #[error(transparent)]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error(transparent)]
    ParseBigIntError(#[from] num_bigint::ParseBigIntError),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    SetLoggerError(#[from] log::SetLoggerError),

    // ===============
    // Encoding errors
    // ===============
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("JSON generate error: {0}")]
    JsonGenerateError(String),

    #[error(transparent)]
    Utf8Error(#[from] std::string::FromUtf8Error),

    // ======================
    // Network-related errors
    // ======================
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Connection to {0} failed")]
    ConnectFailed(String),

    #[error("Timeout waiting for RPC reply")]
    RpcReplyTimeout,

    #[error("JSON-RPC error: {0}")]
    JsonRpcError(String),

    #[error("Unexpected JSON-RPC reply: {0}")]
    UnexpectedJsonRpc(String),

    #[error("RPC client not configured for {0}")]
    RpcClientNotConfigured(&'static str),

    // ===========================
    // Transaction-lifecycle errors
    // ===========================
    #[error("A submission is already in flight for this form")]
    SubmissionInFlight,

    #[error("Allowance not yet known, refusing to skip the approval step")]
    ApprovalUnknown,

    #[error("Transaction {0} reverted: {1}")]
    TxReverted(String, String),

    #[error("Timed out waiting for confirmation of transaction {0}")]
    ConfirmTimeout(String),

    // =============
    // Wallet errors
    // =============
    #[error("No embedded wallet credential found")]
    NoEmbeddedWallet,

    #[error("No wallet address resolved, unlock or connect a wallet first")]
    NoWalletAddress,

    #[error("Database error: {0}")]
    DatabaseError(String),

    // =================
    // Validation errors
    // =================
    #[error("Invalid input: {0}")]
    ValidationFailed(String),
}

impl From<tinyjson::JsonParseError> for Error {
    fn from(e: tinyjson::JsonParseError) -> Self {
        Self::JsonParseError(e.to_string())
    }
}

impl From<tinyjson::JsonGenerateError> for Error {
    fn from(e: tinyjson::JsonGenerateError) -> Self {
        Self::JsonGenerateError(e.to_string())
    }
}

/// Result type used in the wallet database module
pub type WalletDbResult<T> = std::result::Result<T, WalletDbError>;

/// Custom wallet database errors available for sprout.
/// Please sort them sensefully.
#[derive(Debug)]
pub enum WalletDbError {
    // Connection related errors
    ConnectionFailed = -32100,
    FailedToAquireLock = -32101,

    // Configuration related errors
    PragmaUpdateError = -32110,

    // Query execution related errors
    QueryPreparationFailed = -32120,
    QueryExecutionFailed = -32121,
    QueryFinalizationFailed = -32122,
    ParseColumnValueError = -32123,
    RowNotFound = -32124,

    // Generic error
    GenericError = -32130,
}

impl std::fmt::Display for WalletDbError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
