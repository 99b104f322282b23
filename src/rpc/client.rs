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

//! JSON-RPC client-side implementation.
use std::{net::Shutdown, time::Duration};

use log::{debug, error};
use smol::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    lock::Mutex,
    net::TcpStream,
    Timer,
};
use url::Url;

use super::jsonrpc::{JsonRequest, JsonResult};
use crate::{error::Error, rpc::JsonValue, Result};

/// JSON-RPC client implementation over a TCP stream. Requests and replies
/// are newline-delimited JSON objects.
pub struct RpcClient {
    /// Endpoint the client is connected to
    url: Url,
    /// Active connection stream
    stream: Mutex<TcpStream>,
    /// How long to wait for a reply before giving up
    timeout: Duration,
}

impl RpcClient {
    /// Instantiate a new JSON-RPC client connected to the given URL.
    pub async fn new(url: Url, timeout: Duration) -> Result<Self> {
        let stream = Self::connect(&url).await?;
        Ok(Self { url, stream: Mutex::new(stream), timeout })
    }

    async fn connect(url: &Url) -> Result<TcpStream> {
        if url.scheme() != "tcp" {
            return Err(Error::ConnectFailed(format!("Unsupported scheme in {url}")))
        }

        let host = url.host_str().ok_or(Error::ParseFailed("Missing host in endpoint"))?;
        let port = url.port().ok_or(Error::ParseFailed("Missing port in endpoint"))?;

        match TcpStream::connect((host, port)).await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                error!(target: "rpc::client", "Connection to {url} failed: {e}");
                Err(Error::ConnectFailed(url.to_string()))
            }
        }
    }

    /// Stop the client, closing the underlying connection.
    pub async fn stop(&self) {
        let stream = self.stream.lock().await;
        let _ = stream.shutdown(Shutdown::Both);
    }

    /// Send a given JSON-RPC request over the instantiated client and
    /// wait for the reply, subject to the configured timeout.
    pub async fn request(&self, req: JsonRequest) -> Result<JsonValue> {
        let req_id = req.id;
        let mut payload = req.stringify()?;
        payload.push('\n');
        debug!(target: "rpc::client", "--> {}", payload.trim_end());

        let mut stream = self.stream.lock().await;
        stream.write_all(payload.as_bytes()).await?;

        let mut line = String::new();
        let mut reader = BufReader::new(&mut *stream);
        let read = async {
            let n = reader.read_line(&mut line).await?;
            Ok(n)
        };
        let deadline = async {
            Timer::after(self.timeout).await;
            Err::<usize, Error>(Error::RpcReplyTimeout)
        };
        let n = smol::future::or(read, deadline).await?;
        drop(stream);

        if n == 0 {
            error!(target: "rpc::client", "Connection to {} closed by peer", self.url);
            return Err(Error::ConnectFailed(self.url.to_string()))
        }
        debug!(target: "rpc::client", "<-- {}", line.trim_end());

        let value: JsonValue = line.parse()?;
        match JsonResult::try_from_value(&value)? {
            JsonResult::Response(rep) => {
                if rep.id != req_id {
                    return Err(Error::UnexpectedJsonRpc(format!(
                        "Reply id {} does not match request id {}",
                        rep.id, req_id
                    )))
                }
                Ok(rep.result)
            }
            // The server error message is carried verbatim, callers
            // surface it to the user untouched.
            JsonResult::Error(e) => Err(Error::JsonRpcError(e.error.message)),
        }
    }

    /// Connect to the given endpoint, send a single request and close the
    /// connection on reply. Used for one-off calls to signer daemons.
    pub async fn oneshot_request(
        url: Url,
        timeout: Duration,
        req: JsonRequest,
    ) -> Result<JsonValue> {
        let client = Self::new(url, timeout).await?;
        let rep = client.request(req).await;
        client.stop().await;
        rep
    }
}
