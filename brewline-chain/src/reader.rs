//! JSON-RPC balance and allowance reads.
//!
//! Implements [`LedgerReader`] over the ledger gateway's `ledger_call`
//! method: a read-only invocation of a contract entrypoint whose result is
//! the two-word limb encoding of a 128-bit integer. Transport trouble and
//! RPC-level errors surface as [`QueryError::Unavailable`]; undecodable
//! payloads as [`QueryError::Malformed`]. Both are retried by the caller.

use std::time::Duration;

use alloy_primitives::U256;
use async_trait::async_trait;
use brewline::error::QueryError;
use brewline::ledger::{LedgerAddress, LedgerReader};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::wire::WireAmount;

const BALANCE_ENTRYPOINT: &str = "balance_of";
const ALLOWANCE_ENTRYPOINT: &str = "allowance";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'a str,
    id: u32,
    method: &'a str,
    params: CallParams<'a>,
}

#[derive(Debug, Serialize)]
struct CallParams<'a> {
    contract: String,
    entrypoint: &'a str,
    args: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Vec<String>>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

fn parse_word(raw: &str) -> Result<u64, QueryError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16)
        .map_err(|_| QueryError::Malformed(format!("bad word {raw}")))
}

fn decode_words(words: &[String]) -> Result<U256, QueryError> {
    let [low, high] = words else {
        return Err(QueryError::Malformed(format!(
            "expected 2 result words, got {}",
            words.len()
        )));
    };
    let wire = WireAmount {
        low: parse_word(low)?,
        high: parse_word(high)?,
    };
    Ok(wire.recompose())
}

/// [`LedgerReader`] backed by a JSON-RPC ledger gateway.
#[derive(Debug, Clone)]
pub struct JsonRpcLedgerReader {
    client: reqwest::Client,
    endpoint: Url,
}

impl JsonRpcLedgerReader {
    /// Creates a reader against `endpoint` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns the underlying client-build error if the HTTP client cannot
    /// be constructed.
    pub fn new(endpoint: Url, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client, endpoint })
    }

    async fn ledger_call(
        &self,
        contract: &LedgerAddress,
        entrypoint: &str,
        args: Vec<String>,
    ) -> Result<U256, QueryError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "ledger_call",
            params: CallParams {
                contract: contract.to_string(),
                entrypoint,
                args,
            },
        };
        #[cfg(feature = "telemetry")]
        tracing::debug!(contract = %contract, entrypoint, "ledger_call");
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| QueryError::Unavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| QueryError::Unavailable(e.to_string()))?;
        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| QueryError::Malformed(e.to_string()))?;
        if let Some(error) = body.error {
            return Err(QueryError::Unavailable(format!(
                "rpc error {}: {}",
                error.code, error.message
            )));
        }
        let words = body
            .result
            .ok_or_else(|| QueryError::Malformed("missing result".into()))?;
        decode_words(&words)
    }
}

#[async_trait]
impl LedgerReader for JsonRpcLedgerReader {
    async fn balance(
        &self,
        wallet: &LedgerAddress,
        token: &LedgerAddress,
    ) -> Result<U256, QueryError> {
        self.ledger_call(token, BALANCE_ENTRYPOINT, vec![wallet.to_string()])
            .await
    }

    async fn allowance(
        &self,
        owner: &LedgerAddress,
        spender: &LedgerAddress,
        token: &LedgerAddress,
    ) -> Result<U256, QueryError> {
        self.ledger_call(
            token,
            ALLOWANCE_ENTRYPOINT,
            vec![owner.to_string(), spender.to_string()],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn addr(byte: u8) -> LedgerAddress {
        LedgerAddress::from_bytes([byte; 32])
    }

    async fn reader(server: &MockServer) -> JsonRpcLedgerReader {
        JsonRpcLedgerReader::new(server.uri().parse().unwrap(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_balance_decodes_two_word_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(json!({
                "method": "ledger_call",
                "params": { "entrypoint": "balance_of" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": ["0x3c", "0x0"]
            })))
            .mount(&server)
            .await;

        let balance = reader(&server)
            .await
            .balance(&addr(2), &addr(1))
            .await
            .unwrap();
        assert_eq!(balance, U256::from(60u64));
    }

    #[tokio::test]
    async fn test_allowance_sends_owner_and_spender() {
        let server = MockServer::start().await;
        let owner = addr(2);
        let spender = addr(9);
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "params": {
                    "entrypoint": "allowance",
                    "args": [owner.to_string(), spender.to_string()]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": ["0x0", "0x1"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let allowance = reader(&server)
            .await
            .allowance(&owner, &spender, &addr(1))
            .await
            .unwrap();
        assert_eq!(allowance, U256::from(u128::from(u64::MAX) + 1));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = reader(&server).await.balance(&addr(2), &addr(1)).await;
        assert!(matches!(result, Err(QueryError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_rpc_error_member_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": "node syncing" }
            })))
            .mount(&server)
            .await;

        let result = reader(&server).await.balance(&addr(2), &addr(1)).await;
        assert!(matches!(result, Err(QueryError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_garbled_result_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": ["not-hex", "0x0"]
            })))
            .mount(&server)
            .await;

        let result = reader(&server).await.balance(&addr(2), &addr(1)).await;
        assert!(matches!(result, Err(QueryError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_wrong_word_count_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": ["0x1"]
            })))
            .mount(&server)
            .await;

        let result = reader(&server).await.balance(&addr(2), &addr(1)).await;
        assert!(matches!(result, Err(QueryError::Malformed(_))));
    }
}
