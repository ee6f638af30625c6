use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, TxHash, U256, U64};
use alloy_sol_types::decode_revert_reason;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::watcher::spawn_polling_watcher;
use super::{
    CallRequest, ProviderError, ProviderResult, ReceiptStatus, SignalSubscription,
    TransactionRequest, WalletProvider,
};

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// EIP-1193 code for a request the user declined.
pub const USER_REJECTED_REQUEST: i64 = 4001;
/// EIP-1193 code for a method or account the user has not authorized.
pub const UNAUTHORIZED: i64 = 4100;
/// Code used by nodes for `eth_call`/`eth_estimateGas` reverts.
pub const EXECUTION_REVERTED: i64 = 3;

#[derive(Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Serialize)]
struct CallParams<'a> {
    to: &'a Address,
    data: &'a Bytes,
}

#[derive(Serialize)]
struct SendParams<'a> {
    from: &'a Address,
    to: &'a Address,
    value: &'a U256,
    data: &'a Bytes,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    #[serde(default)]
    status: Option<U64>,
    #[serde(default)]
    block_number: Option<U64>,
}

/// Wallet provider reached over HTTP JSON-RPC, e.g. a local node with unlocked
/// accounts or a wallet bridge exposing the EIP-1193 method set.
#[derive(Clone)]
pub struct JsonRpcWalletProvider {
    inner: Client,
    url: Url,
    signal_interval: Duration,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcWalletProvider {
    pub fn from_endpoint(
        endpoint: &str,
        timeout: Duration,
        signal_interval: Duration,
    ) -> ProviderResult<Self> {
        let url = Url::parse(endpoint).map_err(|err| {
            ProviderError::Transport(format!("invalid endpoint {endpoint:?}: {err}"))
        })?;
        let inner = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::transport)?;
        Ok(Self {
            inner,
            url,
            signal_interval,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.url
    }

    async fn request<P, R>(&self, method: &str, params: P) -> ProviderResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let payload = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(method, id = payload.id, "wallet rpc request");

        let response = self
            .inner
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(ProviderError::transport)?;
        if !response.status().is_success() {
            return Err(ProviderError::Transport(format!(
                "HTTP status {}",
                response.status()
            )));
        }
        let response: JsonRpcResponse = response.json().await.map_err(ProviderError::transport)?;
        if let Some(error) = response.error {
            let mapped = map_rpc_error(error);
            debug!(method, error = %mapped, "wallet rpc error");
            return Err(mapped);
        }
        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|err| ProviderError::Malformed(format!("{method}: {err}")))
    }
}

fn map_rpc_error(error: JsonRpcError) -> ProviderError {
    match error.code {
        USER_REJECTED_REQUEST | UNAUTHORIZED => ProviderError::UserRejected(error.message),
        code if code == EXECUTION_REVERTED || error.message.contains("revert") => {
            let reason = error
                .data
                .as_ref()
                .and_then(revert_payload)
                .and_then(|payload| decode_revert_reason(&payload));
            ProviderError::Reverted(reason.unwrap_or(error.message))
        }
        code => ProviderError::Rpc {
            code,
            message: error.message,
        },
    }
}

fn revert_payload(data: &Value) -> Option<Bytes> {
    let encoded = match data {
        Value::String(encoded) => encoded.as_str(),
        Value::Object(map) => map.get("data")?.as_str()?,
        _ => return None,
    };
    encoded.parse().ok()
}

#[async_trait]
impl WalletProvider for JsonRpcWalletProvider {
    fn is_available(&self) -> bool {
        true
    }

    async fn request_accounts(&self) -> ProviderResult<Vec<Address>> {
        match self.request("eth_requestAccounts", json!([])).await {
            Err(ProviderError::Rpc {
                code: METHOD_NOT_FOUND,
                ..
            }) => {
                warn!("wallet does not support eth_requestAccounts; using eth_accounts");
                self.accounts().await
            }
            other => other,
        }
    }

    async fn accounts(&self) -> ProviderResult<Vec<Address>> {
        self.request("eth_accounts", json!([])).await
    }

    async fn chain_id(&self) -> ProviderResult<u64> {
        let chain_id: U64 = self.request("eth_chainId", json!([])).await?;
        Ok(chain_id.to::<u64>())
    }

    async fn call(&self, request: &CallRequest) -> ProviderResult<Bytes> {
        let params = CallParams {
            to: &request.to,
            data: &request.data,
        };
        self.request("eth_call", (params, "latest")).await
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> ProviderResult<TxHash> {
        let params = SendParams {
            from: &request.from,
            to: &request.to,
            value: &request.value,
            data: &request.data,
        };
        self.request("eth_sendTransaction", [params]).await
    }

    async fn transaction_receipt(&self, hash: TxHash) -> ProviderResult<Option<ReceiptStatus>> {
        let receipt: Option<RawReceipt> =
            self.request("eth_getTransactionReceipt", [hash]).await?;
        let Some(receipt) = receipt else {
            return Ok(None);
        };
        // Receipts without a block number are still pending on some nodes.
        let Some(block_number) = receipt.block_number else {
            return Ok(None);
        };
        let block_number = block_number.to::<u64>();
        match receipt.status {
            Some(status) if status == U64::from(1) => {
                Ok(Some(ReceiptStatus::Success { block_number }))
            }
            Some(_) => Ok(Some(ReceiptStatus::Reverted { block_number })),
            None => Err(ProviderError::Malformed(format!(
                "receipt for {hash} has no status"
            ))),
        }
    }

    fn subscribe(&self) -> SignalSubscription {
        spawn_polling_watcher(Arc::new(self.clone()), self.signal_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::{Revert, SolError};

    fn error(code: i64, message: &str, data: Option<Value>) -> JsonRpcError {
        JsonRpcError {
            code,
            message: message.to_owned(),
            data,
        }
    }

    #[test]
    fn user_rejections_keep_wallet_message() {
        assert_eq!(
            map_rpc_error(error(4001, "User rejected the request.", None)),
            ProviderError::UserRejected("User rejected the request.".into())
        );
        assert_eq!(
            map_rpc_error(error(4100, "Unauthorized", None)),
            ProviderError::UserRejected("Unauthorized".into())
        );
    }

    #[test]
    fn reverts_decode_error_string_payloads() {
        let payload = Bytes::from(
            Revert {
                reason: "Deadline in the past".into(),
            }
            .abi_encode(),
        );
        let mapped = map_rpc_error(error(
            3,
            "execution reverted",
            Some(Value::String(alloy_primitives::hex::encode_prefixed(&payload))),
        ));
        match mapped {
            ProviderError::Reverted(reason) => assert!(reason.contains("Deadline in the past")),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn reverts_without_payload_use_message() {
        assert_eq!(
            map_rpc_error(error(-32000, "execution reverted", None)),
            ProviderError::Reverted("execution reverted".into())
        );
    }

    #[test]
    fn other_codes_stay_rpc_errors() {
        assert_eq!(
            map_rpc_error(error(METHOD_NOT_FOUND, "Method not found", None)),
            ProviderError::Rpc {
                code: METHOD_NOT_FOUND,
                message: "Method not found".into(),
            }
        );
    }

    #[test]
    fn rejects_unparseable_endpoint() {
        let result = JsonRpcWalletProvider::from_endpoint(
            "not a url",
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(ProviderError::Transport(_))));
    }
}
