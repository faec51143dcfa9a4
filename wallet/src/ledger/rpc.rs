//! JSON-RPC 2.0 ledger client.
//!
//! Each partition is reached through its own HTTP endpoint. Structured
//! payloads (orders, unit state, proofs, trust bases) travel as hex-encoded
//! canonical bincode, so what the node signs and hashes is byte-identical to
//! what the wallet signs and hashes.
//!
//! | Method                    | Params                        | Result                    |
//! |---------------------------|-------------------------------|---------------------------|
//! | `state_sendTransaction`   | `[order_hex]`                 | tx hash hex               |
//! | `state_getUnit`           | `[unit_id_hex]`               | `{state, lastTxHash}` / null |
//! | `state_getRoundNumber`    | `[]`                          | number                    |
//! | `state_getTransactionProof` | `[unit_id_hex, tx_hash_hex]` | proof hex / null         |
//! | `state_getTrustBase`      | `[]`                          | trust base hex            |
//! | `state_getUnitsByOwnerID` | `[owner_predicate_hex]`       | `[unit_id_hex]`           |

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use super::{LedgerClient, LedgerError, LedgerResult, UnitRecord};
use crate::partition::{Partition, PartitionId};
use crate::transaction::codec;
use crate::transaction::{TransactionOrder, TrustBase, TxHash, TxRecordProof};
use crate::unit::{OwnerPredicate, UnitId, UnitState};

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnitResponse {
    state: String,
    last_tx_hash: Option<String>,
}

fn decode_hash(s: &str) -> LedgerResult<TxHash> {
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| LedgerError::Decode(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| LedgerError::Decode(format!("expected 32-byte hash, got {s}")))
}

fn decode_payload<T: DeserializeOwned>(s: &str) -> LedgerResult<T> {
    codec::decode_hex(s).map_err(|e| LedgerError::Decode(e.to_string()))
}

impl UnitResponse {
    fn into_record(self) -> LedgerResult<UnitRecord> {
        Ok(UnitRecord {
            state: decode_payload::<UnitState>(&self.state)?,
            last_tx_hash: self.last_tx_hash.as_deref().map(decode_hash).transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// RPC URL per partition.
#[derive(Debug, Clone, Default)]
pub struct RpcEndpoints {
    urls: BTreeMap<PartitionId, String>,
}

impl RpcEndpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, partition: Partition, url: impl Into<String>) -> Self {
        self.urls.insert(partition.id(), url.into());
        self
    }

    pub fn url(&self, partition: PartitionId) -> LedgerResult<&str> {
        self.urls
            .get(&partition)
            .map(String::as_str)
            .ok_or(LedgerError::UnknownPartition(partition))
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct JsonRpcLedger {
    client: reqwest::Client,
    endpoints: RpcEndpoints,
}

impl JsonRpcLedger {
    pub fn new(endpoints: RpcEndpoints) -> LedgerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(Self { client, endpoints })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        partition: PartitionId,
        method: &str,
        params: Value,
    ) -> LedgerResult<Option<T>> {
        let url = self.endpoints.url(partition)?;
        let id = REQUEST_ID.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };
        debug!(%partition, method, id, "rpc request");

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(LedgerError::Transport(format!(
                "HTTP error: {}",
                response.status()
            )));
        }
        let body: JsonRpcResponse<T> = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;
        if let Some(error) = body.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(body.result)
    }

    async fn call_required<T: DeserializeOwned>(
        &self,
        partition: PartitionId,
        method: &str,
        params: Value,
    ) -> LedgerResult<T> {
        self.call(partition, method, params)
            .await?
            .ok_or_else(|| LedgerError::Decode(format!("{method} returned no result")))
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    async fn submit_transaction(&self, order: &TransactionOrder) -> LedgerResult<TxHash> {
        let payload = codec::encode_hex(order).map_err(|e| LedgerError::Decode(e.to_string()))?;
        let partition = order.partition_id;
        let hash: String = self
            .call_required(partition, "state_sendTransaction", json!([payload]))
            .await
            .map_err(|e| match e {
                LedgerError::Rpc { message, .. } => LedgerError::Rejected {
                    partition,
                    reason: message,
                },
                other => other,
            })?;
        decode_hash(&hash)
    }

    async fn get_unit(
        &self,
        partition: PartitionId,
        unit_id: &UnitId,
    ) -> LedgerResult<Option<UnitRecord>> {
        self.call::<UnitResponse>(partition, "state_getUnit", json!([unit_id.to_hex()]))
            .await?
            .map(UnitResponse::into_record)
            .transpose()
    }

    async fn get_round_number(&self, partition: PartitionId) -> LedgerResult<u64> {
        self.call_required(partition, "state_getRoundNumber", json!([]))
            .await
    }

    async fn get_transaction_proof(
        &self,
        partition: PartitionId,
        unit_id: &UnitId,
        tx_hash: TxHash,
    ) -> LedgerResult<Option<TxRecordProof>> {
        let params = json!([unit_id.to_hex(), format!("0x{}", hex::encode(tx_hash))]);
        self.call::<String>(partition, "state_getTransactionProof", params)
            .await?
            .map(|s| decode_payload(&s))
            .transpose()
    }

    async fn get_trust_base(&self, partition: PartitionId) -> LedgerResult<TrustBase> {
        let payload: String = self
            .call_required(partition, "state_getTrustBase", json!([]))
            .await?;
        decode_payload(&payload)
    }

    async fn get_units_by_owner(
        &self,
        partition: PartitionId,
        owner: &OwnerPredicate,
    ) -> LedgerResult<Vec<UnitId>> {
        let params = json!([format!("0x{}", hex::encode(owner.as_bytes()))]);
        let ids: Vec<String> = self
            .call(partition, "state_getUnitsByOwnerID", params)
            .await?
            .unwrap_or_default();
        ids.iter()
            .map(|s| UnitId::from_hex(s).map_err(|e| LedgerError::Decode(e.to_string())))
            .collect()
    }
}
