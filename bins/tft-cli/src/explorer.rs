//! HTTP chain backend speaking the Rivine explorer REST API.
//!
//! A [`GroupedExplorer`] holds several explorer URLs for one network and
//! tries them in order, returning the first success.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tft_core::address::UnlockHash;
use tft_core::condition::UnlockCondition;
use tft_core::constants::{COIN, DEFAULT_TRANSACTION_VERSION};
use tft_core::error::{BackendError, UnlockHashError};
use tft_core::traits::ChainBackend;
use tft_core::types::{
    AddressBlock, AddressHistory, AddressTransaction, ChainConstants, CoinInput, CoinOutput,
    CoinOutputId, Fulfillment, Hash256, MinerPayout, Transaction, TransactionId,
};
use tracing::{debug, warn};

/// User agent the explorer daemons require.
const USER_AGENT: &str = "Rivine-Agent";

/// Error text an explorer returns for an address it has never seen.
const UNRECOGNIZED_HASH: &str = "unrecognized hash";

/// Decimal string ("1000000000") as sent by the explorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Currency(u64);

impl Serialize for Currency {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map(Currency).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Deserialize)]
struct ExplorerStatus {
    height: u64,
}

#[derive(Debug, Deserialize)]
struct ChainInfo {
    #[serde(rename = "Name", default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct CurrencyUnits {
    onecoin: Currency,
}

#[derive(Debug, Deserialize)]
struct ConstantsResponse {
    chaininfo: ChainInfo,
    minimumtransactionfee: Currency,
    #[serde(default)]
    defaulttransactionversion: Option<u8>,
    maturitydelay: u64,
    #[serde(default)]
    currencyunits: Option<CurrencyUnits>,
}

impl From<ConstantsResponse> for ChainConstants {
    fn from(c: ConstantsResponse) -> Self {
        ChainConstants {
            chain_name: c.chaininfo.name,
            minimum_transaction_fee: c.minimumtransactionfee.0,
            default_transaction_version: c
                .defaulttransactionversion
                .unwrap_or(DEFAULT_TRANSACTION_VERSION),
            maturity_delay: c.maturitydelay,
            currency_units: c.currencyunits.map(|u| u.onecoin.0).unwrap_or(COIN),
        }
    }
}

/// Condition as `{"type": n, "data": {...}}`; the shape of `data` depends on `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireCondition {
    #[serde(rename = "type", default)]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

const CONDITION_NIL: u8 = 0;
const CONDITION_UNLOCK_HASH: u8 = 1;
const CONDITION_TIME_LOCK: u8 = 3;

#[derive(Debug, Deserialize)]
struct UnlockHashData {
    unlockhash: String,
}

#[derive(Debug, Deserialize)]
struct TimeLockData {
    locktime: u64,
    condition: WireCondition,
}

/// Decode an unlock hash, yielding `None` for unlock types this wallet
/// cannot own (multisig, atomic swap). Malformed strings are still errors.
fn decode_unlock_hash(s: &str) -> Result<Option<UnlockHash>, BackendError> {
    match UnlockHash::decode(s) {
        Ok(uh) => Ok(Some(uh)),
        Err(UnlockHashError::UnknownType(unlock_type)) => {
            debug!(unlock_type, "skipping foreign unlock hash");
            Ok(None)
        }
        Err(e) => Err(BackendError::Decode(format!("invalid unlock hash {s}: {e}"))),
    }
}

fn condition_data<T: DeserializeOwned>(kind: u8, data: Option<serde_json::Value>) -> Result<T, BackendError> {
    let data = data.ok_or_else(|| BackendError::Decode(format!("condition type {kind} without data")))?;
    serde_json::from_value(data)
        .map_err(|e| BackendError::Decode(format!("condition type {kind}: {e}")))
}

impl From<&UnlockCondition> for WireCondition {
    fn from(c: &UnlockCondition) -> Self {
        match c {
            UnlockCondition::Nil => WireCondition {
                kind: CONDITION_NIL,
                data: None,
            },
            UnlockCondition::UnlockHash(uh) => WireCondition {
                kind: CONDITION_UNLOCK_HASH,
                data: Some(json!({ "unlockhash": uh })),
            },
            UnlockCondition::TimeLock {
                lock_time,
                condition,
            } => WireCondition {
                kind: CONDITION_TIME_LOCK,
                data: Some(json!({
                    "locktime": lock_time,
                    "condition": WireCondition::from(condition.as_ref()),
                })),
            },
            UnlockCondition::Unsupported { kind } => WireCondition {
                kind: *kind,
                data: None,
            },
        }
    }
}

impl TryFrom<WireCondition> for UnlockCondition {
    type Error = BackendError;

    fn try_from(c: WireCondition) -> Result<Self, Self::Error> {
        match c.kind {
            CONDITION_NIL => Ok(UnlockCondition::Nil),
            CONDITION_UNLOCK_HASH => {
                let d: UnlockHashData = condition_data(c.kind, c.data)?;
                Ok(match decode_unlock_hash(&d.unlockhash)? {
                    Some(uh) => UnlockCondition::UnlockHash(uh),
                    None => UnlockCondition::Unsupported { kind: c.kind },
                })
            }
            CONDITION_TIME_LOCK => {
                let d: TimeLockData = condition_data(c.kind, c.data)?;
                Ok(UnlockCondition::time_locked(d.locktime, d.condition.try_into()?))
            }
            other => {
                debug!(condition_type = other, "keeping output with unsupported condition as foreign");
                Ok(UnlockCondition::Unsupported { kind: other })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFulfillmentData {
    publickey: String,
    signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFulfillment {
    #[serde(rename = "type")]
    kind: u8,
    data: WireFulfillmentData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireCoinInput {
    parentid: String,
    fulfillment: WireFulfillment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireCoinOutput {
    value: Currency,
    condition: WireCondition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireTransactionData {
    #[serde(default)]
    coininputs: Vec<WireCoinInput>,
    #[serde(default)]
    coinoutputs: Vec<WireCoinOutput>,
    #[serde(default)]
    minerfees: Vec<Currency>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    arbitrarydata: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireTransaction {
    version: u8,
    data: WireTransactionData,
}

#[derive(Debug, Deserialize)]
struct WirePayout {
    value: Currency,
    unlockhash: String,
}

#[derive(Debug, Deserialize)]
struct WireRawBlock {
    #[serde(default)]
    minerpayouts: Vec<WirePayout>,
}

#[derive(Debug, Deserialize)]
struct WireBlock {
    height: u64,
    #[serde(default)]
    minerpayoutids: Vec<String>,
    rawblock: WireRawBlock,
}

#[derive(Debug, Deserialize)]
struct WireAddressTransaction {
    id: String,
    rawtransaction: WireTransaction,
    #[serde(default)]
    coinoutputids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct HashResponse {
    #[serde(default)]
    blocks: Vec<WireBlock>,
    #[serde(default)]
    transactions: Vec<WireAddressTransaction>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    transactionid: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

fn decode_hash(s: &str) -> Result<Hash256, BackendError> {
    Hash256::from_hex(s).ok_or_else(|| BackendError::Decode(format!("invalid hash: {s}")))
}

fn decode_public_key(s: &str) -> Result<[u8; 32], BackendError> {
    let hex_part = s.strip_prefix("ed25519:").unwrap_or(s);
    hex::decode(hex_part)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| BackendError::Decode(format!("invalid public key: {s}")))
}

impl TryFrom<WireTransaction> for Transaction {
    type Error = BackendError;

    fn try_from(wire: WireTransaction) -> Result<Self, Self::Error> {
        let data = wire.data;
        let coin_inputs = data
            .coininputs
            .into_iter()
            .map(|input| {
                let signature = hex::decode(&input.fulfillment.data.signature)
                    .map_err(|e| BackendError::Decode(format!("invalid signature: {e}")))?;
                Ok(CoinInput {
                    parent_id: CoinOutputId(decode_hash(&input.parentid)?),
                    fulfillment: Fulfillment::SingleSignature {
                        public_key: decode_public_key(&input.fulfillment.data.publickey)?,
                        signature,
                    },
                })
            })
            .collect::<Result<Vec<_>, BackendError>>()?;
        let coin_outputs = data
            .coinoutputs
            .into_iter()
            .map(|out| {
                Ok(CoinOutput {
                    value: out.value.0,
                    condition: out.condition.try_into()?,
                })
            })
            .collect::<Result<Vec<_>, BackendError>>()?;
        let arbitrary_data = BASE64
            .decode(data.arbitrarydata.as_bytes())
            .map_err(|e| BackendError::Decode(format!("invalid arbitrary data: {e}")))?;

        Ok(Transaction {
            version: wire.version,
            coin_inputs,
            coin_outputs,
            miner_fees: data.minerfees.into_iter().map(|c| c.0).collect(),
            arbitrary_data,
        })
    }
}

impl From<&Transaction> for WireTransaction {
    fn from(tx: &Transaction) -> Self {
        let coininputs = tx
            .coin_inputs
            .iter()
            .map(|input| {
                let Fulfillment::SingleSignature {
                    public_key,
                    signature,
                } = &input.fulfillment;
                WireCoinInput {
                    parentid: input.parent_id.to_string(),
                    fulfillment: WireFulfillment {
                        kind: 1,
                        data: WireFulfillmentData {
                            publickey: format!("ed25519:{}", hex::encode(public_key)),
                            signature: hex::encode(signature),
                        },
                    },
                }
            })
            .collect();
        let coinoutputs = tx
            .coin_outputs
            .iter()
            .map(|out| WireCoinOutput {
                value: Currency(out.value),
                condition: (&out.condition).into(),
            })
            .collect();

        WireTransaction {
            version: tx.version,
            data: WireTransactionData {
                coininputs,
                coinoutputs,
                minerfees: tx.miner_fees.iter().copied().map(Currency).collect(),
                arbitrarydata: BASE64.encode(&tx.arbitrary_data),
            },
        }
    }
}

impl TryFrom<HashResponse> for AddressHistory {
    type Error = BackendError;

    fn try_from(resp: HashResponse) -> Result<Self, Self::Error> {
        let blocks = resp
            .blocks
            .into_iter()
            .map(|block| {
                Ok(AddressBlock {
                    height: block.height,
                    // Payouts stay aligned with their ids; foreign ones pay to NIL.
                    miner_payouts: block
                        .rawblock
                        .minerpayouts
                        .into_iter()
                        .map(|p| {
                            Ok(MinerPayout {
                                value: p.value.0,
                                unlock_hash: decode_unlock_hash(&p.unlockhash)?
                                    .unwrap_or(UnlockHash::NIL),
                            })
                        })
                        .collect::<Result<_, BackendError>>()?,
                    miner_payout_ids: block
                        .minerpayoutids
                        .iter()
                        .map(|id| decode_hash(id).map(CoinOutputId))
                        .collect::<Result<_, _>>()?,
                })
            })
            .collect::<Result<Vec<_>, BackendError>>()?;

        let transactions = resp
            .transactions
            .into_iter()
            .map(|entry| {
                Ok(AddressTransaction {
                    id: TransactionId(decode_hash(&entry.id)?),
                    transaction: entry.rawtransaction.try_into()?,
                    coin_output_ids: entry
                        .coinoutputids
                        .iter()
                        .map(|id| decode_hash(id).map(CoinOutputId))
                        .collect::<Result<_, _>>()?,
                })
            })
            .collect::<Result<Vec<_>, BackendError>>()?;

        Ok(AddressHistory {
            blocks,
            transactions,
        })
    }
}

/// Client for a list of equivalent explorers.
pub struct GroupedExplorer {
    client: Client,
    urls: Vec<String>,
}

/// Failure of one request against one explorer.
enum Attempt {
    /// The explorer answered with an error status.
    Status(StatusCode, String),
    /// No usable answer (connection, timeout, body decode).
    Transport(String),
}

impl GroupedExplorer {
    pub fn new(urls: Vec<String>, timeout: Duration) -> Result<Self, BackendError> {
        if urls.is_empty() {
            return Err(BackendError::Unavailable("no explorer urls configured".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            urls: urls
                .into_iter()
                .map(|u| u.trim_end_matches('/').to_string())
                .collect(),
        })
    }

    async fn get_once<T: DeserializeOwned>(&self, base: &str, path: &str) -> Result<T, Attempt> {
        let resp = self
            .client
            .get(format!("{base}{path}"))
            .send()
            .await
            .map_err(|e| Attempt::Transport(e.to_string()))?;
        Self::read(resp).await
    }

    async fn post_once<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        base: &str,
        path: &str,
        body: &B,
    ) -> Result<T, Attempt> {
        let resp = self
            .client
            .post(format!("{base}{path}"))
            .json(body)
            .send()
            .await
            .map_err(|e| Attempt::Transport(e.to_string()))?;
        Self::read(resp).await
    }

    async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Attempt> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.message)
                .unwrap_or(text);
            return Err(Attempt::Status(status, message));
        }
        resp.json::<T>()
            .await
            .map_err(|e| Attempt::Transport(format!("decode: {e}")))
    }

    /// GET `path` from each explorer in turn.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, BackendError> {
        let mut errors = Vec::new();
        for base in &self.urls {
            match self.get_once::<T>(base, path).await {
                Ok(value) => return Ok(Some(value)),
                Err(Attempt::Status(_, message)) if message.contains(UNRECOGNIZED_HASH) => {
                    return Ok(None);
                }
                Err(Attempt::Status(status, message)) => {
                    warn!(explorer = %base, path, %status, "explorer request failed");
                    errors.push(format!("{base}: {status}: {message}"));
                }
                Err(Attempt::Transport(message)) => {
                    warn!(explorer = %base, path, error = %message, "explorer unreachable");
                    errors.push(format!("{base}: {message}"));
                }
            }
        }
        Err(BackendError::Unavailable(errors.join("; ")))
    }

    async fn get_required<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        self.get(path)
            .await?
            .ok_or_else(|| BackendError::Rejected(format!("{path}: {UNRECOGNIZED_HASH}")))
    }
}

#[async_trait]
impl ChainBackend for GroupedExplorer {
    async fn current_height(&self) -> Result<u64, BackendError> {
        let status: ExplorerStatus = self.get_required("/explorer").await?;
        Ok(status.height)
    }

    async fn chain_constants(&self) -> Result<ChainConstants, BackendError> {
        let constants: ConstantsResponse = self.get_required("/explorer/constants").await?;
        Ok(constants.into())
    }

    async fn address_history(&self, address: &UnlockHash) -> Result<AddressHistory, BackendError> {
        let path = format!("/explorer/hashes/{address}");
        match self.get::<HashResponse>(&path).await? {
            Some(resp) => resp.try_into(),
            None => {
                debug!(%address, "address unknown to explorer");
                Ok(AddressHistory::default())
            }
        }
    }

    async fn submit(&self, tx: &Transaction) -> Result<TransactionId, BackendError> {
        let body = WireTransaction::from(tx);
        let mut errors = Vec::new();
        for base in &self.urls {
            match self
                .post_once::<_, SubmitResponse>(base, "/transactionpool/transactions", &body)
                .await
            {
                Ok(resp) => return Ok(TransactionId(decode_hash(&resp.transactionid)?)),
                // The transaction itself was refused; another explorer will not think otherwise.
                Err(Attempt::Status(status, message)) if status.is_client_error() => {
                    return Err(BackendError::Rejected(message));
                }
                Err(Attempt::Status(status, message)) => {
                    warn!(explorer = %base, %status, "transaction submission failed");
                    errors.push(format!("{base}: {status}: {message}"));
                }
                Err(Attempt::Transport(message)) => {
                    warn!(explorer = %base, error = %message, "explorer unreachable");
                    errors.push(format!("{base}: {message}"));
                }
            }
        }
        Err(BackendError::Unavailable(errors.join("; ")))
    }
}
