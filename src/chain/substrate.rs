use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{Adaptor, Balance, ChainBlock, Currency, EventInfo, TxAndEvents, TxInfo, TxStatus};
use crate::config;

/// Adaptor for Substrate-family chains (Polkadot, Kusama) backed by a
/// Substrate API Sidecar instance, which serves blocks with extrinsics and
/// events already decoded to JSON.
pub struct SubstrateAdaptor {
    currency: Currency,
    base_url: String,
    http: reqwest::Client,
}

impl SubstrateAdaptor {
    pub fn new(cfg: &config::NetworkConfig, currency: Currency) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;

        Ok(Self {
            currency,
            base_url: cfg.sidecar_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn get_json(&self, path: &str) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let rs = self.http.get(&url).send().await?.error_for_status()?;
        Ok(rs.json().await?)
    }
}

#[async_trait]
impl Adaptor for SubstrateAdaptor {
    fn currency(&self) -> Currency {
        self.currency
    }

    async fn last_height(&self) -> anyhow::Result<i64> {
        let head = self.get_json("/blocks/head?finalized=false").await?;
        field_i64(&head, "number")
    }

    async fn last_finalized_height(&self) -> anyhow::Result<i64> {
        // Sidecar's default head is the last finalized block.
        let head = self.get_json("/blocks/head").await?;
        field_i64(&head, "number")
    }

    async fn block(&self, height: i64) -> anyhow::Result<ChainBlock> {
        let block = self.get_json(&format!("/blocks/{}", height)).await?;
        let hash = block["hash"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("block {} has no hash", height))?
            .to_string();

        Ok(ChainBlock {
            height,
            hash,
            timestamp: block_timestamp(&block),
        })
    }

    async fn txs_and_events(&self, block_hash: &str) -> anyhow::Result<Vec<TxAndEvents>> {
        let block = self.get_json(&format!("/blocks/{}", block_hash)).await?;
        decode_txs_and_events(block_hash, &block)
    }

    async fn balance(&self, address: &str) -> anyhow::Result<Balance> {
        let info = self
            .get_json(&format!("/accounts/{}/balance-info", address))
            .await?;

        let free = parse_u128(&info["free"]);
        let reserved = parse_u128(&info["reserved"]);
        let misc_frozen = parse_u128(&info["miscFrozen"]);
        let fee_frozen = parse_u128(&info["feeFrozen"]);

        // Accounts that never staked have no staking ledger; sidecar answers
        // with an error rather than an empty object.
        let staking = match self
            .get_json(&format!("/accounts/{}/staking-info", address))
            .await
        {
            Ok(ledger) => parse_u128(&ledger["staking"]["total"]),
            Err(err) => {
                debug!("no staking ledger: address={} error={}", address, err);
                0
            }
        };

        Ok(Balance {
            total: (free + reserved).to_string(),
            transferable: free.saturating_sub(misc_frozen).to_string(),
            payable_for_fee: free.saturating_sub(fee_frozen).to_string(),
            staking: staking.to_string(),
        })
    }
}

fn field_i64(value: &Value, field: &str) -> anyhow::Result<i64> {
    let raw = &value[field];
    if let Some(n) = raw.as_i64() {
        return Ok(n);
    }
    raw.as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| anyhow::anyhow!("missing numeric field: {}", field))
}

/// Block time comes from the `timestamp.set` inherent, unix milliseconds.
fn block_timestamp(block: &Value) -> i64 {
    let Some(extrinsics) = block["extrinsics"].as_array() else {
        return 0;
    };

    for ex in extrinsics {
        if ex["method"]["pallet"] == "timestamp" && ex["method"]["method"] == "set" {
            return i64::try_from(parse_u128(&ex["args"]["now"])).unwrap_or(0);
        }
    }
    0
}

fn decode_txs_and_events(block_hash: &str, block: &Value) -> anyhow::Result<Vec<TxAndEvents>> {
    let extrinsics = block["extrinsics"]
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("block {} has no extrinsics", block_hash))?;

    let mut txs_and_events = Vec::with_capacity(extrinsics.len());
    // Running index over every event in the block, qualifying or not, so
    // event ids stay stable across rescans.
    let mut event_index: usize = 0;

    for (ex_index, ex) in extrinsics.iter().enumerate() {
        let events = ex["events"].as_array().cloned().unwrap_or_default();

        let mut error = String::new();
        for record in &events {
            if record["method"]["pallet"] == "system"
                && record["method"]["method"] == "ExtrinsicFailed"
            {
                let data = record["data"].as_array().cloned().unwrap_or_default();
                error += &format!(
                    "{}: {}\n",
                    data.first().map(data_str).unwrap_or_default(),
                    data.get(1).map(data_str).unwrap_or_default()
                );
            }
        }

        let mut tx_and_events = TxAndEvents {
            transaction: TxInfo {
                id: format!("{}-{}", block_hash, ex_index),
                hash: data_str(&ex["hash"]),
                status: if error.is_empty() {
                    TxStatus::Success
                } else {
                    TxStatus::Fail
                },
                error,
            },
            events: Vec::new(),
        };

        let mut fee: u128 = 0;
        for record in &events {
            let pallet = record["method"]["pallet"].as_str().unwrap_or_default();
            let method = record["method"]["method"].as_str().unwrap_or_default();
            let data = record["data"].as_array().cloned().unwrap_or_default();

            if pallet == "balances" && method == "Deposit" {
                fee += data.get(1).map(parse_u128).unwrap_or(0);
            } else if pallet == "treasury" && method == "Deposit" {
                fee += data.first().map(parse_u128).unwrap_or(0);
            }
        }

        for record in &events {
            let pallet = record["method"]["pallet"].as_str().unwrap_or_default();
            let method = record["method"]["method"].as_str().unwrap_or_default();
            let data = record["data"].as_array().cloned().unwrap_or_default();
            let id = format!("{}-{}", block_hash, event_index);
            event_index += 1;

            let event = match (pallet, method) {
                ("balances", "Transfer") => EventInfo {
                    id,
                    action: super::TxAction::Transfer,
                    from: data.first().map(data_str).unwrap_or_default(),
                    to: data.get(1).map(data_str).unwrap_or_default(),
                    value: data.get(2).map(parse_u128).unwrap_or(0).to_string(),
                    fee: fee.to_string(),
                },
                ("staking", "Rewarded") => EventInfo {
                    id,
                    action: super::TxAction::StakingReward,
                    from: data.first().map(data_str).unwrap_or_default(),
                    to: data.first().map(data_str).unwrap_or_default(),
                    value: data.get(1).map(parse_u128).unwrap_or(0).to_string(),
                    fee: fee.to_string(),
                },
                ("staking", "Withdrawn") => EventInfo {
                    id,
                    action: super::TxAction::StakingWithdrawn,
                    from: data.first().map(data_str).unwrap_or_default(),
                    to: data.first().map(data_str).unwrap_or_default(),
                    value: data.get(1).map(parse_u128).unwrap_or(0).to_string(),
                    fee: fee.to_string(),
                },
                _ => continue,
            };

            tx_and_events.events.push(event);
        }

        txs_and_events.push(tx_and_events);
    }

    Ok(txs_and_events)
}

/// Sidecar renders balances as decimal strings; older deployments used raw
/// JSON numbers. Accept both, anything else reads as zero.
fn parse_u128(value: &Value) -> u128 {
    match value {
        Value::String(s) => s.parse().unwrap_or(0),
        Value::Number(n) => n.as_u64().map(u128::from).unwrap_or(0),
        _ => 0,
    }
}

fn data_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
