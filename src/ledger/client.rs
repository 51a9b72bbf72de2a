use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::LedgerConfig;
use crate::ledger::{LedgerError, TransferEvent, TransferLedger};

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 6;

/// keccak256("Transfer(address,address,uint256)")
const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

const BASE_UNITS_PER_TOKEN: f64 = 1e18;

/// JSON-RPC transfer ledger: `eth_blockNumber` for the head,
/// `eth_getLogs` filtered on the reward token's Transfer topic for events.
pub struct RpcLedger {
    client: Client,
    rpc_url: String,
    token_address: String,
    max_lookback_blocks: u64,
}

impl RpcLedger {
    pub fn new(config: &LedgerConfig) -> Self {
        let client = Client::builder()
            .user_agent("retrieval-stats/0.1")
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()
            .expect("failed to build ledger HTTP client");
        Self {
            client,
            rpc_url: config.rpc_url.clone(),
            token_address: config.token_address.clone(),
            max_lookback_blocks: config.max_lookback_blocks,
        }
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LedgerError::Query(format!("POST {} failed: {e}", self.rpc_url)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Query(format!(
                "{method} returned HTTP {status}"
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| LedgerError::Query(format!("invalid {method} response: {e}")))?;

        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown RPC error")
                .to_string();
            if is_range_rejection(&message) {
                return Err(LedgerError::RangeUnsupported(message));
            }
            return Err(LedgerError::Query(message));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| LedgerError::Query(format!("{method} response missing result")))
    }
}

#[async_trait]
impl TransferLedger for RpcLedger {
    async fn latest_block(&self) -> Result<u64, LedgerError> {
        let result = self.rpc("eth_blockNumber", json!([])).await?;
        result
            .as_str()
            .and_then(parse_hex_u64)
            .ok_or_else(|| LedgerError::Query(format!("unparseable block number: {result}")))
    }

    async fn transfer_events(
        &self,
        from_block: Option<u64>,
        to_block: u64,
    ) -> Result<Vec<TransferEvent>, LedgerError> {
        let from = match from_block {
            Some(block) => hex_block(block),
            None => "earliest".to_string(),
        };
        let params = json!([{
            "fromBlock": from,
            "toBlock": hex_block(to_block),
            "address": self.token_address,
            "topics": [TRANSFER_TOPIC],
        }]);
        let result = self.rpc("eth_getLogs", params).await?;
        let logs = result
            .as_array()
            .ok_or_else(|| LedgerError::Query("eth_getLogs result is not an array".to_string()))?;

        let mut events = Vec::new();
        for log in logs {
            match decode_transfer_log(log) {
                Some(event) => events.push(event),
                None => warn!("skipping undecodable transfer log: {log}"),
            }
        }
        Ok(events)
    }

    fn max_lookback_blocks(&self) -> u64 {
        self.max_lookback_blocks
    }
}

/// Providers reject out-of-retention ranges with messages in this class;
/// anything else is a generic query failure.
fn is_range_rejection(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    ["range", "too old", "retention", "pruned"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

fn decode_transfer_log(log: &Value) -> Option<TransferEvent> {
    let topics = log.get("topics")?.as_array()?;
    let recipient_topic = topics.get(2)?.as_str()?;
    let stripped = recipient_topic.strip_prefix("0x")?;
    if stripped.len() < 40 {
        return None;
    }
    let recipient = format!("0x{}", &stripped[stripped.len() - 40..]);

    let data = log.get("data")?.as_str()?;
    let raw_amount = u128::from_str_radix(data.strip_prefix("0x")?, 16).ok()?;
    let amount = raw_amount as f64 / BASE_UNITS_PER_TOKEN;

    let block_number = parse_hex_u64(log.get("blockNumber")?.as_str()?)?;

    Some(TransferEvent {
        recipient,
        amount,
        block_number,
    })
}

fn parse_hex_u64(raw: &str) -> Option<u64> {
    u64::from_str_radix(raw.strip_prefix("0x").unwrap_or(raw), 16).ok()
}

fn hex_block(block: u64) -> String {
    format!("0x{block:x}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{decode_transfer_log, hex_block, is_range_rejection, parse_hex_u64};

    #[test]
    fn parses_hex_block_numbers_both_ways() {
        assert_eq!(parse_hex_u64("0x10"), Some(16));
        assert_eq!(parse_hex_u64("0xdeadbeef"), Some(0xdead_beef));
        assert_eq!(parse_hex_u64("nope"), None);
        assert_eq!(hex_block(16), "0x10");
        assert_eq!(hex_block(0), "0x0");
    }

    #[test]
    fn decodes_a_transfer_log() {
        let log = json!({
            "topics": [
                "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
                "0x0000000000000000000000001111111111111111111111111111111111111111",
                "0x0000000000000000000000002222222222222222222222222222222222222222"
            ],
            "data": "0x0000000000000000000000000000000000000000000000001bc16d674ec80000",
            "blockNumber": "0x64"
        });
        let event = decode_transfer_log(&log).expect("failed to decode log");
        assert_eq!(event.recipient, "0x2222222222222222222222222222222222222222");
        assert!((event.amount - 2.0).abs() < 1e-9);
        assert_eq!(event.block_number, 100);
    }

    #[test]
    fn rejects_logs_missing_the_recipient_topic() {
        let log = json!({
            "topics": [
                "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
            ],
            "data": "0x01",
            "blockNumber": "0x64"
        });
        assert!(decode_transfer_log(&log).is_none());
    }

    #[test]
    fn classifies_range_rejections() {
        assert!(is_range_rejection("requested block range is too wide"));
        assert!(is_range_rejection("block 12 is too old for this node"));
        assert!(is_range_rejection("state has been pruned"));
        assert!(!is_range_rejection("connection reset by peer"));
        assert!(!is_range_rejection("internal server error"));
    }
}
