pub mod client;

use async_trait::async_trait;
use thiserror::Error;

/// One reward-transfer event as returned by the chain provider. Amounts are
/// whole-token units, converted from base units at the client edge.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferEvent {
    pub recipient: String,
    pub amount: f64,
    pub block_number: u64,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The provider refused the block range as older than its retention
    /// window. Recoverable: the observer retries once with a narrowed range.
    #[error("block range rejected by provider: {0}")]
    RangeUnsupported(String),
    #[error("ledger query failed: {0}")]
    Query(String),
}

#[async_trait]
pub trait TransferLedger: Send + Sync {
    async fn latest_block(&self) -> Result<u64, LedgerError>;

    /// Transfer events in `[from_block, to_block]`, in provider order.
    /// `None` means from genesis.
    async fn transfer_events(
        &self,
        from_block: Option<u64>,
        to_block: u64,
    ) -> Result<Vec<TransferEvent>, LedgerError>;

    /// Widest lookback the provider is known to serve, in blocks.
    fn max_lookback_blocks(&self) -> u64;
}
