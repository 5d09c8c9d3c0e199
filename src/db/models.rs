use serde::Serialize;
use sqlx::prelude::FromRow;

use crate::chain::{TxStatus, TxAction};

/// Lifecycle of an indexed block. `Success` means the adaptor reported the
/// hash as canonical at a finalized height; `Forked` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockStatus {
    Pending = 0,
    Success = 1,
    Forked = 2,
}

impl BlockStatus {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(value: i32) -> Option<BlockStatus> {
        match value {
            0 => Some(BlockStatus::Pending),
            1 => Some(BlockStatus::Success),
            2 => Some(BlockStatus::Forked),
            _ => None,
        }
    }
}

#[derive(Default, Clone, Debug, FromRow, Serialize)]
pub struct Block {
    pub id: i64,
    pub hash: String,
    pub number: i64,
    pub status: i32,
    pub network: String,
    pub is_notified: bool,
}

impl Block {
    pub fn status(&self) -> BlockStatus {
        BlockStatus::from_i32(self.status).unwrap_or(BlockStatus::Pending)
    }
}

/// One extrinsic, created with its owning block and never mutated. A forked
/// block voids its transactions regardless of their own status.
#[derive(Default, Clone, Debug, FromRow)]
pub struct Transaction {
    pub id: i64,
    pub tx_id: String,
    pub hash: String,
    pub status: i32,
    pub error: String,
    pub block_id: i64,
}

impl Transaction {
    pub fn status(&self) -> TxStatus {
        TxStatus::from_i32(self.status).unwrap_or(TxStatus::Fail)
    }
}

#[derive(Default, Clone, Debug, FromRow)]
pub struct Event {
    pub id: i64,
    pub event_id: String,
    pub block_id: i64,
    pub transaction_id: i64,
    pub action: i32,
    pub from_addr: String,
    pub to_addr: String,
    pub value: String,
    pub fee: String,
    pub timestamp: i64,
    pub currency: i32,
    pub is_notified: bool,
}

impl Event {
    pub fn action(&self) -> TxAction {
        TxAction::from_i32(self.action).unwrap_or(TxAction::Transfer)
    }
}

/// Event joined with its transaction, the shape the notifier and the history
/// endpoint read.
#[derive(Default, Clone, Debug, FromRow)]
pub struct EventWithTx {
    pub event_id: String,
    pub action: i32,
    pub from_addr: String,
    pub to_addr: String,
    pub value: String,
    pub fee: String,
    pub timestamp: i64,
    pub currency: i32,
    pub tx_hash: String,
    pub tx_status: i32,
}

impl EventWithTx {
    pub fn action(&self) -> TxAction {
        TxAction::from_i32(self.action).unwrap_or(TxAction::Transfer)
    }

    pub fn tx_status(&self) -> TxStatus {
        TxStatus::from_i32(self.tx_status).unwrap_or(TxStatus::Fail)
    }
}

/// Transaction joined with its block, for `/transaction/{hash}` lookups.
#[derive(Default, Clone, Debug, FromRow)]
pub struct TxWithBlock {
    pub status: i32,
    pub block_status: i32,
    pub number: i64,
}

impl TxWithBlock {
    pub fn tx_status(&self) -> TxStatus {
        TxStatus::from_i32(self.status).unwrap_or(TxStatus::Fail)
    }

    pub fn block_status(&self) -> BlockStatus {
        BlockStatus::from_i32(self.block_status).unwrap_or(BlockStatus::Pending)
    }
}
