use serde::{Deserialize, Serialize, Serializer};

use crate::chain::{Currency, TxAction, TxStatus};
use crate::db;

pub mod api;
pub mod errors;
pub mod server;

/// Transaction status as reported to API consumers and the subscriber.
/// `Pending` means the transaction is not in any confirmed block yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatusRs {
    Pending = 0,
    Success = 1,
    Fail = 2,
}

impl TxStatusRs {
    pub fn from_tx_status(status: TxStatus) -> TxStatusRs {
        match status {
            TxStatus::Success => TxStatusRs::Success,
            TxStatus::Fail => TxStatusRs::Fail,
        }
    }

    /// Status reported for a transaction-by-hash lookup. An unseen hash and a
    /// hash whose block is not confirmed both read as `Pending`; only a
    /// `Success` block surfaces the transaction's own outcome.
    pub fn from_tx_with_block(row: Option<&db::TxWithBlock>) -> TxStatusRs {
        match row {
            None => TxStatusRs::Pending,
            Some(row) => match row.block_status() {
                db::BlockStatus::Success => TxStatusRs::from_tx_status(row.tx_status()),
                _ => TxStatusRs::Pending,
            },
        }
    }
}

impl Serialize for TxStatusRs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(*self as i32)
    }
}

/// One confirmed balance event, the shape shared by the history endpoint and
/// the notifier batch.
#[derive(Clone, Debug, Serialize)]
pub struct TransactionRs {
    pub id: String,
    pub action: TxAction,
    pub hash: String,
    pub currency: Currency,
    pub to: String,
    pub from: String,
    pub value: String,
    pub fee: String,
    pub timestamp: i64,
    pub status: TxStatusRs,
}

impl TransactionRs {
    pub fn from_event(row: &db::EventWithTx, fallback: Currency) -> TransactionRs {
        TransactionRs {
            id: row.event_id.clone(),
            action: row.action(),
            hash: row.tx_hash.clone(),
            currency: Currency::from_i32(row.currency).unwrap_or(fallback),
            to: row.to_addr.clone(),
            from: row.from_addr.clone(),
            value: row.value.clone(),
            fee: row.fee.clone(),
            timestamp: row.timestamp,
            status: TxStatusRs::from_tx_status(row.tx_status()),
        }
    }
}

#[derive(Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub currency: Option<String>,
}

impl PageParams {
    pub const MAX_PAGE_SIZE: i64 = 1000;
    pub const DEFAULT_PAGE_SIZE: i64 = 1000;

    pub fn get_size(&self) -> i64 {
        let size = self.size.unwrap_or(Self::DEFAULT_PAGE_SIZE);
        size.clamp(1, Self::MAX_PAGE_SIZE)
    }

    pub fn get_page(&self) -> i64 {
        self.page.unwrap_or(0).max(0)
    }

    pub fn get_currency(&self) -> Currency {
        self.currency
            .as_deref()
            .and_then(Currency::from_code)
            .unwrap_or(Currency::Dot)
    }
}
