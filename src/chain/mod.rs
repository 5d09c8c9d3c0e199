use async_trait::async_trait;
use serde::{Serialize, Serializer};

pub mod substrate;

pub use substrate::SubstrateAdaptor;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Network {
    Polkadot,
    Kusama,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Polkadot => "Polkadot",
            Network::Kusama => "Kusama",
        }
    }

    pub fn native_currency(&self) -> Currency {
        match self {
            Network::Polkadot => Currency::Dot,
            Network::Kusama => Currency::Ksm,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Native currency of an indexed network. Serialized as the original wire
/// numbers so existing subscribers keep working.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Currency {
    Dot = 0,
    Ksm = 1,
}

impl Currency {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(value: i32) -> Option<Currency> {
        match value {
            0 => Some(Currency::Dot),
            1 => Some(Currency::Ksm),
            _ => None,
        }
    }

    pub fn from_code(code: &str) -> Option<Currency> {
        match code {
            "DOT" => Some(Currency::Dot),
            "KSM" => Some(Currency::Ksm),
            _ => None,
        }
    }

    pub fn network(&self) -> Network {
        match self {
            Currency::Dot => Network::Polkadot,
            Currency::Ksm => Network::Kusama,
        }
    }
}

impl Serialize for Currency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

/// What a balance-affecting event did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxAction {
    Transfer = 0,
    StakingReward = 1,
    StakingWithdrawn = 2,
    Staking = 3,
}

impl TxAction {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(value: i32) -> Option<TxAction> {
        match value {
            0 => Some(TxAction::Transfer),
            1 => Some(TxAction::StakingReward),
            2 => Some(TxAction::StakingWithdrawn),
            3 => Some(TxAction::Staking),
            _ => None,
        }
    }
}

impl Serialize for TxAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

/// Outcome of an extrinsic as recorded on chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Success = 0,
    Fail = 1,
}

impl TxStatus {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(value: i32) -> Option<TxStatus> {
        match value {
            0 => Some(TxStatus::Success),
            1 => Some(TxStatus::Fail),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChainBlock {
    pub height: i64,
    pub hash: String,
    /// Chain time of the block, unix milliseconds.
    pub timestamp: i64,
}

#[derive(Clone, Debug)]
pub struct TxInfo {
    /// `{block_hash}-{extrinsic_index}`.
    pub id: String,
    pub hash: String,
    pub status: TxStatus,
    pub error: String,
}

#[derive(Clone, Debug)]
pub struct EventInfo {
    /// `{block_hash}-{event_index}`.
    pub id: String,
    pub action: TxAction,
    pub from: String,
    pub to: String,
    /// Decimal string, chain-native units.
    pub value: String,
    /// Decimal string, fee paid by the owning extrinsic.
    pub fee: String,
}

#[derive(Clone, Debug)]
pub struct TxAndEvents {
    pub transaction: TxInfo,
    pub events: Vec<EventInfo>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Balance {
    pub total: String,
    pub transferable: String,
    pub payable_for_fee: String,
    pub staking: String,
}

/// Capability surface the scanner and query API need from a chain.
///
/// Implementations wrap one node/sidecar connection per network; callers hold
/// them behind `Arc<dyn Adaptor>` and never see chain-client types.
#[async_trait]
pub trait Adaptor: Send + Sync {
    fn currency(&self) -> Currency;

    /// Current (possibly non-final) tip height.
    async fn last_height(&self) -> anyhow::Result<i64>;

    async fn last_finalized_height(&self) -> anyhow::Result<i64>;

    async fn block(&self, height: i64) -> anyhow::Result<ChainBlock>;

    async fn txs_and_events(&self, block_hash: &str) -> anyhow::Result<Vec<TxAndEvents>>;

    async fn balance(&self, address: &str) -> anyhow::Result<Balance>;
}
