use std::sync::Arc;
use std::time::Duration;

use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::chain::{Adaptor, Network, TxAndEvents};
use crate::config;
use crate::db::{Block, BlockStatus, Event, Store, Transaction};

/// Brings the store up to date with one network's chain: windowed concurrent
/// fetch, strictly ascending commit, fork reconciliation at finalized heights.
pub struct Scanner {
    store: Arc<dyn Store>,
    adaptor: Arc<dyn Adaptor>,
    network: Network,
    cfg: config::ScannerConfig,
}

/// Result of the parallel fetch phase for one height.
struct FetchedBlock {
    hash: String,
    timestamp: i64,
    /// The observed hash is already stored; children were not re-fetched.
    known: bool,
    txs_and_events: Vec<TxAndEvents>,
}

impl Scanner {
    pub fn new(
        cfg: &config::ScannerConfig,
        network: Network,
        store: Arc<dyn Store>,
        adaptor: Arc<dyn Adaptor>,
    ) -> Self {
        Self {
            store,
            adaptor,
            network,
            cfg: cfg.clone(),
        }
    }

    pub fn start(self, cancel: CancellationToken) -> JoinHandle<anyhow::Result<()>> {
        tokio::spawn(self.run(cancel))
    }

    /// Scan until cancelled. Any adaptor or store error is returned to the
    /// caller: the process is expected to exit and recover via the startup
    /// purge on restart.
    async fn run(self, stop_signal: CancellationToken) -> anyhow::Result<()> {
        self.reconcile_on_start().await?;

        loop {
            let last_success = self
                .store
                .last_block_by_status(self.network, BlockStatus::Success)
                .await?;
            let start_height = match last_success {
                Some(block) => block.number + 1,
                None => self.cfg.starting_height,
            };

            let mut to_height = self.adaptor.last_height().await?;

            let last_pending = self
                .store
                .last_block_by_status(self.network, BlockStatus::Pending)
                .await?;
            if let Some(pending) = last_pending {
                if pending.number >= to_height {
                    // The chain has not advanced past what we already hold.
                    debug!(
                        "tip not advanced: network={} pending={} tip={}",
                        self.network, pending.number, to_height
                    );
                    tokio::select! {
                        _ = sleep(Duration::from_secs(self.cfg.backpressure_sleep_secs)) => {}

                        _ = stop_signal.cancelled() => {
                            break;
                        }
                    };
                }
            }

            if to_height - self.cfg.scan_window > start_height {
                to_height = start_height + self.cfg.scan_window;
            }

            self.scan(start_height, to_height).await?;

            tokio::select! {
                _ = sleep(Duration::from_millis(10)) => {
                    continue;
               }

                _ = stop_signal.cancelled() => {
                    break;
                }
            };
        }

        info!("scanner stopped: network={}", self.network);
        Ok(())
    }

    /// A `Success` mark does not survive a restart in the presence of deep
    /// forks: drop everything from the highest confirmed height up and
    /// re-fetch it.
    pub async fn reconcile_on_start(&self) -> anyhow::Result<()> {
        let last_success = self
            .store
            .last_block_by_status(self.network, BlockStatus::Success)
            .await?;

        if let Some(block) = last_success {
            let purged = self
                .store
                .purge_blocks_from(self.network, block.number)
                .await?;
            info!(
                "purged provisional window: network={} from_height={} blocks={}",
                self.network, block.number, purged
            );
        }

        Ok(())
    }

    /// One scan pass over `[from_height, to_height]`, inclusive. Fetches every
    /// height concurrently, then commits strictly in height order.
    pub async fn scan(&self, from_height: i64, to_height: i64) -> anyhow::Result<()> {
        let last_finalized = self.adaptor.last_finalized_height().await?;

        let mut fetches = Vec::new();
        for height in from_height..=to_height {
            let store = self.store.clone();
            let adaptor = self.adaptor.clone();
            let network = self.network;
            fetches.push((
                height,
                tokio::spawn(
                    async move { fetch_block(&*store, &*adaptor, network, height).await },
                ),
            ));
        }

        for (height, handle) in fetches {
            let fetched = handle.await??;

            debug!(
                "fetched block: network={} height={} hash={}",
                self.network, height, fetched.hash
            );

            if last_finalized >= height {
                // The adaptor's view of a finalized height wins retroactively:
                // any stored sibling with another hash is off the canonical
                // chain now.
                let forked = self
                    .store
                    .mark_forked_except(self.network, height, &fetched.hash)
                    .await?;
                if forked > 0 {
                    info!(
                        "fork resolved: network={} height={} canonical={} forked_rows={}",
                        self.network, height, fetched.hash, forked
                    );
                }
            }

            if fetched.known {
                if last_finalized >= height {
                    self.store
                        .confirm_block(self.network, height, &fetched.hash)
                        .await?;
                    info!(
                        "block confirmed: network={} height={} hash={}",
                        self.network, height, fetched.hash
                    );
                }
                continue;
            }

            self.commit_new_block(height, last_finalized, &fetched)
                .await?;
        }

        Ok(())
    }

    async fn commit_new_block(
        &self,
        height: i64,
        last_finalized: i64,
        fetched: &FetchedBlock,
    ) -> anyhow::Result<()> {
        let status = if last_finalized >= height {
            BlockStatus::Success
        } else {
            BlockStatus::Pending
        };

        let block = Block {
            id: 0,
            hash: fetched.hash.clone(),
            number: height,
            status: status.as_i32(),
            network: self.network.as_str().to_string(),
            is_notified: false,
        };
        let block_id = self.store.insert_block(&block).await?;

        let currency = self.adaptor.currency();
        let mut events = Vec::new();
        for tx_and_events in &fetched.txs_and_events {
            let chain_tx = &tx_and_events.transaction;
            let tx = Transaction {
                id: 0,
                tx_id: chain_tx.id.clone(),
                hash: chain_tx.hash.clone(),
                status: chain_tx.status.as_i32(),
                error: chain_tx.error.clone(),
                block_id,
            };
            let transaction_id = self.store.insert_transaction(&tx).await?;
            debug!("tx found: hash={}", tx.hash);

            for event in &tx_and_events.events {
                events.push(Event {
                    id: 0,
                    event_id: event.id.clone(),
                    block_id,
                    transaction_id,
                    action: event.action.as_i32(),
                    from_addr: event.from.clone(),
                    to_addr: event.to.clone(),
                    value: event.value.clone(),
                    fee: event.fee.clone(),
                    timestamp: fetched.timestamp,
                    currency: currency.as_i32(),
                    is_notified: false,
                });
                debug!("event found: id={}", event.id);
            }
        }
        self.store.insert_events(&events).await?;

        info!(
            "added block: network={} height={} status={:?} txs={} events={}",
            self.network,
            height,
            status,
            fetched.txs_and_events.len(),
            events.len()
        );
        Ok(())
    }
}

/// Fetch phase for one height. Independent of every other height; errors are
/// surfaced when the commit phase joins this task.
async fn fetch_block(
    store: &dyn Store,
    adaptor: &dyn Adaptor,
    network: Network,
    height: i64,
) -> anyhow::Result<FetchedBlock> {
    let block = adaptor.block(height).await?;

    if store.block_by_hash(network, &block.hash).await?.is_some() {
        return Ok(FetchedBlock {
            hash: block.hash,
            timestamp: block.timestamp,
            known: true,
            txs_and_events: Vec::new(),
        });
    }

    let txs_and_events = adaptor.txs_and_events(&block.hash).await?;
    Ok(FetchedBlock {
        hash: block.hash,
        timestamp: block.timestamp,
        known: false,
        txs_and_events,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::chain::{
        Balance, ChainBlock, Currency, EventInfo, TxAction, TxInfo, TxStatus,
    };
    use crate::db::memory::MemStore;

    struct MockAdaptor {
        tip: i64,
        finalized: i64,
        blocks: HashMap<i64, ChainBlock>,
        txs: HashMap<String, Vec<TxAndEvents>>,
    }

    impl MockAdaptor {
        fn new(tip: i64, finalized: i64) -> Self {
            Self {
                tip,
                finalized,
                blocks: HashMap::new(),
                txs: HashMap::new(),
            }
        }

        fn with_block(mut self, height: i64, hash: &str, txs: Vec<TxAndEvents>) -> Self {
            self.blocks.insert(
                height,
                ChainBlock {
                    height,
                    hash: hash.to_string(),
                    timestamp: 1_700_000_000_000 + height,
                },
            );
            self.txs.insert(hash.to_string(), txs);
            self
        }
    }

    #[async_trait]
    impl Adaptor for MockAdaptor {
        fn currency(&self) -> Currency {
            Currency::Dot
        }

        async fn last_height(&self) -> anyhow::Result<i64> {
            Ok(self.tip)
        }

        async fn last_finalized_height(&self) -> anyhow::Result<i64> {
            Ok(self.finalized)
        }

        async fn block(&self, height: i64) -> anyhow::Result<ChainBlock> {
            self.blocks
                .get(&height)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no block at height {}", height))
        }

        async fn txs_and_events(&self, block_hash: &str) -> anyhow::Result<Vec<TxAndEvents>> {
            Ok(self.txs.get(block_hash).cloned().unwrap_or_default())
        }

        async fn balance(&self, _address: &str) -> anyhow::Result<Balance> {
            anyhow::bail!("not used by the scanner")
        }
    }

    fn transfer_tx(block_hash: &str, index: usize) -> TxAndEvents {
        TxAndEvents {
            transaction: TxInfo {
                id: format!("{}-{}", block_hash, index),
                hash: format!("0xtx-{}-{}", block_hash, index),
                status: TxStatus::Success,
                error: String::new(),
            },
            events: vec![EventInfo {
                id: format!("{}-ev{}", block_hash, index),
                action: TxAction::Transfer,
                from: "alice".to_string(),
                to: "bob".to_string(),
                value: "1000".to_string(),
                fee: "42".to_string(),
            }],
        }
    }

    fn scanner_cfg() -> config::ScannerConfig {
        config::ScannerConfig {
            starting_height: 1,
            scan_window: 100,
            backpressure_sleep_secs: 3,
        }
    }

    fn scanner(store: Arc<MemStore>, adaptor: MockAdaptor) -> Scanner {
        Scanner::new(
            &scanner_cfg(),
            Network::Polkadot,
            store,
            Arc::new(adaptor),
        )
    }

    async fn seed_block(
        store: &MemStore,
        number: i64,
        hash: &str,
        status: BlockStatus,
        is_notified: bool,
    ) -> i64 {
        store
            .insert_block(&Block {
                id: 0,
                hash: hash.to_string(),
                number,
                status: status.as_i32(),
                network: Network::Polkadot.as_str().to_string(),
                is_notified,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn first_sight_splits_on_finality() {
        // Scenario A: tip 124, finalized 123, empty store.
        let store = Arc::new(MemStore::new());
        let adaptor = MockAdaptor::new(124, 123)
            .with_block(123, "hash-123", vec![transfer_tx("hash-123", 0)])
            .with_block(124, "hash-124", vec![transfer_tx("hash-124", 0)]);

        scanner(store.clone(), adaptor).scan(123, 124).await.unwrap();

        let blocks = store.blocks();
        assert_eq!(blocks.len(), 2);
        let b123 = &store.blocks_at(Network::Polkadot, 123)[0];
        let b124 = &store.blocks_at(Network::Polkadot, 124)[0];
        assert_eq!(b123.status(), BlockStatus::Success);
        assert_eq!(b124.status(), BlockStatus::Pending);

        assert_eq!(store.transactions().len(), 2);
        let events = store.events();
        assert_eq!(events.len(), 2);
        // Events inherit the block timestamp and the adaptor currency.
        let ev123 = events.iter().find(|e| e.block_id == b123.id).unwrap();
        assert_eq!(ev123.timestamp, 1_700_000_000_000 + 123);
        assert_eq!(ev123.currency, Currency::Dot.as_i32());
        assert_eq!(ev123.value, "1000");
    }

    #[tokio::test]
    async fn pending_block_confirmed_in_place() {
        // Scenario B: re-observing a stored hash at a finalized height
        // flips it to Success without duplicating rows.
        let store = Arc::new(MemStore::new());
        seed_block(&store, 123, "hash-123", BlockStatus::Pending, false).await;

        let adaptor = MockAdaptor::new(124, 123).with_block(123, "hash-123", Vec::new());
        scanner(store.clone(), adaptor).scan(123, 123).await.unwrap();

        let blocks = store.blocks_at(Network::Polkadot, 123);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].status(), BlockStatus::Success);
        assert!(store.transactions().is_empty());
    }

    #[tokio::test]
    async fn finalized_observation_forks_siblings() {
        // P2: stored Success hash X loses to the freshly observed hash Y.
        let store = Arc::new(MemStore::new());
        seed_block(&store, 123, "hash-x", BlockStatus::Success, false).await;
        seed_block(&store, 123, "hash-y", BlockStatus::Pending, false).await;

        let adaptor = MockAdaptor::new(124, 123).with_block(123, "hash-y", Vec::new());
        scanner(store.clone(), adaptor).scan(123, 123).await.unwrap();

        let blocks = store.blocks_at(Network::Polkadot, 123);
        let x = blocks.iter().find(|b| b.hash == "hash-x").unwrap();
        let y = blocks.iter().find(|b| b.hash == "hash-y").unwrap();
        assert_eq!(x.status(), BlockStatus::Forked);
        assert_eq!(y.status(), BlockStatus::Success);
    }

    #[tokio::test]
    async fn at_most_one_success_per_height() {
        // P1: even a first-sight insert at a finalized height demotes any
        // stored sibling.
        let store = Arc::new(MemStore::new());
        seed_block(&store, 123, "hash-x", BlockStatus::Success, false).await;

        let adaptor = MockAdaptor::new(124, 123).with_block(123, "hash-y", Vec::new());
        scanner(store.clone(), adaptor).scan(123, 123).await.unwrap();

        let blocks = store.blocks_at(Network::Polkadot, 123);
        let success: Vec<_> = blocks
            .iter()
            .filter(|b| b.status() == BlockStatus::Success)
            .collect();
        assert_eq!(success.len(), 1);
        assert_eq!(success[0].hash, "hash-y");
    }

    #[tokio::test]
    async fn rescan_is_idempotent() {
        // P3: the second pass sees the hash in the store and creates nothing.
        let store = Arc::new(MemStore::new());
        let adaptor = MockAdaptor::new(124, 123)
            .with_block(123, "hash-123", vec![transfer_tx("hash-123", 0)]);
        let scanner = scanner(store.clone(), adaptor);

        scanner.scan(123, 123).await.unwrap();
        scanner.scan(123, 123).await.unwrap();

        assert_eq!(store.blocks().len(), 1);
        assert_eq!(store.transactions().len(), 1);
        assert_eq!(store.events().len(), 1);
    }

    #[tokio::test]
    async fn empty_block_still_recorded() {
        let store = Arc::new(MemStore::new());
        let adaptor = MockAdaptor::new(124, 123).with_block(123, "hash-123", Vec::new());

        scanner(store.clone(), adaptor).scan(123, 123).await.unwrap();

        assert_eq!(store.blocks().len(), 1);
        assert!(store.transactions().is_empty());
        assert!(store.events().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_propagates_after_lower_commits() {
        // Height 124 is unknown to the adaptor; 123 must still land.
        let store = Arc::new(MemStore::new());
        let adaptor = MockAdaptor::new(125, 125).with_block(123, "hash-123", Vec::new());

        let result = scanner(store.clone(), adaptor).scan(123, 124).await;
        assert!(result.is_err());
        assert_eq!(store.blocks_at(Network::Polkadot, 123).len(), 1);
        assert!(store.blocks_at(Network::Polkadot, 124).is_empty());
    }

    #[tokio::test]
    async fn startup_purge_drops_provisional_window() {
        let store = Arc::new(MemStore::new());
        seed_block(&store, 120, "hash-120", BlockStatus::Success, true).await;
        seed_block(&store, 121, "hash-121", BlockStatus::Success, false).await;
        seed_block(&store, 122, "hash-122", BlockStatus::Pending, false).await;

        let adaptor = MockAdaptor::new(124, 123);
        scanner(store.clone(), adaptor)
            .reconcile_on_start()
            .await
            .unwrap();

        let remaining = store.blocks();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].number, 120);
    }
}
