//! Mutex-backed `Store` used by the scanner and notifier unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{Block, BlockStatus, Event, EventWithTx, Store, Transaction};
use crate::chain::{Currency, Network};

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<State>,
}

#[derive(Default)]
struct State {
    blocks: Vec<Block>,
    transactions: Vec<Transaction>,
    events: Vec<Event>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.inner.lock().unwrap().blocks.clone()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.inner.lock().unwrap().transactions.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn blocks_at(&self, network: Network, number: i64) -> Vec<Block> {
        self.inner
            .lock()
            .unwrap()
            .blocks
            .iter()
            .filter(|b| b.network == network.as_str() && b.number == number)
            .cloned()
            .collect()
    }
}

fn highest<'a>(blocks: impl Iterator<Item = &'a Block>) -> Option<Block> {
    blocks.max_by_key(|b| b.number).cloned()
}

#[async_trait]
impl Store for MemStore {
    async fn last_block_by_status(
        &self,
        network: Network,
        status: BlockStatus,
    ) -> anyhow::Result<Option<Block>> {
        let state = self.inner.lock().unwrap();
        Ok(highest(state.blocks.iter().filter(|b| {
            b.network == network.as_str() && b.status == status.as_i32()
        })))
    }

    async fn last_notified_block(&self, network: Network) -> anyhow::Result<Option<Block>> {
        let state = self.inner.lock().unwrap();
        Ok(highest(state.blocks.iter().filter(|b| {
            b.network == network.as_str()
                && b.status == BlockStatus::Success.as_i32()
                && b.is_notified
        })))
    }

    async fn last_unnotified_success_block(
        &self,
        network: Network,
    ) -> anyhow::Result<Option<Block>> {
        let state = self.inner.lock().unwrap();
        Ok(highest(state.blocks.iter().filter(|b| {
            b.network == network.as_str()
                && b.status == BlockStatus::Success.as_i32()
                && !b.is_notified
        })))
    }

    async fn block_by_hash(&self, network: Network, hash: &str) -> anyhow::Result<Option<Block>> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .blocks
            .iter()
            .find(|b| b.network == network.as_str() && b.hash == hash)
            .cloned())
    }

    async fn success_block_at(
        &self,
        network: Network,
        number: i64,
    ) -> anyhow::Result<Option<Block>> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .blocks
            .iter()
            .find(|b| {
                b.network == network.as_str()
                    && b.number == number
                    && b.status == BlockStatus::Success.as_i32()
            })
            .cloned())
    }

    async fn purge_blocks_from(&self, network: Network, number: i64) -> anyhow::Result<u64> {
        let mut state = self.inner.lock().unwrap();
        let doomed: Vec<i64> = state
            .blocks
            .iter()
            .filter(|b| b.network == network.as_str() && b.number >= number)
            .map(|b| b.id)
            .collect();

        state.blocks.retain(|b| !doomed.contains(&b.id));
        state.transactions.retain(|t| !doomed.contains(&t.block_id));
        state.events.retain(|e| !doomed.contains(&e.block_id));

        Ok(doomed.len() as u64)
    }

    async fn mark_forked_except(
        &self,
        network: Network,
        number: i64,
        hash: &str,
    ) -> anyhow::Result<u64> {
        let mut state = self.inner.lock().unwrap();
        let mut touched = 0;
        for block in state.blocks.iter_mut() {
            if block.network == network.as_str() && block.number == number && block.hash != hash {
                block.status = BlockStatus::Forked.as_i32();
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn confirm_block(
        &self,
        network: Network,
        number: i64,
        hash: &str,
    ) -> anyhow::Result<()> {
        let mut state = self.inner.lock().unwrap();
        for block in state.blocks.iter_mut() {
            if block.network == network.as_str() && block.number == number && block.hash == hash {
                block.status = BlockStatus::Success.as_i32();
            }
        }
        Ok(())
    }

    async fn insert_block(&self, block: &Block) -> anyhow::Result<i64> {
        let mut state = self.inner.lock().unwrap();
        if state.blocks.iter().any(|b| b.hash == block.hash) {
            anyhow::bail!("duplicate block hash: {}", block.hash);
        }
        let id = state.next_id();
        let mut row = block.clone();
        row.id = id;
        state.blocks.push(row);
        Ok(id)
    }

    async fn insert_transaction(&self, tx: &Transaction) -> anyhow::Result<i64> {
        let mut state = self.inner.lock().unwrap();
        if state.transactions.iter().any(|t| t.tx_id == tx.tx_id) {
            anyhow::bail!("duplicate tx_id: {}", tx.tx_id);
        }
        let id = state.next_id();
        let mut row = tx.clone();
        row.id = id;
        state.transactions.push(row);
        Ok(id)
    }

    async fn insert_events(&self, events: &[Event]) -> anyhow::Result<()> {
        let mut state = self.inner.lock().unwrap();
        for event in events {
            if state.events.iter().any(|e| e.event_id == event.event_id) {
                anyhow::bail!("duplicate event_id: {}", event.event_id);
            }
            let id = state.next_id();
            let mut row = event.clone();
            row.id = id;
            state.events.push(row);
        }
        Ok(())
    }

    async fn unnotified_events(
        &self,
        block_id: i64,
        currency: Currency,
    ) -> anyhow::Result<Vec<EventWithTx>> {
        let state = self.inner.lock().unwrap();
        let mut rows: Vec<(i64, EventWithTx)> = Vec::new();
        for event in state
            .events
            .iter()
            .filter(|e| e.block_id == block_id && e.currency == currency.as_i32() && !e.is_notified)
        {
            let tx = state
                .transactions
                .iter()
                .find(|t| t.id == event.transaction_id)
                .ok_or_else(|| anyhow::anyhow!("event without transaction: {}", event.event_id))?;

            rows.push((
                event.id,
                EventWithTx {
                    event_id: event.event_id.clone(),
                    action: event.action,
                    from_addr: event.from_addr.clone(),
                    to_addr: event.to_addr.clone(),
                    value: event.value.clone(),
                    fee: event.fee.clone(),
                    timestamp: event.timestamp,
                    currency: event.currency,
                    tx_hash: tx.hash.clone(),
                    tx_status: tx.status,
                },
            ));
        }

        rows.sort_by_key(|(id, _)| *id);
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }

    async fn set_events_notified(&self, block_id: i64) -> anyhow::Result<()> {
        let mut state = self.inner.lock().unwrap();
        for event in state.events.iter_mut() {
            if event.block_id == block_id {
                event.is_notified = true;
            }
        }
        Ok(())
    }

    async fn set_block_notified(&self, block_id: i64) -> anyhow::Result<()> {
        let mut state = self.inner.lock().unwrap();
        for block in state.blocks.iter_mut() {
            if block.id == block_id {
                block.is_notified = true;
            }
        }
        Ok(())
    }
}
