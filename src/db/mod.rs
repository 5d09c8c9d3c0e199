use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::chain::{Currency, Network};
use crate::config::DBConfig;

#[cfg(test)]
pub mod memory;
mod models;

pub use models::*;

static MIGRATOR: Migrator = sqlx::migrate!("src/db/migrations");

pub async fn open_postgres_db(config: DBConfig) -> anyhow::Result<Repo> {
    let pool = PgPoolOptions::new()
        .max_connections(100)
        .connect(&config.dsn)
        .await?;
    let repo = Repo { pool };
    if config.automigrate {
        repo.migrate().await?;
    }
    Ok(repo)
}

/// Persistence contract the scanner and notifier run against.
///
/// The scanner owns block/transaction/event creation and block status; the
/// notifier owns only the `is_notified` latches. `Repo` implements this over
/// Postgres, `memory::MemStore` over a mutex for tests.
#[async_trait]
pub trait Store: Send + Sync {
    /// Highest block with the given status, if any.
    async fn last_block_by_status(
        &self,
        network: Network,
        status: BlockStatus,
    ) -> anyhow::Result<Option<Block>>;

    /// Highest confirmed block already delivered to the subscriber.
    async fn last_notified_block(&self, network: Network) -> anyhow::Result<Option<Block>>;

    /// Highest confirmed block still awaiting delivery.
    async fn last_unnotified_success_block(
        &self,
        network: Network,
    ) -> anyhow::Result<Option<Block>>;

    async fn block_by_hash(&self, network: Network, hash: &str) -> anyhow::Result<Option<Block>>;

    async fn success_block_at(
        &self,
        network: Network,
        number: i64,
    ) -> anyhow::Result<Option<Block>>;

    /// Drop every block at or above `number` together with its transactions
    /// and events. Startup recovery for a provisional scan window.
    async fn purge_blocks_from(&self, network: Network, number: i64) -> anyhow::Result<u64>;

    /// Mark every block at this height whose hash differs from the canonical
    /// one as forked. Returns the number of rows touched.
    async fn mark_forked_except(
        &self,
        network: Network,
        number: i64,
        hash: &str,
    ) -> anyhow::Result<u64>;

    /// Promote the block with the canonical hash at this height to `Success`.
    async fn confirm_block(&self, network: Network, number: i64, hash: &str)
        -> anyhow::Result<()>;

    async fn insert_block(&self, block: &Block) -> anyhow::Result<i64>;

    async fn insert_transaction(&self, tx: &Transaction) -> anyhow::Result<i64>;

    async fn insert_events(&self, events: &[Event]) -> anyhow::Result<()>;

    /// Undelivered events of one block joined with their transactions, in
    /// insertion (extrinsic) order.
    async fn unnotified_events(
        &self,
        block_id: i64,
        currency: Currency,
    ) -> anyhow::Result<Vec<EventWithTx>>;

    /// Latch the delivered events of a block. One-way, false to true only.
    async fn set_events_notified(&self, block_id: i64) -> anyhow::Result<()>;

    async fn set_block_notified(&self, block_id: i64) -> anyhow::Result<()>;
}

pub struct Repo {
    pub pool: PgPool,
}

impl Repo {
    pub async fn migrate(&self) -> anyhow::Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub async fn reset_schema(&self) -> anyhow::Result<()> {
        let _ = sqlx::query("DROP SCHEMA public CASCADE")
            .execute(&self.pool)
            .await?;

        let _ = sqlx::query("CREATE SCHEMA public")
            .execute(&self.pool)
            .await?;
        self.migrate().await?;
        Ok(())
    }

    /// Highest indexed block regardless of status, for `/status`.
    pub async fn last_block(&self, network: Network) -> anyhow::Result<Option<Block>> {
        let result = sqlx::query_as::<_, Block>(
            "SELECT * FROM blocks WHERE network = $1 ORDER BY number DESC LIMIT 1",
        )
        .bind(network.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    /// Latest non-forked occurrence of a transaction hash, for
    /// `/transaction/{hash}`.
    pub async fn tx_with_block_by_hash(&self, hash: &str) -> anyhow::Result<Option<TxWithBlock>> {
        let result = sqlx::query_as::<_, TxWithBlock>(
            "SELECT t.status, b.status AS block_status, b.number
             FROM transactions t JOIN blocks b ON t.block_id = b.id
             WHERE t.hash = $1 AND b.status <> $2
             ORDER BY b.number DESC LIMIT 1",
        )
        .bind(hash)
        .bind(BlockStatus::Forked.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    /// Confirmed-block event history touching an address, newest first.
    pub async fn address_history(
        &self,
        currency: Currency,
        address: &str,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<EventWithTx>> {
        let result = sqlx::query_as::<_, EventWithTx>(
            "SELECT e.event_id, e.action, e.from_addr, e.to_addr, e.value, e.fee,
                    e.timestamp, e.currency, t.hash AS tx_hash, t.status AS tx_status
             FROM events e
             JOIN transactions t ON e.transaction_id = t.id
             JOIN blocks b ON e.block_id = b.id
             WHERE e.currency = $1 AND (e.from_addr = $2 OR e.to_addr = $2) AND b.status = $3
             ORDER BY e.timestamp DESC
             LIMIT $4 OFFSET $5",
        )
        .bind(currency.as_i32())
        .bind(address)
        .bind(BlockStatus::Success.as_i32())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(result)
    }
}

#[async_trait]
impl Store for Repo {
    async fn last_block_by_status(
        &self,
        network: Network,
        status: BlockStatus,
    ) -> anyhow::Result<Option<Block>> {
        let result = sqlx::query_as::<_, Block>(
            "SELECT * FROM blocks WHERE network = $1 AND status = $2
             ORDER BY number DESC LIMIT 1",
        )
        .bind(network.as_str())
        .bind(status.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn last_notified_block(&self, network: Network) -> anyhow::Result<Option<Block>> {
        let result = sqlx::query_as::<_, Block>(
            "SELECT * FROM blocks WHERE network = $1 AND status = $2 AND is_notified = true
             ORDER BY number DESC LIMIT 1",
        )
        .bind(network.as_str())
        .bind(BlockStatus::Success.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn last_unnotified_success_block(
        &self,
        network: Network,
    ) -> anyhow::Result<Option<Block>> {
        let result = sqlx::query_as::<_, Block>(
            "SELECT * FROM blocks WHERE network = $1 AND status = $2 AND is_notified = false
             ORDER BY number DESC LIMIT 1",
        )
        .bind(network.as_str())
        .bind(BlockStatus::Success.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn block_by_hash(&self, network: Network, hash: &str) -> anyhow::Result<Option<Block>> {
        let result =
            sqlx::query_as::<_, Block>("SELECT * FROM blocks WHERE network = $1 AND hash = $2")
                .bind(network.as_str())
                .bind(hash)
                .fetch_optional(&self.pool)
                .await?;

        Ok(result)
    }

    async fn success_block_at(
        &self,
        network: Network,
        number: i64,
    ) -> anyhow::Result<Option<Block>> {
        let result = sqlx::query_as::<_, Block>(
            "SELECT * FROM blocks WHERE network = $1 AND number = $2 AND status = $3",
        )
        .bind(network.as_str())
        .bind(number)
        .bind(BlockStatus::Success.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn purge_blocks_from(&self, network: Network, number: i64) -> anyhow::Result<u64> {
        // Transactions and events go with their block via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM blocks WHERE network = $1 AND number >= $2")
            .bind(network.as_str())
            .bind(number)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn mark_forked_except(
        &self,
        network: Network,
        number: i64,
        hash: &str,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE blocks SET status = $1
             WHERE network = $2 AND number = $3 AND hash <> $4",
        )
        .bind(BlockStatus::Forked.as_i32())
        .bind(network.as_str())
        .bind(number)
        .bind(hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn confirm_block(
        &self,
        network: Network,
        number: i64,
        hash: &str,
    ) -> anyhow::Result<()> {
        let _ = sqlx::query(
            "UPDATE blocks SET status = $1
             WHERE network = $2 AND number = $3 AND hash = $4",
        )
        .bind(BlockStatus::Success.as_i32())
        .bind(network.as_str())
        .bind(number)
        .bind(hash)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_block(&self, block: &Block) -> anyhow::Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO blocks (hash, number, status, network, is_notified)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&block.hash)
        .bind(block.number)
        .bind(block.status)
        .bind(&block.network)
        .bind(block.is_notified)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn insert_transaction(&self, tx: &Transaction) -> anyhow::Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO transactions (tx_id, hash, status, error, block_id)
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&tx.tx_id)
        .bind(&tx.hash)
        .bind(tx.status)
        .bind(&tx.error)
        .bind(tx.block_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn insert_events(&self, events: &[Event]) -> anyhow::Result<()> {
        for event in events {
            let _ = sqlx::query(
                "INSERT INTO events (
                    event_id, block_id, transaction_id, action, from_addr, to_addr,
                    value, fee, timestamp, currency, is_notified)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(&event.event_id)
            .bind(event.block_id)
            .bind(event.transaction_id)
            .bind(event.action)
            .bind(&event.from_addr)
            .bind(&event.to_addr)
            .bind(&event.value)
            .bind(&event.fee)
            .bind(event.timestamp)
            .bind(event.currency)
            .bind(event.is_notified)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn unnotified_events(
        &self,
        block_id: i64,
        currency: Currency,
    ) -> anyhow::Result<Vec<EventWithTx>> {
        let result = sqlx::query_as::<_, EventWithTx>(
            "SELECT e.event_id, e.action, e.from_addr, e.to_addr, e.value, e.fee,
                    e.timestamp, e.currency, t.hash AS tx_hash, t.status AS tx_status
             FROM events e JOIN transactions t ON e.transaction_id = t.id
             WHERE e.block_id = $1 AND e.currency = $2 AND e.is_notified = false
             ORDER BY e.id ASC",
        )
        .bind(block_id)
        .bind(currency.as_i32())
        .fetch_all(&self.pool)
        .await?;

        Ok(result)
    }

    async fn set_events_notified(&self, block_id: i64) -> anyhow::Result<()> {
        let _ = sqlx::query("UPDATE events SET is_notified = true WHERE block_id = $1")
            .bind(block_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_block_notified(&self, block_id: i64) -> anyhow::Result<()> {
        let _ = sqlx::query("UPDATE blocks SET is_notified = true WHERE id = $1")
            .bind(block_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
