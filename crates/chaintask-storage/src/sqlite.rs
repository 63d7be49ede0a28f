//! SQLite storage backend for ChainTask.
//!
//! Persists domain records to a single SQLite file via `sqlx`, one table per
//! model. Each `write_many` batch is applied in a single transaction and
//! upserts on the record key, so a replayed tipset rewrites the same rows.
//!
//! # Usage
//! ```rust,no_run
//! use chaintask_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./chaintask.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::debug;

use chaintask_core::context::RunContext;
use chaintask_core::error::StorageError;
use chaintask_core::model::{DomainRecord, EvmTransaction};
use chaintask_core::storage::Storage;

fn backend(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// SQLite-backed record storage.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./chaintask.db"`) or a full
    /// SQLite URL (`"sqlite:./chaintask.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(backend)?;
        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, StorageError> {
        // Each connection to `:memory:` is a separate database, so keep one.
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(backend)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(backend)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS evm_transactions (
                hash                     TEXT    PRIMARY KEY,
                height                   INTEGER NOT NULL,
                version                  INTEGER NOT NULL,
                block_hash               TEXT    NOT NULL,
                from_addr                TEXT    NOT NULL,
                to_addr                  TEXT    NOT NULL,
                value                    TEXT    NOT NULL,
                max_fee_per_gas          TEXT    NOT NULL,
                max_priority_fee_per_gas TEXT    NOT NULL,
                chain_id                 INTEGER NOT NULL,
                nonce                    INTEGER NOT NULL,
                block_number             INTEGER NOT NULL,
                transaction_index        INTEGER NOT NULL,
                tx_type                  INTEGER NOT NULL,
                gas                      INTEGER NOT NULL,
                gas_limit                INTEGER NOT NULL,
                v                        TEXT    NOT NULL,
                r                        TEXT    NOT NULL,
                s                        TEXT    NOT NULL,
                input                    TEXT    NOT NULL,
                ingested_at              INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_evm_transactions_height ON evm_transactions (height);",
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    // ─── Queries ────────────────────────────────────────────────────────────────

    /// Number of stored EVM transactions.
    pub async fn transaction_count(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM evm_transactions")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }

    /// Transactions at `height`, in block order.
    pub async fn transactions_at(&self, height: i64) -> Result<Vec<EvmTransaction>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM evm_transactions WHERE height = ?
             ORDER BY block_number, transaction_index",
        )
        .bind(height)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        // Unsigned columns are stored as their two's-complement i64 bit pattern.
        Ok(rows
            .into_iter()
            .map(|row| EvmTransaction {
                height: row.get("height"),
                version: row.get("version"),
                hash: row.get("hash"),
                block_hash: row.get("block_hash"),
                from: row.get("from_addr"),
                to: row.get("to_addr"),
                value: row.get("value"),
                max_fee_per_gas: row.get("max_fee_per_gas"),
                max_priority_fee_per_gas: row.get("max_priority_fee_per_gas"),
                chain_id: row.get::<i64, _>("chain_id") as u64,
                nonce: row.get::<i64, _>("nonce") as u64,
                block_number: row.get::<i64, _>("block_number") as u64,
                transaction_index: row.get::<i64, _>("transaction_index") as u64,
                tx_type: row.get::<i64, _>("tx_type") as u64,
                gas: row.get::<i64, _>("gas") as u64,
                gas_limit: row.get::<i64, _>("gas_limit") as u64,
                v: row.get("v"),
                r: row.get("r"),
                s: row.get("s"),
                input: row.get("input"),
            })
            .collect())
    }
}

const UPSERT_TRANSACTION: &str = "
    INSERT INTO evm_transactions (
        hash, height, version, block_hash, from_addr, to_addr, value,
        max_fee_per_gas, max_priority_fee_per_gas, chain_id, nonce,
        block_number, transaction_index, tx_type, gas, gas_limit,
        v, r, s, input, ingested_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(hash) DO UPDATE SET
        height = excluded.height,
        version = excluded.version,
        block_hash = excluded.block_hash,
        from_addr = excluded.from_addr,
        to_addr = excluded.to_addr,
        value = excluded.value,
        max_fee_per_gas = excluded.max_fee_per_gas,
        max_priority_fee_per_gas = excluded.max_priority_fee_per_gas,
        chain_id = excluded.chain_id,
        nonce = excluded.nonce,
        block_number = excluded.block_number,
        transaction_index = excluded.transaction_index,
        tx_type = excluded.tx_type,
        gas = excluded.gas,
        gas_limit = excluded.gas_limit,
        v = excluded.v,
        r = excluded.r,
        s = excluded.s,
        input = excluded.input,
        ingested_at = excluded.ingested_at";

#[async_trait]
impl Storage for SqliteStorage {
    async fn write_many(
        &self,
        ctx: &RunContext,
        records: Vec<DomainRecord>,
    ) -> Result<(), StorageError> {
        ctx.check()?;
        let now = chrono::Utc::now().timestamp();
        let count = records.len();

        let mut db_tx = self.pool.begin().await.map_err(backend)?;
        for record in &records {
            match record {
                DomainRecord::EvmTransaction(t) => {
                    sqlx::query(UPSERT_TRANSACTION)
                        .bind(&t.hash)
                        .bind(t.height)
                        .bind(t.version)
                        .bind(&t.block_hash)
                        .bind(&t.from)
                        .bind(&t.to)
                        .bind(&t.value)
                        .bind(&t.max_fee_per_gas)
                        .bind(&t.max_priority_fee_per_gas)
                        .bind(t.chain_id as i64)
                        .bind(t.nonce as i64)
                        .bind(t.block_number as i64)
                        .bind(t.transaction_index as i64)
                        .bind(t.tx_type as i64)
                        .bind(t.gas as i64)
                        .bind(t.gas_limit as i64)
                        .bind(&t.v)
                        .bind(&t.r)
                        .bind(&t.s)
                        .bind(&t.input)
                        .bind(now)
                        .execute(&mut *db_tx)
                        .await
                        .map_err(backend)?;
                }
            }
        }
        db_tx.commit().await.map_err(backend)?;

        debug!(count, "records stored");
        Ok(())
    }
}
