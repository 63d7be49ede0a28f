//! Domain records produced by tasks and consumed by storage backends.

use serde::{Deserialize, Serialize};

/// Describes the record type a task produces, for storage routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ModelDescriptor {
    /// Model name (matches the producing task's record type).
    pub name: &'static str,
    /// Table / collection the records belong in.
    pub table: &'static str,
    /// Layout version of the record's columns.
    pub version: u32,
}

/// A normalized EVM transaction from a Filecoin tipset.
///
/// Quantities that can exceed 64 bits (`value`, fee caps) are decimal
/// strings; signature components and input are lowercase `0x…` hex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmTransaction {
    pub height: i64,
    pub version: i32,
    pub hash: String,
    pub block_hash: String,
    pub from: String,
    /// Empty for contract creations.
    pub to: String,
    pub value: String,
    pub max_fee_per_gas: String,
    pub max_priority_fee_per_gas: String,
    pub chain_id: u64,
    pub nonce: u64,
    pub block_number: u64,
    pub transaction_index: u64,
    #[serde(rename = "type")]
    pub tx_type: u64,
    pub gas: u64,
    /// Zero when the node does not report it.
    pub gas_limit: u64,
    pub v: String,
    pub r: String,
    pub s: String,
    pub input: String,
}

impl EvmTransaction {
    pub const MODEL: ModelDescriptor = ModelDescriptor {
        name: "evm_transaction",
        table: "evm_transactions",
        version: 1,
    };
}

/// Any record a task can hand to [`Storage::write_many`](crate::storage::Storage::write_many).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum DomainRecord {
    EvmTransaction(EvmTransaction),
}

impl DomainRecord {
    pub fn model(&self) -> ModelDescriptor {
        match self {
            Self::EvmTransaction(_) => EvmTransaction::MODEL,
        }
    }

    /// Unique key within the record's table, used for upserts on replay.
    pub fn key(&self) -> &str {
        match self {
            Self::EvmTransaction(tx) => &tx.hash,
        }
    }

    pub fn height(&self) -> i64 {
        match self {
            Self::EvmTransaction(tx) => tx.height,
        }
    }
}

impl From<EvmTransaction> for DomainRecord {
    fn from(tx: EvmTransaction) -> Self {
        Self::EvmTransaction(tx)
    }
}
