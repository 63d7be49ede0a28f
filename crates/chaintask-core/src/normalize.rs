//! Raw transaction record → [`EvmTransaction`].
//!
//! Every field access is a two-phase probe: presence and JSON type first,
//! then codec conversion. The first failure aborts the record, and nothing
//! partial is returned.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::codec::{self, CodecError};
use crate::model::EvmTransaction;

/// One untyped transaction object as returned by the node.
pub type RawRecord = Map<String, Value>;

/// Wire key of the transaction index.
pub const TRANSACTION_INDEX: &str = "transactionIndex";

/// Misspelled transaction index key emitted by older Lotus Eth API builds.
pub const TRANSACTION_INDEX_LEGACY: &str = "transacionIndex";

/// A required field that could not be read or decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("required field `{field}` is missing")]
    Missing { field: &'static str },

    #[error("field `{field}` is a {found}, expected a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("field `{field}` could not be decoded")]
    Decode {
        field: &'static str,
        #[source]
        source: CodecError,
    },
}

impl FieldError {
    /// Wire name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Missing { field } | Self::WrongType { field, .. } | Self::Decode { field, .. } => {
                field
            }
        }
    }
}

/// A record in a batch that failed normalization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transaction {index} rejected")]
pub struct RecordError {
    /// Position of the record in the block's transaction list.
    pub index: usize,
    #[source]
    pub source: FieldError,
}

/// Per-tipset values stamped onto every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeContext {
    pub height: i64,
    pub version: i32,
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn required_str<'a>(raw: &'a RawRecord, field: &'static str) -> Result<&'a str, FieldError> {
    let value = raw.get(field).ok_or(FieldError::Missing { field })?;
    value.as_str().ok_or(FieldError::WrongType {
        field,
        expected: "string",
        found: json_type(value),
    })
}

/// Absent, `null`, or non-string values all read as `None`.
fn optional_str<'a>(raw: &'a RawRecord, field: &'static str) -> Option<&'a str> {
    raw.get(field).and_then(Value::as_str)
}

fn decode<T>(
    field: &'static str,
    input: &str,
    parse: fn(&str) -> Result<T, CodecError>,
) -> Result<T, FieldError> {
    parse(input).map_err(|source| FieldError::Decode { field, source })
}

fn required_u64(raw: &RawRecord, field: &'static str) -> Result<u64, FieldError> {
    decode(field, required_str(raw, field)?, codec::parse_hex_to_u64)
}

fn required_decimal(raw: &RawRecord, field: &'static str) -> Result<String, FieldError> {
    decode(field, required_str(raw, field)?, codec::parse_hex_to_big_decimal)
}

fn required_bytes(raw: &RawRecord, field: &'static str) -> Result<String, FieldError> {
    decode(field, required_str(raw, field)?, codec::parse_hex_bytes)
}

fn transaction_index(raw: &RawRecord) -> Result<u64, FieldError> {
    if raw.contains_key(TRANSACTION_INDEX) {
        required_u64(raw, TRANSACTION_INDEX)
    } else if raw.contains_key(TRANSACTION_INDEX_LEGACY) {
        required_u64(raw, TRANSACTION_INDEX_LEGACY)
    } else {
        Err(FieldError::Missing {
            field: TRANSACTION_INDEX,
        })
    }
}

/// Normalize one raw transaction.
pub fn normalize_transaction(
    raw: &RawRecord,
    ctx: &NormalizeContext,
) -> Result<EvmTransaction, FieldError> {
    let mut tx = EvmTransaction {
        height: ctx.height,
        version: ctx.version,
        hash: required_str(raw, "hash")?.to_string(),
        block_hash: required_str(raw, "blockHash")?.to_string(),
        from: required_str(raw, "from")?.to_string(),
        value: required_decimal(raw, "value")?,
        max_fee_per_gas: required_decimal(raw, "maxFeePerGas")?,
        max_priority_fee_per_gas: required_decimal(raw, "maxPriorityFeePerGas")?,
        ..Default::default()
    };

    if let Some(to) = optional_str(raw, "to") {
        tx.to = to.to_string();
    }
    if let Some(gas_limit) = optional_str(raw, "gasLimit") {
        tx.gas_limit = decode("gasLimit", gas_limit, codec::parse_hex_to_u64)?;
    }

    tx.chain_id = required_u64(raw, "chainId")?;
    tx.nonce = required_u64(raw, "nonce")?;
    tx.block_number = required_u64(raw, "blockNumber")?;
    tx.transaction_index = transaction_index(raw)?;
    tx.tx_type = required_u64(raw, "type")?;
    tx.gas = required_u64(raw, "gas")?;

    tx.v = required_bytes(raw, "v")?;
    tx.r = required_bytes(raw, "r")?;
    tx.s = required_bytes(raw, "s")?;
    tx.input = required_bytes(raw, "input")?;

    Ok(tx)
}

/// Normalize a block's transactions, preserving order.
///
/// Stops at the first bad record; the error carries its position.
pub fn normalize_all(
    raws: &[RawRecord],
    ctx: &NormalizeContext,
) -> Result<Vec<EvmTransaction>, RecordError> {
    raws.iter()
        .enumerate()
        .map(|(index, raw)| {
            normalize_transaction(raw, ctx).map_err(|source| RecordError { index, source })
        })
        .collect()
}
