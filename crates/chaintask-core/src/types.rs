//! Shared types for the task pipeline.

use std::str::FromStr;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use cid::Cid;
use serde::{Deserialize, Serialize};

use crate::error::{KeyError, MqError};

// ─── TipSet ───────────────────────────────────────────────────────────────────

/// The ordered set of block CIDs that identifies a tipset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TipSetKey(Vec<String>);

impl TipSetKey {
    pub fn new<I, S>(cids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(cids.into_iter().map(Into::into).collect())
    }

    pub fn cids(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Derive the Ethereum-style block hash (`0x…`, 32 bytes) for this key.
    ///
    /// This is the digest Lotus uses for the tipset's Eth block: blake2b-256
    /// over the DAG-CBOR byte string holding the concatenated binary CIDs.
    pub fn eth_hash(&self) -> Result<String, KeyError> {
        if self.0.is_empty() {
            return Err(KeyError::Empty);
        }
        let mut packed = Vec::new();
        for (position, cid) in self.0.iter().enumerate() {
            if cid.is_empty() {
                return Err(KeyError::EmptyCid { position });
            }
            let cid = Cid::from_str(cid).map_err(|e| KeyError::InvalidCid {
                position,
                reason: e.to_string(),
            })?;
            packed.extend_from_slice(&cid.to_bytes());
        }

        let mut encoded = cbor_bytes_header(packed.len());
        encoded.extend_from_slice(&packed);
        let digest = Blake2b::<U32>::digest(&encoded);
        Ok(format!("0x{}", hex::encode(digest)))
    }
}

/// CBOR major type 2 (byte string) header for a payload of `len` bytes.
fn cbor_bytes_header(len: usize) -> Vec<u8> {
    const MAJOR: u8 = 2 << 5;
    let len = len as u64;
    match len {
        0..=23 => vec![MAJOR | len as u8],
        24..=0xff => vec![MAJOR | 24, len as u8],
        0x100..=0xffff => {
            let mut out = vec![MAJOR | 25];
            out.extend_from_slice(&(len as u16).to_be_bytes());
            out
        }
        0x1_0000..=0xffff_ffff => {
            let mut out = vec![MAJOR | 26];
            out.extend_from_slice(&(len as u32).to_be_bytes());
            out
        }
        _ => {
            let mut out = vec![MAJOR | 27];
            out.extend_from_slice(&len.to_be_bytes());
            out
        }
    }
}

/// One unit of chain data: every block at a given height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipSet {
    /// Chain epoch.
    pub height: i64,
    /// Block CIDs at this height.
    pub key: TipSetKey,
}

impl TipSet {
    pub fn new(height: i64, key: TipSetKey) -> Self {
        Self { height, key }
    }
}

// ─── Message ──────────────────────────────────────────────────────────────────

/// A notification envelope delivered by a queue.
///
/// The body is the JSON encoding of the [`TipSet`] that became available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Queue-assigned delivery id, used for commits.
    pub id: String,
    pub body: Vec<u8>,
    /// How many times this message has been delivered before.
    pub attempts: u32,
}

impl Message {
    pub fn for_tipset(id: impl Into<String>, tipset: &TipSet) -> Result<Self, MqError> {
        let body = serde_json::to_vec(tipset).map_err(MqError::InvalidMessage)?;
        Ok(Self {
            id: id.into(),
            body,
            attempts: 0,
        })
    }

    /// Resolve the tipset this message announces.
    pub fn tipset(&self) -> Result<TipSet, MqError> {
        serde_json::from_slice(&self.body).map_err(MqError::InvalidMessage)
    }
}

// ─── RunReport ────────────────────────────────────────────────────────────────

/// Outcome of one successful task run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Number of domain records written (zero for empty tipsets).
    pub processed: usize,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
