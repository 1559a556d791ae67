//! Ledger data model
//!
//! Blocks, transactions and outputs as seen by the name index and the RPC
//! layer. Identifiers are BLAKE3 hashes over a fixed field order, so the same
//! transaction always hashes to the same `TxId` regardless of how it was
//! serialized on the wire.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of transaction and block identifiers in bytes
pub const HASH_LEN: usize = 32;

/// Length of an owner address in bytes
pub const ADDRESS_LEN: usize = 20;

/// Errors raised when parsing identifiers from text
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Input is not valid hex
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),

    /// Input decoded to the wrong number of bytes
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required length
        expected: usize,
        /// Decoded length
        actual: usize,
    },
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], ParseError> {
    let bytes = hex::decode(s).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| ParseError::InvalidLength { expected: N, actual })
}

macro_rules! fixed_bytes_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Wrap raw bytes
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Raw bytes
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Lowercase hex form
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_fixed::<$len>(s).map(Self)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = ParseError;

            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                <[u8; $len]>::try_from(bytes)
                    .map(Self)
                    .map_err(|_| ParseError::InvalidLength {
                        expected: $len,
                        actual: bytes.len(),
                    })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }

        #[cfg(feature = "sqlite")]
        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(&self.0[..]))
            }
        }

        #[cfg(feature = "sqlite")]
        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                let blob = value.as_blob()?;
                <[u8; $len]>::try_from(blob).map(Self).map_err(|_| {
                    rusqlite::types::FromSqlError::InvalidBlobSize {
                        expected_size: $len,
                        blob_size: blob.len(),
                    }
                })
            }
        }
    };
}

fixed_bytes_id!(
    /// Transaction identifier (BLAKE3 over the transaction fields)
    TxId,
    HASH_LEN
);

fixed_bytes_id!(
    /// Block identifier (BLAKE3 over the block header and transaction ids)
    BlockId,
    HASH_LEN
);

fixed_bytes_id!(
    /// Owner address
    Address,
    ADDRESS_LEN
);

impl BlockId {
    /// Previous-block pointer carried by the first block
    pub const GENESIS: BlockId = BlockId([0u8; HASH_LEN]);
}

/// Points at one output of one ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputReference {
    /// Transaction containing the output
    pub trx_id: TxId,
    /// Position of the output within the transaction
    pub output_index: u32,
}

impl OutputReference {
    /// Create a new output reference
    pub fn new(trx_id: TxId, output_index: u32) -> Self {
        Self {
            trx_id,
            output_index,
        }
    }
}

impl fmt::Display for OutputReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.trx_id, self.output_index)
    }
}

/// Amount of a ledger asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Asset {
    /// Amount in base units
    pub amount: u64,
    /// Asset type; 0 is the native asset
    #[serde(default)]
    pub asset_id: u32,
}

impl Asset {
    /// Native asset amount
    pub const fn new(amount: u64) -> Self {
        Self {
            amount,
            asset_id: 0,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.asset_id == 0 {
            write!(f, "{}", self.amount)
        } else {
            write!(f, "{}#{}", self.amount, self.asset_id)
        }
    }
}

/// Raw record attached to a name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordPayload(pub String);

impl RecordPayload {
    /// Wrap record text
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Record text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for a bare bid with no record
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Claim metadata carried by a name output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameClaim {
    /// Claimed name (index key)
    pub name: String,
    /// Current owner
    pub owner: Address,
    /// Record payload
    #[serde(default)]
    pub record: RecordPayload,
}

/// Spending condition of an output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaimCondition {
    /// Plain value locked to an owner
    Signature {
        /// Owner able to spend the output
        owner: Address,
    },
    /// Bid, purchase, transfer or record update of a name
    Name(NameClaim),
}

/// One transaction output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Output {
    /// Value carried by the output (the bid amount for name claims)
    pub amount: Asset,
    /// Spending condition
    pub claim: ClaimCondition,
}

impl Output {
    /// Plain value output
    pub fn pay_to(owner: Address, amount: Asset) -> Self {
        Self {
            amount,
            claim: ClaimCondition::Signature { owner },
        }
    }

    /// Name claim output
    pub fn claim_name(claim: NameClaim, amount: Asset) -> Self {
        Self {
            amount,
            claim: ClaimCondition::Name(claim),
        }
    }

    /// Returns the name claim if this output carries one
    pub fn name_claim(&self) -> Option<&NameClaim> {
        match &self.claim {
            ClaimCondition::Name(claim) => Some(claim),
            ClaimCondition::Signature { .. } => None,
        }
    }

    /// True if this output is tagged as a name claim
    pub fn is_name_claim(&self) -> bool {
        self.name_claim().is_some()
    }

    fn hash_into(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.amount.amount.to_le_bytes());
        hasher.update(&self.amount.asset_id.to_le_bytes());
        match &self.claim {
            ClaimCondition::Signature { owner } => {
                hasher.update(&[0u8]);
                hasher.update(owner.as_bytes());
            }
            ClaimCondition::Name(claim) => {
                hasher.update(&[1u8]);
                hash_str(hasher, &claim.name);
                hasher.update(claim.owner.as_bytes());
                hash_str(hasher, claim.record.as_str());
            }
        }
    }
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

/// A ledger transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Transaction {
    /// Outputs spent by this transaction
    pub inputs: Vec<OutputReference>,
    /// Outputs created by this transaction
    pub outputs: Vec<Output>,
}

impl Transaction {
    /// Create a transaction
    pub fn new(inputs: Vec<OutputReference>, outputs: Vec<Output>) -> Self {
        Self { inputs, outputs }
    }

    /// Transaction identifier
    pub fn id(&self) -> TxId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.inputs.len() as u64).to_le_bytes());
        for input in &self.inputs {
            hasher.update(input.trx_id.as_bytes());
            hasher.update(&input.output_index.to_le_bytes());
        }
        hasher.update(&(self.outputs.len() as u64).to_le_bytes());
        for output in &self.outputs {
            output.hash_into(&mut hasher);
        }
        TxId(*hasher.finalize().as_bytes())
    }

    /// Iterate `(reference, claim)` for every name claim output, in output order
    pub fn name_claims(&self) -> impl Iterator<Item = (OutputReference, &NameClaim)> + '_ {
        let trx_id = self.id();
        self.outputs
            .iter()
            .enumerate()
            .filter_map(move |(index, output)| {
                output
                    .name_claim()
                    .map(|claim| (OutputReference::new(trx_id, index as u32), claim))
            })
    }
}

/// A block of transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block number; the first block is 1
    pub height: u32,
    /// Identifier of the preceding block
    pub previous: BlockId,
    /// Block timestamp (Unix milliseconds)
    pub timestamp: u64,
    /// Transactions in block order
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// First block of a ledger
    pub fn first(timestamp: u64, transactions: Vec<Transaction>) -> Self {
        Self {
            height: 1,
            previous: BlockId::GENESIS,
            timestamp,
            transactions,
        }
    }

    /// Block that extends `self`
    pub fn child(&self, timestamp: u64, transactions: Vec<Transaction>) -> Self {
        Self {
            height: self.height + 1,
            previous: self.id(),
            timestamp,
            transactions,
        }
    }

    /// Block identifier
    pub fn id(&self) -> BlockId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.height.to_le_bytes());
        hasher.update(self.previous.as_bytes());
        hasher.update(&self.timestamp.to_le_bytes());
        for trx in &self.transactions {
            hasher.update(trx.id().as_bytes());
        }
        BlockId(*hasher.finalize().as_bytes())
    }
}

/// Where a transaction landed in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLocation {
    /// Height of the containing block
    pub block_number: u32,
    /// Position within the block
    pub trx_num: u32,
}
