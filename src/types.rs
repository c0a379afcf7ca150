//! Core data model: canonical r values and signature occurrences

use num_bigint::BigUint;
use secp256k1::ecdsa::Signature;
use serde::Serialize;

/// The r component of an ECDSA signature, canonicalized to 32 big-endian
/// bytes with leading zeros preserved.
///
/// The byte form keys the Bloom filter; [`RValue::to_decimal`] produces the
/// text form used for exact sets and the result document. Both are views of
/// the same integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RValue([u8; 32]);

impl RValue {
    /// Extract r from a parsed signature.
    pub fn from_signature(sig: &Signature) -> Self {
        let compact = sig.serialize_compact();
        let mut r = [0u8; 32];
        r.copy_from_slice(&compact[..32]);
        Self(r)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Decimal text form, the keying used by the candidate set and the
    /// result document.
    pub fn to_decimal(&self) -> String {
        BigUint::from_bytes_be(&self.0).to_str_radix(10)
    }
}

/// One ECDSA signature occurrence inside a transaction input script.
///
/// The four indices together identify the occurrence uniquely; a single r
/// value may appear in many records. Only the location fields are encoded
/// in the result document.
#[derive(Debug, Clone, Serialize)]
pub struct SignatureRecord {
    #[serde(skip)]
    pub r: RValue,
    /// Block height
    #[serde(rename = "H")]
    pub height: u64,
    /// Transaction position within the block
    #[serde(rename = "Tx")]
    pub tx_index: usize,
    /// Input position within the transaction
    #[serde(rename = "TxIn")]
    pub txin_index: usize,
    /// Push-data position within the input's signature script
    #[serde(rename = "Data")]
    pub data_index: usize,
}
