//! Core protocol types: transactions, certificates, sidechain payloads.
//!
//! All monetary values are in zats (1 COIN = 10^8 zats).
//! All numeric fields use u64 per protocol convention, except certificate
//! epochs which are u32.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{CertificateError, HashError, TransactionError};

/// A 32-byte hash value.
///
/// Used for entry identifiers (BLAKE3), sidechain identifiers (double
/// SHA-256), and withdrawal-claim nullifiers.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a Hash256 from a hex string of up to 64 characters.
    ///
    /// Short strings fill the leading bytes; the remainder is zero. This
    /// mirrors the abbreviated identifiers used throughout the test suites
    /// (`Hash256::from_hex("aaaa")` and the like).
    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        if s.len() > 64 {
            return Err(HashError::TooLong(s.len()));
        }
        let decoded = hex::decode(s).map_err(|e| HashError::InvalidHex(e.to_string()))?;
        let mut bytes = [0u8; 32];
        bytes[..decoded.len()].copy_from_slice(&decoded);
        Ok(Self(bytes))
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Sidechain identifier, derived from a creation output (see [`sidechain_id`]).
pub type ScId = Hash256;

/// Single-use withdrawal-claim nullifier.
pub type Nullifier = Hash256;

/// Derive the sidechain identifier minted by creation output `index` of the
/// transaction with the given identifier.
///
/// Double SHA-256 over `txid || index_le`, so the identifier is fixed the
/// moment the creation transaction is built, before it confirms.
pub fn sidechain_id(txid: &Hash256, index: u64) -> ScId {
    let mut data = Vec::with_capacity(32 + 8);
    data.extend_from_slice(txid.as_bytes());
    data.extend_from_slice(&index.to_le_bytes());
    let first = Sha256::digest(&data);
    Hash256(Sha256::digest(first).into())
}

/// Reference to a specific output of a previous transaction or certificate.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    /// Identifier of the entry containing the referenced output.
    pub txid: Hash256,
    /// Index of the output within the entry.
    pub index: u64,
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// An input spending a previous output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxInput {
    /// The outpoint being spent.
    pub previous_output: OutPoint,
    /// Signature bytes. Opaque to the pool; validated upstream.
    pub signature: Vec<u8>,
    /// Public key bytes. Opaque to the pool; validated upstream.
    pub public_key: Vec<u8>,
}

/// An ordinary value-bearing output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOutput {
    /// Value in zats.
    pub value: u64,
    /// Hash of the recipient's public key.
    pub pubkey_hash: Hash256,
}

/// A sidechain-creation output. Mints a new sidechain whose identifier is
/// derived from the enclosing transaction and this output's index.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct ScCreationOutput {
    /// Initial forward value locked into the sidechain, in zats.
    pub value: u64,
    /// Length of the sidechain's withdrawal epochs, in mainchain blocks.
    pub withdrawal_epoch_length: u64,
}

/// A mainchain-to-sidechain value transfer output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct ForwardTransferOutput {
    /// Target sidechain.
    pub sc_id: ScId,
    /// Transferred value in zats.
    pub value: u64,
}

/// A backward-transfer request ("mbtr"): asks the sidechain to pay out in a
/// future certificate.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BtrRequestOutput {
    /// Target sidechain.
    pub sc_id: ScId,
    /// Fee paid to the sidechain for servicing the request, in zats.
    pub sc_fee: u64,
    /// Opaque request payload interpreted by the sidechain.
    pub request_data: Vec<u8>,
}

/// A ceased-sidechain-withdrawal input: claims part of a permanently closed
/// sidechain's final balance, keyed by a single-use nullifier.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct CswInput {
    /// The ceased sidechain being claimed against.
    pub sc_id: ScId,
    /// Claimed value in zats.
    pub value: u64,
    /// Nullifier unique to this claim.
    pub nullifier: Nullifier,
    /// Hash of the public key allowed to redeem the claim.
    pub pubkey_hash: Hash256,
}

/// A transaction: ordinary inputs/outputs plus the sidechain vectors.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    /// Protocol version.
    pub version: u64,
    /// Inputs consuming previous outputs.
    pub inputs: Vec<TxInput>,
    /// Ordinary outputs created by this transaction.
    pub outputs: Vec<TxOutput>,
    /// Sidechain-creation outputs.
    pub sc_creations: Vec<ScCreationOutput>,
    /// Forward-transfer outputs.
    pub forward_transfers: Vec<ForwardTransferOutput>,
    /// Backward-transfer-request outputs.
    pub btr_requests: Vec<BtrRequestOutput>,
    /// Ceased-sidechain-withdrawal inputs.
    pub csw_inputs: Vec<CswInput>,
    /// Block height or timestamp before which this tx is invalid.
    pub lock_time: u64,
}

impl Transaction {
    /// Compute the transaction ID (BLAKE3 hash of the canonical encoding).
    pub fn txid(&self) -> Result<Hash256, TransactionError> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| TransactionError::Serialization(e.to_string()))?;
        Ok(Hash256(blake3::hash(&encoded).into()))
    }

    /// The sidechain identifier minted by creation output `index`.
    pub fn sidechain_id(&self, index: usize) -> Result<ScId, TransactionError> {
        if index >= self.sc_creations.len() {
            return Err(TransactionError::CreationIndexOutOfBounds {
                index,
                len: self.sc_creations.len(),
            });
        }
        Ok(sidechain_id(&self.txid()?, index as u64))
    }

    /// Whether this transaction carries any withdrawal-claim inputs.
    pub fn has_csw_inputs(&self) -> bool {
        !self.csw_inputs.is_empty()
    }

    /// Whether this transaction mints any sidechains.
    pub fn is_sidechain_creation(&self) -> bool {
        !self.sc_creations.is_empty()
    }

    /// Sum of all ordinary output values. Returns None on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }
}

/// A withdrawal certificate: a quality-ranked attestation finalizing one
/// sidechain epoch and authorizing backward transfers.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Certificate {
    /// Protocol version.
    pub version: u64,
    /// The sidechain this certificate attests for.
    pub sc_id: ScId,
    /// The withdrawal epoch being finalized.
    pub epoch: u32,
    /// Rank among competing certificates for the same epoch; higher wins.
    pub quality: u64,
    /// Inputs consuming previous outputs (possibly a prior certificate's change).
    pub inputs: Vec<TxInput>,
    /// Change outputs, spendable while the certificate is unconfirmed.
    pub change_outputs: Vec<TxOutput>,
    /// Backward-transfer outputs, spendable only after confirmation.
    pub backward_transfers: Vec<TxOutput>,
}

impl Certificate {
    /// Compute the certificate ID (BLAKE3 hash of the canonical encoding).
    ///
    /// Shares the identifier namespace with [`Transaction::txid`].
    pub fn cert_id(&self) -> Result<Hash256, CertificateError> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CertificateError::Serialization(e.to_string()))?;
        Ok(Hash256(blake3::hash(&encoded).into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COIN;

    fn sample_input(seed: u8) -> TxInput {
        TxInput {
            previous_output: OutPoint {
                txid: Hash256([seed; 32]),
                index: 0,
            },
            signature: vec![0u8; 64],
            public_key: vec![0u8; 32],
        }
    }

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![sample_input(0x11)],
            outputs: vec![TxOutput {
                value: 50 * COIN,
                pubkey_hash: Hash256([0xAA; 32]),
            }],
            sc_creations: vec![],
            forward_transfers: vec![],
            btr_requests: vec![],
            csw_inputs: vec![],
            lock_time: 0,
        }
    }

    fn sample_cert() -> Certificate {
        Certificate {
            version: 1,
            sc_id: Hash256([0xBB; 32]),
            epoch: 0,
            quality: 10,
            inputs: vec![sample_input(0x22)],
            change_outputs: vec![TxOutput {
                value: 4 * COIN,
                pubkey_hash: Hash256([0xCC; 32]),
            }],
            backward_transfers: vec![TxOutput {
                value: 6 * COIN,
                pubkey_hash: Hash256([0xDD; 32]),
            }],
        }
    }

    // --- Hash256 ---

    #[test]
    fn hash256_zero_is_zero() {
        assert!(Hash256::ZERO.is_zero());
        assert_eq!(Hash256::ZERO, Hash256::default());
    }

    #[test]
    fn hash256_display_hex() {
        let h = Hash256([0xAB; 32]);
        let s = format!("{h}");
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(&s[0..2], "ab");
    }

    #[test]
    fn hash256_from_hex_short() {
        let h = Hash256::from_hex("aaaa").unwrap();
        assert_eq!(h.0[0], 0xAA);
        assert_eq!(h.0[1], 0xAA);
        assert_eq!(h.0[2], 0x00);
        assert!(!h.is_zero());
    }

    #[test]
    fn hash256_from_hex_full_round_trip() {
        let h = Hash256([0x5E; 32]);
        let parsed = Hash256::from_hex(&h.to_string()).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn hash256_from_hex_rejects_bad_input() {
        assert!(matches!(
            Hash256::from_hex("zz"),
            Err(HashError::InvalidHex(_))
        ));
        let long = "a".repeat(65);
        assert!(matches!(Hash256::from_hex(&long), Err(HashError::TooLong(65))));
    }

    // --- sidechain_id ---

    #[test]
    fn sidechain_id_deterministic() {
        let txid = Hash256([0x11; 32]);
        assert_eq!(sidechain_id(&txid, 0), sidechain_id(&txid, 0));
    }

    #[test]
    fn sidechain_id_distinct_per_index() {
        let txid = Hash256([0x11; 32]);
        assert_ne!(sidechain_id(&txid, 0), sidechain_id(&txid, 1));
    }

    #[test]
    fn sidechain_id_distinct_per_txid() {
        assert_ne!(
            sidechain_id(&Hash256([0x11; 32]), 0),
            sidechain_id(&Hash256([0x12; 32]), 0)
        );
    }

    #[test]
    fn tx_sidechain_id_matches_free_function() {
        let mut tx = sample_tx();
        tx.sc_creations.push(ScCreationOutput {
            value: 10 * COIN,
            withdrawal_epoch_length: 14,
        });
        let expected = sidechain_id(&tx.txid().unwrap(), 0);
        assert_eq!(tx.sidechain_id(0).unwrap(), expected);
    }

    #[test]
    fn tx_sidechain_id_out_of_bounds() {
        let tx = sample_tx();
        assert!(matches!(
            tx.sidechain_id(0),
            Err(TransactionError::CreationIndexOutOfBounds { index: 0, len: 0 })
        ));
    }

    // --- Transaction ---

    #[test]
    fn txid_deterministic() {
        let tx = sample_tx();
        assert_eq!(tx.txid().unwrap(), tx.txid().unwrap());
    }

    #[test]
    fn txid_changes_with_data() {
        let tx1 = sample_tx();
        let mut tx2 = sample_tx();
        tx2.lock_time = 1;
        assert_ne!(tx1.txid().unwrap(), tx2.txid().unwrap());
    }

    #[test]
    fn txid_changes_with_sidechain_payload() {
        let tx1 = sample_tx();
        let mut tx2 = sample_tx();
        tx2.forward_transfers.push(ForwardTransferOutput {
            sc_id: Hash256([0xEE; 32]),
            value: COIN,
        });
        assert_ne!(tx1.txid().unwrap(), tx2.txid().unwrap());
    }

    #[test]
    fn csw_and_creation_detection() {
        let mut tx = sample_tx();
        assert!(!tx.has_csw_inputs());
        assert!(!tx.is_sidechain_creation());

        tx.csw_inputs.push(CswInput {
            sc_id: Hash256([0x01; 32]),
            value: COIN,
            nullifier: Hash256([0x02; 32]),
            pubkey_hash: Hash256::ZERO,
        });
        tx.sc_creations.push(ScCreationOutput {
            value: COIN,
            withdrawal_epoch_length: 14,
        });
        assert!(tx.has_csw_inputs());
        assert!(tx.is_sidechain_creation());
    }

    #[test]
    fn total_output_value_overflow_returns_none() {
        let mut tx = sample_tx();
        tx.outputs = vec![
            TxOutput { value: u64::MAX, pubkey_hash: Hash256::ZERO },
            TxOutput { value: 1, pubkey_hash: Hash256::ZERO },
        ];
        assert_eq!(tx.total_output_value(), None);
    }

    // --- Certificate ---

    #[test]
    fn cert_id_deterministic() {
        let cert = sample_cert();
        assert_eq!(cert.cert_id().unwrap(), cert.cert_id().unwrap());
    }

    #[test]
    fn cert_id_changes_with_quality() {
        let cert1 = sample_cert();
        let mut cert2 = sample_cert();
        cert2.quality += 1;
        assert_ne!(cert1.cert_id().unwrap(), cert2.cert_id().unwrap());
    }

    // --- Bincode round-trips ---

    #[test]
    fn bincode_round_trip_transaction() {
        let mut tx = sample_tx();
        tx.sc_creations.push(ScCreationOutput {
            value: 10 * COIN,
            withdrawal_epoch_length: 14,
        });
        tx.btr_requests.push(BtrRequestOutput {
            sc_id: Hash256([0x03; 32]),
            sc_fee: 1,
            request_data: vec![0xFE; 16],
        });
        let encoded = bincode::encode_to_vec(&tx, bincode::config::standard()).unwrap();
        let (decoded, _): (Transaction, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(tx, decoded);
    }

    #[test]
    fn bincode_round_trip_certificate() {
        let cert = sample_cert();
        let encoded = bincode::encode_to_vec(&cert, bincode::config::standard()).unwrap();
        let (decoded, _): (Certificate, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(cert, decoded);
    }
}
