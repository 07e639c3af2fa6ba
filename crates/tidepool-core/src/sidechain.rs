//! Per-sidechain aggregation of pooled entries.

use std::collections::{BTreeMap, HashSet};

use crate::types::Hash256;

/// Everything the pool currently holds for one sidechain.
///
/// A record exists only while at least one pooled entry references the
/// sidechain; the pool drops empty records eagerly.
#[derive(Debug, Clone, Default)]
pub struct SidechainRecord {
    /// The pooled transaction whose creation output mints this sidechain,
    /// if one is in the pool.
    pub creation_tx: Option<Hash256>,
    /// Pooled transactions carrying forward transfers to this sidechain.
    pub fwd_txs: HashSet<Hash256>,
    /// Pooled transactions carrying backward-transfer requests for this
    /// sidechain.
    pub btr_txs: HashSet<Hash256>,
    /// Epoch of the pooled certificates. All pooled certificates for one
    /// sidechain share an epoch.
    pub cert_epoch: Option<u32>,
    /// Pooled certificates keyed by quality. Distinct qualities only, so the
    /// highest key is the current top-quality certificate.
    pub certificates: BTreeMap<u64, Hash256>,
}

impl SidechainRecord {
    /// Whether no pooled entry references this sidechain anymore.
    pub fn is_empty(&self) -> bool {
        self.creation_tx.is_none()
            && self.fwd_txs.is_empty()
            && self.btr_txs.is_empty()
            && self.certificates.is_empty()
    }

    /// The pooled certificate with the highest quality, if any.
    pub fn top_quality_cert(&self) -> Option<(u64, Hash256)> {
        self.certificates
            .iter()
            .next_back()
            .map(|(quality, id)| (*quality, *id))
    }

    /// Whether a certificate with exactly this quality is pooled.
    pub fn has_cert_with_quality(&self, quality: u64) -> bool {
        self.certificates.contains_key(&quality)
    }

    /// Register a pooled certificate. The caller has already rejected
    /// same-or-lower quality conflicts, so qualities are distinct and all
    /// pooled certificates share one epoch.
    pub fn add_cert(&mut self, epoch: u32, quality: u64, id: Hash256) {
        debug_assert!(self.cert_epoch.is_none() || self.cert_epoch == Some(epoch));
        debug_assert!(!self.certificates.contains_key(&quality));
        self.cert_epoch = Some(epoch);
        self.certificates.insert(quality, id);
    }

    /// Unregister a pooled certificate by quality. Clears the epoch marker
    /// when the last certificate leaves.
    pub fn remove_cert(&mut self, quality: u64) {
        self.certificates.remove(&quality);
        if self.certificates.is_empty() {
            self.cert_epoch = None;
        }
    }

    /// All entry identifiers this record references, for cascade removal.
    pub fn referenced_ids(&self) -> Vec<Hash256> {
        let mut ids = Vec::new();
        ids.extend(self.fwd_txs.iter().copied());
        ids.extend(self.btr_txs.iter().copied());
        ids.extend(self.certificates.values().copied());
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(seed: u8) -> Hash256 {
        Hash256([seed; 32])
    }

    #[test]
    fn empty_record_is_empty() {
        let record = SidechainRecord::default();
        assert!(record.is_empty());
        assert_eq!(record.top_quality_cert(), None);
    }

    #[test]
    fn creation_marker_makes_record_nonempty() {
        let mut record = SidechainRecord::default();
        record.creation_tx = Some(id(0x01));
        assert!(!record.is_empty());
        record.creation_tx = None;
        assert!(record.is_empty());
    }

    #[test]
    fn top_quality_tracks_highest_key() {
        let mut record = SidechainRecord::default();
        record.add_cert(3, 5, id(0x05));
        record.add_cert(3, 9, id(0x09));
        record.add_cert(3, 7, id(0x07));
        assert_eq!(record.top_quality_cert(), Some((9, id(0x09))));

        record.remove_cert(9);
        assert_eq!(record.top_quality_cert(), Some((7, id(0x07))));
        assert_eq!(record.cert_epoch, Some(3));
    }

    #[test]
    fn removing_last_cert_clears_epoch() {
        let mut record = SidechainRecord::default();
        record.add_cert(2, 4, id(0x04));
        assert_eq!(record.cert_epoch, Some(2));
        record.remove_cert(4);
        assert_eq!(record.cert_epoch, None);
        assert!(record.is_empty());
    }

    #[test]
    fn referenced_ids_covers_all_sets() {
        let mut record = SidechainRecord::default();
        record.creation_tx = Some(id(0x01));
        record.fwd_txs.insert(id(0x02));
        record.btr_txs.insert(id(0x03));
        record.add_cert(0, 1, id(0x04));

        let ids = record.referenced_ids();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&id(0x02)));
        assert!(ids.contains(&id(0x03)));
        assert!(ids.contains(&id(0x04)));
        // creation is not in the cascade set; the caller removes it as the root
        assert!(!ids.contains(&id(0x01)));
    }
}
