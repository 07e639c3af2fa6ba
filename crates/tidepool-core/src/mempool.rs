//! Sidechain-aware pool of unconfirmed transactions and certificates.
//!
//! The pool keeps three indices in lockstep with the canonical entry tables:
//! a spend-graph index (outpoint to spending entry), per-sidechain aggregate
//! records, and a nullifier registry for withdrawal claims. Every mutation
//! goes through [`Mempool::insert_tx`], [`Mempool::insert_cert`] or one of
//! the removal operations, so the indices never dangle.
//!
//! The pool performs no semantic validation. Callers run structural and
//! cryptographic checks first, then consult the conflict predicates, then
//! insert. On every chain-tip change the caller runs the staleness sweeps
//! against a fresh [`ChainOracle`] view.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, trace};

use crate::error::MempoolError;
use crate::sidechain::SidechainRecord;
use crate::traits::{ChainOracle, SidechainState};
use crate::types::{sidechain_id, Certificate, Hash256, Nullifier, OutPoint, ScId, Transaction};

/// A pooled transaction with its acceptance metadata.
#[derive(Debug, Clone)]
pub struct TxMempoolEntry {
    pub tx: Transaction,
    pub txid: Hash256,
    /// Fee paid by this transaction, in zats.
    pub fee: u64,
    /// Unix timestamp when the entry was accepted.
    pub time: u64,
    /// Priority at acceptance time.
    pub priority: f64,
    /// Chain height at acceptance time.
    pub height: u64,
}

/// A pooled certificate with its acceptance metadata.
#[derive(Debug, Clone)]
pub struct CertMempoolEntry {
    pub cert: Certificate,
    pub cert_id: Hash256,
    pub fee: u64,
    pub time: u64,
    pub priority: f64,
    pub height: u64,
}

/// Entries evicted by a removal operation, reported for caller-side
/// propagation (wallet notification, relay).
#[derive(Debug, Default)]
pub struct RemovedEntries {
    pub transactions: Vec<Transaction>,
    pub certificates: Vec<Certificate>,
}

impl RemovedEntries {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.certificates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transactions.len() + self.certificates.len()
    }

    pub fn extend(&mut self, other: RemovedEntries) {
        self.transactions.extend(other.transactions);
        self.certificates.extend(other.certificates);
    }
}

/// The pool itself. Transactions and certificates share one identifier
/// namespace but live in separate tables; only certificates carry a quality
/// and an epoch.
#[derive(Debug, Default)]
pub struct Mempool {
    txs: HashMap<Hash256, TxMempoolEntry>,
    certs: HashMap<Hash256, CertMempoolEntry>,
    /// Spend-graph index: consumed outpoint to the consuming entry.
    by_outpoint: HashMap<OutPoint, Hash256>,
    /// Per-sidechain aggregation of pooled entries.
    sidechains: HashMap<ScId, SidechainRecord>,
    /// Withdrawal-claim nullifier to the owning transaction.
    nullifiers: HashMap<Nullifier, Hash256>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    // --- insertion ---

    /// Add a transaction unconditionally. Fails only on an identifier
    /// collision; semantic validation happens upstream.
    pub fn insert_tx(
        &mut self,
        tx: Transaction,
        fee: u64,
        time: u64,
        priority: f64,
        height: u64,
    ) -> Result<Hash256, MempoolError> {
        let txid = tx.txid()?;
        if self.contains(&txid) {
            return Err(MempoolError::AlreadyExists(txid.to_string()));
        }

        for input in &tx.inputs {
            self.by_outpoint.insert(input.previous_output.clone(), txid);
        }
        for csw in &tx.csw_inputs {
            debug_assert!(!self.nullifiers.contains_key(&csw.nullifier));
            self.nullifiers.insert(csw.nullifier, txid);
        }
        for index in 0..tx.sc_creations.len() {
            let sc_id = sidechain_id(&txid, index as u64);
            self.sidechains.entry(sc_id).or_default().creation_tx = Some(txid);
        }
        for fwd in &tx.forward_transfers {
            self.sidechains.entry(fwd.sc_id).or_default().fwd_txs.insert(txid);
        }
        for btr in &tx.btr_requests {
            self.sidechains.entry(btr.sc_id).or_default().btr_txs.insert(txid);
        }

        self.txs.insert(
            txid,
            TxMempoolEntry { tx, txid, fee, time, priority, height },
        );
        debug!(%txid, "added transaction to pool");
        Ok(txid)
    }

    /// Add a certificate unconditionally. The caller has already run
    /// [`Mempool::check_incoming_cert_conflicts`], so its quality strictly
    /// exceeds any pooled competitor for its sidechain and epoch.
    pub fn insert_cert(
        &mut self,
        cert: Certificate,
        fee: u64,
        time: u64,
        priority: f64,
        height: u64,
    ) -> Result<Hash256, MempoolError> {
        let cert_id = cert.cert_id()?;
        if self.contains(&cert_id) {
            return Err(MempoolError::AlreadyExists(cert_id.to_string()));
        }

        for input in &cert.inputs {
            self.by_outpoint.insert(input.previous_output.clone(), cert_id);
        }
        self.sidechains
            .entry(cert.sc_id)
            .or_default()
            .add_cert(cert.epoch, cert.quality, cert_id);

        self.certs.insert(
            cert_id,
            CertMempoolEntry { cert, cert_id, fee, time, priority, height },
        );
        debug!(%cert_id, "added certificate to pool");
        Ok(cert_id)
    }

    // --- removal ---

    /// Remove an entry and everything that depends on it.
    ///
    /// Spend-graph descendants (entries consuming an output of a removed
    /// entry) are always removed transitively. `recursive` additionally
    /// cascades through sidechain association, and only when `id` names a
    /// sidechain-creation transaction: every pooled forward transfer,
    /// backward-transfer request and certificate for the created sidechains
    /// goes too, since they presuppose a creation that is leaving the pool.
    /// For any other entry `recursive` changes nothing.
    ///
    /// Removing an absent identifier is a no-op returning empty lists.
    pub fn remove(&mut self, id: &Hash256, recursive: bool) -> RemovedEntries {
        let mut removed = RemovedEntries::default();
        if !self.contains(id) {
            return removed;
        }

        let mut roots = vec![*id];
        if recursive {
            if let Some(entry) = self.txs.get(id) {
                for index in 0..entry.tx.sc_creations.len() {
                    let sc_id = sidechain_id(id, index as u64);
                    if let Some(record) = self.sidechains.get(&sc_id) {
                        roots.extend(record.referenced_ids());
                    }
                }
            }
        }

        for root in roots {
            self.remove_with_descendants(&root, &mut removed);
        }
        removed
    }

    /// Remove `root` together with its spend-graph closure.
    fn remove_with_descendants(&mut self, root: &Hash256, removed: &mut RemovedEntries) {
        let mut queue = VecDeque::from([*root]);
        while let Some(id) = queue.pop_front() {
            if !self.contains(&id) {
                continue;
            }
            queue.extend(self.spenders_of(&id));
            self.remove_entry(&id, removed);
        }
    }

    /// Pooled entries spending an unconfirmed output of `id`. Certificate
    /// backward transfers are not spendable before confirmation, so only
    /// change outputs count for certificates.
    fn spenders_of(&self, id: &Hash256) -> Vec<Hash256> {
        let output_count = if let Some(entry) = self.txs.get(id) {
            entry.tx.outputs.len()
        } else if let Some(entry) = self.certs.get(id) {
            entry.cert.change_outputs.len()
        } else {
            0
        };
        (0..output_count as u64)
            .filter_map(|index| self.by_outpoint.get(&OutPoint { txid: *id, index }))
            .copied()
            .collect()
    }

    /// Unlink one entry from every index and report its payload. The caller
    /// has already scheduled descendants for removal.
    fn remove_entry(&mut self, id: &Hash256, removed: &mut RemovedEntries) {
        if let Some(entry) = self.txs.remove(id) {
            for input in &entry.tx.inputs {
                if self.by_outpoint.get(&input.previous_output) == Some(id) {
                    self.by_outpoint.remove(&input.previous_output);
                }
            }
            for csw in &entry.tx.csw_inputs {
                if self.nullifiers.get(&csw.nullifier) == Some(id) {
                    self.nullifiers.remove(&csw.nullifier);
                }
            }
            for index in 0..entry.tx.sc_creations.len() {
                let sc_id = sidechain_id(id, index as u64);
                if let Some(record) = self.sidechains.get_mut(&sc_id) {
                    if record.creation_tx == Some(*id) {
                        record.creation_tx = None;
                    }
                    self.prune_record(&sc_id);
                }
            }
            for fwd in &entry.tx.forward_transfers {
                if let Some(record) = self.sidechains.get_mut(&fwd.sc_id) {
                    record.fwd_txs.remove(id);
                    self.prune_record(&fwd.sc_id);
                }
            }
            for btr in &entry.tx.btr_requests {
                if let Some(record) = self.sidechains.get_mut(&btr.sc_id) {
                    record.btr_txs.remove(id);
                    self.prune_record(&btr.sc_id);
                }
            }
            debug!(txid = %id, "removed transaction from pool");
            removed.transactions.push(entry.tx);
        } else if let Some(entry) = self.certs.remove(id) {
            for input in &entry.cert.inputs {
                if self.by_outpoint.get(&input.previous_output) == Some(id) {
                    self.by_outpoint.remove(&input.previous_output);
                }
            }
            if let Some(record) = self.sidechains.get_mut(&entry.cert.sc_id) {
                if record.certificates.get(&entry.cert.quality) == Some(id) {
                    record.remove_cert(entry.cert.quality);
                }
                self.prune_record(&entry.cert.sc_id);
            }
            debug!(cert_id = %id, "removed certificate from pool");
            removed.certificates.push(entry.cert);
        }
    }

    fn prune_record(&mut self, sc_id: &ScId) {
        if self.sidechains.get(sc_id).is_some_and(|r| r.is_empty()) {
            self.sidechains.remove(sc_id);
        }
    }

    // --- conflict predicates ---

    /// Whether an incoming transaction is free of pool conflicts
    /// (true = acceptable). Checks identifier collision, prevout
    /// double-spends against pooled entries, and nullifier reuse.
    pub fn check_incoming_tx_conflicts(&self, tx: &Transaction) -> bool {
        let Ok(txid) = tx.txid() else {
            return false;
        };
        if self.contains(&txid) {
            return false;
        }
        if tx
            .inputs
            .iter()
            .any(|input| self.by_outpoint.contains_key(&input.previous_output))
        {
            return false;
        }
        if tx
            .csw_inputs
            .iter()
            .any(|csw| self.nullifiers.contains_key(&csw.nullifier))
        {
            return false;
        }
        true
    }

    /// Whether an incoming certificate is free of pool conflicts
    /// (true = acceptable). Besides identifier and prevout conflicts, a
    /// certificate must strictly improve on the pooled top quality for its
    /// sidechain and epoch; same or lower quality is refused even when it
    /// would otherwise be valid.
    pub fn check_incoming_cert_conflicts(&self, cert: &Certificate) -> bool {
        let Ok(cert_id) = cert.cert_id() else {
            return false;
        };
        if self.contains(&cert_id) {
            return false;
        }
        if cert
            .inputs
            .iter()
            .any(|input| self.by_outpoint.contains_key(&input.previous_output))
        {
            return false;
        }
        if let Some(record) = self.sidechains.get(&cert.sc_id) {
            if record.cert_epoch == Some(cert.epoch) {
                if let Some((top_quality, _)) = record.top_quality_cert() {
                    if cert.quality <= top_quality {
                        return false;
                    }
                }
            }
        }
        true
    }

    // --- conflict removal ---

    /// Evict every pooled entry conflicting with a transaction about to take
    /// precedence (typically one being confirmed): same-prevout spenders and
    /// nullifier sharers, each with their spend-graph descendants.
    pub fn remove_tx_conflicts(&mut self, incoming: &Transaction) -> RemovedEntries {
        let mut conflicting: Vec<Hash256> = Vec::new();
        for input in &incoming.inputs {
            if let Some(spender) = self.by_outpoint.get(&input.previous_output) {
                conflicting.push(*spender);
            }
        }
        for csw in &incoming.csw_inputs {
            if let Some(owner) = self.nullifiers.get(&csw.nullifier) {
                conflicting.push(*owner);
            }
        }

        let mut removed = RemovedEntries::default();
        for id in conflicting {
            removed.extend(self.remove(&id, false));
        }
        removed
    }

    /// Evict every pooled entry conflicting with a certificate about to take
    /// precedence: same-prevout spenders, plus pooled certificates for the
    /// same sidechain and epoch whose quality does not exceed the incoming
    /// one's.
    pub fn remove_cert_conflicts(&mut self, incoming: &Certificate) -> RemovedEntries {
        let mut conflicting: Vec<Hash256> = Vec::new();
        for input in &incoming.inputs {
            if let Some(spender) = self.by_outpoint.get(&input.previous_output) {
                conflicting.push(*spender);
            }
        }
        if let Some(record) = self.sidechains.get(&incoming.sc_id) {
            if record.cert_epoch == Some(incoming.epoch) {
                conflicting.extend(record.certificates.range(..=incoming.quality).map(|(_, id)| *id));
            }
        }

        let mut removed = RemovedEntries::default();
        for id in conflicting {
            removed.extend(self.remove(&id, false));
        }
        removed
    }

    // --- staleness sweeps ---

    /// Remove transactions invalidated by chain movement: spends of coins
    /// now missing or immature at the best height, forward transfers and
    /// backward-transfer requests targeting ceased sidechains, and
    /// withdrawal claims whose sidechain is not (or no longer) ceased.
    /// Inputs resolving to a pooled entry are never checked against the
    /// oracle; the parent leaving the pool triggers descendant cleanup on
    /// its own.
    pub fn remove_stale_transactions(&mut self, oracle: &dyn ChainOracle) -> RemovedEntries {
        let best = oracle.best_height();
        let mut stale: Vec<Hash256> = Vec::new();
        for (txid, entry) in &self.txs {
            let tx = &entry.tx;
            let missing_input = tx.inputs.iter().any(|input| {
                !self.contains(&input.previous_output.txid)
                    && !oracle.is_output_mature(&input.previous_output, best)
            });
            let ceased_target = tx
                .forward_transfers
                .iter()
                .map(|fwd| &fwd.sc_id)
                .chain(tx.btr_requests.iter().map(|btr| &btr.sc_id))
                .any(|sc_id| oracle.sidechain_state(sc_id) == SidechainState::Ceased);
            let csw_wrong_state = tx
                .csw_inputs
                .iter()
                .any(|csw| oracle.sidechain_state(&csw.sc_id) != SidechainState::Ceased);
            if missing_input || ceased_target || csw_wrong_state {
                trace!(%txid, missing_input, ceased_target, csw_wrong_state, "transaction stale");
                stale.push(*txid);
            }
        }

        let mut removed = RemovedEntries::default();
        for id in stale {
            removed.extend(self.remove(&id, true));
        }
        if !removed.is_empty() {
            debug!(count = removed.len(), "stale transaction sweep evicted entries");
        }
        removed
    }

    /// Remove certificates whose submission window no longer contains the
    /// best height, or whose sidechain has ceased. Certificates for
    /// sidechains still unconfirmed on-chain are retained.
    pub fn remove_stale_certificates(&mut self, oracle: &dyn ChainOracle) -> RemovedEntries {
        let best = oracle.best_height();
        let mut stale: Vec<Hash256> = Vec::new();
        for (cert_id, entry) in &self.certs {
            let cert = &entry.cert;
            let keep = match oracle.sidechain_state(&cert.sc_id) {
                SidechainState::Ceased => false,
                SidechainState::Unconfirmed => true,
                SidechainState::Alive => oracle
                    .cert_submission_window(&cert.sc_id, cert.epoch)
                    .is_some_and(|(start, end)| (start..=end).contains(&best)),
            };
            if !keep {
                trace!(%cert_id, epoch = cert.epoch, "certificate stale");
                stale.push(*cert_id);
            }
        }

        let mut removed = RemovedEntries::default();
        for id in stale {
            removed.extend(self.remove(&id, true));
        }
        if !removed.is_empty() {
            debug!(count = removed.len(), "stale certificate sweep evicted entries");
        }
        removed
    }

    /// For each ceased sidechain whose pooled withdrawal claims sum past its
    /// remaining balance, purge every pooled claim against it. The pool
    /// cannot tell which claims are legitimate without final closure data,
    /// so it clears the whole set and relies on resubmission.
    pub fn remove_out_of_balance_csw(&mut self, oracle: &dyn ChainOracle) -> RemovedEntries {
        let mut claimed: HashMap<ScId, u64> = HashMap::new();
        for entry in self.txs.values() {
            for csw in &entry.tx.csw_inputs {
                let total = claimed.entry(csw.sc_id).or_insert(0);
                *total = total.saturating_add(csw.value);
            }
        }

        let mut removed = RemovedEntries::default();
        for (sc_id, total) in claimed {
            if oracle.sidechain_state(&sc_id) != SidechainState::Ceased {
                continue;
            }
            if total <= oracle.sidechain_balance(&sc_id) {
                continue;
            }
            let claimers: Vec<Hash256> = self
                .txs
                .values()
                .filter(|entry| entry.tx.csw_inputs.iter().any(|csw| csw.sc_id == sc_id))
                .map(|entry| entry.txid)
                .collect();
            debug!(%sc_id, total, "withdrawal claims exceed sidechain balance, purging");
            for id in claimers {
                removed.extend(self.remove(&id, true));
            }
        }
        removed
    }

    // --- dependency queries ---

    /// Pooled entries `tx` transitively spends from, nearest ancestor first,
    /// each exactly once.
    pub fn dependencies_from(&self, tx: &Transaction) -> Vec<Hash256> {
        let mut queue: VecDeque<Hash256> = tx
            .inputs
            .iter()
            .map(|input| input.previous_output.txid)
            .collect();
        self.collect_closure(&mut queue, |pool, id| pool.parents_of(id))
    }

    /// Pooled entries that transitively spend from `tx`, nearest descendant
    /// first, each exactly once.
    pub fn dependencies_of(&self, tx: &Transaction) -> Vec<Hash256> {
        let Ok(txid) = tx.txid() else {
            return Vec::new();
        };
        let mut queue: VecDeque<Hash256> = (0..tx.outputs.len() as u64)
            .filter_map(|index| self.by_outpoint.get(&OutPoint { txid, index }))
            .copied()
            .collect();
        self.collect_closure(&mut queue, |pool, id| pool.spenders_of(id))
    }

    /// Breadth-first closure over pooled identifiers, deduplicated,
    /// preserving first-visit order.
    fn collect_closure(
        &self,
        queue: &mut VecDeque<Hash256>,
        neighbors: impl Fn(&Self, &Hash256) -> Vec<Hash256>,
    ) -> Vec<Hash256> {
        let mut seen: HashSet<Hash256> = HashSet::new();
        let mut order: Vec<Hash256> = Vec::new();
        while let Some(id) = queue.pop_front() {
            if !self.contains(&id) || !seen.insert(id) {
                continue;
            }
            order.push(id);
            queue.extend(neighbors(self, &id));
        }
        order
    }

    /// Pooled identifiers the entry `id` spends from directly.
    fn parents_of(&self, id: &Hash256) -> Vec<Hash256> {
        let inputs = if let Some(entry) = self.txs.get(id) {
            &entry.tx.inputs
        } else if let Some(entry) = self.certs.get(id) {
            &entry.cert.inputs
        } else {
            return Vec::new();
        };
        inputs
            .iter()
            .map(|input| input.previous_output.txid)
            .collect()
    }

    // --- queries ---

    /// Whether any pooled entry carries the given identifier.
    pub fn contains(&self, id: &Hash256) -> bool {
        self.txs.contains_key(id) || self.certs.contains_key(id)
    }

    pub fn contains_tx(&self, txid: &Hash256) -> bool {
        self.txs.contains_key(txid)
    }

    pub fn contains_cert(&self, cert_id: &Hash256) -> bool {
        self.certs.contains_key(cert_id)
    }

    pub fn get_tx(&self, txid: &Hash256) -> Option<&TxMempoolEntry> {
        self.txs.get(txid)
    }

    pub fn get_cert(&self, cert_id: &Hash256) -> Option<&CertMempoolEntry> {
        self.certs.get(cert_id)
    }

    /// Whether a pooled transaction mints the given sidechain.
    pub fn has_sidechain_creation(&self, sc_id: &ScId) -> bool {
        self.sidechains
            .get(sc_id)
            .is_some_and(|record| record.creation_tx.is_some())
    }

    /// The best pooled certificate for a sidechain's contested epoch.
    pub fn top_quality_certificate(&self, sc_id: &ScId) -> Option<(u64, Hash256)> {
        self.sidechains.get(sc_id)?.top_quality_cert()
    }

    pub fn tx_count(&self) -> usize {
        self.txs.len()
    }

    pub fn cert_count(&self) -> usize {
        self.certs.len()
    }

    pub fn len(&self) -> usize {
        self.txs.len() + self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty() && self.certs.is_empty()
    }

    /// Sum of fees over every pooled entry, in zats.
    pub fn total_fees(&self) -> u64 {
        let tx_fees = self.txs.values().fold(0u64, |acc, e| acc.saturating_add(e.fee));
        self.certs
            .values()
            .fold(tx_fees, |acc, e| acc.saturating_add(e.fee))
    }

    pub fn txids(&self) -> impl Iterator<Item = &Hash256> {
        self.txs.keys()
    }

    pub fn cert_ids(&self) -> impl Iterator<Item = &Hash256> {
        self.certs.keys()
    }
}
