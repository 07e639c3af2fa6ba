//! Abstractions over confirmed chain state.
//!
//! The pool never inspects blocks or the UTXO set directly. Everything it
//! needs to know about the confirmed world comes through [`ChainOracle`],
//! which the node implements over its chain index.

use crate::types::{OutPoint, ScId};

/// Lifecycle state of a sidechain as seen from the confirmed chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidechainState {
    /// No confirmed creation exists. The creation may still be in the pool.
    Unconfirmed,
    /// Created and active; accepts forward transfers, requests and certificates.
    Alive,
    /// Permanently closed; only withdrawal claims may reference it.
    Ceased,
}

/// Read-only view of confirmed chain state consulted during sweeps.
///
/// Implementations must be cheap to call; sweeps query the oracle once per
/// pooled entry.
pub trait ChainOracle: Send + Sync {
    /// Current confirmed chain height.
    fn best_height(&self) -> u64;

    /// Whether the confirmed output at `outpoint` is spendable at `height`.
    ///
    /// Returns false for missing outputs and for coinbase outputs that have
    /// not yet matured. Only called for outpoints that do not resolve to a
    /// pooled entry.
    fn is_output_mature(&self, outpoint: &OutPoint, height: u64) -> bool;

    /// Confirmed lifecycle state of `sc_id`.
    fn sidechain_state(&self, sc_id: &ScId) -> SidechainState;

    /// Remaining claimable balance of a ceased sidechain, in zats.
    ///
    /// Zero for sidechains that are not ceased or are unknown.
    fn sidechain_balance(&self, sc_id: &ScId) -> u64;

    /// The inclusive height window `[start, end]` during which a certificate
    /// for `epoch` of `sc_id` may still confirm, or None if the window cannot
    /// be determined (unknown sidechain or epoch already closed).
    fn cert_submission_window(&self, sc_id: &ScId, epoch: u32) -> Option<(u64, u64)>;

    /// Whether `sc_id` has ceased.
    fn is_ceased(&self, sc_id: &ScId) -> bool {
        self.sidechain_state(sc_id) == SidechainState::Ceased
    }
}
