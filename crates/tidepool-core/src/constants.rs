//! Protocol constants. All monetary values in zats (1 COIN = 10^8 zats).

pub const COIN: u64 = 100_000_000;

/// Shortest withdrawal epoch a sidechain creation output may declare.
pub const MIN_WITHDRAWAL_EPOCH_LENGTH: u64 = 2;

/// Longest withdrawal epoch a sidechain creation output may declare
/// (roughly one week of blocks at the target block time).
pub const MAX_WITHDRAWAL_EPOCH_LENGTH: u64 = 4032;
