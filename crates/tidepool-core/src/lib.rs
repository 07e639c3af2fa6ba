//! # tidepool-core
//! Foundation types and the sidechain-aware mempool for the Tidepool protocol.

pub mod constants;
pub mod error;
pub mod mempool;
pub mod shared;
pub mod sidechain;
pub mod traits;
pub mod types;
