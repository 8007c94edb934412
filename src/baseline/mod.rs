//! Baseline Module - Network Baseline Learning & Enforcement
//!
//! Owns the per-deployment network baselines: the observation-period
//! learning algorithm, bidirectional peer mirroring between deployment
//! records, network-policy dedup, and write-through persistence.

pub mod dedup;
pub mod manager;
pub mod store;


pub use manager::{BaselineManager, PeerStatus, PeerStatusUpdate};
