//! Network Baseline Manager - Cluster Security Platform
//!
//! Learns the set of "normal" network peers for every monitored deployment
//! from observed traffic flows, and classifies later traffic as baseline or
//! anomalous. Operators use the baseline to spot unexpected lateral movement
//! and exfiltration.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     BASELINE SUBSYSTEM                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  deployment      flow         policy        user-facing      │
//! │  lifecycle     pipeline      watcher        service          │
//! │      └────────────┴─────┬──────┴───────────────┘             │
//! │                         ▼                                    │
//! │               ┌──────────────────┐   exclusive lock over     │
//! │               │ Baseline Manager │   records + dedup cache   │
//! │               └───┬──────────┬───┘                           │
//! │                   ▼          ▼                               │
//! │          ┌────────────┐  ┌──────────────┐                    │
//! │          │ Persistent │  │ Remote-agent │  (locked baselines │
//! │          │   store    │  │   notifier   │   only)            │
//! │          └────────────┘  └──────────────┘                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod access;
pub mod baseline;
pub mod collab;
pub mod config;
pub mod error;
pub mod types;

pub use baseline::manager::{BaselineManager, PeerStatus, PeerStatusUpdate};
pub use config::Config;
pub use error::{BaselineError, Result};
