//! Value types shared across the baseline subsystem.

pub mod entity;
pub mod peer;
pub mod policy;
pub mod record;
