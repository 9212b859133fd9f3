//! # rtrd-store
//!
//! The versioned in-memory dataset behind an RTR cache server.
//!
//! This crate provides:
//! - The deliverable object family: VRPs, BGPsec router keys, ASPA
//!   records, each with a stable fingerprint and an announce/withdraw
//!   flag
//! - Diff computation and application by fingerprint
//! - A serial-versioned store with a bounded window of retained diffs
//! - The [`PayloadSource`] trait connection handlers consume

pub mod payload;
pub mod store;

pub use payload::{Afi, Aspa, Flag, Payload, RouteOrigin, RouterKey};
pub use store::{apply_diff, compute_diff, PayloadSource, Store};
