//! Rarity-weighted layer pools and the DNA deduplication pass.

/// Deduplication of item combinations by content fingerprint.
pub mod dedup;
/// Per-layer pool construction.
pub mod pool;
