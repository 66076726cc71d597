//! Trait images: the codec surface and the per-folder catalog.

/// Per-layer asset loading, file-name parsing and content fingerprints.
pub mod catalog;
/// Image codec capability surface and the PNG implementation.
pub mod codec;
