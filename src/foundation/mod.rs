/// Collection configuration.
pub mod config;
/// Error taxonomy.
pub mod error;
