//! Rendering and persistence.
//!
//! Items flow through [`pipeline::RenderPipeline`] and end up in an [`sink::ItemSink`].

/// Feeder, render workers and persistence worker.
pub mod pipeline;
/// Persistence targets and output folder provisioning.
pub mod sink;
