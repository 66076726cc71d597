//! join-layers builds generative image collections from per-layer trait folders.
//!
//! Each layer folder holds PNG files named `<trait>#<rarity>.png`. A run:
//!
//! 1. **Load**: decode every layer folder once into an [`AssetCatalog`]
//! 2. **Distribute**: expand each layer into a rarity-proportional pool of exactly N slots
//! 3. **Deduplicate**: reshuffle pools until no two slots share the same DNA (bounded retries)
//! 4. **Compose**: read slot `k` of every pool into one [`Item`], then number all items
//! 5. **Render**: composite, encode and write every item through a bounded
//!    [`RenderPipeline`] while a [`ProgressMeter`] tracks throughput
//!
//! [`generate`] wires all of it together; the `join-layers` binary is a thin CLI over it.
#![forbid(unsafe_code)]

pub mod assets;
pub mod compose;
pub mod distribute;
pub mod foundation;
pub mod generate;
pub mod metadata;
pub mod progress;
pub mod render;

pub use crate::assets::catalog::{Asset, AssetCatalog};
pub use crate::assets::codec::{ImageCodec, PixelBuffer, PngCodec};
pub use crate::compose::{Item, ItemComposer};
pub use crate::distribute::dedup::{Deduplicator, Dna};
pub use crate::distribute::pool::{ShortfallFill, TraitDistributor};
pub use crate::foundation::config::{Config, LayerRef, TraitSetConfig};
pub use crate::foundation::error::{GenError, GenResult};
pub use crate::generate::{GenerateOpts, GenerateReport, generate};
pub use crate::metadata::{BaseUri, MetadataBuilder};
pub use crate::progress::ProgressMeter;
pub use crate::render::pipeline::{RenderPipeline, RenderedItem};
pub use crate::render::sink::{FsSink, InMemorySink, ItemSink};
