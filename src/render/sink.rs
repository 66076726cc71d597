use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::{
    foundation::error::{GenError, GenResult},
    render::pipeline::RenderedItem,
};

/// Persistence contract for the pipeline's single writer thread.
///
/// `persist` is called once per item, from one thread, in completion order (not ID order).
pub trait ItemSink: Send {
    fn persist(&mut self, item: &RenderedItem) -> GenResult<()>;
}

/// Output folders of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLayout {
    pub json_dir: PathBuf,
    pub images_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            json_dir: root.join("json"),
            images_dir: root.join("images"),
        }
    }

    pub fn metadata_path(&self, id: u64) -> PathBuf {
        self.json_dir.join(format!("{id}.json"))
    }

    pub fn image_path(&self, id: u64, extension: &str) -> PathBuf {
        self.images_dir.join(format!("{id}.{extension}"))
    }
}

/// Create `<root>/json` and `<root>/images` if missing.
pub fn ensure_output_folders(root: impl AsRef<Path>) -> GenResult<OutputLayout> {
    let layout = OutputLayout::new(root);
    for dir in [&layout.json_dir, &layout.images_dir] {
        if dir.exists() && !dir.is_dir() {
            return Err(GenError::config(format!(
                "output path '{}' exists and is not a directory",
                dir.display()
            )));
        }
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create output folder '{}'", dir.display()))?;
        tracing::info!(path = %dir.display(), "output folder ready");
    }
    Ok(layout)
}

/// Writes `<json>/<id>.json` and `<images>/<id>.<ext>`.
#[derive(Debug)]
pub struct FsSink {
    layout: OutputLayout,
    extension: &'static str,
}

impl FsSink {
    pub fn new(layout: OutputLayout, extension: &'static str) -> Self {
        Self { layout, extension }
    }
}

impl ItemSink for FsSink {
    fn persist(&mut self, item: &RenderedItem) -> GenResult<()> {
        let image_path = self.layout.image_path(item.id, self.extension);
        std::fs::write(&image_path, &item.image)
            .with_context(|| format!("write image '{}'", image_path.display()))?;

        let json_path = self.layout.metadata_path(item.id);
        std::fs::write(&json_path, &item.metadata)
            .with_context(|| format!("write metadata '{}'", json_path.display()))?;
        Ok(())
    }
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    /// Items in persistence order.
    pub items: Vec<RenderedItem>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ItemSink for InMemorySink {
    fn persist(&mut self, item: &RenderedItem) -> GenResult<()> {
        self.items.push(item.clone());
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/sink.rs"]
mod tests;
