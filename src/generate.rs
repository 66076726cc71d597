use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use rand::Rng;

use crate::{
    assets::{
        catalog::AssetCatalog,
        codec::{ImageCodec, PngCodec},
    },
    compose::ItemComposer,
    foundation::{config::Config, error::GenResult},
    metadata::MetadataBuilder,
    progress::{DEFAULT_WINDOW, ProgressMeter},
    render::{
        pipeline::{ItemRenderer, PipelineOpts, PipelineStats, PipelineStatus, RenderPipeline},
        sink::{FsSink, ensure_output_folders},
    },
};

/// Options for one `generate` run.
#[derive(Clone, Debug)]
pub struct GenerateOpts {
    /// Folder holding one sub-folder per layer.
    pub layers_dir: PathBuf,
    /// Output root; `json/` and `images/` are created below it.
    pub output_dir: PathBuf,
    /// Render worker count.
    pub workers: usize,
    pub poll_interval: Duration,
    /// Retention window of the throughput estimate.
    pub progress_window: Duration,
    /// Draw the live status line on stderr.
    pub show_progress: bool,
}

impl Default for GenerateOpts {
    fn default() -> Self {
        let pipeline = PipelineOpts::default();
        Self {
            layers_dir: PathBuf::from("layers"),
            output_dir: PathBuf::from("output"),
            workers: pipeline.workers,
            poll_interval: pipeline.poll_interval,
            progress_window: DEFAULT_WINDOW,
            show_progress: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenerateReport {
    pub stats: PipelineStats,
    /// Time spent loading layers and composing items, before any worker started.
    pub composed_in: Duration,
    /// Wall-clock time of the render pipeline, from worker start to the last write.
    pub elapsed: Duration,
}

/// Compose, render and write the whole collection described by `config`.
pub fn generate(config: &Config, opts: &GenerateOpts) -> GenResult<GenerateReport> {
    generate_with_rng(config, opts, &mut rand::rng())
}

/// [`generate`] with a caller-provided randomness source.
#[tracing::instrument(skip_all, fields(collection = %config.name))]
pub fn generate_with_rng<R: Rng + ?Sized>(
    config: &Config,
    opts: &GenerateOpts,
    rng: &mut R,
) -> GenResult<GenerateReport> {
    let compose_start = Instant::now();
    let codec: Arc<dyn ImageCodec> = Arc::new(PngCodec);

    let catalog = AssetCatalog::new(codec.clone());
    let mut composer = ItemComposer::new(config, &opts.layers_dir, catalog);
    let items = composer.compose(rng)?;
    let composed_in = compose_start.elapsed();
    tracing::info!(
        items = items.len(),
        start_id = config.start_id(),
        composed_in = ?composed_in,
        "collection composed"
    );

    let layout = ensure_output_folders(&opts.output_dir)?;
    let metadata = MetadataBuilder::new(config, codec.extension(), codec.mime_type())?;
    let renderer = ItemRenderer::new(codec.clone(), metadata, config.width, config.height);
    let pipeline = RenderPipeline::new(
        renderer,
        PipelineOpts {
            workers: opts.workers,
            poll_interval: opts.poll_interval,
        },
    )?;
    tracing::info!(workers = pipeline.workers(), "rendering");

    let meter = ProgressMeter::new(items.len() as u64, opts.progress_window);
    let mut sink = FsSink::new(layout, codec.extension());
    let bar = status_bar(opts.show_progress);
    let start = Instant::now();
    let result = pipeline.run(items, &mut sink, &meter, &mut |s| {
        bar.set_message(status_line(&s));
    });

    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            bar.abandon();
            return Err(e);
        }
    };

    let elapsed = start.elapsed();
    if meter.finished() {
        bar.finish_with_message(format!("Finished! Time used: {elapsed:.2?}"));
    } else {
        bar.abandon();
    }
    tracing::info!(written = stats.written, elapsed = ?elapsed, "generation finished");
    Ok(GenerateReport {
        stats,
        composed_in,
        elapsed,
    })
}

/// Live status text: counts, plus the time left once it can be estimated.
pub fn status_line(s: &PipelineStatus) -> String {
    let mut line = format!(
        "Generated/Written/Total: {}/{}/{}.",
        s.rendered, s.written, s.total
    );
    if let Some(eta) = s.eta {
        line.push_str(&format!(" Estimated Time Left: {}", HumanDuration(eta)));
    }
    line
}

fn status_bar(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar
}

#[cfg(test)]
#[path = "../tests/unit/generate.rs"]
mod tests;
