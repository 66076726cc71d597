use std::{
    borrow::Cow,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_channel::{Receiver, Sender};

use crate::{
    assets::codec::{ImageCodec, PixelBuffer},
    compose::Item,
    foundation::error::{GenError, GenResult},
    metadata::MetadataBuilder,
    progress::ProgressMeter,
    render::sink::ItemSink,
};

/// Job queue slots per render worker.
pub const JOB_QUEUE_PER_WORKER: usize = 1000;
/// Completion queue slots per render worker.
pub const DONE_QUEUE_PER_WORKER: usize = 5;

/// An item with its encoded image and metadata attached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedItem {
    pub id: u64,
    pub image: Vec<u8>,
    pub metadata: Vec<u8>,
}

/// Turns one [`Item`] into image and metadata bytes.
pub struct ItemRenderer {
    codec: Arc<dyn ImageCodec>,
    metadata: MetadataBuilder,
    width: u32,
    height: u32,
}

impl ItemRenderer {
    pub fn new(
        codec: Arc<dyn ImageCodec>,
        metadata: MetadataBuilder,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            codec,
            metadata,
            width,
            height,
        }
    }

    /// Composite every layer bottom-up onto a transparent canvas, encode it and build the
    /// metadata record.
    ///
    /// Layers whose size differs from the canvas are resampled to the canvas size first.
    pub fn render(&self, item: &Item) -> GenResult<RenderedItem> {
        let mut canvas = PixelBuffer::transparent(self.width, self.height);
        for asset in &item.layers {
            let layer: Cow<'_, PixelBuffer> =
                if asset.pixels.width == self.width && asset.pixels.height == self.height {
                    Cow::Borrowed(asset.pixels.as_ref())
                } else {
                    let scaled = self
                        .codec
                        .scale(&asset.pixels, self.width, self.height)
                        .map_err(|e| item_error(item.id, e))?;
                    Cow::Owned(scaled)
                };
            self.codec
                .composite(&mut canvas, &layer, (0, 0))
                .map_err(|e| item_error(item.id, e))?;
        }

        let image = self
            .codec
            .encode(&canvas)
            .map_err(|e| item_error(item.id, e))?;
        let metadata = self.metadata.to_bytes(item)?;
        Ok(RenderedItem {
            id: item.id,
            image,
            metadata,
        })
    }
}

fn item_error(id: u64, err: GenError) -> GenError {
    match err {
        GenError::Codec(msg) => GenError::codec(format!("item {id}: {msg}")),
        other => other,
    }
}

#[derive(Clone, Debug)]
pub struct PipelineOpts {
    /// Number of render worker threads.
    pub workers: usize,
    /// How often the monitor callback runs while the pipeline is busy.
    pub poll_interval: Duration,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Snapshot handed to the monitor callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineStatus {
    pub rendered: u64,
    pub written: u64,
    pub total: u64,
    /// Estimated time left, `None` while unknown.
    pub eta: Option<Duration>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub total: u64,
    pub rendered: u64,
    pub written: u64,
}

/// Feeder -> render workers -> persistence worker, joined by two bounded queues.
pub struct RenderPipeline {
    renderer: ItemRenderer,
    opts: PipelineOpts,
}

impl RenderPipeline {
    pub fn new(renderer: ItemRenderer, opts: PipelineOpts) -> GenResult<Self> {
        if opts.workers == 0 {
            return Err(GenError::config("concurrency must be >= 1"));
        }
        Ok(Self { renderer, opts })
    }

    pub fn workers(&self) -> usize {
        self.opts.workers
    }

    /// Render and persist every item.
    ///
    /// Every written item is logged on `meter`. `monitor` runs on the calling thread every poll
    /// interval until all stages have stopped, and once more at the end.
    ///
    /// The first failing stage cancels the others; its error is returned.
    #[tracing::instrument(skip_all, fields(items = items.len(), workers = self.opts.workers))]
    pub fn run(
        &self,
        items: Vec<Item>,
        sink: &mut dyn ItemSink,
        meter: &ProgressMeter,
        monitor: &mut dyn FnMut(PipelineStatus),
    ) -> GenResult<PipelineStats> {
        let total = items.len() as u64;
        let workers = self.opts.workers;
        let (job_tx, job_rx) = async_channel::bounded::<Item>(workers * JOB_QUEUE_PER_WORKER);
        let (done_tx, done_rx) =
            async_channel::bounded::<RenderedItem>(workers * DONE_QUEUE_PER_WORKER);

        let shutdown = Shutdown {
            cancelled: AtomicBool::new(false),
            job_rx: job_rx.clone(),
            done_rx: done_rx.clone(),
        };
        let rendered = AtomicU64::new(0);
        let written = AtomicU64::new(0);

        let status = || PipelineStatus {
            rendered: rendered.load(Ordering::Relaxed),
            written: written.load(Ordering::Relaxed),
            total,
            eta: meter.eta(),
        };

        std::thread::scope(|scope| -> GenResult<PipelineStats> {
            let mut stages = Vec::with_capacity(workers + 2);

            let feeder_shutdown = &shutdown;
            stages.push((
                "feeder",
                std::thread::Builder::new()
                    .name("feeder".to_string())
                    .spawn_scoped(scope, move || feed(items, job_tx, feeder_shutdown))
                    .map_err(|e| shutdown.spawn_error("feeder", e))?,
            ));

            for idx in 0..workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                let shutdown = &shutdown;
                let rendered = &rendered;
                let renderer = &self.renderer;
                stages.push((
                    "render worker",
                    std::thread::Builder::new()
                        .name(format!("render-{idx}"))
                        .spawn_scoped(scope, move || {
                            render_worker(renderer, job_rx, done_tx, rendered, shutdown)
                        })
                        .map_err(|e| shutdown.spawn_error("render worker", e))?,
                ));
            }
            drop(job_rx);
            drop(done_tx);

            let persist_shutdown = &shutdown;
            let written_ref = &written;
            stages.push((
                "persistence worker",
                std::thread::Builder::new()
                    .name("persist".to_string())
                    .spawn_scoped(scope, move || {
                        persist_worker(sink, done_rx, meter, written_ref, persist_shutdown)
                    })
                    .map_err(|e| shutdown.spawn_error("persistence worker", e))?,
            ));
            tracing::debug!(workers, "pipeline started");

            while !stages.iter().all(|(_, h)| h.is_finished()) {
                monitor(status());
                std::thread::sleep(self.opts.poll_interval);
            }

            let mut first_err = None;
            for (stage, handle) in stages {
                let res = handle
                    .join()
                    .map_err(|_| GenError::pipeline(format!("{stage} panicked")))
                    .and_then(|r| r);
                if let Err(e) = res {
                    shutdown.trigger();
                    first_err.get_or_insert(e);
                }
            }
            monitor(status());
            if let Some(e) = first_err {
                return Err(e);
            }

            let stats = PipelineStats {
                total,
                rendered: rendered.load(Ordering::Relaxed),
                written: written.load(Ordering::Relaxed),
            };
            if stats.written != total {
                return Err(GenError::pipeline(format!(
                    "pipeline stopped after writing {} of {total} items",
                    stats.written
                )));
            }
            Ok(stats)
        })
    }
}

/// Cancellation shared by every stage. Closing both queues wakes any stage blocked on them.
struct Shutdown {
    cancelled: AtomicBool,
    job_rx: Receiver<Item>,
    done_rx: Receiver<RenderedItem>,
}

impl Shutdown {
    fn trigger(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.job_rx.close();
            self.done_rx.close();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn fail<T>(&self, err: GenError) -> GenResult<T> {
        self.trigger();
        Err(err)
    }

    fn spawn_error(&self, stage: &str, err: std::io::Error) -> GenError {
        self.trigger();
        GenError::pipeline(format!("spawn {stage}: {err}"))
    }

    /// Cancels the pipeline if the owning stage unwinds.
    fn guard(&self) -> PanicGuard<'_> {
        PanicGuard(self)
    }
}

struct PanicGuard<'a>(&'a Shutdown);

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.trigger();
        }
    }
}

fn feed(items: Vec<Item>, job_tx: Sender<Item>, shutdown: &Shutdown) -> GenResult<()> {
    let _guard = shutdown.guard();
    for item in items {
        if shutdown.is_cancelled() || job_tx.send_blocking(item).is_err() {
            break;
        }
    }
    Ok(())
}

fn render_worker(
    renderer: &ItemRenderer,
    job_rx: Receiver<Item>,
    done_tx: Sender<RenderedItem>,
    rendered: &AtomicU64,
    shutdown: &Shutdown,
) -> GenResult<()> {
    let _guard = shutdown.guard();
    while let Ok(item) = job_rx.recv_blocking() {
        if shutdown.is_cancelled() {
            break;
        }
        let out = match renderer.render(&item) {
            Ok(out) => out,
            Err(e) => return shutdown.fail(e),
        };
        rendered.fetch_add(1, Ordering::Relaxed);
        if done_tx.send_blocking(out).is_err() {
            break;
        }
    }
    Ok(())
}

fn persist_worker(
    sink: &mut dyn ItemSink,
    done_rx: Receiver<RenderedItem>,
    meter: &ProgressMeter,
    written: &AtomicU64,
    shutdown: &Shutdown,
) -> GenResult<()> {
    let _guard = shutdown.guard();
    while let Ok(out) = done_rx.recv_blocking() {
        if shutdown.is_cancelled() {
            break;
        }
        if let Err(e) = sink.persist(&out) {
            return shutdown.fail(e);
        }
        written.fetch_add(1, Ordering::Relaxed);
        meter.log();
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/render/pipeline.rs"]
mod tests;
